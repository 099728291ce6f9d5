use std::fmt;

use serde::{Deserialize, Serialize};
use warble::Payload;

use crate::dispatcher::EventType;

pub use kvstore::message::{read_message, write_message};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FuncRequest {
    Hook {
        event_type: EventType,
        function: String,
    },
    Unhook {
        event_type: EventType,
    },
    Event {
        event_type: EventType,
        payload: Payload,
    },
}

/// Reply to a [`FuncRequest`].
///
/// `Absent` means the event ran to a business-level "nothing to return"; it is
/// never encoded as an empty payload. `Rejected` means the handler refused the
/// payload itself (undecodable, or an invalid field such as an empty
/// username). `Error` covers requests that could not be served at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FuncReply {
    Ack,
    Payload { payload: Payload },
    Absent { kind: AbsenceKind, message: String },
    Rejected { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceKind {
    NotConfigured,
    UnknownHandler,
    NotFound,
    AlreadyExists,
}

impl fmt::Display for AbsenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AbsenceKind::NotConfigured => "not configured",
            AbsenceKind::UnknownHandler => "unknown handler",
            AbsenceKind::NotFound => "not found",
            AbsenceKind::AlreadyExists => "already exists",
        };
        f.write_str(label)
    }
}
