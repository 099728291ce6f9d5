//! Request, reply and stored record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock instant with microsecond resolution.
///
/// Orders by `seconds`, then `micros`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    pub seconds: i64,
    pub micros: i64,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            micros: i64::from(at.timestamp_subsec_micros()),
        }
    }

    /// Returns `None` when the fields are out of range for a calendar time.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let nanos = u32::try_from(self.micros).ok()?.checked_mul(1_000)?;
        DateTime::<Utc>::from_timestamp(self.seconds, nanos)
    }
}

/// A posted warble as stored under `warble_<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarbleRecord {
    pub id: String,
    pub username: String,
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub timestamp: Timestamp,
}

impl WarbleRecord {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUserReply {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarbleRequest {
    pub username: String,
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarbleReply {
    pub warble: WarbleRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRequest {
    pub username: String,
    pub to_follow: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowReply {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub warble_id: String,
}

/// The starting warble followed by its direct replies in thread order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReply {
    pub warbles: Vec<WarbleRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRequest {
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileReply {
    pub followers: Vec<String>,
    pub following: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub hashtag: String,
    pub since: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReply {
    pub warbles: Vec<WarbleRecord>,
}
