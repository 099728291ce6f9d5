use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use kvstore::Storage;
use thiserror::Error;
use tracing::{debug, info};
use warble::{Application, Payload, WarbleError};

pub type EventType = u32;

/// Every handler an event can be hooked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Register,
    Warble,
    Follow,
    Read,
    Profile,
    Stream,
}

impl Function {
    pub const ALL: [Function; 6] = [
        Function::Register,
        Function::Warble,
        Function::Follow,
        Function::Read,
        Function::Profile,
        Function::Stream,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|function| function.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Register => "register",
            Function::Warble => "warble",
            Function::Follow => "follow",
            Function::Read => "read",
            Function::Profile => "profile",
            Function::Stream => "stream",
        }
    }

    /// Event number front ends use for this function by convention.
    pub fn default_event(self) -> EventType {
        match self {
            Function::Register => 1,
            Function::Warble => 2,
            Function::Follow => 3,
            Function::Read => 4,
            Function::Profile => 5,
            Function::Stream => 6,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no function is hooked to event {0}")]
    NotConfigured(EventType),
    #[error("event is hooked to unknown function {0:?}")]
    UnknownHandler(String),
    #[error(transparent)]
    Handler(#[from] WarbleError),
}

impl DispatchError {
    /// True for "nothing to return" outcomes, false for genuine failures such
    /// as a malformed payload or unreachable storage.
    pub fn is_absent(&self) -> bool {
        match self {
            DispatchError::NotConfigured(_) | DispatchError::UnknownHandler(_) => true,
            DispatchError::Handler(err) => err.is_absent(),
        }
    }
}

/// Routes events to application handlers through a mutable hook table.
///
/// The hook table has its own lock, taken only for a single table access and
/// never across a handler call.
pub struct Dispatcher<A> {
    app: A,
    storage: Arc<dyn Storage>,
    hooks: Mutex<HashMap<EventType, String>>,
}

impl<A: Application> Dispatcher<A> {
    pub fn new(app: A, storage: Arc<dyn Storage>) -> Self {
        Self {
            app,
            storage,
            hooks: Mutex::new(HashMap::new()),
        }
    }

    /// Binds `event_type` to the function called `function`, replacing any
    /// previous binding. The name is checked only when the event fires.
    pub fn hook(&self, event_type: EventType, function: impl Into<String>) {
        let function = function.into();
        info!(event_type, %function, "hook");
        self.table().insert(event_type, function);
    }

    /// Returns whether a binding was removed.
    pub fn unhook(&self, event_type: EventType) -> bool {
        let removed = self.table().remove(&event_type);
        info!(event_type, removed = ?removed, "unhook");
        removed.is_some()
    }

    pub fn hooked(&self, event_type: EventType) -> Option<String> {
        self.table().get(&event_type).cloned()
    }

    /// Hooks every [`Function`] to its [`Function::default_event`].
    pub fn install_default_hooks(&self) {
        for function in Function::ALL {
            self.hook(function.default_event(), function.name());
        }
    }

    pub async fn execute(
        &self,
        event_type: EventType,
        payload: &Payload,
    ) -> Result<Payload, DispatchError> {
        let name = self
            .hooked(event_type)
            .ok_or(DispatchError::NotConfigured(event_type))?;
        let function =
            Function::from_name(&name).ok_or(DispatchError::UnknownHandler(name))?;

        debug!(event_type, %function, bytes = payload.len(), "executing event");
        let storage = &*self.storage;
        let reply = match function {
            Function::Register => self.app.register_user(payload, storage).await,
            Function::Warble => self.app.warble_text(payload, storage).await,
            Function::Follow => self.app.follow(payload, storage).await,
            Function::Read => self.app.read_thread(payload, storage).await,
            Function::Profile => self.app.read_profile(payload, storage).await,
            Function::Stream => self.app.stream(payload, storage).await,
        }?;
        Ok(reply)
    }

    fn table(&self) -> MutexGuard<'_, HashMap<EventType, String>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
