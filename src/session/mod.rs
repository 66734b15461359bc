use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the per-subscriber transition buffer
const EVENT_BUFFER: usize = 64;

/// Role claim carried by an authenticated principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Coaching staff, unrestricted access to every guarded route
    Tecnico,
    Monitor,
}

impl Role {
    pub fn is_full_access(&self) -> bool {
        matches!(self, Role::Tecnico)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Tecnico => "tecnico",
            Role::Monitor => "monitor",
        }
    }

    /// Parse a raw claim; unknown values mean "no role claim"
    pub fn from_claim(raw: Option<&str>) -> Option<Role> {
        raw.and_then(|value| value.parse().ok())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tecnico" => Ok(Role::Tecnico),
            "monitor" => Ok(Role::Monitor),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Authenticated identity as seen by guards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Option<Role>,
}

impl Principal {
    pub fn new(id: Uuid, role: Option<Role>) -> Self {
        Self { id, email: None, role }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "principal", rename_all = "lowercase")]
pub enum SessionState {
    /// The initial session check has not resolved yet
    Unsettled,
    Authenticated(Principal),
    Unauthenticated,
}

impl SessionState {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, SessionState::Unsettled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unsettled => "unsettled",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
        }
    }
}

/// Source of truth for the current session, observed by guards and background tasks
pub trait SessionStore: Send + Sync {
    fn current(&self) -> SessionState;

    /// Receive every subsequent transition, in the order it was published
    fn subscribe(&self) -> broadcast::Receiver<SessionState>;
}

/// Reacts to transitions inside the publishing call, before any later transition
/// or reader can observe the new state. Must not call back into the hub.
pub trait SessionObserver: Send + Sync {
    /// Called once with the state current at attach time
    fn attached(&self, _current: &SessionState) {}

    fn on_transition(&self, state: &SessionState);
}

/// In-process session store
pub struct SessionHub {
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionState>,
    observers: Mutex<Vec<Arc<dyn SessionObserver>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: RwLock::new(SessionState::Unsettled),
            events,
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn attach(&self, observer: Arc<dyn SessionObserver>) {
        // Held so no transition slips between sampling and registering
        let state = self.state.write();
        observer.attached(&state);
        self.observers.lock().push(observer);
    }

    /// Mark the session as being (re)checked
    pub fn begin_check(&self) {
        self.publish(SessionState::Unsettled);
    }

    /// Resolve a pending check
    pub fn settle(&self, principal: Option<Principal>) {
        match principal {
            Some(principal) => self.publish(SessionState::Authenticated(principal)),
            None => self.publish(SessionState::Unauthenticated),
        }
    }

    pub fn sign_in(&self, principal: Principal) {
        self.publish(SessionState::Authenticated(principal));
    }

    pub fn sign_out(&self) {
        self.publish(SessionState::Unauthenticated);
    }

    fn publish(&self, next: SessionState) {
        // Hold the write lock while sending so `current()` and the event stream agree on order
        let mut state = self.state.write();
        if *state == next {
            return;
        }

        tracing::debug!("Session transition: {} -> {}", state.label(), next.label());
        *state = next.clone();

        for observer in self.observers.lock().iter() {
            observer.on_transition(&next);
        }

        // No receivers is fine; observers may attach later and start from `current()`
        let _ = self.events.send(next);
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for SessionHub {
    fn current(&self) -> SessionState {
        self.state.read().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.events.subscribe()
    }
}

/// Wait for the next transition; a lagging subscriber resynchronises from the store.
/// Returns `None` once the store has been dropped.
pub async fn next_transition(
    store: &dyn SessionStore,
    events: &mut broadcast::Receiver<SessionState>,
) -> Option<SessionState> {
    match events.recv().await {
        Ok(state) => Some(state),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!("Session observer lagged by {} transitions, resynchronising", skipped);
            Some(store.current())
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}
