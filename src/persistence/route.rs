use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{KeyValueStore, StorageError};
use crate::session::{Principal, SessionHub, SessionObserver, SessionState};

const ROUTE_KEY: &str = "route.last";

/// Last authenticated route visited in this profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRoute {
    pub path: String,
    pub principal: Uuid,
    pub recorded_at: DateTime<Utc>,
}

/// Sole writer of the persisted route record. Storage failures never reach callers.
#[derive(Clone)]
pub struct RoutePersistence {
    store: Arc<dyn KeyValueStore>,
}

impl RoutePersistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn record_current_route(&self, path: &str, principal: &Principal) {
        if let Err(e) = self.try_record(path, principal) {
            tracing::warn!("Failed to persist route '{}': {}", path, e);
        }
    }

    pub fn clear_persisted_route(&self) {
        match self.store.remove(ROUTE_KEY) {
            Ok(()) => tracing::debug!("Persisted route cleared"),
            Err(e) => tracing::warn!("Failed to clear persisted route: {}", e),
        }
    }

    pub fn persisted_route(&self) -> Option<PersistedRoute> {
        match self.try_load() {
            Ok(route) => route,
            Err(e) => {
                tracing::warn!("Failed to read persisted route: {}", e);
                None
            }
        }
    }

    /// Persisted path, only if it was recorded for this principal
    pub fn restore_for(&self, principal: &Principal) -> Option<String> {
        self.persisted_route()
            .filter(|route| route.principal == principal.id)
            .map(|route| route.path)
    }

    fn try_record(&self, path: &str, principal: &Principal) -> Result<(), StorageError> {
        if let Some(existing) = self.try_load()? {
            if existing.path == path && existing.principal == principal.id {
                return Ok(());
            }
        }

        let route = PersistedRoute {
            path: path.to_string(),
            principal: principal.id,
            recorded_at: Utc::now(),
        };
        self.store.set(ROUTE_KEY, serde_json::to_value(&route)?)?;
        tracing::trace!("Recorded route {}", path);
        Ok(())
    }

    fn try_load(&self) -> Result<Option<PersistedRoute>, StorageError> {
        match self.store.get(ROUTE_KEY)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

/// Decides when a session transition must wipe the persisted route
#[derive(Debug, Default)]
pub struct RouteObserver {
    /// Principal of the last settled authenticated state
    signed_in: Option<Uuid>,
}

impl RouteObserver {
    pub fn starting_from(state: &SessionState) -> Self {
        Self {
            signed_in: state.principal().map(|p| p.id),
        }
    }

    /// Returns true when the record has to be cleared
    pub fn observe(&mut self, state: &SessionState) -> bool {
        match state {
            // A reload's transient check must not wipe a valid record
            SessionState::Unsettled => false,
            SessionState::Authenticated(principal) => {
                let switched = matches!(self.signed_in, Some(previous) if previous != principal.id);
                self.signed_in = Some(principal.id);
                switched
            }
            SessionState::Unauthenticated => self.signed_in.take().is_some(),
        }
    }
}

/// Clears the persisted route inside the publishing transition
struct ClearOnLogout {
    observer: Mutex<RouteObserver>,
    persistence: RoutePersistence,
}

impl SessionObserver for ClearOnLogout {
    fn attached(&self, current: &SessionState) {
        *self.observer.lock() = RouteObserver::starting_from(current);
    }

    fn on_transition(&self, state: &SessionState) {
        if self.observer.lock().observe(state) {
            tracing::info!("Session ended, clearing persisted route");
            self.persistence.clear_persisted_route();
        }
    }
}

/// Attach the route observer to the session lifecycle
pub fn attach_route_observer(hub: &SessionHub, persistence: RoutePersistence) {
    hub.attach(Arc::new(ClearOnLogout {
        observer: Mutex::new(RouteObserver::default()),
        persistence,
    }));
}
