//! Navigation decisions derived from the session state.
//!
//! Guards are pure with respect to the session: they read a [`SessionState`]
//! snapshot and return what the caller should do. The only side effect is the
//! denial diagnostic, routed through an injectable [`DenialReporter`].

pub mod redirect;

use std::sync::Arc;

use serde::Serialize;

use crate::config::{GuardConfig, RouteConfig};
use crate::session::{Principal, Role, SessionState};

pub use redirect::{login_location, safe_return_path, Redirect};

/// Which principals a guarded route admits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    /// `None` admits any authenticated principal
    allowed: Option<Vec<Role>>,
    fallback: String,
}

impl AccessPolicy {
    pub fn authenticated() -> Self {
        Self {
            allowed: None,
            fallback: "/dashboard".to_string(),
        }
    }

    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: Some(roles.into_iter().collect()),
            fallback: "/dashboard".to_string(),
        }
    }

    pub fn from_config(guard: &GuardConfig, routes: &RouteConfig) -> Self {
        Self::roles(guard.default_roles.iter().copied()).with_fallback(routes.unauthorized.clone())
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn admits(&self, principal: &Principal) -> bool {
        let allowed = match &self.allowed {
            None => return true,
            Some(allowed) => allowed,
        };

        if allowed.is_empty() {
            return true;
        }

        match principal.role {
            Some(role) if role.is_full_access() => true,
            Some(role) => allowed.contains(&role),
            None => false,
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::roles([Role::Tecnico])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Session check still pending; show a loading indicator and do nothing else
    Loading,
    Render(Principal),
    Redirect(Redirect),
}

/// Access denial details handed to the diagnostic sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub principal: uuid::Uuid,
    pub role: Option<Role>,
    pub requested: String,
    pub redirect_to: String,
}

pub trait DenialReporter: Send + Sync {
    fn report(&self, denial: &Denial);
}

/// Emits denials as structured warnings
pub struct TracingReporter;

impl DenialReporter for TracingReporter {
    fn report(&self, denial: &Denial) {
        let role = denial.role.map(|r| r.as_str()).unwrap_or("none");
        tracing::warn!(
            role = role,
            principal = %denial.principal,
            requested = %denial.requested,
            redirect_to = %denial.redirect_to,
            "Access denied for role '{}', redirecting to {}",
            role,
            denial.redirect_to
        );
    }
}

/// Per-route access control
#[derive(Clone)]
pub struct AccessGuard {
    policy: AccessPolicy,
    login_path: String,
    reporter: Arc<dyn DenialReporter>,
}

impl AccessGuard {
    pub fn new(policy: AccessPolicy, login_path: impl Into<String>) -> Self {
        Self {
            policy,
            login_path: login_path.into(),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn DenialReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Decide what navigating to `requested` should do
    pub fn evaluate(&self, state: &SessionState, requested: &str) -> GuardOutcome {
        let principal = match state {
            SessionState::Unsettled => return GuardOutcome::Loading,
            SessionState::Unauthenticated => {
                return GuardOutcome::Redirect(Redirect::to_login(&self.login_path, requested));
            }
            SessionState::Authenticated(principal) => principal,
        };

        if self.policy.admits(principal) {
            return GuardOutcome::Render(principal.clone());
        }

        let denial = Denial {
            principal: principal.id,
            role: principal.role,
            requested: requested.to_string(),
            redirect_to: self.policy.fallback.clone(),
        };
        self.reporter.report(&denial);

        GuardOutcome::Redirect(Redirect::replace(self.policy.fallback.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Loading,
    Redirect(Redirect),
}

/// Entry-point routing: sends settled sessions to the dashboard or the login page.
/// Performs no role check.
#[derive(Debug, Clone)]
pub struct RedirectDispatcher {
    dashboard: String,
    login: String,
}

impl RedirectDispatcher {
    pub fn new(routes: &RouteConfig) -> Self {
        Self {
            dashboard: routes.dashboard.clone(),
            login: routes.login.clone(),
        }
    }

    pub fn dispatch(&self, state: &SessionState) -> DispatchOutcome {
        match state {
            SessionState::Unsettled => DispatchOutcome::Loading,
            SessionState::Authenticated(_) => DispatchOutcome::Redirect(Redirect::replace(self.dashboard.clone())),
            SessionState::Unauthenticated => DispatchOutcome::Redirect(Redirect::replace(self.login.clone())),
        }
    }
}
