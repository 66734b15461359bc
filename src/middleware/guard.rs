use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::response;
use crate::error::ApiError;
use crate::guard::{AccessGuard, GuardOutcome};
use crate::persistence::RoutePersistence;
use crate::session::SessionStore;

/// How guard decisions are rendered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardMode {
    /// Navigable pages: redirects, and visits are recorded for restore
    Page,
    /// JSON endpoints: a missing session is a 401, nothing is recorded
    Api,
}

/// State for one guarded route group
#[derive(Clone)]
pub struct RouteGuard {
    pub guard: AccessGuard,
    pub sessions: Arc<dyn SessionStore>,
    pub persistence: RoutePersistence,
    pub mode: GuardMode,
}

/// Applies the access guard to every request of the group and injects the `Principal`
pub async fn route_guard_middleware(
    State(route_guard): State<RouteGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let requested = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let session = route_guard.sessions.current();

    match route_guard.guard.evaluate(&session, &requested) {
        GuardOutcome::Loading => response::loading(),
        GuardOutcome::Redirect(redirect) => match route_guard.mode {
            GuardMode::Page => response::redirect(&redirect),
            GuardMode::Api if session.principal().is_none() => {
                ApiError::unauthorized("Sign in required").into_response()
            }
            GuardMode::Api => ApiError::forbidden("Access denied for this role").into_response(),
        },
        GuardOutcome::Render(principal) => {
            if route_guard.mode == GuardMode::Page && request.method() == Method::GET {
                route_guard.persistence.record_current_route(&requested, &principal);
            }

            tracing::trace!("Access granted to {} for {}", requested, principal.id);
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
    }
}
