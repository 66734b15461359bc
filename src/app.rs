use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{AuthBackend, SessionManager};
use crate::config::AppConfig;
use crate::guard::{AccessGuard, AccessPolicy, DenialReporter, TracingReporter};
use crate::handlers;
use crate::middleware::{route_guard_middleware, GuardMode, RouteGuard};
use crate::persistence::{attach_route_observer, KeyValueStore, RoutePersistence};
use crate::remote::RemoteClient;
use crate::session::{SessionHub, SessionStore};
use crate::sync::{CacheReconciler, LocalCache, NotificationFeed, RemoteStore, SyncHandle, SyncLoop};

/// Everything the handlers share. One instance per client profile.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionHub>,
    pub manager: Arc<SessionManager>,
    pub routes: RoutePersistence,
    pub cache: Arc<LocalCache>,
    pub notifications: Arc<NotificationFeed>,
    pub sync: Arc<SyncHandle>,
    pub reporter: Arc<dyn DenialReporter>,
    pub backend: Option<RemoteClient>,
}

/// External collaborators the portal is assembled from
pub struct Services {
    pub store: Arc<dyn KeyValueStore>,
    pub auth: Arc<dyn AuthBackend>,
    pub remote: Arc<dyn RemoteStore>,
    /// Probed by `/health` when present
    pub backend: Option<RemoteClient>,
    pub reporter: Arc<dyn DenialReporter>,
}

impl Services {
    /// Wire every collaborator to the hosted backend client
    pub fn remote(store: Arc<dyn KeyValueStore>, client: RemoteClient) -> Self {
        Self {
            store,
            auth: Arc::new(client.clone()),
            remote: Arc::new(client.clone()),
            backend: Some(client),
            reporter: Arc::new(TracingReporter),
        }
    }
}

impl AppState {
    /// Start the session observers and the sync loop. Must run inside a tokio runtime.
    pub fn start(config: AppConfig, services: Services) -> Self {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionHub::new());

        let manager = Arc::new(SessionManager::new(
            sessions.clone(),
            services.auth,
            services.store.clone(),
            config.backend.jwt_secret.clone(),
        ));

        let routes = RoutePersistence::new(services.store.clone());
        attach_route_observer(&sessions, routes.clone());

        let cache = Arc::new(LocalCache::new(services.store));
        let notifications = Arc::new(NotificationFeed::new(config.storage.notification_capacity));
        let reconciler = Arc::new(CacheReconciler::new(cache.clone(), services.remote, manager.clone()));
        let sync = SyncLoop::spawn(sessions.clone(), reconciler, notifications.clone(), &config.sync);

        Self {
            config,
            sessions,
            manager,
            routes,
            cache,
            notifications,
            sync: Arc::new(sync),
            reporter: services.reporter,
            backend: services.backend,
        }
    }

    fn route_guard(&self, policy: AccessPolicy, mode: GuardMode) -> RouteGuard {
        let sessions: Arc<dyn SessionStore> = self.sessions.clone();
        RouteGuard {
            guard: AccessGuard::new(policy, self.config.routes.login.clone()).with_reporter(self.reporter.clone()),
            sessions,
            persistence: self.routes.clone(),
            mode,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let router = Router::new()
        // Public
        .merge(public_routes())
        // Any signed-in principal
        .merge(page_routes(&state))
        .merge(api_routes(&state))
        // Role allow-list
        .merge(elevated_routes(&state))
        .layer(TraceLayer::new_for_http());

    let router = if state.config.server.enable_cors {
        router.layer(cors_layer(&state.config.server.cors_origins))
    } else {
        router
    };

    router.with_state(state)
}

fn public_routes() -> Router<AppState> {
    use handlers::public;

    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/login", get(public::login_page))
        .route("/auth/login", post(public::login_post))
        .route("/auth/logout", post(public::logout_post))
}

fn page_routes(state: &AppState) -> Router<AppState> {
    use handlers::protected;

    let fallback = state.config.routes.unauthorized.clone();
    let guard = state.route_guard(AccessPolicy::authenticated().with_fallback(fallback), GuardMode::Page);

    Router::new()
        .route("/dashboard", get(protected::dashboard))
        .route("/athletes", get(protected::athletes))
        .route("/attendance", get(protected::attendance))
        .route("/rankings", get(protected::rankings))
        .route_layer(from_fn_with_state(guard, route_guard_middleware))
}

fn api_routes(state: &AppState) -> Router<AppState> {
    use handlers::protected;

    let guard = state.route_guard(AccessPolicy::authenticated(), GuardMode::Api);

    Router::new()
        .route("/api/session", get(protected::session_get))
        .route("/api/sync", get(protected::sync_get).post(protected::sync_post))
        .route("/api/offline/:table", post(protected::offline_post))
        .route("/api/notifications", get(protected::notifications_get))
        .route_layer(from_fn_with_state(guard, route_guard_middleware))
}

fn elevated_routes(state: &AppState) -> Router<AppState> {
    use handlers::elevated;

    let policy = AccessPolicy::from_config(&state.config.guard, &state.config.routes);
    let guard = state.route_guard(policy, GuardMode::Page);

    Router::new()
        .route("/meetings", get(elevated::meetings))
        .route("/settings", get(elevated::settings))
        .route_layer(from_fn_with_state(guard, route_guard_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<_> = origins.iter().filter_map(|origin| origin.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}
