use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub routes: RouteConfig,
    pub guard: GuardConfig,
    pub sync: SyncConfig,
    pub backend: BackendConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

/// Well-known navigation targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub login: String,
    pub dashboard: String,
    /// Where denied principals are sent
    pub unauthorized: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Allow-list used by role-protected routes
    pub default_roles: Vec<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub interval_secs: u64,
    pub notify_failures: bool,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5 * 60,
            notify_failures: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub notification_capacity: usize,
}

impl StorageConfig {
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("PORTAL_BIND") {
            self.server.bind = v;
        }
        if let Ok(v) = env::var("PORTAL_PORT").or_else(|_| env::var("PORT")) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("PORTAL_ENABLE_CORS") {
            self.server.enable_cors = v.parse().unwrap_or(self.server.enable_cors);
        }
        if let Ok(v) = env::var("PORTAL_CORS_ORIGINS") {
            self.server.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Route overrides
        if let Ok(v) = env::var("ROUTES_LOGIN") {
            self.routes.login = v;
        }
        if let Ok(v) = env::var("ROUTES_DASHBOARD") {
            self.routes.dashboard = v;
        }
        if let Ok(v) = env::var("ROUTES_UNAUTHORIZED") {
            self.routes.unauthorized = v;
        }

        // Guard overrides
        if let Ok(v) = env::var("GUARD_DEFAULT_ROLES") {
            let roles: Vec<Role> = v.split(',').filter_map(|s| s.parse().ok()).collect();
            if !roles.is_empty() {
                self.guard.default_roles = roles;
            }
        }

        // Sync overrides
        if let Ok(v) = env::var("SYNC_INTERVAL_SECS") {
            self.sync.interval_secs = v.parse().unwrap_or(self.sync.interval_secs);
        }
        if let Ok(v) = env::var("SYNC_NOTIFY_FAILURES") {
            self.sync.notify_failures = v.parse().unwrap_or(self.sync.notify_failures);
        }

        // Backend overrides
        if let Ok(v) = env::var("BACKEND_URL") {
            self.backend.url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("BACKEND_ANON_KEY") {
            self.backend.anon_key = v;
        }
        if let Ok(v) = env::var("BACKEND_JWT_SECRET") {
            self.backend.jwt_secret = v;
        }
        if let Ok(v) = env::var("BACKEND_REQUEST_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = v.parse().unwrap_or(self.backend.request_timeout_secs);
        }

        // Storage overrides
        if let Ok(v) = env::var("PORTAL_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("PORTAL_NOTIFICATION_CAPACITY") {
            self.storage.notification_capacity = v.parse().unwrap_or(self.storage.notification_capacity);
        }

        self
    }

    fn shared_routes() -> RouteConfig {
        RouteConfig {
            login: "/login".to_string(),
            dashboard: "/dashboard".to_string(),
            unauthorized: "/dashboard".to_string(),
        }
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                bind: "127.0.0.1".to_string(),
                port: 3000,
                enable_cors: true,
                cors_origins: vec!["http://localhost:5173".to_string()],
            },
            routes: Self::shared_routes(),
            guard: GuardConfig {
                default_roles: vec![Role::Tecnico],
            },
            sync: SyncConfig::default(),
            backend: BackendConfig {
                url: "http://localhost:54321".to_string(),
                anon_key: String::new(),
                jwt_secret: "development-secret".to_string(),
                request_timeout_secs: 30,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from(".team-portal"),
                notification_capacity: 50,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                bind: "127.0.0.1".to_string(),
                port: 8080,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            routes: Self::shared_routes(),
            guard: GuardConfig {
                default_roles: vec![Role::Tecnico],
            },
            sync: SyncConfig::default(),
            backend: BackendConfig {
                url: String::new(),
                anon_key: String::new(),
                jwt_secret: String::new(),
                request_timeout_secs: 15,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("/var/lib/team-portal"),
                notification_capacity: 50,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                bind: "127.0.0.1".to_string(),
                port: 8080,
                enable_cors: false,
                cors_origins: Vec::new(),
            },
            routes: Self::shared_routes(),
            guard: GuardConfig {
                default_roles: vec![Role::Tecnico],
            },
            sync: SyncConfig {
                interval_secs: 5 * 60,
                notify_failures: false,
            },
            backend: BackendConfig {
                url: String::new(),
                anon_key: String::new(),
                jwt_secret: String::new(),
                request_timeout_secs: 10,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("/var/lib/team-portal"),
                notification_capacity: 20,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
