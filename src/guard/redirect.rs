use serde::Serialize;
use url::form_urlencoded;

/// Navigation instruction produced by guards
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub location: String,
    /// Replace the current history entry instead of pushing a new one
    pub replace: bool,
    /// Originally requested path, returned to after login
    pub preserve_origin: Option<String>,
}

impl Redirect {
    pub fn replace(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            replace: true,
            preserve_origin: None,
        }
    }

    pub fn to_login(login_path: &str, requested: &str) -> Self {
        let origin = safe_return_path(requested);
        Self {
            location: login_location(login_path, origin),
            replace: true,
            preserve_origin: origin.map(str::to_string),
        }
    }
}

/// Login route with the return target carried in the `redirect` query parameter
pub fn login_location(login_path: &str, return_to: Option<&str>) -> String {
    match return_to {
        Some(path) => {
            let encoded: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
            format!("{}?redirect={}", login_path, encoded)
        }
        None => login_path.to_string(),
    }
}

/// Accept only same-origin absolute paths as post-login targets
pub fn safe_return_path(candidate: &str) -> Option<&str> {
    let candidate = candidate.trim();
    let is_local = candidate.starts_with('/')
        && !candidate.starts_with("//")
        && !candidate.starts_with("/\\")
        && !candidate.contains("://");

    is_local.then_some(candidate)
}
