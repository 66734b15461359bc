pub mod guard;
pub mod response;

pub use guard::{route_guard_middleware, GuardMode, RouteGuard};
pub use response::{ApiResponse, ApiResult};
