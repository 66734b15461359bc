pub mod pages;
pub mod session;
pub mod sync;

pub use pages::{athletes, attendance, dashboard, rankings};
pub use session::session_get;
pub use sync::{notifications_get, offline_post, sync_get, sync_post};
