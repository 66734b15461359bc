pub mod auth;
pub mod entry;

pub use auth::{login_post, logout_post};
pub use entry::{health, login_page, root};
