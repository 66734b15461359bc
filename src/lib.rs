pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod middleware;
pub mod persistence;
pub mod remote;
pub mod session;
pub mod sync;
