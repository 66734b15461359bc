pub mod pages;

pub use pages::{meetings, settings};
