// handlers/mod.rs - three access tiers
//
// Public (no session) → Protected (any signed-in principal) → Elevated (role allow-list)
pub mod elevated;
pub mod protected;
pub mod public;
