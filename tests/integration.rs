//! Cross-crate integration suite, run against a local mock server.
//!
//!   cargo test --test integration

#[path = "integration/common.rs"]
mod common;
#[path = "integration/auth.rs"]
mod auth;
#[path = "integration/events.rs"]
mod events;
#[path = "integration/pagination.rs"]
mod pagination;
