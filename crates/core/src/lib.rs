//! Domain logic for the notification routing component.
//!
//! Everything in this crate is pure: no I/O, no database, no HTTP. The
//! routing engine in `nrc-events` and the API server build on these
//! primitives.

pub mod config;
pub mod delivery;
pub mod error;
pub mod filter;
pub mod permissions;
pub mod retry;
pub mod schema;
pub mod types;
