//! Authentication primitives.
//!
//! - [`jwt`] -- HS256 client tokens carrying a client id and scopes.

pub mod jwt;
