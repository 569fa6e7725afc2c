//! Request handlers.
//!
//! Each submodule provides the async handler functions for one resource.
//! Handlers authenticate through [`AuthClient`](crate::middleware::auth::AuthClient),
//! run the capability check, and delegate to the store or the publish
//! pipeline, mapping errors via [`AppError`](crate::error::AppError).

pub mod channel;
pub mod delivery;
pub mod notification;
pub mod subscription;
