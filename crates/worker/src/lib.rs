//! Background delivery services.
//!
//! The dispatcher, the failure alerts and the retention job run together
//! under one cancellation token. The standalone `nrc-worker` binary uses
//! this crate directly; the API server uses it when the dispatcher is
//! embedded in the same process.

pub mod config;
pub mod services;
pub mod shutdown;
pub mod telemetry;

pub use config::WorkerConfig;
pub use services::BackgroundServices;
