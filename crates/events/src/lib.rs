//! Notification routing engine.
//!
//! This crate wires the pure rules from `nrc-core` to storage, the work
//! queue and outbound HTTP:
//!
//! - [`store`]: the data-access trait with Postgres and in-memory backends.
//! - [`SubscriptionIndex`]: per-channel cache of active subscriptions.
//! - [`PublishPipeline`]: validates, records and enqueues notifications.
//! - [`broker`]: the durable dispatch queue and its consumer stream.
//! - [`DeliveryDispatcher`]: fans notifications out to subscriber callbacks
//!   with retry and backoff.
//! - [`EventBus`]: in-process feed of delivery outcomes, consumed by
//!   [`DeliveryAlerts`].
//! - [`retention`]: periodic purge of settled notifications.

pub mod alerts;
pub mod broker;
pub mod bus;
pub mod delivery;
pub mod dispatch;
pub mod index;
pub mod publish;
pub mod retention;
pub mod store;

pub use alerts::DeliveryAlerts;
pub use broker::{Broker, BrokerError, ClaimedJob, DispatchJob};
pub use bus::{DeliveryEvent, EventBus};
pub use delivery::webhook::{DeliveryError, WebhookDelivery};
pub use dispatch::DeliveryDispatcher;
pub use index::SubscriptionIndex;
pub use publish::{PublishPipeline, RoutingError};
pub use store::{NotificationStore, StoreError};
