//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod channel_repo;
pub mod delivery_attempt_repo;
pub mod dispatch_job_repo;
pub mod notification_repo;
pub mod subscription_repo;

pub use channel_repo::ChannelRepo;
pub use delivery_attempt_repo::DeliveryAttemptRepo;
pub use dispatch_job_repo::DispatchJobRepo;
pub use notification_repo::NotificationRepo;
pub use subscription_repo::SubscriptionRepo;
