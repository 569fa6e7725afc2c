//! Per-channel cache of active subscriptions.
//!
//! Each channel has its own partition behind its own `RwLock`; the outer
//! map is locked only long enough to find or create a partition, so a
//! reload or mutation on one channel never blocks lookups on another.
//!
//! A partition remembers when it was last loaded from the store. Lookups
//! on a partition older than the staleness window reload it, which is how
//! worker processes pick up subscription changes made through the API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nrc_core::types::EntityId;
use nrc_db::models::subscription::Subscription;
use tokio::sync::RwLock;

use crate::store::{NotificationStore, StoreError};

#[derive(Default)]
struct Partition {
    subscriptions: HashMap<EntityId, Subscription>,
    loaded_at: Option<Instant>,
}

impl Partition {
    fn is_fresh(&self, staleness: Duration) -> bool {
        self.loaded_at
            .is_some_and(|loaded| loaded.elapsed() < staleness)
    }

    fn ordered(&self) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self.subscriptions.values().cloned().collect();
        subs.sort_by_key(|s| (s.created_at, s.id));
        subs
    }
}

pub struct SubscriptionIndex {
    store: Arc<dyn NotificationStore>,
    staleness: Duration,
    partitions: RwLock<HashMap<String, Arc<RwLock<Partition>>>>,
    /// subscription id -> channel name
    channels: RwLock<HashMap<EntityId, String>>,
}

impl SubscriptionIndex {
    pub fn new(store: Arc<dyn NotificationStore>, staleness: Duration) -> Self {
        Self {
            store,
            staleness,
            partitions: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }
    }

    async fn partition(&self, channel: &str) -> Arc<RwLock<Partition>> {
        if let Some(partition) = self.partitions.read().await.get(channel) {
            return Arc::clone(partition);
        }
        let mut partitions = self.partitions.write().await;
        Arc::clone(partitions.entry(channel.to_string()).or_default())
    }

    /// Active subscriptions of `channel`, ordered by creation time then id.
    pub async fn subscriptions_for(&self, channel: &str) -> Result<Vec<Subscription>, StoreError> {
        let partition = self.partition(channel).await;

        {
            let current = partition.read().await;
            if current.is_fresh(self.staleness) {
                return Ok(current.ordered());
            }
        }

        let mut current = partition.write().await;
        // Another task may have reloaded while we waited for the lock.
        if !current.is_fresh(self.staleness) {
            let loaded = self.store.get_subscriptions_by_channel(channel).await?;
            let mut channels = self.channels.write().await;
            for id in current.subscriptions.keys() {
                channels.remove(id);
            }
            current.subscriptions = loaded
                .into_iter()
                .map(|s| {
                    channels.insert(s.id, s.channel.clone());
                    (s.id, s)
                })
                .collect();
            current.loaded_at = Some(Instant::now());
            tracing::debug!(
                channel,
                count = current.subscriptions.len(),
                "Subscription index partition reloaded"
            );
        }
        Ok(current.ordered())
    }

    /// Insert a newly created subscription.
    pub async fn add(&self, subscription: Subscription) {
        let partition = self.partition(&subscription.channel).await;
        let mut current = partition.write().await;
        self.channels
            .write()
            .await
            .insert(subscription.id, subscription.channel.clone());
        current.subscriptions.insert(subscription.id, subscription);
    }

    /// Replace the cached copy of an updated subscription.
    pub async fn update(&self, subscription: Subscription) {
        self.add(subscription).await;
    }

    /// Stop matching a subscription. Returns the cached copy, if any.
    pub async fn remove(&self, id: EntityId) -> Option<Subscription> {
        let channel = self.channels.read().await.get(&id).cloned()?;
        let partition = self.partition(&channel).await;
        let mut current = partition.write().await;
        self.channels.write().await.remove(&id);
        current.subscriptions.remove(&id)
    }

    /// Force the next lookup of `channel` to reload from the store.
    pub async fn invalidate(&self, channel: &str) {
        let partition = self.partition(channel).await;
        partition.write().await.loaded_at = None;
    }
}
