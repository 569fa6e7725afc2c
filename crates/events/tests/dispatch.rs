//! End-to-end dispatcher tests against a real HTTP callback server.
//!
//! Covers:
//! - Failure isolation between subscriptions of one notification
//! - Attempts surviving subscription deletion
//! - Duplicate dispatch jobs being no-ops
//! - Terminal 4xx outcomes and their bus events
//! - Redirects being terminal, not followed
//! - Per-attempt timeouts being retryable
//! - The full publish -> consume -> deliver loop

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nrc_core::config::DispatchConfig;
use nrc_core::delivery::DeliveryStatus;
use nrc_core::filter::FilterGroup;
use nrc_db::models::channel::NewChannel;
use nrc_db::models::notification::{Notification, PublishNotification};
use nrc_db::models::subscription::{NewSubscription, Subscription};
use nrc_events::broker::{Broker, ClaimedJob, DispatchJob, MemoryBroker};
use nrc_events::bus::EVENT_DELIVERY_FAILED;
use nrc_events::store::{MemoryStore, NotificationStore};
use nrc_events::{DeliveryDispatcher, EventBus, PublishPipeline, SubscriptionIndex};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Callback server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Received {
    endpoint: String,
    headers: HeaderMap,
    body: serde_json::Value,
}

/// How an endpoint answers a callback.
#[derive(Debug, Clone)]
enum Reply {
    Status(StatusCode),
    /// 303 to the given path.
    SeeOther(String),
    /// Answer 204, but only after the delay.
    Stall(Duration),
}

#[derive(Clone, Default)]
struct Consumer {
    received: Arc<Mutex<Vec<Received>>>,
    /// endpoint -> reply (default 204)
    responses: Arc<Mutex<HashMap<String, Reply>>>,
    landing_hits: Arc<Mutex<usize>>,
}

impl Consumer {
    fn reply(&self, endpoint: &str, reply: Reply) {
        self.responses
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), reply);
    }

    fn respond(&self, endpoint: &str, status: StatusCode) {
        self.reply(endpoint, Reply::Status(status));
    }

    fn hits(&self, endpoint: &str) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .count()
    }

    fn last(&self, endpoint: &str) -> Option<Received> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.endpoint == endpoint)
            .cloned()
    }
}

async fn hook(
    State(consumer): State<Consumer>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let reply = consumer
        .responses
        .lock()
        .unwrap()
        .get(&endpoint)
        .cloned()
        .unwrap_or(Reply::Status(StatusCode::NO_CONTENT));
    consumer.received.lock().unwrap().push(Received {
        endpoint,
        headers,
        body,
    });
    match reply {
        Reply::Status(status) => status.into_response(),
        Reply::SeeOther(location) => Redirect::to(&location).into_response(),
        Reply::Stall(delay) => {
            tokio::time::sleep(delay).await;
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

async fn landing(State(consumer): State<Consumer>) -> StatusCode {
    *consumer.landing_hits.lock().unwrap() += 1;
    StatusCode::OK
}

async fn start_consumer() -> (Consumer, SocketAddr) {
    let consumer = Consumer::default();
    let app = Router::new()
        .route("/hooks/{endpoint}", post(hook))
        .route("/landing", get(landing).post(landing))
        .with_state(consumer.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (consumer, addr)
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<MemoryStore>,
    broker: Arc<MemoryBroker>,
    index: Arc<SubscriptionIndex>,
    events: Arc<EventBus>,
    pipeline: PublishPipeline,
    dispatcher: DeliveryDispatcher,
    consumer: Consumer,
    addr: SocketAddr,
}

fn test_config() -> DispatchConfig {
    DispatchConfig {
        max_delivery_attempts: 3,
        backoff_base_ms: 10,
        backoff_cap_ms: 40,
        delivery_timeout_ms: 2_000,
        dispatch_concurrency: 2,
        poll_interval_ms: 10,
        retry_scan_interval_ms: 20,
        index_staleness_ms: 60_000,
        ..DispatchConfig::default()
    }
}

async fn harness() -> Harness {
    harness_with(test_config()).await
}

async fn harness_with(config: DispatchConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(MemoryBroker::new(config.delivery_lease()));
    let index = Arc::new(SubscriptionIndex::new(store.clone(), config.index_staleness()));
    let events = Arc::new(EventBus::default());
    let pipeline = PublishPipeline::new(store.clone(), broker.clone());
    let dispatcher = DeliveryDispatcher::new(
        store.clone(),
        index.clone(),
        broker.clone(),
        events.clone(),
        config,
    )
    .unwrap();
    let (consumer, addr) = start_consumer().await;

    store
        .create_channel(NewChannel {
            name: "zaken".into(),
            filters: vec!["kind".into(), "region".into()],
            documentation_url: None,
            owner: "zrc".into(),
        })
        .await
        .unwrap();

    Harness {
        store,
        broker,
        index,
        events,
        pipeline,
        dispatcher,
        consumer,
        addr,
    }
}

impl Harness {
    async fn subscribe(&self, endpoint: &str, filters: Vec<FilterGroup>) -> Subscription {
        let subscription = self
            .store
            .create_subscription(NewSubscription {
                channel: "zaken".into(),
                callback_url: format!("http://{}/hooks/{endpoint}", self.addr),
                auth: Some(format!("Bearer {endpoint}")),
                filters,
                owner: "drc".into(),
            })
            .await
            .unwrap();
        self.index.add(subscription.clone()).await;
        subscription
    }

    async fn publish(&self, attrs: &[(&str, &str)]) -> Notification {
        self.pipeline
            .publish(PublishNotification {
                channel: "zaken".into(),
                attrs: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                resource_url: "https://zrc.test/zaken/1".into(),
            })
            .await
            .unwrap()
    }

    async fn claim(&self) -> ClaimedJob {
        self.broker.claim().await.unwrap().unwrap()
    }

    async fn status_of(&self, notification: &Notification, sub: &Subscription) -> DeliveryStatus {
        self.store
            .list_delivery_attempts(notification.id)
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.subscription_id == sub.id)
            .map(|a| a.status)
            .unwrap()
    }
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn group(pairs: &[(&str, &str)]) -> FilterGroup {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_subscriber_does_not_affect_others() {
    let h = harness().await;
    let first = h.subscribe("one", vec![]).await;
    let broken = h.subscribe("two", vec![]).await;
    let third = h.subscribe("three", vec![]).await;
    h.consumer.respond("two", StatusCode::INTERNAL_SERVER_ERROR);

    let notification = h.publish(&[("kind", "created")]).await;
    h.dispatcher.handle_job(h.claim().await).await;

    assert_eq!(h.status_of(&notification, &first).await, DeliveryStatus::Delivered);
    assert_eq!(h.status_of(&notification, &third).await, DeliveryStatus::Delivered);
    assert_eq!(
        h.status_of(&notification, &broken).await,
        DeliveryStatus::FailedRetryable
    );

    // Let the retry scan exhaust the attempt cap.
    let (hr, n, b) = (&h, &notification, &broken);
    wait_until(move || async move {
        hr.dispatcher.retry_due().await.unwrap();
        hr.status_of(n, b).await == DeliveryStatus::FailedTerminal
    })
    .await;

    assert_eq!(h.consumer.hits("one"), 1);
    assert_eq!(h.consumer.hits("two"), 3);
    assert_eq!(h.consumer.hits("three"), 1);

    let attempts = h.store.list_delivery_attempts(notification.id).await.unwrap();
    let failed = attempts.iter().find(|a| a.subscription_id == broken.id).unwrap();
    assert_eq!(failed.attempt_count, 3);
    assert_eq!(failed.last_status_code, Some(500));
}

#[tokio::test]
async fn only_matching_subscriptions_receive() {
    let h = harness().await;
    h.subscribe("created", vec![group(&[("kind", "created")])]).await;
    h.subscribe("north", vec![group(&[("region", "north")])]).await;
    h.subscribe("all", vec![]).await;

    h.publish(&[("kind", "created"), ("region", "south")]).await;
    h.dispatcher.handle_job(h.claim().await).await;

    assert_eq!(h.consumer.hits("created"), 1);
    assert_eq!(h.consumer.hits("north"), 0);
    assert_eq!(h.consumer.hits("all"), 1);
}

#[tokio::test]
async fn callback_receives_document_and_headers() {
    let h = harness().await;
    let sub = h.subscribe("one", vec![]).await;
    let notification = h.publish(&[("kind", "created")]).await;
    h.dispatcher.handle_job(h.claim().await).await;

    let received = h.consumer.last("one").unwrap();
    assert_eq!(received.body["id"], notification.id.to_string());
    assert_eq!(received.body["channel"], "zaken");
    assert_eq!(received.body["attrs"]["kind"], "created");
    assert_eq!(received.body["resourceUrl"], "https://zrc.test/zaken/1");
    assert_eq!(received.headers["authorization"], "Bearer one");
    assert_eq!(
        received.headers["x-nrc-notification-id"],
        notification.id.to_string().as_str()
    );
    assert_eq!(
        received.headers["x-nrc-subscription-id"],
        sub.id.to_string().as_str()
    );
}

#[tokio::test]
async fn deleted_subscription_still_gets_recorded_attempt() {
    let h = harness().await;
    let sub = h.subscribe("one", vec![]).await;
    let notification = h.publish(&[]).await;

    let (notification_doc, attempts) = h
        .dispatcher
        .dispatch(notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempts.len(), 1);

    h.store.delete_subscription(sub.id).await.unwrap();
    h.index.remove(sub.id).await;

    let settled = h
        .dispatcher
        .deliver_attempt(&notification_doc, attempts[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, DeliveryStatus::Delivered);
    assert_eq!(h.consumer.hits("one"), 1);

    // Future notifications no longer match it.
    h.publish(&[]).await;
    h.dispatcher.handle_job(h.claim().await).await;
    assert_eq!(h.consumer.hits("one"), 1);
}

#[tokio::test]
async fn duplicate_job_is_a_no_op() {
    let h = harness().await;
    let sub = h.subscribe("one", vec![]).await;
    let notification = h.publish(&[]).await;

    h.dispatcher.handle_job(h.claim().await).await;
    assert_eq!(h.status_of(&notification, &sub).await, DeliveryStatus::Delivered);

    // The same job delivered again, as after a lost ack.
    h.broker
        .enqueue(DispatchJob {
            notification_id: notification.id,
        })
        .await
        .unwrap();
    h.dispatcher.handle_job(h.claim().await).await;

    assert_eq!(h.consumer.hits("one"), 1);
    let attempts = h.store.list_delivery_attempts(notification.id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].attempt_count, 1);
    assert_eq!(attempts[0].status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn client_error_is_terminal_and_reported() {
    let h = harness().await;
    let sub = h.subscribe("gone", vec![]).await;
    h.consumer.respond("gone", StatusCode::GONE);
    let mut events = h.events.subscribe();

    let notification = h.publish(&[]).await;
    h.dispatcher.handle_job(h.claim().await).await;

    assert_eq!(
        h.status_of(&notification, &sub).await,
        DeliveryStatus::FailedTerminal
    );
    assert_eq!(h.consumer.hits("gone"), 1);

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, EVENT_DELIVERY_FAILED);
    assert_eq!(event.subscription_id, sub.id);
    assert_eq!(event.status_code, Some(410));

    // Terminal attempts are not picked up by the retry scan.
    assert_eq!(h.dispatcher.retry_due().await.unwrap(), 0);
}

#[tokio::test]
async fn too_many_requests_is_retried() {
    let h = harness().await;
    let sub = h.subscribe("busy", vec![]).await;
    h.consumer.respond("busy", StatusCode::TOO_MANY_REQUESTS);

    let notification = h.publish(&[]).await;
    h.dispatcher.handle_job(h.claim().await).await;
    assert_eq!(
        h.status_of(&notification, &sub).await,
        DeliveryStatus::FailedRetryable
    );

    h.consumer.respond("busy", StatusCode::OK);
    let (hr, n, s) = (&h, &notification, &sub);
    wait_until(move || async move {
        hr.dispatcher.retry_due().await.unwrap();
        hr.status_of(n, s).await == DeliveryStatus::Delivered
    })
    .await;
    assert_eq!(h.consumer.hits("busy"), 2);
}

#[tokio::test]
async fn unknown_notification_job_is_acknowledged() {
    let h = harness().await;
    h.broker
        .enqueue(DispatchJob {
            notification_id: uuid::Uuid::now_v7(),
        })
        .await
        .unwrap();
    h.dispatcher.handle_job(h.claim().await).await;
    assert!(h.broker.is_empty().await);
}

#[tokio::test]
async fn run_loop_delivers_published_notifications() {
    let h = harness().await;
    let sub = h.subscribe("one", vec![]).await;

    let cancel = CancellationToken::new();
    let running = tokio::spawn(h.dispatcher.clone().run(cancel.clone()));

    let notification = h.publish(&[("kind", "created")]).await;
    let (hr, n, s) = (&h, &notification, &sub);
    wait_until(move || async move { hr.consumer.hits("one") == 1 }).await;
    wait_until(move || async move { hr.status_of(n, s).await == DeliveryStatus::Delivered }).await;
    assert!(h.broker.is_empty().await);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn redirect_is_terminal_and_not_followed() {
    let h = harness().await;
    let sub = h.subscribe("moved", vec![]).await;
    h.consumer.reply("moved", Reply::SeeOther("/landing".into()));

    let notification = h.publish(&[]).await;
    h.dispatcher.handle_job(h.claim().await).await;

    assert_eq!(
        h.status_of(&notification, &sub).await,
        DeliveryStatus::FailedTerminal
    );
    assert_eq!(h.consumer.hits("moved"), 1);
    assert_eq!(*h.consumer.landing_hits.lock().unwrap(), 0);

    let attempts = h.store.list_delivery_attempts(notification.id).await.unwrap();
    assert_eq!(attempts[0].last_status_code, Some(303));
}

#[tokio::test]
async fn slow_callback_times_out_and_is_retryable() {
    let h = harness_with(DispatchConfig {
        delivery_timeout_ms: 200,
        ..test_config()
    })
    .await;
    let sub = h.subscribe("slow", vec![]).await;
    h.consumer.reply("slow", Reply::Stall(Duration::from_secs(2)));

    let notification = h.publish(&[]).await;
    h.dispatcher.handle_job(h.claim().await).await;

    assert_eq!(
        h.status_of(&notification, &sub).await,
        DeliveryStatus::FailedRetryable
    );
    let attempts = h.store.list_delivery_attempts(notification.id).await.unwrap();
    let attempt = &attempts[0];
    assert_eq!(attempt.attempt_count, 1);
    assert_eq!(attempt.last_status_code, None);
    assert!(attempt
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("timed out")));
    assert!(attempt.next_retry_at.is_some());
}
