//! In-process broker.
//!
//! A single-node implementation of the [`Broker`] port backed by tokio
//! channels. Suitable for single-process deployments and tests; a
//! networked broker client replaces it at the trait seam.
//!
//! Semantics:
//!
//! - Plain subscriptions receive every matching message (fan-out).
//!   Queue-group subscriptions receive one message per group,
//!   round-robin.
//! - Durable streams retain named consumers. Each consumer tracks an
//!   undelivered queue and an in-flight (delivered, unacked) set;
//!   `ack` settles a message, `nak_with_delay` schedules redelivery.
//!   `ack_wait` expiry requeues in-flight messages at fetch boundaries.
//! - Subject matching is exact, plus a trailing `.>` wildcard segment
//!   that matches any deeper subject (what suffixed publishes rely on).
//!
//! Brokers are shared per URL via [`MemoryBroker::shared`], so every
//! route pointed at the same URL talks to the same broker instance.

use crate::envelope::{EnvelopeAcker, MessageEnvelope};
use crate::errors::TransportError;
use crate::ports::{Broker, PullSubscription, PushSubscription, SubscriptionSpec};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-subscriber channel capacity before messages are dropped
/// (best-effort delivery only; durable consumers buffer in the stream).
const PUSH_CHANNEL_CAPACITY: usize = 1024;

/// In-flight cap applied when a durable consumer sets no explicit limit.
const DEFAULT_MAX_ACK_PENDING: usize = 4096;

static SHARED_BROKERS: Lazy<Mutex<HashMap<String, Arc<MemoryBroker>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Returns true when `subject` is covered by `pattern`.
fn subject_matches(pattern: &str, subject: &str) -> bool {
    if pattern == subject {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".>") {
        return subject.len() > prefix.len() + 1 && subject.starts_with(prefix)
            && subject.as_bytes()[prefix.len()] == b'.';
    }
    false
}

struct StoredMessage {
    id: u64,
    subject: String,
    reply: Option<String>,
    data: Vec<u8>,
}

impl StoredMessage {
    fn envelope(&self, acker: Option<Arc<dyn EnvelopeAcker>>) -> MessageEnvelope {
        let envelope = match acker {
            Some(acker) => {
                MessageEnvelope::with_acker(self.subject.clone(), self.data.clone(), self.id, acker)
            }
            None => MessageEnvelope::new(self.subject.clone(), self.data.clone()),
        };
        match &self.reply {
            Some(reply) => envelope.with_reply_subject(reply.clone()),
            None => envelope,
        }
    }
}

struct PlainSub {
    id: Uuid,
    pattern: String,
    sender: mpsc::Sender<MessageEnvelope>,
}

struct QueueSub {
    id: Uuid,
    pattern: String,
    queue: String,
    sender: mpsc::Sender<MessageEnvelope>,
}

struct InFlight {
    message: StoredMessage,
    delivered_at: Instant,
}

struct Consumer {
    undelivered: VecDeque<StoredMessage>,
    in_flight: HashMap<u64, InFlight>,
    push_members: Vec<(Uuid, mpsc::Sender<MessageEnvelope>)>,
    next_member: usize,
    max_ack_pending: usize,
    ack_wait: Option<Duration>,
    notify: Arc<Notify>,
}

impl Consumer {
    fn new(max_ack_pending: Option<usize>, ack_wait: Option<Duration>) -> Self {
        Self {
            undelivered: VecDeque::new(),
            in_flight: HashMap::new(),
            push_members: Vec::new(),
            next_member: 0,
            max_ack_pending: max_ack_pending.unwrap_or(DEFAULT_MAX_ACK_PENDING),
            ack_wait,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Moves in-flight messages whose ack window lapsed back onto the
    /// undelivered queue.
    fn requeue_expired(&mut self, now: Instant) {
        let Some(ack_wait) = self.ack_wait else {
            return;
        };
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, f)| now.duration_since(f.delivered_at) >= ack_wait)
            .map(|(&id, _)| id)
            .collect();
        for id in expired {
            if let Some(flight) = self.in_flight.remove(&id) {
                self.undelivered.push_back(flight.message);
            }
        }
    }
}

struct Stream {
    subjects: Vec<String>,
    consumers: HashMap<String, Consumer>,
}

#[derive(Default)]
struct BrokerState {
    connected: bool,
    plain: Vec<PlainSub>,
    queues: Vec<QueueSub>,
    streams: HashMap<String, Stream>,
}

struct BrokerInner {
    url: String,
    state: Mutex<BrokerState>,
    next_message_id: AtomicU64,
}

impl BrokerInner {
    /// Delivers `data` to every matching ephemeral subscriber and stores
    /// it for every matching durable consumer.
    fn route_message(self: &Arc<Self>, subject: &str, reply: Option<String>, data: Vec<u8>) {
        let mut state = self.state.lock();

        // Fan-out to plain subscribers; drop on full channels.
        state.plain.retain(|sub| !sub.sender.is_closed());
        for sub in &state.plain {
            if subject_matches(&sub.pattern, subject) {
                let envelope = MessageEnvelope::new(subject.to_string(), data.clone());
                let envelope = match &reply {
                    Some(r) => envelope.with_reply_subject(r.clone()),
                    None => envelope,
                };
                if sub.sender.try_send(envelope).is_err() {
                    warn!(subject, "subscriber channel full, message dropped");
                }
            }
        }

        // One member per ephemeral queue group.
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, sub) in state.queues.iter().enumerate() {
            if subject_matches(&sub.pattern, subject) && !sub.sender.is_closed() {
                groups.entry(sub.queue.clone()).or_default().push(i);
            }
        }
        for members in groups.values() {
            // Rotate so groups balance over time.
            let seed = self.next_message_id.fetch_add(1, Ordering::Relaxed) as usize;
            let pick = members[seed % members.len()];
            let envelope = MessageEnvelope::new(subject.to_string(), data.clone());
            let envelope = match &reply {
                Some(r) => envelope.with_reply_subject(r.clone()),
                None => envelope,
            };
            if state.queues[pick].sender.try_send(envelope).is_err() {
                warn!(subject, "queue member channel full, message dropped");
            }
        }

        // Durable consumers.
        let stream_names: Vec<String> = state
            .streams
            .iter()
            .filter(|(_, s)| s.subjects.iter().any(|p| subject_matches(p, subject)))
            .map(|(name, _)| name.clone())
            .collect();

        for stream_name in stream_names {
            let id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
            let Some(stream) = state.streams.get_mut(&stream_name) else {
                continue;
            };
            for (consumer_name, consumer) in &mut stream.consumers {
                let message = StoredMessage {
                    id,
                    subject: subject.to_string(),
                    reply: reply.clone(),
                    data: data.clone(),
                };
                self.deliver_to_consumer(&stream_name, consumer_name, consumer, message);
            }
        }
    }

    fn deliver_to_consumer(
        self: &Arc<Self>,
        stream: &str,
        consumer_name: &str,
        consumer: &mut Consumer,
        message: StoredMessage,
    ) {
        consumer.push_members.retain(|(_, s)| !s.is_closed());
        if consumer.push_members.is_empty() {
            consumer.undelivered.push_back(message);
            consumer.notify.notify_one();
            return;
        }

        let acker: Arc<dyn EnvelopeAcker> = Arc::new(ConsumerAcker {
            inner: Arc::clone(self),
            stream: stream.to_string(),
            consumer: consumer_name.to_string(),
        });
        let envelope = message.envelope(Some(acker));

        let pick = consumer.next_member % consumer.push_members.len();
        consumer.next_member = consumer.next_member.wrapping_add(1);
        let delivered = consumer.push_members[pick].1.try_send(envelope).is_ok();

        if delivered {
            consumer.in_flight.insert(
                message.id,
                InFlight {
                    message,
                    delivered_at: Instant::now(),
                },
            );
        } else {
            // Member stalled: keep the message for a later fetch/push.
            consumer.undelivered.push_back(message);
            consumer.notify.notify_one();
        }
    }

    /// Requeues a message for redelivery (nak path, ack-wait expiry).
    fn redeliver(self: &Arc<Self>, stream: &str, consumer_name: &str, message: StoredMessage) {
        let mut state = self.state.lock();
        let Some(stream_state) = state.streams.get_mut(stream) else {
            return;
        };
        let Some(consumer) = stream_state.consumers.get_mut(consumer_name) else {
            return;
        };
        self.deliver_to_consumer(stream, consumer_name, consumer, message);
    }
}

struct ConsumerAcker {
    inner: Arc<BrokerInner>,
    stream: String,
    consumer: String,
}

impl EnvelopeAcker for ConsumerAcker {
    fn ack(&self, message_id: u64) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        if let Some(stream) = state.streams.get_mut(&self.stream) {
            if let Some(consumer) = stream.consumers.get_mut(&self.consumer) {
                consumer.in_flight.remove(&message_id);
            }
        }
        Ok(())
    }

    fn nak_with_delay(&self, message_id: u64, delay: Duration) -> Result<(), TransportError> {
        let flight = {
            let mut state = self.inner.state.lock();
            let stream = state
                .streams
                .get_mut(&self.stream)
                .ok_or(TransportError::NotSubscribed)?;
            let consumer = stream
                .consumers
                .get_mut(&self.consumer)
                .ok_or(TransportError::NotSubscribed)?;
            consumer.in_flight.remove(&message_id)
        };
        let Some(flight) = flight else {
            return Ok(()); // already settled
        };

        let inner = Arc::clone(&self.inner);
        let stream = self.stream.clone();
        let consumer = self.consumer.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.redeliver(&stream, &consumer, flight.message);
                });
            }
            // No runtime to host the delay timer: redeliver immediately.
            Err(_) => inner.redeliver(&stream, &consumer, flight.message),
        }
        Ok(())
    }
}

/// In-process [`Broker`] implementation.
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Creates a standalone broker.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                url: url.into(),
                state: Mutex::new(BrokerState::default()),
                next_message_id: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the process-wide broker for `url`, creating it on first
    /// use. Routes with the same URL share one broker.
    pub fn shared(url: &str) -> Arc<MemoryBroker> {
        let mut brokers = SHARED_BROKERS.lock();
        Arc::clone(
            brokers
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(MemoryBroker::new(url))),
        )
    }

    /// The URL this broker was created for.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    fn require_connected(&self) -> Result<(), TransportError> {
        if self.inner.state.lock().connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        if !state.connected {
            state.connected = true;
            debug!(url = %self.inner.url, "broker connected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    async fn ensure_stream(&self, name: &str, subjects: &[String]) -> Result<(), TransportError> {
        self.require_connected()?;
        let mut state = self.inner.state.lock();
        state.streams.entry(name.to_string()).or_insert_with(|| {
            debug!(stream = name, ?subjects, "stream created");
            Stream {
                subjects: subjects.to_vec(),
                consumers: HashMap::new(),
            }
        });
        Ok(())
    }

    async fn publish(&self, subject: &str, data: Vec<u8>) -> Result<(), TransportError> {
        self.require_connected()?;
        self.inner.route_message(subject, None, data);
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        data: Vec<u8>,
    ) -> Result<MessageEnvelope, TransportError> {
        self.require_connected()?;

        let inbox = format!("_INBOX.{}", Uuid::new_v4());
        let (tx, mut rx) = mpsc::channel(1);
        let id = Uuid::new_v4();
        {
            let mut state = self.inner.state.lock();
            state.plain.push(PlainSub {
                id,
                pattern: inbox.clone(),
                sender: tx,
            });
        }

        self.inner.route_message(subject, Some(inbox), data);

        let reply = rx.recv().await;
        {
            let mut state = self.inner.state.lock();
            state.plain.retain(|sub| sub.id != id);
        }
        reply.ok_or(TransportError::Canceled)
    }

    async fn subscribe_push(
        &self,
        spec: SubscriptionSpec,
    ) -> Result<PushSubscription, TransportError> {
        self.require_connected()?;
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        let mut state = self.inner.state.lock();

        match (&spec.durable, &spec.queue) {
            (Some(durable), _) => {
                let stream = state.streams.get_mut(&durable.stream).ok_or_else(|| {
                    TransportError::Connect(format!("stream {} not found", durable.stream))
                })?;
                let consumer = stream
                    .consumers
                    .entry(durable.consumer.clone())
                    .or_insert_with(|| {
                        Consumer::new(durable.max_ack_pending, durable.ack_wait)
                    });
                consumer.push_members.push((id, tx));
            }
            (None, Some(queue)) => {
                state.queues.push(QueueSub {
                    id,
                    pattern: spec.subject.clone(),
                    queue: queue.clone(),
                    sender: tx,
                });
            }
            (None, None) => {
                state.plain.push(PlainSub {
                    id,
                    pattern: spec.subject.clone(),
                    sender: tx,
                });
            }
        }

        debug!(subject = %spec.subject, %id, "push subscription created");
        Ok(PushSubscription { id, receiver: rx })
    }

    async fn subscribe_pull(
        &self,
        spec: SubscriptionSpec,
    ) -> Result<Box<dyn PullSubscription>, TransportError> {
        self.require_connected()?;
        let durable = spec.durable.clone().ok_or_else(|| {
            TransportError::Connect("pull subscriptions require a durable consumer".to_string())
        })?;

        let notify = {
            let mut state = self.inner.state.lock();
            let stream = state.streams.get_mut(&durable.stream).ok_or_else(|| {
                TransportError::Connect(format!("stream {} not found", durable.stream))
            })?;
            let consumer = stream
                .consumers
                .entry(durable.consumer.clone())
                .or_insert_with(|| Consumer::new(durable.max_ack_pending, durable.ack_wait));
            Arc::clone(&consumer.notify)
        };

        debug!(
            subject = %spec.subject,
            stream = %durable.stream,
            consumer = %durable.consumer,
            "pull subscription created"
        );
        Ok(Box::new(MemoryPullSubscription {
            id: Uuid::new_v4(),
            inner: Arc::clone(&self.inner),
            stream: durable.stream,
            consumer: durable.consumer,
            notify,
        }))
    }

    async fn unsubscribe(&self, id: Uuid) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.plain.retain(|sub| sub.id != id);
        state.queues.retain(|sub| sub.id != id);
        for stream in state.streams.values_mut() {
            for consumer in stream.consumers.values_mut() {
                consumer.push_members.retain(|(member, _)| *member != id);
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), TransportError> {
        // Publishes are applied synchronously; a connected broker has
        // nothing buffered.
        self.require_connected()
    }

    async fn drain(&self) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Ok(());
        }
        self.disconnect().await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.connected = false;
        state.plain.clear();
        state.queues.clear();
        // Streams (and their consumers) survive; they are durable.
        debug!(url = %self.inner.url, "broker disconnected");
        Ok(())
    }
}

struct MemoryPullSubscription {
    id: Uuid,
    inner: Arc<BrokerInner>,
    stream: String,
    consumer: String,
    notify: Arc<Notify>,
}

impl MemoryPullSubscription {
    /// Takes up to `batch` undelivered messages, honoring the in-flight
    /// cap and requeueing ack-wait expiries first.
    fn take_batch(&self, batch: usize) -> Vec<MessageEnvelope> {
        let mut state = self.inner.state.lock();
        let Some(stream) = state.streams.get_mut(&self.stream) else {
            return Vec::new();
        };
        let Some(consumer) = stream.consumers.get_mut(&self.consumer) else {
            return Vec::new();
        };

        let now = Instant::now();
        consumer.requeue_expired(now);

        let allowed = consumer
            .max_ack_pending
            .saturating_sub(consumer.in_flight.len());
        let take = batch.min(allowed);

        let mut envelopes = Vec::new();
        for _ in 0..take {
            let Some(message) = consumer.undelivered.pop_front() else {
                break;
            };
            let acker: Arc<dyn EnvelopeAcker> = Arc::new(ConsumerAcker {
                inner: Arc::clone(&self.inner),
                stream: self.stream.clone(),
                consumer: self.consumer.clone(),
            });
            envelopes.push(message.envelope(Some(acker)));
            consumer.in_flight.insert(
                message.id,
                InFlight {
                    message,
                    delivered_at: now,
                },
            );
        }
        envelopes
    }
}

#[async_trait]
impl PullSubscription for MemoryPullSubscription {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn fetch(
        &self,
        batch: usize,
        max_wait: Duration,
    ) -> Result<Vec<MessageEnvelope>, TransportError> {
        let deadline = Instant::now() + max_wait;
        loop {
            let envelopes = self.take_batch(batch);
            if !envelopes.is_empty() {
                return Ok(envelopes);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new()); // no messages yet; caller loops
            }
            let notified = self.notify.notified();
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::DurableSpec;

    fn spec(subject: &str) -> SubscriptionSpec {
        SubscriptionSpec {
            subject: subject.to_string(),
            queue: None,
            durable: None,
        }
    }

    fn durable_spec(subject: &str, stream: &str, consumer: &str) -> SubscriptionSpec {
        SubscriptionSpec {
            subject: subject.to_string(),
            queue: Some(consumer.to_string()),
            durable: Some(DurableSpec {
                stream: stream.to_string(),
                consumer: consumer.to_string(),
                max_ack_pending: None,
                ack_wait: None,
            }),
        }
    }

    #[test]
    fn test_subject_matching() {
        assert!(subject_matches("a.b", "a.b"));
        assert!(!subject_matches("a.b", "a.b.c"));
        assert!(subject_matches("a.b.>", "a.b.c"));
        assert!(subject_matches("a.b.>", "a.b.c.d"));
        assert!(!subject_matches("a.b.>", "a.b"));
        assert!(!subject_matches("a.b.>", "a.bc"));
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let broker = MemoryBroker::new("mem://idempotent");
        broker.connect().await.unwrap();
        broker.connect().await.unwrap();
        assert!(broker.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_requires_connection() {
        let broker = MemoryBroker::new("mem://disc");
        assert!(matches!(
            broker.disconnect().await,
            Err(TransportError::NotConnected)
        ));
        // Drain is the silent variant.
        broker.drain().await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_fanout() {
        let broker = MemoryBroker::new("mem://fanout");
        broker.connect().await.unwrap();

        let mut sub_a = broker.subscribe_push(spec("t.x")).await.unwrap();
        let mut sub_b = broker.subscribe_push(spec("t.x")).await.unwrap();

        broker.publish("t.x", b"hello".to_vec()).await.unwrap();

        let got_a = sub_a.receiver.recv().await.unwrap();
        let got_b = sub_b.receiver.recv().await.unwrap();
        assert_eq!(got_a.raw().unwrap(), b"hello");
        assert_eq!(got_b.raw().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_queue_group_delivers_to_one_member() {
        let broker = MemoryBroker::new("mem://queue");
        broker.connect().await.unwrap();

        let mut subs = Vec::new();
        for _ in 0..3 {
            let mut s = spec("t.q");
            s.queue = Some("workers".to_string());
            subs.push(broker.subscribe_push(s).await.unwrap());
        }

        for i in 0..6u8 {
            broker.publish("t.q", vec![i]).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut total = 0;
        for sub in &mut subs {
            while let Ok(envelope) = sub.receiver.try_recv() {
                assert_eq!(envelope.subject(), "t.q");
                total += 1;
            }
        }
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn test_durable_pull_fetch_and_ack() {
        let broker = MemoryBroker::new("mem://pull");
        broker.connect().await.unwrap();
        broker
            .ensure_stream("orders", &["orders.new".to_string()])
            .await
            .unwrap();

        let sub = broker
            .subscribe_pull(durable_spec("orders.new", "orders", "workers"))
            .await
            .unwrap();

        broker.publish("orders.new", b"one".to_vec()).await.unwrap();
        broker.publish("orders.new", b"two".to_vec()).await.unwrap();

        let batch = sub.fetch(10, Duration::from_millis(200)).await.unwrap();
        assert_eq!(batch.len(), 2);
        for envelope in &batch {
            envelope.ack().unwrap();
        }

        // Everything acked; a further fetch times out empty.
        let empty = sub.fetch(10, Duration::from_millis(50)).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_wakes_on_new_message() {
        let broker = Arc::new(MemoryBroker::new("mem://wake"));
        broker.connect().await.unwrap();
        broker
            .ensure_stream("s", &["s.a".to_string()])
            .await
            .unwrap();
        let sub = broker
            .subscribe_pull(durable_spec("s.a", "s", "w"))
            .await
            .unwrap();

        let publisher = Arc::clone(&broker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            publisher.publish("s.a", b"late".to_vec()).await.unwrap();
        });

        let started = Instant::now();
        let batch = sub.fetch(10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(batch.len(), 1);
        // Woken by the publish, well before the max wait.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_nak_redelivers_after_delay() {
        let broker = MemoryBroker::new("mem://nak");
        broker.connect().await.unwrap();
        broker
            .ensure_stream("s", &["s.a".to_string()])
            .await
            .unwrap();
        let sub = broker
            .subscribe_pull(durable_spec("s.a", "s", "w"))
            .await
            .unwrap();

        broker.publish("s.a", b"retry-me".to_vec()).await.unwrap();

        let batch = sub.fetch(1, Duration::from_millis(100)).await.unwrap();
        assert_eq!(batch.len(), 1);
        batch[0].nak_with_delay(Duration::from_millis(30)).unwrap();

        let redelivered = sub.fetch(1, Duration::from_secs(2)).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].raw().unwrap(), b"retry-me");
        redelivered[0].ack().unwrap();
    }

    #[tokio::test]
    async fn test_ack_wait_expiry_requeues() {
        let broker = MemoryBroker::new("mem://ackwait");
        broker.connect().await.unwrap();
        broker
            .ensure_stream("s", &["s.a".to_string()])
            .await
            .unwrap();

        let mut spec = durable_spec("s.a", "s", "w");
        if let Some(durable) = &mut spec.durable {
            durable.ack_wait = Some(Duration::from_millis(40));
        }
        let sub = broker.subscribe_pull(spec).await.unwrap();

        broker.publish("s.a", b"unacked".to_vec()).await.unwrap();
        let first = sub.fetch(1, Duration::from_millis(100)).await.unwrap();
        assert_eq!(first.len(), 1);
        // Never acked; after the ack window it must come back.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let again = sub.fetch(1, Duration::from_millis(100)).await.unwrap();
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn test_request_reply() {
        let broker = Arc::new(MemoryBroker::new("mem://reqrep"));
        broker.connect().await.unwrap();

        let mut responder = broker.subscribe_push(spec("svc.echo")).await.unwrap();
        let responder_broker = Arc::clone(&broker);
        tokio::spawn(async move {
            let envelope = responder.receiver.recv().await.unwrap();
            let reply_to = envelope.reply_subject().unwrap().to_string();
            let mut body = envelope.raw().unwrap().to_vec();
            body.extend_from_slice(b"-pong");
            responder_broker.publish(&reply_to, body).await.unwrap();
        });

        let reply = tokio::time::timeout(
            Duration::from_secs(1),
            broker.request("svc.echo", b"ping".to_vec()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(reply.raw().unwrap(), b"ping-pong");
    }

    #[tokio::test]
    async fn test_suffix_wildcard_subscription() {
        let broker = MemoryBroker::new("mem://wild");
        broker.connect().await.unwrap();

        let mut sub = broker.subscribe_push(spec("base.subject.>")).await.unwrap();
        broker
            .publish("base.subject.reply1", b"x".to_vec())
            .await
            .unwrap();

        let envelope = sub.receiver.recv().await.unwrap();
        assert_eq!(envelope.subject(), "base.subject.reply1");
    }

    #[tokio::test]
    async fn test_shared_broker_by_url() {
        let a = MemoryBroker::shared("mem://shared-test");
        let b = MemoryBroker::shared("mem://shared-test");
        a.connect().await.unwrap();
        assert!(b.is_connected());
    }
}
