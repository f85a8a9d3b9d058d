//! Message transport facade.
//!
//! A [`Route`] binds one [`RouteConfig`] to a broker and exposes the
//! uniform transport surface: connect, publish, request, subscribe,
//! unsubscribe, flush, drain, disconnect.
//!
//! Delivery paths:
//!
//! - **push**: the broker feeds a channel; a dispatch task forwards each
//!   envelope to the route callback (or the demultiplexer).
//! - **pull**: a background fetcher pulls batches with a bounded wait.
//!   Fetch timeouts mean "no messages yet" and loop; fetch errors are
//!   logged and loop; shutdown exits at the next fetch boundary.
//!
//! Callback errors are logged and do not tear down the subscription.

use crate::config::{RouteConfig, RouteMode, RouteRegistry};
use crate::demux::SubjectChannels;
use crate::envelope::MessageEnvelope;
use crate::errors::TransportError;
use crate::payload::MessagePayload;
use crate::ports::{Broker, DurableSpec, SubscriptionSpec};
use crate::{DEFAULT_PULL_BATCH_SIZE, DEFAULT_PULL_MAX_WAIT};
use crate::adapters::MemoryBroker;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handler invoked for each inbound envelope.
///
/// For durable consumers the handler settles the envelope (`ack` or
/// `nak_with_delay`) exactly once before returning.
pub type MessageCallback = Arc<dyn Fn(MessageEnvelope) -> Result<(), TransportError> + Send + Sync>;

/// Per-route behavior toggles.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Route inbound messages through the subject demultiplexer instead
    /// of the callback.
    pub enable_channels: bool,

    /// Override of the bounded pull-fetch wait; tests shorten it.
    pub pull_max_wait: Option<Duration>,
}

struct SubscriptionState {
    shutdown: Option<watch::Sender<bool>>,
    push_ids: Vec<uuid::Uuid>,
    tasks: Vec<JoinHandle<()>>,
}

/// One configured route over a broker.
pub struct Route {
    config: RouteConfig,
    options: RouteOptions,
    broker: Arc<dyn Broker>,
    callback: Arc<Mutex<Option<MessageCallback>>>,
    channels: Option<Arc<SubjectChannels>>,
    state: Mutex<SubscriptionState>,
}

impl Route {
    /// Creates a route over an explicit broker.
    pub fn new(
        config: RouteConfig,
        broker: Arc<dyn Broker>,
        callback: Option<MessageCallback>,
        options: RouteOptions,
    ) -> Self {
        let channels = options
            .enable_channels
            .then(|| Arc::new(SubjectChannels::from_env()));
        Self {
            config,
            options,
            broker,
            callback: Arc::new(Mutex::new(callback)),
            channels,
            state: Mutex::new(SubscriptionState {
                shutdown: None,
                push_ids: Vec::new(),
                tasks: Vec::new(),
            }),
        }
    }

    /// Creates a route whose broker is resolved from the config URL
    /// (process-shared per URL).
    pub fn from_config(
        config: RouteConfig,
        callback: Option<MessageCallback>,
        options: RouteOptions,
    ) -> Self {
        let broker = MemoryBroker::shared(&config.url);
        Self::new(config, broker, callback, options)
    }

    /// Resolves `selector` in the registry and connects the route.
    pub async fn connect_with_selector(
        registry: &RouteRegistry,
        selector: &str,
        options: RouteOptions,
    ) -> Result<Self, TransportError> {
        let config = registry.find_by_selector(selector).map_err(|e| {
            TransportError::Connect(format!("failed to resolve selector {selector}: {e}"))
        })?;
        let route = Self::from_config(config.clone(), None, options);
        route.connect().await?;
        Ok(route)
    }

    /// Resolves `selector`, connects, installs `callback` and subscribes.
    pub async fn subscribe_with_selector(
        registry: &RouteRegistry,
        selector: &str,
        callback: MessageCallback,
        options: RouteOptions,
    ) -> Result<Self, TransportError> {
        let route = Self::connect_with_selector(registry, selector, options).await?;
        route.set_callback(callback);
        info!(subject = %route.config.subject, selector, "subscribing on route");
        route.subscribe().await?;
        Ok(route)
    }

    /// The route's configuration.
    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    /// The demultiplexer, when channels are enabled for this route.
    pub fn channels(&self) -> Option<&Arc<SubjectChannels>> {
        self.channels.as_ref()
    }

    /// Installs or replaces the message callback.
    pub fn set_callback(&self, callback: MessageCallback) {
        *self.callback.lock() = Some(callback);
    }

    /// Establishes the broker connection. Idempotent. For durable routes
    /// this also ensures the stream exists.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.broker.connect().await?;

        if self.config.durable() {
            // Checked by durable(); both are present.
            if let Some(name) = &self.config.name {
                self.broker
                    .ensure_stream(name, &[self.config.subject.clone()])
                    .await?;
            }
        }

        debug!(
            name = ?self.config.name,
            subject = %self.config.subject,
            "route connected"
        );
        Ok(())
    }

    /// Sends a request and waits for one reply, bounded by `timeout`.
    pub async fn request(
        &self,
        msg: impl Into<MessagePayload>,
        timeout: Duration,
    ) -> Result<MessageEnvelope, TransportError> {
        let data = msg.into().to_bytes()?;
        self.connect().await?;

        match tokio::time::timeout(timeout, self.broker.request(&self.config.subject, data)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Publishes to the configured subject.
    pub async fn publish(&self, msg: impl Into<MessagePayload>) -> Result<(), TransportError> {
        let data = msg.into().to_bytes()?;
        self.connect().await?;
        self.broker.publish(&self.config.subject, data).await
    }

    /// Publishes to `subject + "." + suffix`.
    pub async fn publish_with_suffix(
        &self,
        suffix: &str,
        msg: impl Into<MessagePayload>,
    ) -> Result<(), TransportError> {
        let data = msg.into().to_bytes()?;
        self.connect().await?;
        let subject = format!("{}.{}", self.config.subject, suffix);
        self.broker.publish(&subject, data).await
    }

    /// Starts delivery in the configured mode.
    pub async fn subscribe(&self) -> Result<(), TransportError> {
        self.connect().await?;

        match self.config.mode() {
            RouteMode::Push => self.subscribe_push().await,
            RouteMode::Pull => self.subscribe_pull().await,
        }
    }

    async fn subscribe_push(&self) -> Result<(), TransportError> {
        let subscription = self.broker.subscribe_push(self.subscription_spec()).await?;
        debug!(subject = %self.config.subject, "push subscription started");

        let mut shutdown_rx = self.shutdown_receiver();
        let callback = Arc::clone(&self.callback);
        let channels = self.channels.clone();
        let mut receiver = subscription.receiver;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    envelope = receiver.recv() => {
                        let Some(envelope) = envelope else { break };
                        dispatch(&channels, &callback, envelope).await;
                    }
                }
            }
            debug!("push dispatcher stopped");
        });

        let mut state = self.state.lock();
        state.push_ids.push(subscription.id);
        state.tasks.push(task);
        Ok(())
    }

    async fn subscribe_pull(&self) -> Result<(), TransportError> {
        if !self.config.durable() {
            return Err(TransportError::Connect(
                "pull mode requires a durable consumer (name and queue)".to_string(),
            ));
        }

        let subscription = self.broker.subscribe_pull(self.subscription_spec()).await?;
        let batch_size = self.config.batch_size.unwrap_or(DEFAULT_PULL_BATCH_SIZE);
        let max_wait = self.options.pull_max_wait.unwrap_or(DEFAULT_PULL_MAX_WAIT);
        debug!(
            subject = %self.config.subject,
            batch_size,
            "pull fetcher started"
        );

        let mut shutdown_rx = self.shutdown_receiver();
        let callback = Arc::clone(&self.callback);
        let channels = self.channels.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    fetched = subscription.fetch(batch_size, max_wait) => {
                        match fetched {
                            // An empty batch is a fetch timeout: no
                            // messages yet, keep polling.
                            Ok(envelopes) => {
                                for envelope in envelopes {
                                    dispatch(&channels, &callback, envelope).await;
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "error fetching messages");
                            }
                        }
                    }
                }
            }
            debug!("pull fetcher stopped");
        });

        self.state.lock().tasks.push(task);
        Ok(())
    }

    /// Stops delivery. Safe to call when not subscribed.
    pub async fn unsubscribe(&self) -> Result<(), TransportError> {
        let (shutdown, push_ids, tasks) = {
            let mut state = self.state.lock();
            (
                state.shutdown.take(),
                std::mem::take(&mut state.push_ids),
                std::mem::take(&mut state.tasks),
            )
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }
        for id in push_ids {
            self.broker.unsubscribe(id).await?;
        }
        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    /// Blocks until locally buffered publishes are acknowledged.
    pub async fn flush(&self) -> Result<(), TransportError> {
        self.broker.flush().await
    }

    /// Soft shutdown: stops delivery and drains; silent when already
    /// closed.
    pub async fn drain(&self) -> Result<(), TransportError> {
        self.unsubscribe().await?;
        self.broker.drain().await
    }

    /// Stops delivery, drains in-flight messages and closes the
    /// connection. Fails when not connected.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        if !self.broker.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.unsubscribe().await?;
        self.broker.disconnect().await
    }

    fn subscription_spec(&self) -> SubscriptionSpec {
        SubscriptionSpec {
            subject: self.config.subject.clone(),
            queue: self.config.queue.clone(),
            durable: self.durable_spec(),
        }
    }

    fn durable_spec(&self) -> Option<DurableSpec> {
        match (&self.config.name, &self.config.queue) {
            (Some(name), Some(queue)) => Some(DurableSpec {
                stream: name.clone(),
                consumer: queue.clone(),
                max_ack_pending: self.config.max_ack_pending,
                ack_wait: self.config.ack_wait(),
            }),
            _ => None,
        }
    }

    fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        let mut state = self.state.lock();
        match &state.shutdown {
            Some(sender) => sender.subscribe(),
            None => {
                let (tx, rx) = watch::channel(false);
                state.shutdown = Some(tx);
                rx
            }
        }
    }
}

/// Routes one envelope to the demultiplexer or the callback.
async fn dispatch(
    channels: &Option<Arc<SubjectChannels>>,
    callback: &Arc<Mutex<Option<MessageCallback>>>,
    envelope: MessageEnvelope,
) {
    if let Some(channels) = channels {
        if let Err(e) = channels.deliver(envelope).await {
            error!(error = %e, "failed to route message onto subject channel");
        }
        return;
    }

    let callback = callback.lock().clone();
    let Some(callback) = callback else {
        warn!("no callback defined for inbound message");
        return;
    };
    if let Err(e) = callback(envelope) {
        // Handler failures must not tear down the subscription.
        error!(error = %e, "subscription callback failed");
    }
}
