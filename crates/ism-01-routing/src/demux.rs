//! Subject demultiplexer.
//!
//! Optional per-route fan-out of inbound messages onto per-subject
//! buffered channels. Supports request-response patterns over suffixed
//! subjects: different suffixes of a base subject represent different
//! logical replies, and each gets its own channel keyed by the full
//! subject string as reported by the broker.
//!
//! Channels live in a TTL cache. Each delivery refreshes the entry;
//! idle subjects age out and eviction drops the sender, which closes the
//! channel under any waiting reader.

use crate::envelope::MessageEnvelope;
use crate::errors::TransportError;
use crate::{DEFAULT_SUBJECT_CHANNEL_TTL, SUBJECT_CHANNEL_TTL_ENV};
use ism_03_caching::{Cache, CacheValue, LocalCache, LocalCacheOptions};
use parking_lot::Mutex;
use shared_types::env::duration_from_env_with_default;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Default buffered capacity of one subject channel.
const CHANNEL_CAPACITY: usize = 1;

/// Backing cache TTL for the channel map itself.
const CHANNEL_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Cleanup cadence of the channel cache.
const CHANNEL_CACHE_CLEANUP: Duration = Duration::from_secs(10 * 60);

struct ChannelPair {
    sender: mpsc::Sender<MessageEnvelope>,
    receiver: Mutex<Option<mpsc::Receiver<MessageEnvelope>>>,
}

/// Per-subject channel fan-out backed by a TTL cache.
pub struct SubjectChannels {
    channels: Arc<dyn Cache>,
    channel_ttl: Duration,
    capacity: usize,
}

impl SubjectChannels {
    /// Creates a demultiplexer with the channel TTL taken from
    /// `SUBJECT_CHANNEL_TTL_DURATION` (default 10s).
    pub fn from_env() -> Self {
        Self::with_ttl(duration_from_env_with_default(
            SUBJECT_CHANNEL_TTL_ENV,
            DEFAULT_SUBJECT_CHANNEL_TTL,
        ))
    }

    /// Creates a demultiplexer with an explicit channel TTL.
    pub fn with_ttl(channel_ttl: Duration) -> Self {
        let cache = LocalCache::with_options(LocalCacheOptions {
            default_ttl: CHANNEL_CACHE_TTL,
            cleanup_interval: CHANNEL_CACHE_CLEANUP,
        });
        Self {
            channels: Arc::new(cache),
            channel_ttl,
            capacity: CHANNEL_CAPACITY,
        }
    }

    /// The TTL applied to each subject channel entry.
    pub fn channel_ttl(&self) -> Duration {
        self.channel_ttl
    }

    /// Number of live subject channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true when no subject channels exist.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Pushes an envelope onto its subject's channel, creating the
    /// channel on first use. Blocks when the bounded channel is full
    /// until the reader drains it.
    pub async fn deliver(&self, envelope: MessageEnvelope) -> Result<(), TransportError> {
        let subject = envelope.subject().to_string();
        let pair = self.pair_for(&subject)?;
        pair.sender.send(envelope).await.map_err(|_| {
            TransportError::Publish(format!("subject channel closed: {subject}"))
        })
    }

    /// Takes the receiver side of a subject's channel. Each subject's
    /// receiver can be taken once; subsequent calls return `None` until
    /// the entry is evicted and recreated.
    pub fn take_receiver(
        &self,
        subject: &str,
    ) -> Result<Option<mpsc::Receiver<MessageEnvelope>>, TransportError> {
        let pair = self.pair_for(subject)?;
        let taken = pair.receiver.lock().take();
        Ok(taken)
    }

    /// Drops a subject's channel immediately, closing it.
    pub fn evict(&self, subject: &str) {
        self.channels.delete(subject);
    }

    /// Stops the backing cache's maintenance loop.
    pub fn close(&self) {
        self.channels.close();
    }

    fn pair_for(&self, subject: &str) -> Result<Arc<ChannelPair>, TransportError> {
        let capacity = self.capacity;
        let value = self
            .channels
            .get_or_create(
                subject,
                &mut |exists, prev| {
                    if exists {
                        // Entry aged out but the channel is still usable;
                        // keep it and let the TTL refresh below re-arm it.
                        return Ok(prev.cloned());
                    }
                    debug!(subject, "subject channel created");
                    let (sender, receiver) = mpsc::channel(capacity);
                    Ok(Some(Arc::new(ChannelPair {
                        sender,
                        receiver: Mutex::new(Some(receiver)),
                    }) as CacheValue))
                },
                self.channel_ttl,
            )
            .map_err(|e| TransportError::Publish(format!("subject channel cache: {e}")))?;

        let Some(value) = value else {
            return Err(TransportError::Publish(format!(
                "subject channel unavailable: {subject}"
            )));
        };
        let pair = value
            .downcast::<ChannelPair>()
            .map_err(|_| TransportError::Publish("subject channel type mismatch".to_string()))?;

        // Access refreshes the entry's TTL.
        self.channels
            .set(subject, Arc::clone(&pair) as CacheValue, self.channel_ttl);
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(subject: &str, body: &[u8]) -> MessageEnvelope {
        MessageEnvelope::new(subject, body.to_vec())
    }

    #[tokio::test]
    async fn test_deliver_and_read_per_subject() {
        let demux = SubjectChannels::with_ttl(Duration::from_secs(10));

        demux.deliver(envelope("base.r1", b"one")).await.unwrap();
        demux.deliver(envelope("base.r2", b"two")).await.unwrap();
        assert_eq!(demux.len(), 2);

        let mut r1 = demux.take_receiver("base.r1").unwrap().unwrap();
        let mut r2 = demux.take_receiver("base.r2").unwrap().unwrap();
        assert_eq!(r1.recv().await.unwrap().raw().unwrap(), b"one");
        assert_eq!(r2.recv().await.unwrap().raw().unwrap(), b"two");
        demux.close();
    }

    #[tokio::test]
    async fn test_receiver_taken_once() {
        let demux = SubjectChannels::with_ttl(Duration::from_secs(10));
        demux.deliver(envelope("s", b"x")).await.unwrap();

        assert!(demux.take_receiver("s").unwrap().is_some());
        assert!(demux.take_receiver("s").unwrap().is_none());
        demux.close();
    }

    #[tokio::test]
    async fn test_eviction_closes_channel() {
        let demux = SubjectChannels::with_ttl(Duration::from_secs(10));
        demux.deliver(envelope("s", b"x")).await.unwrap();
        let mut receiver = demux.take_receiver("s").unwrap().unwrap();
        assert!(receiver.recv().await.is_some());

        demux.evict("s");
        // Sender side dropped with the cache entry.
        assert!(receiver.recv().await.is_none());
        demux.close();
    }

    #[tokio::test]
    async fn test_bounded_channel_blocks_until_read() {
        let demux = Arc::new(SubjectChannels::with_ttl(Duration::from_secs(10)));
        demux.deliver(envelope("s", b"first")).await.unwrap();
        let mut receiver = demux.take_receiver("s").unwrap().unwrap();

        // Capacity is 1; the second deliver parks until the reader takes
        // the first message.
        let writer = Arc::clone(&demux);
        let pending = tokio::spawn(async move {
            writer.deliver(envelope("s", b"second")).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        assert_eq!(receiver.recv().await.unwrap().raw().unwrap(), b"first");
        pending.await.unwrap();
        assert_eq!(receiver.recv().await.unwrap().raw().unwrap(), b"second");
        demux.close();
    }
}
