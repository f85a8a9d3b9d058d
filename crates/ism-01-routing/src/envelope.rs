//! Per-message envelope.
//!
//! The transport hands inbound messages to handlers wrapped in a
//! [`MessageEnvelope`]: payload bytes, the subject they arrived on, an
//! optional reply subject for request/response flows, and ack controls.
//!
//! For durable consumers the handler must settle each envelope exactly
//! once: `ack` marks it consumed, `nak_with_delay` schedules redelivery.
//! For ephemeral consumers both are no-ops.

use crate::errors::TransportError;
use shared_types::Data;
use std::sync::Arc;
use std::time::Duration;

/// Settlement hooks wired up by durable consumers.
pub trait EnvelopeAcker: Send + Sync {
    /// Marks the message consumed.
    fn ack(&self, message_id: u64) -> Result<(), TransportError>;

    /// Requests redelivery after `delay`.
    fn nak_with_delay(&self, message_id: u64, delay: Duration) -> Result<(), TransportError>;
}

/// One inbound message.
#[derive(Clone)]
pub struct MessageEnvelope {
    subject: String,
    reply_subject: Option<String>,
    data: Vec<u8>,
    message_id: u64,
    acker: Option<Arc<dyn EnvelopeAcker>>,
}

impl MessageEnvelope {
    /// Builds an envelope without ack controls (ephemeral delivery).
    pub fn new(subject: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            reply_subject: None,
            data,
            message_id: 0,
            acker: None,
        }
    }

    /// Builds an envelope with ack controls (durable delivery).
    pub fn with_acker(
        subject: impl Into<String>,
        data: Vec<u8>,
        message_id: u64,
        acker: Arc<dyn EnvelopeAcker>,
    ) -> Self {
        Self {
            subject: subject.into(),
            reply_subject: None,
            data,
            message_id,
            acker: Some(acker),
        }
    }

    /// Sets the reply subject for request/response flows.
    pub fn with_reply_subject(mut self, reply_subject: impl Into<String>) -> Self {
        self.reply_subject = Some(reply_subject.into());
        self
    }

    /// The subject this message arrived on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The subject a responder should publish replies to, when present.
    pub fn reply_subject(&self) -> Option<&str> {
        self.reply_subject.as_deref()
    }

    /// Broker-assigned message id; zero for ephemeral deliveries.
    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    /// Raw payload bytes.
    ///
    /// # Errors
    /// [`TransportError::EmptyMessage`] when the payload is empty.
    pub fn raw(&self) -> Result<&[u8], TransportError> {
        if self.data.is_empty() {
            return Err(TransportError::EmptyMessage);
        }
        Ok(&self.data)
    }

    /// Payload as UTF-8 text.
    pub fn as_text(&self) -> Result<String, TransportError> {
        let raw = self.raw()?;
        String::from_utf8(raw.to_vec()).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Payload decoded as a JSON object map.
    pub fn as_map(&self) -> Result<Data, TransportError> {
        let raw = self.raw()?;
        serde_json::from_slice(raw).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Acknowledges successful processing. No-op for ephemeral delivery.
    pub fn ack(&self) -> Result<(), TransportError> {
        match &self.acker {
            Some(acker) => acker.ack(self.message_id),
            None => Ok(()),
        }
    }

    /// Negatively acknowledges; the broker redelivers after `delay`.
    /// No-op for ephemeral delivery.
    pub fn nak_with_delay(&self, delay: Duration) -> Result<(), TransportError> {
        match &self.acker {
            Some(acker) => acker.nak_with_delay(self.message_id, delay),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for MessageEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageEnvelope")
            .field("subject", &self.subject)
            .field("reply_subject", &self.reply_subject)
            .field("len", &self.data.len())
            .field("message_id", &self.message_id)
            .field("durable", &self.acker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_rejects_empty() {
        let envelope = MessageEnvelope::new("a.b", Vec::new());
        assert!(matches!(
            envelope.raw(),
            Err(TransportError::EmptyMessage)
        ));
    }

    #[test]
    fn test_text_and_map_views() {
        let envelope = MessageEnvelope::new("a.b", br#"{"id":"k","n":1}"#.to_vec());
        assert_eq!(envelope.as_text().unwrap(), r#"{"id":"k","n":1}"#);

        let map = envelope.as_map().unwrap();
        assert_eq!(map["id"], json!("k"));
        assert_eq!(map["n"], json!(1));
    }

    #[test]
    fn test_map_rejects_non_json() {
        let envelope = MessageEnvelope::new("a.b", b"plain text".to_vec());
        assert!(matches!(
            envelope.as_map(),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn test_ephemeral_ack_is_noop() {
        let envelope = MessageEnvelope::new("a.b", b"x".to_vec());
        assert!(envelope.ack().is_ok());
        assert!(envelope.nak_with_delay(Duration::from_secs(1)).is_ok());
    }
}
