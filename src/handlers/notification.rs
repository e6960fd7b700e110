use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

use super::NOTIFICATION_SEND;
use crate::delay::{DelayProvider, DelayRange};
use crate::envelope::Envelope;
use crate::handler::EventHandler;
use crate::outcome::HandlerError;

/// Delivery channels this consumer can send through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
}

impl FromStr for NotificationChannel {
    type Err = HandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(NotificationChannel::Email),
            "sms" => Ok(NotificationChannel::Sms),
            "push" => Ok(NotificationChannel::Push),
            other => Err(HandlerError::Unsupported {
                capability: "notification channel",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn from_level(level: i64) -> Self {
        match level {
            l if l >= 4 => Priority::High,
            l if l >= 2 => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSummary {
    pub notification_id: String,
    pub recipient: String,
    pub channel: NotificationChannel,
    pub level: i64,
    pub priority: Priority,
    pub message_bytes: usize,
}

impl NotificationSummary {
    /// Fails when the channel is missing or not one we can send through.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, HandlerError> {
        let channel = envelope
            .str_field("channel")
            .ok_or_else(|| HandlerError::Unsupported {
                capability: "notification channel",
                value: "<missing>".to_string(),
            })?
            .parse::<NotificationChannel>()?;

        let level = envelope
            .field("priority")
            .and_then(|p| p.as_f64())
            .map(|p| p.trunc() as i64)
            .unwrap_or(1);

        Ok(Self {
            notification_id: envelope
                .str_field("notification_id")
                .unwrap_or("unknown")
                .to_string(),
            recipient: envelope.str_field("recipient").unwrap_or("unknown").to_string(),
            channel,
            level,
            priority: Priority::from_level(level),
            message_bytes: envelope.str_field("message").map(str::len).unwrap_or(0),
        })
    }
}

pub struct NotificationHandler {
    delay: Arc<dyn DelayProvider>,
}

impl NotificationHandler {
    pub fn new(delay: Arc<dyn DelayProvider>) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn event_type(&self) -> &str {
        NOTIFICATION_SEND
    }

    fn handler_name(&self) -> &str {
        "NotificationHandler"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let summary = NotificationSummary::from_envelope(envelope)?;
        log::info!(
            "Notification {}: {:?} to {}, priority {:?} ({}/5), {} bytes",
            summary.notification_id,
            summary.channel,
            summary.recipient,
            summary.priority,
            summary.level,
            summary.message_bytes
        );

        self.delay.pause(DelayRange::fixed_millis(20)).await;
        log::debug!("Notification handed to {:?} gateway", summary.channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::NoDelay;
    use crate::envelope::envelope_from;
    use serde_json::json;

    #[test]
    fn test_priority_buckets() {
        assert_eq!(Priority::from_level(5), Priority::High);
        assert_eq!(Priority::from_level(4), Priority::High);
        assert_eq!(Priority::from_level(3), Priority::Medium);
        assert_eq!(Priority::from_level(1), Priority::Low);
        assert_eq!(Priority::from_level(-2), Priority::Low);
    }

    #[test]
    fn test_summary_defaults_and_byte_length() {
        let envelope = envelope_from(json!({
            "type": "NOTIFICATION_SEND",
            "channel": "sms",
            "message": "olá"
        }));
        let summary = NotificationSummary::from_envelope(&envelope).unwrap();

        assert_eq!(summary.channel, NotificationChannel::Sms);
        assert_eq!(summary.level, 1);
        assert_eq!(summary.priority, Priority::Low);
        assert_eq!(summary.message_bytes, 4);
    }

    #[tokio::test]
    async fn test_unsupported_channel_fails() {
        let handler = NotificationHandler::new(Arc::new(NoDelay));
        let envelope = envelope_from(json!({
            "type": "NOTIFICATION_SEND",
            "channel": "carrier_pigeon",
            "recipient": "someone"
        }));

        let err = handler.handle(&envelope).await.unwrap_err();
        assert_eq!(err.to_string(), "unsupported notification channel: carrier_pigeon");
    }

    #[tokio::test]
    async fn test_missing_channel_fails() {
        let handler = NotificationHandler::new(Arc::new(NoDelay));
        let envelope = envelope_from(json!({"type": "NOTIFICATION_SEND"}));
        assert!(matches!(
            handler.handle(&envelope).await,
            Err(HandlerError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_supported_channel_succeeds() {
        let handler = NotificationHandler::new(Arc::new(NoDelay));
        let envelope = envelope_from(json!({"type": "NOTIFICATION_SEND", "channel": "push", "priority": 4}));
        assert!(handler.handle(&envelope).await.is_ok());
    }
}
