use async_trait::async_trait;
use std::sync::Arc;

use super::USER_REGISTRATION;
use crate::delay::{DelayProvider, DelayRange};
use crate::envelope::Envelope;
use crate::handler::EventHandler;
use crate::outcome::HandlerError;

const REQUIRED_FIELDS: [&str; 3] = ["user_id", "email", "name"];

/// Derived view of a `USER_REGISTRATION` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub name: String,
    pub email: String,
    pub email_domain: String,
    /// Payload fields, excluding `type` and `_`-prefixed metadata.
    pub data_fields: usize,
    pub missing_fields: Vec<&'static str>,
}

impl RegistrationSummary {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let email = envelope.str_field("email").unwrap_or_default();
        let email_domain = email
            .split('@')
            .nth(1)
            .filter(|domain| !domain.is_empty())
            .unwrap_or("unknown")
            .to_string();

        let data_fields = envelope
            .body()
            .keys()
            .filter(|key| !key.starts_with('_') && key.as_str() != "type")
            .count();

        let missing_fields = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !envelope.has_field(field))
            .collect();

        Self {
            name: envelope.str_field("name").unwrap_or("unknown").to_string(),
            email: email.to_string(),
            email_domain,
            data_fields,
            missing_fields,
        }
    }
}

pub struct UserRegistrationHandler {
    delay: Arc<dyn DelayProvider>,
}

impl UserRegistrationHandler {
    pub fn new(delay: Arc<dyn DelayProvider>) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl EventHandler for UserRegistrationHandler {
    fn event_type(&self) -> &str {
        USER_REGISTRATION
    }

    fn handler_name(&self) -> &str {
        "UserRegistrationHandler"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let summary = RegistrationSummary::from_envelope(envelope);
        log::info!(
            "New user registered: {} ({}), email domain: {}, {} data fields",
            summary.name,
            summary.email,
            summary.email_domain,
            summary.data_fields
        );
        if summary.missing_fields.is_empty() {
            log::debug!("All required registration fields present");
        } else {
            log::warn!(
                "Registration is missing required fields: {}",
                summary.missing_fields.join(", ")
            );
        }

        log::debug!("Validating registration...");
        self.delay.pause(DelayRange::fixed_millis(50)).await;
        log::debug!("Persisting user...");
        self.delay.pause(DelayRange::fixed_millis(100)).await;
        log::debug!("Queueing welcome e-mail");
        Ok(())
    }
}
