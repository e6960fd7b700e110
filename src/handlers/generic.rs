use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::handler::EventHandler;
use crate::outcome::HandlerError;

/// Structural view of an envelope nobody registered a handler for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericSummary {
    pub fields: Vec<String>,
    pub has_string_fields: bool,
    pub has_type: bool,
}

impl GenericSummary {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let body = envelope.body();
        Self {
            fields: body
                .keys()
                .filter(|key| !key.starts_with('_'))
                .cloned()
                .collect(),
            has_string_fields: body.values().any(Value::is_string),
            has_type: envelope.has_field("type"),
        }
    }
}

/// Fallback handler. Inspects the payload and never fails.
#[derive(Debug, Default)]
pub struct GenericHandler;

#[async_trait]
impl EventHandler for GenericHandler {
    fn event_type(&self) -> &str {
        "*"
    }

    fn handler_name(&self) -> &str {
        "GenericHandler"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let summary = GenericSummary::from_envelope(envelope);
        log::info!(
            "Generic processing for {}: fields [{}], string fields: {}, type present: {}",
            envelope.event_type(),
            summary.fields.join(", "),
            summary.has_string_fields,
            summary.has_type
        );
        Ok(())
    }
}
