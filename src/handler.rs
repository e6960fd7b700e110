//! Defines the capability trait implemented by every event handler.

use crate::envelope::Envelope;
use crate::outcome::HandlerError;
use async_trait::async_trait;

/// Processes envelopes carrying one particular type tag.
///
/// Implementations are registered in a
/// [`HandlerRegistry`](crate::registry::HandlerRegistry) under the tag
/// returned by [`event_type`](EventHandler::event_type). Adding a new event
/// type means registering a new implementer.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// The exact type tag this handler serves.
    fn event_type(&self) -> &str;

    /// A name for the handler, used for logging and identification.
    fn handler_name(&self) -> &str;

    /// Processes a single decoded envelope.
    ///
    /// Returning `Err` causes the delivery to be requeued, so only fail for
    /// conditions a later attempt could plausibly get past.
    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError>;
}
