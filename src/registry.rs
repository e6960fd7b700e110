//! Routing of decoded envelopes to their handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::delay::{DelayProvider, DelayRange};
use crate::envelope::Envelope;
use crate::handler::EventHandler;
use crate::handlers::{
    GenericHandler, InventoryHandler, NotificationHandler, OrderHandler, PaymentHandler,
    UserRegistrationHandler,
};
use crate::outcome::{HandlerError, ProcessingOutcome};

/// Variable processing cost applied after every handler, whatever its result.
pub const DEFAULT_SETTLE_DELAY: DelayRange = DelayRange {
    min: Duration::from_millis(200),
    max: Duration::from_millis(500),
};

/// Maps type tags to handlers, falling back to a structural handler for
/// anything unregistered.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    fallback: Arc<dyn EventHandler>,
    delay: Arc<dyn DelayProvider>,
    settle_delay: DelayRange,
    timeout: Option<Duration>,
}

impl HandlerRegistry {
    /// An empty registry: every envelope goes to [`GenericHandler`].
    pub fn new(delay: Arc<dyn DelayProvider>) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(GenericHandler),
            delay,
            settle_delay: DEFAULT_SETTLE_DELAY,
            timeout: None,
        }
    }

    /// A registry with the five built-in business event handlers.
    pub fn with_default_handlers(delay: Arc<dyn DelayProvider>) -> Self {
        let mut registry = Self::new(delay.clone());
        registry.register(Arc::new(UserRegistrationHandler::new(delay.clone())));
        registry.register(Arc::new(OrderHandler::new(delay.clone())));
        registry.register(Arc::new(PaymentHandler::new(delay.clone())));
        registry.register(Arc::new(InventoryHandler::new(delay.clone())));
        registry.register(Arc::new(NotificationHandler::new(delay)));
        registry
    }

    /// Registers a handler under its own type tag, returning any handler it replaced.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) -> Option<Arc<dyn EventHandler>> {
        let tag = handler.event_type().to_string();
        log::debug!("Registering {} for '{}'", handler.handler_name(), tag);
        self.handlers.insert(tag, handler)
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn EventHandler>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: DelayRange) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Bounds handler execution; an overrun counts as a handler failure.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registered tags, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Exact-match lookup, else the fallback.
    pub fn resolve(&self, event_type: &str) -> &Arc<dyn EventHandler> {
        self.handlers.get(event_type).unwrap_or(&self.fallback)
    }

    /// Runs the matching handler, then the settle delay.
    ///
    /// The elapsed time covers both and is only reported for successes.
    pub async fn dispatch(&self, envelope: &Envelope) -> ProcessingOutcome {
        let start = Instant::now();
        let handler = self.resolve(envelope.event_type());

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, handler.handle(envelope))
                .await
                .unwrap_or(Err(HandlerError::TimedOut(limit))),
            None => handler.handle(envelope).await,
        };

        self.delay.pause(self.settle_delay).await;

        match result {
            Ok(()) => ProcessingOutcome::Success {
                elapsed: start.elapsed(),
            },
            Err(err) => {
                log::warn!("{} failed: {}", handler.handler_name(), err);
                ProcessingOutcome::from(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::{NoDelay, TokioDelay};
    use crate::envelope::envelope_from;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        tag: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn event_type(&self) -> &str {
            self.tag
        }

        fn handler_name(&self) -> &str {
            "CountingHandler"
        }

        async fn handle(&self, _envelope: &Envelope) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl EventHandler for SlowHandler {
        fn event_type(&self) -> &str {
            "SLOW"
        }

        fn handler_name(&self) -> &str {
            "SlowHandler"
        }

        async fn handle(&self, _envelope: &Envelope) -> Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[test]
    fn test_default_handlers_registered() {
        let registry = HandlerRegistry::with_default_handlers(Arc::new(NoDelay));
        assert_eq!(
            registry.event_types(),
            vec![
                "INVENTORY_UPDATE",
                "NOTIFICATION_SEND",
                "ORDER_CREATED",
                "PAYMENT_PROCESSED",
                "USER_REGISTRATION"
            ]
        );
        assert_eq!(registry.resolve("ORDER_CREATED").handler_name(), "OrderHandler");
        assert_eq!(registry.resolve("order_created").handler_name(), "GenericHandler");
    }

    #[tokio::test]
    async fn test_registering_new_type_routes_to_it() {
        let mut registry = HandlerRegistry::new(Arc::new(NoDelay));
        let handler = Arc::new(CountingHandler {
            tag: "SHIPMENT_DISPATCHED",
            calls: AtomicUsize::new(0),
        });
        assert!(registry.register(handler.clone()).is_none());

        let envelope = envelope_from(json!({"type": "SHIPMENT_DISPATCHED"}));
        let outcome = registry.dispatch(&envelope).await;

        assert!(outcome.is_success());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_type_uses_fallback() {
        let fallback = Arc::new(CountingHandler {
            tag: "*",
            calls: AtomicUsize::new(0),
        });
        let registry =
            HandlerRegistry::with_default_handlers(Arc::new(NoDelay)).with_fallback(fallback.clone());

        let outcome = registry.dispatch(&envelope_from(json!({"no_type": true}))).await;

        assert!(outcome.is_success());
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_order_dispatch_succeeds() {
        let registry = HandlerRegistry::with_default_handlers(Arc::new(NoDelay));
        let envelope = envelope_from(json!({
            "type": "ORDER_CREATED",
            "items": [
                {"product_id": "a", "quantity": 2, "price": 30},
                {"product_id": "b", "quantity": 1, "price": 60}
            ],
            "total": 120
        }));
        assert!(registry.dispatch(&envelope).await.is_success());
    }

    #[tokio::test]
    async fn test_unsupported_channel_is_handler_failure() {
        let registry = HandlerRegistry::with_default_handlers(Arc::new(NoDelay));
        let envelope = envelope_from(json!({"type": "NOTIFICATION_SEND", "channel": "carrier_pigeon"}));

        assert_eq!(
            registry.dispatch(&envelope).await,
            ProcessingOutcome::HandlerFailure {
                reason: "unsupported notification channel: carrier_pigeon".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_applies_after_failure_too() {
        let registry = HandlerRegistry::with_default_handlers(Arc::new(TokioDelay))
            .with_settle_delay(DelayRange::fixed_millis(300));
        let envelope = envelope_from(json!({"type": "NOTIFICATION_SEND", "channel": "fax"}));

        let start = tokio::time::Instant::now();
        let outcome = registry.dispatch(&envelope).await;

        assert!(outcome.is_error());
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_handler_failure() {
        let mut registry = HandlerRegistry::new(Arc::new(NoDelay))
            .with_timeout(Some(Duration::from_millis(100)));
        registry.register(Arc::new(SlowHandler));

        let outcome = registry.dispatch(&envelope_from(json!({"type": "SLOW"}))).await;

        assert_eq!(
            outcome,
            ProcessingOutcome::HandlerFailure {
                reason: "handler timed out after 100ms".to_string()
            }
        );
    }
}
