use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::ORDER_CREATED;
use crate::delay::{DelayProvider, DelayRange};
use crate::envelope::Envelope;
use crate::handler::EventHandler;
use crate::outcome::HandlerError;

/// Items priced above this count as expensive.
const EXPENSIVE_PRICE: f64 = 50.0;

/// Derived figures for an `ORDER_CREATED` event.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub order_id: String,
    pub total: f64,
    pub total_items: f64,
    pub avg_price: f64,
    pub expensive_items: usize,
    pub product_ids: Vec<String>,
}

impl OrderSummary {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let items = envelope.array_or_empty("items");
        let total = envelope.number_or_zero("total");

        let total_items: f64 = items
            .iter()
            .map(|item| item.get("quantity").and_then(Value::as_f64).unwrap_or(0.0))
            .sum();
        let avg_price = if total_items > 0.0 {
            total / total_items
        } else {
            0.0
        };

        let expensive_items = items
            .iter()
            .filter_map(|item| item.get("price").and_then(Value::as_f64))
            .filter(|price| *price > EXPENSIVE_PRICE)
            .count();

        let product_ids = items
            .iter()
            .filter_map(|item| item.get("product_id").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            order_id: envelope.str_field("order_id").unwrap_or("unknown").to_string(),
            total,
            total_items,
            avg_price,
            expensive_items,
            product_ids,
        }
    }
}

pub struct OrderHandler {
    delay: Arc<dyn DelayProvider>,
}

impl OrderHandler {
    pub fn new(delay: Arc<dyn DelayProvider>) -> Self {
        Self { delay }
    }

    async fn step(&self, name: &str) {
        log::debug!("{}...", name);
        self.delay.pause(DelayRange::between_millis(50, 150)).await;
    }
}

#[async_trait]
impl EventHandler for OrderHandler {
    fn event_type(&self) -> &str {
        ORDER_CREATED
    }

    fn handler_name(&self) -> &str {
        "OrderHandler"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let summary = OrderSummary::from_envelope(envelope);
        log::info!(
            "New order {} - total ${:.2}, {} items, avg price ${:.2}, {} expensive (>${}), products: [{}]",
            summary.order_id,
            summary.total,
            summary.total_items,
            summary.avg_price,
            summary.expensive_items,
            EXPENSIVE_PRICE,
            summary.product_ids.join(", ")
        );

        // Independent sub-steps, joined before the handler returns.
        tokio::join!(
            self.step("Checking stock"),
            self.step("Calculating freight"),
            self.step("Issuing invoice"),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::NoDelay;
    use crate::envelope::envelope_from;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_order_figures() {
        let envelope = envelope_from(json!({
            "type": "ORDER_CREATED",
            "items": [
                {"product_id": "a", "quantity": 2, "price": 30},
                {"product_id": "b", "quantity": 1, "price": 60}
            ],
            "total": 120
        }));
        let summary = OrderSummary::from_envelope(&envelope);

        assert_eq!(summary.total_items, 3.0);
        assert_eq!(format!("{:.2}", summary.avg_price), "40.00");
        assert_eq!(summary.expensive_items, 1);
        assert_eq!(summary.product_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_items_and_total_default_to_zero() {
        let envelope = envelope_from(json!({"type": "ORDER_CREATED", "order_id": "o-9"}));
        let summary = OrderSummary::from_envelope(&envelope);

        assert_eq!(summary.order_id, "o-9");
        assert_eq!(summary.total, 0.0);
        assert_eq!(summary.total_items, 0.0);
        assert_eq!(summary.avg_price, 0.0);
        assert!(summary.product_ids.is_empty());
    }

    #[test]
    fn test_item_without_quantity_counts_as_zero() {
        let envelope = envelope_from(json!({
            "type": "ORDER_CREATED",
            "items": [{"price": 10}, {"product_id": "", "quantity": 4, "price": 51}],
            "total": 8
        }));
        let summary = OrderSummary::from_envelope(&envelope);

        assert_eq!(summary.total_items, 4.0);
        assert_eq!(summary.avg_price, 2.0);
        assert_eq!(summary.expensive_items, 1);
        assert!(summary.product_ids.is_empty());
    }

    #[tokio::test]
    async fn test_handler_succeeds() {
        let handler = OrderHandler::new(Arc::new(NoDelay));
        let envelope = envelope_from(json!({"type": "ORDER_CREATED", "items": []}));
        assert!(handler.handle(&envelope).await.is_ok());
    }

    /// Sleeps the same fixed time whatever range it is asked for.
    struct FixedDelay(Duration);

    #[async_trait]
    impl DelayProvider for FixedDelay {
        async fn pause(&self, _range: DelayRange) -> Duration {
            tokio::time::sleep(self.0).await;
            self.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_steps_run_concurrently() {
        let handler = OrderHandler::new(Arc::new(FixedDelay(Duration::from_millis(100))));
        let envelope = envelope_from(json!({"type": "ORDER_CREATED"}));

        let start = tokio::time::Instant::now();
        handler.handle(&envelope).await.unwrap();
        let elapsed = start.elapsed();

        // Three 100ms steps run one after another would take 300ms.
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
    }
}
