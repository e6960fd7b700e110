use async_trait::async_trait;
use std::sync::Arc;

use super::INVENTORY_UPDATE;
use crate::delay::{DelayProvider, DelayRange};
use crate::envelope::Envelope;
use crate::handler::EventHandler;
use crate::outcome::HandlerError;

const BATCH_COUNT: usize = 10;
const BATCHING_THRESHOLD: i64 = 100;
const STEPS: [&str; 3] = ["Validating product", "Updating stock records", "Notifying purchasing"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryOperation {
    Add,
    Remove,
    Set,
    Reserve,
    Other(String),
}

impl InventoryOperation {
    pub fn parse(operation: Option<&str>) -> Self {
        match operation {
            Some("add") => InventoryOperation::Add,
            Some("remove") => InventoryOperation::Remove,
            Some("set") => InventoryOperation::Set,
            Some("reserve") => InventoryOperation::Reserve,
            Some(other) => InventoryOperation::Other(other.to_string()),
            None => InventoryOperation::Other("missing".to_string()),
        }
    }

    pub fn description(&self) -> String {
        match self {
            InventoryOperation::Add => "adding to stock".to_string(),
            InventoryOperation::Remove => "removing from stock".to_string(),
            InventoryOperation::Set => "setting stock level".to_string(),
            InventoryOperation::Reserve => "reserving items".to_string(),
            InventoryOperation::Other(op) => format!("unknown operation: {}", op),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventorySummary {
    pub product_id: String,
    pub quantity: i64,
    pub operation: InventoryOperation,
    pub warehouse: String,
    /// Per-batch quantities when a large restock is split up.
    pub batches: Vec<i64>,
}

impl InventorySummary {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let quantity = envelope.number_or_zero("quantity").trunc() as i64;
        let operation = InventoryOperation::parse(envelope.str_field("operation"));

        let batches = if operation == InventoryOperation::Add && quantity > BATCHING_THRESHOLD {
            vec![quantity / BATCH_COUNT as i64; BATCH_COUNT]
        } else {
            Vec::new()
        };

        Self {
            product_id: envelope.str_field("product_id").unwrap_or("unknown").to_string(),
            quantity,
            operation,
            warehouse: envelope.str_field("warehouse").unwrap_or("unknown").to_string(),
            batches,
        }
    }
}

pub struct InventoryHandler {
    delay: Arc<dyn DelayProvider>,
}

impl InventoryHandler {
    pub fn new(delay: Arc<dyn DelayProvider>) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl EventHandler for InventoryHandler {
    fn event_type(&self) -> &str {
        INVENTORY_UPDATE
    }

    fn handler_name(&self) -> &str {
        "InventoryHandler"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let summary = InventorySummary::from_envelope(envelope);
        log::info!(
            "Stock {}: {} units in {} ({})",
            summary.product_id,
            summary.quantity,
            summary.warehouse,
            summary.operation.description()
        );
        if !summary.batches.is_empty() {
            log::info!(
                "Processing in {} batches of {}",
                summary.batches.len(),
                summary.batches[0]
            );
        }

        for step in STEPS {
            log::debug!("{}...", step);
            self.delay.pause(DelayRange::fixed_millis(30)).await;
        }
        Ok(())
    }
}
