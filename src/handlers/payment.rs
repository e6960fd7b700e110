use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::PAYMENT_PROCESSED;
use crate::delay::{DelayProvider, DelayRange};
use crate::envelope::Envelope;
use crate::handler::EventHandler;
use crate::outcome::HandlerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Success,
    Failed,
    Pending,
    Other(String),
}

impl PaymentStatus {
    pub fn parse(status: Option<&str>) -> Self {
        match status {
            Some("success") => PaymentStatus::Success,
            Some("failed") => PaymentStatus::Failed,
            Some("pending") => PaymentStatus::Pending,
            Some(other) => PaymentStatus::Other(other.to_string()),
            None => PaymentStatus::Other("missing".to_string()),
        }
    }

    /// Follow-up taken for the order the payment belongs to.
    pub fn action(&self) -> String {
        match self {
            PaymentStatus::Success => "payment approved, releasing order".to_string(),
            PaymentStatus::Failed => "payment rejected, notifying customer".to_string(),
            PaymentStatus::Pending => "payment pending, awaiting confirmation".to_string(),
            PaymentStatus::Other(status) => format!("unknown payment status: {}", status),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Success => write!(f, "success"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Other(status) => write!(f, "{}", status),
        }
    }
}

/// Formats an amount as US dollars with thousands separators, e.g. `$1,234.50`.
pub fn format_usd(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSummary {
    pub payment_id: String,
    pub amount: f64,
    pub status: PaymentStatus,
    pub gateway: String,
}

impl PaymentSummary {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            payment_id: envelope.str_field("payment_id").unwrap_or("unknown").to_string(),
            amount: envelope.number_or_zero("amount"),
            status: PaymentStatus::parse(envelope.str_field("status")),
            gateway: envelope.str_field("gateway").unwrap_or("unknown").to_string(),
        }
    }
}

pub struct PaymentHandler {
    delay: Arc<dyn DelayProvider>,
}

impl PaymentHandler {
    pub fn new(delay: Arc<dyn DelayProvider>) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl EventHandler for PaymentHandler {
    fn event_type(&self) -> &str {
        PAYMENT_PROCESSED
    }

    fn handler_name(&self) -> &str {
        "PaymentHandler"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let summary = PaymentSummary::from_envelope(envelope);
        log::info!(
            "Payment {}: {} - {} via {}",
            summary.payment_id,
            summary.status,
            format_usd(summary.amount),
            summary.gateway
        );
        match summary.status {
            PaymentStatus::Other(_) => log::warn!("{}", summary.status.action()),
            _ => log::info!("{}", summary.status.action()),
        }

        log::debug!("Updating order status...");
        self.delay.pause(DelayRange::fixed_millis(80)).await;
        log::debug!("Recording transaction");
        Ok(())
    }
}
