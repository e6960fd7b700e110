//! Acknowledgment policy for settled deliveries.
//!
//! | Outcome            | Action                    |
//! |--------------------|---------------------------|
//! | `Success`          | ack                       |
//! | `HandlerFailure`   | nack, requeue             |
//! | `DecodeFailure`    | nack, drop (no requeue)   |
//!
//! A malformed payload fails identically on every redelivery, so requeueing
//! it would loop forever.

use async_trait::async_trait;
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicNackOptions},
};
use std::fmt;

use crate::error::WorkerError;
use crate::outcome::ProcessingOutcome;

/// Terminal action for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Ack,
    NackRequeue,
    NackDrop,
}

impl AckDecision {
    pub fn for_outcome(outcome: &ProcessingOutcome) -> Self {
        match outcome {
            ProcessingOutcome::Success { .. } => AckDecision::Ack,
            ProcessingOutcome::HandlerFailure { .. } => AckDecision::NackRequeue,
            ProcessingOutcome::DecodeFailure { .. } => AckDecision::NackDrop,
        }
    }

    pub fn requeues(&self) -> bool {
        matches!(self, AckDecision::NackRequeue)
    }
}

impl fmt::Display for AckDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckDecision::Ack => write!(f, "acked"),
            AckDecision::NackRequeue => write!(f, "nacked (requeued)"),
            AckDecision::NackDrop => write!(f, "nacked (dropped)"),
        }
    }
}

/// Broker-side settlement of a single delivery.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> Result<(), WorkerError>;
    async fn nack(&self, requeue: bool) -> Result<(), WorkerError>;
}

#[async_trait]
impl Acknowledge for Acker {
    async fn ack(&self) -> Result<(), WorkerError> {
        Acker::ack(self, BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), WorkerError> {
        Acker::nack(
            self,
            BasicNackOptions {
                requeue,
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }
}

/// A delivery awaiting its terminal action.
///
/// [`settle`](PendingDelivery::settle) consumes the value, so a delivery
/// cannot be acked or nacked twice.
#[must_use = "an unsettled delivery blocks the consumer's only prefetch slot"]
pub struct PendingDelivery<A> {
    delivery_tag: u64,
    acker: A,
}

impl<A: Acknowledge> PendingDelivery<A> {
    pub fn new(delivery_tag: u64, acker: A) -> Self {
        Self {
            delivery_tag,
            acker,
        }
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    pub async fn settle(self, decision: AckDecision) -> Result<AckDecision, WorkerError> {
        match decision {
            AckDecision::Ack => self.acker.ack().await?,
            AckDecision::NackRequeue => self.acker.nack(true).await?,
            AckDecision::NackDrop => self.acker.nack(false).await?,
        }
        log::debug!("Delivery {} {}", self.delivery_tag, decision);
        Ok(decision)
    }
}
