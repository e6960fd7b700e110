//! # Event Consumer
//! A RabbitMQ consumer for typed JSON business events: each delivery is
//! decoded, dispatched to a handler chosen by its `type` tag, acknowledged or
//! rejected according to the outcome, and counted in running statistics.

pub mod ack;
pub mod delay;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod outcome;
pub mod registry;
pub mod stats;
pub mod worker;

// Re-export key components for easy access
pub use ack::{AckDecision, Acknowledge, PendingDelivery};
pub use delay::{DelayProvider, DelayRange, NoDelay, TokioDelay};
pub use envelope::{decode, DecodeError, Envelope, EventMeta};
pub use error::WorkerError;
pub use handler::EventHandler;
pub use outcome::{HandlerError, ProcessingOutcome};
pub use registry::HandlerRegistry;
pub use stats::{ConsumerStats, StatsSummary};
pub use worker::{forward_shutdown, DeliveryReport, EventConsumer, IncomingDelivery, WorkerConfig};
