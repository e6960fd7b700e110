//! Per-delivery processing results.

use std::time::Duration;
use thiserror::Error;

use crate::envelope::DecodeError;

/// Failure raised by an [`EventHandler`](crate::handler::EventHandler).
///
/// Handler failures are treated as transient and the delivery is requeued.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The event asks for something this consumer cannot provide.
    #[error("unsupported {capability}: {value}")]
    Unsupported { capability: &'static str, value: String },

    /// The handler did not finish within the configured timeout.
    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),
}

/// Result of pushing one delivery through decode and dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Success { elapsed: Duration },
    DecodeFailure { reason: String },
    HandlerFailure { reason: String },
}

impl ProcessingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            ProcessingOutcome::Success { elapsed } => Some(*elapsed),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ProcessingOutcome::Success { .. } => None,
            ProcessingOutcome::DecodeFailure { reason }
            | ProcessingOutcome::HandlerFailure { reason } => Some(reason),
        }
    }
}

impl From<&DecodeError> for ProcessingOutcome {
    fn from(err: &DecodeError) -> Self {
        ProcessingOutcome::DecodeFailure {
            reason: err.to_string(),
        }
    }
}

impl From<&HandlerError> for ProcessingOutcome {
    fn from(err: &HandlerError) -> Self {
        ProcessingOutcome::HandlerFailure {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let ok = ProcessingOutcome::Success {
            elapsed: Duration::from_millis(250),
        };
        assert!(ok.is_success());
        assert_eq!(ok.elapsed(), Some(Duration::from_millis(250)));
        assert_eq!(ok.reason(), None);

        let failed = ProcessingOutcome::from(&HandlerError::Unsupported {
            capability: "notification channel",
            value: "carrier_pigeon".to_string(),
        });
        assert!(failed.is_error());
        assert_eq!(failed.elapsed(), None);
        assert_eq!(
            failed.reason(),
            Some("unsupported notification channel: carrier_pigeon")
        );
    }
}
