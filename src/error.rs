use thiserror::Error;

/// Errors that end a consumer's run.
///
/// Malformed payloads and handler failures never surface here: they are
/// settled per delivery (see [`crate::ack`]) and counted in the statistics.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Error originating from the underlying `lapin` library.
    #[error("RabbitMQ communication error: {0}")]
    Lapin(#[from] lapin::Error),

    /// The delivery stream ended without a shutdown request.
    #[error("Consumer stream for queue '{queue}' closed unexpectedly")]
    StreamClosed { queue: String },

    /// Invalid or missing configuration value.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl WorkerError {
    pub fn config(message: impl Into<String>) -> Self {
        WorkerError::Config { message: message.into() }
    }

    /// Transport failures are fatal to the consumer instance.
    pub fn is_transport(&self) -> bool {
        matches!(self, WorkerError::Lapin(_) | WorkerError::StreamClosed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_is_not_transport() {
        let err = WorkerError::config("RABBITMQ_PORT must be a number");
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "Configuration error: RABBITMQ_PORT must be a number");
    }

    #[test]
    fn test_stream_closed_is_transport() {
        let err = WorkerError::StreamClosed { queue: "orders".to_string() };
        assert!(err.is_transport());
    }
}
