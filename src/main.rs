use event_consumer::{forward_shutdown, EventConsumer, HandlerRegistry, TokioDelay, WorkerConfig};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = HandlerRegistry::with_default_handlers(Arc::new(TokioDelay));
    let mut consumer = EventConsumer::new(registry, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Listen for Ctrl+C for graceful shutdown
    tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), shutdown_tx));

    match consumer.run(shutdown_rx).await {
        Ok(()) => {
            log::info!("Application has shut down.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Consumer failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
