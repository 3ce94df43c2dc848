//! queue-purge: webhook-triggered message removal
//!
//! ## Architecture
//! ```text
//! [client] --POST /webhook/purge/{id}--> [webhook] --> [dispatch worker] --> [RabbitMQ queue]
//! ```
//!
//! ## Startup
//! 1. Resolve configuration (file, env, flags)
//! 2. Wait for the broker's TCP port to accept connections
//! 3. Open the AMQP connection
//! 4. Serve the webhook until the worker hits a fatal error
//!
//! ## Configuration
//! - AMQP_CONNECTION_STRING: broker URL (overrides file and flags when set)
//! - AMQP_QUEUE_NAME: queue to scan
//! - AMQP_JSON_PATH: JSON path of the id field
//! - QUEUE_PURGE_LOG: log filter (default: info)

use clap::Parser;
use tracing::{error, info};

use queue_purge::broker::AmqpBroker;
use queue_purge::config::{Cli, Config};
use queue_purge::dispatch::{self, DispatchWorker};
use queue_purge::handlers::webhook;
use queue_purge::readiness::wait_for_dependency;
use queue_purge::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::resolve(&cli)?;
    let settings = config.scan_settings()?;
    let address = config.amqp.dependency_address()?;

    info!(
        address = %address,
        timeout = ?config.startup.timeout,
        "Waiting for broker"
    );
    wait_for_dependency(
        &address,
        config.startup.timeout,
        config.startup.retry_interval,
    )
    .await?;

    let (broker, disconnects) = AmqpBroker::connect(&config.amqp).await?;

    let (handle, requests) = dispatch::channel();
    let worker = DispatchWorker::new(Box::new(broker), settings, requests, disconnects);
    let mut worker = tokio::spawn(worker.run());

    info!(
        queue = %config.amqp.queue,
        jsonpath = %config.scan.jsonpath,
        "queue-purge started"
    );

    tokio::select! {
        served = webhook::serve(handle, &config.server.host, config.server.port) => {
            worker.abort();
            if let Err(e) = served {
                error!(error = %e, "Webhook server failed");
                let e: Box<dyn std::error::Error> = e;
                return Err(e);
            }
        }
        finished = &mut worker => {
            match finished {
                Ok(Ok(())) => info!("Purge worker exited"),
                Ok(Err(e)) => {
                    error!(error = %e, "Fatal error, shutting down");
                    return Err(e.into());
                }
                Err(e) => {
                    error!(error = %e, "Purge worker panicked");
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
