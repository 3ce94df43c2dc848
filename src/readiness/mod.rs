//! Startup gate on a TCP dependency.
//!
//! Probes `host:port` on a background task at a fixed interval until a
//! connection succeeds. The caller races the probe against an overall
//! deadline; nothing useful runs before the broker is reachable.

use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Default delay between connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
/// Default overall startup deadline.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Dependency never became reachable.
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("Timeout after {timeout:?} waiting on {address} to become available")]
    Timeout { address: String, timeout: Duration },

    #[error("Readiness probe for {address} failed: {message}")]
    Probe { address: String, message: String },
}

/// Block until `address` accepts a TCP connection or `timeout` elapses.
///
/// The connection is dropped straight away: this only checks reachability.
pub async fn wait_for_dependency(
    address: &str,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<(), ReadinessError> {
    let probe = tokio::spawn(probe(address.to_string(), timeout, retry_interval));
    let abort = probe.abort_handle();

    match tokio::time::timeout(timeout, probe).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(message))) => Err(ReadinessError::Probe {
            address: address.to_string(),
            message,
        }),
        Ok(Err(e)) => Err(ReadinessError::Probe {
            address: address.to_string(),
            message: e.to_string(),
        }),
        Err(_) => {
            abort.abort();
            Err(ReadinessError::Timeout {
                address: address.to_string(),
                timeout,
            })
        }
    }
}

fn probe_backoff(retry_interval: Duration) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(retry_interval)
        .with_max_times(usize::MAX)
}

async fn probe(
    address: String,
    dial_timeout: Duration,
    retry_interval: Duration,
) -> Result<(), String> {
    (|| {
        let a = address.clone();
        async move {
            match tokio::time::timeout(dial_timeout, TcpStream::connect(&a)).await {
                Ok(Ok(_stream)) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("dial timed out after {:?}", dial_timeout)),
            }
        }
    })
    .retry(probe_backoff(retry_interval))
    .notify(|err: &String, dur: Duration| {
        warn!(address = %address, error = %err, delay = ?dur, "Problem with dial, retrying");
    })
    .await?;

    info!(address = %address, "Connected to tcp://{}", address);
    Ok(())
}
