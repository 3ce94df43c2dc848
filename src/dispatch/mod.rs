//! Dispatch worker.
//!
//! A single task owns the broker connection and runs purges one at a time,
//! in the order they were submitted. Webhook handlers only ever see a
//! [`DispatchHandle`], which enqueues ids without waiting for the scan.
//!
//! ## Architecture
//! ```text
//! [webhook] --submit(id)--> unbounded FIFO --> [DispatchWorker] --purge--> [broker]
//!                                                    ^
//!                              disconnect notification
//! ```

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::broker::{Broker, BrokerError, Disconnects};
use crate::purge::{purge, ScanOutcome, ScanSettings};
use crate::validation::PurgeId;

/// A purge request waiting for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeRequest {
    pub id: PurgeId,
}

/// Failure to hand a request to the worker.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Purge worker is not running")]
    WorkerUnavailable,
}

/// Conditions that end the process.
///
/// Distinct from [`crate::purge::ScanAbort`], which only ends one scan.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("Broker connection lost: {0}")]
    Disconnected(BrokerError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Create the request channel between webhook handlers and the worker.
pub fn channel() -> (DispatchHandle, PurgeRequests) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DispatchHandle { tx }, PurgeRequests { rx })
}

/// Cloneable entry point used to enqueue purge requests.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<PurgeRequest>,
}

impl DispatchHandle {
    /// Enqueue `id`. Returns as soon as the request is queued.
    pub fn submit(&self, id: PurgeId) -> Result<(), DispatchError> {
        self.tx
            .send(PurgeRequest { id })
            .map_err(|_| DispatchError::WorkerUnavailable)
    }
}

/// Receiving end of the request channel.
#[derive(Debug)]
pub struct PurgeRequests {
    rx: mpsc::UnboundedReceiver<PurgeRequest>,
}

impl PurgeRequests {
    /// Wait for the next request. `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<PurgeRequest> {
        self.rx.recv().await
    }

    /// Take a request if one is already queued.
    pub fn try_recv(&mut self) -> Option<PurgeRequest> {
        self.rx.try_recv().ok()
    }
}

/// The single consumer of purge requests.
pub struct DispatchWorker {
    broker: Box<dyn Broker>,
    settings: ScanSettings,
    requests: PurgeRequests,
    disconnects: Disconnects,
}

impl DispatchWorker {
    pub fn new(
        broker: Box<dyn Broker>,
        settings: ScanSettings,
        requests: PurgeRequests,
        disconnects: Disconnects,
    ) -> Self {
        Self {
            broker,
            settings,
            requests,
            disconnects,
        }
    }

    /// Serve requests until every handle is dropped.
    ///
    /// Each scan runs to completion before the next request is taken. Returns
    /// `Err` on a disconnect notification or any broker failure; the caller is
    /// expected to exit.
    pub async fn run(mut self) -> Result<(), FatalError> {
        info!(queue = %self.settings.queue, "Purge worker started");

        loop {
            tokio::select! {
                Some(e) = self.disconnects.recv() => {
                    error!(queue = %self.settings.queue, error = %e, "Disconnected");
                    return Err(FatalError::Disconnected(e));
                }
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        info!(queue = %self.settings.queue, "Purge worker stopped");
                        return Ok(());
                    };
                    self.dispatch(request).await?;
                }
            }
        }
    }

    async fn dispatch(&self, request: PurgeRequest) -> Result<(), FatalError> {
        let report = purge(self.broker.as_ref(), &self.settings, &request.id)
            .await
            .map_err(|e| {
                error!(
                    value = %request.id,
                    queue = %self.settings.queue,
                    error = %e,
                    "Purge failed"
                );
                FatalError::Broker(e)
            })?;

        match &report.outcome {
            ScanOutcome::Aborted(abort) => warn!(
                value = %request.id,
                queue = %self.settings.queue,
                reason = %abort,
                inspected = report.inspected,
                "Scan aborted"
            ),
            outcome => info!(
                value = %request.id,
                queue = %self.settings.queue,
                outcome = outcome.as_str(),
                inspected = report.inspected,
                requeued = report.requeued,
                "Scan finished"
            ),
        }
        Ok(())
    }
}
