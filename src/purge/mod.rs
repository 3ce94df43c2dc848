//! Scan engine.
//!
//! A scan walks one queue looking for the message whose extracted field
//! equals the purge id. The match is acked; everything else inspected is
//! requeued. Since requeued messages come round again, seeing a field value
//! for the second time means the whole queue has been inspected.
//!
//! ## State machine
//! ```text
//!                  delivery (new value, no match) / requeue
//!                 +---------------------------+
//!                 v                           |
//!         AwaitingMessage --------------------+
//!           |    |    |    |
//!           |    |    |    +-- idle timer ------------------> TimedOut
//!           |    |    +------- repeated value / requeue -----> DuplicateExhausted
//!           |    +------------ bad JSON or field / requeue --> Aborted
//!           +----------------- value == id / ack ------------> Matched
//! ```

mod extract;

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerError, QueueMessage, ScanChannel};
use crate::validation::PurgeId;

pub use extract::{FieldExtractor, DEFAULT_JSONPATH};

/// Default bound on idle time between deliveries.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a scan needs besides the broker and the id.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Queue to scan.
    pub queue: String,
    /// Selects the field compared against the purge id.
    pub extractor: FieldExtractor,
    /// Longest wait for the next delivery before the scan gives up.
    pub idle_timeout: Duration,
}

/// Why a scan stopped early on a message it could not interpret.
///
/// Recoverable: the message is requeued and the next purge runs normally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanAbort {
    #[error("Failed to unmarshal JSON: {0}")]
    MalformedPayload(String),

    #[error("Failed to get JSON field '{path}': {message}")]
    FieldExtraction { path: String, message: String },
}

/// How a finished scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The matching message was acked.
    Matched,
    /// A field value came round a second time without a match.
    DuplicateExhausted,
    /// No delivery arrived within the idle timeout.
    TimedOut,
    /// A message could not be interpreted.
    Aborted(ScanAbort),
}

impl ScanOutcome {
    /// Short label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Matched => "matched",
            ScanOutcome::DuplicateExhausted => "exhausted",
            ScanOutcome::TimedOut => "timeout",
            ScanOutcome::Aborted(_) => "aborted",
        }
    }
}

/// State of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    AwaitingMessage,
    Finished(ScanOutcome),
}

/// What to do with the delivery that caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Ack,
    Requeue,
}

/// Result of feeding one delivery to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub resolution: Resolution,
    pub next: ScanState,
}

/// Per-scan state: the target, the values seen so far, and where the scan is.
#[derive(Debug)]
pub struct Scan<'a> {
    target: &'a str,
    extractor: &'a FieldExtractor,
    seen: HashSet<String>,
    state: ScanState,
}

impl<'a> Scan<'a> {
    pub fn new(target: &'a str, extractor: &'a FieldExtractor) -> Self {
        Self {
            target,
            extractor,
            seen: HashSet::new(),
            state: ScanState::AwaitingMessage,
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Feed one delivered payload.
    ///
    /// Every payload whose field extracts is logged as read, before the
    /// repeat and match checks. Must only be called while awaiting a message.
    pub fn on_message(&mut self, payload: &[u8]) -> Transition {
        debug_assert_eq!(self.state, ScanState::AwaitingMessage);

        let (resolution, next) = match self.classify(payload) {
            Err(abort) => (
                Resolution::Requeue,
                ScanState::Finished(ScanOutcome::Aborted(abort)),
            ),
            Ok(value) => {
                info!(value = %value, "Read");
                if self.seen.contains(&value) {
                    (
                        Resolution::Requeue,
                        ScanState::Finished(ScanOutcome::DuplicateExhausted),
                    )
                } else {
                    let matched = value == self.target;
                    self.seen.insert(value);
                    if matched {
                        (Resolution::Ack, ScanState::Finished(ScanOutcome::Matched))
                    } else {
                        (Resolution::Requeue, ScanState::AwaitingMessage)
                    }
                }
            }
        };

        self.state = next.clone();
        Transition { resolution, next }
    }

    /// The idle timer fired.
    pub fn on_timeout(&mut self) -> ScanState {
        if self.state == ScanState::AwaitingMessage {
            self.state = ScanState::Finished(ScanOutcome::TimedOut);
        }
        self.state.clone()
    }

    fn classify(&self, payload: &[u8]) -> Result<String, ScanAbort> {
        let document: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| ScanAbort::MalformedPayload(e.to_string()))?;
        self.extractor
            .extract(&document)
            .map_err(|message| ScanAbort::FieldExtraction {
                path: self.extractor.expression().to_string(),
                message,
            })
    }
}

/// Summary of a finished scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    /// Deliveries received.
    pub inspected: usize,
    /// Deliveries returned to the queue.
    pub requeued: usize,
}

/// Scan `settings.queue` for the message carrying `id` and ack it.
///
/// Opens a dedicated channel, which is closed on every exit path. Returns
/// `Err` only for broker-protocol failures, which the caller treats as fatal.
pub async fn purge(
    broker: &dyn Broker,
    settings: &ScanSettings,
    id: &PurgeId,
) -> Result<ScanReport, BrokerError> {
    let mut channel = broker.open_scan(&settings.queue).await?;

    match drive(channel.as_mut(), settings, id).await {
        Ok(report) => {
            channel.close().await?;
            Ok(report)
        }
        Err(e) => {
            if let Err(close_err) = channel.close().await {
                debug!(error = %close_err, "Failed to close channel after broker error");
            }
            Err(e)
        }
    }
}

async fn drive(
    channel: &mut dyn ScanChannel,
    settings: &ScanSettings,
    id: &PurgeId,
) -> Result<ScanReport, BrokerError> {
    let queue = settings.queue.as_str();
    let mut scan = Scan::new(id.as_str(), &settings.extractor);
    let mut inspected = 0;
    let mut requeued = 0;

    // The timeout is re-armed for every delivery.
    let outcome = loop {
        let message: QueueMessage =
            match tokio::time::timeout(settings.idle_timeout, channel.next_message()).await {
                Ok(message) => message?,
                Err(_) => {
                    scan.on_timeout();
                    info!(value = %id, queue = %queue, "Done (timeout)");
                    break ScanOutcome::TimedOut;
                }
            };
        inspected += 1;

        let transition = scan.on_message(&message.payload);
        match transition.resolution {
            Resolution::Ack => channel.ack(message).await?,
            Resolution::Requeue => {
                channel.requeue(message).await?;
                requeued += 1;
            }
        }

        match transition.next {
            ScanState::AwaitingMessage => {}
            ScanState::Finished(outcome) => {
                match &outcome {
                    ScanOutcome::Matched => info!(value = %id, queue = %queue, "Deleted"),
                    ScanOutcome::DuplicateExhausted => info!(value = %id, queue = %queue, "Done"),
                    ScanOutcome::Aborted(abort @ ScanAbort::MalformedPayload(_)) => {
                        warn!(queue = %queue, error = %abort, "Failed to unmarshal JSON")
                    }
                    ScanOutcome::Aborted(abort @ ScanAbort::FieldExtraction { .. }) => warn!(
                        queue = %queue,
                        jsonpath = %settings.extractor.expression(),
                        error = %abort,
                        "Failed to get JSON field"
                    ),
                    ScanOutcome::TimedOut => {}
                }
                break outcome;
            }
        }
    };

    Ok(ScanReport {
        outcome,
        inspected,
        requeued,
    })
}
