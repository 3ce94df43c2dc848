//! Message broker seam.
//!
//! This module contains:
//! - `Broker` trait: Opens one scan channel per purge
//! - `ScanChannel` trait: Consumes, acknowledges and requeues deliveries
//! - `BrokerError`: Protocol-level failures, all of them fatal
//! - Implementations: AMQP (RabbitMQ), Mock

use async_trait::async_trait;
use tokio::sync::mpsc;

// Implementation modules
pub mod amqp;
pub mod mock;

// Re-exports
pub use amqp::{AmqpBroker, AmqpConfig};
pub use mock::MockBroker;

// ============================================================================
// Traits
// ============================================================================

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors raised by the broker collaborator.
///
/// Every variant indicates broker-protocol breakage. None of them are
/// recovered from: they propagate to the dispatch worker and end the process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Failed to open a channel: {0}")]
    Channel(String),

    #[error("Failed to declare queue '{queue}': {message}")]
    Declare { queue: String, message: String },

    #[error("Failed to register a consumer on '{queue}': {message}")]
    Consume { queue: String, message: String },

    #[error("Failed to receive delivery: {0}")]
    Delivery(String),

    #[error("Consumer stream on '{0}' ended")]
    ConsumerClosed(String),

    #[error("Failed to ack message: {0}")]
    Ack(String),

    #[error("Failed to nack message: {0}")]
    Nack(String),

    #[error("Failed to close channel: {0}")]
    Close(String),

    #[error("Disconnected: {0}")]
    Disconnected(String),
}

/// One delivery received from a queue consumer.
///
/// The broker owns the message until it is handed back through
/// [`ScanChannel::ack`] or [`ScanChannel::requeue`], both of which take it by
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Broker-assigned delivery tag, scoped to the channel it arrived on.
    pub delivery_tag: u64,
    /// Raw message body.
    pub payload: Vec<u8>,
}

/// A dedicated channel with an active manual-ack consumer on one queue.
#[async_trait]
pub trait ScanChannel: Send {
    /// Wait for the next delivery.
    ///
    /// Pending until a message arrives; callers bound the wait themselves.
    async fn next_message(&mut self) -> Result<QueueMessage>;

    /// Permanently remove the message from the queue.
    async fn ack(&mut self, message: QueueMessage) -> Result<()>;

    /// Return the message to the queue for redelivery.
    async fn requeue(&mut self, message: QueueMessage) -> Result<()>;

    /// Close the channel. Deliveries still unresolved go back to the queue.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Connection to the broker holding the target queue.
///
/// Implementations:
/// - `AmqpBroker`: RabbitMQ via AMQP 0.9.1
/// - `MockBroker`: In-memory queue for testing
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a channel, declare `queue` and start consuming from it.
    ///
    /// The queue is declared non-durable, non-exclusive and not
    /// auto-deleted, so it either already exists with those properties or is
    /// created by this call.
    async fn open_scan(&self, queue: &str) -> Result<Box<dyn ScanChannel>>;
}

// ============================================================================
// Disconnect notification
// ============================================================================

/// Create a linked disconnect notifier/receiver pair.
pub fn disconnect_channel() -> (DisconnectNotifier, Disconnects) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DisconnectNotifier(tx), Disconnects(rx))
}

/// Sending half, held by whatever watches the connection.
#[derive(Debug, Clone)]
pub struct DisconnectNotifier(mpsc::UnboundedSender<BrokerError>);

impl DisconnectNotifier {
    /// Report that the connection is gone.
    ///
    /// Callable from synchronous callbacks. Notifications after the receiver
    /// has been dropped are discarded.
    pub fn notify(&self, error: BrokerError) {
        let _ = self.0.send(error);
    }
}

/// Receiving half, owned by the dispatch worker.
#[derive(Debug)]
pub struct Disconnects(mpsc::UnboundedReceiver<BrokerError>);

impl Disconnects {
    /// Wait for the next disconnect notification.
    ///
    /// Returns `None` once every notifier has been dropped.
    pub async fn recv(&mut self) -> Option<BrokerError> {
        self.0.recv().await
    }
}
