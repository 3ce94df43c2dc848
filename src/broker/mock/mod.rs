//! Mock broker implementation for testing.
//!
//! Models the parts of broker behaviour a scan depends on: requeued messages
//! are redelivered after everything already waiting, and deliveries a channel
//! never resolved go back to the queue when that channel closes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{Broker, BrokerError, QueueMessage, Result, ScanChannel};

#[derive(Debug, Default)]
struct MockState {
    ready: VecDeque<Vec<u8>>,
    next_tag: u64,
    acked: Vec<Vec<u8>>,
    requeued: Vec<Vec<u8>>,
    declared: Vec<String>,
    channels_opened: usize,
    channels_closed: usize,
    open_channels: usize,
    peak_open_channels: usize,
    fail_on_open: bool,
    fail_on_ack: bool,
    fail_on_requeue: bool,
}

/// In-memory broker for testing.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<MockState>>,
    arrivals: Arc<Notify>,
    delivery_delay: Duration,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker whose queue already holds `payloads`, in delivery order.
    pub fn with_messages<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let state = MockState {
            ready: payloads.into_iter().map(Into::into).collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            ..Default::default()
        }
    }

    /// Delay every delivery by `delay`, to make scans take measurable time.
    pub fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    pub async fn publish(&self, payload: impl Into<Vec<u8>>) {
        self.state.lock().await.ready.push_back(payload.into());
        self.arrivals.notify_waiters();
    }

    pub async fn set_fail_on_open(&self, fail: bool) {
        self.state.lock().await.fail_on_open = fail;
    }

    pub async fn set_fail_on_ack(&self, fail: bool) {
        self.state.lock().await.fail_on_ack = fail;
    }

    pub async fn set_fail_on_requeue(&self, fail: bool) {
        self.state.lock().await.fail_on_requeue = fail;
    }

    /// Payloads still waiting in the queue, in delivery order.
    pub async fn queued(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.ready.iter().cloned().collect()
    }

    /// Payloads permanently removed by an ack.
    pub async fn acked(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.acked.clone()
    }

    /// Payloads explicitly requeued by a consumer, in order.
    pub async fn requeued(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.requeued.clone()
    }

    /// Queue names declared, one entry per scan.
    pub async fn declared(&self) -> Vec<String> {
        self.state.lock().await.declared.clone()
    }

    pub async fn channels_opened(&self) -> usize {
        self.state.lock().await.channels_opened
    }

    pub async fn channels_closed(&self) -> usize {
        self.state.lock().await.channels_closed
    }

    /// Highest number of channels that were open at the same time.
    pub async fn peak_open_channels(&self) -> usize {
        self.state.lock().await.peak_open_channels
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn open_scan(&self, queue: &str) -> Result<Box<dyn ScanChannel>> {
        let mut state = self.state.lock().await;
        if state.fail_on_open {
            return Err(BrokerError::Channel("Mock open failure".to_string()));
        }
        state.declared.push(queue.to_string());
        state.channels_opened += 1;
        state.open_channels += 1;
        state.peak_open_channels = state.peak_open_channels.max(state.open_channels);

        Ok(Box::new(MockScanChannel {
            state: Arc::clone(&self.state),
            arrivals: Arc::clone(&self.arrivals),
            delivery_delay: self.delivery_delay,
            unresolved: HashMap::new(),
        }))
    }
}

/// Channel handed out by [`MockBroker`].
struct MockScanChannel {
    state: Arc<Mutex<MockState>>,
    arrivals: Arc<Notify>,
    delivery_delay: Duration,
    unresolved: HashMap<u64, Vec<u8>>,
}

impl MockScanChannel {
    fn take_unresolved(&mut self, message: &QueueMessage) -> Result<Vec<u8>> {
        self.unresolved.remove(&message.delivery_tag).ok_or_else(|| {
            BrokerError::Ack(format!("unknown delivery tag {}", message.delivery_tag))
        })
    }
}

#[async_trait]
impl ScanChannel for MockScanChannel {
    async fn next_message(&mut self) -> Result<QueueMessage> {
        if !self.delivery_delay.is_zero() {
            tokio::time::sleep(self.delivery_delay).await;
        }
        loop {
            let arrived = self.arrivals.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(payload) = state.ready.pop_front() {
                    state.next_tag += 1;
                    let delivery_tag = state.next_tag;
                    self.unresolved.insert(delivery_tag, payload.clone());
                    return Ok(QueueMessage {
                        delivery_tag,
                        payload,
                    });
                }
            }
            arrived.await;
        }
    }

    async fn ack(&mut self, message: QueueMessage) -> Result<()> {
        if self.state.lock().await.fail_on_ack {
            return Err(BrokerError::Ack("Mock ack failure".to_string()));
        }
        let payload = self.take_unresolved(&message)?;
        self.state.lock().await.acked.push(payload);
        Ok(())
    }

    async fn requeue(&mut self, message: QueueMessage) -> Result<()> {
        if self.state.lock().await.fail_on_requeue {
            return Err(BrokerError::Nack("Mock nack failure".to_string()));
        }
        let payload = self.take_unresolved(&message)?;
        {
            let mut state = self.state.lock().await;
            state.requeued.push(payload.clone());
            state.ready.push_back(payload);
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut unresolved: Vec<(u64, Vec<u8>)> = self.unresolved.into_iter().collect();
        unresolved.sort_unstable_by_key(|(tag, _)| *tag);
        let mut state = self.state.lock().await;
        state
            .ready
            .extend(unresolved.into_iter().map(|(_, payload)| payload));
        state.channels_closed += 1;
        state.open_channels -= 1;
        Ok(())
    }
}
