//! In-process broadcast bus

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{BusError, Envelope, Message};

/// Default number of envelopes buffered per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcast bus: every subscriber sees every envelope published after it
/// subscribed
#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<Envelope>,
}

impl LocalBus {
    /// Create a bus buffering `capacity` envelopes per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a message with sender stamp 0
    pub fn send(&self, message: Message) -> Result<usize, BusError> {
        self.publish(Envelope::new(message))
    }

    /// Publish an envelope, returning the number of subscribers it reached
    pub fn publish(&self, envelope: Envelope) -> Result<usize, BusError> {
        debug!(
            message = envelope.message.name(),
            sender_stamp = envelope.sender_stamp,
            "Publishing"
        );
        self.tx
            .send(envelope)
            .map_err(|_| BusError::NoSubscribers)
    }

    /// Subscribe to all envelopes published from now on
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving end of a [`LocalBus`]
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Wait for the next envelope.
    ///
    /// A subscriber that fell behind skips the envelopes it missed and keeps
    /// receiving; only a closed bus ends the subscription.
    pub async fn recv(&mut self) -> Result<Envelope, BusError> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Ok(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Bus subscriber lagged, {} messages dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }
}
