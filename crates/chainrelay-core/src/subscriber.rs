//! Live fan-out of relayed events to connected subscribers.
//!
//! The relay loop never waits on a subscriber: each subscriber owns a bounded
//! queue and `broadcast` only ever `try_send`s into it. The transport side
//! (a WebSocket task, say) drains its queue at its own pace.

use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::types::RelayMessage;

/// Identifier assigned to a subscriber at registration.
pub type SubscriberId = Uuid;

/// Outcome of one broadcast.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Subscribers that accepted the message.
    pub delivered: usize,
    /// One entry per subscriber that did not.
    pub failures: Vec<RelayError>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fire-and-forget sink towards zero or more subscribers.
pub trait SubscriberChannel: Send + Sync {
    /// Offer `message` to every current subscriber. Failures are isolated per
    /// subscriber and reported, never raised.
    fn broadcast(&self, message: &RelayMessage) -> DeliveryReport;

    fn subscriber_count(&self) -> usize;
}

/// `SubscriberChannel` backed by one bounded mpsc queue per subscriber.
pub struct SubscriberHub {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<RelayMessage>>>,
    queue_capacity: usize,
}

impl SubscriberHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add a subscriber; the receiver yields every message broadcast from now on.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<RelayMessage>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();
        self.subscribers.write().unwrap().insert(id, tx);
        debug!(subscriber = %id, "subscriber registered");
        (id, rx)
    }

    /// Remove a subscriber. Other subscribers are unaffected.
    pub fn unregister(&self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.write().unwrap().remove(id).is_some();
        if removed {
            debug!(subscriber = %id, "subscriber unregistered");
        }
        removed
    }
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SubscriberChannel for SubscriberHub {
    fn broadcast(&self, message: &RelayMessage) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut closed = Vec::new();

        {
            let subscribers = self.subscribers.read().unwrap();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(message.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(subscriber = %id, event = %message.event_name, "subscriber queue full, message dropped");
                        report.failures.push(RelayError::DeliveryFailure {
                            subscriber: id.to_string(),
                            reason: "queue full".into(),
                        });
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!(subscriber = %id, "subscriber gone");
                        closed.push(*id);
                        report.failures.push(RelayError::DeliveryFailure {
                            subscriber: id.to_string(),
                            reason: "connection closed".into(),
                        });
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().unwrap();
            for id in &closed {
                subscribers.remove(id);
            }
        }

        report
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }
}
