use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::types::Snapshot;

pub type SubscriberId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushMode {
    /// Skipped when the previous push is younger than the hub interval.
    Periodic,
    Forced,
}

#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Arc<Snapshot>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushReport {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: usize,
}

/// Subscriber registry plus the rate limiter in front of it. Delivery uses
/// `try_send` only, so a push never waits on a subscriber.
#[derive(Debug)]
pub struct BroadcastHub {
    subscribers: HashMap<SubscriberId, mpsc::Sender<Arc<Snapshot>>>,
    next_id: SubscriberId,
    queue_capacity: usize,
    min_interval: Duration,
    last_push: Option<Instant>,
}

impl BroadcastHub {
    pub fn new(min_interval: Duration, queue_capacity: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            next_id: 1,
            queue_capacity: queue_capacity.max(1),
            min_interval,
            last_push: None,
        }
    }

    pub fn subscribe(&mut self) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, receiver) = mpsc::channel(self.queue_capacity);
        self.subscribers.insert(id, tx);
        info!(subscriber = id, total = self.subscribers.len(), "subscriber added");
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            info!(subscriber = id, total = self.subscribers.len(), "subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_due(&self, mode: PushMode, now: Instant) -> bool {
        match (mode, self.last_push) {
            (PushMode::Forced, _) | (PushMode::Periodic, None) => true,
            (PushMode::Periodic, Some(last)) => now.duration_since(last) >= self.min_interval,
        }
    }

    /// Builds the snapshot only when a push actually goes out. Returns `None`
    /// when the rate limiter swallowed a periodic push.
    pub fn push<F>(&mut self, mode: PushMode, build: F) -> Option<PushReport>
    where
        F: FnOnce() -> Snapshot,
    {
        let now = Instant::now();
        if !self.is_due(mode, now) {
            return None;
        }
        self.last_push = Some(now);

        let mut report = PushReport::default();
        if self.subscribers.is_empty() {
            return Some(report);
        }

        let snapshot = Arc::new(build());
        let mut closed = Vec::new();
        for (id, tx) in &self.subscribers {
            match tx.try_send(snapshot.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => report.dropped += 1,
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
            report.removed += 1;
            info!(subscriber = id, "subscriber disconnected");
        }
        if report.dropped > 0 {
            warn!(?mode, dropped = report.dropped, "snapshot dropped for slow subscribers");
        }
        Some(report)
    }
}
