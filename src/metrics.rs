use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::{BroadcastId, NodeId};

/// What one node saw of one broadcast, up to the moment it was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub node: NodeId,
    pub id: BroadcastId,
    /// First time the node heard of the broadcast, or broadcast it.
    pub started: Instant,
    /// Reliable broadcast delivery.
    pub ended: Instant,
    /// Envelopes of any phase accepted for this broadcast.
    pub relay_messages: usize,
    /// Encoded size of the envelopes sent for this broadcast.
    pub bytes_relayed: u64,
}

impl DeliveryReport {
    pub fn latency(&self) -> Duration {
        self.ended.saturating_duration_since(self.started)
    }
}

#[derive(Debug)]
struct Tracker {
    started: Instant,
    relay_messages: usize,
    bytes_relayed: u64,
}

/// Per broadcast counters, dropped once the broadcast has been reported.
///
/// Broadcasts that never deliver keep their tracker for the life of the node.
#[derive(Debug)]
pub struct Metrics {
    node: NodeId,
    trackers: BTreeMap<BroadcastId, Tracker>,
    reported: BTreeSet<BroadcastId>,
    reports: Vec<DeliveryReport>,
}

impl Metrics {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            trackers: Default::default(),
            reported: Default::default(),
            reports: Default::default(),
        }
    }

    // Nothing is tracked past the report.
    fn track(&mut self, id: BroadcastId, now: Instant) -> Option<&mut Tracker> {
        if self.reported.contains(&id) {
            return None;
        }
        Some(self.trackers.entry(id).or_insert(Tracker {
            started: now,
            relay_messages: 0,
            bytes_relayed: 0,
        }))
    }

    pub fn observe_started(&mut self, id: BroadcastId, at: Instant) {
        self.track(id, at);
    }

    pub fn observe_received(&mut self, id: BroadcastId) {
        if let Some(tracker) = self.track(id, Instant::now()) {
            tracker.relay_messages += 1;
        }
    }

    pub fn observe_sent(&mut self, id: BroadcastId, bytes: u64) {
        if let Some(tracker) = self.track(id, Instant::now()) {
            tracker.bytes_relayed += bytes;
        }
    }

    /// Emits the report of `id` the first time it is seen delivered.
    pub fn observe_delivered(&mut self, id: BroadcastId) {
        let now = Instant::now();
        if !self.reported.insert(id) {
            return;
        }
        let tracker = self.trackers.remove(&id).unwrap_or(Tracker {
            started: now,
            relay_messages: 0,
            bytes_relayed: 0,
        });
        self.reports.push(DeliveryReport {
            node: self.node,
            id,
            started: tracker.started,
            ended: now,
            relay_messages: tracker.relay_messages,
            bytes_relayed: tracker.bytes_relayed,
        });
    }

    pub fn take_reports(&mut self) -> Vec<DeliveryReport> {
        std::mem::take(&mut self.reports)
    }
}
