use std::collections::BTreeSet;

use log::{debug, error, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    Brb, BrbDelivery, BroadcastId, Envelope, Error, NodeId, Outbox, Result, VectorClock,
};

/// What actually travels as broadcast content: the payload with the causal
/// history of its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalMessage {
    pub clock: VectorClock,
    pub payload: Vec<u8>,
}

/// A payload handed to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: BroadcastId,
    pub payload: Vec<u8>,
    /// Clock the author attached when broadcasting.
    pub clock: VectorClock,
}

impl Delivery {
    pub fn author(&self) -> NodeId {
        self.id.author
    }
}

#[derive(Debug)]
struct PendingEntry {
    id: BroadcastId,
    message: CausalMessage,
}

/// Causal order delivery on top of reliable broadcast.
///
/// A broadcast is released once everything its author had delivered before
/// broadcasting it has been delivered here.
#[derive(Debug)]
pub struct CausalOrder {
    brb: Brb,
    clock: VectorClock,
    pending: Vec<PendingEntry>,
    delivered: BTreeSet<BroadcastId>,
}

impl CausalOrder {
    pub fn new(brb: Brb) -> Self {
        Self {
            clock: VectorClock::new(brb.n()),
            brb,
            pending: Vec::new(),
            delivered: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.brb.id()
    }

    pub fn brb(&self) -> &Brb {
        &self.brb
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_delivered(&self, id: &BroadcastId) -> bool {
        self.delivered.contains(id)
    }

    /// Broadcasts `payload` and delivers it to ourselves right away.
    pub fn broadcast(
        &mut self,
        payload: Vec<u8>,
        outbox: &mut Outbox,
    ) -> Result<(BroadcastId, Vec<Delivery>)> {
        let message = CausalMessage {
            clock: self.clock.clone(),
            payload,
        };
        let (id, brb_deliveries) = self.brb.broadcast(bincode::serialize(&message)?, outbox);
        self.clock.increment(self.id())?;
        self.delivered.insert(id);
        debug!("[RCO-{}] broadcast {} at {}", self.id(), id, message.clock);

        let mut deliveries = vec![Delivery {
            id,
            payload: message.payload,
            clock: message.clock,
        }];
        deliveries.extend(self.on_brb_deliveries(brb_deliveries));
        Ok((id, deliveries))
    }

    pub fn handle_envelope(
        &mut self,
        from: NodeId,
        envelope: Envelope,
        outbox: &mut Outbox,
    ) -> Result<Vec<Delivery>> {
        let brb_deliveries = self.brb.handle_envelope(from, envelope, outbox)?;
        Ok(self.on_brb_deliveries(brb_deliveries))
    }

    fn on_brb_deliveries(&mut self, brb_deliveries: Vec<BrbDelivery>) -> Vec<Delivery> {
        if brb_deliveries.is_empty() {
            return Vec::new();
        }
        for delivery in brb_deliveries {
            if let Err(err) = self.enqueue(delivery) {
                match err {
                    Error::DuplicateDelivery { .. } => error!("[RCO-{}] {}", self.id(), err),
                    _ => warn!("[RCO-{}] dropping broadcast: {}", self.id(), err),
                }
            }
        }
        self.release()
    }

    fn enqueue(&mut self, delivery: BrbDelivery) -> Result<()> {
        let BrbDelivery { id, content } = delivery;
        if id.author == self.id() {
            // Already delivered when we broadcast it.
            trace!("[RCO-{}] reliable broadcast of our own {} done", self.id(), id);
            return Ok(());
        }
        if self.delivered.contains(&id) || self.pending.iter().any(|e| e.id == id) {
            return Err(Error::DuplicateDelivery {
                node: self.id(),
                id,
            });
        }

        let message: CausalMessage = bincode::deserialize(&content)?;
        if message.clock.len() != self.clock.len() {
            return Err(Error::ClockSizeMismatch {
                expected: self.clock.len(),
                got: message.clock.len(),
            });
        }
        trace!("[RCO-{}] holding {} at {}", self.id(), id, message.clock);
        self.pending.push(PendingEntry { id, message });
        Ok(())
    }

    // Releasing one entry may unblock entries scanned before it, so the scan
    // restarts after every release until nothing moves.
    fn release(&mut self) -> Vec<Delivery> {
        let mut released = Vec::new();
        while let Some(pos) = self
            .pending
            .iter()
            .position(|entry| entry.message.clock <= self.clock)
        {
            let PendingEntry { id, message } = self.pending.remove(pos);
            if let Err(err) = self.clock.increment(id.author) {
                warn!("[RCO-{}] can not account for {}: {}", self.id(), id, err);
            }
            self.delivered.insert(id);
            debug!("[RCO-{}] delivered {}, clock now {}", self.id(), id, self.clock);
            released.push(Delivery {
                id,
                payload: message.payload,
                clock: message.clock,
            });
        }
        released
    }
}
