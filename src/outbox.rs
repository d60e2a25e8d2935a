use crate::{Envelope, NodeId};

/// An envelope waiting to be handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub to: NodeId,
    pub envelope: Envelope,
}

// Outbox collects the point to point sends issued while handling one event.
#[derive(Debug, Default)]
pub struct Outbox {
    outgoings: Vec<Outgoing>,
    accounted: usize,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_to(&mut self, to: NodeId, envelope: Envelope) {
        self.outgoings.push(Outgoing { to, envelope });
    }

    pub fn len(&self) -> usize {
        self.outgoings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outgoings.is_empty()
    }

    /// Sends queued since the previous call, for bookkeeping.
    pub fn unaccounted(&mut self) -> &[Outgoing] {
        let start = self.accounted;
        self.accounted = self.outgoings.len();
        &self.outgoings[start..]
    }

    pub fn take_outgoings(&mut self) -> Vec<Outgoing> {
        self.accounted = 0;
        std::mem::take(&mut self.outgoings)
    }

    #[cfg(test)]
    pub fn originated(&self, source: NodeId, phase: crate::Phase) -> usize {
        self.outgoings
            .iter()
            .filter(|out| out.envelope.source == source && out.envelope.phase == phase)
            .filter(|out| out.envelope.hop.origin == source)
            .count()
    }
}
