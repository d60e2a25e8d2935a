use std::collections::BTreeSet;
use std::time::Instant;

use log::{info, warn};

use crate::metrics::Metrics;
use crate::{
    Behavior, Brb, BroadcastId, CausalOrder, Config, Delivery, DeliveryReport, Envelope, Error,
    FaultInjector, NodeId, Outbox, Outgoing, Relay, Result, VectorClock,
};

/// One participant: the whole broadcast stack behind handlers that never fail.
///
/// The node does no I/O. Whatever it wants sent is collected until the
/// transport calls [`Node::take_outgoings`] or [`Node::take_packets`].
#[derive(Debug)]
pub struct Node {
    config: Config,
    causal: CausalOrder,
    outbox: Outbox,
    metrics: Metrics,
}

impl Node {
    pub fn new(
        id: NodeId,
        config: Config,
        neighbors: impl IntoIterator<Item = NodeId>,
    ) -> Result<Self> {
        config.validate()?;
        config.check_node(id)?;

        let neighbors = BTreeSet::from_iter(neighbors);
        for neighbor in &neighbors {
            if *neighbor == id {
                return Err(Error::SelfNeighbor(id));
            }
            config.check_node(*neighbor)?;
        }

        let behavior = config.behavior_for(id);
        if behavior != Behavior::None {
            info!("[NODE-{}] misbehaving with {:?}", id, behavior);
        }
        let fault = FaultInjector::new(id, behavior, config.f, config.seed.wrapping_add(id as u64));
        let relay = Relay::new(id, config.n, config.f, neighbors, config.relay, fault);
        let causal = CausalOrder::new(Brb::new(relay)?);

        Ok(Self {
            config,
            causal,
            outbox: Outbox::new(),
            metrics: Metrics::new(id),
        })
    }

    pub fn id(&self) -> NodeId {
        self.causal.id()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Counted among the `f` faulty nodes, whether or not it misbehaves.
    pub fn is_byzantine(&self) -> bool {
        self.config.is_byzantine(self.id())
    }

    pub fn behavior(&self) -> Behavior {
        self.config.behavior_for(self.id())
    }

    pub fn causal(&self) -> &CausalOrder {
        &self.causal
    }

    pub fn clock(&self) -> &VectorClock {
        self.causal.clock()
    }

    pub fn pending_len(&self) -> usize {
        self.causal.pending_len()
    }

    /// Delivered to the application.
    pub fn is_delivered(&self, id: &BroadcastId) -> bool {
        self.causal.is_delivered(id)
    }

    pub fn broadcast(&mut self, payload: Vec<u8>) -> Result<(BroadcastId, Vec<Delivery>)> {
        let started = Instant::now();
        let (id, deliveries) = self.causal.broadcast(payload, &mut self.outbox)?;
        self.metrics.observe_started(id, started);
        self.account(id);
        Ok((id, deliveries))
    }

    /// Runs the broadcasts this node is configured to start with.
    pub fn start(&mut self) -> Result<Vec<Delivery>> {
        let id = self.id();
        let count = self.config.broadcast_count(id);
        info!("[NODE-{}] starting {} broadcasts", id, count);

        let mut deliveries = Vec::new();
        for k in 0..count {
            let (_, delivered) = self.broadcast(format!("node-{}-msg-{}", id, k).into_bytes())?;
            deliveries.extend(delivered);
        }
        Ok(deliveries)
    }

    /// Handles raw bytes received from neighbor `from`.
    pub fn handle_packet(&mut self, from: NodeId, bytes: &[u8]) -> Vec<Delivery> {
        match Envelope::from_bytes(bytes) {
            Ok(envelope) => self.handle_envelope(from, envelope),
            Err(err) => {
                warn!("[NODE-{}] dropping packet from {}: {}", self.id(), from, err);
                Vec::new()
            }
        }
    }

    pub fn handle_envelope(&mut self, from: NodeId, envelope: Envelope) -> Vec<Delivery> {
        let id = envelope.id;
        match self.causal.handle_envelope(from, envelope, &mut self.outbox) {
            Ok(deliveries) => {
                self.metrics.observe_received(id);
                self.account(id);
                deliveries
            }
            Err(err) => {
                warn!("[NODE-{}] dropping envelope from {}: {}", self.id(), from, err);
                Vec::new()
            }
        }
    }

    pub fn take_outgoings(&mut self) -> Vec<Outgoing> {
        self.outbox.take_outgoings()
    }

    /// Queued sends in their wire form.
    pub fn take_packets(&mut self) -> Vec<(NodeId, Vec<u8>)> {
        let id = self.id();
        self.take_outgoings()
            .into_iter()
            .filter_map(|out| match out.envelope.to_bytes() {
                Ok(bytes) => Some((out.to, bytes)),
                Err(err) => {
                    warn!("[NODE-{}] can not encode envelope for {}: {}", id, out.to, err);
                    None
                }
            })
            .collect()
    }

    pub fn take_reports(&mut self) -> Vec<DeliveryReport> {
        self.metrics.take_reports()
    }

    // A handler only ever touches the broadcast it was given.
    fn account(&mut self, id: BroadcastId) {
        for out in self.outbox.unaccounted() {
            let bytes = out.envelope.encoded_len().unwrap_or_default();
            self.metrics.observe_sent(out.envelope.id, bytes);
        }
        if self.causal.brb().is_delivered(&id) {
            self.metrics.observe_delivered(id);
        }
    }
}
