use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace, warn};

use crate::{
    BroadcastId, Envelope, Error, FaultInjector, Hash32, HopMessageId, NodeId, Outbox, PathSet,
    Phase, RelayKey, RelayOptions, Result,
};

#[derive(Debug, Default)]
struct Instance {
    // Paths are kept apart per hop id so that a tampered copy never borrows
    // paths from the genuine content.
    paths: BTreeMap<HopMessageId, PathSet>,
    delivered: bool,
    delivered_neighbors: BTreeSet<NodeId>,
}

impl Instance {
    fn purge_through(&mut self, node: NodeId) -> usize {
        self.paths
            .values_mut()
            .map(|paths| paths.remove_through(node))
            .sum()
    }

    fn stored_paths(&self) -> usize {
        self.paths.values().map(PathSet::len).sum()
    }
}

/// Reliable relay of single messages over a partially connected graph.
///
/// A message is delivered once it was received straight from its author, or
/// over `f + 1` node-disjoint paths. Every relay broadcast, identified by its
/// [`RelayKey`], is delivered at most once.
#[derive(Debug)]
pub struct Relay {
    id: NodeId,
    n: usize,
    f: usize,
    neighbors: BTreeSet<NodeId>,
    options: RelayOptions,
    fault: FaultInjector,
    hop_seq: u64,
    instances: BTreeMap<RelayKey, Instance>,
}

impl Relay {
    pub fn new(
        id: NodeId,
        n: usize,
        f: usize,
        neighbors: BTreeSet<NodeId>,
        options: RelayOptions,
        fault: FaultInjector,
    ) -> Self {
        Self {
            id,
            n,
            f,
            neighbors,
            options,
            fault,
            hop_seq: 0,
            instances: Default::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn f(&self) -> usize {
        self.f
    }

    pub fn neighbors(&self) -> &BTreeSet<NodeId> {
        &self.neighbors
    }

    pub fn options(&self) -> RelayOptions {
        self.options
    }

    pub fn is_byzantine(&self) -> bool {
        self.fault.is_byzantine()
    }

    pub fn is_delivered(&self, key: &RelayKey) -> bool {
        self.instances.get(key).map_or(false, |i| i.delivered)
    }

    pub fn is_delivered_neighbor(&self, key: &RelayKey, node: NodeId) -> bool {
        self.instances
            .get(key)
            .map_or(false, |i| i.delivered_neighbors.contains(&node))
    }

    /// Number of paths currently remembered for a relay broadcast, over all its hop ids.
    pub fn stored_paths(&self, key: &RelayKey) -> usize {
        self.instances.get(key).map_or(0, Instance::stored_paths)
    }

    /// Originates a relay broadcast and delivers it locally.
    ///
    /// Returns `None` if we already originated this phase of this broadcast.
    pub fn broadcast(
        &mut self,
        id: BroadcastId,
        phase: Phase,
        content: Vec<u8>,
        outbox: &mut Outbox,
    ) -> Option<Envelope> {
        let key = RelayKey {
            id,
            phase,
            source: self.id,
        };
        let instance = self.instances.entry(key).or_default();
        if instance.delivered {
            warn!("[RELAY-{}] {} was already broadcast", self.id, key);
            return None;
        }
        instance.delivered = true;

        self.hop_seq += 1;
        let envelope = Envelope {
            id,
            hop: HopMessageId::derive(self.id, self.hop_seq, &content),
            phase,
            source: self.id,
            content,
            path: Vec::new(),
        };
        debug!("[RELAY-{}] broadcasting {} as {}", self.id, key, envelope.hop);

        let (sent, targets) = self.fault.originate(envelope.clone(), &self.neighbors);
        for to in targets {
            outbox.send_to(to, sent.clone());
        }
        Some(envelope)
    }

    /// Handles an envelope relayed to us by neighbor `from`.
    ///
    /// Returns the envelope if this completed its relay broadcast locally.
    /// An invalid envelope is rejected before any state is touched.
    pub fn handle_envelope(
        &mut self,
        from: NodeId,
        envelope: Envelope,
        outbox: &mut Outbox,
    ) -> Result<Option<Envelope>> {
        self.validate(from, &envelope)?;

        let key = envelope.relay_key();
        let (me, options, needed) = (self.id, self.options, self.f + 1);

        if key.source == me {
            trace!("[RELAY-{}] ignoring our own {} from {}", me, key, from);
            return Ok(None);
        }

        let instance = self.instances.entry(key).or_default();

        if options.discard_if_delivered && instance.delivered {
            trace!("[RELAY-{}] {} already delivered, dropping", me, key);
            return Ok(None);
        }
        if options.delivered_neighbor_pruning && instance.delivered_neighbors.contains(&from) {
            trace!("[RELAY-{}] {} already delivered {}, dropping", me, from, key);
            return Ok(None);
        }

        if options.empty_path_pruning && envelope.path.is_empty() {
            instance.delivered_neighbors.insert(from);
            if from != key.source {
                let purged = instance.purge_through(from);
                trace!(
                    "[RELAY-{}] {} delivered {}, purged {} paths",
                    me,
                    from,
                    key,
                    purged
                );
            }
        }
        if options.empty_path_pruning && instance.delivered {
            return Ok(None);
        }

        let mut path = envelope.path.clone();
        path.push(from);
        let hop_paths = instance.paths.entry(envelope.hop).or_default();
        if !hop_paths.insert(path.clone()) {
            trace!("[RELAY-{}] duplicate path {:?} for {}", me, path, key);
            return Ok(None);
        }

        let mut delivered = None;
        if !instance.delivered && !self.fault.is_byzantine() {
            let direct = options.direct_origin && from == key.source;
            if direct || hop_paths.has_disjoint_paths(key.source, me, needed) {
                debug!(
                    "[RELAY-{}] delivered {} ({})",
                    me,
                    key,
                    if direct { "direct" } else { "disjoint paths" }
                );
                instance.delivered = true;
                delivered = Some(Envelope {
                    path: path.clone(),
                    ..envelope.clone()
                });
            }
        }

        // Nodes on the path already have it, even when we relay an empty path.
        let mut skip = BTreeSet::from_iter([key.source, me]);
        skip.extend(path.iter().copied());
        if options.delivered_neighbor_pruning {
            skip.extend(instance.delivered_neighbors.iter().copied());
        }
        let forward = if delivered.is_some() && options.empty_path_pruning {
            instance.paths.clear();
            Envelope {
                path: Vec::new(),
                ..envelope
            }
        } else {
            Envelope { path, ..envelope }
        };

        let forward = self.fault.relay(forward);
        for to in self.neighbors.difference(&skip) {
            outbox.send_to(*to, forward.clone());
        }
        Ok(delivered)
    }

    fn validate(&self, from: NodeId, envelope: &Envelope) -> Result<()> {
        if !self.neighbors.contains(&from) {
            return Err(Error::NotANeighbor { from });
        }

        let mentioned = [envelope.id.author, envelope.source, envelope.hop.origin];
        if let Some(id) = mentioned
            .into_iter()
            .chain(envelope.path.iter().copied())
            .find(|id| *id >= self.n)
        {
            return Err(Error::UnknownNode { id, n: self.n });
        }

        let content = Hash32::calculate(&envelope.content);
        if content != envelope.hop.digest {
            return Err(Error::DigestMismatch {
                hop: envelope.hop.digest,
                content,
            });
        }

        let mut seen = BTreeSet::new();
        let simple = envelope
            .path
            .iter()
            .chain(std::iter::once(&from))
            .all(|node| *node != self.id && seen.insert(*node));
        if !simple {
            return Err(Error::InvalidPath {
                from,
                path: envelope.path.clone(),
            });
        }
        Ok(())
    }
}
