use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Behavior, Error, NodeId, Result};

/// Pruning rules of the relay layer. All of them are on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayOptions {
    /// Deliver a message received straight from its author.
    pub direct_origin: bool,
    /// Once delivered, forget the paths and relay once with an empty path;
    /// an empty path from a neighbor means that neighbor has delivered.
    pub empty_path_pruning: bool,
    /// Never relay to, nor accept paths from, a neighbor that has delivered.
    pub delivered_neighbor_pruning: bool,
    /// Drop anything about a relay broadcast we already delivered.
    pub discard_if_delivered: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            direct_origin: true,
            empty_path_pruning: true,
            delivered_neighbor_pruning: true,
            discard_if_delivered: true,
        }
    }
}

impl RelayOptions {
    /// Plain flooding with path tracking, no shortcuts.
    pub fn unoptimized() -> Self {
        Self {
            direct_origin: false,
            empty_path_pruning: false,
            delivered_neighbor_pruning: false,
            discard_if_delivered: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Number of nodes, ids run from 0 to n - 1.
    pub n: usize,
    /// Number of tolerated faults, must equal the size of `byzantine`.
    pub f: usize,
    pub byzantine: BTreeSet<NodeId>,
    /// Nodes that broadcast on start, with how many times they do.
    #[serde(default)]
    pub broadcasters: BTreeMap<NodeId, usize>,
    #[serde(default)]
    pub relay: RelayOptions,
    /// Overrides the default misbehavior of byzantine nodes.
    #[serde(default)]
    pub behaviors: BTreeMap<NodeId, Behavior>,
    #[serde(default)]
    pub seed: u64,
}

impl Config {
    pub fn new(n: usize, byzantine: impl IntoIterator<Item = NodeId>) -> Self {
        let byzantine = BTreeSet::from_iter(byzantine);
        Self {
            n,
            f: byzantine.len(),
            byzantine,
            broadcasters: Default::default(),
            relay: Default::default(),
            behaviors: Default::default(),
            seed: 0,
        }
    }

    pub fn with_broadcaster(mut self, id: NodeId, times: usize) -> Self {
        self.broadcasters.insert(id, times);
        self
    }

    pub fn with_behavior(mut self, id: NodeId, behavior: Behavior) -> Self {
        self.behaviors.insert(id, behavior);
        self
    }

    pub fn with_relay(mut self, relay: RelayOptions) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.f != self.byzantine.len() {
            return Err(Error::FaultCountMismatch {
                declared: self.f,
                configured: self.byzantine.len(),
            });
        }
        if 3 * self.f >= self.n {
            return Err(Error::ByzantineThresholdViolated {
                n: self.n,
                f: self.f,
            });
        }

        let mentioned = self
            .byzantine
            .iter()
            .chain(self.broadcasters.keys())
            .chain(self.behaviors.keys());
        for id in mentioned {
            self.check_node(*id)?;
        }

        for (id, behavior) in &self.behaviors {
            if *behavior != Behavior::None && !self.is_byzantine(*id) {
                return Err(Error::BehaviorForCorrectNode(*id));
            }
        }
        Ok(())
    }

    pub fn check_node(&self, id: NodeId) -> Result<()> {
        if id < self.n {
            Ok(())
        } else {
            Err(Error::UnknownNode { id, n: self.n })
        }
    }

    pub fn is_byzantine(&self, id: NodeId) -> bool {
        self.byzantine.contains(&id)
    }

    /// A byzantine broadcaster fabricates, any other byzantine node tampers,
    /// unless overridden.
    pub fn behavior_for(&self, id: NodeId) -> Behavior {
        if !self.is_byzantine(id) {
            return Behavior::None;
        }
        match self.behaviors.get(&id) {
            Some(behavior) => *behavior,
            None if self.broadcasters.contains_key(&id) => Behavior::FabricateBroadcast,
            None => Behavior::TamperInFlight,
        }
    }

    pub fn broadcast_count(&self, id: NodeId) -> usize {
        self.broadcasters.get(&id).copied().unwrap_or_default()
    }
}
