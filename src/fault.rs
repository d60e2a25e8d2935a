use std::collections::BTreeSet;

use log::warn;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{Envelope, HopMessageId, NodeId};

/// How a node deviates from the protocol. Picked once, when the node is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Behavior {
    /// Follows the protocol.
    #[default]
    None,
    /// Replaces the content of everything it originates and shows it to only `f` neighbors.
    FabricateBroadcast,
    /// Rewrites the content of every envelope it relays.
    TamperInFlight,
}

/// Strategy consulted by the relay layer of a faulty node whenever it sends.
#[derive(Debug)]
pub struct FaultInjector {
    node: NodeId,
    behavior: Behavior,
    f: usize,
    rng: StdRng,
    seq: u64,
}

impl FaultInjector {
    pub fn new(node: NodeId, behavior: Behavior, f: usize, seed: u64) -> Self {
        Self {
            node,
            behavior,
            f,
            rng: StdRng::seed_from_u64(seed),
            seq: 0,
        }
    }

    pub fn honest(node: NodeId) -> Self {
        Self::new(node, Behavior::None, 0, 0)
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn is_byzantine(&self) -> bool {
        self.behavior != Behavior::None
    }

    /// What to send, and to whom, when originating `envelope`.
    pub fn originate(
        &mut self,
        envelope: Envelope,
        neighbors: &BTreeSet<NodeId>,
    ) -> (Envelope, Vec<NodeId>) {
        match self.behavior {
            Behavior::FabricateBroadcast => {
                let content = format!(
                    "fabricated by {}: {:08x}",
                    self.node,
                    self.rng.gen::<u32>()
                )
                .into_bytes();
                let fake = self.rewrite(envelope, content);
                warn!(
                    "[FAULT-{}] fabricated {} {} for {} neighbors",
                    self.node, fake.phase, fake.id, self.f
                );
                (fake, neighbors.iter().copied().take(self.f).collect())
            }
            Behavior::None | Behavior::TamperInFlight => {
                (envelope, neighbors.iter().copied().collect())
            }
        }
    }

    /// What to forward in place of a relayed `envelope`.
    pub fn relay(&mut self, envelope: Envelope) -> Envelope {
        match self.behavior {
            Behavior::TamperInFlight => {
                let mut content = b"tampered: ".to_vec();
                content.extend_from_slice(&envelope.content);
                let tampered = self.rewrite(envelope, content);
                warn!(
                    "[FAULT-{}] tampered with {} {} from {}",
                    self.node, tampered.phase, tampered.id, tampered.source
                );
                tampered
            }
            Behavior::None | Behavior::FabricateBroadcast => envelope,
        }
    }

    // Keeps the claimed source and path, with a hop id that matches the new
    // content so the forgery is not trivially rejected.
    fn rewrite(&mut self, envelope: Envelope, content: Vec<u8>) -> Envelope {
        self.seq += 1;
        Envelope {
            hop: HopMessageId::derive(envelope.source, self.seq, &content),
            content,
            ..envelope
        }
    }
}
