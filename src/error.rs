use thiserror::Error;

use crate::{BroadcastId, Hash32, NodeId, Path};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Byzantine threshold violated: 3 * {f} faulty nodes is not below {n} nodes")]
    ByzantineThresholdViolated { n: usize, f: usize },
    #[error("Declared fault count {declared} does not match the {configured} configured byzantine nodes")]
    FaultCountMismatch { declared: usize, configured: usize },
    #[error("Node {id} is outside of a network of {n} nodes")]
    UnknownNode { id: NodeId, n: usize },
    #[error("Node {0} can not be its own neighbor")]
    SelfNeighbor(NodeId),
    #[error("A faulty behavior was configured for correct node {0}")]
    BehaviorForCorrectNode(NodeId),
    #[error("Malformed envelope: missing {0}")]
    MalformedEnvelope(&'static str),
    #[error("Received an envelope from {from}, who is not a neighbor")]
    NotANeighbor { from: NodeId },
    #[error("Hop digest {hop} does not match the content digest {content}")]
    DigestMismatch { hop: Hash32, content: Hash32 },
    #[error("Path {path:?} relayed by {from} is not a simple path avoiding us")]
    InvalidPath { from: NodeId, path: Path },
    #[error("Vector clock has {got} entries, expected {expected}")]
    ClockSizeMismatch { expected: usize, got: usize },
    #[error("Node {node} was handed broadcast {id} a second time")]
    DuplicateDelivery { node: NodeId, id: BroadcastId },
    #[error("Failed to encode with bincode")]
    Encoding(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
