use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Hash32, NodeId, Result};

/// Relay nodes an envelope went through, oldest first.
pub type Path = Vec<NodeId>;

/// Identifies one application level broadcast across all of its phases and hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BroadcastId {
    pub author: NodeId,
    pub seq: u64,
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.author, self.seq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Send,
    Echo,
    Ready,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Send => write!(f, "SEND"),
            Phase::Echo => write!(f, "ECHO"),
            Phase::Ready => write!(f, "READY"),
        }
    }
}

/// Names one relay broadcast: a phase message of a broadcast, originated by `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelayKey {
    pub id: BroadcastId,
    pub phase: Phase,
    pub source: NodeId,
}

impl fmt::Display for RelayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.id, self.phase, self.source)
    }
}

/// Minted by whoever originates a relay broadcast. Two envelopes with the same
/// hop id carry the same content, so tampered copies never share paths with
/// the genuine one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HopMessageId {
    pub origin: NodeId,
    pub seq: u64,
    pub digest: Hash32,
}

impl HopMessageId {
    pub fn derive(origin: NodeId, seq: u64, content: &[u8]) -> Self {
        Self {
            origin,
            seq,
            digest: Hash32::calculate(content),
        }
    }
}

impl fmt::Display for HopMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}-{}", self.origin, self.seq, self.digest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: BroadcastId,
    pub hop: HopMessageId,
    pub phase: Phase,
    /// Author of this relay broadcast, not necessarily of the broadcast itself.
    pub source: NodeId,
    pub content: Vec<u8>,
    pub path: Path,
}

impl Envelope {
    pub fn relay_key(&self) -> RelayKey {
        RelayKey {
            id: self.id,
            phase: self.phase,
            source: self.source,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&WireEnvelope::from(self))?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let wire: WireEnvelope = bincode::deserialize(bytes)?;
        Envelope::try_from(wire)
    }

    pub fn encoded_len(&self) -> Result<u64> {
        Ok(bincode::serialized_size(&WireEnvelope::from(self))?)
    }
}

// Peers are free to send anything, so the identifying fields are optional on
// the wire and checked when converting.
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    id: Option<BroadcastId>,
    hop: Option<HopMessageId>,
    phase: Option<Phase>,
    source: NodeId,
    content: Vec<u8>,
    path: Path,
}

impl From<&Envelope> for WireEnvelope {
    fn from(envelope: &Envelope) -> Self {
        Self {
            id: Some(envelope.id),
            hop: Some(envelope.hop),
            phase: Some(envelope.phase),
            source: envelope.source,
            content: envelope.content.clone(),
            path: envelope.path.clone(),
        }
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = Error;

    fn try_from(wire: WireEnvelope) -> Result<Self> {
        Ok(Self {
            id: wire.id.ok_or(Error::MalformedEnvelope("broadcast id"))?,
            hop: wire.hop.ok_or(Error::MalformedEnvelope("hop message id"))?,
            phase: wire.phase.ok_or(Error::MalformedEnvelope("phase"))?,
            source: wire.source,
            content: wire.content,
            path: wire.path,
        })
    }
}
