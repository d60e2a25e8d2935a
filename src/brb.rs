use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, info, trace, warn};

use crate::{BroadcastId, Envelope, Error, Hash32, NodeId, Outbox, Phase, Relay, Result};

// State transition
//
// +------------+       +------------+       +------------+       +------------+
// |    Init    | ----> |  EchoSent  | ----> | ReadySent  | ----> |  Delivered |
// +------------+       +------------+       +------------+       +------------+
//       \                                         /
//        \---------------------------------------/
//
// A node that never got the SEND may still go ready on the ECHO or READY it sees.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BroadcastState {
    Init,
    EchoSent,
    ReadySent,
    Delivered,
}

/// Content a broadcast settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrbDelivery {
    pub id: BroadcastId,
    pub content: Vec<u8>,
}

#[derive(Debug, Default)]
struct Instance {
    echo_sent: bool,
    ready_sent: bool,
    delivered: bool,
    // Sources are counted per content, a source is only ever counted once.
    echoes: BTreeMap<Hash32, BTreeSet<NodeId>>,
    readies: BTreeMap<Hash32, BTreeSet<NodeId>>,
    contents: BTreeMap<Hash32, Vec<u8>>,
}

impl Instance {
    fn state(&self) -> BroadcastState {
        if self.delivered {
            BroadcastState::Delivered
        } else if self.ready_sent {
            BroadcastState::ReadySent
        } else if self.echo_sent {
            BroadcastState::EchoSent
        } else {
            BroadcastState::Init
        }
    }

    fn reaching(votes: &BTreeMap<Hash32, BTreeSet<NodeId>>, threshold: usize) -> Option<Hash32> {
        votes
            .iter()
            .find(|(_, sources)| sources.len() >= threshold)
            .map(|(digest, _)| *digest)
    }

    fn most_votes(votes: &BTreeMap<Hash32, BTreeSet<NodeId>>) -> usize {
        votes.values().map(BTreeSet::len).max().unwrap_or(0)
    }
}

enum Step {
    Broadcast(BroadcastId, Phase, Vec<u8>),
    Deliver(BrbDelivery),
}

/// Bracha's reliable broadcast, every phase message being a relay broadcast.
#[derive(Debug)]
pub struct Brb {
    relay: Relay,
    seq: u64,
    instances: BTreeMap<BroadcastId, Instance>,
}

impl Brb {
    pub fn new(relay: Relay) -> Result<Self> {
        if 3 * relay.f() >= relay.n() {
            return Err(Error::ByzantineThresholdViolated {
                n: relay.n(),
                f: relay.f(),
            });
        }
        Ok(Self {
            relay,
            seq: 0,
            instances: Default::default(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.relay.id()
    }

    pub fn n(&self) -> usize {
        self.relay.n()
    }

    pub fn f(&self) -> usize {
        self.relay.f()
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// ⌈(n + f + 1) / 2⌉ distinct ECHO sources.
    pub fn echo_quorum(&self) -> usize {
        (self.n() + self.f() + 2) / 2
    }

    pub fn ready_amplification(&self) -> usize {
        self.f() + 1
    }

    pub fn delivery_quorum(&self) -> usize {
        2 * self.f() + 1
    }

    pub fn state(&self, id: &BroadcastId) -> BroadcastState {
        self.instances
            .get(id)
            .map_or(BroadcastState::Init, Instance::state)
    }

    pub fn is_delivered(&self, id: &BroadcastId) -> bool {
        self.state(id) == BroadcastState::Delivered
    }

    /// Distinct ECHO sources of the best supported content.
    pub fn echo_count(&self, id: &BroadcastId) -> usize {
        self.instances
            .get(id)
            .map_or(0, |i| Instance::most_votes(&i.echoes))
    }

    /// Distinct READY sources of the best supported content.
    pub fn ready_count(&self, id: &BroadcastId) -> usize {
        self.instances
            .get(id)
            .map_or(0, |i| Instance::most_votes(&i.readies))
    }

    /// Starts a new broadcast of `content`, returning its id.
    ///
    /// Our own SEND is delivered to us straight away, so the ECHO goes out
    /// with it; a single node network delivers right here.
    pub fn broadcast(
        &mut self,
        content: Vec<u8>,
        outbox: &mut Outbox,
    ) -> (BroadcastId, Vec<BrbDelivery>) {
        self.seq += 1;
        let id = BroadcastId {
            author: self.id(),
            seq: self.seq,
        };
        info!("[BRB-{}] broadcasting {}", self.id(), id);

        self.instances.entry(id).or_default();
        let queue = VecDeque::from_iter(self.relay.broadcast(id, Phase::Send, content, outbox));
        (id, self.process(queue, outbox))
    }

    pub fn handle_envelope(
        &mut self,
        from: NodeId,
        envelope: Envelope,
        outbox: &mut Outbox,
    ) -> Result<Vec<BrbDelivery>> {
        let queue = VecDeque::from_iter(self.relay.handle_envelope(from, envelope, outbox)?);
        Ok(self.process(queue, outbox))
    }

    // Our own phase broadcasts are delivered to us by the relay as well. They
    // are queued rather than handled recursively, so every flag is already
    // set when the next envelope is looked at.
    fn process(&mut self, mut queue: VecDeque<Envelope>, outbox: &mut Outbox) -> Vec<BrbDelivery> {
        let mut deliveries = Vec::new();
        while let Some(envelope) = queue.pop_front() {
            for step in self.on_relay_delivery(envelope) {
                match step {
                    Step::Broadcast(id, phase, content) => {
                        queue.extend(self.relay.broadcast(id, phase, content, outbox));
                    }
                    Step::Deliver(delivery) => deliveries.push(delivery),
                }
            }
        }
        deliveries
    }

    fn on_relay_delivery(&mut self, envelope: Envelope) -> Vec<Step> {
        let me = self.id();
        let (echo_quorum, amplification, delivery_quorum) = (
            self.echo_quorum(),
            self.ready_amplification(),
            self.delivery_quorum(),
        );
        let Envelope {
            id,
            hop,
            phase,
            source,
            content,
            ..
        } = envelope;
        let digest = hop.digest;
        let instance = self.instances.entry(id).or_default();
        let mut steps = Vec::new();

        match phase {
            Phase::Send => {
                if source != id.author {
                    warn!("[BRB-{}] SEND for {} from {} who is not its author", me, id, source);
                    return steps;
                }
                if instance.echo_sent {
                    trace!("[BRB-{}] already echoed {}", me, id);
                    return steps;
                }
                instance.echo_sent = true;
                debug!("[BRB-{}] echoing {} ({})", me, id, digest);
                instance.contents.entry(digest).or_insert_with(|| content.clone());
                steps.push(Step::Broadcast(id, Phase::Echo, content));
            }
            Phase::Echo => {
                instance.echoes.entry(digest).or_default().insert(source);
                instance.contents.entry(digest).or_insert(content);
            }
            Phase::Ready => {
                instance.readies.entry(digest).or_default().insert(source);
                instance.contents.entry(digest).or_insert(content);
            }
        }

        if !instance.ready_sent {
            let ready_on = Instance::reaching(&instance.echoes, echo_quorum)
                .or_else(|| Instance::reaching(&instance.readies, amplification));
            if let Some(content) = ready_on.and_then(|d| instance.contents.get(&d)) {
                debug!("[BRB-{}] going ready on {}", me, id);
                instance.ready_sent = true;
                steps.push(Step::Broadcast(id, Phase::Ready, content.clone()));
            }
        }

        if !instance.delivered {
            let deliver_on = Instance::reaching(&instance.readies, delivery_quorum);
            if let Some(content) = deliver_on.and_then(|d| instance.contents.get(&d)) {
                info!("[BRB-{}] delivered {}", me, id);
                instance.delivered = true;
                steps.push(Step::Deliver(BrbDelivery {
                    id,
                    content: content.clone(),
                }));
            }
        }

        steps
    }
}
