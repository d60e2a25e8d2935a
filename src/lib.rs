//! Byzantine fault tolerant broadcast for networks that need not be fully connected.
//!
//! The stack has three layers, each owning the one below it:
//!
//! - [`relay::Relay`] floods a single message across the graph and delivers it
//!   locally once it arrived directly from its author or over `f + 1`
//!   node-disjoint paths.
//! - [`brb::Brb`] runs SEND / ECHO / READY on top of the relay, every phase being
//!   its own relay broadcast, so that correct nodes agree on what was broadcast.
//! - [`causal::CausalOrder`] stamps broadcasts with vector clocks and holds back
//!   deliveries until their causal history has been delivered.
//!
//! [`node::Node`] ties the layers together behind a handler boundary that never
//! fails, and [`runtime::run_node`] drives a node as a tokio task.

pub mod brb;
pub mod causal;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fault;
pub mod hash;
pub mod metrics;
pub mod node;
pub mod outbox;
pub mod paths;
pub mod relay;
pub mod runtime;
pub mod vector_clock;

pub use crate::brb::{BroadcastState, Brb, BrbDelivery};
pub use crate::causal::{CausalMessage, CausalOrder, Delivery};
pub use crate::config::{Config, RelayOptions};
pub use crate::envelope::{BroadcastId, Envelope, HopMessageId, Path, Phase, RelayKey};
pub use crate::error::{Error, Result};
pub use crate::fault::{Behavior, FaultInjector};
pub use crate::hash::Hash32;
pub use crate::metrics::DeliveryReport;
pub use crate::node::Node;
pub use crate::outbox::{Outbox, Outgoing};
pub use crate::paths::{NodeSet, PathSet};
pub use crate::relay::Relay;
pub use crate::vector_clock::VectorClock;

pub type NodeId = usize;
