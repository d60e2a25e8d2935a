use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};

use crate::{Delivery, Node, NodeId};

/// Input to a running node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bytes received from neighbor `from`.
    Packet { from: NodeId, bytes: Vec<u8> },
    /// Broadcast a payload.
    Broadcast(Vec<u8>),
    /// Run the configured starting broadcasts.
    Start,
}

/// A packet the transport should carry from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub from: NodeId,
    pub to: NodeId,
    pub bytes: Vec<u8>,
}

/// Drives `node` until shutdown is signalled or its inbound channel closes,
/// then hands the node back.
///
/// Commands are handled one at a time and shutdown is only looked at between
/// two of them, so a handler always runs to completion.
pub async fn run_node(
    mut node: Node,
    mut inbound: mpsc::Receiver<Command>,
    outbound: mpsc::UnboundedSender<Outbound>,
    deliveries: mpsc::UnboundedSender<(NodeId, Delivery)>,
    mut shutdown: watch::Receiver<bool>,
) -> Node {
    let id = node.id();
    info!("[RT-{}] running", id);

    loop {
        let command = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            command = inbound.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let delivered = match command {
            Command::Packet { from, bytes } => node.handle_packet(from, &bytes),
            Command::Broadcast(payload) => match node.broadcast(payload) {
                Ok((_, delivered)) => delivered,
                Err(err) => {
                    warn!("[RT-{}] broadcast failed: {}", id, err);
                    Vec::new()
                }
            },
            Command::Start => node.start().unwrap_or_else(|err| {
                warn!("[RT-{}] start failed: {}", id, err);
                Vec::new()
            }),
        };

        for (to, bytes) in node.take_packets() {
            if outbound.send(Outbound { from: id, to, bytes }).is_err() {
                debug!("[RT-{}] transport is gone, dropping packet for {}", id, to);
            }
        }
        for delivery in delivered {
            if deliveries.send((id, delivery)).is_err() {
                debug!("[RT-{}] nobody listens for deliveries", id);
            }
        }
    }

    info!("[RT-{}] stopped", id);
    node
}
