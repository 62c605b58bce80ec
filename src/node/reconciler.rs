use crate::node::WeakNode;
use log::{debug, info};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

/// Things the node announces to its background workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    BlockAppended { index: u64 },
    Shutdown,
}

/// Runs `force_resolve` after every appended block, once the block has had
/// `settle_delay` to settle. Events that pile up during the wait are folded
/// into a single round. Stops on `Shutdown` or once the node is gone.
pub fn spawn_reconciler(weak: WeakNode, events: Receiver<NodeEvent>) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(event) = events.recv() {
            let mut latest = match event {
                NodeEvent::BlockAppended { index } => index,
                NodeEvent::Shutdown => break,
            };

            let delay = match weak.upgrade() {
                Some(node) => node.settle_delay(),
                None => break,
            };
            thread::sleep(delay);

            loop {
                match events.try_recv() {
                    Ok(NodeEvent::BlockAppended { index }) => latest = latest.max(index),
                    Ok(NodeEvent::Shutdown) | Err(TryRecvError::Disconnected) => {
                        debug!("Reconciler stopping");
                        return;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }
            let node = match weak.upgrade() {
                Some(node) if !node.is_shut_down() => node,
                _ => break,
            };

            info!("Block {latest} appended; asking peers to resolve");
            node.force_resolve();
        }
        debug!("Reconciler stopped");
    })
}
