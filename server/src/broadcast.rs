//! Per-peer fan-out of world updates
//!
//! Each update is encoded once with bincode and the shared bytes are offered to
//! every subscribed peer over its own bounded channel. Offering never waits: a
//! peer whose backlog is full misses that update, and a peer whose receiver is
//! gone is removed. A stalled peer therefore costs the tick loop nothing and
//! never delays anyone else.

use crate::session::WorldUpdate;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

pub type PeerId = u64;

/// Encoded world update as delivered to peers.
pub type Payload = Arc<Vec<u8>>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode world update: {0}")]
    Encode(#[from] bincode::Error),
}

/// Outcome of one publication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Peers whose backlog was full.
    pub skipped: usize,
    /// Peers found disconnected and removed.
    pub pruned: usize,
}

/// A peer's end of the fan-out.
#[derive(Debug)]
pub struct Subscription {
    pub id: PeerId,
    pub updates: mpsc::Receiver<Payload>,
}

#[derive(Debug, Clone)]
pub struct FanOut {
    peers: Arc<Mutex<HashMap<PeerId, mpsc::Sender<Payload>>>>,
    next_id: Arc<AtomicU64>,
    peer_buffer: usize,
}

impl FanOut {
    /// `peer_buffer` is how many updates a peer may leave unread before it
    /// starts missing new ones.
    pub fn new(peer_buffer: usize) -> Self {
        Self {
            peers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            peer_buffer: peer_buffer.max(1),
        }
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<PeerId, mpsc::Sender<Payload>>> {
        // The map stays consistent even if a holder panicked.
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.peer_buffer);
        self.peers().insert(id, tx);
        debug!("Peer {} subscribed", id);
        Subscription { id, updates: rx }
    }

    pub fn unsubscribe(&self, id: PeerId) -> bool {
        self.peers().remove(&id).is_some()
    }

    pub fn peer_count(&self) -> usize {
        self.peers().len()
    }

    /// Encodes `update` once and offers it to every peer.
    pub fn publish(&self, update: &WorldUpdate) -> Result<PublishReport, PublishError> {
        let payload = Arc::new(bincode::serialize(update)?);
        Ok(self.publish_payload(payload))
    }

    /// Offers already encoded bytes to every peer.
    pub fn publish_payload(&self, payload: Payload) -> PublishReport {
        let mut report = PublishReport::default();
        let mut peers = self.peers();
        peers.retain(|id, tx| match tx.try_send(Arc::clone(&payload)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("Peer {} is not keeping up, skipping update", id);
                report.skipped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Peer {} disconnected, removing", id);
                report.pruned += 1;
                false
            }
        });
        report
    }
}

/// Decodes a payload produced by [`FanOut::publish`].
pub fn decode_update(payload: &[u8]) -> Result<WorldUpdate, bincode::Error> {
    bincode::deserialize(payload)
}
