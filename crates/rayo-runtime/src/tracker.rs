//! Connected peer tracking
//!
//! Overlay stacks report connection events per connection, not per peer, so
//! the same peer may be announced several times and disconnects may arrive
//! for peers we never saw connect. The tracker folds all of that into a
//! plain set.

use std::collections::HashSet;

use tokio::sync::mpsc;

use rayo_core::PeerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerSetChangeKind {
    Connected,
    Disconnected,
}

/// Notification emitted whenever the connected set actually changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSetChange {
    pub peer: PeerId,
    pub kind: PeerSetChangeKind,
    /// Set size after the change
    pub connected: usize,
}

/// Tracks the set of currently connected remote peers
#[derive(Debug)]
pub struct PeerTracker {
    local: PeerId,
    peers: HashSet<PeerId>,
    notifier: Option<mpsc::UnboundedSender<PeerSetChange>>,
}

impl PeerTracker {
    pub fn new(local: PeerId) -> Self {
        PeerTracker {
            local,
            peers: HashSet::new(),
            notifier: None,
        }
    }

    /// Install a listener for peer set changes
    pub fn set_notifier(&mut self, notifier: mpsc::UnboundedSender<PeerSetChange>) {
        self.notifier = Some(notifier);
    }

    /// Record a connection. Returns `true` if the peer was not tracked yet.
    pub fn on_connect(&mut self, peer: PeerId) -> bool {
        if peer == self.local {
            tracing::debug!(%peer, "ignoring connect event for the local peer");
            return false;
        }
        if self.peers.contains(&peer) {
            return false;
        }

        self.peers.insert(peer.clone());
        self.notify(peer, PeerSetChangeKind::Connected);
        true
    }

    /// Record a disconnection. Returns `true` if the peer was tracked.
    pub fn on_disconnect(&mut self, peer: &PeerId) -> bool {
        if !self.peers.remove(peer) {
            return false;
        }

        self.notify(peer.clone(), PeerSetChangeKind::Disconnected);
        true
    }

    pub fn connected_peers(&self) -> &HashSet<PeerId> {
        &self.peers
    }

    /// Sorted copy of the connected set
    pub fn snapshot(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.peers.iter().cloned().collect();
        peers.sort();
        peers
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn notify(&mut self, peer: PeerId, kind: PeerSetChangeKind) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let change = PeerSetChange {
            peer,
            kind,
            connected: self.peers.len(),
        };
        if notifier.send(change).is_err() {
            tracing::debug!("peer set listener gone, dropping notifier");
            self.notifier = None;
        }
    }
}
