//! In-process overlay
//!
//! `MemoryMesh` routes pubsub messages between nodes living in the same
//! process. Links are explicit: a message only reaches peers directly
//! connected to the publisher that are started and subscribed to the topic.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;

use rayo_core::{PeerId, RayoError, RayoResult, Topic};

use crate::{EventReceiver, EventSender, Overlay, OverlayEvent, PubsubMessage};

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Generate a libp2p-looking peer identifier
pub fn random_peer_id() -> PeerId {
    let mut rng = rand::thread_rng();
    let tail: String = (0..44)
        .map(|_| BASE58_ALPHABET[rng.gen_range(0..BASE58_ALPHABET.len())] as char)
        .collect();
    PeerId::new(format!("Qm{}", tail))
}

struct NodeSlot {
    events: EventSender,
    started: bool,
    topics: HashSet<Topic>,
    publish_failure: Option<String>,
    publish_delay: Duration,
}

impl NodeSlot {
    fn emit(&self, event: OverlayEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("overlay event dropped: receiver closed");
        }
    }
}

#[derive(Default)]
struct MeshState {
    nodes: HashMap<PeerId, NodeSlot>,
    links: HashSet<(PeerId, PeerId)>,
}

impl MeshState {
    fn link_key(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }

    fn linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.links.contains(&Self::link_key(a, b))
    }
}

/// Shared routing table for in-process nodes
#[derive(Clone, Default)]
pub struct MemoryMesh {
    state: Arc<Mutex<MeshState>>,
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stopped node with a generated identifier
    pub fn add_node(&self) -> (Arc<MemoryNode>, EventReceiver) {
        self.add_node_with_id(random_peer_id())
    }

    /// Add a stopped node with a fixed identifier.
    ///
    /// Re-adding an existing identifier replaces the previous node's event
    /// stream and drops all of its state.
    pub fn add_node_with_id(&self, id: impl Into<PeerId>) -> (Arc<MemoryNode>, EventReceiver) {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().nodes.insert(
            id.clone(),
            NodeSlot {
                events: tx,
                started: false,
                topics: HashSet::new(),
                publish_failure: None,
                publish_delay: Duration::ZERO,
            },
        );
        tracing::debug!(peer = %id, "memory node added");

        let node = MemoryNode {
            id,
            mesh: self.clone(),
        };
        (Arc::new(node), rx)
    }

    /// Open a connection between two nodes.
    ///
    /// Each call notifies both sides, even when the link already exists.
    pub fn connect(&self, a: &PeerId, b: &PeerId) {
        if a == b {
            return;
        }
        let mut state = self.state.lock();
        if !state.nodes.contains_key(a) || !state.nodes.contains_key(b) {
            tracing::warn!(%a, %b, "connect between unknown nodes ignored");
            return;
        }
        state.links.insert(MeshState::link_key(a, b));
        if let Some(slot) = state.nodes.get(a) {
            slot.emit(OverlayEvent::PeerConnected(b.clone()));
        }
        if let Some(slot) = state.nodes.get(b) {
            slot.emit(OverlayEvent::PeerConnected(a.clone()));
        }
    }

    /// Close the connection between two nodes, notifying both sides
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) {
        let mut state = self.state.lock();
        state.links.remove(&MeshState::link_key(a, b));
        if let Some(slot) = state.nodes.get(a) {
            slot.emit(OverlayEvent::PeerDisconnected(b.clone()));
        }
        if let Some(slot) = state.nodes.get(b) {
            slot.emit(OverlayEvent::PeerDisconnected(a.clone()));
        }
    }

    pub fn is_connected(&self, a: &PeerId, b: &PeerId) -> bool {
        self.state.lock().linked(a, b)
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }
}

/// A node attached to a `MemoryMesh`
pub struct MemoryNode {
    id: PeerId,
    mesh: MemoryMesh,
}

impl MemoryNode {
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn mesh(&self) -> &MemoryMesh {
        &self.mesh
    }

    /// Start the node and emit `OverlayEvent::Started`
    pub fn start(&self) {
        self.with_slot(|slot| {
            if !slot.started {
                slot.started = true;
                slot.emit(OverlayEvent::Started);
            }
        });
    }

    /// Stop the node and emit `OverlayEvent::Stopped`
    pub fn stop(&self) {
        self.with_slot(|slot| {
            if slot.started {
                slot.started = false;
                slot.emit(OverlayEvent::Stopped);
            }
        });
    }

    /// Make every publish fail with `reason` until cleared with `None`
    pub fn set_publish_failure(&self, reason: Option<String>) {
        self.with_slot(|slot| slot.publish_failure = reason);
    }

    /// Delay each publish before it is delivered
    pub fn set_publish_delay(&self, delay: Duration) {
        self.with_slot(|slot| slot.publish_delay = delay);
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        let state = self.mesh.state.lock();
        state
            .nodes
            .get(&self.id)
            .map(|slot| slot.topics.contains(topic))
            .unwrap_or(false)
    }

    /// Deliver raw bytes to this node as if `source` had published them,
    /// bypassing links and subscriptions.
    pub fn inject(&self, source: impl Into<PeerId>, topic: &Topic, data: impl Into<Bytes>) {
        let message = PubsubMessage {
            topic: topic.clone(),
            source: source.into(),
            data: data.into(),
            received_at: SystemTime::now(),
        };
        self.with_slot(|slot| slot.emit(OverlayEvent::Message(message)));
    }

    fn with_slot<R: Default>(&self, f: impl FnOnce(&mut NodeSlot) -> R) -> R {
        let mut state = self.mesh.state.lock();
        match state.nodes.get_mut(&self.id) {
            Some(slot) => f(slot),
            None => R::default(),
        }
    }

    /// Resolve recipients for a publish under the lock
    fn route(&self, topic: &Topic) -> RayoResult<(Vec<EventSender>, Duration)> {
        let state = self.mesh.state.lock();
        let Some(slot) = state.nodes.get(&self.id) else {
            return Err(RayoError::Publish("node removed from mesh".into()));
        };
        if !slot.started {
            return Err(RayoError::Publish("node not started".into()));
        }
        if let Some(reason) = &slot.publish_failure {
            return Err(RayoError::Publish(reason.clone()));
        }

        let recipients: Vec<EventSender> = state
            .nodes
            .iter()
            .filter(|(peer, other)| {
                **peer != self.id
                    && other.started
                    && other.topics.contains(topic)
                    && state.linked(&self.id, peer)
            })
            .map(|(_, other)| other.events.clone())
            .collect();

        if recipients.is_empty() {
            return Err(RayoError::InsufficientPeers);
        }
        Ok((recipients, slot.publish_delay))
    }
}

impl Overlay for MemoryNode {
    fn local_peer_id(&self) -> PeerId {
        self.id.clone()
    }

    fn is_started(&self) -> bool {
        self.with_slot(|slot| slot.started)
    }

    fn subscribe(&self, topic: &Topic) -> RayoResult<()> {
        let mut state = self.mesh.state.lock();
        let slot = state
            .nodes
            .get_mut(&self.id)
            .ok_or_else(|| RayoError::Subscribe("node removed from mesh".into()))?;
        slot.topics.insert(topic.clone());
        Ok(())
    }

    fn unsubscribe(&self, topic: &Topic) -> RayoResult<()> {
        self.with_slot(|slot| {
            slot.topics.remove(topic);
        });
        Ok(())
    }

    fn publish(&self, topic: &Topic, data: Bytes) -> impl Future<Output = RayoResult<()>> + Send {
        let routed = self.route(topic);
        let source = self.id.clone();
        let topic = topic.clone();

        async move {
            let (recipients, delay) = routed?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let received_at = SystemTime::now();
            for events in recipients {
                let message = PubsubMessage {
                    topic: topic.clone(),
                    source: source.clone(),
                    data: data.clone(),
                    received_at,
                };
                if events.send(OverlayEvent::Message(message)).is_err() {
                    tracing::trace!("recipient closed before delivery");
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut EventReceiver) -> Vec<OverlayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_random_peer_ids_differ() {
        let a = random_peer_id();
        let b = random_peer_id();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("Qm"));
        assert_eq!(a.as_str().len(), 46);
    }

    #[test]
    fn test_start_stop_emit_once() {
        let mesh = MemoryMesh::new();
        let (node, mut rx) = mesh.add_node();
        node.start();
        node.start();
        node.stop();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], OverlayEvent::Started));
        assert!(matches!(events[1], OverlayEvent::Stopped));
    }

    #[test]
    fn test_connect_notifies_both_sides_every_time() {
        let mesh = MemoryMesh::new();
        let (a, mut rx_a) = mesh.add_node_with_id("a");
        let (b, mut rx_b) = mesh.add_node_with_id("b");

        mesh.connect(a.id(), b.id());
        mesh.connect(a.id(), b.id());
        assert!(mesh.is_connected(b.id(), a.id()));

        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], OverlayEvent::PeerConnected(p) if p.as_str() == "b"));
        assert_eq!(drain(&mut rx_b).len(), 2);

        mesh.disconnect(a.id(), b.id());
        assert!(!mesh.is_connected(a.id(), b.id()));
        assert!(matches!(&drain(&mut rx_a)[0], OverlayEvent::PeerDisconnected(p) if p.as_str() == "b"));
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribed_neighbours_only() {
        let mesh = MemoryMesh::new();
        let topic = Topic::rayo();
        let (a, _rx_a) = mesh.add_node_with_id("a");
        let (b, mut rx_b) = mesh.add_node_with_id("b");
        let (c, mut rx_c) = mesh.add_node_with_id("c");
        for node in [&a, &b, &c] {
            node.start();
        }
        mesh.connect(a.id(), b.id());
        mesh.connect(a.id(), c.id());
        b.subscribe(&topic).unwrap();
        drain(&mut rx_b);
        drain(&mut rx_c);

        a.publish(&topic, Bytes::from_static(b"hi")).await.unwrap();

        let events = drain(&mut rx_b);
        assert_eq!(events.len(), 1);
        match &events[0] {
            OverlayEvent::Message(msg) => {
                assert_eq!(msg.source.as_str(), "a");
                assert_eq!(msg.data.as_ref(), b"hi");
                assert_eq!(msg.topic, topic);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(drain(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_peers_fails() {
        let mesh = MemoryMesh::new();
        let (a, _rx) = mesh.add_node();
        a.start();
        let err = a.publish(&Topic::rayo(), Bytes::new()).await.unwrap_err();
        assert!(matches!(err, RayoError::InsufficientPeers));
    }

    #[tokio::test]
    async fn test_publish_while_stopped_fails() {
        let mesh = MemoryMesh::new();
        let (a, _rx) = mesh.add_node();
        let err = a.publish(&Topic::rayo(), Bytes::new()).await.unwrap_err();
        assert!(matches!(err, RayoError::Publish(reason) if reason == "node not started"));
    }

    #[tokio::test]
    async fn test_forced_publish_failure() {
        let mesh = MemoryMesh::new();
        let (a, _rx_a) = mesh.add_node();
        let (b, _rx_b) = mesh.add_node();
        a.start();
        b.start();
        b.subscribe(&Topic::rayo()).unwrap();
        mesh.connect(a.id(), b.id());

        a.set_publish_failure(Some("boom".into()));
        assert!(a.publish(&Topic::rayo(), Bytes::new()).await.is_err());
        a.set_publish_failure(None);
        assert!(a.publish(&Topic::rayo(), Bytes::new()).await.is_ok());
    }

    #[test]
    fn test_unsubscribe() {
        let mesh = MemoryMesh::new();
        let (a, _rx) = mesh.add_node();
        a.subscribe(&Topic::rayo()).unwrap();
        assert!(a.is_subscribed(&Topic::rayo()));
        a.unsubscribe(&Topic::rayo()).unwrap();
        assert!(!a.is_subscribed(&Topic::rayo()));
    }
}
