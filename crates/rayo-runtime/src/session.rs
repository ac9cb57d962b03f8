//! Chat session - the pubsub messaging core
//!
//! A `ChatSession` owns every piece of mutable session state: the topic
//! channel, the connected peer set, the handle directory and the shared
//! seed. It is driven one event at a time, either directly (tests, simple
//! embeddings) or through [`crate::SessionDriver`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;

use rayo_core::{PeerId, RayoResult, Topic};
use rayo_overlay::{Overlay, OverlayEvent, PubsubMessage};
use rayo_wire::ChatMessage;

use crate::{
    ChannelStats, HandleDirectory, HandlerContext, InboundMessage, MessageBody, MessageHandler,
    PeerSetChange, PeerTracker, ReceivedMessage, SeedUpdate, SessionConfig, TopicChannel,
};

/// The shared seed as last seen by this session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedState {
    pub seed: i64,
    pub updated_by: Option<PeerId>,
    pub updated_at: Option<SystemTime>,
}

/// Pubsub chat session bound to one overlay node
pub struct ChatSession<O: Overlay, H: MessageHandler> {
    local: PeerId,
    channel: TopicChannel<O>,
    tracker: PeerTracker,
    handles: HandleDirectory,
    seed: SeedState,
    handler: H,
    echo_local: bool,
}

impl<O: Overlay, H: MessageHandler> ChatSession<O, H> {
    /// Create a session, joining the topic right away if the overlay is
    /// already running.
    pub fn new(overlay: Arc<O>, config: &SessionConfig, handler: H) -> RayoResult<Self> {
        let local = overlay.local_peer_id();
        let started = overlay.is_started();

        let mut session = ChatSession {
            channel: TopicChannel::new(overlay, config.topic()),
            tracker: PeerTracker::new(local.clone()),
            handles: HandleDirectory::new(local.clone(), config.local_handle.as_str()),
            seed: SeedState::default(),
            handler,
            echo_local: config.echo_local,
            local,
        };

        if started {
            session.channel.join()?;
        }
        Ok(session)
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    pub fn topic(&self) -> &Topic {
        self.channel.topic()
    }

    pub fn is_joined(&self) -> bool {
        self.channel.is_joined()
    }

    pub fn channel_stats(&self) -> &ChannelStats {
        self.channel.stats()
    }

    pub fn connected_peers(&self) -> &HashSet<PeerId> {
        self.tracker.connected_peers()
    }

    pub fn tracker(&self) -> &PeerTracker {
        &self.tracker
    }

    /// Subscribe to connected-set changes
    pub fn set_peer_notifier(&mut self, notifier: mpsc::UnboundedSender<PeerSetChange>) {
        self.tracker.set_notifier(notifier);
    }

    pub fn handles(&self) -> &HandleDirectory {
        &self.handles
    }

    pub fn set_handle(&mut self, peer: PeerId, handle: impl Into<String>) -> RayoResult<()> {
        self.handles.insert(peer, handle)
    }

    pub fn seed(&self) -> &SeedState {
        &self.seed
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Overlay started
    pub fn on_start(&mut self) -> RayoResult<()> {
        self.channel.join()
    }

    /// Overlay stopped
    pub fn on_stop(&mut self) {
        self.channel.leave();
    }

    pub fn on_peer_connected(&mut self, peer: PeerId) -> bool {
        let added = self.tracker.on_connect(peer.clone());
        if added {
            tracing::info!(%peer, connected = self.tracker.len(), "peer connected");
        }
        added
    }

    pub fn on_peer_disconnected(&mut self, peer: &PeerId) -> bool {
        let removed = self.tracker.on_disconnect(peer);
        if removed {
            tracing::info!(%peer, connected = self.tracker.len(), "peer disconnected");
        }
        removed
    }

    pub fn on_message(&mut self, raw: PubsubMessage) {
        if let Some(inbound) = self.channel.decode_inbound(raw) {
            self.deliver(inbound);
        }
    }

    /// Apply one overlay event
    pub fn handle_event(&mut self, event: OverlayEvent) {
        match event {
            OverlayEvent::Started => {
                if let Err(e) = self.on_start() {
                    tracing::error!(topic = %self.topic(), error = %e, "could not join topic");
                }
            }
            OverlayEvent::Stopped => self.on_stop(),
            OverlayEvent::PeerConnected(peer) => {
                self.on_peer_connected(peer);
            }
            OverlayEvent::PeerDisconnected(peer) => {
                self.on_peer_disconnected(&peer);
            }
            OverlayEvent::Message(raw) => self.on_message(raw),
        }
    }

    /// Encode `message` and check the join state, returning the network
    /// half of the publish. Pair with [`ChatSession::complete`].
    pub fn prepare(
        &self,
        message: &ChatMessage,
    ) -> RayoResult<impl Future<Output = RayoResult<()>> + Send + 'static> {
        let data = message.encode()?;
        self.channel.begin_publish(data)
    }

    /// Record the outcome of a publish started with [`ChatSession::prepare`]
    pub fn complete(&mut self, message: ChatMessage, result: &RayoResult<()>) {
        self.channel.record_publish(result);
        if result.is_err() {
            return;
        }

        let now = SystemTime::now();
        if self.echo_local {
            self.deliver(InboundMessage {
                from: self.local.clone(),
                message,
                received_at: now,
            });
        } else if let ChatMessage::Seed(seed) = message {
            self.apply_seed(seed, self.local.clone(), now);
        }
    }

    /// Broadcast a new seed
    pub async fn send(&mut self, seed: i64) -> RayoResult<()> {
        self.send_message(ChatMessage::Seed(seed)).await
    }

    /// Broadcast chat text
    pub async fn send_text(&mut self, text: impl Into<String>) -> RayoResult<()> {
        self.send_message(ChatMessage::Text(text.into())).await
    }

    pub async fn send_message(&mut self, message: ChatMessage) -> RayoResult<()> {
        let pending = self.prepare(&message)?;
        let result = pending.await;
        self.complete(message, &result);
        result
    }

    fn deliver(&mut self, inbound: InboundMessage) {
        let InboundMessage {
            from,
            message,
            received_at,
        } = inbound;
        let seed = message.seed();

        let ctx = HandlerContext::new(&self.handles);
        self.handler.on_message(
            &ctx,
            ReceivedMessage {
                from: from.clone(),
                message: MessageBody {
                    data: message,
                    created: received_at,
                },
            },
        );

        if let Some(seed) = seed {
            self.apply_seed(seed, from, received_at);
        }
    }

    fn apply_seed(&mut self, seed: i64, from: PeerId, at: SystemTime) {
        tracing::debug!(seed, %from, "seed updated");
        self.seed = SeedState {
            seed,
            updated_by: Some(from.clone()),
            updated_at: Some(at),
        };
        self.handler.on_seed(SeedUpdate { seed, from });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelHandler, DisplayEvent, PeerSetChangeKind};
    use rayo_core::RayoError;
    use rayo_overlay::{EventReceiver, MemoryMesh, MemoryNode};
    use tokio::sync::mpsc::UnboundedReceiver;

    type TestSession = ChatSession<MemoryNode, ChannelHandler>;

    struct Peer {
        node: Arc<MemoryNode>,
        events: EventReceiver,
        session: TestSession,
        display: UnboundedReceiver<DisplayEvent>,
    }

    impl Peer {
        fn new(mesh: &MemoryMesh, id: &str, start: bool) -> Self {
            let (node, events) = mesh.add_node_with_id(id);
            if start {
                node.start();
            }
            let (handler, display) = ChannelHandler::new();
            let session =
                ChatSession::new(Arc::clone(&node), &SessionConfig::default(), handler).unwrap();
            Peer {
                node,
                events,
                session,
                display,
            }
        }

        fn pump(&mut self) {
            while let Ok(event) = self.events.try_recv() {
                self.session.handle_event(event);
            }
        }

        fn display_events(&mut self) -> Vec<DisplayEvent> {
            std::iter::from_fn(|| self.display.try_recv().ok()).collect()
        }
    }

    #[test]
    fn test_new_seeds_local_handle() {
        let mesh = MemoryMesh::new();
        let peer = Peer::new(&mesh, "QmAlice", false);
        assert_eq!(peer.session.handles().get(&PeerId::new("QmAlice")), Some("Me"));
        assert!(peer.session.connected_peers().is_empty());
        assert_eq!(peer.session.seed(), &SeedState::default());
    }

    #[test]
    fn test_joins_immediately_when_started() {
        let mesh = MemoryMesh::new();
        let started = Peer::new(&mesh, "a", true);
        let stopped = Peer::new(&mesh, "b", false);
        assert!(started.session.is_joined());
        assert!(!stopped.session.is_joined());
    }

    #[test]
    fn test_lifecycle_hooks_follow_overlay() {
        let mesh = MemoryMesh::new();
        let mut peer = Peer::new(&mesh, "a", false);

        peer.node.start();
        peer.pump();
        assert!(peer.session.is_joined());
        assert!(peer.node.is_subscribed(&Topic::rayo()));

        peer.node.stop();
        peer.pump();
        assert!(!peer.session.is_joined());
        assert!(!peer.node.is_subscribed(&Topic::rayo()));
    }

    #[tokio::test]
    async fn test_send_before_join_fails() {
        let mesh = MemoryMesh::new();
        let mut peer = Peer::new(&mesh, "a", false);
        let err = peer.session.send(1).await.unwrap_err();
        assert!(matches!(err, RayoError::NotJoined { .. }));
        assert_eq!(peer.session.seed().seed, 0);
    }

    #[test]
    fn test_repeated_connect_events_dedupe() {
        let mesh = MemoryMesh::new();
        let mut a = Peer::new(&mesh, "a", true);
        let b = Peer::new(&mesh, "b", true);

        mesh.connect(a.node.id(), b.node.id());
        mesh.connect(a.node.id(), b.node.id());
        a.pump();
        assert_eq!(a.session.tracker().snapshot(), vec![PeerId::new("b")]);

        mesh.disconnect(a.node.id(), b.node.id());
        mesh.disconnect(a.node.id(), b.node.id());
        a.pump();
        assert!(a.session.connected_peers().is_empty());
    }

    #[test]
    fn test_peer_notifier_follows_mesh_links() {
        let mesh = MemoryMesh::new();
        let mut a = Peer::new(&mesh, "a", true);
        let b = Peer::new(&mesh, "b", true);
        let (tx, mut changes) = mpsc::unbounded_channel();
        a.session.set_peer_notifier(tx);

        mesh.connect(a.node.id(), b.node.id());
        mesh.connect(a.node.id(), b.node.id());
        a.pump();
        mesh.disconnect(a.node.id(), b.node.id());
        a.pump();

        let seen: Vec<PeerSetChange> = std::iter::from_fn(|| changes.try_recv().ok()).collect();
        assert_eq!(
            seen,
            vec![
                PeerSetChange {
                    peer: PeerId::new("b"),
                    kind: PeerSetChangeKind::Connected,
                    connected: 1,
                },
                PeerSetChange {
                    peer: PeerId::new("b"),
                    kind: PeerSetChangeKind::Disconnected,
                    connected: 0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_seed_reaches_peer() {
        let mesh = MemoryMesh::new();
        let mut a = Peer::new(&mesh, "QmAlice", true);
        let mut b = Peer::new(&mesh, "QmBob", true);
        mesh.connect(a.node.id(), b.node.id());
        a.pump();
        b.pump();

        a.session.send(42).await.unwrap();
        b.pump();

        let events = b.display_events();
        assert_eq!(events.len(), 2);
        match &events[0] {
            DisplayEvent::Message {
                author,
                from_self,
                message,
            } => {
                assert_eq!(author, "QmAlic");
                assert!(!from_self);
                assert_eq!(message.from, PeerId::new("QmAlice"));
                assert_eq!(message.message.data, ChatMessage::Seed(42));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            events[1],
            DisplayEvent::Seed(SeedUpdate {
                seed: 42,
                from: PeerId::new("QmAlice"),
            })
        );
        assert_eq!(b.session.seed().seed, 42);
        assert_eq!(b.session.seed().updated_by, Some(PeerId::new("QmAlice")));

        // The sender sees its own message echoed as self-originated
        assert_eq!(a.session.seed().seed, 42);
        let own = a.display_events();
        assert!(matches!(
            &own[0],
            DisplayEvent::Message { author, from_self: true, .. } if author == "Me"
        ));
    }

    #[tokio::test]
    async fn test_text_does_not_touch_seed() {
        let mesh = MemoryMesh::new();
        let mut a = Peer::new(&mesh, "a", true);
        let mut b = Peer::new(&mesh, "b", true);
        mesh.connect(a.node.id(), b.node.id());

        a.session.send(5).await.unwrap();
        a.session.send_text("Checking in").await.unwrap();
        b.pump();

        assert_eq!(b.session.seed().seed, 5);
        let texts: Vec<ChatMessage> = b
            .display_events()
            .into_iter()
            .filter_map(|event| match event {
                DisplayEvent::Message { message, .. } => Some(message.message.data),
                DisplayEvent::Seed(_) => None,
            })
            .collect();
        assert_eq!(texts, vec![ChatMessage::Seed(5), ChatMessage::from("Checking in")]);
    }

    #[tokio::test]
    async fn test_publish_failure_is_per_call() {
        let mesh = MemoryMesh::new();
        let mut a = Peer::new(&mesh, "a", true);
        let mut b = Peer::new(&mesh, "b", true);

        let err = a.session.send(1).await.unwrap_err();
        assert!(matches!(err, RayoError::InsufficientPeers));
        assert_eq!(a.session.seed().seed, 0);
        assert!(a.session.is_joined());

        mesh.connect(a.node.id(), b.node.id());
        a.session.send(2).await.unwrap();
        b.pump();
        assert_eq!(b.session.seed().seed, 2);
    }

    #[test]
    fn test_malformed_messages_never_reach_handler() {
        let mesh = MemoryMesh::new();
        let mut a = Peer::new(&mesh, "a", true);

        for _ in 0..10 {
            a.node.inject("mallory", &Topic::rayo(), vec![0x10]);
            a.node.inject("mallory", &Topic::rayo(), vec![0x08, 0x01]);
        }
        a.node.inject("bob", &Topic::rayo(), vec![0x10, 0x03]);
        a.pump();

        let events = a.display_events();
        assert_eq!(events.len(), 2);
        assert_eq!(a.session.seed().seed, 3);
        assert_eq!(a.session.channel_stats().malformed, 20);
        assert!(a.session.is_joined());
    }

    #[tokio::test]
    async fn test_without_echo_seed_still_recorded() {
        let mesh = MemoryMesh::new();
        let (a, _rx_a) = mesh.add_node_with_id("a");
        let (b, _rx_b) = mesh.add_node_with_id("b");
        a.start();
        b.start();
        b.subscribe(&Topic::rayo()).unwrap();
        mesh.connect(a.id(), b.id());

        let config = SessionConfig {
            echo_local: false,
            ..Default::default()
        };
        let (handler, mut display) = ChannelHandler::new();
        let mut session = ChatSession::new(a, &config, handler).unwrap();

        session.send(77).await.unwrap();
        assert_eq!(session.seed().seed, 77);
        assert_eq!(session.seed().updated_by, Some(PeerId::new("a")));
        assert!(matches!(display.try_recv().unwrap(), DisplayEvent::Seed(_)));
        assert!(display.try_recv().is_err());
    }

    #[test]
    fn test_set_handle_used_for_display() {
        let mesh = MemoryMesh::new();
        let mut a = Peer::new(&mesh, "a", true);
        a.session.set_handle(PeerId::new("QmBob"), "Bob").unwrap();
        assert!(a.session.set_handle(PeerId::new("QmBob"), "Other").is_err());

        a.node.inject("QmBob", &Topic::rayo(), vec![0x10, 0x01]);
        a.pump();
        assert!(matches!(
            &a.display_events()[0],
            DisplayEvent::Message { author, .. } if author == "Bob"
        ));
    }
}
