//! Multi-node scenarios over the in-process mesh

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use rayo_core::{PeerId, RayoResult};
use rayo_overlay::{MemoryMesh, MemoryNode};
use rayo_runtime::{
    ChannelHandler, ChatSession, DisplayEvent, ReceivedMessage, SessionConfig, SessionDriver,
    SessionHandle,
};

/// Session type every scenario peer runs
pub type ScenarioSession = ChatSession<MemoryNode, ChannelHandler>;

/// Default time budget for waiting on asynchronous effects
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// One started node with a running session driver
pub struct ScenarioPeer {
    pub node: Arc<MemoryNode>,
    pub handle: SessionHandle,
    task: Option<JoinHandle<ScenarioSession>>,
    display: UnboundedReceiver<DisplayEvent>,
}

impl ScenarioPeer {
    pub fn id(&self) -> &PeerId {
        self.node.id()
    }

    /// Next display event, or `None` once `wait` elapses
    pub async fn next_event(&mut self, wait: Duration) -> Option<DisplayEvent> {
        timeout(wait, self.display.recv()).await.ok().flatten()
    }

    /// Next received message with its resolved author, skipping seed events
    pub async fn next_message(&mut self, wait: Duration) -> Option<(String, ReceivedMessage)> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining).await? {
                DisplayEvent::Message {
                    author, message, ..
                } => return Some((author, message)),
                DisplayEvent::Seed(_) => continue,
            }
        }
    }

    /// Everything already queued for the display layer
    pub fn drain(&mut self) -> Vec<DisplayEvent> {
        std::iter::from_fn(|| self.display.try_recv().ok()).collect()
    }

    /// Poll the driver until the connected set has `count` peers
    pub async fn wait_for_peers(&self, count: usize, wait: Duration) -> RayoResult<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.handle.connected_peers().await?.len() == count {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Poll the driver until the shared seed equals `seed`
    pub async fn wait_for_seed(&self, seed: i64, wait: Duration) -> RayoResult<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.handle.seed().await?.seed == seed {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Shut the driver down and take the session back
    pub async fn stop(&mut self) -> Option<ScenarioSession> {
        let task = self.task.take()?;
        if self.handle.shutdown().await.is_err() {
            tracing::debug!(peer = %self.id(), "driver already stopped");
        }
        task.await.ok()
    }
}

/// A set of peers sharing one `MemoryMesh`
pub struct MeshScenario {
    mesh: MemoryMesh,
    config: SessionConfig,
    peers: Vec<ScenarioPeer>,
}

impl MeshScenario {
    pub fn new(config: SessionConfig) -> Self {
        MeshScenario {
            mesh: MemoryMesh::new(),
            config,
            peers: Vec::new(),
        }
    }

    /// Scenario with the heartbeat switched off
    pub fn quiet() -> Self {
        Self::new(SessionConfig {
            heartbeat_text: None,
            ..Default::default()
        })
    }

    pub fn mesh(&self) -> &MemoryMesh {
        &self.mesh
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a node and its session driver. Must run inside a tokio runtime.
    pub fn add_peer(&mut self, id: impl Into<PeerId>) -> RayoResult<usize> {
        let config = self.config.clone();
        self.add_peer_with_config(id, &config)
    }

    pub fn add_peer_with_config(
        &mut self,
        id: impl Into<PeerId>,
        config: &SessionConfig,
    ) -> RayoResult<usize> {
        let (node, events) = self.mesh.add_node_with_id(id);
        node.start();

        let (handler, display) = ChannelHandler::new();
        let session = ChatSession::new(Arc::clone(&node), config, handler)?;
        let (handle, task) = SessionDriver::spawn(session, events, config);

        self.peers.push(ScenarioPeer {
            node,
            handle,
            task: Some(task),
            display,
        });
        Ok(self.peers.len() - 1)
    }

    pub fn peer(&self, index: usize) -> &ScenarioPeer {
        &self.peers[index]
    }

    pub fn peer_mut(&mut self, index: usize) -> &mut ScenarioPeer {
        &mut self.peers[index]
    }

    pub fn peers(&self) -> &[ScenarioPeer] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn connect(&self, a: usize, b: usize) {
        self.mesh.connect(self.peers[a].id(), self.peers[b].id());
    }

    pub fn disconnect(&self, a: usize, b: usize) {
        self.mesh.disconnect(self.peers[a].id(), self.peers[b].id());
    }

    /// Link every pair of peers
    pub fn connect_all(&self) {
        for a in 0..self.peers.len() {
            for b in (a + 1)..self.peers.len() {
                self.connect(a, b);
            }
        }
    }

    /// Wait until every peer sees `count` connected peers
    pub async fn wait_for_mesh(&self, count: usize, wait: Duration) -> RayoResult<bool> {
        for peer in &self.peers {
            if !peer.wait_for_peers(count, wait).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Stop every driver, returning the sessions in peer order
    pub async fn shutdown(mut self) -> Vec<Option<ScenarioSession>> {
        let mut sessions = Vec::with_capacity(self.peers.len());
        for peer in &mut self.peers {
            sessions.push(peer.stop().await);
        }
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayo_wire::ChatMessage;

    #[tokio::test]
    async fn test_full_mesh_converges() {
        let mut scenario = MeshScenario::quiet();
        for id in ["a", "b", "c", "d"] {
            scenario.add_peer(id).unwrap();
        }
        scenario.connect_all();
        assert!(scenario.wait_for_mesh(3, DEFAULT_WAIT).await.unwrap());
    }

    #[tokio::test]
    async fn test_next_message_skips_seed_events() {
        let mut scenario = MeshScenario::quiet();
        let a = scenario.add_peer("a").unwrap();
        let b = scenario.add_peer("b").unwrap();
        scenario.connect(a, b);
        assert!(scenario.wait_for_mesh(1, DEFAULT_WAIT).await.unwrap());

        scenario.peer(a).handle.send(3).await.unwrap();
        scenario.peer(a).handle.send_text("hello").await.unwrap();

        let peer_b = scenario.peer_mut(b);
        let (_, first) = peer_b.next_message(DEFAULT_WAIT).await.unwrap();
        let (_, second) = peer_b.next_message(DEFAULT_WAIT).await.unwrap();
        assert_eq!(first.message.data, ChatMessage::Seed(3));
        assert_eq!(second.message.data, ChatMessage::from("hello"));
    }

    #[tokio::test]
    async fn test_shutdown_returns_unjoined_sessions() {
        let mut scenario = MeshScenario::quiet();
        scenario.add_peer("a").unwrap();
        scenario.add_peer("b").unwrap();

        let sessions = scenario.shutdown().await;
        assert_eq!(sessions.len(), 2);
        assert!(sessions
            .iter()
            .all(|session| matches!(session, Some(s) if !s.is_joined())));
    }
}
