//! Overlay network interface

use std::future::Future;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::sync::mpsc;

use rayo_core::{PeerId, RayoResult, Topic};

/// Raw pubsub message as delivered by the overlay
#[derive(Clone, Debug)]
pub struct PubsubMessage {
    pub topic: Topic,
    /// Originating peer
    pub source: PeerId,
    pub data: Bytes,
    pub received_at: SystemTime,
}

/// Events surfaced by the overlay, in delivery order
#[derive(Clone, Debug)]
pub enum OverlayEvent {
    /// The local node started
    Started,
    /// The local node stopped
    Stopped,
    /// A connection to a remote peer opened
    PeerConnected(PeerId),
    /// A connection to a remote peer closed
    PeerDisconnected(PeerId),
    /// A message arrived on a subscribed topic
    Message(PubsubMessage),
}

/// Overlay event sender
pub type EventSender = mpsc::UnboundedSender<OverlayEvent>;

/// Overlay event receiver
pub type EventReceiver = mpsc::UnboundedReceiver<OverlayEvent>;

/// Primitives the session layer needs from the overlay stack.
///
/// Subscriptions only register interest; matching messages arrive on the
/// node's `EventReceiver` as `OverlayEvent::Message`.
pub trait Overlay: Send + Sync + 'static {
    /// Identifier of the local node
    fn local_peer_id(&self) -> PeerId;

    /// Whether the node is running
    fn is_started(&self) -> bool;

    fn subscribe(&self, topic: &Topic) -> RayoResult<()>;

    fn unsubscribe(&self, topic: &Topic) -> RayoResult<()>;

    /// Publish `data` to every peer subscribed to `topic`
    fn publish(&self, topic: &Topic, data: Bytes) -> impl Future<Output = RayoResult<()>> + Send;
}
