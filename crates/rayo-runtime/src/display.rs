//! Display-layer callbacks
//!
//! The display layer only consumes: one callback per received message and
//! one per seed change. It never mutates session state directly.

use std::time::SystemTime;

use tokio::sync::mpsc;

use rayo_core::PeerId;
use rayo_wire::ChatMessage;

use crate::HandleDirectory;

/// Payload half of a received message
#[derive(Clone, Debug, PartialEq)]
pub struct MessageBody {
    pub data: ChatMessage,
    pub created: SystemTime,
}

/// `{ from, message: { data, created } }`
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedMessage {
    pub from: PeerId,
    pub message: MessageBody,
}

/// `{ seed }`, with the peer that set it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedUpdate {
    pub seed: i64,
    pub from: PeerId,
}

/// Read-only view of the session handed to handlers
pub struct HandlerContext<'a> {
    handles: &'a HandleDirectory,
}

impl<'a> HandlerContext<'a> {
    pub fn new(handles: &'a HandleDirectory) -> Self {
        HandlerContext { handles }
    }

    pub fn local_peer(&self) -> &'a PeerId {
        self.handles.local_peer()
    }

    /// Whether `peer` is the local node
    pub fn is_self(&self, peer: &PeerId) -> bool {
        self.handles.is_local(peer)
    }

    /// Known handle or the first characters of the identifier
    pub fn display_name<'b>(&'b self, peer: &'b PeerId) -> &'b str {
        self.handles.display_name(peer)
    }

    pub fn handles(&self) -> &'a HandleDirectory {
        self.handles
    }
}

/// Receives decoded messages and seed changes from a session
pub trait MessageHandler: Send + 'static {
    fn on_message(&mut self, ctx: &HandlerContext<'_>, msg: ReceivedMessage);

    fn on_seed(&mut self, _update: SeedUpdate) {}
}

/// Events produced by [`ChannelHandler`]
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayEvent {
    Message {
        /// Resolved display name of the sender
        author: String,
        from_self: bool,
        message: ReceivedMessage,
    },
    Seed(SeedUpdate),
}

/// Forwards everything to an mpsc channel, resolving authors on the way
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelHandler { tx }, rx)
    }

    fn forward(&self, event: DisplayEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("display receiver closed");
        }
    }
}

impl MessageHandler for ChannelHandler {
    fn on_message(&mut self, ctx: &HandlerContext<'_>, msg: ReceivedMessage) {
        let author = ctx.display_name(&msg.from).to_string();
        let from_self = ctx.is_self(&msg.from);
        self.forward(DisplayEvent::Message {
            author,
            from_self,
            message: msg,
        });
    }

    fn on_seed(&mut self, update: SeedUpdate) {
        self.forward(DisplayEvent::Seed(update));
    }
}

/// Renders one log line per message
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHandler;

impl LogHandler {
    /// `author(time): data`
    pub fn format_line(author: &str, created: SystemTime, data: &ChatMessage) -> String {
        format!(
            "{}({}): {}",
            author,
            humantime::format_rfc3339_seconds(created),
            data
        )
    }
}

impl MessageHandler for LogHandler {
    fn on_message(&mut self, ctx: &HandlerContext<'_>, msg: ReceivedMessage) {
        let line = Self::format_line(
            ctx.display_name(&msg.from),
            msg.message.created,
            &msg.message.data,
        );
        tracing::info!(from_self = ctx.is_self(&msg.from), "{}", line);
    }

    fn on_seed(&mut self, update: SeedUpdate) {
        tracing::info!(seed = update.seed, from = %update.from, "seed changed");
    }
}
