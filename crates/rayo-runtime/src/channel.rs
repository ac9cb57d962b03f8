//! Topic channel - subscription lifecycle and message routing

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use rayo_core::{PeerId, RayoError, RayoResult, Topic};
use rayo_overlay::{Overlay, PubsubMessage};
use rayo_wire::ChatMessage;

/// Subscription state of a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Unjoined,
    Joined,
}

/// A decoded inbound message
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub from: PeerId,
    pub message: ChatMessage,
    pub received_at: SystemTime,
}

#[derive(Clone, Debug, Default)]
pub struct ChannelStats {
    pub joins: u64,
    pub received: u64,
    /// Inbound messages that failed to decode
    pub malformed: u64,
    /// Inbound messages for another topic or while unjoined
    pub ignored: u64,
    pub published: u64,
    pub publish_failures: u64,
}

/// Owns the subscription to one topic on one overlay node
pub struct TopicChannel<O: Overlay> {
    overlay: Arc<O>,
    topic: Topic,
    state: ChannelState,
    stats: ChannelStats,
}

impl<O: Overlay> TopicChannel<O> {
    pub fn new(overlay: Arc<O>, topic: Topic) -> Self {
        TopicChannel {
            overlay,
            topic,
            state: ChannelState::Unjoined,
            stats: ChannelStats::default(),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_joined(&self) -> bool {
        self.state == ChannelState::Joined
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Subscribe to the topic. No-op when already joined.
    pub fn join(&mut self) -> RayoResult<()> {
        if self.is_joined() {
            return Ok(());
        }
        self.overlay.subscribe(&self.topic)?;
        self.state = ChannelState::Joined;
        self.stats.joins += 1;
        tracing::info!(topic = %self.topic, "joined topic");
        Ok(())
    }

    /// Unsubscribe from the topic. The channel is unjoined afterwards even
    /// if the overlay reports an error.
    pub fn leave(&mut self) {
        if !self.is_joined() {
            return;
        }
        if let Err(e) = self.overlay.unsubscribe(&self.topic) {
            tracing::warn!(topic = %self.topic, error = %e, "unsubscribe failed");
        }
        self.state = ChannelState::Unjoined;
        tracing::info!(topic = %self.topic, "left topic");
    }

    /// Check the join state now and return the network half of the publish.
    ///
    /// The returned future owns everything it needs, so it can be spawned
    /// while the channel keeps handling inbound traffic.
    pub fn begin_publish(
        &self,
        data: Bytes,
    ) -> RayoResult<impl Future<Output = RayoResult<()>> + Send + 'static> {
        if !self.is_joined() {
            return Err(RayoError::NotJoined {
                topic: self.topic.to_string(),
            });
        }

        let overlay = Arc::clone(&self.overlay);
        let topic = self.topic.clone();
        Ok(async move { overlay.publish(&topic, data).await })
    }

    /// Account for a finished publish started with `begin_publish`
    pub fn record_publish(&mut self, result: &RayoResult<()>) {
        match result {
            Ok(()) => self.stats.published += 1,
            Err(e) => {
                self.stats.publish_failures += 1;
                tracing::debug!(topic = %self.topic, error = %e, "publish failed");
            }
        }
    }

    pub async fn publish(&mut self, data: Bytes) -> RayoResult<()> {
        let pending = self.begin_publish(data)?;
        let result = pending.await;
        self.record_publish(&result);
        result
    }

    /// Decode a raw overlay message. Anything that does not decode is logged
    /// and dropped here; it never reaches the handler.
    pub fn decode_inbound(&mut self, raw: PubsubMessage) -> Option<InboundMessage> {
        if raw.topic != self.topic {
            self.stats.ignored += 1;
            tracing::debug!(topic = %raw.topic, "ignoring message for foreign topic");
            return None;
        }
        if !self.is_joined() {
            self.stats.ignored += 1;
            tracing::debug!(from = %raw.source, "ignoring message while unjoined");
            return None;
        }

        match ChatMessage::decode(&raw.data) {
            Ok(message) => {
                self.stats.received += 1;
                Some(InboundMessage {
                    from: raw.source,
                    message,
                    received_at: raw.received_at,
                })
            }
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(
                    from = %raw.source,
                    len = raw.data.len(),
                    error = %e,
                    "dropping malformed message"
                );
                None
            }
        }
    }
}
