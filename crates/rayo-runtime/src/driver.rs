//! Session driver
//!
//! The driver is the only owner of a [`ChatSession`]. It runs as one tokio
//! task selecting over overlay events, commands from [`SessionHandle`]s,
//! finished publishes and the heartbeat timer. Publishes are spawned so a
//! slow network call never holds up inbound events.

use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use rayo_core::{PeerId, RayoError, RayoResult};
use rayo_overlay::{EventReceiver, Overlay};
use rayo_wire::ChatMessage;

use crate::{ChatSession, MessageHandler, SeedState, SessionConfig};

/// Requests served by the driver
#[derive(Debug)]
pub enum SessionCommand {
    Send {
        message: ChatMessage,
        respond_to: oneshot::Sender<RayoResult<()>>,
    },
    ConnectedPeers {
        respond_to: oneshot::Sender<Vec<PeerId>>,
    },
    Seed {
        respond_to: oneshot::Sender<SeedState>,
    },
    SetHandle {
        peer: PeerId,
        handle: String,
        respond_to: oneshot::Sender<RayoResult<()>>,
    },
    Shutdown,
}

/// A spawned publish reporting back to the driver.
/// `respond_to` is `None` for heartbeats.
struct PublishCompletion {
    message: ChatMessage,
    result: RayoResult<()>,
    respond_to: Option<oneshot::Sender<RayoResult<()>>>,
}

/// Cloneable front end of a running session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Broadcast a new seed
    pub async fn send(&self, seed: i64) -> RayoResult<()> {
        self.send_message(ChatMessage::Seed(seed)).await
    }

    /// Broadcast chat text
    pub async fn send_text(&self, text: impl Into<String>) -> RayoResult<()> {
        self.send_message(ChatMessage::Text(text.into())).await
    }

    pub async fn send_message(&self, message: ChatMessage) -> RayoResult<()> {
        self.request(|respond_to| SessionCommand::Send {
            message,
            respond_to,
        })
        .await?
    }

    /// Publish a random seed and return it
    pub async fn roll(&self) -> RayoResult<i64> {
        let seed = rand::thread_rng().gen_range(0..=i64::from(i32::MAX));
        self.send(seed).await?;
        Ok(seed)
    }

    /// Sorted snapshot of the connected peer set
    pub async fn connected_peers(&self) -> RayoResult<Vec<PeerId>> {
        self.request(|respond_to| SessionCommand::ConnectedPeers { respond_to })
            .await
    }

    pub async fn seed(&self) -> RayoResult<SeedState> {
        self.request(|respond_to| SessionCommand::Seed { respond_to })
            .await
    }

    pub async fn set_handle(&self, peer: PeerId, handle: impl Into<String>) -> RayoResult<()> {
        let handle = handle.into();
        self.request(|respond_to| SessionCommand::SetHandle {
            peer,
            handle,
            respond_to,
        })
        .await?
    }

    /// Stop the driver. The session leaves its topic on the way out.
    pub async fn shutdown(&self) -> RayoResult<()> {
        self.cmd_tx
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| RayoError::SessionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> RayoResult<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(command(tx))
            .await
            .map_err(|_| RayoError::SessionClosed)?;
        rx.await.map_err(|_| RayoError::SessionClosed)
    }
}

/// Runs a [`ChatSession`] on its own task
pub struct SessionDriver<O: Overlay, H: MessageHandler> {
    session: ChatSession<O, H>,
    events: EventReceiver,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    done_tx: mpsc::UnboundedSender<PublishCompletion>,
    done_rx: mpsc::UnboundedReceiver<PublishCompletion>,
    heartbeat_text: Option<String>,
    heartbeat_interval: Duration,
}

impl<O: Overlay, H: MessageHandler> SessionDriver<O, H> {
    /// Spawn the driver. The join handle yields the session back once the
    /// driver stops.
    pub fn spawn(
        session: ChatSession<O, H>,
        events: EventReceiver,
        config: &SessionConfig,
    ) -> (SessionHandle, JoinHandle<ChatSession<O, H>>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let driver = SessionDriver {
            session,
            events,
            cmd_rx,
            done_tx,
            done_rx,
            heartbeat_text: config.heartbeat_text.clone(),
            heartbeat_interval: config.heartbeat_interval,
        };
        let task = tokio::spawn(driver.run());
        (SessionHandle { cmd_tx }, task)
    }

    async fn run(mut self) -> ChatSession<O, H> {
        let mut heartbeat = self.heartbeat_timer();
        let mut commands_open = true;

        tracing::info!(
            peer = %self.session.local_peer(),
            topic = %self.session.topic(),
            "session driver started"
        );
        if self.heartbeat_text.is_some() {
            tracing::info!(
                interval = %humantime::format_duration(self.heartbeat_interval),
                "heartbeat is sent as chat text; seed-only peers will drop it"
            );
        }

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.session.handle_event(event),
                    None => {
                        tracing::info!("overlay event stream closed");
                        break;
                    }
                },
                command = self.cmd_rx.recv(), if commands_open => match command {
                    Some(SessionCommand::Shutdown) => {
                        tracing::info!("session shutdown requested");
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!("all session handles dropped");
                        commands_open = false;
                    }
                },
                Some(done) = self.done_rx.recv() => self.finish_publish(done),
                _ = next_tick(&mut heartbeat) => self.heartbeat(),
            }
        }

        self.drain_publishes().await;
        self.session.on_stop();
        tracing::info!(peer = %self.session.local_peer(), "session driver stopped");
        self.session
    }

    /// Wait for every spawned publish so callers get the real outcome and
    /// the returned session records it.
    async fn drain_publishes(&mut self) {
        // Only the spawned tasks hold senders from here on, so the channel
        // closes once the last of them finishes.
        let (closed_tx, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.done_tx, closed_tx));

        while let Some(done) = self.done_rx.recv().await {
            self.finish_publish(done);
        }
    }

    fn heartbeat_timer(&self) -> Option<Interval> {
        self.heartbeat_text.as_ref()?;
        if self.heartbeat_interval.is_zero() {
            return None;
        }
        let period = self.heartbeat_interval;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(timer)
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Send {
                message,
                respond_to,
            } => self.start_publish(message, Some(respond_to)),
            SessionCommand::ConnectedPeers { respond_to } => {
                reply(respond_to, self.session.tracker().snapshot());
            }
            SessionCommand::Seed { respond_to } => {
                reply(respond_to, self.session.seed().clone());
            }
            SessionCommand::SetHandle {
                peer,
                handle,
                respond_to,
            } => {
                reply(respond_to, self.session.set_handle(peer, handle));
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn heartbeat(&mut self) {
        let Some(text) = &self.heartbeat_text else {
            return;
        };
        if !self.session.is_joined() {
            tracing::debug!("skipping heartbeat while unjoined");
            return;
        }
        let message = ChatMessage::Text(text.clone());
        self.start_publish(message, None);
    }

    fn start_publish(
        &mut self,
        message: ChatMessage,
        respond_to: Option<oneshot::Sender<RayoResult<()>>>,
    ) {
        let pending = match self.session.prepare(&message) {
            Ok(pending) => pending,
            Err(e) => {
                match respond_to {
                    Some(respond_to) => reply(respond_to, Err(e)),
                    None => tracing::warn!(error = %e, "could not publish heartbeat"),
                }
                return;
            }
        };

        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = pending.await;
            let done = PublishCompletion {
                message,
                result,
                respond_to,
            };
            if done_tx.send(done).is_err() {
                tracing::trace!("driver gone before publish completed");
            }
        });
    }

    fn finish_publish(&mut self, done: PublishCompletion) {
        let PublishCompletion {
            message,
            result,
            respond_to,
        } = done;

        self.session.complete(message, &result);
        match respond_to {
            Some(respond_to) => reply(respond_to, result),
            None => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "could not publish heartbeat");
                }
            }
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn reply<T>(respond_to: oneshot::Sender<T>, value: T) {
    if respond_to.send(value).is_err() {
        tracing::trace!("requester went away before the reply");
    }
}
