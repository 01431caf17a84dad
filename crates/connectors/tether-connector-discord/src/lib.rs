//! Discord gateway adapter.
//!
//! Runs a single gateway shard, reports session changes to the supervisor,
//! and publishes every event Tether cares about to the dispatcher. Resetting
//! the session means throwing the shard away and identifying from scratch.

mod convert;

use async_trait::async_trait;
use convert::VoiceStates;
use tether_core::{Dispatcher, Notification, ReconnectOutcome, SupervisorHandle, Transport};
use tokio::sync::{mpsc, oneshot};
use twilight_gateway::{Event, EventTypeFlags, Intents, Shard, ShardId, StreamExt as _};

/// Gateway intents needed for every notification kind.
pub const INTENTS: Intents = Intents::GUILDS
    .union(Intents::GUILD_MESSAGES)
    .union(Intents::GUILD_MESSAGE_REACTIONS)
    .union(Intents::GUILD_VOICE_STATES)
    .union(Intents::DIRECT_MESSAGES)
    .union(Intents::MESSAGE_CONTENT);

/// Error running the gateway connector.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("bot token is empty")]
    EmptyToken,
    #[error("gateway closed fatally (invalid token or intents?)")]
    FatallyClosed,
}

type Restart = oneshot::Sender<ReconnectOutcome>;

/// The supervisor's handle on the shard: asks the event loop for a fresh one.
#[derive(Debug, Clone)]
pub struct DiscordTransport {
    restarts: mpsc::Sender<Restart>,
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn reconnect(&self) -> ReconnectOutcome {
        let (tx, rx) = oneshot::channel();
        if self.restarts.send(tx).await.is_err() {
            return ReconnectOutcome::Fault("gateway event loop has stopped".into());
        }
        rx.await.unwrap_or_else(|_| {
            ReconnectOutcome::Fault("gateway event loop dropped the reset".into())
        })
    }
}

/// Owns the shard and its event loop.
pub struct DiscordConnector {
    token: String,
    intents: Intents,
    restarts: mpsc::Receiver<Restart>,
}

impl DiscordConnector {
    /// Create a connector and the transport the supervisor will drive it with.
    pub fn new(token: String) -> Result<(Self, DiscordTransport), ConnectorError> {
        if token.trim().is_empty() {
            return Err(ConnectorError::EmptyToken);
        }
        let (tx, rx) = mpsc::channel(1);
        let connector = Self {
            token,
            intents: INTENTS,
            restarts: rx,
        };
        Ok((connector, DiscordTransport { restarts: tx }))
    }

    fn shard(&self) -> Shard {
        Shard::new(ShardId::ONE, self.token.clone(), self.intents)
    }

    /// Run the event loop until the gateway closes for good.
    pub async fn run(
        mut self,
        supervisor: SupervisorHandle,
        dispatcher: Dispatcher,
    ) -> Result<(), ConnectorError> {
        let mut shard = self.shard();
        let mut session = Session::new(supervisor, dispatcher);

        tracing::info!(shard = %shard.id(), "Starting gateway shard");

        loop {
            let step = tokio::select! {
                item = shard.next_event(EventTypeFlags::all()) => Step::Gateway(item),
                Some(restart) = self.restarts.recv() => Step::Restart(restart),
            };

            match step {
                Step::Restart(responder) => {
                    tracing::info!("Replacing gateway shard");
                    shard = self.shard();
                    session.restart_requested(responder);
                }
                Step::Gateway(None) => {
                    session.closed_fatally();
                    return Err(ConnectorError::FatallyClosed);
                }
                Step::Gateway(Some(Err(source))) => {
                    tracing::warn!(?source, "Error receiving gateway event");
                }
                Step::Gateway(Some(Ok(event))) => session.on_event(event),
            }
        }
    }
}

/// Everything the event loop tracks besides the shard itself.
struct Session {
    supervisor: SupervisorHandle,
    dispatcher: Dispatcher,
    /// Reset waiting for the replacement shard to come up.
    pending: Option<Restart>,
    voice: VoiceStates,
}

impl Session {
    fn new(supervisor: SupervisorHandle, dispatcher: Dispatcher) -> Self {
        Self {
            supervisor,
            dispatcher,
            pending: None,
            voice: VoiceStates::default(),
        }
    }

    fn restart_requested(&mut self, responder: Restart) {
        if let Some(superseded) = self.pending.replace(responder) {
            let _ = superseded.send(ReconnectOutcome::Fault("superseded".into()));
        }
    }

    fn closed_fatally(&mut self) {
        if let Some(responder) = self.pending.take() {
            let _ = responder.send(ReconnectOutcome::Fault("gateway closed fatally".into()));
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Ready(_) => self.ready(),
            Event::Resumed => self.session_up(),
            Event::GatewayClose(frame) => {
                let cause = convert::close_cause(frame.as_ref());
                self.supervisor.on_disconnected(cause.clone());
                self.dispatcher.publish(Notification::Disconnected { cause });
            }
            Event::MessageCreate(create) => {
                self.dispatcher.publish(Notification::MessageReceived {
                    message: convert::message(&create.0),
                });
            }
            Event::ReactionRemove(remove) => {
                self.dispatcher.publish(Notification::ReactionRemoved {
                    message_id: remove.0.message_id.get(),
                    channel_id: remove.0.channel_id.get(),
                    reaction: convert::reaction(&remove.0),
                });
            }
            Event::RoleCreate(create) => {
                self.dispatcher.publish(Notification::RoleCreated {
                    guild_id: create.guild_id.get(),
                    role: convert::role(&create.role),
                });
            }
            Event::VoiceStateUpdate(update) => {
                let user_id = update.0.user_id.get();
                let new = convert::voice_state(&update.0);
                let old = self.voice.remember(user_id, &new);
                self.dispatcher
                    .publish(Notification::VoiceStateChanged { user_id, old, new });
            }
            _ => {}
        }
    }

    /// A fresh session finished identifying.
    fn ready(&mut self) {
        self.session_up();
        self.dispatcher.publish(Notification::Ready);
    }

    fn session_up(&mut self) {
        if let Some(responder) = self.pending.take() {
            let _ = responder.send(ReconnectOutcome::Success);
        }
        self.supervisor.on_connected();
        self.dispatcher.publish(Notification::Connected);
    }
}

enum Step {
    Gateway(Option<Result<Event, twilight_gateway::error::ReceiveMessageError>>),
    Restart(Restart),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tether_core::{
        FailFast, HandlerRegistry, NotificationKind, Phase, Supervisor, SupervisorConfig,
        Terminator, handler_fn,
    };
    use twilight_gateway::CloseFrame;

    struct IdleTransport;

    #[async_trait]
    impl Transport for IdleTransport {
        async fn reconnect(&self) -> ReconnectOutcome {
            std::future::pending().await
        }
    }

    struct KeepRunning;

    impl Terminator for KeepRunning {
        fn terminate(&self, _reason: FailFast) {}
    }

    /// A session whose dispatcher reports every published kind.
    fn session() -> (Session, mpsc::UnboundedReceiver<NotificationKind>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = HandlerRegistry::builder();
        for kind in NotificationKind::ALL {
            let tx = tx.clone();
            registry = registry.register(
                kind,
                handler_fn("record", move |notification| {
                    let _ = tx.send(notification.kind());
                    async { Ok(()) }
                }),
            );
        }
        let terminator: Arc<dyn Terminator> = Arc::new(KeepRunning);
        let dispatcher = Dispatcher::new(Arc::new(registry.build()), terminator.clone());
        let supervisor = Supervisor::spawn(
            Arc::new(IdleTransport),
            terminator,
            SupervisorConfig::default(),
        );
        (Session::new(supervisor, dispatcher), rx)
    }

    async fn published(
        rx: &mut mpsc::UnboundedReceiver<NotificationKind>,
        n: usize,
    ) -> Vec<&'static str> {
        let mut seen = Vec::with_capacity(n);
        for _ in 0..n {
            seen.push(rx.recv().await.unwrap().as_str());
        }
        seen.sort_unstable();
        seen
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[test]
    fn empty_token_rejected() {
        assert!(matches!(
            DiscordConnector::new("  ".into()),
            Err(ConnectorError::EmptyToken)
        ));
    }

    #[tokio::test]
    async fn reset_faults_once_event_loop_is_gone() {
        let (connector, transport) = DiscordConnector::new("token".into()).unwrap();
        drop(connector);

        assert!(matches!(
            transport.reconnect().await,
            ReconnectOutcome::Fault(_)
        ));
    }

    #[tokio::test]
    async fn reset_faults_if_request_is_dropped() {
        let (mut connector, transport) = DiscordConnector::new("token".into()).unwrap();
        let pending = tokio::spawn(async move { transport.reconnect().await });

        let responder = connector.restarts.recv().await.unwrap();
        drop(responder);

        assert!(matches!(pending.await.unwrap(), ReconnectOutcome::Fault(_)));
    }

    #[tokio::test]
    async fn reset_reports_event_loop_outcome() {
        let (mut connector, transport) = DiscordConnector::new("token".into()).unwrap();
        let pending = tokio::spawn(async move { transport.reconnect().await });

        let responder = connector.restarts.recv().await.unwrap();
        responder.send(ReconnectOutcome::Success).unwrap();

        assert_eq!(pending.await.unwrap(), ReconnectOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_close_starts_recovery() {
        let (mut session, mut rx) = session();

        session.on_event(Event::GatewayClose(Some(CloseFrame::new(4000, "unknown error"))));
        settle().await;

        assert_eq!(session.supervisor.phase(), Phase::AwaitingRecovery);
        assert_eq!(published(&mut rx, 1).await, ["disconnected"]);
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_completes_pending_reset() {
        let (mut session, mut rx) = session();
        session.on_event(Event::GatewayClose(None));
        let (responder, reset) = oneshot::channel();
        session.restart_requested(responder);

        session.on_event(Event::Resumed);

        assert_eq!(reset.await.unwrap(), ReconnectOutcome::Success);
        settle().await;
        assert_eq!(session.supervisor.phase(), Phase::Stable);
        assert_eq!(published(&mut rx, 2).await, ["connected", "disconnected"]);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_publishes_ready_and_connected() {
        let (mut session, mut rx) = session();
        let (responder, reset) = oneshot::channel();
        session.restart_requested(responder);

        session.ready();

        assert_eq!(reset.await.unwrap(), ReconnectOutcome::Success);
        assert_eq!(published(&mut rx, 2).await, ["connected", "ready"]);
        assert!(session.pending.is_none());
    }

    #[tokio::test]
    async fn second_reset_supersedes_first() {
        let (mut session, _rx) = session();
        let (first, mut first_reset) = oneshot::channel();
        let (second, mut second_reset) = oneshot::channel();

        session.restart_requested(first);
        session.restart_requested(second);

        assert_eq!(
            first_reset.try_recv().unwrap(),
            ReconnectOutcome::Fault("superseded".into())
        );
        assert!(second_reset.try_recv().is_err());

        session.closed_fatally();
        assert_eq!(
            second_reset.try_recv().unwrap(),
            ReconnectOutcome::Fault("gateway closed fatally".into())
        );
    }
}
