//! Reconnect watchdog.
//!
//! A dropped session must either come back within a bounded window or the
//! process is failed fast. Limping along silently disconnected is never an
//! option; a clean restart by the process manager is.
//!
//! ```text
//!  Stable ──disconnected──▶ AwaitingRecovery ──window elapsed──▶ Recovering
//!    ▲                          │                                  │  │
//!    └────────connected─────────┘                                  │  │
//!    └──────────────────────── reconnect succeeded ────────────────┘  │
//!                                       Failed ◀── timed out / fault ─┘
//! ```
//!
//! Signals from the adapter and the supervisor's own timers are funnelled
//! through one queue and applied by a single task, so checking the
//! connection state after a window elapses can never interleave with a
//! generation change.

use crate::generation::RecoveryGeneration;
use crate::{ConnectionState, DisconnectCause, FailFast, ReconnectOutcome, Terminator, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long a disconnect may last before a reset is attempted, and how long
    /// that reset may take.
    pub recovery_timeout: Duration,
    /// When false, an elapsed window fails fast without attempting a reset.
    pub attempt_reset: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            recovery_timeout: Duration::from_secs(15),
            attempt_reset: true,
        }
    }
}

/// Supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No recovery pending.
    Stable,
    /// Disconnected; the timeout window is armed.
    AwaitingRecovery,
    /// The window elapsed; a reconnect attempt is in flight.
    Recovering,
    /// Terminal. The process is being failed.
    Failed,
}

enum Command {
    Connected,
    Disconnected(DisconnectCause),
    WindowElapsed { epoch: u64 },
    ReconnectFinished(ReconnectOutcome),
}

/// The adapter's view of the supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<Command>,
    phase: watch::Receiver<Phase>,
}

impl SupervisorHandle {
    /// The session (re)connected.
    pub fn on_connected(&self) {
        self.send(Command::Connected);
    }

    /// The session dropped.
    pub fn on_disconnected(&self, cause: DisconnectCause) {
        self.send(Command::Disconnected(cause));
    }

    /// The phase as of the last applied command.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Supervisor has stopped, dropping signal");
        }
    }
}

/// Owns the connection state and the live recovery generation.
pub struct Supervisor {
    config: SupervisorConfig,
    transport: Arc<dyn Transport>,
    terminator: Arc<dyn Terminator>,
    commands: mpsc::UnboundedReceiver<Command>,
    timers: mpsc::WeakUnboundedSender<Command>,
    phase: watch::Sender<Phase>,
    connection: ConnectionState,
    generation: RecoveryGeneration,
    /// Last adapter signal seen while a reconnect attempt was in flight.
    signalled_while_recovering: Option<ConnectionState>,
}

impl Supervisor {
    /// Build a supervisor without starting it. Commands queue on the handle
    /// until [`run`](Self::run) is polled.
    pub fn new(
        transport: Arc<dyn Transport>,
        terminator: Arc<dyn Terminator>,
        config: SupervisorConfig,
    ) -> (Self, SupervisorHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(Phase::Stable);

        let supervisor = Self {
            config,
            transport,
            terminator,
            commands: commands_rx,
            timers: commands_tx.downgrade(),
            phase: phase_tx,
            connection: ConnectionState::Disconnected,
            generation: RecoveryGeneration::new(),
            signalled_while_recovering: None,
        };
        let handle = SupervisorHandle {
            commands: commands_tx,
            phase: phase_rx,
        };
        (supervisor, handle)
    }

    /// Start supervising on the current runtime.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        terminator: Arc<dyn Terminator>,
        config: SupervisorConfig,
    ) -> SupervisorHandle {
        let (supervisor, handle) = Self::new(transport, terminator, config);
        tokio::spawn(supervisor.run());
        handle
    }

    /// Apply commands until the process is failed or every handle is gone.
    ///
    /// On a fail-fast transition the phase becomes [`Phase::Failed`] before the
    /// terminator is invoked.
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            if let Err(reason) = self.apply(command) {
                self.set_phase(Phase::Failed);
                self.terminator.terminate(reason);
                return;
            }
        }
        tracing::debug!("All supervisor handles dropped, stopping");
    }

    fn apply(&mut self, command: Command) -> Result<(), FailFast> {
        match command {
            Command::Connected => {
                self.on_connected();
                Ok(())
            }
            Command::Disconnected(cause) => {
                self.on_disconnected(cause);
                Ok(())
            }
            Command::WindowElapsed { epoch } => self.on_window_elapsed(epoch),
            Command::ReconnectFinished(outcome) => self.on_reconnect_finished(outcome),
        }
    }

    fn on_connected(&mut self) {
        self.connection = ConnectionState::Connected;
        let epoch = self.generation.advance();
        tracing::debug!(epoch, "Client connected, recovery generation reset");

        match self.phase() {
            Phase::AwaitingRecovery => self.set_phase(Phase::Stable),
            Phase::Recovering => {
                self.signalled_while_recovering = Some(ConnectionState::Connected);
            }
            Phase::Stable | Phase::Failed => {}
        }
    }

    fn on_disconnected(&mut self, cause: DisconnectCause) {
        self.connection = ConnectionState::Disconnected;

        match self.phase() {
            Phase::Stable => {
                tracing::info!(%cause, "Client disconnected, starting timeout window");
                self.arm_window();
            }
            Phase::AwaitingRecovery => {
                tracing::debug!(%cause, "Client disconnected again, keeping the armed window");
            }
            Phase::Recovering => {
                tracing::debug!(%cause, "Client disconnected while a reset is in flight");
                self.signalled_while_recovering = Some(ConnectionState::Disconnected);
            }
            Phase::Failed => {}
        }
    }

    fn on_window_elapsed(&mut self, epoch: u64) -> Result<(), FailFast> {
        if !self.generation.is_current(epoch) || self.phase() != Phase::AwaitingRecovery {
            tracing::debug!(epoch, "Stale timeout window, ignoring");
            return Ok(());
        }

        // Any connect since the window was armed retired its epoch above.
        debug_assert_eq!(self.connection, ConnectionState::Disconnected);
        tracing::debug!(epoch, "Timeout expired with the client still disconnected");

        if !self.config.attempt_reset {
            return Err(FailFast::NotReconnected);
        }

        tracing::info!("Attempting to reset the client");
        self.set_phase(Phase::Recovering);
        self.signalled_while_recovering = None;

        let transport = Arc::clone(&self.transport);
        let timers = self.timers.clone();
        let timeout = self.config.recovery_timeout;
        tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, transport.reconnect())
                .await
                .unwrap_or(ReconnectOutcome::TimedOut);
            if let Some(commands) = timers.upgrade() {
                let _ = commands.send(Command::ReconnectFinished(outcome));
            }
        });
        Ok(())
    }

    fn on_reconnect_finished(&mut self, outcome: ReconnectOutcome) -> Result<(), FailFast> {
        if self.phase() != Phase::Recovering {
            tracing::warn!(?outcome, "Reconnect finished outside of recovery, ignoring");
            return Ok(());
        }

        match outcome {
            ReconnectOutcome::Success => {
                tracing::info!("Client reset successfully");
                if self.signalled_while_recovering.take() == Some(ConnectionState::Disconnected) {
                    // Dropped again after the reset went through.
                    self.arm_window();
                } else {
                    self.connection = ConnectionState::Connected;
                    self.set_phase(Phase::Stable);
                }
                Ok(())
            }
            ReconnectOutcome::TimedOut => Err(FailFast::ReconnectTimedOut),
            ReconnectOutcome::Fault(reason) => Err(FailFast::ReconnectFaulted(reason)),
        }
    }

    fn arm_window(&mut self) {
        let epoch = self.generation.advance();
        tracing::debug!(epoch, timeout = ?self.config.recovery_timeout, "Timeout window armed");
        let window = self.generation.window(self.config.recovery_timeout);
        let timers = self.timers.clone();
        tokio::spawn(async move {
            let Some(epoch) = window.await else {
                return;
            };
            if let Some(commands) = timers.upgrade() {
                let _ = commands.send(Command::WindowElapsed { epoch });
            }
        });
        self.set_phase(Phase::AwaitingRecovery);
    }

    fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            tracing::debug!(from = ?previous, to = ?phase, "Supervisor phase changed");
        }
    }
}
