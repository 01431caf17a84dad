//! The seam between the supervisor and whatever owns the session.

use async_trait::async_trait;

/// Result of asking the transport to re-establish its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Success,
    Fault(String),
    TimedOut,
}

/// Owns the actual socket/session.
///
/// The adapter reports session changes through a
/// [`SupervisorHandle`](crate::SupervisorHandle); the supervisor calls back only
/// through [`reconnect`](Transport::reconnect), and only while recovering.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Re-establish the session. May never resolve; the supervisor races it
    /// against its own timeout.
    async fn reconnect(&self) -> ReconnectOutcome;
}
