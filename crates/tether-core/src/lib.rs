//! Core types for Tether.
//!
//! This crate keeps a gateway session honest and fans its events out:
//! - [`Supervisor`] watches connect/disconnect signals and either sees the
//!   session recover within a bounded window or fails the process fast.
//! - [`Dispatcher`] delivers each [`Notification`] to every handler registered
//!   for it, without waiting on them and without letting one failure reach
//!   another.
//!
//! Gateway adapters live in connector crates; this crate only defines the
//! seams they plug into ([`Transport`], [`SupervisorHandle`], [`Dispatcher`]).

mod dispatch;
mod generation;
mod handler;
mod notification;
mod registry;
mod supervisor;
mod terminate;
mod transport;

pub use dispatch::Dispatcher;
pub use handler::{Handler, HandlerError, handler_fn};
pub use notification::{
    Author, DisconnectCause, Message, MessageSource, Notification, NotificationKind,
    Reaction, Role, VoiceState,
};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use supervisor::{Phase, Supervisor, SupervisorConfig, SupervisorHandle};
pub use terminate::{FailFast, ProcessExit, Terminator};
pub use transport::{ReconnectOutcome, Transport};

/// Connection lifecycle state, as last reported by the transport adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Session established.
    Connected,
    /// Session dropped (or never established).
    Disconnected,
}
