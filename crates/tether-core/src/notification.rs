//! Notifications published by the transport adapter.
//!
//! A notification is an immutable record of one observed gateway event. It
//! carries only data the adapter already had in hand; handlers that need more
//! must fetch it themselves.

use std::fmt;

/// One observed event, published for interested handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The gateway session finished its handshake and is ready.
    Ready,
    /// The session (re)connected.
    Connected,
    /// The session dropped.
    Disconnected { cause: DisconnectCause },
    /// A message was posted.
    MessageReceived { message: Message },
    /// A reaction was removed from a message.
    ReactionRemoved {
        /// The message the reaction was removed from.
        message_id: u64,
        /// The channel that message lives in.
        channel_id: u64,
        reaction: Reaction,
    },
    /// A role was created in a guild.
    RoleCreated { guild_id: u64, role: Role },
    /// A user's voice state changed.
    VoiceStateChanged {
        user_id: u64,
        /// Previous state, if the adapter had seen one.
        old: Option<VoiceState>,
        new: VoiceState,
    },
}

impl Notification {
    /// The variant tag, used to look up subscribers.
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Ready => NotificationKind::Ready,
            Self::Connected => NotificationKind::Connected,
            Self::Disconnected { .. } => NotificationKind::Disconnected,
            Self::MessageReceived { .. } => NotificationKind::MessageReceived,
            Self::ReactionRemoved { .. } => NotificationKind::ReactionRemoved,
            Self::RoleCreated { .. } => NotificationKind::RoleCreated,
            Self::VoiceStateChanged { .. } => NotificationKind::VoiceStateChanged,
        }
    }
}

/// Why a session dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectCause {
    /// Close code, when the remote end sent one.
    pub code: Option<u16>,
    pub reason: String,
}

impl DisconnectCause {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({})", self.reason, code),
            None => f.write_str(&self.reason),
        }
    }
}

/// Who or what produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    User,
    Bot,
    Webhook,
    System,
}

/// A posted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author: Author,
    pub content: String,
    pub source: MessageSource,
}

/// A message author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub name: String,
}

/// A reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// The user whose reaction it was.
    pub user_id: u64,
    /// Unicode emoji, or the custom emoji's name (its id if unnamed).
    pub emoji: String,
    pub guild_id: Option<u64>,
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: u64,
    pub name: String,
    pub position: i64,
    pub color: u32,
}

/// A user's voice connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceState {
    pub guild_id: Option<u64>,
    /// `None` when the user is not in a voice channel.
    pub channel_id: Option<u64>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

/// Notification variant tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Ready,
    Connected,
    Disconnected,
    MessageReceived,
    ReactionRemoved,
    RoleCreated,
    VoiceStateChanged,
}

impl NotificationKind {
    /// Every kind, in declaration order.
    pub const ALL: [NotificationKind; 7] = [
        Self::Ready,
        Self::Connected,
        Self::Disconnected,
        Self::MessageReceived,
        Self::ReactionRemoved,
        Self::RoleCreated,
        Self::VoiceStateChanged,
    ];

    /// Snake-case name, as used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::MessageReceived => "message_received",
            Self::ReactionRemoved => "reaction_removed",
            Self::RoleCreated => "role_created",
            Self::VoiceStateChanged => "voice_state_changed",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
