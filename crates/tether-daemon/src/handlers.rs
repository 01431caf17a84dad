//! The daemon's subscribers and the registry they are composed into.

use async_trait::async_trait;
use std::sync::Arc;
use tether_core::{
    Handler, HandlerError, HandlerRegistry, MessageSource, Notification, NotificationKind,
    VoiceState,
};

/// Every handler name the daemon knows, for `handlers.disabled`.
pub const NAMES: [&str; 5] = [
    LifecycleLog::NAME,
    MessageTrace::NAME,
    ReactionAudit::NAME,
    RoleAudit::NAME,
    VoiceActivity::NAME,
];

/// Build the registry, leaving out anything named in `disabled`.
pub fn compose(disabled: &[String]) -> HandlerRegistry {
    let enabled = |name: &str| !disabled.iter().any(|d| d == name);
    let mut builder = HandlerRegistry::builder();

    if enabled(LifecycleLog::NAME) {
        let lifecycle: Arc<dyn Handler> = Arc::new(LifecycleLog);
        builder = builder
            .register(NotificationKind::Ready, lifecycle.clone())
            .register(NotificationKind::Connected, lifecycle.clone())
            .register(NotificationKind::Disconnected, lifecycle);
    }
    if enabled(MessageTrace::NAME) {
        builder = builder.register(NotificationKind::MessageReceived, Arc::new(MessageTrace));
    }
    if enabled(ReactionAudit::NAME) {
        builder = builder.register(NotificationKind::ReactionRemoved, Arc::new(ReactionAudit));
    }
    if enabled(RoleAudit::NAME) {
        builder = builder.register(NotificationKind::RoleCreated, Arc::new(RoleAudit));
    }
    if enabled(VoiceActivity::NAME) {
        builder = builder.register(NotificationKind::VoiceStateChanged, Arc::new(VoiceActivity));
    }

    builder.build()
}

fn unexpected(handler: &str, notification: &Notification) -> HandlerError {
    HandlerError::failed(format!(
        "{handler} received an unexpected {} notification",
        notification.kind()
    ))
}

/// Session lifecycle at info level.
struct LifecycleLog;

impl LifecycleLog {
    const NAME: &'static str = "lifecycle_log";
}

#[async_trait]
impl Handler for LifecycleLog {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, notification: Arc<Notification>) -> Result<(), HandlerError> {
        match &*notification {
            Notification::Ready => tracing::info!("Gateway session ready"),
            Notification::Connected => tracing::info!("Gateway connected"),
            Notification::Disconnected { cause } => {
                tracing::info!(%cause, "Gateway disconnected")
            }
            other => return Err(unexpected(Self::NAME, other)),
        }
        Ok(())
    }
}

/// Traces messages written by people. Bots, webhooks and system messages are
/// skipped.
struct MessageTrace;

impl MessageTrace {
    const NAME: &'static str = "message_trace";
}

#[async_trait]
impl Handler for MessageTrace {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, notification: Arc<Notification>) -> Result<(), HandlerError> {
        let Notification::MessageReceived { message } = &*notification else {
            return Err(unexpected(Self::NAME, &notification));
        };
        if message.source != MessageSource::User {
            return Ok(());
        }
        tracing::trace!(
            "[{}] {}: {}",
            message.channel_id,
            message.author.name,
            message.content
        );
        Ok(())
    }
}

struct ReactionAudit;

impl ReactionAudit {
    const NAME: &'static str = "reaction_audit";
}

#[async_trait]
impl Handler for ReactionAudit {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, notification: Arc<Notification>) -> Result<(), HandlerError> {
        let Notification::ReactionRemoved {
            message_id,
            channel_id,
            reaction,
        } = &*notification
        else {
            return Err(unexpected(Self::NAME, &notification));
        };
        tracing::debug!(
            message_id,
            channel_id,
            user_id = reaction.user_id,
            emoji = %reaction.emoji,
            "Reaction removed"
        );
        Ok(())
    }
}

struct RoleAudit;

impl RoleAudit {
    const NAME: &'static str = "role_audit";
}

#[async_trait]
impl Handler for RoleAudit {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, notification: Arc<Notification>) -> Result<(), HandlerError> {
        let Notification::RoleCreated { guild_id, role } = &*notification else {
            return Err(unexpected(Self::NAME, &notification));
        };
        tracing::info!(
            guild_id,
            role_id = role.id,
            position = role.position,
            "Role {} created",
            role.name
        );
        Ok(())
    }
}

/// What a voice state update amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceTransition {
    Joined { channel_id: u64 },
    Left { channel_id: u64 },
    Moved { from: u64, to: u64 },
    /// Same channel (or none); mute/deafen and the like.
    Updated,
}

pub fn classify(old: Option<&VoiceState>, new: &VoiceState) -> VoiceTransition {
    match (old.and_then(|s| s.channel_id), new.channel_id) {
        (None, Some(channel_id)) => VoiceTransition::Joined { channel_id },
        (Some(channel_id), None) => VoiceTransition::Left { channel_id },
        (Some(from), Some(to)) if from != to => VoiceTransition::Moved { from, to },
        _ => VoiceTransition::Updated,
    }
}

struct VoiceActivity;

impl VoiceActivity {
    const NAME: &'static str = "voice_activity";
}

#[async_trait]
impl Handler for VoiceActivity {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, notification: Arc<Notification>) -> Result<(), HandlerError> {
        let Notification::VoiceStateChanged { user_id, old, new } = &*notification else {
            return Err(unexpected(Self::NAME, &notification));
        };
        match classify(old.as_ref(), new) {
            VoiceTransition::Joined { channel_id } => {
                tracing::debug!(user_id, channel_id, "User joined voice")
            }
            VoiceTransition::Left { channel_id } => {
                tracing::debug!(user_id, channel_id, "User left voice")
            }
            VoiceTransition::Moved { from, to } => {
                tracing::debug!(user_id, from, to, "User moved voice channels")
            }
            VoiceTransition::Updated => tracing::trace!(
                user_id,
                self_mute = new.self_mute,
                self_deaf = new.self_deaf,
                "Voice state updated"
            ),
        }
        Ok(())
    }
}
