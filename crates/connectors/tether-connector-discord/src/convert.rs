//! Gateway payloads to notifications.

use std::collections::HashMap;
use tether_core::{Author, DisconnectCause, Message, MessageSource, Reaction, Role, VoiceState};
use twilight_gateway::CloseFrame;
use twilight_model::channel::message::{EmojiReactionType, MessageType};
use twilight_model::gateway::GatewayReaction;

pub(crate) fn close_cause(frame: Option<&CloseFrame<'_>>) -> DisconnectCause {
    match frame {
        Some(frame) => DisconnectCause::new(Some(frame.code), frame.reason.to_string()),
        None => DisconnectCause::new(None, "connection closed without a close frame"),
    }
}

pub(crate) fn message_source(kind: MessageType, webhook: bool, bot: bool) -> MessageSource {
    if !matches!(kind, MessageType::Regular | MessageType::Reply) {
        MessageSource::System
    } else if webhook {
        MessageSource::Webhook
    } else if bot {
        MessageSource::Bot
    } else {
        MessageSource::User
    }
}

pub(crate) fn message(msg: &twilight_model::channel::Message) -> Message {
    Message {
        id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|id| id.get()),
        author: Author {
            id: msg.author.id.get(),
            name: msg.author.name.clone(),
        },
        content: msg.content.clone(),
        source: message_source(msg.kind, msg.webhook_id.is_some(), msg.author.bot),
    }
}

pub(crate) fn emoji_name(emoji: &EmojiReactionType) -> String {
    match emoji {
        EmojiReactionType::Unicode { name } => name.clone(),
        EmojiReactionType::Custom { id, name, .. } => {
            name.clone().unwrap_or_else(|| id.get().to_string())
        }
    }
}

pub(crate) fn reaction(reaction: &GatewayReaction) -> Reaction {
    Reaction {
        user_id: reaction.user_id.get(),
        emoji: emoji_name(&reaction.emoji),
        guild_id: reaction.guild_id.map(|id| id.get()),
    }
}

pub(crate) fn role(role: &twilight_model::guild::Role) -> Role {
    Role {
        id: role.id.get(),
        name: role.name.clone(),
        position: role.position,
        color: role.color,
    }
}

pub(crate) fn voice_state(state: &twilight_model::voice::VoiceState) -> VoiceState {
    VoiceState {
        guild_id: state.guild_id.map(|id| id.get()),
        channel_id: state.channel_id.map(|id| id.get()),
        self_mute: state.self_mute,
        self_deaf: state.self_deaf,
    }
}

/// Last known voice state per (guild, user), so updates can carry the
/// previous state. The gateway only ever sends the new one.
#[derive(Debug, Default)]
pub(crate) struct VoiceStates {
    states: HashMap<(Option<u64>, u64), VoiceState>,
}

impl VoiceStates {
    /// Record `new` for `user_id` and return what it replaced.
    pub(crate) fn remember(&mut self, user_id: u64, new: &VoiceState) -> Option<VoiceState> {
        let key = (new.guild_id, user_id);
        if new.channel_id.is_some() {
            self.states.insert(key, new.clone())
        } else {
            self.states.remove(&key)
        }
    }
}
