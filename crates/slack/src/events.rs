use serde::{Deserialize, Serialize};

/// How an inbound message relates to the bot. Each event carries exactly
/// one scope; dispatch rules list the scopes they accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    /// Message sent in a direct message channel with the bot.
    DirectMessage,
    /// Channel message that starts with a mention of the bot.
    DirectMention,
    /// Channel message that mentions the bot somewhere after the start.
    Mention,
    /// Channel message that does not mention the bot at all.
    Ambient,
}

/// Message subtypes the bot cares about. Anything else arrives as
/// `Other` so handlers can still predicate on the raw value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSubtype {
    ChannelJoin,
    Other(String),
}

/// One inbound message notification, validated at the boundary.
/// Immutable once constructed; one instance per delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    /// Absent when the user action carried no text (joins, file posts).
    pub text: Option<String>,
    pub subtype: Option<EventSubtype>,
    pub scope: EventScope,
    /// Credential scoped to this delivery, forwarded to outbound calls.
    pub bot_token: String,
}

impl MessageEvent {
    /// Message text with "no usable text" collapsed to `""`. The router
    /// flows treat absent and empty text identically.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn has_text(&self) -> bool {
        !self.text_or_empty().is_empty()
    }

    pub fn is_channel_join(&self) -> bool {
        matches!(self.subtype, Some(EventSubtype::ChannelJoin))
    }

    pub fn origin(&self) -> MessageOrigin {
        MessageOrigin { channel_id: self.channel_id.clone(), bot_token: self.bot_token.clone() }
    }

    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey {
            team_id: self.team_id.clone(),
            channel_id: self.channel_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// Where a reply goes: the originating channel plus the credential the
/// delivery arrived with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageOrigin {
    pub channel_id: String,
    pub bot_token: String,
}

/// Scopes a pending conversation route to one user in one channel of one
/// workspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
}
