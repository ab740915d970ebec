//! Participant identities.

use serde::{Deserialize, Serialize};

/// Opaque chat user identifier.
pub type UserId = String;

/// Opaque guild (server) identifier.
pub type GuildId = String;

/// Opaque channel identifier.
pub type ChannelId = String;

/// Who controls a chat account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    /// A person.
    #[default]
    Human,
    /// An automated account.
    Bot,
}

/// A challenged chat user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct Participant {
    /// User id.
    pub id: UserId,
    /// Whether a person controls the account.
    pub kind: ParticipantKind,
}

impl Participant {
    /// A human participant.
    pub fn human(id: impl Into<UserId>) -> Self {
        Self::new(id.into(), ParticipantKind::Human)
    }

    /// A bot participant.
    pub fn bot(id: impl Into<UserId>) -> Self {
        Self::new(id.into(), ParticipantKind::Bot)
    }
}
