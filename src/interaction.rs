//! Persisted interactive controls.
//!
//! Buttons rendered by the presentation layer carry only a stored
//! interaction id. Resolving the id yields an [`Interaction`], which the
//! arena routes to the matching operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::{GameId, GameView};
use crate::invitation::{Invitation, InvitationId};
use crate::participant::{ChannelId, GuildId, UserId};

/// Stored interaction identifier.
pub type InteractionId = i32;

/// Action a control performs when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::AsRefStr)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Interaction {
    /// Accept a pending invitation.
    AcceptInvitation {
        /// Invitation to accept.
        invitation_id: InvitationId,
    },
    /// Decline or withdraw a pending invitation.
    DeclineInvitation {
        /// Invitation to decline.
        invitation_id: InvitationId,
    },
    /// Drop a token into a column.
    PlaceToken {
        /// Target game.
        game_id: GameId,
        /// Zero-based column.
        column: usize,
    },
    /// Forfeit the game.
    Resign {
        /// Target game.
        game_id: GameId,
    },
}

/// An interaction as registered in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInteraction {
    /// Storage id.
    pub id: InteractionId,
    /// Guild the control was posted in.
    pub guild_id: GuildId,
    /// Channel the control was posted in.
    pub channel_id: ChannelId,
    /// User the control was rendered for.
    pub user_id: UserId,
    /// Action to perform.
    pub interaction: Interaction,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// Result of dispatching an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// Invitation accepted; the game has begun.
    GameStarted(GameView),
    /// Invitation voided and stake refunded.
    InvitationDeclined(Invitation),
    /// Move applied.
    MovePlayed(GameView),
    /// The clock ran out before the move could be applied.
    ClockExpired(GameView),
    /// Game forfeited by the actor.
    Resigned(GameView),
}
