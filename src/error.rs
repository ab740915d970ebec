//! Arena error types.
//!
//! Every domain rule has a named variant. The [`std::fmt::Display`] text of
//! each variant is the message shown to the acting user.

use strictly_connect4::{BoardError, Color};
use tracing::instrument;

use crate::db::DbError;
use crate::invitation::InvitationStatus;

/// Broad category of an [`ArenaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input from the acting user. No state changed.
    Validation,
    /// The actor may not perform this operation. No state changed.
    Authorization,
    /// The referenced invitation, game, or interaction does not exist.
    NotFound,
    /// The entity is not in a state that allows the operation, possibly
    /// because a concurrent actor got there first.
    Conflict,
    /// Not enough funds. Nothing was debited.
    Resource,
    /// Escrow or transition atomicity was violated. Nothing was committed.
    Integrity,
    /// Unexpected storage failure.
    Storage,
}

/// Why a wager was rejected.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum WagerProblem {
    /// Zero or negative.
    #[display("Wager must be a positive amount.")]
    NotPositive,
    /// Smaller than the configured minimum.
    #[display("Minimum wager is {}.", minimum)]
    BelowMinimum {
        /// Configured minimum.
        minimum: i64,
    },
    /// More than the challenger holds.
    #[display("You don't have enough money in your wallet. Your balance is {}.", balance)]
    ExceedsBalance {
        /// Current wallet balance.
        balance: i64,
    },
}

/// Error returned by arena operations.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ArenaError {
    /// Challenger and opponent are the same user.
    #[display("You can't challenge yourself.")]
    SelfChallenge,

    /// Opponent is not a human participant.
    #[display("You can't challenge bots.")]
    BotChallenge,

    /// One of the players already has an active game in this guild.
    #[display("{} is already in a game in channel {}. A game can be forfeited with `end`.", user_id, channel_id)]
    AlreadyInGame {
        /// Player with the active game.
        user_id: String,
        /// Channel hosting that game.
        channel_id: String,
    },

    /// Wager failed validation.
    #[display("{}", _0)]
    InvalidWager(WagerProblem),

    /// Requested move time is not one of the configured options.
    #[display("Invalid clock time: {} seconds is not an available move time.", _0)]
    InvalidClock(i64),

    /// Actor is neither challenger nor opponent of the invitation.
    #[display("This invitation isn't yours.")]
    NotYourInvitation,

    /// Challenger tried to accept their own invitation.
    #[display("You can't accept your own invitation. If you want to remove it, decline it instead.")]
    SelfAccept,

    /// Invitation was already voided or consumed.
    #[display("This invitation has already been {}.", _0)]
    InvitationAlreadyResolved(InvitationStatus),

    /// Invitation is older than the configured lifetime.
    #[display("This invitation has expired.")]
    InvitationExpired,

    /// Actor is not one of the two players.
    #[display("You're not playing in this game.")]
    NotAParticipant,

    /// Actor's color is not the one to move.
    #[display("It's not your turn. Waiting for {}.", _0)]
    NotYourTurn(Color),

    /// Game already reached a terminal state.
    #[display("This game has already ended.")]
    GameAlreadyEnded,

    /// Column has no empty slot.
    #[display("That column is full.")]
    ColumnFull {
        /// Zero-based column index.
        column: usize,
    },

    /// Column does not exist.
    #[display("Column {} does not exist; pick 1 to {}.", column + 1, width)]
    ColumnOutOfRange {
        /// Zero-based column index.
        column: usize,
        /// Board width.
        width: usize,
    },

    /// Another move landed between reading and writing the game.
    #[display("The board changed before your move landed. Look again and retry.")]
    MoveConflict,

    /// Debit would take a wallet below zero.
    #[display("Insufficient funds: balance is {}, {} is required.", balance, required)]
    InsufficientFunds {
        /// Current balance.
        balance: i64,
        /// Amount requested.
        required: i64,
    },

    /// No invitation with this id in the guild.
    #[display("Invitation {} not found.", _0)]
    InvitationNotFound(i32),

    /// No game with this id in the guild.
    #[display("Game {} not found.", _0)]
    GameNotFound(i32),

    /// No stored interaction with this id.
    #[display("Interaction {} not found.", _0)]
    InteractionNotFound(i32),

    /// Stored state violates an arena invariant.
    #[display("Internal error: {}", _0)]
    Integrity(String),

    /// Unexpected storage failure.
    #[display("{}", _0)]
    Storage(DbError),
}

impl ArenaError {
    /// Creates an integrity error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn integrity(message: impl Into<String>) -> Self {
        let message = message.into();
        let loc = std::panic::Location::caller();
        tracing::error!(%message, file = loc.file(), line = loc.line(), "Integrity violation");
        Self::Integrity(message)
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SelfChallenge
            | Self::BotChallenge
            | Self::InvalidWager(_)
            | Self::InvalidClock(_)
            | Self::ColumnOutOfRange { .. } => ErrorKind::Validation,
            Self::NotYourInvitation
            | Self::SelfAccept
            | Self::NotAParticipant
            | Self::NotYourTurn(_) => ErrorKind::Authorization,
            Self::InvitationNotFound(_) | Self::GameNotFound(_) | Self::InteractionNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::AlreadyInGame { .. }
            | Self::InvitationAlreadyResolved(_)
            | Self::InvitationExpired
            | Self::GameAlreadyEnded
            | Self::ColumnFull { .. }
            | Self::MoveConflict => ErrorKind::Conflict,
            Self::InsufficientFunds { .. } => ErrorKind::Resource,
            Self::Integrity(_) => ErrorKind::Integrity,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// True for errors the acting user caused and can act on.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Integrity | ErrorKind::Storage)
    }
}

impl std::error::Error for ArenaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for ArenaError {
    fn from(err: DbError) -> Self {
        Self::Storage(err)
    }
}

impl From<diesel::result::Error> for ArenaError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        Self::Storage(DbError::from(err))
    }
}

impl From<BoardError> for ArenaError {
    #[track_caller]
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::ColumnFull { column } => Self::ColumnFull { column },
            BoardError::ColumnOutOfRange { column, width } => {
                Self::ColumnOutOfRange { column, width }
            }
            other => Self::integrity(format!("board: {}", other)),
        }
    }
}
