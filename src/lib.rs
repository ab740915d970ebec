//! Strictly Arena - wagered Connect Four for chat guilds
//!
//! Players challenge each other, optionally staking currency that is held in
//! escrow until the game ends. Every move is checked against a per-move
//! clock, and every state change commits atomically with its wallet effects.
//!
//! # Architecture
//!
//! - **Board**: pure rules in the `strictly_connect4` crate
//! - **Invitation / Game**: pure state machines returning the next value
//! - **Escrow**: ledger entries for each transition
//! - **Repository**: SQLite persistence with conditional, transactional commits
//! - **Service**: [`ArenaService`] ties validation, transitions, and storage together
//! - **Sweeper**: background task forfeiting games whose clock ran out
//!
//! # Example
//!
//! ```no_run
//! use strictly_arena::{ArenaConfig, ArenaService, ChallengeRequest, Participant};
//! use strictly_connect4::Color;
//!
//! # fn example() -> anyhow::Result<()> {
//! let service = ArenaService::open(ArenaConfig::with_database("arena.db"))?;
//! service.deposit("alice", "guild", 10_000)?;
//! let request = ChallengeRequest::new(
//!     "guild".into(),
//!     "channel".into(),
//!     "alice".into(),
//!     Participant::human("bob"),
//!     Color::Red,
//!     Some(1_000),
//!     60,
//! );
//! let issued = service.challenge(&request)?;
//! println!("invitation {}", issued.invitation.id);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod arena;
mod clock;
mod config;
mod db;
mod error;
mod escrow;
mod game;
mod interaction;
mod invitation;
mod participant;
mod sweeper;

pub use arena::{ArenaService, SubmitOutcome, SweepReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ArenaConfig, ConfigError, MoveTimeOption};
pub use db::{ArenaRepository, DbError, IssuedInvitation, MIGRATIONS};
pub use error::{ArenaError, ErrorKind, WagerProblem};
pub use escrow::{LedgerEntry, LedgerKind, hold, net, opponent_hold, refund, settle};
pub use game::{Game, GameId, GameState, GameView};
pub use interaction::{Interaction, InteractionId, InteractionOutcome, StoredInteraction};
pub use invitation::{ChallengeRequest, Invitation, InvitationId, InvitationStatus};
pub use participant::{ChannelId, GuildId, Participant, ParticipantKind, UserId};
pub use sweeper::{spawn_sweeper, sweep_once};
