//! Invitation state machine.
//!
//! An invitation is the challenge handshake that precedes a game:
//!
//! ```text
//! Pending ──accept──▶ Consumed
//!    │
//!    └──decline / supersede / expire──▶ Voided
//! ```
//!
//! Both terminal states are inert: every further transition fails with
//! [`ArenaError::InvitationAlreadyResolved`].

use chrono::{DateTime, TimeDelta, Utc};
use strictly_connect4::Color;
use tracing::{debug, instrument, warn};

use crate::config::{ArenaConfig, MoveTimeOption};
use crate::error::{ArenaError, WagerProblem};
use crate::game::GameId;
use crate::participant::{ChannelId, GuildId, Participant, ParticipantKind, UserId};

/// Invitation identifier.
pub type InvitationId = i32;

/// Lifecycle of an invitation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum InvitationStatus {
    /// Waiting for the opponent.
    Pending,
    /// Declined, superseded, or expired. Stake refunded.
    Voided,
    /// Accepted and turned into a game.
    Consumed,
}

/// A challenge as issued by the command surface.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct ChallengeRequest {
    /// Guild the challenge is issued in.
    pub guild_id: GuildId,
    /// Channel the game will be played in.
    pub channel_id: ChannelId,
    /// User issuing the challenge.
    pub challenger: UserId,
    /// User being challenged.
    pub opponent: Participant,
    /// Challenger's token color.
    pub color: Color,
    /// Optional stake each side puts up.
    pub wager: Option<i64>,
    /// Requested seconds per move.
    pub move_time_secs: i64,
}

impl ChallengeRequest {
    /// Checks everything that does not depend on stored state.
    ///
    /// Returns the matching move time option.
    ///
    /// # Errors
    ///
    /// [`ArenaError::SelfChallenge`], [`ArenaError::BotChallenge`],
    /// [`ArenaError::InvalidWager`] (non-positive or below minimum), or
    /// [`ArenaError::InvalidClock`].
    #[instrument(skip(self, config), fields(challenger = %self.challenger, opponent = %self.opponent.id))]
    pub fn validate<'c>(&self, config: &'c ArenaConfig) -> Result<&'c MoveTimeOption, ArenaError> {
        if self.challenger == self.opponent.id {
            warn!("Self challenge rejected");
            return Err(ArenaError::SelfChallenge);
        }
        if self.opponent.kind == ParticipantKind::Bot {
            warn!("Bot challenge rejected");
            return Err(ArenaError::BotChallenge);
        }
        if let Some(wager) = self.wager {
            if wager <= 0 {
                return Err(ArenaError::InvalidWager(WagerProblem::NotPositive));
            }
            if wager < *config.min_wager() {
                return Err(ArenaError::InvalidWager(WagerProblem::BelowMinimum {
                    minimum: *config.min_wager(),
                }));
            }
        }
        config.move_time(self.move_time_secs).ok_or_else(|| {
            warn!(seconds = self.move_time_secs, "Unknown move time");
            ArenaError::InvalidClock(self.move_time_secs)
        })
    }

    /// Checks the wager against the challenger's spendable balance.
    ///
    /// # Errors
    ///
    /// Returns [`WagerProblem::ExceedsBalance`] when the wager is larger.
    #[instrument(skip(self))]
    pub fn check_balance(&self, balance: i64) -> Result<(), ArenaError> {
        match self.wager {
            Some(wager) if wager > balance => {
                debug!(wager, balance, "Wager exceeds balance");
                Err(ArenaError::InvalidWager(WagerProblem::ExceedsBalance {
                    balance,
                }))
            }
            _ => Ok(()),
        }
    }
}

/// A challenge between two users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    /// Storage id.
    pub id: InvitationId,
    /// Guild context.
    pub guild_id: GuildId,
    /// Channel the game will be played in.
    pub channel_id: ChannelId,
    /// Issuing user.
    pub challenger: UserId,
    /// Challenged user.
    pub opponent: UserId,
    /// Challenger's color; it moves first.
    pub challenger_color: Color,
    /// Stake per side.
    pub wager: Option<i64>,
    /// Time allowed per move.
    pub move_time: TimeDelta,
    /// Lifecycle state.
    pub status: InvitationStatus,
    /// Game created on acceptance.
    pub game_id: Option<GameId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the invitation left `Pending`.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Invitation {
    fn ensure_pending(&self) -> Result<(), ArenaError> {
        match self.status {
            InvitationStatus::Pending => Ok(()),
            status => {
                warn!(invitation_id = self.id, %status, "Invitation already resolved");
                Err(ArenaError::InvitationAlreadyResolved(status))
            }
        }
    }

    /// True when a pending invitation has outlived `ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.status == InvitationStatus::Pending && now - self.created_at > ttl
    }

    /// Opponent's color.
    pub fn opponent_color(&self) -> Color {
        self.challenger_color.opponent()
    }

    /// Accepts the invitation on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvitationAlreadyResolved`], [`ArenaError::SelfAccept`],
    /// [`ArenaError::NotYourInvitation`], or [`ArenaError::InvitationExpired`].
    #[instrument(skip(self, ttl), fields(invitation_id = self.id))]
    pub fn accept(
        &self,
        actor: &str,
        now: DateTime<Utc>,
        ttl: TimeDelta,
    ) -> Result<Invitation, ArenaError> {
        self.ensure_pending()?;
        if actor == self.challenger {
            return Err(ArenaError::SelfAccept);
        }
        if actor != self.opponent {
            warn!(actor, "Accept by non-opponent rejected");
            return Err(ArenaError::NotYourInvitation);
        }
        if self.is_expired(now, ttl) {
            return Err(ArenaError::InvitationExpired);
        }
        Ok(self.resolved(InvitationStatus::Consumed, now))
    }

    /// Declines (or withdraws) the invitation on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvitationAlreadyResolved`] or
    /// [`ArenaError::NotYourInvitation`].
    #[instrument(skip(self), fields(invitation_id = self.id))]
    pub fn decline(&self, actor: &str, now: DateTime<Utc>) -> Result<Invitation, ArenaError> {
        self.ensure_pending()?;
        if actor != self.challenger && actor != self.opponent {
            warn!(actor, "Decline by outsider rejected");
            return Err(ArenaError::NotYourInvitation);
        }
        Ok(self.resolved(InvitationStatus::Voided, now))
    }

    /// Voids the invitation without an actor (superseded or expired).
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvitationAlreadyResolved`].
    #[instrument(skip(self), fields(invitation_id = self.id))]
    pub fn void(&self, now: DateTime<Utc>) -> Result<Invitation, ArenaError> {
        self.ensure_pending()?;
        Ok(self.resolved(InvitationStatus::Voided, now))
    }

    fn resolved(&self, status: InvitationStatus, now: DateTime<Utc>) -> Invitation {
        Invitation {
            status,
            resolved_at: Some(now),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChallengeRequest {
        ChallengeRequest::new(
            "guild".into(),
            "channel".into(),
            "alice".into(),
            Participant::human("bob"),
            Color::Red,
            Some(5_000),
            60,
        )
    }

    fn invitation() -> Invitation {
        Invitation {
            id: 1,
            guild_id: "guild".into(),
            channel_id: "channel".into(),
            challenger: "alice".into(),
            opponent: "bob".into(),
            challenger_color: Color::Yellow,
            wager: Some(5_000),
            move_time: TimeDelta::seconds(60),
            status: InvitationStatus::Pending,
            game_id: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            resolved_at: None,
        }
    }

    fn ttl() -> TimeDelta {
        TimeDelta::minutes(15)
    }

    #[test]
    fn test_valid_request_returns_move_time() {
        let config = ArenaConfig::default();
        let option = request().validate(&config).expect("Valid request");
        assert_eq!(*option.seconds(), 60);
    }

    #[test]
    fn test_self_challenge_rejected() {
        let mut req = request();
        req.opponent = Participant::human("alice");
        assert_eq!(
            req.validate(&ArenaConfig::default()),
            Err(ArenaError::SelfChallenge)
        );
    }

    #[test]
    fn test_bot_challenge_rejected() {
        let mut req = request();
        req.opponent = Participant::bot("robot");
        assert_eq!(
            req.validate(&ArenaConfig::default()),
            Err(ArenaError::BotChallenge)
        );
    }

    #[test]
    fn test_wager_rules() {
        let config = ArenaConfig::default();
        let mut req = request();
        req.wager = Some(0);
        assert_eq!(
            req.validate(&config),
            Err(ArenaError::InvalidWager(WagerProblem::NotPositive))
        );
        req.wager = Some(999);
        assert_eq!(
            req.validate(&config),
            Err(ArenaError::InvalidWager(WagerProblem::BelowMinimum {
                minimum: 1_000
            }))
        );
        req.wager = None;
        assert!(req.validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_clock_rejected() {
        let mut req = request();
        req.move_time_secs = 45;
        assert_eq!(
            req.validate(&ArenaConfig::default()),
            Err(ArenaError::InvalidClock(45))
        );
    }

    #[test]
    fn test_balance_check() {
        let req = request();
        assert!(req.check_balance(5_000).is_ok());
        assert_eq!(
            req.check_balance(4_999),
            Err(ArenaError::InvalidWager(WagerProblem::ExceedsBalance {
                balance: 4_999
            }))
        );
    }

    #[test]
    fn test_accept_by_opponent_consumes() {
        let now = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(10);
        let accepted = invitation().accept("bob", now, ttl()).expect("Opponent accepts");
        assert_eq!(accepted.status, InvitationStatus::Consumed);
        assert_eq!(accepted.resolved_at, Some(now));
    }

    #[test]
    fn test_accept_guards() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let inv = invitation();
        assert_eq!(inv.accept("alice", now, ttl()), Err(ArenaError::SelfAccept));
        assert_eq!(
            inv.accept("carol", now, ttl()),
            Err(ArenaError::NotYourInvitation)
        );
        let late = now + TimeDelta::minutes(16);
        assert_eq!(
            inv.accept("bob", late, ttl()),
            Err(ArenaError::InvitationExpired)
        );
    }

    #[test]
    fn test_decline_by_either_party() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let inv = invitation();
        assert_eq!(
            inv.decline("alice", now).map(|i| i.status),
            Ok(InvitationStatus::Voided)
        );
        assert_eq!(
            inv.decline("bob", now).map(|i| i.status),
            Ok(InvitationStatus::Voided)
        );
        assert_eq!(inv.decline("carol", now), Err(ArenaError::NotYourInvitation));
    }

    #[test]
    fn test_resolved_invitation_is_inert() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let voided = invitation().void(now).expect("Pending voids");
        assert_eq!(
            voided.accept("bob", now, ttl()),
            Err(ArenaError::InvitationAlreadyResolved(InvitationStatus::Voided))
        );
        assert_eq!(
            voided.decline("alice", now),
            Err(ArenaError::InvitationAlreadyResolved(InvitationStatus::Voided))
        );
        assert_eq!(
            voided.void(now),
            Err(ArenaError::InvitationAlreadyResolved(InvitationStatus::Voided))
        );
    }
}
