//! Arena business logic layer.
//!
//! [`ArenaService`] validates requests, runs the pure state machines, and
//! hands each resulting transition to [`ArenaRepository`] to commit together
//! with its escrow effects.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use strictly_connect4::{Board, Slot};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ArenaConfig;
use crate::db::{ArenaRepository, DbError, IssuedInvitation};
use crate::error::ArenaError;
use crate::game::{Game, GameId, GameView};
use crate::interaction::{Interaction, InteractionId, InteractionOutcome, StoredInteraction};
use crate::invitation::{ChallengeRequest, Invitation, InvitationId};

/// Result of a move submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The token was placed.
    Played {
        /// Game after the move.
        view: GameView,
        /// Where the token landed.
        placed: Option<Slot>,
    },
    /// The mover's clock had already run out; the game was forfeited
    /// instead of applying the move.
    ClockExpired(GameView),
}

impl SubmitOutcome {
    /// Game state after the submission.
    pub fn view(&self) -> &GameView {
        match self {
            SubmitOutcome::Played { view, .. } | SubmitOutcome::ClockExpired(view) => view,
        }
    }
}

/// What a sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Games forfeited on time.
    pub forfeited: Vec<GameView>,
    /// Pending invitations voided for age.
    pub expired_invitations: Vec<Invitation>,
}

impl SweepReport {
    /// True when the sweep changed nothing.
    pub fn is_empty(&self) -> bool {
        self.forfeited.is_empty() && self.expired_invitations.is_empty()
    }
}

/// Service layer for the Connect Four arena.
#[derive(Debug, Clone)]
pub struct ArenaService {
    config: ArenaConfig,
    repository: ArenaRepository,
    clock: Arc<dyn Clock>,
}

impl ArenaService {
    /// Creates a service on the wall clock.
    #[instrument(skip(config, repository))]
    pub fn new(config: ArenaConfig, repository: ArenaRepository) -> Self {
        Self::with_clock(config, repository, Arc::new(SystemClock))
    }

    /// Creates a service on the given clock.
    #[instrument(skip_all)]
    pub fn with_clock(
        config: ArenaConfig,
        repository: ArenaRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(db = repository.db_path(), "Creating ArenaService");
        Self {
            config,
            repository,
            clock,
        }
    }

    /// Opens the configured database and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or migrated.
    #[instrument(skip(config), fields(db = %config.database_path()))]
    pub fn open(config: ArenaConfig) -> Result<Self, DbError> {
        let repository = ArenaRepository::new(config.database_path().clone())?;
        repository.run_migrations()?;
        Ok(Self::new(config, repository))
    }

    /// Active configuration.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Underlying repository.
    pub fn repository(&self) -> &ArenaRepository {
        &self.repository
    }

    /// Current time on the service clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn invitation_ttl(&self) -> TimeDelta {
        TimeDelta::seconds(*self.config.invitation_ttl_secs())
    }

    /// Forfeits `game` if its clock has run out and returns the game as it
    /// now stands. A transition that lost a race is re-read.
    fn enforce_clock(&self, game: Game, now: DateTime<Utc>) -> Result<Game, ArenaError> {
        let forfeited = match game.time_out(now) {
            Ok(Some(forfeited)) => forfeited,
            Ok(None) | Err(ArenaError::GameAlreadyEnded) => return Ok(game),
            Err(e) => return Err(e),
        };
        match self.repository.commit_game(&game, &forfeited, now) {
            Ok(()) => {
                info!(game_id = game.id, "Clock expired on demand");
                Ok(forfeited)
            }
            Err(ArenaError::MoveConflict | ArenaError::GameAlreadyEnded) => {
                debug!(game_id = game.id, "Game changed before forfeit");
                self.repository.load_game(&game.guild_id, game.id)
            }
            Err(e) => Err(e),
        }
    }

    /// Issues a challenge and holds the challenger's stake.
    ///
    /// A pending invitation from the same challenger is voided and refunded
    /// first.
    ///
    /// # Errors
    ///
    /// Validation errors, [`ArenaError::AlreadyInGame`], or storage errors.
    #[instrument(skip(self, request), fields(guild = %request.guild_id, challenger = %request.challenger))]
    pub fn challenge(&self, request: &ChallengeRequest) -> Result<IssuedInvitation, ArenaError> {
        let move_time = request.validate(&self.config)?;
        let issued = self.repository.create_invitation(request, move_time, self.now())?;
        info!(invitation_id = issued.invitation.id, "Challenge issued");
        Ok(issued)
    }

    /// Accepts an invitation and starts the game.
    ///
    /// # Errors
    ///
    /// Invitation guards, [`ArenaError::AlreadyInGame`],
    /// [`ArenaError::InsufficientFunds`], or storage errors.
    #[instrument(skip(self))]
    pub fn accept(
        &self,
        guild_id: &str,
        invitation_id: InvitationId,
        actor: &str,
    ) -> Result<GameView, ArenaError> {
        let invitation = self.repository.load_invitation(guild_id, invitation_id)?;
        let board = Board::with_dimensions(
            *self.config.board_width(),
            *self.config.board_height(),
            invitation.challenger_color,
        )?;
        let now = self.now();
        let game = self.repository.accept_invitation(
            guild_id,
            invitation_id,
            actor,
            board,
            now,
            self.invitation_ttl(),
        )?;
        Ok(game.view(now))
    }

    /// Declines or withdraws an invitation and refunds the challenger.
    ///
    /// # Errors
    ///
    /// Invitation guards or storage errors.
    #[instrument(skip(self))]
    pub fn decline(
        &self,
        guild_id: &str,
        invitation_id: InvitationId,
        actor: &str,
    ) -> Result<Invitation, ArenaError> {
        self.repository
            .decline_invitation(guild_id, invitation_id, actor, self.now())
    }

    /// Drops `actor`'s token into `column` (zero-based).
    ///
    /// If the mover's clock has already expired the game is forfeited and
    /// [`SubmitOutcome::ClockExpired`] is returned instead.
    ///
    /// # Errors
    ///
    /// Move guards, [`ArenaError::MoveConflict`] when another move landed
    /// first, or storage errors.
    #[instrument(skip(self))]
    pub fn submit_move(
        &self,
        guild_id: &str,
        game_id: GameId,
        actor: &str,
        column: usize,
    ) -> Result<SubmitOutcome, ArenaError> {
        let game = self.repository.load_game(guild_id, game_id)?;
        let now = self.now();

        if let Ok(Some(forfeited)) = game.time_out(now) {
            self.repository.commit_game(&game, &forfeited, now)?;
            info!(game_id, "Move arrived after the clock expired");
            return Ok(SubmitOutcome::ClockExpired(forfeited.view(now)));
        }

        let next = game.submit_move(actor, column, now)?;
        self.repository.commit_game(&game, &next, now)?;
        let placed = next.placed_since(&game);
        debug!(?placed, "Move committed");
        Ok(SubmitOutcome::Played {
            view: next.view(now),
            placed,
        })
    }

    /// Forfeits the game on behalf of `actor`.
    ///
    /// If the player to move has already run out of time, the clock forfeit
    /// is committed instead and its view returned, whoever resigned.
    ///
    /// # Errors
    ///
    /// [`ArenaError::GameAlreadyEnded`], [`ArenaError::NotAParticipant`],
    /// [`ArenaError::MoveConflict`], or storage errors.
    #[instrument(skip(self))]
    pub fn resign(
        &self,
        guild_id: &str,
        game_id: GameId,
        actor: &str,
    ) -> Result<GameView, ArenaError> {
        let game = self.repository.load_game(guild_id, game_id)?;
        let now = self.now();
        if let Ok(Some(forfeited)) = game.time_out(now) {
            game.color_of(actor).ok_or(ArenaError::NotAParticipant)?;
            self.repository.commit_game(&game, &forfeited, now)?;
            info!(game_id, "Resignation arrived after the clock expired");
            return Ok(forfeited.view(now));
        }
        let resigned = game.resign(actor, now)?;
        self.repository.commit_game(&game, &resigned, now)?;
        Ok(resigned.view(now))
    }

    /// Runs [`Self::sweep_expired_at`] at the current time.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn sweep_expired(&self) -> Result<SweepReport, ArenaError> {
        self.sweep_expired_at(self.now())
    }

    /// Forfeits games whose clock ran out and voids stale invitations.
    ///
    /// Safe to run repeatedly and alongside player actions: a game that
    /// moved or ended since it was read is skipped.
    ///
    /// # Errors
    ///
    /// Storage errors.
    #[instrument(skip(self))]
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<SweepReport, ArenaError> {
        let mut report = SweepReport::default();
        for game in self.repository.active_games()? {
            let forfeited = match game.time_out(now) {
                Ok(Some(forfeited)) => forfeited,
                Ok(None) | Err(ArenaError::GameAlreadyEnded) => continue,
                Err(e) => return Err(e),
            };
            match self.repository.commit_game(&game, &forfeited, now) {
                Ok(()) => report.forfeited.push(forfeited.view(now)),
                Err(ArenaError::MoveConflict | ArenaError::GameAlreadyEnded) => {
                    debug!(game_id = game.id, "Game changed during sweep");
                }
                Err(e) if e.is_user_facing() => {
                    warn!(game_id = game.id, error = %e, "Sweep skipped game");
                }
                Err(e) => return Err(e),
            }
        }
        report.expired_invitations = self
            .repository
            .void_expired_invitations(now, self.invitation_ttl())?;
        if !report.is_empty() {
            info!(
                forfeited = report.forfeited.len(),
                expired = report.expired_invitations.len(),
                "Sweep applied"
            );
        }
        Ok(report)
    }

    /// Current view of a game.
    ///
    /// # Errors
    ///
    /// [`ArenaError::GameNotFound`], integrity, or storage errors.
    #[instrument(skip(self))]
    pub fn game_view(&self, guild_id: &str, game_id: GameId) -> Result<GameView, ArenaError> {
        let now = self.now();
        let game = self.repository.load_game(guild_id, game_id)?;
        Ok(self.enforce_clock(game, now)?.view(now))
    }

    /// View of the game `user_id` is playing in the guild, if any. A game
    /// whose clock has run out is forfeited first and no longer counts.
    ///
    /// # Errors
    ///
    /// Integrity or storage errors.
    #[instrument(skip(self))]
    pub fn active_game(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<GameView>, ArenaError> {
        let now = self.now();
        let Some(game) = self.repository.active_game(guild_id, user_id)? else {
            return Ok(None);
        };
        let game = self.enforce_clock(game, now)?;
        Ok(game.is_active().then(|| game.view(now)))
    }

    /// Wallet balance.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn balance(&self, user_id: &str, guild_id: &str) -> Result<i64, ArenaError> {
        self.repository.balance(user_id, guild_id)
    }

    /// Credits a wallet; returns the new balance.
    ///
    /// # Errors
    ///
    /// Integrity error for a non-positive amount; storage errors otherwise.
    pub fn deposit(&self, user_id: &str, guild_id: &str, amount: i64) -> Result<i64, ArenaError> {
        self.repository.deposit(user_id, guild_id, amount)
    }

    /// Stores a control so a later press can be resolved by id.
    ///
    /// # Errors
    ///
    /// Storage errors.
    #[instrument(skip(self))]
    pub fn register_interaction(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
        interaction: Interaction,
    ) -> Result<StoredInteraction, ArenaError> {
        self.repository
            .insert_interaction(guild_id, channel_id, user_id, interaction, self.now())
    }

    /// Resolves a stored interaction and performs it as `actor`.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InteractionNotFound`] for unknown ids or ids from
    /// another guild, plus whatever the routed operation returns.
    #[instrument(skip(self))]
    pub fn dispatch(
        &self,
        actor: &str,
        guild_id: &str,
        interaction_id: InteractionId,
    ) -> Result<InteractionOutcome, ArenaError> {
        let stored = self.repository.load_interaction(interaction_id)?;
        if stored.guild_id != guild_id {
            warn!(interaction_id, "Interaction from another guild");
            return Err(ArenaError::InteractionNotFound(interaction_id));
        }
        debug!(kind = stored.interaction.as_ref(), "Dispatching interaction");
        match stored.interaction {
            Interaction::AcceptInvitation { invitation_id } => self
                .accept(guild_id, invitation_id, actor)
                .map(InteractionOutcome::GameStarted),
            Interaction::DeclineInvitation { invitation_id } => self
                .decline(guild_id, invitation_id, actor)
                .map(InteractionOutcome::InvitationDeclined),
            Interaction::PlaceToken { game_id, column } => self
                .submit_move(guild_id, game_id, actor, column)
                .map(|outcome| match outcome {
                    SubmitOutcome::Played { view, .. } => InteractionOutcome::MovePlayed(view),
                    SubmitOutcome::ClockExpired(view) => InteractionOutcome::ClockExpired(view),
                }),
            Interaction::Resign { game_id } => self
                .resign(guild_id, game_id, actor)
                .map(InteractionOutcome::Resigned),
        }
    }
}
