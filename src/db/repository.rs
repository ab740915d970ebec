//! Arena repository.
//!
//! Every state transition commits together with its ledger effects inside a
//! single `BEGIN IMMEDIATE` transaction. Invitations are only updated while
//! still pending and games only while still open at the move count the
//! caller observed, so a concurrent actor that lost the race sees zero
//! affected rows and gets a conflict instead of a double effect.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use strictly_connect4::Board;
use tracing::{debug, info, instrument, warn};

use crate::config::MoveTimeOption;
use crate::db::models::{
    GameChanges, GameRow, InteractionRow, InvitationRow, LedgerRow, NewGame, NewInteraction,
    NewInvitation, move_count,
};
use crate::db::wallet::{self, Lineage};
use crate::db::{DbError, schema};
use crate::error::ArenaError;
use crate::escrow::{self, LedgerEntry};
use crate::game::{Game, GameId, GameState};
use crate::interaction::{Interaction, InteractionId, StoredInteraction};
use crate::invitation::{ChallengeRequest, Invitation, InvitationId, InvitationStatus};

/// Schema migrations compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;";

/// A newly issued invitation and the invitations it replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedInvitation {
    /// The pending invitation.
    pub invitation: Invitation,
    /// Previously pending invitations from the same challenger, now voided
    /// and refunded.
    pub superseded: Vec<Invitation>,
}

/// Database repository for invitations, games, wallets, and interactions.
#[derive(Debug, Clone)]
pub struct ArenaRepository {
    db_path: String,
}

impl ArenaRepository {
    /// Creates a repository for the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        if db_path.is_empty() {
            return Err(DbError::new("Database path is empty"));
        }
        info!(path = %db_path, "Creating ArenaRepository");
        Ok(Self { db_path })
    }

    /// Path of the backing database.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))?;
        conn.batch_execute(CONNECTION_PRAGMAS)?;
        Ok(conn)
    }

    /// Applies pending migrations and switches the database to WAL mode.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        conn.batch_execute("PRAGMA journal_mode = WAL;")?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(DbError::migration)?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    //  Wallets
    // ─────────────────────────────────────────────────────────────

    /// Current wallet balance.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Storage`] on database failure.
    #[instrument(skip(self))]
    pub fn balance(&self, user_id: &str, guild_id: &str) -> Result<i64, ArenaError> {
        let mut conn = self.connection()?;
        Ok(wallet::balance(&mut conn, user_id, guild_id)?)
    }

    /// Credits a wallet outside any escrow lineage.
    ///
    /// # Errors
    ///
    /// Integrity error for a non-positive amount; storage errors otherwise.
    #[instrument(skip(self))]
    pub fn deposit(&self, user_id: &str, guild_id: &str, amount: i64) -> Result<i64, ArenaError> {
        if amount <= 0 {
            return Err(ArenaError::integrity(format!(
                "deposit of {} is not positive",
                amount
            )));
        }
        let mut conn = self.connection()?;
        let balance = conn.immediate_transaction(|conn| -> Result<i64, ArenaError> {
            wallet::credit(conn, user_id, guild_id, amount)?;
            Ok(wallet::balance(conn, user_id, guild_id)?)
        })?;
        info!(balance, "Deposit recorded");
        Ok(balance)
    }

    /// Ledger entries of one invitation lineage, oldest first.
    ///
    /// # Errors
    ///
    /// Storage or integrity errors.
    #[instrument(skip(self))]
    pub fn ledger_for(&self, invitation_id: InvitationId) -> Result<Vec<LedgerEntry>, ArenaError> {
        let mut conn = self.connection()?;
        schema::ledger_entries::table
            .filter(schema::ledger_entries::invitation_id.eq(invitation_id))
            .order(schema::ledger_entries::id.asc())
            .select(LedgerRow::as_select())
            .load(&mut conn)?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }

    /// Total currently held in escrow for a guild.
    ///
    /// # Errors
    ///
    /// Storage errors.
    #[instrument(skip(self))]
    pub fn escrowed(&self, guild_id: &str) -> Result<i64, ArenaError> {
        let mut conn = self.connection()?;
        let amounts: Vec<i64> = schema::ledger_entries::table
            .filter(schema::ledger_entries::guild_id.eq(guild_id))
            .select(schema::ledger_entries::amount)
            .load(&mut conn)?;
        Ok(-amounts.iter().sum::<i64>())
    }

    // ─────────────────────────────────────────────────────────────
    //  Invitations
    // ─────────────────────────────────────────────────────────────

    /// Issues an invitation, superseding the challenger's pending one.
    ///
    /// Superseded invitations are voided and refunded before the new
    /// wager is checked against the balance and held. Everything commits
    /// or nothing does.
    ///
    /// # Errors
    ///
    /// [`ArenaError::AlreadyInGame`], [`ArenaError::InvalidWager`] when the
    /// wager exceeds the balance, or storage errors.
    #[instrument(skip(self, request, move_time), fields(challenger = %request.challenger, opponent = %request.opponent.id))]
    pub fn create_invitation(
        &self,
        request: &ChallengeRequest,
        move_time: &MoveTimeOption,
        now: DateTime<Utc>,
    ) -> Result<IssuedInvitation, ArenaError> {
        let move_time_secs = i32::try_from(*move_time.seconds())
            .map_err(|_| ArenaError::InvalidClock(*move_time.seconds()))?;
        let mut conn = self.connection()?;
        let issued = conn.immediate_transaction(|conn| -> Result<IssuedInvitation, ArenaError> {
            let guild = request.guild_id.as_str();
            for user in [&request.challenger, &request.opponent.id] {
                ensure_not_playing(conn, guild, user)?;
            }

            let mut superseded = Vec::new();
            let pending = schema::invitations::table
                .filter(schema::invitations::guild_id.eq(guild))
                .filter(schema::invitations::challenger.eq(&request.challenger))
                .filter(schema::invitations::status.eq(InvitationStatus::Pending.as_ref()))
                .select(InvitationRow::as_select())
                .load(conn)?;
            for row in pending {
                let old = Invitation::try_from(row)?;
                let voided = old.void(now)?;
                resolve_pending(conn, &voided)?;
                wallet::apply(conn, lineage(&old, None), &escrow::refund(&old), now.naive_utc())?;
                debug!(invitation_id = old.id, "Superseded invitation voided");
                superseded.push(voided);
            }

            request.check_balance(wallet::balance(conn, &request.challenger, guild)?)?;

            let row = diesel::insert_into(schema::invitations::table)
                .values(NewInvitation::new(
                    request.guild_id.clone(),
                    request.channel_id.clone(),
                    request.challenger.clone(),
                    request.opponent.id.clone(),
                    request.color.to_string(),
                    request.wager,
                    move_time_secs,
                    now.naive_utc(),
                ))
                .returning(InvitationRow::as_returning())
                .get_result(conn)?;
            let invitation = Invitation::try_from(row)?;
            wallet::apply(
                conn,
                lineage(&invitation, None),
                &escrow::hold(&invitation),
                now.naive_utc(),
            )?;
            Ok(IssuedInvitation {
                invitation,
                superseded,
            })
        })?;
        info!(
            invitation_id = issued.invitation.id,
            superseded = issued.superseded.len(),
            "Invitation issued"
        );
        Ok(issued)
    }

    /// Loads an invitation within a guild.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvitationNotFound`], integrity, or storage errors.
    #[instrument(skip(self))]
    pub fn load_invitation(
        &self,
        guild_id: &str,
        invitation_id: InvitationId,
    ) -> Result<Invitation, ArenaError> {
        let mut conn = self.connection()?;
        load_invitation(&mut conn, guild_id, invitation_id)
    }

    /// Pending invitation issued by `challenger`, if any.
    ///
    /// # Errors
    ///
    /// Integrity or storage errors.
    #[instrument(skip(self))]
    pub fn pending_invitation(
        &self,
        guild_id: &str,
        challenger: &str,
    ) -> Result<Option<Invitation>, ArenaError> {
        let mut conn = self.connection()?;
        schema::invitations::table
            .filter(schema::invitations::guild_id.eq(guild_id))
            .filter(schema::invitations::challenger.eq(challenger))
            .filter(schema::invitations::status.eq(InvitationStatus::Pending.as_ref()))
            .select(InvitationRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Invitation::try_from)
            .transpose()
    }

    /// Accepts an invitation and starts its game on `board`.
    ///
    /// The opponent's stake is debited in the same transaction that
    /// consumes the invitation and creates the game.
    ///
    /// # Errors
    ///
    /// Invitation guards, [`ArenaError::AlreadyInGame`],
    /// [`ArenaError::InsufficientFunds`], or storage errors. On any error
    /// nothing changes.
    #[instrument(skip(self, board, ttl))]
    pub fn accept_invitation(
        &self,
        guild_id: &str,
        invitation_id: InvitationId,
        actor: &str,
        board: Board,
        now: DateTime<Utc>,
        ttl: TimeDelta,
    ) -> Result<Game, ArenaError> {
        let mut conn = self.connection()?;
        let game = conn.immediate_transaction(|conn| -> Result<Game, ArenaError> {
            let invitation = load_invitation(conn, guild_id, invitation_id)?;
            let accepted = invitation.accept(actor, now, ttl)?;
            for user in [&invitation.challenger, &invitation.opponent] {
                ensure_not_playing(conn, guild_id, user)?;
            }
            resolve_pending(conn, &accepted)?;

            let row = diesel::insert_into(schema::games::table)
                .values(NewGame::new(
                    invitation.id,
                    invitation.guild_id.clone(),
                    invitation.channel_id.clone(),
                    invitation.challenger.clone(),
                    invitation.opponent.clone(),
                    invitation.challenger_color.to_string(),
                    invitation.wager,
                    i32::try_from(invitation.move_time.num_seconds())
                        .map_err(|_| ArenaError::InvalidClock(invitation.move_time.num_seconds()))?,
                    board.to_json()?,
                    GameState::from(board.state()).to_db_string(),
                    i32::try_from(board.occupied()).map_err(|_| {
                        ArenaError::integrity("starting board move count overflow")
                    })?,
                    now.naive_utc(),
                    now.naive_utc(),
                ))
                .returning(GameRow::as_returning())
                .get_result(conn)?;
            let game = Game::try_from(row)?;

            diesel::update(schema::invitations::table.find(invitation.id))
                .set(schema::invitations::game_id.eq(game.id))
                .execute(conn)?;
            wallet::apply(
                conn,
                lineage(&invitation, Some(game.id)),
                &escrow::opponent_hold(&invitation),
                now.naive_utc(),
            )?;
            Ok(game)
        })?;
        info!(game_id = game.id, invitation_id, "Invitation accepted, game started");
        Ok(game)
    }

    /// Declines an invitation and refunds the challenger.
    ///
    /// # Errors
    ///
    /// Invitation guards or storage errors.
    #[instrument(skip(self))]
    pub fn decline_invitation(
        &self,
        guild_id: &str,
        invitation_id: InvitationId,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Invitation, ArenaError> {
        let mut conn = self.connection()?;
        let declined = conn.immediate_transaction(|conn| -> Result<Invitation, ArenaError> {
            let invitation = load_invitation(conn, guild_id, invitation_id)?;
            let declined = invitation.decline(actor, now)?;
            resolve_pending(conn, &declined)?;
            wallet::apply(
                conn,
                lineage(&invitation, None),
                &escrow::refund(&invitation),
                now.naive_utc(),
            )?;
            Ok(declined)
        })?;
        info!(invitation_id, "Invitation declined");
        Ok(declined)
    }

    /// Voids and refunds every pending invitation older than `ttl`.
    ///
    /// Each invitation commits on its own; one that was resolved
    /// concurrently is skipped.
    ///
    /// # Errors
    ///
    /// Storage errors.
    #[instrument(skip(self, ttl))]
    pub fn void_expired_invitations(
        &self,
        now: DateTime<Utc>,
        ttl: TimeDelta,
    ) -> Result<Vec<Invitation>, ArenaError> {
        let cutoff: NaiveDateTime = (now - ttl).naive_utc();
        let mut conn = self.connection()?;
        let stale: Vec<(i32, String)> = schema::invitations::table
            .filter(schema::invitations::status.eq(InvitationStatus::Pending.as_ref()))
            .filter(schema::invitations::created_at.lt(cutoff))
            .select((schema::invitations::id, schema::invitations::guild_id))
            .load(&mut conn)?;

        let mut voided = Vec::new();
        for (id, guild_id) in stale {
            let result = conn.immediate_transaction(|conn| -> Result<Option<Invitation>, ArenaError> {
                let invitation = load_invitation(conn, &guild_id, id)?;
                if !invitation.is_expired(now, ttl) {
                    return Ok(None);
                }
                let expired = invitation.void(now)?;
                resolve_pending(conn, &expired)?;
                wallet::apply(
                    conn,
                    lineage(&invitation, None),
                    &escrow::refund(&invitation),
                    now.naive_utc(),
                )?;
                Ok(Some(expired))
            });
            match result {
                Ok(Some(expired)) => {
                    info!(invitation_id = id, "Expired invitation voided");
                    voided.push(expired);
                }
                Ok(None) => {}
                Err(ArenaError::InvitationAlreadyResolved(status)) => {
                    debug!(invitation_id = id, %status, "Invitation resolved concurrently");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(voided)
    }

    // ─────────────────────────────────────────────────────────────
    //  Games
    // ─────────────────────────────────────────────────────────────

    /// Loads a game within a guild.
    ///
    /// # Errors
    ///
    /// [`ArenaError::GameNotFound`], integrity, or storage errors.
    #[instrument(skip(self))]
    pub fn load_game(&self, guild_id: &str, game_id: GameId) -> Result<Game, ArenaError> {
        let mut conn = self.connection()?;
        let game = load_game(&mut conn, game_id)?;
        if game.guild_id != guild_id {
            return Err(ArenaError::GameNotFound(game_id));
        }
        Ok(game)
    }

    /// The active game `user_id` is playing in the guild, if any.
    ///
    /// # Errors
    ///
    /// Integrity or storage errors.
    #[instrument(skip(self))]
    pub fn active_game(&self, guild_id: &str, user_id: &str) -> Result<Option<Game>, ArenaError> {
        let mut conn = self.connection()?;
        active_game_of(&mut conn, guild_id, user_id)
    }

    /// Every game that has not ended, across guilds.
    ///
    /// Rows that fail integrity checks are logged and skipped.
    ///
    /// # Errors
    ///
    /// Storage errors.
    #[instrument(skip(self))]
    pub fn active_games(&self) -> Result<Vec<Game>, ArenaError> {
        let mut conn = self.connection()?;
        let rows = schema::games::table
            .filter(schema::games::ended_at.is_null())
            .select(GameRow::as_select())
            .load(&mut conn)?;
        let games: Vec<Game> = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                Game::try_from(row)
                    .map_err(|e| warn!(game_id = id, error = %e, "Skipping unreadable game"))
                    .ok()
            })
            .collect();
        debug!(count = games.len(), "Active games loaded");
        Ok(games)
    }

    /// Commits the transition from `before` to `after` and settles a finished game.
    ///
    /// The update only applies while the stored game is still open at
    /// `before`'s move count.
    ///
    /// # Errors
    ///
    /// [`ArenaError::GameAlreadyEnded`] if the game ended concurrently,
    /// [`ArenaError::MoveConflict`] if another move landed first, or
    /// integrity and storage errors.
    #[instrument(skip(self, before, after), fields(game_id = before.id))]
    pub fn commit_game(
        &self,
        before: &Game,
        after: &Game,
        now: DateTime<Utc>,
    ) -> Result<(), ArenaError> {
        if before.id != after.id {
            return Err(ArenaError::integrity(format!(
                "transition from game {} to game {}",
                before.id, after.id
            )));
        }
        after.check_consistency()?;
        let changes = GameChanges::try_from(after)?;
        let observed = move_count(before)?;

        let mut conn = self.connection()?;
        conn.immediate_transaction(|conn| -> Result<(), ArenaError> {
            let updated = diesel::update(
                schema::games::table
                    .find(before.id)
                    .filter(schema::games::ended_at.is_null())
                    .filter(schema::games::move_count.eq(observed)),
            )
            .set(&changes)
            .execute(conn)?;

            if updated == 0 {
                let current = load_game(conn, before.id)?;
                return Err(if current.is_active() {
                    warn!(observed, current = current.move_count(), "Stale move rejected");
                    ArenaError::MoveConflict
                } else {
                    warn!("Game ended before commit");
                    ArenaError::GameAlreadyEnded
                });
            }

            if !after.is_active() {
                let lineage = Lineage {
                    guild_id: &after.guild_id,
                    invitation_id: after.invitation_id,
                    game_id: Some(after.id),
                };
                wallet::apply(conn, lineage, &escrow::settle(after)?, now.naive_utc())?;
            }
            Ok(())
        })?;
        info!(state = ?after.state(), moves = after.move_count(), "Game transition committed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    //  Interactions
    // ─────────────────────────────────────────────────────────────

    /// Stores an interaction and returns it with its id.
    ///
    /// # Errors
    ///
    /// Storage errors.
    #[instrument(skip(self))]
    pub fn insert_interaction(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
        interaction: Interaction,
        now: DateTime<Utc>,
    ) -> Result<StoredInteraction, ArenaError> {
        let payload = serde_json::to_string(&interaction).map_err(DbError::from)?;
        let mut conn = self.connection()?;
        let row = diesel::insert_into(schema::interactions::table)
            .values(NewInteraction::new(
                guild_id.to_string(),
                channel_id.to_string(),
                user_id.to_string(),
                interaction.as_ref().to_string(),
                payload,
                now.naive_utc(),
            ))
            .returning(InteractionRow::as_returning())
            .get_result(&mut conn)?;
        let stored = StoredInteraction::try_from(row)?;
        debug!(interaction_id = stored.id, "Interaction stored");
        Ok(stored)
    }

    /// Loads a stored interaction.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InteractionNotFound`], integrity, or storage errors.
    #[instrument(skip(self))]
    pub fn load_interaction(&self, id: InteractionId) -> Result<StoredInteraction, ArenaError> {
        let mut conn = self.connection()?;
        schema::interactions::table
            .find(id)
            .select(InteractionRow::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or(ArenaError::InteractionNotFound(id))
            .and_then(StoredInteraction::try_from)
    }
}

fn lineage(invitation: &Invitation, game_id: Option<GameId>) -> Lineage<'_> {
    Lineage {
        guild_id: &invitation.guild_id,
        invitation_id: invitation.id,
        game_id,
    }
}

fn load_invitation(
    conn: &mut SqliteConnection,
    guild_id: &str,
    invitation_id: InvitationId,
) -> Result<Invitation, ArenaError> {
    schema::invitations::table
        .find(invitation_id)
        .filter(schema::invitations::guild_id.eq(guild_id))
        .select(InvitationRow::as_select())
        .first(conn)
        .optional()?
        .ok_or(ArenaError::InvitationNotFound(invitation_id))
        .and_then(Invitation::try_from)
}

/// Writes a resolved invitation over its pending row.
fn resolve_pending(conn: &mut SqliteConnection, resolved: &Invitation) -> Result<(), ArenaError> {
    let updated = diesel::update(
        schema::invitations::table
            .find(resolved.id)
            .filter(schema::invitations::status.eq(InvitationStatus::Pending.as_ref())),
    )
    .set((
        schema::invitations::status.eq(resolved.status.as_ref()),
        schema::invitations::resolved_at.eq(resolved.resolved_at.map(|t| t.naive_utc())),
    ))
    .execute(conn)?;
    if updated == 0 {
        let current = load_invitation(conn, &resolved.guild_id, resolved.id)?;
        return Err(ArenaError::InvitationAlreadyResolved(current.status));
    }
    Ok(())
}

fn load_game(conn: &mut SqliteConnection, game_id: GameId) -> Result<Game, ArenaError> {
    schema::games::table
        .find(game_id)
        .select(GameRow::as_select())
        .first(conn)
        .optional()?
        .ok_or(ArenaError::GameNotFound(game_id))
        .and_then(Game::try_from)
}

fn active_game_of(
    conn: &mut SqliteConnection,
    guild_id: &str,
    user_id: &str,
) -> Result<Option<Game>, ArenaError> {
    schema::games::table
        .filter(schema::games::guild_id.eq(guild_id))
        .filter(schema::games::ended_at.is_null())
        .filter(
            schema::games::challenger
                .eq(user_id)
                .or(schema::games::opponent.eq(user_id)),
        )
        .select(GameRow::as_select())
        .first(conn)
        .optional()?
        .map(Game::try_from)
        .transpose()
}

fn ensure_not_playing(
    conn: &mut SqliteConnection,
    guild_id: &str,
    user_id: &str,
) -> Result<(), ArenaError> {
    match active_game_of(conn, guild_id, user_id)? {
        Some(game) => {
            warn!(user_id, game_id = game.id, "Player already in a game");
            Err(ArenaError::AlreadyInGame {
                user_id: user_id.to_string(),
                channel_id: game.channel_id,
            })
        }
        None => Ok(()),
    }
}
