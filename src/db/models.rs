//! Database rows and their conversions into domain types.
//!
//! Loading is where stored state is re-checked: a row whose derived game
//! state, move count, or status string disagrees with what it records is
//! refused as an integrity error instead of being handed to the arena.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use derive_new::new;
use diesel::prelude::*;
use strictly_connect4::{Board, Color};
use tracing::{instrument, warn};

use crate::db::schema;
use crate::error::ArenaError;
use crate::escrow::{LedgerEntry, LedgerKind};
use crate::game::{Game, GameState};
use crate::interaction::{Interaction, StoredInteraction};
use crate::invitation::{Invitation, InvitationStatus};

fn utc(ts: NaiveDateTime) -> DateTime<Utc> {
    ts.and_utc()
}

fn parse_color(value: &str) -> Result<Color, ArenaError> {
    value
        .parse()
        .map_err(|_| ArenaError::integrity(format!("Unknown color '{}' in storage", value)))
}

/// Stored invitation.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = schema::invitations)]
pub struct InvitationRow {
    pub id: i32,
    pub guild_id: String,
    pub channel_id: String,
    pub challenger: String,
    pub opponent: String,
    pub challenger_color: String,
    pub wager_amount: Option<i64>,
    pub move_time_secs: i32,
    pub status: String,
    pub game_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = ArenaError;

    #[instrument(skip(row), fields(invitation_id = row.id))]
    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        let status: InvitationStatus = row.status.parse().map_err(|_| {
            ArenaError::integrity(format!("Unknown invitation status '{}'", row.status))
        })?;
        Ok(Invitation {
            id: row.id,
            guild_id: row.guild_id,
            channel_id: row.channel_id,
            challenger: row.challenger,
            opponent: row.opponent,
            challenger_color: parse_color(&row.challenger_color)?,
            wager: row.wager_amount,
            move_time: TimeDelta::seconds(i64::from(row.move_time_secs)),
            status,
            game_id: row.game_id,
            created_at: utc(row.created_at),
            resolved_at: row.resolved_at.map(utc),
        })
    }
}

/// Invitation insert.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::invitations)]
pub struct NewInvitation {
    guild_id: String,
    channel_id: String,
    challenger: String,
    opponent: String,
    challenger_color: String,
    wager_amount: Option<i64>,
    move_time_secs: i32,
    created_at: NaiveDateTime,
}

/// Stored game.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = schema::games)]
pub struct GameRow {
    pub id: i32,
    pub invitation_id: i32,
    pub guild_id: String,
    pub channel_id: String,
    pub challenger: String,
    pub opponent: String,
    pub challenger_color: String,
    pub wager_amount: Option<i64>,
    pub move_time_secs: i32,
    pub board: String,
    pub game_state: String,
    pub move_count: i32,
    pub forfeited_by: Option<String>,
    pub last_move_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<GameRow> for Game {
    type Error = ArenaError;

    #[instrument(skip(row), fields(game_id = row.id))]
    fn try_from(row: GameRow) -> Result<Self, Self::Error> {
        let board = Board::from_json(&row.board)?;
        let recorded = GameState::from_db_string(&row.game_state)?;
        let game = Game {
            id: row.id,
            invitation_id: row.invitation_id,
            guild_id: row.guild_id,
            channel_id: row.channel_id,
            challenger: row.challenger,
            opponent: row.opponent,
            challenger_color: parse_color(&row.challenger_color)?,
            wager: row.wager_amount,
            move_time: TimeDelta::seconds(i64::from(row.move_time_secs)),
            board,
            forfeited_by: row.forfeited_by.as_deref().map(parse_color).transpose()?,
            last_move_at: utc(row.last_move_at),
            ended_at: row.ended_at.map(utc),
            created_at: utc(row.created_at),
        };

        if game.state() != recorded {
            warn!(?recorded, derived = ?game.state(), "Stored game state desynced");
            return Err(ArenaError::integrity(format!(
                "game {} records {:?} but its board derives {:?}",
                game.id,
                recorded,
                game.state()
            )));
        }
        if usize::try_from(row.move_count).ok() != Some(game.move_count()) {
            return Err(ArenaError::integrity(format!(
                "game {} records {} moves but its board holds {}",
                game.id,
                row.move_count,
                game.move_count()
            )));
        }
        game.check_consistency()?;
        Ok(game)
    }
}

/// Game insert.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::games)]
pub struct NewGame {
    invitation_id: i32,
    guild_id: String,
    channel_id: String,
    challenger: String,
    opponent: String,
    challenger_color: String,
    wager_amount: Option<i64>,
    move_time_secs: i32,
    board: String,
    game_state: String,
    move_count: i32,
    last_move_at: NaiveDateTime,
    created_at: NaiveDateTime,
}

/// Mutable columns of a game, written by a conditional update.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = schema::games, treat_none_as_null = true)]
pub struct GameChanges {
    pub board: String,
    pub game_state: String,
    pub move_count: i32,
    pub forfeited_by: Option<String>,
    pub last_move_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
}

impl TryFrom<&Game> for GameChanges {
    type Error = ArenaError;

    fn try_from(game: &Game) -> Result<Self, Self::Error> {
        Ok(Self {
            board: game.board.to_json()?,
            game_state: game.state().to_db_string(),
            move_count: move_count(game)?,
            forfeited_by: game.forfeited_by.map(|c| c.to_string()),
            last_move_at: game.last_move_at.naive_utc(),
            ended_at: game.ended_at.map(|t| t.naive_utc()),
        })
    }
}

/// Move count as stored.
pub fn move_count(game: &Game) -> Result<i32, ArenaError> {
    i32::try_from(game.move_count())
        .map_err(|_| ArenaError::integrity(format!("move count overflow in game {}", game.id)))
}

/// Stored ledger entry.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::ledger_entries)]
pub struct LedgerRow {
    pub id: i32,
    pub guild_id: String,
    pub user_id: String,
    pub amount: i64,
    pub kind: String,
    pub invitation_id: i32,
    pub game_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = ArenaError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let kind: LedgerKind = row
            .kind
            .parse()
            .map_err(|_| ArenaError::integrity(format!("Unknown ledger kind '{}'", row.kind)))?;
        Ok(LedgerEntry::new(row.user_id, row.amount, kind))
    }
}

/// Ledger insert.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::ledger_entries)]
pub struct NewLedgerRow {
    guild_id: String,
    user_id: String,
    amount: i64,
    kind: String,
    invitation_id: i32,
    game_id: Option<i32>,
    created_at: NaiveDateTime,
}

/// Stored interaction.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::interactions)]
pub struct InteractionRow {
    pub id: i32,
    pub guild_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub kind: String,
    pub payload: String,
    pub created_at: NaiveDateTime,
}

impl TryFrom<InteractionRow> for StoredInteraction {
    type Error = ArenaError;

    fn try_from(row: InteractionRow) -> Result<Self, Self::Error> {
        let interaction: Interaction = serde_json::from_str(&row.payload).map_err(|e| {
            ArenaError::integrity(format!("interaction {} payload: {}", row.id, e))
        })?;
        if interaction.as_ref() != row.kind {
            return Err(ArenaError::integrity(format!(
                "interaction {} is stored as '{}' but decodes as '{}'",
                row.id,
                row.kind,
                interaction.as_ref()
            )));
        }
        Ok(StoredInteraction {
            id: row.id,
            guild_id: row.guild_id,
            channel_id: row.channel_id,
            user_id: row.user_id,
            interaction,
            created_at: utc(row.created_at),
        })
    }
}

/// Interaction insert.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::interactions)]
pub struct NewInteraction {
    guild_id: String,
    channel_id: String,
    user_id: String,
    kind: String,
    payload: String,
    created_at: NaiveDateTime,
}
