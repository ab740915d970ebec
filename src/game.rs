//! Game state machine and move clock.
//!
//! A [`Game`] owns its [`Board`] exclusively. Transitions are pure: each one
//! returns the next `Game` and leaves the receiver untouched, so the caller
//! can commit the new value together with its escrow effects or discard it.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use strictly_connect4::{Board, BoardState, Color, Slot};
use tracing::{debug, info, instrument, warn};

use crate::error::ArenaError;
use crate::invitation::InvitationId;
use crate::participant::{ChannelId, GuildId, UserId};

/// Game identifier.
pub type GameId = i32;

/// State of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum GameState {
    /// Waiting for the given color to move.
    Turn(Color),
    /// The given color connected four.
    Won(Color),
    /// Board filled without a winner.
    Draw,
    /// A player ran out of time or resigned; `winner` is the other color.
    Forfeited {
        /// Color of the player who did not forfeit.
        winner: Color,
    },
}

impl GameState {
    /// True for every state except `Turn`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, GameState::Turn(_))
    }

    /// Winning color of a decided game.
    pub fn winner(self) -> Option<Color> {
        match self {
            GameState::Won(color) | GameState::Forfeited { winner: color } => Some(color),
            GameState::Turn(_) | GameState::Draw => None,
        }
    }

    /// Converts the state to the string stored in the database.
    pub fn to_db_string(self) -> String {
        match self {
            GameState::Turn(color) => format!("turn:{}", color),
            GameState::Won(color) => format!("won:{}", color),
            GameState::Draw => "draw".to_string(),
            GameState::Forfeited { winner } => format!("forfeited:{}", winner),
        }
    }

    /// Parses a state from the string stored in the database.
    ///
    /// # Errors
    ///
    /// Returns an integrity error for unknown values.
    #[instrument]
    pub fn from_db_string(s: &str) -> Result<Self, ArenaError> {
        let parse_color = |c: &str| {
            c.parse::<Color>()
                .map_err(|_| ArenaError::integrity(format!("Invalid color in game state '{}'", s)))
        };
        match s.split_once(':') {
            None if s == "draw" => Ok(GameState::Draw),
            Some(("turn", c)) => Ok(GameState::Turn(parse_color(c)?)),
            Some(("won", c)) => Ok(GameState::Won(parse_color(c)?)),
            Some(("forfeited", c)) => Ok(GameState::Forfeited {
                winner: parse_color(c)?,
            }),
            _ => Err(ArenaError::integrity(format!("Invalid game state '{}'", s))),
        }
    }
}

impl From<BoardState> for GameState {
    fn from(state: BoardState) -> Self {
        match state {
            BoardState::Turn(color) => GameState::Turn(color),
            BoardState::Won(color) => GameState::Won(color),
            BoardState::Draw => GameState::Draw,
        }
    }
}

/// A match between two players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    /// Storage id.
    pub id: GameId,
    /// Invitation this game was created from.
    pub invitation_id: InvitationId,
    /// Guild context.
    pub guild_id: GuildId,
    /// Channel the game is played in.
    pub channel_id: ChannelId,
    /// Player who issued the challenge.
    pub challenger: UserId,
    /// Player who accepted it.
    pub opponent: UserId,
    /// Challenger's color.
    pub challenger_color: Color,
    /// Stake per side.
    pub wager: Option<i64>,
    /// Time allowed per move.
    pub move_time: TimeDelta,
    /// Current board.
    pub board: Board,
    /// Color that forfeited, if the game ended by forfeit.
    pub forfeited_by: Option<Color>,
    /// Time of the last move (or of creation).
    pub last_move_at: DateTime<Utc>,
    /// Set once the game reaches a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Game {
    /// Current state. Forfeit overrides whatever the board shows.
    pub fn state(&self) -> GameState {
        match self.forfeited_by {
            Some(loser) => GameState::Forfeited {
                winner: loser.opponent(),
            },
            None => self.board.state().into(),
        }
    }

    /// True while no terminal state has been reached.
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Tokens on the board; also the optimistic concurrency version.
    pub fn move_count(&self) -> usize {
        self.board.occupied()
    }

    /// Color played by `user`, if they are in this game.
    pub fn color_of(&self, user: &str) -> Option<Color> {
        if user == self.challenger {
            Some(self.challenger_color)
        } else if user == self.opponent {
            Some(self.challenger_color.opponent())
        } else {
            None
        }
    }

    /// Player holding `color`.
    pub fn player(&self, color: Color) -> &str {
        if color == self.challenger_color {
            &self.challenger
        } else {
            &self.opponent
        }
    }

    /// Player of the winning color, if decided.
    pub fn winner_id(&self) -> Option<&str> {
        self.state().winner().map(|color| self.player(color))
    }

    /// Checks that `ended_at` agrees with the state.
    ///
    /// # Errors
    ///
    /// Returns an integrity error if a terminal game is still open or an
    /// active game has been closed.
    pub fn check_consistency(&self) -> Result<(), ArenaError> {
        if self.state().is_terminal() != self.ended_at.is_some() {
            return Err(ArenaError::integrity(format!(
                "game {} is {:?} but ended_at is {:?}",
                self.id,
                self.state(),
                self.ended_at
            )));
        }
        Ok(())
    }

    /// Drops `actor`'s token into `column`.
    ///
    /// # Errors
    ///
    /// [`ArenaError::GameAlreadyEnded`], [`ArenaError::NotAParticipant`],
    /// [`ArenaError::NotYourTurn`], [`ArenaError::ColumnFull`], or
    /// [`ArenaError::ColumnOutOfRange`].
    #[instrument(skip(self), fields(game_id = self.id))]
    pub fn submit_move(
        &self,
        actor: &str,
        column: usize,
        now: DateTime<Utc>,
    ) -> Result<Game, ArenaError> {
        let to_move = match self.state() {
            GameState::Turn(color) => color,
            state => {
                debug!(?state, "Move on finished game");
                return Err(ArenaError::GameAlreadyEnded);
            }
        };
        let color = self.color_of(actor).ok_or(ArenaError::NotAParticipant)?;
        if color != to_move {
            warn!(actor, ?color, ?to_move, "Move out of turn");
            return Err(ArenaError::NotYourTurn(to_move));
        }

        let board = self.board.drop_token(column, color)?;
        let mut next = Game {
            board,
            last_move_at: now,
            ..self.clone()
        };
        if next.state().is_terminal() {
            next.ended_at = Some(now);
            info!(state = ?next.state(), "Game finished by move");
        }
        Ok(next)
    }

    /// Slot filled between `before` and `self`.
    pub fn placed_since(&self, before: &Game) -> Option<Slot> {
        self.board
            .slots()
            .iter()
            .zip(before.board.slots())
            .find(|(now, then)| now.state != then.state)
            .map(|(now, _)| *now)
    }

    /// True when the player to move has exceeded the move time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.state().is_terminal() && now - self.last_move_at > self.move_time
    }

    /// Time left for the current move; `None` once the game has ended.
    pub fn clock_remaining(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        if self.state().is_terminal() {
            return None;
        }
        let remaining = self.move_time - (now - self.last_move_at);
        Some(remaining.max(TimeDelta::zero()))
    }

    /// Forfeits the player to move if their clock has run out.
    ///
    /// Returns `Ok(None)` while the clock is still running.
    ///
    /// # Errors
    ///
    /// [`ArenaError::GameAlreadyEnded`] if the game is already terminal.
    #[instrument(skip(self), fields(game_id = self.id))]
    pub fn time_out(&self, now: DateTime<Utc>) -> Result<Option<Game>, ArenaError> {
        let GameState::Turn(loser) = self.state() else {
            return Err(ArenaError::GameAlreadyEnded);
        };
        if !self.is_expired(now) {
            return Ok(None);
        }
        info!(?loser, "Move clock expired");
        Ok(Some(self.forfeited(loser, now)))
    }

    /// Ends the game with `actor` forfeiting.
    ///
    /// # Errors
    ///
    /// [`ArenaError::GameAlreadyEnded`] or [`ArenaError::NotAParticipant`].
    #[instrument(skip(self), fields(game_id = self.id))]
    pub fn resign(&self, actor: &str, now: DateTime<Utc>) -> Result<Game, ArenaError> {
        if self.state().is_terminal() {
            return Err(ArenaError::GameAlreadyEnded);
        }
        let color = self.color_of(actor).ok_or(ArenaError::NotAParticipant)?;
        info!(actor, ?color, "Player resigned");
        Ok(self.forfeited(color, now))
    }

    fn forfeited(&self, loser: Color, now: DateTime<Utc>) -> Game {
        Game {
            forfeited_by: Some(loser),
            ended_at: Some(now),
            ..self.clone()
        }
    }

    /// Authoritative state handed to the presentation collaborator.
    #[instrument(skip(self), fields(game_id = self.id))]
    pub fn view(&self, now: DateTime<Utc>) -> GameView {
        let state = self.state();
        let to_move = match state {
            GameState::Turn(color) => Some(self.player(color).to_string()),
            _ => None,
        };
        GameView {
            game_id: self.id,
            challenger: self.challenger.clone(),
            opponent: self.opponent.clone(),
            challenger_color: self.challenger_color,
            board: self.board.clone(),
            state,
            to_move,
            clock_remaining_secs: self.clock_remaining(now).map(|d| d.num_seconds()),
            wager: self.wager,
            winner: self.winner_id().map(str::to_string),
            winning_line: match state {
                GameState::Won(_) => self.board.verdict().winning_line.clone(),
                _ => None,
            },
        }
    }
}

/// Data needed to render a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameView {
    /// Game id.
    pub game_id: GameId,
    /// Challenger id.
    pub challenger: UserId,
    /// Opponent id.
    pub opponent: UserId,
    /// Challenger's color.
    pub challenger_color: Color,
    /// Board snapshot.
    pub board: Board,
    /// Game state.
    pub state: GameState,
    /// Player to move, while active.
    pub to_move: Option<UserId>,
    /// Seconds left on the move clock, while active.
    pub clock_remaining_secs: Option<i64>,
    /// Stake per side.
    pub wager: Option<i64>,
    /// Winning player, if decided.
    pub winner: Option<UserId>,
    /// Winning line, for wins on the board.
    pub winning_line: Option<Vec<Slot>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    fn game() -> Game {
        Game {
            id: 7,
            invitation_id: 3,
            guild_id: "guild".into(),
            channel_id: "channel".into(),
            challenger: "alice".into(),
            opponent: "bob".into(),
            challenger_color: Color::Yellow,
            wager: Some(2_000),
            move_time: TimeDelta::seconds(60),
            board: Board::new(Color::Yellow),
            forfeited_by: None,
            last_move_at: start(),
            ended_at: None,
            created_at: start(),
        }
    }

    #[test]
    fn test_challenger_color_moves_first() {
        let g = game();
        assert_eq!(g.state(), GameState::Turn(Color::Yellow));
        assert_eq!(g.color_of("alice"), Some(Color::Yellow));
        assert_eq!(g.color_of("bob"), Some(Color::Red));
        assert_eq!(g.color_of("carol"), None);
    }

    #[test]
    fn test_move_updates_clock_and_turn() {
        let now = start() + TimeDelta::seconds(20);
        let next = game().submit_move("alice", 3, now).expect("Legal move");
        assert_eq!(next.state(), GameState::Turn(Color::Red));
        assert_eq!(next.last_move_at, now);
        assert_eq!(next.move_count(), 1);
        assert_eq!(next.placed_since(&game()), Some(Slot::occupied(3, 5, Color::Yellow)));
    }

    #[test]
    fn test_out_of_turn_rejected() {
        assert_eq!(
            game().submit_move("bob", 0, start()),
            Err(ArenaError::NotYourTurn(Color::Yellow))
        );
        assert_eq!(
            game().submit_move("carol", 0, start()),
            Err(ArenaError::NotAParticipant)
        );
    }

    #[test]
    fn test_bad_column_propagates() {
        assert_eq!(
            game().submit_move("alice", 9, start()),
            Err(ArenaError::ColumnOutOfRange {
                column: 9,
                width: 7
            })
        );
    }

    #[test]
    fn test_winning_move_ends_game() {
        let mut g = game();
        for column in 0..3 {
            g = g.submit_move("alice", column, start()).expect("Legal");
            g = g.submit_move("bob", 6, start()).expect("Legal");
        }
        let done = start() + TimeDelta::seconds(5);
        g = g.submit_move("alice", 3, done).expect("Winning move");
        assert_eq!(g.state(), GameState::Won(Color::Yellow));
        assert_eq!(g.ended_at, Some(done));
        assert_eq!(g.winner_id(), Some("alice"));
        assert_eq!(g.submit_move("bob", 0, done), Err(ArenaError::GameAlreadyEnded));
        assert!(g.check_consistency().is_ok());
    }

    #[test]
    fn test_clock_expiry_is_strict() {
        let g = game();
        assert_eq!(g.time_out(start() + TimeDelta::seconds(60)), Ok(None));
        let late = start() + TimeDelta::seconds(61);
        let forfeited = g.time_out(late).expect("Active").expect("Expired");
        assert_eq!(forfeited.state(), GameState::Forfeited { winner: Color::Red });
        assert_eq!(forfeited.winner_id(), Some("bob"));
        assert_eq!(forfeited.ended_at, Some(late));
        assert_eq!(
            forfeited.time_out(late + TimeDelta::seconds(100)),
            Err(ArenaError::GameAlreadyEnded)
        );
    }

    #[test]
    fn test_clock_remaining() {
        let g = game();
        assert_eq!(
            g.clock_remaining(start() + TimeDelta::seconds(45)),
            Some(TimeDelta::seconds(15))
        );
        assert_eq!(
            g.clock_remaining(start() + TimeDelta::seconds(90)),
            Some(TimeDelta::zero())
        );
    }

    #[test]
    fn test_resign() {
        let resigned = game().resign("bob", start()).expect("Active game");
        assert_eq!(
            resigned.state(),
            GameState::Forfeited {
                winner: Color::Yellow
            }
        );
        assert_eq!(resigned.resign("alice", start()), Err(ArenaError::GameAlreadyEnded));
        assert_eq!(game().resign("carol", start()), Err(ArenaError::NotAParticipant));
    }

    #[test]
    fn test_state_db_strings() {
        for state in [
            GameState::Turn(Color::Red),
            GameState::Won(Color::Yellow),
            GameState::Draw,
            GameState::Forfeited { winner: Color::Red },
        ] {
            assert_eq!(GameState::from_db_string(&state.to_db_string()), Ok(state));
        }
        assert!(GameState::from_db_string("won:green").is_err());
        assert!(GameState::from_db_string("paused").is_err());
    }

    #[test]
    fn test_view_reports_authoritative_state() {
        let view = game().view(start() + TimeDelta::seconds(10));
        assert_eq!(view.to_move.as_deref(), Some("alice"));
        assert_eq!(view.clock_remaining_secs, Some(50));
        assert_eq!(view.wager, Some(2_000));
        assert_eq!(view.winner, None);
    }
}
