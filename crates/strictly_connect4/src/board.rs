//! Board model with gravity-drop semantics.
//!
//! A [`Board`] is an immutable value: every operation returns a new board
//! and the derived [`BoardState`] is recomputed from the slots each time one
//! is built. The state is never accepted from outside.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::rules::win::{Verdict, determine_winner};
use crate::types::{
    BoardState, Color, DEFAULT_HEIGHT, DEFAULT_WIDTH, MAX_DIMENSION, Slot, SlotState,
};

/// Error raised by board operations.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum BoardError {
    /// Every cell in the column is occupied.
    #[display("Column {} is full", column + 1)]
    ColumnFull {
        /// Zero-based column index.
        column: usize,
    },

    /// Column index is past the right edge.
    #[display("Column {} does not exist (the board has {} columns)", column + 1, width)]
    ColumnOutOfRange {
        /// Zero-based column index.
        column: usize,
        /// Board width.
        width: usize,
    },

    /// A patch slot lies outside the grid.
    #[display("Slot {} is outside a {}x{} board", slot, width, height)]
    SlotOutOfRange {
        /// Offending slot.
        slot: Slot,
        /// Board width.
        width: usize,
        /// Board height.
        height: usize,
    },

    /// Two patch entries disagree about one cell.
    #[display("Patch sets ({}, {}) twice with different tokens", x, y)]
    ConflictingPatch {
        /// Column index.
        x: usize,
        /// Row index.
        y: usize,
    },

    /// Width or height is zero or above [`MAX_DIMENSION`].
    #[display("Board dimensions {}x{} are invalid", width, height)]
    InvalidDimensions {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },

    /// Serialized board cannot be reconstructed.
    #[display("Malformed board snapshot: {}", _0)]
    MalformedSnapshot(String),
}

impl std::error::Error for BoardError {}

/// Complete grid of slots plus the derived game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoardSnapshot", into = "BoardSnapshot")]
pub struct Board {
    width: usize,
    height: usize,
    first_turn: Color,
    /// Row-major, one entry per cell.
    slots: Vec<Slot>,
    verdict: Verdict,
}

impl Board {
    /// Creates an empty standard 7x6 board where `first_turn` moves first.
    #[instrument]
    pub fn new(first_turn: Color) -> Self {
        // Standard dimensions are non-zero.
        Self::empty(DEFAULT_WIDTH, DEFAULT_HEIGHT, first_turn)
    }

    /// Creates an empty board of the given size.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::InvalidDimensions`] if either dimension is zero
    /// or larger than [`MAX_DIMENSION`].
    #[instrument]
    pub fn with_dimensions(
        width: usize,
        height: usize,
        first_turn: Color,
    ) -> Result<Self, BoardError> {
        if !(1..=MAX_DIMENSION).contains(&width) || !(1..=MAX_DIMENSION).contains(&height) {
            return Err(BoardError::InvalidDimensions { width, height });
        }
        Ok(Self::empty(width, height, first_turn))
    }

    fn empty(width: usize, height: usize, first_turn: Color) -> Self {
        let slots = (0..height)
            .flat_map(|y| (0..width).map(move |x| Slot::new(x, y, SlotState::Empty)))
            .collect();
        Self::from_parts(width, height, first_turn, slots)
    }

    /// Builds a board and derives its state.
    fn from_parts(width: usize, height: usize, first_turn: Color, slots: Vec<Slot>) -> Self {
        let mut board = Self {
            width,
            height,
            first_turn,
            slots,
            verdict: Verdict::pending(first_turn),
        };
        board.verdict = determine_winner(&board);
        board
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Color that moves on an empty board.
    pub fn first_turn(&self) -> Color {
        self.first_turn
    }

    /// All slots in row-major order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Returns the slot at `(x, y)`, if inside the grid.
    pub fn slot(&self, x: usize, y: usize) -> Option<Slot> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.slots.get(y * self.width + x).copied()
    }

    /// Contents of `(x, y)`; cells outside the grid read as empty.
    pub fn get(&self, x: usize, y: usize) -> SlotState {
        self.slot(x, y).map(|s| s.state).unwrap_or_default()
    }

    /// Current game state, derived from the slots.
    pub fn state(&self) -> BoardState {
        self.verdict.state
    }

    /// Current state plus the winning line, if any.
    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    /// Number of occupied cells.
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state != SlotState::Empty)
            .count()
    }

    /// Number of tokens of `color`.
    pub fn count(&self, color: Color) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Occupied(color))
            .count()
    }

    /// Checks whether every cell is occupied.
    pub fn is_full(&self) -> bool {
        crate::rules::draw::is_full(self)
    }

    /// Row a token dropped into `column` would land on.
    ///
    /// Returns `None` for a full or nonexistent column.
    #[instrument(skip(self))]
    pub fn landing_row(&self, column: usize) -> Option<usize> {
        if column >= self.width {
            return None;
        }
        (0..self.height)
            .rev()
            .find(|&y| self.get(column, y) == SlotState::Empty)
    }

    /// Drops a `color` token into `column`, returning the resulting board.
    ///
    /// The token lands on the lowest empty cell. `self` is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::ColumnOutOfRange`] for a column past the edge
    /// and [`BoardError::ColumnFull`] when the column has no empty cell.
    #[instrument(skip(self), fields(width = self.width, height = self.height))]
    pub fn drop_token(&self, column: usize, color: Color) -> Result<Board, BoardError> {
        if column >= self.width {
            warn!(column, "Column out of range");
            return Err(BoardError::ColumnOutOfRange {
                column,
                width: self.width,
            });
        }

        let y = self.landing_row(column).ok_or_else(|| {
            warn!(column, "Column is full");
            BoardError::ColumnFull { column }
        })?;

        let mut slots = self.slots.clone();
        slots[y * self.width + column].state = SlotState::Occupied(color);
        let board = Self::from_parts(self.width, self.height, self.first_turn, slots);

        debug!(column, y, ?color, state = ?board.state(), "Token dropped");
        Ok(board)
    }

    /// Overlays `patch` onto this board.
    ///
    /// The overlay ignores gravity and ordering: applying the same patch in
    /// any order yields the same board. Used to build fixtures and replays.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::SlotOutOfRange`] for cells outside the grid and
    /// [`BoardError::ConflictingPatch`] when a cell is given two different
    /// states.
    #[instrument(skip(self, patch), fields(patch_len = patch.len()))]
    pub fn merge_slots(&self, patch: &[Slot]) -> Result<Board, BoardError> {
        let mut slots = self.slots.clone();
        let mut touched = vec![None; slots.len()];

        for slot in patch {
            if slot.x >= self.width || slot.y >= self.height {
                return Err(BoardError::SlotOutOfRange {
                    slot: *slot,
                    width: self.width,
                    height: self.height,
                });
            }
            let idx = slot.y * self.width + slot.x;
            match touched[idx] {
                Some(previous) if previous != slot.state => {
                    return Err(BoardError::ConflictingPatch {
                        x: slot.x,
                        y: slot.y,
                    });
                }
                _ => touched[idx] = Some(slot.state),
            }
            slots[idx].state = slot.state;
        }

        Ok(Self::from_parts(
            self.width,
            self.height,
            self.first_turn,
            slots,
        ))
    }
}

/// Serialized form of a [`Board`]: an ordered list of slot records.
///
/// `game_state` is written for readers of the stored snapshot and checked
/// against the recomputed state when read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Color that moves on an empty board.
    pub first_turn: Color,
    /// State derived when the snapshot was taken.
    pub game_state: BoardState,
    /// Row-major slots.
    pub slots: Vec<Slot>,
}

impl From<Board> for BoardSnapshot {
    fn from(board: Board) -> Self {
        Self {
            width: board.width,
            height: board.height,
            first_turn: board.first_turn,
            game_state: board.verdict.state,
            slots: board.slots,
        }
    }
}

impl TryFrom<BoardSnapshot> for Board {
    type Error = BoardError;

    #[instrument(skip(snapshot), fields(width = snapshot.width, height = snapshot.height))]
    fn try_from(snapshot: BoardSnapshot) -> Result<Self, Self::Error> {
        let BoardSnapshot {
            width,
            height,
            first_turn,
            game_state,
            slots,
        } = snapshot;

        let base = Board::with_dimensions(width, height, first_turn)?;
        if slots.len() != width * height {
            return Err(BoardError::MalformedSnapshot(format!(
                "expected {} slots, found {}",
                width * height,
                slots.len()
            )));
        }

        let mut seen = vec![false; slots.len()];
        for slot in &slots {
            if slot.x >= width || slot.y >= height {
                return Err(BoardError::MalformedSnapshot(format!(
                    "slot {} is outside the grid",
                    slot
                )));
            }
            let idx = slot.y * width + slot.x;
            if std::mem::replace(&mut seen[idx], true) {
                return Err(BoardError::MalformedSnapshot(format!(
                    "slot {} appears twice",
                    slot
                )));
            }
        }

        let board = base.merge_slots(&slots)?;
        if board.state() != game_state {
            warn!(recorded = ?game_state, derived = ?board.state(), "Snapshot state desynced");
            return Err(BoardError::MalformedSnapshot(format!(
                "recorded state {:?} does not match derived state {:?}",
                game_state,
                board.state()
            )));
        }
        Ok(board)
    }
}

impl Board {
    /// Serializes the board to its JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::MalformedSnapshot`] if encoding fails.
    #[instrument(skip(self))]
    pub fn to_json(&self) -> Result<String, BoardError> {
        serde_json::to_string(self).map_err(|e| BoardError::MalformedSnapshot(e.to_string()))
    }

    /// Rebuilds a board from its JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::MalformedSnapshot`] if the text is not a
    /// complete, self-consistent snapshot.
    #[instrument(skip(json))]
    pub fn from_json(json: &str) -> Result<Self, BoardError> {
        serde_json::from_str(json).map_err(|e| BoardError::MalformedSnapshot(e.to_string()))
    }
}
