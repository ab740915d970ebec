//! Win detection for connect four.
//!
//! Every occupied slot is scanned in row-major order (top row first, left
//! to right) and, from each, the four line directions in the order of
//! [`Direction::ALL`]. The first run of [`WIN_LENGTH`] or more same-colored
//! slots is reported whole. Because every direction points down or to the
//! right, the scan always reaches the start of a run before its interior.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::board::Board;
use crate::types::{BoardState, Color, Slot, SlotState, WIN_LENGTH};

/// A line direction, as a step in `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Left to right.
    Horizontal,
    /// Top to bottom.
    Vertical,
    /// Toward the bottom-right corner.
    DiagonalDownRight,
    /// Toward the bottom-left corner.
    DiagonalDownLeft,
}

impl Direction {
    /// Directions in scan order.
    pub const ALL: [Direction; 4] = [
        Direction::Horizontal,
        Direction::Vertical,
        Direction::DiagonalDownRight,
        Direction::DiagonalDownLeft,
    ];

    /// Step taken per cell.
    pub fn step(self) -> (isize, isize) {
        match self {
            Direction::Horizontal => (1, 0),
            Direction::Vertical => (0, 1),
            Direction::DiagonalDownRight => (1, 1),
            Direction::DiagonalDownLeft => (-1, 1),
        }
    }
}

/// Result of scanning a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Derived game state.
    pub state: BoardState,
    /// Winning slots in scan direction, present only for a win.
    pub winning_line: Option<Vec<Slot>>,
}

impl Verdict {
    /// A verdict with no winner where `color` moves.
    pub(crate) fn pending(color: Color) -> Self {
        Self {
            state: BoardState::Turn(color),
            winning_line: None,
        }
    }

    /// Winning color, if any.
    pub fn winner(&self) -> Option<Color> {
        match self.state {
            BoardState::Won(color) => Some(color),
            _ => None,
        }
    }
}

/// Collects the run of `color` starting at `(x, y)` in `direction`.
fn run_from(board: &Board, x: usize, y: usize, color: Color, direction: Direction) -> Vec<Slot> {
    let (dx, dy) = direction.step();
    let mut run = Vec::new();
    let (mut cx, mut cy) = (x as isize, y as isize);

    while cx >= 0 && cy >= 0 {
        match board.slot(cx as usize, cy as usize) {
            Some(slot) if slot.state == SlotState::Occupied(color) => run.push(slot),
            _ => break,
        }
        cx += dx;
        cy += dy;
    }
    run
}

/// Determines the state of `board` and the winning line, if any.
///
/// With no winning line, a full board is a draw; otherwise the color that
/// did not just move is to play. If the board holds winning lines for both
/// colors (impossible through legal play) the first found in scan order wins.
#[instrument(skip(board), fields(width = board.width(), height = board.height()))]
pub fn determine_winner(board: &Board) -> Verdict {
    for slot in board.slots() {
        let SlotState::Occupied(color) = slot.state else {
            continue;
        };
        for direction in Direction::ALL {
            let run = run_from(board, slot.x, slot.y, color, direction);
            if run.len() >= WIN_LENGTH {
                debug!(?color, ?direction, start = %slot, len = run.len(), "Winning line found");
                return Verdict {
                    state: BoardState::Won(color),
                    winning_line: Some(run),
                };
            }
        }
    }

    if super::draw::is_full(board) {
        return Verdict {
            state: BoardState::Draw,
            winning_line: None,
        };
    }

    Verdict::pending(next_to_move(board))
}

/// Color to play on a board without a winner.
fn next_to_move(board: &Board) -> Color {
    let first = board.first_turn();
    if board.count(first) > board.count(first.opponent()) {
        first.opponent()
    } else {
        first
    }
}
