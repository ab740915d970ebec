//! Core domain types for connect four.

use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Number of same-colored tokens in a line needed to win.
pub const WIN_LENGTH: usize = 4;

/// Standard board width (columns).
pub const DEFAULT_WIDTH: usize = 7;

/// Standard board height (rows).
pub const DEFAULT_HEIGHT: usize = 6;

/// Largest accepted board width or height.
pub const MAX_DIMENSION: usize = 64;

/// Token color owned by one of the two players.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    /// Red tokens.
    Red,
    /// Yellow tokens.
    Yellow,
}

impl Color {
    /// Returns the other color.
    #[instrument]
    pub fn opponent(self) -> Self {
        match self {
            Color::Red => Color::Yellow,
            Color::Yellow => Color::Red,
        }
    }
}

/// Contents of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    /// No token.
    #[default]
    Empty,
    /// Token of the given color.
    Occupied(Color),
}

impl SlotState {
    /// Returns the owning color, if any.
    pub fn color(self) -> Option<Color> {
        match self {
            SlotState::Empty => None,
            SlotState::Occupied(color) => Some(color),
        }
    }
}

/// One addressable cell of the board.
///
/// `y = 0` is the top row; tokens fall toward `y = height - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[display("({}, {})", x, y)]
pub struct Slot {
    /// Column index.
    pub x: usize,
    /// Row index, top to bottom.
    pub y: usize,
    /// Cell contents.
    pub state: SlotState,
}

impl Slot {
    /// Creates a slot.
    pub fn new(x: usize, y: usize, state: SlotState) -> Self {
        Self { x, y, state }
    }

    /// Creates a slot occupied by `color`.
    pub fn occupied(x: usize, y: usize, color: Color) -> Self {
        Self::new(x, y, SlotState::Occupied(color))
    }
}

/// Board status derived from the slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "color", rename_all = "snake_case")]
pub enum BoardState {
    /// The given color moves next.
    Turn(Color),
    /// The given color has a winning line.
    Won(Color),
    /// Board is full with no winning line.
    Draw,
}

impl BoardState {
    /// True once the board admits no further moves.
    pub fn is_terminal(self) -> bool {
        !matches!(self, BoardState::Turn(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_opponent_flips() {
        assert_eq!(Color::Red.opponent(), Color::Yellow);
        assert_eq!(Color::Yellow.opponent(), Color::Red);
    }

    #[test]
    fn test_color_text_form() {
        assert_eq!(Color::Red.as_ref(), "red");
        assert_eq!(Color::from_str("yellow").unwrap(), Color::Yellow);
        assert!(Color::from_str("blue").is_err());
    }

    #[test]
    fn test_turn_is_not_terminal() {
        assert!(!BoardState::Turn(Color::Red).is_terminal());
        assert!(BoardState::Won(Color::Red).is_terminal());
        assert!(BoardState::Draw.is_terminal());
    }
}
