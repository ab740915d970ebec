//! Pure connect-four game logic.
//!
//! This crate holds the board model and the win detector. It performs no
//! I/O: boards are immutable values and every query is a pure function of
//! the slots.
//!
//! # Example
//!
//! ```
//! use strictly_connect4::{Board, BoardState, Color};
//!
//! let board = Board::new(Color::Red)
//!     .drop_token(3, Color::Red)
//!     .expect("empty column");
//! assert_eq!(board.state(), BoardState::Turn(Color::Yellow));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod board;
pub mod rules;
mod types;

pub use board::{Board, BoardError, BoardSnapshot};
pub use rules::{Direction, Verdict, determine_winner};
pub use types::{
    BoardState, Color, DEFAULT_HEIGHT, DEFAULT_WIDTH, MAX_DIMENSION, Slot, SlotState, WIN_LENGTH,
};
