//! Draw detection for connect four.

use tracing::instrument;

use crate::board::Board;
use crate::types::SlotState;

/// Checks if the board is full (all slots occupied).
///
/// A full board with no winning line is a draw.
#[instrument(skip(board))]
pub fn is_full(board: &Board) -> bool {
    board.slots().iter().all(|s| s.state != SlotState::Empty)
}
