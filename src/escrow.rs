//! Escrow ledger effects.
//!
//! Each function returns the wallet deltas a transition causes. Amounts are
//! signed from the wallet's point of view: a hold is negative, a refund or
//! payout positive. The caller records the entries under the invitation that
//! started the lineage; once a lineage is closed its entries sum to zero.

use strictly_connect4::Color;
use tracing::{debug, instrument};

use crate::error::ArenaError;
use crate::game::{Game, GameState};
use crate::invitation::Invitation;
use crate::participant::UserId;

/// Why a ledger entry exists.
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
pub enum LedgerKind {
    /// Stake moved into escrow.
    Hold,
    /// Stake returned from a voided invitation or a draw.
    Refund,
    /// Pot paid to the winner.
    Settle,
}

/// A single wallet delta.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct LedgerEntry {
    /// Wallet owner.
    pub user_id: UserId,
    /// Signed change to the wallet balance.
    pub amount: i64,
    /// Reason for the change.
    pub kind: LedgerKind,
}

/// Challenger's stake, held when the invitation is created.
pub fn hold(invitation: &Invitation) -> Vec<LedgerEntry> {
    invitation
        .wager
        .map(|w| LedgerEntry::new(invitation.challenger.clone(), -w, LedgerKind::Hold))
        .into_iter()
        .collect()
}

/// Opponent's stake, held when the invitation is accepted.
pub fn opponent_hold(invitation: &Invitation) -> Vec<LedgerEntry> {
    invitation
        .wager
        .map(|w| LedgerEntry::new(invitation.opponent.clone(), -w, LedgerKind::Hold))
        .into_iter()
        .collect()
}

/// Challenger's stake returned when a pending invitation is voided.
pub fn refund(invitation: &Invitation) -> Vec<LedgerEntry> {
    invitation
        .wager
        .map(|w| LedgerEntry::new(invitation.challenger.clone(), w, LedgerKind::Refund))
        .into_iter()
        .collect()
}

/// Pays out a finished game.
///
/// A win or forfeit pays the winner both stakes; a draw returns each stake.
///
/// # Errors
///
/// Returns an integrity error if the game is still in play or the pot
/// overflows.
#[instrument(skip(game), fields(game_id = game.id))]
pub fn settle(game: &Game) -> Result<Vec<LedgerEntry>, ArenaError> {
    let Some(wager) = game.wager else {
        return Ok(Vec::new());
    };
    let entries = match game.state() {
        GameState::Turn(_) => {
            return Err(ArenaError::integrity(format!(
                "settle called on active game {}",
                game.id
            )));
        }
        GameState::Won(color) | GameState::Forfeited { winner: color } => {
            let pot = wager
                .checked_mul(2)
                .ok_or_else(|| ArenaError::integrity(format!("pot overflow for wager {}", wager)))?;
            vec![LedgerEntry::new(
                game.player(color).to_string(),
                pot,
                LedgerKind::Settle,
            )]
        }
        GameState::Draw => [Color::Red, Color::Yellow]
            .into_iter()
            .map(|c| LedgerEntry::new(game.player(c).to_string(), wager, LedgerKind::Refund))
            .collect(),
    };
    debug!(?entries, "Settlement computed");
    Ok(entries)
}

/// Sum of the amounts in `entries`.
pub fn net(entries: &[LedgerEntry]) -> i64 {
    entries.iter().map(|e| e.amount).sum()
}
