//! Wallet balance operations.
//!
//! All functions run on a caller-supplied connection so they join the
//! caller's transaction; none of them commit on their own.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use tracing::{debug, instrument, warn};

use crate::db::models::NewLedgerRow;
use crate::db::schema::{ledger_entries, wallets};
use crate::error::ArenaError;
use crate::escrow::LedgerEntry;

/// Current balance. A user without a wallet row has zero.
#[instrument(skip(conn))]
pub fn balance(
    conn: &mut SqliteConnection,
    user_id: &str,
    guild_id: &str,
) -> Result<i64, diesel::result::Error> {
    let balance = wallets::table
        .filter(wallets::user_id.eq(user_id))
        .filter(wallets::guild_id.eq(guild_id))
        .select(wallets::balance)
        .first::<i64>(conn)
        .optional()?;
    Ok(balance.unwrap_or(0))
}

/// Adds `amount` to a wallet, creating it if needed.
#[instrument(skip(conn))]
pub fn credit(
    conn: &mut SqliteConnection,
    user_id: &str,
    guild_id: &str,
    amount: i64,
) -> Result<(), diesel::result::Error> {
    diesel::insert_into(wallets::table)
        .values((
            wallets::user_id.eq(user_id),
            wallets::guild_id.eq(guild_id),
            wallets::balance.eq(amount),
        ))
        .on_conflict((wallets::user_id, wallets::guild_id))
        .do_update()
        .set(wallets::balance.eq(wallets::balance + amount))
        .execute(conn)?;
    debug!("Wallet credited");
    Ok(())
}

/// Removes `amount` from a wallet if the balance covers it.
///
/// # Errors
///
/// [`ArenaError::InsufficientFunds`] when the balance is too small; the
/// wallet is left unchanged.
#[instrument(skip(conn))]
pub fn debit(
    conn: &mut SqliteConnection,
    user_id: &str,
    guild_id: &str,
    amount: i64,
) -> Result<(), ArenaError> {
    let updated = diesel::update(
        wallets::table
            .filter(wallets::user_id.eq(user_id))
            .filter(wallets::guild_id.eq(guild_id))
            .filter(wallets::balance.ge(amount)),
    )
    .set(wallets::balance.eq(wallets::balance - amount))
    .execute(conn)?;

    if updated == 0 {
        let balance = balance(conn, user_id, guild_id)?;
        warn!(balance, required = amount, "Insufficient funds");
        return Err(ArenaError::InsufficientFunds {
            balance,
            required: amount,
        });
    }
    debug!("Wallet debited");
    Ok(())
}

/// Location of a ledger entry within its lineage.
#[derive(Debug, Clone, Copy)]
pub struct Lineage<'a> {
    /// Guild the wallets belong to.
    pub guild_id: &'a str,
    /// Invitation the stakes originate from.
    pub invitation_id: i32,
    /// Game, once one exists.
    pub game_id: Option<i32>,
}

/// Applies each entry to its wallet and records it in the ledger.
#[instrument(skip(conn, entries), fields(invitation_id = lineage.invitation_id, count = entries.len()))]
pub fn apply(
    conn: &mut SqliteConnection,
    lineage: Lineage<'_>,
    entries: &[LedgerEntry],
    now: NaiveDateTime,
) -> Result<(), ArenaError> {
    for entry in entries {
        if entry.amount < 0 {
            debit(conn, &entry.user_id, lineage.guild_id, -entry.amount)?;
        } else {
            credit(conn, &entry.user_id, lineage.guild_id, entry.amount)?;
        }
        diesel::insert_into(ledger_entries::table)
            .values(NewLedgerRow::new(
                lineage.guild_id.to_string(),
                entry.user_id.clone(),
                entry.amount,
                entry.kind.to_string(),
                lineage.invitation_id,
                lineage.game_id,
                now,
            ))
            .execute(conn)?;
    }
    Ok(())
}
