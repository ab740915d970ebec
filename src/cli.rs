//! Command-line interface for strictly_arena.

use clap::{Parser, Subcommand};
use strictly_connect4::Color;

/// Strictly Arena - wagered Connect Four for chat guilds
#[derive(Parser, Debug)]
#[command(name = "strictly_arena")]
#[command(about = "Connect Four games with escrowed wagers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "STRICTLY_ARENA_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// Database path, overriding the config file
    #[arg(long, env = "STRICTLY_ARENA_DB")]
    pub database: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or upgrade the database schema
    Migrate,

    /// Run the clock sweeper until interrupted
    Sweep,

    /// Credit a wallet
    Deposit {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// User id
        #[arg(long)]
        user: String,
        /// Amount to credit
        amount: i64,
    },

    /// Show a wallet balance
    Balance {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// User id
        #[arg(long)]
        user: String,
    },

    /// Challenge another user
    Challenge {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// Channel the game will be played in
        #[arg(long)]
        channel: String,
        /// Challenging user
        #[arg(long)]
        challenger: String,
        /// Challenged user
        #[arg(long)]
        opponent: String,
        /// Treat the opponent as a bot account
        #[arg(long)]
        opponent_is_bot: bool,
        /// Challenger's color (red or yellow)
        #[arg(long, default_value = "red")]
        color: Color,
        /// Stake per side
        #[arg(long)]
        wager: Option<i64>,
        /// Seconds per move
        #[arg(long, default_value = "60")]
        move_time: i64,
    },

    /// Accept an invitation
    Accept {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// Invitation id
        invitation: i32,
        /// Accepting user
        #[arg(long)]
        user: String,
    },

    /// Decline or withdraw an invitation
    Decline {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// Invitation id
        invitation: i32,
        /// Declining user
        #[arg(long)]
        user: String,
    },

    /// Drop a token
    Play {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// Game id
        game: i32,
        /// Moving user
        #[arg(long)]
        user: String,
        /// Column, counted from 1
        column: usize,
    },

    /// Forfeit a game
    Resign {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// Game id
        game: i32,
        /// Resigning user
        #[arg(long)]
        user: String,
    },

    /// Print the current state of a game as JSON
    Show {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// Game id
        game: i32,
    },
}
