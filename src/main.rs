//! Strictly Arena - command-line front end
//!
//! Drives the arena service against a local SQLite database.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use strictly_arena::{ArenaConfig, ArenaService, ChallengeRequest, Participant, SubmitOutcome};
use tokio::sync::watch;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let service = ArenaService::open(config).context("Failed to open arena database")?;

    match cli.command {
        Command::Migrate => {
            info!(db = service.repository().db_path(), "Database is up to date");
            Ok(())
        }
        Command::Sweep => run_sweeper(service).await,
        Command::Deposit {
            guild,
            user,
            amount,
        } => {
            let balance = service.deposit(&user, &guild, amount)?;
            println!("{} now has {}", user, balance);
            Ok(())
        }
        Command::Balance { guild, user } => {
            println!("{}", service.balance(&user, &guild)?);
            Ok(())
        }
        Command::Challenge {
            guild,
            channel,
            challenger,
            opponent,
            opponent_is_bot,
            color,
            wager,
            move_time,
        } => {
            let opponent = if opponent_is_bot {
                Participant::bot(opponent)
            } else {
                Participant::human(opponent)
            };
            let request =
                ChallengeRequest::new(guild, channel, challenger, opponent, color, wager, move_time);
            let issued = service.challenge(&request)?;
            for old in &issued.superseded {
                println!("Invitation {} was replaced and refunded", old.id);
            }
            println!("Invitation {} sent to {}", issued.invitation.id, issued.invitation.opponent);
            Ok(())
        }
        Command::Accept {
            guild,
            invitation,
            user,
        } => print_json(&service.accept(&guild, invitation, &user)?),
        Command::Decline {
            guild,
            invitation,
            user,
        } => {
            let declined = service.decline(&guild, invitation, &user)?;
            println!("Invitation {} is {}", declined.id, declined.status);
            Ok(())
        }
        Command::Play {
            guild,
            game,
            user,
            column,
        } => {
            let column = column
                .checked_sub(1)
                .context("Columns are counted from 1")?;
            let outcome = service.submit_move(&guild, game, &user, column)?;
            if let SubmitOutcome::ClockExpired(_) = outcome {
                println!("Too late: the move clock had run out.");
            }
            print_json(outcome.view())
        }
        Command::Resign { guild, game, user } => print_json(&service.resign(&guild, game, &user)?),
        Command::Show { guild, game } => print_json(&service.game_view(&guild, game)?),
    }
}

#[instrument(skip(cli))]
fn load_config(cli: &Cli) -> Result<ArenaConfig> {
    let mut config = match &cli.config {
        Some(path) => ArenaConfig::from_file(path)?,
        None => ArenaConfig::default(),
    };
    if let Some(database) = &cli.database {
        config.set_database_path(database.clone());
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Runs the clock sweeper until Ctrl-C.
async fn run_sweeper(service: ArenaService) -> Result<()> {
    let period = std::time::Duration::from_secs(*service.config().sweep_interval_secs());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = strictly_arena::spawn_sweeper(service, period, shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    shutdown_tx.send(true).ok();
    handle.await.context("Sweeper task panicked")?;
    Ok(())
}
