//! Background sweeper behavior.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use strictly_arena::{
    ArenaConfig, ArenaRepository, ArenaService, ChallengeRequest, GameState, ManualClock,
    Participant, spawn_sweeper, sweep_once,
};
use strictly_connect4::Color;
use tempfile::NamedTempFile;
use tokio::sync::watch;

const GUILD: &str = "guild-sweep";

fn setup() -> (NamedTempFile, ArenaService, ManualClock) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let repo = ArenaRepository::new(db_path.clone()).expect("Failed to create repository");
    repo.run_migrations().expect("Migrations failed");
    let clock = ManualClock::new(
        DateTime::<Utc>::from_timestamp(1_760_000_000, 0).expect("Valid timestamp"),
    );
    let service = ArenaService::with_clock(
        ArenaConfig::with_database(&db_path),
        repo,
        Arc::new(clock.clone()),
    );
    (db_file, service, clock)
}

fn start_game(service: &ArenaService) -> i32 {
    let request = ChallengeRequest::new(
        GUILD.into(),
        "arena".into(),
        "alice".into(),
        Participant::human("bob"),
        Color::Yellow,
        None,
        30,
    );
    let id = service.challenge(&request).expect("Challenge").invitation.id;
    service.accept(GUILD, id, "bob").expect("Accepted").game_id
}

#[tokio::test]
async fn test_sweep_once_leaves_running_clocks_alone() {
    let (_db, service, clock) = setup();
    let game_id = start_game(&service);

    clock.advance(TimeDelta::seconds(30));
    let report = sweep_once(service.clone()).await.expect("Sweep");
    assert!(report.is_empty());

    clock.advance(TimeDelta::seconds(1));
    let report = sweep_once(service.clone()).await.expect("Sweep");
    assert_eq!(report.forfeited.len(), 1);
    let view = service.game_view(GUILD, game_id).expect("View");
    assert_eq!(view.state, GameState::Forfeited { winner: Color::Red });
    assert_eq!(view.clock_remaining_secs, None);
}

#[tokio::test]
async fn test_background_sweeper_forfeits_and_stops() {
    let (_db, service, clock) = setup();
    let game_id = start_game(&service);
    clock.advance(TimeDelta::seconds(45));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_sweeper(service.clone(), Duration::from_millis(10), shutdown_rx);

    let mut forfeited = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let game = service
            .repository()
            .load_game(GUILD, game_id)
            .expect("Game");
        if game.state() != GameState::Turn(Color::Yellow) {
            forfeited = true;
            break;
        }
    }
    assert!(forfeited, "Sweeper never forfeited the expired game");

    shutdown_tx.send(true).expect("Sweeper listening");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Sweeper stopped")
        .expect("Sweeper task did not panic");
}

#[tokio::test]
async fn test_zero_period_sweeper_keeps_running() {
    let (_db, service, clock) = setup();
    let game_id = start_game(&service);
    clock.advance(TimeDelta::seconds(31));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_sweeper(service.clone(), Duration::ZERO, shutdown_rx);

    let mut forfeited = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let game = service
            .repository()
            .load_game(GUILD, game_id)
            .expect("Game");
        if !game.is_active() {
            forfeited = true;
            break;
        }
    }
    assert!(forfeited, "Sweeper never forfeited the expired game");
    assert!(!handle.is_finished(), "Sweeper died on a zero period");

    shutdown_tx.send(true).expect("Sweeper listening");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Sweeper stopped")
        .expect("Sweeper task did not panic");
}
