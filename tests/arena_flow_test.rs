//! End-to-end challenge, play, and settlement flows.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use strictly_arena::{
    ArenaConfig, ArenaError, ArenaRepository, ArenaService, ChallengeRequest, GameState,
    Interaction, InteractionOutcome, InvitationStatus, ManualClock, Participant, SubmitOutcome,
    WagerProblem,
};
use strictly_connect4::{Color, Slot};
use tempfile::NamedTempFile;

const GUILD: &str = "guild-1";
const CHANNEL: &str = "channel-1";

fn start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_760_000_000, 0).expect("Valid timestamp")
}

/// Creates a migrated temporary database and a service on a manual clock.
/// The file handle must stay in scope to keep the database alive.
fn setup() -> (NamedTempFile, ArenaService, ManualClock) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let repo = ArenaRepository::new(db_path.clone()).expect("Failed to create repository");
    repo.run_migrations().expect("Migrations failed");
    let clock = ManualClock::new(start());
    let service = ArenaService::with_clock(
        ArenaConfig::with_database(&db_path),
        repo,
        Arc::new(clock.clone()),
    );
    (db_file, service, clock)
}

fn request(challenger: &str, opponent: &str, wager: Option<i64>) -> ChallengeRequest {
    ChallengeRequest::new(
        GUILD.into(),
        CHANNEL.into(),
        challenger.into(),
        Participant::human(opponent),
        Color::Red,
        wager,
        60,
    )
}

fn play(service: &ArenaService, game_id: i32, actor: &str, column: usize) -> SubmitOutcome {
    service
        .submit_move(GUILD, game_id, actor, column)
        .expect("Legal move")
}

#[test]
fn test_straightforward_win_pays_winner() {
    let (_db, service, _clock) = setup();
    service.deposit("alice", GUILD, 5_000).expect("Deposit");
    service.deposit("bob", GUILD, 5_000).expect("Deposit");

    let issued = service
        .challenge(&request("alice", "bob", Some(1_000)))
        .expect("Challenge issued");
    assert_eq!(service.balance("alice", GUILD).expect("Balance"), 4_000);

    let view = service
        .accept(GUILD, issued.invitation.id, "bob")
        .expect("Accepted");
    assert_eq!(service.balance("bob", GUILD).expect("Balance"), 4_000);
    assert_eq!(view.state, GameState::Turn(Color::Red));
    assert_eq!(view.to_move.as_deref(), Some("alice"));

    let game_id = view.game_id;
    for column in 0..3 {
        play(&service, game_id, "alice", column);
        play(&service, game_id, "bob", 6);
    }
    let outcome = play(&service, game_id, "alice", 3);

    let view = outcome.view();
    assert_eq!(view.state, GameState::Won(Color::Red));
    assert_eq!(
        view.winning_line,
        Some((0..4).map(|x| Slot::occupied(x, 5, Color::Red)).collect())
    );
    assert_eq!(view.winner.as_deref(), Some("alice"));
    assert_eq!(service.balance("alice", GUILD).expect("Balance"), 6_000);
    assert_eq!(service.balance("bob", GUILD).expect("Balance"), 4_000);
    assert_eq!(service.repository().escrowed(GUILD).expect("Escrow"), 0);
}

#[test]
fn test_move_reports_landing_slot() {
    let (_db, service, _clock) = setup();
    let issued = service
        .challenge(&request("alice", "bob", None))
        .expect("Challenge issued");
    let view = service
        .accept(GUILD, issued.invitation.id, "bob")
        .expect("Accepted");

    play(&service, view.game_id, "alice", 2);
    match play(&service, view.game_id, "bob", 2) {
        SubmitOutcome::Played { placed, .. } => {
            assert_eq!(placed, Some(Slot::occupied(2, 4, Color::Yellow)));
        }
        other => panic!("Expected a played move, got {:?}", other),
    }
}

#[test]
fn test_move_guards_leave_game_unchanged() {
    let (_db, service, _clock) = setup();
    let issued = service
        .challenge(&request("alice", "bob", None))
        .expect("Challenge issued");
    let game_id = service
        .accept(GUILD, issued.invitation.id, "bob")
        .expect("Accepted")
        .game_id;

    assert_eq!(
        service.submit_move(GUILD, game_id, "bob", 0),
        Err(ArenaError::NotYourTurn(Color::Red))
    );
    assert_eq!(
        service.submit_move(GUILD, game_id, "carol", 0),
        Err(ArenaError::NotAParticipant)
    );
    assert_eq!(
        service.submit_move(GUILD, game_id, "alice", 7),
        Err(ArenaError::ColumnOutOfRange {
            column: 7,
            width: 7
        })
    );
    assert_eq!(
        service.submit_move("other-guild", game_id, "alice", 0),
        Err(ArenaError::GameNotFound(game_id))
    );

    for _ in 0..3 {
        play(&service, game_id, "alice", 0);
        play(&service, game_id, "bob", 0);
    }
    assert_eq!(
        service.submit_move(GUILD, game_id, "alice", 0),
        Err(ArenaError::ColumnFull { column: 0 })
    );

    let view = service.game_view(GUILD, game_id).expect("View");
    assert_eq!(view.board.occupied(), 6);
    assert_eq!(view.state, GameState::Turn(Color::Red));
}

#[test]
fn test_challenge_validation() {
    let (_db, service, _clock) = setup();
    service.deposit("alice", GUILD, 1_500).expect("Deposit");

    assert_eq!(
        service.challenge(&request("alice", "alice", None)),
        Err(ArenaError::SelfChallenge)
    );

    let mut to_bot = request("alice", "bot", None);
    to_bot.opponent = Participant::bot("bot");
    assert_eq!(service.challenge(&to_bot), Err(ArenaError::BotChallenge));

    assert_eq!(
        service.challenge(&request("alice", "bob", Some(500))),
        Err(ArenaError::InvalidWager(WagerProblem::BelowMinimum {
            minimum: 1_000
        }))
    );
    assert_eq!(
        service.challenge(&request("alice", "bob", Some(2_000))),
        Err(ArenaError::InvalidWager(WagerProblem::ExceedsBalance {
            balance: 1_500
        }))
    );

    let mut bad_clock = request("alice", "bob", None);
    bad_clock.move_time_secs = 7;
    assert_eq!(service.challenge(&bad_clock), Err(ArenaError::InvalidClock(7)));

    assert_eq!(service.balance("alice", GUILD).expect("Balance"), 1_500);
    assert_eq!(
        service
            .repository()
            .pending_invitation(GUILD, "alice")
            .expect("Query"),
        None
    );
}

#[test]
fn test_invitation_guards_and_reentrancy() {
    let (_db, service, _clock) = setup();
    service.deposit("alice", GUILD, 3_000).expect("Deposit");
    service.deposit("bob", GUILD, 3_000).expect("Deposit");
    let id = service
        .challenge(&request("alice", "bob", Some(1_000)))
        .expect("Challenge issued")
        .invitation
        .id;

    assert_eq!(service.accept(GUILD, id, "alice"), Err(ArenaError::SelfAccept));
    assert_eq!(
        service.accept(GUILD, id, "carol"),
        Err(ArenaError::NotYourInvitation)
    );
    assert_eq!(
        service.decline(GUILD, id, "carol"),
        Err(ArenaError::NotYourInvitation)
    );

    service.accept(GUILD, id, "bob").expect("Accepted");
    assert_eq!(
        service.accept(GUILD, id, "bob"),
        Err(ArenaError::InvitationAlreadyResolved(
            InvitationStatus::Consumed
        ))
    );
    assert_eq!(
        service.decline(GUILD, id, "alice"),
        Err(ArenaError::InvitationAlreadyResolved(
            InvitationStatus::Consumed
        ))
    );
    assert_eq!(service.balance("bob", GUILD).expect("Balance"), 2_000);
    assert_eq!(
        service.accept(GUILD, id + 100, "bob"),
        Err(ArenaError::InvitationNotFound(id + 100))
    );
}

#[test]
fn test_decline_refunds_challenger() {
    let (_db, service, _clock) = setup();
    service.deposit("alice", GUILD, 2_000).expect("Deposit");
    let id = service
        .challenge(&request("alice", "bob", Some(1_200)))
        .expect("Challenge issued")
        .invitation
        .id;
    assert_eq!(service.balance("alice", GUILD).expect("Balance"), 800);

    let declined = service.decline(GUILD, id, "bob").expect("Declined");
    assert_eq!(declined.status, InvitationStatus::Voided);
    assert_eq!(service.balance("alice", GUILD).expect("Balance"), 2_000);
    assert_eq!(
        service.accept(GUILD, id, "bob"),
        Err(ArenaError::InvitationAlreadyResolved(InvitationStatus::Voided))
    );
}

#[test]
fn test_already_in_game_blocks_new_challenges() {
    let (_db, service, _clock) = setup();
    let id = service
        .challenge(&request("alice", "bob", None))
        .expect("Challenge issued")
        .invitation
        .id;
    let game_id = service.accept(GUILD, id, "bob").expect("Accepted").game_id;

    assert_eq!(
        service.challenge(&request("carol", "bob", None)),
        Err(ArenaError::AlreadyInGame {
            user_id: "bob".into(),
            channel_id: CHANNEL.into()
        })
    );

    let pending = service
        .challenge(&request("carol", "dave", None))
        .expect("Unrelated players")
        .invitation
        .id;
    service.resign(GUILD, game_id, "alice").expect("Resigned");
    let other = service
        .challenge(&request("alice", "carol", None))
        .expect("Free again")
        .invitation
        .id;
    assert_ne!(pending, other);
    assert!(
        service
            .active_game(GUILD, "alice")
            .expect("Query")
            .is_none()
    );
}

#[test]
fn test_clock_expiry_on_submit() {
    let (_db, service, clock) = setup();
    service.deposit("alice", GUILD, 1_000).expect("Deposit");
    service.deposit("bob", GUILD, 1_000).expect("Deposit");
    let id = service
        .challenge(&request("alice", "bob", Some(1_000)))
        .expect("Challenge issued")
        .invitation
        .id;
    let game_id = service.accept(GUILD, id, "bob").expect("Accepted").game_id;

    clock.advance(TimeDelta::seconds(60));
    play(&service, game_id, "alice", 3);
    clock.advance(TimeDelta::seconds(61));

    match play(&service, game_id, "bob", 3) {
        SubmitOutcome::ClockExpired(view) => {
            assert_eq!(view.state, GameState::Forfeited { winner: Color::Red });
            assert_eq!(view.board.occupied(), 1);
        }
        other => panic!("Expected clock expiry, got {:?}", other),
    }
    assert_eq!(service.balance("alice", GUILD).expect("Balance"), 2_000);
    assert_eq!(service.balance("bob", GUILD).expect("Balance"), 0);
    assert_eq!(
        service.submit_move(GUILD, game_id, "bob", 3),
        Err(ArenaError::GameAlreadyEnded)
    );
}

#[test]
fn test_resign_after_expiry_pays_waiting_player() {
    let (_db, service, clock) = setup();
    service.deposit("alice", GUILD, 1_000).expect("Deposit");
    service.deposit("bob", GUILD, 1_000).expect("Deposit");
    let id = service
        .challenge(&request("alice", "bob", Some(1_000)))
        .expect("Challenge issued")
        .invitation
        .id;
    let game_id = service.accept(GUILD, id, "bob").expect("Accepted").game_id;

    // Alice is to move and lets her clock run out; Bob then resigns.
    clock.advance(TimeDelta::seconds(61));
    assert_eq!(
        service.resign(GUILD, game_id, "mallory"),
        Err(ArenaError::NotAParticipant)
    );
    let view = service.resign(GUILD, game_id, "bob").expect("Game settles");
    assert_eq!(
        view.state,
        GameState::Forfeited {
            winner: Color::Yellow
        }
    );
    assert_eq!(view.winner.as_deref(), Some("bob"));
    assert_eq!(service.balance("bob", GUILD).expect("Balance"), 2_000);
    assert_eq!(service.balance("alice", GUILD).expect("Balance"), 0);
}

#[test]
fn test_views_forfeit_expired_game() {
    let (_db, service, clock) = setup();
    let id = service
        .challenge(&request("alice", "bob", None))
        .expect("Challenge issued")
        .invitation
        .id;
    let game_id = service.accept(GUILD, id, "bob").expect("Accepted").game_id;
    assert!(service.active_game(GUILD, "bob").expect("Query").is_some());

    clock.advance(TimeDelta::seconds(61));
    assert!(service.active_game(GUILD, "bob").expect("Query").is_none());
    let view = service.game_view(GUILD, game_id).expect("View");
    assert_eq!(
        view.state,
        GameState::Forfeited {
            winner: Color::Yellow
        }
    );
    assert!(service.sweep_expired().expect("Sweep").is_empty());
}

#[test]
fn test_interactions_dispatch_by_id() {
    let (_db, service, _clock) = setup();
    let id = service
        .challenge(&request("alice", "bob", None))
        .expect("Challenge issued")
        .invitation
        .id;
    let accept = service
        .register_interaction(
            GUILD,
            CHANNEL,
            "bob",
            Interaction::AcceptInvitation { invitation_id: id },
        )
        .expect("Stored");

    assert_eq!(
        service.dispatch("bob", "other-guild", accept.id),
        Err(ArenaError::InteractionNotFound(accept.id))
    );
    let game_id = match service.dispatch("bob", GUILD, accept.id).expect("Dispatched") {
        InteractionOutcome::GameStarted(view) => view.game_id,
        other => panic!("Expected game start, got {:?}", other),
    };

    let place = service
        .register_interaction(
            GUILD,
            CHANNEL,
            "alice",
            Interaction::PlaceToken { game_id, column: 4 },
        )
        .expect("Stored");
    assert!(matches!(
        service.dispatch("alice", GUILD, place.id),
        Ok(InteractionOutcome::MovePlayed(_))
    ));
    assert_eq!(
        service.dispatch("alice", GUILD, place.id),
        Err(ArenaError::NotYourTurn(Color::Yellow))
    );

    let resign = service
        .register_interaction(GUILD, CHANNEL, "bob", Interaction::Resign { game_id })
        .expect("Stored");
    match service.dispatch("bob", GUILD, resign.id).expect("Dispatched") {
        InteractionOutcome::Resigned(view) => {
            assert_eq!(view.winner.as_deref(), Some("alice"));
        }
        other => panic!("Expected resignation, got {:?}", other),
    }
    assert_eq!(
        service.dispatch("bob", GUILD, 9_999),
        Err(ArenaError::InteractionNotFound(9_999))
    );
}
