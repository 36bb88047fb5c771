//! Integration tests for rooms running as actors behind a registry.
//!
//! Everything runs on tokio's paused clock, so the 1 s countdown steps and
//! 50 ms ticks take no real time and elapsed time can be asserted exactly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use wordfall_protocol::{
    Claimant, Difficulty, ErrorReason, GameState, Mode, PlayerId, RoomCode, ServerMessage, Snapshot,
    Winner,
};
use wordfall_room::{
    FanoutBus, LeaderboardSink, LeaderboardWriter, MAX_CODE_ATTEMPTS, MemoryBus, MemoryLeaderboard,
    NodeId, RetryPolicy, RoomConfig, RoomError, RoomRegistry, RoomRequest, leaderboard_identity,
};

type Inbox = mpsc::UnboundedReceiver<ServerMessage>;

fn quick_config() -> RoomConfig {
    RoomConfig {
        game_duration: Duration::from_secs(3),
        ..RoomConfig::default()
    }
}

async fn seat(registry: &RoomRegistry, code: &RoomCode, name: &str) -> (PlayerId, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let player = registry.allocate_player_id();
    registry.join(code, player, name.into(), tx).await.unwrap();
    (player, rx)
}

/// Next message that isn't a per-tick snapshot.
async fn next_event(rx: &mut Inbox) -> ServerMessage {
    loop {
        match rx.recv().await {
            Some(ServerMessage::GameUpdate { .. }) => continue,
            Some(msg) => return msg,
            None => panic!("room closed the player's channel"),
        }
    }
}

/// Skips messages until a `gameState` snapshot in `state` arrives.
async fn until_state(rx: &mut Inbox, state: GameState) -> Snapshot {
    loop {
        if let ServerMessage::GameState { snapshot } = next_event(rx).await {
            if snapshot.state == state {
                return snapshot;
            }
        }
    }
}

fn drain(rx: &mut Inbox) {
    while rx.try_recv().is_ok() {}
}

// =========================================================================
// Registry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_create_and_join() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Ffa, Difficulty::Medium).await.unwrap();
    assert_eq!(code.as_str().len(), 6);
    assert_eq!(registry.room_count().await, 1);

    let (ada, mut ada_rx) = seat(&registry, &code, "ada").await;
    match next_event(&mut ada_rx).await {
        ServerMessage::RoomJoined { room, player, players } => {
            assert_eq!(room, code);
            assert_eq!(player.id, ada);
            assert_eq!(players.len(), 1);
        }
        other => panic!("expected roomJoined, got {other:?}"),
    }

    let (bob, _bob_rx) = seat(&registry, &code, "bob").await;
    match next_event(&mut ada_rx).await {
        // ada's own lobby snapshot comes first.
        ServerMessage::GameState { .. } => {}
        other => panic!("expected gameState, got {other:?}"),
    }
    match next_event(&mut ada_rx).await {
        ServerMessage::PlayerJoined { player, players } => {
            assert_eq!(player.id, bob);
            assert_eq!(players.len(), 2);
        }
        other => panic!("expected playerJoined, got {other:?}"),
    }

    let info = registry.room_info(&code).await.unwrap();
    assert_eq!(info.player_count, 2);
    assert_eq!(info.state, GameState::Lobby);
    assert_eq!(info.mode, Mode::Ffa);
    assert!(!info.relayed);
    assert_eq!(registry.player_room(ada).await, Some(code));
}

#[tokio::test(start_paused = true)]
async fn test_registry_rejections() {
    let config = RoomConfig {
        capacity: 2,
        ..RoomConfig::default()
    };
    let registry = RoomRegistry::new(config);
    let (tx, _rx) = mpsc::unbounded_channel();

    let missing = RoomCode::parse("ZZZZZZ").unwrap();
    let stranger = registry.allocate_player_id();
    assert_eq!(
        registry.join(&missing, stranger, "x".into(), tx.clone()).await,
        Err(RoomError::RoomNotFound(missing))
    );

    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, _ada_rx) = seat(&registry, &code, "ada").await;
    assert!(matches!(
        registry.join(&code, ada, "ada".into(), tx.clone()).await,
        Err(RoomError::AlreadyInRoom { .. })
    ));

    let (_bob, _bob_rx) = seat(&registry, &code, "bob").await;
    assert_eq!(
        registry.join(&code, stranger, "x".into(), tx.clone()).await,
        Err(RoomError::RoomFull(code.clone()))
    );

    // Not in any room.
    assert_eq!(registry.leave(stranger).await, Err(RoomError::NotInRoom(stranger)));
    assert_eq!(
        registry.route(stranger, RoomRequest::StartGame).await,
        Err(RoomError::NotInRoom(stranger))
    );

    // Rematch only follows a finished game.
    assert_eq!(
        registry.route(ada, RoomRequest::RequestRematch).await,
        Err(RoomError::InvalidTransition {
            from: GameState::Lobby,
            to: GameState::Lobby,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_rejected_once_game_started() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, _ada_rx) = seat(&registry, &code, "ada").await;
    registry.route(ada, RoomRequest::StartGame).await.unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let late = registry.allocate_player_id();
    assert_eq!(
        registry.join(&code, late, "late".into(), tx).await,
        Err(RoomError::GameInProgress(code.clone()))
    );
    assert_eq!(registry.player_room(late).await, None);

    // A second start is an invalid transition and changes nothing.
    assert!(matches!(
        registry.route(ada, RoomRequest::StartGame).await,
        Err(RoomError::InvalidTransition { .. })
    ));
    assert_eq!(registry.room_info(&code).await.unwrap().state, GameState::Countdown);
}

#[tokio::test(start_paused = true)]
async fn test_last_leave_removes_room() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Coop, Difficulty::Hard).await.unwrap();
    let (ada, _ada_rx) = seat(&registry, &code, "ada").await;
    let (bob, mut bob_rx) = seat(&registry, &code, "bob").await;
    drain(&mut bob_rx);

    assert_eq!(registry.leave(ada).await, Ok(1));
    match next_event(&mut bob_rx).await {
        ServerMessage::PlayerLeft { player_id, players } => {
            assert_eq!(player_id, ada);
            assert_eq!(players.len(), 1);
        }
        other => panic!("expected playerLeft, got {other:?}"),
    }
    assert_eq!(registry.room_count().await, 1);

    assert_eq!(registry.leave(bob).await, Ok(0));
    assert_eq!(registry.room_count().await, 0);
    assert!(matches!(
        registry.room_info(&code).await,
        Err(RoomError::RoomNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_last_leave_while_playing_removes_room() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, mut ada_rx) = seat(&registry, &code, "ada").await;
    registry.route(ada, RoomRequest::StartGame).await.unwrap();
    until_state(&mut ada_rx, GameState::Playing).await;

    assert_eq!(registry.leave(ada).await, Ok(0));
    assert_eq!(registry.room_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_join_racing_the_last_leave_is_refused() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, _ada_rx) = seat(&registry, &code, "ada").await;

    let (tx, mut bob_rx) = mpsc::unbounded_channel();
    let bob = registry.allocate_player_id();
    let (left, joined) = tokio::join!(
        registry.leave(ada),
        registry.join(&code, bob, "bob".into(), tx)
    );

    assert_eq!(left, Ok(0));
    assert_eq!(joined, Err(RoomError::RoomNotFound(code.clone())));
    assert_eq!(registry.room_count().await, 0);
    assert_eq!(registry.player_room(bob).await, None);
    // The room never seated bob.
    assert_eq!(bob_rx.try_recv(), Err(TryRecvError::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn test_join_racing_removal_leaves_no_mapping() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();

    let (tx, _bob_rx) = mpsc::unbounded_channel();
    let bob = registry.allocate_player_id();
    let (joined, removed) = tokio::join!(
        registry.join(&code, bob, "bob".into(), tx),
        registry.remove(&code)
    );

    assert!(removed);
    assert_eq!(joined, Err(RoomError::RoomNotFound(code.clone())));
    assert_eq!(registry.player_room(bob).await, None);

    // bob is free to go elsewhere.
    let other = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    assert_eq!(registry.join(&other, bob, "bob".into(), tx).await, Ok(()));
}

/// A code source that replays `codes`, then repeats the last one, and
/// counts how often it was asked.
fn scripted_codes(codes: &[&str], draws: Arc<AtomicUsize>) -> impl FnMut() -> RoomCode + Send + 'static {
    let codes: Vec<RoomCode> = codes.iter().map(|c| RoomCode::parse(c).unwrap()).collect();
    move || {
        let n = draws.fetch_add(1, Ordering::SeqCst);
        codes[n.min(codes.len() - 1)].clone()
    }
}

#[tokio::test(start_paused = true)]
async fn test_colliding_code_is_redrawn() {
    let draws = Arc::new(AtomicUsize::new(0));
    let registry = RoomRegistry::new(RoomConfig::default())
        .with_code_source(scripted_codes(&["AAAAAA", "AAAAAA", "BBBBBB"], draws.clone()));

    let first = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let second = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();

    assert_eq!(first.as_str(), "AAAAAA");
    assert_eq!(second.as_str(), "BBBBBB");
    assert_eq!(draws.load(Ordering::SeqCst), 3);
    assert_eq!(registry.room_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_codes_give_no_free_code() {
    let draws = Arc::new(AtomicUsize::new(0));
    let registry = RoomRegistry::new(RoomConfig::default())
        .with_code_source(scripted_codes(&["AAAAAA"], draws.clone()));

    registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    assert_eq!(
        registry.create(Mode::Ffa, Difficulty::Easy).await,
        Err(RoomError::NoFreeCode(MAX_CODE_ATTEMPTS))
    );
    assert_eq!(draws.load(Ordering::SeqCst), 1 + MAX_CODE_ATTEMPTS);
    assert_eq!(registry.room_count().await, 1);
}

// =========================================================================
// Lifecycle timing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_runs_at_one_second_cadence() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, mut rx) = seat(&registry, &code, "ada").await;
    drain(&mut rx);

    registry.route(ada, RoomRequest::StartGame).await.unwrap();
    let started = Instant::now();

    let snapshot = until_state(&mut rx, GameState::Countdown).await;
    assert_eq!(snapshot.countdown, 3);

    for expected in [3, 2, 1] {
        match next_event(&mut rx).await {
            ServerMessage::Countdown { count } => assert_eq!(count, expected),
            other => panic!("expected countdown {expected}, got {other:?}"),
        }
        assert_eq!(started.elapsed(), Duration::from_secs(u64::from(3 - expected)));
    }

    let playing = until_state(&mut rx, GameState::Playing).await;
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(playing.words.len(), 3);
    assert!(playing.validate().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_ticks_stream_snapshots_at_twenty_hertz() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, mut rx) = seat(&registry, &code, "ada").await;
    registry.route(ada, RoomRequest::StartGame).await.unwrap();
    until_state(&mut rx, GameState::Playing).await;

    let mut updates = 0;
    let mut last_elapsed = 0;
    tokio::time::sleep(Duration::from_millis(1010)).await;
    while let Ok(msg) = rx.try_recv() {
        if let ServerMessage::GameUpdate { snapshot } = msg {
            assert!(snapshot.validate().is_ok());
            assert!(snapshot.elapsed_ms > last_elapsed);
            last_elapsed = snapshot.elapsed_ms;
            updates += 1;
        }
    }
    assert_eq!(updates, 20);
    assert_eq!(last_elapsed, 1000);
}

#[tokio::test(start_paused = true)]
async fn test_removed_room_emits_nothing() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Coop, Difficulty::Hard).await.unwrap();
    let (ada, mut rx) = seat(&registry, &code, "ada").await;
    registry.route(ada, RoomRequest::StartGame).await.unwrap();
    until_state(&mut rx, GameState::Playing).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(registry.remove(&code).await);
    drain(&mut rx);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    assert_eq!(registry.room_count().await, 0);
    assert!(!registry.remove(&code).await);
}

#[tokio::test(start_paused = true)]
async fn test_removed_countdown_never_starts_playing() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, mut rx) = seat(&registry, &code, "ada").await;
    registry.route(ada, RoomRequest::StartGame).await.unwrap();
    until_state(&mut rx, GameState::Countdown).await;

    registry.remove(&code).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    while let Ok(msg) = rx.try_recv() {
        assert!(
            !matches!(&msg, ServerMessage::GameState { snapshot } if snapshot.state == GameState::Playing),
            "room started playing after removal"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_game_over_then_rematch() {
    let registry = RoomRegistry::new(quick_config());
    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, mut rx) = seat(&registry, &code, "ada").await;
    registry.route(ada, RoomRequest::StartGame).await.unwrap();
    until_state(&mut rx, GameState::Playing).await;
    let started = Instant::now();

    let over = loop {
        if let ServerMessage::GameOver { players, winner } = next_event(&mut rx).await {
            break (players, winner);
        }
    };
    assert_eq!(started.elapsed().as_secs(), 3);
    assert_eq!(over.0.len(), 1);
    assert!(matches!(over.1, Winner::Player { player_id, .. } if player_id == ada));
    until_state(&mut rx, GameState::GameOver).await;

    // The tick loop stopped with the game.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(rx.try_recv().is_err());

    registry.route(ada, RoomRequest::RequestRematch).await.unwrap();
    let lobby = until_state(&mut rx, GameState::Lobby).await;
    assert!(lobby.words.is_empty());
    assert!(lobby.players.iter().all(|p| p.score == 0 && p.combo == 0));
}

// =========================================================================
// Input and persistence
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_claim_scores_and_reaches_leaderboard() {
    let sink = Arc::new(MemoryLeaderboard::new());
    let writer = LeaderboardWriter::spawn(sink.clone(), RetryPolicy::default());
    let registry = RoomRegistry::new(quick_config()).with_leaderboard(writer.submitter());

    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, mut rx) = seat(&registry, &code, "ada").await;
    registry.route(ada, RoomRequest::StartGame).await.unwrap();
    let playing = until_state(&mut rx, GameState::Playing).await;

    let target = &playing.words[0];
    let shouted = format!("  {}  ", target.text.to_uppercase());
    registry
        .route(ada, RoomRequest::Input { word: shouted })
        .await
        .unwrap();

    match next_event(&mut rx).await {
        ServerMessage::WordClaimed {
            word_id,
            claimant,
            points,
            combo,
            ..
        } => {
            assert_eq!(word_id, target.id);
            assert_eq!(claimant, Claimant::Player(ada));
            assert_eq!(points, target.points);
            assert_eq!(combo, Some(1));
        }
        other => panic!("expected wordClaimed, got {other:?}"),
    }

    until_state(&mut rx, GameState::GameOver).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let top = sink.top(10).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].identity, leaderboard_identity("ada", ada));
    assert_eq!(top[0].score, u64::from(target.points));
}

#[tokio::test(start_paused = true)]
async fn test_scoreless_game_writes_nothing() {
    let sink = Arc::new(MemoryLeaderboard::new());
    let writer = LeaderboardWriter::spawn(sink.clone(), RetryPolicy::default());
    let registry = RoomRegistry::new(quick_config()).with_leaderboard(writer.submitter());

    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, mut rx) = seat(&registry, &code, "ada").await;
    registry.route(ada, RoomRequest::StartGame).await.unwrap();
    until_state(&mut rx, GameState::GameOver).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(sink.top(10).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wrong_word_goes_only_to_submitter() {
    let registry = RoomRegistry::new(RoomConfig::default());
    let code = registry.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, mut ada_rx) = seat(&registry, &code, "ada").await;
    let (_bob, mut bob_rx) = seat(&registry, &code, "bob").await;
    registry.route(ada, RoomRequest::StartGame).await.unwrap();
    until_state(&mut ada_rx, GameState::Playing).await;
    until_state(&mut bob_rx, GameState::Playing).await;

    registry
        .route(ada, RoomRequest::Input { word: "definitely-not-falling".into() })
        .await
        .unwrap();
    match next_event(&mut ada_rx).await {
        ServerMessage::WrongWord { combo } => assert_eq!(combo, 0),
        other => panic!("expected wrongWord, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    while let Ok(msg) = bob_rx.try_recv() {
        assert!(!matches!(msg, ServerMessage::WrongWord { .. }));
    }
}

// =========================================================================
// Fan-out across nodes
// =========================================================================

fn node(bus: &Arc<MemoryBus>, name: &str) -> RoomRegistry {
    RoomRegistry::new(RoomConfig::default()).with_bus(bus.clone(), NodeId::new(name))
}

#[tokio::test(start_paused = true)]
async fn test_relay_player_plays_in_remote_room() {
    let bus = MemoryBus::shared();
    let owner = node(&bus, "a");
    let edge = node(&bus, "b");

    let code = owner.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (_ada, mut ada_rx) = seat(&owner, &code, "ada").await;
    drain(&mut ada_rx);

    let (bob, mut bob_rx) = seat(&edge, &code, "bob").await;
    match next_event(&mut bob_rx).await {
        ServerMessage::RoomJoined { room, players, .. } => {
            assert_eq!(room, code);
            assert_eq!(players.len(), 2);
        }
        other => panic!("expected roomJoined, got {other:?}"),
    }
    match next_event(&mut ada_rx).await {
        ServerMessage::PlayerJoined { player, .. } => assert_eq!(player.id, bob),
        other => panic!("expected playerJoined, got {other:?}"),
    }
    assert!(edge.room_info(&code).await.unwrap().relayed);

    // Bob starts the game from the edge node.
    edge.route(bob, RoomRequest::StartGame).await.unwrap();
    let playing = until_state(&mut bob_rx, GameState::Playing).await;
    until_state(&mut ada_rx, GameState::Playing).await;

    let target = playing.words[0].clone();
    edge.route(bob, RoomRequest::Input { word: target.text.clone() })
        .await
        .unwrap();

    for rx in [&mut bob_rx, &mut ada_rx] {
        match next_event(rx).await {
            ServerMessage::WordClaimed { word_id, claimant, .. } => {
                assert_eq!(word_id, target.id);
                assert_eq!(claimant, Claimant::Player(bob));
            }
            other => panic!("expected wordClaimed, got {other:?}"),
        }
    }

    // Rejections travel back across the bus.
    assert!(matches!(
        edge.route(bob, RoomRequest::StartGame).await,
        Err(RoomError::InvalidTransition { .. })
    ));
    assert_eq!(owner.room_info(&code).await.unwrap().player_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_relay_join_rejection_is_reported() {
    let bus = MemoryBus::shared();
    let owner = node(&bus, "a");
    let edge = node(&bus, "b");

    let code = owner.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (ada, _ada_rx) = seat(&owner, &code, "ada").await;
    owner.route(ada, RoomRequest::StartGame).await.unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let bob = edge.allocate_player_id();
    assert_eq!(
        edge.join(&code, bob, "bob".into(), tx).await,
        Err(RoomError::GameInProgress(code.clone()))
    );
    assert_eq!(edge.room_count().await, 0);
    assert_eq!(edge.player_room(bob).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_remote_room_codes_are_not_reused() {
    let bus = MemoryBus::shared();
    let owner = node(&bus, "a");
    let edge = node(&bus, "b");

    let code = owner.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    assert_eq!(bus.owner(&code).unwrap(), Some(NodeId::new("a")));
    let other = edge.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    assert_ne!(code, other);
    assert_eq!(bus.owner(&other).unwrap(), Some(NodeId::new("b")));

    owner.remove(&code).await;
    assert_eq!(bus.owner(&code).unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_code_owned_by_another_node_is_redrawn() {
    let bus = MemoryBus::shared();
    let draws = Arc::new(AtomicUsize::new(0));
    let owner = node(&bus, "a").with_code_source(scripted_codes(&["AAAAAA"], Arc::default()));
    let edge = node(&bus, "b").with_code_source(scripted_codes(&["AAAAAA", "CCCCCC"], draws.clone()));

    let taken = owner.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let code = edge.create(Mode::Ffa, Difficulty::Easy).await.unwrap();

    assert_eq!(code.as_str(), "CCCCCC");
    assert_eq!(draws.load(Ordering::SeqCst), 2);
    assert_eq!(bus.owner(&taken).unwrap(), Some(NodeId::new("a")));
    assert_eq!(bus.owner(&code).unwrap(), Some(NodeId::new("b")));
}

#[tokio::test(start_paused = true)]
async fn test_relay_join_racing_the_last_leave_is_refused() {
    let bus = MemoryBus::shared();
    let owner = node(&bus, "a");
    let edge = node(&bus, "b");

    let code = owner.create(Mode::Coop, Difficulty::Easy).await.unwrap();
    let (_ada, _ada_rx) = seat(&owner, &code, "ada").await;
    let (bob, _bob_rx) = seat(&edge, &code, "bob").await;

    let (tx, _carl_rx) = mpsc::unbounded_channel();
    let carl = edge.allocate_player_id();
    let (left, joined) = tokio::join!(edge.leave(bob), edge.join(&code, carl, "carl".into(), tx));

    assert_eq!(left, Ok(0));
    assert_eq!(joined, Err(RoomError::RoomNotFound(code.clone())));
    assert_eq!(edge.player_room(carl).await, None);
    assert_eq!(edge.room_count().await, 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(owner.room_info(&code).await.unwrap().player_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_last_remote_leave_closes_owner_room() {
    let bus = MemoryBus::shared();
    let owner = node(&bus, "a");
    let edge = node(&bus, "b");

    let code = owner.create(Mode::Coop, Difficulty::Easy).await.unwrap();
    let (bob, _bob_rx) = seat(&edge, &code, "bob").await;
    assert_eq!(owner.room_info(&code).await.unwrap().player_count, 1);

    assert_eq!(edge.leave(bob).await, Ok(0));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(edge.room_count().await, 0);
    assert_eq!(owner.room_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_bus_loss_degrades_to_local_only() {
    let bus = MemoryBus::shared();
    let owner = node(&bus, "a");
    let edge = node(&bus, "b");

    let code = owner.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (_ada, mut ada_rx) = seat(&owner, &code, "ada").await;
    let (_bob, mut bob_rx) = seat(&edge, &code, "bob").await;
    drain(&mut ada_rx);
    drain(&mut bob_rx);

    bus.sever();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The relayed player is told the room is gone.
    match next_event(&mut bob_rx).await {
        ServerMessage::Error { reason, .. } => assert_eq!(reason, ErrorReason::Unavailable),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(edge.room_count().await, 0);

    // The owner drops the stranded player and keeps serving locally.
    match next_event(&mut ada_rx).await {
        ServerMessage::PlayerLeft { players, .. } => assert_eq!(players.len(), 1),
        other => panic!("expected playerLeft, got {other:?}"),
    }
    assert_eq!(owner.room_info(&code).await.unwrap().player_count, 1);

    // New rooms still work, just not across nodes.
    let local = owner.create(Mode::Ffa, Difficulty::Easy).await.unwrap();
    let (_cyd, _cyd_rx) = seat(&owner, &local, "cyd").await;
    assert_eq!(owner.room_count().await, 2);
}
