//! Concurrent callers racing on one session and one balance.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinSet;

use updown_core::{Balance, BetOutcome, Direction, SessionStatus, UserId};
use updown_engine::{Engine, EngineConfig, EngineError, EngineEvent};
use updown_store::{MemoryStore, SessionStore};

fn at(m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 8, 10, m, s).unwrap()
}

fn engine() -> (Arc<Engine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(Engine::new(EngineConfig::default(), store.clone()).unwrap());
    (engine, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ensure_creates_one_session() {
    let (engine, store) = engine();
    let mut events = engine.subscribe();

    let mut tasks = JoinSet::new();
    for s in 0..16 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move { engine.ensure_current_session(at(15, s), None).await });
    }

    let mut keys = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        keys.push(joined.unwrap().unwrap().key);
    }
    assert!(keys.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.session_count(), 1);

    let mut opened = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::SessionOpened { .. }) {
            opened += 1;
        }
    }
    assert_eq!(opened, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bets_never_overdraw() {
    let (engine, store) = engine();
    let user = UserId::from("U");
    engine.deposit(&user, 100_000).await.unwrap();
    let session = engine.ensure_current_session(at(15, 0), None).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..25 {
        let engine = Arc::clone(&engine);
        let key = session.key.clone();
        let user = user.clone();
        tasks.spawn(async move {
            engine
                .place_bet(&key, &user, Direction::Up, 10_000, at(15, 30), None)
                .await
        });
    }

    let mut accepted = 0;
    let mut insufficient = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => accepted += 1,
            Err(EngineError::InsufficientFunds { .. }) => insufficient += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(accepted, 10);
    assert_eq!(insufficient, 15);

    // Frozen funds equal the stake of pending bets
    let balance = engine.balance(&user).await.unwrap();
    assert_eq!(balance, Balance::new(0, 100_000));
    let bets = store.list_session_bets(session.key.clone()).await.unwrap();
    let pending: u64 = bets
        .iter()
        .filter(|b| b.outcome == BetOutcome::Pending)
        .map(|b| b.amount)
        .sum();
    assert_eq!(pending, balance.frozen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_settle_and_void_have_one_winner() {
    let (engine, store) = engine();
    let session = engine.ensure_current_session(at(15, 0), None).await.unwrap();
    for i in 0..5 {
        let user = UserId::new(format!("user-{i}"));
        engine.deposit(&user, 10_000).await.unwrap();
        engine
            .place_bet(&session.key, &user, Direction::Down, 10_000, at(15, 10), None)
            .await
            .unwrap();
    }
    engine.tick(at(16, 0), None).await;

    let settle = {
        let engine = Arc::clone(&engine);
        let key = session.key.clone();
        tokio::spawn(async move { engine.settle(&key, Direction::Down, at(16, 1), None).await })
    };
    let void = {
        let engine = Arc::clone(&engine);
        let key = session.key.clone();
        tokio::spawn(async move { engine.void(&key, "admin", at(16, 1), None).await })
    };
    let settle = settle.await.unwrap();
    let void = void.await.unwrap();

    assert!(settle.is_ok() != void.is_ok());
    let loser = settle.as_ref().err().or(void.as_ref().err()).unwrap();
    assert!(loser.is_already_terminal());

    let stored = store.get_session(session.key.clone()).await.unwrap().unwrap();
    let expected = if settle.is_ok() {
        SessionStatus::Settled
    } else {
        SessionStatus::Void
    };
    assert_eq!(stored.status, expected);

    // Each bet was processed exactly once: all funds either paid or refunded
    for i in 0..5 {
        let user = UserId::new(format!("user-{i}"));
        let balance = engine.balance(&user).await.unwrap();
        assert_eq!(balance.frozen, 0);
        let expected = if settle.is_ok() { 18_000 } else { 10_000 };
        assert_eq!(balance.available, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bets_racing_the_lock_are_never_stranded() {
    let (engine, store) = engine();
    let session = engine.ensure_current_session(at(15, 0), None).await.unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..20 {
        let engine = Arc::clone(&engine);
        let key = session.key.clone();
        tasks.spawn(async move {
            let user = UserId::new(format!("user-{i}"));
            engine.deposit(&user, 5_000).await.unwrap();
            let _ = engine
                .place_bet(&key, &user, Direction::Up, 5_000, at(15, 59), None)
                .await;
        });
    }
    let voider = {
        let engine = Arc::clone(&engine);
        let key = session.key.clone();
        tokio::spawn(async move { engine.void(&key, "admin", at(15, 59), None).await })
    };

    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }
    voider.await.unwrap().unwrap();

    // Whatever interleaving happened, nothing is left pending or frozen
    let bets = store.list_session_bets(session.key.clone()).await.unwrap();
    assert!(bets.iter().all(|b| b.outcome == BetOutcome::Void));
    for i in 0..20 {
        let user = UserId::new(format!("user-{i}"));
        assert_eq!(
            engine.balance(&user).await.unwrap(),
            Balance::new(5_000, 0)
        );
    }
}
