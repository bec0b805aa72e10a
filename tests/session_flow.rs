use std::sync::Arc;

use reel_pick::{
    config::AppConfig,
    dao::{
        metadata::PlaceholderMetadata,
        session_store::{SessionStore, memory::MemorySessionStore},
    },
    rules::scoring::{SwipeAction, rank_groups},
    services::{
        attrition_service,
        barrier::{self, BarrierOutcome},
        rank_service::{self, PickOutcome},
        session_service, swipe_service,
    },
    state::{AppState, SharedState, state_machine::SessionPhase, view::SessionView},
};
use tokio::sync::broadcast;
use uuid::Uuid;

const PLAYERS: [&str; 3] = ["owner", "ann", "bob"];

async fn setup() -> (SharedState, Arc<MemorySessionStore>) {
    let state = AppState::new(AppConfig::default(), Arc::new(PlaceholderMetadata));
    let store = Arc::new(MemorySessionStore::new());
    state.install_session_store(store.clone()).await;
    (state, store)
}

fn drain_into(feed: &mut broadcast::Receiver<reel_pick::state::feed::ChangeEvent>, view: &mut SessionView) {
    while let Ok(event) = feed.try_recv() {
        view.apply(&event);
    }
}

#[tokio::test]
async fn three_players_pick_a_winner_from_fourteen_titles() {
    let (state, store) = setup().await;

    // Invite round.
    let id = session_service::create_session(&state, "owner".into(), vec!["ann".into(), "bob".into()])
        .await
        .unwrap()
        .session
        .id;
    let pool = session_service::populate_pool(&state, id, "owner", (1..=14).collect())
        .await
        .unwrap();
    assert_eq!(pool.phase, SessionPhase::Invite);
    let pool_order: Vec<Uuid> = pool.items.iter().map(|item| item.id).collect();

    barrier::accept_invite(&state, id, "ann").await.unwrap();
    assert_eq!(
        barrier::accept_invite(&state, id, "bob").await.unwrap(),
        BarrierOutcome::Advanced {
            to: SessionPhase::Swipe
        }
    );

    // Swipe round: everyone accepts everything, so every title ties at 3.
    for player in PLAYERS {
        let deck = session_service::deck(&state, id, player).await.unwrap();
        assert_eq!(deck.len(), 14);
        for card in deck {
            swipe_service::swipe(&state, id, player, card.item.id, SwipeAction::Accept)
                .await
                .unwrap();
        }
        assert!(session_service::deck(&state, id, player).await.unwrap().is_empty());
    }
    for player in PLAYERS {
        barrier::signal_done(&state, id, player).await.unwrap();
    }

    let details = session_service::get_session(&state, id).await.unwrap();
    assert_eq!(details.session.phase, SessionPhase::Rank);
    assert_eq!(details.session.item_refs, pool_order[..8].to_vec());
    assert_eq!(store.item_count(), 8);

    // Rank round: everyone ranks both groups in pool order.
    let groups = rank_groups(&details.session.item_refs);
    assert_eq!(groups.len(), 2);
    for player in PLAYERS {
        for (index, group) in groups.iter().enumerate() {
            let mut last = None;
            for item in group {
                last = Some(rank_service::pick(&state, id, player, index, *item).await.unwrap());
            }
            assert!(matches!(last, Some(PickOutcome::Committed { .. })));
        }
        barrier::signal_done(&state, id, player).await.unwrap();
    }

    let details = session_service::get_session(&state, id).await.unwrap();
    assert_eq!(details.session.phase, SessionPhase::Attrition);
    assert_eq!(details.session.current_turn.as_deref(), Some("owner"));
    assert_eq!(details.items.len(), 6);
    assert_eq!(store.item_count(), 6);

    let mut by_score = details.items.clone();
    by_score.sort_by(|a, b| b.score.cmp(&a.score));
    let lives: Vec<u8> = by_score.iter().map(|item| item.lives).collect();
    assert_eq!(lives, vec![3, 3, 2, 2, 1, 1]);
    let favourite = groups[0][0];
    assert_eq!(by_score[0].id, favourite);

    // Attrition: the turn holder always hits the weakest title other than the favourite.
    let mut view = SessionView::new("ann", &details.session, &details.items);
    let mut feed = state.feed().subscribe();
    let mut eliminations = 0;
    let winner = loop {
        let details = session_service::get_session(&state, id).await.unwrap();
        let holder = details.session.current_turn.clone().unwrap();
        let target = details
            .items
            .iter()
            .filter(|item| item.id != favourite && item.is_alive())
            .min_by_key(|item| item.lives)
            .unwrap()
            .id;

        let outcome = attrition_service::attack(&state, id, &holder, target).await.unwrap();
        drain_into(&mut feed, &mut view);
        if !outcome.item.is_alive() {
            eliminations += 1;
        }
        if let Some(winner) = outcome.winner {
            assert_eq!(outcome.phase, SessionPhase::Complete);
            break winner;
        }
    };

    assert_eq!(eliminations, 5);
    assert_eq!(winner.id, favourite);
    assert_eq!(view.phase(), SessionPhase::Complete);
    assert_eq!(view.winner(), Some(favourite));
    assert_eq!(view.alive_count(), 1);

    let details = session_service::get_session(&state, id).await.unwrap();
    assert_eq!(details.session.phase, SessionPhase::Complete);
    assert_eq!(details.session.winner_id, Some(favourite));
    assert!(details.statuses.iter().all(|status| status.attrition_done));

    let card = session_service::winner(&state, id).await.unwrap();
    assert_eq!(card.item.id, favourite);
    assert!(card.details.is_placeholder());

    let listed = session_service::list_sessions(&state, "bob").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(store.find_session(id).await.unwrap().is_some());
}

#[tokio::test]
async fn swipe_round_waits_for_everyone() {
    let (state, _) = setup().await;
    let id = session_service::create_session(&state, "owner".into(), vec!["ann".into()])
        .await
        .unwrap()
        .session
        .id;
    barrier::accept_invite(&state, id, "ann").await.unwrap();
    let pool = session_service::populate_pool(&state, id, "owner", vec![10, 20, 30])
        .await
        .unwrap();
    assert_eq!(pool.phase, SessionPhase::Swipe);

    for item in &pool.items {
        swipe_service::swipe(&state, id, "owner", item.id, SwipeAction::Reject)
            .await
            .unwrap();
    }
    assert_eq!(
        barrier::signal_done(&state, id, "owner").await.unwrap(),
        BarrierOutcome::Waiting {
            pending: vec!["ann".into()]
        }
    );
    assert!(matches!(
        barrier::signal_done(&state, id, "owner").await,
        Err(reel_pick::error::ServiceError::AlreadySignaled {
            phase: SessionPhase::Swipe
        })
    ));
}
