use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use huddle_db::Database;
use huddle_observe::{
    CallsContext, ObserverConfig, known_key, observe_conference, observe_has_anyone_present,
    observe_participant_count, observe_participant_present, observe_permission_flag,
};
use huddle_sync::SyncOperator;
use huddle_types::api::{RawConference, RawParticipant};
use huddle_types::models::ParticipantStatus;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

const TICK: Duration = Duration::from_millis(25);
const WAIT: Duration = Duration::from_secs(2);

fn config() -> ObserverConfig {
    ObserverConfig { interval: TICK }
}

fn setup() -> (Arc<Database>, SyncOperator) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let op = SyncOperator::new(db.clone());
    (db, op)
}

fn conference() -> RawConference {
    RawConference {
        id: Some("c1".into()),
        channel_id: Some("ch1".into()),
        team_id: Some("t1".into()),
        user_id: Some("u1".into()),
        create_at: Some(1000),
        ..Default::default()
    }
}

fn approved(user_id: &str) -> RawParticipant {
    RawParticipant {
        status: Some(ParticipantStatus::Approved),
        ..invitee(user_id, false)
    }
}

fn invitee(user_id: &str, present: bool) -> RawParticipant {
    RawParticipant {
        conference_id: Some("c1".into()),
        channel_id: Some("ch1".into()),
        user_id: Some(user_id.into()),
        present: Some(present),
        status: Some(ParticipantStatus::Pending),
        ..Default::default()
    }
}

#[tokio::test]
async fn participant_count_converges() {
    let (db, op) = setup();
    op.handle_conferences(vec![conference()], false).unwrap();

    let handle = observe_participant_count(db, "c1", config());
    let mut counts = pin!(handle.stream());
    assert_eq!(timeout(WAIT, counts.next()).await.unwrap(), Some(0));

    op.handle_conference_participants(vec![approved("u2"), approved("u3"), approved("u4")], false)
        .unwrap();

    // Picked up by the next poll
    assert_eq!(timeout(TICK * 3, counts.next()).await.unwrap(), Some(3));

    // Nothing else changes, so nothing else is emitted
    assert!(timeout(TICK * 6, counts.next()).await.is_err());
}

#[tokio::test]
async fn anyone_present_waits_for_user_and_stops_when_true() {
    let (db, op) = setup();
    op.handle_conferences(vec![conference()], false).unwrap();
    op.handle_conference_participants(vec![invitee("u1", true), invitee("u2", false)], false)
        .unwrap();

    let (user_tx, user_rx) = watch::channel(None);
    let handle = observe_has_anyone_present(db, "c1", user_rx, config());

    sleep(TICK * 4).await;
    assert_eq!(handle.current(), None);

    user_tx.send_replace(Some("u1".to_string()));
    let mut present = pin!(handle.stream());
    assert_eq!(timeout(WAIT, present.next()).await.unwrap(), Some(false));

    op.handle_conference_participants(vec![invitee("u2", true)], false).unwrap();
    assert_eq!(timeout(WAIT, present.next()).await.unwrap(), Some(true));
    assert_eq!(timeout(WAIT, present.next()).await.unwrap(), None);
}

#[tokio::test]
async fn specific_participant_presence() {
    let (db, op) = setup();
    op.handle_conferences(vec![conference()], false).unwrap();
    op.handle_conference_participants(vec![invitee("u2", false)], false).unwrap();

    let handle = observe_participant_present(db, "c1", "u2", config());
    let mut present = pin!(handle.stream());
    assert_eq!(timeout(WAIT, present.next()).await.unwrap(), Some(false));

    op.handle_conference_participants(vec![invitee("u2", true)], false).unwrap();
    assert_eq!(timeout(WAIT, present.next()).await.unwrap(), Some(true));
}

#[tokio::test]
async fn conference_appears_once_synced() {
    let (db, op) = setup();
    let handle = observe_conference(db, known_key("c1"), config());
    let mut conferences = pin!(handle.stream());
    assert_eq!(timeout(WAIT, conferences.next()).await.unwrap(), Some(None));

    op.handle_conferences(vec![conference()], false).unwrap();
    let stored = timeout(WAIT, conferences.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(stored.id, "c1");

    op.mark_conference_deleted_by_id("c1", 5000).unwrap();
    let deleted = timeout(WAIT, conferences.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(deleted.delete_at, Some(5000));
}

#[tokio::test]
async fn permission_flag_follows_process_state() {
    let ctx = Arc::new(CallsContext::new());
    let handle = observe_permission_flag(ctx.clone(), config());
    let mut granted = pin!(handle.stream());
    assert_eq!(timeout(WAIT, granted.next()).await.unwrap(), Some(false));

    ctx.set_mic_permissions_granted(true);
    assert_eq!(timeout(WAIT, granted.next()).await.unwrap(), Some(true));

    ctx.reset();
    assert_eq!(timeout(WAIT, granted.next()).await.unwrap(), Some(false));
}
