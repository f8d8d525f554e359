//! Ready-made observers for the call screen.

use std::sync::Arc;

use huddle_db::Database;
use huddle_db::models::ConferenceRow;
use tokio::sync::watch;

use crate::poller::{ObserverConfig, ObserverHandle, PollingObserver};
use crate::probes::{AnyonePresent, ConferenceById, ParticipantCount, ParticipantPresent, PermissionFlag};
use crate::state::CallsContext;

/// Number of participants of a conference, present or not.
pub fn observe_participant_count(
    db: Arc<Database>,
    conference_id: &str,
    config: ObserverConfig,
) -> ObserverHandle<i64> {
    PollingObserver::new(ParticipantCount {
        db,
        conference_id: conference_id.to_string(),
    })
    .config(config)
    .spawn()
}

/// Whether someone other than the current user has joined.
///
/// Idle until `current_user_id` is known. Stops for good once it reports
/// `true`: a call that someone joined stays joined as far as the caller is
/// concerned.
pub fn observe_has_anyone_present(
    db: Arc<Database>,
    conference_id: &str,
    current_user_id: watch::Receiver<Option<String>>,
    config: ObserverConfig,
) -> ObserverHandle<bool> {
    let conference_id = conference_id.to_string();
    PollingObserver::keyed(current_user_id, move |user_id| AnyonePresent {
        db: db.clone(),
        conference_id: conference_id.clone(),
        excluding_user_id: Some(user_id.to_string()),
    })
    .config(config)
    .until(|present| *present)
    .spawn()
}

pub fn observe_participant_present(
    db: Arc<Database>,
    conference_id: &str,
    user_id: &str,
    config: ObserverConfig,
) -> ObserverHandle<bool> {
    PollingObserver::new(ParticipantPresent {
        db,
        conference_id: conference_id.to_string(),
        user_id: user_id.to_string(),
    })
    .config(config)
    .spawn()
}

/// The conference row, `None` while it is not stored locally.
pub fn observe_conference(
    db: Arc<Database>,
    conference_id: watch::Receiver<Option<String>>,
    config: ObserverConfig,
) -> ObserverHandle<Option<ConferenceRow>> {
    PollingObserver::keyed(conference_id, move |id| ConferenceById {
        db: db.clone(),
        conference_id: id.to_string(),
    })
    .config(config)
    .spawn()
}

pub fn observe_permission_flag(ctx: Arc<CallsContext>, config: ObserverConfig) -> ObserverHandle<bool> {
    PollingObserver::new(PermissionFlag { ctx }).config(config).spawn()
}
