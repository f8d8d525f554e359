use chrono::Utc;
use huddle_types::api::RawParticipant;
use huddle_types::events::ServerEvent;
use huddle_types::models::ParticipantStatus;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::operator::SyncOperator;

/// Apply one pushed server event to the local store.
pub fn apply_event(operator: &SyncOperator, event: ServerEvent) -> Result<(), SyncError> {
    apply_event_at(operator, event, Utc::now().timestamp_millis())
}

/// Same as [`apply_event`], with the tombstone time supplied by the caller.
pub fn apply_event_at(operator: &SyncOperator, event: ServerEvent, now_ms: i64) -> Result<(), SyncError> {
    let Some(channel_id) = event.channel_id() else {
        warn!("Ignoring server event without a channel: {:?}", event);
        return Ok(());
    };
    debug!("Applying server event in channel {}", channel_id);

    match event {
        ServerEvent::ConferenceAdded(conference) => {
            debug!("Conference added: {:?}", conference.id);
            operator.handle_conferences(vec![conference], false)?;
        }
        ServerEvent::ConferenceDeleted(e) => {
            let deleted = operator.mark_conferences_deleted(&e.channel_id, &e.user_id, now_ms)?;
            debug!("Tombstoned {} conferences in channel {}", deleted.len(), e.channel_id);
        }
        ServerEvent::ConferenceUserConnected(e) => {
            let changes = RawParticipant {
                present: Some(true),
                status: Some(ParticipantStatus::Approved),
                ..Default::default()
            };
            operator.update_participant_in_latest_conference(&e.channel_id, &e.user_id, &changes)?;
        }
        ServerEvent::ConferenceUserDenied(e) => {
            let changes = RawParticipant {
                status: Some(ParticipantStatus::Denied),
                ..Default::default()
            };
            operator.update_participant_in_latest_conference(&e.channel_id, &e.user_id, &changes)?;
        }
        ServerEvent::ConferenceUserDisconnected(e) => {
            let changes = RawParticipant {
                present: Some(false),
                ..Default::default()
            };
            operator.update_participant_in_latest_conference(&e.channel_id, &e.user_id, &changes)?;
        }
    }

    Ok(())
}
