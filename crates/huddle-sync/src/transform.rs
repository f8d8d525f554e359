//! Maps raw payloads onto rows.
//!
//! A transform never does I/O: the caller has already decided the [`Action`]
//! and looked up the existing row. Only fields the payload carries overwrite
//! the existing row ("merge by presence").

use huddle_db::Action;
use huddle_db::models::{
    ConferenceParticipantRow, ConferenceRow, DraftRow, UsageCountersRow, UsageLimitRow,
    participant_id,
};
use huddle_types::api::{
    RawConference, RawDraft, RawParticipant, RawUsageCounters, RawUsageLimits,
};
use huddle_types::models::ParticipantStatus;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::TransformError;

/// Identity for rows the server did not assign one to.
pub fn new_local_id() -> String {
    Uuid::new_v4().to_string()
}

fn merge<T: Clone>(target: &mut T, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *target = value.clone();
    }
}

fn required<T: Clone>(
    value: &Option<T>,
    entity: &'static str,
    field: &'static str,
) -> Result<T, TransformError> {
    value
        .clone()
        .ok_or(TransformError::MissingField { entity, field })
}

fn existing_or_err<R: Clone>(existing: Option<&R>, entity: &'static str) -> Result<R, TransformError> {
    existing
        .cloned()
        .ok_or(TransformError::NoExistingRecord { entity })
}

// -- Conferences --

pub fn transform_conference(
    action: Action,
    existing: Option<&ConferenceRow>,
    raw: &RawConference,
) -> Result<ConferenceRow, TransformError> {
    const ENTITY: &str = "conference";

    let mut row = match action {
        Action::Create => ConferenceRow {
            id: raw.id.clone().unwrap_or_else(new_local_id),
            url: String::new(),
            channel_id: required(&raw.channel_id, ENTITY, "channel_id")?,
            team_id: String::new(),
            user_id: required(&raw.user_id, ENTITY, "user_id")?,
            create_at: 0,
            delete_at: None,
        },
        Action::Update => existing_or_err(existing, ENTITY)?,
    };

    merge(&mut row.url, &raw.url);
    merge(&mut row.channel_id, &raw.channel_id);
    merge(&mut row.team_id, &raw.team_id);
    merge(&mut row.user_id, &raw.user_id);
    merge(&mut row.create_at, &raw.create_at);
    merge(&mut row.delete_at, &raw.delete_at);

    Ok(row)
}

/// Turn the `registrants` map of a conference payload into participant
/// payloads, and strip the nested `registrants` and `participants` fields.
///
/// The map key is the user id. The initiator is always present and approved,
/// whatever the registrant entry claims.
pub fn flatten_registrants(conference: &mut RawConference) -> Vec<RawParticipant> {
    let registrants = conference.registrants.take().unwrap_or_default();
    conference.participants = None;

    let Some(conference_id) = conference.id.clone() else {
        return Vec::new();
    };

    registrants
        .into_iter()
        .filter_map(|(key, registrant)| {
            let user_id = if key.is_empty() { registrant.id.clone() } else { Some(key) };
            let Some(user_id) = user_id else {
                warn!("Skipping registrant without a user id in conference {}", conference_id);
                return None;
            };

            let is_initiator = conference.user_id.as_deref() == Some(user_id.as_str());
            let (present, status) = if is_initiator {
                (Some(true), Some(ParticipantStatus::Approved))
            } else {
                (registrant.present, registrant.status)
            };

            Some(RawParticipant {
                id: Some(participant_id(&conference_id, &user_id)),
                conference_id: Some(conference_id.clone()),
                channel_id: conference.channel_id.clone(),
                user_id: Some(user_id),
                present,
                status,
            })
        })
        .collect()
}

// -- Participants --

/// `initiator` is the user id of the conference's creator, when known. That
/// participant is forced present and approved.
pub fn transform_participant(
    action: Action,
    existing: Option<&ConferenceParticipantRow>,
    raw: &RawParticipant,
    initiator: Option<&str>,
) -> Result<ConferenceParticipantRow, TransformError> {
    const ENTITY: &str = "participant";

    let mut row = match action {
        Action::Create => {
            let conference_id = required(&raw.conference_id, ENTITY, "conference_id")?;
            let user_id = required(&raw.user_id, ENTITY, "user_id")?;
            ConferenceParticipantRow {
                id: participant_id(&conference_id, &user_id),
                channel_id: String::new(),
                conference_id,
                user_id,
                present: false,
                status: ParticipantStatus::Pending,
            }
        }
        Action::Update => existing_or_err(existing, ENTITY)?,
    };

    merge(&mut row.channel_id, &raw.channel_id);
    merge(&mut row.conference_id, &raw.conference_id);
    merge(&mut row.user_id, &raw.user_id);
    merge(&mut row.present, &raw.present);
    merge(&mut row.status, &raw.status);

    if initiator == Some(row.user_id.as_str()) {
        row.present = true;
    }
    if row.present {
        row.status = ParticipantStatus::Approved;
    }

    Ok(row)
}

// -- Drafts --

/// Identity of a draft the server has not assigned an id to yet.
pub fn draft_tuple_key(user_id: &str, channel_id: &str, root_id: &str) -> String {
    format!("{}:{}:{}", user_id, channel_id, root_id)
}

pub fn transform_draft(
    action: Action,
    existing: Option<&DraftRow>,
    raw: &RawDraft,
) -> Result<DraftRow, TransformError> {
    const ENTITY: &str = "draft";

    let mut row = match action {
        Action::Create => DraftRow {
            id: raw.id.clone().unwrap_or_else(new_local_id),
            create_at: 0,
            update_at: 0,
            delete_at: 0,
            user_id: required(&raw.user_id, ENTITY, "user_id")?,
            channel_id: required(&raw.channel_id, ENTITY, "channel_id")?,
            root_id: String::new(),
            files: Vec::new(),
            message: String::new(),
            props: Value::Object(Map::new()),
            metadata: None,
            priority: None,
            timestamp: None,
        },
        Action::Update => existing_or_err(existing, ENTITY)?,
    };

    merge(&mut row.create_at, &raw.create_at);
    merge(&mut row.delete_at, &raw.delete_at);
    merge(&mut row.user_id, &raw.user_id);
    merge(&mut row.channel_id, &raw.channel_id);
    merge(&mut row.root_id, &raw.root_id);
    merge(&mut row.files, &raw.files);
    merge(&mut row.message, &raw.message);
    merge(&mut row.props, &raw.props);
    merge(&mut row.metadata, &raw.metadata);
    merge(&mut row.priority, &raw.priority);
    merge(&mut row.timestamp, &raw.timestamp);

    // A fresh draft without an explicit update time was last touched when created
    match raw.update_at {
        Some(update_at) => row.update_at = update_at,
        None if action == Action::Create => row.update_at = row.create_at,
        None => {}
    }

    Ok(row)
}

// -- Usage --

pub fn transform_usage_limits(
    action: Action,
    existing: Option<&UsageLimitRow>,
    team_id: &str,
    raw: &RawUsageLimits,
) -> Result<UsageLimitRow, TransformError> {
    let mut row = match action {
        Action::Create => UsageLimitRow {
            id: team_id.to_string(),
            ..Default::default()
        },
        Action::Update => existing_or_err(existing, "usage limits")?,
    };

    merge(&mut row.boards, &raw.boards);
    merge(&mut row.bots, &raw.bots);
    merge(&mut row.custom_emojis, &raw.custom_emojis);
    merge(&mut row.files, &raw.files);
    merge(&mut row.guests, &raw.guests);
    merge(&mut row.incoming_webhooks, &raw.incoming_webhooks);
    merge(&mut row.integrations, &raw.integrations);
    merge(&mut row.members, &raw.members);
    merge(&mut row.messages, &raw.messages);
    merge(&mut row.outgoing_webhooks, &raw.outgoing_webhooks);
    merge(&mut row.private_channels, &raw.private_channels);
    merge(&mut row.public_channels, &raw.public_channels);
    merge(&mut row.reminder_custom_date, &raw.reminder_custom_date);
    merge(&mut row.scheduled_draft_custom_date, &raw.scheduled_draft_custom_date);
    merge(&mut row.sidebar_categories, &raw.sidebar_categories);
    merge(&mut row.storage, &raw.storage);
    merge(&mut row.teams, &raw.teams);

    Ok(row)
}

pub fn transform_usage_counters(
    action: Action,
    existing: Option<&UsageCountersRow>,
    team_id: &str,
    raw: &RawUsageCounters,
) -> Result<UsageCountersRow, TransformError> {
    let mut row = match action {
        Action::Create => UsageCountersRow {
            id: team_id.to_string(),
            ..Default::default()
        },
        Action::Update => existing_or_err(existing, "usage counters")?,
    };

    merge(&mut row.custom_emojis, &raw.custom_emojis);
    merge(&mut row.guests, &raw.guests);
    merge(&mut row.incoming_webhooks, &raw.incoming_webhooks);
    merge(&mut row.members, &raw.members);
    merge(&mut row.outgoing_webhooks, &raw.outgoing_webhooks);
    merge(&mut row.pending_guests, &raw.pending_guests);
    merge(&mut row.private_channels, &raw.private_channels);
    merge(&mut row.public_channels, &raw.public_channels);
    merge(&mut row.sidebar_categories, &raw.sidebar_categories);
    merge(&mut row.storage, &raw.storage);

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_types::api::RawRegistrant;
    use huddle_types::models::BoardsLimit;

    fn raw_conference() -> RawConference {
        RawConference {
            id: Some("c1".into()),
            url: Some("https://meet.example/c1".into()),
            channel_id: Some("ch1".into()),
            team_id: Some("t1".into()),
            user_id: Some("u1".into()),
            create_at: Some(1000),
            ..Default::default()
        }
    }

    #[test]
    fn create_uses_server_id() {
        let row = transform_conference(Action::Create, None, &raw_conference()).unwrap();
        assert_eq!(row.id, "c1");
        assert_eq!(row.create_at, 1000);
        assert_eq!(row.delete_at, None);
    }

    #[test]
    fn create_without_server_id_gets_local_id() {
        let raw = RawConference { id: None, ..raw_conference() };
        let row = transform_conference(Action::Create, None, &raw).unwrap();
        assert!(Uuid::parse_str(&row.id).is_ok());
    }

    #[test]
    fn create_without_channel_is_rejected() {
        let raw = RawConference { channel_id: None, ..raw_conference() };
        let err = transform_conference(Action::Create, None, &raw).unwrap_err();
        assert!(matches!(
            err,
            TransformError::MissingField { field: "channel_id", .. }
        ));
    }

    #[test]
    fn update_keeps_local_id_and_absent_fields() {
        let existing = transform_conference(Action::Create, None, &raw_conference()).unwrap();
        let partial = RawConference {
            id: Some("server-renamed".into()),
            url: Some("https://meet.example/other".into()),
            ..Default::default()
        };

        let row = transform_conference(Action::Update, Some(&existing), &partial).unwrap();
        assert_eq!(row.id, "c1");
        assert_eq!(row.url, "https://meet.example/other");
        assert_eq!(row.channel_id, "ch1");
        assert_eq!(row.create_at, 1000);
    }

    #[test]
    fn explicit_null_clears_tombstone() {
        let mut existing = transform_conference(Action::Create, None, &raw_conference()).unwrap();
        existing.delete_at = Some(5000);

        let untouched = transform_conference(Action::Update, Some(&existing), &RawConference::default()).unwrap();
        assert_eq!(untouched.delete_at, Some(5000));

        let cleared = RawConference {
            delete_at: Some(None),
            ..Default::default()
        };
        let row = transform_conference(Action::Update, Some(&existing), &cleared).unwrap();
        assert_eq!(row.delete_at, None);
    }

    #[test]
    fn update_without_existing_is_an_error() {
        let err = transform_conference(Action::Update, None, &raw_conference()).unwrap_err();
        assert!(matches!(err, TransformError::NoExistingRecord { .. }));
    }

    #[test]
    fn flattening_uses_map_key_and_forces_initiator() {
        let mut raw = raw_conference();
        raw.participants = Some(vec!["u1".into(), "u2".into()]);
        raw.registrants = Some(
            [
                (
                    "u1".to_string(),
                    RawRegistrant {
                        id: Some("p1".into()),
                        present: Some(false),
                        status: Some(ParticipantStatus::Denied),
                    },
                ),
                (
                    "u2".to_string(),
                    RawRegistrant {
                        id: Some("p2".into()),
                        present: None,
                        status: Some(ParticipantStatus::Pending),
                    },
                ),
            ]
            .into_iter()
            .collect(),
        );

        let participants = flatten_registrants(&mut raw);
        assert!(raw.registrants.is_none());
        assert!(raw.participants.is_none());
        assert_eq!(participants.len(), 2);

        let initiator = &participants[0];
        assert_eq!(initiator.id.as_deref(), Some("c1-u1"));
        assert_eq!(initiator.channel_id.as_deref(), Some("ch1"));
        assert_eq!(initiator.present, Some(true));
        assert_eq!(initiator.status, Some(ParticipantStatus::Approved));

        let other = &participants[1];
        assert_eq!(other.id.as_deref(), Some("c1-u2"));
        assert_eq!(other.user_id.as_deref(), Some("u2"));
        assert_eq!(other.present, None);
        assert_eq!(other.status, Some(ParticipantStatus::Pending));
    }

    #[test]
    fn empty_registrant_key_falls_back_to_registrant_id() {
        let mut raw = raw_conference();
        raw.registrants = Some(
            [
                (
                    String::new(),
                    RawRegistrant {
                        id: Some("u9".into()),
                        ..Default::default()
                    },
                ),
            ]
            .into_iter()
            .collect(),
        );

        let participants = flatten_registrants(&mut raw);
        assert_eq!(participants[0].id.as_deref(), Some("c1-u9"));
    }

    #[test]
    fn presence_implies_approval() {
        let raw = RawParticipant {
            conference_id: Some("c1".into()),
            user_id: Some("u2".into()),
            present: Some(true),
            status: Some(ParticipantStatus::Denied),
            ..Default::default()
        };
        let row = transform_participant(Action::Create, None, &raw, None).unwrap();
        assert_eq!(row.id, "c1-u2");
        assert!(row.present);
        assert_eq!(row.status, ParticipantStatus::Approved);
    }

    #[test]
    fn initiator_override_wins_over_payload() {
        let raw = RawParticipant {
            conference_id: Some("c1".into()),
            user_id: Some("u1".into()),
            present: Some(false),
            status: Some(ParticipantStatus::Pending),
            ..Default::default()
        };
        let row = transform_participant(Action::Create, None, &raw, Some("u1")).unwrap();
        assert!(row.present);
        assert_eq!(row.status, ParticipantStatus::Approved);

        let not_initiator = transform_participant(Action::Create, None, &raw, Some("u7")).unwrap();
        assert!(!not_initiator.present);
        assert_eq!(not_initiator.status, ParticipantStatus::Pending);
    }

    #[test]
    fn participant_without_user_is_rejected() {
        let raw = RawParticipant {
            conference_id: Some("c1".into()),
            ..Default::default()
        };
        assert!(transform_participant(Action::Create, None, &raw, None).is_err());
    }

    #[test]
    fn draft_defaults_on_create() {
        let raw = RawDraft {
            user_id: Some("u1".into()),
            channel_id: Some("ch1".into()),
            message: Some("hello".into()),
            create_at: Some(10),
            ..Default::default()
        };
        let row = transform_draft(Action::Create, None, &raw).unwrap();
        assert!(Uuid::parse_str(&row.id).is_ok());
        assert_eq!(row.update_at, 10);
        assert_eq!(row.delete_at, 0);
        assert_eq!(row.root_id, "");
        assert!(row.props.as_object().is_some_and(|p| p.is_empty()));
    }

    #[test]
    fn draft_null_metadata_clears_but_absent_keeps() {
        let base = RawDraft {
            user_id: Some("u1".into()),
            channel_id: Some("ch1".into()),
            metadata: Some(Some(serde_json::json!({"k": 1}))),
            ..Default::default()
        };
        let existing = transform_draft(Action::Create, None, &base).unwrap();

        let kept = transform_draft(Action::Update, Some(&existing), &RawDraft::default()).unwrap();
        assert!(kept.metadata.is_some());

        let clear = RawDraft {
            metadata: Some(None),
            ..Default::default()
        };
        let cleared = transform_draft(Action::Update, Some(&existing), &clear).unwrap();
        assert!(cleared.metadata.is_none());
        assert_eq!(cleared.id, existing.id);
    }

    #[test]
    fn limits_merge_by_presence() {
        let existing = UsageLimitRow {
            id: "t1".into(),
            members: 10,
            bots: 3,
            ..Default::default()
        };
        let raw = RawUsageLimits {
            members: Some(50),
            boards: Some(BoardsLimit { cards: 500, views: 5 }),
            ..Default::default()
        };

        let row = transform_usage_limits(Action::Update, Some(&existing), "t1", &raw).unwrap();
        assert_eq!(row.members, 50);
        assert_eq!(row.bots, 3);
        assert_eq!(row.boards.cards, 500);
    }

    #[test]
    fn counters_default_to_zero_on_create() {
        let raw = RawUsageCounters {
            storage: Some(1024),
            ..Default::default()
        };
        let row = transform_usage_counters(Action::Create, None, "t1", &raw).unwrap();
        assert_eq!(row.id, "t1");
        assert_eq!(row.storage, 1024);
        assert_eq!(row.members, 0);
    }
}
