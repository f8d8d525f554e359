use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use huddle_db::models::{ConferenceParticipantRow, ConferenceRow};
use huddle_db::{Action, Database, PreparedRecord};
use huddle_types::api::{
    RawConference, RawDraft, RawParticipant, RawUsageCounters, RawUsageLimits,
};
use tracing::{debug, warn};

use crate::dedupe::unique_by;
use crate::error::SyncError;
use crate::handler::{
    ConferenceHandler, DraftHandler, ParticipantHandler, SyncStage, UsageCountersHandler,
    UsageLimitHandler, commit, handle_records, prepare_records,
};
use crate::transform::{flatten_registrants, transform_conference, transform_participant};

/// Partial conference payload applied on top of a stored conference.
pub type ConferenceChanges = RawConference;

/// Partial participant payload applied on top of a stored participant.
pub type ParticipantChanges = RawParticipant;

/// Entry point for everything that writes synced data into the local store.
#[derive(Clone)]
pub struct SyncOperator {
    db: Arc<Database>,
}

impl SyncOperator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // -- Conferences --

    /// Sync conferences and the participants nested in their `registrants`.
    ///
    /// Returns the prepared conferences followed by their participants. Unless
    /// `prepare_records_only` is set, all of them are committed in a single
    /// transaction, so a conference never becomes visible without its
    /// participants.
    pub fn handle_conferences(
        &self,
        conferences: Vec<RawConference>,
        prepare_records_only: bool,
    ) -> Result<Vec<PreparedRecord>, SyncError> {
        if conferences.is_empty() {
            warn!("An empty conference batch was passed to handle_conferences");
            return Ok(Vec::new());
        }

        let mut unique = unique_by(conferences, "conference", |c| c.id.clone());

        let mut participants = Vec::new();
        for conference in &mut unique {
            participants.extend(flatten_registrants(conference));
        }

        let mut batch = prepare_records(&self.db, &ConferenceHandler, unique)?;

        let initiators: HashMap<String, String> = batch
            .iter()
            .filter_map(PreparedRecord::as_conference)
            .map(|c| (c.id.clone(), c.user_id.clone()))
            .collect();

        // Participants of a conference that was skipped would violate the
        // foreign key and fail the whole batch.
        let before = participants.len();
        participants.retain(|p| {
            p.conference_id
                .as_ref()
                .is_some_and(|id| initiators.contains_key(id))
        });
        if participants.len() < before {
            warn!(
                "Dropped {} participants of conferences that could not be prepared",
                before - participants.len()
            );
        }

        if !participants.is_empty() {
            let handler = ParticipantHandler { initiators };
            batch.extend(handle_records(
                &self.db,
                &handler,
                participants,
                true,
                "handle_conferences participants",
            )?);
        }

        if prepare_records_only {
            debug!("[{}] handle_conferences: {} records", SyncStage::DryRunReturned, batch.len());
        } else {
            commit(&self.db, &batch, "handle_conferences")?;
        }

        Ok(batch)
    }

    pub fn handle_conference_participants(
        &self,
        participants: Vec<RawParticipant>,
        prepare_records_only: bool,
    ) -> Result<Vec<PreparedRecord>, SyncError> {
        if participants.is_empty() {
            warn!("An empty participant batch was passed to handle_conference_participants");
            return Ok(Vec::new());
        }

        let conference_ids: Vec<String> = participants
            .iter()
            .filter_map(|p| p.conference_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let initiators = self
            .db
            .find_by_ids::<ConferenceRow>(&conference_ids)
            .map_err(|source| SyncError::Lookup {
                entity: "conference",
                source,
            })?
            .into_iter()
            .map(|(id, conference)| (id, conference.user_id))
            .collect();

        handle_records(
            &self.db,
            &ParticipantHandler { initiators },
            participants,
            prepare_records_only,
            "handle_conference_participants",
        )
    }

    // -- Drafts and usage --

    pub fn handle_drafts(
        &self,
        drafts: Vec<RawDraft>,
        prepare_records_only: bool,
    ) -> Result<Vec<PreparedRecord>, SyncError> {
        handle_records(&self.db, &DraftHandler, drafts, prepare_records_only, "handle_drafts")
    }

    pub fn handle_usage_limits(
        &self,
        team_id: &str,
        limits: RawUsageLimits,
        prepare_records_only: bool,
    ) -> Result<Vec<PreparedRecord>, SyncError> {
        handle_records(
            &self.db,
            &UsageLimitHandler { team_id },
            vec![limits],
            prepare_records_only,
            "handle_usage_limits",
        )
    }

    pub fn handle_usage_counters(
        &self,
        team_id: &str,
        counters: RawUsageCounters,
        prepare_records_only: bool,
    ) -> Result<Vec<PreparedRecord>, SyncError> {
        handle_records(
            &self.db,
            &UsageCountersHandler { team_id },
            vec![counters],
            prepare_records_only,
            "handle_usage_counters",
        )
    }

    /// Commit records gathered from several dry runs in one transaction.
    pub fn batch_records(&self, records: &[PreparedRecord], description: &str) -> Result<(), SyncError> {
        commit(&self.db, records, description)
    }

    // -- Field-level updates --

    /// Apply `changes` to one stored conference. Returns `None` when the
    /// conference is not stored locally.
    pub fn update_conference_by_id(
        &self,
        id: &str,
        changes: &ConferenceChanges,
    ) -> Result<Option<ConferenceRow>, SyncError> {
        let Some(existing) = self.lookup_conference(id)? else {
            debug!("Conference {} not found, nothing to update", id);
            return Ok(None);
        };

        let Some(row) = update_conference(&existing, changes) else {
            return Ok(None);
        };
        commit(
            &self.db,
            &[PreparedRecord::new(Action::Update, row.clone())],
            "update_conference_by_id",
        )?;
        Ok(Some(row))
    }

    pub fn mark_conference_deleted_by_id(&self, id: &str, now_ms: i64) -> Result<Option<ConferenceRow>, SyncError> {
        self.update_conference_by_id(id, &tombstone(now_ms))
    }

    /// Tombstone every live conference `user_id` started in `channel_id`.
    pub fn mark_conferences_deleted(
        &self,
        channel_id: &str,
        user_id: &str,
        now_ms: i64,
    ) -> Result<Vec<ConferenceRow>, SyncError> {
        let live = self
            .db
            .get_live_conferences_by_initiator(channel_id, user_id)
            .map_err(|source| SyncError::Lookup {
                entity: "conference",
                source,
            })?;

        let changes = tombstone(now_ms);
        let rows: Vec<ConferenceRow> = live
            .iter()
            .filter_map(|conference| update_conference(conference, &changes))
            .collect();

        let records: Vec<PreparedRecord> = rows
            .iter()
            .cloned()
            .map(|row| PreparedRecord::new(Action::Update, row))
            .collect();
        commit(&self.db, &records, "mark_conferences_deleted")?;

        Ok(rows)
    }

    /// Apply `changes` to `user_id`'s participant row in the newest conference
    /// of `channel_id`.
    pub fn update_participant_in_latest_conference(
        &self,
        channel_id: &str,
        user_id: &str,
        changes: &ParticipantChanges,
    ) -> Result<Vec<ConferenceParticipantRow>, SyncError> {
        let lookup_err = |source: anyhow::Error| SyncError::Lookup {
            entity: "participant",
            source,
        };

        let Some(conference) = self
            .db
            .get_latest_conference_in_channel(channel_id)
            .map_err(lookup_err)?
        else {
            debug!("No conference in channel {}", channel_id);
            return Ok(Vec::new());
        };

        let existing = self
            .db
            .get_participants_by_user(&conference.id, user_id)
            .map_err(lookup_err)?;
        if existing.is_empty() {
            debug!("User {} is not a participant of conference {}", user_id, conference.id);
            return Ok(Vec::new());
        }

        let mut rows = Vec::with_capacity(existing.len());
        for participant in &existing {
            match transform_participant(Action::Update, Some(participant), changes, None) {
                Ok(row) => rows.push(row),
                Err(e) => warn!("Skipping participant {}: {}", participant.id, e),
            }
        }

        let records: Vec<PreparedRecord> = rows
            .iter()
            .cloned()
            .map(|row| PreparedRecord::new(Action::Update, row))
            .collect();
        commit(&self.db, &records, "update_participant_in_latest_conference")?;

        Ok(rows)
    }

    fn lookup_conference(&self, id: &str) -> Result<Option<ConferenceRow>, SyncError> {
        self.db
            .get_conference_by_id(id)
            .map_err(|source| SyncError::Lookup {
                entity: "conference",
                source,
            })
    }
}

fn tombstone(now_ms: i64) -> ConferenceChanges {
    RawConference {
        delete_at: Some(Some(now_ms)),
        ..Default::default()
    }
}

fn update_conference(existing: &ConferenceRow, changes: &ConferenceChanges) -> Option<ConferenceRow> {
    match transform_conference(Action::Update, Some(existing), changes) {
        Ok(row) => Some(row),
        Err(e) => {
            warn!("Skipping conference {}: {}", existing.id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator() -> SyncOperator {
        SyncOperator::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn conference(id: &str, create_at: i64) -> RawConference {
        RawConference {
            id: Some(id.into()),
            channel_id: Some("ch1".into()),
            team_id: Some("t1".into()),
            user_id: Some("u1".into()),
            create_at: Some(create_at),
            ..Default::default()
        }
    }

    #[test]
    fn tombstone_then_resurrect() {
        let op = operator();
        op.handle_conferences(vec![conference("c1", 1000)], false).unwrap();

        let deleted = op.mark_conference_deleted_by_id("c1", 9000).unwrap().unwrap();
        assert_eq!(deleted.delete_at, Some(9000));

        let revived = op
            .update_conference_by_id(
                "c1",
                &ConferenceChanges {
                    delete_at: Some(None),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(revived.delete_at, None);
        assert_eq!(op.database().get_conference_by_id("c1").unwrap().unwrap().delete_at, None);
    }

    #[test]
    fn updating_unknown_conference_is_not_an_error() {
        let op = operator();
        assert!(op.mark_conference_deleted_by_id("ghost", 1).unwrap().is_none());
    }

    #[test]
    fn mark_conferences_deleted_only_touches_live_ones() {
        let op = operator();
        op.handle_conferences(vec![conference("c1", 1000), conference("c2", 2000)], false)
            .unwrap();
        op.mark_conference_deleted_by_id("c1", 1500).unwrap();

        let tombstoned = op.mark_conferences_deleted("ch1", "u1", 3000).unwrap();
        assert_eq!(tombstoned.len(), 1);
        assert_eq!(tombstoned[0].id, "c2");

        let c1 = op.database().get_conference_by_id("c1").unwrap().unwrap();
        assert_eq!(c1.delete_at, Some(1500));
    }

    #[test]
    fn batch_records_commits_combined_dry_runs() {
        let op = operator();
        let mut records = op.handle_conferences(vec![conference("c1", 1000)], true).unwrap();
        records.extend(
            op.handle_usage_counters(
                "t1",
                RawUsageCounters {
                    members: Some(4),
                    ..Default::default()
                },
                true,
            )
            .unwrap(),
        );
        assert!(op.database().get_conference_by_id("c1").unwrap().is_none());

        op.batch_records(&records, "combined").unwrap();
        assert!(op.database().get_conference_by_id("c1").unwrap().is_some());
        assert_eq!(op.database().get_usage_counters("t1").unwrap().unwrap().members, 4);
    }
}
