use std::collections::HashMap;
use std::fmt;

use huddle_db::models::{
    ConferenceParticipantRow, ConferenceRow, DraftRow, Record, UsageCountersRow, UsageLimitRow,
    participant_id,
};
use huddle_db::{Action, AnyRecord, Database, PreparedRecord};
use huddle_types::api::{
    RawConference, RawDraft, RawParticipant, RawUsageCounters, RawUsageLimits,
};
use tracing::{debug, warn};

use crate::dedupe::unique_by;
use crate::error::{SyncError, TransformError};
use crate::transform::{
    draft_tuple_key, transform_conference, transform_draft, transform_participant,
    transform_usage_counters, transform_usage_limits,
};

/// Where a batch is in the pipeline. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Received,
    Deduped,
    Transformed,
    DryRunReturned,
    Committed,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Deduped => "deduped",
            Self::Transformed => "transformed",
            Self::DryRunReturned => "dry_run_returned",
            Self::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// One entity kind's part of the sync pipeline.
pub trait RecordHandler {
    type Raw;
    type Row: Record + Into<AnyRecord>;

    /// Name used in diagnostics.
    const ENTITY: &'static str;

    /// Identity of a raw payload. `None` drops the payload.
    fn key(&self, raw: &Self::Raw) -> Option<String>;

    /// Existing rows for `keys`, keyed the same way as [`RecordHandler::key`].
    fn existing(&self, db: &Database, keys: &[String]) -> anyhow::Result<HashMap<String, Self::Row>> {
        db.find_by_ids(keys)
    }

    fn transform(
        &self,
        action: Action,
        existing: Option<&Self::Row>,
        raw: &Self::Raw,
    ) -> Result<Self::Row, TransformError>;
}

/// Dedupe, look up and transform a batch without writing anything.
pub fn prepare_records<H: RecordHandler>(
    db: &Database,
    handler: &H,
    raws: Vec<H::Raw>,
) -> Result<Vec<PreparedRecord>, SyncError> {
    debug!("[{}] {} {} payloads", SyncStage::Received, H::ENTITY, raws.len());

    let unique = unique_by(raws, H::ENTITY, |raw| handler.key(raw));
    debug!("[{}] {} {} payloads", SyncStage::Deduped, H::ENTITY, unique.len());

    let keys: Vec<String> = unique.iter().filter_map(|raw| handler.key(raw)).collect();
    let existing = handler
        .existing(db, &keys)
        .map_err(|source| SyncError::Lookup {
            entity: H::ENTITY,
            source,
        })?;

    let mut prepared = Vec::with_capacity(unique.len());
    for (raw, key) in unique.iter().zip(&keys) {
        let current = existing.get(key);
        let action = if current.is_some() { Action::Update } else { Action::Create };

        match handler.transform(action, current, raw) {
            Ok(row) => prepared.push(PreparedRecord::new(action, row)),
            Err(e) => warn!("Skipping {} {}: {}", H::ENTITY, key, e),
        }
    }

    debug!("[{}] {} {} records", SyncStage::Transformed, H::ENTITY, prepared.len());
    Ok(prepared)
}

/// Write prepared records in one transaction.
pub fn commit(db: &Database, records: &[PreparedRecord], description: &str) -> Result<(), SyncError> {
    db.batch(records).map_err(|source| SyncError::Commit {
        description: description.to_string(),
        source,
    })?;
    debug!("[{}] {}: {} records", SyncStage::Committed, description, records.len());
    Ok(())
}

/// The whole pipeline for one entity kind. With `prepare_records_only` the
/// prepared records are returned and nothing is written.
pub fn handle_records<H: RecordHandler>(
    db: &Database,
    handler: &H,
    raws: Vec<H::Raw>,
    prepare_records_only: bool,
    description: &str,
) -> Result<Vec<PreparedRecord>, SyncError> {
    if raws.is_empty() {
        warn!("An empty {} batch was passed to {}", H::ENTITY, description);
        return Ok(Vec::new());
    }

    let prepared = prepare_records(db, handler, raws)?;

    if prepare_records_only {
        debug!("[{}] {}: {} records", SyncStage::DryRunReturned, description, prepared.len());
    } else {
        commit(db, &prepared, description)?;
    }

    Ok(prepared)
}

// -- Handlers --

pub struct ConferenceHandler;

impl RecordHandler for ConferenceHandler {
    type Raw = RawConference;
    type Row = ConferenceRow;

    const ENTITY: &'static str = "conference";

    fn key(&self, raw: &RawConference) -> Option<String> {
        raw.id.clone()
    }

    fn transform(
        &self,
        action: Action,
        existing: Option<&ConferenceRow>,
        raw: &RawConference,
    ) -> Result<ConferenceRow, TransformError> {
        transform_conference(action, existing, raw)
    }
}

/// Carries the initiator of every conference the batch touches, keyed by
/// conference id.
pub struct ParticipantHandler {
    pub initiators: HashMap<String, String>,
}

impl RecordHandler for ParticipantHandler {
    type Raw = RawParticipant;
    type Row = ConferenceParticipantRow;

    const ENTITY: &'static str = "participant";

    fn key(&self, raw: &RawParticipant) -> Option<String> {
        match (&raw.conference_id, &raw.user_id) {
            (Some(conference_id), Some(user_id)) => Some(participant_id(conference_id, user_id)),
            _ => raw.id.clone(),
        }
    }

    fn transform(
        &self,
        action: Action,
        existing: Option<&ConferenceParticipantRow>,
        raw: &RawParticipant,
    ) -> Result<ConferenceParticipantRow, TransformError> {
        let conference_id = raw
            .conference_id
            .as_deref()
            .or(existing.map(|row| row.conference_id.as_str()));
        let initiator = conference_id
            .and_then(|id| self.initiators.get(id))
            .map(String::as_str);

        transform_participant(action, existing, raw, initiator)
    }
}

/// Drafts are matched by server id, or by `(user, channel, root)` against the
/// live drafts when the server has not assigned one yet.
pub struct DraftHandler;

impl RecordHandler for DraftHandler {
    type Raw = RawDraft;
    type Row = DraftRow;

    const ENTITY: &'static str = "draft";

    fn key(&self, raw: &RawDraft) -> Option<String> {
        if raw.id.is_some() {
            return raw.id.clone();
        }
        let user_id = raw.user_id.as_deref()?;
        let channel_id = raw.channel_id.as_deref()?;
        Some(draft_tuple_key(
            user_id,
            channel_id,
            raw.root_id.as_deref().unwrap_or_default(),
        ))
    }

    fn existing(&self, db: &Database, keys: &[String]) -> anyhow::Result<HashMap<String, DraftRow>> {
        let mut found: HashMap<String, DraftRow> = db.find_by_ids(keys)?;

        let unmatched: Vec<&String> = keys.iter().filter(|key| !found.contains_key(*key)).collect();
        for key in unmatched {
            let mut parts = key.splitn(3, ':');
            let (Some(user_id), Some(channel_id), Some(root_id)) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };

            // Newest live draft first
            if let Some(draft) = db.get_live_drafts(user_id, channel_id, root_id)?.into_iter().next() {
                found.insert(key.clone(), draft);
            }
        }

        Ok(found)
    }

    fn transform(
        &self,
        action: Action,
        existing: Option<&DraftRow>,
        raw: &RawDraft,
    ) -> Result<DraftRow, TransformError> {
        transform_draft(action, existing, raw)
    }
}

/// Limits are one row per team; the payload itself carries no id.
pub struct UsageLimitHandler<'a> {
    pub team_id: &'a str,
}

impl RecordHandler for UsageLimitHandler<'_> {
    type Raw = RawUsageLimits;
    type Row = UsageLimitRow;

    const ENTITY: &'static str = "usage limits";

    fn key(&self, _raw: &RawUsageLimits) -> Option<String> {
        Some(self.team_id.to_string())
    }

    fn transform(
        &self,
        action: Action,
        existing: Option<&UsageLimitRow>,
        raw: &RawUsageLimits,
    ) -> Result<UsageLimitRow, TransformError> {
        transform_usage_limits(action, existing, self.team_id, raw)
    }
}

pub struct UsageCountersHandler<'a> {
    pub team_id: &'a str,
}

impl RecordHandler for UsageCountersHandler<'_> {
    type Raw = RawUsageCounters;
    type Row = UsageCountersRow;

    const ENTITY: &'static str = "usage counters";

    fn key(&self, _raw: &RawUsageCounters) -> Option<String> {
        Some(self.team_id.to_string())
    }

    fn transform(
        &self,
        action: Action,
        existing: Option<&UsageCountersRow>,
        raw: &RawUsageCounters,
    ) -> Result<UsageCountersRow, TransformError> {
        transform_usage_counters(action, existing, self.team_id, raw)
    }
}
