use anyhow::{Result, bail};
use rusqlite::Transaction;
use rusqlite::types::Value;
use tracing::debug;

use crate::Database;
use crate::models::{
    ConferenceParticipantRow, ConferenceRow, DraftRow, Record, UsageCountersRow, UsageLimitRow,
};
use crate::schema::TableSchema;

/// Whether a prepared record becomes a new row or overwrites an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
}

/// Any row the sync engine can write.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyRecord {
    Conference(ConferenceRow),
    Participant(ConferenceParticipantRow),
    Draft(DraftRow),
    UsageLimit(UsageLimitRow),
    UsageCounters(UsageCountersRow),
}

impl AnyRecord {
    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Self::Conference(_) => ConferenceRow::schema(),
            Self::Participant(_) => ConferenceParticipantRow::schema(),
            Self::Draft(_) => DraftRow::schema(),
            Self::UsageLimit(_) => UsageLimitRow::schema(),
            Self::UsageCounters(_) => UsageCountersRow::schema(),
        }
    }

    pub fn table(&self) -> &'static str {
        self.schema().name
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Conference(r) => r.id(),
            Self::Participant(r) => r.id(),
            Self::Draft(r) => r.id(),
            Self::UsageLimit(r) => r.id(),
            Self::UsageCounters(r) => r.id(),
        }
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        match self {
            Self::Conference(r) => r.to_values(),
            Self::Participant(r) => r.to_values(),
            Self::Draft(r) => r.to_values(),
            Self::UsageLimit(r) => r.to_values(),
            Self::UsageCounters(r) => r.to_values(),
        }
    }
}

impl From<ConferenceRow> for AnyRecord {
    fn from(row: ConferenceRow) -> Self {
        Self::Conference(row)
    }
}

impl From<ConferenceParticipantRow> for AnyRecord {
    fn from(row: ConferenceParticipantRow) -> Self {
        Self::Participant(row)
    }
}

impl From<DraftRow> for AnyRecord {
    fn from(row: DraftRow) -> Self {
        Self::Draft(row)
    }
}

impl From<UsageLimitRow> for AnyRecord {
    fn from(row: UsageLimitRow) -> Self {
        Self::UsageLimit(row)
    }
}

impl From<UsageCountersRow> for AnyRecord {
    fn from(row: UsageCountersRow) -> Self {
        Self::UsageCounters(row)
    }
}

/// A row ready to be written, not yet visible to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    pub action: Action,
    pub record: AnyRecord,
}

impl PreparedRecord {
    pub fn new(action: Action, record: impl Into<AnyRecord>) -> Self {
        Self {
            action,
            record: record.into(),
        }
    }

    pub fn as_conference(&self) -> Option<&ConferenceRow> {
        match &self.record {
            AnyRecord::Conference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_participant(&self) -> Option<&ConferenceParticipantRow> {
        match &self.record {
            AnyRecord::Participant(r) => Some(r),
            _ => None,
        }
    }
}

impl Database {
    /// Apply every mutation in one transaction, in the given order.
    ///
    /// Either all rows become visible or none do: the transaction is rolled back
    /// when any statement fails. Parents must come before their children.
    pub fn batch(&self, records: &[PreparedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for prepared in records {
                apply(&tx, prepared)?;
            }
            tx.commit()?;

            debug!("Committed batch of {} records", records.len());
            Ok(())
        })
    }
}

fn apply(tx: &Transaction<'_>, prepared: &PreparedRecord) -> Result<()> {
    let schema = prepared.record.schema();
    let id = Value::Text(prepared.record.id().to_string());
    let mut values = prepared.record.to_values()?;

    match prepared.action {
        Action::Create => {
            values.insert(0, id);
            let mut stmt = tx.prepare_cached(&schema.upsert_sql())?;
            stmt.execute(rusqlite::params_from_iter(values))?;
        }
        Action::Update => {
            values.push(id);
            let mut stmt = tx.prepare_cached(&schema.update_sql())?;
            let changed = stmt.execute(rusqlite::params_from_iter(values))?;
            if changed == 0 {
                bail!(
                    "{} row {} does not exist, cannot update",
                    schema.name,
                    prepared.record.id()
                );
            }
        }
    }

    Ok(())
}
