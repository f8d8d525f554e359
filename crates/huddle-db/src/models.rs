//! Database row types. These map directly to SQLite rows and are what the sync
//! pipeline prepares and the batch writer commits.

use anyhow::Result;
use rusqlite::Row;
use rusqlite::types::{Type, Value};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use huddle_types::models::{
    BoardsLimit, FileInfo, FilesLimit, IntegrationsLimit, MessagesLimit, ParticipantStatus,
    TeamsLimit,
};

use crate::schema::{
    CONFERENCE, CONFERENCE_PARTICIPANT, DRAFT, TableSchema, USAGE_COUNTERS, USAGE_LIMIT,
};

/// A row type bound to one table of the schema registry.
///
/// `to_values` and `from_row` both follow the column order of [`Record::schema`],
/// with the id handled separately (first on read, see [`TableSchema::select_sql`]).
pub trait Record: Sized + Clone + Send + 'static {
    fn schema() -> &'static TableSchema;

    fn id(&self) -> &str;

    fn to_values(&self) -> Result<Vec<Value>>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Participant identity: one row per user per conference.
pub fn participant_id(conference_id: &str, user_id: &str) -> String {
    format!("{}-{}", conference_id, user_id)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceRow {
    pub id: String,
    pub url: String,
    pub channel_id: String,
    pub team_id: String,
    pub user_id: String,
    pub create_at: i64,
    pub delete_at: Option<i64>,
}

impl ConferenceRow {
    pub fn is_deleted(&self) -> bool {
        self.delete_at.is_some()
    }
}

impl Record for ConferenceRow {
    fn schema() -> &'static TableSchema {
        &CONFERENCE
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.url),
            text(&self.channel_id),
            text(&self.team_id),
            text(&self.user_id),
            Value::Integer(self.create_at),
            opt_int(self.delete_at),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            channel_id: row.get(2)?,
            team_id: row.get(3)?,
            user_id: row.get(4)?,
            create_at: row.get(5)?,
            delete_at: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceParticipantRow {
    pub id: String,
    pub channel_id: String,
    pub conference_id: String,
    pub user_id: String,
    pub present: bool,
    pub status: ParticipantStatus,
}

impl Record for ConferenceParticipantRow {
    fn schema() -> &'static TableSchema {
        &CONFERENCE_PARTICIPANT
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.channel_id),
            text(&self.conference_id),
            text(&self.user_id),
            Value::Integer(self.present as i64),
            text(self.status.as_str()),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(5)?;
        let status = status
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;

        Ok(Self {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            conference_id: row.get(2)?,
            user_id: row.get(3)?,
            present: row.get(4)?,
            status,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftRow {
    pub id: String,
    pub create_at: i64,
    pub update_at: i64,
    pub delete_at: i64,
    pub user_id: String,
    pub channel_id: String,
    /// Empty unless the draft is a thread reply
    pub root_id: String,
    pub files: Vec<FileInfo>,
    pub message: String,
    pub props: JsonValue,
    pub metadata: Option<JsonValue>,
    pub priority: Option<JsonValue>,
    pub timestamp: Option<i64>,
}

impl Record for DraftRow {
    fn schema() -> &'static TableSchema {
        &DRAFT
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Integer(self.create_at),
            Value::Integer(self.update_at),
            Value::Integer(self.delete_at),
            text(&self.user_id),
            text(&self.channel_id),
            text(&self.root_id),
            json(&self.files)?,
            text(&self.message),
            json(&self.props)?,
            opt_json(&self.metadata)?,
            opt_json(&self.priority)?,
            opt_int(self.timestamp),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            create_at: row.get(1)?,
            update_at: row.get(2)?,
            delete_at: row.get(3)?,
            user_id: row.get(4)?,
            channel_id: row.get(5)?,
            root_id: row.get(6)?,
            files: json_column(row, 7)?,
            message: row.get(8)?,
            props: json_column(row, 9)?,
            metadata: opt_json_column(row, 10)?,
            priority: opt_json_column(row, 11)?,
            timestamp: row.get(12)?,
        })
    }
}

/// Plan limits of a team. `id` is the team id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageLimitRow {
    pub id: String,
    pub boards: BoardsLimit,
    pub bots: i64,
    pub custom_emojis: i64,
    pub files: FilesLimit,
    pub guests: i64,
    pub incoming_webhooks: i64,
    pub integrations: IntegrationsLimit,
    pub members: i64,
    pub messages: MessagesLimit,
    pub outgoing_webhooks: i64,
    pub private_channels: i64,
    pub public_channels: i64,
    pub reminder_custom_date: bool,
    pub scheduled_draft_custom_date: bool,
    pub sidebar_categories: i64,
    pub storage: i64,
    pub teams: TeamsLimit,
}

impl Record for UsageLimitRow {
    fn schema() -> &'static TableSchema {
        &USAGE_LIMIT
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            json(&self.boards)?,
            Value::Integer(self.bots),
            Value::Integer(self.custom_emojis),
            json(&self.files)?,
            Value::Integer(self.guests),
            Value::Integer(self.incoming_webhooks),
            json(&self.integrations)?,
            Value::Integer(self.members),
            json(&self.messages)?,
            Value::Integer(self.outgoing_webhooks),
            Value::Integer(self.private_channels),
            Value::Integer(self.public_channels),
            Value::Integer(self.reminder_custom_date as i64),
            Value::Integer(self.scheduled_draft_custom_date as i64),
            Value::Integer(self.sidebar_categories),
            Value::Integer(self.storage),
            json(&self.teams)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            boards: json_column(row, 1)?,
            bots: row.get(2)?,
            custom_emojis: row.get(3)?,
            files: json_column(row, 4)?,
            guests: row.get(5)?,
            incoming_webhooks: row.get(6)?,
            integrations: json_column(row, 7)?,
            members: row.get(8)?,
            messages: json_column(row, 9)?,
            outgoing_webhooks: row.get(10)?,
            private_channels: row.get(11)?,
            public_channels: row.get(12)?,
            reminder_custom_date: row.get(13)?,
            scheduled_draft_custom_date: row.get(14)?,
            sidebar_categories: row.get(15)?,
            storage: row.get(16)?,
            teams: json_column(row, 17)?,
        })
    }
}

/// Current consumption of a team. `id` is the team id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageCountersRow {
    pub id: String,
    pub custom_emojis: i64,
    pub guests: i64,
    pub incoming_webhooks: i64,
    pub members: i64,
    pub outgoing_webhooks: i64,
    pub pending_guests: i64,
    pub private_channels: i64,
    pub public_channels: i64,
    pub sidebar_categories: i64,
    pub storage: i64,
}

impl Record for UsageCountersRow {
    fn schema() -> &'static TableSchema {
        &USAGE_COUNTERS
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Integer(self.custom_emojis),
            Value::Integer(self.guests),
            Value::Integer(self.incoming_webhooks),
            Value::Integer(self.members),
            Value::Integer(self.outgoing_webhooks),
            Value::Integer(self.pending_guests),
            Value::Integer(self.private_channels),
            Value::Integer(self.public_channels),
            Value::Integer(self.sidebar_categories),
            Value::Integer(self.storage),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            custom_emojis: row.get(1)?,
            guests: row.get(2)?,
            incoming_webhooks: row.get(3)?,
            members: row.get(4)?,
            outgoing_webhooks: row.get(5)?,
            pending_guests: row.get(6)?,
            private_channels: row.get(7)?,
            public_channels: row.get(8)?,
            sidebar_categories: row.get(9)?,
            storage: row.get(10)?,
        })
    }
}

// -- Column codecs --

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_int(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(Value::Text(serde_json::to_string(value)?))
}

fn opt_json<T: Serialize>(value: &Option<T>) -> Result<Value> {
    match value {
        Some(v) => json(v),
        None => Ok(Value::Null),
    }
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_match_schema_width() {
        let conference = ConferenceRow {
            id: "c1".into(),
            url: String::new(),
            channel_id: "ch1".into(),
            team_id: "t1".into(),
            user_id: "u1".into(),
            create_at: 1000,
            delete_at: None,
        };
        assert_eq!(conference.to_values().unwrap().len(), ConferenceRow::schema().columns.len());

        let limits = UsageLimitRow::default();
        assert_eq!(limits.to_values().unwrap().len(), UsageLimitRow::schema().columns.len());

        let counters = UsageCountersRow::default();
        assert_eq!(counters.to_values().unwrap().len(), UsageCountersRow::schema().columns.len());
    }

    #[test]
    fn participant_ids_are_composite() {
        assert_eq!(participant_id("c1", "u2"), "c1-u2");
    }
}
