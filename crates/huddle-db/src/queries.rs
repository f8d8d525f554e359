use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::Database;
use crate::models::{
    ConferenceParticipantRow, ConferenceRow, DraftRow, Record, UsageCountersRow, UsageLimitRow,
};

/// SQLite caps bound parameters per statement; lookups are chunked below it.
const MAX_IDS_PER_QUERY: usize = 500;

impl Database {
    // -- Generic --

    /// Fetch the existing rows among `ids`, keyed by id.
    pub fn find_by_ids<R: Record>(&self, ids: &[String]) -> Result<HashMap<String, R>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let mut found = HashMap::with_capacity(ids.len());
            for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
                for row in query_by_ids::<R>(conn, chunk)? {
                    found.insert(row.id().to_string(), row);
                }
            }
            Ok(found)
        })
    }

    pub fn get_by_id<R: Record>(&self, id: &str) -> Result<Option<R>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE id = ?1", R::schema().select_sql());
            conn.query_row(&sql, [id], R::from_row).optional()
        })
    }

    // -- Conferences --

    pub fn get_conference_by_id(&self, id: &str) -> Result<Option<ConferenceRow>> {
        self.get_by_id(id)
    }

    /// The most recently created conference of a channel, tombstoned or not.
    pub fn get_latest_conference_in_channel(&self, channel_id: &str) -> Result<Option<ConferenceRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE channel_id = ?1 ORDER BY create_at DESC LIMIT 1",
                ConferenceRow::schema().select_sql()
            );
            conn.query_row(&sql, [channel_id], ConferenceRow::from_row).optional()
        })
    }

    /// Conferences started by `user_id` in `channel_id` that are not tombstoned.
    pub fn get_live_conferences_by_initiator(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Vec<ConferenceRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE channel_id = ?1 AND user_id = ?2 AND delete_at IS NULL",
                ConferenceRow::schema().select_sql()
            );
            query_rows(conn, &sql, rusqlite::params![channel_id, user_id])
        })
    }

    // -- Participants --

    /// Participants of a conference, ordered by id.
    pub fn get_conference_participants(
        &self,
        conference_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<ConferenceParticipantRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE conference_id = ?1 ORDER BY id ASC LIMIT ?2",
                ConferenceParticipantRow::schema().select_sql()
            );
            // LIMIT -1 means no limit in SQLite
            let limit = limit.map_or(-1, i64::from);
            query_rows(conn, &sql, rusqlite::params![conference_id, limit])
        })
    }

    pub fn get_conference_participant_count(&self, conference_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM conference_participant WHERE conference_id = ?1",
                [conference_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Whether at least one participant is present, optionally ignoring one user
    /// (usually the caller themselves).
    pub fn has_participant_present(&self, conference_id: &str, excluding_user_id: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM conference_participant
                     WHERE conference_id = ?1
                       AND present = 1
                       AND (?2 IS NULL OR user_id != ?2)
                     LIMIT 1",
                    rusqlite::params![conference_id, excluding_user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Whether one specific user is present in the conference.
    pub fn is_participant_present(&self, conference_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM conference_participant
                     WHERE conference_id = ?1 AND user_id = ?2 AND present = 1
                     LIMIT 1",
                    rusqlite::params![conference_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_participants_by_user(
        &self,
        conference_id: &str,
        user_id: &str,
    ) -> Result<Vec<ConferenceParticipantRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE conference_id = ?1 AND user_id = ?2",
                ConferenceParticipantRow::schema().select_sql()
            );
            query_rows(conn, &sql, rusqlite::params![conference_id, user_id])
        })
    }

    // -- Drafts --

    /// Live (not deleted) drafts for one channel/thread of a user.
    pub fn get_live_drafts(&self, user_id: &str, channel_id: &str, root_id: &str) -> Result<Vec<DraftRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE user_id = ?1 AND channel_id = ?2 AND root_id = ?3 AND delete_at = 0
                 ORDER BY update_at DESC",
                DraftRow::schema().select_sql()
            );
            query_rows(conn, &sql, rusqlite::params![user_id, channel_id, root_id])
        })
    }

    // -- Usage --

    pub fn get_usage_limits(&self, team_id: &str) -> Result<Option<UsageLimitRow>> {
        self.get_by_id(team_id)
    }

    pub fn get_usage_counters(&self, team_id: &str) -> Result<Option<UsageCountersRow>> {
        self.get_by_id(team_id)
    }
}

fn query_by_ids<R: Record>(conn: &Connection, ids: &[String]) -> Result<Vec<R>> {
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "{} WHERE id IN ({})",
        R::schema().select_sql(),
        placeholders.join(", ")
    );
    query_rows(conn, &sql, rusqlite::params_from_iter(ids.iter()))
}

fn query_rows<R: Record, P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<R>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, R::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
