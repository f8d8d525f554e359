//! Payloads as the remote service sends them. Every field is optional so that
//! a partial payload only overwrites what it actually carries.
//!
//! Nullable columns use `Option<Option<T>>`: the outer `None` means the key was
//! absent, `Some(None)` means the server sent an explicit `null`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    BoardsLimit, FileInfo, FilesLimit, IntegrationsLimit, MessagesLimit, ParticipantStatus,
    TeamsLimit,
};

// -- Conferences --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// The user who started the conference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<i64>,
    #[serde(
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub delete_at: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
    /// Keyed by user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registrants: Option<BTreeMap<String, RawRegistrant>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRegistrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ParticipantStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawParticipant {
    /// `{conference_id}-{user_id}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ParticipantStatus>,
}

// -- Drafts --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileInfo>>,
    #[serde(
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<Option<Value>>,
    #[serde(
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Option<Value>>,
    /// Scheduled send time, unix ms.
    #[serde(
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<Option<i64>>,
}

// -- Usage --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUsageLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boards: Option<BoardsLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bots: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_emojis: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FilesLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guests: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming_webhooks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrations: Option<IntegrationsLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<MessagesLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing_webhooks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_channels: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_channels: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_custom_date: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_draft_custom_date: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidebar_categories: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams: Option<TeamsLimit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUsageCounters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_emojis: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guests: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming_webhooks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing_webhooks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_guests: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_channels: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_channels: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidebar_categories: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<i64>,
}

/// Keeps "key absent" and "key set to null" apart.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}
