use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A participant's admission state inside a conference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Approved,
    #[default]
    Pending,
    Denied,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "pending" => Ok(Self::Pending),
            "denied" => Ok(Self::Denied),
            other => Err(format!("unknown participant status: {}", other)),
        }
    }
}

/// A file attached to a draft that has not been uploaded yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

// -- Plan limits --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardsLimit {
    pub cards: i64,
    pub views: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilesLimit {
    pub total_storage: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationsLimit {
    pub enabled: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesLimit {
    pub history: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamsLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_wire_names() {
        let status: ParticipantStatus = serde_json::from_str("\"denied\"").unwrap();
        assert_eq!(status, ParticipantStatus::Denied);
        assert_eq!("approved".parse::<ParticipantStatus>().unwrap(), ParticipantStatus::Approved);
        assert!("maybe".parse::<ParticipantStatus>().is_err());
    }
}
