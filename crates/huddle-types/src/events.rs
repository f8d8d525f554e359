use serde::{Deserialize, Serialize};

use crate::api::RawConference;

/// Conference events pushed by the server over the websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A conference was started or changed; carries the full payload
    ConferenceAdded(RawConference),

    /// The initiator ended their conference in a channel
    ConferenceDeleted(ConferenceGenericEvent),

    /// A user joined the call
    ConferenceUserConnected(ConferenceGenericEvent),

    /// A user declined the call
    ConferenceUserDenied(ConferenceGenericEvent),

    /// A user left the call
    ConferenceUserDisconnected(ConferenceGenericEvent),
}

/// Body shared by the per-user conference events. It does not carry the
/// conference id, only the channel it happens in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceGenericEvent {
    #[serde(default)]
    pub url: String,
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub team_id: String,
}

impl ServerEvent {
    /// Returns the channel the event is scoped to, when the payload names one.
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::ConferenceAdded(conference) => conference.channel_id.as_deref(),
            Self::ConferenceDeleted(e)
            | Self::ConferenceUserConnected(e)
            | Self::ConferenceUserDenied(e)
            | Self::ConferenceUserDisconnected(e) => Some(&e.channel_id),
        }
    }
}
