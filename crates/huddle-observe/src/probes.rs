use std::sync::Arc;

use huddle_db::Database;
use huddle_db::models::ConferenceRow;

use crate::state::CallsContext;

/// A single read an observer repeats on every tick.
///
/// `read` may block; observers run it on the blocking pool.
pub trait Probe: Send + Sync + 'static {
    type Output: Clone + PartialEq + Send + Sync + 'static;

    fn read(&self) -> anyhow::Result<Self::Output>;
}

pub struct ParticipantCount {
    pub db: Arc<Database>,
    pub conference_id: String,
}

impl Probe for ParticipantCount {
    type Output = i64;

    fn read(&self) -> anyhow::Result<i64> {
        self.db.get_conference_participant_count(&self.conference_id)
    }
}

/// Whether anyone other than `excluding_user_id` is present.
pub struct AnyonePresent {
    pub db: Arc<Database>,
    pub conference_id: String,
    pub excluding_user_id: Option<String>,
}

impl Probe for AnyonePresent {
    type Output = bool;

    fn read(&self) -> anyhow::Result<bool> {
        self.db
            .has_participant_present(&self.conference_id, self.excluding_user_id.as_deref())
    }
}

pub struct ParticipantPresent {
    pub db: Arc<Database>,
    pub conference_id: String,
    pub user_id: String,
}

impl Probe for ParticipantPresent {
    type Output = bool;

    fn read(&self) -> anyhow::Result<bool> {
        self.db.is_participant_present(&self.conference_id, &self.user_id)
    }
}

pub struct ConferenceById {
    pub db: Arc<Database>,
    pub conference_id: String,
}

impl Probe for ConferenceById {
    type Output = Option<ConferenceRow>;

    fn read(&self) -> anyhow::Result<Option<ConferenceRow>> {
        self.db.get_conference_by_id(&self.conference_id)
    }
}

/// Microphone permission as last reported to the process state.
pub struct PermissionFlag {
    pub ctx: Arc<CallsContext>,
}

impl Probe for PermissionFlag {
    type Output = bool;

    fn read(&self) -> anyhow::Result<bool> {
        Ok(self.ctx.get().mic_permissions_granted)
    }
}
