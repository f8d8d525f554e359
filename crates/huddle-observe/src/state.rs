use futures_util::Stream;
use tokio::sync::watch;
use tracing::debug;

use crate::poller::changes;

/// Call state that only lives as long as the process: never persisted, reset
/// when the session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalCallsState {
    pub mic_permissions_granted: bool,
    /// Channel whose call is being joined, if any
    pub joining_channel_id: Option<String>,
}

/// Shared owner of [`GlobalCallsState`]. Create one at startup and pass it
/// around in an `Arc`.
pub struct CallsContext {
    state: watch::Sender<GlobalCallsState>,
}

impl CallsContext {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GlobalCallsState::default());
        Self { state }
    }

    pub fn get(&self) -> GlobalCallsState {
        self.state.borrow().clone()
    }

    /// Replace the whole state. Subscribers are notified before this returns.
    pub fn set(&self, state: GlobalCallsState) {
        self.state.send_replace(state);
    }

    pub fn update(&self, modify: impl FnOnce(&mut GlobalCallsState)) {
        self.state.send_modify(modify);
    }

    pub fn subscribe(&self) -> watch::Receiver<GlobalCallsState> {
        self.state.subscribe()
    }

    /// The current state, then every later state. Slow consumers only see the
    /// latest one.
    pub fn observe(&self) -> impl Stream<Item = GlobalCallsState> + Send + 'static {
        changes(self.state.subscribe(), |state: &GlobalCallsState| Some(state.clone()))
    }

    pub fn set_mic_permissions_granted(&self, granted: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.mic_permissions_granted != granted;
            state.mic_permissions_granted = granted;
            changed
        });
    }

    pub fn set_joining_channel(&self, channel_id: Option<String>) {
        self.state.send_if_modified(|state| {
            if state.joining_channel_id == channel_id {
                return false;
            }
            state.joining_channel_id = channel_id;
            true
        });
    }

    /// Back to defaults, on logout or session teardown.
    pub fn reset(&self) {
        debug!("Resetting calls state");
        self.set(GlobalCallsState::default());
    }
}

impl Default for CallsContext {
    fn default() -> Self {
        Self::new()
    }
}
