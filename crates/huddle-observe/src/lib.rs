//! Read side of the local store.
//!
//! The store does not push change notifications, so observers poll it on an
//! interval and only emit when the value they read actually changed.

pub mod observers;
pub mod poller;
pub mod probes;
pub mod state;

pub use observers::{
    observe_conference, observe_has_anyone_present, observe_participant_count,
    observe_participant_present, observe_permission_flag,
};
pub use poller::{ObserverConfig, ObserverHandle, PollingObserver, known_key};
pub use probes::Probe;
pub use state::{CallsContext, GlobalCallsState};
