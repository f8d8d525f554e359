//! Merges payloads from the remote service into the local store.
//!
//! Every entity kind goes through the same pipeline: deduplicate the incoming
//! batch ([`dedupe`]), decide create vs update against the store and map each
//! payload onto a row ([`transform`]), then either hand the prepared rows back
//! (dry run) or commit them in one transaction. [`operator::SyncOperator`] is
//! the entry point.

pub mod dedupe;
pub mod error;
pub mod events;
pub mod handler;
pub mod operator;
pub mod transform;

pub use error::{SyncError, TransformError};
pub use operator::SyncOperator;
