use thiserror::Error;

/// A single payload could not be mapped onto a row. The entity is skipped and
/// the rest of the batch proceeds.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{entity} payload is missing required field `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("{entity} update requested without an existing record")]
    NoExistingRecord { entity: &'static str },
}

/// Failures that abort a whole sync call.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to look up existing {entity} records")]
    Lookup {
        entity: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Nothing from the batch was persisted.
    #[error("failed to commit batch for {description}")]
    Commit {
        description: String,
        #[source]
        source: anyhow::Error,
    },
}
