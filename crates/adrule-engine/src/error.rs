use adrule_platform::error::PlatformError;
use adrule_storage::StorageError;

/// Errors raised while running rules or reverting actions.
///
/// Failed platform calls during a run are not errors at this level; they
/// are recorded on the action record and counted. Anything surfacing as an
/// `EngineError` from a run aborts that rule's execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine: storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Engine: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Engine: platform failure: {0}")]
    Platform(#[from] PlatformError),

    /// The rule definition cannot be evaluated as stored.
    #[error("Engine: rule {rule_id} is invalid: {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("Engine: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// Rollback was requested for a record that cannot be reverted.
    #[error("Engine: action record {record_id} cannot be rolled back: {reason}")]
    NotRollbackable { record_id: String, reason: String },

    #[error("Engine: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
