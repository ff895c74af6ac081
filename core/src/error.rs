use thiserror::Error;

use crate::{
    lifecycle::LifecycleStage,
    port::PortFailure,
    records::{RecordKind, RecordRef},
    types::EntityId,
};

#[derive(Error, Debug)]
pub enum OnboardingError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    RecordNotFound { kind: RecordKind, id: EntityId },

    #[error("Stale transition on {record}: status is '{current}', cannot move to '{requested}'")]
    StaleTransition {
        record: RecordRef,
        current: LifecycleStage,
        requested: LifecycleStage,
    },

    #[error("Remote operation '{operation}' failed: {source}")]
    RemoteOperation {
        operation: &'static str,
        #[source]
        source: PortFailure,
    },

    #[error("Persistence failure on {record}: {reason}")]
    Persistence { record: RecordRef, reason: String },

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("Unknown status value '{0}'")]
    UnknownStatus(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type OnboardingResult<T> = Result<T, OnboardingError>;
