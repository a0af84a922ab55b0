//! Error types for the execution engine.
//!
//! The taxonomy separates user errors, which are rejected before any
//! container work and map to client-side HTTP statuses, from daemon-phase
//! failures, which carry the underlying container client error as their
//! source. Non-fatal conditions (stats sampling, artifact collection,
//! teardown) never surface here; they are logged and swallowed inside the
//! session.

use thiserror::Error;

use crate::docker::ContainerError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid language")]
    InvalidLanguage,
    #[error("no files")]
    NoFiles,
    #[error("no sources")]
    NoSources,
    #[error("invalid reference format: {0:?}")]
    InvalidImageReference(String),
    #[error("no image: {0:?}")]
    ImageNotPresent(String),
    #[error("image pull failed for {image:?}: {source}")]
    ImagePullFailed {
        image: String,
        #[source]
        source: ContainerError,
    },
    #[error("container create failed: {0}")]
    CreateFailed(#[source] ContainerError),
    #[error("file copy-in failed: {0}")]
    CopyInFailed(#[source] ContainerError),
    #[error("container start failed: {0}")]
    StartFailed(#[source] ContainerError),
    #[error("exec attach failed: {0}")]
    ExecAttachFailed(#[source] ContainerError),
    #[error("notebook parse failed: {0}")]
    NotebookParseFailed(#[source] serde_json::Error),
}

impl EngineError {
    /// True for errors caused by the request itself, rejected before any
    /// container operation. The HTTP layer maps these to 400.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidLanguage | EngineError::NoFiles | EngineError::NoSources
        )
    }
}
