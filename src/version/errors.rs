//! Error type of the version layer.

use super::record::VersionId;
use thiserror::Error;

/// Caller-visible failures of the version manager.
///
/// Invariant violations (a corrupt parent pointer, detaching a version
/// that is not attached, deregistering an untracked version) are not
/// represented here; those panic.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no version with id {0}")]
    NotFound(VersionId),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("version {0} is already attached")]
    Busy(VersionId),
    #[error("limit of {limit} live versions reached")]
    OverLimit { limit: usize },
    #[error("version records exhausted")]
    OutOfMemory,
    #[error("metadata store failure")]
    Persistence(#[from] crate::metadata::Error),
    #[error("creating version {0} violates the snapshot/clone rules")]
    RuleViolation(VersionId),
}

pub type Result<T> = std::result::Result<T, Error>;
