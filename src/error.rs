use std::path::PathBuf;

use crate::exif::TagType;
use crate::metadata::Group;

/// Errors produced by the metadata engine.
///
/// Field-level errors ([`EngineError::UnknownTagKind`], [`EngineError::TypeCoercion`])
/// are never fatal: the orchestrator records them as skipped fields and carries on.
/// [`EngineError::Codec`] moves the fallback ladder one tier down,
/// [`EngineError::MalformedContainer`] aborts the operation with the original file
/// untouched, and [`EngineError::Processing`] means every tier failed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown tag `{name}` in group {group}")]
    UnknownTagKind { group: Group, name: String },

    #[error("cannot convert value of `{tag}` to {expected:?}: {reason}")]
    TypeCoercion {
        tag: String,
        expected: TagType,
        reason: String,
    },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("processing failed for {}: {reason}", path.display())]
    Processing { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn codec(msg: impl std::fmt::Display) -> Self {
        Self::Codec(msg.to_string())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
