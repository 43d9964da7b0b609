//! Error taxonomy
//!
//! Typed failures for the skill store and session layers. Content-store
//! mutations are all-or-nothing: any error raised after a destructive
//! filesystem step has already been compensated (trash restore, partial
//! staging removal) before it reaches the caller.

use std::path::PathBuf;

/// Errors surfaced by skill storage, resolution, and routing
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    /// Bad slug/name/description/path input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Sandbox-escape attempt; never partially applied
    #[error("path violation: {0}")]
    PathViolation(String),

    /// Unknown skill or missing file
    #[error("not found: {0}")]
    NotFound(String),

    /// Slug or directory collision
    #[error("conflict: {0}")]
    Conflict(String),

    /// Disk failure during import/export or node operations
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// Archive read/write failure
    #[error("archive failure: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Repository (persistence) failure
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl SkillError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SkillError::Validation(msg.into())
    }

    pub fn path_violation(path: impl Into<PathBuf>) -> Self {
        SkillError::PathViolation(path.into().display().to_string())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        SkillError::NotFound(what.into())
    }
}

impl From<rusqlite::Error> for SkillError {
    fn from(e: rusqlite::Error) -> Self {
        SkillError::Persistence(e.to_string())
    }
}

pub type Result<T, E = SkillError> = std::result::Result<T, E>;
