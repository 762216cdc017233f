use std::path::PathBuf;

use thiserror::Error;

/// Rejected manual time entry. Nothing is written when one of these is returned.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum EntryError {
    #[error("invalid time: hour must be 1-12, got {0}")]
    HourOutOfRange(u32),
    #[error("invalid time: minute must be 0-59, got {0}")]
    MinuteOutOfRange(u32),
    #[error("invalid time '{0}', expected H:MM AM or H:MM PM")]
    Malformed(String),
    #[error("missing day of week")]
    MissingWeekday,
    #[error("unknown day of week '{0}'")]
    UnknownWeekday(String),
    #[error("time {0} cannot be resolved in GMT+8")]
    Unresolvable(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to read timer store {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("timer store {} has invalid JSON at line {line}, column {column}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("unsupported timer store version {0}; expected version 1")]
    Version(u32),
    #[error("unable to write timer store {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to encode timer store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure of a user action (mark defeated, set respawn time).
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown boss id '{0}'")]
    UnknownBoss(String),
    #[error("boss '{id}' {reason}")]
    WrongKind { id: String, reason: &'static str },
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("timer store is unavailable")]
    StoreUnavailable,
}
