use std::io;

use thiserror::Error;

/// Errors surfaced by the storage engine.
///
/// Locally recoverable conditions (e.g. "record doesn't fit, trigger a
/// split") are handled with `bool`/`Option` at the call site and never
/// allocate one of these; this type is for conditions a caller must see.
#[derive(Debug, Error)]
pub enum Error {
    #[error("relation or table not found: {0}")]
    NotFound(String),

    #[error("relation already registered: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("page {blockid} corrupt: {reason}")]
    Corruption { blockid: u32, reason: &'static str },

    #[error("record of {record_len} bytes exceeds page capacity of {page_capacity} bytes")]
    Capacity {
        record_len: usize,
        page_capacity: usize,
    },

    #[error("invariant violated: {0}")]
    Invariant(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
