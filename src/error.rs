use thiserror::Error;

use crate::common::SiteId;

/// Crate-wide error type.
///
/// Only genuinely erroneous conditions live here: malformed input, unknown
/// names, and driver I/O. Recoverable engine conditions (lock conflicts,
/// unavailable replicas, uninitialized copies) are modelled as variants of
/// the storage-layer result enums instead, and invariant breaches are
/// assertions.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("unknown transaction '{0}'")]
    UnknownTransaction(String),

    #[error("unknown data item '{0}'")]
    UnknownItem(String),

    #[error("transaction {0} has started!!!")]
    DuplicateTransaction(String),

    #[error("transaction {0} is read-only; write operation not permitted")]
    ReadOnlyWrite(String),

    #[error("no such site: {0}")]
    NoSuchSite(SiteId),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
