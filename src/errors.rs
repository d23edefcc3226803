//! Crate-wide error taxonomy: every variant is tagged as a fatal
//! error, an input error, a policy error, a transient failure, or an
//! invariant violation.
//!
//! Each component gets its own `thiserror` enum rather than a single
//! stringly-typed error, so callers can match on variant instead of
//! scraping messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Fatal: the pool could not be reached or a query was malformed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Input error: caller referenced an id that doesn't exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// Input error: a stored or supplied string didn't match a known enum.
    #[error("invalid enum value {value:?} for {field}")]
    InvalidEnum { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Policy error: a plan path resolved outside the workspace root.
    #[error("path escapes workspace root: {path}")]
    PathEscape { path: String },
    /// Transient failure: the filesystem rejected a write.
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum VcsError {
    /// Transient failure: the underlying git operation failed.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    /// Input error: a clone was requested with no remote to clone from.
    #[error("clone requested without a remote")]
    MissingRemote,
    /// Policy error: setup was asked to initialize a workspace twice.
    #[error("workspace already exists at {path}")]
    AlreadyExists { path: String },
    /// Transient failure: filesystem error outside of git2's own errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transient failure: the deadline elapsed before a reply arrived.
    #[error("model gateway timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// Transient failure: the upstream model call itself failed.
    #[error("model gateway error: {0}")]
    Upstream(String),
}

#[derive(Debug, Error)]
pub enum DialogError {
    /// Input error: caller referenced a dialog id that doesn't exist.
    #[error("dialog not found")]
    NotFound,
    /// Policy error: the dialog was already resolved once.
    #[error("dialog already resolved")]
    AlreadyResolved,
    /// Policy error: no option was given and the dialog has no default.
    #[error("no option selected and no default option available")]
    NoOptionAvailable,
    /// Invariant violation: conditional update affected zero rows.
    #[error("lost race resolving dialog")]
    LostRace,
}
