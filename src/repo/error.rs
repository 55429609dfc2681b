use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors surfaced by the repository layer. Never retried internally;
/// partially-applied multi-file staging is not rolled back.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Path absent from the read target.
    #[error("path not found: {0}")]
    NotFound(String),

    /// Revision string does not name an existing snapshot.
    #[error("cannot resolve revision: {0}")]
    Resolve(String),

    /// Staged state is identical to the last snapshot.
    #[error("nothing to commit")]
    NothingToCommit,

    /// The repository has no working copy to read or stage against.
    #[error("bare repositories are not supported")]
    Bare,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}
