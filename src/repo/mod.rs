pub mod context;
pub mod diff;
pub mod error;
pub mod git;

use std::fmt;
use std::io::{Cursor, Read, Write};

pub use context::RevisionContext;
pub use diff::render_patch;
pub use error::{RepoError, RepoResult};
pub use git::GitRepo;

const HEAD_REF: &str = "HEAD";

/// Opaque identifier naming an immutable snapshot, or the `HEAD` sentinel
/// standing for the live working copy's most recent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    pub fn head() -> Self {
        Revision(HEAD_REF.to_string())
    }

    pub fn is_head(&self) -> bool {
        self.0 == HEAD_REF
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Revision {
    fn from(value: String) -> Self {
        Revision(value)
    }
}

impl From<&str> for Revision {
    fn from(value: &str) -> Self {
        Revision(value.to_string())
    }
}

/// Pair of revisions bounding a commit-range diff. The zero value means
/// "not set": compare the working copy against its last snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffRange {
    pub from: Revision,
    pub to: Revision,
}

impl DiffRange {
    pub fn is_zero(&self) -> bool {
        self.from.is_empty() && self.to.is_empty()
    }
}

/// Classification of one working-copy path against the last snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Untracked,
    Added,
    Modified,
    Deleted,
    Unmodified,
}

impl ChangeClass {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeClass::Untracked => "?",
            ChangeClass::Added => "A",
            ChangeClass::Modified => "M",
            ChangeClass::Deleted => "D",
            ChangeClass::Unmodified => " ",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathStatus {
    pub path: String,
    pub class: ChangeClass,
}

/// Named readable byte source staged as one file. Ownership moves to
/// [`Committer::add`] for the duration of the call; each source is drained
/// fully and dropped before the next one is touched.
pub trait FileSource: Read {
    fn name(&self) -> &str;
}

/// In-memory [`FileSource`]. An empty payload stages the path as a removal.
pub struct MemoryFile {
    name: String,
    content: Cursor<Vec<u8>>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: Cursor::new(content.into()),
        }
    }
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.content.read(buf)
    }
}

impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }
}

pub trait Reader {
    /// Read `path` at the context's revision: the worktree for the sentinel,
    /// the named snapshot otherwise.
    fn read(&self, ctx: &RevisionContext, path: &str, out: &mut dyn Write) -> RepoResult<()>;

    /// Read `path` at the current head snapshot, ignoring any revision on
    /// `ctx`. The canonical "last committed" baseline for diffing.
    fn head(&self, ctx: &RevisionContext, path: &str, out: &mut dyn Write) -> RepoResult<()>;

    /// List every file visible at the context's revision. Unordered.
    fn list(&self, ctx: &RevisionContext) -> RepoResult<Vec<String>>;
}

pub trait Committer {
    fn add(&self, ctx: &RevisionContext, files: Vec<Box<dyn FileSource>>) -> RepoResult<()>;

    fn commit(&self, ctx: &RevisionContext, message: &str) -> RepoResult<Revision>;
}

pub trait Differ {
    /// Two-sided `(from, to)` content for one path: between the context's
    /// diff range, or head-vs-worktree when the range is zero.
    fn diff(&self, ctx: &RevisionContext, path: &str) -> RepoResult<(String, String)>;

    /// Write a single patch document covering every changed path.
    fn diff_patch(&self, ctx: &RevisionContext, out: &mut dyn Write) -> RepoResult<()>;
}

pub trait Repo: Reader + Committer + Differ {}

impl<T: Reader + Committer + Differ> Repo for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_class_labels_are_single_letters() {
        assert_eq!(ChangeClass::Untracked.label(), "?");
        assert_eq!(ChangeClass::Added.label(), "A");
        assert_eq!(ChangeClass::Modified.label(), "M");
        assert_eq!(ChangeClass::Deleted.label(), "D");
        assert_eq!(ChangeClass::Unmodified.label(), " ");
    }
}
