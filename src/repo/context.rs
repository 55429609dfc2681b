use super::{DiffRange, Revision};

/// Immutable carrier for the revision and diff range an operation targets.
///
/// Attaching a value derives a new context; ancestors are never mutated, so
/// concurrent operations sharing a parent cannot interfere. Accessors fall
/// back to defaults when nothing was attached: the sentinel revision and the
/// zero diff range.
#[derive(Debug, Clone, Default)]
pub struct RevisionContext {
    revision: Option<Revision>,
    range: Option<DiffRange>,
}

impl RevisionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_revision(&self, revision: Revision) -> Self {
        Self {
            revision: Some(revision),
            range: self.range.clone(),
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision.clone().unwrap_or_else(Revision::head)
    }

    pub fn with_diff(&self, from: Revision, to: Revision) -> Self {
        Self {
            revision: self.revision.clone(),
            range: Some(DiffRange { from, to }),
        }
    }

    pub fn diff_range(&self) -> DiffRange {
        self.range.clone().unwrap_or_default()
    }
}
