use std::collections::VecDeque;
use std::fs;
use std::io::{self, Read as _, Write};
use std::path::{Path, PathBuf};

use git2::{
    Commit, DiffFormat, ErrorCode, ObjectType, Repository, Signature, Status, StatusOptions,
    TreeWalkMode, TreeWalkResult,
};
use tracing::{debug, info};

use super::context::RevisionContext;
use super::diff::render_patch;
use super::error::{RepoError, RepoResult};
use super::{ChangeClass, Committer, DiffRange, Differ, FileSource, PathStatus, Reader, Revision};

const DEFAULT_AUTHOR: &str = "revlens";

/// git2-backed implementation of the repository access and diff layer.
///
/// The working copy and staging area are shared mutable state with no
/// internal locking; callers wanting concurrent writers must serialize
/// externally.
pub struct GitRepo {
    repo: Repository,
    workdir: PathBuf,
    author: String,
}

fn classify(status: Status) -> ChangeClass {
    if status.contains(Status::WT_NEW) {
        ChangeClass::Untracked
    } else if status.contains(Status::INDEX_NEW) {
        ChangeClass::Added
    } else if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
        ChangeClass::Deleted
    } else if status.intersects(
        Status::INDEX_MODIFIED
            | Status::WT_MODIFIED
            | Status::INDEX_RENAMED
            | Status::WT_RENAMED
            | Status::INDEX_TYPECHANGE
            | Status::WT_TYPECHANGE,
    ) {
        ChangeClass::Modified
    } else {
        ChangeClass::Unmodified
    }
}

impl GitRepo {
    /// Open the repository at `path`, searching parent directories.
    pub fn discover(path: &Path) -> RepoResult<Self> {
        Self::from_repo(Repository::discover(path)?)
    }

    /// Open the repository at exactly `path`.
    pub fn open(path: &Path) -> RepoResult<Self> {
        Self::from_repo(Repository::open(path)?)
    }

    fn from_repo(repo: Repository) -> RepoResult<Self> {
        let workdir = repo.workdir().ok_or(RepoError::Bare)?.to_path_buf();
        Ok(Self {
            repo,
            workdir,
            author: DEFAULT_AUTHOR.to_string(),
        })
    }

    /// Replace the fixed commit author identity.
    pub fn with_author(mut self, name: impl Into<String>) -> Self {
        self.author = name.into();
        self
    }

    fn commit_object(&self, rev: &Revision) -> RepoResult<Commit<'_>> {
        let object = self
            .repo
            .revparse_single(rev.as_str())
            .map_err(|_| RepoError::Resolve(rev.to_string()))?;
        object
            .peel_to_commit()
            .map_err(|_| RepoError::Resolve(rev.to_string()))
    }

    fn head_revision(&self) -> RepoResult<Revision> {
        let commit = self.repo.head()?.peel_to_commit()?;
        Ok(Revision::from(commit.id().to_string()))
    }

    fn read_from_worktree(&self, path: &str, out: &mut dyn Write) -> RepoResult<()> {
        let mut file = fs::File::open(self.workdir.join(path)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                RepoError::NotFound(path.to_string())
            } else {
                RepoError::Io(e)
            }
        })?;
        io::copy(&mut file, out)?;
        Ok(())
    }

    fn read_from_commit(&self, rev: &Revision, path: &str, out: &mut dyn Write) -> RepoResult<()> {
        let commit = self.commit_object(rev)?;
        let tree = commit.tree()?;
        let entry = tree.get_path(Path::new(path)).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                RepoError::NotFound(path.to_string())
            } else {
                RepoError::Git(e)
            }
        })?;
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        out.write_all(blob.content())?;
        Ok(())
    }

    fn list_from_worktree(&self) -> RepoResult<Vec<String>> {
        let mut paths = Vec::new();
        let mut queue = VecDeque::from([PathBuf::new()]);
        while let Some(dir) = queue.pop_front() {
            for entry in fs::read_dir(self.workdir.join(&dir))? {
                let entry = entry?;
                let rel = dir.join(entry.file_name());
                if entry.file_type()?.is_dir() {
                    if entry.file_name() != ".git" {
                        queue.push_back(rel);
                    }
                } else {
                    paths.push(rel.to_string_lossy().into_owned());
                }
            }
        }
        Ok(paths)
    }

    fn list_from_commit(&self, rev: &Revision) -> RepoResult<Vec<String>> {
        let tree = self.commit_object(rev)?.tree()?;
        let mut paths = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    paths.push(format!("{root}{name}"));
                }
            }
            TreeWalkResult::Ok
        })?;
        Ok(paths)
    }

    /// Classify every working-copy path against the last snapshot. A clean
    /// tree yields an empty vec. Unordered; callers needing determinism sort.
    pub fn status(&self) -> RepoResult<Vec<PathStatus>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut result = Vec::with_capacity(statuses.len());
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            result.push(PathStatus {
                path: path.to_string(),
                class: classify(entry.status()),
            });
        }
        Ok(result)
    }

    /// Stage each entry in order: an empty payload removes the path from the
    /// working copy and stages the removal, anything else is written to disk
    /// and staged. Fail-fast; earlier entries stay staged, and the index is
    /// persisted per entry so they survive the failing call.
    fn stage(&self, entries: Vec<(String, Vec<u8>)>) -> RepoResult<()> {
        let mut index = self.repo.index()?;
        for (path, bytes) in entries {
            if bytes.is_empty() {
                debug!(path = %path, "staging removal");
                // Already absent from disk is fine; the removal still gets
                // staged so the next commit drops the path.
                match fs::remove_file(self.workdir.join(&path)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(RepoError::Io(e)),
                }
                index.remove_path(Path::new(&path))?;
            } else {
                debug!(path = %path, size = bytes.len(), "staging write");
                let full = self.workdir.join(&path);
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&full, &bytes)?;
                index.add_path(Path::new(&path))?;
            }
            index.write()?;
        }
        Ok(())
    }

    fn read_string<F>(&self, read: F) -> RepoResult<String>
    where
        F: FnOnce(&mut dyn Write) -> RepoResult<()>,
    {
        let mut buf = Vec::new();
        read(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn diff_from_worktree(&self, ctx: &RevisionContext, path: &str) -> RepoResult<(String, String)> {
        let from = self.read_string(|w| self.head(ctx, path, w))?;
        let to = self.read_string(|w| self.read(ctx, path, w))?;
        Ok((from, to))
    }

    fn diff_from_commits(&self, range: &DiffRange, path: &str) -> RepoResult<(String, String)> {
        let from = self.read_string(|w| {
            self.read_from_commit(&range.from, path, w)
        })?;
        let to = self.read_string(|w| self.read_from_commit(&range.to, path, w))?;
        Ok((from, to))
    }

    /// Worktree-mode patch synthesis: one fragment per untracked, added, or
    /// modified path. Deleted paths produce no fragment of their own; their
    /// removed content surfaces through commit-range diffs instead.
    fn patch_from_worktree(&self, ctx: &RevisionContext, out: &mut dyn Write) -> RepoResult<()> {
        let status = self.status()?;
        if status.is_empty() {
            return Ok(());
        }
        let mut fragments = Vec::with_capacity(status.len() * 2);
        for entry in status {
            match entry.class {
                ChangeClass::Untracked | ChangeClass::Added => {
                    let to = self.read_string(|w| self.read(ctx, &entry.path, w))?;
                    let patch = render_patch(&entry.path, "", &to);
                    fragments.push(entry.path);
                    fragments.push(patch);
                }
                ChangeClass::Modified => {
                    let (from, to) = self.diff(ctx, &entry.path)?;
                    let patch = render_patch(&entry.path, &from, &to);
                    fragments.push(entry.path);
                    fragments.push(patch);
                }
                ChangeClass::Deleted | ChangeClass::Unmodified => {}
            }
        }
        out.write_all(fragments.join("\n").as_bytes())?;
        Ok(())
    }

    /// Commit-range patch synthesis: the store's native tree-to-tree diff,
    /// streamed straight to the sink.
    fn patch_from_commits(&self, range: &DiffRange, out: &mut dyn Write) -> RepoResult<()> {
        let from_tree = self.commit_object(&range.from)?.tree()?;
        let to_tree = self.commit_object(&range.to)?.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&from_tree), Some(&to_tree), None)?;
        let mut write_err: Option<io::Error> = None;
        let printed = diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            let result = match line.origin() {
                '+' | '-' | ' ' => out
                    .write_all(&[line.origin() as u8])
                    .and_then(|()| out.write_all(line.content())),
                _ => out.write_all(line.content()),
            };
            match result {
                Ok(()) => true,
                Err(e) => {
                    write_err = Some(e);
                    false
                }
            }
        });
        if let Some(e) = write_err {
            return Err(RepoError::Io(e));
        }
        printed?;
        Ok(())
    }
}

impl Reader for GitRepo {
    fn read(&self, ctx: &RevisionContext, path: &str, out: &mut dyn Write) -> RepoResult<()> {
        let rev = ctx.revision();
        if rev.is_head() {
            self.read_from_worktree(path, out)
        } else {
            self.read_from_commit(&rev, path, out)
        }
    }

    fn head(&self, ctx: &RevisionContext, path: &str, out: &mut dyn Write) -> RepoResult<()> {
        let head = self.head_revision()?;
        self.read(&ctx.with_revision(head), path, out)
    }

    fn list(&self, ctx: &RevisionContext) -> RepoResult<Vec<String>> {
        let rev = ctx.revision();
        if rev.is_head() {
            self.list_from_worktree()
        } else {
            self.list_from_commit(&rev)
        }
    }
}

impl Committer for GitRepo {
    fn add(&self, _ctx: &RevisionContext, files: Vec<Box<dyn FileSource>>) -> RepoResult<()> {
        let mut entries = Vec::with_capacity(files.len());
        for mut file in files {
            let name = file.name().to_string();
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            entries.push((name, bytes));
            // source dropped here, before the next one is drained
        }
        self.stage(entries)
    }

    fn commit(&self, _ctx: &RevisionContext, message: &str) -> RepoResult<Revision> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                None
            }
            Err(e) => return Err(RepoError::Git(e)),
        };
        match &parent {
            Some(parent) if parent.tree_id() == tree_id => return Err(RepoError::NothingToCommit),
            None if tree.len() == 0 => return Err(RepoError::NothingToCommit),
            _ => {}
        }
        let email = format!("{}@localhost", self.author);
        let signature = Signature::now(&self.author, &email)?;
        let parents: Vec<&Commit> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!(revision = %oid, "committed staged changes");
        Ok(Revision::from(oid.to_string()))
    }
}

impl Differ for GitRepo {
    fn diff(&self, ctx: &RevisionContext, path: &str) -> RepoResult<(String, String)> {
        let range = ctx.diff_range();
        if range.is_zero() {
            self.diff_from_worktree(ctx, path)
        } else {
            self.diff_from_commits(&range, path)
        }
    }

    fn diff_patch(&self, ctx: &RevisionContext, out: &mut dyn Write) -> RepoResult<()> {
        let range = ctx.diff_range();
        if range.is_zero() {
            self.patch_from_worktree(ctx, out)
        } else {
            self.patch_from_commits(&range, out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{MemoryFile, Repo};
    use tempfile::TempDir;

    fn init_repo() -> (TempDir, GitRepo) {
        let dir = TempDir::new().unwrap();
        git2::Repository::init(dir.path()).unwrap();
        let repo = GitRepo::open(dir.path()).unwrap();
        (dir, repo)
    }

    fn sources(files: &[(&str, &str)]) -> Vec<Box<dyn FileSource>> {
        files
            .iter()
            .map(|(name, content)| {
                Box::new(MemoryFile::new(*name, content.as_bytes())) as Box<dyn FileSource>
            })
            .collect()
    }

    fn read_all<R: Repo>(repo: &R, ctx: &RevisionContext, path: &str) -> RepoResult<String> {
        let mut buf = Vec::new();
        repo.read(ctx, path, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap())
    }

    fn patch_text<R: Repo>(repo: &R, ctx: &RevisionContext) -> String {
        let mut buf = Vec::new();
        repo.diff_patch(ctx, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn sorted_list<R: Repo>(repo: &R, ctx: &RevisionContext) -> Vec<String> {
        let mut paths = repo.list(ctx).unwrap();
        paths.sort();
        paths
    }

    // Staged end-to-end scenario, written against the trait seam so any Repo
    // implementation can run it.
    fn run_repo_scenario<R: Repo>(repo: &R) {
        let ctx = RevisionContext::new();

        // first change set
        repo.add(
            &ctx,
            sources(&[("test.txt", "something"), ("dir/test.txt", "something")]),
        )
        .unwrap();
        let patch = patch_text(repo, &ctx);
        assert!(patch.contains("+something"), "patch: {patch}");
        let r1 = repo.commit(&ctx, "change 0").unwrap();
        assert_eq!(sorted_list(repo, &ctx), vec!["dir/test.txt", "test.txt"]);
        assert_eq!(read_all(repo, &ctx, "dir/test.txt").unwrap(), "something");

        // second change set: delete one path, rewrite the other
        repo.add(
            &ctx,
            sources(&[("test.txt", ""), ("dir/test.txt", "other thing")]),
        )
        .unwrap();
        let patch = patch_text(repo, &ctx);
        assert!(patch.contains("-something"), "patch: {patch}");
        let r2 = repo.commit(&ctx, "change 1").unwrap();
        assert_eq!(sorted_list(repo, &ctx), vec!["dir/test.txt"]);
        assert_eq!(read_all(repo, &ctx, "dir/test.txt").unwrap(), "other thing");

        // both snapshots stay readable as committed
        let ctx1 = ctx.with_revision(r1.clone());
        assert_eq!(sorted_list(repo, &ctx1), vec!["dir/test.txt", "test.txt"]);
        assert_eq!(read_all(repo, &ctx1, "dir/test.txt").unwrap(), "something");
        let ctx2 = ctx.with_revision(r2.clone());
        assert_eq!(sorted_list(repo, &ctx2), vec!["dir/test.txt"]);
        assert_eq!(read_all(repo, &ctx2, "dir/test.txt").unwrap(), "other thing");

        // commit-range patch covers both sides of the rewrite
        let range_ctx = ctx.with_diff(r1, r2);
        let patch = patch_text(repo, &range_ctx);
        assert!(patch.contains("-something"), "patch: {patch}");
        assert!(patch.contains("+other thing"), "patch: {patch}");
    }

    #[test]
    fn git_repo_scenario() {
        let (_dir, repo) = init_repo();
        run_repo_scenario(&repo);
    }

    #[test]
    fn committed_content_round_trips() {
        let (_dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        repo.add(&ctx, sources(&[("a.txt", "payload\n")])).unwrap();
        let rev = repo.commit(&ctx, "add a").unwrap();
        let got = read_all(&repo, &ctx.with_revision(rev), "a.txt").unwrap();
        assert_eq!(got, "payload\n");
    }

    #[test]
    fn sentinel_reads_are_never_stale() {
        let (dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        repo.add(&ctx, sources(&[("a.txt", "old")])).unwrap();
        repo.commit(&ctx, "add a").unwrap();
        std::fs::write(dir.path().join("a.txt"), "new").unwrap();
        assert_eq!(read_all(&repo, &ctx, "a.txt").unwrap(), "new");
    }

    #[test]
    fn clean_tree_has_empty_status_and_patch() {
        let (_dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        repo.add(&ctx, sources(&[("a.txt", "content")])).unwrap();
        repo.commit(&ctx, "add a").unwrap();
        assert!(repo.status().unwrap().is_empty());
        assert_eq!(patch_text(&repo, &ctx), "");
    }

    #[test]
    fn status_classifies_staged_and_untracked_paths() {
        let (dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        repo.add(&ctx, sources(&[("tracked.txt", "one")])).unwrap();
        repo.commit(&ctx, "base").unwrap();

        repo.add(&ctx, sources(&[("added.txt", "two")])).unwrap();
        std::fs::write(dir.path().join("tracked.txt"), "changed").unwrap();
        std::fs::write(dir.path().join("loose.txt"), "three").unwrap();

        let mut status = repo.status().unwrap();
        status.sort_by(|a, b| a.path.cmp(&b.path));
        let classes: Vec<(&str, ChangeClass)> = status
            .iter()
            .map(|s| (s.path.as_str(), s.class))
            .collect();
        assert_eq!(
            classes,
            vec![
                ("added.txt", ChangeClass::Added),
                ("loose.txt", ChangeClass::Untracked),
                ("tracked.txt", ChangeClass::Modified),
            ]
        );
    }

    #[test]
    fn deleted_paths_emit_no_worktree_fragment() {
        let (_dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        repo.add(&ctx, sources(&[("gone.txt", "buried")])).unwrap();
        repo.commit(&ctx, "base").unwrap();
        repo.add(&ctx, sources(&[("gone.txt", "")])).unwrap();
        let patch = patch_text(&repo, &ctx);
        assert!(!patch.contains("gone.txt"), "patch: {patch}");
    }

    #[test]
    fn failed_staging_keeps_earlier_entries_staged() {
        let (dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        // a directory at the target path makes the removal entry fail
        std::fs::create_dir(dir.path().join("blocked")).unwrap();
        let err = repo
            .add(&ctx, sources(&[("kept.txt", "content"), ("blocked", "")]))
            .unwrap_err();
        assert!(matches!(err, RepoError::Io(_)), "err: {err}");

        // the first entry was persisted to the on-disk index before the
        // failure, so a fresh handle still sees it staged
        let reopened = GitRepo::open(dir.path()).unwrap();
        let status = reopened.status().unwrap();
        assert!(
            status
                .iter()
                .any(|s| s.path == "kept.txt" && s.class == ChangeClass::Added),
            "status: {status:?}"
        );
    }

    #[test]
    fn unknown_revision_fails_to_resolve() {
        let (_dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        repo.add(&ctx, sources(&[("a.txt", "content")])).unwrap();
        repo.commit(&ctx, "add a").unwrap();
        let bad = ctx.with_revision(Revision::from("0123456789abcdef0123456789abcdef01234567"));
        let err = repo.list(&bad).unwrap_err();
        assert!(matches!(err, RepoError::Resolve(_)), "err: {err}");
    }

    #[test]
    fn missing_path_fails_with_not_found() {
        let (_dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        repo.add(&ctx, sources(&[("a.txt", "content")])).unwrap();
        let rev = repo.commit(&ctx, "add a").unwrap();
        let err = read_all(&repo, &ctx, "absent.txt").unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)), "err: {err}");
        let err = read_all(&repo, &ctx.with_revision(rev), "absent.txt").unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)), "err: {err}");
    }

    #[test]
    fn clean_tree_refuses_empty_commit() {
        let (_dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        let err = repo.commit(&ctx, "nothing yet").unwrap_err();
        assert!(matches!(err, RepoError::NothingToCommit), "err: {err}");
        repo.add(&ctx, sources(&[("a.txt", "content")])).unwrap();
        repo.commit(&ctx, "add a").unwrap();
        let err = repo.commit(&ctx, "again").unwrap_err();
        assert!(matches!(err, RepoError::NothingToCommit), "err: {err}");
    }

    #[test]
    fn head_read_ignores_context_revision() {
        let (_dir, repo) = init_repo();
        let ctx = RevisionContext::new();
        repo.add(&ctx, sources(&[("a.txt", "first")])).unwrap();
        let r1 = repo.commit(&ctx, "first").unwrap();
        repo.add(&ctx, sources(&[("a.txt", "second")])).unwrap();
        repo.commit(&ctx, "second").unwrap();

        let pinned = ctx.with_revision(r1);
        let mut buf = Vec::new();
        repo.head(&pinned, "a.txt", &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "second");
    }
}
