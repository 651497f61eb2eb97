//! Staged change collection using git2.

use std::fmt;

use git2::{Delta, Diff, DiffFormat, ErrorCode, Repository, Tree};
use tracing::{debug, warn};

use crate::error::CommitError;

/// Maximum characters for the unified diff text before truncation.
pub const MAX_DIFF_LENGTH: usize = 30_000;

/// Status of a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "Added"),
            FileStatus::Modified => write!(f, "Modified"),
            FileStatus::Deleted => write!(f, "Deleted"),
        }
    }
}

/// A file in the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub status: FileStatus,
    pub path: String,
}

impl ChangedFile {
    pub fn new(status: FileStatus, path: impl Into<String>) -> Self {
        Self {
            status,
            path: path.into(),
        }
    }
}

/// Staged changes: ordered file list plus the concatenated diff text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changed_files: Vec<ChangedFile>,
    pub diff_text: String,
    pub truncated: bool,
}

impl ChangeSet {
    pub fn new(changed_files: Vec<ChangedFile>, diff_text: impl Into<String>) -> Self {
        Self {
            changed_files,
            diff_text: diff_text.into(),
            truncated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changed_files.iter().map(|f| f.path.as_str())
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.changed_files
            .iter()
            .filter(|f| f.status == status)
            .count()
    }
}

/// Resolve the HEAD tree, distinguishing empty-repo errors from real failures.
///
/// Returns `Ok(None)` for repos with no commits (unborn branch / not found).
fn resolve_head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, CommitError> {
    let head_ref = match repo.head() {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok(None);
        }
        Err(e) => return Err(CommitError::DiffFailed(e)),
    };

    let tree = head_ref.peel_to_tree().map_err(CommitError::DiffFailed)?;
    Ok(Some(tree))
}

/// Collect the staged changes (HEAD tree against the index).
///
/// Renames and type changes count as modifications. Returns
/// [`CommitError::NoChanges`] when nothing is staged.
pub fn collect_staged(repo: &Repository) -> Result<ChangeSet, CommitError> {
    let head_tree = resolve_head_tree(repo)?;
    let mut diff = repo
        .diff_tree_to_index(head_tree.as_ref(), None, None)
        .map_err(CommitError::DiffFailed)?;
    diff.find_similar(None).map_err(CommitError::DiffFailed)?;

    let changed_files = collect_files(&diff);
    if changed_files.is_empty() {
        return Err(CommitError::NoChanges);
    }

    let mut diff_text = String::new();
    let truncated = append_diff_text(&diff, &mut diff_text);
    debug!(
        "Collected {} staged files, {} diff chars{}",
        changed_files.len(),
        diff_text.len(),
        if truncated { " (truncated)" } else { "" }
    );

    Ok(ChangeSet {
        changed_files,
        diff_text,
        truncated,
    })
}

fn delta_path(delta: &git2::DiffDelta<'_>) -> Option<String> {
    delta
        .new_file()
        .path()
        .or_else(|| delta.old_file().path())
        .map(|p| p.to_string_lossy().to_string())
}

fn collect_files(diff: &Diff<'_>) -> Vec<ChangedFile> {
    diff.deltas()
        .filter_map(|delta| {
            let status = match delta.status() {
                Delta::Added | Delta::Untracked | Delta::Copied => FileStatus::Added,
                Delta::Deleted => FileStatus::Deleted,
                Delta::Unmodified | Delta::Ignored => return None,
                _ => FileStatus::Modified,
            };
            delta_path(&delta)
                .filter(|p| !p.is_empty())
                .map(|path| ChangedFile { status, path })
        })
        .collect()
}

/// Append per-file patch sections, each introduced by a `File:` line.
///
/// Returns true if the text was cut at [`MAX_DIFF_LENGTH`].
fn append_diff_text(diff: &Diff<'_>, text: &mut String) -> bool {
    let mut truncated = false;
    let mut current: Option<String> = None;

    let result = diff.print(DiffFormat::Patch, |delta, _hunk, line| {
        if truncated {
            return true;
        }

        let path = delta_path(&delta);
        if path != current {
            let header = format!("\nFile: {}\n", path.as_deref().unwrap_or_default());
            if text.len() + header.len() > MAX_DIFF_LENGTH {
                truncated = true;
                return true;
            }
            text.push_str(&header);
            current = path;
        }

        let content = String::from_utf8_lossy(line.content());
        if text.len() + content.len() + 1 > MAX_DIFF_LENGTH {
            truncated = true;
            return true;
        }

        let origin = line.origin();
        if origin == '+' || origin == '-' || origin == ' ' {
            text.push(origin);
        }
        text.push_str(&content);
        true
    });

    if let Err(e) = result {
        warn!("Failed to collect diff text: {e}");
        truncated = true;
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn init_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn stage(repo: &Repository, dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
    }

    fn commit_all(repo: &Repository) {
        let sig = git2::Signature::now("Test", "test@test.com").unwrap();
        let mut index = repo.index().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parents: Vec<git2::Commit<'_>> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &parent_refs)
            .unwrap();
    }

    #[test]
    fn test_file_status_display() {
        assert_eq!(FileStatus::Added.to_string(), "Added");
        assert_eq!(FileStatus::Modified.to_string(), "Modified");
        assert_eq!(FileStatus::Deleted.to_string(), "Deleted");
    }

    #[test]
    fn test_nothing_staged_returns_no_changes() {
        let (dir, repo) = init_repo();
        stage(&repo, dir.path(), "a.txt", "a\n");
        commit_all(&repo);

        // Untracked and unstaged edits are not part of the change set
        std::fs::write(dir.path().join("a.txt"), "edited\n").unwrap();
        std::fs::write(dir.path().join("untracked.txt"), "x\n").unwrap();

        assert!(matches!(collect_staged(&repo), Err(CommitError::NoChanges)));
    }

    #[test]
    fn test_unborn_head_collects_added_files() {
        let (dir, repo) = init_repo();
        stage(&repo, dir.path(), "foo.ts", "export const foo = 1;\n");

        let changes = collect_staged(&repo).unwrap();
        assert_eq!(
            changes.changed_files,
            vec![ChangedFile::new(FileStatus::Added, "foo.ts")]
        );
        assert!(changes.diff_text.contains("File: foo.ts"));
        assert!(changes.diff_text.contains("+export const foo = 1;"));
        assert!(!changes.truncated);
    }

    #[test]
    fn test_statuses_for_modify_and_delete() {
        let (dir, repo) = init_repo();
        stage(&repo, dir.path(), "keep.rs", "fn a() {}\n");
        stage(&repo, dir.path(), "gone.rs", "fn b() {}\n");
        commit_all(&repo);

        stage(&repo, dir.path(), "keep.rs", "fn a() { fix() }\n");
        std::fs::remove_file(dir.path().join("gone.rs")).unwrap();
        let mut index = repo.index().unwrap();
        index.remove_path(Path::new("gone.rs")).unwrap();
        index.write().unwrap();

        let changes = collect_staged(&repo).unwrap();
        assert_eq!(changes.count(FileStatus::Modified), 1);
        assert_eq!(changes.count(FileStatus::Deleted), 1);
        assert!(changes.diff_text.contains("File: keep.rs"));
        assert!(changes.diff_text.contains("fix()"));
    }

    #[test]
    fn test_large_diff_is_truncated() {
        let (dir, repo) = init_repo();
        let big = "line of text that repeats\n".repeat(3_000);
        stage(&repo, dir.path(), "big.txt", &big);

        let changes = collect_staged(&repo).unwrap();
        assert!(changes.truncated);
        assert!(changes.diff_text.len() <= MAX_DIFF_LENGTH);
        assert_eq!(changes.changed_files.len(), 1);
    }

    #[test]
    fn test_corrupt_head_propagates_error() {
        let (dir, repo) = init_repo();
        stage(&repo, dir.path(), "a.txt", "a\n");
        commit_all(&repo);

        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/\0invalid").unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let result = collect_staged(&repo);
        assert!(
            matches!(result, Err(CommitError::DiffFailed(_))),
            "Expected DiffFailed for corrupt HEAD, got: {:?}",
            result
        );
    }
}
