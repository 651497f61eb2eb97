//! Offline commit message heuristic used when the backend fails.
//!
//! Output depends only on the per-status counts, the single file name (when
//! exactly one file changed) and the diff text, so it is stable under any
//! reordering of the change set.

use std::path::Path;

use crate::commit::diff::{ChangeSet, FileStatus};
use crate::config::Locale;

const TEST_MARKERS: [&str; 2] = ["test", "spec"];
const FIX_MARKERS: [&str; 3] = ["fix", "bug", "issue"];

/// Build a conventional commit message from change metadata alone.
///
/// Never fails and never returns an empty string.
pub fn classify(changes: &ChangeSet, locale: Locale) -> String {
    let added = changes.count(FileStatus::Added);
    let modified = changes.count(FileStatus::Modified);
    let deleted = changes.count(FileStatus::Deleted);

    let prefix = if added > 0 && modified == 0 && deleted == 0 {
        "feat: "
    } else if deleted > 0 && added == 0 && modified == 0 {
        "remove: "
    } else if modified > 0 {
        if changes
            .changed_files
            .iter()
            .any(|f| f.status == FileStatus::Modified && is_test_path(&f.path))
        {
            "test: "
        } else if FIX_MARKERS.iter().any(|m| changes.diff_text.contains(m)) {
            "fix: "
        } else {
            "feat: "
        }
    } else {
        "chore: "
    };

    let description = match changes.changed_files.as_slice() {
        [only] => single_file(only.status, &file_stem(&only.path), locale),
        files => match dominant(added, modified, deleted) {
            Some((status, count)) => many_files(status, count, locale),
            None => generic(files.len(), locale),
        },
    };

    format!("{}{}", prefix, description)
}

/// Case-sensitive match anywhere in the staged path, directories included.
fn is_test_path(path: &str) -> bool {
    TEST_MARKERS.iter().any(|m| path.contains(m))
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// File name up to its first `.`; dotfiles drop the leading dot instead.
fn file_stem(path: &str) -> String {
    let name = file_name(path);
    let name = name.strip_prefix('.').unwrap_or(name);
    let stem = name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        name.to_string()
    } else {
        stem.to_string()
    }
}

/// The status with a strictly larger count than both others.
fn dominant(added: usize, modified: usize, deleted: usize) -> Option<(FileStatus, usize)> {
    let counts = [
        (FileStatus::Added, added),
        (FileStatus::Modified, modified),
        (FileStatus::Deleted, deleted),
    ];
    counts.into_iter().find(|&(status, count)| {
        count > 0 && counts.iter().all(|&(other, c)| other == status || c < count)
    })
}

fn single_file(status: FileStatus, stem: &str, locale: Locale) -> String {
    match (locale, status) {
        (Locale::En, FileStatus::Added) => format!("add {}", stem),
        (Locale::En, FileStatus::Modified) => format!("update {}", stem),
        (Locale::En, FileStatus::Deleted) => format!("remove {}", stem),
        (Locale::Zh, FileStatus::Added) => format!("添加{}功能", stem),
        (Locale::Zh, FileStatus::Modified) => format!("更新{}功能", stem),
        (Locale::Zh, FileStatus::Deleted) => format!("移除{}功能", stem),
    }
}

fn many_files(status: FileStatus, count: usize, locale: Locale) -> String {
    match (locale, status) {
        (Locale::En, FileStatus::Added) => format!("add {} files", count),
        (Locale::En, FileStatus::Modified) => format!("update {} files", count),
        (Locale::En, FileStatus::Deleted) => format!("remove {} files", count),
        (Locale::Zh, FileStatus::Added) => format!("添加新功能，涉及{}个文件", count),
        (Locale::Zh, FileStatus::Modified) => format!("更新功能，涉及{}个文件", count),
        (Locale::Zh, FileStatus::Deleted) => format!("移除功能，涉及{}个文件", count),
    }
}

fn generic(total: usize, locale: Locale) -> String {
    match locale {
        Locale::En => format!("change {} files", total),
        Locale::Zh => format!("代码变更，涉及{}个文件", total),
    }
}
