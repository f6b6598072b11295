//! Size-budget eviction of rendition instance files.
//!
//! # Algorithm
//!
//! 1. Sum the sizes of all instance files (metadata records are not counted).
//! 2. If the sum is within budget, stop.
//! 3. Order instance files oldest-first by mtime; take the shortest prefix
//!    whose removal would bring the total within budget. Only these files are
//!    eligible: nothing younger is ever deleted to spare something older.
//! 4. Delete the eligible files biggest-first until the total is within
//!    budget. A failed delete does not count, so later candidates make up
//!    for it.
//!
//! Deleting biggest-first inside the eligible set reclaims the space with the
//! fewest deletions.
//!
//! Callers must hold the store's exclusive global lock.

use super::layout::is_instance_file_name;
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// One rendition instance file seen by the eviction scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Outcome of one cull cycle that found the cache over budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CullReport {
    /// Number of instance files deleted
    pub files_deleted: usize,
    /// Total bytes freed
    pub bytes_freed: u64,
    /// Instance bytes before the cycle
    pub size_before: u64,
    /// Instance bytes after the cycle
    pub size_after: u64,
    /// Deletes that failed and were compensated by later candidates
    pub delete_failures: usize,
    /// Wall time of the cycle
    pub duration: Duration,
}

/// Oldest mtime first; ties broken by path.
pub fn oldest_first(a: &InstanceFile, b: &InstanceFile) -> Ordering {
    a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path))
}

/// Largest size first; ties broken by path.
pub fn biggest_first(a: &InstanceFile, b: &InstanceFile) -> Ordering {
    b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path))
}

/// Sum of instance file sizes.
pub fn total_size(files: &[InstanceFile]) -> u64 {
    files.iter().map(|f| f.size).sum()
}

/// Files to delete, in deletion order.
///
/// Returns the minimal oldest-first prefix whose removal reaches `budget`,
/// re-ordered biggest-first. Empty when `current_size` is within budget.
pub fn plan_deletions(
    mut files: Vec<InstanceFile>,
    current_size: u64,
    budget: u64,
) -> Vec<InstanceFile> {
    files.sort_by(oldest_first);

    let mut remaining = current_size;
    let mut eligible = Vec::new();
    for file in files {
        if remaining <= budget {
            break;
        }
        remaining = remaining.saturating_sub(file.size);
        eligible.push(file);
    }

    eligible.sort_by(biggest_first);
    eligible
}

/// Recursively collect instance files under `dir`.
///
/// Unreadable subdirectories are skipped; only a failure to read `dir`
/// itself is an error.
pub fn collect_instance_files(dir: &Path) -> io::Result<Vec<InstanceFile>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir)?;
    collect_recursive(entries, &mut files);
    Ok(files)
}

fn collect_recursive(entries: fs::ReadDir, files: &mut Vec<InstanceFile>) {
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();

        if file_type.is_dir() {
            match fs::read_dir(&path) {
                Ok(children) => collect_recursive(children, files),
                Err(e) => debug!(
                    dir = %path.display(),
                    error = %e,
                    "Skipping unreadable directory during cull scan"
                ),
            }
        } else if file_type.is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(is_instance_file_name)
        {
            if let Ok(metadata) = entry.metadata() {
                files.push(InstanceFile {
                    path,
                    modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    size: metadata.len(),
                });
            }
        }
    }
}

/// Run one cull cycle over `storage_dir`.
///
/// Returns `None` if the cache is within budget.
pub fn cull(storage_dir: &Path, budget: u64) -> io::Result<Option<CullReport>> {
    let start = Instant::now();
    let files = collect_instance_files(storage_dir)?;
    let size_before = total_size(&files);

    if size_before <= budget {
        debug!(
            size_bytes = size_before,
            budget_bytes = budget,
            "Rendition cache within budget, nothing to cull"
        );
        return Ok(None);
    }

    info!(
        size_bytes = size_before,
        budget_bytes = budget,
        file_count = files.len(),
        "Rendition cache over budget, culling"
    );

    let plan = plan_deletions(files, size_before, budget);

    let mut remaining = size_before;
    let mut files_deleted = 0usize;
    let mut delete_failures = 0usize;

    for file in plan {
        if remaining <= budget {
            break;
        }
        match fs::remove_file(&file.path) {
            Ok(()) => {
                remaining = remaining.saturating_sub(file.size);
                files_deleted += 1;
            }
            Err(e) => {
                delete_failures += 1;
                debug!(
                    path = %file.path.display(),
                    error = %e,
                    "Failed to delete instance file during cull"
                );
            }
        }
    }

    if remaining > budget {
        warn!(
            remaining_bytes = remaining,
            budget_bytes = budget,
            delete_failures,
            "Cull could not reach budget this cycle"
        );
    }

    Ok(Some(CullReport {
        files_deleted,
        bytes_freed: size_before - remaining,
        size_before,
        size_after: remaining,
        delete_failures,
        duration: start.elapsed(),
    }))
}
