//! Directory walk producing one index generation.
//!
//! Every filesystem call is async; nothing here touches the live snapshot.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::static_files::index::IndexSettings;

/// Output of one walk.
#[derive(Debug)]
pub(crate) struct Walked {
    pub entries: HashMap<String, PathBuf>,
    pub root: PathBuf,
    pub files: usize,
    pub truncated: bool,
}

struct Job {
    dir: PathBuf,
    rel: String,
    depth: usize,
}

/// `path` is `root` or lies beneath it (component-wise).
pub(crate) fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

fn is_hidden(name: &str, allow_well_known: bool) -> bool {
    name.starts_with('.') && !(allow_well_known && name == ".well-known")
}

fn join_rel(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_string()
    } else {
        format!("{rel}/{name}")
    }
}

/// Walk the configured root.
///
/// Directories reached through symlinks are queued behind real ones, so a
/// link never claims a directory before its real path does. Each canonical
/// directory is read at most once, which also breaks symlink cycles.
pub(crate) async fn walk(settings: &IndexSettings) -> Walked {
    let root = match fs::canonicalize(settings.root()).await {
        Ok(root) => root,
        Err(e) => {
            tracing::warn!(root = ?settings.root(), error = %e, "Static root is not accessible");
            return Walked {
                entries: HashMap::new(),
                root: settings.root().to_path_buf(),
                files: 0,
                truncated: false,
            };
        }
    };

    let mut walked = Walked {
        entries: HashMap::new(),
        root: root.clone(),
        files: 0,
        truncated: false,
    };
    let mut visited = HashSet::new();
    let mut pending = vec![Job {
        dir: root.clone(),
        rel: String::new(),
        depth: 0,
    }];
    let mut linked = Vec::new();

    while let Some(job) = pending.pop().or_else(|| linked.pop()) {
        walk_dir(settings, &root, job, &mut visited, &mut pending, &mut linked, &mut walked).await;
    }

    walked
}

async fn walk_dir(
    settings: &IndexSettings,
    root: &Path,
    job: Job,
    visited: &mut HashSet<PathBuf>,
    pending: &mut Vec<Job>,
    linked: &mut Vec<Job>,
    walked: &mut Walked,
) {
    if settings.max_depth().is_some_and(|max| job.depth > max) {
        return;
    }

    let canonical = match fs::canonicalize(&job.dir).await {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!(dir = ?job.dir, error = %e, "Skipping unresolvable directory");
            return;
        }
    };
    if !is_within(&canonical, root) || !visited.insert(canonical) {
        return;
    }

    let mut reader = match fs::read_dir(&job.dir).await {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!(dir = ?job.dir, error = %e, "Failed to read directory");
            return;
        }
    };

    let mut names = Vec::new();
    loop {
        match reader.next_entry().await {
            Ok(Some(entry)) => names.push(entry.file_name()),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = ?job.dir, error = %e, "Directory listing interrupted");
                break;
            }
        }
    }
    names.sort();

    for name in names {
        let Some(name) = name.to_str() else {
            tracing::debug!(dir = ?job.dir, "Skipping non UTF-8 entry");
            continue;
        };
        if is_hidden(name, settings.allow_well_known()) {
            continue;
        }

        let path = job.dir.join(name);
        let rel = join_rel(&job.rel, name);

        let meta = match fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!(path = ?path, error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let (file_type, via_link) = if meta.file_type().is_symlink() {
            if !settings.follow_symlinks() {
                continue;
            }
            let target = match fs::canonicalize(&path).await {
                Ok(target) => target,
                Err(e) => {
                    tracing::debug!(path = ?path, error = %e, "Skipping broken symlink");
                    continue;
                }
            };
            if !is_within(&target, root) {
                tracing::debug!(path = ?path, target = ?target, "Skipping symlink outside root");
                continue;
            }
            match fs::metadata(&path).await {
                Ok(meta) => (meta.file_type(), true),
                Err(e) => {
                    tracing::debug!(path = ?path, error = %e, "Skipping unreadable symlink target");
                    continue;
                }
            }
        } else {
            (meta.file_type(), false)
        };

        if file_type.is_dir() {
            let child = Job {
                dir: path,
                rel,
                depth: job.depth + 1,
            };
            if via_link {
                linked.push(child);
            } else {
                pending.push(child);
            }
        } else if file_type.is_file() {
            if let Some(max) = settings.max_files() {
                if walked.files >= max {
                    if !walked.truncated {
                        tracing::warn!(max_files = max, "file index truncated");
                    }
                    walked.truncated = true;
                    continue;
                }
            }
            walked.entries.insert(settings.url_for(&rel), path);
            walked.files += 1;
        }
    }

    for index_file in settings.index_files() {
        let index_url = settings.url_for(&join_rel(&job.rel, index_file));
        if let Some(path) = walked.entries.get(&index_url).cloned() {
            walked.entries.insert(settings.url_for(&job.rel), path);
            break;
        }
    }
}
