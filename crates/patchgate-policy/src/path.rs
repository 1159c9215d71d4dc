//! Path resolution for file-access checks
//!
//! Paths are resolved before any rule is matched: `.` and `..` are folded and
//! symlinks are followed for every component that exists on disk. Components
//! that do not exist yet (a file about to be written) are kept lexically.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Symlink hops followed before giving up on a chain
const MAX_LINK_HOPS: usize = 32;

/// Resolve `path` to an absolute form without requiring it to exist
///
/// Relative paths are taken relative to `base`.
#[must_use]
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        canonicalize_lenient(path)
    } else {
        canonicalize_lenient(&base.join(path))
    }
}

/// Canonicalize an absolute path, tolerating missing trailing components
#[must_use]
pub fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    let mut hops = 0;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if is_symlink(&resolved) {
                    hops += 1;
                    resolved = follow_link(&resolved, hops);
                }
            }
        }
    }
    resolved
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

fn follow_link(link: &Path, hops: usize) -> PathBuf {
    if let Ok(real) = fs::canonicalize(link) {
        return real;
    }
    // dangling link: judge by where the target would land
    match fs::read_link(link) {
        Ok(target) if hops < MAX_LINK_HOPS => {
            let parent = link.parent().unwrap_or_else(|| Path::new("/"));
            let joined = if target.is_absolute() {
                target
            } else {
                parent.join(target)
            };
            lexical(&joined)
        }
        _ => link.to_path_buf(),
    }
}

/// Fold `.` and `..` without touching the filesystem
#[must_use]
pub fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
