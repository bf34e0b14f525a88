// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Path helpers

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem
///
/// Leading `..` components of a relative path are kept. A `..` at the root
/// stays at the root.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Whether deleting `dir` would also delete `target`
///
/// Existing paths are compared after resolving symlinks; paths that cannot
/// be resolved are compared lexically.
pub async fn contains_path(dir: &Path, target: &Path) -> bool {
    let dir = resolve(dir).await;
    let target = resolve(target).await;
    target.starts_with(dir)
}

async fn resolve(path: &Path) -> PathBuf {
    match tokio::fs::canonicalize(path).await {
        Ok(resolved) => resolved,
        Err(_) => normalize_path(path),
    }
}
