//! Local filesystem helpers for stitching.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Total byte size of a directory tree.
pub(crate) fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

/// Every file under `root`, as `(absolute path, relative path)` with `/`
/// separators. Sorted so transfers are deterministic.
pub(crate) fn collect_files(root: &Path) -> std::io::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.metadata()?.is_dir() {
                stack.push(path);
            } else {
                let rel = path
                    .strip_prefix(root)
                    .map_err(|e| std::io::Error::other(e.to_string()))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path, rel));
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Shard subdirectories (numerically named) of an index directory.
fn shard_dirs(index_dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut shards = Vec::new();
    for entry in std::fs::read_dir(index_dir)? {
        let entry = entry?;
        if !entry.metadata()?.is_dir() {
            continue;
        }
        if let Some(shard) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        {
            shards.push((shard, entry.path()));
        }
    }
    Ok(shards)
}

/// Pick the shard directory holding the data. All documents of a partition
/// share one routing hint, so exactly one shard has content and it is
/// strictly the largest by byte count.
pub(crate) fn largest_shard(index_dir: &Path) -> Result<u32> {
    let mut best: Option<(u32, u64)> = None;
    for (shard, path) in shard_dirs(index_dir)? {
        let size = dir_size(&path)?;
        if best.map_or(true, |(_, best_size)| size > best_size) {
            best = Some((shard, size));
        }
    }
    best.map(|(shard, _)| shard)
        .ok_or_else(|| Error::NoShardData(index_dir.display().to_string()))
}

/// Delete every shard directory except `keep`.
pub(crate) fn remove_other_shards(index_dir: &Path, keep: u32) -> Result<()> {
    for (shard, path) in shard_dirs(index_dir)? {
        if shard != keep {
            std::fs::remove_dir_all(&path)?;
        }
    }
    Ok(())
}
