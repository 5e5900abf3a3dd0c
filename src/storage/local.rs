// src/storage/local.rs
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Filesystem backend for local runs and tests.
#[derive(Debug, Default)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }

    pub async fn get(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }

    pub async fn put(&self, path: &Path, data: Vec<u8>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        fs::write(path, &data)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    /// Remove a file, or a directory and everything in it. Missing paths count as zero.
    pub async fn delete_prefix(&self, path: &Path) -> Result<usize> {
        let meta = match fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(e).with_context(|| format!("inspecting {}", path.display()));
            }
        };

        if meta.is_file() {
            fs::remove_file(path)
                .await
                .with_context(|| format!("removing {}", path.display()))?;
            return Ok(1);
        }

        let removed = count_files(path).await?;
        fs::remove_dir_all(path)
            .await
            .with_context(|| format!("removing {}", path.display()))?;
        Ok(removed)
    }
}

async fn count_files(root: &Path) -> Result<usize> {
    let mut stack = vec![root.to_path_buf()];
    let mut count = 0;
    while let Some(dir) = stack.pop() {
        let mut rd = fs::read_dir(&dir)
            .await
            .with_context(|| format!("listing {}", dir.display()))?;
        while let Some(entry) = rd.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                stack.push(entry.path());
            } else {
                count += 1;
            }
        }
    }
    Ok(count)
}
