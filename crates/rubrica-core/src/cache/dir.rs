use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use super::{is_valid_key, CachedGrade, GradeCache};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// One `<key>.json` file per entry.
///
/// Writes go through a temp file and a rename, so readers never observe a
/// partial entry. When `max_entries` is reached new entries are not stored.
#[derive(Debug, Clone)]
pub struct DirCache {
    dir: PathBuf,
    max_entries: Option<usize>,
}

impl DirCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_entries: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Number of stored entries (temp files excluded).
    pub async fn entry_count(&self) -> anyhow::Result<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

async fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let temp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));

    fs::write(&temp_path, content)
        .await
        .map_err(|e| anyhow::anyhow!("failed to write temp file: {}", e))?;

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        anyhow::bail!("failed to rename temp file: {}", e);
    }
    Ok(())
}

#[async_trait]
impl GradeCache for DirCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<CachedGrade>> {
        if !is_valid_key(key) {
            debug!(key, "ignoring malformed cache key");
            return Ok(None);
        }
        let path = self.entry_path(key);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow::anyhow!("failed to read {}: {}", path.display(), e)),
        };
        match serde_json::from_str(&text) {
            Ok(grade) => Ok(Some(grade)),
            Err(e) => {
                warn!(key, error = %e, "corrupt cache entry; treating as miss");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: CachedGrade) -> anyhow::Result<()> {
        if !is_valid_key(key) {
            anyhow::bail!("invalid cache key: {}", key);
        }
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| anyhow::anyhow!("failed to create cache directory: {}", e))?;

        let path = self.entry_path(key);
        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!(key, "cache entry already present");
            return Ok(());
        }
        if let Some(max) = self.max_entries {
            let count = self.entry_count().await?;
            if count >= max {
                warn!(key, count, max, "cache full; entry not stored");
                return Ok(());
            }
        }

        let json = serde_json::to_string_pretty(&value)?;
        write_atomic(&path, &json).await?;
        debug!(key, "cached grade");
        Ok(())
    }
}
