//! Filesystem cache store.
//!
//! One file per key. The file name is the hex encoding of the prefixed key,
//! and the contents are an 8-byte big-endian expiry (milliseconds since the
//! Unix epoch, `0` for none) followed by the value bytes.

use crate::config::{CacheBackend, CacheConfig};
use crate::error::{AddError, CacheError, CacheResult};
use crate::traits::CacheStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::task::JoinHandle;
use wicket_log::{debug, info, warn};

const HEADER_LEN: usize = 8;
const TEMP_MARKER: &str = ".tmp-";

/// File-per-key cache store.
#[derive(Clone)]
pub struct FileCache {
    directory: PathBuf,
    config: CacheConfig,
}

struct Entry {
    expires_at: Option<SystemTime>,
    value: Vec<u8>,
}

impl Entry {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

fn encode_entry(value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
    let expiry_ms = ttl
        .map(|ttl| SystemTime::now() + ttl)
        .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
        .map(|d| (d.as_millis() as u64).max(1))
        .unwrap_or(0);

    let mut buf = Vec::with_capacity(HEADER_LEN + value.len());
    buf.extend_from_slice(&expiry_ms.to_be_bytes());
    buf.extend_from_slice(value);
    buf
}

fn decode_entry(key: &str, mut raw: Vec<u8>) -> CacheResult<Entry> {
    if raw.len() < HEADER_LEN {
        return Err(CacheError::Corrupt {
            key: key.to_string(),
            reason: format!("{} bytes is shorter than the expiry header", raw.len()),
        });
    }

    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&raw[..HEADER_LEN]);
    let expiry_ms = u64::from_be_bytes(header);
    let expires_at = (expiry_ms != 0).then(|| UNIX_EPOCH + Duration::from_millis(expiry_ms));

    raw.drain(..HEADER_LEN);
    Ok(Entry {
        expires_at,
        value: raw,
    })
}

async fn remove_if_present(path: &Path) -> CacheResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl FileCache {
    /// Open a file cache, creating the directory if needed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wicket_cache::*;
    ///
    /// # async fn run() -> Result<(), CacheError> {
    /// let cache = FileCache::new(CacheConfig::file("/var/lib/app/sessions")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        if config.backend != CacheBackend::File {
            return Err(CacheError::Config(format!(
                "FileCache cannot use the {} backend configuration",
                config.backend
            )));
        }
        let directory = config
            .directory
            .clone()
            .ok_or_else(|| CacheError::Config("file backend requires a directory".to_string()))?;

        fs::create_dir_all(&directory).await.map_err(|e| {
            CacheError::Config(format!(
                "Failed to create cache directory {:?}: {}",
                directory, e
            ))
        })?;

        info!("Initialized file cache"; directory = directory.display());
        Ok(Self { directory, config })
    }

    /// Open with just a directory (convenience method).
    pub async fn with_path(path: impl Into<PathBuf>) -> CacheResult<Self> {
        Self::new(CacheConfig::file(path)).await
    }

    /// The storage directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.directory
            .join(hex::encode(self.config.build_key(key).as_bytes()))
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(TEMP_MARKER);
        name.push(uuid::Uuid::new_v4().simple().to_string());
        PathBuf::from(name)
    }

    async fn read_entry(&self, key: &str, path: &Path) -> CacheResult<Option<Entry>> {
        match fs::read(path).await {
            Ok(raw) => decode_entry(key, raw).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a live entry, removing it from disk if it has expired.
    async fn live_entry(&self, key: &str) -> CacheResult<Option<Entry>> {
        let path = self.full_path(key);
        let Some(entry) = self.read_entry(key, &path).await? else {
            return Ok(None);
        };
        if entry.is_expired(SystemTime::now()) {
            remove_if_present(&path).await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn write_temp(&self, path: &Path, value: &[u8], ttl: Option<Duration>) -> CacheResult<PathBuf> {
        let temp = self.temp_path(path);
        let bytes = encode_entry(value, self.config.effective_ttl(ttl));
        fs::write(&temp, bytes).await?;
        Ok(temp)
    }

    /// Link a fully written temp file into place only if `path` is free.
    ///
    /// `hard_link` fails when the target exists, so at most one writer wins.
    async fn publish(&self, key: &str, temp: &Path, path: &Path) -> Result<(), AddError> {
        match fs::hard_link(temp, path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(CacheError::from(e).into()),
        }

        if !self.reclaim_stale(key, path).await? {
            return Err(AddError::AlreadyExists(key.to_string()));
        }

        match fs::hard_link(temp, path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(AddError::AlreadyExists(key.to_string()))
            }
            Err(e) => Err(CacheError::from(e).into()),
        }
    }

    /// Move an expired or unreadable entry out of the way.
    ///
    /// Returns `false` if the entry turned out to be live, in which case it
    /// is put back unless another writer has already replaced it.
    async fn reclaim_stale(&self, key: &str, path: &Path) -> CacheResult<bool> {
        let aside = self.temp_path(path);
        match fs::rename(path, &aside).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        }

        let stale = match self.read_entry(key, &aside).await {
            Ok(Some(entry)) => entry.is_expired(SystemTime::now()),
            Ok(None) | Err(CacheError::Corrupt { .. }) => true,
            Err(e) => {
                let _ = fs::hard_link(&aside, path).await;
                let _ = fs::remove_file(&aside).await;
                return Err(e);
            }
        };

        if !stale {
            let _ = fs::hard_link(&aside, path).await;
        }
        remove_if_present(&aside).await?;
        Ok(stale)
    }

    /// Delete expired entries, entries older than `max_entry_age`, and
    /// abandoned temp files. Returns how many files were removed.
    pub async fn sweep_expired(&self) -> CacheResult<usize> {
        let now = SystemTime::now();
        let max_age = self.config.max_entry_age;
        let mut removed = 0;

        let mut entries = fs::read_dir(&self.directory).await?;
        while let Some(dir_entry) = entries.next_entry().await? {
            let path = dir_entry.path();
            let metadata = match dir_entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            let is_temp = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().contains(TEMP_MARKER));

            let stale = if is_temp {
                age > self.config.operation_timeout.max(Duration::from_secs(60))
            } else if max_age.is_some_and(|max| age > max) {
                true
            } else {
                let name = path.display().to_string();
                match fs::read(&path).await {
                    Ok(raw) => decode_entry(&name, raw).map_or(true, |e| e.is_expired(now)),
                    Err(_) => false,
                }
            };

            if stale {
                remove_if_present(&path).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("swept cache directory"; removed = removed);
        }
        Ok(removed)
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `sweep_interval`.
    ///
    /// The task runs until the returned handle is aborted or the runtime
    /// shuts down.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_expired().await {
                    warn!("cache sweep failed"; error = e);
                }
            }
        })
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.live_entry(key).await?.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let path = self.full_path(key);
        let temp = self.write_temp(&path, &value, ttl).await?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        remove_if_present(&self.full_path(key)).await
    }

    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        let path = self.full_path(key);
        let aside = self.temp_path(&path);
        match fs::rename(&path, &aside).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let entry = match self.read_entry(key, &aside).await {
            Ok(entry) => entry,
            Err(e) => {
                let _ = fs::hard_link(&aside, &path).await;
                let _ = fs::remove_file(&aside).await;
                return Err(e);
            }
        };

        let now = SystemTime::now();
        let matches = entry
            .as_ref()
            .is_some_and(|entry| !entry.is_expired(now) && entry.value == expected);
        let live = entry.is_some_and(|entry| !entry.is_expired(now));

        // put back a live foreign entry unless a writer already replaced it
        if live && !matches {
            let _ = fs::hard_link(&aside, &path).await;
        }
        remove_if_present(&aside).await?;
        Ok(matches)
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), AddError> {
        let path = self.full_path(key);
        let temp = self.write_temp(&path, &value, ttl).await?;
        let result = self.publish(key, &temp, &path).await;
        let _ = fs::remove_file(&temp).await;
        result
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let now = SystemTime::now();
        Ok(self
            .live_entry(key)
            .await?
            .and_then(|entry| entry.expires_at)
            .and_then(|exp| exp.duration_since(now).ok()))
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut entries = fs::read_dir(&self.directory).await?;
        while let Some(dir_entry) = entries.next_entry().await? {
            if dir_entry.file_type().await?.is_file() {
                remove_if_present(&dir_entry.path()).await?;
            }
        }
        Ok(())
    }
}
