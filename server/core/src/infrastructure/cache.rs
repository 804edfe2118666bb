// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! Alias Set Cache File
//!
//! Persists the committed alias set as a JSON object so it survives restarts.
//! Writes go to a temporary file in the same directory which is then renamed
//! over the cache, so a crash never leaves a truncated file behind.
//!
//! Special files such as `/dev/null` are accepted: they read as the empty set
//! and are written in place.
//!
//! The server uses the `_async` variants, which run the file I/O on the
//! blocking thread pool.

use crate::domain::alias_set::{AliasRequestError, AliasSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to read cache file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cache file {path} does not hold an alias set: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: AliasRequestError,
    },

    #[error("Failed to move cache file {path} aside: {source}")]
    SetAside {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CacheError {
    /// The file was read but does not hold a usable alias set.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, CacheError::Json { .. } | CacheError::Corrupt { .. })
    }
}

#[derive(Debug, Clone)]
pub struct AliasCache {
    path: PathBuf,
}

impl AliasCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached set. Missing, empty and non-regular files yield the
    /// empty set.
    pub fn load(&self) -> Result<AliasSet, CacheError> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No cache file, starting empty");
                return Ok(AliasSet::new());
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if !metadata.is_file() {
            debug!(path = ?self.path, "Cache is not a regular file, starting empty");
            return Ok(AliasSet::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| CacheError::Read {
            path: self.path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(AliasSet::new());
        }

        let value: serde_json::Value = serde_json::from_str(&content).map_err(|source| CacheError::Json {
            path: self.path.clone(),
            source,
        })?;
        AliasSet::from_value(&value).map_err(|source| CacheError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Atomically replace the cache with `set`.
    pub fn save(&self, set: &AliasSet) -> Result<(), CacheError> {
        let write_error = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };
        let mut content = serde_json::to_vec_pretty(set).map_err(|source| CacheError::Json {
            path: self.path.clone(),
            source,
        })?;
        content.push(b'\n');

        // Renaming over a device node would replace it.
        if let Ok(metadata) = std::fs::metadata(&self.path) {
            if !metadata.is_file() {
                return std::fs::write(&self.path, &content).map_err(write_error);
            }
        }

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_error)?;
        tmp.write_all(&content).map_err(write_error)?;
        tmp.flush().map_err(write_error)?;
        tmp.as_file().sync_all().map_err(write_error)?;
        tmp.persist(&self.path).map_err(|e| write_error(e.error))?;

        debug!(path = ?self.path, aliases = set.len(), "Alias cache written");
        Ok(())
    }

    /// Rename the cache to `<path>.corrupt` so the next save does not
    /// overwrite it. Returns the new path.
    pub fn set_aside(&self) -> Result<PathBuf, CacheError> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        let moved = PathBuf::from(name);
        std::fs::rename(&self.path, &moved).map_err(|source| CacheError::SetAside {
            path: self.path.clone(),
            source,
        })?;
        Ok(moved)
    }

    pub async fn load_async(&self) -> Result<AliasSet, CacheError> {
        self.blocking(|cache| cache.load()).await
    }

    pub async fn save_async(&self, set: AliasSet) -> Result<(), CacheError> {
        self.blocking(move |cache| cache.save(&set)).await
    }

    pub async fn set_aside_async(&self) -> Result<PathBuf, CacheError> {
        self.blocking(|cache| cache.set_aside()).await
    }

    async fn blocking<T, F>(&self, job: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(AliasCache) -> Result<T, CacheError> + Send + 'static,
    {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || job(cache)).await?
    }
}
