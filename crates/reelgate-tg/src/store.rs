//! Persisted state of the bot. Every document is a single JSON file that is
//! read in full at the point of use and written in full after a mutation.

use crate::prelude::*;
use crate::Result;
use fs_err::tokio as fs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::marker::PhantomData;
use std::path::PathBuf;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    /// Directory where the documents and the transient downloads live
    #[serde(default = "default_data_dir")]
    pub(crate) data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Config {
    pub(crate) fn users_path(&self) -> PathBuf {
        self.data_dir.join("bot_users.json")
    }

    pub(crate) fn quota_path(&self) -> PathBuf {
        self.data_dir.join("download_limits.json")
    }

    pub(crate) fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("Failed to serialize the document `{path}`")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result of the closure passed to [`JsonDocument::update`]
pub(crate) enum Mutation<R> {
    /// The document was changed and must be written back
    Commit(R),

    /// The document wasn't changed, nothing to write
    Skip(R),
}

/// A JSON file with exclusive access. Every read-modify-write cycle runs
/// under a lock, so concurrent updates never overwrite each other.
pub(crate) struct JsonDocument<T> {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Default::default(),
            _doc: PhantomData,
        }
    }

    pub(crate) async fn read(&self) -> Result<T> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    #[instrument(skip_all, fields(path = tracing_path(&self.path)))]
    pub(crate) async fn update<R>(&self, mutate: impl FnOnce(&mut T) -> Mutation<R>) -> Result<R> {
        let _guard = self.lock.lock().await;

        let mut doc = self.load().await?;

        match mutate(&mut doc) {
            Mutation::Skip(output) => Ok(output),
            Mutation::Commit(output) => {
                self.save(&doc).await?;
                Ok(output)
            }
        }
    }

    async fn load(&self) -> Result<T> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(err) => return Err(err.into()),
        };

        // A corrupted document must not lock everyone out of the bot
        Ok(serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(
                err = tracing_err(&err),
                path = tracing_path(&self.path),
                "Invalid document, starting fresh"
            );
            T::default()
        }))
    }

    async fn save(&self, doc: &T) -> Result {
        let json = serde_json::to_vec(doc).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        // Write and rename, so that a crash never leaves a half-written file
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");

        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;

        Ok(())
    }
}
