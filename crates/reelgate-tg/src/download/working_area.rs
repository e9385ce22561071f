use crate::error::IoError;
use crate::link::ContentId;
use crate::prelude::*;
use crate::{err_ctx, util, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Directory for the files of a single download request. It is removed
/// together with its contents when the value is dropped, which includes
/// early returns and panics.
pub(crate) struct WorkingArea {
    dir: Option<TempDir>,
}

impl WorkingArea {
    /// Creates the directory `{content_id}_{unix_ts}_{random}` under `root`
    pub(crate) async fn create(root: &Path, content: &ContentId) -> Result<Self> {
        let root = root.to_owned();
        let prefix = format!("{}_{}_", content.id, chrono::Utc::now().timestamp());

        let dir = util::tokio::spawn_blocking(move || {
            fs_err::create_dir_all(&root)?;
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&root)
        })
        .await
        .map_err(err_ctx!(IoError::CreateWorkingArea))?;

        debug!(path = tracing_path(dir.path()), "Created working area");

        Ok(Self { dir: Some(dir) })
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.as_ref().map(TempDir::path).unwrap_or(Path::new(""))
    }

    pub(crate) fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Removes the directory and waits until it's gone
    pub(crate) async fn remove(mut self) {
        if let Some(dir) = self.dir.take() {
            util::tokio::spawn_blocking(move || close(dir)).await;
        }
    }
}

impl Drop for WorkingArea {
    /// The removal happens in the background if there is a runtime
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || close(dir));
            }
            Err(_) => close(dir),
        }
    }
}

fn close(dir: TempDir) {
    let path = dir.path().to_owned();

    match dir.close() {
        Ok(()) => debug!(path = tracing_path(&path), "Removed working area"),
        Err(err) => warn!(
            err = tracing_err(&err),
            path = tracing_path(&path),
            "Failed to remove working area"
        ),
    }
}
