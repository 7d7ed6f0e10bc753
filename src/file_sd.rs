//! FileSdWriter - Persists delivered snapshots for Prometheus file based discovery
//!
//! Every snapshot received from the discovery loop replaces the whole output
//! file. The file is written next to its final location and renamed into
//! place, so a reader never observes a half written target list.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::model::{FileSdEntry, TargetGroup};

/// Consumer writing target groups to a file_sd JSON file
pub struct FileSdWriter {
    path: PathBuf,

    /// Time of the last successful write
    last_write_tx: watch::Sender<Option<DateTime<Utc>>>,
}

impl FileSdWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (last_write_tx, _) = watch::channel(None);

        Self {
            path: path.into(),
            last_write_tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Receiver following the time of every successful write
    pub fn last_write(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_write_tx.subscribe()
    }

    /// Replace the output file with `groups`
    pub async fn write(&self, groups: &[TargetGroup]) -> Result<()> {
        let entries: Vec<FileSdEntry> = groups.iter().map(TargetGroup::to_file_sd).collect();

        let mut content =
            serde_json::to_vec_pretty(&entries).context("Failed to serialize target groups")?;
        content.push(b'\n');

        let temp_path = self.temp_path();

        tokio::fs::write(&temp_path, &content)
            .await
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| {
                format!(
                    "Failed to move {} to {}",
                    temp_path.display(),
                    self.path.display()
                )
            })?;

        self.last_write_tx.send_replace(Some(Utc::now()));

        Ok(())
    }

    /// Write every received snapshot until the channel closes or `cancel` fires
    ///
    /// A failed write is logged and the next snapshot is awaited.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn run(
        self,
        mut target_rx: mpsc::Receiver<Vec<TargetGroup>>,
        cancel: CancellationToken,
    ) {
        debug!("starting file_sd writer");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("cancelled");
                    break;
                }

                snapshot = target_rx.recv() => match snapshot {
                    Some(groups) => match self.write(&groups).await {
                        Ok(()) => info!(groups = groups.len(), "target file updated"),
                        Err(e) => error!("{e:#}"),
                    },
                    None => {
                        debug!("target channel closed");
                        break;
                    }
                }
            }
        }

        debug!("file_sd writer stopped");
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}
