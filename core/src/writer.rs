//! Background persistence of collection snapshots.
//!
//! Snapshots are taken in mutation order and queued to a single task, which
//! hands each write to the blocking pool. Writes never overlap, and when
//! several snapshots pile up behind a slow store only the newest is written.

use std::sync::Arc;

use log::{debug, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::storage::ByteStore;

pub struct SnapshotWriter {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

impl SnapshotWriter {
    pub fn spawn(handle: &Handle, backend: Arc<dyn ByteStore>, key: String) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let task = handle.spawn(async move {
            while let Some(mut bytes) = rx.recv().await {
                while let Ok(newer) = rx.try_recv() {
                    bytes = newer;
                }
                let backend = Arc::clone(&backend);
                let key = key.clone();
                let len = bytes.len();
                match tokio::task::spawn_blocking(move || backend.set(key, bytes)).await {
                    Ok(Ok(())) => debug!("persisted adventure snapshot ({len} bytes)"),
                    Ok(Err(e)) => warn!("failed to persist adventures: {e}"),
                    Err(e) => warn!("adventure write did not complete: {e}"),
                }
            }
        });
        Self { tx, task }
    }

    /// Queue `bytes` as the latest snapshot. Never blocks.
    pub fn submit(&self, bytes: Vec<u8>) {
        if self.tx.send(bytes).is_err() {
            warn!("adventure writer stopped; snapshot dropped");
        }
    }

    /// Stop accepting snapshots and wait for queued ones to be written.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!("adventure writer ended abnormally: {e}");
        }
    }
}
