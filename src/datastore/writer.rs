//! Writer loop: single owner of the active file handle.
//!
//! All appends funnel through this loop on a dedicated blocking task, so
//! there is exactly one writer of the active file and of its size counter.
//! Each request gets exactly one completion; a failed write leaves no index
//! entry behind, so readers can never observe it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::entry;
use super::error::{Result, StoreError};
use super::index::IndexCommand;
use super::merger;
use super::segment::Segment;
use super::SEGMENT_FILE_PREFIX;

pub(crate) struct PutRequest {
    pub key: String,
    /// Raw stored value: the user's value with its type tag attached, or
    /// the tombstone sentinel.
    pub value: String,
    pub reply: oneshot::Sender<Result<()>>,
}

pub(crate) struct WriterLoop {
    dir: PathBuf,
    segment_size: u64,
    file: File,
    current_size: u64,
    next_segment_ix: u64,
    index_tx: mpsc::UnboundedSender<IndexCommand>,
    merge_running: Arc<AtomicBool>,
    runtime: Handle,
}

impl WriterLoop {
    pub fn new(
        dir: PathBuf,
        segment_size: u64,
        file: File,
        current_size: u64,
        next_segment_ix: u64,
        index_tx: mpsc::UnboundedSender<IndexCommand>,
        runtime: Handle,
    ) -> Self {
        Self {
            dir,
            segment_size,
            file,
            current_size,
            next_segment_ix,
            index_tx,
            merge_running: Arc::new(AtomicBool::new(false)),
            runtime,
        }
    }

    /// Consumes put requests until every `Db` handle is gone.
    pub fn run(mut self, mut rx: mpsc::UnboundedReceiver<PutRequest>) {
        while let Some(request) = rx.blocking_recv() {
            let result = self.append(&request.key, &request.value);
            let _ = request.reply.send(result);
        }
        debug!("writer loop stopped");
    }

    fn append(&mut self, key: &str, value: &str) -> Result<()> {
        let len = entry::frame_size(key, value);
        if self.current_size + len > self.segment_size {
            self.rotate()?;
        }
        self.file.write_all(&entry::encode(key, value))?;
        self.index_tx
            .send(IndexCommand::Assign {
                key: key.to_string(),
                offset: self.current_size,
            })
            .map_err(|_| StoreError::Closed)?;
        self.current_size += len;
        Ok(())
    }

    /// Seals the active segment and starts a fresh one. Each rotation burns
    /// two file indices: the lower one is reserved for a merged segment, so
    /// merged data always sorts before the active file on recovery.
    fn rotate(&mut self) -> Result<()> {
        let merge_ix = self.next_segment_ix;
        let active_ix = self.next_segment_ix + 1;
        self.next_segment_ix += 2;

        let path = self.segment_path(active_ix);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "rotating active segment");

        let (reply_tx, reply_rx) = oneshot::channel();
        self.index_tx
            .send(IndexCommand::AppendSegment {
                segment: Segment::new(path),
                reply: reply_tx,
            })
            .map_err(|_| StoreError::Closed)?;
        let count = reply_rx.blocking_recv().map_err(|_| StoreError::Closed)?;

        self.file = file;
        self.current_size = 0;
        if count >= 3 {
            self.schedule_merge(merge_ix);
        }
        Ok(())
    }

    fn schedule_merge(&self, merge_ix: u64) {
        if self
            .merge_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // a merge is still running; the next rotation will retry
            return;
        }
        let dest = self.segment_path(merge_ix);
        let index_tx = self.index_tx.clone();
        let gate = Arc::clone(&self.merge_running);
        self.runtime.spawn_blocking(move || {
            if let Err(err) = merger::merge(&index_tx, dest) {
                warn!(error = %err, "background merge failed");
            }
            gate.store(false, Ordering::Release);
        });
    }

    fn segment_path(&self, ix: u64) -> PathBuf {
        self.dir.join(format!("{}{}", SEGMENT_FILE_PREFIX, ix))
    }
}
