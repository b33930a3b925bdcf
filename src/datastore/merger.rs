//! Background compaction of frozen segments.
//!
//! Folds every non-active segment into one rewritten segment: only the
//! newest occurrence of each key survives, tombstoned keys are dropped
//! entirely. Lookups keep walking newest-first throughout, so installing
//! the merged segment changes no visible key/value mapping.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::entry;
use super::error::{Result, StoreError};
use super::index::IndexCommand;
use super::segment::Segment;
use super::TOMBSTONE;

/// Runs one merge: snapshot the frozen segments, rewrite them into `dest`,
/// install the result through the index loop, then delete the replaced
/// files. The active segment keeps accepting writes throughout.
pub(crate) fn merge(index_tx: &mpsc::UnboundedSender<IndexCommand>, dest: PathBuf) -> Result<()> {
    let (reply_tx, reply_rx) = oneshot::channel();
    index_tx
        .send(IndexCommand::SnapshotFrozen { reply: reply_tx })
        .map_err(|_| StoreError::Closed)?;
    let frozen = reply_rx.blocking_recv().map_err(|_| StoreError::Closed)?;
    if frozen.is_empty() {
        return Ok(());
    }

    let merged = match fold(&frozen, &dest) {
        Ok(merged) => merged,
        Err(err) => {
            let _ = fs::remove_file(&dest);
            return Err(err);
        }
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    index_tx
        .send(IndexCommand::InstallMerged {
            merged,
            replaced: frozen.len(),
            reply: reply_tx,
        })
        .map_err(|_| StoreError::Closed)?;
    let removed = reply_rx.blocking_recv().map_err(|_| StoreError::Closed)?;
    for path in &removed {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "could not remove merged-out segment");
        }
    }
    debug!(folded = frozen.len(), "merge complete");
    Ok(())
}

/// Rewrites `frozen` (oldest first) into a single segment file at `dest`,
/// which is synced before this returns.
fn fold(frozen: &[Segment], dest: &Path) -> Result<Segment> {
    let mut file = OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(dest)?;
    let mut merged = Segment::new(dest.to_path_buf());
    let mut offset = 0u64;

    for (i, segment) in frozen.iter().enumerate() {
        for (key, key_offset) in segment.iter() {
            if frozen[i + 1..].iter().any(|newer| newer.contains(key)) {
                // a newer frozen copy will be written on a later pass
                continue;
            }
            let value = segment.read_at(key_offset)?;
            if value == TOMBSTONE {
                continue;
            }
            let frame = entry::encode(key, &value);
            file.write_all(&frame)?;
            merged.insert(key.clone(), offset);
            offset += frame.len() as u64;
        }
    }

    file.sync_all()?;
    Ok(merged)
}
