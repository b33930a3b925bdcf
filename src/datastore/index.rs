//! Index loop: single owner of the segment list.
//!
//! Serializing every read and write of `segments` (and of each segment's
//! key→offset map) through one task eliminates data races without locking.
//! The merger publishes its rewritten segment through here as well, so the
//! list only ever has one writer.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::segment::Segment;

/// Where a key's newest value lives.
#[derive(Debug)]
pub(crate) struct Location {
    pub path: PathBuf,
    pub offset: u64,
}

pub(crate) enum IndexCommand {
    /// Record `key → offset` in the active segment.
    Assign { key: String, offset: u64 },

    /// Walk the segments newest-to-oldest and reply with the first hit.
    Lookup {
        key: String,
        reply: oneshot::Sender<Option<Location>>,
    },

    /// Rotation point: append the new active segment. Replies with the new
    /// segment count.
    AppendSegment {
        segment: Segment,
        reply: oneshot::Sender<usize>,
    },

    /// Clones of every non-active segment, oldest first.
    SnapshotFrozen { reply: oneshot::Sender<Vec<Segment>> },

    /// Replace the oldest `replaced` segments with `merged`; replies with
    /// the paths of the files that fell out of the list.
    InstallMerged {
        merged: Segment,
        replaced: usize,
        reply: oneshot::Sender<Vec<PathBuf>>,
    },

    SegmentCount { reply: oneshot::Sender<usize> },
}

/// Spawns the index loop over the recovered segment list and returns its
/// command queue.
pub(crate) fn spawn(segments: Vec<Segment>) -> mpsc::UnboundedSender<IndexCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(segments, rx));
    tx
}

async fn run(mut segments: Vec<Segment>, mut rx: mpsc::UnboundedReceiver<IndexCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            IndexCommand::Assign { key, offset } => {
                if let Some(active) = segments.last_mut() {
                    active.insert(key, offset);
                }
            }
            IndexCommand::Lookup { key, reply } => {
                let hit = segments.iter().rev().find_map(|segment| {
                    segment.offset_of(&key).map(|offset| Location {
                        path: segment.path().to_path_buf(),
                        offset,
                    })
                });
                let _ = reply.send(hit);
            }
            IndexCommand::AppendSegment { segment, reply } => {
                debug!(path = %segment.path().display(), "segment rotated in");
                segments.push(segment);
                let _ = reply.send(segments.len());
            }
            IndexCommand::SnapshotFrozen { reply } => {
                let frozen = segments[..segments.len().saturating_sub(1)].to_vec();
                let _ = reply.send(frozen);
            }
            IndexCommand::InstallMerged {
                merged,
                replaced,
                reply,
            } => {
                let replaced = replaced.min(segments.len());
                let removed: Vec<PathBuf> = segments
                    .drain(..replaced)
                    .map(|segment| segment.path().to_path_buf())
                    .collect();
                segments.insert(0, merged);
                debug!(
                    removed = removed.len(),
                    segments = segments.len(),
                    "merged segment installed"
                );
                let _ = reply.send(removed);
            }
            IndexCommand::SegmentCount { reply } => {
                let _ = reply.send(segments.len());
            }
        }
    }
    debug!("index loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(tx: &mpsc::UnboundedSender<IndexCommand>) -> usize {
        let (reply, rx) = oneshot::channel();
        tx.send(IndexCommand::SegmentCount { reply }).unwrap();
        rx.await.unwrap()
    }

    async fn lookup(tx: &mpsc::UnboundedSender<IndexCommand>, key: &str) -> Option<Location> {
        let (reply, rx) = oneshot::channel();
        tx.send(IndexCommand::Lookup {
            key: key.to_string(),
            reply,
        })
        .unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn newest_segment_wins_lookup() {
        let mut old = Segment::new(PathBuf::from("current-data0"));
        old.insert("k".to_string(), 7);
        let tx = spawn(vec![old]);

        let (reply, rx) = oneshot::channel();
        tx.send(IndexCommand::AppendSegment {
            segment: Segment::new(PathBuf::from("current-data1")),
            reply,
        })
        .unwrap();
        assert_eq!(rx.await.unwrap(), 2);

        // before any assignment the old offset is still visible
        assert_eq!(lookup(&tx, "k").await.unwrap().offset, 7);

        tx.send(IndexCommand::Assign {
            key: "k".to_string(),
            offset: 21,
        })
        .unwrap();
        let hit = lookup(&tx, "k").await.unwrap();
        assert_eq!(hit.offset, 21);
        assert_eq!(hit.path, PathBuf::from("current-data1"));
        assert!(lookup(&tx, "missing").await.is_none());
    }

    #[tokio::test]
    async fn install_replaces_the_frozen_prefix() {
        let mut a = Segment::new(PathBuf::from("current-data0"));
        a.insert("a".to_string(), 0);
        let mut b = Segment::new(PathBuf::from("current-data2"));
        b.insert("b".to_string(), 0);
        let active = Segment::new(PathBuf::from("current-data4"));
        let tx = spawn(vec![a, b, active]);

        let (reply, rx) = oneshot::channel();
        tx.send(IndexCommand::SnapshotFrozen { reply }).unwrap();
        let frozen = rx.await.unwrap();
        assert_eq!(frozen.len(), 2);

        let mut merged = Segment::new(PathBuf::from("current-data3"));
        merged.insert("a".to_string(), 0);
        merged.insert("b".to_string(), 13);
        let (reply, rx) = oneshot::channel();
        tx.send(IndexCommand::InstallMerged {
            merged,
            replaced: frozen.len(),
            reply,
        })
        .unwrap();
        let removed = rx.await.unwrap();
        assert_eq!(
            removed,
            vec![PathBuf::from("current-data0"), PathBuf::from("current-data2")]
        );
        assert_eq!(count(&tx).await, 2);
        assert_eq!(lookup(&tx, "b").await.unwrap().offset, 13);
    }
}
