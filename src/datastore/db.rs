//! Public store handle.
//!
//! `Db` is a cheap clone over the two owner loops' command queues. Typed
//! puts attach a one-byte tag to the stored value (`s` for strings, `i` for
//! decimal integers); typed gets check and strip it. Deletion appends the
//! tombstone sentinel, which lookups treat as absence and the merger erases.

use std::path::Path;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::error::{Result, StoreError};
use super::index::{self, IndexCommand};
use super::recovery;
use super::segment;
use super::writer::{PutRequest, WriterLoop};
use super::TOMBSTONE;

const TAG_STR: u8 = b's';
const TAG_INT: u8 = b'i';

/// Handle to an open store. Clones share the same underlying loops;
/// dropping the last handle shuts the store down and closes the active
/// file.
#[derive(Clone)]
pub struct Db {
    put_tx: mpsc::UnboundedSender<PutRequest>,
    index_tx: mpsc::UnboundedSender<IndexCommand>,
}

impl Db {
    /// Opens (or creates) a store in `dir` with the given byte ceiling for
    /// the active segment, recovering any existing segments by scanning.
    pub async fn open(dir: impl AsRef<Path>, segment_size: u64) -> Result<Db> {
        let dir = dir.as_ref().to_path_buf();
        let recovered = tokio::task::spawn_blocking(move || recovery::open_dir(dir))
            .await
            .map_err(|_| StoreError::Closed)??;

        let index_tx = index::spawn(recovered.segments);
        let writer = WriterLoop::new(
            recovered.dir,
            segment_size,
            recovered.active_file,
            recovered.active_size,
            recovered.next_segment_ix,
            index_tx.clone(),
            Handle::current(),
        );
        let (put_tx, put_rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || writer.run(put_rx));

        Ok(Db { put_tx, index_tx })
    }

    /// Stores a string value under `key`.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.append(key, tagged(value, TAG_STR)).await
    }

    /// Stores an integer value under `key`, encoded as decimal text.
    pub async fn put_i64(&self, key: &str, value: i64) -> Result<()> {
        self.append(key, tagged(&value.to_string(), TAG_INT)).await
    }

    /// Marks `key` absent by appending a tombstone; the next merge erases
    /// it entirely.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.append(key, TOMBSTONE.to_string()).await
    }

    /// Returns `key`'s newest string value.
    pub async fn get(&self, key: &str) -> Result<String> {
        let raw = self.read_raw(key).await?;
        untag(raw, TAG_STR)
    }

    /// Returns `key`'s newest integer value.
    pub async fn get_i64(&self, key: &str) -> Result<i64> {
        let raw = self.read_raw(key).await?;
        let text = untag(raw, TAG_INT)?;
        text.parse().map_err(|_| StoreError::Corrupt)
    }

    /// Number of live segments, the active one included.
    pub async fn segment_count(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.index_tx
            .send(IndexCommand::SegmentCount { reply: reply_tx })
            .map_err(|_| StoreError::Closed)?;
        reply_rx.await.map_err(|_| StoreError::Closed)
    }

    async fn append(&self, key: &str, value: String) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.put_tx
            .send(PutRequest {
                key: key.to_string(),
                value,
                reply: reply_tx,
            })
            .map_err(|_| StoreError::Closed)?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Resolves `key` to its newest raw value, tag still attached. A read
    /// can race the merger deleting the file it was pointed at; a retry
    /// against the refreshed index settles it.
    async fn read_raw(&self, key: &str) -> Result<String> {
        let mut attempts = 0;
        loop {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.index_tx
                .send(IndexCommand::Lookup {
                    key: key.to_string(),
                    reply: reply_tx,
                })
                .map_err(|_| StoreError::Closed)?;
            let Some(location) = reply_rx.await.map_err(|_| StoreError::Closed)? else {
                return Err(StoreError::NotFound);
            };

            let read = tokio::task::spawn_blocking(move || {
                segment::read_value_at(&location.path, location.offset)
            })
            .await
            .map_err(|_| StoreError::Closed)?;

            match read {
                Ok(raw) if raw == TOMBSTONE => return Err(StoreError::NotFound),
                Ok(raw) => return Ok(raw),
                Err(StoreError::Io(err))
                    if attempts < 2 && err.kind() == std::io::ErrorKind::NotFound =>
                {
                    attempts += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn tagged(value: &str, tag: u8) -> String {
    let mut tagged = String::with_capacity(value.len() + 1);
    tagged.push_str(value);
    tagged.push(tag as char);
    tagged
}

fn untag(mut raw: String, tag: u8) -> Result<String> {
    if raw.as_bytes().last() == Some(&tag) {
        raw.pop();
        Ok(raw)
    } else {
        Err(StoreError::TypeMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagging_round_trips() {
        assert_eq!(tagged("value", TAG_STR), "values");
        assert_eq!(untag("values".to_string(), TAG_STR).unwrap(), "value");
        assert!(matches!(
            untag("123i".to_string(), TAG_STR),
            Err(StoreError::TypeMismatch)
        ));
        assert!(matches!(
            untag(String::new(), TAG_INT),
            Err(StoreError::TypeMismatch)
        ));
    }
}
