//! A log file plus its in-memory key→offset map.
//!
//! Every segment but the last is sealed: its bytes never change, so reads
//! need no coordination. The active segment only ever grows, and readers
//! only consult offsets the index loop has already committed, which always
//! point at fully written frames.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::entry;
use super::error::Result;

#[derive(Debug, Clone)]
pub(crate) struct Segment {
    path: PathBuf,
    index: HashMap<String, u64>,
}

impl Segment {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            index: HashMap::new(),
        }
    }

    pub fn with_index(path: PathBuf, index: HashMap<String, u64>) -> Self {
        Self { path, index }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records `key`'s newest entry within this segment. In-memory only.
    pub fn insert(&mut self, key: String, offset: u64) {
        self.index.insert(key, offset);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn offset_of(&self, key: &str) -> Option<u64> {
        self.index.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, u64)> {
        self.index.iter().map(|(key, &offset)| (key, offset))
    }

    /// Reads the raw stored value of the frame at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<String> {
        read_value_at(&self.path, offset)
    }
}

/// Opens `path`, seeks to `offset`, and reads one frame's value.
pub(crate) fn read_value_at(path: &Path, offset: u64) -> Result<String> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);
    entry::read_value(&mut reader)
}
