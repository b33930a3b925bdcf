//! Startup recovery: rebuild every segment's index by scanning its file.
//!
//! Scanning streams frame-by-frame, so frames of any size recover
//! correctly. A partial trailing frame in the active file (the footprint of
//! a write interrupted mid-frame) is truncated back to the last well-formed
//! boundary; corruption anywhere else aborts the open.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::entry;
use super::error::Result;
use super::segment::Segment;
use super::SEGMENT_FILE_PREFIX;

pub(crate) struct RecoveredStore {
    pub dir: PathBuf,
    /// Oldest first; the last element is the active segment.
    pub segments: Vec<Segment>,
    pub active_file: File,
    pub active_size: u64,
    pub next_segment_ix: u64,
}

/// Opens `dir`, scanning any existing segment files in numeric order. The
/// highest-numbered file becomes the active segment; a fresh directory gets
/// an empty `current-data0`.
pub(crate) fn open_dir(dir: PathBuf) -> Result<RecoveredStore> {
    fs::create_dir_all(&dir)?;
    let numbered = segment_files(&dir)?;

    if numbered.is_empty() {
        let path = dir.join(format!("{}0", SEGMENT_FILE_PREFIX));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(dir = %dir.display(), "created empty store");
        return Ok(RecoveredStore {
            dir,
            segments: vec![Segment::new(path)],
            active_file: file,
            active_size: 0,
            next_segment_ix: 1,
        });
    }

    let mut segments = Vec::with_capacity(numbered.len());
    let mut active_size = 0;
    let last = numbered.len() - 1;
    for (i, (_, path)) in numbered.iter().enumerate() {
        let (index, valid_len) = scan_segment(path)?;
        let file_len = fs::metadata(path)?.len();
        if valid_len < file_len {
            if i == last {
                warn!(
                    path = %path.display(),
                    valid_len,
                    file_len,
                    "truncating partial trailing frame"
                );
                OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
            } else {
                warn!(
                    path = %path.display(),
                    valid_len,
                    file_len,
                    "sealed segment carries a partial trailing frame"
                );
            }
        }
        if i == last {
            active_size = valid_len;
        }
        segments.push(Segment::with_index(path.clone(), index));
    }

    let (last_ix, last_path) = &numbered[last];
    let active_file = OpenOptions::new().append(true).open(last_path)?;
    info!(
        dir = %dir.display(),
        segments = segments.len(),
        active_size,
        "store recovered"
    );
    Ok(RecoveredStore {
        dir,
        segments,
        active_file,
        active_size,
        next_segment_ix: last_ix + 1,
    })
}

/// Enumerates `current-data<N>` files, sorted by `N`.
fn segment_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut files = Vec::new();
    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_file() {
            continue;
        }
        let path = dir_entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(suffix) = name.strip_prefix(SEGMENT_FILE_PREFIX) else {
            continue;
        };
        let Ok(ix) = suffix.parse::<u64>() else {
            continue;
        };
        files.push((ix, path));
    }
    files.sort_unstable_by_key(|(ix, _)| *ix);
    Ok(files)
}

/// Streams one segment file front to back, building its key→offset map
/// with last-wins semantics. Also returns the offset of the last
/// well-formed frame boundary.
fn scan_segment(path: &Path) -> Result<(HashMap<String, u64>, u64)> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut index = HashMap::new();
    let mut offset = 0u64;
    while let Some((key, frame_len)) = entry::scan_frame(&mut reader)? {
        index.insert(key, offset);
        offset += frame_len;
    }
    Ok((index, offset))
}
