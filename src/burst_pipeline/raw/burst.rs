//! Burst directory loading.
//!
//! A burst is a directory of raw files from one capture sequence. Files are
//! ordered by any trailing number in the stem (capture counters), falling
//! back to lexicographic order, then decoded in parallel.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::info;

use crate::burst_pipeline::common::error::{PipelineError, Result};
use crate::burst_pipeline::raw::reader::RawFrameReader;
use crate::burst_pipeline::raw::types::RawFrame;

const RAW_EXTENSIONS: [&str; 5] = ["dng", "arw", "nef", "cr2", "raf"];

/// Load every raw file in `dir` as a burst, in capture order.
///
/// Fails with `EmptyBurst` when the directory contains no raw files.
pub fn load_burst<P: AsRef<Path>>(reader: &(impl RawFrameReader + Sync), dir: P) -> Result<Vec<RawFrame>> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::InputReadError(format!("{}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| RAW_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();

    if paths.is_empty() {
        return Err(PipelineError::EmptyBurst);
    }

    paths.sort_by_key(|p| (trailing_number(p), p.clone()));

    info!("Loading burst of {} frames from {}", paths.len(), dir.display());

    paths
        .par_iter()
        .enumerate()
        .map(|(index, path)| {
            let bytes = std::fs::read(path)
                .map_err(|e| PipelineError::InputReadError(format!("{}: {}", path.display(), e)))?;
            reader.read_frame(&bytes, index)
        })
        .collect()
}

/// Trailing number of the file stem, e.g. "burst_N7" -> 7. Missing numbers
/// sort first so mixed directories stay deterministic.
fn trailing_number(path: &Path) -> u64 {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(0)
}
