//! Reading stage inputs and writing durable stage outputs.

use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

/// Marker written into a stage directory once every part file is on disk.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Recursively collects readable input files under `path`.
///
/// Hidden files and bookkeeping files starting with `_` are skipped, so a
/// finished stage directory can be used directly as the next stage's input.
/// A plain file path is returned as-is. The result is sorted for stable split
/// numbering.
pub fn collect_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !name.starts_with('_')
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn open_lines(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Reads every line below `path` and chunks the lines into map splits.
///
/// `.gz` files are decompressed on the fly. Missing or empty inputs are a
/// fatal error for the stage.
pub fn read_splits(path: &Path, split_lines: usize) -> Result<Vec<Vec<String>>> {
    let files = collect_files(path);
    if files.is_empty() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        });
    }

    let split_lines = split_lines.max(1);
    let mut splits: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::with_capacity(split_lines.min(4096));
    for file in &files {
        debug!("reading {}", file.display());
        for line in open_lines(file)?.lines() {
            let line = line.map_err(|e| PipelineError::io(file, e))?;
            current.push(line);
            if current.len() == split_lines {
                splits.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        splits.push(current);
    }
    Ok(splits)
}

/// Reads a small side file (totals, gold standard) line by line.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    open_lines(path)?
        .lines()
        .collect::<std::io::Result<Vec<String>>>()
        .map_err(|e| PipelineError::io(path, e))
}

const PART_PREFIX: &str = "part-r-";

/// Name of the output file for reduce partition `index`.
pub fn part_name(index: usize) -> String {
    format!("{PART_PREFIX}{index:05}")
}

/// True for `part-r-*` files written by [`write_partitions`].
pub fn is_part_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with(PART_PREFIX))
}

/// Writes one `part-r-NNNNN` file per partition, then the success marker.
///
/// Stale part files from an earlier run in the same directory are removed
/// first.
pub fn write_partitions<O: Display>(dir: &Path, partitions: &[Vec<O>]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    clear_stage_dir(dir)?;

    let mut written = Vec::with_capacity(partitions.len());
    for (i, records) in partitions.iter().enumerate() {
        let path = dir.join(part_name(i));
        let file = File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
        let mut out = BufWriter::new(file);
        for record in records {
            writeln!(out, "{record}").map_err(|e| PipelineError::io(&path, e))?;
        }
        out.flush().map_err(|e| PipelineError::io(&path, e))?;
        written.push(path);
    }

    let marker = dir.join(SUCCESS_MARKER);
    File::create(&marker).map_err(|e| PipelineError::io(&marker, e))?;
    Ok(written)
}

/// True once a stage directory has been completely written.
pub fn is_complete(dir: &Path) -> bool {
    dir.join(SUCCESS_MARKER).is_file()
}

fn clear_stage_dir(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(PART_PREFIX) || name == SUCCESS_MARKER {
            let path = entry.path();
            fs::remove_file(&path).map_err(|e| PipelineError::io(&path, e))?;
        }
    }
    Ok(())
}
