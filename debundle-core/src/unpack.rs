use crate::cancel::CancelToken;
use crate::error::ScanError;
use crate::options::ScanOptions;
use crate::outcome::{ChunkFailure, FailureKind, Outcome};
use crate::progress::{Monotonic, ProgressSink};
use crate::source::SourceFile;
use crate::split::{Batch, Fragment, LogicalRecord, Splitter};
use crate::store::spill::{Appended, SpillStore};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryReport {
    pub output: PathBuf,
    pub files: usize,
    pub bytes: u64,
    pub duplicates: u64,
    pub chunks: u64,
    pub failures: Vec<ChunkFailure>,
}

/// Extract the bundle into `output_directory` through a spill store.
///
/// Chunks are processed one after another, so per-file appends stay in bundle
/// order and only the current chunk is held in memory. Nothing appears under
/// `output_directory` until the whole bundle is scanned; a cancelled or failed
/// run leaves it as it was.
pub fn extract_to_directory(
    source_path: &Path,
    output_directory: &Path,
    options: &ScanOptions,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> Result<Outcome<DirectoryReport>, ScanError> {
    options.validate()?;
    let splitter = Splitter::new(&options.delimiter_pattern)?;
    let source = SourceFile::open(source_path)?;
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }

    let parent = output_directory
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut spill = Spill {
        store: SpillStore::new_in(parent)?,
        failures: Vec::new(),
        last_refused: None,
    };
    tracing::info!(
        source = %source.path().display(),
        output = %output_directory.display(),
        bytes = source.len(),
        chunk_size = options.chunk_size,
        "unpack started"
    );

    let total = source.len();
    let mut progress = Monotonic::new(progress);
    let mut frag = Fragment::default();
    let mut merged = 0u64;
    let mut chunks = 0u64;

    for chunk in source.chunks(options.chunk_size)? {
        if cancel.is_cancelled() {
            tracing::info!(merged_chunks = chunks, "unpack cancelled; temp scope removed");
            return Ok(Outcome::Cancelled);
        }
        let bytes = source.read_chunk(&chunk)?;
        let (batch, next) = splitter.scan(&chunk, &bytes, frag);
        frag = next;
        spill.take(batch, chunk.ordinal)?;
        if let Some(part) = frag.drain_open() {
            spill.put(part, chunk.ordinal)?;
        }
        merged += chunk.len();
        chunks += 1;
        progress.update(merged, total);
    }
    spill.take(frag.finish(&splitter), chunks.saturating_sub(1))?;
    if total == 0 {
        progress.update(0, 0);
    }

    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    let duplicates = spill.store.duplicates();
    let placed = spill.store.finalize(output_directory)?;
    tracing::info!(
        files = placed.files,
        bytes = placed.bytes,
        duplicates,
        failures = spill.failures.len(),
        "unpack finished"
    );
    Ok(Outcome::Completed(DirectoryReport {
        output: output_directory.to_path_buf(),
        files: placed.files,
        bytes: placed.bytes,
        duplicates,
        chunks,
        failures: spill.failures,
    }))
}

struct Spill {
    store: SpillStore,
    failures: Vec<ChunkFailure>,
    last_refused: Option<u64>,
}

impl Spill {
    fn take(&mut self, batch: Batch, chunk: u64) -> std::io::Result<()> {
        self.failures.extend(batch.failures);
        for rec in batch.records {
            self.put(rec, chunk)?;
        }
        Ok(())
    }

    fn put(&mut self, rec: LogicalRecord, chunk: u64) -> std::io::Result<()> {
        let kind = match self.store.append(&rec.path, rec.ordinal, &rec.body)? {
            Appended::Written => return Ok(()),
            Appended::Unsafe => FailureKind::UnsafePath { path: rec.path },
            Appended::Conflict => FailureKind::PathConflict { path: rec.path },
        };
        // a long record is refused once per drained piece; report it once
        if self.last_refused != Some(rec.ordinal) {
            self.last_refused = Some(rec.ordinal);
            let failure = ChunkFailure {
                ordinal: chunk,
                kind,
            };
            tracing::warn!("{failure}; record skipped");
            self.failures.push(failure);
        }
        Ok(())
    }
}
