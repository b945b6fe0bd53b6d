//! Parallel, order-preserving extraction into memory.
//!
//! Two phases: workers in a bounded rayon pool read and split chunks on their
//! own ([`Splitter::scan_detached`]); the coordinator thread buffers the
//! results by ordinal and stitches them onto one [`Fragment`] strictly in
//! ordinal order. Completion order never affects the result.

use crate::cancel::CancelToken;
use crate::error::ScanError;
use crate::options::ScanOptions;
use crate::outcome::{ChunkFailure, Outcome};
use crate::progress::{Monotonic, ProgressSink};
use crate::source::SourceFile;
use crate::split::{ChunkScan, Fragment, Splitter};
use crate::store::memory::LogicalFileStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub files: LogicalFileStore,
    pub failures: Vec<ChunkFailure>,
    pub chunks: u64,
    pub bytes: u64,
}

pub struct ScanCoordinator {
    splitter: Arc<Splitter>,
    chunk_size: usize,
    workers: usize,
}

type Delivery = (u64, std::io::Result<ChunkScan>);

impl ScanCoordinator {
    pub fn new(options: &ScanOptions) -> Result<Self, ScanError> {
        options.validate()?;
        Ok(Self {
            splitter: Arc::new(Splitter::new(&options.delimiter_pattern)?),
            chunk_size: options.chunk_size,
            workers: options.effective_workers(),
        })
    }

    pub fn run(
        &self,
        source: Arc<SourceFile>,
        cancel: &CancelToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<Outcome<Extraction>, ScanError> {
        let total = source.len();
        tracing::info!(
            source = %source.path().display(),
            bytes = total,
            chunk_size = self.chunk_size,
            workers = self.workers,
            "scan started"
        );
        if cancel.is_cancelled() {
            return Ok(cancelled(0));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("debundle-scan-{i}"))
            .build()?;
        let (tx, rx) = crossbeam_channel::unbounded::<Delivery>();

        // dispatched + buffered chunks never exceed this
        let window = self.workers.saturating_mul(2).max(2);
        let mut chunks = source.chunks(self.chunk_size)?;
        let mut exhausted = false;
        let mut in_flight = 0usize;
        let mut ready: BTreeMap<u64, ChunkScan> = BTreeMap::new();
        let mut next = 0u64;

        let mut frag = Fragment::default();
        let mut out = Extraction::default();
        let mut progress = Monotonic::new(progress);

        loop {
            while !exhausted && in_flight + ready.len() < window {
                if cancel.is_cancelled() {
                    return Ok(cancelled(next));
                }
                let Some(chunk) = chunks.next() else {
                    exhausted = true;
                    break;
                };
                let tx = tx.clone();
                let src = Arc::clone(&source);
                let splitter = Arc::clone(&self.splitter);
                pool.spawn(move || {
                    let res = src
                        .read_chunk(&chunk)
                        .map(|bytes| splitter.scan_detached(&chunk, &bytes));
                    // receiver is gone after cancellation; nothing to report then
                    let _ = tx.send((chunk.ordinal, res));
                });
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }
            let (ordinal, res) = rx.recv().map_err(std::io::Error::other)?;
            in_flight -= 1;
            ready.insert(ordinal, res?);

            while let Some(scan) = ready.remove(&next) {
                if cancel.is_cancelled() {
                    return Ok(cancelled(next));
                }
                out.bytes += scan.chunk().len();
                let batch = frag.absorb(&self.splitter, scan);
                for rec in batch.records {
                    out.files.insert(rec);
                }
                out.failures.extend(batch.failures);
                tracing::debug!(chunk = next, merged = out.bytes, "chunk merged");
                next += 1;
                progress.update(out.bytes, total);
            }
        }

        let batch = frag.finish(&self.splitter);
        for rec in batch.records {
            out.files.insert(rec);
        }
        out.failures.extend(batch.failures);
        out.chunks = next;
        if total == 0 {
            progress.update(0, 0);
        }

        tracing::info!(
            files = out.files.len(),
            duplicates = out.files.duplicates(),
            failures = out.failures.len(),
            chunks = out.chunks,
            "scan finished"
        );
        Ok(Outcome::Completed(out))
    }
}

fn cancelled(merged: u64) -> Outcome<Extraction> {
    tracing::info!(merged_chunks = merged, "scan cancelled; partial results discarded");
    Outcome::Cancelled
}

/// Extract every logical file of the bundle at `source_path` into memory.
pub fn extract(
    source_path: &Path,
    options: &ScanOptions,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> Result<Outcome<Extraction>, ScanError> {
    let coordinator = ScanCoordinator::new(options)?;
    let source = Arc::new(SourceFile::open(source_path)?);
    coordinator.run(source, cancel, progress)
}
