//! Record boundary detection inside chunks.
//!
//! A chunk is cut at its first and last `\n`:
//!
//! ```text
//! | head ........\n | body (whole lines) ...........\n | tail ...... |
//! ```
//!
//! The head finishes a line that began in an earlier chunk and the tail starts
//! one that ends in a later chunk. Both stay raw bytes until they are joined
//! with their neighbours, so a multi-byte character cut by the chunk edge is
//! never decoded in halves (`\n` cannot occur inside a UTF-8 sequence). Only
//! the body is decoded and split by workers; head/tail stitching is done in
//! chunk order by [`Fragment::absorb`].

use crate::error::ScanError;
use crate::outcome::{ChunkFailure, FailureKind};
use crate::source::Chunk;
use regex::Regex;

/// A completed logical file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalRecord {
    pub path: String,
    /// Exact text between the delimiter line and the next delimiter (or EOF).
    pub body: String,
    /// Position of the delimiter line among all delimiter lines of the bundle.
    pub ordinal: u64,
}

impl LogicalRecord {
    /// Body without its final line terminator.
    pub fn content(&self) -> &str {
        strip_terminator(&self.body)
    }

    pub fn into_content(mut self) -> String {
        let keep = self.content().len();
        self.body.truncate(keep);
        self.body
    }
}

/// Records closed while absorbing one chunk, plus the chunk's isolated failures.
#[derive(Debug, Default)]
pub struct Batch {
    pub records: Vec<LogicalRecord>,
    pub failures: Vec<ChunkFailure>,
}

/// Result of scanning one chunk on its own, without knowledge of its neighbours.
#[derive(Debug)]
pub struct ChunkScan {
    chunk: Chunk,
    head: Vec<u8>,
    body: Option<Body>,
    tail: Vec<u8>,
}

impl ChunkScan {
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }
}

#[derive(Debug, Default)]
struct Body {
    /// Lines before the first delimiter; they continue the record opened earlier.
    leading: String,
    records: Vec<BodyRecord>,
    /// Absolute offset of the first invalid byte; the body is dropped.
    invalid_at: Option<u64>,
}

#[derive(Debug)]
struct BodyRecord {
    path: String,
    body: String,
}

#[derive(Debug)]
struct OpenRecord {
    path: String,
    body: String,
    ordinal: u64,
}

/// State carried across a chunk boundary: the unfinished line, the open
/// record and the number of delimiters seen so far.
#[derive(Debug, Default)]
pub struct Fragment {
    pending: Vec<u8>,
    open: Option<OpenRecord>,
    seen: u64,
    pos: u64,
    last_ordinal: u64,
}

pub struct Splitter {
    pattern: Regex,
}

impl Splitter {
    pub fn new(pattern: &str) -> Result<Self, ScanError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// `line` may still carry its terminator. Matches must start at column 0.
    pub fn is_delimiter(&self, line: &str) -> bool {
        self.pattern
            .find(strip_terminator(line))
            .is_some_and(|m| m.start() == 0)
    }

    /// Parallel half of the scan: cut `bytes` into head/body/tail and split the body.
    pub fn scan_detached(&self, chunk: &Chunk, bytes: &[u8]) -> ChunkScan {
        let Some(first_nl) = bytes.iter().position(|&b| b == b'\n') else {
            return ChunkScan {
                chunk: *chunk,
                head: bytes.to_vec(),
                body: None,
                tail: Vec::new(),
            };
        };
        // a '\n' exists, so rposition cannot miss
        let last_nl = bytes.iter().rposition(|&b| b == b'\n').unwrap_or(first_nl);
        let head = bytes[..=first_nl].to_vec();
        let middle = &bytes[first_nl + 1..=last_nl];
        let tail = bytes[last_nl + 1..].to_vec();

        let body = match std::str::from_utf8(middle) {
            Ok(text) => self.split_body(text),
            Err(e) => Body {
                invalid_at: Some(chunk.start + first_nl as u64 + 1 + e.valid_up_to() as u64),
                ..Default::default()
            },
        };

        ChunkScan {
            chunk: *chunk,
            head,
            body: Some(body),
            tail,
        }
    }

    fn split_body(&self, text: &str) -> Body {
        let mut body = Body::default();
        for line in text.split_inclusive('\n') {
            if self.is_delimiter(line) {
                body.records.push(BodyRecord {
                    path: line.trim().to_string(),
                    body: String::new(),
                });
            } else if let Some(rec) = body.records.last_mut() {
                rec.body.push_str(line);
            } else {
                body.leading.push_str(line);
            }
        }
        body
    }

    /// Sequential contract: scan `bytes` continuing from `incoming`.
    pub fn scan(&self, chunk: &Chunk, bytes: &[u8], mut incoming: Fragment) -> (Batch, Fragment) {
        let batch = incoming.absorb(self, self.scan_detached(chunk, bytes));
        (batch, incoming)
    }

    /// Single-chunk reference scan of a whole bundle.
    pub fn split_whole(&self, bytes: &[u8]) -> Batch {
        let chunk = Chunk {
            ordinal: 0,
            start: 0,
            end: bytes.len() as u64,
        };
        let (mut batch, mut frag) = self.scan(&chunk, bytes, Fragment::default());
        let rest = frag.finish(self);
        batch.records.extend(rest.records);
        batch.failures.extend(rest.failures);
        batch
    }
}

impl Fragment {
    /// Stitch the next chunk (in ordinal order) onto this fragment.
    pub fn absorb(&mut self, splitter: &Splitter, scan: ChunkScan) -> Batch {
        let mut batch = Batch::default();
        let chunk = scan.chunk;
        self.last_ordinal = chunk.ordinal;

        let Some(body) = scan.body else {
            self.pending.extend_from_slice(&scan.head);
            self.pos = chunk.end;
            return batch;
        };

        let line_start = chunk.start.saturating_sub(self.pending.len() as u64);
        let mut line = std::mem::take(&mut self.pending);
        line.extend_from_slice(&scan.head);
        self.take_raw_line(splitter, line, line_start, &mut batch);

        if let Some(offset) = body.invalid_at {
            tracing::warn!(chunk = chunk.ordinal, offset, "chunk is not valid UTF-8; skipped");
            batch.failures.push(ChunkFailure {
                ordinal: chunk.ordinal,
                kind: FailureKind::Decode { offset },
            });
        }
        if let Some(open) = self.open.as_mut() {
            open.body.push_str(&body.leading);
        }
        for rec in body.records {
            self.close(&mut batch);
            self.open = Some(OpenRecord {
                path: rec.path,
                body: rec.body,
                ordinal: self.seen,
            });
            self.seen += 1;
        }

        self.pending = scan.tail;
        self.pos = chunk.end;
        batch
    }

    /// End of input: classify the unterminated last line and close the open record.
    pub fn finish(&mut self, splitter: &Splitter) -> Batch {
        let mut batch = Batch::default();
        if !self.pending.is_empty() {
            let line_start = self.pos.saturating_sub(self.pending.len() as u64);
            let line = std::mem::take(&mut self.pending);
            self.take_raw_line(splitter, line, line_start, &mut batch);
        }
        self.close(&mut batch);
        batch
    }

    /// Hand out the open record's body gathered so far, leaving the record open.
    pub fn drain_open(&mut self) -> Option<LogicalRecord> {
        let open = self.open.as_mut()?;
        Some(LogicalRecord {
            path: open.path.clone(),
            body: std::mem::take(&mut open.body),
            ordinal: open.ordinal,
        })
    }

    fn take_raw_line(&mut self, splitter: &Splitter, raw: Vec<u8>, start: u64, batch: &mut Batch) {
        match String::from_utf8(raw) {
            Ok(line) => self.take_line(splitter, line, batch),
            Err(e) => {
                let offset = start + e.utf8_error().valid_up_to() as u64;
                tracing::warn!(chunk = self.last_ordinal, offset, "line is not valid UTF-8; skipped");
                batch.failures.push(ChunkFailure {
                    ordinal: self.last_ordinal,
                    kind: FailureKind::Decode { offset },
                });
            }
        }
    }

    fn take_line(&mut self, splitter: &Splitter, line: String, batch: &mut Batch) {
        if splitter.is_delimiter(&line) {
            self.close(batch);
            self.open = Some(OpenRecord {
                path: line.trim().to_string(),
                body: String::new(),
                ordinal: self.seen,
            });
            self.seen += 1;
        } else if let Some(open) = self.open.as_mut() {
            open.body.push_str(&line);
        }
    }

    fn close(&mut self, batch: &mut Batch) {
        if let Some(open) = self.open.take() {
            batch.records.push(LogicalRecord {
                path: open.path,
                body: open.body,
                ordinal: open.ordinal,
            });
        }
    }
}

/// Drop one trailing `\n` (or `\r\n`).
pub fn strip_terminator(s: &str) -> &str {
    match s.strip_suffix('\n') {
        Some(s) => s.strip_suffix('\r').unwrap_or(s),
        None => s,
    }
}
