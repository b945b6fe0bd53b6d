#![forbid(unsafe_code)]

pub mod cancel;
pub mod error;
pub mod options;
pub mod outcome;
pub mod progress;

pub mod source;
pub mod split;

pub mod store;

pub mod scan;
pub mod unpack;

pub mod archive;
pub mod preview;

// Re-exports: stable API surface
pub use archive::{ArchiveReport, BundleArchiveReport, archive_directory, extract_to_archive};
pub use cancel::CancelToken;
pub use error::{ArchiveError, Error, ScanError};
pub use options::{DEFAULT_CHUNK_SIZE, DEFAULT_DELIMITER, ScanOptions};
pub use outcome::{ChunkFailure, EntryFailure, FailureKind, Outcome};
pub use progress::{NoProgress, ProgressSink};
pub use scan::{Extraction, ScanCoordinator, extract};
pub use store::memory::LogicalFileStore;
pub use unpack::{DirectoryReport, extract_to_directory};
