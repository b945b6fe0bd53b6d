use thiserror::Error;

/// Fatal errors of a bundle scan (`extract`, `extract_to_directory`).
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid delimiter pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("worker count must be greater than zero")]
    InvalidWorkerCount,

    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Fatal errors while writing an archive container.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive container: {0}")]
    Container(#[from] zip::result::ZipError),

    #[error("cannot walk {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;
