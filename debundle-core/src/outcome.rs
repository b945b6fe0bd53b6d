use serde::Serialize;

/// Result of an operation that may be stopped through a [`CancelToken`].
///
/// A cancelled run is not an error, and it is never reported as an empty
/// success either: callers can always tell "nothing found" from "stopped".
///
/// [`CancelToken`]: crate::cancel::CancelToken
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(v) => Some(v),
            Outcome::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(v) => Outcome::Completed(f(v)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

/// One chunk (or one record) that could not be used; the scan went on without it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub ordinal: u64,
    pub kind: FailureKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Bytes at `offset` (absolute, in the bundle) are not valid UTF-8.
    Decode { offset: u64 },
    /// The logical path cannot be placed under an output root.
    UnsafePath { path: String },
    /// The logical path needs a file where an earlier path needs a directory, or the reverse.
    PathConflict { path: String },
}

impl std::fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FailureKind::Decode { offset } => {
                write!(f, "chunk #{}: invalid UTF-8 at byte {offset}", self.ordinal)
            }
            FailureKind::UnsafePath { path } => {
                write!(f, "chunk #{}: unsafe path {path:?}", self.ordinal)
            }
            FailureKind::PathConflict { path } => {
                write!(f, "chunk #{}: path {path:?} clashes with an earlier file or directory", self.ordinal)
            }
        }
    }
}

/// A file that could not be added to an archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub path: String,
    pub reason: String,
}
