use crate::cancel::CancelToken;
use crate::error::{ArchiveError, Result};
use crate::options::ScanOptions;
use crate::outcome::{EntryFailure, Outcome};
use crate::progress::{Monotonic, ProgressSink, Scaled};
use crate::unpack::{DirectoryReport, extract_to_directory};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub archive: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    pub failures: Vec<EntryFailure>,
}

/// Bundle → directory → archive in one call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BundleArchiveReport {
    pub unpacked: DirectoryReport,
    pub archive: ArchiveReport,
}

/// Deletes a partially written archive unless disarmed.
struct PartialArchive<'a> {
    path: &'a Path,
    armed: bool,
}

impl Drop for PartialArchive<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(self.path);
        }
    }
}

enum EntryError {
    Source(std::io::Error),
    Container(ArchiveError),
}

struct Walked {
    dirs: Vec<String>,
    files: Vec<(PathBuf, String)>,
    failures: Vec<EntryFailure>,
}

/// Zip every file under `root` (deflate), entry names relative to `root`.
///
/// Progress counts files, not bytes. A file that cannot be read is reported
/// and skipped; a write to the archive itself that fails aborts the run.
/// Cancelled and failed runs delete the archive file.
pub fn archive_directory(
    root: &Path,
    output_archive: &Path,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> std::result::Result<Outcome<ArchiveReport>, ArchiveError> {
    let walked = walk(root, output_archive)?;
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    tracing::info!(
        root = %root.display(),
        archive = %output_archive.display(),
        files = walked.files.len(),
        dirs = walked.dirs.len(),
        "archive started"
    );
    write_archive(walked, output_archive, cancel, progress)
}

fn write_archive(
    walked: Walked,
    output_archive: &Path,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> std::result::Result<Outcome<ArchiveReport>, ArchiveError> {
    let mut report = ArchiveReport {
        archive: output_archive.to_path_buf(),
        failures: walked.failures,
        ..Default::default()
    };
    let out = File::create(output_archive)?;
    let mut guard = PartialArchive {
        path: output_archive,
        armed: true,
    };
    let mut zip = ZipWriter::new(out);
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for dir in &walked.dirs {
        zip.add_directory(dir.as_str(), opts)?;
        report.directories += 1;
    }

    let total = walked.files.len() as u64;
    let mut progress = Monotonic::new(progress);
    let mut buf = vec![0u8; 1 << 16];
    for (i, (path, name)) in walked.files.iter().enumerate() {
        if cancel.is_cancelled() {
            drop(zip);
            tracing::info!(added = report.files, "archive cancelled; partial archive removed");
            return Ok(Outcome::Cancelled);
        }
        match add_file(&mut zip, path, name, opts, &mut buf) {
            Ok(n) => {
                report.files += 1;
                report.bytes += n;
            }
            Err(EntryError::Source(e)) => {
                tracing::warn!(entry = %name, error = %e, "cannot add file; skipped");
                report.failures.push(EntryFailure {
                    path: name.clone(),
                    reason: e.to_string(),
                });
            }
            Err(EntryError::Container(e)) => return Err(e),
        }
        progress.update(i as u64 + 1, total);
    }
    if total == 0 {
        progress.update(0, 0);
    }

    zip.finish()?.sync_all()?;
    guard.armed = false;
    tracing::info!(
        files = report.files,
        failures = report.failures.len(),
        "archive finished"
    );
    Ok(Outcome::Completed(report))
}

fn add_file(
    zip: &mut ZipWriter<File>,
    path: &Path,
    name: &str,
    opts: SimpleFileOptions,
    buf: &mut [u8],
) -> std::result::Result<u64, EntryError> {
    let container = |e: ArchiveError| EntryError::Container(e);
    let mut src = File::open(path).map_err(EntryError::Source)?;
    let size = src.metadata().map_err(EntryError::Source)?.len();
    zip.start_file(name, opts.large_file(size >= u32::MAX as u64))
        .map_err(|e| container(e.into()))?;

    let mut written = 0u64;
    loop {
        let n = match src.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                zip.abort_file().map_err(|e| container(e.into()))?;
                return Err(EntryError::Source(e));
            }
        };
        zip.write_all(&buf[..n]).map_err(|e| container(e.into()))?;
        written += n as u64;
    }
    Ok(written)
}

fn walk(root: &Path, output_archive: &Path) -> std::result::Result<Walked, ArchiveError> {
    let skip = output_archive.canonicalize().ok();
    let mut walked = Walked {
        dirs: Vec::new(),
        files: Vec::new(),
        failures: Vec::new(),
    };
    for e in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let e = match e {
            Ok(e) => e,
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                walked.failures.push(EntryFailure {
                    path,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        if e.depth() == 0 {
            continue;
        }
        let Some(name) = entry_name(root, e.path()) else {
            continue;
        };
        let ft = e.file_type();
        if ft.is_dir() {
            walked.dirs.push(name);
        } else if ft.is_file() {
            if skip.is_some() && e.path().canonicalize().ok() == skip {
                continue;
            }
            walked.files.push((e.path().to_path_buf(), name));
        } else {
            let reason = if ft.is_symlink() {
                "symbolic link not followed"
            } else {
                "not a regular file"
            };
            tracing::warn!(entry = %name, reason, "entry skipped");
            walked.failures.push(EntryFailure {
                path: name,
                reason: reason.to_string(),
            });
        }
    }
    Ok(walked)
}

/// `/`-separated path of `path` relative to `root`.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

/// Unpack the bundle into a temp directory next to `output_archive`, then zip it.
///
/// Progress: the unpack stage reports 0..=50, archiving 50..=100.
pub fn extract_to_archive(
    source_path: &Path,
    output_archive: &Path,
    options: &ScanOptions,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> Result<Outcome<BundleArchiveReport>> {
    let parent = output_archive
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let work = tempfile::Builder::new()
        .prefix(".debundle-")
        .tempdir_in(parent)?;
    let tree = work.path().join("tree");

    let mut first = Scaled {
        sink: progress,
        base: 0,
        span: 50,
    };
    let unpacked = match extract_to_directory(source_path, &tree, options, cancel, &mut first)? {
        Outcome::Completed(r) => r,
        Outcome::Cancelled => return Ok(Outcome::Cancelled),
    };

    let mut second = Scaled {
        sink: first.sink,
        base: 50,
        span: 50,
    };
    let archived = archive_directory(&tree, output_archive, cancel, &mut second)?;
    work.close()?;
    Ok(archived.map(|archive| BundleArchiveReport { unpacked, archive }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    #[test]
    fn entry_names_use_forward_slashes() {
        let root = Path::new("root");
        assert_eq!(
            entry_name(root, &root.join("a").join("b.txt")),
            Some("a/b.txt".to_string())
        );
        assert_eq!(entry_name(root, Path::new("elsewhere")), None);
    }

    #[test]
    fn missing_root_is_fatal() {
        let work = tempfile::tempdir().unwrap();
        let err = archive_directory(
            &work.path().join("missing"),
            &work.path().join("out.zip"),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ArchiveError::Walk(_)));
        assert!(!work.path().join("out.zip").exists());
    }

    #[test]
    fn archive_inside_root_is_not_added_to_itself() {
        let work = tempfile::tempdir().unwrap();
        fs::write(work.path().join("a.txt"), "a").unwrap();
        let out = work.path().join("self.zip");
        fs::write(&out, "stale").unwrap();
        let report = archive_directory(work.path(), &out, &CancelToken::new(), &mut NoProgress)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(report.files, 1);
        let zip = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
    }

    #[test]
    fn empty_root_gives_empty_archive_and_full_progress() {
        let work = tempfile::tempdir().unwrap();
        let root = work.path().join("root");
        fs::create_dir(&root).unwrap();
        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        let out = work.path().join("out.zip");
        let report = archive_directory(&root, &out, &CancelToken::new(), &mut sink)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(report.files, 0);
        assert_eq!(seen, vec![100]);
        assert!(out.exists());
    }

    #[test]
    fn file_gone_before_it_is_added_is_reported_and_others_kept() {
        let work = tempfile::tempdir().unwrap();
        let root = work.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.txt"), "aaa").unwrap();
        fs::write(root.join("b.txt"), "bbb").unwrap();
        fs::write(root.join("c.txt"), "ccc").unwrap();
        let out = work.path().join("out.zip");

        let walked = walk(&root, &out).unwrap();
        fs::remove_file(root.join("b.txt")).unwrap();
        let report = write_archive(walked, &out, &CancelToken::new(), &mut NoProgress)
            .unwrap()
            .completed()
            .unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "b.txt");

        let mut zip = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        for (name, want) in [("a.txt", "aaa"), ("c.txt", "ccc")] {
            let mut got = String::new();
            zip.by_name(name).unwrap().read_to_string(&mut got).unwrap();
            assert_eq!(got, want);
        }
    }

    #[test]
    fn container_failure_is_fatal_and_removes_the_archive() {
        let work = tempfile::tempdir().unwrap();
        let file = work.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let out = work.path().join("out.zip");
        // two entries under one name: the container refuses the second
        let walked = Walked {
            dirs: Vec::new(),
            files: vec![(file.clone(), "a.txt".into()), (file, "a.txt".into())],
            failures: Vec::new(),
        };
        let err = write_archive(walked, &out, &CancelToken::new(), &mut NoProgress)
            .err()
            .unwrap();
        assert!(matches!(err, ArchiveError::Container(_)));
        assert!(!out.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_reported_not_followed() {
        let work = tempfile::tempdir().unwrap();
        let root = work.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("real.txt"), "r").unwrap();
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();
        let out = work.path().join("out.zip");
        let report = archive_directory(&root, &out, &CancelToken::new(), &mut NoProgress)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(report.files, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "link.txt");
        assert_eq!(report.failures[0].reason, "symbolic link not followed");
    }
}
