use std::io::Write;
use std::path::PathBuf;

use debundle_core::error::Result;
use debundle_core::outcome::ChunkFailure;
use debundle_core::preview::render_tree;
use debundle_core::{
    CancelToken, Outcome, ScanOptions, archive_directory, extract, extract_to_archive,
    extract_to_directory,
};
use serde::Serialize;

use crate::presentation::cli::ScanArgs;

fn scan_options(args: ScanArgs) -> ScanOptions {
    let mut opts = ScanOptions::default();
    if let Some(p) = args.pattern {
        opts.delimiter_pattern = p;
    }
    if let Some(n) = args.chunk_size {
        opts.chunk_size = n;
    }
    opts.workers = args.workers;
    opts
}

/// Progress sink that logs a percentage only when it changes.
fn log_progress(stage: &'static str) -> impl FnMut(u8) {
    let mut last = None;
    move |percent| {
        if last != Some(percent) {
            last = Some(percent);
            tracing::info!(stage, percent, "progress");
        }
    }
}

fn finished<T>(outcome: Outcome<T>) -> Option<T> {
    match outcome {
        Outcome::Completed(v) => Some(v),
        Outcome::Cancelled => {
            eprintln!("cancelled; no output written");
            None
        }
    }
}

fn warn_failures(failures: &[ChunkFailure]) {
    for f in failures {
        tracing::warn!(chunk = f.ordinal, "{f}");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).map_err(std::io::Error::other)?;
    writeln!(out)?;
    Ok(())
}

pub fn handle_extract(bundle: PathBuf, scan: ScanArgs, json: bool) -> Result<()> {
    let opts = scan_options(scan);
    let mut progress = log_progress("scan");
    let Some(extraction) = finished(extract(&bundle, &opts, &CancelToken::new(), &mut progress)?)
    else {
        return Ok(());
    };
    warn_failures(&extraction.failures);

    if json {
        return print_json(&extraction);
    }
    let mut out = std::io::stdout().lock();
    for (path, content) in extraction.files.iter() {
        writeln!(out, "{path}\t{}", content.len())?;
    }
    eprintln!(
        "{} files ({} bytes), {} duplicate paths, {} chunk failures",
        extraction.files.len(),
        extraction.files.total_bytes(),
        extraction.files.duplicates(),
        extraction.failures.len()
    );
    Ok(())
}

pub fn handle_unpack(bundle: PathBuf, out: PathBuf, scan: ScanArgs, json: bool) -> Result<()> {
    let opts = scan_options(scan);
    let mut progress = log_progress("unpack");
    let outcome = extract_to_directory(&bundle, &out, &opts, &CancelToken::new(), &mut progress)?;
    let Some(report) = finished(outcome) else {
        return Ok(());
    };
    warn_failures(&report.failures);

    if json {
        return print_json(&report);
    }
    eprintln!(
        "unpack: {} files ({} bytes) -> {}",
        report.files,
        report.bytes,
        report.output.display()
    );
    Ok(())
}

pub fn handle_unpack_zip(bundle: PathBuf, out: PathBuf, scan: ScanArgs, json: bool) -> Result<()> {
    let opts = scan_options(scan);
    let mut progress = log_progress("unpack+zip");
    let outcome = extract_to_archive(&bundle, &out, &opts, &CancelToken::new(), &mut progress)?;
    let Some(report) = finished(outcome) else {
        return Ok(());
    };
    warn_failures(&report.unpacked.failures);
    for f in &report.archive.failures {
        tracing::warn!(entry = %f.path, reason = %f.reason, "entry skipped");
    }

    if json {
        return print_json(&report);
    }
    eprintln!(
        "unpack: {} files -> {}",
        report.archive.files,
        report.archive.archive.display()
    );
    Ok(())
}

pub fn handle_zip(dir: PathBuf, out: PathBuf, json: bool) -> Result<()> {
    let mut progress = log_progress("zip");
    let outcome = archive_directory(&dir, &out, &CancelToken::new(), &mut progress)?;
    let Some(report) = finished(outcome) else {
        return Ok(());
    };
    for f in &report.failures {
        tracing::warn!(entry = %f.path, reason = %f.reason, "entry skipped");
    }

    if json {
        return print_json(&report);
    }
    eprintln!(
        "zip: {} files, {} directories -> {}",
        report.files,
        report.directories,
        report.archive.display()
    );
    Ok(())
}

pub fn handle_tree(bundle: PathBuf, scan: ScanArgs) -> Result<()> {
    let opts = scan_options(scan);
    let mut progress = log_progress("scan");
    let Some(extraction) = finished(extract(&bundle, &opts, &CancelToken::new(), &mut progress)?)
    else {
        return Ok(());
    };
    warn_failures(&extraction.failures);
    print!("{}", render_tree(extraction.files.paths()));
    Ok(())
}
