use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Split concatenated source bundles back into files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Scan settings shared by every command that reads a bundle.
#[derive(Args)]
pub struct ScanArgs {
    /// Delimiter regex; a line matching at column 0 starts a new file
    #[arg(long, env = "DEBUNDLE_PATTERN")]
    pub pattern: Option<String>,

    /// Bytes per chunk
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<usize>,

    /// Worker threads (defaults to available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a bundle into memory and list the files it holds
    Extract {
        bundle: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,

        /// Print paths and contents as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the files of a bundle under an output directory
    Unpack {
        bundle: PathBuf,
        out: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,

        /// Treat `out` as a zip archive path instead of a directory
        #[arg(long)]
        zip: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Zip a directory tree
    Zip {
        dir: PathBuf,
        out: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the directory tree a bundle would unpack into
    Tree {
        bundle: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },
}
