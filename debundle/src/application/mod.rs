pub mod handlers;

use clap::Parser;

use crate::presentation::cli::{Cli, Commands};
use debundle_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Extract { bundle, scan, json } => handlers::handle_extract(bundle, scan, json),
        Commands::Unpack {
            bundle,
            out,
            scan,
            zip,
            json,
        } => {
            if zip {
                handlers::handle_unpack_zip(bundle, out, scan, json)
            } else {
                handlers::handle_unpack(bundle, out, scan, json)
            }
        }
        Commands::Zip { dir, out, json } => handlers::handle_zip(dir, out, json),
        Commands::Tree { bundle, scan } => handlers::handle_tree(bundle, scan),
    }
}
