//! # combine-channels
//!
//! Command-line front end for the nuclear/membrane channel combiner.
//!
//! ## Usage
//!
//! ```bash
//! # Merge two membrane markers by maximum and write to a file
//! combine-channels combine input.ome.tiff \
//!     --nuclear-channel DAPI \
//!     --membrane-channel TRITC --membrane-channel CD45 \
//!     --combine-method max -o output.ome.tiff
//!
//! # List the channels of an image
//! combine-channels channels input.ome.tiff
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
