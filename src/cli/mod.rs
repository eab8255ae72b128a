use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use combine_channels::stack::CombineMethod;
use combine_channels::tiff_io::TiffCompression;

mod channels;
mod combine;
mod config;

/// combine-channels - Nuclear/membrane channel combiner for OME-TIFF and MIBI-TIFF images
#[derive(Parser)]
#[command(name = "combine-channels")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Pixelwise reduction for multiple membrane channels.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CombineMethodArg {
    /// Elementwise product (rescaled on overflow)
    Prod,
    /// Elementwise maximum
    Max,
}

/// Compression applied to the output pages.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CompressionArg {
    /// Uncompressed
    None,
    /// LZW
    Lzw,
    /// ZIP/Deflate
    Deflate,
    /// PackBits
    Packbits,
}

impl From<CombineMethodArg> for CombineMethod {
    fn from(arg: CombineMethodArg) -> Self {
        match arg {
            CombineMethodArg::Prod => CombineMethod::Prod,
            CombineMethodArg::Max => CombineMethod::Max,
        }
    }
}

impl From<CompressionArg> for TiffCompression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => TiffCompression::None,
            CompressionArg::Lzw => TiffCompression::Lzw,
            CompressionArg::Deflate => TiffCompression::Deflate,
            CompressionArg::Packbits => TiffCompression::PackBits,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce an image to a [nuclear, membrane] channel pair
    Combine {
        /// Input OME-TIFF or MIBI-TIFF file path
        #[arg(value_name = "TIFF")]
        input: PathBuf,

        /// Name of the nuclear channel
        #[arg(long, value_name = "NAME")]
        nuclear_channel: Option<String>,

        /// Name of a membrane channel (repeat to combine several)
        #[arg(long = "membrane-channel", value_name = "NAME")]
        membrane_channels: Vec<String>,

        /// Reduction used for multiple membrane channels (default: prod)
        #[arg(long, value_enum)]
        combine_method: Option<CombineMethodArg>,

        /// Abort when the OME-XML metadata cannot be updated
        #[arg(long)]
        strict: bool,

        /// Output file path (defaults to standard output)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output compression (default: none)
        #[arg(long, value_enum)]
        compression: Option<CompressionArg>,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// List the channel names of an image
    Channels {
        /// Input OME-TIFF or MIBI-TIFF file path
        #[arg(value_name = "TIFF")]
        input: PathBuf,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

/// Initialize `env_logger` on stderr; `RUST_LOG` overrides the `-v` level.
pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Combine {
            input,
            nuclear_channel,
            membrane_channels,
            combine_method,
            strict,
            output,
            compression,
            config,
        } => combine::run(
            input,
            output,
            config,
            combine::Overrides {
                nuclear_channel,
                membrane_channels,
                method: combine_method.map(CombineMethod::from),
                strict,
                compression: compression.map(TiffCompression::from),
            },
        ),
        Commands::Channels { input } => channels::run(input),
    }
}
