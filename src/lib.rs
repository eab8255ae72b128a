//! # combine-channels
//!
//! Reduces a multi-channel fluorescence or mass-cytometry image to the two
//! channels a cell segmentation model expects: one **nuclear** channel and one
//! **membrane** channel. Several membrane markers can be merged into a single
//! synthetic channel by pixelwise product or maximum, and the embedded
//! OME-XML metadata is rewritten so it describes the new image.
//!
//! ## Supported Inputs
//!
//! - **OME-TIFF**: channel names come from the OME-XML document stored in the
//!   first page's `ImageDescription`.
//! - **MIBI-TIFF**: every page carries a JSON record whose `channel.target`
//!   names that page's channel.
//!
//! Pages must be single-sample 8 or 16-bit grayscale.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use combine_channels::prelude::*;
//!
//! let config = PipelineConfig::new("DAPI", vec!["TRITC".into(), "CD45".into()])
//!     .with_method(CombineMethod::Max);
//! let output = Pipeline::new(config).run_path("input.ome.tiff")?;
//!
//! let bytes = output.to_tiff_bytes(TiffCompression::None)?;
//! std::fs::write("output.ome.tiff", bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - [`stack`]: named plane collection, selection and pixelwise combination
//! - [`metadata`]: channel name extraction and OME-XML synchronization
//! - [`tiff_io`]: multi-page TIFF decoding and encoding
//! - [`pipeline`]: end-to-end orchestration
//!
//! ## Output Layout
//!
//! The output is a two-page 16-bit grayscale (min-is-black) TIFF in
//! `(channel, row, column)` order: page 0 is the nuclear channel, page 1 the
//! membrane (or `combined_membrane`) channel. The synchronized OME-XML is
//! stored in page 0's `ImageDescription`.

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod metadata;
pub mod pipeline;
pub mod stack;
pub mod tiff_io;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::metadata::{
        extract_channel_names, synchronize, ChannelNameEncoding, MetadataParseError,
        MetadataSyncError,
    };
    pub use crate::pipeline::{
        Pipeline, PipelineConfig, PipelineError, PipelineOutput, COMBINED_MEMBRANE,
    };
    pub use crate::stack::{combine, CombineMethod, ImageStack, Plane, StackError};
    pub use crate::tiff_io::{
        read_tiff_descriptions, read_tiff_pages, write_tiff_stack, TiffCompression, TiffIoError,
        TiffPage,
    };
}
