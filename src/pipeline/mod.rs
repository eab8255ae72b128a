//! # Channel Combination Pipeline
//!
//! Turns a multi-channel image into a two-channel `[nuclear, membrane]`
//! image with synchronized metadata:
//!
//! 1. Extract channel names from the page descriptions
//! 2. Build the [`ImageStack`]
//! 3. Combine the membrane channels into [`COMBINED_MEMBRANE`] when there is
//!    more than one
//! 4. Select the nuclear channel followed by the membrane channel
//! 5. Synchronize the first page's OME-XML with the selected stack
//!
//! Nothing is written until [`PipelineOutput::write_tiff`] is called, so a
//! failed run never leaves partial output behind.
//!
//! ## Example
//!
//! ```rust,no_run
//! use combine_channels::pipeline::{Pipeline, PipelineConfig};
//! use combine_channels::stack::CombineMethod;
//! use combine_channels::tiff_io::TiffCompression;
//!
//! let config = PipelineConfig::new("DAPI", vec!["TRITC".into(), "CD45".into()])
//!     .with_method(CombineMethod::Max);
//! let output = Pipeline::new(config).run_path("input.ome.tiff")?;
//!
//! let file = std::fs::File::create("output.ome.tiff")?;
//! output.write_tiff(std::io::BufWriter::new(file), TiffCompression::Lzw)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::File;
use std::io::{BufReader, Cursor, Seek, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::metadata::{extract_channel_names, synchronize};
use crate::stack::{combine, CombineMethod, ImageStack, Plane};
use crate::tiff_io::{read_tiff_pages, write_tiff_stack, TiffCompression, TiffIoError, TiffPage};

mod error;


pub use error::PipelineError;

/// Name of the channel synthesized from several membrane channels
pub const COMBINED_MEMBRANE: &str = "combined_membrane";

/// Settings for a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Channel copied to the first output plane
    pub nuclear_channel: String,
    /// Channels merged into the second output plane
    pub membrane_channels: Vec<String>,
    /// Reduction used when there is more than one membrane channel
    pub method: CombineMethod,
    /// Abort instead of dropping the metadata when it cannot be synchronized
    pub strict: bool,
}

impl PipelineConfig {
    /// Create a lenient `prod` configuration
    pub fn new(nuclear_channel: impl Into<String>, membrane_channels: Vec<String>) -> Self {
        Self {
            nuclear_channel: nuclear_channel.into(),
            membrane_channels,
            ..Default::default()
        }
    }

    /// Set the combination method
    pub fn with_method(mut self, method: CombineMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the sync failure policy
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Result of a pipeline run, ready to be encoded
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// `[nuclear, membrane]` planes
    pub stack: ImageStack,
    /// Synchronized OME-XML, `None` when it could not be produced in lenient mode
    pub metadata: Option<String>,
}

impl PipelineOutput {
    /// Encode the output as a multi-page TIFF
    pub fn write_tiff<W: Write + Seek>(
        &self,
        writer: W,
        compression: TiffCompression,
    ) -> Result<(), TiffIoError> {
        write_tiff_stack(&self.stack, self.metadata.as_deref(), writer, compression)
    }

    /// Encode the output into an in-memory TIFF
    pub fn to_tiff_bytes(&self, compression: TiffCompression) -> Result<Vec<u8>, TiffIoError> {
        let mut buffer = Cursor::new(Vec::new());
        self.write_tiff(&mut buffer, compression)?;
        Ok(buffer.into_inner())
    }
}

/// Channel combination pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Pipeline settings
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read a TIFF from `path` and run the pipeline on its pages
    pub fn run_path(&self, path: impl AsRef<Path>) -> Result<PipelineOutput, PipelineError> {
        let path = path.as_ref();
        info!("Reading {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        let pages = read_tiff_pages(reader)?;
        self.run(pages)
    }

    /// Run the pipeline on decoded pages
    pub fn run(&self, pages: Vec<TiffPage>) -> Result<PipelineOutput, PipelineError> {
        let config = &self.config;
        let membrane = match config.membrane_channels.as_slice() {
            [] => return Err(PipelineError::NoMembraneChannels),
            [single] => single.as_str(),
            _ => COMBINED_MEMBRANE,
        };

        let (planes, descriptions): (Vec<Plane>, Vec<Option<String>>) = pages
            .into_iter()
            .map(|page| (page.plane, page.description))
            .unzip();

        let names = extract_channel_names(&descriptions)?;
        let stack = ImageStack::new(names, planes)?;
        info!(
            "Loaded {} channels of {}x{}",
            stack.len(),
            stack.width(),
            stack.height()
        );

        let stack = combine(&stack, &config.membrane_channels, COMBINED_MEMBRANE, config.method)?;

        let output = stack.select(&[config.nuclear_channel.as_str(), membrane])?;
        debug!("Selected output channels [{}]", output.names().join(", "));

        let source = descriptions.first().and_then(Option::as_deref).unwrap_or("");
        let metadata = match synchronize(source, output.width(), output.height(), &output.names()) {
            Ok(xml) => Some(xml),
            Err(e) if !config.strict => {
                warn!("Could not update OME-XML metadata, writing image without it: {}", e);
                None
            }
            Err(e) => return Err(e.into()),
        };

        Ok(PipelineOutput {
            stack: output,
            metadata,
        })
    }
}
