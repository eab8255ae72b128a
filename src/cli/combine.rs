use anyhow::{bail, Context, Result};
use log::info;
use std::io::Write;
use std::path::PathBuf;

use combine_channels::pipeline::{Pipeline, PipelineConfig};
use combine_channels::stack::CombineMethod;
use combine_channels::tiff_io::TiffCompression;

use super::config::{CombineConfig, Config};

/// Settings given on the command line; these win over the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub nuclear_channel: Option<String>,
    pub membrane_channels: Vec<String>,
    pub method: Option<CombineMethod>,
    pub strict: bool,
    pub compression: Option<TiffCompression>,
}

/// Combine channels and write the result to `output` or standard output
pub fn run(
    input: PathBuf,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    overrides: Overrides,
) -> Result<()> {
    if !input.exists() {
        bail!("Input file does not exist: {}", input.display());
    }

    let file_config = match &config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            Config::from_file(path)?.combine
        }
        None => CombineConfig::default(),
    };
    let (pipeline_config, compression) = resolve(overrides, file_config)?;

    info!("Input:     {}", input.display());
    match &output {
        Some(path) => info!("Output:    {}", path.display()),
        None => info!("Output:    <stdout>"),
    }
    info!("Nuclear:   {}", pipeline_config.nuclear_channel);
    info!("Membrane:  [{}]", pipeline_config.membrane_channels.join(", "));
    info!("Method:    {}", pipeline_config.method);

    let result = Pipeline::new(pipeline_config)
        .run_path(&input)
        .with_context(|| format!("Failed to combine channels of {}", input.display()))?;

    // Encode fully before touching the destination
    let bytes = result
        .to_tiff_bytes(compression)
        .context("Failed to encode output TIFF")?;

    match output {
        Some(path) => std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&bytes)
                .and_then(|_| stdout.flush())
                .context("Failed to write to standard output")?;
        }
    }

    info!("Wrote {} bytes", bytes.len());
    Ok(())
}

/// Merge command-line settings over config file settings over defaults
fn resolve(
    overrides: Overrides,
    file: CombineConfig,
) -> Result<(PipelineConfig, TiffCompression)> {
    let Some(nuclear_channel) = overrides.nuclear_channel.or(file.nuclear_channel) else {
        bail!("No nuclear channel given (use --nuclear-channel or the config file)");
    };

    let membrane_channels = if overrides.membrane_channels.is_empty() {
        file.membrane_channels.unwrap_or_default()
    } else {
        overrides.membrane_channels
    };
    if membrane_channels.is_empty() {
        bail!("No membrane channel given (use --membrane-channel or the config file)");
    }

    let config = PipelineConfig::new(nuclear_channel, membrane_channels)
        .with_method(overrides.method.or(file.combine_method).unwrap_or_default())
        .with_strict(overrides.strict || file.strict.unwrap_or(false));
    let compression = overrides
        .compression
        .or(file.compression)
        .unwrap_or_default();

    Ok((config, compression))
}
