use anyhow::{bail, Context, Result};
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use combine_channels::metadata::extract_channel_names;
use combine_channels::tiff_io::read_tiff_descriptions;

#[cfg(feature = "colorized_output")]
use console::style;

/// Print `<index>\t<name>` for every channel of an image
pub fn run(input: PathBuf) -> Result<()> {
    if !input.exists() {
        bail!("Input file does not exist: {}", input.display());
    }

    let file = File::open(&input).context("Failed to open file")?;
    let descriptions = read_tiff_descriptions(BufReader::new(file))
        .with_context(|| format!("Failed to read TIFF: {}", input.display()))?;
    let names = extract_channel_names(&descriptions).context("Failed to read channel names")?;

    info!("{} channels in {}", names.len(), input.display());

    for (index, name) in names.iter().enumerate() {
        #[cfg(feature = "colorized_output")]
        {
            println!("{}\t{}", style(index).dim(), style(name).bold());
        }

        #[cfg(not(feature = "colorized_output"))]
        {
            println!("{}\t{}", index, name);
        }
    }

    Ok(())
}
