//! Channel name extraction from OME-XML and MIBI per-plane records.

use std::fmt;

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use super::helpers::{get_attribute, is_element};
use super::MetadataParseError;

/// Name given to OME `Channel` entries without a `Name` attribute
pub const UNKNOWN_CHANNEL_NAME: &str = "Unknown";

/// Per-plane JSON description written by MIBI instruments
#[derive(Debug, Deserialize)]
struct PlaneRecord {
    #[serde(rename = "channel.target")]
    channel_target: String,
}

/// How channel names are encoded in a container's page descriptions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelNameEncoding {
    /// One JSON record per plane carrying `channel.target` (MIBI-TIFF)
    PerPlane,
    /// A single OME-XML document on the first plane (OME-TIFF)
    Structured,
}

impl ChannelNameEncoding {
    /// Pick the encoding by trying to decode the first plane as a per-plane record
    pub fn detect(first_description: &str) -> Self {
        if serde_json::from_str::<PlaneRecord>(first_description).is_ok() {
            ChannelNameEncoding::PerPlane
        } else {
            ChannelNameEncoding::Structured
        }
    }

    /// Extract one channel name per plane, in storage order
    pub fn extract(self, descriptions: &[Option<String>]) -> Result<Vec<String>, MetadataParseError> {
        match self {
            ChannelNameEncoding::PerPlane => descriptions
                .iter()
                .enumerate()
                .map(|(plane, description)| {
                    let description = description
                        .as_deref()
                        .ok_or(MetadataParseError::MissingDescription { plane })?;
                    channel_name_from_plane_record(description).map_err(|source| {
                        MetadataParseError::InvalidPlaneRecord { plane, source }
                    })
                })
                .collect(),
            ChannelNameEncoding::Structured => {
                let first = first_description(descriptions)?;
                channel_names_from_ome_xml(first)
            }
        }
    }
}

impl fmt::Display for ChannelNameEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelNameEncoding::PerPlane => write!(f, "per-plane JSON"),
            ChannelNameEncoding::Structured => write!(f, "OME-XML"),
        }
    }
}

/// Read channel names from the descriptions of every plane of a container.
///
/// The encoding is detected from the first plane, see [`ChannelNameEncoding::detect`].
pub fn extract_channel_names(
    descriptions: &[Option<String>],
) -> Result<Vec<String>, MetadataParseError> {
    let encoding = ChannelNameEncoding::detect(first_description(descriptions)?);
    debug!("Detected {} channel name encoding", encoding);

    let names = encoding.extract(descriptions)?;
    debug!("Extracted {} channel names: [{}]", names.len(), names.join(", "));
    Ok(names)
}

/// Channel name of a single MIBI per-plane JSON record
pub fn channel_name_from_plane_record(json: &str) -> Result<String, serde_json::Error> {
    let record: PlaneRecord = serde_json::from_str(json)?;
    Ok(record.channel_target)
}

/// Channel names listed under `OME/Image/Pixels/Channel`, in document order.
///
/// Only the first `Image` and its first `Pixels` element are considered.
/// Elements are matched by local name, so any namespace prefix is accepted.
pub fn channel_names_from_ome_xml(xml: &str) -> Result<Vec<String>, MetadataParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut scan = OmeChannelScan::default();
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                scan.visit(&e, depth, true)?;
            }
            Event::Empty(e) => scan.visit(&e, depth + 1, false)?,
            Event::End(_) => {
                if scan.in_pixels && depth == 3 {
                    // End of the first Pixels element
                    break;
                }
                if scan.in_image && depth == 2 {
                    scan.in_image = false;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !scan.found_image {
        return Err(MetadataParseError::MissingElement("Image"));
    }
    if !scan.found_pixels {
        return Err(MetadataParseError::MissingElement("Pixels"));
    }
    Ok(scan.names)
}

/// Walk state for `OME/Image/Pixels/Channel`
#[derive(Default)]
struct OmeChannelScan {
    found_image: bool,
    found_pixels: bool,
    in_image: bool,
    in_pixels: bool,
    names: Vec<String>,
}

impl OmeChannelScan {
    /// `depth` is 1 for the root element
    fn visit(&mut self, e: &BytesStart, depth: usize, has_children: bool) -> Result<(), MetadataParseError> {
        match depth {
            2 if !self.found_image && is_element(e, b"Image") => {
                self.found_image = true;
                self.in_image = has_children;
            }
            3 if self.in_image && !self.found_pixels && is_element(e, b"Pixels") => {
                self.found_pixels = true;
                self.in_pixels = has_children;
            }
            4 if self.in_pixels && is_element(e, b"Channel") => {
                let name = get_attribute(e, "Name")?
                    .unwrap_or_else(|| UNKNOWN_CHANNEL_NAME.to_string());
                self.names.push(name);
            }
            _ => {}
        }
        Ok(())
    }
}

fn first_description(descriptions: &[Option<String>]) -> Result<&str, MetadataParseError> {
    descriptions
        .first()
        .ok_or(MetadataParseError::NoPlanes)?
        .as_deref()
        .ok_or(MetadataParseError::MissingDescription { plane: 0 })
}
