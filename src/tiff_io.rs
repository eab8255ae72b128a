//! TIFF container support
//!
//! Reads every page of a (multi-page) TIFF as one grayscale [`Plane`] together
//! with that page's `ImageDescription` (or the descriptions alone), and writes an [`ImageStack`] back as a
//! multi-page 16-bit grayscale TIFF whose first page carries the metadata
//! document.

use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Seek, Write};
use std::str::FromStr;

use log::debug;
use serde::Deserialize;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray16;
use tiff::encoder::{Compression, DeflateLevel, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::stack::{ImageStack, Plane, StackError};

/// Errors that can occur while decoding or encoding TIFF containers
#[derive(Debug, thiserror::Error)]
pub enum TiffIoError {
    /// Error reported by the TIFF codec
    #[error("TIFF error: {0}")]
    TiffError(#[from] tiff::TiffError),

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A page is not single-sample 8 or 16-bit grayscale
    #[error("Unsupported sample format on page {page}: {color_type}")]
    UnsupportedSampleFormat {
        /// Zero-based page index
        page: usize,
        /// Color type reported by the decoder
        color_type: String,
    },

    /// Plane dimensions do not fit the TIFF header fields
    #[error("Plane of {width}x{height} is too large for TIFF")]
    DimensionsTooLarge {
        /// Plane width
        width: usize,
        /// Plane height
        height: usize,
    },

    /// Nothing to write
    #[error("No pages to write")]
    NoPages,

    /// Decoded page could not be turned into a plane
    #[error("Invalid page: {0}")]
    StackError(#[from] StackError),
}

/// One decoded page: its pixels and its `ImageDescription`, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiffPage {
    /// Pixel data, 8-bit pages widened to 16 bits
    pub plane: Plane,
    /// Page `ImageDescription` tag
    pub description: Option<String>,
}

/// TIFF compression for written pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TiffCompression {
    /// No compression
    #[default]
    None,
    /// LZW compression
    Lzw,
    /// ZIP/Deflate compression
    Deflate,
    /// PackBits compression
    PackBits,
}

impl TiffCompression {
    /// Returns all accepted compression names.
    pub fn variants() -> &'static [&'static str] {
        &["none", "lzw", "deflate", "packbits"]
    }

    fn to_tiff_compression(self) -> Compression {
        match self {
            TiffCompression::None => Compression::Uncompressed,
            TiffCompression::Lzw => Compression::Lzw,
            TiffCompression::Deflate => Compression::Deflate(DeflateLevel::default()),
            TiffCompression::PackBits => Compression::Packbits,
        }
    }
}

impl fmt::Display for TiffCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TiffCompression::None => write!(f, "none"),
            TiffCompression::Lzw => write!(f, "lzw"),
            TiffCompression::Deflate => write!(f, "deflate"),
            TiffCompression::PackBits => write!(f, "packbits"),
        }
    }
}

impl FromStr for TiffCompression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "uncompressed" => Ok(TiffCompression::None),
            "lzw" => Ok(TiffCompression::Lzw),
            "deflate" | "zip" => Ok(TiffCompression::Deflate),
            "packbits" => Ok(TiffCompression::PackBits),
            _ => Err(format!(
                "Unknown compression '{}'. Valid options: {}",
                s,
                TiffCompression::variants().join(", ")
            )),
        }
    }
}

/// Read all pages of a TIFF, in storage order
pub fn read_tiff_pages<R: Read + Seek>(reader: R) -> Result<Vec<TiffPage>, TiffIoError> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let mut pages = Vec::new();
    loop {
        let page = decode_page(&mut decoder, pages.len())?;
        pages.push(page);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    debug!("Decoded {} TIFF pages", pages.len());
    Ok(pages)
}

/// Read every page's `ImageDescription` without decoding pixel data
pub fn read_tiff_descriptions<R: Read + Seek>(
    reader: R,
) -> Result<Vec<Option<String>>, TiffIoError> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let mut descriptions = vec![page_description(&mut decoder)?];
    while decoder.more_images() {
        decoder.next_image()?;
        descriptions.push(page_description(&mut decoder)?);
    }

    debug!("Read {} TIFF page descriptions", descriptions.len());
    Ok(descriptions)
}

/// `None` only when the tag is absent; a non-ASCII value is an error
fn page_description<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<String>, TiffIoError> {
    match decoder.find_tag(Tag::ImageDescription)? {
        Some(value) => Ok(Some(value.into_string()?)),
        None => Ok(None),
    }
}

fn decode_page<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    page: usize,
) -> Result<TiffPage, TiffIoError> {
    let (width, height) = decoder.dimensions()?;
    let color_type = decoder.colortype()?;
    let description = page_description(decoder)?;

    let samples = match (color_type, decoder.read_image()?) {
        (ColorType::Gray(16), DecodingResult::U16(data)) => data,
        (ColorType::Gray(8), DecodingResult::U8(data)) => {
            data.into_iter().map(u16::from).collect()
        }
        (other, _) => {
            return Err(TiffIoError::UnsupportedSampleFormat {
                page,
                color_type: format!("{:?}", other),
            })
        }
    };

    let plane = Plane::new(width as usize, height as usize, samples)?;
    Ok(TiffPage { plane, description })
}

/// Write `stack` as a multi-page 16-bit grayscale TIFF, one page per channel.
///
/// `description` goes into the first page's `ImageDescription` tag, see
/// [`ascii_description`].
pub fn write_tiff_stack<W: Write + Seek>(
    stack: &ImageStack,
    description: Option<&str>,
    writer: W,
    compression: TiffCompression,
) -> Result<(), TiffIoError> {
    if stack.is_empty() {
        return Err(TiffIoError::NoPages);
    }

    let too_large = || TiffIoError::DimensionsTooLarge {
        width: stack.width(),
        height: stack.height(),
    };
    let width = u32::try_from(stack.width()).map_err(|_| too_large())?;
    let height = u32::try_from(stack.height()).map_err(|_| too_large())?;

    let mut encoder = TiffEncoder::new(writer)?.with_compression(compression.to_tiff_compression());

    for (index, channel) in stack.channels().enumerate() {
        let mut image = encoder.new_image::<Gray16>(width, height)?;
        if index == 0 {
            if let Some(description) = description {
                let description = ascii_description(description);
                image.encoder().write_tag(Tag::ImageDescription, &*description)?;
            }
        }
        image.write_data(channel.plane().samples())?;
    }

    debug!(
        "Encoded {} pages of {}x{} ({} compression)",
        stack.len(),
        width,
        height,
        compression
    );
    Ok(())
}

/// Make an XML document storable in a TIFF ASCII field.
///
/// Non-ASCII characters become numeric character references (`µ` is written
/// as `&#181;`) and NUL bytes are dropped.
pub fn ascii_description(description: &str) -> Cow<'_, str> {
    if description.bytes().all(|b| b.is_ascii() && b != 0) {
        return Cow::Borrowed(description);
    }

    let mut out = String::with_capacity(description.len() + 16);
    for c in description.chars() {
        match c {
            '\0' => {}
            c if c.is_ascii() => out.push(c),
            c => out.push_str(&format!("&#{};", u32::from(c))),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tiff::encoder::colortype::{Gray8, RGB8};

    fn stack() -> ImageStack {
        ImageStack::new(
            vec!["a".into(), "b".into()],
            vec![
                Plane::new(3, 2, vec![0, 1, 2, 3, 4, 65535]).unwrap(),
                Plane::new(3, 2, vec![9, 8, 7, 6, 5, 4]).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_tiff_roundtrip_with_description() {
        let stack = stack();
        let mut buffer = Cursor::new(Vec::new());
        write_tiff_stack(&stack, Some("<?xml version=\"1.0\"?><OME/>"), &mut buffer, TiffCompression::None)
            .unwrap();

        buffer.set_position(0);
        let pages = read_tiff_pages(buffer).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].plane, *stack.channel("a").unwrap().plane());
        assert_eq!(pages[1].plane, *stack.channel("b").unwrap().plane());
        assert_eq!(pages[0].description.as_deref(), Some("<?xml version=\"1.0\"?><OME/>"));
        assert_eq!(pages[1].description, None);
    }

    #[test]
    fn test_tiff_compression_formats() {
        let stack = stack();
        for compression in [TiffCompression::Lzw, TiffCompression::Deflate, TiffCompression::PackBits] {
            let mut buffer = Cursor::new(Vec::new());
            write_tiff_stack(&stack, None, &mut buffer, compression).unwrap();

            buffer.set_position(0);
            let pages = read_tiff_pages(buffer).unwrap();
            assert_eq!(pages[1].plane.samples(), &[9, 8, 7, 6, 5, 4]);
        }
    }

    #[test]
    fn test_tiff_gray8_is_widened() {
        let mut buffer = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buffer)
            .unwrap()
            .write_image::<Gray8>(2, 1, &[7, 255])
            .unwrap();

        buffer.set_position(0);
        let pages = read_tiff_pages(buffer).unwrap();
        assert_eq!(pages[0].plane.samples(), &[7, 255]);
    }

    #[test]
    fn test_tiff_rgb_is_rejected() {
        let mut buffer = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buffer)
            .unwrap()
            .write_image::<RGB8>(1, 1, &[1, 2, 3])
            .unwrap();

        buffer.set_position(0);
        let err = read_tiff_pages(buffer).unwrap_err();
        assert!(matches!(err, TiffIoError::UnsupportedSampleFormat { page: 0, .. }));
    }

    #[test]
    fn test_descriptions_without_pixels() {
        let mut buffer = Cursor::new(Vec::new());
        write_tiff_stack(&stack(), Some("<?xml version=\"1.0\"?><OME/>"), &mut buffer, TiffCompression::Lzw)
            .unwrap();

        buffer.set_position(0);
        let descriptions = read_tiff_descriptions(&mut buffer).unwrap();
        buffer.set_position(0);
        let pages = read_tiff_pages(buffer).unwrap();

        assert_eq!(
            descriptions,
            pages.into_iter().map(|p| p.description).collect::<Vec<_>>()
        );
        assert_eq!(descriptions[0].as_deref(), Some("<?xml version=\"1.0\"?><OME/>"));
        assert_eq!(descriptions[1], None);
    }

    #[test]
    fn test_non_ascii_description_tag_is_an_error() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            let mut image = encoder.new_image::<Gray16>(1, 1).unwrap();
            image.encoder().write_tag(Tag::ImageDescription, 5u16).unwrap();
            image.write_data(&[1u16]).unwrap();
        }

        buffer.set_position(0);
        let err = read_tiff_pages(&mut buffer).unwrap_err();
        assert!(matches!(err, TiffIoError::TiffError(_)));

        buffer.set_position(0);
        let err = read_tiff_descriptions(buffer).unwrap_err();
        assert!(matches!(err, TiffIoError::TiffError(_)));
    }

    #[test]
    fn test_tiff_empty_stack() {
        let mut buffer = Cursor::new(Vec::new());
        let err = write_tiff_stack(&ImageStack::default(), None, &mut buffer, TiffCompression::None)
            .unwrap_err();
        assert!(matches!(err, TiffIoError::NoPages));
    }

    #[test]
    fn test_non_ascii_description() {
        let xml = r#"<?xml version="1.0"?><OME><Pixels PhysicalSizeXUnit="µm"/></OME>"#;
        assert_eq!(
            ascii_description(xml),
            r#"<?xml version="1.0"?><OME><Pixels PhysicalSizeXUnit="&#181;m"/></OME>"#
        );
        assert!(matches!(ascii_description("<OME/>"), Cow::Borrowed(_)));

        let mut buffer = Cursor::new(Vec::new());
        write_tiff_stack(&stack(), Some(xml), &mut buffer, TiffCompression::None).unwrap();
        buffer.set_position(0);
        let pages = read_tiff_pages(buffer).unwrap();
        assert!(pages[0].description.as_deref().unwrap().contains("&#181;m"));
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!(TiffCompression::from_str("LZW").unwrap(), TiffCompression::Lzw);
        assert_eq!(TiffCompression::from_str("zip").unwrap(), TiffCompression::Deflate);
        assert!(TiffCompression::from_str("jpeg").is_err());
    }
}
