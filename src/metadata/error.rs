/// Errors that can occur while reading channel names from image metadata
#[derive(Debug, thiserror::Error)]
pub enum MetadataParseError {
    /// The container holds no planes at all
    #[error("Image contains no planes")]
    NoPlanes,

    /// A plane carries no description to read channel names from
    #[error("Plane {plane} has no metadata description")]
    MissingDescription {
        /// Zero-based plane index
        plane: usize,
    },

    /// A structural OME-XML element is absent
    #[error("No {0} element found in OME-XML metadata")]
    MissingElement(&'static str),

    /// A per-plane record could not be decoded
    #[error("Invalid per-plane metadata record on plane {plane}: {source}")]
    InvalidPlaneRecord {
        /// Zero-based plane index
        plane: usize,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Error parsing XML
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),
}

/// Errors that can occur while rewriting OME-XML to match a new channel list
#[derive(Debug, thiserror::Error)]
pub enum MetadataSyncError {
    /// The document does not begin with `<?xml`
    #[error("Metadata does not start with an XML declaration")]
    MissingDeclaration,

    /// No `Pixels` element to rewrite
    #[error("No Pixels element found in OME-XML metadata")]
    MissingPixels,

    /// More than one `Pixels` element, so the target is ambiguous
    #[error("Expected exactly one Pixels element, found {0}")]
    MultiplePixels(usize),

    /// Error parsing XML
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// I/O error while serializing
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Element name is not valid UTF-8
    #[error("UTF-8 encoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Serialized document is not valid UTF-8
    #[error("UTF-8 encoding error: {0}")]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}
