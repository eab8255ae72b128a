//! # Image Metadata
//!
//! Reading channel names out of a container's page descriptions and
//! rewriting the OME-XML document so it mirrors a new plane stack.
//!
//! ## Supported Encodings
//!
//! 1. **OME-XML** (OME-TIFF): one document on the first page, channels listed
//!    as `OME/Image/Pixels/Channel@Name`.
//!
//! 2. **Per-plane JSON** (MIBI-TIFF): every page carries its own JSON record
//!    whose `channel.target` field names that page's channel.
//!
//! The encoding is chosen by probing the first page, see
//! [`ChannelNameEncoding::detect`].
//!
//! ## Synchronization
//!
//! [`synchronize`] always deletes and recreates `Channel` entries instead of
//! patching them, so the document can never keep entries for channels that
//! are no longer in the image.

mod error;
mod extract;
mod helpers;
mod sync;


pub use error::{MetadataParseError, MetadataSyncError};
pub use extract::{
    channel_name_from_plane_record, channel_names_from_ome_xml, extract_channel_names,
    ChannelNameEncoding, UNKNOWN_CHANNEL_NAME,
};
pub use sync::{synchronize, XML_DECLARATION};
