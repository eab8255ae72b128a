/// Errors that can occur while building or querying an [`ImageStack`](super::ImageStack)
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// A requested channel is not present in the stack
    #[error("Channel '{name}' not found (available: {available})")]
    MissingChannel {
        /// Requested channel name
        name: String,
        /// Comma-separated list of the channels that do exist
        available: String,
    },

    /// A channel name occurs more than once
    #[error("Duplicate channel name: '{0}'")]
    DuplicateChannel(String),

    /// A plane does not share the stack's spatial dimensions
    #[error("Channel '{name}' is {width}x{height}, expected {expected_width}x{expected_height}")]
    ShapeMismatch {
        /// Offending channel
        name: String,
        /// Width of the offending plane
        width: usize,
        /// Height of the offending plane
        height: usize,
        /// Width shared by the rest of the stack
        expected_width: usize,
        /// Height shared by the rest of the stack
        expected_height: usize,
    },

    /// Number of channel names differs from the number of planes
    #[error("{names} channel names for {planes} planes")]
    ChannelCountMismatch {
        /// Number of names supplied
        names: usize,
        /// Number of planes supplied
        planes: usize,
    },

    /// Sample buffer length does not match `width * height`
    #[error("Plane of {width}x{height} needs {expected} samples, got {actual}")]
    PlaneSize {
        /// Plane width
        width: usize,
        /// Plane height
        height: usize,
        /// `width * height`
        expected: usize,
        /// Length of the buffer supplied
        actual: usize,
    },

    /// An empty channel list was passed where at least one name is required
    #[error("No channels selected")]
    EmptySelection,
}
