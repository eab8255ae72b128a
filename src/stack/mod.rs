//! # Image Stack Model
//!
//! An [`ImageStack`] is an ordered, name-indexed collection of 16-bit
//! intensity planes that share one spatial shape. Axis order is always
//! `(channel, row, column)`; a channel's index is its position in the stack.
//!
//! Stacks are values: selection and combination return new stacks. Planes are
//! reference-counted and never mutated, so building a sub-stack or appending
//! a synthetic channel never copies pixel data.

use std::collections::HashSet;
use std::sync::Arc;

mod combine;
mod error;


pub use combine::{combine, combine_planes, CombineMethod};
pub use error::StackError;

/// A single 2D plane of unsigned 16-bit samples in row-major order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    width: usize,
    height: usize,
    samples: Vec<u16>,
}

impl Plane {
    /// Create a plane, checking that `samples.len() == width * height`
    pub fn new(width: usize, height: usize, samples: Vec<u16>) -> Result<Self, StackError> {
        let expected = width * height;
        if samples.len() != expected {
            return Err(StackError::PlaneSize {
                width,
                height,
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Create a plane with every sample set to `value`
    pub fn filled(width: usize, height: usize, value: u16) -> Self {
        Self {
            width,
            height,
            samples: vec![value; width * height],
        }
    }

    /// Plane width (columns)
    pub fn width(&self) -> usize {
        self.width
    }

    /// Plane height (rows)
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major sample buffer
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Sample at `(row, col)`, or `None` when out of bounds
    pub fn get(&self, row: usize, col: usize) -> Option<u16> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.samples.get(row * self.width + col).copied()
    }

    /// Largest sample value (0 for an empty plane)
    pub fn max_value(&self) -> u16 {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// `(width, height)`
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// A named plane within a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    name: String,
    plane: Arc<Plane>,
}

impl Channel {
    /// Channel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pixel data
    pub fn plane(&self) -> &Plane {
        &self.plane
    }
}

/// Ordered collection of equally-shaped, uniquely-named channels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageStack {
    channels: Vec<Channel>,
}

impl ImageStack {
    /// Build a stack from parallel lists of names and planes (storage order)
    pub fn new(names: Vec<String>, planes: Vec<Plane>) -> Result<Self, StackError> {
        if names.len() != planes.len() {
            return Err(StackError::ChannelCountMismatch {
                names: names.len(),
                planes: planes.len(),
            });
        }

        names
            .into_iter()
            .zip(planes)
            .try_fold(Self::default(), |stack, (name, plane)| stack.push(name, plane))
    }

    /// Append a channel, returning the extended stack
    pub fn push(self, name: impl Into<String>, plane: Plane) -> Result<Self, StackError> {
        self.push_shared(name.into(), Arc::new(plane))
    }

    fn push_shared(mut self, name: String, plane: Arc<Plane>) -> Result<Self, StackError> {
        if self.index_of(&name).is_some() {
            return Err(StackError::DuplicateChannel(name));
        }
        if let Some((expected_width, expected_height)) = self.shape() {
            if plane.shape() != (expected_width, expected_height) {
                return Err(StackError::ShapeMismatch {
                    name,
                    width: plane.width(),
                    height: plane.height(),
                    expected_width,
                    expected_height,
                });
            }
        }
        self.channels.push(Channel { name, plane });
        Ok(self)
    }

    /// Sub-stack holding `names` in the requested order
    ///
    /// Requested order, not storage order, defines the result's channel order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, StackError> {
        if names.is_empty() {
            return Err(StackError::EmptySelection);
        }

        let mut seen = HashSet::with_capacity(names.len());
        let mut channels = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(StackError::DuplicateChannel(name.to_string()));
            }
            channels.push(self.require(name)?.clone());
        }
        Ok(Self { channels })
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when the stack holds no channels
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// `(width, height)` shared by all planes, `None` for an empty stack
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.channels.first().map(|c| c.plane.shape())
    }

    /// Shared plane width (0 for an empty stack)
    pub fn width(&self) -> usize {
        self.shape().map(|(w, _)| w).unwrap_or(0)
    }

    /// Shared plane height (0 for an empty stack)
    pub fn height(&self) -> usize {
        self.shape().map(|(_, h)| h).unwrap_or(0)
    }

    /// Channel names in stack order
    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of `name` along the channel axis
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    /// Channel by name
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Iterate channels in stack order
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Planes in stack order
    pub fn planes(&self) -> Vec<&Plane> {
        self.channels.iter().map(|c| c.plane()).collect()
    }

    fn require(&self, name: &str) -> Result<&Channel, StackError> {
        self.channel(name).ok_or_else(|| StackError::MissingChannel {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }
}
