//! Pixelwise reduction of several channels into one synthetic channel.

use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use serde::Deserialize;

use super::{ImageStack, Plane, StackError};

/// Rule used to reduce several planes into one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMethod {
    /// Elementwise product, rescaled into 16-bit range when it overflows
    #[default]
    Prod,
    /// Elementwise maximum
    Max,
}

impl CombineMethod {
    /// Returns all accepted method names.
    pub fn variants() -> &'static [&'static str] {
        &["prod", "max"]
    }
}

impl fmt::Display for CombineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineMethod::Prod => write!(f, "prod"),
            CombineMethod::Max => write!(f, "max"),
        }
    }
}

impl FromStr for CombineMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prod" | "product" => Ok(CombineMethod::Prod),
            "max" | "maximum" => Ok(CombineMethod::Max),
            _ => Err(format!(
                "Unknown combine method '{}'. Valid options: {}",
                s,
                CombineMethod::variants().join(", ")
            )),
        }
    }
}

/// Combine `channel_names` into a new channel appended as `combined_name`.
///
/// A single-name list returns the stack unchanged and `combined_name` is not
/// used. Otherwise the member channels stay in place and the reduced plane is
/// appended at the end of the returned stack.
///
/// # Errors
///
/// [`StackError::MissingChannel`] for unknown names,
/// [`StackError::DuplicateChannel`] if a name is repeated or `combined_name`
/// is already taken, [`StackError::EmptySelection`] for an empty list.
pub fn combine<S: AsRef<str>>(
    stack: &ImageStack,
    channel_names: &[S],
    combined_name: &str,
    method: CombineMethod,
) -> Result<ImageStack, StackError> {
    if channel_names.len() == 1 {
        debug!(
            "Single channel '{}' requested, skipping combination",
            channel_names[0].as_ref()
        );
        return Ok(stack.clone());
    }

    let selected = stack.select(channel_names)?;
    info!(
        "Combining {} channels [{}] into '{}' using {}",
        selected.len(),
        selected.names().join(", "),
        combined_name,
        method
    );

    let plane = combine_planes(&selected.planes(), method)?;
    stack.clone().push(combined_name, plane)
}

/// Reduce equally-shaped planes into one plane.
///
/// Products are computed exactly in `u128` while they fit (always the case for
/// up to eight 16-bit planes) and in the log domain otherwise. When the
/// reduced maximum exceeds `u16::MAX` every value is scaled by
/// `u16::MAX / max` and rounded, so the maximal position maps to exactly
/// `u16::MAX` and relative order is preserved.
pub fn combine_planes(planes: &[&Plane], method: CombineMethod) -> Result<Plane, StackError> {
    let (first, rest) = planes.split_first().ok_or(StackError::EmptySelection)?;
    let (width, height) = first.shape();

    for (i, plane) in rest.iter().enumerate() {
        if plane.shape() != (width, height) {
            return Err(StackError::ShapeMismatch {
                name: format!("#{}", i + 1),
                width: plane.width(),
                height: plane.height(),
                expected_width: width,
                expected_height: height,
            });
        }
    }

    let samples = match method {
        CombineMethod::Max => elementwise_max(first, rest),
        CombineMethod::Prod => match exact_product(planes) {
            Some(products) => narrow_to_u16(products),
            None => narrow_log_product(log_product(planes)),
        },
    };

    Plane::new(width, height, samples)
}

fn elementwise_max(first: &Plane, rest: &[&Plane]) -> Vec<u16> {
    let mut out = first.samples().to_vec();
    for plane in rest {
        for (acc, &sample) in out.iter_mut().zip(plane.samples()) {
            *acc = (*acc).max(sample);
        }
    }
    out
}

/// `None` as soon as any pixel's product overflows `u128`
fn exact_product(planes: &[&Plane]) -> Option<Vec<u128>> {
    let (first, rest) = planes.split_first()?;
    let mut out: Vec<u128> = first.samples().iter().map(|&v| u128::from(v)).collect();
    for plane in rest {
        for (acc, &sample) in out.iter_mut().zip(plane.samples()) {
            *acc = acc.checked_mul(u128::from(sample))?;
        }
    }
    Some(out)
}

/// Natural log of every pixel's product; `-inf` where any factor is zero
fn log_product(planes: &[&Plane]) -> Vec<f64> {
    let len = planes.first().map(|p| p.samples().len()).unwrap_or(0);
    let mut out = vec![0.0f64; len];
    for plane in planes {
        for (acc, &sample) in out.iter_mut().zip(plane.samples()) {
            *acc += f64::from(sample).ln();
        }
    }
    out
}

fn narrow_to_u16(values: Vec<u128>) -> Vec<u16> {
    let max = values.iter().copied().max().unwrap_or(0);
    let limit = u128::from(u16::MAX);

    if max <= limit {
        return values.into_iter().map(|v| v as u16).collect();
    }

    let scale = f64::from(u16::MAX) / max as f64;
    warn!("Product maximum {} exceeds 16-bit range, scaling by {:e}", max, scale);

    values
        .into_iter()
        .map(|v| (v as f64 * scale).round().clamp(0.0, f64::from(u16::MAX)) as u16)
        .collect()
}

/// Proportional rescale of products that only exist as logarithms
fn narrow_log_product(logs: Vec<f64>) -> Vec<u16> {
    let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    warn!(
        "Product maximum e^{:.1} exceeds 128-bit range, scaling into 16 bits",
        max
    );

    logs.into_iter()
        .map(|log| {
            let scaled = (log - max).exp() * f64::from(u16::MAX);
            scaled.round().clamp(0.0, f64::from(u16::MAX)) as u16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_str() {
        assert_eq!(CombineMethod::from_str("prod").unwrap(), CombineMethod::Prod);
        assert_eq!(CombineMethod::from_str("MAX").unwrap(), CombineMethod::Max);
        assert!(CombineMethod::from_str("mean").is_err());
    }

    #[test]
    fn test_method_default_and_display() {
        assert_eq!(CombineMethod::default(), CombineMethod::Prod);
        assert_eq!(CombineMethod::Max.to_string(), "max");
    }

    #[test]
    fn test_narrow_in_range_is_direct() {
        assert_eq!(narrow_to_u16(vec![0, 7, 65535]), vec![0, 7, 65535]);
    }

    #[test]
    fn test_narrow_rescales_proportionally() {
        let narrowed = narrow_to_u16(vec![20, 90_000, 131_070]);
        assert_eq!(narrowed, vec![10, 45_000, 65_535]);
    }

    #[test]
    fn test_exact_product_detects_overflow() {
        let big = Plane::filled(1, 1, u16::MAX);
        let eight: Vec<&Plane> = std::iter::repeat(&big).take(8).collect();
        assert!(exact_product(&eight).is_some());

        let nine: Vec<&Plane> = std::iter::repeat(&big).take(9).collect();
        assert!(exact_product(&nine).is_none());
    }

    #[test]
    fn test_product_beyond_u128_stays_proportional() {
        let plane = Plane::new(3, 1, vec![65535, 65534, 0]).unwrap();
        let planes: Vec<&Plane> = std::iter::repeat(&plane).take(9).collect();

        let combined = combine_planes(&planes, CombineMethod::Prod).unwrap();
        // (65534 / 65535)^9 * 65535 = 65526.0
        assert_eq!(combined.samples(), &[65535, 65526, 0]);
    }

    #[test]
    fn test_product_beyond_u128_keeps_order() {
        let a = Plane::new(4, 1, vec![65535, 60000, 30000, 1]).unwrap();
        let b = Plane::new(4, 1, vec![65535, 65535, 65535, 65535]).unwrap();
        let mut planes: Vec<&Plane> = std::iter::repeat(&b).take(11).collect();
        planes.push(&a);

        let combined = combine_planes(&planes, CombineMethod::Prod).unwrap();
        let samples = combined.samples();
        assert_eq!(samples[0], u16::MAX);
        assert!(samples[0] > samples[1] && samples[1] > samples[2] && samples[2] >= samples[3]);
        assert_eq!(samples[1], 60000);
        assert_eq!(samples[2], 30000);
    }
}
