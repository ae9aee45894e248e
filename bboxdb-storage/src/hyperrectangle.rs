//! N-dimensional axis aligned boxes.

use crate::errors::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const COORDINATE_BYTES: usize = 8;

/// An n-dimensional axis aligned box.
///
/// Coordinates are stored as `[low0, high0, low1, high1, ...]`. A box without
/// any dimension is the full space sentinel: it intersects every box and is
/// the covering box of an empty list.
///
/// # Examples
///
/// ```rust
/// use bboxdb_storage::Hyperrectangle;
///
/// let a = Hyperrectangle::from_intervals(&[(0.0, 2.0), (0.0, 2.0)]).unwrap();
/// let b = Hyperrectangle::from_intervals(&[(1.0, 3.0), (1.0, 3.0)]).unwrap();
///
/// assert!(a.intersects(&b));
/// assert_eq!(a.to_compact_string(), "[[0.0,2.0]:[0.0,2.0]]");
/// ```
#[derive(Clone, PartialEq, Default, Debug, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Hyperrectangle {
    coordinates: Vec<f64>,
}

impl Hyperrectangle {
    /// The sentinel covering every point of every dimension.
    pub const FULL_SPACE: Hyperrectangle = Hyperrectangle {
        coordinates: Vec::new(),
    };

    /// Creates a box from interleaved `low, high` coordinates.
    ///
    /// # Arguments
    ///
    /// * `coordinates` - `2 * dimension` values, low before high per dimension
    ///
    /// # Returns
    ///
    /// `InvalidArgument` for an odd number of values, a NaN coordinate or a
    /// low value above its high value.
    pub fn new(coordinates: Vec<f64>) -> StorageResult<Self> {
        if coordinates.len() % 2 != 0 {
            return Err(StorageError::InvalidArgument(format!(
                "a box needs an even number of coordinates, got {}",
                coordinates.len()
            )));
        }

        for (dimension, pair) in coordinates.chunks_exact(2).enumerate() {
            if pair[0].is_nan() || pair[1].is_nan() || pair[0] > pair[1] {
                return Err(StorageError::InvalidArgument(format!(
                    "invalid interval [{:?},{:?}] in dimension {}",
                    pair[0], pair[1], dimension
                )));
            }
        }

        Ok(Hyperrectangle { coordinates })
    }

    /// Creates a box from one `(low, high)` interval per dimension.
    pub fn from_intervals(intervals: &[(f64, f64)]) -> StorageResult<Self> {
        let coordinates = intervals
            .iter()
            .flat_map(|(low, high)| [*low, *high])
            .collect();
        Hyperrectangle::new(coordinates)
    }

    /// Creates a zero-volume box located at `point`.
    pub fn from_point(point: &[f64]) -> StorageResult<Self> {
        let coordinates = point.iter().flat_map(|value| [*value, *value]).collect();
        Hyperrectangle::new(coordinates)
    }

    pub fn is_full_space(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.coordinates.len() / 2
    }

    pub fn low(&self, dimension: usize) -> f64 {
        self.coordinates[dimension * 2]
    }

    pub fn high(&self, dimension: usize) -> f64 {
        self.coordinates[dimension * 2 + 1]
    }

    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    /// Closed-interval overlap test. The full space intersects everything,
    /// boxes of different dimensions never intersect.
    pub fn intersects(&self, other: &Hyperrectangle) -> bool {
        if self.is_full_space() || other.is_full_space() {
            return true;
        }

        if self.dimension() != other.dimension() {
            return false;
        }

        (0..self.dimension())
            .all(|d| self.low(d) <= other.high(d) && other.low(d) <= self.high(d))
    }

    /// Returns true when `other` lies completely inside this box.
    pub fn is_covering(&self, other: &Hyperrectangle) -> bool {
        if self.is_full_space() || other.is_full_space() {
            return true;
        }

        if self.dimension() != other.dimension() {
            return false;
        }

        (0..self.dimension()).all(|d| self.low(d) <= other.low(d) && other.high(d) <= self.high(d))
    }

    /// Product of the extents. The full space has volume `0` here because
    /// it never takes part in enlargement arithmetic.
    pub fn volume(&self) -> f64 {
        if self.is_full_space() {
            return 0.0;
        }

        (0..self.dimension())
            .map(|d| self.high(d) - self.low(d))
            .product()
    }

    /// Volume that must be added to this box so that it covers `other`.
    /// Infinite for a box of another dimension.
    pub fn enlargement(&self, other: &Hyperrectangle) -> f64 {
        if self.is_full_space() || other.is_full_space() || self.is_covering(other) {
            return 0.0;
        }

        if self.dimension() != other.dimension() {
            return f64::INFINITY;
        }

        self.union(other).volume() - self.volume()
    }

    /// Smallest box covering both boxes. The full space acts as the
    /// neutral element; boxes of different dimensions are rejected.
    pub fn merge(&self, other: &Hyperrectangle) -> StorageResult<Hyperrectangle> {
        if !self.is_full_space() && !other.is_full_space() && self.dimension() != other.dimension() {
            return Err(StorageError::InvalidArgument(format!(
                "cannot cover a box of dimension {} and a box of dimension {}",
                self.dimension(),
                other.dimension()
            )));
        }
        Ok(self.union(other))
    }

    /// Covering box of all given boxes, the full space for an empty input.
    pub fn covering<'a, I>(boxes: I) -> StorageResult<Hyperrectangle>
    where
        I: IntoIterator<Item = &'a Hyperrectangle>,
    {
        boxes
            .into_iter()
            .try_fold(Hyperrectangle::FULL_SPACE, |acc, current| acc.merge(current))
    }

    /// [`merge`](Self::merge) for boxes already known to share a dimension.
    pub(crate) fn union(&self, other: &Hyperrectangle) -> Hyperrectangle {
        if self.is_full_space() {
            return other.clone();
        }

        if other.is_full_space() {
            return self.clone();
        }

        debug_assert_eq!(self.dimension(), other.dimension());
        let coordinates = self
            .coordinates
            .chunks_exact(2)
            .zip(other.coordinates.chunks_exact(2))
            .flat_map(|(a, b)| [a[0].min(b[0]), a[1].max(b[1])])
            .collect();
        Hyperrectangle { coordinates }
    }

    /// [`covering`](Self::covering) for boxes already known to share a
    /// dimension.
    pub(crate) fn union_all<'a, I>(boxes: I) -> Hyperrectangle
    where
        I: IntoIterator<Item = &'a Hyperrectangle>,
    {
        boxes
            .into_iter()
            .fold(Hyperrectangle::FULL_SPACE, |acc, current| acc.union(current))
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Number of bytes of the binary form.
    pub fn encoded_len(&self) -> usize {
        self.coordinates.len() * COORDINATE_BYTES
    }

    /// Big-endian `f64` values, low before high per dimension. The full
    /// space encodes to zero bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        self.write_bytes(&mut bytes);
        bytes
    }

    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        for value in &self.coordinates {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() % (COORDINATE_BYTES * 2) != 0 {
            return Err(StorageError::Format(format!(
                "bounding box length {} is not a multiple of {}",
                bytes.len(),
                COORDINATE_BYTES * 2
            )));
        }

        let coordinates = bytes
            .chunks_exact(COORDINATE_BYTES)
            .map(|chunk| {
                let mut raw = [0u8; COORDINATE_BYTES];
                raw.copy_from_slice(chunk);
                f64::from_be_bytes(raw)
            })
            .collect();

        Hyperrectangle::new(coordinates)
            .map_err(|e| StorageError::Format(format!("invalid bounding box: {}", e)))
    }

    /// Compact form `[[low,high]:[low,high]]`, `[]` for the full space.
    pub fn to_compact_string(&self) -> String {
        let intervals: Vec<String> = self
            .coordinates
            .chunks_exact(2)
            .map(|pair| format!("[{:?},{:?}]", pair[0], pair[1]))
            .collect();
        format!("[{}]", intervals.join(":"))
    }
}

impl TryFrom<Vec<f64>> for Hyperrectangle {
    type Error = StorageError;

    fn try_from(coordinates: Vec<f64>) -> Result<Self, Self::Error> {
        Hyperrectangle::new(coordinates)
    }
}

impl From<Hyperrectangle> for Vec<f64> {
    fn from(bbox: Hyperrectangle) -> Self {
        bbox.coordinates
    }
}

impl fmt::Display for Hyperrectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_compact_string())
    }
}

impl FromStr for Hyperrectangle {
    type Err = StorageError;

    /// Parses the compact form produced by [`Hyperrectangle::to_compact_string`].
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || StorageError::InvalidArgument(format!("invalid box string: {}", value));

        let inner = value
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(invalid)?;

        if inner.is_empty() {
            return Ok(Hyperrectangle::FULL_SPACE);
        }

        let mut coordinates = Vec::new();
        for interval in inner.split(':') {
            let bounds = interval
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .ok_or_else(invalid)?;
            let (low, high) = bounds.split_once(',').ok_or_else(invalid)?;
            coordinates.push(low.trim().parse::<f64>().map_err(|_| invalid())?);
            coordinates.push(high.trim().parse::<f64>().map_err(|_| invalid())?);
        }

        Hyperrectangle::new(coordinates)
    }
}
