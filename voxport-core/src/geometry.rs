//! Canonical 5-axis volume geometry.
//!
//! Every volume is addressed in `(time, depth, row, column, channel)` order,
//! abbreviated `tzyxc`. Sources may lack any of the non-spatial axes; those
//! default to an extent of 1.

use crate::error::{Error, Result};
use crate::pixel::PixelKind;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound for the depth, row and column chunk extents.
pub const MAX_CHUNK_EXTENT: usize = 256;

/// Number of output channels a packed ARGB pixel decomposes into.
pub const ARGB_CHANNELS: usize = 4;

/// One of the five canonical axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Axis {
    Time,
    Depth,
    Row,
    Column,
    Channel,
}

impl Axis {
    /// Axes in canonical storage order.
    pub const CANONICAL: [Axis; 5] = [
        Axis::Time,
        Axis::Depth,
        Axis::Row,
        Axis::Column,
        Axis::Channel,
    ];

    /// Position of this axis in the canonical order.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Axis::Time => 0,
            Axis::Depth => 1,
            Axis::Row => 2,
            Axis::Column => 3,
            Axis::Channel => 4,
        }
    }

    /// Single-letter code (`t`, `z`, `y`, `x`, `c`).
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Axis::Time => 't',
            Axis::Depth => 'z',
            Axis::Row => 'y',
            Axis::Column => 'x',
            Axis::Channel => 'c',
        }
    }

    /// Parses a single-letter axis code, case-insensitively.
    #[must_use]
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            't' => Some(Axis::Time),
            'z' => Some(Axis::Depth),
            'y' => Some(Axis::Row),
            'x' => Some(Axis::Column),
            'c' => Some(Axis::Channel),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::Time => "time",
            Axis::Depth => "depth (Z)",
            Axis::Row => "row (Y)",
            Axis::Column => "column (X)",
            Axis::Channel => "channel",
        };
        f.write_str(name)
    }
}

/// Per-axis presence and extent as reported by a source image.
///
/// `None` means the source has no such axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AxisExtents {
    extents: [Option<usize>; 5],
}

impl AxisExtents {
    /// Creates an empty description (no axes present).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `axis` as present with the given extent.
    #[must_use]
    pub fn with(mut self, axis: Axis, extent: usize) -> Self {
        self.extents[axis.index()] = Some(extent);
        self
    }

    /// Extent of `axis`, if the source has it.
    #[must_use]
    pub fn get(&self, axis: Axis) -> Option<usize> {
        self.extents[axis.index()]
    }

    /// Returns true if the source exposes `axis`.
    #[must_use]
    pub fn has(&self, axis: Axis) -> bool {
        self.get(axis).is_some()
    }
}

/// Extents of a volume in `tzyxc` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VolumeShape {
    pub t: usize,
    pub z: usize,
    pub y: usize,
    pub x: usize,
    pub c: usize,
}

impl VolumeShape {
    #[must_use]
    pub fn new(t: usize, z: usize, y: usize, x: usize, c: usize) -> Self {
        Self { t, z, y, x, c }
    }

    /// Extents as an array in canonical order.
    #[must_use]
    pub fn dims(&self) -> [usize; 5] {
        [self.t, self.z, self.y, self.x, self.c]
    }

    /// Number of samples in one row×column plane.
    #[must_use]
    pub fn slice_len(&self) -> usize {
        self.y * self.x
    }

    /// Number of planes, i.e. `t * z * c`.
    #[must_use]
    pub fn slice_count(&self) -> usize {
        self.t * self.z * self.c
    }

    /// Extent covering exactly one plane: `(1, 1, Y, X, 1)`.
    #[must_use]
    pub fn slice_block(&self) -> [usize; 5] {
        [1, 1, self.y, self.x, 1]
    }

    /// Same shape with a different channel count.
    #[must_use]
    pub fn with_channels(self, c: usize) -> Self {
        Self { c, ..self }
    }

    /// Iterates plane coordinates, `t` outermost and `c` innermost.
    #[must_use]
    pub fn coordinates(&self) -> SliceCoordinates {
        SliceCoordinates {
            shape: *self,
            next: (self.slice_count() > 0).then_some(SliceCoordinate::ORIGIN),
        }
    }
}

impl fmt::Display for VolumeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}x{}x{}", self.t, self.z, self.y, self.x, self.c)
    }
}

/// Chunk extents in `tzyxc` order.
///
/// Time and channel chunks are always 1; the other axes are capped at
/// [`MAX_CHUNK_EXTENT`] and never exceed the volume extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkShape {
    dims: [usize; 5],
}

impl ChunkShape {
    /// Computes the chunk shape for a volume.
    #[must_use]
    pub fn for_volume(shape: &VolumeShape) -> Self {
        Self {
            dims: [
                1,
                shape.z.min(MAX_CHUNK_EXTENT),
                shape.y.min(MAX_CHUNK_EXTENT),
                shape.x.min(MAX_CHUNK_EXTENT),
                1,
            ],
        }
    }

    #[must_use]
    pub fn dims(&self) -> [usize; 5] {
        self.dims
    }
}

impl fmt::Display for ChunkShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [t, z, y, x, c] = self.dims;
        write!(f, "{t}x{z}x{y}x{x}x{c}")
    }
}

/// Position of one plane inside the volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SliceCoordinate {
    pub t: usize,
    pub z: usize,
    pub c: usize,
}

impl SliceCoordinate {
    /// The first plane written in every session.
    pub const ORIGIN: SliceCoordinate = SliceCoordinate { t: 0, z: 0, c: 0 };

    #[must_use]
    pub fn new(t: usize, z: usize, c: usize) -> Self {
        Self { t, z, c }
    }

    /// Dataset offset of this plane: `(t, z, 0, 0, c)`.
    #[must_use]
    pub fn offset(&self) -> [usize; 5] {
        [self.t, self.z, 0, 0, self.c]
    }

    /// The coordinate visited after this one, or `None` at the end.
    #[must_use]
    pub fn successor(&self, shape: &VolumeShape) -> Option<Self> {
        let mut next = *self;
        next.c += 1;
        if next.c < shape.c {
            return Some(next);
        }
        next.c = 0;
        next.z += 1;
        if next.z < shape.z {
            return Some(next);
        }
        next.z = 0;
        next.t += 1;
        (next.t < shape.t).then_some(next)
    }
}

impl fmt::Display for SliceCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(t={}, z={}, c={})", self.t, self.z, self.c)
    }
}

/// Iterator over all plane coordinates of a volume.
#[derive(Clone, Debug)]
pub struct SliceCoordinates {
    shape: VolumeShape,
    next: Option<SliceCoordinate>,
}

impl Iterator for SliceCoordinates {
    type Item = SliceCoordinate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.successor(&self.shape);
        Some(current)
    }
}

/// Resolved geometry of a source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumeGeometry {
    /// Which axes the source exposes.
    pub axes: AxisExtents,
    /// Source extents in canonical order, absent axes defaulted to 1.
    pub source_shape: VolumeShape,
}

impl VolumeGeometry {
    /// Shape of the dataset written for `kind`.
    ///
    /// Packed ARGB sources are stored as four `uint8` channels.
    #[must_use]
    pub fn output_shape(&self, kind: PixelKind) -> VolumeShape {
        match kind {
            PixelKind::PackedArgb32 => self.source_shape.with_channels(ARGB_CHANNELS),
            _ => self.source_shape,
        }
    }

    /// Chunk shape of the dataset written for `kind`.
    #[must_use]
    pub fn chunk_shape(&self, kind: PixelKind) -> ChunkShape {
        ChunkShape::for_volume(&self.output_shape(kind))
    }
}

/// Computes the canonical shape of a source from its per-axis extents.
///
/// # Errors
/// Returns [`Error::MissingSpatialAxis`] if the row or column axis is absent,
/// and [`Error::InvalidGeometry`] for zero extents or planes too large to
/// address.
pub fn resolve_geometry(axes: AxisExtents) -> Result<VolumeGeometry> {
    let y = axes.get(Axis::Row).ok_or(Error::MissingSpatialAxis { axis: Axis::Row })?;
    let x = axes
        .get(Axis::Column)
        .ok_or(Error::MissingSpatialAxis { axis: Axis::Column })?;

    let source_shape = VolumeShape {
        t: axes.get(Axis::Time).unwrap_or(1),
        z: axes.get(Axis::Depth).unwrap_or(1),
        y,
        x,
        c: axes.get(Axis::Channel).unwrap_or(1),
    };

    for axis in Axis::CANONICAL {
        if source_shape.dims()[axis.index()] == 0 {
            return Err(Error::InvalidGeometry(format!("{axis} axis has zero extent")));
        }
    }
    if y.checked_mul(x).is_none() {
        return Err(Error::InvalidGeometry(format!(
            "plane of {y}x{x} samples cannot be addressed"
        )));
    }

    Ok(VolumeGeometry { axes, source_shape })
}
