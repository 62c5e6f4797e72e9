//! Slice extraction.
//!
//! A [`SliceCodec`] turns one `(t, z, c)` coordinate of a source image into a
//! flat row-major [`SliceBuffer`] of the session's native element type.
//! [`ScalarCodec`] covers the plain numeric kinds; [`ArgbCodec`] decomposes
//! packed colour pixels into four `uint8` planes.

use crate::error::{Error, Result};
use crate::geometry::{
    Axis, AxisExtents, SliceCoordinate, VolumeGeometry, VolumeShape, ARGB_CHANNELS,
};
use crate::pixel::{Argb, NativeSample, PixelKind, Sample};
use crate::source::{SampleCursor, VolumeSource};
use log::warn;
use std::marker::PhantomData;
use std::mem::size_of;

/// One row×column plane, laid out as `index = y * cols + x`.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceBuffer<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: NativeSample> SliceBuffer<T> {
    /// Allocates a plane with every sample set to `value`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the allocation cannot be satisfied.
    pub fn try_filled(rows: usize, cols: usize, value: T) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or(Error::OutOfMemory { bytes: usize::MAX })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| Error::OutOfMemory {
            bytes: len.saturating_mul(size_of::<T>()),
        })?;
        data.resize(len, value);
        Ok(Self { data, rows, cols })
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Sample at row `y`, column `x`.
    #[must_use]
    pub fn get(&self, y: usize, x: usize) -> Option<T> {
        if y < self.rows && x < self.cols {
            Some(self.data[y * self.cols + x])
        } else {
            None
        }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

/// Produces slice buffers for successive plane coordinates.
pub trait SliceCodec {
    /// Element type of the produced buffers.
    type Native: NativeSample;

    /// Kind fixed for the whole session.
    fn kind(&self) -> PixelKind;

    /// Shape of the dataset the buffers are written into.
    fn output_shape(&self) -> VolumeShape;

    /// Extracts the plane at `coord`, given in output coordinates.
    ///
    /// # Errors
    /// Returns an error if the buffer cannot be allocated, `coord` lies
    /// outside [`Self::output_shape`], or a sample has a different kind.
    fn extract(&mut self, coord: SliceCoordinate) -> Result<SliceBuffer<Self::Native>>;
}

/// Determines the session's pixel kind from the first element of `source`.
///
/// # Errors
/// Returns [`Error::UnsupportedPixelKind`] if the first element is not a
/// writable kind, or [`Error::InvalidGeometry`] for an empty source.
pub fn detect_kind<S: VolumeSource>(source: &S) -> Result<PixelKind> {
    let first = source
        .first_element()
        .ok_or_else(|| Error::InvalidGeometry("image has no elements".to_string()))?;
    PixelKind::of(first)
}

fn check_coordinate(coord: SliceCoordinate, shape: &VolumeShape) -> Result<()> {
    if coord.t < shape.t && coord.z < shape.z && coord.c < shape.c {
        Ok(())
    } else {
        Err(Error::InvalidGeometry(format!("slice {coord} outside volume {shape}")))
    }
}

/// Positions the non-spatial axes the source actually has.
fn position_plane<C: SampleCursor>(
    cursor: &mut C,
    axes: &AxisExtents,
    t: usize,
    z: usize,
    channel: Option<usize>,
) {
    if axes.has(Axis::Time) {
        cursor.set_position(Axis::Time, t);
    }
    if axes.has(Axis::Depth) {
        cursor.set_position(Axis::Depth, z);
    }
    if let Some(c) = channel {
        if axes.has(Axis::Channel) {
            cursor.set_position(Axis::Channel, c);
        }
    }
}

/// Reads the current plane column by column into `buffer`.
fn fill_plane<C, T, F>(
    cursor: &mut C,
    buffer: &mut SliceBuffer<T>,
    expected: PixelKind,
    narrow: F,
) -> Result<()>
where
    C: SampleCursor,
    T: NativeSample,
    F: Fn(Sample) -> Option<T>,
{
    let (rows, cols) = (buffer.rows, buffer.cols);
    for x in 0..cols {
        cursor.set_position(Axis::Column, x);
        for y in 0..rows {
            cursor.set_position(Axis::Row, y);
            let sample = cursor.get();
            buffer.data[y * cols + x] = narrow(sample).ok_or(Error::MixedPixelKinds {
                expected: expected.sample_name(),
                found: sample.type_name(),
            })?;
        }
    }
    Ok(())
}

/// Codec for `uint8`, `uint16`, `uint32` and `float32` volumes.
pub struct ScalarCodec<'a, S, T>
where
    S: VolumeSource + 'a,
{
    cursor: S::Cursor<'a>,
    axes: AxisExtents,
    shape: VolumeShape,
    _native: PhantomData<T>,
}

impl<'a, S, T> ScalarCodec<'a, S, T>
where
    S: VolumeSource + 'a,
    T: NativeSample,
{
    #[must_use]
    pub fn new(source: &'a S, geometry: &VolumeGeometry) -> Self {
        Self {
            cursor: source.cursor(),
            axes: geometry.axes,
            shape: geometry.output_shape(T::KIND),
            _native: PhantomData,
        }
    }
}

impl<'a, S, T> SliceCodec for ScalarCodec<'a, S, T>
where
    S: VolumeSource + 'a,
    T: NativeSample,
{
    type Native = T;

    fn kind(&self) -> PixelKind {
        T::KIND
    }

    fn output_shape(&self) -> VolumeShape {
        self.shape
    }

    fn extract(&mut self, coord: SliceCoordinate) -> Result<SliceBuffer<T>> {
        check_coordinate(coord, &self.shape)?;
        position_plane(&mut self.cursor, &self.axes, coord.t, coord.z, Some(coord.c));
        let mut buffer = SliceBuffer::try_filled(self.shape.y, self.shape.x, T::default())?;
        fill_plane(&mut self.cursor, &mut buffer, T::KIND, T::narrow)?;
        Ok(buffer)
    }
}

/// How the channels of a packed colour source map onto the four output
/// channels (0 alpha, 1 red, 2 green, 3 blue).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgbLayout {
    /// One packed word per pixel; output channel `c` is byte `c` of
    /// `0xAARRGGBB`.
    Packed,
    /// Three declared channels. Alpha is not read: every alpha sample is
    /// `u8::MAX` (opaque) and output channels 1..=3 read source channels
    /// 0..=2.
    Rgb,
    /// Four declared channels, read one-to-one.
    Argb,
}

impl ArgbLayout {
    /// Picks the layout from the source's declared channel count.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgbChannels`] for anything but 1, 3 or 4.
    pub fn for_channels(channels: usize) -> Result<Self> {
        match channels {
            1 => Ok(ArgbLayout::Packed),
            3 => Ok(ArgbLayout::Rgb),
            4 => Ok(ArgbLayout::Argb),
            n => Err(Error::InvalidArgbChannels(n)),
        }
    }
}

/// Codec decomposing packed ARGB pixels into four `uint8` channels.
pub struct ArgbCodec<'a, S>
where
    S: VolumeSource + 'a,
{
    cursor: S::Cursor<'a>,
    axes: AxisExtents,
    shape: VolumeShape,
    layout: ArgbLayout,
}

impl<'a, S> ArgbCodec<'a, S>
where
    S: VolumeSource + 'a,
{
    /// # Errors
    /// Returns [`Error::InvalidArgbChannels`] if the source declares a
    /// channel count other than 1, 3 or 4.
    pub fn new(source: &'a S, geometry: &VolumeGeometry) -> Result<Self> {
        let layout = ArgbLayout::for_channels(geometry.source_shape.c)?;
        if layout == ArgbLayout::Rgb {
            warn!("Only 3 channel RGB found. Writing an opaque alpha channel.");
        }
        Ok(Self {
            cursor: source.cursor(),
            axes: geometry.axes,
            shape: geometry.output_shape(PixelKind::PackedArgb32),
            layout,
        })
    }

    #[must_use]
    pub fn layout(&self) -> ArgbLayout {
        self.layout
    }
}

impl<'a, S> SliceCodec for ArgbCodec<'a, S>
where
    S: VolumeSource + 'a,
{
    type Native = u8;

    fn kind(&self) -> PixelKind {
        PixelKind::PackedArgb32
    }

    fn output_shape(&self) -> VolumeShape {
        self.shape
    }

    fn extract(&mut self, coord: SliceCoordinate) -> Result<SliceBuffer<u8>> {
        check_coordinate(coord, &self.shape)?;
        debug_assert!(coord.c < ARGB_CHANNELS);
        let (rows, cols) = (self.shape.y, self.shape.x);
        let kind = PixelKind::PackedArgb32;

        match self.layout {
            ArgbLayout::Rgb if coord.c == 0 => SliceBuffer::try_filled(rows, cols, u8::MAX),
            ArgbLayout::Rgb | ArgbLayout::Argb => {
                let channel = match self.layout {
                    ArgbLayout::Rgb => coord.c - 1,
                    _ => coord.c,
                };
                position_plane(&mut self.cursor, &self.axes, coord.t, coord.z, Some(channel));
                let mut buffer = SliceBuffer::try_filled(rows, cols, 0)?;
                fill_plane(&mut self.cursor, &mut buffer, kind, |sample| {
                    Argb::from_sample(sample).map(Argb::low_byte)
                })?;
                Ok(buffer)
            }
            ArgbLayout::Packed => {
                position_plane(&mut self.cursor, &self.axes, coord.t, coord.z, Some(0));
                let mut buffer = SliceBuffer::try_filled(rows, cols, 0)?;
                let channel = coord.c;
                fill_plane(&mut self.cursor, &mut buffer, kind, |sample| {
                    Argb::from_sample(sample).map(|pixel| pixel.channel(channel))
                })?;
                Ok(buffer)
            }
        }
    }
}
