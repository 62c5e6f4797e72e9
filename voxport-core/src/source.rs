//! Random-access image sources.
//!
//! A [`VolumeSource`] reports which canonical axes it has and hands out a
//! [`SampleCursor`] that is positioned one axis at a time.

use crate::error::{Error, Result};
use crate::geometry::{Axis, AxisExtents};
use crate::pixel::Sample;
use ndarray::{Array5, ArrayD};

/// A positionable read cursor over a source image.
pub trait SampleCursor {
    /// Moves the cursor along `axis`.
    ///
    /// Positioning an axis the source does not have is a no-op.
    fn set_position(&mut self, axis: Axis, position: usize);

    /// Reads the sample under the cursor.
    fn get(&self) -> Sample;
}

/// A 5-axis-addressable image.
pub trait VolumeSource {
    type Cursor<'a>: SampleCursor
    where
        Self: 'a;

    /// Which axes exist and their extents.
    fn axes(&self) -> AxisExtents;

    /// The first element in storage order, if the image is non-empty.
    fn first_element(&self) -> Option<Sample>;

    /// A fresh cursor positioned at the origin.
    fn cursor(&self) -> Self::Cursor<'_>;
}

/// In-memory source backed by an n-dimensional array.
///
/// Each array dimension is labelled with the canonical axis it represents,
/// in any order and with any subset of axes.
#[derive(Clone, Debug)]
pub struct ArrayVolume<P> {
    data: ArrayD<P>,
    dims: Vec<Axis>,
}

impl<P> ArrayVolume<P>
where
    P: Copy + Into<Sample>,
{
    /// Wraps `data` whose dimensions are labelled by `dims`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the labels do not match the
    /// array rank or repeat an axis.
    pub fn new(data: ArrayD<P>, dims: &[Axis]) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(Error::InvalidGeometry(format!(
                "{} axis labels for a {}-dimensional array",
                dims.len(),
                data.ndim()
            )));
        }
        for (i, axis) in dims.iter().enumerate() {
            if dims[..i].contains(axis) {
                return Err(Error::InvalidGeometry(format!("duplicate {axis} axis")));
            }
        }
        Ok(Self {
            data,
            dims: dims.to_vec(),
        })
    }

    /// Wraps an array already in canonical `tzyxc` order.
    #[must_use]
    pub fn from_canonical(data: Array5<P>) -> Self {
        Self {
            data: data.into_dyn(),
            dims: Axis::CANONICAL.to_vec(),
        }
    }

    /// The backing array.
    #[must_use]
    pub fn data(&self) -> &ArrayD<P> {
        &self.data
    }
}

impl<P> VolumeSource for ArrayVolume<P>
where
    P: Copy + Into<Sample>,
{
    type Cursor<'a>
        = ArrayCursor<'a, P>
    where
        Self: 'a;

    fn axes(&self) -> AxisExtents {
        self.dims
            .iter()
            .zip(self.data.shape())
            .fold(AxisExtents::new(), |axes, (axis, extent)| {
                axes.with(*axis, *extent)
            })
    }

    fn first_element(&self) -> Option<Sample> {
        self.data.iter().next().map(|value| (*value).into())
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        ArrayCursor {
            data: &self.data,
            dims: &self.dims,
            position: vec![0; self.dims.len()],
        }
    }
}

/// Cursor over an [`ArrayVolume`].
#[derive(Debug)]
pub struct ArrayCursor<'a, P> {
    data: &'a ArrayD<P>,
    dims: &'a [Axis],
    position: Vec<usize>,
}

impl<P> SampleCursor for ArrayCursor<'_, P>
where
    P: Copy + Into<Sample>,
{
    fn set_position(&mut self, axis: Axis, position: usize) {
        if let Some(dim) = self.dims.iter().position(|a| *a == axis) {
            self.position[dim] = position;
        }
    }

    fn get(&self) -> Sample {
        self.data[self.position.as_slice()].into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    #[test]
    fn test_axes_follow_labels() {
        let data = Array::<u8, _>::zeros(IxDyn(&[3, 4, 2]));
        let volume = ArrayVolume::new(data, &[Axis::Column, Axis::Row, Axis::Channel]).unwrap();
        let axes = volume.axes();
        assert_eq!(axes.get(Axis::Column), Some(3));
        assert_eq!(axes.get(Axis::Row), Some(4));
        assert_eq!(axes.get(Axis::Channel), Some(2));
        assert!(!axes.has(Axis::Time));
        assert!(!axes.has(Axis::Depth));
    }

    #[test]
    fn test_label_count_mismatch() {
        let data = Array::<u8, _>::zeros(IxDyn(&[3, 4]));
        let err = ArrayVolume::new(data, &[Axis::Row]).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
    }

    #[test]
    fn test_duplicate_labels() {
        let data = Array::<u8, _>::zeros(IxDyn(&[3, 4]));
        let err = ArrayVolume::new(data, &[Axis::Row, Axis::Row]).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
    }

    #[test]
    fn test_cursor_reads_positioned_sample() {
        let data = Array::from_shape_fn(IxDyn(&[2, 3]), |idx| (idx[0] * 10 + idx[1]) as u16);
        let volume = ArrayVolume::new(data, &[Axis::Row, Axis::Column]).unwrap();
        let mut cursor = volume.cursor();
        cursor.set_position(Axis::Row, 1);
        cursor.set_position(Axis::Column, 2);
        // Absent axes are ignored.
        cursor.set_position(Axis::Time, 5);
        assert_eq!(cursor.get(), Sample::U16(12));
        assert_eq!(volume.first_element(), Some(Sample::U16(0)));
    }
}
