//! voxport-core: Volume geometry, pixel kinds and slice codecs.
//!
//! This crate describes how an arbitrary 5-axis image source maps onto the
//! canonical `(time, depth, row, column, channel)` layout and how each
//! row×column plane is turned into a flat buffer ready for writing.
//!

pub mod codec;
pub mod error;
pub mod geometry;
pub mod pixel;
pub mod source;

pub use codec::{detect_kind, ArgbCodec, ArgbLayout, ScalarCodec, SliceBuffer, SliceCodec};
pub use error::{Error, Result};
pub use geometry::{
    resolve_geometry, Axis, AxisExtents, ChunkShape, SliceCoordinate, SliceCoordinates,
    VolumeGeometry, VolumeShape, ARGB_CHANNELS, MAX_CHUNK_EXTENT,
};
pub use pixel::{Argb, NativeSample, PixelKind, Sample};
pub use source::{ArrayCursor, ArrayVolume, SampleCursor, VolumeSource};
