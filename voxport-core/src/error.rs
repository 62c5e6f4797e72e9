//! Error types for voxport-core.

use crate::geometry::Axis;
use thiserror::Error;

/// Result type alias for voxport core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types raised before or while building slice buffers.
#[derive(Error, Debug)]
pub enum Error {
    /// The source image lacks a mandatory spatial axis.
    #[error("image must have X and Y dimensions (missing {axis} axis)")]
    MissingSpatialAxis { axis: Axis },

    /// The first sample of the source is not one of the writable kinds.
    #[error("unsupported pixel type: {0}")]
    UnsupportedPixelKind(String),

    /// A sample disagrees with the kind fixed for the session.
    #[error("mixed pixel types: expected {expected}, found {found}")]
    MixedPixelKinds {
        expected: &'static str,
        found: &'static str,
    },

    /// Packed colour sources must declare 1, 3 or 4 channels.
    #[error("packed ARGB source declares {0} channels (expected 1, 3 or 4)")]
    InvalidArgbChannels(usize),

    /// Geometry that cannot be addressed on this platform.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A slice buffer could not be allocated.
    #[error("out of memory allocating a {bytes}-byte slice buffer")]
    OutOfMemory { bytes: usize },
}
