//! Pixel kinds and source sample values.

use crate::error::{Error, Result};
use std::fmt;

/// The closed set of element types a volume can be written as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelKind {
    UInt8,
    UInt16,
    UInt32,
    Float32,
    /// Packed 32-bit colour, stored as four `uint8` channels.
    PackedArgb32,
}

impl PixelKind {
    /// Determines the kind from a sample (normally the first element).
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedPixelKind`] for signed and 64-bit samples.
    pub fn of(sample: Sample) -> Result<Self> {
        match sample {
            Sample::U8(_) => Ok(PixelKind::UInt8),
            Sample::U16(_) => Ok(PixelKind::UInt16),
            Sample::U32(_) => Ok(PixelKind::UInt32),
            Sample::F32(_) => Ok(PixelKind::Float32),
            Sample::Argb(_) => Ok(PixelKind::PackedArgb32),
            other => Err(Error::UnsupportedPixelKind(other.type_name().to_string())),
        }
    }

    /// Name of the source sample type this kind is read from.
    #[must_use]
    pub fn sample_name(self) -> &'static str {
        match self {
            PixelKind::UInt8 => "uint8",
            PixelKind::UInt16 => "uint16",
            PixelKind::UInt32 => "uint32",
            PixelKind::Float32 => "float32",
            PixelKind::PackedArgb32 => "argb32",
        }
    }
}

impl fmt::Display for PixelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelKind::UInt8 => "uint 8",
            PixelKind::UInt16 => "uint 16",
            PixelKind::UInt32 => "uint 32",
            PixelKind::Float32 => "float 32",
            PixelKind::PackedArgb32 => "ARGB to 4 uint8 channels",
        };
        f.write_str(name)
    }
}

/// A single value read from a source image.
///
/// Sources may carry element types that cannot be written; those only
/// surface as [`Error::UnsupportedPixelKind`] or [`Error::MixedPixelKinds`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sample {
    U8(u8),
    U16(u16),
    U32(u32),
    F32(f32),
    /// Packed `0xAARRGGBB` colour word.
    Argb(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U64(u64),
    F64(f64),
}

impl Sample {
    /// Human-readable element type name.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            Sample::U8(_) => "uint8",
            Sample::U16(_) => "uint16",
            Sample::U32(_) => "uint32",
            Sample::F32(_) => "float32",
            Sample::Argb(_) => "argb32",
            Sample::I8(_) => "int8",
            Sample::I16(_) => "int16",
            Sample::I32(_) => "int32",
            Sample::I64(_) => "int64",
            Sample::U64(_) => "uint64",
            Sample::F64(_) => "float64",
        }
    }
}

macro_rules! impl_sample_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Sample {
                fn from(value: $ty) -> Self {
                    Sample::$variant(value)
                }
            }
        )*
    };
}

impl_sample_from!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    f32 => F32,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u64 => U64,
    f64 => F64,
);

/// A packed `0xAARRGGBB` colour pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Argb(pub u32);

impl Argb {
    #[must_use]
    pub fn from_channels(alpha: u8, red: u8, green: u8, blue: u8) -> Self {
        Self(u32::from_be_bytes([alpha, red, green, blue]))
    }

    /// Sub-channel `index` (0 alpha, 1 red, 2 green, 3 blue).
    ///
    /// # Panics
    /// Panics if `index > 3`.
    #[must_use]
    pub fn channel(self, index: usize) -> u8 {
        self.0.to_be_bytes()[index]
    }

    /// Low-order byte of the word, as kept for per-channel colour sources.
    #[must_use]
    pub fn low_byte(self) -> u8 {
        self.0.to_le_bytes()[0]
    }

    /// Accepts packed colour samples only.
    #[must_use]
    pub fn from_sample(sample: Sample) -> Option<Self> {
        match sample {
            Sample::Argb(word) => Some(Self(word)),
            _ => None,
        }
    }
}

impl From<Argb> for Sample {
    fn from(value: Argb) -> Self {
        Sample::Argb(value.0)
    }
}

/// Element types that can be stored in a slice buffer.
pub trait NativeSample: Copy + Default + Send + Sync + 'static {
    /// Kind written when this type backs a plain numeric volume.
    const KIND: PixelKind;

    /// Converts a source sample of exactly this type. Returns `None` if the
    /// sample has a different kind.
    fn narrow(sample: Sample) -> Option<Self>;
}

impl NativeSample for u8 {
    const KIND: PixelKind = PixelKind::UInt8;

    fn narrow(sample: Sample) -> Option<Self> {
        match sample {
            Sample::U8(value) => Some(value),
            _ => None,
        }
    }
}

impl NativeSample for u16 {
    const KIND: PixelKind = PixelKind::UInt16;

    fn narrow(sample: Sample) -> Option<Self> {
        match sample {
            Sample::U16(value) => Some(value),
            _ => None,
        }
    }
}

impl NativeSample for u32 {
    const KIND: PixelKind = PixelKind::UInt32;

    fn narrow(sample: Sample) -> Option<Self> {
        match sample {
            Sample::U32(value) => Some(value),
            _ => None,
        }
    }
}

impl NativeSample for f32 {
    const KIND: PixelKind = PixelKind::Float32;

    fn narrow(sample: Sample) -> Option<Self> {
        match sample {
            Sample::F32(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_supported_samples() {
        assert_eq!(PixelKind::of(Sample::U8(1)).unwrap(), PixelKind::UInt8);
        assert_eq!(PixelKind::of(Sample::U16(1)).unwrap(), PixelKind::UInt16);
        assert_eq!(PixelKind::of(Sample::U32(1)).unwrap(), PixelKind::UInt32);
        assert_eq!(PixelKind::of(Sample::F32(1.0)).unwrap(), PixelKind::Float32);
        assert_eq!(
            PixelKind::of(Argb(0).into()).unwrap(),
            PixelKind::PackedArgb32
        );
    }

    #[test]
    fn test_kind_of_unsupported_sample() {
        let err = PixelKind::of(Sample::I16(-3)).unwrap_err();
        match err {
            Error::UnsupportedPixelKind(name) => assert_eq!(name, "int16"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(PixelKind::of(Sample::F64(0.5)).is_err());
    }

    #[test]
    fn test_argb_channel_order() {
        let pixel = Argb::from_channels(0xAA, 0x11, 0x22, 0x33);
        assert_eq!(pixel.0, 0xAA11_2233);
        assert_eq!(pixel.channel(0), 0xAA);
        assert_eq!(pixel.channel(1), 0x11);
        assert_eq!(pixel.channel(2), 0x22);
        assert_eq!(pixel.channel(3), 0x33);
    }

    #[test]
    fn test_u8_narrowing_rejects_packed_words() {
        assert_eq!(u8::narrow(Sample::U8(200)), Some(200));
        assert_eq!(u8::narrow(Sample::Argb(0x1234_5678)), None);
        assert_eq!(u8::narrow(Sample::U16(200)), None);
    }

    #[test]
    fn test_packed_sample_low_byte() {
        let pixel = Argb::from_sample(Sample::Argb(0x1234_5678)).unwrap();
        assert_eq!(pixel.low_byte(), 0x78);
        assert_eq!(Argb::from_sample(Sample::U8(7)), None);
    }

    #[test]
    fn test_narrowing_rejects_other_kinds() {
        assert_eq!(u16::narrow(Sample::U16(u16::MAX)), Some(u16::MAX));
        assert_eq!(u32::narrow(Sample::U32(u32::MAX)), Some(u32::MAX));
        assert_eq!(u32::narrow(Sample::I32(-1)), None);
        assert_eq!(f32::narrow(Sample::F32(0.25)), Some(0.25));
        assert_eq!(f32::narrow(Sample::F64(0.25)), None);
    }
}
