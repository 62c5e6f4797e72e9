//! Memory-mapped raw volume files.
//!
//! A raw volume is a headerless little-endian sample array. Its layout
//! (element type and axes, outermost first) comes from a JSON sidecar or
//! from compact strings such as `--axes tzyxc --shape 2,1,4,4,1`.

use crate::{Error, Result};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use voxport_core::{Axis, AxisExtents, Sample, SampleCursor, VolumeSource};

/// Element type of a raw file.
///
/// `i16` and `f64` can be read but not written; exporting them fails with an
/// unsupported pixel type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawDtype {
    U8,
    U16,
    U32,
    F32,
    Argb32,
    I16,
    F64,
}

impl RawDtype {
    /// Size of one element in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            RawDtype::U8 => 1,
            RawDtype::U16 | RawDtype::I16 => 2,
            RawDtype::U32 | RawDtype::F32 | RawDtype::Argb32 => 4,
            RawDtype::F64 => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> Sample {
        match self {
            RawDtype::U8 => Sample::U8(bytes[0]),
            RawDtype::U16 => Sample::U16(u16::from_le_bytes(le(bytes))),
            RawDtype::U32 => Sample::U32(u32::from_le_bytes(le(bytes))),
            RawDtype::F32 => Sample::F32(f32::from_le_bytes(le(bytes))),
            RawDtype::Argb32 => Sample::Argb(u32::from_le_bytes(le(bytes))),
            RawDtype::I16 => Sample::I16(i16::from_le_bytes(le(bytes))),
            RawDtype::F64 => Sample::F64(f64::from_le_bytes(le(bytes))),
        }
    }
}

impl FromStr for RawDtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(RawDtype::U8),
            "u16" | "uint16" => Ok(RawDtype::U16),
            "u32" | "uint32" => Ok(RawDtype::U32),
            "f32" | "float32" => Ok(RawDtype::F32),
            "argb32" | "argb" => Ok(RawDtype::Argb32),
            "i16" | "int16" => Ok(RawDtype::I16),
            "f64" | "float64" => Ok(RawDtype::F64),
            other => Err(Error::InvalidFormat(format!("unknown dtype '{other}'"))),
        }
    }
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// One axis of a raw file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAxis {
    pub axis: Axis,
    pub extent: usize,
}

/// Element type and axis order of a raw file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLayout {
    pub dtype: RawDtype,
    /// Axes in file order, outermost first.
    pub axes: Vec<RawAxis>,
}

impl RawLayout {
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for an empty or repeated axis list or
    /// a zero extent.
    pub fn new(dtype: RawDtype, axes: Vec<RawAxis>) -> Result<Self> {
        let layout = Self { dtype, axes };
        layout.validate()?;
        Ok(layout)
    }

    /// Parses compact strings: `axes` as letters (`"tzyxc"`, `"yx"`) and
    /// `shape` as comma-separated extents in the same order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for unknown letters, non-numeric
    /// extents or a length mismatch.
    pub fn parse(dtype: &str, axes: &str, shape: &str) -> Result<Self> {
        let dtype = dtype.parse()?;
        let letters: Vec<Axis> = axes
            .chars()
            .map(|letter| {
                Axis::from_letter(letter)
                    .ok_or_else(|| Error::InvalidFormat(format!("unknown axis '{letter}'")))
            })
            .collect::<Result<_>>()?;
        let extents: Vec<usize> = shape
            .split(',')
            .map(|part| {
                part.trim()
                    .parse()
                    .map_err(|e| Error::InvalidFormat(format!("bad extent '{part}': {e}")))
            })
            .collect::<Result<_>>()?;
        if letters.len() != extents.len() {
            return Err(Error::InvalidFormat(format!(
                "{} axes but {} extents",
                letters.len(),
                extents.len()
            )));
        }
        let axes = letters
            .into_iter()
            .zip(extents)
            .map(|(axis, extent)| RawAxis { axis, extent })
            .collect();
        Self::new(dtype, axes)
    }

    /// Loads a JSON sidecar.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or the layout
    /// is invalid.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let layout: Self = serde_json::from_reader(reader)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Total number of elements, if it fits in `usize`.
    #[must_use]
    pub fn element_count(&self) -> Option<usize> {
        self.axes
            .iter()
            .try_fold(1usize, |count, axis| count.checked_mul(axis.extent))
    }

    /// Expected file size in bytes, if it fits in `usize`.
    #[must_use]
    pub fn byte_len(&self) -> Option<usize> {
        self.element_count()?.checked_mul(self.dtype.size())
    }

    fn validate(&self) -> Result<()> {
        if self.axes.is_empty() {
            return Err(Error::InvalidFormat("layout has no axes".to_string()));
        }
        for (i, raw) in self.axes.iter().enumerate() {
            if raw.extent == 0 {
                return Err(Error::InvalidFormat(format!("{} axis has zero extent", raw.axis)));
            }
            if self.axes[..i].iter().any(|prev| prev.axis == raw.axis) {
                return Err(Error::InvalidFormat(format!("duplicate {} axis", raw.axis)));
            }
        }
        Ok(())
    }

    /// Row-major element strides, one per axis.
    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.axes.len()];
        for i in (0..self.axes.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.axes[i + 1].extent;
        }
        strides
    }
}

/// A raw volume file exposed as a [`VolumeSource`].
///
/// The file is memory-mapped; samples are decoded on access, so the volume
/// is never held in memory as a whole.
pub struct RawVolume {
    mmap: Mmap,
    layout: RawLayout,
    strides: Vec<usize>,
    path: PathBuf,
}

impl RawVolume {
    /// Maps `path` with the given layout.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped or its size does not
    /// match the layout.
    pub fn open<P: AsRef<Path>>(path: P, layout: RawLayout) -> Result<Self> {
        let expected = layout
            .byte_len()
            .ok_or_else(|| Error::InvalidFormat("layout size overflows".to_string()))?;
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "'{}' holds {} bytes, layout needs {expected}",
                path.as_ref().display(),
                mmap.len()
            )));
        }
        let strides = layout.strides();
        Ok(Self {
            mmap,
            layout,
            strides,
            path: path.as_ref().to_path_buf(),
        })
    }

    #[must_use]
    pub fn layout(&self) -> &RawLayout {
        &self.layout
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sample(&self, element: usize) -> Sample {
        let size = self.layout.dtype.size();
        let start = element * size;
        self.layout.dtype.decode(&self.mmap[start..start + size])
    }
}

impl std::fmt::Debug for RawVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawVolume")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl VolumeSource for RawVolume {
    type Cursor<'a> = RawCursor<'a>;

    fn axes(&self) -> AxisExtents {
        self.layout
            .axes
            .iter()
            .fold(AxisExtents::new(), |axes, raw| axes.with(raw.axis, raw.extent))
    }

    fn first_element(&self) -> Option<Sample> {
        (!self.mmap.is_empty()).then(|| self.sample(0))
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        RawCursor {
            volume: self,
            position: vec![0; self.layout.axes.len()],
        }
    }
}

/// Cursor over a [`RawVolume`].
#[derive(Debug)]
pub struct RawCursor<'a> {
    volume: &'a RawVolume,
    position: Vec<usize>,
}

impl SampleCursor for RawCursor<'_> {
    fn set_position(&mut self, axis: Axis, position: usize) {
        if let Some(i) = self.volume.layout.axes.iter().position(|raw| raw.axis == axis) {
            self.position[i] = position;
        }
    }

    fn get(&self) -> Sample {
        let element = self
            .position
            .iter()
            .zip(&self.volume.strides)
            .map(|(position, stride)| position * stride)
            .sum();
        self.volume.sample(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn raw_file(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_layout() {
        let layout = RawLayout::parse("u16", "tzyxc", "2, 1, 4, 4, 1").unwrap();
        assert_eq!(layout.dtype, RawDtype::U16);
        assert_eq!(layout.axes.len(), 5);
        assert_eq!(layout.axes[2], RawAxis { axis: Axis::Row, extent: 4 });
        assert_eq!(layout.byte_len(), Some(64));
    }

    #[test]
    fn test_parse_layout_errors() {
        assert!(RawLayout::parse("u7", "yx", "2,2").is_err());
        assert!(RawLayout::parse("u8", "yq", "2,2").is_err());
        assert!(RawLayout::parse("u8", "yx", "2").is_err());
        assert!(RawLayout::parse("u8", "yy", "2,2").is_err());
        assert!(RawLayout::parse("u8", "yx", "0,2").is_err());
    }

    #[test]
    fn test_json_sidecar() {
        let json = br#"{"dtype": "f32", "axes": [{"axis": "row", "extent": 2}, {"axis": "column", "extent": 3}]}"#;
        let sidecar = raw_file(json);
        let layout = RawLayout::from_json_file(sidecar.path()).unwrap();
        assert_eq!(layout.dtype, RawDtype::F32);
        assert_eq!(layout.element_count(), Some(6));
    }

    #[test]
    fn test_size_mismatch() {
        let file = raw_file(&[0u8; 5]);
        let layout = RawLayout::parse("u8", "yx", "2,3").unwrap();
        let err = RawVolume::open(file.path(), layout).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_cursor_honours_file_order() {
        // File order is (x, y): element index = x * 2 + y.
        let bytes: Vec<u8> = (0..6u16).flat_map(u16::to_le_bytes).collect();
        let file = raw_file(&bytes);
        let layout = RawLayout::parse("u16", "xy", "3,2").unwrap();
        let volume = RawVolume::open(file.path(), layout).unwrap();

        let axes = volume.axes();
        assert_eq!(axes.get(Axis::Column), Some(3));
        assert_eq!(axes.get(Axis::Row), Some(2));

        let mut cursor = volume.cursor();
        cursor.set_position(Axis::Column, 2);
        cursor.set_position(Axis::Row, 1);
        assert_eq!(cursor.get(), Sample::U16(5));
        assert_eq!(volume.first_element(), Some(Sample::U16(0)));
    }
}
