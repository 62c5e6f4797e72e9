//! Whole-volume export pipeline.

use crate::session::{deflate_level, ContainerSession};
use crate::writer::ExtensibleWriter;
use crate::{Error, Result};
use hdf5::types::H5Type;
use log::{error, info};
use std::path::{Path, PathBuf};
use voxport_core::{
    detect_kind, resolve_geometry, ArgbCodec, ChunkShape, PixelKind, ScalarCodec, SliceCodec,
    VolumeShape, VolumeSource,
};

/// Dataset name used when none is given.
pub const DEFAULT_DATASET: &str = "data";

/// Deflate level used when none is given.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 1;

/// Export configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportConfig {
    /// Container file to create (truncated if it exists).
    pub path: PathBuf,
    /// Name of the dataset inside the container.
    pub dataset: String,
    /// Deflate level, `0..=9`.
    pub compression_level: i32,
}

impl ExportConfig {
    /// Configuration with the default dataset name and compression level.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            dataset: DEFAULT_DATASET.to_string(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Set the dataset name.
    #[must_use]
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    /// Set the deflate level.
    ///
    /// Out-of-range values are kept and rejected by [`export_volume`]. Use
    /// [`Self::try_with_compression_level`] to reject them here instead.
    #[must_use]
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Fallible variant of [`Self::with_compression_level`].
    ///
    /// # Errors
    /// Returns [`Error::PropertyConfig`] if `level` is outside `[0, 9]`.
    pub fn try_with_compression_level(mut self, level: i32) -> Result<Self> {
        deflate_level(level)?;
        self.compression_level = level;
        Ok(self)
    }

    /// Checks the configuration without touching the filesystem.
    ///
    /// # Errors
    /// Returns [`Error::PropertyConfig`] for an out-of-range level or an
    /// empty dataset name.
    pub fn validate(&self) -> Result<()> {
        deflate_level(self.compression_level)?;
        if self.dataset.is_empty() {
            return Err(Error::PropertyConfig("dataset name is empty".to_string()));
        }
        Ok(())
    }
}

/// Outcome of a successful export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub dataset: String,
    pub kind: PixelKind,
    /// Declared extent of the written dataset (`tzyxc`).
    pub shape: VolumeShape,
    pub chunk: ChunkShape,
    pub slices_written: usize,
}

/// Streams `source` into a new container, one plane at a time.
///
/// # Errors
/// Every failure aborts the export, releases whatever was opened, and is
/// reported as [`Error::SessionFailed`] naming the target path, or as
/// [`Error::OutOfMemory`] if a slice buffer could not be allocated. A
/// partially written file is left on disk.
pub fn export_volume<S: VolumeSource>(source: &S, config: &ExportConfig) -> Result<ExportSummary> {
    run_export(source, config).map_err(|cause| {
        if matches!(cause, Error::SessionFailed { .. } | Error::OutOfMemory { .. }) {
            cause
        } else {
            let err = Error::for_session(&config.path, cause, Vec::new());
            error!("{err}");
            err
        }
    })
}

fn run_export<S: VolumeSource>(source: &S, config: &ExportConfig) -> Result<ExportSummary> {
    config.validate()?;
    let geometry = resolve_geometry(source.axes())?;
    let kind = detect_kind(source)?;

    info!("Export Dimensions in tzyxc: {}", geometry.output_shape(kind));
    let chunk = geometry.chunk_shape(kind);

    match kind {
        PixelKind::UInt8 => {
            write_volume(ScalarCodec::<_, u8>::new(source, &geometry), config, chunk)
        }
        PixelKind::UInt16 => {
            write_volume(ScalarCodec::<_, u16>::new(source, &geometry), config, chunk)
        }
        PixelKind::UInt32 => {
            write_volume(ScalarCodec::<_, u32>::new(source, &geometry), config, chunk)
        }
        PixelKind::Float32 => {
            write_volume(ScalarCodec::<_, f32>::new(source, &geometry), config, chunk)
        }
        PixelKind::PackedArgb32 => write_volume(ArgbCodec::new(source, &geometry)?, config, chunk),
    }
}

fn write_volume<C>(mut codec: C, config: &ExportConfig, chunk: ChunkShape) -> Result<ExportSummary>
where
    C: SliceCodec,
    C::Native: H5Type,
{
    let kind = codec.kind();
    let shape = codec.output_shape();
    info!("Writing {kind}");

    let session = ContainerSession::open(&config.path)?;
    let mut writer = ExtensibleWriter::<C::Native>::new(session, config.dataset.as_str(), shape);
    writer.arm(chunk, config.compression_level)?;

    for coord in shape.coordinates() {
        let buffer = match codec.extract(coord) {
            Ok(buffer) => buffer,
            Err(cause) => return Err(writer.abort(cause.into())),
        };
        writer.write_slice(coord, &buffer)?;
    }
    let slices_written = writer.finish()?;

    info!("compressionLevel: {}", config.compression_level);
    info!("Done");

    Ok(ExportSummary {
        path: config.path.clone(),
        dataset: config.dataset.clone(),
        kind,
        shape,
        chunk,
        slices_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ExportConfig::new("out.h5");
        assert_eq!(config.dataset, DEFAULT_DATASET);
        assert_eq!(config.compression_level, DEFAULT_COMPRESSION_LEVEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ExportConfig::new("out.h5")
            .with_dataset("exported_data")
            .with_compression_level(9);
        assert_eq!(config.dataset, "exported_data");
        assert_eq!(config.compression_level, 9);
    }

    #[test]
    fn test_try_with_compression_level() {
        assert!(ExportConfig::new("out.h5").try_with_compression_level(0).is_ok());
        assert!(matches!(
            ExportConfig::new("out.h5").try_with_compression_level(10),
            Err(Error::PropertyConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_dataset() {
        let config = ExportConfig::new("out.h5").with_dataset("");
        assert!(matches!(config.validate(), Err(Error::PropertyConfig(_))));
    }
}
