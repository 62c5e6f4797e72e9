//! HDF5 container session.
//!
//! [`ContainerSession`] owns every live handle of one output container: the
//! file, the dataset creation properties and the dataset. Handles are held
//! as `Option`s so that [`ContainerSession::close`] can release them in a
//! fixed order, keep going past individual failures, and be called again
//! without effect. Dropping a session closes it.

use crate::{Error, Result};
use hdf5::types::H5Type;
use hdf5::{Dataset, Dataspace, File};
use log::{debug, info, warn};
use ndarray::{s, ArrayView};
use std::path::{Path, PathBuf};
use voxport_core::ChunkShape;

/// Highest deflate level accepted by the container.
pub const MAX_DEFLATE_LEVEL: u8 = 9;

/// Validates a deflate level.
///
/// # Errors
/// Returns [`Error::PropertyConfig`] unless `0 <= level <= 9`.
pub fn deflate_level(level: i32) -> Result<u8> {
    u8::try_from(level)
        .ok()
        .filter(|level| *level <= MAX_DEFLATE_LEVEL)
        .ok_or_else(|| {
            Error::PropertyConfig(format!(
                "compression level {level} outside [0, {MAX_DEFLATE_LEVEL}]"
            ))
        })
}

/// Chunking and compression applied when the dataset is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreationProperties {
    pub chunk: ChunkShape,
    pub deflate: u8,
}

/// A rectangular block of the dataset's current extent, selected for
/// exactly one write.
pub struct HyperslabSelection {
    space: Dataspace,
    offset: [usize; 5],
    block: [usize; 5],
}

impl HyperslabSelection {
    /// Extent of the dataspace the block was selected from.
    #[must_use]
    pub fn extent(&self) -> Vec<usize> {
        self.space.shape()
    }
}

/// Owner of one container file and the dataset inside it.
pub struct ContainerSession {
    path: PathBuf,
    file: Option<File>,
    properties: Option<CreationProperties>,
    dataset: Option<Dataset>,
}

impl ContainerSession {
    /// Creates the container at `path`, truncating any existing file.
    ///
    /// # Errors
    /// Returns [`Error::ContainerCreate`] if the file cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| Error::ContainerCreate {
            path: path.clone(),
            source,
        })?;
        info!("Created container '{}'", path.display());
        Ok(Self {
            path,
            file: Some(file),
            properties: None,
            dataset: None,
        })
    }

    /// Target path of this session.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true while the file handle is live.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Creation properties, once configured.
    #[must_use]
    pub fn properties(&self) -> Option<&CreationProperties> {
        self.properties.as_ref()
    }

    /// Current declared extent of the dataset, once created.
    #[must_use]
    pub fn dataset_shape(&self) -> Option<Vec<usize>> {
        self.dataset.as_ref().map(|dataset| dataset.shape())
    }

    /// Sets the chunk shape and deflate level for the dataset.
    ///
    /// # Errors
    /// Returns [`Error::PropertyConfig`] for a level outside `[0, 9]` or if
    /// the dataset already exists, and [`Error::InvalidState`] after close.
    pub fn configure_chunking(&mut self, chunk: ChunkShape, compression_level: i32) -> Result<()> {
        self.file()?;
        let deflate = deflate_level(compression_level)?;
        if self.dataset.is_some() {
            return Err(Error::PropertyConfig(
                "creation properties cannot change after the dataset exists".to_string(),
            ));
        }
        self.properties = Some(CreationProperties { chunk, deflate });
        Ok(())
    }

    /// Creates the dataset with extent `initial`, growable without bound
    /// along every axis.
    ///
    /// # Errors
    /// Returns [`Error::PropertyConfig`] if chunking was never configured and
    /// [`Error::DatasetCreate`] if the container rejects the dataset.
    pub fn create_dataset<T: H5Type>(&mut self, name: &str, initial: [usize; 5]) -> Result<()> {
        let properties = self.properties.ok_or_else(|| {
            Error::PropertyConfig("chunking must be configured before the dataset".to_string())
        })?;
        if self.dataset.is_some() {
            return Err(Error::InvalidState(format!(
                "dataset already created in '{}'",
                self.path.display()
            )));
        }
        let file = self.file()?;

        let [t, z, y, x, c] = initial;
        let dataset = file
            .new_dataset::<T>()
            .shape((t.., z.., y.., x.., c..))
            .chunk(properties.chunk.dims())
            .deflate(properties.deflate)
            .create(name)
            .map_err(|source| Error::DatasetCreate {
                name: name.to_string(),
                source,
            })?;

        debug!(
            "Created dataset '{name}' with extent {initial:?}, chunk {}",
            properties.chunk
        );
        self.dataset = Some(dataset);
        Ok(())
    }

    /// Extends the dataset's declared extent in place.
    ///
    /// # Errors
    /// Returns [`Error::Write`] if the resize fails.
    pub fn grow_extent(&mut self, extent: [usize; 5]) -> Result<()> {
        let [t, z, y, x, c] = extent;
        self.dataset()?
            .resize((t, z, y, x, c))
            .map_err(|source| Error::Write {
                context: "extending dataset".to_string(),
                source,
            })
    }

    /// Opens a fresh view of the dataset's current extent restricted to the
    /// block at `offset`.
    ///
    /// # Errors
    /// Returns [`Error::Write`] if the dataspace cannot be opened and
    /// [`Error::InvalidState`] if the block exceeds the current extent.
    pub fn select_hyperslab(
        &self,
        offset: [usize; 5],
        block: [usize; 5],
    ) -> Result<HyperslabSelection> {
        let space = self.dataset()?.space().map_err(|source| Error::Write {
            context: "opening dataspace".to_string(),
            source,
        })?;
        let extent = space.shape();
        let fits = extent.len() == 5
            && offset
                .iter()
                .zip(&block)
                .zip(&extent)
                .all(|((start, len), dim)| start + len <= *dim);
        if !fits {
            return Err(Error::InvalidState(format!(
                "block {block:?} at {offset:?} exceeds extent {extent:?}"
            )));
        }
        Ok(HyperslabSelection {
            space,
            offset,
            block,
        })
    }

    /// Writes `data` over the whole current extent, which must equal `block`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] on a shape mismatch and
    /// [`Error::Write`] if the write fails.
    pub fn write_full<T: H5Type>(&self, block: [usize; 5], data: &[T]) -> Result<()> {
        let dataset = self.dataset()?;
        let extent = dataset.shape();
        if extent.as_slice() != block.as_slice() {
            return Err(Error::InvalidState(format!(
                "direct write of {block:?} into extent {extent:?}"
            )));
        }
        let view = block_view(block, data)?;
        dataset.write(view).map_err(|source| Error::Write {
            context: "writing first slice".to_string(),
            source,
        })
    }

    /// Writes `data` into the selected block, consuming the selection.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] on a shape mismatch and
    /// [`Error::Write`] if the write fails.
    pub fn write_block<T: H5Type>(&self, selection: HyperslabSelection, data: &[T]) -> Result<()> {
        let dataset = self.dataset()?;
        let view = block_view(selection.block, data)?;
        let [o0, o1, o2, o3, o4] = selection.offset;
        let [b0, b1, b2, b3, b4] = selection.block;
        debug!("Writing block {:?} at {:?}", selection.block, selection.offset);
        dataset
            .write_slice(
                view,
                s![
                    o0..o0 + b0,
                    o1..o1 + b1,
                    o2..o2 + b2,
                    o3..o3 + b3,
                    o4..o4 + b4
                ],
            )
            .map_err(|source| Error::Write {
                context: format!("writing block at {:?}", selection.offset),
                source,
            })
    }

    /// Flushes buffered data to disk.
    ///
    /// # Errors
    /// Returns [`Error::Write`] if the flush fails and
    /// [`Error::InvalidState`] after close.
    pub fn flush(&self) -> Result<()> {
        self.file()?.flush().map_err(|source| Error::Write {
            context: "flushing container".to_string(),
            source,
        })
    }

    /// Releases every live handle: creation properties, dataset, then file.
    ///
    /// Each release is attempted even if an earlier one failed.
    ///
    /// # Errors
    /// Returns [`Error::Teardown`] listing every failure.
    pub fn close(&mut self) -> Result<()> {
        let failures = self.close_collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown(failures))
        }
    }

    /// Like [`Self::close`], returning the individual failures.
    pub fn close_collect(&mut self) -> Vec<Error> {
        let mut failures = Vec::new();

        if self.properties.take().is_some() {
            debug!("Released creation properties");
        }
        if let Some(dataset) = self.dataset.take() {
            drop(dataset);
            debug!("Released dataset");
        }
        if let Some(file) = self.file.take() {
            if let Err(source) = file.flush() {
                warn!("Flushing '{}' failed: {source}", self.path.display());
                failures.push(Error::Write {
                    context: "flushing container".to_string(),
                    source,
                });
            }
            if let Err(source) = file.close() {
                warn!("Closing '{}' failed: {source}", self.path.display());
                failures.push(Error::Write {
                    context: "closing container".to_string(),
                    source,
                });
            }
        }

        failures
    }

    fn file(&self) -> Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::InvalidState(format!("'{}' is closed", self.path.display())))
    }

    fn dataset(&self) -> Result<&Dataset> {
        self.dataset.as_ref().ok_or_else(|| {
            Error::InvalidState(format!("no active dataset in '{}'", self.path.display()))
        })
    }
}

impl Drop for ContainerSession {
    fn drop(&mut self) {
        for failure in self.close_collect() {
            warn!("Teardown of '{}': {failure}", self.path.display());
        }
    }
}

impl std::fmt::Debug for HyperslabSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperslabSelection")
            .field("offset", &self.offset)
            .field("block", &self.block)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ContainerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerSession")
            .field("path", &self.path)
            .field("file", &self.file.is_some())
            .field("properties", &self.properties)
            .field("dataset", &self.dataset.is_some())
            .finish()
    }
}

fn block_view<T>(block: [usize; 5], data: &[T]) -> Result<ArrayView<'_, T, ndarray::Ix5>> {
    ArrayView::from_shape(block, data).map_err(|e| {
        Error::InvalidState(format!(
            "buffer of {} samples does not match block {block:?}: {e}",
            data.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use voxport_core::VolumeShape;

    fn chunk() -> ChunkShape {
        ChunkShape::for_volume(&VolumeShape::new(2, 1, 2, 2, 1))
    }

    #[test]
    fn test_deflate_level_bounds() {
        assert_eq!(deflate_level(0).unwrap(), 0);
        assert_eq!(deflate_level(9).unwrap(), 9);
        assert!(matches!(deflate_level(10), Err(Error::PropertyConfig(_))));
        assert!(matches!(deflate_level(-1), Err(Error::PropertyConfig(_))));
    }

    #[test]
    fn test_open_invalid_path() {
        let err = ContainerSession::open("/nonexistent-dir/sub/out.h5").unwrap_err();
        assert!(matches!(err, Error::ContainerCreate { .. }));
    }

    #[test]
    fn test_dataset_requires_chunking() {
        let file = NamedTempFile::new().unwrap();
        let mut session = ContainerSession::open(file.path()).unwrap();
        let err = session
            .create_dataset::<u8>("data", [1, 1, 2, 2, 1])
            .unwrap_err();
        assert!(matches!(err, Error::PropertyConfig(_)));
    }

    #[test]
    fn test_grow_then_select() {
        let file = NamedTempFile::new().unwrap();
        let mut session = ContainerSession::open(file.path()).unwrap();
        session.configure_chunking(chunk(), 3).unwrap();
        session
            .create_dataset::<u16>("data", [1, 1, 2, 2, 1])
            .unwrap();
        session.write_full([1, 1, 2, 2, 1], &[1u16, 2, 3, 4]).unwrap();
        session.grow_extent([2, 1, 2, 2, 1]).unwrap();
        assert_eq!(session.dataset_shape().unwrap(), vec![2, 1, 2, 2, 1]);

        let selection = session
            .select_hyperslab([1, 0, 0, 0, 0], [1, 1, 2, 2, 1])
            .unwrap();
        assert_eq!(selection.extent(), vec![2, 1, 2, 2, 1]);
        session.write_block(selection, &[5u16, 6, 7, 8]).unwrap();

        let out_of_range = session.select_hyperslab([2, 0, 0, 0, 0], [1, 1, 2, 2, 1]);
        assert!(matches!(out_of_range, Err(Error::InvalidState(_))));
        session.close().unwrap();
    }

    #[test]
    fn test_write_full_checks_extent() {
        let file = NamedTempFile::new().unwrap();
        let mut session = ContainerSession::open(file.path()).unwrap();
        session.configure_chunking(chunk(), 0).unwrap();
        session.create_dataset::<u8>("data", [1, 1, 2, 2, 1]).unwrap();
        let err = session.write_full([1, 1, 2, 1, 1], &[1u8, 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let file = NamedTempFile::new().unwrap();
        let mut session = ContainerSession::open(file.path()).unwrap();
        session.configure_chunking(chunk(), 1).unwrap();
        session.create_dataset::<f32>("data", [1, 1, 2, 2, 1]).unwrap();

        session.close().unwrap();
        assert!(!session.is_open());
        session.close().unwrap();
        assert!(session.close_collect().is_empty());

        let err = session.grow_extent([2, 1, 2, 2, 1]).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_dataset_name_taken_is_create_error() {
        let file = NamedTempFile::new().unwrap();
        let mut session = ContainerSession::open(file.path()).unwrap();
        session.file().unwrap().create_group("data").unwrap();
        session.configure_chunking(chunk(), 1).unwrap();
        let err = session
            .create_dataset::<u8>("data", [1, 1, 2, 2, 1])
            .unwrap_err();
        match err {
            Error::DatasetCreate { name, .. } => assert_eq!(name, "data"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(session.dataset_shape().is_none());
    }

    #[test]
    fn test_flush_requires_open_file() {
        let file = NamedTempFile::new().unwrap();
        let mut session = ContainerSession::open(file.path()).unwrap();
        session.flush().unwrap();
        session.close().unwrap();
        assert!(matches!(session.flush(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_properties_fixed_after_dataset() {
        let file = NamedTempFile::new().unwrap();
        let mut session = ContainerSession::open(file.path()).unwrap();
        session.configure_chunking(chunk(), 1).unwrap();
        session.create_dataset::<u8>("data", [1, 1, 2, 2, 1]).unwrap();
        let err = session.configure_chunking(chunk(), 2).unwrap_err();
        assert!(matches!(err, Error::PropertyConfig(_)));
    }
}
