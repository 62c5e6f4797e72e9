//! Slice-by-slice dataset writer.
//!
//! The dataset starts out holding a single plane. The first plane is written
//! straight over that extent, the dataset is then grown to the full volume,
//! and every later plane goes through a hyperslab selection at
//! `(t, z, 0, 0, c)`.

use crate::session::ContainerSession;
use crate::{Error, Result};
use hdf5::types::H5Type;
use log::{debug, error};
use std::marker::PhantomData;
use std::path::Path;
use voxport_core::{ChunkShape, NativeSample, SliceBuffer, SliceCoordinate, VolumeShape};

/// Lifecycle of an [`ExtensibleWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    /// No dataset yet.
    Uninitialized,
    /// Dataset created with a one-plane extent; waiting for the first plane.
    Armed,
    /// First plane stored; extent not yet grown.
    FirstSliceWritten,
    /// Extent growth in progress.
    Growing,
    /// Full extent declared; planes go through hyperslab selections.
    SteadyState,
    /// Session released, either after success or after a failure.
    Closed,
}

/// Grows a dataset one plane at a time.
///
/// Planes must arrive in `t`, `z`, `c` nesting order starting at the
/// origin. Any failure closes the session and is reported with the target
/// path.
#[derive(Debug)]
pub struct ExtensibleWriter<T> {
    session: ContainerSession,
    dataset: String,
    shape: VolumeShape,
    state: WriterState,
    next: Option<SliceCoordinate>,
    written: usize,
    _native: PhantomData<T>,
}

impl<T> ExtensibleWriter<T>
where
    T: NativeSample + H5Type,
{
    /// Prepares a writer for a volume of `shape` stored as `dataset`.
    pub fn new(session: ContainerSession, dataset: impl Into<String>, shape: VolumeShape) -> Self {
        Self {
            session,
            dataset: dataset.into(),
            shape,
            state: WriterState::Uninitialized,
            next: shape.coordinates().next(),
            written: 0,
            _native: PhantomData,
        }
    }

    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }

    #[must_use]
    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    /// Number of planes written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    #[must_use]
    pub fn session(&self) -> &ContainerSession {
        &self.session
    }

    /// Configures chunking and creates the dataset with extent
    /// `(1, 1, Y, X, 1)` and unlimited maximum extent.
    ///
    /// # Errors
    /// Returns the session failure (the session is closed first).
    pub fn arm(&mut self, chunk: ChunkShape, compression_level: i32) -> Result<()> {
        if self.state != WriterState::Uninitialized {
            let cause = Error::InvalidState(format!("cannot arm writer in state {:?}", self.state));
            return Err(self.abort(cause));
        }
        let initial = self.shape.slice_block();
        let created = self
            .session
            .configure_chunking(chunk, compression_level)
            .and_then(|()| self.session.create_dataset::<T>(&self.dataset, initial));
        match created {
            Ok(()) => {
                self.state = WriterState::Armed;
                Ok(())
            }
            Err(cause) => Err(self.abort(cause)),
        }
    }

    /// Writes the plane at `coord`.
    ///
    /// # Errors
    /// Returns the session failure (the session is closed first) if the
    /// writer is not armed, `coord` is out of order, the buffer has the wrong
    /// size, or a native call fails.
    pub fn write_slice(&mut self, coord: SliceCoordinate, buffer: &SliceBuffer<T>) -> Result<()> {
        match self.write_inner(coord, buffer) {
            Ok(()) => Ok(()),
            Err(cause) => Err(self.abort(cause)),
        }
    }

    fn write_inner(&mut self, coord: SliceCoordinate, buffer: &SliceBuffer<T>) -> Result<()> {
        match self.state {
            WriterState::Armed | WriterState::SteadyState => {}
            state => {
                return Err(Error::InvalidState(format!(
                    "cannot write slice {coord} in state {state:?}"
                )))
            }
        }
        if self.next != Some(coord) {
            return Err(Error::InvalidState(match self.next {
                Some(expected) => {
                    format!("slice {coord} written out of order, expected {expected}")
                }
                None => format!("slice {coord} beyond volume {}", self.shape),
            }));
        }
        if buffer.rows() != self.shape.y || buffer.cols() != self.shape.x {
            return Err(Error::InvalidState(format!(
                "slice of {}x{} samples for a {}x{} plane",
                buffer.rows(),
                buffer.cols(),
                self.shape.y,
                self.shape.x
            )));
        }

        let block = self.shape.slice_block();
        if self.state == WriterState::Armed {
            self.session.write_full(block, buffer.as_slice())?;
            self.state = WriterState::FirstSliceWritten;

            self.state = WriterState::Growing;
            self.session.grow_extent(self.shape.dims())?;
            debug!("Extended '{}' to {}", self.dataset, self.shape);
            self.state = WriterState::SteadyState;
        } else {
            let selection = self.session.select_hyperslab(coord.offset(), block)?;
            self.session.write_block(selection, buffer.as_slice())?;
        }

        self.written += 1;
        self.next = coord.successor(&self.shape);
        Ok(())
    }

    /// Flushes and closes the session after every plane has been written.
    ///
    /// Returns the number of planes written.
    ///
    /// # Errors
    /// Returns the session failure if planes are missing or the container
    /// fails to flush.
    pub fn finish(mut self) -> Result<usize> {
        if self.state != WriterState::SteadyState || self.next.is_some() {
            let cause = Error::InvalidState(format!(
                "{} of {} slices written",
                self.written,
                self.shape.slice_count()
            ));
            return Err(self.abort(cause));
        }
        self.state = WriterState::Closed;
        let flushed = self.session.flush();
        let released = self.session.close_collect();
        settle(self.session.path(), self.written, flushed, released)
    }

    /// Closes the session after a failure and wraps `cause` with the target
    /// path and any teardown failures.
    pub fn abort(&mut self, cause: Error) -> Error {
        self.state = WriterState::Closed;
        let teardown = self.session.close_collect();
        let err = Error::for_session(self.session.path(), cause, teardown);
        error!("{err}");
        err
    }

    /// Releases the session without further checks. Safe to repeat.
    ///
    /// # Errors
    /// Returns [`Error::Teardown`] listing release failures.
    pub fn close(&mut self) -> Result<()> {
        self.state = WriterState::Closed;
        self.session.close()
    }
}

/// Outcome of closing a complete write. A failed flush fails the session;
/// release failures were already logged by the session and are dropped.
fn settle(
    path: &Path,
    written: usize,
    flushed: Result<()>,
    released: Vec<Error>,
) -> Result<usize> {
    match flushed {
        Ok(()) => {
            if !released.is_empty() {
                debug!(
                    "'{}' complete; {} handle(s) failed to release",
                    path.display(),
                    released.len()
                );
            }
            Ok(written)
        }
        Err(cause) => {
            let err = Error::for_session(path, cause, released);
            error!("{err}");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn armed(path: &std::path::Path, shape: VolumeShape) -> ExtensibleWriter<u8> {
        let session = ContainerSession::open(path).unwrap();
        let mut writer = ExtensibleWriter::<u8>::new(session, "data", shape);
        writer.arm(ChunkShape::for_volume(&shape), 1).unwrap();
        writer
    }

    fn plane(value: u8, shape: &VolumeShape) -> SliceBuffer<u8> {
        SliceBuffer::try_filled(shape.y, shape.x, value).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let file = NamedTempFile::new().unwrap();
        let shape = VolumeShape::new(1, 2, 2, 2, 1);
        let session = ContainerSession::open(file.path()).unwrap();
        let mut writer = ExtensibleWriter::<u8>::new(session, "data", shape);
        assert_eq!(writer.state(), WriterState::Uninitialized);

        writer.arm(ChunkShape::for_volume(&shape), 1).unwrap();
        assert_eq!(writer.state(), WriterState::Armed);
        assert_eq!(writer.session().dataset_shape().unwrap(), vec![1, 1, 2, 2, 1]);

        writer
            .write_slice(SliceCoordinate::ORIGIN, &plane(1, &shape))
            .unwrap();
        assert_eq!(writer.state(), WriterState::SteadyState);
        assert_eq!(writer.session().dataset_shape().unwrap(), vec![1, 2, 2, 2, 1]);

        writer
            .write_slice(SliceCoordinate::new(0, 1, 0), &plane(2, &shape))
            .unwrap();
        assert_eq!(writer.finish().unwrap(), 2);
    }

    #[test]
    fn test_out_of_order_slice_aborts() {
        let file = NamedTempFile::new().unwrap();
        let shape = VolumeShape::new(2, 1, 2, 2, 2);
        let mut writer = armed(file.path(), shape);
        writer
            .write_slice(SliceCoordinate::ORIGIN, &plane(0, &shape))
            .unwrap();

        // Depth/time before channel is rejected.
        let err = writer
            .write_slice(SliceCoordinate::new(1, 0, 0), &plane(0, &shape))
            .unwrap_err();
        assert!(matches!(err.root_cause(), Error::InvalidState(_)));
        assert!(err.to_string().contains(&file.path().display().to_string()));
        assert_eq!(writer.state(), WriterState::Closed);
        assert!(!writer.session().is_open());
    }

    #[test]
    fn test_write_before_arm_rejected() {
        let file = NamedTempFile::new().unwrap();
        let shape = VolumeShape::new(1, 1, 2, 2, 1);
        let session = ContainerSession::open(file.path()).unwrap();
        let mut writer = ExtensibleWriter::<u8>::new(session, "data", shape);
        let err = writer
            .write_slice(SliceCoordinate::ORIGIN, &plane(0, &shape))
            .unwrap_err();
        assert!(matches!(err.root_cause(), Error::InvalidState(_)));
    }

    #[test]
    fn test_wrong_plane_size_rejected() {
        let file = NamedTempFile::new().unwrap();
        let shape = VolumeShape::new(1, 1, 2, 2, 1);
        let mut writer = armed(file.path(), shape);
        let small = SliceBuffer::try_filled(1, 2, 0u8).unwrap();
        let err = writer
            .write_slice(SliceCoordinate::ORIGIN, &small)
            .unwrap_err();
        assert!(matches!(err.root_cause(), Error::InvalidState(_)));
    }

    #[test]
    fn test_finish_with_missing_slices_fails() {
        let file = NamedTempFile::new().unwrap();
        let shape = VolumeShape::new(3, 1, 2, 2, 1);
        let mut writer = armed(file.path(), shape);
        writer
            .write_slice(SliceCoordinate::ORIGIN, &plane(0, &shape))
            .unwrap();
        let err = writer.finish().unwrap_err();
        assert!(err.to_string().contains("1 of 3 slices written"));
    }

    #[test]
    fn test_release_failures_after_complete_write_are_not_errors() {
        let released = vec![Error::InvalidState("dataset release".to_string())];
        let written = settle(Path::new("vol.h5"), 4, Ok(()), released).unwrap();
        assert_eq!(written, 4);
    }

    #[test]
    fn test_flush_failure_fails_complete_write() {
        let flushed = Err(Error::InvalidState("flush".to_string()));
        let released = vec![Error::InvalidState("close".to_string())];
        let err = settle(Path::new("vol.h5"), 4, flushed, released).unwrap_err();
        assert!(matches!(err.root_cause(), Error::InvalidState(_)));
        let message = err.to_string();
        assert!(message.contains("vol.h5"));
        assert!(message.contains("1 handle(s) failed to close"));
    }

    #[test]
    fn test_finish_closes_session() {
        let file = NamedTempFile::new().unwrap();
        let shape = VolumeShape::new(1, 1, 2, 2, 1);
        let mut writer = armed(file.path(), shape);
        writer
            .write_slice(SliceCoordinate::ORIGIN, &plane(3, &shape))
            .unwrap();
        assert_eq!(writer.finish().unwrap(), 1);
        let stored = hdf5::File::open(file.path()).unwrap().dataset("data").unwrap();
        assert_eq!(stored.read_raw::<u8>().unwrap(), vec![3; 4]);
    }

    #[test]
    fn test_close_after_abort_is_quiet() {
        let file = NamedTempFile::new().unwrap();
        let shape = VolumeShape::new(1, 1, 2, 2, 1);
        let mut writer = armed(file.path(), shape);
        let _ = writer.abort(Error::InvalidState("simulated".to_string()));
        writer.close().unwrap();
        writer.close().unwrap();
        assert_eq!(writer.state(), WriterState::Closed);
    }
}
