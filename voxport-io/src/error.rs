//! I/O error types.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] voxport_core::Error),

    /// The container file could not be created.
    #[error("cannot create container '{}': {source}", .path.display())]
    ContainerCreate {
        path: PathBuf,
        #[source]
        source: hdf5::Error,
    },

    /// Invalid chunking or compression settings.
    #[error("invalid dataset creation property: {0}")]
    PropertyConfig(String),

    /// The dataset could not be created.
    #[error("cannot create dataset '{name}': {source}")]
    DatasetCreate {
        name: String,
        #[source]
        source: hdf5::Error,
    },

    /// A native write, resize or selection call failed.
    #[error("{context} failed: {source}")]
    Write {
        context: String,
        #[source]
        source: hdf5::Error,
    },

    /// The writer was driven out of order or after it closed.
    #[error("invalid writer state: {0}")]
    InvalidState(String),

    /// Invalid raw volume layout.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Layout sidecar could not be parsed.
    #[error("layout parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// One or more handles failed to release.
    #[error("teardown failed:{}", list_causes(.0))]
    Teardown(Vec<Error>),

    /// A session aborted; names the target and the underlying cause.
    #[error("Error while saving '{}': {source}{}", .path.display(), teardown_note(.teardown))]
    SessionFailed {
        path: PathBuf,
        source: Box<Error>,
        teardown: Vec<Error>,
    },

    /// A slice buffer could not be allocated. Not retryable.
    #[error(
        "Out of Memory Error while saving '{}': slice buffer of {bytes} bytes{}",
        .path.display(),
        teardown_note(.teardown)
    )]
    OutOfMemory {
        path: PathBuf,
        bytes: usize,
        teardown: Vec<Error>,
    },
}

impl Error {
    /// Wraps a session failure with the target path and any teardown errors.
    ///
    /// Allocation failures are reported as [`Error::OutOfMemory`].
    #[must_use]
    pub fn for_session(path: &Path, cause: Error, teardown: Vec<Error>) -> Self {
        match cause {
            Error::CoreError(voxport_core::Error::OutOfMemory { bytes }) => Error::OutOfMemory {
                path: path.to_path_buf(),
                bytes,
                teardown,
            },
            already @ (Error::SessionFailed { .. } | Error::OutOfMemory { .. }) => already,
            cause => Error::SessionFailed {
                path: path.to_path_buf(),
                source: Box::new(cause),
                teardown,
            },
        }
    }

    /// Returns true for the distinct out-of-memory condition.
    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            Error::OutOfMemory { .. } | Error::CoreError(voxport_core::Error::OutOfMemory { .. })
        )
    }

    /// The underlying cause of a session failure, or `self`.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::SessionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

fn list_causes(errors: &[Error]) -> String {
    let mut out = String::new();
    for error in errors {
        let _ = write!(out, "\n  - {error}");
    }
    out
}

fn teardown_note(errors: &[Error]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(
            "\n({} handle(s) failed to close:{})",
            errors.len(),
            list_causes(errors)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_failure_names_path_and_cause() {
        let err = Error::for_session(
            Path::new("/tmp/out.h5"),
            Error::PropertyConfig("bad level".to_string()),
            Vec::new(),
        );
        let message = err.to_string();
        assert!(message.contains("/tmp/out.h5"));
        assert!(message.contains("bad level"));
        assert!(matches!(err.root_cause(), Error::PropertyConfig(_)));
    }

    #[test]
    fn test_out_of_memory_is_distinct() {
        let err = Error::for_session(
            Path::new("vol.h5"),
            voxport_core::Error::OutOfMemory { bytes: 64 }.into(),
            Vec::new(),
        );
        assert!(err.is_out_of_memory());
        assert!(matches!(err, Error::OutOfMemory { bytes: 64, .. }));
        assert!(err.to_string().starts_with("Out of Memory Error"));
    }

    #[test]
    fn test_teardown_failures_are_listed() {
        let err = Error::for_session(
            Path::new("vol.h5"),
            Error::InvalidState("boom".to_string()),
            vec![Error::InvalidState("close".to_string())],
        );
        let message = err.to_string();
        assert!(message.contains("1 handle(s) failed to close"));
        assert!(message.contains("close"));
    }

    #[test]
    fn test_wrapping_is_not_repeated() {
        let inner = Error::for_session(
            Path::new("a.h5"),
            Error::InvalidState("x".to_string()),
            Vec::new(),
        );
        let outer = Error::for_session(Path::new("a.h5"), inner, Vec::new());
        assert!(matches!(outer.root_cause(), Error::InvalidState(_)));
        match outer {
            Error::SessionFailed { source, .. } => {
                assert!(matches!(*source, Error::InvalidState(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
