//! voxport-io: HDF5 container writing and raw volume sources for voxport.
//!
//! [`export_volume`] streams any [`voxport_core::VolumeSource`] into a
//! chunked, deflate-compressed, resizable dataset one plane at a time.
//! [`RawVolume`] exposes memory-mapped raw files as such a source.
//!

mod error;
pub mod export;
pub mod raw;
pub mod session;
pub mod writer;

pub use error::{Error, Result};
pub use export::{
    export_volume, ExportConfig, ExportSummary, DEFAULT_COMPRESSION_LEVEL, DEFAULT_DATASET,
};
pub use raw::{RawAxis, RawCursor, RawDtype, RawLayout, RawVolume};
pub use session::{
    deflate_level, ContainerSession, CreationProperties, HyperslabSelection, MAX_DEFLATE_LEVEL,
};
pub use writer::{ExtensibleWriter, WriterState};
