//! Whisper - fixed-size round-robin time-series database files.
//!
//! This crate implements the Graphite Whisper file format and the engine
//! that creates, reads, updates, and downsamples such files. Each file
//! stores one metric as a 16-byte header plus N ring-buffer archives of
//! increasing coarseness; writes into the finest archive cascade into the
//! coarser ones, gated by the file's x-files factor.
//!
//! # Components
//!
//! - [`format`]: the big-endian record layouts (metadata, archive
//!   descriptors, points) and the header reader
//! - [`retention`]: the `"30s:7d"` retention syntax and the archive list
//!   validator
//! - [`aggregation`]: the five consolidation methods
//! - [`file`]: the [`WhisperFile`] handle with create / open / fetch /
//!   update / propagation
//!
//! # Example
//!
//! ```rust,ignore
//! use whisper::{CreateOptions, Retention, WhisperFile};
//!
//! // One hour at minute resolution, two hours at 5-minute resolution.
//! let archives = [Retention::new(60, 60), Retention::new(300, 24)];
//! let mut db = WhisperFile::create("cpu.wsp", &archives, &CreateOptions::default())?;
//!
//! db.update(0.75, None)?;
//!
//! let result = db.fetch(now - 600, None)?;
//! for (i, value) in result.values.iter().enumerate() {
//!     let t = result.time_info.from_interval + i as u32 * result.time_info.step;
//!     println!("{t}: {value:?}");
//! }
//! ```

#![deny(missing_docs)]

pub mod aggregation;
pub mod error;
pub mod file;
pub mod format;
pub mod retention;

pub use aggregation::{aggregate, AggregationMethod};
pub use error::{Result, WhisperError};
pub use file::{ArchiveView, CreateOptions, FetchResult, TimeInfo, UpdateArg, WhisperFile};
pub use format::{ArchiveInfo, Header, Metadata, Point};
pub use retention::{parse_retention_def, validate_archive_list, Retention};
