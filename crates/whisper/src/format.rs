//! On-disk record layouts for whisper database files.
//!
//! A whisper file is a header followed by a fixed number of ring-buffer
//! archives. All integers are big-endian; floats are IEEE-754 big-endian.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Metadata (16 bytes)                                         │
//! │  - Aggregation type: u32 (1=average 2=sum 3=last 4=max 5=min)│
//! │  - Max retention: u32 (seconds)                              │
//! │  - X-files factor: f32 (in [0.0, 1.0])                       │
//! │  - Archive count: u32 (>= 1)                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Archive descriptors (12 bytes each, finest-first)           │
//! │  - Offset: u32 (absolute byte offset of the archive region)  │
//! │  - Seconds per point: u32                                    │
//! │  - Points: u32                                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Archive regions (12 bytes per point, no padding)            │
//! │  - Interval: u32 (epoch seconds, 0 = slot unwritten)         │
//! │  - Value: f64                                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each archive region is a circular buffer addressed by base-point
//! arithmetic: the interval recorded at the region's first slot anchors
//! the physical location of every other slot.

use crate::aggregation::AggregationMethod;
use crate::error::{Result, WhisperError};
use std::io::{Read, Seek, SeekFrom, Write};

/// Metadata header size in bytes.
pub const METADATA_SIZE: usize = 16;

/// Archive descriptor size in bytes.
pub const ARCHIVE_INFO_SIZE: usize = 12;

/// Point record size in bytes.
pub const POINT_SIZE: usize = 12;

/// File-level metadata (16 bytes at offset 0).
///
/// Written once at create time and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metadata {
    /// Raw aggregation code. Codes 1-5 name the known methods; 0 is
    /// reserved and never written to new files, but a file carrying it
    /// still decodes.
    pub aggregation_code: u32,
    /// Retention of the coarsest archive, in seconds.
    pub max_retention: u32,
    /// Minimum fraction of known finer points required to write a
    /// downsampled point.
    pub x_files_factor: f32,
    /// Number of archive descriptors following the metadata.
    pub archive_count: u32,
}

impl Metadata {
    /// Resolves the raw aggregation code to a method.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::InvalidAggregationMethod` if the code is
    /// not one of the five known methods.
    pub fn aggregation(&self) -> Result<AggregationMethod> {
        AggregationMethod::from_u32(self.aggregation_code)
            .ok_or(WhisperError::InvalidAggregationMethod(self.aggregation_code))
    }

    /// Writes the metadata to a writer using big-endian byte order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Aggregation type (4 bytes)
        writer.write_all(&self.aggregation_code.to_be_bytes())?;
        // Max retention (4 bytes)
        writer.write_all(&self.max_retention.to_be_bytes())?;
        // X-files factor (4 bytes)
        writer.write_all(&self.x_files_factor.to_be_bytes())?;
        // Archive count (4 bytes)
        writer.write_all(&self.archive_count.to_be_bytes())?;

        Ok(())
    }

    /// Reads metadata from a reader using big-endian byte order.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; METADATA_SIZE];
        reader.read_exact(&mut buf)?;

        // Aggregation type (4 bytes)
        let aggregation_code = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        // Max retention (4 bytes)
        let max_retention = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        // X-files factor (4 bytes)
        let x_files_factor = f32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        // Archive count (4 bytes)
        let archive_count = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);

        Ok(Self {
            aggregation_code,
            max_retention,
            x_files_factor,
            archive_count,
        })
    }
}

/// Archive descriptor (12 bytes, one per archive, immediately after the
/// metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Absolute byte offset of the archive's first point.
    pub offset: u32,
    /// Temporal step of the archive, in seconds.
    pub seconds_per_point: u32,
    /// Capacity of the archive, in points.
    pub points: u32,
}

impl ArchiveInfo {
    /// Returns the window of time this archive can represent, in seconds.
    pub fn retention(&self) -> u64 {
        self.seconds_per_point as u64 * self.points as u64
    }

    /// Returns the archive region's size in bytes.
    pub fn size(&self) -> u64 {
        self.points as u64 * POINT_SIZE as u64
    }

    /// Returns the byte offset one past the archive region's last point.
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.size()
    }

    /// Quantizes a timestamp to this archive's step.
    pub fn interval_for(&self, timestamp: u32) -> u32 {
        timestamp - timestamp % self.seconds_per_point
    }

    /// Returns the absolute byte offset of the slot holding `interval`,
    /// given the archive's current base interval.
    ///
    /// An empty archive (base interval 0) anchors at the region start:
    /// the first write establishes the base at its own slot. The delta
    /// is reduced with a mathematical modulo so intervals on either side
    /// of the base land inside the region.
    pub fn slot_offset(&self, base_interval: u32, interval: u32) -> u64 {
        if base_interval == 0 {
            return self.offset as u64;
        }
        let point_delta =
            (interval as i64 - base_interval as i64) / self.seconds_per_point as i64;
        let byte_delta = point_delta * POINT_SIZE as i64;
        self.offset as u64 + byte_delta.rem_euclid(self.size() as i64) as u64
    }

    /// Writes the descriptor to a writer using big-endian byte order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Offset (4 bytes)
        writer.write_all(&self.offset.to_be_bytes())?;
        // Seconds per point (4 bytes)
        writer.write_all(&self.seconds_per_point.to_be_bytes())?;
        // Points (4 bytes)
        writer.write_all(&self.points.to_be_bytes())?;

        Ok(())
    }

    /// Reads a descriptor from a reader using big-endian byte order.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; ARCHIVE_INFO_SIZE];
        reader.read_exact(&mut buf)?;

        // Offset (4 bytes)
        let offset = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        // Seconds per point (4 bytes)
        let seconds_per_point = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        // Points (4 bytes)
        let points = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        Ok(Self {
            offset,
            seconds_per_point,
            points,
        })
    }
}

/// One archive slot (12 bytes): a quantized interval and its value.
///
/// An interval of 0 marks the slot as unwritten; any non-zero interval
/// is authoritative. Decoding is total: every 12-byte buffer is a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Quantized timestamp in epoch seconds, or 0 for an unwritten slot.
    pub interval: u32,
    /// The recorded value.
    pub value: f64,
}

impl Point {
    /// Encodes the point as 12 big-endian bytes.
    pub fn to_bytes(self) -> [u8; POINT_SIZE] {
        let mut buf = [0u8; POINT_SIZE];
        buf[0..4].copy_from_slice(&self.interval.to_be_bytes());
        buf[4..12].copy_from_slice(&self.value.to_be_bytes());
        buf
    }

    /// Decodes a point from 12 big-endian bytes. Never fails.
    pub fn from_bytes(buf: [u8; POINT_SIZE]) -> Self {
        let interval = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let value = f64::from_be_bytes([
            buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
        ]);
        Self { interval, value }
    }

    /// Writes the point to a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reads a point from a reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; POINT_SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self::from_bytes(buf))
    }
}

/// Decodes a byte buffer as a sequence of points.
///
/// Trailing bytes short of a full record are ignored.
pub fn decode_points(buf: &[u8]) -> impl Iterator<Item = Point> + '_ {
    buf.chunks_exact(POINT_SIZE).map(|chunk| {
        let mut bytes = [0u8; POINT_SIZE];
        bytes.copy_from_slice(chunk);
        Point::from_bytes(bytes)
    })
}

/// The decoded header of a whisper file: metadata plus all archive
/// descriptors, in file-declared (finest-first) order.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// File-level metadata.
    pub metadata: Metadata,
    /// Archive descriptors in declared order.
    pub archives: Vec<ArchiveInfo>,
}

impl Header {
    /// Reads the header from the start of a container, preserving the
    /// caller's position.
    ///
    /// # Errors
    ///
    /// Any I/O or decode failure is wrapped as `WhisperError::CorruptFile`.
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let saved = reader
            .stream_position()
            .map_err(|err| WhisperError::CorruptFile(err.to_string()))?;
        let header = Self::read_at_start(reader);
        reader
            .seek(SeekFrom::Start(saved))
            .map_err(|err| WhisperError::CorruptFile(err.to_string()))?;
        header
    }

    fn read_at_start<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|err| WhisperError::CorruptFile(err.to_string()))?;

        let metadata = Metadata::read_from(reader)
            .map_err(|err| WhisperError::CorruptFile(err.to_string()))?;
        if metadata.archive_count == 0 {
            return Err(WhisperError::CorruptFile(
                "archive count is zero".to_string(),
            ));
        }

        let mut archives = Vec::new();
        for index in 0..metadata.archive_count {
            let info = ArchiveInfo::read_from(reader)
                .map_err(|err| WhisperError::CorruptFile(err.to_string()))?;
            if info.seconds_per_point == 0 || info.points == 0 {
                return Err(WhisperError::CorruptFile(format!(
                    "archive {index} has zero precision or zero points"
                )));
            }
            archives.push(info);
        }

        Ok(Self { metadata, archives })
    }
}
