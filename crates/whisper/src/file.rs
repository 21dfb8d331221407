//! The whisper database engine: create, open, fetch, update, propagate.
//!
//! A [`WhisperFile`] owns a random-access byte container (a real file, or
//! any `Read + Write + Seek` type such as an in-memory cursor) and the
//! decoded header. All operations address slots through base-point
//! arithmetic on the archive rings; writes into the finest covering
//! archive cascade into coarser archives through the propagation engine.
//!
//! ## Control Flow
//!
//! ```text
//! create ──► validate options ──► validate archives ──► write header
//!            ──► reserve regions (dense or sparse) ──► flush
//!
//! update ──► select finest covering archive ──► write slot
//!            ──► propagate into each coarser archive until one
//!                reports "not enough data"
//!
//! fetch  ──► select finest archive spanning the window ──► ranged
//!            ring read ──► dense values with unknown holes
//! ```

use crate::aggregation::{aggregate, AggregationMethod};
use crate::error::{Result, WhisperError};
use crate::format::{
    decode_points, ArchiveInfo, Header, Metadata, Point, ARCHIVE_INFO_SIZE, METADATA_SIZE,
    POINT_SIZE,
};
use crate::retention::{validate_archive_list, Retention};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Chunk size for the dense zero-fill loop at create time.
const ZERO_FILL_CHUNK: usize = 16 * 1024;

/// Options accepted when creating a new whisper file.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Minimum fraction of known points required to propagate a
    /// downsampled value, in [0.0, 1.0].
    pub x_files_factor: f32,
    /// How finer points are consolidated into coarser ones.
    pub aggregation: AggregationMethod,
    /// Reserve archive regions with a sparse seek instead of writing
    /// zeros densely.
    pub sparse: bool,
    /// Replace an existing file instead of failing.
    pub overwrite: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            x_files_factor: 0.5,
            aggregation: AggregationMethod::Average,
            sparse: false,
            overwrite: false,
        }
    }
}

/// The time bounds and step of a fetched series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInfo {
    /// First slot boundary of the result (inclusive).
    pub from_interval: u32,
    /// Last slot boundary of the result (exclusive).
    pub until_interval: u32,
    /// Seconds between consecutive values.
    pub step: u32,
}

/// A dense fetched series; `None` marks slots with no recorded value.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// The window the values cover.
    pub time_info: TimeInfo,
    /// One entry per step, `None` where the slot holds no matching point.
    pub values: Vec<Option<f64>>,
}

/// One argument of the legacy flat update surface: a bare number or a
/// nested list of numbers, interleaving timestamps and values.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateArg {
    /// A single timestamp or value.
    Num(f64),
    /// A nested list of interleaved timestamps and values.
    List(Vec<f64>),
}

/// An open whisper database over a random-access byte container.
///
/// The handle owns its container; [`WhisperFile::close`] releases it and
/// every later operation fails with an I/O error.
#[derive(Debug)]
pub struct WhisperFile<C = File> {
    container: Option<C>,
    header: Header,
    auto_flush: bool,
}

impl WhisperFile<File> {
    /// Creates a new whisper file at `path` and returns an open handle.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::InvalidConfiguration` for a bad option or
    /// archive list, or when `path` exists and `overwrite` is not set.
    pub fn create<P: AsRef<Path>>(
        path: P,
        archives: &[Retention],
        options: &CreateOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        validate_options(options)?;
        validate_archive_list(archives)?;
        if path.exists() {
            if !options.overwrite {
                return Err(WhisperError::InvalidConfiguration(format!(
                    "file {} already exists",
                    path.display()
                )));
            }
            warn!("Overwriting existing whisper file {}", path.display());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let db = Self::create_in(file, archives, options)?;
        if let Some(file) = db.container.as_ref() {
            // Durability at create time is best effort.
            let _ = file.sync_all();
        }
        debug!(
            "Created whisper file {} with {} archives",
            path.display(),
            archives.len()
        );
        Ok(db)
    }

    /// Opens an existing whisper file read-write.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::Io` if the file cannot be opened and
    /// `WhisperError::CorruptFile` if its header does not decode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let header = Header::read_from(&mut file)?;
        Ok(Self {
            container: Some(file),
            header,
            auto_flush: false,
        })
    }
}

impl<C: Read + Write + Seek> WhisperFile<C> {
    /// Initializes a whisper database inside an arbitrary container and
    /// returns an open handle over it.
    ///
    /// The container is written from position 0: metadata, archive
    /// descriptors with cumulative offsets, then the archive regions
    /// (zero-filled densely, or reserved with one trailing byte in
    /// sparse mode).
    pub fn create_in(mut container: C, archives: &[Retention], options: &CreateOptions) -> Result<Self> {
        validate_options(options)?;
        validate_archive_list(archives)?;

        let header_size = METADATA_SIZE as u64 + ARCHIVE_INFO_SIZE as u64 * archives.len() as u64;
        let region_bytes: u64 = archives
            .iter()
            .map(|r| r.points as u64 * POINT_SIZE as u64)
            .sum();
        let total_size = header_size + region_bytes;
        let max_retention = archives.iter().map(Retention::retention).max().unwrap_or(0);
        if total_size > u32::MAX as u64 || max_retention > u32::MAX as u64 {
            return Err(WhisperError::InvalidConfiguration(
                "archive list does not fit the 32-bit file layout".to_string(),
            ));
        }

        let metadata = Metadata {
            aggregation_code: options.aggregation.as_u32(),
            max_retention: max_retention as u32,
            x_files_factor: options.x_files_factor,
            archive_count: archives.len() as u32,
        };
        container.seek(SeekFrom::Start(0))?;
        metadata.write_to(&mut container)?;

        let mut infos = Vec::with_capacity(archives.len());
        let mut offset = header_size as u32;
        for retention in archives {
            let info = ArchiveInfo {
                offset,
                seconds_per_point: retention.seconds_per_point,
                points: retention.points,
            };
            info.write_to(&mut container)?;
            offset += (retention.points as usize * POINT_SIZE) as u32;
            infos.push(info);
        }

        if options.sparse {
            container.seek(SeekFrom::Start(total_size - 1))?;
            container.write_all(&[0u8])?;
        } else {
            let zeros = [0u8; ZERO_FILL_CHUNK];
            let mut remaining = region_bytes as usize;
            while remaining > 0 {
                let chunk = remaining.min(ZERO_FILL_CHUNK);
                container.write_all(&zeros[..chunk])?;
                remaining -= chunk;
            }
        }
        container.flush()?;

        Ok(Self {
            container: Some(container),
            header: Header {
                metadata,
                archives: infos,
            },
            auto_flush: false,
        })
    }

    /// Opens a whisper database stored in an arbitrary container.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::CorruptFile` if the header does not decode.
    pub fn from_container(mut container: C, auto_flush: bool) -> Result<Self> {
        let header = Header::read_from(&mut container)?;
        Ok(Self {
            container: Some(container),
            header,
            auto_flush,
        })
    }

    /// Returns the decoded header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the retention of the coarsest archive, in seconds.
    pub fn max_retention(&self) -> u32 {
        self.header.metadata.max_retention
    }

    /// Returns the propagation threshold.
    pub fn x_files_factor(&self) -> f32 {
        self.header.metadata.x_files_factor
    }

    /// Resolves the file's aggregation method.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::InvalidAggregationMethod` for a file
    /// carrying an unknown code (including the reserved code 0).
    pub fn aggregation(&self) -> Result<AggregationMethod> {
        self.header.metadata.aggregation()
    }

    /// Returns the archive descriptors in declared (finest-first) order.
    pub fn archives(&self) -> &[ArchiveInfo] {
        &self.header.archives
    }

    /// Returns the number of archives.
    pub fn archive_count(&self) -> usize {
        self.header.archives.len()
    }

    /// Returns a view over one archive, or `None` if `index` is out of
    /// range. The view borrows the handle, so it cannot outlive it.
    pub fn archive(&mut self, index: usize) -> Option<ArchiveView<'_, C>> {
        if index < self.header.archives.len() {
            Some(ArchiveView { file: self, index })
        } else {
            None
        }
    }

    /// Returns whether every update flushes the container before
    /// returning.
    pub fn auto_flush(&self) -> bool {
        self.auto_flush
    }

    /// Sets the auto-flush behavior for this handle.
    pub fn set_auto_flush(&mut self, auto_flush: bool) {
        self.auto_flush = auto_flush;
    }

    /// Fetches a dense series for `[from_time, until_time)`, with
    /// `until_time` defaulting to the current wall time.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::InvalidTimeInterval` when the window is
    /// inverted after clamping against the retention horizon.
    pub fn fetch(&mut self, from_time: u32, until_time: Option<u32>) -> Result<FetchResult> {
        let now = unix_now()?;
        self.fetch_at(from_time, until_time, now)
    }

    /// Fetches a dense series, evaluating retention against an explicit
    /// `now` instead of the wall clock.
    ///
    /// The finest archive whose retention reaches back to `from_time`
    /// serves the whole window; a window older than the retention
    /// horizon is clamped to it. Both result bounds are quantized to the
    /// archive step and shifted forward by one step.
    pub fn fetch_at(
        &mut self,
        from_time: u32,
        until_time: Option<u32>,
        now: u32,
    ) -> Result<FetchResult> {
        let oldest = now.saturating_sub(self.header.metadata.max_retention);
        let from_time = from_time.max(oldest);
        let mut until_time = until_time.unwrap_or(now);
        if from_time >= until_time {
            return Err(WhisperError::InvalidTimeInterval {
                from: from_time,
                until: until_time,
            });
        }
        if until_time > now {
            until_time = now;
        }

        let window = now as i64 - from_time as i64;
        let archives = &self.header.archives;
        let index = archives
            .iter()
            .position(|a| a.retention() as i64 >= window)
            .unwrap_or(archives.len() - 1);
        let archive = archives[index];

        let container = self.container_mut()?;
        archive_fetch(container, &archive, from_time, until_time)
    }

    /// Writes one value at `timestamp` (defaulting to the current wall
    /// time) and propagates it into the coarser archives.
    pub fn update(&mut self, value: f64, timestamp: Option<u32>) -> Result<()> {
        let now = unix_now()?;
        self.update_at(value, timestamp.unwrap_or(now), now)
    }

    /// Writes one value, evaluating retention against an explicit `now`.
    ///
    /// The point lands in the finest archive whose retention exceeds the
    /// point's age, quantized to that archive's step. Each coarser
    /// archive is then repropagated in declared order until one reports
    /// that its window has too few known points.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::TimestampNotCovered` when the age falls
    /// outside `[0, max_retention)`.
    pub fn update_at(&mut self, value: f64, timestamp: u32, now: u32) -> Result<()> {
        let age = now as i64 - timestamp as i64;
        if age < 0 || age >= self.header.metadata.max_retention as i64 {
            return Err(WhisperError::TimestampNotCovered { timestamp, now });
        }

        let index = self
            .header
            .archives
            .iter()
            .position(|a| a.retention() as i64 > age)
            .ok_or(WhisperError::TimestampNotCovered { timestamp, now })?;
        let archive = self.header.archives[index];
        let interval = archive.interval_for(timestamp);
        {
            let container = self.container_mut()?;
            let base = read_base_point(container, &archive)?;
            let offset = archive.slot_offset(base.interval, interval);
            container.seek(SeekFrom::Start(offset))?;
            Point { interval, value }.write_to(container)?;
        }

        let mut higher = archive;
        for lower_index in index + 1..self.header.archives.len() {
            let lower = self.header.archives[lower_index];
            if !self.propagate(interval, &higher, &lower)? {
                break;
            }
            higher = lower;
        }

        if self.auto_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes a batch of `(timestamp, value)` points.
    pub fn update_many(&mut self, points: &[(u32, f64)]) -> Result<()> {
        let now = unix_now()?;
        self.update_many_at(points, now)
    }

    /// Writes a batch of points, evaluating retention against an
    /// explicit `now`.
    ///
    /// Points are sorted newest-first and distributed over the archives
    /// in declared order: each archive takes the points its retention
    /// still covers, written as one chronological batch. Points older
    /// than the coarsest archive are dropped.
    pub fn update_many_at(&mut self, points: &[(u32, f64)], now: u32) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let mut sorted: Vec<(u32, f64)> = points.to_vec();
        sorted.sort_by(|a, b| b.0.cmp(&a.0));

        let archive_count = self.header.archives.len();
        let mut index = 0usize;
        let mut batch: Vec<(u32, f64)> = Vec::new();
        for &(timestamp, value) in &sorted {
            let age = now as i64 - timestamp as i64;
            while index < archive_count
                && (self.header.archives[index].retention() as i64) < age
            {
                if !batch.is_empty() {
                    batch.reverse();
                    debug!("Committing {} points to archive {}", batch.len(), index);
                    self.archive_update_many(index, &batch)?;
                    batch.clear();
                }
                index += 1;
            }
            if index == archive_count {
                // Too old for even the coarsest archive.
                break;
            }
            batch.push((timestamp, value));
        }
        if index < archive_count && !batch.is_empty() {
            batch.reverse();
            debug!("Committing {} points to archive {}", batch.len(), index);
            self.archive_update_many(index, &batch)?;
        }

        if self.auto_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// The legacy flat call surface: any mixture of bare numbers and
    /// nested lists, interleaving timestamps and values.
    ///
    /// The arguments are flattened once. An empty or odd-length result
    /// is a silent no-op; exactly one pair routes to [`Self::update`];
    /// anything longer routes to [`Self::update_many`].
    pub fn update_args(&mut self, args: &[UpdateArg]) -> Result<()> {
        let mut flat: Vec<f64> = Vec::new();
        for arg in args {
            match arg {
                UpdateArg::Num(value) => flat.push(*value),
                UpdateArg::List(values) => flat.extend_from_slice(values),
            }
        }
        if flat.is_empty() || flat.len() % 2 != 0 {
            return Ok(());
        }
        if flat.len() == 2 {
            return self.update(flat[1], Some(flat[0] as u32));
        }
        let points: Vec<(u32, f64)> = flat
            .chunks_exact(2)
            .map(|pair| (pair[0] as u32, pair[1]))
            .collect();
        self.update_many(&points)
    }

    /// Flushes the container.
    pub fn flush(&mut self) -> Result<()> {
        self.container_mut()?.flush()?;
        Ok(())
    }

    /// Flushes and releases the container. Safe to call twice; every
    /// other operation on a closed handle fails with an I/O error.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut container) = self.container.take() {
            container.flush()?;
        }
        Ok(())
    }

    /// Returns true once the handle has been closed.
    pub fn closed(&self) -> bool {
        self.container.is_none()
    }

    /// Consumes the handle and returns the container, or `None` if the
    /// handle was already closed.
    pub fn into_inner(self) -> Option<C> {
        self.container
    }

    fn container_mut(&mut self) -> Result<&mut C> {
        self.container
            .as_mut()
            .ok_or_else(|| WhisperError::Io(io::Error::other("whisper file handle is closed")))
    }

    /// Writes one chronological batch into the archive at `index`,
    /// then cascades the touched windows into every coarser archive.
    ///
    /// Consecutive intervals are packed into contiguous spans so each
    /// span is one write (split in two where it crosses the ring seam).
    /// A run of duplicate intervals collapses to its last point.
    fn archive_update_many(&mut self, index: usize, points: &[(u32, f64)]) -> Result<()> {
        let archive = self.header.archives[index];
        let step = archive.seconds_per_point;
        let aligned: Vec<(u32, f64)> = points
            .iter()
            .map(|&(timestamp, value)| (archive.interval_for(timestamp), value))
            .collect();

        let mut spans: Vec<(u32, Vec<u8>)> = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut previous: Option<u32> = None;
        for (i, &(interval, value)) in aligned.iter().enumerate() {
            if i + 1 < aligned.len() && aligned[i + 1].0 == interval {
                continue;
            }
            if let Some(prev) = previous {
                if interval != prev.wrapping_add(step) {
                    let count = (current.len() / POINT_SIZE) as u32;
                    let start = prev.wrapping_sub(step.wrapping_mul(count - 1));
                    spans.push((start, std::mem::take(&mut current)));
                }
            }
            current.extend_from_slice(&Point { interval, value }.to_bytes());
            previous = Some(interval);
        }
        if let Some(prev) = previous {
            if !current.is_empty() {
                let count = (current.len() / POINT_SIZE) as u32;
                let start = prev.wrapping_sub(step.wrapping_mul(count - 1));
                spans.push((start, current));
            }
        }
        if spans.is_empty() {
            return Ok(());
        }

        {
            let container = self.container_mut()?;
            let base = read_base_point(container, &archive)?;
            let base_interval = if base.interval == 0 {
                // First write to this archive: anchor at our first span.
                spans[0].0
            } else {
                base.interval
            };
            let archive_end = archive.end();
            for (start_interval, bytes) in &spans {
                let offset = archive.slot_offset(base_interval, *start_interval);
                container.seek(SeekFrom::Start(offset))?;
                let bytes_beyond = (offset + bytes.len() as u64) as i64 - archive_end as i64;
                if bytes_beyond > 0 {
                    let split = bytes.len() - bytes_beyond as usize;
                    container.write_all(&bytes[..split])?;
                    let position = container.stream_position()?;
                    if position != archive_end {
                        return Err(WhisperError::ArchiveBoundaryExceeded {
                            expected: archive_end,
                            actual: position,
                        });
                    }
                    container.seek(SeekFrom::Start(archive.offset as u64))?;
                    container.write_all(&bytes[split..])?;
                } else {
                    container.write_all(bytes)?;
                }
            }
        }

        let coarser: Vec<ArchiveInfo> = self
            .header
            .archives
            .iter()
            .copied()
            .filter(|a| a.seconds_per_point > archive.seconds_per_point)
            .collect();
        let mut higher = archive;
        for lower in coarser {
            let intervals: BTreeSet<u32> = aligned
                .iter()
                .map(|&(timestamp, _)| lower.interval_for(timestamp))
                .collect();
            let mut propagated = false;
            for interval in intervals {
                if self.propagate(interval, &higher, &lower)? {
                    propagated = true;
                }
            }
            if !propagated {
                break;
            }
            higher = lower;
        }

        Ok(())
    }

    /// Recomputes the lower-archive point covering `timestamp` from its
    /// neighborhood in the higher archive.
    ///
    /// Returns `Ok(false)` when the window has no known points or too
    /// few to clear the x-files-factor gate; the caller stops cascading.
    fn propagate(
        &mut self,
        timestamp: u32,
        higher: &ArchiveInfo,
        lower: &ArchiveInfo,
    ) -> Result<bool> {
        let method = self.header.metadata.aggregation()?;
        let xff = self.header.metadata.x_files_factor;
        let lower_start = lower.interval_for(timestamp);

        let container = self.container_mut()?;
        let higher_base = read_base_point(container, higher)?;
        let higher_first = if higher_base.interval == 0 {
            higher.offset as u64
        } else {
            higher.slot_offset(higher_base.interval, lower_start)
        };
        let points_per_bucket = (lower.seconds_per_point / higher.seconds_per_point) as u64;
        let window_bytes = points_per_bucket * POINT_SIZE as u64;
        let relative_first = higher_first - higher.offset as u64;
        let relative_last = (relative_first + window_bytes) % higher.size();
        let higher_last = higher.offset as u64 + relative_last;
        let series = read_ring(container, higher, higher_first, higher_last)?;

        let mut known = Vec::with_capacity(points_per_bucket as usize);
        let mut total = 0usize;
        let mut current_interval = lower_start;
        for point in decode_points(&series) {
            total += 1;
            if point.interval == current_interval {
                known.push(point.value);
            }
            current_interval = current_interval.wrapping_add(higher.seconds_per_point);
        }
        if known.is_empty() {
            return Ok(false);
        }
        let known_fraction = known.len() as f64 / total as f64;
        if known_fraction < xff as f64 {
            debug!(
                "Not propagating interval {}: {}/{} known points below factor {}",
                lower_start,
                known.len(),
                total,
                xff
            );
            return Ok(false);
        }

        let value = match aggregate(method, &known) {
            Some(value) => value,
            None => return Ok(false),
        };
        let lower_base = read_base_point(container, lower)?;
        let offset = lower.slot_offset(lower_base.interval, lower_start);
        container.seek(SeekFrom::Start(offset))?;
        Point {
            interval: lower_start,
            value,
        }
        .write_to(container)?;
        Ok(true)
    }
}

/// A non-owning view over one archive of an open handle.
pub struct ArchiveView<'a, C> {
    file: &'a mut WhisperFile<C>,
    index: usize,
}

impl<C: Read + Write + Seek> ArchiveView<'_, C> {
    /// Returns this archive's descriptor.
    pub fn info(&self) -> &ArchiveInfo {
        &self.file.header.archives[self.index]
    }

    /// Fetches a dense series from this archive alone, without
    /// best-archive selection or retention clamping.
    ///
    /// A window whose quantized bounds coincide is widened by one step
    /// so the result always holds at least one slot.
    pub fn fetch(&mut self, from_time: u32, until_time: u32) -> Result<FetchResult> {
        let archive = self.file.header.archives[self.index];
        let container = self.file.container_mut()?;
        archive_fetch(container, &archive, from_time, until_time)
    }

    /// Reads every slot of the ring in storage order, unwritten slots
    /// included (their interval is 0).
    pub fn points(&mut self) -> Result<Vec<Point>> {
        let archive = self.file.header.archives[self.index];
        let container = self.file.container_mut()?;
        container.seek(SeekFrom::Start(archive.offset as u64))?;
        let mut buf = vec![0u8; archive.size() as usize];
        container.read_exact(&mut buf)?;
        Ok(decode_points(&buf).collect())
    }

    /// Writes a batch of points directly into this archive and cascades
    /// into the coarser archives.
    pub fn update_many(&mut self, points: &[(u32, f64)]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let mut sorted = points.to_vec();
        sorted.sort_by_key(|point| point.0);
        self.file.archive_update_many(self.index, &sorted)?;
        if self.file.auto_flush {
            self.file.flush()?;
        }
        Ok(())
    }
}

fn validate_options(options: &CreateOptions) -> Result<()> {
    if !(0.0..=1.0).contains(&options.x_files_factor) {
        return Err(WhisperError::InvalidConfiguration(format!(
            "x-files factor {} is outside [0, 1]",
            options.x_files_factor
        )));
    }
    Ok(())
}

fn unix_now() -> Result<u32> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(io::Error::other)?;
    Ok(now.as_secs() as u32)
}

fn read_base_point<C: Read + Seek>(container: &mut C, archive: &ArchiveInfo) -> Result<Point> {
    container.seek(SeekFrom::Start(archive.offset as u64))?;
    Point::read_from(container)
}

/// Reads `[first_offset, last_offset)` from an archive ring, splitting
/// in two across the seam when the range wraps.
fn read_ring<C: Read + Seek>(
    container: &mut C,
    archive: &ArchiveInfo,
    first_offset: u64,
    last_offset: u64,
) -> Result<Vec<u8>> {
    container.seek(SeekFrom::Start(first_offset))?;
    if first_offset < last_offset {
        let mut buf = vec![0u8; (last_offset - first_offset) as usize];
        container.read_exact(&mut buf)?;
        Ok(buf)
    } else {
        let head = (archive.end() - first_offset) as usize;
        let tail = (last_offset - archive.offset as u64) as usize;
        let mut buf = vec![0u8; head + tail];
        container.read_exact(&mut buf[..head])?;
        container.seek(SeekFrom::Start(archive.offset as u64))?;
        container.read_exact(&mut buf[head..])?;
        Ok(buf)
    }
}

/// Fetches a dense series from one archive for `[from_time, until_time)`.
fn archive_fetch<C: Read + Seek>(
    container: &mut C,
    archive: &ArchiveInfo,
    from_time: u32,
    until_time: u32,
) -> Result<FetchResult> {
    let step = archive.seconds_per_point;
    let from_interval = archive.interval_for(from_time).wrapping_add(step);
    let mut until_interval = archive.interval_for(until_time).wrapping_add(step);
    if from_interval == until_interval {
        // A zero-length window still yields the next point.
        until_interval = until_interval.wrapping_add(step);
    }
    let time_info = TimeInfo {
        from_interval,
        until_interval,
        step,
    };

    let expected = (until_interval as i64 - from_interval as i64) / step as i64;
    if expected <= 0 {
        return Ok(FetchResult {
            time_info,
            values: Vec::new(),
        });
    }

    let base = read_base_point(container, archive)?;
    if base.interval == 0 {
        return Ok(FetchResult {
            time_info,
            values: vec![None; expected as usize],
        });
    }

    let from_offset = archive.slot_offset(base.interval, from_interval);
    let until_offset = archive.slot_offset(base.interval, until_interval);
    let series = read_ring(container, archive, from_offset, until_offset)?;

    let mut values = vec![None; series.len() / POINT_SIZE];
    let mut current_interval = from_interval;
    for (slot, point) in decode_points(&series).enumerate() {
        if point.interval == current_interval {
            values[slot] = Some(point.value);
        }
        current_interval = current_interval.wrapping_add(step);
    }

    Ok(FetchResult { time_info, values })
}
