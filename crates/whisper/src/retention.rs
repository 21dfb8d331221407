//! Retention definitions: the human-readable `"precision:retention"`
//! syntax and the structural rules an archive list must satisfy.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, WhisperError};

/// One retention level: a temporal step and a point capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Temporal step of the archive, in seconds.
    pub seconds_per_point: u32,
    /// Capacity of the archive, in points.
    pub points: u32,
}

impl Retention {
    /// Creates a retention level.
    pub fn new(seconds_per_point: u32, points: u32) -> Self {
        Self {
            seconds_per_point,
            points,
        }
    }

    /// Returns the window of time this level can represent, in seconds.
    pub fn retention(&self) -> u64 {
        self.seconds_per_point as u64 * self.points as u64
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds_per_point, self.points)
    }
}

impl FromStr for Retention {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self> {
        parse_retention_def(s)
    }
}

/// Seconds per unit suffix: s, m, h, d, w, y.
fn unit_multiplier(unit: char) -> Option<u32> {
    match unit {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(3600),
        'd' => Some(86400),
        'w' => Some(604800),
        'y' => Some(31536000),
        _ => None,
    }
}

/// Splits `"30s"` into the integer part and an optional unit suffix.
fn parse_quantity(s: &str) -> Result<(u32, Option<char>)> {
    let malformed = || WhisperError::InvalidRetentionDef(format!("bad quantity '{s}'"));
    if s.is_empty() {
        return Err(malformed());
    }
    let (digits, unit) = match s.chars().last() {
        Some(last) if last.is_ascii_digit() => (s, None),
        Some(last) => (&s[..s.len() - last.len_utf8()], Some(last)),
        None => return Err(malformed()),
    };
    let amount: u32 = digits.parse().map_err(|_| malformed())?;
    Ok((amount, unit))
}

/// Parses a retention definition such as `"30s:7d"` or `"60:1440"`.
///
/// The precision is a number of seconds, optionally scaled by a unit
/// suffix (s, m, h, d, w, y). The retention is a point count when bare,
/// or a duration divided by the precision (truncating) when suffixed.
///
/// # Errors
///
/// Returns `WhisperError::InvalidRetentionDef` when the `:` separator is
/// missing, a quantity is not an integer, or a unit is unrecognized.
pub fn parse_retention_def(def: &str) -> Result<Retention> {
    let def = def.trim();
    let (precision_str, points_str) = def.split_once(':').ok_or_else(|| {
        WhisperError::InvalidRetentionDef(format!("missing ':' separator in '{def}'"))
    })?;

    let (amount, unit) = parse_quantity(precision_str)?;
    let seconds_per_point = match unit {
        None => amount,
        Some(unit) => {
            let multiplier = unit_multiplier(unit).ok_or_else(|| {
                WhisperError::InvalidRetentionDef(format!("unknown unit '{unit}' in '{def}'"))
            })?;
            amount.checked_mul(multiplier).ok_or_else(|| {
                WhisperError::InvalidRetentionDef(format!("precision overflows in '{def}'"))
            })?
        }
    };
    if seconds_per_point == 0 {
        return Err(WhisperError::InvalidRetentionDef(format!(
            "zero precision in '{def}'"
        )));
    }

    let (amount, unit) = parse_quantity(points_str)?;
    let points = match unit {
        None => amount,
        Some(unit) => {
            let multiplier = unit_multiplier(unit).ok_or_else(|| {
                WhisperError::InvalidRetentionDef(format!("unknown unit '{unit}' in '{def}'"))
            })?;
            let duration = amount.checked_mul(multiplier).ok_or_else(|| {
                WhisperError::InvalidRetentionDef(format!("retention overflows in '{def}'"))
            })?;
            duration / seconds_per_point
        }
    };
    if points == 0 {
        return Err(WhisperError::InvalidRetentionDef(format!(
            "zero points in '{def}'"
        )));
    }

    Ok(Retention::new(seconds_per_point, points))
}

/// Validates the structural rules that make multi-resolution propagation
/// well-defined.
///
/// The levels are checked sorted by ascending precision; the input order
/// does not matter. For every adjacent pair (fine, coarse):
///
/// 1. the list is non-empty,
/// 2. no two levels share a precision,
/// 3. the coarse precision is a whole multiple of the fine one,
/// 4. the coarse level retains strictly more time than the fine one,
/// 5. the fine level holds at least one full consolidation window.
///
/// This is a pure predicate; it never touches a file.
///
/// # Errors
///
/// Returns `WhisperError::InvalidConfiguration` naming the offending pair.
pub fn validate_archive_list(archives: &[Retention]) -> Result<()> {
    if archives.is_empty() {
        return Err(WhisperError::InvalidConfiguration(
            "at least one archive is required".to_string(),
        ));
    }
    for retention in archives {
        if retention.seconds_per_point == 0 || retention.points == 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {retention} has zero precision or zero points"
            )));
        }
    }

    let mut sorted = archives.to_vec();
    sorted.sort_by_key(|r| r.seconds_per_point);

    for pair in sorted.windows(2) {
        let (fine, coarse) = (pair[0], pair[1]);

        if fine.seconds_per_point == coarse.seconds_per_point {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archives {fine} and {coarse} have the same precision"
            )));
        }
        if coarse.seconds_per_point % fine.seconds_per_point != 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "precision of archive {coarse} is not a multiple of archive {fine}"
            )));
        }
        if fine.retention() >= coarse.retention() {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {coarse} ({} s) must retain more time than archive {fine} ({} s)",
                coarse.retention(),
                fine.retention(),
            )));
        }
        let consolidation_window = coarse.seconds_per_point / fine.seconds_per_point;
        if fine.points < consolidation_window {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {fine} has fewer points than the {consolidation_window} needed to \
                 consolidate one point of archive {coarse}"
            )));
        }
    }

    Ok(())
}
