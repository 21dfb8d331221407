//! Aggregation methods for downsampling between archives.

use std::fmt;
use std::str::FromStr;

use crate::error::WhisperError;

/// How known finer-archive values are consolidated into one coarser point.
///
/// The on-disk codes are fixed: 1=average, 2=sum, 3=last, 4=max, 5=min.
/// Code 0 is reserved and never written to new files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum AggregationMethod {
    /// Arithmetic mean of the known values.
    #[default]
    Average = 1,
    /// Sum of the known values.
    Sum = 2,
    /// The last known value in window scan order.
    Last = 3,
    /// The largest known value.
    Max = 4,
    /// The smallest known value.
    Min = 5,
}

impl AggregationMethod {
    /// Creates an AggregationMethod from its on-disk code.
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Average),
            2 => Some(Self::Sum),
            3 => Some(Self::Last),
            4 => Some(Self::Max),
            5 => Some(Self::Min),
            _ => None,
        }
    }

    /// Returns the on-disk code for this method.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Returns the method's canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Sum => "sum",
            Self::Last => "last",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregationMethod {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "average" => Ok(Self::Average),
            "sum" => Ok(Self::Sum),
            "last" => Ok(Self::Last),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            _ => Err(WhisperError::InvalidConfiguration(format!(
                "unknown aggregation method '{s}'"
            ))),
        }
    }
}

/// Applies an aggregation method to the known values of one window.
///
/// Returns `None` when there are no known values to aggregate.
pub fn aggregate(method: AggregationMethod, known: &[f64]) -> Option<f64> {
    if known.is_empty() {
        return None;
    }
    let value = match method {
        AggregationMethod::Average => known.iter().sum::<f64>() / known.len() as f64,
        AggregationMethod::Sum => known.iter().sum(),
        AggregationMethod::Last => known[known.len() - 1],
        AggregationMethod::Max => known.iter().copied().fold(f64::MIN, f64::max),
        AggregationMethod::Min => known.iter().copied().fold(f64::MAX, f64::min),
    };
    Some(value)
}
