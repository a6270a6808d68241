//! Selecting the timesteps of an observation to convert or keep.
//!
//! Timesteps are selected by index with [`TimestepSelection`], or by
//! sidereal and civil time with [`select_by_time`]. A selection is always a
//! contiguous range, since the chunked conversion and the flagger both want
//! contiguous timesteps.

use std::ops::Range;

use log::debug;
use marlu::{
    hifitime::{Duration, Epoch},
    precession::get_lmst,
    LatLngHeight,
};

use crate::{chunking::bytes_per_timestep, error::Af2msError, io::aartfaac::AartfaacFile};

/// A contiguous range of timestep indices into the input file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimestepSelection {
    /// selected range of timestep indices
    pub timestep_range: Range<usize>,
}

impl TimestepSelection {
    /// Resolve the interval `start..end` of a file with `num_timesteps`
    /// timesteps. An `end` of 0 means the end of the file.
    ///
    /// # Errors
    ///
    /// [`Af2msError::InvalidInterval`] unless `start < end <= num_timesteps`.
    pub fn resolve(start: usize, end: usize, num_timesteps: usize) -> Result<Self, Af2msError> {
        let end = if end == 0 { num_timesteps } else { end };
        if start >= end || end > num_timesteps {
            return Err(Af2msError::InvalidInterval {
                start,
                end,
                num_timesteps,
            });
        }
        Ok(Self {
            timestep_range: start..end,
        })
    }

    /// Number of selected timesteps.
    pub fn len(&self) -> usize {
        self.timestep_range.len()
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.timestep_range.is_empty()
    }

    /// The timestep in the middle of the selection, used for the default
    /// phase centre.
    pub fn centre_timestep(&self) -> usize {
        (self.timestep_range.start + self.timestep_range.end) / 2
    }

    /// Bytes needed to hold the whole selection in memory at once.
    pub fn estimate_bytes(&self, num_ants: usize, num_chans: usize) -> usize {
        self.len() * bytes_per_timestep(num_ants, num_chans)
    }
}

/// A half open range of times, which wraps around when `start > end`, e.g.
/// the LST range `22..2` contains 23 and 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    /// Inclusive start
    pub start: f64,
    /// Exclusive end
    pub end: f64,
}

impl TimeRange {
    /// A new range.
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `value` is in the range.
    pub fn contains(&self, value: f64) -> bool {
        if self.start <= self.end {
            self.start <= value && value < self.end
        } else {
            self.start <= value || value < self.end
        }
    }
}

/// The outcome of [`select_by_time`].
#[derive(Debug, Clone)]
pub struct TimeSelection {
    /// Centroid of the first scanned timestep
    pub first_utc: Epoch,
    /// Centroid of the last scanned timestep
    pub last_utc: Epoch,
    /// Local mean sidereal time of the first scanned timestep \[hours\]
    pub first_lst_hours: f64,
    /// Local mean sidereal time of the last scanned timestep \[hours\]
    pub last_lst_hours: f64,
    /// From the first to the last matching timestep, if any matched
    pub selection: Option<Range<usize>>,
}

/// The local mean sidereal time at `array_pos` \[hours\].
pub fn lst_hours(epoch: Epoch, array_pos: LatLngHeight, dut1: Duration) -> f64 {
    get_lmst(array_pos.longitude_rad, epoch, dut1).to_degrees() / 15.0
}

/// Scan the metadata of the timesteps in `scan` and select from the first to
/// the last one whose centroid is inside both `lst_range` (hours) and
/// `utc_range` (Unix seconds).
///
/// # Errors
///
/// [`Af2msError::InvalidInterval`] if `scan` is empty or beyond the file,
/// or any read error.
pub fn select_by_time<R>(
    reader: &mut AartfaacFile<R>,
    scan: Range<usize>,
    lst_range: TimeRange,
    utc_range: TimeRange,
    array_pos: LatLngHeight,
    dut1: Duration,
) -> Result<TimeSelection, Af2msError>
where
    R: std::io::Read + std::io::Seek,
{
    let num_timesteps = reader.num_timesteps();
    if scan.is_empty() || scan.end > num_timesteps {
        return Err(Af2msError::InvalidInterval {
            start: scan.start,
            end: scan.end,
            num_timesteps,
        });
    }

    let mut first_match = None;
    let mut last_match = None;
    let mut scanned = Vec::with_capacity(2);
    for timestep_idx in scan.clone() {
        reader.seek_to_timestep(timestep_idx)?;
        let timestep = reader.read_metadata()?;
        let centroid_unix = (timestep.start_unix + timestep.end_unix) / 2.0;
        let epoch = timestep.centroid_epoch();
        let lst = lst_hours(epoch, array_pos, dut1);
        if lst_range.contains(lst) && utc_range.contains(centroid_unix) {
            first_match.get_or_insert(timestep_idx);
            last_match = Some(timestep_idx);
        }
        if timestep_idx == scan.start || timestep_idx + 1 == scan.end {
            scanned.push((epoch, lst));
        }
    }
    debug!(
        "timesteps {:?} matched LST {:?} and UTC {:?}: {:?}..{:?}",
        scan, lst_range, utc_range, first_match, last_match
    );

    let (first_utc, first_lst_hours) = scanned[0];
    let (last_utc, last_lst_hours) = scanned[scanned.len() - 1];
    Ok(TimeSelection {
        first_utc,
        last_utc,
        first_lst_hours,
        last_lst_hours,
        selection: first_match
            .zip(last_match)
            .map(|(first, last)| first..last + 1),
    })
}
