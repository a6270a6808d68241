#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! aartfaac2ms converts the raw visibility dumps written by the AARTFAAC
//! correlator into corrected, flagged and weighted visibility tables.
//!
//! An observation may be far larger than the memory of the machine converting
//! it, so the conversion works in chunks of timesteps:
//!
//! 1. [`chunking::plan_chunks`] splits the selected timesteps into contiguous
//!    chunks which fit in a memory budget.
//! 2. [`BaselineBufferSet::ingest_chunk`] reads each chunk's records and
//!    scatters them into one time series buffer per baseline.
//! 3. [`processing::process_baselines`] flags every baseline on a pool of
//!    worker threads and accumulates [`QualityStatistics`].
//! 4. [`output::OutputAssembler`] applies the geometric (w-term) phase
//!    correction and writes rows through a [`VisWriter`] chain.
//!
//! [`pipeline::convert`] drives the whole thing.
//!
//! # Examples
//!
//! ```rust,no_run
//! use aartfaac2ms::{
//!     io::{aartfaac::AartfaacFile, antenna_config::AntennaConfig, writer::MemoryWriter},
//!     pipeline::{convert, ConvertOptionsBuilder},
//!     AartfaacMode, MadFlagger, PrecessionUvw,
//! };
//!
//! let mode = AartfaacMode::LbaOuter10_90;
//! let mut reader = AartfaacFile::open("tests/data/SB320.vis", mode).unwrap();
//! let antennas = AntennaConfig::from_path("tests/data/antennas.conf")
//!     .unwrap()
//!     .layout(mode)
//!     .unwrap();
//! let options = ConvertOptionsBuilder::default()
//!     .rfi_detection(true)
//!     .build()
//!     .unwrap();
//!
//! let mut writer = MemoryWriter::default();
//! convert(
//!     &mut reader,
//!     &antennas,
//!     &mut writer,
//!     &MadFlagger::default(),
//!     &PrecessionUvw::default(),
//!     &options,
//! )
//! .unwrap();
//! ```

use lazy_static::lazy_static;
use std::{collections::HashMap, sync::Mutex, time::Duration};

pub mod buffers;
pub mod chunking;
#[cfg(feature = "cli")]
pub mod cli;
pub mod constants;
pub mod corrections;
pub mod error;
pub mod flags;
pub mod io;
pub mod output;
pub mod pipeline;
pub mod processing;
pub mod selection;
pub mod statistics;
#[cfg(test)]
mod test_common;
pub mod types;
pub mod util;

pub use buffers::{BaselineBuffer, BaselineBufferSet};
pub use chunking::{plan_chunks, ChunkPlan};
pub use corrections::{PrecessionUvw, RotationPath, UvwService};
pub use error::Af2msError;
pub use flags::{FlagMask, Flagger, MadFlagger};
pub use io::{
    aartfaac::{AartfaacFile, AartfaacHeader, AartfaacMode},
    writer::VisWriter,
};
pub use statistics::QualityStatistics;
pub use types::{Baseline, Timestep};

pub use marlu;
pub use marlu::{hifitime, ndarray, rayon, Complex, RADec, UVW};

lazy_static! {
    static ref DURATIONS: Mutex<HashMap<String, Duration>> = Mutex::new(HashMap::new());
}

/// Time a block of code, adding the elapsed time to a global table of named
/// durations. See [`get_durations`].
#[macro_export]
macro_rules! with_increment_duration {
    ($name:expr, $e:expr) => {{
        let _now = std::time::Instant::now();
        let _res = $e;
        $crate::increment_duration($name, _now.elapsed());
        _res
    }};
}

/// Add `elapsed` to the named entry of the global duration table.
pub fn increment_duration(name: &str, elapsed: Duration) {
    if let Ok(mut durations) = DURATIONS.lock() {
        *durations.entry(name.to_string()).or_default() += elapsed;
    }
}

/// A copy of the global table of named durations.
pub fn get_durations() -> HashMap<String, Duration> {
    DURATIONS
        .lock()
        .map(|durations| durations.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{get_durations, increment_duration};
    use std::time::Duration;

    #[test]
    fn test_with_increment_duration_accumulates() {
        let value = with_increment_duration!("test_accumulate", 1 + 1);
        assert_eq!(value, 2);
        increment_duration("test_accumulate", Duration::from_millis(5));
        let durations = get_durations();
        assert!(durations["test_accumulate"] >= Duration::from_millis(5));
    }
}
