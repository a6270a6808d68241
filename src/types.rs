//! Small value types shared between the pipeline stages.

use std::fmt::Display;

use crate::{constants::UNIX_TO_MJD_SECONDS, hifitime::Epoch};

/// An unordered pair of antennas, stored with `ant1 <= ant2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Baseline {
    /// The lower antenna index
    pub ant1: usize,
    /// The higher (or equal) antenna index
    pub ant2: usize,
}

impl Baseline {
    /// Create a baseline from two antenna indices in either order.
    pub fn new(ant_a: usize, ant_b: usize) -> Self {
        Self {
            ant1: ant_a.min(ant_b),
            ant2: ant_a.max(ant_b),
        }
    }

    /// Whether this is an auto-correlation.
    pub fn is_auto(&self) -> bool {
        self.ant1 == self.ant2
    }

    /// The number of baselines, including autos, for `num_ants` antennas.
    pub fn count(num_ants: usize) -> usize {
        num_ants * (num_ants + 1) / 2
    }

    /// All baselines of `num_ants` antennas in canonical order: `ant1`
    /// ascending, then `ant2` ascending from `ant1`.
    pub fn all(num_ants: usize) -> Vec<Self> {
        (0..num_ants)
            .flat_map(|ant1| (ant1..num_ants).map(move |ant2| Self { ant1, ant2 }))
            .collect()
    }
}

impl Display for Baseline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ant1, self.ant2)
    }
}

/// The time span of a single correlator integration, as read from its header.
///
/// Times are kept as Unix seconds, which is what the correlator writes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timestep {
    /// Start of the integration \[Unix seconds\]
    pub start_unix: f64,
    /// End of the integration \[Unix seconds\]
    pub end_unix: f64,
}

impl Timestep {
    /// Start of the integration as a Modified Julian Date in seconds.
    pub fn start_mjd_s(&self) -> f64 {
        unix_to_mjd_seconds(self.start_unix)
    }

    /// End of the integration as a Modified Julian Date in seconds.
    pub fn end_mjd_s(&self) -> f64 {
        unix_to_mjd_seconds(self.end_unix)
    }

    /// Integration time \[seconds\]
    pub fn exposure(&self) -> f64 {
        self.end_unix - self.start_unix
    }

    /// The epoch at the start of the integration.
    pub fn start_epoch(&self) -> Epoch {
        Epoch::from_unix_seconds(self.start_unix)
    }

    /// The epoch at the middle of the integration.
    pub fn centroid_epoch(&self) -> Epoch {
        Epoch::from_unix_seconds((self.start_unix + self.end_unix) / 2.0)
    }
}

/// Convert a Unix timestamp to a Modified Julian Date in seconds.
pub fn unix_to_mjd_seconds(unix_s: f64) -> f64 {
    unix_s + UNIX_TO_MJD_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_baseline_count_and_order() {
        let baselines = Baseline::all(4);
        assert_eq!(baselines.len(), Baseline::count(4));
        assert_eq!(baselines.len(), 10);
        assert_eq!(baselines[0], Baseline { ant1: 0, ant2: 0 });
        assert_eq!(baselines[1], Baseline { ant1: 0, ant2: 1 });
        assert_eq!(baselines[4], Baseline { ant1: 1, ant2: 1 });
        assert_eq!(baselines[9], Baseline { ant1: 3, ant2: 3 });
        assert!(baselines.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(baselines.iter().all(|bl| bl.ant1 <= bl.ant2));
    }

    #[test]
    fn test_baseline_new_orders_antennas() {
        assert_eq!(Baseline::new(3, 1), Baseline { ant1: 1, ant2: 3 });
        assert!(Baseline::new(2, 2).is_auto());
        assert_eq!(format!("{}", Baseline::new(5, 2)), "2-5");
    }

    #[test]
    fn test_timestep_conversions() {
        // 1970-01-01T00:00:00 is MJD 40587
        let timestep = Timestep {
            start_unix: 0.0,
            end_unix: 1.006_632_96,
        };
        assert_approx_eq!(f64, timestep.start_mjd_s(), 40587.0 * 86400.0);
        assert_approx_eq!(f64, timestep.exposure(), 1.006_632_96);
        assert_approx_eq!(
            f64,
            timestep.end_mjd_s() - timestep.start_mjd_s(),
            timestep.exposure(),
            epsilon = 1e-6
        );
        assert!(timestep.centroid_epoch() > timestep.start_epoch());
    }
}
