//! Quality statistics, accumulated per worker thread and merged into one
//! run-wide result.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    ops::AddAssign,
};

use crate::{
    buffers::BaselineBuffer,
    constants::NUM_POL_PRODUCTS,
    error::Af2msError,
    flags::FlagMask,
    ndarray::{Array2, Axis},
    types::Baseline,
    Complex,
};

const POL_NAMES: [&str; NUM_POL_PRODUCTS] = ["XX", "XY", "YX", "YY"];

/// Running sums over a set of samples.
///
/// Flagged samples only bump `flagged`, and unflagged non-finite samples only
/// bump `non_finite`. Everything else goes into `count`, `sum` and `sum_sq`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatAccumulator {
    /// Unflagged finite samples
    pub count: u64,
    /// Flagged samples
    pub flagged: u64,
    /// Unflagged samples which are NaN or infinite
    pub non_finite: u64,
    /// Sum of the unflagged finite samples
    pub sum: Complex<f64>,
    /// Sum of the squared amplitudes of the unflagged finite samples
    pub sum_sq: f64,
}

impl StatAccumulator {
    /// Add one sample.
    pub fn add_sample(&mut self, sample: Complex<f32>, flagged: bool) {
        if flagged {
            self.flagged += 1;
        } else if !sample.re.is_finite() || !sample.im.is_finite() {
            self.non_finite += 1;
        } else {
            let sample = Complex::new(sample.re as f64, sample.im as f64);
            self.count += 1;
            self.sum += sample;
            self.sum_sq += sample.norm_sqr();
        }
    }

    /// Every sample seen.
    pub fn total(&self) -> u64 {
        self.count + self.flagged + self.non_finite
    }

    /// Mean of the unflagged finite samples.
    pub fn mean(&self) -> Option<Complex<f64>> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }

    /// Unbiased variance of the unflagged finite samples.
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        let n = self.count as f64;
        Some((self.sum_sq - self.sum.norm_sqr() / n) / (n - 1.))
    }

    /// Fraction of the samples which were flagged.
    pub fn flagged_fraction(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.flagged as f64 / total as f64),
        }
    }
}

impl AddAssign<&StatAccumulator> for StatAccumulator {
    fn add_assign(&mut self, other: &StatAccumulator) {
        self.count += other.count;
        self.flagged += other.flagged;
        self.non_finite += other.non_finite;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
    }
}

impl Display for StatAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count={} flagged={} non_finite={}",
            self.count, self.flagged, self.non_finite
        )?;
        if let Some(mean) = self.mean() {
            write!(f, " mean={:.6}{:+.6}i", mean.re, mean.im)?;
        }
        if let Some(variance) = self.variance() {
            write!(f, " variance={:.6}", variance)?;
        }
        Ok(())
    }
}

/// The quality statistics of an observation, or of part of one.
///
/// Cross- and auto-correlations are kept apart per channel. Timesteps are
/// keyed by their absolute index in the file, so statistics of different
/// chunks merge into the right place.
#[derive(Clone, Debug, PartialEq)]
pub struct QualityStatistics {
    channel_freqs_hz: Vec<f64>,
    /// `[channel][pol]`
    cross: Array2<StatAccumulator>,
    /// `[channel][pol]`
    auto: Array2<StatAccumulator>,
    /// `[baseline][pol]`, canonical baseline order
    baselines: Array2<StatAccumulator>,
    timesteps: BTreeMap<usize, [StatAccumulator; NUM_POL_PRODUCTS]>,
}

impl QualityStatistics {
    /// Empty statistics for the given channels and number of baselines.
    pub fn new(channel_freqs_hz: &[f64], num_baselines: usize) -> Self {
        let num_chans = channel_freqs_hz.len();
        Self {
            channel_freqs_hz: channel_freqs_hz.to_vec(),
            cross: Array2::from_elem((num_chans, NUM_POL_PRODUCTS), StatAccumulator::default()),
            auto: Array2::from_elem((num_chans, NUM_POL_PRODUCTS), StatAccumulator::default()),
            baselines: Array2::from_elem(
                (num_baselines, NUM_POL_PRODUCTS),
                StatAccumulator::default(),
            ),
            timesteps: BTreeMap::new(),
        }
    }

    /// The same shape as `self`, with nothing accumulated.
    pub fn empty_like(&self) -> Self {
        Self::new(&self.channel_freqs_hz, self.num_baselines())
    }

    /// Number of channels.
    pub fn num_chans(&self) -> usize {
        self.channel_freqs_hz.len()
    }

    /// Number of baselines.
    pub fn num_baselines(&self) -> usize {
        self.baselines.len_of(Axis(0))
    }

    /// Centre frequency of each channel \[Hz\].
    pub fn channel_freqs_hz(&self) -> &[f64] {
        &self.channel_freqs_hz
    }

    /// Cross-correlation statistics of channel `chan`, polarisation `pol`.
    pub fn cross(&self, chan: usize, pol: usize) -> &StatAccumulator {
        &self.cross[(chan, pol)]
    }

    /// Auto-correlation statistics of channel `chan`, polarisation `pol`.
    pub fn auto(&self, chan: usize, pol: usize) -> &StatAccumulator {
        &self.auto[(chan, pol)]
    }

    /// Statistics of the baseline at canonical index `baseline_idx`.
    pub fn baseline(&self, baseline_idx: usize, pol: usize) -> &StatAccumulator {
        &self.baselines[(baseline_idx, pol)]
    }

    /// Per-polarisation statistics of every timestep seen, by absolute
    /// timestep index.
    pub fn timesteps(&self) -> &BTreeMap<usize, [StatAccumulator; NUM_POL_PRODUCTS]> {
        &self.timesteps
    }

    /// Everything, summed over channels, polarisations and correlation type.
    pub fn total(&self) -> StatAccumulator {
        let mut total = StatAccumulator::default();
        for acc in self.cross.iter().chain(self.auto.iter()) {
            total += acc;
        }
        total
    }

    fn check_shape(&self, other: &Self, function: &str) -> Result<(), Af2msError> {
        let expected = (self.num_chans(), self.num_baselines());
        let received = (other.num_chans(), other.num_baselines());
        if expected != received {
            return Err(Af2msError::BadArrayShape {
                argument: "other".into(),
                function: function.into(),
                expected: format!("(chans, baselines) = {:?}", expected),
                received: format!("{:?}", received),
            });
        }
        Ok(())
    }

    /// Accumulate the logical part of `buffer`, which belongs to `baseline`
    /// at canonical index `baseline_idx`. Local timestep `t` of the buffer is
    /// absolute timestep `first_timestep + t`.
    ///
    /// # Errors
    ///
    /// [`Af2msError::BadArrayShape`] if the mask, the buffer and these
    /// statistics disagree on shape.
    pub fn accumulate(
        &mut self,
        buffer: &BaselineBuffer,
        mask: &FlagMask,
        baseline: Baseline,
        baseline_idx: usize,
        first_timestep: usize,
    ) -> Result<(), Af2msError> {
        mask.check_shape(buffer)?;
        if buffer.num_chans() != self.num_chans() || baseline_idx >= self.num_baselines() {
            return Err(Af2msError::BadArrayShape {
                argument: "buffer".into(),
                function: "QualityStatistics::accumulate".into(),
                expected: format!(
                    "{} channels, baseline index < {}",
                    self.num_chans(),
                    self.num_baselines()
                ),
                received: format!(
                    "{} channels, baseline index {}",
                    buffer.num_chans(),
                    baseline_idx
                ),
            });
        }

        let per_chan = if baseline.is_auto() {
            &mut self.auto
        } else {
            &mut self.cross
        };
        for time in 0..buffer.width() {
            let per_time = self
                .timesteps
                .entry(first_timestep + time)
                .or_insert_with(Default::default);
            for chan in 0..buffer.num_chans() {
                let flagged = mask.get(chan, time);
                for (pol, time_acc) in per_time.iter_mut().enumerate() {
                    let sample = buffer.sample(pol, chan, time);
                    per_chan[(chan, pol)].add_sample(sample, flagged);
                    self.baselines[(baseline_idx, pol)].add_sample(sample, flagged);
                    time_acc.add_sample(sample, flagged);
                }
            }
        }
        Ok(())
    }

    /// Merge `other` into `self`. Merging is associative and commutative, up
    /// to floating point accumulation order.
    ///
    /// # Errors
    ///
    /// [`Af2msError::BadArrayShape`] if the channel or baseline counts
    /// differ.
    pub fn merge(&mut self, other: &Self) -> Result<(), Af2msError> {
        self.check_shape(other, "QualityStatistics::merge")?;
        self.cross.zip_mut_with(&other.cross, |a, b| *a += b);
        self.auto.zip_mut_with(&other.auto, |a, b| *a += b);
        self.baselines.zip_mut_with(&other.baselines, |a, b| *a += b);
        for (&timestep, other_accs) in &other.timesteps {
            let accs = self.timesteps.entry(timestep).or_insert_with(Default::default);
            for (acc, other_acc) in accs.iter_mut().zip(other_accs) {
                *acc += other_acc;
            }
        }
        Ok(())
    }
}

impl Display for QualityStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} channels, {} baselines, {} timesteps",
            self.num_chans(),
            self.num_baselines(),
            self.timesteps.len()
        )?;
        let total = self.total();
        writeln!(
            f,
            "flagged fraction {:.4}",
            total.flagged_fraction().unwrap_or(0.)
        )?;
        for (pol, pol_name) in POL_NAMES.iter().enumerate() {
            let mut cross = StatAccumulator::default();
            let mut auto = StatAccumulator::default();
            for chan in 0..self.num_chans() {
                cross += &self.cross[(chan, pol)];
                auto += &self.auto[(chan, pol)];
            }
            writeln!(f, "{} cross {}", pol_name, cross)?;
            writeln!(f, "{} auto {}", pol_name, auto)?;
        }
        Ok(())
    }
}
