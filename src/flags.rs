//! Flag masks, and the flagging capability applied to each baseline.

use itertools::izip;
use log::trace;

use crate::{
    buffers::BaselineBuffer,
    constants::NUM_POL_PRODUCTS,
    error::Af2msError,
    ndarray::{Array2, ArrayView2, Axis},
};

/// One flag per `[channel][time]` of a baseline in the current chunk. A
/// flag applies to all polarisations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagMask {
    mask: Array2<bool>,
}

impl FlagMask {
    /// A mask with nothing flagged.
    pub fn new_unflagged(num_chans: usize, width: usize) -> Self {
        Self {
            mask: Array2::from_elem((num_chans, width), false),
        }
    }

    /// A mask with nothing flagged, shaped like the logical part of `buffer`.
    pub fn unflagged_like(buffer: &BaselineBuffer) -> Self {
        Self::new_unflagged(buffer.num_chans(), buffer.width())
    }

    /// `(num_chans, width)`
    pub fn dim(&self) -> (usize, usize) {
        self.mask.dim()
    }

    /// Whether channel `chan` at local timestep `time` is flagged.
    pub fn get(&self, chan: usize, time: usize) -> bool {
        self.mask[(chan, time)]
    }

    /// Set the flag of channel `chan` at local timestep `time`.
    pub fn set(&mut self, chan: usize, time: usize, flag: bool) {
        self.mask[(chan, time)] = flag;
    }

    /// Number of flagged samples.
    pub fn num_flagged(&self) -> usize {
        self.mask.iter().filter(|&&flag| flag).count()
    }

    /// The `[channel][time]` view.
    pub fn view(&self) -> ArrayView2<bool> {
        self.mask.view()
    }

    /// Check that this mask matches the logical shape of `buffer`.
    ///
    /// # Errors
    ///
    /// [`Af2msError::BadArrayShape`] on any mismatch.
    pub fn check_shape(&self, buffer: &BaselineBuffer) -> Result<(), Af2msError> {
        let expected = (buffer.num_chans(), buffer.width());
        if self.dim() != expected {
            return Err(Af2msError::BadArrayShape {
                argument: "mask".into(),
                function: "FlagMask::check_shape".into(),
                expected: format!("{:?}", expected),
                received: format!("{:?}", self.dim()),
            });
        }
        Ok(())
    }
}

/// Something which decides which samples of a baseline are unusable.
///
/// Implementations are shared by all worker threads.
pub trait Flagger: Sync {
    /// Produce a mask for the logical part of `buffer`.
    ///
    /// # Errors
    ///
    /// Implementation specific. Any error aborts the run.
    fn flag(&self, buffer: &BaselineBuffer) -> Result<FlagMask, Af2msError>;
}

/// Scale factor from a median absolute deviation to a Gaussian sigma.
const MAD_TO_SIGMA: f64 = 1.4826;

/// A simple robust outlier flagger.
///
/// Non-finite samples are always flagged. Then, on the amplitude summed over
/// polarisations, samples further than `threshold` sigma from the median are
/// flagged, first along time for each channel and then along frequency for
/// each timestep. Sigma is estimated from the median absolute deviation of
/// the samples not yet flagged.
#[derive(Clone, Copy, Debug)]
pub struct MadFlagger {
    /// Sensitivity in units of sigma
    pub threshold: f64,
}

impl Default for MadFlagger {
    fn default() -> Self {
        Self { threshold: 5.0 }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.
    } else {
        values[mid]
    })
}

impl MadFlagger {
    /// A flagger with the given sensitivity.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Flag the outliers of one lane (a channel along time, or a timestep
    /// along frequency). `lane` yields `(amplitude, flag)` pairs.
    fn flag_lane<'a>(&self, lane: impl Iterator<Item = (&'a f64, &'a mut bool)>) {
        let (amps, flags): (Vec<&f64>, Vec<&mut bool>) = lane.unzip();
        let mut good: Vec<f64> = amps
            .iter()
            .zip(flags.iter())
            .filter(|(_, flag)| !***flag)
            .map(|(&&amp, _)| amp)
            .collect();
        let centre = match median(&mut good) {
            Some(centre) => centre,
            None => return,
        };
        let mut deviations: Vec<f64> = good.iter().map(|amp| (amp - centre).abs()).collect();
        let sigma = match median(&mut deviations) {
            Some(mad) => mad * MAD_TO_SIGMA,
            None => return,
        };
        if sigma <= 0. {
            return;
        }
        for (&amp, flag) in amps.into_iter().zip(flags) {
            if (amp - centre).abs() > self.threshold * sigma {
                *flag = true;
            }
        }
    }
}

impl Flagger for MadFlagger {
    fn flag(&self, buffer: &BaselineBuffer) -> Result<FlagMask, Af2msError> {
        trace!("start MadFlagger::flag");
        let mut mask = FlagMask::unflagged_like(buffer);
        let shape = mask.dim();

        // amplitude summed over polarisations
        let mut amplitudes = Array2::<f64>::zeros(shape);
        for pol in 0..NUM_POL_PRODUCTS {
            let real = buffer.plane(pol * 2);
            let imag = buffer.plane(pol * 2 + 1);
            for (amp, &re, &im) in izip!(amplitudes.iter_mut(), real.iter(), imag.iter()) {
                *amp += (re as f64).hypot(im as f64);
            }
        }

        for (&amp, flag) in amplitudes.iter().zip(mask.mask.iter_mut()) {
            if !amp.is_finite() {
                *flag = true;
            }
        }

        // along time, one channel at a time
        for (amp_lane, mut flag_lane) in amplitudes
            .axis_iter(Axis(0))
            .zip(mask.mask.axis_iter_mut(Axis(0)))
        {
            self.flag_lane(amp_lane.into_iter().zip(flag_lane.iter_mut()));
        }
        // along frequency, one timestep at a time
        for (amp_lane, mut flag_lane) in amplitudes
            .axis_iter(Axis(1))
            .zip(mask.mask.axis_iter_mut(Axis(1)))
        {
            self.flag_lane(amp_lane.into_iter().zip(flag_lane.iter_mut()));
        }

        trace!("end MadFlagger::flag");
        Ok(mask)
    }
}
