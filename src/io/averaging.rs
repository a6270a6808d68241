//! A writer decorator which averages in time and frequency before handing
//! rows to the writer it owns.

use std::collections::HashMap;

use log::{debug, trace};
use marlu::UVW;

use super::{
    error::IOError,
    writer::{
        AartfaacKeywords, AntennaInfo, BandInfo, ChannelInfo, FieldInfo, ObservationInfo,
        RowCursor, SourceInfo, VisRow, VisWriter,
    },
};
use crate::{constants::NUM_POL_PRODUCTS, statistics::QualityStatistics, Complex};

/// Running sums for one baseline over one averaging group.
#[derive(Clone, Debug)]
struct BaselineSums {
    antenna1: usize,
    antenna2: usize,
    num_rows: usize,
    time_sum: f64,
    uvw_sum: [f64; 3],
    exposure_sum: f64,
    // indexed by averaged [channel][pol]
    data_sum: Vec<Complex<f64>>,
    weight_sum: Vec<f64>,
    num_unflagged: Vec<usize>,
    flagged_data_sum: Vec<Complex<f64>>,
    flagged_weight_sum: Vec<f64>,
}

impl BaselineSums {
    fn new(antenna1: usize, antenna2: usize, num_samples: usize) -> Self {
        Self {
            antenna1,
            antenna2,
            num_rows: 0,
            time_sum: 0.,
            uvw_sum: [0.; 3],
            exposure_sum: 0.,
            data_sum: vec![Complex::default(); num_samples],
            weight_sum: vec![0.; num_samples],
            num_unflagged: vec![0; num_samples],
            flagged_data_sum: vec![Complex::default(); num_samples],
            flagged_weight_sum: vec![0.; num_samples],
        }
    }

    fn add(&mut self, row: &VisRow<'_>, freq_factor: usize) {
        self.num_rows += 1;
        self.time_sum += row.time_mjd_s;
        self.uvw_sum[0] += row.uvw.u;
        self.uvw_sum[1] += row.uvw.v;
        self.uvw_sum[2] += row.uvw.w;
        self.exposure_sum += row.exposure_s;
        for (in_idx, ((vis, &flag), &weight)) in row
            .data
            .iter()
            .zip(row.flags.iter())
            .zip(row.weights.iter())
            .enumerate()
        {
            let (ch, pol) = (in_idx / NUM_POL_PRODUCTS, in_idx % NUM_POL_PRODUCTS);
            let out_idx = (ch / freq_factor) * NUM_POL_PRODUCTS + pol;
            let weight = weight as f64;
            let weighted = Complex::new(vis.re as f64 * weight, vis.im as f64 * weight);
            if flag {
                self.flagged_data_sum[out_idx] += weighted;
                self.flagged_weight_sum[out_idx] += weight;
            } else {
                self.data_sum[out_idx] += weighted;
                self.weight_sum[out_idx] += weight;
                self.num_unflagged[out_idx] += 1;
            }
        }
    }

    /// The averaged visibilities, flags and weights.
    fn finish(&self) -> (Vec<Complex<f32>>, Vec<bool>, Vec<f32>) {
        let num_samples = self.data_sum.len();
        let mut data = Vec::with_capacity(num_samples);
        let mut flags = Vec::with_capacity(num_samples);
        let mut weights = Vec::with_capacity(num_samples);
        for idx in 0..num_samples {
            let (sum, weight, flag) = if self.num_unflagged[idx] > 0 {
                (self.data_sum[idx], self.weight_sum[idx], false)
            } else {
                (self.flagged_data_sum[idx], self.flagged_weight_sum[idx], true)
            };
            let mean = if weight > 0. {
                sum / weight
            } else {
                Complex::default()
            };
            data.push(Complex::new(mean.re as f32, mean.im as f32));
            flags.push(flag);
            weights.push(weight as f32);
        }
        (data, flags, weights)
    }
}

/// Averages `time_factor` consecutive timesteps and `freq_factor` adjacent
/// channels of every baseline, weighting each sample by its weight. Flagged
/// samples only contribute when everything in their bin is flagged, in which
/// case the result is flagged too.
pub struct AveragingWriter<W: VisWriter> {
    inner: W,
    time_factor: usize,
    freq_factor: usize,
    cursor: RowCursor,
    num_out_chans: usize,
    timesteps_in_group: usize,
    sums: Vec<BaselineSums>,
    sum_index: HashMap<(usize, usize), usize>,
}

impl<W: VisWriter> AveragingWriter<W> {
    /// Wrap `inner`. Both factors must be at least 1.
    ///
    /// # Errors
    ///
    /// [`IOError::WriterState`] if a factor is zero.
    pub fn new(inner: W, time_factor: usize, freq_factor: usize) -> Result<Self, IOError> {
        if time_factor == 0 || freq_factor == 0 {
            return Err(IOError::WriterState {
                message: format!(
                    "averaging factors must be at least 1, got time {} and frequency {}",
                    time_factor, freq_factor
                ),
            });
        }
        Ok(Self {
            inner,
            time_factor,
            freq_factor,
            cursor: RowCursor::default(),
            num_out_chans: 0,
            timesteps_in_group: 0,
            sums: vec![],
            sum_index: HashMap::new(),
        })
    }

    /// Unwrap the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// The averaged spectral window: channel widths and bandwidths are
    /// summed, frequencies averaged. The last channel may average fewer
    /// input channels.
    pub fn average_band(&self, band: &BandInfo) -> BandInfo {
        let channels = band
            .channels
            .chunks(self.freq_factor)
            .map(|group| {
                let n = group.len() as f64;
                ChannelInfo {
                    frequency_hz: group.iter().map(|c| c.frequency_hz).sum::<f64>() / n,
                    width_hz: group.iter().map(|c| c.width_hz).sum(),
                    effective_bandwidth_hz: group.iter().map(|c| c.effective_bandwidth_hz).sum(),
                    resolution_hz: group.iter().map(|c| c.resolution_hz).sum(),
                }
            })
            .collect();
        BandInfo {
            channels,
            ..band.clone()
        }
    }

    fn flush(&mut self) -> Result<(), IOError> {
        if self.sums.is_empty() {
            self.timesteps_in_group = 0;
            return Ok(());
        }
        trace!(
            "flushing {} averaged baselines over {} timesteps",
            self.sums.len(),
            self.timesteps_in_group
        );
        self.inner.add_rows(self.sums.len())?;
        for sums in self.sums.drain(..) {
            let n = sums.num_rows as f64;
            let (data, flags, weights) = sums.finish();
            self.inner.write_row(&VisRow {
                time_mjd_s: sums.time_sum / n,
                antenna1: sums.antenna1,
                antenna2: sums.antenna2,
                uvw: UVW {
                    u: sums.uvw_sum[0] / n,
                    v: sums.uvw_sum[1] / n,
                    w: sums.uvw_sum[2] / n,
                },
                exposure_s: sums.exposure_sum,
                data: &data,
                flags: &flags,
                weights: &weights,
            })?;
        }
        self.sum_index.clear();
        self.timesteps_in_group = 0;
        Ok(())
    }
}

impl<W: VisWriter> VisWriter for AveragingWriter<W> {
    fn write_antennae(
        &mut self,
        antennae: &[AntennaInfo],
        start_time_mjd_s: f64,
    ) -> Result<(), IOError> {
        self.inner.write_antennae(antennae, start_time_mjd_s)
    }

    fn write_band_info(&mut self, band: &BandInfo) -> Result<(), IOError> {
        self.cursor.set_band(band)?;
        let averaged = self.average_band(band);
        self.num_out_chans = averaged.channels.len();
        debug!(
            "averaging {} channels to {}, {} timesteps per output timestep",
            band.channels.len(),
            self.num_out_chans,
            self.time_factor
        );
        self.inner.write_band_info(&averaged)
    }

    fn write_source(&mut self, source: &SourceInfo) -> Result<(), IOError> {
        self.inner.write_source(source)
    }

    fn write_field(&mut self, field: &FieldInfo) -> Result<(), IOError> {
        self.inner.write_field(field)
    }

    fn write_observation(&mut self, observation: &ObservationInfo) -> Result<(), IOError> {
        self.inner.write_observation(observation)
    }

    fn add_rows(&mut self, count: usize) -> Result<(), IOError> {
        self.cursor.add_rows(count)?;
        self.timesteps_in_group += 1;
        Ok(())
    }

    fn write_row(&mut self, row: &VisRow<'_>) -> Result<(), IOError> {
        self.cursor.write_row(row)?;
        let num_samples = self.num_out_chans * NUM_POL_PRODUCTS;
        let next_idx = self.sums.len();
        let idx = *self
            .sum_index
            .entry((row.antenna1, row.antenna2))
            .or_insert(next_idx);
        if idx == next_idx {
            self.sums
                .push(BaselineSums::new(row.antenna1, row.antenna2, num_samples));
        }
        self.sums[idx].add(row, self.freq_factor);

        if self.cursor.pending() == 0 && self.timesteps_in_group == self.time_factor {
            self.flush()?;
        }
        Ok(())
    }

    fn write_statistics(&mut self, statistics: &QualityStatistics) -> Result<(), IOError> {
        self.inner.write_statistics(statistics)
    }

    fn write_keywords(&mut self, keywords: &AartfaacKeywords) -> Result<(), IOError> {
        self.inner.write_keywords(keywords)
    }

    fn finalise(&mut self) -> Result<(), IOError> {
        self.cursor.finalise()?;
        // partial trailing group
        self.flush()?;
        self.inner.finalise()
    }
}
