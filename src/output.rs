//! Assembling output rows from the buffers of a processed chunk.

use log::trace;

use crate::{
    buffers::BaselineBufferSet,
    constants::NUM_POL_PRODUCTS,
    corrections::GeometryCorrector,
    error::Af2msError,
    flags::FlagMask,
    io::writer::{VisRow, VisWriter},
    types::Timestep,
    util::progress_bar,
    Complex,
};

/// Fill `weights` (`[channel][pol]`) with the weight of each sample, the
/// product of the exposure \[seconds\] and the channel width \[Hz\].
pub fn fill_weights(exposure_s: f64, channel_widths_hz: &[f64], weights: &mut Vec<f32>) {
    weights.clear();
    for &width_hz in channel_widths_hz {
        let weight = (exposure_s * width_hz) as f32;
        weights.extend([weight; NUM_POL_PRODUCTS]);
    }
}

/// Writes the rows of each timestep of a chunk, after the geometric
/// correction, to a writer chain.
pub struct OutputAssembler<'a> {
    corrector: GeometryCorrector<'a>,
    channel_widths_hz: Vec<f64>,
    data: Vec<Complex<f32>>,
    flags: Vec<bool>,
    weights: Vec<f32>,
}

impl<'a> OutputAssembler<'a> {
    /// An assembler for channels of the given widths \[Hz\].
    pub fn new(corrector: GeometryCorrector<'a>, channel_widths_hz: Vec<f64>) -> Self {
        let num_samples = channel_widths_hz.len() * NUM_POL_PRODUCTS;
        Self {
            corrector,
            channel_widths_hz,
            data: Vec::with_capacity(num_samples),
            flags: Vec::with_capacity(num_samples),
            weights: Vec::with_capacity(num_samples),
        }
    }

    fn check_shapes(
        &self,
        buffers: &BaselineBufferSet,
        masks: &[FlagMask],
    ) -> Result<(), Af2msError> {
        if masks.len() != buffers.baselines().len()
            || buffers.num_chans() != self.channel_widths_hz.len()
        {
            return Err(Af2msError::BadArrayShape {
                argument: "masks".into(),
                function: "OutputAssembler::write_timestep".into(),
                expected: format!(
                    "{} masks of {} channels",
                    buffers.baselines().len(),
                    self.channel_widths_hz.len()
                ),
                received: format!("{} masks of {} channels", masks.len(), buffers.num_chans()),
            });
        }
        for (buffer, mask) in buffers.buffers().iter().zip(masks) {
            mask.check_shape(buffer)?;
        }
        Ok(())
    }

    /// Write the rows of local timestep `time` of `buffers`, which spans
    /// `timestep`. One row per baseline, in canonical order.
    ///
    /// # Errors
    ///
    /// [`Af2msError::BadArrayShape`] if the masks don't match the buffers,
    /// any geometry error, or any error of the writer.
    pub fn write_timestep<W: VisWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        buffers: &BaselineBufferSet,
        masks: &[FlagMask],
        time: usize,
        timestep: &Timestep,
    ) -> Result<(), Af2msError> {
        self.check_shapes(buffers, masks)?;
        self.corrector.set_epoch(timestep.centroid_epoch())?;
        let exposure_s = timestep.exposure();
        fill_weights(exposure_s, &self.channel_widths_hz, &mut self.weights);

        writer.add_rows(buffers.baselines().len())?;
        for ((&baseline, buffer), mask) in buffers
            .baselines()
            .iter()
            .zip(buffers.buffers())
            .zip(masks)
        {
            self.data.clear();
            self.flags.clear();
            for chan in 0..buffer.num_chans() {
                let flag = mask.get(chan, time);
                for pol in 0..NUM_POL_PRODUCTS {
                    self.data.push(buffer.sample(pol, chan, time));
                    self.flags.push(flag);
                }
            }
            let uvw = self.corrector.correct_baseline(baseline, &mut self.data);
            writer.write_row(&VisRow {
                time_mjd_s: timestep.start_mjd_s(),
                antenna1: baseline.ant1,
                antenna2: baseline.ant2,
                uvw,
                exposure_s,
                data: &self.data,
                flags: &self.flags,
                weights: &self.weights,
            })?;
        }
        Ok(())
    }

    /// Write every timestep of the current chunk, in order.
    ///
    /// # Errors
    ///
    /// see [`OutputAssembler::write_timestep`]
    pub fn write_chunk<W: VisWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        buffers: &BaselineBufferSet,
        masks: &[FlagMask],
        timesteps: &[Timestep],
        draw_progress: bool,
    ) -> Result<(), Af2msError> {
        trace!("start OutputAssembler::write_chunk");
        let write_progress = progress_bar(timesteps.len(), "writing", draw_progress);
        for (time, timestep) in timesteps.iter().enumerate() {
            self.write_timestep(writer, buffers, masks, time, timestep)?;
            write_progress.inc(1);
        }
        write_progress.finish();
        trace!("end OutputAssembler::write_chunk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corrections::{PrecessionUvw, RotationPath},
        io::writer::{BandInfo, ChannelInfo, MemoryWriter},
        test_common::synthetic_vis,
        RADec,
    };
    use approx::assert_abs_diff_eq;
    use marlu::XyzGeocentric;

    #[test]
    fn test_weight_is_exposure_times_width() {
        let mut weights = vec![];
        fill_weights(1.0, &[200_000.], &mut weights);
        assert_eq!(weights, vec![200_000.0; 4]);

        fill_weights(2.0, &[200_000., 100_000.], &mut weights);
        assert_eq!(weights[..4], [400_000.0; 4]);
        assert_eq!(weights[4..], [200_000.0; 4]);

        fill_weights(0.5, &[1e3], &mut weights);
        assert_abs_diff_eq!(weights[0], 500.);
    }

    fn band(num_chans: usize) -> BandInfo {
        BandInfo {
            name: "AARTF_BAND_50.0".into(),
            channels: (0..num_chans)
                .map(|ch| ChannelInfo {
                    frequency_hz: 50e6 + ch as f64 * 1e5,
                    width_hz: 1e5,
                    effective_bandwidth_hz: 1e5,
                    resolution_hz: 1e5,
                })
                .collect(),
            ref_freq_hz: 50e6,
            total_bandwidth_hz: num_chans as f64 * 1e5,
        }
    }

    #[test]
    fn test_rows_in_canonical_order_with_flags_and_weights() {
        let (num_ants, num_chans) = (3, 2);
        let positions = vec![
            XyzGeocentric {
                x: 3_826_577.,
                y: 461_022.,
                z: 5_064_892.,
            };
            num_ants
        ];
        let freqs = [50e6, 50.1e6];
        let service = PrecessionUvw::default();
        let corrector = GeometryCorrector::new(
            &service,
            &positions,
            RADec::from_degrees(0., 52.),
            &freqs,
            RotationPath::Vectorized,
        );
        let mut assembler = OutputAssembler::new(corrector, vec![1e5; num_chans]);

        let mut buffers = BaselineBufferSet::new(num_ants, num_chans, 2);
        for time in 0..2 {
            buffers
                .ingest_timestep(&synthetic_vis(num_ants, num_chans, time), time)
                .unwrap();
        }
        let mut masks: Vec<_> = buffers
            .buffers()
            .iter()
            .map(FlagMask::unflagged_like)
            .collect();
        masks[1].set(1, 1, true);
        let timesteps = [
            Timestep {
                start_unix: 100.,
                end_unix: 101.,
            },
            Timestep {
                start_unix: 101.,
                end_unix: 103.,
            },
        ];

        let mut writer = MemoryWriter::default();
        writer.write_band_info(&band(num_chans)).unwrap();
        assembler
            .write_chunk(&mut writer, &buffers, &masks, &timesteps, false)
            .unwrap();

        assert_eq!(writer.row_batches, vec![6, 6]);
        let pairs: Vec<_> = writer.rows[..6]
            .iter()
            .map(|row| (row.antenna1, row.antenna2))
            .collect();
        assert_eq!(pairs, vec![(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)]);

        let row = &writer.rows[6 + 1];
        assert_eq!(row.time_mjd_s, timesteps[1].start_mjd_s());
        assert_eq!(row.exposure_s, 2.);
        assert_eq!(row.weights, vec![2e5_f32; 8]);
        assert_eq!(row.flags[..4], [false; 4]);
        assert_eq!(row.flags[4..], [true; 4]);
        // identical positions, so nothing is rotated
        let expected: Vec<_> = (0..num_chans)
            .flat_map(|chan| (0..4).map(move |pol| (chan, pol)))
            .map(|(chan, pol)| buffers.buffers()[1].sample(pol, chan, 1))
            .collect();
        assert_eq!(row.data, expected);
    }

    #[test]
    fn test_mismatched_masks_are_rejected() {
        let positions = vec![
            XyzGeocentric {
                x: 3_826_577.,
                y: 461_022.,
                z: 5_064_892.,
            };
            2
        ];
        let freqs = [50e6];
        let service = PrecessionUvw::default();
        let corrector = GeometryCorrector::new(
            &service,
            &positions,
            RADec::from_degrees(0., 52.),
            &freqs,
            RotationPath::Scalar,
        );
        let mut assembler = OutputAssembler::new(corrector, vec![1e5]);
        let buffers = BaselineBufferSet::new(2, 1, 2);
        let masks = vec![FlagMask::new_unflagged(1, 2); 2];
        let timestep = Timestep {
            start_unix: 100.,
            end_unix: 101.,
        };
        let mut writer = MemoryWriter::default();
        writer.write_band_info(&band(1)).unwrap();
        assert!(matches!(
            assembler.write_timestep(&mut writer, &buffers, &masks, 0, &timestep),
            Err(Af2msError::BadArrayShape { .. })
        ));
    }
}
