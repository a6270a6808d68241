//! The writer chain: everything that ends up in the output goes through
//! [`VisWriter`].
//!
//! The pipeline writes all metadata up front, then for each output timestep
//! calls [`VisWriter::add_rows`] once followed by one [`VisWriter::write_row`]
//! per baseline. Statistics and keywords are written once after the last
//! row, before [`VisWriter::finalise`].
//!
//! Visibilities, flags and weights of a row are ordered channel-major, then
//! polarisation (XX, XY, YX, YY).

use log::trace;
use marlu::{RADec, XyzGeocentric, UVW};

use super::error::IOError;
use crate::{statistics::QualityStatistics, Complex};

/// One entry of the antenna table.
#[derive(Clone, Debug)]
pub struct AntennaInfo {
    /// e.g. `A12_0`
    pub name: String,
    /// Station the antenna belongs to
    pub station: String,
    /// e.g. `GROUND-BASED`
    pub antenna_type: String,
    /// e.g. `ALT-AZ`
    pub mount: String,
    /// ITRF position \[metres\]
    pub position: XyzGeocentric,
    /// Dish diameter \[metres\]
    pub diameter: f64,
    /// Whether the whole antenna is flagged
    pub flag: bool,
}

/// One channel of the spectral window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelInfo {
    /// Centre frequency \[Hz\]
    pub frequency_hz: f64,
    /// Channel width \[Hz\]
    pub width_hz: f64,
    /// Effective noise bandwidth \[Hz\]
    pub effective_bandwidth_hz: f64,
    /// Spectral resolution \[Hz\]
    pub resolution_hz: f64,
}

/// The spectral window.
#[derive(Clone, Debug, PartialEq)]
pub struct BandInfo {
    /// e.g. `AARTF_BAND_58.6`
    pub name: String,
    /// Every channel, in increasing frequency
    pub channels: Vec<ChannelInfo>,
    /// Reference (centre) frequency \[Hz\]
    pub ref_freq_hz: f64,
    /// Total bandwidth \[Hz\]
    pub total_bandwidth_hz: f64,
}

/// The single observed source.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    /// Source name
    pub name: String,
    /// Source id
    pub id: usize,
    /// Midpoint of the validity interval \[MJD seconds\]
    pub time_mjd_s: f64,
    /// Validity interval \[seconds\]
    pub interval_s: f64,
    /// Direction of the source
    pub direction: RADec,
}

/// The single field.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Delay tracking centre
    pub delay_direction: RADec,
    /// Phase centre
    pub phase_direction: RADec,
    /// Reference direction
    pub reference_direction: RADec,
}

/// The observation record.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationInfo {
    /// Telescope name
    pub telescope_name: String,
    /// Observer name
    pub observer: String,
    /// Schedule type
    pub schedule_type: String,
    /// Project name
    pub project: String,
    /// Start of the observation \[MJD seconds\]
    pub start_mjd_s: f64,
    /// End of the observation \[MJD seconds\]
    pub end_mjd_s: f64,
    /// The shell-quoted command line that produced the output
    pub command_line: String,
}

/// Instrument specific keywords written at the end of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct AartfaacKeywords {
    /// Version of the converter
    pub version: String,
    /// Receiver mode number (1-7)
    pub mode: u8,
    /// `LBA` or `HBA`
    pub band_label: String,
    /// Timesteps per flagging window
    pub flag_window_size: usize,
    /// Row-major coordinate axes of the station
    pub axes: [f64; 9],
}

/// A row being written, borrowing its arrays from the caller.
#[derive(Clone, Copy, Debug)]
pub struct VisRow<'a> {
    /// Start of the integration \[MJD seconds\]
    pub time_mjd_s: f64,
    /// First antenna index
    pub antenna1: usize,
    /// Second antenna index
    pub antenna2: usize,
    /// Baseline coordinates \[metres\]
    pub uvw: UVW,
    /// Integration time \[seconds\]
    pub exposure_s: f64,
    /// Visibilities, `[channel][pol]`
    pub data: &'a [Complex<f32>],
    /// Flags, `[channel][pol]`
    pub flags: &'a [bool],
    /// Weights, `[channel][pol]`
    pub weights: &'a [f32],
}

impl VisRow<'_> {
    /// Check that the data, flag and weight arrays all have `expected`
    /// elements.
    ///
    /// # Errors
    ///
    /// [`IOError::WriterState`] describing the mismatch.
    pub fn check_len(&self, expected: usize) -> Result<(), IOError> {
        if self.data.len() != expected
            || self.flags.len() != expected
            || self.weights.len() != expected
        {
            return Err(IOError::WriterState {
                message: format!(
                    "row {}-{} has {} visibilities, {} flags and {} weights, expected {}",
                    self.antenna1,
                    self.antenna2,
                    self.data.len(),
                    self.flags.len(),
                    self.weights.len(),
                    expected
                ),
            });
        }
        Ok(())
    }
}

/// An owned copy of a [`VisRow`].
#[derive(Clone, Debug)]
pub struct RowRecord {
    /// Start of the integration \[MJD seconds\]
    pub time_mjd_s: f64,
    /// First antenna index
    pub antenna1: usize,
    /// Second antenna index
    pub antenna2: usize,
    /// Baseline coordinates \[metres\]
    pub uvw: UVW,
    /// Integration time \[seconds\]
    pub exposure_s: f64,
    /// Visibilities, `[channel][pol]`
    pub data: Vec<Complex<f32>>,
    /// Flags, `[channel][pol]`
    pub flags: Vec<bool>,
    /// Weights, `[channel][pol]`
    pub weights: Vec<f32>,
}

impl From<&VisRow<'_>> for RowRecord {
    fn from(row: &VisRow<'_>) -> Self {
        Self {
            time_mjd_s: row.time_mjd_s,
            antenna1: row.antenna1,
            antenna2: row.antenna2,
            uvw: row.uvw,
            exposure_s: row.exposure_s,
            data: row.data.to_vec(),
            flags: row.flags.to_vec(),
            weights: row.weights.to_vec(),
        }
    }
}

/// A sink for converted visibilities and their metadata.
///
/// Decorators such as [`super::averaging::AveragingWriter`] own the next
/// writer in the chain and forward to it.
pub trait VisWriter {
    /// Write the antenna table. `start_time_mjd_s` is the start of the
    /// observation.
    ///
    /// # Errors
    ///
    /// Any failure of the backend.
    fn write_antennae(
        &mut self,
        antennae: &[AntennaInfo],
        start_time_mjd_s: f64,
    ) -> Result<(), IOError>;

    /// Write the spectral window. This fixes the number of channels of each
    /// row.
    ///
    /// # Errors
    ///
    /// Any failure of the backend.
    fn write_band_info(&mut self, band: &BandInfo) -> Result<(), IOError>;

    /// Write the source table.
    ///
    /// # Errors
    ///
    /// Any failure of the backend.
    fn write_source(&mut self, source: &SourceInfo) -> Result<(), IOError>;

    /// Write the field table.
    ///
    /// # Errors
    ///
    /// Any failure of the backend.
    fn write_field(&mut self, field: &FieldInfo) -> Result<(), IOError>;

    /// Write the observation table.
    ///
    /// # Errors
    ///
    /// Any failure of the backend.
    fn write_observation(&mut self, observation: &ObservationInfo) -> Result<(), IOError>;

    /// Announce the rows of the next timestep.
    ///
    /// # Errors
    ///
    /// [`IOError::WriterState`] if rows of the previous timestep are missing.
    fn add_rows(&mut self, count: usize) -> Result<(), IOError>;

    /// Write one row announced by [`VisWriter::add_rows`].
    ///
    /// # Errors
    ///
    /// [`IOError::WriterState`] if the row was not announced or has the wrong
    /// number of channels, or any failure of the backend.
    fn write_row(&mut self, row: &VisRow<'_>) -> Result<(), IOError>;

    /// Write the run-wide quality statistics.
    ///
    /// # Errors
    ///
    /// Any failure of the backend.
    fn write_statistics(&mut self, statistics: &QualityStatistics) -> Result<(), IOError>;

    /// Write the instrument specific keywords.
    ///
    /// # Errors
    ///
    /// Any failure of the backend.
    fn write_keywords(&mut self, keywords: &AartfaacKeywords) -> Result<(), IOError>;

    /// Flush everything. Nothing may be written afterwards.
    ///
    /// # Errors
    ///
    /// Any failure of the backend.
    fn finalise(&mut self) -> Result<(), IOError>;
}

impl<W: VisWriter + ?Sized> VisWriter for Box<W> {
    fn write_antennae(
        &mut self,
        antennae: &[AntennaInfo],
        start_time_mjd_s: f64,
    ) -> Result<(), IOError> {
        (**self).write_antennae(antennae, start_time_mjd_s)
    }

    fn write_band_info(&mut self, band: &BandInfo) -> Result<(), IOError> {
        (**self).write_band_info(band)
    }

    fn write_source(&mut self, source: &SourceInfo) -> Result<(), IOError> {
        (**self).write_source(source)
    }

    fn write_field(&mut self, field: &FieldInfo) -> Result<(), IOError> {
        (**self).write_field(field)
    }

    fn write_observation(&mut self, observation: &ObservationInfo) -> Result<(), IOError> {
        (**self).write_observation(observation)
    }

    fn add_rows(&mut self, count: usize) -> Result<(), IOError> {
        (**self).add_rows(count)
    }

    fn write_row(&mut self, row: &VisRow<'_>) -> Result<(), IOError> {
        (**self).write_row(row)
    }

    fn write_statistics(&mut self, statistics: &QualityStatistics) -> Result<(), IOError> {
        (**self).write_statistics(statistics)
    }

    fn write_keywords(&mut self, keywords: &AartfaacKeywords) -> Result<(), IOError> {
        (**self).write_keywords(keywords)
    }

    fn finalise(&mut self) -> Result<(), IOError> {
        (**self).finalise()
    }
}

/// Bookkeeping of announced and written rows, shared by the writers.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RowCursor {
    pub(crate) num_chans: Option<usize>,
    pending: usize,
    finalised: bool,
}

impl RowCursor {
    pub(crate) fn set_band(&mut self, band: &BandInfo) -> Result<(), IOError> {
        self.check_open()?;
        self.num_chans = Some(band.channels.len());
        Ok(())
    }

    pub(crate) fn add_rows(&mut self, count: usize) -> Result<(), IOError> {
        self.check_open()?;
        if self.pending != 0 {
            return Err(IOError::WriterState {
                message: format!(
                    "{} rows were announced but not written before adding {} more",
                    self.pending, count
                ),
            });
        }
        self.pending = count;
        Ok(())
    }

    pub(crate) fn write_row(&mut self, row: &VisRow<'_>) -> Result<(), IOError> {
        self.check_open()?;
        let num_chans = self.num_chans.ok_or_else(|| IOError::WriterState {
            message: "rows written before the band info".to_string(),
        })?;
        if self.pending == 0 {
            return Err(IOError::WriterState {
                message: "row written without add_rows".to_string(),
            });
        }
        row.check_len(num_chans * crate::constants::NUM_POL_PRODUCTS)?;
        self.pending -= 1;
        Ok(())
    }

    /// Rows announced but not yet written.
    pub(crate) fn pending(&self) -> usize {
        self.pending
    }

    pub(crate) fn finalise(&mut self) -> Result<(), IOError> {
        self.check_open()?;
        self.finalised = true;
        Ok(())
    }

    pub(crate) fn check_open(&self) -> Result<(), IOError> {
        if self.finalised {
            return Err(IOError::WriterState {
                message: "writer used after finalise".to_string(),
            });
        }
        Ok(())
    }
}

/// Collects everything in memory. Handy for tests and for library users who
/// want to do their own persistence.
#[derive(Clone, Debug, Default)]
pub struct MemoryWriter {
    /// The antenna table
    pub antennae: Vec<AntennaInfo>,
    /// Start of the observation \[MJD seconds\]
    pub start_time_mjd_s: Option<f64>,
    /// The spectral window
    pub band: Option<BandInfo>,
    /// The source
    pub source: Option<SourceInfo>,
    /// The field
    pub field: Option<FieldInfo>,
    /// The observation
    pub observation: Option<ObservationInfo>,
    /// Every row, in the order written
    pub rows: Vec<RowRecord>,
    /// Number of rows announced per [`VisWriter::add_rows`] call
    pub row_batches: Vec<usize>,
    /// The quality statistics
    pub statistics: Option<QualityStatistics>,
    /// The instrument keywords
    pub keywords: Option<AartfaacKeywords>,
    /// Whether [`VisWriter::finalise`] was called
    pub finalised: bool,
    cursor: RowCursor,
}

impl VisWriter for MemoryWriter {
    fn write_antennae(
        &mut self,
        antennae: &[AntennaInfo],
        start_time_mjd_s: f64,
    ) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.antennae = antennae.to_vec();
        self.start_time_mjd_s = Some(start_time_mjd_s);
        Ok(())
    }

    fn write_band_info(&mut self, band: &BandInfo) -> Result<(), IOError> {
        self.cursor.set_band(band)?;
        self.band = Some(band.clone());
        Ok(())
    }

    fn write_source(&mut self, source: &SourceInfo) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.source = Some(source.clone());
        Ok(())
    }

    fn write_field(&mut self, field: &FieldInfo) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.field = Some(field.clone());
        Ok(())
    }

    fn write_observation(&mut self, observation: &ObservationInfo) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.observation = Some(observation.clone());
        Ok(())
    }

    fn add_rows(&mut self, count: usize) -> Result<(), IOError> {
        self.cursor.add_rows(count)?;
        self.row_batches.push(count);
        self.rows.reserve(count);
        Ok(())
    }

    fn write_row(&mut self, row: &VisRow<'_>) -> Result<(), IOError> {
        self.cursor.write_row(row)?;
        self.rows.push(row.into());
        Ok(())
    }

    fn write_statistics(&mut self, statistics: &QualityStatistics) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.statistics = Some(statistics.clone());
        Ok(())
    }

    fn write_keywords(&mut self, keywords: &AartfaacKeywords) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.keywords = Some(keywords.clone());
        Ok(())
    }

    fn finalise(&mut self) -> Result<(), IOError> {
        trace!("finalising memory writer with {} rows", self.rows.len());
        self.cursor.finalise()?;
        self.finalised = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(num_chans: usize) -> BandInfo {
        BandInfo {
            name: "AARTF_BAND_58.6".into(),
            channels: (0..num_chans)
                .map(|ch| ChannelInfo {
                    frequency_hz: 58e6 + ch as f64,
                    width_hz: 1.,
                    effective_bandwidth_hz: 1.,
                    resolution_hz: 1.,
                })
                .collect(),
            ref_freq_hz: 58e6,
            total_bandwidth_hz: num_chans as f64,
        }
    }

    fn row<'a>(data: &'a [Complex<f32>], flags: &'a [bool], weights: &'a [f32]) -> VisRow<'a> {
        VisRow {
            time_mjd_s: 0.,
            antenna1: 0,
            antenna2: 1,
            uvw: UVW::default(),
            exposure_s: 1.,
            data,
            flags,
            weights,
        }
    }

    #[test]
    fn test_memory_writer_collects_rows() {
        let mut writer = MemoryWriter::default();
        writer.write_band_info(&band(2)).unwrap();
        let data = vec![Complex::new(1., 2.); 8];
        let flags = vec![false; 8];
        let weights = vec![3.; 8];
        writer.add_rows(2).unwrap();
        writer.write_row(&row(&data, &flags, &weights)).unwrap();
        writer.write_row(&row(&data, &flags, &weights)).unwrap();
        writer.finalise().unwrap();
        assert_eq!(writer.rows.len(), 2);
        assert_eq!(writer.row_batches, vec![2]);
        assert_eq!(writer.rows[1].data, data);
        assert!(writer.finalised);
    }

    #[test]
    fn test_memory_writer_rejects_misuse() {
        let data = vec![Complex::default(); 8];
        let flags = vec![false; 8];
        let weights = vec![1.; 8];

        let mut writer = MemoryWriter::default();
        writer.add_rows(1).unwrap();
        // no band info yet
        assert!(writer.write_row(&row(&data, &flags, &weights)).is_err());

        let mut writer = MemoryWriter::default();
        writer.write_band_info(&band(2)).unwrap();
        assert!(writer.write_row(&row(&data, &flags, &weights)).is_err());
        writer.add_rows(1).unwrap();
        assert!(writer.add_rows(1).is_err());
        assert!(writer
            .write_row(&row(&data[..4], &flags[..4], &weights[..4]))
            .is_err());

        let mut writer = MemoryWriter::default();
        writer.finalise().unwrap();
        assert!(writer.write_band_info(&band(1)).is_err());
        assert!(writer.finalise().is_err());
    }
}
