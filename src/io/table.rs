//! A minimal on-disk container for converted visibilities.
//!
//! The output is a directory holding
//! - `rows.bin`: fixed-size little-endian row records, in the order written.
//!   Each record is `time: f64, antenna1: u32, antenna2: u32, u: f64, v: f64,
//!   w: f64, exposure: f64, num_samples: u32` followed by `num_samples` of
//!   `re: f32, im: f32, flag: u8, weight: f32`.
//! - `metadata.txt`: `KEY = value` lines describing the antennae, band,
//!   source, field, observation, keywords and statistics.

use std::{
    fmt::Write as _,
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, WriteBytesExt};
use itertools::izip;
use log::{info, trace};

use super::{
    error::IOError,
    writer::{
        AartfaacKeywords, AntennaInfo, BandInfo, FieldInfo, ObservationInfo, RowCursor,
        SourceInfo, VisRow, VisWriter,
    },
};
use crate::statistics::QualityStatistics;

/// File name of the row records inside the table directory.
pub const ROWS_FILE: &str = "rows.bin";
/// File name of the metadata inside the table directory.
pub const METADATA_FILE: &str = "metadata.txt";

/// Writes a table directory, see the module documentation.
pub struct TableWriter {
    path: PathBuf,
    rows: BufWriter<File>,
    metadata: String,
    num_rows: usize,
    cursor: RowCursor,
}

impl TableWriter {
    /// Create the directory at `path` (and its parents) and start a new row
    /// file, replacing any existing one.
    ///
    /// # Errors
    ///
    /// [`IOError::StdIo`] if the directory or row file can't be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, IOError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path)?;
        let rows = BufWriter::new(File::create(path.join(ROWS_FILE))?);
        Ok(Self {
            path,
            rows,
            metadata: String::new(),
            num_rows: 0,
            cursor: RowCursor::default(),
        })
    }

    /// Number of rows written so far.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn push_metadata(&mut self, key: &str, value: impl std::fmt::Display) {
        // writing to a String can't fail
        let _ = writeln!(self.metadata, "{} = {}", key, value);
    }
}

impl VisWriter for TableWriter {
    fn write_antennae(
        &mut self,
        antennae: &[AntennaInfo],
        start_time_mjd_s: f64,
    ) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.push_metadata("ANTENNA_START_TIME", start_time_mjd_s);
        for (idx, ant) in antennae.iter().enumerate() {
            self.push_metadata(
                &format!("ANTENNA_{}", idx),
                format!(
                    "{} {} {} {} [{}, {}, {}] {} {}",
                    ant.name,
                    ant.station,
                    ant.antenna_type,
                    ant.mount,
                    ant.position.x,
                    ant.position.y,
                    ant.position.z,
                    ant.diameter,
                    ant.flag
                ),
            );
        }
        Ok(())
    }

    fn write_band_info(&mut self, band: &BandInfo) -> Result<(), IOError> {
        self.cursor.set_band(band)?;
        self.push_metadata("BAND_NAME", &band.name);
        self.push_metadata("BAND_REF_FREQUENCY", band.ref_freq_hz);
        self.push_metadata("BAND_TOTAL_BANDWIDTH", band.total_bandwidth_hz);
        self.push_metadata("BAND_NUM_CHANNELS", band.channels.len());
        for (idx, chan) in band.channels.iter().enumerate() {
            self.push_metadata(
                &format!("CHANNEL_{}", idx),
                format!(
                    "{} {} {} {}",
                    chan.frequency_hz,
                    chan.width_hz,
                    chan.effective_bandwidth_hz,
                    chan.resolution_hz
                ),
            );
        }
        Ok(())
    }

    fn write_source(&mut self, source: &SourceInfo) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.push_metadata("SOURCE_NAME", &source.name);
        self.push_metadata("SOURCE_ID", source.id);
        self.push_metadata("SOURCE_TIME", source.time_mjd_s);
        self.push_metadata("SOURCE_INTERVAL", source.interval_s);
        self.push_metadata(
            "SOURCE_DIRECTION",
            format!("{} {}", source.direction.ra, source.direction.dec),
        );
        Ok(())
    }

    fn write_field(&mut self, field: &FieldInfo) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.push_metadata("FIELD_NAME", &field.name);
        for (key, dir) in [
            ("FIELD_DELAY_DIR", field.delay_direction),
            ("FIELD_PHASE_DIR", field.phase_direction),
            ("FIELD_REFERENCE_DIR", field.reference_direction),
        ] {
            self.push_metadata(key, format!("{} {}", dir.ra, dir.dec));
        }
        Ok(())
    }

    fn write_observation(&mut self, observation: &ObservationInfo) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.push_metadata("OBSERVATION_TELESCOPE", &observation.telescope_name);
        self.push_metadata("OBSERVATION_OBSERVER", &observation.observer);
        self.push_metadata("OBSERVATION_SCHEDULE_TYPE", &observation.schedule_type);
        self.push_metadata("OBSERVATION_PROJECT", &observation.project);
        self.push_metadata(
            "OBSERVATION_TIME_RANGE",
            format!("{} {}", observation.start_mjd_s, observation.end_mjd_s),
        );
        self.push_metadata("OBSERVATION_COMMAND_LINE", &observation.command_line);
        Ok(())
    }

    fn add_rows(&mut self, count: usize) -> Result<(), IOError> {
        self.cursor.add_rows(count)
    }

    fn write_row(&mut self, row: &VisRow<'_>) -> Result<(), IOError> {
        self.cursor.write_row(row)?;
        let out = &mut self.rows;
        out.write_f64::<LittleEndian>(row.time_mjd_s)?;
        out.write_u32::<LittleEndian>(row.antenna1 as u32)?;
        out.write_u32::<LittleEndian>(row.antenna2 as u32)?;
        out.write_f64::<LittleEndian>(row.uvw.u)?;
        out.write_f64::<LittleEndian>(row.uvw.v)?;
        out.write_f64::<LittleEndian>(row.uvw.w)?;
        out.write_f64::<LittleEndian>(row.exposure_s)?;
        out.write_u32::<LittleEndian>(row.data.len() as u32)?;
        for (vis, &flag, &weight) in izip!(row.data, row.flags, row.weights) {
            out.write_f32::<LittleEndian>(vis.re)?;
            out.write_f32::<LittleEndian>(vis.im)?;
            out.write_u8(flag as u8)?;
            out.write_f32::<LittleEndian>(weight)?;
        }
        self.num_rows += 1;
        Ok(())
    }

    fn write_statistics(&mut self, statistics: &QualityStatistics) -> Result<(), IOError> {
        self.cursor.check_open()?;
        for line in statistics.to_string().lines() {
            self.push_metadata("STATISTICS", line);
        }
        Ok(())
    }

    fn write_keywords(&mut self, keywords: &AartfaacKeywords) -> Result<(), IOError> {
        self.cursor.check_open()?;
        self.push_metadata("AARTFAAC_AF2MS_VERSION", &keywords.version);
        self.push_metadata("AARTFAAC_RCU_MODE", keywords.mode);
        self.push_metadata("AARTFAAC_ANTENNA_TYPE", &keywords.band_label);
        self.push_metadata("AARTFAAC_FLAG_WINDOW_SIZE", keywords.flag_window_size);
        self.push_metadata(
            "AARTFAAC_COORDINATE_AXES",
            keywords
                .axes
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        );
        Ok(())
    }

    fn finalise(&mut self) -> Result<(), IOError> {
        trace!("start TableWriter::finalise");
        self.cursor.finalise()?;
        self.rows.flush()?;
        let num_rows = self.num_rows;
        self.push_metadata("NUM_ROWS", num_rows);
        std::fs::write(self.path.join(METADATA_FILE), &self.metadata)?;
        info!("wrote {} rows to {}", self.num_rows, self.path.display());
        trace!("end TableWriter::finalise");
        Ok(())
    }
}
