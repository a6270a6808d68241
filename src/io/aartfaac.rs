//! Reading (and writing) raw AARTFAAC correlator visibility files.
//!
//! A file is a sequence of fixed-size blocks, one per integration. Each block
//! is a 512 byte [`AartfaacHeader`] followed by
//! `nr_baselines * nr_channels * nr_polarizations^2` single precision complex
//! visibilities, ordered baseline-major, then channel, then polarisation.

use std::{
    convert::TryFrom,
    fmt::Display,
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom, Write},
    ops::Range,
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;

use super::error::IOError;
use crate::{
    constants::{
        AARTFAAC_HEADER_BYTES, CORR_HDR_MAGIC, CORR_MODE_FULL_POL, HEADER_PAD_BYTES,
        NUM_HEADER_WEIGHTS, NUM_RECEPTOR_POLS,
    },
    error::Af2msError,
    types::{Baseline, Timestep},
    Complex,
};

lazy_static! {
    static ref SUBBAND_RE: Regex = Regex::new(r"SB(\d{3})").unwrap();
}

/// The receiver (RCU) mode of the observation, which determines the analog
/// filter, the sampling clock and the Nyquist zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AartfaacMode {
    /// LBA_OUTER, 10-90 MHz analog filter
    LbaOuter10_90 = 1,
    /// LBA_OUTER, 30-90 MHz analog filter
    LbaOuter30_90 = 2,
    /// LBA_INNER, 10-90 MHz analog filter
    LbaInner10_90 = 3,
    /// LBA_INNER, 30-90 MHz analog filter
    LbaInner30_90 = 4,
    /// HBA, 110-190 MHz analog filter
    Hba110_190 = 5,
    /// HBA, 170-230 MHz analog filter
    Hba170_230 = 6,
    /// HBA, 210-270 MHz analog filter
    Hba210_270 = 7,
}

impl AartfaacMode {
    /// The mode number as used on the command line and in the output keywords.
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Subband width \[Hz\]: 1/1024 of the sampling clock.
    pub fn bandwidth(&self) -> f64 {
        match self {
            // 160 MHz clock
            Self::Hba170_230 => 156_250.0,
            // 200 MHz clock
            _ => 195_312.5,
        }
    }

    /// Start frequency of the Nyquist zone \[Hz\].
    pub fn frequency_offset(&self) -> f64 {
        match self {
            Self::LbaOuter10_90 | Self::LbaOuter30_90 | Self::LbaInner10_90 | Self::LbaInner30_90 => {
                0.0
            }
            Self::Hba110_190 => 100e6,
            Self::Hba170_230 => 160e6,
            Self::Hba210_270 => 200e6,
        }
    }

    /// Whether this mode uses the low band antennas.
    pub fn is_lba(&self) -> bool {
        self.number() <= 4
    }

    /// `"LBA"` or `"HBA"`. This is also the name of the position array in the
    /// antenna configuration.
    pub fn band_name(&self) -> &'static str {
        if self.is_lba() {
            "LBA"
        } else {
            "HBA"
        }
    }

    /// Name of the coordinate axes array in the antenna configuration.
    pub fn axes_name(&self) -> &'static str {
        if self.is_lba() {
            "LBA_ROTATION_MATRIX"
        } else {
            "HBA0_ROTATION_MATRIX"
        }
    }
}

impl TryFrom<u8> for AartfaacMode {
    type Error = Af2msError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::LbaOuter10_90,
            2 => Self::LbaOuter30_90,
            3 => Self::LbaInner10_90,
            4 => Self::LbaInner30_90,
            5 => Self::Hba110_190,
            6 => Self::Hba170_230,
            7 => Self::Hba210_270,
            _ => {
                return Err(Af2msError::UnknownMode {
                    received: value.to_string(),
                })
            }
        })
    }
}

impl Display for AartfaacMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::LbaOuter10_90 => "LBA_OUTER 10-90 MHz",
                Self::LbaOuter30_90 => "LBA_OUTER 30-90 MHz",
                Self::LbaInner10_90 => "LBA_INNER 10-90 MHz",
                Self::LbaInner30_90 => "LBA_INNER 30-90 MHz",
                Self::Hba110_190 => "HBA 110-190 MHz",
                Self::Hba170_230 => "HBA 170-230 MHz",
                Self::Hba210_270 => "HBA 210-270 MHz",
            }
        )
    }
}

/// The header in front of every integration in a raw correlator file.
#[derive(Clone, Debug, PartialEq)]
pub struct AartfaacHeader {
    /// Should be [`CORR_HDR_MAGIC`]
    pub magic: u32,
    /// Number of receivers (antennas)
    pub nr_receivers: u16,
    /// Number of receptor polarisations per antenna
    pub nr_polarizations: u8,
    /// Bitmask of the correlated polarisation products
    pub correlation_mode: u8,
    /// Start of the integration \[Unix seconds\]
    pub start_time: f64,
    /// End of the integration \[Unix seconds\]
    pub end_time: f64,
    /// Fixed-size field, independent of the number of stations
    pub weights: [u32; NUM_HEADER_WEIGHTS],
    /// Number of samples per integration
    pub nr_samples_per_integration: u32,
    /// Number of channels
    pub nr_channels: u16,
}

impl Default for AartfaacHeader {
    fn default() -> Self {
        Self {
            magic: CORR_HDR_MAGIC,
            nr_receivers: 0,
            nr_polarizations: NUM_RECEPTOR_POLS as u8,
            correlation_mode: CORR_MODE_FULL_POL,
            start_time: 0.0,
            end_time: 0.0,
            weights: [0; NUM_HEADER_WEIGHTS],
            nr_samples_per_integration: 0,
            nr_channels: 0,
        }
    }
}

impl AartfaacHeader {
    /// Read a header from the current position of `reader`.
    ///
    /// # Errors
    ///
    /// Any error from the underlying reader, including a short read.
    pub fn read_from<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        let nr_receivers = reader.read_u16::<LittleEndian>()?;
        let nr_polarizations = reader.read_u8()?;
        let correlation_mode = reader.read_u8()?;
        let start_time = reader.read_f64::<LittleEndian>()?;
        let end_time = reader.read_f64::<LittleEndian>()?;
        let mut weights = [0; NUM_HEADER_WEIGHTS];
        reader.read_u32_into::<LittleEndian>(&mut weights)?;
        let nr_samples_per_integration = reader.read_u32::<LittleEndian>()?;
        let nr_channels = reader.read_u16::<LittleEndian>()?;
        let mut pad = [0_u8; HEADER_PAD_BYTES];
        reader.read_exact(&mut pad)?;
        Ok(Self {
            magic,
            nr_receivers,
            nr_polarizations,
            correlation_mode,
            start_time,
            end_time,
            weights,
            nr_samples_per_integration,
            nr_channels,
        })
    }

    /// Write this header as exactly [`AARTFAAC_HEADER_BYTES`] bytes.
    ///
    /// # Errors
    ///
    /// Any error from the underlying writer.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u16::<LittleEndian>(self.nr_receivers)?;
        writer.write_u8(self.nr_polarizations)?;
        writer.write_u8(self.correlation_mode)?;
        writer.write_f64::<LittleEndian>(self.start_time)?;
        writer.write_f64::<LittleEndian>(self.end_time)?;
        for weight in self.weights {
            writer.write_u32::<LittleEndian>(weight)?;
        }
        writer.write_u32::<LittleEndian>(self.nr_samples_per_integration)?;
        writer.write_u16::<LittleEndian>(self.nr_channels)?;
        writer.write_all(&[0_u8; HEADER_PAD_BYTES])?;
        Ok(())
    }

    /// Validate the fields that determine the payload layout.
    ///
    /// # Errors
    ///
    /// [`IOError::BadMagic`], [`IOError::UnsupportedPolarizations`] or
    /// [`IOError::UnsupportedCorrelationMode`].
    pub fn check(&self, filename: &str) -> Result<(), IOError> {
        if self.magic != CORR_HDR_MAGIC {
            return Err(IOError::BadMagic {
                source_file: file!(),
                source_line: line!(),
                filename: filename.to_string(),
                found: self.magic,
                expected: CORR_HDR_MAGIC,
            });
        }
        if self.nr_polarizations as usize != NUM_RECEPTOR_POLS {
            return Err(IOError::UnsupportedPolarizations {
                source_file: file!(),
                source_line: line!(),
                filename: filename.to_string(),
                found: self.nr_polarizations,
                expected: NUM_RECEPTOR_POLS as u8,
            });
        }
        if self.correlation_mode != CORR_MODE_FULL_POL {
            return Err(IOError::UnsupportedCorrelationMode {
                source_file: file!(),
                source_line: line!(),
                filename: filename.to_string(),
                found: self.correlation_mode,
                expected: CORR_MODE_FULL_POL,
            });
        }
        Ok(())
    }

    /// Number of baselines, including autos.
    pub fn num_baselines(&self) -> usize {
        Baseline::count(self.nr_receivers as usize)
    }

    /// Number of complex visibilities following each header.
    pub fn vis_per_timestep(&self) -> usize {
        let num_pols = self.nr_polarizations as usize;
        self.num_baselines() * self.nr_channels as usize * num_pols * num_pols
    }

    /// The time span described by this header.
    pub fn timestep(&self) -> Timestep {
        Timestep {
            start_unix: self.start_time,
            end_unix: self.end_time,
        }
    }
}

impl Display for AartfaacHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let magic_name = if self.magic == CORR_HDR_MAGIC {
            "CORR_HDR_MAGIC"
        } else {
            "????"
        };
        writeln!(f, "magic = {:#010x} {}", self.magic, magic_name)?;
        writeln!(f, "nrReceivers = {}", self.nr_receivers)?;
        writeln!(f, "nrPolarizations = {}", self.nr_polarizations)?;
        writeln!(f, "correlationMode = {}", self.correlation_mode)?;
        writeln!(f, "startTime = {}", self.start_time)?;
        writeln!(
            f,
            "endTime = {} (total: {} s)",
            self.end_time,
            self.end_time - self.start_time
        )?;
        writeln!(
            f,
            "weights = [{}]",
            self.weights
                .iter()
                .map(|w| w.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )?;
        writeln!(
            f,
            "nrSamplesPerIntegration = {}",
            self.nr_samples_per_integration
        )?;
        writeln!(f, "nrChannels = {}", self.nr_channels)
    }
}

/// Parse the subband index from a file name such as `SB320.vis`. The last
/// `SB` followed by three digits wins.
///
/// # Errors
///
/// [`IOError::MissingSubband`] if there is no such pattern.
pub fn parse_subband(filename: &str) -> Result<usize, IOError> {
    SUBBAND_RE
        .captures_iter(filename)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| IOError::MissingSubband {
            filename: filename.to_string(),
        })
}

/// Frequency set-up of a file opened with a receiver mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandSetup {
    /// The receiver mode
    pub mode: AartfaacMode,
    /// Subband index parsed from the file name
    pub subband: usize,
    /// Subband width \[Hz\]
    pub bandwidth: f64,
    /// Centre frequency of the subband \[Hz\]
    pub frequency: f64,
}

impl BandSetup {
    /// Frequency set-up of subband `subband` in `mode`.
    pub fn new(mode: AartfaacMode, subband: usize) -> Self {
        let bandwidth = mode.bandwidth();
        Self {
            mode,
            subband,
            bandwidth,
            frequency: bandwidth * subband as f64 + mode.frequency_offset(),
        }
    }
}

/// Sequential reader over the blocks of a raw correlator file.
pub struct AartfaacFile<R: Read + Seek = BufReader<File>> {
    reader: R,
    filename: String,
    header: AartfaacHeader,
    band: Option<BandSetup>,
    file_size: u64,
    block_pos: usize,
    scratch: Vec<f32>,
}

impl AartfaacFile<BufReader<File>> {
    /// Open a file for conversion. The subband index is parsed from the file
    /// name and combined with `mode` to get the frequency set-up.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be read, its first header is invalid, or the
    /// name does not contain a subband index.
    pub fn open<P: AsRef<Path>>(path: P, mode: AartfaacMode) -> Result<Self, IOError> {
        let filename = path.as_ref().display().to_string();
        let reader = BufReader::new(File::open(path.as_ref())?);
        Self::from_reader(reader, &filename, Some(mode))
    }

    /// Open a file without a frequency set-up, which is all `afedit` needs.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be read or its first header is invalid.
    pub fn open_unbanded<P: AsRef<Path>>(path: P) -> Result<Self, IOError> {
        let filename = path.as_ref().display().to_string();
        let reader = BufReader::new(File::open(path.as_ref())?);
        Self::from_reader(reader, &filename, None)
    }
}

impl<R: Read + Seek> AartfaacFile<R> {
    /// Read the first header of `reader` and measure its length. `filename`
    /// is only used for the subband index and error messages.
    ///
    /// # Errors
    ///
    /// Fails if the first header can't be read or is invalid, or if `mode` is
    /// given and `filename` does not contain a subband index.
    pub fn from_reader(
        mut reader: R,
        filename: &str,
        mode: Option<AartfaacMode>,
    ) -> Result<Self, IOError> {
        trace!("start AartfaacFile::from_reader");
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let header = AartfaacHeader::read_from(&mut reader).map_err(|source| IOError::ShortRead {
            filename: filename.to_string(),
            timestep: 0,
            source,
        })?;
        header.check(filename)?;
        debug!("first header of {}:\n{}", filename, header);

        let band = match mode {
            Some(mode) => {
                let subband = parse_subband(filename)?;
                let band = BandSetup::new(mode, subband);
                debug!(
                    "subband {} in mode {} is centred at {} Hz",
                    subband, mode, band.frequency
                );
                Some(band)
            }
            None => None,
        };

        let mut result = Self {
            reader,
            filename: filename.to_string(),
            scratch: vec![0.; header.vis_per_timestep() * 2],
            header,
            band,
            file_size,
            block_pos: 0,
        };
        result.seek_to_timestep(0)?;
        trace!("end AartfaacFile::from_reader");
        Ok(result)
    }

    /// Size of a header plus its payload in bytes.
    pub fn block_bytes(&self) -> u64 {
        (AARTFAAC_HEADER_BYTES + self.payload_bytes()) as u64
    }

    fn payload_bytes(&self) -> usize {
        self.header.vis_per_timestep() * std::mem::size_of::<Complex<f32>>()
    }

    /// Number of whole blocks in the file.
    pub fn num_timesteps(&self) -> usize {
        (self.file_size / self.block_bytes()) as usize
    }

    /// Move to the start of block `timestep`.
    ///
    /// # Errors
    ///
    /// Any error from the underlying seek.
    pub fn seek_to_timestep(&mut self, timestep: usize) -> Result<(), IOError> {
        self.reader
            .seek(SeekFrom::Start(timestep as u64 * self.block_bytes()))?;
        self.block_pos = timestep;
        Ok(())
    }

    /// Index of the next block to be read.
    pub fn position(&self) -> usize {
        self.block_pos
    }

    /// Read the next block into `buffer`, which must hold exactly
    /// [`AartfaacFile::vis_per_timestep`] visibilities.
    ///
    /// # Errors
    ///
    /// [`IOError::BadBufferSize`] for a wrongly sized buffer, or
    /// [`IOError::ShortRead`] if the block can't be read in full.
    pub fn read_timestep(&mut self, buffer: &mut [Complex<f32>]) -> Result<Timestep, IOError> {
        let expected = self.header.vis_per_timestep();
        if buffer.len() != expected {
            return Err(IOError::BadBufferSize {
                filename: self.filename.clone(),
                expected,
                received: buffer.len(),
            });
        }
        let timestep = self.block_pos;
        let short_read = |source| IOError::ShortRead {
            filename: self.filename.clone(),
            timestep,
            source,
        };
        let header = AartfaacHeader::read_from(&mut self.reader).map_err(short_read)?;
        self.reader
            .read_f32_into::<LittleEndian>(&mut self.scratch)
            .map_err(short_read)?;
        for (vis, pair) in buffer.iter_mut().zip(self.scratch.chunks_exact(2)) {
            *vis = Complex::new(pair[0], pair[1]);
        }
        self.block_pos += 1;
        Ok(header.timestep())
    }

    /// Read the header of the next block without moving past it.
    ///
    /// # Errors
    ///
    /// [`IOError::ShortRead`] if the header can't be read.
    pub fn read_metadata(&mut self) -> Result<Timestep, IOError> {
        let timestep = self.block_pos;
        let header =
            AartfaacHeader::read_from(&mut self.reader).map_err(|source| IOError::ShortRead {
                filename: self.filename.clone(),
                timestep,
                source,
            })?;
        self.seek_to_timestep(timestep)?;
        Ok(header.timestep())
    }

    /// Copy the whole blocks in `range` (headers included) to `writer`.
    ///
    /// # Errors
    ///
    /// [`IOError::ShortRead`] if a block is incomplete, or any write error.
    pub fn copy_timesteps<W: Write>(
        &mut self,
        range: Range<usize>,
        mut writer: W,
    ) -> Result<(), IOError> {
        let block_bytes = self.block_bytes();
        self.seek_to_timestep(range.start)?;
        for timestep in range {
            let copied = std::io::copy(&mut (&mut self.reader).take(block_bytes), &mut writer)?;
            if copied != block_bytes {
                return Err(IOError::ShortRead {
                    filename: self.filename.clone(),
                    timestep,
                    source: std::io::ErrorKind::UnexpectedEof.into(),
                });
            }
            self.block_pos += 1;
        }
        Ok(())
    }

    /// The first header in the file.
    pub fn header(&self) -> &AartfaacHeader {
        &self.header
    }

    /// The name the file was opened with.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Number of visibilities in each block.
    pub fn vis_per_timestep(&self) -> usize {
        self.header.vis_per_timestep()
    }

    /// Number of antennas (receivers).
    pub fn num_antennas(&self) -> usize {
        self.header.nr_receivers as usize
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.header.nr_channels as usize
    }

    /// Frequency set-up, if the file was opened with a mode.
    pub fn band(&self) -> Option<&BandSetup> {
        self.band.as_ref()
    }

    /// Subband width \[Hz\], zero without a frequency set-up.
    pub fn bandwidth(&self) -> f64 {
        self.band.map_or(0., |band| band.bandwidth)
    }

    /// Centre frequency \[Hz\], zero without a frequency set-up.
    pub fn frequency(&self) -> f64 {
        self.band.map_or(0., |band| band.frequency)
    }

    /// Width of a single channel \[Hz\].
    pub fn channel_width(&self) -> f64 {
        self.bandwidth() / self.num_channels() as f64
    }

    /// Centre frequency of each channel \[Hz\].
    pub fn channel_freqs_hz(&self) -> Vec<f64> {
        let width = self.channel_width();
        let first_edge = self.frequency() - self.bandwidth() / 2.;
        (0..self.num_channels())
            .map(|ch| first_edge + width * (ch as f64 + 0.5))
            .collect()
    }

    /// Start of the first integration \[Unix seconds\].
    pub fn start_time(&self) -> f64 {
        self.header.start_time
    }

    /// Length of the first integration \[seconds\].
    pub fn integration_time(&self) -> f64 {
        self.header.end_time - self.header.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_common::{synthetic_file, synthetic_header, synthetic_vis};
    use float_cmp::assert_approx_eq;
    use std::io::Cursor;

    #[test]
    fn test_header_is_512_bytes_and_reads_back() {
        let header = synthetic_header(4, 2, 3.0);
        let mut bytes = vec![];
        header.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), AARTFAAC_HEADER_BYTES);
        let read = AartfaacHeader::read_from(Cursor::new(bytes)).unwrap();
        assert_eq!(read, header);
        assert_eq!(read.vis_per_timestep(), 10 * 2 * 4);
    }

    #[test]
    fn test_header_check_rejects_bad_magic() {
        let mut header = synthetic_header(4, 2, 0.0);
        header.magic = 0xdead_beef;
        assert!(matches!(
            header.check("SB001.vis"),
            Err(IOError::BadMagic { found: 0xdead_beef, .. })
        ));
    }

    #[test]
    fn test_header_check_rejects_correlation_mode() {
        let mut header = synthetic_header(4, 2, 0.0);
        header.correlation_mode = 3;
        assert!(matches!(
            header.check("SB001.vis"),
            Err(IOError::UnsupportedCorrelationMode { found: 3, .. })
        ));
        let mut header = synthetic_header(4, 2, 0.0);
        header.nr_polarizations = 1;
        assert!(matches!(
            header.check("SB001.vis"),
            Err(IOError::UnsupportedPolarizations { found: 1, .. })
        ));
    }

    #[test]
    fn test_modes() {
        assert!(matches!(
            AartfaacMode::try_from(0),
            Err(Af2msError::UnknownMode { .. })
        ));
        assert!(matches!(
            AartfaacMode::try_from(8),
            Err(Af2msError::UnknownMode { .. })
        ));
        for number in 1..=7 {
            let mode = AartfaacMode::try_from(number).unwrap();
            assert_eq!(mode.number(), number);
            assert_eq!(mode.is_lba(), number <= 4);
        }
        assert_approx_eq!(f64, AartfaacMode::Hba170_230.bandwidth(), 156_250.0);
        assert_approx_eq!(f64, AartfaacMode::Hba210_270.bandwidth(), 195_312.5);
        assert_approx_eq!(f64, AartfaacMode::Hba110_190.frequency_offset(), 100e6);
        assert_eq!(AartfaacMode::LbaInner30_90.to_string(), "LBA_INNER 30-90 MHz");
        assert_eq!(AartfaacMode::Hba110_190.band_name(), "HBA");
        assert_eq!(AartfaacMode::LbaOuter10_90.axes_name(), "LBA_ROTATION_MATRIX");
    }

    #[test]
    fn test_parse_subband() {
        assert_eq!(parse_subband("/data/SB320.vis").unwrap(), 320);
        assert_eq!(parse_subband("SB001_SB296-20190101.vis").unwrap(), 296);
        assert!(matches!(
            parse_subband("obs.vis"),
            Err(IOError::MissingSubband { .. })
        ));
    }

    #[test]
    fn test_file_metadata() {
        let bytes = synthetic_file(4, 2, 3, 1000.0, 1.0);
        let file =
            AartfaacFile::from_reader(Cursor::new(bytes), "SB300.vis", Some(AartfaacMode::LbaOuter10_90))
                .unwrap();
        assert_eq!(file.num_timesteps(), 3);
        assert_eq!(file.num_antennas(), 4);
        assert_eq!(file.num_channels(), 2);
        assert_approx_eq!(f64, file.frequency(), 195_312.5 * 300.);
        assert_approx_eq!(f64, file.integration_time(), 1.0);
        let freqs = file.channel_freqs_hz();
        assert_approx_eq!(f64, freqs[0], file.frequency() - 195_312.5 / 4.);
        assert_approx_eq!(f64, freqs[1], file.frequency() + 195_312.5 / 4.);
    }

    #[test]
    fn test_num_timesteps_ignores_partial_block() {
        let mut bytes = synthetic_file(4, 2, 3, 1000.0, 1.0);
        bytes.extend(vec![0_u8; 100]);
        let file = AartfaacFile::from_reader(Cursor::new(bytes), "SB300.vis", None).unwrap();
        assert_eq!(file.num_timesteps(), 3);
    }

    #[test]
    fn test_read_timesteps() {
        let bytes = synthetic_file(4, 2, 3, 1000.0, 1.0);
        let mut file = AartfaacFile::from_reader(Cursor::new(bytes), "SB300.vis", None).unwrap();
        let mut buffer = vec![Complex::default(); file.vis_per_timestep()];

        file.seek_to_timestep(2).unwrap();
        let meta = file.read_metadata().unwrap();
        assert_eq!(file.position(), 2);
        let timestep = file.read_timestep(&mut buffer).unwrap();
        assert_eq!(meta, timestep);
        assert_approx_eq!(f64, timestep.start_unix, 1002.0);
        assert_eq!(buffer, synthetic_vis(4, 2, 2));
        assert_eq!(file.position(), 3);

        assert!(matches!(
            file.read_timestep(&mut buffer),
            Err(IOError::ShortRead { timestep: 3, .. })
        ));
        let mut short = vec![Complex::default(); 3];
        assert!(matches!(
            file.read_timestep(&mut short),
            Err(IOError::BadBufferSize { .. })
        ));
    }

    #[test]
    fn test_copy_timesteps() {
        let bytes = synthetic_file(3, 1, 4, 0.0, 2.0);
        let mut file = AartfaacFile::from_reader(Cursor::new(bytes), "SB300.vis", None).unwrap();
        let mut out = vec![];
        file.copy_timesteps(1..3, &mut out).unwrap();
        let mut copy = AartfaacFile::from_reader(Cursor::new(out), "SB300.vis", None).unwrap();
        assert_eq!(copy.num_timesteps(), 2);
        let mut buffer = vec![Complex::default(); copy.vis_per_timestep()];
        let timestep = copy.read_timestep(&mut buffer).unwrap();
        assert_approx_eq!(f64, timestep.start_unix, 2.0);
        assert_eq!(buffer, synthetic_vis(3, 1, 1));
    }
}
