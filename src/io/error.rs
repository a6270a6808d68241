//! Errors that can occur in the io module

use thiserror::Error;

#[derive(Error, Debug)]
#[allow(clippy::upper_case_acronyms)]
/// All the errors that can occur in file io operations
pub enum IOError {
    /// The header does not start with the correlator magic number.
    #[error("{source_file}:{source_line}\nBad magic number in {filename}: found {found:#010x}, expected {expected:#010x}")]
    BadMagic {
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
        /// The file being read
        filename: String,
        /// The magic number that was read
        found: u32,
        /// The magic number that was expected
        expected: u32,
    },

    /// The header describes a correlation mode other than full polarisation.
    #[error("{source_file}:{source_line}\nUnsupported correlation mode {found} in {filename}, only mode {expected} (all four polarisation products) is supported")]
    UnsupportedCorrelationMode {
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
        /// The file being read
        filename: String,
        /// The correlation mode that was read
        found: u8,
        /// The supported correlation mode
        expected: u8,
    },

    /// The header describes a number of receptor polarisations other than 2.
    #[error("{source_file}:{source_line}\nUnsupported number of polarisations {found} in {filename}, expected {expected}")]
    UnsupportedPolarizations {
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
        /// The file being read
        filename: String,
        /// The number of polarisations that was read
        found: u8,
        /// The supported number of polarisations
        expected: u8,
    },

    /// A timestep block could not be read in full.
    #[error("Error reading timestep {timestep} of {filename}: {source}")]
    ShortRead {
        /// The file being read
        filename: String,
        /// The timestep that was being read
        timestep: usize,
        /// The underlying io error
        source: std::io::Error,
    },

    /// A caller supplied visibility buffer has the wrong length.
    #[error("Visibility buffer for {filename} has {received} elements, expected {expected}")]
    BadBufferSize {
        /// The file being read
        filename: String,
        /// Visibilities per timestep
        expected: usize,
        /// Length of the supplied buffer
        received: usize,
    },

    /// The file name does not contain a subband index.
    #[error("Filename {filename} should contain a subband index preceded by 'SB', e.g. SB320")]
    MissingSubband {
        /// The file name
        filename: String,
    },

    /// The antenna configuration file could not be parsed.
    #[error("Antenna config file {filename} has bad format: {message}")]
    AntennaConfig {
        /// The antenna configuration file
        filename: String,
        /// What went wrong
        message: String,
    },

    /// A named array is missing from the antenna configuration.
    #[error("Antenna config does not contain an array named {name}")]
    MissingArray {
        /// Name of the array, including its band prefix
        name: String,
    },

    /// The coordinate axes array does not have 9 elements.
    #[error("The array {name} for coordinate axes in the antenna config had {received} elements, expected 9")]
    BadAxes {
        /// Name of the array
        name: String,
        /// Number of values found
        received: usize,
    },

    /// The writer chain was used out of order.
    #[error("Invalid writer state: {message}")]
    WriterState {
        /// What went wrong
        message: String,
    },

    #[error("{0}")]
    /// Error derived from [`std::io::Error`]
    StdIo(#[from] std::io::Error),
}
