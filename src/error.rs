//! Errors that can occur in aartfaac2ms

use thiserror::Error;

use crate::io::error::IOError;

#[derive(Error, Debug)]
/// Errors caused by invalid command line arguments
pub enum CLIError {
    #[error("Invalid Command Line Argument {option}. Expected {expected}, received {received}")]
    /// When a bad value is provided for a command line option
    InvalidCommandLineArgument {
        /// The option that was invalid
        option: String,
        /// What was expected
        expected: String,
        /// What was received
        received: String,
    },
}

#[derive(Error, Debug)]
#[allow(clippy::upper_case_acronyms)]
/// All the errors that can occur while converting visibilities
pub enum Af2msError {
    #[error(transparent)]
    /// Error derived from [`IOError`]
    IOError(#[from] IOError),

    #[error(transparent)]
    /// Error derived from [`CLIError`]
    CLIError(#[from] CLIError),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    /// Error derived from [`clap::Error`]
    ClapError(#[from] clap::Error),

    #[error("Dry run")]
    /// Not an actual error, the summary was printed and nothing should be written.
    DryRun {},

    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    /// Error for bad array shape in provided argument
    BadArrayShape {
        /// The argument name within the function
        argument: String,
        /// The function name
        function: String,
        /// The expected shape
        expected: String,
        /// The shape that was received instead
        received: String,
    },

    #[error("Unknown AARTFAAC mode {received}. Valid modes are 1-7 (1-4: LBA, 5-7: HBA)")]
    /// The receiver (RCU) mode is not one we know how to handle.
    UnknownMode {
        /// The mode number that was received
        received: String,
    },

    #[error("Invalid timestep interval {start}..{end}, the file has {num_timesteps} timesteps")]
    /// The selected interval is empty or exceeds the file.
    InvalidInterval {
        /// First selected timestep
        start: usize,
        /// One past the last selected timestep
        end: usize,
        /// Number of timesteps available in the file
        num_timesteps: usize,
    },

    #[error("The antenna configuration has {received} positions, but the data has {expected} antennas")]
    /// Not enough antenna positions for the number of receivers in the data.
    TooFewAntennas {
        /// Number of antennas in the data
        expected: usize,
        /// Number of positions in the configuration
        received: usize,
    },

    #[error("Flagging baseline {baseline} failed: {message}")]
    /// The flagging capability failed on a baseline.
    Flagging {
        /// Canonical index of the baseline
        baseline: usize,
        /// Description of the failure
        message: String,
    },

    #[error("A baseline processing thread panicked")]
    /// A worker thread panicked while processing baselines.
    WorkerPanic,

    #[error("Geometry error: {message}")]
    /// The reference frame conversion failed.
    Geometry {
        /// Description of the failure
        message: String,
    },
}
