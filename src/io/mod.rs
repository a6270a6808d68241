//! Input and output file formats: the raw correlator files, antenna
//! configurations and the writer chain.

pub mod aartfaac;
pub mod antenna_config;
pub mod averaging;
pub mod error;
pub mod table;
pub mod writer;

use self::{
    aartfaac::{AartfaacFile, AartfaacMode},
    antenna_config::{AntennaConfig, AntennaLayout},
    error::IOError,
};

/// Groups together parameters related to I/O
#[derive(Debug, Default, Clone)]
pub struct IOContext {
    // in
    /// The raw correlator visibility file, its name must contain the subband
    /// (e.g. `SB320`)
    pub vis_in: String,
    /// The antenna field configuration file
    pub antenna_conf_in: String,

    // out
    /// The output table directory
    pub table_out: String,
}

impl IOContext {
    /// Open the input visibility file.
    ///
    /// # Errors
    ///
    /// see [`AartfaacFile::open`]
    pub fn open_vis(&self, mode: AartfaacMode) -> Result<AartfaacFile, IOError> {
        AartfaacFile::open(&self.vis_in, mode)
    }

    /// Read the antenna positions and axes of `mode`'s band.
    ///
    /// # Errors
    ///
    /// see [`AntennaConfig::from_path`] and [`AntennaConfig::layout`]
    pub fn read_layout(&self, mode: AartfaacMode) -> Result<AntennaLayout, IOError> {
        AntennaConfig::from_path(&self.antenna_conf_in)?.layout(mode)
    }
}
