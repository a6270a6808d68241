// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants.
//!
//! All floating point constants *must* be double precision.

/// Size of an AARTFAAC correlator header block in bytes.
pub const AARTFAAC_HEADER_BYTES: usize = 512;

/// Magic number at the start of every raw correlator visibility header.
pub const CORR_HDR_MAGIC: u32 = 0x3B98_F002;

/// The only supported correlation mode: a bitmask of all four polarisation
/// products (XX | XY | YX | YY).
pub const CORR_MODE_FULL_POL: u8 = 0b1111;

/// Number of receptor polarisations per antenna.
pub const NUM_RECEPTOR_POLS: usize = 2;

/// Number of polarisation products per baseline and channel.
pub const NUM_POL_PRODUCTS: usize = NUM_RECEPTOR_POLS * NUM_RECEPTOR_POLS;

/// Number of fixed-size weight words in the header.
pub const NUM_HEADER_WEIGHTS: usize = 78;

/// Number of padding bytes at the end of the header.
pub const HEADER_PAD_BYTES: usize = 170;

/// Offset added to a Unix timestamp in seconds to obtain a Modified Julian
/// Date in seconds, which is what the output tables use.
pub const UNIX_TO_MJD_SECONDS: f64 = (2_440_587.5 - 2_400_000.5) * 86_400.0;

/// Channel counts are rounded up to a multiple of this when estimating the
/// memory needed per timestep.
pub const CHANNEL_ALIGNMENT: usize = 4;

/// Memory used per polarisation sample while a chunk is held in memory: one
/// single precision complex value plus one flag byte.
pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>() * 2 + std::mem::size_of::<bool>();

/// Below this many timesteps per chunk, flagging accuracy suffers.
pub const MIN_FLAGGING_TIMESTEPS: usize = 20;

/// ITRF position of the AARTFAAC array \[metres\], used where no antenna
/// configuration is available (e.g. LST selection in `afedit`).
pub const AARTFAAC_ITRF_XYZ: [f64; 3] = [3_826_577.022_72, 461_022.995_082, 5_064_892.814];

/// Name used for the telescope, station, source and field.
pub const TELESCOPE_NAME: &str = "AARTFAAC";
