//! Fixtures shared by the unit tests: small synthetic correlator files and
//! antenna configurations.

use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{io::aartfaac::AartfaacHeader, types::Baseline, Complex};

/// A valid header for `num_ants` antennas and `num_chans` channels, one
/// second long starting at `start` (Unix seconds).
pub fn synthetic_header(num_ants: usize, num_chans: usize, start: f64) -> AartfaacHeader {
    AartfaacHeader {
        nr_receivers: num_ants as u16,
        nr_channels: num_chans as u16,
        start_time: start,
        end_time: start + 1.0,
        nr_samples_per_integration: 768,
        ..AartfaacHeader::default()
    }
}

/// The payload of block `timestep`. Every value is distinct: the real part is
/// one more than the raw visibility index, the imaginary part encodes the
/// timestep.
pub fn synthetic_vis(num_ants: usize, num_chans: usize, timestep: usize) -> Vec<Complex<f32>> {
    let num_vis = Baseline::count(num_ants) * num_chans * 4;
    (0..num_vis)
        .map(|idx| Complex::new(idx as f32 + 1.0, timestep as f32 + 0.5))
        .collect()
}

/// A whole file in memory. Block `t` runs from `start + t * dt` to
/// `start + (t + 1) * dt`.
pub fn synthetic_file(
    num_ants: usize,
    num_chans: usize,
    num_timesteps: usize,
    start: f64,
    dt: f64,
) -> Vec<u8> {
    let mut bytes = vec![];
    for timestep in 0..num_timesteps {
        let mut header = synthetic_header(num_ants, num_chans, start + timestep as f64 * dt);
        header.end_time = header.start_time + dt;
        header.write_to(&mut bytes).unwrap();
        for vis in synthetic_vis(num_ants, num_chans, timestep) {
            bytes.write_f32::<LittleEndian>(vis.re).unwrap();
            bytes.write_f32::<LittleEndian>(vis.im).unwrap();
        }
    }
    bytes
}

/// Write [`synthetic_file`] to `dir/name`.
pub fn write_synthetic_file(
    dir: &Path,
    name: &str,
    num_ants: usize,
    num_chans: usize,
    num_timesteps: usize,
) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(
        &path,
        synthetic_file(num_ants, num_chans, num_timesteps, 1_546_300_800.0, 1.0),
    )
    .unwrap();
    path
}

/// An antenna configuration with `num_ants` LBA and HBA antennas spread out
/// along x from the AARTFAAC array centre. Each antenna is two dipoles.
pub fn synthetic_antenna_config(num_ants: usize) -> String {
    let mut values = vec![];
    for ant in 0..num_ants {
        for _dipole in 0..2 {
            values.push(format!("{} 0 0", 10.0 * ant as f64));
        }
    }
    let identity = "1 0 0 0 1 0 0 0 1";
    format!(
        "# synthetic station\n\
         LBA\n3 [ 3826577.02272 461022.995082 5064892.814 ]\n\
         {n} x 2 x 3 [\n{values}\n]\n\
         HBA\n3 [ 3826577.02272 461022.995082 5064892.814 ]\n\
         {n} x 2 x 3 [\n{values}\n]\n\
         ROTATION_MATRIX LBA\n3 x 3 [ {identity} ]\n\
         ROTATION_MATRIX HBA0\n3 x 3 [ {identity} ]\n",
        n = num_ants,
        values = values.join("\n"),
        identity = identity,
    )
}
