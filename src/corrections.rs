//! Geometric corrections: baseline coordinates and the w-term phase rotation.
//!
//! The correlator does not track a phase centre, so every visibility is
//! rotated by the geometric delay of its baseline towards the phase centre,
//! `-2π w f / c`, where `w` is the baseline's w coordinate \[metres\] and `f`
//! the channel frequency.

use std::f64::consts::PI;

use log::trace;
use marlu::{
    constants::VEL_C,
    hifitime::{Duration, Epoch},
    precession::{get_lmst, precess_time},
    LatLngHeight, RADec, XyzGeocentric, XyzGeodetic, UVW,
};

use crate::{constants::NUM_POL_PRODUCTS, error::Af2msError, types::Baseline, Complex};

/// Something which places antennas in the output reference frame.
pub trait UvwService: Sync {
    /// The UVW of `position` relative to `reference` at `epoch`, towards
    /// `phase_centre`.
    ///
    /// # Errors
    ///
    /// Implementation specific, e.g. [`Af2msError::Geometry`].
    fn uvw(
        &self,
        position: XyzGeocentric,
        reference: XyzGeocentric,
        epoch: Epoch,
        phase_centre: RADec,
    ) -> Result<UVW, Af2msError>;

    /// The UVW of every antenna, relative to the first.
    ///
    /// # Errors
    ///
    /// see [`UvwService::uvw`]
    fn uvws(
        &self,
        positions: &[XyzGeocentric],
        epoch: Epoch,
        phase_centre: RADec,
    ) -> Result<Vec<UVW>, Af2msError> {
        let reference = match positions.first() {
            Some(&reference) => reference,
            None => return Ok(vec![]),
        };
        positions
            .iter()
            .map(|&position| self.uvw(position, reference, epoch, phase_centre))
            .collect()
    }
}

/// Converts ITRF positions to UVWs in the J2000 frame with marlu's
/// precession.
#[derive(Clone, Copy, Debug)]
pub struct PrecessionUvw {
    /// UT1 - UTC
    pub dut1: Duration,
}

impl Default for PrecessionUvw {
    fn default() -> Self {
        Self {
            dut1: Duration::from_seconds(0.),
        }
    }
}

/// The geodetic (WGS84) position of `reference`.
///
/// # Errors
///
/// [`Af2msError::Geometry`] if the position can't be placed on the earth,
/// e.g. the centre of the earth.
pub fn earth_position(reference: XyzGeocentric) -> Result<LatLngHeight, Af2msError> {
    let array_pos = reference.to_earth_wgs84();
    if !(array_pos.longitude_rad.is_finite()
        && array_pos.latitude_rad.is_finite()
        && array_pos.height_metres.is_finite())
    {
        return Err(Af2msError::Geometry {
            message: format!(
                "reference position ({}, {}, {}) has no geodetic equivalent",
                reference.x, reference.y, reference.z
            ),
        });
    }
    Ok(array_pos)
}

/// Positions relative to `reference` in the local geodetic frame of
/// `array_pos`.
fn relative_geodetic(
    positions: &[XyzGeocentric],
    reference: XyzGeocentric,
    array_pos: LatLngHeight,
) -> Vec<XyzGeodetic> {
    let vec = XyzGeocentric::get_geocentric_vector(array_pos);
    let (s_long, c_long) = array_pos.longitude_rad.sin_cos();
    let reference_geod = reference.to_geodetic_inner(vec, s_long, c_long);
    positions
        .iter()
        .map(|position| position.to_geodetic_inner(vec, s_long, c_long) - reference_geod)
        .collect()
}

impl PrecessionUvw {
    fn precessed_uvws(
        &self,
        positions: &[XyzGeocentric],
        reference: XyzGeocentric,
        epoch: Epoch,
        phase_centre: RADec,
    ) -> Result<Vec<UVW>, Af2msError> {
        let array_pos = earth_position(reference)?;
        let xyzs = relative_geodetic(positions, reference, array_pos);
        let prec_info = precess_time(
            array_pos.longitude_rad,
            array_pos.latitude_rad,
            phase_centre,
            epoch,
            self.dut1,
        );
        Ok(prec_info
            .precess_xyz(&xyzs)
            .into_iter()
            .map(|xyz| UVW::from_xyz(xyz, prec_info.hadec_j2000))
            .collect())
    }
}

impl UvwService for PrecessionUvw {
    fn uvw(
        &self,
        position: XyzGeocentric,
        reference: XyzGeocentric,
        epoch: Epoch,
        phase_centre: RADec,
    ) -> Result<UVW, Af2msError> {
        let uvws = self.precessed_uvws(&[position], reference, epoch, phase_centre)?;
        uvws.into_iter().next().ok_or_else(|| Af2msError::Geometry {
            message: "precession produced no coordinates".into(),
        })
    }

    // one precession per epoch instead of one per antenna
    fn uvws(
        &self,
        positions: &[XyzGeocentric],
        epoch: Epoch,
        phase_centre: RADec,
    ) -> Result<Vec<UVW>, Af2msError> {
        match positions.first() {
            Some(&reference) => self.precessed_uvws(positions, reference, epoch, phase_centre),
            None => Ok(vec![]),
        }
    }
}

/// The J2000 direction of the zenith above `reference` at `epoch`.
///
/// # Errors
///
/// see [`earth_position`]
pub fn zenith_phase_centre(
    reference: XyzGeocentric,
    epoch: Epoch,
    dut1: Duration,
) -> Result<RADec, Af2msError> {
    let array_pos = earth_position(reference)?;
    let lmst = get_lmst(array_pos.longitude_rad, epoch, dut1);
    let prec_info = precess_time(
        array_pos.longitude_rad,
        array_pos.latitude_rad,
        RADec::from_radians(lmst, array_pos.latitude_rad),
        epoch,
        dut1,
    );
    Ok(RADec::from_radians(
        prec_info.lmst_j2000,
        prec_info.array_latitude_j2000,
    ))
}

/// The UVW of `baseline`, given the UVW of every antenna.
pub fn baseline_uvw(antenna_uvws: &[UVW], baseline: Baseline) -> UVW {
    antenna_uvws[baseline.ant1] - antenna_uvws[baseline.ant2]
}

/// A unit complex number with phase `angle`.
pub fn rotor(angle: f64) -> Complex<f32> {
    let (sin_angle_f64, cos_angle_f64) = angle.sin_cos();
    Complex::new(cos_angle_f64 as f32, sin_angle_f64 as f32)
}

/// Fill `coefficients` with the rotor of each channel for a baseline with
/// the given w \[metres\].
pub fn rotation_coefficients(
    w_m: f64,
    channel_freqs_hz: &[f64],
    coefficients: &mut Vec<Complex<f32>>,
) {
    coefficients.clear();
    coefficients.extend(
        channel_freqs_hz
            .iter()
            .map(|&freq_hz| rotor(-2.0 * PI * w_m * freq_hz / VEL_C)),
    );
}

/// Rotate `data` (`[channel][pol]`) by the rotor of each channel, one sample
/// at a time.
pub fn rotate_scalar(data: &mut [Complex<f32>], coefficients: &[Complex<f32>]) {
    for (chan_data, rot) in data.chunks_exact_mut(NUM_POL_PRODUCTS).zip(coefficients) {
        for vis in chan_data.iter_mut() {
            *vis = Complex::new(
                rot.re * vis.re - rot.im * vis.im,
                rot.im * vis.re + rot.re * vis.im,
            );
        }
    }
}

/// Same as [`rotate_scalar`], but the four polarisations of a channel are
/// rotated together as lanes, which the compiler turns into SIMD.
pub fn rotate_vectorized(data: &mut [Complex<f32>], coefficients: &[Complex<f32>]) {
    for (chan_data, rot) in data.chunks_exact_mut(NUM_POL_PRODUCTS).zip(coefficients) {
        let re: [f32; NUM_POL_PRODUCTS] = std::array::from_fn(|pol| chan_data[pol].re);
        let im: [f32; NUM_POL_PRODUCTS] = std::array::from_fn(|pol| chan_data[pol].im);
        let (cos, sin) = ([rot.re; NUM_POL_PRODUCTS], [rot.im; NUM_POL_PRODUCTS]);
        let mut out_re = [0.0_f32; NUM_POL_PRODUCTS];
        let mut out_im = [0.0_f32; NUM_POL_PRODUCTS];
        for lane in 0..NUM_POL_PRODUCTS {
            out_re[lane] = cos[lane] * re[lane] - sin[lane] * im[lane];
            out_im[lane] = sin[lane] * re[lane] + cos[lane] * im[lane];
        }
        for (lane, vis) in chan_data.iter_mut().enumerate() {
            *vis = Complex::new(out_re[lane], out_im[lane]);
        }
    }
}

/// Which implementation of the phase rotation to use. Both give the same
/// results to within floating point error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RotationPath {
    /// [`rotate_scalar`]
    Scalar,
    /// [`rotate_vectorized`]
    #[default]
    Vectorized,
}

impl RotationPath {
    /// Rotate `data` (`[channel][pol]`) by `coefficients` (`[channel]`).
    pub fn apply(&self, data: &mut [Complex<f32>], coefficients: &[Complex<f32>]) {
        match self {
            Self::Scalar => rotate_scalar(data, coefficients),
            Self::Vectorized => rotate_vectorized(data, coefficients),
        }
    }
}

/// Applies the w-term phase correction, one output timestep at a time.
pub struct GeometryCorrector<'a> {
    uvw_service: &'a dyn UvwService,
    positions: &'a [XyzGeocentric],
    phase_centre: RADec,
    channel_freqs_hz: &'a [f64],
    path: RotationPath,
    antenna_uvws: Vec<UVW>,
    coefficients: Vec<Complex<f32>>,
}

impl<'a> GeometryCorrector<'a> {
    /// A corrector for the antennas at `positions`, the first being the
    /// reference antenna.
    pub fn new(
        uvw_service: &'a dyn UvwService,
        positions: &'a [XyzGeocentric],
        phase_centre: RADec,
        channel_freqs_hz: &'a [f64],
        path: RotationPath,
    ) -> Self {
        Self {
            uvw_service,
            positions,
            phase_centre,
            channel_freqs_hz,
            path,
            antenna_uvws: Vec::with_capacity(positions.len()),
            coefficients: Vec::with_capacity(channel_freqs_hz.len()),
        }
    }

    /// Compute the UVW of every antenna at `epoch`, for the following calls
    /// to [`GeometryCorrector::correct_baseline`].
    ///
    /// # Errors
    ///
    /// see [`UvwService::uvws`]
    pub fn set_epoch(&mut self, epoch: Epoch) -> Result<(), Af2msError> {
        trace!("start GeometryCorrector::set_epoch");
        self.antenna_uvws = self
            .uvw_service
            .uvws(self.positions, epoch, self.phase_centre)?;
        trace!("end GeometryCorrector::set_epoch");
        Ok(())
    }

    /// Rotate the visibilities of `baseline` (`[channel][pol]`), returning
    /// its UVW.
    pub fn correct_baseline(&mut self, baseline: Baseline, data: &mut [Complex<f32>]) -> UVW {
        let uvw = baseline_uvw(&self.antenna_uvws, baseline);
        rotation_coefficients(uvw.w, self.channel_freqs_hz, &mut self.coefficients);
        self.path.apply(data, &self.coefficients);
        uvw
    }
}
