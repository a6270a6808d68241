//! Parsing of LOFAR style antenna field configuration files.
//!
//! A file is a sequence of named arrays. Each array is a name, an optional
//! band, dimensions like `96 x 2 x 3` and the values between `[` and `]`. An
//! array may be followed by a second block, in which case the first block is
//! an offset that is repeated and added to each value of the second:
//!
//! ```text
//! # field centre, then per-dipole offsets
//! LBA
//! 3 [ 3826577.0 461022.9 5064892.8 ]
//! 2 x 2 x 3 [
//!   0.0 0.0 0.0  0.0 0.0 0.0
//!   1.0 2.0 3.0  1.0 2.0 3.0
//! ]
//! ROTATION_MATRIX LBA
//! 3 x 3 [ 1 0 0 0 1 0 0 0 1 ]
//! ```

use std::{collections::HashMap, iter::Peekable, path::Path};

use log::{debug, trace};
use marlu::XyzGeocentric;

use super::{aartfaac::AartfaacMode, error::IOError};
use crate::error::Af2msError;

/// Every named array in an antenna configuration file.
#[derive(Debug, Clone, Default)]
pub struct AntennaConfig {
    filename: String,
    arrays: HashMap<String, Vec<f64>>,
}

/// Antenna positions and coordinate axes for one band.
#[derive(Debug, Clone)]
pub struct AntennaLayout {
    /// ITRF position of each antenna \[metres\]
    pub positions: Vec<XyzGeocentric>,
    /// Row-major rotation matrix of the station's local coordinate axes
    pub axes: [f64; 9],
}

impl AntennaLayout {
    /// Keep only the first `num_ants` positions.
    ///
    /// # Errors
    ///
    /// [`Af2msError::TooFewAntennas`] if there are fewer than `num_ants`.
    pub fn truncate(&mut self, num_ants: usize) -> Result<(), Af2msError> {
        if self.positions.len() < num_ants {
            return Err(Af2msError::TooFewAntennas {
                expected: num_ants,
                received: self.positions.len(),
            });
        }
        self.positions.truncate(num_ants);
        Ok(())
    }
}

/// Tokens of a configuration file, skipping blank and comment lines.
fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(str::split_whitespace)
}

fn starts_with_alpha(token: &str) -> bool {
    token.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
}

fn starts_with_digit(token: &str) -> bool {
    token.chars().next().map_or(false, |c| c.is_ascii_digit())
}

impl AntennaConfig {
    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// [`IOError::StdIo`] if the file can't be read, or
    /// [`IOError::AntennaConfig`] if it can't be parsed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, IOError> {
        let filename = path.as_ref().display().to_string();
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, &filename)
    }

    /// Parse the text of a configuration file. `filename` is only used in
    /// error messages.
    ///
    /// # Errors
    ///
    /// [`IOError::AntennaConfig`] describing the first problem found.
    pub fn parse(text: &str, filename: &str) -> Result<Self, IOError> {
        trace!("start AntennaConfig::parse");
        let bad_format = |message: String| IOError::AntennaConfig {
            filename: filename.to_string(),
            message,
        };
        let mut tokens = tokenize(text).peekable();
        let mut arrays = HashMap::new();

        while let Some(name) = tokens.next() {
            if !starts_with_alpha(name) {
                return Err(bad_format(format!("expected an array name, found {}", name)));
            }
            let band = match tokens.peek() {
                Some(token) if starts_with_alpha(token) => tokens.next(),
                _ => None,
            };
            let key = match band {
                Some(band) => format!("{}_{}", band, name),
                None => name.to_string(),
            };

            let offsets = read_block(&mut tokens)
                .map_err(|message| bad_format(format!("{}: {}", key, message)))?;
            let values = match tokens.peek() {
                Some(token) if starts_with_digit(token) => {
                    let mut values = read_block(&mut tokens)
                        .map_err(|message| bad_format(format!("{}: {}", key, message)))?;
                    if offsets.is_empty() {
                        return Err(bad_format(format!("{}: empty offset block", key)));
                    }
                    for (idx, value) in values.iter_mut().enumerate() {
                        *value += offsets[idx % offsets.len()];
                    }
                    values
                }
                _ => offsets,
            };
            debug!("antenna config array {} has {} values", key, values.len());
            arrays.insert(key, values);
        }

        trace!("end AntennaConfig::parse");
        Ok(Self {
            filename: filename.to_string(),
            arrays,
        })
    }

    /// The values of the array stored under `name` (`BAND_NAME` or `NAME`).
    ///
    /// # Errors
    ///
    /// [`IOError::MissingArray`] if there is no such array.
    pub fn get_array(&self, name: &str) -> Result<&[f64], IOError> {
        self.arrays
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| IOError::MissingArray {
                name: name.to_string(),
            })
    }

    /// Antenna positions from the array named `band`. Each antenna has two
    /// dipoles of three coordinates; the first dipole's position is used.
    ///
    /// # Errors
    ///
    /// [`IOError::MissingArray`] if there is no such array.
    pub fn positions(&self, band: &str) -> Result<Vec<XyzGeocentric>, IOError> {
        Ok(self
            .get_array(band)?
            .chunks(6)
            .filter(|dipoles| dipoles.len() >= 3)
            .map(|dipoles| XyzGeocentric {
                x: dipoles[0],
                y: dipoles[1],
                z: dipoles[2],
            })
            .collect())
    }

    /// The 3x3 coordinate axes matrix stored under `name`.
    ///
    /// # Errors
    ///
    /// [`IOError::MissingArray`], or [`IOError::BadAxes`] if the array does
    /// not have exactly 9 values.
    pub fn axes(&self, name: &str) -> Result<[f64; 9], IOError> {
        let values = self.get_array(name)?;
        let mut axes = [0.; 9];
        if values.len() != axes.len() {
            return Err(IOError::BadAxes {
                name: name.to_string(),
                received: values.len(),
            });
        }
        axes.copy_from_slice(values);
        Ok(axes)
    }

    /// Positions and axes of the band used by `mode`.
    ///
    /// # Errors
    ///
    /// See [`AntennaConfig::positions`] and [`AntennaConfig::axes`].
    pub fn layout(&self, mode: AartfaacMode) -> Result<AntennaLayout, IOError> {
        let layout = AntennaLayout {
            positions: self.positions(mode.band_name())?,
            axes: self.axes(mode.axes_name())?,
        };
        debug!(
            "{} {} antenna positions in {}",
            layout.positions.len(),
            mode.band_name(),
            self.filename
        );
        Ok(layout)
    }
}

/// Read `D1 x D2 ... [ values ]`, consuming the closing bracket.
fn read_block<'a, I>(tokens: &mut Peekable<I>) -> Result<Vec<f64>, String>
where
    I: Iterator<Item = &'a str>,
{
    let parse_dim = |token: Option<&str>| -> Result<usize, String> {
        let token = token.ok_or("expected dimensions")?;
        token
            .parse()
            .map_err(|_| format!("bad dimension {}", token))
    };
    let mut count = parse_dim(tokens.next())?;
    loop {
        match tokens.next() {
            Some("x") => count *= parse_dim(tokens.next())?,
            Some("[") => break,
            Some(token) => return Err(format!("expected 'x' or '[', found {}", token)),
            None => return Err("expected '['".to_string()),
        }
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let token = tokens.next().ok_or("missing numbers")?;
        values.push(
            token
                .parse()
                .map_err(|_| format!("bad number {}", token))?,
        );
    }
    match tokens.next() {
        Some("]") => Ok(values),
        Some(token) => Err(format!("expected ']', found {}", token)),
        None => Err("expected ']'".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_common::synthetic_antenna_config;
    use approx::assert_abs_diff_eq;
    use tempfile::tempdir;

    #[test]
    fn test_parse_offset_blocks() {
        let config = AntennaConfig::parse(&synthetic_antenna_config(3), "test.conf").unwrap();
        let positions = config.positions("LBA").unwrap();
        assert_eq!(positions.len(), 3);
        assert_abs_diff_eq!(positions[0].x, 3_826_577.022_72, epsilon = 1e-6);
        assert_abs_diff_eq!(positions[2].x, 3_826_577.022_72 + 20.0, epsilon = 1e-6);
        assert_abs_diff_eq!(positions[2].y, 461_022.995_082, epsilon = 1e-6);
        assert_abs_diff_eq!(positions[2].z, 5_064_892.814, epsilon = 1e-6);
    }

    #[test]
    fn test_band_prefixed_keys() {
        let config = AntennaConfig::parse(&synthetic_antenna_config(2), "test.conf").unwrap();
        assert_eq!(
            config.axes("LBA_ROTATION_MATRIX").unwrap(),
            [1., 0., 0., 0., 1., 0., 0., 0., 1.]
        );
        assert!(config.get_array("HBA0_ROTATION_MATRIX").is_ok());
        assert!(matches!(
            config.get_array("ROTATION_MATRIX"),
            Err(IOError::MissingArray { .. })
        ));
    }

    #[test]
    fn test_layout_follows_mode() {
        let config = AntennaConfig::parse(&synthetic_antenna_config(5), "test.conf").unwrap();
        let mut layout = config.layout(AartfaacMode::Hba110_190).unwrap();
        assert_eq!(layout.positions.len(), 5);
        layout.truncate(4).unwrap();
        assert_eq!(layout.positions.len(), 4);
        assert!(matches!(
            layout.truncate(6),
            Err(Af2msError::TooFewAntennas {
                expected: 6,
                received: 4
            })
        ));
    }

    #[test]
    fn test_bad_axes() {
        let config =
            AntennaConfig::parse("ROTATION_MATRIX LBA\n2 x 2 [ 1 0 0 1 ]\n", "test.conf").unwrap();
        assert!(matches!(
            config.axes("LBA_ROTATION_MATRIX"),
            Err(IOError::BadAxes { received: 4, .. })
        ));
    }

    #[test]
    fn test_bad_format() {
        for text in [
            "LBA\n3 [ 1 2 ]\n",
            "LBA\n3 y 2 [ 1 2 3 4 5 6 ]\n",
            "LBA\n3 [ 1 2 three ]\n",
            "3 [ 1 2 3 ]\n",
        ] {
            assert!(matches!(
                AntennaConfig::parse(text, "test.conf"),
                Err(IOError::AntennaConfig { .. })
            ));
        }
    }

    #[test]
    fn test_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("antennas.conf");
        std::fs::write(&path, synthetic_antenna_config(2)).unwrap();
        let config = AntennaConfig::from_path(&path).unwrap();
        assert_eq!(config.positions("HBA").unwrap().len(), 2);
        assert!(AntennaConfig::from_path(dir.path().join("missing.conf")).is_err());
    }
}
