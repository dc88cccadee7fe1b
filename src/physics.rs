// Radiometric constants, the Planck function and line-of-sight geometry

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Planck constant (J s)
pub const PLANCK_CONST: f64 = 6.626_070_15e-34;
/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 2.997_924_58e8;
/// Boltzmann constant (J/K)
pub const BOLTZMANN_CONST: f64 = 1.380_649e-23;

pub const DEG2RAD: f64 = std::f64::consts::PI / 180.0;
pub const RAD2DEG: f64 = 180.0 / std::f64::consts::PI;

/// Blackbody spectral radiance B(ν, T) in W / (m² Hz sr).
///
/// Returns zero for non-positive temperatures.
pub fn planck(frequency: f64, temperature: f64) -> f64 {
    if temperature <= 0.0 {
        return 0.0;
    }
    let a = 2.0 * PLANCK_CONST * frequency.powi(3) / (SPEED_OF_LIGHT * SPEED_OF_LIGHT);
    let b = PLANCK_CONST * frequency / (BOLTZMANN_CONST * temperature);
    a / b.exp_m1()
}

/// A line of sight given as zenith and azimuth angles in degrees.
///
/// Zenith 0° points up (+z), zenith 180° points down. Azimuth is measured
/// from +x towards +y and kept in [-180°, 180°). A line of sight is the
/// viewing direction: the photon travels the opposite way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineOfSight {
    pub zenith: f64,
    pub azimuth: f64,
}

impl LineOfSight {
    pub fn new(zenith: f64, azimuth: f64) -> Self {
        Self {
            zenith,
            azimuth: wrap_azimuth(azimuth),
        }
    }

    /// Cartesian unit vector of the viewing direction.
    pub fn unit_vector(&self) -> Vector3<f64> {
        let za = self.zenith * DEG2RAD;
        let aa = self.azimuth * DEG2RAD;
        Vector3::new(za.sin() * aa.cos(), za.sin() * aa.sin(), za.cos())
    }

    /// Direction in which the photon propagates along this line of sight.
    pub fn photon_direction(&self) -> LineOfSight {
        LineOfSight::new(180.0 - self.zenith, self.azimuth + 180.0)
    }

    /// Line of sight pointing along a (not necessarily normalized) vector.
    pub fn from_vector(v: &Vector3<f64>) -> Self {
        let norm = v.norm();
        let cos_za = (v.z / norm).clamp(-1.0, 1.0);
        LineOfSight::new(cos_za.acos() * RAD2DEG, v.y.atan2(v.x) * RAD2DEG)
    }

    /// Cosine of the angle between two lines of sight.
    pub fn cos_angle_to(&self, other: &LineOfSight) -> f64 {
        self.unit_vector().dot(&other.unit_vector()).clamp(-1.0, 1.0)
    }
}

fn wrap_azimuth(azimuth: f64) -> f64 {
    let wrapped = (azimuth + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}
