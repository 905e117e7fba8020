//! Geometry helpers for link computations.
//!
//! Contains:
//! - 3D positions (`Vector`) as exposed by endpoint mobility
//! - Distance calculations (squared distance to avoid sqrt where only comparisons are needed)
//! - Direction angles (`Angles`) used to look up antenna gains

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vector {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Squared Euclidean distance in square meters.
///
/// Range checks compare d² against r² and never need the square root.
pub fn distance2(a: &Vector, b: &Vector) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    dx * dx + dy * dy + dz * dz
}

/// Euclidean distance in meters.
pub fn distance(a: &Vector, b: &Vector) -> f64 {
    distance2(a, b).sqrt()
}

/// Direction of a point as seen from an origin.
///
/// - `azimuth`: angle in the x-y plane measured from the x axis, in `(-π, π]`
/// - `inclination`: angle from the z axis, in `[0, π]`
///
/// A point that coincides with the origin has both angles equal to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Angles {
    pub azimuth: f64,
    pub inclination: f64,
}

impl Angles {
    pub fn new(azimuth: f64, inclination: f64) -> Self {
        Self { azimuth, inclination }
    }

    /// Angles of the direction `origin -> v`.
    pub fn between(v: &Vector, origin: &Vector) -> Self {
        let dx = v.x - origin.x;
        let dy = v.y - origin.y;
        let dz = v.z - origin.z;
        let r = (dx * dx + dy * dy + dz * dz).sqrt();
        if r == 0.0 {
            return Self::default();
        }
        let azimuth = dy.atan2(dx);
        let inclination = (dz / r).clamp(-1.0, 1.0).acos();
        Self { azimuth, inclination }
    }
}

/// Wrap an angle in radians into `(-π, π]`.
pub fn wrap_to_pi(angle: f64) -> f64 {
    let mut a = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

pub fn deg_to_rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / PI
}
