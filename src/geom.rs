//! Primitive shape parameters, rigid transforms and bounding boxes.
//!
//! Everything in this module is plain geometry: no randomness and no
//! knowledge of regions. Lengths are in mm, angles in radians.
//!
//! # Key Components
//!
//! - [`Transform`]: rotation followed by translation, the only placement
//!   operation used anywhere in the crate
//! - [`Shape`]: validated primitive solids (box, cylindrical shell sector)
//! - [`Aabb`]: axis-aligned bounds used for volume estimation

use std::f64::consts::{PI, TAU};
use std::fmt;

use nalgebra::{Matrix3, Point3, Rotation3, Unit, Vector3};

use crate::config::{ORTHONORMAL_TOLERANCE, SURFACE_TOLERANCE};
use crate::error::{Result, SamplerError};


/// Rigid placement: a rotation applied first, then a translation.
///
/// The rotation is stored as a [`Rotation3`], so orthonormality holds by
/// construction. Matrices from outside are checked in
/// [`Transform::try_from_matrix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(Rotation3::identity(), translation)
    }

    /// A pure rotation by `angle` about the y axis.
    pub fn rotation_y(angle: f64) -> Self {
        Self::new(
            Rotation3::from_axis_angle(&Vector3::y_axis(), angle),
            Vector3::zeros(),
        )
    }

    /// Rotation of `angle` about `axis` (any non-zero length), then `translation`.
    pub fn from_axis_angle(axis: Vector3<f64>, angle: f64, translation: Vector3<f64>) -> Result<Self> {
        let axis = Unit::try_new(axis, ORTHONORMAL_TOLERANCE).ok_or_else(|| {
            SamplerError::config(format!("rotation axis {:?} has zero length", axis))
        })?;
        Ok(Self::new(Rotation3::from_axis_angle(&axis, angle), translation))
    }

    /// Roll (about x), pitch (about y) and yaw (about z), applied in that order.
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64, translation: Vector3<f64>) -> Self {
        Self::new(Rotation3::from_euler_angles(roll, pitch, yaw), translation)
    }

    /// Builds a transform from a raw rotation matrix, rejecting anything that is
    /// not a proper rotation (orthonormal with determinant +1).
    pub fn try_from_matrix(matrix: Matrix3<f64>, translation: Vector3<f64>) -> Result<Self> {
        let drift = (matrix.transpose() * matrix - Matrix3::identity()).norm();
        if !drift.is_finite() || drift > ORTHONORMAL_TOLERANCE {
            return Err(SamplerError::config(format!(
                "rotation matrix is not orthonormal (|RᵀR - I| = {:e})",
                drift
            )));
        }
        let det = matrix.determinant();
        if (det - 1.0).abs() > ORTHONORMAL_TOLERANCE {
            return Err(SamplerError::config(format!(
                "rotation matrix has determinant {}, expected +1",
                det
            )));
        }
        Ok(Self::new(Rotation3::from_matrix_unchecked(matrix), translation))
    }

    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }

    /// Maps a point from the parent frame back into this transform's local frame.
    pub fn apply_inverse(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation.inverse_transform_point(&(*p - self.translation))
    }

    /// `self` followed by `outer`.
    pub fn then(&self, outer: &Transform) -> Transform {
        Transform {
            rotation: outer.rotation * self.rotation,
            translation: outer.rotation * self.translation + outer.translation,
        }
    }

    /// True when the rotation only permutes and/or flips the coordinate axes,
    /// so boxes stay axis-aligned under it.
    pub fn is_axis_aligned(&self) -> bool {
        self.rotation.matrix().iter().all(|v| {
            let a = v.abs();
            a < ORTHONORMAL_TOLERANCE || (a - 1.0).abs() < ORTHONORMAL_TOLERANCE
        })
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn from_half_extents(half: &Vector3<f64>) -> Self {
        Self {
            min: Point3::from(-half),
            max: Point3::from(*half),
        }
    }

    pub fn translated(&self, offset: &Vector3<f64>) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Bounds of this box after placing it with `t`. Exact for axis-aligned
    /// rotations, conservative otherwise.
    pub fn transformed(&self, t: &Transform) -> Self {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let c = t.apply(&corner);
            min = min.inf(&c);
            max = max.sup(&c);
        }
        Self { min, max }
    }

    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e.x.max(0.0) * e.y.max(0.0) * e.z.max(0.0)
    }

    pub fn intersection_volume(&self, other: &Aabb) -> f64 {
        let lo = self.min.sup(&other.min);
        let hi = self.max.inf(&other.max);
        Aabb { min: lo, max: hi }.volume()
    }
}

/// Validated parameters of a primitive solid, in its own untransformed frame.
///
/// `Tubs` follows the Geant4 cylinder convention: an annulus between
/// `min_rad` and `max_rad`, `2 * half_length` long in z, spanning
/// `[ini_phi, ini_phi + delta_phi)` in azimuth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Box {
        half: Vector3<f64>,
    },
    Tubs {
        min_rad: f64,
        max_rad: f64,
        half_length: f64,
        ini_phi: f64,
        delta_phi: f64,
    },
}

impl Shape {
    pub fn cuboid(hx: f64, hy: f64, hz: f64) -> Result<Self> {
        if ![hx, hy, hz].iter().all(|h| h.is_finite() && *h > 0.0) {
            return Err(SamplerError::config(format!(
                "box half-extents must be positive, got ({}, {}, {})",
                hx, hy, hz
            )));
        }
        Ok(Shape::Box {
            half: Vector3::new(hx, hy, hz),
        })
    }

    /// Box from full side lengths, the way dimensions are usually quoted.
    pub fn cuboid_from_sides(x: f64, y: f64, z: f64) -> Result<Self> {
        Self::cuboid(x / 2.0, y / 2.0, z / 2.0)
    }

    pub fn tubs(
        min_rad: f64,
        max_rad: f64,
        half_length: f64,
        ini_phi: f64,
        delta_phi: f64,
    ) -> Result<Self> {
        let all_finite = [min_rad, max_rad, half_length, ini_phi, delta_phi]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(SamplerError::config("tubs parameters must be finite"));
        }
        if min_rad < 0.0 || max_rad <= 0.0 {
            return Err(SamplerError::config(format!(
                "tubs radii must satisfy 0 <= min < max, got min {} max {}",
                min_rad, max_rad
            )));
        }
        if min_rad > max_rad {
            return Err(SamplerError::config(format!(
                "tubs inner radius {} exceeds outer radius {}",
                min_rad, max_rad
            )));
        }
        if half_length <= 0.0 {
            return Err(SamplerError::config(format!(
                "tubs half-length must be positive, got {}",
                half_length
            )));
        }
        if delta_phi <= 0.0 || delta_phi > TAU + ORTHONORMAL_TOLERANCE {
            return Err(SamplerError::config(format!(
                "tubs angular span must lie in (0, 2π], got {}",
                delta_phi
            )));
        }
        Ok(Shape::Tubs {
            min_rad,
            max_rad,
            half_length,
            ini_phi,
            delta_phi: delta_phi.min(TAU),
        })
    }

    /// Full-turn cylindrical shell.
    pub fn cylinder_shell(min_rad: f64, max_rad: f64, half_length: f64) -> Result<Self> {
        Self::tubs(min_rad, max_rad, half_length, 0.0, TAU)
    }

    pub fn volume(&self) -> f64 {
        match *self {
            Shape::Box { half } => 8.0 * half.x * half.y * half.z,
            Shape::Tubs {
                min_rad,
                max_rad,
                half_length,
                delta_phi,
                ..
            } => 0.5 * delta_phi * (max_rad * max_rad - min_rad * min_rad) * 2.0 * half_length,
        }
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let tol = SURFACE_TOLERANCE;
        match *self {
            Shape::Box { half } => {
                p.x.abs() <= half.x + tol && p.y.abs() <= half.y + tol && p.z.abs() <= half.z + tol
            }
            Shape::Tubs {
                min_rad,
                max_rad,
                half_length,
                ini_phi,
                delta_phi,
            } => {
                if p.z.abs() > half_length + tol {
                    return false;
                }
                let r = p.x.hypot(p.y);
                if r < min_rad - tol || r > max_rad + tol {
                    return false;
                }
                if delta_phi >= TAU {
                    return true;
                }
                let offset = (p.y.atan2(p.x) - ini_phi).rem_euclid(TAU);
                let angular_tol = if r > 0.0 { tol / r } else { PI };
                offset <= delta_phi + angular_tol || offset >= TAU - angular_tol
            }
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        match *self {
            Shape::Box { half } => Aabb::from_half_extents(&half),
            Shape::Tubs {
                max_rad,
                half_length,
                ..
            } => Aabb::from_half_extents(&Vector3::new(max_rad, max_rad, half_length)),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Box { half } => write!(f, "box({:.3}, {:.3}, {:.3})", half.x, half.y, half.z),
            Shape::Tubs {
                min_rad,
                max_rad,
                half_length,
                ini_phi,
                delta_phi,
            } => write!(
                f,
                "tubs(r {:.3}..{:.3}, hz {:.3}, phi {:.4}+{:.4})",
                min_rad, max_rad, half_length, ini_phi, delta_phi
            ),
        }
    }
}
