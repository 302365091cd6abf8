//! Uniform point samplers for primitive solids.
//!
//! Each sampler owns one validated primitive and a fixed [`Transform`]. A call
//! to `generate_vertex` draws a point uniformly over the requested region of
//! the shape in its own frame, then rotates and translates it into the
//! parent's frame. Samplers hold no mutable state: all randomness comes from
//! the caller's generator.

use std::fmt;
use std::str::FromStr;

use nalgebra::{Point3, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplerError};
use crate::geom::{Shape, Transform};
use crate::navigator::PhysicalVolume;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::{PI, TAU};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn region_names_parse() {
        assert_eq!("WHOLE_VOL".parse::<SamplerRegion>(), Ok(SamplerRegion::WholeVol));
        assert_eq!("VOLUME".parse::<SamplerRegion>(), Ok(SamplerRegion::WholeVol));
        assert_eq!("INSIDE".parse::<SamplerRegion>(), Ok(SamplerRegion::Inside));
        assert_eq!(
            "OUTER_SURFACE".parse::<SamplerRegion>(),
            Ok(SamplerRegion::OuterSurface)
        );
        assert_eq!(
            "NONEXISTENT_REGION".parse::<SamplerRegion>(),
            Err(SamplerError::UnknownRegion("NONEXISTENT_REGION".into()))
        );
        assert_eq!(SamplerRegion::InnerSurface.to_string(), "INNER_SURFACE");
    }

    #[test]
    fn box_whole_volume_stays_in_bounds_and_is_centred() {
        let sampler = BoxSampler::new(10.0, 10.0, 10.0, 0.0, Transform::identity()).unwrap();
        let mut rng = rng();
        let n = 10_000;
        let mut sum = Vector3::zeros();
        for _ in 0..n {
            let p = sampler.generate_vertex(SamplerRegion::WholeVol, &mut rng).unwrap();
            for c in p.iter() {
                assert!((-10.0..=10.0).contains(c), "coordinate {} out of bounds", c);
            }
            sum += p.coords;
        }
        let mean = sum / n as f64;
        // std of U(-10,10) is 10/sqrt(3); 5 sigma of the mean is ~0.29
        for m in mean.iter() {
            assert!(m.abs() < 0.3, "mean {}", m);
        }
    }

    #[test]
    fn box_marginals_are_flat() {
        let sampler = BoxSampler::new(3.0, 5.0, 7.0, 0.0, Transform::identity()).unwrap();
        let mut rng = rng();
        let n = 50_000;
        let bins = 10;
        let mut counts = [[0usize; 10]; 3];
        let half = [3.0, 5.0, 7.0];
        for _ in 0..n {
            let p = sampler.generate_vertex(SamplerRegion::WholeVol, &mut rng).unwrap();
            for axis in 0..3 {
                let u = (p[axis] + half[axis]) / (2.0 * half[axis]);
                let bin = ((u * bins as f64) as usize).min(bins - 1);
                counts[axis][bin] += 1;
            }
        }
        let expected = n as f64 / bins as f64;
        for axis in counts.iter() {
            for c in axis.iter() {
                // ~7 sigma band on a binomial count of 5000
                assert!((*c as f64 - expected).abs() < 500.0, "bin count {}", c);
            }
        }
    }

    #[test]
    fn box_shell_is_uniform_over_the_face_layers() {
        let (hx, hy, hz, t) = (4.0, 3.0, 2.0, 0.5);
        let sampler = BoxSampler::new(hx, hy, hz, t, Transform::identity()).unwrap();
        let mut rng = rng();
        let n = 60_000;
        let mut in_x_layer = 0usize;
        for _ in 0..n {
            let p = sampler.generate_vertex(SamplerRegion::Inside, &mut rng).unwrap();
            let inner = p.x.abs() < hx - t && p.y.abs() < hy - t && p.z.abs() < hz - t;
            assert!(!inner, "shell point {:?} fell in the core", p);
            assert!(p.x.abs() <= hx && p.y.abs() <= hy && p.z.abs() <= hz);
            if p.x.abs() >= hx - t {
                in_x_layer += 1;
            }
        }
        // for a uniform shell, P(|x| in outer band) = x-slab volume / shell volume
        let shell = 8.0 * (hx * hy * hz - (hx - t) * (hy - t) * (hz - t));
        let x_slabs = 2.0 * t * (2.0 * hy) * (2.0 * hz);
        let observed = in_x_layer as f64 / n as f64;
        assert!((observed - x_slabs / shell).abs() < 0.01, "observed {}", observed);
        assert_relative_eq!(sampler.volume(SamplerRegion::Inside).unwrap(), shell, epsilon = 1e-9);
    }

    #[test]
    fn zero_thickness_inside_is_whole_volume() {
        let sampler = BoxSampler::new(1.0, 2.0, 3.0, 0.0, Transform::identity()).unwrap();
        assert_relative_eq!(
            sampler.volume(SamplerRegion::Inside).unwrap(),
            sampler.volume(SamplerRegion::WholeVol).unwrap()
        );
        let mut a = rng();
        let mut b = rng();
        for _ in 0..100 {
            assert_eq!(
                sampler.generate_vertex(SamplerRegion::Inside, &mut a).unwrap(),
                sampler.generate_vertex(SamplerRegion::WholeVol, &mut b).unwrap()
            );
        }
    }

    #[test]
    fn box_rejects_bad_configuration() {
        assert!(BoxSampler::new(0.0, 1.0, 1.0, 0.0, Transform::identity()).is_err());
        assert!(BoxSampler::new(1.0, 1.0, 1.0, -0.1, Transform::identity()).is_err());
        assert!(BoxSampler::new(1.0, 1.0, 1.0, 1.5, Transform::identity()).is_err());
        let tubs = Shape::cylinder_shell(0.0, 1.0, 1.0).unwrap();
        assert!(BoxSampler::from_shape(tubs, 0.0, Transform::identity()).is_err());
    }

    #[test]
    fn box_has_no_surfaces() {
        let sampler = BoxSampler::new(1.0, 1.0, 1.0, 0.0, Transform::identity()).unwrap();
        let err = sampler
            .generate_vertex(SamplerRegion::OuterSurface, &mut rng())
            .unwrap_err();
        assert!(matches!(err, SamplerError::UnsupportedRegion { .. }));
    }

    #[test]
    fn cylinder_radii_follow_areal_density() {
        let r_max = 4.0;
        let sampler =
            CylinderSampler::new(0.0, r_max, 1.0, 0.0, TAU, Transform::identity()).unwrap();
        let mut rng = rng();
        let n = 40_000;
        let mut inner_half = 0usize;
        let mut r_sum = 0.0;
        for _ in 0..n {
            let p = sampler.generate_vertex(SamplerRegion::WholeVol, &mut rng).unwrap();
            let r = p.x.hypot(p.y);
            assert!(r <= r_max + 1e-12);
            assert!(p.z.abs() <= 1.0);
            r_sum += r;
            if r < r_max / 2.0 {
                inner_half += 1;
            }
        }
        // f(r) ∝ r gives P(r < R/2) = 1/4 and E[r] = 2R/3; uniform-in-r would give 1/2 and R/2
        assert!((inner_half as f64 / n as f64 - 0.25).abs() < 0.01);
        assert!((r_sum / n as f64 - 2.0 * r_max / 3.0).abs() < 0.03);
    }

    #[test]
    fn cylinder_sector_respects_phi_window_and_transform() {
        let t = Transform::from_axis_angle(Vector3::x(), PI / 2.0, Vector3::new(0.0, 0.0, 50.0))
            .unwrap();
        let sampler = CylinderSampler::new(1.0, 2.0, 3.0, 0.0, PI / 2.0, t).unwrap();
        let shape = sampler.shape();
        let mut rng = rng();
        for _ in 0..2_000 {
            let p = sampler.generate_vertex(SamplerRegion::WholeVol, &mut rng).unwrap();
            assert!(shape.contains(&t.apply_inverse(&p)), "{:?}", p);
        }
    }

    #[test]
    fn cylinder_surfaces_sit_on_their_radius() {
        let sampler =
            CylinderSampler::new(1.5, 2.5, 3.0, 0.0, TAU, Transform::identity()).unwrap();
        let mut rng = rng();
        for _ in 0..200 {
            let inner = sampler.generate_vertex(SamplerRegion::InnerSurface, &mut rng).unwrap();
            assert_relative_eq!(inner.x.hypot(inner.y), 1.5, epsilon = 1e-9);
            let outer = sampler.generate_vertex(SamplerRegion::OuterSurface, &mut rng).unwrap();
            assert_relative_eq!(outer.x.hypot(outer.y), 2.5, epsilon = 1e-9);
        }
        assert!(sampler.generate_vertex(SamplerRegion::Inside, &mut rng).is_err());
    }

    #[test]
    fn placed_tubs_samples_land_in_the_placed_solid() {
        use crate::navigator::{PlacementTree, PointLocator};
        use crate::solid::Solid;

        let placement =
            Transform::from_axis_angle(Vector3::y(), PI / 3.0, Vector3::new(20.0, -5.0, 8.0))
                .unwrap();
        let pipe = PhysicalVolume::new(
            "PIPE",
            Solid::primitive("PIPE", Shape::tubs(2.0, 6.0, 10.0, 0.0, PI).unwrap()),
            placement,
        );
        let direct = CylinderSampler::from_physical_volume(&pipe).unwrap();
        let wrapped = PrimitiveSampler::from_physical_volume(&pipe, 0.0).unwrap();
        assert!(matches!(wrapped, PrimitiveSampler::Cylinder(_)));
        assert_eq!(direct.transform(), &placement);

        let world = PhysicalVolume::new(
            "WORLD",
            Solid::primitive("WORLD", Shape::cuboid(100.0, 100.0, 100.0).unwrap()),
            Transform::identity(),
        )
        .with_daughter(pipe);
        let tree = PlacementTree::new(world);
        let mut rng = rng();
        for _ in 0..2_000 {
            let p = direct.generate_vertex(SamplerRegion::WholeVol, &mut rng).unwrap();
            assert_eq!(tree.locate(&p), Some("PIPE"), "{:?}", p);
            let q = wrapped.generate_vertex(SamplerRegion::WholeVol, &mut rng).unwrap();
            assert_eq!(tree.locate(&q), Some("PIPE"), "{:?}", q);
        }
    }

    #[test]
    fn cylinder_rejects_inverted_radii() {
        assert!(CylinderSampler::new(3.0, 2.0, 1.0, 0.0, TAU, Transform::identity()).is_err());
    }

    #[test]
    fn null_transform_changes_nothing() {
        let plain = BoxSampler::new(2.0, 3.0, 4.0, 0.5, Transform::identity()).unwrap();
        let null = Transform::from_axis_angle(Vector3::z(), 0.0, Vector3::zeros()).unwrap();
        let placed = BoxSampler::new(2.0, 3.0, 4.0, 0.5, null).unwrap();
        let mut a = rng();
        let mut b = rng();
        for _ in 0..1_000 {
            let pa = plain.generate_vertex(SamplerRegion::Inside, &mut a).unwrap();
            let pb = placed.generate_vertex(SamplerRegion::Inside, &mut b).unwrap();
            assert_relative_eq!(pa, pb, epsilon = 1e-12);
        }
    }

    #[test]
    fn named_generation_reports_unknown_regions() {
        let sampler = PrimitiveSampler::from(
            BoxSampler::new(1.0, 1.0, 1.0, 0.0, Transform::identity()).unwrap(),
        );
        let mut rng = rng();
        assert!(sampler.generate_vertex_named("WHOLE_VOL", &mut rng).is_ok());
        assert_eq!(
            sampler.generate_vertex_named("NONEXISTENT_REGION", &mut rng),
            Err(SamplerError::UnknownRegion("NONEXISTENT_REGION".into()))
        );
    }
}

/// Region of a primitive from which a point is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplerRegion {
    /// The whole solid.
    WholeVol,
    /// The inset shell of a box (the whole box when the thickness is zero).
    Inside,
    /// Inner lateral surface of a cylindrical shell.
    InnerSurface,
    /// Outer lateral surface of a cylindrical shell.
    OuterSurface,
}

impl SamplerRegion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplerRegion::WholeVol => "WHOLE_VOL",
            SamplerRegion::Inside => "INSIDE",
            SamplerRegion::InnerSurface => "INNER_SURFACE",
            SamplerRegion::OuterSurface => "OUTER_SURFACE",
        }
    }
}

impl FromStr for SamplerRegion {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WHOLE_VOL" | "VOLUME" => Ok(SamplerRegion::WholeVol),
            "INSIDE" => Ok(SamplerRegion::Inside),
            "INNER_SURFACE" => Ok(SamplerRegion::InnerSurface),
            "OUTER_SURFACE" => Ok(SamplerRegion::OuterSurface),
            other => Err(SamplerError::UnknownRegion(other.to_string())),
        }
    }
}

impl fmt::Display for SamplerRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform draw in `[-h, h)`. Unlike `random_range`, a zero extent is fine.
fn symmetric<R: Rng + ?Sized>(rng: &mut R, h: f64) -> f64 {
    h * (2.0 * rng.random::<f64>() - 1.0)
}

/// Samples an axis-aligned box, either its full volume or an inset shell.
///
/// The shell is split into six disjoint slabs: the two x-faces take the full
/// y and z extent, the y-faces are restricted to the inner x extent, and the
/// z-faces to the inner x and y extents. A slab pair is chosen in proportion
/// to its volume and a fair coin picks the side, which keeps the density flat
/// across edges and corners.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSampler {
    half: Vector3<f64>,
    thickness: f64,
    transform: Transform,
    slab_volumes: [f64; 3],
}

impl BoxSampler {
    pub fn new(hx: f64, hy: f64, hz: f64, thickness: f64, transform: Transform) -> Result<Self> {
        Self::from_shape(Shape::cuboid(hx, hy, hz)?, thickness, transform)
    }

    pub fn from_shape(shape: Shape, thickness: f64, transform: Transform) -> Result<Self> {
        let Shape::Box { half } = shape else {
            return Err(SamplerError::config(format!(
                "box sampler needs a box, got {}",
                shape
            )));
        };
        let min_half = half.x.min(half.y).min(half.z);
        if !thickness.is_finite() || thickness < 0.0 || thickness > min_half {
            return Err(SamplerError::config(format!(
                "box shell thickness must lie in [0, {}], got {}",
                min_half, thickness
            )));
        }

        let inner = half.add_scalar(-thickness);
        let slab_volumes = [
            2.0 * thickness * (2.0 * half.y) * (2.0 * half.z),
            2.0 * thickness * (2.0 * inner.x) * (2.0 * half.z),
            2.0 * thickness * (2.0 * inner.x) * (2.0 * inner.y),
        ];

        tracing::debug!(
            "box sampler: half-extents {:?}, shell {}, origin {:?}",
            half.as_slice(),
            thickness,
            transform.translation.as_slice()
        );

        Ok(Self {
            half,
            thickness,
            transform,
            slab_volumes,
        })
    }

    /// Sampler for a placed box volume, in the frame of its mother volume.
    pub fn from_physical_volume(volume: &PhysicalVolume, thickness: f64) -> Result<Self> {
        let shape = volume.solid().shape().copied().ok_or_else(|| {
            SamplerError::config(format!(
                "physical volume '{}' is not a primitive solid",
                volume.name()
            ))
        })?;
        Self::from_shape(shape, thickness, *volume.placement())
    }

    pub fn half_extents(&self) -> &Vector3<f64> {
        &self.half
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Measure of `region` in mm³.
    pub fn volume(&self, region: SamplerRegion) -> Result<f64> {
        match region {
            SamplerRegion::WholeVol => Ok(8.0 * self.half.x * self.half.y * self.half.z),
            SamplerRegion::Inside if self.thickness == 0.0 => self.volume(SamplerRegion::WholeVol),
            SamplerRegion::Inside => Ok(self.slab_volumes.iter().sum()),
            other => Err(self.unsupported(other)),
        }
    }

    pub fn generate_vertex<R: Rng + ?Sized>(
        &self,
        region: SamplerRegion,
        rng: &mut R,
    ) -> Result<Point3<f64>> {
        let local = match region {
            SamplerRegion::WholeVol => self.solid_point(rng),
            SamplerRegion::Inside if self.thickness == 0.0 => self.solid_point(rng),
            SamplerRegion::Inside => self.shell_point(rng),
            other => return Err(self.unsupported(other)),
        };
        Ok(self.transform.apply(&local))
    }

    fn solid_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Point3<f64> {
        Point3::new(
            symmetric(rng, self.half.x),
            symmetric(rng, self.half.y),
            symmetric(rng, self.half.z),
        )
    }

    fn shell_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Point3<f64> {
        let total: f64 = self.slab_volumes.iter().sum();
        let u = rng.random::<f64>() * total;
        let axis = if u < self.slab_volumes[0] {
            0
        } else if u < self.slab_volumes[0] + self.slab_volumes[1] {
            1
        } else {
            2
        };

        let inner = self.half.add_scalar(-self.thickness);
        // axes before the face axis are restricted to the inner extent
        let mut p = Point3::origin();
        for i in 0..3 {
            p[i] = match i.cmp(&axis) {
                std::cmp::Ordering::Less => symmetric(rng, inner[i]),
                std::cmp::Ordering::Greater => symmetric(rng, self.half[i]),
                std::cmp::Ordering::Equal => {
                    let depth = self.thickness * rng.random::<f64>();
                    let side = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
                    side * (self.half[i] - depth)
                }
            };
        }
        p
    }

    fn unsupported(&self, region: SamplerRegion) -> SamplerError {
        SamplerError::UnsupportedRegion {
            region,
            shape: "box",
        }
    }
}

/// Samples a cylindrical shell sector (Geant4 tubs convention).
#[derive(Debug, Clone, PartialEq)]
pub struct CylinderSampler {
    min_rad: f64,
    max_rad: f64,
    half_length: f64,
    ini_phi: f64,
    delta_phi: f64,
    transform: Transform,
}

impl CylinderSampler {
    pub fn new(
        min_rad: f64,
        max_rad: f64,
        half_length: f64,
        ini_phi: f64,
        delta_phi: f64,
        transform: Transform,
    ) -> Result<Self> {
        Self::from_shape(
            Shape::tubs(min_rad, max_rad, half_length, ini_phi, delta_phi)?,
            transform,
        )
    }

    pub fn from_shape(shape: Shape, transform: Transform) -> Result<Self> {
        match shape {
            Shape::Tubs {
                min_rad,
                max_rad,
                half_length,
                ini_phi,
                delta_phi,
            } => Ok(Self {
                min_rad,
                max_rad,
                half_length,
                ini_phi,
                delta_phi,
                transform,
            }),
            other => Err(SamplerError::config(format!(
                "cylinder sampler needs a tubs, got {}",
                other
            ))),
        }
    }

    /// Sampler for a placed tubs volume, in the frame of its mother volume.
    pub fn from_physical_volume(volume: &PhysicalVolume) -> Result<Self> {
        let shape = volume.solid().shape().copied().ok_or_else(|| {
            SamplerError::config(format!(
                "physical volume '{}' is not a primitive solid",
                volume.name()
            ))
        })?;
        Self::from_shape(shape, *volume.placement())
    }

    pub fn shape(&self) -> Shape {
        Shape::Tubs {
            min_rad: self.min_rad,
            max_rad: self.max_rad,
            half_length: self.half_length,
            ini_phi: self.ini_phi,
            delta_phi: self.delta_phi,
        }
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Measure of `region`: mm³ for the volume, mm² for the surfaces.
    pub fn volume(&self, region: SamplerRegion) -> Result<f64> {
        let length = 2.0 * self.half_length;
        match region {
            SamplerRegion::WholeVol => Ok(self.shape().volume()),
            SamplerRegion::InnerSurface => Ok(self.delta_phi * self.min_rad * length),
            SamplerRegion::OuterSurface => Ok(self.delta_phi * self.max_rad * length),
            other => Err(self.unsupported(other)),
        }
    }

    pub fn generate_vertex<R: Rng + ?Sized>(
        &self,
        region: SamplerRegion,
        rng: &mut R,
    ) -> Result<Point3<f64>> {
        let r = match region {
            SamplerRegion::WholeVol => self.radius(rng),
            SamplerRegion::InnerSurface => self.min_rad,
            SamplerRegion::OuterSurface => self.max_rad,
            other => return Err(self.unsupported(other)),
        };
        let phi = self.ini_phi + self.delta_phi * rng.random::<f64>();
        let z = symmetric(rng, self.half_length);
        let local = Point3::new(r * phi.cos(), r * phi.sin(), z);
        Ok(self.transform.apply(&local))
    }

    /// Inverse CDF of the annulus area law, so points are uniform per unit area.
    fn radius<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let (a, b) = (self.min_rad * self.min_rad, self.max_rad * self.max_rad);
        (a + rng.random::<f64>() * (b - a)).sqrt()
    }

    fn unsupported(&self, region: SamplerRegion) -> SamplerError {
        SamplerError::UnsupportedRegion {
            region,
            shape: "cylinder",
        }
    }
}

/// Any primitive sampler.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveSampler {
    Box(BoxSampler),
    Cylinder(CylinderSampler),
}

impl From<BoxSampler> for PrimitiveSampler {
    fn from(sampler: BoxSampler) -> Self {
        PrimitiveSampler::Box(sampler)
    }
}

impl From<CylinderSampler> for PrimitiveSampler {
    fn from(sampler: CylinderSampler) -> Self {
        PrimitiveSampler::Cylinder(sampler)
    }
}

impl PrimitiveSampler {
    /// Builds the matching sampler for a placed primitive. `thickness` only
    /// applies to boxes.
    pub fn from_physical_volume(volume: &PhysicalVolume, thickness: f64) -> Result<Self> {
        match volume.solid().shape() {
            Some(Shape::Box { .. }) => {
                BoxSampler::from_physical_volume(volume, thickness).map(Into::into)
            }
            Some(Shape::Tubs { .. }) => CylinderSampler::from_physical_volume(volume).map(Into::into),
            None => Err(SamplerError::config(format!(
                "physical volume '{}' is not a primitive solid",
                volume.name()
            ))),
        }
    }

    pub fn transform(&self) -> &Transform {
        match self {
            PrimitiveSampler::Box(s) => s.transform(),
            PrimitiveSampler::Cylinder(s) => s.transform(),
        }
    }

    pub fn volume(&self, region: SamplerRegion) -> Result<f64> {
        match self {
            PrimitiveSampler::Box(s) => s.volume(region),
            PrimitiveSampler::Cylinder(s) => s.volume(region),
        }
    }

    pub fn generate_vertex<R: Rng + ?Sized>(
        &self,
        region: SamplerRegion,
        rng: &mut R,
    ) -> Result<Point3<f64>> {
        match self {
            PrimitiveSampler::Box(s) => s.generate_vertex(region, rng),
            PrimitiveSampler::Cylinder(s) => s.generate_vertex(region, rng),
        }
    }

    /// Same as [`generate_vertex`](Self::generate_vertex) with the region given by name.
    pub fn generate_vertex_named<R: Rng + ?Sized>(
        &self,
        region: &str,
        rng: &mut R,
    ) -> Result<Point3<f64>> {
        self.generate_vertex(region.parse()?, rng)
    }
}
