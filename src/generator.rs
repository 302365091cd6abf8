//! Vertex generation over a region table.
//!
//! One call resolves the region, picks an alternative by its probability
//! mass, draws from that alternative's primitive sampler, moves the point onto
//! the chosen instance, and, for rejection-sampled regions, repeats until the
//! point lands in the expected physical volume.
//!
//! The rejection loop terminates in expectation after `1 / a` draws, where `a`
//! is the target volume divided by the candidate volume. If the target is
//! almost entirely carved away, `a` approaches zero and the loop can run
//! effectively forever. [`RetryPolicy`] makes the bound explicit.

use nalgebra::Point3;
use rand::Rng;
use tracing::{trace, warn};

use crate::config::DEFAULT_MAX_REJECTION_ATTEMPTS;
use crate::error::{Result, SamplerError};
use crate::geom::Transform;
use crate::navigator::PointLocator;
use crate::region::{OutputFrame, RegionEntry, RegionTable, Strategy};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Alternative, Instance};
    use crate::sampler::{BoxSampler, SamplerRegion};
    use nalgebra::Vector3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Reports "TARGET" in the x < 0, y < 0 quarter of space.
    struct QuarterLocator;

    impl PointLocator for QuarterLocator {
        fn locate(&self, p: &Point3<f64>) -> Option<&str> {
            if p.x < 0.0 && p.y < 0.0 {
                Some("TARGET")
            } else {
                Some("OTHER")
            }
        }
    }

    struct NeverLocator;

    impl PointLocator for NeverLocator {
        fn locate(&self, _: &Point3<f64>) -> Option<&str> {
            None
        }
    }

    fn cube(half: f64, at: Vector3<f64>) -> BoxSampler {
        BoxSampler::new(half, half, half, 0.0, Transform::from_translation(at)).unwrap()
    }

    fn rejection_generator(placement: Transform, policy: RetryPolicy) -> VertexGenerator {
        let mut table = RegionTable::new();
        table
            .insert(
                RegionEntry::new("CARVED", Strategy::rejection("TARGET")).with_alternative(
                    Alternative::new(
                        "superset",
                        cube(10.0, Vector3::zeros()).into(),
                        SamplerRegion::WholeVol,
                        1.0,
                    ),
                ),
            )
            .unwrap();
        VertexGenerator::new(table, placement).with_retry_policy(policy)
    }

    #[test]
    fn weighted_alternatives_are_chosen_in_proportion() {
        let mut table = RegionTable::new();
        table
            .insert(
                RegionEntry::new("SPLIT", Strategy::Direct)
                    .with_alternative(Alternative::new(
                        "near",
                        cube(1.0, Vector3::new(-100.0, 0.0, 0.0)).into(),
                        SamplerRegion::WholeVol,
                        0.3,
                    ))
                    .with_alternative(Alternative::new(
                        "far",
                        cube(1.0, Vector3::new(100.0, 0.0, 0.0)).into(),
                        SamplerRegion::WholeVol,
                        0.7,
                    )),
            )
            .unwrap();
        let generator = VertexGenerator::new(table, Transform::identity());
        let mut rng = StdRng::seed_from_u64(3);
        let n = 100_000;
        let near = (0..n)
            .filter(|_| {
                generator
                    .generate_vertex("SPLIT", &QuarterLocator, &mut rng)
                    .unwrap()
                    .x
                    < 0.0
            })
            .count();
        let fraction = near as f64 / n as f64;
        assert!((fraction - 0.3).abs() < 0.01, "fraction {}", fraction);
    }

    #[test]
    fn mirrored_instances_form_two_clusters() {
        let d = 50.0;
        let mut table = RegionTable::new();
        table
            .insert(
                RegionEntry::new("PAIR", Strategy::Mirrored).with_alternative(
                    Alternative::new("beam", cube(2.0, Vector3::zeros()).into(), SamplerRegion::WholeVol, 1.0)
                        .with_instance(Instance::offset("right", Vector3::new(d, 0.0, 0.0)))
                        .with_instance(Instance::offset("left", Vector3::new(-d, 0.0, 0.0))),
                ),
            )
            .unwrap();
        let generator = VertexGenerator::new(table, Transform::identity());
        let mut rng = StdRng::seed_from_u64(11);
        let n = 10_000;
        let (mut right, mut left) = (Vec::new(), Vec::new());
        for _ in 0..n {
            let p = generator.generate_vertex("PAIR", &QuarterLocator, &mut rng).unwrap();
            assert!(p.x.abs() > d - 2.0 - 1e-9, "point {:?} near the origin", p);
            if p.x > 0.0 {
                right.push(p.x);
            } else {
                left.push(p.x);
            }
        }
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        assert!((mean(&right) - d).abs() < 0.1);
        assert!((mean(&left) + d).abs() < 0.1);
        let share = right.len() as f64 / n as f64;
        assert!((share - 0.5).abs() < 0.03, "share {}", share);
    }

    #[test]
    fn rejection_draws_average_inverse_acceptance() {
        let generator = rejection_generator(Transform::identity(), RetryPolicy::Unbounded);
        let mut rng = StdRng::seed_from_u64(5);
        let n = 20_000;
        let mut draws = 0u64;
        for _ in 0..n {
            let sample = generator.sample("CARVED", &QuarterLocator, &mut rng).unwrap();
            assert!(sample.point.x < 0.0 && sample.point.y < 0.0);
            draws += sample.draws;
        }
        // acceptance is a quarter of the box
        let mean = draws as f64 / n as f64;
        assert!((mean - 4.0).abs() < 0.1, "mean draws {}", mean);
    }

    #[test]
    fn rejection_tests_the_global_point_but_returns_the_local_one() {
        // placing the assembly at +x 100 moves every candidate out of x < 0
        let shifted = Transform::from_translation(Vector3::new(100.0, 0.0, 0.0));
        let generator = rejection_generator(shifted, RetryPolicy::Bounded(500));
        let mut rng = StdRng::seed_from_u64(1);
        let err = generator
            .generate_vertex("CARVED", &QuarterLocator, &mut rng)
            .unwrap_err();
        assert_eq!(
            err,
            SamplerError::RejectionExhausted {
                region: "CARVED".into(),
                target: "TARGET".into(),
                attempts: 500
            }
        );

        // a half turn about z maps the local x > 0, y > 0 quarter onto the target
        let turned = Transform::from_axis_angle(Vector3::z(), std::f64::consts::PI, Vector3::zeros())
            .unwrap();
        let generator = rejection_generator(turned, RetryPolicy::default());
        for _ in 0..500 {
            let p = generator
                .generate_vertex("CARVED", &QuarterLocator, &mut rng)
                .unwrap();
            assert!(p.x > 0.0 && p.y > 0.0, "{:?}", p);
        }
    }

    #[test]
    fn global_frame_regions_apply_the_placement() {
        let mut table = RegionTable::new();
        table
            .insert(
                RegionEntry::new("GLOBAL", Strategy::Direct)
                    .in_frame(OutputFrame::Global)
                    .with_alternative(Alternative::new(
                        "cube",
                        cube(1.0, Vector3::zeros()).into(),
                        SamplerRegion::WholeVol,
                        1.0,
                    )),
            )
            .unwrap();
        let placement = Transform::from_translation(Vector3::new(0.0, 0.0, 500.0));
        let generator = VertexGenerator::new(table, placement);
        let mut rng = StdRng::seed_from_u64(2);
        let p = generator.generate_vertex("GLOBAL", &NeverLocator, &mut rng).unwrap();
        assert!((p.z - 500.0).abs() <= 1.0);
    }

    #[test]
    fn unknown_region_is_fatal() {
        let generator = rejection_generator(Transform::identity(), RetryPolicy::default());
        let mut rng = StdRng::seed_from_u64(0);
        let result = generator.generate_vertex("NONEXISTENT_REGION", &QuarterLocator, &mut rng);
        assert_eq!(
            result,
            Err(SamplerError::UnknownRegion("NONEXISTENT_REGION".into()))
        );
    }

    #[test]
    fn rejection_outside_the_world_never_accepts() {
        let generator = rejection_generator(Transform::identity(), RetryPolicy::Bounded(10));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generator.sample("CARVED", &NeverLocator, &mut rng).is_err());
    }
}

/// Bound on rejection-sampling draws per vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Give up with [`SamplerError::RejectionExhausted`] after this many draws.
    Bounded(u64),
    /// Keep drawing until a candidate is accepted.
    Unbounded,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Bounded(DEFAULT_MAX_REJECTION_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn from_limit(limit: Option<u64>) -> Self {
        match limit {
            Some(n) => RetryPolicy::Bounded(n),
            None => RetryPolicy::Unbounded,
        }
    }

    fn allows(&self, draws: u64) -> bool {
        match self {
            RetryPolicy::Bounded(max) => draws < *max,
            RetryPolicy::Unbounded => true,
        }
    }
}

/// A generated vertex and the number of candidates drawn to get it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub point: Point3<f64>,
    pub draws: u64,
}

/// Samples the regions of one placed assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexGenerator {
    table: RegionTable,
    placement: Transform,
    retry: RetryPolicy,
}

impl VertexGenerator {
    /// `placement` takes points from the assembly frame to the global frame
    /// (rotation first, then translation).
    pub fn new(table: RegionTable, placement: Transform) -> Self {
        Self {
            table,
            placement,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn table(&self) -> &RegionTable {
        &self.table
    }

    pub fn placement(&self) -> &Transform {
        &self.placement
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Generates one vertex in `region`.
    pub fn generate_vertex<R: Rng + ?Sized>(
        &self,
        region: &str,
        locator: &dyn PointLocator,
        rng: &mut R,
    ) -> Result<Point3<f64>> {
        self.sample(region, locator, rng).map(|s| s.point)
    }

    /// Generates one vertex in `region`, reporting how many candidates it took.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        region: &str,
        locator: &dyn PointLocator,
        rng: &mut R,
    ) -> Result<Sample> {
        let entry = self.table.lookup(region)?;
        let (local, draws) = match entry.strategy() {
            Strategy::Direct | Strategy::Mirrored => (self.candidate(entry, rng)?, 1),
            Strategy::RejectionSampled { target } => {
                self.reject_until_inside(entry, target, locator, rng)?
            }
        };
        let point = match entry.frame() {
            OutputFrame::Local => local,
            OutputFrame::Global => self.placement.apply(&local),
        };
        Ok(Sample { point, draws })
    }

    fn reject_until_inside<R: Rng + ?Sized>(
        &self,
        entry: &RegionEntry,
        target: &str,
        locator: &dyn PointLocator,
        rng: &mut R,
    ) -> Result<(Point3<f64>, u64)> {
        let mut draws = 0u64;
        while self.retry.allows(draws) {
            let local = self.candidate(entry, rng)?;
            draws += 1;
            let global = self.placement.apply(&local);
            match locator.locate(&global) {
                Some(name) if name == target => return Ok((local, draws)),
                found => trace!("rejected {:?}: found {:?}, want {}", global, found, target),
            }
        }
        warn!(
            "region {}: gave up after {} draws without reaching {}",
            entry.name(),
            draws,
            target
        );
        Err(SamplerError::RejectionExhausted {
            region: entry.name().to_string(),
            target: target.to_string(),
            attempts: draws,
        })
    }

    /// One candidate in the assembly frame: choose an alternative, draw from
    /// its sampler, then move onto one of its instances.
    fn candidate<R: Rng + ?Sized>(&self, entry: &RegionEntry, rng: &mut R) -> Result<Point3<f64>> {
        let alternative = entry.select(rng.random::<f64>()).ok_or_else(|| {
            SamplerError::config(format!("region '{}' has no alternatives", entry.name()))
        })?;
        let point = alternative
            .sampler()
            .generate_vertex(alternative.region(), rng)?;
        let instances = alternative.instances();
        if instances.is_empty() {
            return Ok(point);
        }
        let instance = &instances[rng.random_range(0..instances.len())];
        Ok(instance.transform().apply(&point))
    }
}
