//! Boolean solid trees and their volumes.
//!
//! A [`Solid`] is an explicit tree: primitive leaves, unions of placed parts,
//! and subtractions of a placed solid from another. The tree is immutable once
//! built, and every query (containment, bounds, volume) is a pure recursive
//! function over it.
//!
//! Volume rules:
//! - primitives use their analytic measure
//! - unions are the sum of their parts (parts are assumed disjoint, or their
//!   overlap negligible)
//! - subtractions are measured on the combined solid itself: exactly when both
//!   operands are boxes under an axis-aligned placement, otherwise by a
//!   fixed-seed Monte-Carlo estimate over the minuend's bounds

use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};

use crate::config::{VOLUME_ESTIMATE_SAMPLES, VOLUME_ESTIMATE_SEED};
use crate::geom::{Aabb, Shape, Transform};


/// A solid placed inside its parent's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Placed {
    pub solid: Solid,
    pub transform: Transform,
}

impl Placed {
    pub fn new(solid: Solid, transform: Transform) -> Self {
        Self { solid, transform }
    }

    fn contains(&self, p: &Point3<f64>) -> bool {
        self.solid.contains(&self.transform.apply_inverse(p))
    }

    fn bounding_box(&self) -> Aabb {
        self.solid.bounding_box().transformed(&self.transform)
    }
}

/// Node of a boolean solid tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Solid {
    Primitive {
        name: String,
        shape: Shape,
    },
    Union {
        name: String,
        parts: Vec<Placed>,
    },
    Subtraction {
        name: String,
        minuend: Box<Solid>,
        subtrahend: Box<Placed>,
    },
}

impl Solid {
    pub fn primitive(name: impl Into<String>, shape: Shape) -> Self {
        Solid::Primitive {
            name: name.into(),
            shape,
        }
    }

    pub fn union(name: impl Into<String>, parts: Vec<Placed>) -> Self {
        Solid::Union {
            name: name.into(),
            parts,
        }
    }

    pub fn subtraction(name: impl Into<String>, minuend: Solid, subtrahend: Placed) -> Self {
        Solid::Subtraction {
            name: name.into(),
            minuend: Box::new(minuend),
            subtrahend: Box::new(subtrahend),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Solid::Primitive { name, .. }
            | Solid::Union { name, .. }
            | Solid::Subtraction { name, .. } => name,
        }
    }

    /// The primitive shape of a leaf node.
    pub fn shape(&self) -> Option<&Shape> {
        match self {
            Solid::Primitive { shape, .. } => Some(shape),
            _ => None,
        }
    }

    /// Depth-first search for a node by name, this node included.
    pub fn find(&self, name: &str) -> Option<&Solid> {
        if self.name() == name {
            return Some(self);
        }
        match self {
            Solid::Primitive { .. } => None,
            Solid::Union { parts, .. } => parts.iter().find_map(|p| p.solid.find(name)),
            Solid::Subtraction {
                minuend,
                subtrahend,
                ..
            } => minuend.find(name).or_else(|| subtrahend.solid.find(name)),
        }
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        match self {
            Solid::Primitive { shape, .. } => shape.contains(p),
            Solid::Union { parts, .. } => parts.iter().any(|part| part.contains(p)),
            Solid::Subtraction {
                minuend,
                subtrahend,
                ..
            } => minuend.contains(p) && !subtrahend.contains(p),
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        match self {
            Solid::Primitive { shape, .. } => shape.bounding_box(),
            Solid::Union { parts, .. } => parts
                .iter()
                .map(Placed::bounding_box)
                .reduce(|a, b| a.union(&b))
                .unwrap_or_else(|| Aabb::from_half_extents(&nalgebra::Vector3::zeros())),
            Solid::Subtraction { minuend, .. } => minuend.bounding_box(),
        }
    }

    /// Geometric measure of the solid in mm³.
    pub fn cubic_volume(&self) -> f64 {
        match self {
            Solid::Primitive { shape, .. } => shape.volume(),
            Solid::Union { parts, .. } => parts.iter().map(|p| p.solid.cubic_volume()).sum(),
            Solid::Subtraction {
                minuend,
                subtrahend,
                ..
            } => match exact_box_overlap(minuend, subtrahend) {
                Some(overlap) => minuend.cubic_volume() - overlap,
                None => self.estimate_volume(VOLUME_ESTIMATE_SAMPLES, VOLUME_ESTIMATE_SEED),
            },
        }
    }

    /// Monte-Carlo volume estimate: the bounding box volume times the fraction
    /// of uniformly drawn points that fall inside the solid.
    pub fn estimate_volume(&self, samples: usize, seed: u64) -> f64 {
        let bounds = self.bounding_box();
        let box_volume = bounds.volume();
        if box_volume == 0.0 || samples == 0 {
            return 0.0;
        }
        let axis = |lo: f64, hi: f64| Uniform::new_inclusive(lo, hi).ok();
        let (Some(ux), Some(uy), Some(uz)) = (
            axis(bounds.min.x, bounds.max.x),
            axis(bounds.min.y, bounds.max.y),
            axis(bounds.min.z, bounds.max.z),
        ) else {
            return 0.0;
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let hits = (0..samples)
            .filter(|_| {
                let p = Point3::new(
                    ux.sample(&mut rng),
                    uy.sample(&mut rng),
                    uz.sample(&mut rng),
                );
                self.contains(&p)
            })
            .count();
        box_volume * hits as f64 / samples as f64
    }
}

/// Overlap of a box minuend with a box subtrahend placed without any tilt.
fn exact_box_overlap(minuend: &Solid, subtrahend: &Placed) -> Option<f64> {
    match (minuend, &subtrahend.solid) {
        (
            Solid::Primitive {
                shape: Shape::Box { half: outer },
                ..
            },
            Solid::Primitive {
                shape: Shape::Box { half: inner },
                ..
            },
        ) if subtrahend.transform.is_axis_aligned() => {
            let a = Aabb::from_half_extents(outer);
            let b = Aabb::from_half_extents(inner).transformed(&subtrahend.transform);
            Some(a.intersection_volume(&b))
        }
        _ => None,
    }
}
