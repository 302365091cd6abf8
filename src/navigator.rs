//! Point location in a hierarchy of placed volumes.
//!
//! The vertex generator never walks geometry itself: it asks a
//! [`PointLocator`] which physical volume occupies a global point, and checks
//! the answer against the volume it expects. [`PlacementTree`] is the
//! reference locator, built from [`PhysicalVolume`]s (a named solid placed in
//! its mother's frame, with daughters of its own). Tests can inject any other
//! implementation.

use nalgebra::Point3;

use crate::geom::Transform;
use crate::solid::Solid;


/// Answers "which physical volume is at this global point?".
pub trait PointLocator {
    /// Name of the innermost volume containing `global`, or `None` outside the world.
    fn locate(&self, global: &Point3<f64>) -> Option<&str>;
}

/// A named solid placed inside its mother volume.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalVolume {
    name: String,
    solid: Solid,
    placement: Transform,
    daughters: Vec<PhysicalVolume>,
}

impl PhysicalVolume {
    pub fn new(name: impl Into<String>, solid: Solid, placement: Transform) -> Self {
        Self {
            name: name.into(),
            solid,
            placement,
            daughters: Vec::new(),
        }
    }

    pub fn with_daughter(mut self, daughter: PhysicalVolume) -> Self {
        self.daughters.push(daughter);
        self
    }

    pub fn add_daughter(&mut self, daughter: PhysicalVolume) {
        self.daughters.push(daughter);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn solid(&self) -> &Solid {
        &self.solid
    }

    /// Placement in the mother volume's frame.
    pub fn placement(&self) -> &Transform {
        &self.placement
    }

    pub fn daughters(&self) -> &[PhysicalVolume] {
        &self.daughters
    }

    /// Innermost volume containing `local` (a point in this volume's own frame).
    /// Daughters are expected not to overlap; the first match wins.
    fn locate_local(&self, local: &Point3<f64>) -> &str {
        for daughter in &self.daughters {
            let q = daughter.placement.apply_inverse(local);
            if daughter.solid.contains(&q) {
                return daughter.locate_local(&q);
            }
        }
        &self.name
    }

    fn path_to(&self, name: &str, into_mother: Transform) -> Option<(&PhysicalVolume, Transform)> {
        let to_global = self.placement.then(&into_mother);
        if self.name == name {
            return Some((self, to_global));
        }
        self.daughters
            .iter()
            .find_map(|d| d.path_to(name, to_global))
    }
}

/// A world volume and everything placed inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementTree {
    world: PhysicalVolume,
}

impl PlacementTree {
    pub fn new(world: PhysicalVolume) -> Self {
        Self { world }
    }

    pub fn world(&self) -> &PhysicalVolume {
        &self.world
    }

    pub fn find(&self, name: &str) -> Option<&PhysicalVolume> {
        self.world
            .path_to(name, Transform::identity())
            .map(|(volume, _)| volume)
    }

    /// Transform taking points in the named volume's frame to global coordinates.
    pub fn global_transform(&self, name: &str) -> Option<Transform> {
        self.world
            .path_to(name, Transform::identity())
            .map(|(_, t)| t)
    }
}

impl PointLocator for PlacementTree {
    fn locate(&self, global: &Point3<f64>) -> Option<&str> {
        let local = self.world.placement.apply_inverse(global);
        if !self.world.solid.contains(&local) {
            return None;
        }
        Some(self.world.locate_local(&local))
    }
}
