//! Data-driven region tables.
//!
//! A region name maps to a [`RegionEntry`]: a sampling [`Strategy`], an output
//! [`OutputFrame`], and an ordered list of weighted [`Alternative`]s. Each
//! alternative wraps a primitive sampler, the sampler region to draw from, and
//! optionally a fixed set of named [`Instance`]s (mirrored or repeated copies
//! of the same piece, each with its own offset).
//!
//! Weights are supplied as volumes and normalised into probability masses when
//! the entry is inserted, so adding a region is a data change.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SamplerError};
use crate::geom::Transform;
use crate::sampler::{PrimitiveSampler, SamplerRegion};
use crate::volume::normalize_masses;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::BoxSampler;
    use approx::assert_relative_eq;

    fn unit_box() -> PrimitiveSampler {
        BoxSampler::new(1.0, 1.0, 1.0, 0.0, Transform::identity())
            .unwrap()
            .into()
    }

    #[test]
    fn masses_come_from_weights() {
        let mut table = RegionTable::new();
        table
            .insert(
                RegionEntry::new("PAIR", Strategy::Direct)
                    .with_alternative(Alternative::new("a", unit_box(), SamplerRegion::WholeVol, 3.0))
                    .with_alternative(Alternative::new("b", unit_box(), SamplerRegion::WholeVol, 7.0)),
            )
            .unwrap();
        let entry = table.get("PAIR").unwrap();
        assert_relative_eq!(entry.alternatives()[0].mass(), 0.3);
        assert_relative_eq!(entry.alternatives()[1].mass(), 0.7);
    }

    #[test]
    fn selection_walks_left_to_right() {
        let mut table = RegionTable::new();
        table
            .insert(
                RegionEntry::new("TRIO", Strategy::Direct)
                    .with_alternative(Alternative::new("a", unit_box(), SamplerRegion::WholeVol, 1.0))
                    .with_alternative(Alternative::new("b", unit_box(), SamplerRegion::WholeVol, 1.0))
                    .with_alternative(Alternative::new("c", unit_box(), SamplerRegion::WholeVol, 2.0)),
            )
            .unwrap();
        let entry = table.get("TRIO").unwrap();
        assert_eq!(entry.select(0.0).unwrap().label(), "a");
        assert_eq!(entry.select(0.2499).unwrap().label(), "a");
        assert_eq!(entry.select(0.25).unwrap().label(), "b");
        assert_eq!(entry.select(0.5).unwrap().label(), "c");
        assert_eq!(entry.select(0.999_999).unwrap().label(), "c");
    }

    #[test]
    fn an_entry_without_alternatives_selects_nothing() {
        let entry = RegionEntry::new("EMPTY", Strategy::Direct);
        assert!(entry.select(0.0).is_none());
        assert!(entry.select(0.7).is_none());
    }

    #[test]
    fn strategy_rules_are_enforced() {
        let mut table = RegionTable::new();
        let mirrored_direct = RegionEntry::new("BAD", Strategy::Direct).with_alternative(
            Alternative::new("a", unit_box(), SamplerRegion::WholeVol, 1.0)
                .with_instance(Instance::offset("left", Vector3::new(-1.0, 0.0, 0.0))),
        );
        assert!(table.insert(mirrored_direct).is_err());

        let bare_mirrored = RegionEntry::new("BAD", Strategy::Mirrored)
            .with_alternative(Alternative::new("a", unit_box(), SamplerRegion::WholeVol, 1.0));
        assert!(table.insert(bare_mirrored).is_err());

        let empty = RegionEntry::new("EMPTY", Strategy::Direct);
        assert!(table.insert(empty).is_err());

        let no_target = RegionEntry::new("REJ", Strategy::rejection(""))
            .with_alternative(Alternative::new("a", unit_box(), SamplerRegion::WholeVol, 1.0));
        assert!(table.insert(no_target).is_err());

        let zero_weight = RegionEntry::new("ZERO", Strategy::Direct)
            .with_alternative(Alternative::new("a", unit_box(), SamplerRegion::WholeVol, 0.0));
        assert!(table.insert(zero_weight).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let entry = || {
            RegionEntry::new("ONE", Strategy::Direct)
                .with_alternative(Alternative::new("a", unit_box(), SamplerRegion::WholeVol, 1.0))
        };
        let mut table = RegionTable::new();
        table.insert(entry()).unwrap();
        assert!(table.insert(entry()).is_err());
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["ONE"]);
    }

    #[test]
    fn frames_parse_from_names() {
        assert_eq!("global".parse::<OutputFrame>().unwrap(), OutputFrame::Global);
        assert_eq!("Local".parse::<OutputFrame>().unwrap(), OutputFrame::Local);
        assert!("lab".parse::<OutputFrame>().is_err());
    }

    #[test]
    fn unknown_region_lookup_fails() {
        let table = RegionTable::new();
        assert_eq!(
            table.lookup("NONEXISTENT_REGION").unwrap_err(),
            SamplerError::UnknownRegion("NONEXISTENT_REGION".into())
        );
    }
}

/// How a region turns a drawn candidate into a vertex.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// The candidate is the vertex. Alternatives carry no instances.
    Direct,
    /// After choosing an alternative, one of its instances is chosen uniformly
    /// and its transform applied to the candidate.
    Mirrored,
    /// Candidates are moved to the global frame and kept only when the
    /// locator reports `target` at that point.
    RejectionSampled { target: String },
}

impl Strategy {
    pub fn rejection(target: impl Into<String>) -> Self {
        Strategy::RejectionSampled {
            target: target.into(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Mirrored => "mirrored",
            Strategy::RejectionSampled { .. } => "rejection",
        }
    }
}

/// Frame a region reports its vertices in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFrame {
    /// The assembly's own frame.
    #[default]
    Local,
    /// The global frame, after the assembly placement.
    Global,
}

impl std::str::FromStr for OutputFrame {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(OutputFrame::Local),
            "global" => Ok(OutputFrame::Global),
            other => Err(SamplerError::config(format!(
                "output frame must be 'local' or 'global', got '{}'",
                other
            ))),
        }
    }
}

/// One copy of a piece: a label and the transform that moves the sampled
/// point onto that copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    label: String,
    transform: Transform,
}

impl Instance {
    pub fn new(label: impl Into<String>, transform: Transform) -> Self {
        Self {
            label: label.into(),
            transform,
        }
    }

    pub fn offset(label: impl Into<String>, offset: Vector3<f64>) -> Self {
        Self::new(label, Transform::from_translation(offset))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }
}

/// A weighted choice within a region.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    label: String,
    sampler: PrimitiveSampler,
    region: SamplerRegion,
    instances: Vec<Instance>,
    weight: f64,
    mass: f64,
}

impl Alternative {
    /// `weight` is any positive measure (usually a volume); masses are
    /// derived from the weights of all alternatives of the region.
    pub fn new(
        label: impl Into<String>,
        sampler: PrimitiveSampler,
        region: SamplerRegion,
        weight: f64,
    ) -> Self {
        Self {
            label: label.into(),
            sampler,
            region,
            instances: Vec::new(),
            weight,
            mass: 0.0,
        }
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_instances(mut self, instances: impl IntoIterator<Item = Instance>) -> Self {
        self.instances.extend(instances);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sampler(&self) -> &PrimitiveSampler {
        &self.sampler
    }

    pub fn region(&self) -> SamplerRegion {
        self.region
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Selection probability within the region.
    pub fn mass(&self) -> f64 {
        self.mass
    }
}

/// Everything needed to sample one named region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionEntry {
    name: String,
    strategy: Strategy,
    frame: OutputFrame,
    alternatives: Vec<Alternative>,
}

impl RegionEntry {
    pub fn new(name: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            name: name.into(),
            strategy,
            frame: OutputFrame::Local,
            alternatives: Vec::new(),
        }
    }

    pub fn with_alternative(mut self, alternative: Alternative) -> Self {
        self.alternatives.push(alternative);
        self
    }

    pub fn in_frame(mut self, frame: OutputFrame) -> Self {
        self.frame = frame;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn frame(&self) -> OutputFrame {
        self.frame
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    /// Discrete inverse-CDF selection: the first alternative whose cumulative
    /// mass exceeds `u` (for `u` in `[0, 1)`). Rounding leftovers fall to the
    /// last alternative. `None` only for an entry without alternatives.
    pub fn select(&self, u: f64) -> Option<&Alternative> {
        let mut cumulative = 0.0;
        for alternative in &self.alternatives {
            cumulative += alternative.mass;
            if u < cumulative {
                return Some(alternative);
            }
        }
        self.alternatives.last()
    }

    fn validate(&self) -> Result<()> {
        if self.alternatives.is_empty() {
            return Err(SamplerError::config(format!(
                "region '{}' has no alternatives",
                self.name
            )));
        }
        match &self.strategy {
            Strategy::Direct => {
                if let Some(alt) = self.alternatives.iter().find(|a| !a.instances.is_empty()) {
                    return Err(SamplerError::config(format!(
                        "direct region '{}' has instances on alternative '{}'",
                        self.name, alt.label
                    )));
                }
            }
            Strategy::Mirrored => {
                if let Some(alt) = self.alternatives.iter().find(|a| a.instances.is_empty()) {
                    return Err(SamplerError::config(format!(
                        "mirrored region '{}' has no instances on alternative '{}'",
                        self.name, alt.label
                    )));
                }
            }
            Strategy::RejectionSampled { target } => {
                if target.is_empty() {
                    return Err(SamplerError::config(format!(
                        "rejection-sampled region '{}' names no target volume",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Region name → entry. Read-only once the assembly is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionTable {
    entries: BTreeMap<String, RegionEntry>,
}

impl RegionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `entry`, turns its weights into masses and stores it.
    pub fn insert(&mut self, mut entry: RegionEntry) -> Result<()> {
        if self.entries.contains_key(&entry.name) {
            return Err(SamplerError::config(format!(
                "region '{}' is defined twice",
                entry.name
            )));
        }
        entry.validate()?;

        let weights: Vec<f64> = entry.alternatives.iter().map(|a| a.weight).collect();
        let masses = normalize_masses(&weights).map_err(|e| {
            SamplerError::config(format!("region '{}': {}", entry.name, e))
        })?;
        for (alternative, mass) in entry.alternatives.iter_mut().zip(masses) {
            alternative.mass = mass;
        }

        debug!(
            "region {} ({}): {}",
            entry.name,
            entry.strategy.tag(),
            entry
                .alternatives
                .iter()
                .map(|a| format!("{} p={:.4} x{}", a.label, a.mass, a.instances.len().max(1)))
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegionEntry> {
        self.entries.get(name)
    }

    /// Like [`get`](Self::get), but an unknown name is an error.
    pub fn lookup(&self, name: &str) -> Result<&RegionEntry> {
        self.get(name)
            .ok_or_else(|| SamplerError::UnknownRegion(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
