//! # Lead castle
//!
//! A lead box lined on the inside with a steel box, with a steel beam
//! structure embedded in the lead that holds the castle together. The volume
//! inside the steel box is air.
//!
//! # Key Components
//!
//! - [`ShieldingDimensions`]: every length of the castle, in mm.
//! - [`Shielding`]: the built assembly. It owns the solids, their placement
//!   tree, the volume ledger and the region table, and answers vertex requests
//!   for the five shielding regions.
//!
//! # Frames
//!
//! Vertices are returned in the lead box frame. The lead box itself sits in
//! the `LAB` world turned half a turn about y and shifted along z by
//! [`ShieldingDimensions::global_z`]; [`Shielding::world_point`] applies that
//! placement.
//!
//! # Regions
//!
//! | region | strategy | drawn from |
//! |---|---|---|
//! | `SHIELDING_LEAD` | rejection against `LEAD_BOX` | innermost lead layer around the steel box |
//! | `SHIELDING_STEEL` | rejection against `STEEL_BOX` | steel shell around the air |
//! | `INNER_AIR` | direct | thin shell just inside the air volume |
//! | `EXTERNAL` | direct | thin shell just outside the lead box |
//! | `SHIELDING_STRUCT` | mirrored | roof, top and lateral beams, weighted by volume |

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SamplerError};
use crate::generator::{RetryPolicy, Sample, VertexGenerator};
use crate::geom::{Shape, Transform};
use crate::navigator::{PhysicalVolume, PlacementTree};
use crate::region::{Alternative, Instance, RegionEntry, RegionTable, Strategy};
use crate::sampler::{BoxSampler, SamplerRegion};
use crate::solid::{Placed, Solid};
use crate::volume::VolumeLedger;

pub const SHIELDING_LEAD: &str = "SHIELDING_LEAD";
pub const SHIELDING_STEEL: &str = "SHIELDING_STEEL";
pub const INNER_AIR: &str = "INNER_AIR";
pub const EXTERNAL: &str = "EXTERNAL";
pub const SHIELDING_STRUCT: &str = "SHIELDING_STRUCT";

/// Region names served by the castle.
pub const REGIONS: [&str; 5] = [
    SHIELDING_LEAD,
    SHIELDING_STEEL,
    INNER_AIR,
    EXTERNAL,
    SHIELDING_STRUCT,
];

const WORLD: &str = "LAB";
const LEAD_BOX: &str = "LEAD_BOX";
const STEEL_BOX: &str = "STEEL_BOX";
const AIR_BOX: &str = "INNER_AIR";


/// Castle dimensions in mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldingDimensions {
    /// Inner (air) size of the castle.
    pub shield_x: f64,
    pub shield_y: f64,
    pub shield_z: f64,
    pub beam_thickness: f64,
    /// Distance between the two lateral beams.
    pub lateral_z_separation: f64,
    /// Distance between the top x beams.
    pub roof_z_separation: f64,
    /// Distance between the two front beams.
    pub front_x_separation: f64,
    pub lead_thickness: f64,
    pub steel_thickness: f64,
    /// Depth of the lead layer, next to the steel, that lead vertices come from.
    pub lead_sampling_depth: f64,
    pub external_offset: f64,
    pub external_thickness: f64,
    pub inner_offset: f64,
    pub inner_thickness: f64,
    /// Offset of the castle along the global z axis.
    pub global_z: f64,
}

impl Default for ShieldingDimensions {
    fn default() -> Self {
        Self {
            shield_x: 1580.0,
            shield_y: 1666.0,
            shield_z: 2594.0,
            beam_thickness: 50.0,
            lateral_z_separation: 1010.0,
            roof_z_separation: 760.0,
            front_x_separation: 156.0,
            lead_thickness: 200.0,
            steel_thickness: 100.0,
            lead_sampling_depth: 50.0,
            external_offset: 10.0,
            external_thickness: 1.0,
            inner_offset: 5.0,
            inner_thickness: 1.0,
            global_z: 0.0,
        }
    }
}

impl ShieldingDimensions {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("shield_x", self.shield_x),
            ("shield_y", self.shield_y),
            ("shield_z", self.shield_z),
            ("beam_thickness", self.beam_thickness),
            ("lead_thickness", self.lead_thickness),
            ("steel_thickness", self.steel_thickness),
            ("lead_sampling_depth", self.lead_sampling_depth),
            ("external_thickness", self.external_thickness),
            ("inner_thickness", self.inner_thickness),
        ];
        let non_negative = [
            ("lateral_z_separation", self.lateral_z_separation),
            ("roof_z_separation", self.roof_z_separation),
            ("front_x_separation", self.front_x_separation),
            ("external_offset", self.external_offset),
            ("inner_offset", self.inner_offset),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SamplerError::config(format!(
                    "shielding {} must be positive, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SamplerError::config(format!(
                    "shielding {} must not be negative, got {}",
                    name, value
                )));
            }
        }
        if !self.global_z.is_finite() {
            return Err(SamplerError::config("shielding global_z must be finite"));
        }
        if self.lead_sampling_depth > self.lead_thickness {
            return Err(SamplerError::config(format!(
                "lead sampling depth {} exceeds the lead thickness {}",
                self.lead_sampling_depth, self.lead_thickness
            )));
        }
        let min_shield = self.shield_x.min(self.shield_y).min(self.shield_z);
        if self.inner_offset >= min_shield {
            return Err(SamplerError::config(format!(
                "inner offset {} leaves no air volume",
                self.inner_offset
            )));
        }
        Ok(())
    }

    /// Full size of the lead box.
    pub fn lead_size(&self) -> Vector3<f64> {
        let walls = 2.0 * self.steel_thickness + 2.0 * self.lead_thickness;
        Vector3::new(
            self.shield_x + walls,
            self.shield_y + walls + self.beam_thickness,
            self.shield_z + walls,
        )
    }

    /// Full size of the steel box.
    pub fn steel_size(&self) -> Vector3<f64> {
        Vector3::new(self.shield_x, self.shield_y, self.shield_z)
            .add_scalar(2.0 * self.steel_thickness)
    }

    pub fn lat_beam_x(&self) -> f64 {
        self.shield_x / 2.0 + self.steel_thickness + self.lead_thickness / 2.0
    }

    pub fn front_beam_z(&self) -> f64 {
        self.shield_z / 2.0 + self.steel_thickness + self.lead_thickness / 2.0
    }

    pub fn top_beam_y(&self) -> f64 {
        (self.shield_y - self.beam_thickness) / 2.0
            + self.steel_thickness
            + self.beam_thickness
            + self.lead_thickness / 2.0
    }

    pub fn lat_beam_y(&self) -> f64 {
        -(self.lead_thickness + self.beam_thickness) / 2.0
    }

    pub fn roof_y(&self) -> f64 {
        (self.shield_y - self.beam_thickness) / 2.0
            + self.steel_thickness
            + self.beam_thickness / 2.0
    }

    /// z of the top structure's origin in the lead box.
    fn top_structure_z(&self) -> f64 {
        self.roof_z_separation + self.lateral_z_separation / 2.0
    }

    /// Offsets of the four top x beams from the first one.
    fn top_x_offsets(&self) -> [f64; 4] {
        let (roof, lat) = (self.roof_z_separation, self.lateral_z_separation);
        [0.0, -roof, -(roof + lat), -(2.0 * roof + lat)]
    }
}

/// The solids that make up the castle, before placement.
struct Solids {
    lead_box: Solid,
    roof: Solid,
    lateral_beam: Solid,
    top_x_beam: Solid,
    top_structure: Solid,
    steel_box: Solid,
    air_box: Solid,
}

impl Solids {
    fn build(d: &ShieldingDimensions) -> Result<Self> {
        let lead = d.lead_size();
        let steel = d.steel_size();
        let (beam, lead_t, steel_t) = (d.beam_thickness, d.lead_thickness, d.steel_thickness);

        let roof = Solid::subtraction(
            "STEEL_BEAM_ROOF",
            Solid::primitive("STRUCT_BEAM", Shape::cuboid(lead.x / 2.0, beam / 2.0, lead.z / 2.0)?),
            Placed::new(
                Solid::primitive(
                    "AUX_BOX",
                    Shape::cuboid(steel.x / 2.0, beam, steel.z / 2.0)?,
                ),
                Transform::identity(),
            ),
        );

        let lateral_beam = Solid::primitive(
            "STEEL_BEAM_STRUCTURE_LAT",
            Shape::cuboid_from_sides(lead_t, d.shield_y + 2.0 * steel_t + lead_t, beam)?,
        );

        let top_x_beam = Solid::primitive(
            "TOP_X_BEAM",
            Shape::cuboid_from_sides(lead.x, lead_t, beam)?,
        );
        let top_z_beam = Solid::primitive(
            "TOP_Z_BEAM",
            Shape::cuboid_from_sides(beam, lead_t, lead.z)?,
        );
        let z_beam_z = -d.top_structure_z();
        let mut parts: Vec<Placed> = d
            .top_x_offsets()
            .iter()
            .map(|dz| {
                Placed::new(
                    top_x_beam.clone(),
                    Transform::from_translation(Vector3::new(0.0, 0.0, *dz)),
                )
            })
            .collect();
        for x in [-d.front_x_separation / 2.0, d.front_x_separation / 2.0] {
            parts.push(Placed::new(
                top_z_beam.clone(),
                Transform::from_translation(Vector3::new(x, 0.0, z_beam_z)),
            ));
        }
        let top_structure = Solid::union("STEEL_BEAM_STRUCTURE_TOP", parts);

        Ok(Self {
            lead_box: Solid::primitive(LEAD_BOX, Shape::cuboid_from_sides(lead.x, lead.y, lead.z)?),
            roof,
            lateral_beam,
            top_x_beam,
            top_structure,
            steel_box: Solid::primitive(
                STEEL_BOX,
                Shape::cuboid_from_sides(steel.x, steel.y, steel.z)?,
            ),
            air_box: Solid::primitive(
                AIR_BOX,
                Shape::cuboid(d.shield_x / 2.0, (d.shield_y + steel_t) / 2.0, d.shield_z / 2.0)?,
            ),
        })
    }
}

/// The built lead castle.
#[derive(Debug, Clone, PartialEq)]
pub struct Shielding {
    dims: ShieldingDimensions,
    verbosity: bool,
    tree: PlacementTree,
    ledger: VolumeLedger,
    generator: VertexGenerator,
}

impl Shielding {
    pub fn new(dims: ShieldingDimensions, verbosity: bool) -> Result<Self> {
        Self::build(dims, verbosity, RetryPolicy::default())
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.generator = self.generator.with_retry_policy(retry);
        self
    }

    /// Rebuilds solids, placements, volumes and regions for new dimensions.
    pub fn set_dimensions(&mut self, dims: ShieldingDimensions) -> Result<()> {
        *self = Self::build(dims, self.verbosity, self.generator.retry_policy())?;
        Ok(())
    }

    fn build(dims: ShieldingDimensions, verbosity: bool, retry: RetryPolicy) -> Result<Self> {
        dims.validate()?;
        let solids = Solids::build(&dims)?;
        let ledger = volume_ledger(&dims, &solids);
        let tree = placement_tree(&dims, solids)?;
        let table = region_table(&dims, &ledger, &tree)?;

        let placement = tree.global_transform(LEAD_BOX).ok_or_else(|| {
            SamplerError::config("lead box is missing from the placement tree")
        })?;

        if verbosity {
            info!("lead castle {:?} mm\n{}", dims.lead_size().as_slice(), ledger);
        } else {
            debug!("lead castle {:?} mm", dims.lead_size().as_slice());
        }

        Ok(Self {
            dims,
            verbosity,
            tree,
            ledger,
            generator: VertexGenerator::new(table, placement).with_retry_policy(retry),
        })
    }

    /// Outer size of the lead box.
    pub fn dimensions(&self) -> Vector3<f64> {
        self.dims.lead_size()
    }

    pub fn parameters(&self) -> &ShieldingDimensions {
        &self.dims
    }

    pub fn placement_tree(&self) -> &PlacementTree {
        &self.tree
    }

    pub fn volumes(&self) -> &VolumeLedger {
        &self.ledger
    }

    pub fn regions(&self) -> &RegionTable {
        self.generator.table()
    }

    /// Maps a point in the lead box frame to the global frame.
    pub fn world_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.generator.placement().apply(local)
    }

    pub fn generate_vertex<R: Rng + ?Sized>(&self, region: &str, rng: &mut R) -> Result<Point3<f64>> {
        self.sample(region, rng).map(|s| s.point)
    }

    pub fn sample<R: Rng + ?Sized>(&self, region: &str, rng: &mut R) -> Result<Sample> {
        self.generator.sample(region, &self.tree, rng)
    }
}

fn volume_ledger(d: &ShieldingDimensions, solids: &Solids) -> VolumeLedger {
    let lead = d.lead_size();
    let roof = solids.roof.cubic_volume();
    let top = solids.top_structure.cubic_volume();
    let lateral = solids.lateral_beam.cubic_volume();
    let air = solids.air_box.cubic_volume();
    let steel_box = solids.steel_box.cubic_volume();
    let structure = roof + top + 8.0 * lateral;

    let mut ledger = VolumeLedger::new();
    ledger.record("roof beam", roof);
    ledger.record("front roof", 2.0 * lead.x * d.beam_thickness * d.lead_thickness);
    ledger.record("top structure", top);
    ledger.record("top x beams", 4.0 * solids.top_x_beam.cubic_volume());
    ledger.record("lateral beams", 8.0 * lateral);
    ledger.record("structure total", structure);
    ledger.record("inner air", air);
    ledger.record("steel", steel_box - air);
    ledger.record("lead", solids.lead_box.cubic_volume() - steel_box - structure);
    ledger
}

fn placement_tree(d: &ShieldingDimensions, solids: Solids) -> Result<PlacementTree> {
    let lead = d.lead_size();
    let beam = d.beam_thickness;
    let at = |x: f64, y: f64, z: f64| Transform::from_translation(Vector3::new(x, y, z));

    let steel_box = PhysicalVolume::new(STEEL_BOX, solids.steel_box, at(0.0, -beam / 2.0, 0.0))
        .with_daughter(PhysicalVolume::new(
            AIR_BOX,
            solids.air_box,
            at(0.0, -d.steel_thickness / 2.0, 0.0),
        ));

    let mut lead_box = PhysicalVolume::new(
        LEAD_BOX,
        solids.lead_box,
        Transform {
            translation: Vector3::new(0.0, 0.0, d.global_z),
            ..Transform::rotation_y(PI)
        },
    )
    .with_daughter(PhysicalVolume::new(
        "STEEL_BEAM_STRUCTURE_top",
        solids.top_structure,
        at(0.0, d.top_beam_y(), d.top_structure_z()),
    ))
    .with_daughter(PhysicalVolume::new(
        "STEEL_BEAM_STRUCTURE_roof",
        solids.roof,
        at(0.0, d.roof_y(), 0.0),
    ));

    let (x, y, z) = (d.lat_beam_x(), d.lat_beam_y(), d.lateral_z_separation / 2.0);
    for (i, (sx, sz)) in [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)].iter().enumerate() {
        lead_box.add_daughter(PhysicalVolume::new(
            format!("STEEL_BEAM_STRUCTURE_lat{}", i + 1),
            solids.lateral_beam.clone(),
            at(sx * x, y, sz * z),
        ));
    }
    let (fx, fz) = (d.front_x_separation / 2.0, d.front_beam_z());
    for (i, (sx, sz)) in [(-1.0, 1.0), (1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)].iter().enumerate() {
        lead_box.add_daughter(PhysicalVolume::new(
            format!("STEEL_BEAM_STRUCTURE_lat{}", i + 5),
            solids.lateral_beam.clone(),
            Transform {
                translation: Vector3::new(sx * fx, y, sz * fz),
                ..Transform::rotation_y(PI / 2.0)
            },
        ));
    }
    lead_box.add_daughter(steel_box);

    let half = lead + Vector3::repeat(d.global_z.abs());
    let world = PhysicalVolume::new(
        WORLD,
        Solid::primitive(WORLD, Shape::cuboid(half.x, half.y, half.z)?),
        Transform::identity(),
    )
    .with_daughter(lead_box);
    Ok(PlacementTree::new(world))
}

fn region_table(
    d: &ShieldingDimensions,
    ledger: &VolumeLedger,
    tree: &PlacementTree,
) -> Result<RegionTable> {
    let volume = |name: &str| {
        ledger
            .get(name)
            .ok_or_else(|| SamplerError::config(format!("no volume recorded for '{}'", name)))
    };
    let lead = d.lead_size();
    let steel = d.steel_size();
    let shield = Vector3::new(d.shield_x, d.shield_y, d.shield_z);
    let (beam, lead_t, steel_t) = (d.beam_thickness, d.lead_thickness, d.steel_thickness);
    let steel_centre = Transform::from_translation(Vector3::new(0.0, -beam / 2.0, 0.0));
    let offset = |label: &str, x: f64, z: f64| Instance::offset(label, Vector3::new(x, 0.0, z));
    let shell = |half: Vector3<f64>, thickness: f64, transform: Transform| {
        BoxSampler::new(half.x, half.y, half.z, thickness, transform)
    };
    let solid_box = |x: f64, y: f64, z: f64, transform: Transform| {
        BoxSampler::new(x / 2.0, y / 2.0, z / 2.0, 0.0, transform)
    };

    let mut table = RegionTable::new();

    let depth = d.lead_sampling_depth;
    table.insert(
        RegionEntry::new(SHIELDING_LEAD, Strategy::rejection(LEAD_BOX)).with_alternative(
            Alternative::new(
                "lead next to steel",
                shell(steel / 2.0 + Vector3::repeat(depth), depth, steel_centre)?.into(),
                SamplerRegion::Inside,
                1.0,
            ),
        ),
    )?;

    let steel_box = tree
        .find(STEEL_BOX)
        .ok_or_else(|| SamplerError::config("steel box is missing from the placement tree"))?;
    table.insert(
        RegionEntry::new(SHIELDING_STEEL, Strategy::rejection(STEEL_BOX)).with_alternative(
            Alternative::new(
                "steel shell",
                BoxSampler::from_physical_volume(steel_box, steel_t)?.into(),
                SamplerRegion::Inside,
                1.0,
            ),
        ),
    )?;

    let inner = (shield.add_scalar(-d.inner_offset)) / 2.0 + Vector3::repeat(d.inner_thickness);
    table.insert(RegionEntry::new(INNER_AIR, Strategy::Direct).with_alternative(
        Alternative::new(
            "air skin",
            shell(inner, d.inner_thickness, steel_centre)?.into(),
            SamplerRegion::Inside,
            1.0,
        ),
    ))?;

    let outer = lead.add_scalar(d.external_offset) / 2.0 + Vector3::repeat(d.external_thickness);
    table.insert(RegionEntry::new(EXTERNAL, Strategy::Direct).with_alternative(
        Alternative::new(
            "outer skin",
            shell(outer, d.external_thickness, Transform::identity())?.into(),
            SamplerRegion::Inside,
            1.0,
        ),
    ))?;

    let roof_at = Transform::from_translation(Vector3::new(0.0, d.roof_y(), 0.0));
    let (lat_x, front_z) = (d.lat_beam_x(), d.front_beam_z());
    let top_struct_vol = volume("top structure")?;
    let top_x_vol = volume("top x beams")?;
    let front_roof_vol = volume("front roof")?;
    let lateral_vol = volume("lateral beams")? / 2.0;
    let lat_y = d.lat_beam_y();
    let beam_height = d.shield_y + 2.0 * steel_t + lead_t;
    let front_sep = d.front_x_separation;
    let front_span = 2.0 * front_z;
    let lat_span = 2.0 * lat_x;
    let lat_sep = d.lateral_z_separation;

    let structure = RegionEntry::new(SHIELDING_STRUCT, Strategy::Mirrored)
        .with_alternative(
            Alternative::new(
                "front roof",
                solid_box(lead.x, beam, lead_t, roof_at)?.into(),
                SamplerRegion::Inside,
                front_roof_vol,
            )
            .with_instances([offset("front", 0.0, front_z), offset("back", 0.0, -front_z)]),
        )
        .with_alternative(
            Alternative::new(
                "lateral roof",
                solid_box(lead_t, beam, steel.z, roof_at)?.into(),
                SamplerRegion::Inside,
                volume("roof beam")? - front_roof_vol,
            )
            .with_instances([offset("right", lat_x, 0.0), offset("left", -lat_x, 0.0)]),
        )
        .with_alternative(
            Alternative::new(
                "top x beams",
                solid_box(
                    lead.x,
                    lead_t,
                    beam,
                    Transform::from_translation(Vector3::new(0.0, d.top_beam_y(), d.top_structure_z())),
                )?
                .into(),
                SamplerRegion::Inside,
                top_x_vol,
            )
            .with_instances(
                d.top_x_offsets()
                    .iter()
                    .enumerate()
                    .map(|(i, dz)| offset(format!("x{}", i + 1).as_str(), 0.0, *dz)),
            ),
        )
        .with_alternative(
            Alternative::new(
                "top z beams",
                solid_box(
                    beam,
                    lead_t,
                    lead.z,
                    Transform::from_translation(Vector3::new(-front_sep / 2.0, d.top_beam_y(), 0.0)),
                )?
                .into(),
                SamplerRegion::Inside,
                top_struct_vol - top_x_vol,
            )
            .with_instances([offset("z1", 0.0, 0.0), offset("z2", front_sep, 0.0)]),
        )
        .with_alternative(
            Alternative::new(
                "lateral beams",
                solid_box(
                    lead_t,
                    beam_height,
                    beam,
                    Transform::from_translation(Vector3::new(lat_x, lat_y, lat_sep / 2.0)),
                )?
                .into(),
                SamplerRegion::Inside,
                lateral_vol,
            )
            .with_instances([
                offset("lat1", 0.0, 0.0),
                offset("lat2", 0.0, -lat_sep),
                offset("lat3", -lat_span, 0.0),
                offset("lat4", -lat_span, -lat_sep),
            ]),
        )
        .with_alternative(
            Alternative::new(
                "front beams",
                solid_box(
                    beam,
                    beam_height,
                    lead_t,
                    Transform::from_translation(Vector3::new(-front_sep / 2.0, lat_y, front_z)),
                )?
                .into(),
                SamplerRegion::Inside,
                lateral_vol,
            )
            .with_instances([
                offset("lat5", 0.0, 0.0),
                offset("lat6", front_sep, 0.0),
                offset("lat7", 0.0, -front_span),
                offset("lat8", front_sep, -front_span),
            ]),
        );
    table.insert(structure)?;

    Ok(table)
}
