//! Uniform Monte-Carlo vertex generation in named regions of placed solid
//! assemblies, with the lead castle shielding as the built-in assembly.

pub mod config;
pub mod error;
pub mod generator;
pub mod geom;
pub mod navigator;
pub mod output;
pub mod region;
pub mod run;
pub mod sampler;
pub mod settings;
pub mod shielding;
pub mod solid;
pub mod volume;

pub use error::{Result, SamplerError};
pub use generator::{RetryPolicy, Sample, VertexGenerator};
pub use navigator::{PhysicalVolume, PlacementTree, PointLocator};
pub use sampler::{BoxSampler, CylinderSampler, PrimitiveSampler, SamplerRegion};
pub use shielding::{Shielding, ShieldingDimensions};
