//! Error types for sampler construction and vertex generation.

use thiserror::Error;

use crate::sampler::SamplerRegion;

/// Everything that can go wrong while building or querying a sampler.
///
/// Configuration errors are raised at construction time only. The remaining
/// variants are region errors raised by a vertex request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown vertex generation region '{0}'")]
    UnknownRegion(String),

    #[error("region {region} is not defined for {shape} samplers")]
    UnsupportedRegion {
        region: SamplerRegion,
        shape: &'static str,
    },

    #[error(
        "no vertex accepted in volume '{target}' for region '{region}' after {attempts} draws"
    )]
    RejectionExhausted {
        region: String,
        target: String,
        attempts: u64,
    },
}

impl SamplerError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SamplerError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SamplerError>;
