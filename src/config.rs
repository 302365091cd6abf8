/// Distance (mm) within which a point on a solid's surface still counts as inside.
pub const SURFACE_TOLERANCE: f64 = 1e-9;
/// Tolerance used when checking that a rotation matrix is orthonormal.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-9;
/// Default cap on rejection-sampling draws before a vertex request fails.
pub const DEFAULT_MAX_REJECTION_ATTEMPTS: u64 = 1_000_000;
/// Number of points used when a solid's volume has to be estimated by sampling.
pub const VOLUME_ESTIMATE_SAMPLES: usize = 1_000_000;
/// Fixed seed for volume estimation, so repeated queries give the same answer.
pub const VOLUME_ESTIMATE_SEED: u64 = 0x5eed_cafe;
/// mm³ per m³, for the volume report.
pub const MM3_PER_M3: f64 = 1.0e9;
