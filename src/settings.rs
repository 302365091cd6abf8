use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::generator::RetryPolicy;
use crate::region::OutputFrame;
use crate::shielding::ShieldingDimensions;


/// Runtime configuration for a vertex generation run.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    /// Region key, e.g. `SHIELDING_LEAD`.
    pub region: String,
    pub num_vertices: usize,
    pub seed: Option<u64>,
    /// Draw limit per rejection-sampled vertex. Absent means no limit.
    #[serde(default)]
    pub max_rejection_attempts: Option<u64>,
    #[serde(default)]
    pub verbosity: bool,
    pub directory: PathBuf,
    #[serde(default)]
    pub frame: OutputFrame,
    #[serde(default)]
    pub shielding: ShieldingDimensions,
}

impl Settings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_limit(self.max_rejection_attempts)
    }
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let config = read_config(&root.join("config/default.toml"), false)?;
    validate_config(&config)?;
    Ok(config)
}

/// The configuration file to load: `config/local.toml` when present,
/// `config/default.toml` otherwise.
pub fn config_file() -> Result<PathBuf> {
    let root = retrieve_project_root()?;
    let local_config = root.join("config/local.toml");
    if local_config.exists() {
        Ok(local_config)
    } else {
        Ok(root.join("config/default.toml"))
    }
}

/// Loads `config_file`, applies `VOLGEN_*` environment variables and then
/// the command line.
pub fn load_config(config_file: &Path) -> Result<Settings> {
    let mut config = read_config(config_file, true)?;
    CliArgs::parse().apply(&mut config);
    validate_config(&config)?;

    Ok(config)
}

fn read_config(path: &Path, with_env: bool) -> Result<Settings> {
    let mut builder = Config::builder().add_source(File::from(path).required(true));
    if with_env {
        // nested keys use a double underscore: VOLGEN_SHIELDING__GLOBAL_Z
        builder = builder.add_source(
            Environment::with_prefix("VOLGEN")
                .prefix_separator("_")
                .separator("__"),
        );
    }
    let settings = builder
        .build()
        .with_context(|| format!("loading configuration from {:?}", path))?;
    settings
        .try_deserialize()
        .with_context(|| format!("deserializing configuration from {:?}", path))
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the VOLGEN_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("VOLGEN_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }
    let exe_path = env::current_exe().context("Failed to get current executable path")?;
    let mut current_dir = exe_path.parent();
    while let Some(dir) = current_dir {
        if dir.join("config").is_dir() {
            return Ok(dir.to_path_buf());
        }
        current_dir = dir.parent();
    }
    bail!("Could not find project root directory (set VOLGEN_ROOT_DIR)")
}

pub fn validate_config(config: &Settings) -> Result<()> {
    ensure!(!config.region.is_empty(), "Region must not be empty");
    ensure!(
        config.num_vertices > 0,
        "Number of vertices must be greater than 0"
    );
    if let Some(max) = config.max_rejection_attempts {
        ensure!(max > 0, "Maximum rejection attempts must be greater than 0");
    }
    config
        .shielding
        .validate()
        .context("invalid shielding dimensions")?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "VOLGEN - uniform Monte-Carlo vertices in regions of a lead castle"
)]
pub struct CliArgs {
    /// Region to generate vertices in: SHIELDING_LEAD, SHIELDING_STEEL,
    /// INNER_AIR, EXTERNAL or SHIELDING_STRUCT.
    #[arg(short, long)]
    region: Option<String>,

    /// Number of vertices to generate.
    #[arg(short, long)]
    num: Option<usize>,

    /// Random seed. Without one, the generator is seeded from the OS.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Maximum number of draws for a rejection-sampled vertex.
    #[arg(long, conflicts_with = "unbounded")]
    max_attempts: Option<u64>,

    /// Never give up on a rejection-sampled vertex.
    #[arg(long)]
    unbounded: bool,

    /// Report volumes and region tables.
    #[arg(short, long)]
    verbose: bool,

    /// Output directory.
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Frame of the written vertices: "local" (lead box) or "global".
    #[arg(long)]
    frame: Option<OutputFrame>,

    /// Offset of the castle along the global z axis, in mm.
    #[arg(long, allow_hyphen_values = true)]
    global_z: Option<f64>,
}

impl CliArgs {
    fn apply(self, config: &mut Settings) {
        if let Some(region) = self.region {
            config.region = region;
        }
        if let Some(num) = self.num {
            config.num_vertices = num;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(max) = self.max_attempts {
            config.max_rejection_attempts = Some(max);
        }
        if self.unbounded {
            config.max_rejection_attempts = None;
        }
        if self.verbose {
            config.verbosity = true;
        }
        if let Some(dir) = self.dir {
            config.directory = dir;
        }
        if let Some(frame) = self.frame {
            config.frame = frame;
        }
        if let Some(z) = self.global_z {
            config.shielding.global_z = z;
        }
    }
}
