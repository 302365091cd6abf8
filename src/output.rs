use anyhow::{Context, Result};
use chrono::Utc;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::MM3_PER_M3;
use crate::region::OutputFrame;
use crate::run::RunStats;
use crate::settings::Settings;
use crate::volume::VolumeLedger;


pub const VERTICES_FILE: &str = "vertices.dat";
pub const SUMMARY_FILE: &str = "summary.json";
pub const SETTINGS_FILE: &str = "settings.toml";

/// Everything worth keeping about a finished run, besides the vertices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub region: String,
    pub frame: OutputFrame,
    pub seed: Option<u64>,
    /// Outer size of the lead box in mm.
    pub dimensions: [f64; 3],
    pub stats: RunStats,
    pub volumes_m3: BTreeMap<String, f64>,
}

impl RunSummary {
    pub fn new(
        settings: &Settings,
        dimensions: [f64; 3],
        stats: RunStats,
        ledger: &VolumeLedger,
    ) -> Self {
        Self {
            timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            region: settings.region.clone(),
            frame: settings.frame,
            seed: settings.seed,
            dimensions,
            stats,
            volumes_m3: volumes_in_m3(ledger),
        }
    }
}

fn volumes_in_m3(ledger: &VolumeLedger) -> BTreeMap<String, f64> {
    ledger
        .iter()
        .map(|(name, volume)| (name.to_string(), volume / MM3_PER_M3))
        .collect()
}

/// Write the vertices, one `x y z` line each, to `vertices.dat`.
pub fn write_vertices(points: &[Point3<f64>], output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory {:?}", output_dir))?;
    let path = output_dir.join(VERTICES_FILE);
    let file = File::create(&path).with_context(|| format!("creating {:?}", path))?;
    let mut writer = BufWriter::new(file);

    for p in points {
        writeln!(writer, "{} {} {}", p.x, p.y, p.z)?;
    }
    writer.flush()?;

    Ok(())
}

pub fn write_summary(summary: &RunSummary, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)?;
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(output_dir.join(SUMMARY_FILE), json)?;
    Ok(())
}

/// Echo the effective settings, so a run can be repeated from its output.
pub fn write_settings(settings: &Settings, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)?;
    let text = toml::to_string(settings).context("serializing settings")?;
    fs::write(output_dir.join(SETTINGS_FILE), text)?;
    Ok(())
}
