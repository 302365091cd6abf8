use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::info;

use crate::generator::Sample;
use crate::output::{self, RunSummary};
use crate::region::OutputFrame;
use crate::settings::Settings;
use crate::shielding::Shielding;


/// Running totals over the generated vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub count: usize,
    /// Candidates drawn, accepted or not.
    pub draws: u64,
    pub sum: [f64; 3],
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            count: 0,
            draws: 0,
            sum: [0.0; 3],
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }
}

impl RunStats {
    pub fn record(&mut self, sample: &Sample) {
        self.count += 1;
        self.draws += sample.draws;
        for i in 0..3 {
            let v = sample.point[i];
            self.sum[i] += v;
            self.min[i] = self.min[i].min(v);
            self.max[i] = self.max[i].max(v);
        }
    }

    pub fn mean(&self) -> [f64; 3] {
        if self.count == 0 {
            return [0.0; 3];
        }
        let n = self.count as f64;
        [self.sum[0] / n, self.sum[1] / n, self.sum[2] / n]
    }

    /// Accepted vertices per drawn candidate.
    pub fn acceptance(&self) -> f64 {
        if self.draws == 0 {
            return 0.0;
        }
        self.count as f64 / self.draws as f64
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean = self.mean();
        writeln!(f, "Vertices:   {}", self.count)?;
        writeln!(f, "Draws:      {}", self.draws)?;
        writeln!(f, "Acceptance: {:.4}", self.acceptance())?;
        writeln!(f, "Axis          mean           min           max")?;
        for (i, axis) in ["x", "y", "z"].iter().enumerate() {
            writeln!(
                f,
                "{:<4}{:>14.3}{:>14.3}{:>14.3}",
                axis, mean[i], self.min[i], self.max[i]
            )?;
        }
        Ok(())
    }
}

/// A batch of vertices drawn from one region of the castle.
#[derive(Debug)]
pub struct VertexRun {
    settings: Settings,
    shielding: Shielding,
    vertices: Vec<Point3<f64>>,
    stats: RunStats,
}

impl VertexRun {
    pub fn new(settings: Settings) -> Result<Self> {
        let shielding = Shielding::new(settings.shielding, settings.verbosity)
            .context("building the lead castle")?
            .with_retry_policy(settings.retry_policy());
        Ok(Self {
            settings,
            shielding,
            vertices: Vec::new(),
            stats: RunStats::default(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn shielding(&self) -> &Shielding {
        &self.shielding
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Draws all vertices from a single random stream.
    ///
    /// **Context**: A run is one region and one stream. Seeded runs are
    /// repeatable; without a seed the stream comes from the OS.
    ///
    /// **How it Works**: Each vertex is drawn from the castle, moved to the
    /// global frame if requested, and folded into the statistics. The first
    /// region error ends the run.
    pub fn solve(&mut self) -> Result<()> {
        let start = Instant::now();
        info!("Generating vertices in {}...", self.settings.region);

        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let n = self.settings.num_vertices;
        let pb = ProgressBar::new(n as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>7}/{len:7} {msg} ETA: {eta_precise}",
            )?
            .progress_chars("█▇▆▅▄▃▂▁"),
        );
        pb.set_message("vertices".to_string());

        self.vertices.clear();
        self.vertices.reserve(n);
        self.stats = RunStats::default();

        for _ in 0..n {
            let sample = self
                .shielding
                .sample(&self.settings.region, &mut rng)
                .with_context(|| format!("generating a vertex in {}", self.settings.region))?;
            let point = match self.settings.frame {
                OutputFrame::Local => sample.point,
                OutputFrame::Global => self.shielding.world_point(&sample.point),
            };
            let sample = Sample { point, ..sample };
            self.stats.record(&sample);
            self.vertices.push(point);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let duration = start.elapsed();
        let time_per_vertex = duration / n.max(1) as u32;
        println!(
            "Time taken: {:.2?}, Time per vertex: {:.2?}",
            duration, time_per_vertex
        );
        println!("Results:");
        print!("{}", self.stats);

        Ok(())
    }

    /// Writes vertices, the run summary and the effective settings to the
    /// output directory.
    pub fn writeup(&self) -> Result<()> {
        let dir = &self.settings.directory;
        output::write_vertices(&self.vertices, dir)?;

        let dims: Vector3<f64> = self.shielding.dimensions();
        let summary = RunSummary::new(
            &self.settings,
            [dims.x, dims.y, dims.z],
            self.stats.clone(),
            self.shielding.volumes(),
        );
        output::write_summary(&summary, dir)?;
        output::write_settings(&self.settings, dir)?;

        info!("Results written to {:?}", dir);
        Ok(())
    }
}
