//! Volume bookkeeping for weighted region selection.
//!
//! Selection probabilities are never typed in by hand: they are derived from
//! solid volumes recorded in a [`VolumeLedger`] and normalised with
//! [`normalize_masses`]. Rebuilding the ledger from new dimensions rebuilds the
//! probabilities with it.

use std::fmt;

use crate::config::MM3_PER_M3;
use crate::error::{Result, SamplerError};


/// Normalises positive weights into probability masses that sum to one.
pub fn normalize_masses(weights: &[f64]) -> Result<Vec<f64>> {
    if weights.is_empty() {
        return Err(SamplerError::config("cannot normalise an empty weight list"));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w <= 0.0) {
        return Err(SamplerError::config(format!(
            "selection weights must be positive and finite, got {}",
            bad
        )));
    }
    let total: f64 = weights.iter().sum();
    Ok(weights.iter().map(|w| w / total).collect())
}

/// Named volumes (mm³), kept in insertion order for reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeLedger {
    entries: Vec<(String, f64)>,
}

impl VolumeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `volume` under `name`, replacing any earlier value.
    pub fn record(&mut self, name: impl Into<String>, volume: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = volume,
            None => self.entries.push((name, volume)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Ratio of two recorded volumes.
    pub fn fraction(&self, part: &str, whole: &str) -> Result<f64> {
        let lookup = |name: &str| {
            self.get(name).ok_or_else(|| {
                SamplerError::config(format!("no volume recorded for '{}'", name))
            })
        };
        let whole_volume = lookup(whole)?;
        if whole_volume <= 0.0 {
            return Err(SamplerError::config(format!(
                "volume of '{}' is not positive",
                whole
            )));
        }
        Ok(lookup(part)? / whole_volume)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

impl fmt::Display for VolumeLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Volumes (m3):")?;
        for (name, volume) in self.iter() {
            writeln!(f, "  {:<22}{:.6}", name, volume / MM3_PER_M3)?;
        }
        Ok(())
    }
}
