//! Loss history for monitoring GAN progress
//!
//! Seven series are tracked, one value per training step each:
//! - `g`: total generator loss
//! - `gd`, `gf`, `gpl`, `gpab`, `gs`: generator terms (adversarial, feature,
//!   pixel L, pixel AB, style), unweighted
//! - `d`: discriminator loss

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

/// Names of the tracked series, in CSV column order
pub const SERIES: [&str; 7] = ["g", "gd", "gf", "gpl", "gpab", "gs", "d"];

/// Loss values of a single step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepLosses {
    pub g: f64,
    pub gd: f64,
    pub gf: f64,
    pub gpl: f64,
    pub gpab: f64,
    pub gs: f64,
    pub d: f64,
}

impl StepLosses {
    /// `(series, value)` pairs in [`SERIES`] order
    pub fn entries(&self) -> [(&'static str, f64); 7] {
        [
            ("g", self.g),
            ("gd", self.gd),
            ("gf", self.gf),
            ("gpl", self.gpl),
            ("gpab", self.gpab),
            ("gs", self.gs),
            ("d", self.d),
        ]
    }

    /// First series whose value is NaN or infinite
    pub fn first_non_finite(&self) -> Option<(&'static str, f64)> {
        self.entries().into_iter().find(|(_, v)| !v.is_finite())
    }
}

/// Append-only loss series
#[derive(Debug, Clone)]
pub struct LossHistory {
    series: BTreeMap<&'static str, Vec<f64>>,
}

impl Default for LossHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl LossHistory {
    /// Create a history with every series empty
    pub fn new() -> Self {
        Self {
            series: SERIES.iter().map(|&name| (name, Vec::new())).collect(),
        }
    }

    /// Append one step
    pub fn record(&mut self, losses: &StepLosses) {
        for (name, value) in losses.entries() {
            self.series.entry(name).or_default().push(value);
        }
    }

    /// Values of one series
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    /// Names of the tracked series
    pub fn series_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.series.keys().copied()
    }

    /// Number of recorded steps
    pub fn len(&self) -> usize {
        self.series.get("g").map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Latest value of every non-empty series
    pub fn latest(&self) -> BTreeMap<String, f64> {
        self.series
            .iter()
            .filter_map(|(name, values)| values.last().map(|v| (name.to_string(), *v)))
            .collect()
    }

    /// Mean of the last `window` values of a series
    pub fn recent_mean(&self, name: &str, window: usize) -> f64 {
        self.get(name)
            .map(|values| moving_average(values, window))
            .unwrap_or(0.0)
    }

    /// Save history to a CSV file, one row per step
    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec!["step"];
        header.extend(SERIES);
        writer.write_record(&header)?;

        for i in 0..self.len() {
            let mut row = vec![(i + 1).to_string()];
            for name in SERIES {
                let value = self.series.get(name).and_then(|v| v.get(i)).copied();
                row.push(value.map(|v| v.to_string()).unwrap_or_default());
            }
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Calculate moving average of last `window` values
fn moving_average(values: &[f64], window: usize) -> f64 {
    if values.is_empty() || window == 0 {
        return 0.0;
    }

    let n = window.min(values.len());
    let sum: f64 = values.iter().rev().take(n).sum();
    sum / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn step(v: f64) -> StepLosses {
        StepLosses {
            g: v,
            gd: v + 1.0,
            gf: v + 2.0,
            gpl: v + 3.0,
            gpab: v + 4.0,
            gs: v + 5.0,
            d: v + 6.0,
        }
    }

    #[test]
    fn test_history_series() {
        let mut history = LossHistory::new();
        assert!(history.is_empty());
        assert_eq!(history.series_names().count(), 7);

        history.record(&step(0.0));
        history.record(&step(1.0));

        assert_eq!(history.len(), 2);
        for name in SERIES {
            assert_eq!(history.get(name).unwrap().len(), 2);
        }
        assert_eq!(history.get("d").unwrap(), &[6.0, 7.0]);
        assert_eq!(history.latest()["gpab"], 5.0);
    }

    #[test]
    fn test_recent_mean() {
        let mut history = LossHistory::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            history.record(&step(v));
        }
        assert_eq!(history.recent_mean("g", 2), 3.5);
        assert_eq!(history.recent_mean("g", 10), 2.5);
        assert_eq!(history.recent_mean("nope", 2), 0.0);
    }

    #[test]
    fn test_non_finite_detection() {
        let mut losses = step(0.5);
        assert!(losses.first_non_finite().is_none());

        losses.gs = f64::NAN;
        let (name, _) = losses.first_non_finite().unwrap();
        assert_eq!(name, "gs");
    }

    #[test]
    fn test_save_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loss_history.csv");

        let mut history = LossHistory::new();
        history.record(&step(0.25));
        history.record(&step(0.5));
        history.save_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("step,g,gd,gf,gpl,gpab,gs,d"));

        let rows: Vec<&str> = content.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[2].starts_with("2,0.5,"));
    }
}
