use std::{fs::File, io::BufWriter, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::Objective;
use crate::paramspace::ModelPartition;

/// Everything recorded for one scorer call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub point: usize,
    pub model_id: String,
    pub error: f64,
    pub accuracy: f64,
    /// Value minimised by the session, derived from `error` or `accuracy`.
    pub objective: f64,
    /// Acquisition value the optimizer reported when proposing the point.
    pub acquisition: f64,
    pub seconds: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub objective: Objective,
    pub optimizer: String,
    pub domain_size: usize,
    pub partitions: Vec<ModelPartition>,
    pub evaluations: Vec<Evaluation>,
}

impl SessionReport {
    /// Evaluation with the lowest objective. The earliest wins ties.
    pub fn best(&self) -> Option<&Evaluation> {
        self.evaluations
            .iter()
            .reduce(|best, e| if e.objective < best.objective { e } else { best })
    }

    pub fn observed_fraction(&self) -> f64 {
        if self.domain_size == 0 {
            return 1.0;
        }
        let mut points = self.evaluations.iter().map(|e| e.point).collect::<Vec<_>>();
        points.sort_unstable();
        points.dedup();
        points.len() as f64 / self.domain_size as f64
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let writer = File::options()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)
            .with_context(|| format!("Could not open {} for writing", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(writer), self)
            .with_context(|| format!("Could not write report to {}", path.display()))?;
        Ok(())
    }
}
