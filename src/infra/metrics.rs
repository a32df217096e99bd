// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per epoch to `metrics.csv`.
//
//   epoch,train_loss,val_loss,rouge1,rouge2,rouge_l,rouge_lsum,trainable_params,rescheduled
//   1,6.812300,6.790100,0.214000,0.031000,0.188000,0.188000,14767104,true
//
// ROUGE columns hold F-measures and are left empty when the
// validation set had no pairs. Epochs are written 1-based.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::ml::trainer::EpochReport;

const HEADER: [&str; 9] = [
    "epoch", "train_loss", "val_loss", "rouge1", "rouge2", "rouge_l", "rouge_lsum",
    "trainable_params", "rescheduled",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:            usize,
    pub train_loss:       f64,
    pub val_loss:         f64,
    /// ROUGE-1/2/L/Lsum F-measures
    pub rouge:            Option<[f64; 4]>,
    pub trainable_params: usize,
    pub rescheduled:      bool,
}

impl From<&EpochReport> for EpochMetrics {
    fn from(r: &EpochReport) -> Self {
        Self {
            epoch:            r.epoch + 1,
            train_loss:       r.train_loss,
            val_loss:         r.val_loss,
            rouge:            r.scores.map(|s| [
                s.rouge1.fmeasure,
                s.rouge2.fmeasure,
                s.rouge_l.fmeasure,
                s.rouge_lsum.fmeasure,
            ]),
            trainable_params: r.trainable_params,
            rescheduled:      r.rescheduled,
        }
    }
}

impl EpochMetrics {
    fn to_record(&self) -> Vec<String> {
        let mut record = vec![
            self.epoch.to_string(),
            format!("{:.6}", self.train_loss),
            format!("{:.6}", self.val_loss),
        ];
        match self.rouge {
            Some(scores) => record.extend(scores.iter().map(|f| format!("{f:.6}"))),
            None         => record.extend(std::iter::repeat(String::new()).take(4)),
        }
        record.push(self.trainable_params.to_string());
        record.push(self.rescheduled.to_string());
        record
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the header if `metrics.csv` does not exist yet;
    /// later runs append to it.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let logger = Self { csv_path: dir.join("metrics.csv") };
        if !logger.csv_path.exists() {
            logger.append(&HEADER)?;
            tracing::debug!("Created metrics CSV: '{}'", logger.csv_path.display());
        }
        Ok(logger)
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        self.append(&m.to_record())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    fn append<I, T>(&self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        writer.write_record(record)?;
        writer.flush()?;
        Ok(())
    }
}
