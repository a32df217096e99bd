// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Reads and writes everything a model directory holds, using
// Burn's CompactRecorder for weights and JSON for the rest.
//
// The same type serves both ends of a run:
//
//   model_dir/                     (pretrained, read)
//     model_config.json   ← Seq2SeqConfig (architecture)
//     model.mpk           ← pretrained weights
//     tokenizer.json      ← see TokenizerStore
//
//   output_dir/                    (fine-tuned, written)
//     model_config.json   ← copy of the architecture
//     model_finetuned.mpk
//     trainable.json      ← final TrainableSet
//     train_config.json   ← hyperparameters of the run
//
// CompactRecorder: named MessagePack, half precision. The file
// extension comes from the recorder. Loading fails if the record
// does not match the architecture.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, FileRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::trainable::TrainableSet;
use crate::ml::model::{Seq2SeqConfig, Seq2SeqModel};

pub const PRETRAINED_WEIGHTS: &str = "model";
pub const FINETUNED_WEIGHTS:  &str = "model_finetuned";

const MODEL_CONFIG: &str = "model_config.json";
const TRAIN_CONFIG: &str = "train_config.json";
const TRAINABLE:    &str = "trainable.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Manager for an existing directory (nothing is created).
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Manager for an output directory, created like `mkdir -p`.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ── Weights ───────────────────────────────────────────────────────────────

    /// Path of the record file the recorder reads and writes for `name`.
    pub fn model_file<B: Backend>(&self, name: &str) -> PathBuf {
        self.dir
            .join(name)
            .with_extension(<CompactRecorder as FileRecorder<B>>::file_extension())
    }

    pub fn has_model<B: Backend>(&self, name: &str) -> bool {
        self.model_file::<B>(name).exists()
    }

    /// Writes `{dir}/{name}.mpk`; the recorder adds the extension.
    pub fn save_model<B: Backend>(&self, model: &Seq2SeqModel<B>, name: &str) -> Result<()> {
        let file = self.model_file::<B>(name);
        CompactRecorder::new()
            .record(model.clone().into_record(), self.dir.join(name))
            .with_context(|| format!("Failed to save weights to '{}'", file.display()))?;

        tracing::info!("Saved weights to '{}'", file.display());
        Ok(())
    }

    /// Restore weights into `model`, which must have the same architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  Seq2SeqModel<B>,
        name:   &str,
        device: &B::Device,
    ) -> Result<Seq2SeqModel<B>> {
        let file = self.model_file::<B>(name);
        let record = CompactRecorder::new()
            .load(self.dir.join(name), device)
            .with_context(|| format!("Cannot load weights from '{}'", file.display()))?;

        tracing::info!("Loaded weights from '{}'", file.display());
        Ok(model.load_record(record))
    }

    // ── Architecture ──────────────────────────────────────────────────────────

    pub fn has_model_config(&self) -> bool {
        self.dir.join(MODEL_CONFIG).exists()
    }

    pub fn save_model_config(&self, config: &Seq2SeqConfig) -> Result<()> {
        let path = self.dir.join(MODEL_CONFIG);
        config
            .save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))
    }

    pub fn load_model_config(&self) -> Result<Seq2SeqConfig> {
        let path = self.dir.join(MODEL_CONFIG);
        Seq2SeqConfig::load(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read model config '{}': {e}", path.display()))
    }

    // ── Run metadata ──────────────────────────────────────────────────────────

    pub fn save_train_config<T: Serialize>(&self, config: &T) -> Result<()> {
        self.write_json(TRAIN_CONFIG, config)
    }

    pub fn load_train_config<T: DeserializeOwned>(&self) -> Result<T> {
        self.read_json(TRAIN_CONFIG)
    }

    pub fn save_trainable(&self, trainable: &TrainableSet) -> Result<()> {
        self.write_json(TRAINABLE, trainable)
    }

    pub fn load_trainable(&self) -> Result<TrainableSet> {
        self.read_json(TRAINABLE)
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;

        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed JSON in '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::domain::component::{ComponentPath, Part};
    use crate::domain::traits::ParamFlags;
    use crate::ml::model::tests::tiny_config;

    #[test]
    fn test_weights_round_trip() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::create(dir.path().join("out")).unwrap();
        let device = Default::default();

        let model: Seq2SeqModel<NdArray> = tiny_config(20).init(&device);
        assert!(!ckpt.has_model::<NdArray>(FINETUNED_WEIGHTS));
        ckpt.save_model(&model, FINETUNED_WEIGHTS).unwrap();
        assert!(ckpt.has_model::<NdArray>(FINETUNED_WEIGHTS));
        assert!(dir.path().join("out").join("model_finetuned.mpk").exists());

        let fresh: Seq2SeqModel<NdArray> = tiny_config(20).init(&device);
        let loaded = ckpt.load_model(fresh, FINETUNED_WEIGHTS, &device).unwrap();

        // Half precision on disk: compare with a tolerance
        let a: Vec<f32> = model.shared.weight.val().into_data().iter::<f32>().collect();
        let b: Vec<f32> = loaded.shared.weight.val().into_data().iter::<f32>().collect();
        assert!(a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-2));
    }

    #[test]
    fn test_model_config_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::open(dir.path());
        assert!(!ckpt.has_model_config());

        ckpt.save_model_config(&tiny_config(42)).unwrap();
        let loaded = ckpt.load_model_config().unwrap();
        assert_eq!(loaded.vocab_size, 42);
        assert_eq!(loaded.layout(), tiny_config(42).layout());
    }

    #[test]
    fn test_trainable_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::open(dir.path());

        let mut set = TrainableSet::frozen();
        set.unfreeze(ComponentPath::Layer(Part::Decoder, 5));
        ckpt.save_trainable(&set).unwrap();
        assert_eq!(ckpt.load_trainable().unwrap(), set);
    }

    #[test]
    fn test_missing_weights_is_an_error() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::open(dir.path());
        let device = Default::default();
        let model: Seq2SeqModel<NdArray> = tiny_config(20).init(&device);
        assert!(ckpt.load_model(model, PRETRAINED_WEIGHTS, &device).is_err());
    }
}
