// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one fine-tuning run, in order:
//
//   Step 1: Load (document, summary) pairs   (Layer 4 - data)
//   Step 2: Split train/validation           (Layer 4 - data)
//   Step 3: Load tokenizer                   (Layer 6 - infra)
//   Step 4: Load model config + weights      (Layer 6 - infra)
//   Step 5: Initial trainable set            (Layer 5 - ml)
//   Step 6: Build datasets                   (Layer 4 - data)
//   Step 7: Save run config                  (Layer 6 - infra)
//   Step 8: Run training loop                (Layer 5 - ml)
//   Step 9: Save fine-tuned weights          (Layer 6 - infra)
//
// Backend choice happens here and nowhere else: Autodiff<Wgpu>
// by default, Autodiff<NdArray> with `cpu`.

use anyhow::{bail, ensure, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokenizers::Tokenizer;

use crate::data::{dataset::SummaryDataset, loader::CsvCorpusLoader, splitter::split_train_val};
use crate::domain::{trainable::TrainableSet, traits::CorpusSource};
use crate::infra::{
    checkpoint::{CheckpointManager, FINETUNED_WEIGHTS, PRETRAINED_WEIGHTS},
    metrics::{EpochMetrics, MetricsLogger},
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    model::{Seq2SeqConfig, Seq2SeqModel},
    optim::{LrSchedule, StepLr},
    registry::ParameterRegistry,
    scoring::MetricMode,
    trainer::{fit, EpochReport, FitData, FitSettings},
    unfreeze::{unfreeze_layers, SharedUnfreeze},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a run depends on; saved as train_config.json in the
// output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_path:       PathBuf,
    pub document_column: String,
    pub summary_column:  String,
    pub model_dir:       PathBuf,
    pub output_dir:      PathBuf,
    pub max_len:         usize,
    pub batch_size:      usize,
    pub epochs:          usize,
    pub lr:              f64,
    pub lr_step_size:    usize,
    pub lr_gamma:        f64,
    pub rebuild_lr:      f64,
    pub clip_norm:       f64,
    pub unfreeze_epochs: usize,
    pub val_fraction:    f64,
    pub seed:            u64,
    pub metric_mode:     MetricMode,
    pub shared_unfreeze: SharedUnfreeze,
    pub pad_token:       String,
    pub cpu:             bool,
    /// Start from random weights when the model directory is incomplete
    pub allow_random_init:   bool,
    /// Vocabulary size of a tokenizer built from the corpus
    pub fallback_vocab_size: usize,
    pub show_progress:       bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path:           PathBuf::from("data/data_complete.csv"),
            document_column:     "body".to_string(),
            summary_column:      "resume".to_string(),
            model_dir:           PathBuf::from("model"),
            output_dir:          PathBuf::from("output"),
            max_len:             1024,
            batch_size:          2,
            epochs:              4,
            lr:                  5e-5,
            lr_step_size:        100,
            lr_gamma:            0.9,
            rebuild_lr:          1e-8,
            clip_norm:           1.0,
            unfreeze_epochs:     3,
            val_fraction:        0.15,
            seed:                42,
            metric_mode:         MetricMode::LastPair,
            shared_unfreeze:     SharedUnfreeze::EncoderCoupled,
            pad_token:           "<pad>".to_string(),
            cpu:                 false,
            allow_random_init:   false,
            fallback_vocab_size: 8000,
            show_progress:       true,
        }
    }
}

impl TrainConfig {
    fn validate(&self) -> Result<()> {
        ensure!(self.max_len > 0, "max_len must be positive");
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(
            (0.0..1.0).contains(&self.val_fraction),
            "val_fraction must be in [0, 1), got {}",
            self.val_fraction
        );
        ensure!(self.clip_norm > 0.0, "clip_norm must be positive");
        Ok(())
    }

    fn fit_settings(&self) -> FitSettings {
        FitSettings {
            epochs:          self.epochs,
            batch_size:      self.batch_size,
            adam:            AdamConfig::new()
                .with_beta_1(0.9)
                .with_beta_2(0.999)
                .with_epsilon(1e-8),
            schedule:        LrSchedule::Step(StepLr::new(self.lr, self.lr_step_size, self.lr_gamma)),
            rebuild_lr:      self.rebuild_lr,
            clip_norm:       self.clip_norm,
            unfreeze_epochs: self.unfreeze_epochs,
            metric_mode:     self.metric_mode,
            shared_unfreeze: self.shared_unfreeze,
            show_progress:   self.show_progress,
        }
    }
}

/// Architecture used when the model directory has no config.
fn fallback_model_config(vocab_size: usize, max_len: usize) -> Seq2SeqConfig {
    Seq2SeqConfig::new(vocab_size)
        .with_max_positions(max_len)
        .with_d_model(256)
        .with_num_heads(4)
        .with_d_ff(1024)
}

/// Everything frozen except the top layer of each stack.
pub fn initial_trainable_set(
    registry: &ParameterRegistry,
    shared:   SharedUnfreeze,
) -> Result<TrainableSet> {
    let mut set = TrainableSet::frozen();
    for part in ["encoder", "decoder"] {
        unfreeze_layers(&mut set, &registry.layout(), part, &[-1], shared)?;
    }
    Ok(set)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train on the configured CSV corpus with the configured device.
    pub fn execute(&self) -> Result<Vec<EpochReport>> {
        let cfg    = &self.config;
        let loader = CsvCorpusLoader::new(&cfg.data_path, &cfg.document_column, &cfg.summary_column);

        if cfg.cpu {
            let device = NdArrayDevice::Cpu;
            tracing::info!("Using CPU device: {:?}", device);
            self.run::<Autodiff<NdArray>>(&loader, &device)
        } else {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            self.run::<Autodiff<Wgpu>>(&loader, &device)
        }
    }

    pub fn run<B: AutodiffBackend>(
        &self,
        source: &impl CorpusSource,
        device: &B::Device,
    ) -> Result<Vec<EpochReport>> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Load the corpus ───────────────────────────────────────────
        let examples = source.load_all()?;
        ensure!(!examples.is_empty(), "The corpus is empty");

        // ── Step 2: Train / validation split ──────────────────────────────────
        let corpus_texts: Vec<String> = examples
            .iter()
            .flat_map(|e| [e.document.clone(), e.summary.clone()])
            .collect();
        let (train, valid) = split_train_val(examples, 1.0 - cfg.val_fraction, cfg.seed);
        tracing::info!("Split: {} train, {} validation", train.len(), valid.len());

        // ── Step 3: Tokenizer ─────────────────────────────────────────────────
        let tokenizer = self.load_tokenizer(&corpus_texts)?;

        // ── Step 4: Model ─────────────────────────────────────────────────────
        let pretrained   = CheckpointManager::open(&cfg.model_dir);
        let model_config = self.load_model_config(&pretrained, &tokenizer)?;
        let model        = self.load_model::<B>(&pretrained, &model_config, device)?;

        // ── Step 5: Initial trainable set ─────────────────────────────────────
        let registry  = ParameterRegistry::build(&model);
        let trainable = initial_trainable_set(&registry, cfg.shared_unfreeze)?;

        // ── Step 6: Datasets ──────────────────────────────────────────────────
        let train = SummaryDataset::new(train, &tokenizer, cfg.max_len, &cfg.pad_token)?;
        let valid = SummaryDataset::new(valid, &tokenizer, cfg.max_len, &cfg.pad_token)?;

        // ── Step 7: Run metadata ──────────────────────────────────────────────
        let output = CheckpointManager::create(&cfg.output_dir)?;
        output.save_train_config(cfg)?;
        output.save_model_config(&model_config)?;
        let metrics = MetricsLogger::new(&cfg.output_dir)?;

        // ── Step 8: Training loop ─────────────────────────────────────────────
        let outcome = fit(
            model,
            &registry,
            trainable,
            FitData { train: &train, valid: &valid, tokenizer: &tokenizer },
            &cfg.fit_settings(),
            device,
            |report| metrics.log(&EpochMetrics::from(report)),
        )?;

        // ── Step 9: Persist the result ────────────────────────────────────────
        output.save_model(&outcome.model, FINETUNED_WEIGHTS)?;
        output.save_trainable(&outcome.trainable)?;
        tracing::info!("Metrics written to '{}'", metrics.csv_path().display());

        Ok(outcome.reports)
    }

    fn load_tokenizer(&self, corpus_texts: &[String]) -> Result<Tokenizer> {
        let cfg   = &self.config;
        let store = TokenizerStore::new(&cfg.model_dir);
        if store.exists() {
            return store.load();
        }
        if !cfg.allow_random_init {
            bail!(
                "No tokenizer at '{}' (pass --allow-random-init to build one from the corpus)",
                store.path().display()
            );
        }
        tracing::warn!("No pretrained tokenizer; building a word-level one from the corpus");
        TokenizerStore::new(&cfg.output_dir).load_or_build(corpus_texts, cfg.fallback_vocab_size)
    }

    fn load_model_config(
        &self,
        pretrained: &CheckpointManager,
        tokenizer:  &Tokenizer,
    ) -> Result<Seq2SeqConfig> {
        let cfg = &self.config;
        // Embedding rows needed: highest token id + 1
        let vocab_size = tokenizer
            .get_vocab(true)
            .values()
            .max()
            .map_or(0, |&id| id as usize + 1);

        let model_config = if pretrained.has_model_config() {
            pretrained.load_model_config()?
        } else if cfg.allow_random_init {
            tracing::warn!("No model config in '{}'; using the default architecture", pretrained.dir().display());
            fallback_model_config(vocab_size, cfg.max_len)
        } else {
            bail!("No model config in '{}'", pretrained.dir().display());
        };

        ensure!(
            vocab_size <= model_config.vocab_size,
            "Tokenizer has {} tokens but the model only embeds {}",
            vocab_size,
            model_config.vocab_size
        );
        ensure!(
            cfg.max_len <= model_config.max_positions,
            "max_len {} exceeds the model's {} positions",
            cfg.max_len,
            model_config.max_positions
        );
        Ok(model_config)
    }

    fn load_model<B: AutodiffBackend>(
        &self,
        pretrained:   &CheckpointManager,
        model_config: &Seq2SeqConfig,
        device:       &B::Device,
    ) -> Result<Seq2SeqModel<B>> {
        let model: Seq2SeqModel<B> = model_config.init(device);
        tracing::info!(
            "Model ready: {}+{} layers, d_model={}",
            model_config.encoder_layers,
            model_config.decoder_layers,
            model_config.d_model
        );

        if pretrained.has_model::<B>(PRETRAINED_WEIGHTS) {
            pretrained.load_model(model, PRETRAINED_WEIGHTS, device)
        } else if self.config.allow_random_init {
            tracing::warn!("No pretrained weights in '{}'; starting from random init", pretrained.dir().display());
            Ok(model)
        } else {
            bail!(
                "No pretrained weights at '{}'",
                pretrained.model_file::<B>(PRETRAINED_WEIGHTS).display()
            );
        }
    }
}
