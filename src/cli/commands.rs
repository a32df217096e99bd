// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `clean`, and all
// their flags. Each Args struct converts into the matching
// application-layer config; the application layer never sees
// clap types.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{clean_use_case::CleanConfig, train_use_case::TrainConfig};
use crate::ml::{scoring::MetricMode, unfreeze::SharedUnfreeze};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the summariser on a (body, summary) CSV
    Train(TrainArgs),

    /// Clean raw email bodies and add a token count column
    Clean(CleanArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Corpus CSV with a header row
    #[arg(long, default_value = "data/data_complete.csv")]
    pub data: PathBuf,

    /// Column holding the email body
    #[arg(long, default_value = "body")]
    pub document_column: String,

    /// Column holding the reference summary
    #[arg(long, default_value = "resume")]
    pub summary_column: String,

    /// Pretrained model directory (tokenizer.json, model_config.json, model.mpk)
    #[arg(long, default_value = "model")]
    pub model_dir: PathBuf,

    /// Where the fine-tuned weights, metrics and configs are written
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Fixed sequence length: longer texts are truncated, shorter padded
    #[arg(long, default_value_t = 1024)]
    pub max_len: usize,

    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 4)]
    pub epochs: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 5e-5)]
    pub lr: f64,

    /// Batches between two learning-rate decays
    #[arg(long, default_value_t = 100)]
    pub lr_step_size: usize,

    /// Learning-rate decay factor
    #[arg(long, default_value_t = 0.9)]
    pub lr_gamma: f64,

    /// Constant learning rate after each unfreezing step
    #[arg(long, default_value_t = 1e-8)]
    pub rebuild_lr: f64,

    /// Maximum global gradient norm
    #[arg(long, default_value_t = 1.0)]
    pub clip_norm: f64,

    /// Number of early epochs followed by an unfreezing step
    #[arg(long, default_value_t = 3)]
    pub unfreeze_epochs: usize,

    /// Share of the corpus held out for validation
    #[arg(long, default_value_t = 0.15)]
    pub val_fraction: f64,

    /// Seed of the train/validation shuffle
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// How validation ROUGE is reported: last-pair or aggregate
    #[arg(long, default_value_t = MetricMode::LastPair)]
    pub metric_mode: MetricMode,

    /// Positional embedding unfrozen with the shared embedding:
    /// encoder-coupled or part-scoped
    #[arg(long, default_value_t = SharedUnfreeze::EncoderCoupled)]
    pub shared_unfreeze: SharedUnfreeze,

    #[arg(long, default_value = "<pad>")]
    pub pad_token: String,

    /// Run on the CPU (ndarray) instead of the GPU (wgpu)
    #[arg(long)]
    pub cpu: bool,

    /// Fall back to random weights, a default architecture and a
    /// corpus-built tokenizer when the model directory is incomplete
    #[arg(long)]
    pub allow_random_init: bool,

    /// Vocabulary size of the corpus-built tokenizer
    #[arg(long, default_value_t = 8000)]
    pub fallback_vocab_size: usize,

    /// Hide progress bars
    #[arg(long)]
    pub quiet: bool,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_path:           a.data,
            document_column:     a.document_column,
            summary_column:      a.summary_column,
            model_dir:           a.model_dir,
            output_dir:          a.output_dir,
            max_len:             a.max_len,
            batch_size:          a.batch_size,
            epochs:              a.epochs,
            lr:                  a.lr,
            lr_step_size:        a.lr_step_size,
            lr_gamma:            a.lr_gamma,
            rebuild_lr:          a.rebuild_lr,
            clip_norm:           a.clip_norm,
            unfreeze_epochs:     a.unfreeze_epochs,
            val_fraction:        a.val_fraction,
            seed:                a.seed,
            metric_mode:         a.metric_mode,
            shared_unfreeze:     a.shared_unfreeze,
            pad_token:           a.pad_token,
            cpu:                 a.cpu,
            allow_random_init:   a.allow_random_init,
            fallback_vocab_size: a.fallback_vocab_size,
            show_progress:       !a.quiet,
        }
    }
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Raw email CSV with a header row
    #[arg(long)]
    pub input: PathBuf,

    /// Cleaned CSV to write
    #[arg(long)]
    pub output: PathBuf,

    /// Column holding the raw email body
    #[arg(long, default_value = "body")]
    pub body_column: String,

    /// Directory with the tokenizer.json used for the count column
    #[arg(long, default_value = "model")]
    pub tokenizer_dir: PathBuf,
}

impl From<CleanArgs> for CleanConfig {
    fn from(a: CleanArgs) -> Self {
        CleanConfig {
            input:         a.input,
            output:        a.output,
            body_column:   a.body_column,
            tokenizer_dir: a.tokenizer_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["mail-summary-tuner", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg, TrainConfig::default());
    }

    #[test]
    fn test_train_flags() {
        let cli = Cli::try_parse_from([
            "mail-summary-tuner", "train",
            "--epochs", "1",
            "--metric-mode", "aggregate",
            "--shared-unfreeze", "part-scoped",
            "--cpu",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.epochs, 1);
        assert_eq!(cfg.metric_mode, MetricMode::Aggregate);
        assert_eq!(cfg.shared_unfreeze, SharedUnfreeze::PartScoped);
        assert!(cfg.cpu);
    }

    #[test]
    fn test_unknown_metric_mode_is_rejected() {
        assert!(Cli::try_parse_from(["mail-summary-tuner", "train", "--metric-mode", "mean"]).is_err());
    }

    #[test]
    fn test_clean_requires_paths() {
        assert!(Cli::try_parse_from(["mail-summary-tuner", "clean"]).is_err());
        let cli = Cli::try_parse_from(["mail-summary-tuner", "clean", "--input", "a.csv", "--output", "b.csv"]).unwrap();
        assert!(matches!(cli.command, Commands::Clean(_)));
    }
}
