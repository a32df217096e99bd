// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Fine-tunes the summariser with gradual unfreezing.
//
//   Init
//    │   optimizer bound to the initial trainable set
//    ▼
//   ┌─► TrainEpoch      forward (no labels) → CE loss → backward
//   │    │              → trainable grads only → clip → Adam
//   │    ▼              → schedule step
//   │   EvalEpoch       model.valid(): inner backend, no dropout,
//   │    │              no autograd. Loss, greedy decode, ROUGE
//   │    ▼
//   │   MaybeReschedule unfreeze {-1..-(epoch+1)} on both stacks,
//   │    │              rebuild Adam at rebuild_lr (constant)
//   └────┘
//    ▼
//   Done               weights are saved by the caller
//
// Generic over the autodiff backend, so the same loop runs on
// Autodiff<Wgpu> in production and Autodiff<NdArray> in tests.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam
//            Howard & Ruder (2018) gradual unfreezing

use anyhow::{Context, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::AdamConfig,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokenizers::Tokenizer;

use crate::data::{batcher::SummaryBatcher, dataset::SummaryDataset};
use crate::domain::component::Part;
use crate::domain::trainable::TrainableSet;
use crate::ml::model::{greedy_ids, token_cross_entropy, Seq2SeqModel};
use crate::ml::optim::{BoundOptimizer, LrSchedule};
use crate::ml::registry::ParameterRegistry;
use crate::ml::scoring::{rouge, MetricMode, RougeAccumulator, RougeScores};
use crate::ml::unfreeze::{schedule_offsets, unfreeze_part, SharedUnfreeze};

#[derive(Clone)]
pub struct FitSettings {
    pub epochs:          usize,
    pub batch_size:      usize,
    pub adam:            AdamConfig,
    /// Schedule of the initial optimizer
    pub schedule:        LrSchedule,
    /// Constant rate of every rebuilt optimizer
    pub rebuild_lr:      f64,
    pub clip_norm:       f64,
    /// Epochs (counted from 0) after which more layers are unfrozen
    pub unfreeze_epochs: usize,
    pub metric_mode:     MetricMode,
    pub shared_unfreeze: SharedUnfreeze,
    pub show_progress:   bool,
}

/// Everything the loop reads but never changes.
pub struct FitData<'a> {
    pub train:     &'a SummaryDataset,
    pub valid:     &'a SummaryDataset,
    /// Used to decode predictions and labels for scoring
    pub tokenizer: &'a Tokenizer,
}

#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch:                usize,
    pub train_loss:           f64,
    pub val_loss:             f64,
    /// `None` when the validation set is empty
    pub scores:               Option<RougeScores>,
    pub rescheduled:          bool,
    pub trainable_params:     usize,
}

pub struct FitOutcome<B: AutodiffBackend> {
    pub model:     Seq2SeqModel<B>,
    pub trainable: TrainableSet,
    pub reports:   Vec<EpochReport>,
}

/// More layers are unfrozen after `epoch` only during the first
/// `unfreeze_epochs` epochs, and only if another epoch follows.
pub fn should_reschedule(epoch: usize, epochs: usize, unfreeze_epochs: usize) -> bool {
    epoch < unfreeze_epochs && epoch + 1 < epochs
}

pub fn fit<B: AutodiffBackend>(
    mut model:     Seq2SeqModel<B>,
    registry:      &ParameterRegistry,
    mut trainable: TrainableSet,
    data:          FitData<'_>,
    settings:      &FitSettings,
    device:        &B::Device,
    mut on_epoch:  impl FnMut(&EpochReport) -> Result<()>,
) -> Result<FitOutcome<B>> {
    let layout = registry.layout();

    // ── Init ──────────────────────────────────────────────────────────────────
    let mut optim = BoundOptimizer::bind(
        settings.adam.init::<B, Seq2SeqModel<B>>(),
        registry,
        &trainable,
        settings.schedule.clone(),
    )?;
    tracing::info!(
        "Training {} of {} parameters ({} components)",
        registry.trainable_params(&trainable),
        registry.total_params(),
        trainable.len(),
    );

    let train_batcher = SummaryBatcher::<B>::new(device.clone());
    // Validation runs on the inner backend: no autodiff overhead
    let valid_batcher = SummaryBatcher::<B::InnerBackend>::new(device.clone());

    if data.valid.is_empty() {
        tracing::warn!("Validation set is empty: val_loss will be NaN and ROUGE is not reported");
    }

    let mut reports = Vec::with_capacity(settings.epochs);

    for epoch in 0..settings.epochs {
        // ── TrainEpoch ────────────────────────────────────────────────────────
        let bar = progress_bar(
            data.train.batch_count(settings.batch_size),
            format!("Training (epoch #{epoch})"),
            settings.show_progress,
        )?;

        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for batch in data.train.batches(settings.batch_size) {
            let batch  = train_batcher.batch(batch?);
            let output = model.forward(batch.input_ids, batch.attention_mask, None);
            let loss   = token_cross_entropy(output.logits, batch.labels);

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            loss_sum += loss_val;
            batches  += 1;

            let (updated, grad_norm) = optim.backward_step(model, loss, settings.clip_norm);
            model = updated;
            tracing::debug!(
                "epoch {epoch} batch {batches}: loss={loss_val:.4} grad_norm={grad_norm:.4} lr={:e}",
                optim.learning_rate(),
            );

            bar.set_message(format!("{loss_val:.4}"));
            bar.inc(1);
        }
        bar.finish_and_clear();

        let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };

        // ── EvalEpoch ─────────────────────────────────────────────────────────
        let (val_loss, scores) = evaluate(
            &model.valid(),
            &valid_batcher,
            &data,
            settings,
            epoch,
        )?;

        // ── MaybeReschedule ───────────────────────────────────────────────────
        let rescheduled = should_reschedule(epoch, settings.epochs, settings.unfreeze_epochs);
        if rescheduled {
            let offsets = schedule_offsets(epoch);
            for part in [Part::Encoder, Part::Decoder] {
                unfreeze_part(&mut trainable, &layout, part, &offsets, settings.shared_unfreeze)
                    .with_context(|| format!("Cannot unfreeze {part} layers {offsets:?}"))?;
            }
            optim = BoundOptimizer::bind(
                settings.adam.init::<B, Seq2SeqModel<B>>(),
                registry,
                &trainable,
                LrSchedule::Constant(settings.rebuild_lr),
            )?;
            tracing::info!(
                "Unfroze layers {:?}: {} trainable parameters, lr={:e}",
                offsets,
                registry.trainable_params(&trainable),
                optim.learning_rate(),
            );
        }

        let report = EpochReport {
            epoch,
            train_loss,
            val_loss,
            scores,
            rescheduled,
            trainable_params:     registry.trainable_params(&trainable),
        };

        match &report.scores {
            Some(s) => println!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | rouge1={:.4} | rouge2={:.4} | rougeL={:.4} | rougeLsum={:.4}",
                epoch + 1, settings.epochs, train_loss, val_loss,
                s.rouge1.fmeasure, s.rouge2.fmeasure, s.rouge_l.fmeasure, s.rouge_lsum.fmeasure,
            ),
            None => println!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | no validation pairs",
                epoch + 1, settings.epochs, train_loss, val_loss,
            ),
        }

        on_epoch(&report)?;
        reports.push(report);
    }

    tracing::info!("Training complete");
    Ok(FitOutcome { model, trainable, reports })
}

/// Mean validation loss and the epoch's ROUGE scores.
fn evaluate<B: Backend>(
    model:    &Seq2SeqModel<B>,
    batcher:  &SummaryBatcher<B>,
    data:     &FitData<'_>,
    settings: &FitSettings,
    epoch:    usize,
) -> Result<(f64, Option<RougeScores>)> {
    let bar = progress_bar(
        data.valid.batch_count(settings.batch_size),
        format!("Evaluation (epoch #{epoch})"),
        settings.show_progress,
    )?;

    let mut loss_sum = 0.0f64;
    let mut batches  = 0usize;
    let mut scores   = RougeAccumulator::new(settings.metric_mode);

    for batch in data.valid.batches(settings.batch_size) {
        let batch  = batcher.batch(batch?);
        let output = model.forward(batch.input_ids, batch.attention_mask, Some(batch.labels));

        let loss = output.loss.context("Forward pass with labels returned no loss")?;
        let loss_val: f64 = loss.into_scalar().elem::<f64>();
        loss_sum += loss_val;
        batches  += 1;
        bar.set_message(format!("{loss_val:.4}"));

        for (predicted, label) in greedy_ids(output.logits).iter().zip(&batch.label_ids) {
            let hypothesis = decode(data.tokenizer, predicted)?;
            let reference  = decode(data.tokenizer, label)?;
            scores.add(rouge(&reference, &hypothesis));
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    let val_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
    tracing::debug!("Scored {} validation pairs", scores.count());
    Ok((val_loss, scores.finish()))
}

fn decode(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String> {
    tokenizer
        .decode(ids, true)
        .map_err(|e| anyhow::anyhow!("Cannot decode token ids: {e}"))
}

fn progress_bar(len: usize, prefix: String, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} loss: {msg}")?
            .progress_chars("#>-"),
    );
    bar.set_prefix(prefix);
    Ok(bar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    use crate::data::dataset::tests::{word_tokenizer, PAD};
    use crate::domain::component::ComponentPath;
    use crate::domain::example::Example;
    use crate::domain::traits::ParamFlags;
    use crate::ml::model::tests::tiny_config;

    type TestBackend = Autodiff<NdArray>;

    const TEXTS: [&str; 6] = [
        "the meeting moved to thursday morning",
        "meeting thursday",
        "please send the report before friday",
        "report friday",
        "lunch is cancelled today",
        "lunch cancelled",
    ];

    fn settings(epochs: usize) -> FitSettings {
        FitSettings {
            epochs,
            batch_size:      2,
            adam:            AdamConfig::new(),
            schedule:        LrSchedule::Constant(1e-3),
            rebuild_lr:      1e-8,
            clip_norm:       1.0,
            unfreeze_epochs: 3,
            metric_mode:     MetricMode::Aggregate,
            shared_unfreeze: SharedUnfreeze::EncoderCoupled,
            show_progress:   false,
        }
    }

    fn initial_set(registry: &ParameterRegistry) -> TrainableSet {
        let mut set = TrainableSet::frozen();
        for part in [Part::Encoder, Part::Decoder] {
            unfreeze_part(&mut set, &registry.layout(), part, &[-1], SharedUnfreeze::EncoderCoupled).unwrap();
        }
        set
    }

    fn run(epochs: usize) -> FitOutcome<TestBackend> {
        let (_dir, tok) = word_tokenizer(&TEXTS);
        let examples: Vec<Example> = TEXTS.chunks(2).map(|p| Example::new(p[0], p[1])).collect();
        let train = SummaryDataset::new(examples.clone(), &tok, 8, PAD).unwrap();
        let valid = SummaryDataset::new(examples[..2].to_vec(), &tok, 8, PAD).unwrap();

        let device = Default::default();
        let model: Seq2SeqModel<TestBackend> =
            tiny_config(tok.get_vocab_size(true)).init(&device);
        let registry  = ParameterRegistry::build(&model);
        let trainable = initial_set(&registry);

        let mut seen = Vec::new();
        let outcome = fit(
            model,
            &registry,
            trainable,
            FitData { train: &train, valid: &valid, tokenizer: &tok },
            &settings(epochs),
            &device,
            |report| {
                seen.push(report.epoch);
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(seen, (0..epochs).collect::<Vec<_>>());
        outcome
    }

    #[test]
    fn test_should_reschedule() {
        let after: Vec<usize> = (0..4).filter(|&e| should_reschedule(e, 4, 3)).collect();
        assert_eq!(after, vec![0, 1, 2]);
        assert!(!should_reschedule(0, 1, 3));
        assert!(!should_reschedule(3, 10, 3));
    }

    #[test]
    fn test_four_epochs_reschedule_three_times() {
        let outcome = run(4);
        let rescheduled: Vec<bool> = outcome.reports.iter().map(|r| r.rescheduled).collect();
        assert_eq!(rescheduled, vec![true, true, true, false]);

        // Every report after a reschedule trains more parameters
        for pair in outcome.reports.windows(2) {
            assert!(pair[1].trainable_params >= pair[0].trainable_params);
        }

        // The tiny model has 3 layers per stack: all of them are trainable now
        for i in 0..3 {
            assert!(outcome.trainable.is_trainable(&ComponentPath::Layer(Part::Encoder, i)));
            assert!(outcome.trainable.is_trainable(&ComponentPath::Layer(Part::Decoder, i)));
        }

        for report in &outcome.reports {
            assert!(report.train_loss.is_finite());
            assert!(report.val_loss.is_finite());
            let scores = report.scores.unwrap();
            assert!((0.0..=1.0).contains(&scores.rouge1.fmeasure));
        }
    }

    #[test]
    fn test_rebuilt_optimizer_updates_newly_unfrozen_layers() {
        let (_dir, tok) = word_tokenizer(&TEXTS);
        let examples: Vec<Example> = TEXTS.chunks(2).map(|p| Example::new(p[0], p[1])).collect();
        let train = SummaryDataset::new(examples.clone(), &tok, 8, PAD).unwrap();
        let valid = SummaryDataset::new(examples[..1].to_vec(), &tok, 8, PAD).unwrap();

        let device = Default::default();
        let model: Seq2SeqModel<TestBackend> =
            tiny_config(tok.get_vocab_size(true)).init(&device);
        let registry  = ParameterRegistry::build(&model);
        let trainable = initial_set(&registry);

        let weights = |m: &Seq2SeqModel<TestBackend>, i: usize| {
            m.encoder.layers[i].fc1.weight.val().into_data()
        };
        let layer0 = weights(&model, 0);
        let layer1 = weights(&model, 1);

        // Epoch 2 trains with the optimizer rebuilt after epoch 1,
        // which is the first one bound to layer 1.
        let settings = FitSettings { rebuild_lr: 1e-2, ..settings(3) };
        let outcome = fit(
            model,
            &registry,
            trainable,
            FitData { train: &train, valid: &valid, tokenizer: &tok },
            &settings,
            &device,
            |_| Ok(()),
        )
        .unwrap();

        assert_ne!(weights(&outcome.model, 1), layer1);
        assert_eq!(weights(&outcome.model, 0), layer0);
        assert!(!outcome.trainable.is_trainable(&ComponentPath::Layer(Part::Encoder, 0)));
    }

    #[test]
    fn test_single_epoch_never_reschedules() {
        let outcome = run(1);
        assert_eq!(outcome.reports.len(), 1);
        assert!(!outcome.reports[0].rescheduled);

        // only the initial top layers
        assert!(outcome.trainable.is_trainable(&ComponentPath::Layer(Part::Encoder, 2)));
        assert!(!outcome.trainable.is_trainable(&ComponentPath::Layer(Part::Encoder, 1)));
    }

    #[test]
    fn test_callback_error_aborts_the_run() {
        let (_dir, tok) = word_tokenizer(&TEXTS);
        let examples = vec![Example::new(TEXTS[0], TEXTS[1])];
        let train = SummaryDataset::new(examples.clone(), &tok, 8, PAD).unwrap();
        let valid = SummaryDataset::new(examples, &tok, 8, PAD).unwrap();

        let device = Default::default();
        let model: Seq2SeqModel<TestBackend> =
            tiny_config(tok.get_vocab_size(true)).init(&device);
        let registry  = ParameterRegistry::build(&model);
        let trainable = initial_set(&registry);

        let mut calls = 0;
        let result = fit(
            model,
            &registry,
            trainable,
            FitData { train: &train, valid: &valid, tokenizer: &tok },
            &settings(3),
            &device,
            |_| {
                calls += 1;
                anyhow::bail!("disk full")
            },
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
