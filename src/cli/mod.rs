// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and hands off to Layer 2.
//
//   1. `clean` — raw email CSV → cleaned corpus CSV
//   2. `train` — fine-tune the summariser on the corpus
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CleanArgs, Commands, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "mail-summary-tuner",
    version,
    about = "Fine-tune a seq2seq summariser on emails with gradual layer unfreezing."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Clean(args) => run_clean(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting fine-tuning on '{}'", args.data.display());
    let output_dir = args.output_dir.clone();

    let reports = TrainUseCase::new(args.into()).execute()?;

    println!(
        "Training complete after {} epochs. Results in '{}'.",
        reports.len(),
        output_dir.display()
    );
    Ok(())
}

fn run_clean(args: CleanArgs) -> Result<()> {
    use crate::application::clean_use_case::CleanUseCase;

    let output = args.output.clone();
    let rows   = CleanUseCase::new(args.into()).execute()?;

    println!("Wrote {} cleaned emails to '{}'.", rows, output.display());
    Ok(())
}
