use crate::pipeline::stages::StageKind;
use clap::{Parser, Subcommand};

/// AI-driven test artifact generator for financial applications
#[derive(Parser, Debug)]
#[command(
    name = "testforge",
    about = "AI-driven test artifact generator for financial applications",
    version,
    long_about = "testforge drives generative-AI models to produce test dimensions, scenarios, \
                  cases, steps and expected outputs from a requirements knowledge base. Every \
                  response is validated against a declared schema and optionally judged by a \
                  second verifier model before it is accepted."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Generate one artifact stage",
        long_about = "Runs one stage of the pipeline over its input records.\n\n\
                      Examples:\n  \
                      testforge generate dimensions\n  \
                      testforge generate cases --from 0 --to 5\n  \
                      testforge generate outputs --tries 2 --instructions \"Use FNO segment only\""
    )]
    Generate(GenerateArgs),

    #[command(
        about = "Delete uploaded reference documents and context caches",
        long_about = "Best-effort removal of the remote context caches, uploaded documents and \
                      the knowledge collection, plus the local cache descriptors. Safe to run \
                      repeatedly."
    )]
    Cleanup,

    #[command(about = "Check provider availability")]
    Health,
}

#[derive(Parser, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(value_enum, help = "Pipeline stage to run")]
    pub stage: StageKind,

    #[arg(long, value_name = "N", help = "First input record index (0-based, inclusive)")]
    pub from: Option<usize>,

    #[arg(long, value_name = "N", help = "Last input record index (exclusive)")]
    pub to: Option<usize>,

    #[arg(
        short = 'i',
        long,
        value_name = "TEXT",
        help = "Extra generation instructions appended to every prompt"
    )]
    pub instructions: Option<String>,

    #[arg(long, help = "Skip the verifier pass for this run")]
    pub no_verify: bool,

    #[arg(long, value_name = "N", help = "Override the stage's attempt budget")]
    pub tries: Option<u32>,
}
