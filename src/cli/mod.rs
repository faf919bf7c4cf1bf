use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "rider-state")]
#[command(about = "Rider state transition orchestration")]
#[command(long_about = "Moves riders between Not Working, Available, Starting and Working. \
                       Each request is checked against the transition table, validated when \
                       required, persisted, announced, and dead-lettered if anything goes wrong.")]
pub struct Cli {
    /// Configuration file (defaults to ./rider-state.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one transition request and print its outcome
    Transition {
        /// Rider to move
        #[arg(long, alias = "entity-id")]
        rider: String,
        /// Target state, e.g. "Available" or "Not Working"
        #[arg(long)]
        next_state: String,
    },
    /// Run every request in a JSON array or JSON-lines file
    Batch {
        /// Request file; each request is {"entity_id": ..., "next_state": ...}
        #[arg(long)]
        input: PathBuf,
    },
    /// Write a rider record directly, bypassing the workflow
    Seed {
        #[arg(long)]
        rider: String,
        #[arg(long)]
        state: String,
        /// Last known latitude
        #[arg(long, allow_negative_numbers = true, requires = "long")]
        lat: Option<f64>,
        /// Last known longitude
        #[arg(long, allow_negative_numbers = true, requires = "lat")]
        long: Option<f64>,
    },
    /// Print the stored record of a rider
    Show {
        #[arg(long)]
        rider: String,
    },
    /// Print the transition table
    Table {
        /// Print the rules as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify a single transition without running it
    Classify {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// List dead-lettered requests
    DeadLetters {
        /// Only show envelopes from this stage (fetch, classify, precondition, persist, notify)
        #[arg(long)]
        stage: Option<String>,
    },
    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(long, value_name = "PATH")]
        write: Option<PathBuf>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Transition { .. } => "transition",
            Commands::Batch { .. } => "batch",
            Commands::Seed { .. } => "seed",
            Commands::Show { .. } => "show",
            Commands::Table { .. } => "table",
            Commands::Classify { .. } => "classify",
            Commands::DeadLetters { .. } => "dead-letters",
            Commands::Config { .. } => "config",
        }
    }
}
