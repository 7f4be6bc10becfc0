//! Demonstration CLI for the kernel workspace.
//!
//! This binary is a thin harness around [`kernel`]'s Deferred Value; it
//! exists so the primitive can be exercised end-to-end from a terminal, not
//! to expose a protocol surface of its own.

mod demo;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kernel-demo")]
#[command(about = "Demonstration harness for the kernel's Deferred Value")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a layered `kernel.toml` config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Deferred Value demonstration pipeline.
    Demo {
        /// Number of simulated worker jobs to run concurrently.
        #[arg(long, default_value_t = 4)]
        jobs: usize,

        /// Make the last job fail, to demonstrate `sequence`'s
        /// first-failure semantics.
        #[arg(long)]
        inject_failure: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => kernel::KernelConfig::load_from(path)?,
        None => kernel::KernelConfig::load()?,
    };
    if cli.verbose {
        config.log_level = "debug".to_string();
    }

    kernel::bootstrap::init(config)?;

    match cli.command {
        Commands::Demo { jobs, inject_failure } => demo::execute(jobs, inject_failure)?,
    }

    Ok(())
}
