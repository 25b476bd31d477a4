//! Outreach CLI: draft personalized B2B emails from a client context.
//!
//! Researches the prospect, fills the client's template, scores the draft
//! against the quality rubric and retries with more effort until it passes.

mod commands;
mod sinks;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
