//! pagekit CLI: fill the image slots of landing-page content.
//!
//! Reads a content tree, resolves every missing image through stock
//! providers, the local asset cache, and generative fallback, and writes the
//! enriched tree back out.

mod commands;

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
