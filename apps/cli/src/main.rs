//! docqa CLI: ask questions answered only from curated documentation sites.
//!
//! Each question runs the search/scrape/reason loop against the sites in the
//! allow-list; `chat` keeps a short conversation memory between questions.

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
