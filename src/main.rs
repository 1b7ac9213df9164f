use anyhow::Result;
use clap::Parser;
use cv_tailor::cli::{handle_command, Cli};
use cv_tailor::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    handle_command(cli).await
}
