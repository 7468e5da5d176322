use bkctl::Commands;
use clap::Parser;

#[derive(Parser)]
#[command(name = "bkctl")]
#[command(about = "Drive a build against a build engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug output in logs
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Parse command-line arguments
    let cli = Cli::parse();
    bkctl_utils::tracing::init(cli.debug)?;

    cli.command.execute().await?;
    Ok(())
}
