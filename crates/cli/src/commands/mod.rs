use bkctl_core::Result;
use clap::Subcommand;

pub mod build;

use self::build::BuildArgs;

#[derive(Subcommand)]
pub enum Commands {
    /// Build a definition piped on stdin, or let a frontend produce one
    #[command(visible_alias = "b")]
    Build(BuildArgs),
}

impl Commands {
    pub async fn execute(self) -> Result<()> {
        match self {
            Commands::Build(args) => build::execute(args).await,
        }
    }
}
