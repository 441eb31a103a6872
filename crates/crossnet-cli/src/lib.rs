//! crossnet CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// crossnet - multi-cluster network mesh
#[derive(Parser, Debug)]
#[command(name = "crossnet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the mesh is deployed and consistent
    Validate(commands::validate::ValidateArgs),
    /// Connect a cluster to an existing broker
    Join(commands::join::JoinArgs),
    /// Deploy the broker and write the broker info file
    DeployBroker(commands::deploy_broker::DeployBrokerArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Validate(args) => commands::validate::run(args).await,
            Commands::Join(args) => commands::join::run(args).await,
            Commands::DeployBroker(args) => commands::deploy_broker::run(args).await,
        }
    }
}
