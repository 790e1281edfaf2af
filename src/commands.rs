use crate::config;
use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod serve;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Application {
    #[command(subcommand)]
    pub command: SubCommands,
}

#[derive(Subcommand)]
pub enum SubCommands {
    /// Start the relay and forward all inbound requests to the upstream API.
    Serve(serve::CliArguments),
}

pub async fn handle_command(app: Application) -> Result<()> {
    match app.command {
        SubCommands::Serve(args) => {
            let config = config::load_config()?;
            serve::handle_command(args, config).await
        }
    }
}
