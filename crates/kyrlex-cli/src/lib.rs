//! Command-line entry point for kyrlex.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kyrlex_config::Config;
use kyrlex_core::{ConversationHistory, LegalAssistant};
use tracing::info;

pub mod chat;
pub mod logging;

#[derive(Parser, Debug)]
#[command(name = "kyrlex")]
#[command(about = "Answer questions about Kyrgyz Republic law from statute text")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/kyrlex/config.toml)
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Print the answer as it is generated
    #[arg(long, global = true)]
    pub stream: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Answer a single question and exit
    Ask {
        /// The question, in Kyrgyz, Russian or English
        question: String,
    },
    /// Interactive session with conversation history (the default)
    Chat,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    logging::init(&config.logging)?;

    info!("Loading statute index...");
    let assistant = LegalAssistant::from_config(&config).await?;
    info!("System ready");

    match cli.command.unwrap_or(Command::Chat) {
        Command::Ask { question } => {
            chat::answer_once(&assistant, &question, &ConversationHistory::new(), cli.stream)
                .await?;
        }
        Command::Chat => chat::run_chat(&assistant, cli.stream).await?,
    }

    Ok(())
}
