//! zaibridge CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive or single-message chat with streamed output
//! - `models`: List the models the endpoint serves
//! - `memory`: Inspect and edit the assistant memory
//! - `config`: Show the effective configuration or test the connection

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "zaibridge",
    about = "zaibridge: streaming chat with z.ai GLM models",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Add a file's contents to the system prompt (repeatable)
        #[arg(long = "context-file", value_name = "PATH")]
        context_files: Vec<PathBuf>,

        /// Describe home devices from a JSON snapshot in the system prompt
        #[arg(long, value_name = "PATH")]
        devices: Option<PathBuf>,

        /// Also list devices that are unavailable or unknown
        #[arg(long, requires = "devices")]
        include_unavailable: bool,

        /// Do not offer tools to the model
        #[arg(long)]
        no_tools: bool,
    },

    /// List available models
    Models,

    /// Manage the assistant memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Show the effective configuration
    Config {
        /// Print the default config file instead
        #[arg(long, conflicts_with = "check")]
        default: bool,

        /// Send a short test request to verify the key and endpoint
        #[arg(long)]
        check: bool,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Print the stored memory and the prompt it produces
    Show,

    /// Store a note
    AddNote {
        text: String,

        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Store a preference
    AddPreference {
        text: String,

        #[arg(long)]
        category: Option<String>,
    },

    /// Set a user context value
    Set { key: String, value: String },

    /// Forget everything
    Clear {
        /// Also delete the storage file
        #[arg(long)]
        delete_file: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; stdout carries the conversation
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            context_files,
            devices,
            include_unavailable,
            no_tools,
        } => {
            commands::chat::run(commands::chat::ChatOptions {
                message,
                context_files,
                devices,
                include_unavailable,
                no_tools,
            })
            .await?
        }
        Commands::Models => commands::models::run()?,
        Commands::Memory { action } => match action {
            MemoryAction::Show => commands::memory::show().await?,
            MemoryAction::AddNote { text, tags } => commands::memory::add_note(&text, tags).await?,
            MemoryAction::AddPreference { text, category } => {
                commands::memory::add_preference(&text, category.as_deref()).await?
            }
            MemoryAction::Set { key, value } => commands::memory::set(&key, &value).await?,
            MemoryAction::Clear { delete_file } => commands::memory::clear(delete_file).await?,
        },
        Commands::Config { default, check } => commands::config_cmd::run(default, check).await?,
    }

    Ok(())
}
