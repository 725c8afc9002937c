mod collaborators;
mod config;
mod logging;
mod server;
mod workflow;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "autods")]
#[command(about = "Human-gated orchestrator for automated data-science workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory to read autods.toml from (defaults to current)
    #[arg(global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to a file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Also write logs to the default log file
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workflow API server
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show the configured collaborator endpoints
    Doctor,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match (cli.log_file.clone(), cli.log) {
        (Some(path), _) => Some(path),
        (None, true) => Some(logging::default_log_path()?),
        (None, false) => None,
    };
    logging::init_logging(cli.debug, cli.quiet, log_file)?;

    let project_dir = cli.dir.as_deref();
    let config = config::AutodsConfig::load(project_dir)?;

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.defaults.bind.clone());

            let store = Arc::new(workflow::WorkflowStore::new());
            let collaborators = collaborators::Collaborators::from_config(&config);
            let settings = workflow::EngineSettings::from_defaults(&config.defaults);
            let engine = workflow::Engine::new(store, collaborators, settings);

            server::serve(&bind, engine).await?;
        }

        Commands::Doctor => {
            println!("Collaborator endpoints:\n");
            for (name, c) in [
                ("generator", &config.collaborators.generator),
                ("sandbox", &config.collaborators.sandbox),
                ("discovery", &config.collaborators.discovery),
            ] {
                let auth = if c.api_key.is_some() { "bearer" } else { "none" };
                println!(
                    "  {} - {} (timeout: {}s, auth: {})",
                    name, c.base_url, c.timeout, auth
                );
            }
            println!();
        }

        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)?;
            println!("{}", rendered);
        }
    }

    Ok(())
}
