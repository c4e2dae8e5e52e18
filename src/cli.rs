use crate::config::settings::RunnerConfig;
use crate::core::runner::ExecutionRunner;
use crate::core::types::{CommandSpec, Submission};
use crate::kernel::signal::SignalHandler;
use crate::safety::workspace::WorkspaceManager;
use crate::server::Server;
use crate::translate::Translator;
use crate::tree::Node;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; defaults are used for missing fields
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on (overrides bind_addr)
        #[arg(long)]
        bind: Option<String>,
        /// Worker threads (overrides workers)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print the Python source generated for a program tree
    Translate {
        /// Program tree as JSON
        tree: PathBuf,
    },
    /// Translate and execute a program tree, printing the result as JSON
    Run {
        /// Program tree as JSON
        tree: PathBuf,
        /// File name the program is stored under
        #[arg(long)]
        filename: Option<String>,
    },
    /// Execute a shell command line in a fresh session
    Exec {
        /// Command line; multiple words are joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn read_tree(path: &Path) -> Result<Node> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read program tree {}", path.display()))?;
    Node::from_json(&text).with_context(|| format!("Invalid program tree in {}", path.display()))
}

fn print_result(submission: Submission, config: RunnerConfig) -> Result<bool> {
    let runner = ExecutionRunner::new(config)?;
    let result = runner.submit(submission);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.is_success())
}

fn serve(mut config: RunnerConfig, bind: Option<String>, workers: Option<usize>) -> Result<()> {
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.validate()?;

    let signals = SignalHandler::init().map_err(anyhow::Error::msg)?;

    let workspace = WorkspaceManager::new(config.base_dir.clone())?;
    match workspace.cleanup_stale(config.stale_session_age()) {
        Ok(0) => {}
        Ok(n) => log::info!("Removed {} stale session directories", n),
        Err(e) => log::warn!("Stale session sweep failed: {}", e),
    }

    let server = Server::bind(config)?;
    server.run()?;
    match signals.get_signal() {
        0 => log::info!("Server stopped"),
        signal => log::info!("Server stopped after signal {}", signal),
    }
    Ok(())
}

/// Entry point shared by the `treebox` binary
pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = RunnerConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { bind, workers } => serve(config, bind, workers),
        Commands::Translate { tree } => {
            let tree = read_tree(&tree)?;
            match Translator::with_max_depth(config.max_tree_depth).convert_named(&tree, &config.default_filename) {
                Ok(artifact) => {
                    print!("{}", artifact.body);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("translation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Run { tree, filename } => {
            let tree = read_tree(&tree)?;
            if !print_result(Submission::Program { filename, tree }, config)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Exec { command } => {
            let spec = CommandSpec::new(command.join(" "));
            if !print_result(Submission::Command(spec), config)? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
