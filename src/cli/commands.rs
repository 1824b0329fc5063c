use crate::app::InferenceServer;
use crate::environment::{parse_size, Environment};
use crate::handler::classify;
use crate::logging::{init_logging_with_config, LogConfig};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

/// Command-line interface for brrtserve
#[derive(Parser, Debug)]
#[command(name = "brrtserve")]
#[command(about = "Inference server for user-supplied handlers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute; `serve` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install requirements, load the handler and serve requests
    Serve(ServeArgs),
    /// Locate and classify the handler, print the resolved configuration
    Inspect(ServeArgs),
}

/// Overrides for the `SAGEMAKER_INFERENCE_*` environment
#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct ServeArgs {
    /// Root directory of the model artifacts
    #[arg(long)]
    pub base_directory: Option<PathBuf>,

    /// Subdirectory of the base directory holding the handler unit
    #[arg(long)]
    pub code_directory: Option<PathBuf>,

    /// Handler reference, `<module>.<symbol>`
    #[arg(long)]
    pub code: Option<String>,

    /// Requirements file name inside the code directory
    #[arg(long)]
    pub requirements: Option<String>,

    /// Installer command; the requirements path is appended
    #[arg(long)]
    pub installer: Option<String>,

    /// Logging level, numeric (`10`, `20`, ...) or by name
    #[arg(long)]
    pub logging_level: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Worker threads for blocking handlers
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Coroutine stack size in bytes, decimal or `0x` hex
    #[arg(long, value_parser = parse_stack_size)]
    pub stack_size: Option<usize>,
}

fn parse_stack_size(value: &str) -> Result<usize, String> {
    parse_size(value).ok_or_else(|| format!("invalid stack size `{value}`"))
}

impl ServeArgs {
    /// Apply the flags that were given on top of `env`
    #[must_use]
    pub fn apply(&self, mut env: Environment) -> Environment {
        if let Some(v) = &self.base_directory {
            env.base_directory = v.clone();
        }
        if let Some(v) = &self.code_directory {
            env.code_directory = Some(v.clone());
        }
        if let Some(v) = &self.code {
            env.code = v.clone();
        }
        if let Some(v) = &self.requirements {
            env.requirements = v.clone();
        }
        if let Some(v) = &self.installer {
            env.installer = v.clone();
        }
        if let Some(v) = &self.logging_level {
            env.logging_level = v.clone();
        }
        if let Some(v) = self.port {
            env.port = v;
        }
        if let Some(v) = self.workers {
            env.workers = usize::try_from(v).unwrap_or(usize::MAX);
        }
        if let Some(v) = self.stack_size {
            env.stack_size = v;
        }
        env
    }
}

/// Run the parsed command line.
///
/// # Errors
///
/// Any startup error; each is fatal.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or_else(|| Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            let env = args.apply(Environment::from_env());
            let _log_guard = init_logging_with_config(&LogConfig::from_environment(&env))?;

            let mut server = InferenceServer::new(env);
            server
                .initialize()
                .context("Failed to initialize inference handler")?;
            server.serve().context("Inference server stopped")?;
            Ok(())
        }
        Commands::Inspect(args) => {
            let env = args.apply(Environment::from_env());
            let server = InferenceServer::new(env);
            let handler = server
                .locate()
                .context("Failed to locate inference handler")?;

            let report = json!({
                "environment": server.environment(),
                "code_path": server.environment().code_path(),
                "handler": handler.reference().to_string(),
                "kind": classify(&handler),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
