//! Orchestra CLI entry point.
//!
//! Binary name: `orchestra`
//!
//! Parses arguments, sets up tracing, loads the engine config, then dispatches
//! to the command handlers in `cli::workflow`.

mod cli;

use clap::Parser;
use clap_complete::generate;

use cli::workflow::{self, Output};
use cli::{Cli, Commands};
use orchestra_core::config::{default_config_path, load_engine_config};
use orchestra_types::config::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,orchestra_core=debug",
        _ => "trace",
    };
    orchestra_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    orchestra_observe::tracing_setup::shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let out = Output {
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "orchestra", &mut std::io::stdout());
            Ok(())
        }
        Commands::Presets => workflow::handle_presets(out),
        Commands::Validate { file } => workflow::handle_validate(&file, out),
        Commands::Plan { source } => {
            let config = load_config(cli.config.as_deref()).await;
            workflow::handle_plan(&source, &config, out)
        }
        Commands::Run { source, sim } => {
            let config = load_config(cli.config.as_deref()).await;
            workflow::handle_run(&source, &sim, &config, out).await
        }
    }
}

async fn load_config(path: Option<&std::path::Path>) -> EngineConfig {
    match path.map(std::path::Path::to_path_buf).or_else(default_config_path) {
        Some(path) => load_engine_config(&path).await,
        None => {
            tracing::debug!("no home directory, using default engine config");
            EngineConfig::default()
        }
    }
}
