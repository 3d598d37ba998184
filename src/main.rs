use anyhow::Result;
use balancer::cli::setup::setup;
use balancer::core::log::init_logging;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for balancer::AppCommand {
    fn from(cmd: Commands) -> balancer::AppCommand {
        match cmd {
            Commands::Show { portfolio } => balancer::AppCommand::Show { portfolio },
            Commands::Rebalance {
                portfolio,
                reinvest,
                output,
            } => balancer::AppCommand::Rebalance {
                portfolio,
                reinvest,
                output,
            },
            Commands::Prices => balancer::AppCommand::Prices,
            Commands::Watch => balancer::AppCommand::Watch,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display holdings with current and goal ratios
    Show {
        /// Only this portfolio
        #[arg(short, long)]
        portfolio: Option<String>,
    },
    /// Compute the trades that bring each portfolio to its goal ratios
    Rebalance {
        /// Only this portfolio
        #[arg(short, long)]
        portfolio: Option<String>,
        /// Cash to invest, overriding the configured amount
        #[arg(short, long, allow_negative_numbers = true)]
        reinvest: Option<f64>,
        /// Write the rebalanced portfolios as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List cached prices and their age
    Prices,
    /// Keep cached prices fresh until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => balancer::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
