pub mod cache;
pub mod cli;
pub mod core;
pub mod providers;
pub mod service;
pub mod store;

use crate::core::config::AppConfig;
use anyhow::{Result, anyhow};
use service::PriceService;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Commands that need configuration and the price service.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Show {
        portfolio: Option<String>,
    },
    Rebalance {
        portfolio: Option<String>,
        reinvest: Option<f64>,
        output: Option<PathBuf>,
    },
    Prices,
    Watch,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    run_command_until(command, config_path, service::shutdown_signal()).await
}

/// Runs `command` until it finishes or `shutdown` completes. Either way the
/// price cache is flushed before returning. Interrupting `watch` is its
/// normal end; any other interrupted command is an error.
pub async fn run_command_until(
    command: AppCommand,
    config_path: Option<&str>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    info!("Balancer starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded {} portfolios from config", config.portfolios.len());

    let symbols = tracked_symbols(&config);
    let mut service = PriceService::from_config(&config).await?;
    let is_watch = command == AppCommand::Watch;
    if is_watch {
        service = service.with_sweep(config.cache.sweep_interval(), symbols.clone());
    }

    let result = tokio::select! {
        result = run_with_service(command, &config, &service, &symbols) => result,
        () = shutdown => {
            info!("Shutting down");
            if is_watch {
                Ok(())
            } else {
                Err(anyhow!("Interrupted before the command finished"))
            }
        }
    };
    service.shutdown().await;
    result
}

/// Every configured symbol, sorted and without duplicates.
fn tracked_symbols(config: &AppConfig) -> Vec<String> {
    config
        .portfolios
        .iter()
        .flat_map(|p| p.positions.iter().map(|pos| pos.symbol.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn run_with_service(
    command: AppCommand,
    config: &AppConfig,
    service: &PriceService,
    symbols: &[String],
) -> Result<()> {
    let cache = service.cache();
    match command {
        AppCommand::Show { portfolio } => {
            let portfolios = cli::select_portfolios(&config.portfolios, portfolio.as_deref())?;
            cli::show::run(portfolios, cache).await
        }
        AppCommand::Rebalance {
            portfolio,
            reinvest,
            output,
        } => {
            let portfolios = cli::select_portfolios(&config.portfolios, portfolio.as_deref())?;
            cli::rebalance::run(portfolios, cache, reinvest, output.as_deref()).await
        }
        AppCommand::Prices => cli::prices::run(cache).await,
        AppCommand::Watch => cli::watch::run(cache, symbols).await,
    }
}
