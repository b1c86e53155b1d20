mod api;
mod config;
mod scheduler;
mod state;

use anyhow::{bail, Context, Result};
use broker_gateway::{KisClient, PaperBroker};
use clap::{Parser, Subcommand};
use crate::config::{BrokerMode, SystemConfig};
use execution_engine::{Engine, SqliteStore};
use log::{error, info, warn};
use portfolio_manager::RebalancePlanner;
use scheduler::{ExchangeClock, Schedule};
use serde::Serialize;
use state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use trading::{BrokerGateway, EngineError};

/// Trading daemon and one-shot commands.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file layered over config/trader.toml
    #[arg(long, short, env = "TRADER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Scheduler and HTTP API (default)
    Serve,
    /// One daily accumulation run
    RunDaily,
    /// Reconcile cycle state with the broker
    Sync,
    /// Print the rebalance plan
    Plan,
    /// Compute and execute the rebalance plan
    Rebalance {
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the current settings
    Settings,
}

fn build_engine(config: &SystemConfig) -> Result<Engine> {
    let broker: Arc<dyn BrokerGateway> = match config.broker.mode {
        BrokerMode::Kis => {
            info!("Broker: KIS {:?}", config.broker.kis);
            Arc::new(KisClient::new(config.broker.kis.clone())?)
        }
        BrokerMode::Paper => match &config.broker.paper_snapshot {
            Some(path) => {
                info!("Broker: paper, seeded from {}", path.display());
                Arc::new(PaperBroker::load(path)?)
            }
            None => {
                info!("Broker: paper with ${:.2}", config.broker.paper_cash);
                Arc::new(PaperBroker::new(config.broker.paper_cash))
            }
        },
    };
    let store = SqliteStore::open(&config.database.path)
        .with_context(|| format!("opening {}", config.database.path.display()))?;
    let planner = RebalancePlanner::new(config.allocation.clone())?;
    let clock = ExchangeClock::new(config.schedule.zone()?);
    Ok(Engine::new(broker, Arc::new(store), planner).with_clock(Arc::new(clock)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_once(engine: &Engine, command: Command) -> Result<()> {
    match command {
        Command::Serve => bail!("serve is not a one-shot command"),
        Command::RunDaily => match engine.run_daily() {
            Ok(report) => print_json(&report)?,
            Err(EngineError::ConfigurationMissing(reason)) => {
                info!("Daily run skipped: {}", reason)
            }
            Err(e) => return Err(e.into()),
        },
        Command::Sync => print_json(&engine.sync_cycle_state()?)?,
        Command::Plan => {
            let plan = engine.compute_plan()?;
            info!("{}", plan.action_summary);
            print_json(&plan)?
        }
        Command::Rebalance { dry_run } => print_json(&engine.rebalance(dry_run)?)?,
        Command::Settings => print_json(&engine.settings()?)?,
    }
    Ok(())
}

/// Logs holdings and cash once at boot. Failures are not fatal.
async fn startup_check(state: &AppState) {
    let result = state
        .read(|engine| {
            let broker = engine.broker();
            Ok((broker.balance()?, broker.buying_power()?))
        })
        .await;
    match result {
        Ok((balance, cash)) => {
            info!(
                "Startup check: {} holdings, ${:.2} available",
                balance.holdings().len(),
                cash
            );
            for h in balance.holdings() {
                info!(
                    "  {:<6} qty={:<6} avg={:.4} now={:.2}",
                    h.symbol, h.quantity, h.avg_price, h.current_price
                );
            }
        }
        Err(e) => warn!("Startup check failed: {}", e),
    }
}

async fn serve(engine: Arc<Engine>, config: SystemConfig) -> Result<()> {
    let state = AppState::new(engine);
    startup_check(&state).await;

    let schedule = Schedule::from_config(&config.schedule)?;
    tokio::spawn(scheduler::run(state.clone(), schedule.clone()));
    tokio::spawn(scheduler::heartbeat(schedule));

    api::run_api_server(state, config.server.port).await
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = SystemConfig::load(cli.config.as_deref())?;

    // The blocking HTTP client must be built and dropped outside the async
    // runtime, so the engine lives on this thread.
    let engine = Arc::new(build_engine(&config)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("=== Trader Daemon Starting ===");
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(serve(engine.clone(), config));
            drop(runtime);
            if let Err(e) = &result {
                error!("Daemon stopped: {:#}", e);
            }
            result
        }
        command => run_once(&engine, command),
    }
}
