use anyhow::{Context, Result};
use broker_gateway::{KisClient, KisConfig, PaperBroker};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;
use trading::{BrokerGateway, Instrument, Venue};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Kis,
    Paper,
}

/// Diagnostic CLI for the broker gateways.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::Kis)]
    mode: Mode,

    #[arg(long, env = "KIS_APP_KEY", default_value = "", hide_env_values = true)]
    app_key: String,

    #[arg(long, env = "KIS_APP_SECRET", default_value = "", hide_env_values = true)]
    app_secret: String,

    /// Account number (CANO + product code)
    #[arg(long, env = "KIS_ACCOUNT_NUM", default_value = "")]
    account: String,

    #[arg(long, env = "KIS_BASE_URL", default_value = broker_gateway::kis::REAL_BASE_URL)]
    base_url: String,

    /// Use the paper-trading transaction ids
    #[arg(long)]
    virtual_trading: bool,

    #[arg(long, default_value = "kis_token.json")]
    token_file: PathBuf,

    /// JSON snapshot used in paper mode
    #[arg(long)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Latest price of a symbol
    Price {
        symbol: String,
        /// nasdaq, nyse or amex (or an exchange code)
        #[arg(long, default_value = "nasdaq")]
        venue: String,
    },
    /// Daily closes, most recent first
    History {
        symbol: String,
        #[arg(long, default_value = "nasdaq")]
        venue: String,
        #[arg(long, default_value_t = 131)]
        days: usize,
    },
    /// Holdings snapshot
    Balance,
    /// Cash available for orders
    Cash,
}

fn instrument(symbol: &str, venue: &str) -> Result<Instrument> {
    let venue: Venue = venue.parse().map_err(anyhow::Error::msg)?;
    Ok(Instrument::new(symbol, venue))
}

fn gateway(args: &Args) -> Result<Box<dyn BrokerGateway>> {
    match args.mode {
        Mode::Kis => {
            let config = KisConfig {
                app_key: args.app_key.clone(),
                app_secret: args.app_secret.clone(),
                account: args.account.clone(),
                base_url: args.base_url.clone(),
                virtual_trading: args.virtual_trading,
                token_file: Some(args.token_file.clone()),
            };
            Ok(Box::new(KisClient::new(config)?))
        }
        Mode::Paper => match &args.snapshot {
            Some(path) => Ok(Box::new(PaperBroker::load(path)?)),
            None => Ok(Box::new(PaperBroker::new(0.0))),
        },
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    info!("Starting Broker Gateway CLI ({:?})...", args.mode);
    let broker = gateway(&args)?;

    match &args.command {
        Command::Price { symbol, venue } => {
            let instrument = instrument(symbol, venue)?;
            let price = broker
                .current_price(&instrument)
                .with_context(|| format!("quote for {}", instrument))?;
            println!("{} {:.2}", instrument, price);
        }
        Command::History {
            symbol,
            venue,
            days,
        } => {
            let instrument = instrument(symbol, venue)?;
            let closes = broker.daily_closes(&instrument, *days)?;
            println!("{} closes for {} (latest first)", closes.len(), instrument);
            for (i, close) in closes.iter().enumerate() {
                println!("{:>4} {:.2}", i, close);
            }
        }
        Command::Balance => {
            let balance = broker.balance()?;
            if balance.is_empty() {
                println!("No holdings");
            }
            for h in balance.holdings() {
                println!(
                    "{:<6} qty={:<6} avg={:<10.4} now={:<10.2} value={:.2}",
                    h.symbol,
                    h.quantity,
                    h.avg_price,
                    h.current_price,
                    h.market_value()
                );
            }
        }
        Command::Cash => {
            println!("{:.2}", broker.buying_power()?);
        }
    }
    Ok(())
}
