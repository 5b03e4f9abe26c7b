//! FuturesWebhookBot - Main Entry Point
//!
//! Wires the Bybit client, the ledger and the notifier together and either
//! runs the profit worker or executes a one-shot command.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use futures_webhook_bot::config::load_config;
use futures_webhook_bot::store::postgres;
use futures_webhook_bot::{
    AppConfig, BybitClient, Coin, ExchangeClient, FillPoller, InMemoryReferenceStore,
    InMemoryTransactionStore, LogNotifier, Notifier, OrderManager, PgReferenceStore,
    PgTransactionStore, ProfitChecker, ReferenceStore, Signal, SignalOutcome, SystemClock,
    TelegramNotifier, TransactionStore,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the profit worker until Ctrl-C (default)
    Run,
    /// Send one profit report and exit
    Report,
    /// Print the current mark price of a symbol
    Price {
        #[arg(long)]
        symbol: String,
    },
    /// Feed one alert through the order manager
    Signal {
        /// Strategy tag
        #[arg(long)]
        tag: String,
        /// Coin symbol, e.g. BTCUSDT
        #[arg(long)]
        ticker: String,
        /// buy or sell
        #[arg(long)]
        side: String,
        /// Price quoted by the alert
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        trading_key: Option<String>,
    },
}

/// Shared services built from configuration
struct Services {
    exchange: Arc<dyn ExchangeClient>,
    transactions: Arc<dyn TransactionStore>,
    references: Arc<dyn ReferenceStore>,
    notifier: Arc<dyn Notifier>,
    manager: Arc<OrderManager>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config = load_config(Some(&args.config))?;

    // Initialize logging
    let level_name = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    let level = match level_name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting FuturesWebhookBot");
    info!("Configuration file: {}", args.config);

    let shutdown = CancellationToken::new();
    let services = build_services(&config, shutdown.clone()).await?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, services, shutdown).await?,
        Command::Report => {
            let checker = profit_checker(&config, &services);
            match checker.check_order_profits().await {
                Some(report) => println!("{}", report),
                None => println!("No opened orders"),
            }
        }
        Command::Price { symbol } => {
            let coin = Coin::new(0, symbol.clone(), symbol);
            let price = services.exchange.get_current_price(&coin).await?;
            println!("{} {}", coin.symbol, price);
        }
        Command::Signal {
            tag,
            ticker,
            side,
            price,
            trading_key,
        } => {
            cancel_on_ctrl_c(shutdown.clone());

            let mut signal = Signal::new(tag, ticker, side);
            signal.price = price;
            signal.trading_key = trading_key;

            match services.manager.handle_signal(&signal).await? {
                SignalOutcome::Opened(tx) => println!("Opened: {}", tx),
                SignalOutcome::Closed(tx) => println!("Closed: {}", tx),
                SignalOutcome::CloseFailed => println!("Close did not go through, see log"),
            }
        }
    }

    Ok(())
}

async fn build_services(config: &AppConfig, shutdown: CancellationToken) -> Result<Services> {
    let timeout = Duration::from_secs(config.settings.request_timeout_seconds);

    let poller = FillPoller::new(
        config.trading.fill_poll_attempts,
        config.trading.fill_poll_interval(),
        shutdown,
    );
    let exchange: Arc<dyn ExchangeClient> =
        Arc::new(BybitClient::new(&config.bybit, poller, timeout)?);

    let (transactions, references): (Arc<dyn TransactionStore>, Arc<dyn ReferenceStore>) =
        match &config.database {
            Some(database) => {
                let pool = postgres::connect(database).await?;
                (
                    Arc::new(PgTransactionStore::new(pool.clone())),
                    Arc::new(PgReferenceStore::new(pool)),
                )
            }
            None => {
                warn!("No database configured, using an empty in-memory ledger");
                (
                    Arc::new(InMemoryTransactionStore::new()),
                    Arc::new(InMemoryReferenceStore::default()),
                )
            }
        };

    let notifier: Arc<dyn Notifier> = if config.telegram.enabled {
        Arc::new(TelegramNotifier::new(&config.telegram, timeout)?)
    } else {
        Arc::new(LogNotifier)
    };

    let manager = Arc::new(OrderManager::new(
        exchange.clone(),
        transactions.clone(),
        references.clone(),
        notifier.clone(),
        Arc::new(SystemClock),
        config.trading.leverage,
        config.trading.safety_buffer,
    ));

    Ok(Services {
        exchange,
        transactions,
        references,
        notifier,
        manager,
    })
}

fn profit_checker(config: &AppConfig, services: &Services) -> Arc<ProfitChecker> {
    Arc::new(ProfitChecker::new(
        services.references.clone(),
        services.transactions.clone(),
        services.manager.clone(),
        services.notifier.clone(),
        config.trading.profit_report_interval(),
    ))
}

async fn run(config: &AppConfig, services: Services, shutdown: CancellationToken) -> Result<()> {
    let checker = profit_checker(config, &services);
    let worker = checker.start(shutdown.clone());

    info!("Application initialized successfully");

    // Keep the application running
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");
    shutdown.cancel();
    worker.await?;

    Ok(())
}

/// Abort in-flight fill polling when the user interrupts a one-shot command
fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight order polling");
            shutdown.cancel();
        }
    });
}
