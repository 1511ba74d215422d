//! Coinbase + Gemini order book aggregator entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use book_aggregator::aggregator::{
    spawn_aggregator, CycleController, CycleSettings, ReportReceiver, VenuePoller, VenueSlot,
};
use book_aggregator::api::{create_router, AppState};
use book_aggregator::config::Config;
use book_aggregator::display::render_report;
use book_aggregator::metrics;
use book_aggregator::utils::shutdown_signal;
use book_aggregator::venue::http_feeds;

/// Levels per venue side printed when no book depth is configured.
const DEFAULT_PRINT_DEPTH: usize = 10;

/// Coinbase + Gemini BTC-USD order book aggregator.
#[derive(Parser, Debug)]
#[command(name = "book-aggregator")]
#[command(about = "Merge Coinbase and Gemini order books and price executions against them")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

/// Overrides applied on top of the environment configuration.
#[derive(clap::Args, Debug, Clone, Default)]
struct RunArgs {
    /// Quantity (BTC) to price on each side.
    #[arg(long)]
    qty: Option<Decimal>,

    /// Poll and cycle interval in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Keep only the best N levels per venue side.
    #[arg(long)]
    depth: Option<usize>,

    /// Print every cycle to stdout.
    #[arg(long)]
    print: bool,

    /// HTTP server port for health/metrics.
    #[arg(short, long)]
    port: Option<u16>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(qty) = self.qty {
            config.target_quantity = qty;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.poll_interval_ms = interval_ms;
        }
        if let Some(depth) = self.depth {
            config.book_depth = Some(depth);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the polling and aggregation loop (default).
    Run(RunArgs),

    /// Check configuration validity.
    CheckConfig,

    /// Fetch both venues once, print the cycle and exit.
    Snapshot {
        /// Quantity (BTC) to price on each side.
        #[arg(long)]
        qty: Option<Decimal>,

        /// Keep only the best N levels per venue side.
        #[arg(long)]
        depth: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("book_aggregator=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Snapshot { qty, depth }) => {
            let overrides = RunArgs {
                qty,
                depth,
                ..RunArgs::default()
            };
            cmd_snapshot(overrides).await
        }
        Some(Command::Run(run)) => cmd_run(run).await,
        None => cmd_run(args.run).await,
    }
}

/// Load the environment configuration, apply CLI overrides and validate.
fn load_config(overrides: &RunArgs) -> anyhow::Result<Config> {
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    overrides.apply(&mut config);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("BOOK AGGREGATOR - CONFIGURATION CHECK");
    println!("======================================================================");

    // Load configuration
    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    // Resolve venue endpoints
    print!("Resolving venue endpoints... ");
    let feeds = http_feeds(&config)?;
    println!("OK");
    for feed in &feeds {
        println!("  {}", feed.venue());
    }

    // Show configuration summary
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Target Quantity: {} BTC", config.target_quantity);
    println!("  Poll Interval: {}ms", config.poll_interval_ms);
    println!("  Fetch Timeout: {}ms", config.fetch_timeout_ms);
    println!("  Max Staleness: {}ms", config.max_staleness_ms);
    match config.book_depth {
        Some(depth) => println!("  Book Depth: {} levels per side", depth),
        None => println!("  Book Depth: full book"),
    }
    println!("  Price Increment: ${}", config.price_increment);
    println!("  Coinbase: {} ({})", config.coinbase_url, config.coinbase_product);
    println!("  Gemini: {} ({})", config.gemini_url, config.gemini_symbol);
    println!("  HTTP Port: {}", config.port);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Fetch both venues once and print a single cycle.
async fn cmd_snapshot(overrides: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&overrides)?;
    let settings = CycleSettings::from(&config);

    let mut slots = Vec::with_capacity(2);
    let mut pollers = Vec::with_capacity(2);
    for feed in http_feeds(&config)? {
        let slot = Arc::new(VenueSlot::new(feed.venue()));
        pollers.push(VenuePoller::new(
            feed,
            Arc::clone(&slot),
            settings.poll_interval,
            settings.fetch_timeout,
            config.book_depth,
        ));
        slots.push(slot);
    }

    let results = futures::future::join_all(pollers.iter().map(VenuePoller::poll_once)).await;
    for error in results.into_iter().filter_map(Result::err) {
        warn!(venue = %error.venue(), error = %error, "Snapshot fetch failed");
    }

    let slots: [Arc<VenueSlot>; 2] = slots
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected one slot per venue"))?;
    let report = CycleController::new(slots, settings).run_cycle()?;

    println!(
        "{}",
        render_report(
            &report,
            config.book_depth.unwrap_or(DEFAULT_PRINT_DEPTH),
            config.price_increment
        )
    );

    Ok(())
}

/// Run the polling and aggregation loop with the HTTP API.
async fn cmd_run(overrides: RunArgs) -> anyhow::Result<()> {
    // Load configuration
    info!("Loading configuration...");
    let config = load_config(&overrides)?;

    info!("Configuration loaded successfully");
    info!("Target quantity: {} BTC", config.target_quantity);
    info!(
        "Poll interval: {}ms, fetch timeout: {}ms, max staleness: {}ms",
        config.poll_interval_ms, config.fetch_timeout_ms, config.max_staleness_ms
    );

    // Initialize metrics
    let prometheus = PrometheusBuilder::new().install_recorder()?;
    metrics::init_metrics();

    // Start venue pollers and the cycle loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feeds = http_feeds(&config)?;
    let aggregator = spawn_aggregator(
        feeds,
        CycleSettings::from(&config),
        config.book_depth,
        config.price_increment,
        shutdown_rx.clone(),
    );

    let printer = overrides.print.then(|| {
        tokio::spawn(print_reports(
            aggregator.reports.clone(),
            config.book_depth.unwrap_or(DEFAULT_PRINT_DEPTH),
            config.price_increment,
            shutdown_rx.clone(),
        ))
    });

    // Start HTTP server
    let app_state = AppState::new(aggregator.reports.clone(), config.price_increment)
        .with_metrics(prometheus);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
            .await
    });

    info!("========================================");
    info!("ORDER BOOK AGGREGATOR STARTED");
    info!("========================================");

    shutdown_signal().await;
    shutdown_tx.send_replace(true);

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    aggregator.join().await;

    info!("Shutdown complete");
    Ok(())
}

/// Print each published cycle until shutdown.
async fn print_reports(
    mut reports: ReportReceiver,
    depth: usize,
    increment: Decimal,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = reports.borrow_and_update().clone();
                if let Some(report) = latest {
                    println!("{}", render_report(&report, depth, increment));
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
