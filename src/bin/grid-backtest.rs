// grid-backtest: ingest candles and backtest spot grids over them

use std::fs;
use std::path::Path;

use clap::{Args, Parser, Subcommand};
use grid_backtest::config::CONFIG_TEMPLATE;
use grid_backtest::{CandleStore, Config, EngineError, EngineResult};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Load command modules from cli directory
#[path = "../cli/backtest_commands.rs"]
mod backtest_commands;
#[path = "../cli/ingest_commands.rs"]
mod ingest_commands;

use backtest_commands::RunOptions;

#[derive(Parser)]
#[command(name = "grid-backtest")]
#[command(version)]
#[command(about = "Day-streamed spot grid backtesting", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and create the candle store
    Init,

    /// Fetch OHLC candles from Kraken into the candle store
    Ingest {
        /// Kraken pair name (e.g., XBTUSDT)
        #[arg(short, long)]
        pair: String,

        /// Candle interval (1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w)
        #[arg(short, long)]
        interval: Option<String>,

        /// Start date (YYYY-MM-DD or RFC 3339)
        #[arg(short, long)]
        start: String,

        /// End date, exclusive (defaults to now)
        #[arg(short, long)]
        end: Option<String>,
    },

    /// Run backtests
    #[command(subcommand)]
    Backtest(BacktestCommands),

    /// Database health and stored candle ranges
    Status,
}

#[derive(Subcommand)]
enum BacktestCommands {
    /// Stream stored candles day by day through a spot grid
    Run {
        #[command(flatten)]
        grid: GridArgs,

        /// Write the JSON report to this file
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Backtest one seeded synthetic day
    Demo {
        /// Random walk seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Write the JSON report to this file
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Compare several grid counts over the same stored range
    Sweep {
        #[command(flatten)]
        grid: GridArgs,

        /// Grid counts to try (comma-separated)
        #[arg(long, value_delimiter = ',')]
        grid_counts: Vec<u32>,
    },
}

#[derive(Args)]
struct GridArgs {
    /// Stored symbol to backtest
    #[arg(long)]
    symbol: Option<String>,

    /// Candle interval
    #[arg(short, long)]
    interval: Option<String>,

    /// Start date (YYYY-MM-DD or RFC 3339)
    #[arg(short, long)]
    start: Option<String>,

    /// End date, exclusive (defaults to one day after start)
    #[arg(short, long)]
    end: Option<String>,

    /// Whole years to backtest (comma-separated), instead of --start/--end
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["start", "end"])]
    years: Vec<i32>,

    /// Lowest grid level
    #[arg(long)]
    min_price: Option<f64>,

    /// Highest grid level
    #[arg(long)]
    max_price: Option<f64>,

    /// Number of gaps between min and max price
    #[arg(long)]
    grid_count: Option<u32>,

    /// Quote amount funding the ladder
    #[arg(long)]
    investment: Option<f64>,

    /// Strategy type (only "spot" runs)
    #[arg(long)]
    strategy: Option<String>,
}

impl From<GridArgs> for RunOptions {
    fn from(args: GridArgs) -> Self {
        RunOptions {
            symbol: args.symbol,
            interval: args.interval,
            start: args.start,
            end: args.end,
            years: args.years,
            min_price: args.min_price,
            max_price: args.max_price,
            grid_count: args.grid_count,
            investment: args.investment,
            strategy: args.strategy,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Peek at the config for the log level; errors are reported by the command itself
    let file_config = Config::from_file(&cli.config).ok();
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        file_config
            .as_ref()
            .map(|config| config.logging.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 grid-backtest v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli, file_config).await {
        error!("❌ {} error", e.category());
        for line in e.user_message().lines() {
            error!("{}", line);
        }
        if e.is_retryable() {
            error!("🔁 This error is usually temporary; retrying may succeed");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli, file_config: Option<Config>) -> EngineResult<()> {
    match cli.command {
        // Init doesn't require config (it creates it)
        Commands::Init => init_workspace(&cli.config),

        // Status can work without a config
        Commands::Status => ingest_commands::show_status(&cli.config, file_config.as_ref()).await,

        Commands::Ingest { pair, interval, start, end } => {
            let config = load_config(&cli.config)?;
            ingest_commands::run_ingest(&pair, interval, &start, end, &config).await
        }

        Commands::Backtest(cmd) => {
            let config = load_config(&cli.config)?;
            match cmd {
                BacktestCommands::Run { grid, output } => {
                    backtest_commands::run_backtest(grid.into(), output, &config).await
                }
                BacktestCommands::Demo { seed, output } => backtest_commands::run_demo(seed, output, &config).await,
                BacktestCommands::Sweep { grid, grid_counts } => {
                    backtest_commands::run_sweep(grid.into(), grid_counts, &config).await
                }
            }
        }
    }
}

fn load_config(path: &str) -> EngineResult<Config> {
    Ok(Config::from_file(path)?)
}

fn init_workspace(config_path: &str) -> EngineResult<()> {
    info!("🔧 Initializing workspace...");

    if Path::new(config_path).exists() {
        warn!("⚠️  {} already exists, skipping", config_path);
    } else {
        fs::write(config_path, CONFIG_TEMPLATE)
            .map_err(|e| EngineError::FileWrite(format!("{}: {}", config_path, e)))?;
        info!("📝 Created {}", config_path);
    }

    let config = load_config(config_path)?;
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let store = CandleStore::open(&config.database.path)?;
    store.health_check()?;
    info!("💾 Candle store ready at {}", config.database.path);

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. Run: grid-backtest ingest --pair XBTUSDT --interval 1m --start 2024-01-01 --end 2024-01-08");
    info!("   2. Run: grid-backtest backtest run --symbol XBTUSDT --start 2024-01-01 --end 2024-01-08");
    info!("   3. Or try: grid-backtest backtest demo");

    Ok(())
}
