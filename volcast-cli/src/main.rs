//! Volcast CLI: download, fit, predict and status commands.
//!
//! Commands:
//! - `download`: fetch daily prices from Alpha Vantage into the Parquet table store
//! - `fit`: prepare data, fit a GARCH(p,q) model and save it
//! - `predict`: load the latest saved model and forecast volatility
//! - `status`: report the stored price table and saved model artifacts
//!
//! `fit` and `predict` print a JSON response on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use volcast_core::data::{
    AlphaVantageProvider, DataError, FetchResult, MarketDataSource, OutputSize, ParquetTableStore,
    TableStore, WriteMode,
};
use volcast_core::{ModelError, ModelStore, Settings, VolatilityForecast, VolatilityModel};

#[derive(Parser)]
#[command(name = "volcast", about = "Volcast CLI: GARCH volatility forecasting")]
struct Cli {
    /// Path to a TOML settings file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily prices and replace the ticker's stored table.
    Download {
        #[arg(long)]
        ticker: String,

        /// History depth: compact (~100 days, replaces any longer stored history) or full.
        #[arg(long, default_value_t = OutputSize::Full)]
        output_size: OutputSize,
    },
    /// Fit a GARCH(p,q) model and save it.
    Fit {
        #[arg(long)]
        ticker: String,

        /// Number of most recent returns to train on.
        #[arg(long, default_value_t = 2000)]
        n_observations: usize,

        /// ARCH order.
        #[arg(long, default_value_t = 1)]
        p: usize,

        /// GARCH order.
        #[arg(long, default_value_t = 1)]
        q: usize,

        /// Refresh the price table from Alpha Vantage before fitting.
        #[arg(long, default_value_t = false)]
        use_new_data: bool,
    },
    /// Forecast volatility from the latest saved model.
    Predict {
        #[arg(long)]
        ticker: String,

        /// Number of business days to forecast.
        #[arg(long)]
        horizon: usize,
    },
    /// Show the stored price table and saved models for a ticker.
    Status {
        #[arg(long)]
        ticker: String,
    },
}

#[derive(Serialize)]
struct FitResponse {
    ticker: String,
    n_observations: usize,
    p: usize,
    q: usize,
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
}

#[derive(Serialize)]
struct PredictResponse {
    ticker: String,
    n_days: usize,
    success: bool,
    forecast: BTreeMap<String, f64>,
    message: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Commands::Download {
            ticker,
            output_size,
        } => run_download(&settings, &ticker, output_size),
        Commands::Fit {
            ticker,
            n_observations,
            p,
            q,
            use_new_data,
        } => run_fit(&settings, ticker, n_observations, p, q, use_new_data),
        Commands::Predict { ticker, horizon } => run_predict(&settings, ticker, horizon),
        Commands::Status { ticker } => run_status(&settings, &ticker),
    }
}

/// Stand-in source for runs that never download.
struct OfflineSource;

impl MarketDataSource for OfflineSource {
    fn name(&self) -> &str {
        "offline"
    }

    fn fetch_daily(&self, _symbol: &str, _size: OutputSize) -> Result<FetchResult, DataError> {
        Err(DataError::NetworkUnreachable(
            "downloads are disabled for this command".into(),
        ))
    }
}

/// The Alpha Vantage client when a download is needed, otherwise a source
/// that refuses to fetch so no API key is required.
fn market_source(settings: &Settings, online: bool) -> Result<Box<dyn MarketDataSource>> {
    if online {
        let provider = AlphaVantageProvider::new(settings.alpha_vantage()?)?;
        Ok(Box::new(provider))
    } else {
        Ok(Box::new(OfflineSource))
    }
}

fn run_download(settings: &Settings, ticker: &str, output_size: OutputSize) -> Result<()> {
    let source = market_source(settings, true)?;
    let repo = ParquetTableStore::new(&settings.data_directory);

    let fetched = source.fetch_daily(ticker, output_size)?;
    if output_size == OutputSize::Compact && repo.exists(ticker) {
        warn!(ticker, "compact download replaces the stored table with ~100 rows");
    }
    let written = repo.write(ticker, &fetched.bars, WriteMode::Replace)?;

    println!(
        "Downloaded {written} bars for {ticker} into {}",
        repo.data_dir().display()
    );
    Ok(())
}

fn run_fit(
    settings: &Settings,
    ticker: String,
    n_observations: usize,
    p: usize,
    q: usize,
    use_new_data: bool,
) -> Result<()> {
    let source = market_source(settings, use_new_data)?;
    let repo = ParquetTableStore::new(&settings.data_directory);
    let store = ModelStore::new(&settings.model_directory);

    let mut model =
        VolatilityModel::new(ticker.as_str(), &repo, source.as_ref(), &store, use_new_data);
    let outcome = fit_and_save(&mut model, n_observations, p, q);

    let (success, message, path) = match outcome {
        Ok(path) => (
            true,
            format!("Trained and saved '{}'", path.display()),
            Some(path),
        ),
        Err(e) => {
            error!(ticker = %ticker, error = %e, "fit failed");
            (false, e.to_string(), None)
        }
    };

    print_json(&FitResponse {
        ticker,
        n_observations,
        p,
        q,
        success,
        message,
        path,
    })?;
    exit_on_failure(success)
}

fn fit_and_save(
    model: &mut VolatilityModel<'_>,
    n_observations: usize,
    p: usize,
    q: usize,
) -> Result<PathBuf, ModelError> {
    model.prepare(n_observations)?;
    model.fit(p, q)?;
    model.persist()
}

fn restore_and_forecast(
    model: &mut VolatilityModel<'_>,
    horizon: usize,
) -> Result<VolatilityForecast, ModelError> {
    model.restore()?;
    model.forecast_volatility(horizon)
}

fn run_predict(settings: &Settings, ticker: String, horizon: usize) -> Result<()> {
    let repo = ParquetTableStore::new(&settings.data_directory);
    let store = ModelStore::new(&settings.model_directory);
    let source = OfflineSource;

    let mut model = VolatilityModel::new(ticker.as_str(), &repo, &source, &store, false);
    let outcome = restore_and_forecast(&mut model, horizon);

    let (success, forecast, message) = match outcome {
        Ok(forecast) => (true, forecast.into_inner(), String::new()),
        Err(e) => {
            let message = if e.is_model_not_found() {
                format!("Model for '{ticker}' has not been trained yet. Please train it first.")
            } else {
                e.to_string()
            };
            error!(ticker = %ticker, error = %e, "predict failed");
            (false, BTreeMap::new(), message)
        }
    };

    print_json(&PredictResponse {
        ticker,
        n_days: horizon,
        success,
        forecast,
        message,
    })?;
    exit_on_failure(success)
}

fn run_status(settings: &Settings, ticker: &str) -> Result<()> {
    let repo = ParquetTableStore::new(&settings.data_directory);
    let store = ModelStore::new(&settings.model_directory);

    println!("Ticker: {ticker}");
    match repo.table_meta(ticker) {
        Some(meta) => println!(
            "Prices: {} rows, {} to {} (written {})",
            meta.row_count, meta.start_date, meta.end_date, meta.written_at
        ),
        None => println!("Prices: no table in {}", repo.data_dir().display()),
    }

    let artifacts = store.list(ticker)?;
    if artifacts.is_empty() {
        println!("Models: none in {}", store.model_dir().display());
        return Ok(());
    }

    println!("Models: {}", artifacts.len());
    println!("{:<20} Path", "Saved At");
    println!("{}", "-".repeat(60));
    for artifact in &artifacts {
        println!(
            "{:<20} {}",
            artifact.saved_at.format("%Y-%m-%d %H:%M:%S"),
            artifact.path.display()
        );
    }

    match store.load_latest(ticker) {
        Ok(model) => {
            println!();
            println!(
                "Latest: GARCH({}, {}) trained through {} on {} returns{}",
                model.p,
                model.q,
                model.last_date,
                model.n_obs,
                if model.converged { "" } else { " (not converged)" }
            );
            println!(
                "  omega={:.6} persistence={:.4} backcast={:.4} long-run vol={:.4}",
                model.params.omega,
                model.params.persistence(),
                model.backcast(),
                model.params.unconditional_variance().sqrt()
            );
        }
        Err(e) => println!("Latest: unreadable ({e})"),
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_on_failure(success: bool) -> Result<()> {
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
