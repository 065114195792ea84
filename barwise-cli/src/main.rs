//! Barwise CLI: fetch, gap and run commands.
//!
//! Commands:
//! - `fetch`: sync every configured symbol into the candle store
//! - `gaps`: list missing ranges for one stored series
//! - `run`: execute a backtest from a TOML config and write artifacts
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for engine detail.

use anyhow::{bail, Context, Result};
use barwise_core::data::{
    CandleSource, CandleStore, HttpCandleSource, MarketDataGateway, SyntheticSource, SystemClock,
};
use barwise_core::domain::Timeframe;
use barwise_core::engine::{RunLimits, RunStatus};
use barwise_runner::{ArtifactManager, RunConfig, RunOutcome, Runner};
use chrono::SecondsFormat;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Seed for `--source synthetic`, so repeated fetches agree.
const SYNTHETIC_SEED: u64 = 42;

#[derive(Parser)]
#[command(name = "barwise", about = "Barwise: deterministic intraday backtester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every symbol in a run config into the candle store.
    Fetch {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// Candle endpoint base URL, or `synthetic` for generated data.
        #[arg(long)]
        source: String,

        /// Bearer token for the candle endpoint.
        #[arg(long)]
        api_key: Option<String>,

        /// Candle store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// List missing ranges in one stored series.
    Gaps {
        #[arg(long)]
        symbol: String,

        /// Bar size: 1m, 5m, 15m, 30m, 1h, 4h or 1d.
        #[arg(long)]
        timeframe: Timeframe,

        /// Candle store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// IANA zone used to render local times.
        #[arg(long, default_value = "UTC")]
        tz: String,
    },
    /// Execute a backtest from a TOML run config.
    Run {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// Candle store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        out: PathBuf,

        /// Stop the run after this many seconds; open positions are reported.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Sync from this source (URL or `synthetic`) before running.
        /// Without it the run uses whatever the store holds.
        #[arg(long)]
        sync_source: Option<String>,

        /// Bearer token for `--sync-source`.
        #[arg(long)]
        api_key: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            config,
            source,
            api_key,
            data_dir,
        } => run_fetch(&config, &source, api_key, &data_dir),
        Commands::Gaps {
            symbol,
            timeframe,
            data_dir,
            tz,
        } => run_gaps(&symbol, timeframe, &data_dir, &tz),
        Commands::Run {
            config,
            data_dir,
            out,
            timeout_secs,
            sync_source,
            api_key,
        } => run_backtest_cmd(&config, &data_dir, &out, timeout_secs, sync_source, api_key),
    }
}

fn build_gateway(source: &str, api_key: Option<String>) -> Result<MarketDataGateway> {
    let source: Arc<dyn CandleSource> = if source == "synthetic" {
        Arc::new(SyntheticSource::new(SYNTHETIC_SEED))
    } else {
        let mut http = HttpCandleSource::new(source)
            .with_context(|| format!("failed to set up candle source {source}"))?;
        if let Some(key) = api_key {
            http = http.with_api_key(key);
        }
        Arc::new(http)
    };
    Ok(MarketDataGateway::new(source, Arc::new(SystemClock)))
}

fn run_fetch(config_path: &Path, source: &str, api_key: Option<String>, data_dir: &Path) -> Result<()> {
    let config = RunConfig::from_file(config_path)?;
    let gateway = build_gateway(source, api_key)?;
    let store = CandleStore::new(data_dir, config.backtest.timezone);
    let timeframe = config.backtest.timeframe;
    let since = config.default_since();
    let symbols = config.backtest.sorted_symbols();
    log::info!(
        "syncing {} symbol(s) at {timeframe} from {}",
        symbols.len(),
        gateway.source_name()
    );

    let mut failures = 0;
    for symbol in symbols {
        match gateway.sync(&store, &symbol, timeframe, since) {
            Ok(report) => {
                let last = report
                    .last_timestamp
                    .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{symbol}/{timeframe}: fetched {}, inserted {}, replaced {}, backfilled {}, last {last}",
                    report.fetched, report.inserted, report.replaced, report.backfilled
                );
                for gap in &report.unresolved_gaps {
                    println!(
                        "  unresolved gap {gap} ({} bars)",
                        gap.missing_bars(timeframe.duration())
                    );
                }
            }
            Err(e) => {
                eprintln!("Error for {symbol}/{timeframe}: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} symbol(s) failed to sync");
    }
    Ok(())
}

fn run_gaps(symbol: &str, timeframe: Timeframe, data_dir: &Path, tz: &str) -> Result<()> {
    let tz: Tz = tz
        .parse()
        .map_err(|e| anyhow::anyhow!("unknown timezone '{tz}': {e}"))?;
    let store = CandleStore::new(data_dir, tz);
    let status = store
        .status(symbol, timeframe)
        .with_context(|| format!("failed to read {symbol}/{timeframe}"))?;
    if status.candle_count == 0 {
        println!("No candles stored for {symbol}/{timeframe} in {}", data_dir.display());
        return Ok(());
    }

    let interval = timeframe.duration();
    let gaps = store.detect_gaps(symbol, timeframe, interval)?;
    let first = status.first.map(|ts| ts.with_timezone(&tz).to_rfc3339());
    let last = status.last.map(|ts| ts.with_timezone(&tz).to_rfc3339());
    println!("{symbol}/{timeframe}: {} candles", status.candle_count);
    println!(
        "Range: {} to {}",
        first.as_deref().unwrap_or("-"),
        last.as_deref().unwrap_or("-")
    );

    if gaps.is_empty() {
        println!("No gaps.");
        return Ok(());
    }
    let missing: i64 = gaps.iter().map(|g| g.missing_bars(interval)).sum();
    println!("Gaps: {} ({missing} missing bars)", gaps.len());
    println!("{:<27} {:<27} {:>8}", "Start (local)", "End (local)", "Bars");
    println!("{}", "-".repeat(64));
    for gap in &gaps {
        println!(
            "{:<27} {:<27} {:>8}",
            gap.start.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
            gap.end.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
            gap.missing_bars(interval)
        );
    }
    Ok(())
}

fn run_backtest_cmd(
    config_path: &Path,
    data_dir: &Path,
    out: &Path,
    timeout_secs: Option<u64>,
    sync_source: Option<String>,
    api_key: Option<String>,
) -> Result<()> {
    let config = RunConfig::from_file(config_path)?;
    let store = Arc::new(CandleStore::new(data_dir, config.backtest.timezone));
    let mut runner = Runner::new(store);
    if let Some(source) = sync_source.as_deref() {
        runner = runner.with_gateway(build_gateway(source, api_key)?);
    }

    let mut limits = RunLimits::none();
    if let Some(secs) = timeout_secs {
        limits = limits.with_timeout(Duration::from_secs(secs));
    }

    let outcome = runner
        .run(&config, &limits)
        .with_context(|| format!("failed to prepare run from {}", config_path.display()))?;

    print_summary(&outcome);

    let manager = ArtifactManager::new(out)?;
    let paths = manager.save_run(&outcome)?;
    println!("Artifacts saved to: {}", paths.run_dir.display());

    if let RunStatus::Failed(e) = &outcome.result.status {
        bail!("run {} failed: {e}", outcome.run_id());
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    let result = &outcome.result;
    let m = &outcome.metrics;
    let bt = &outcome.config.backtest;
    println!();
    println!("=== Backtest Result ===");
    println!("Run:            {}", result.run_id);
    println!("Status:         {}", result.status.as_str());
    println!("Strategy:       {}", outcome.config.strategy.name());
    println!("Symbols:        {}", bt.sorted_symbols().join(", "));
    println!(
        "Period:         {} to {} ({})",
        bt.start_utc.to_rfc3339_opts(SecondsFormat::Secs, true),
        bt.end_utc.to_rfc3339_opts(SecondsFormat::Secs, true),
        bt.timeframe
    );
    println!("Candles:        {}", result.counters.candles_processed);
    println!(
        "Signals:        {} ({} entered, {} rejected, {} outside window/quota)",
        result.counters.signals,
        result.counters.entries,
        result.counters.rejections,
        result.counters.entries_denied
    );
    println!("Trades:         {}", m.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Final Equity:   {:.2}", m.final_equity);
    println!("Total Return:   {:.2}%", m.total_return_pct * 100.0);
    println!("CAGR:           {:.2}%", m.cagr * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!(
        "Max Drawdown:   {:.2} ({:.2}%)",
        m.max_drawdown,
        m.max_drawdown_pct * 100.0
    );
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Expectancy:     {:.2}", m.expectancy);
    println!("Fees:           {:.2}", m.total_fees);
    if result.counters.strategy_faults > 0 {
        println!();
        println!("WARNING: {} strategy fault(s) skipped", result.counters.strategy_faults);
    }
    for symbol in &outcome.stale_symbols {
        println!("WARNING: {symbol} data may be stale (sync failed)");
    }
    if !result.open_positions.is_empty() {
        println!();
        println!("Open positions at stop:");
        for p in &result.open_positions {
            println!(
                "  {} {:?} {:.4} @ {:.4} (stop {:.4}, target {:.4})",
                p.symbol, p.side, p.size, p.entry_price, p.stop_loss, p.take_profit
            );
        }
    }
    println!();
}
