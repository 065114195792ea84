//! Run orchestration: wires the candle store, gateway, engine and metrics.
//!
//! Two phases, so that no I/O happens while the engine loop runs:
//! - [`Runner::prepare`]: optionally sync every configured symbol through the
//!   gateway, then read all candles from the store into memory.
//! - [`run_prepared`]: build the strategy, run the engine, compute metrics.
//!
//! [`Runner::run_many`] prepares jobs sequentially and executes them in
//! parallel with rayon; each job owns its strategy, scheduler and simulator.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use barwise_core::data::{CandleStore, FetchError, GatewayError, MarketDataGateway, StoreError, SyncReport};
use barwise_core::domain::{Candle, Timeframe};
use barwise_core::engine::{run_backtest, RunLimits, RunResult};
use barwise_core::TransientFetchError;

use crate::config::{ConfigError, RunConfig, StalePolicy};
use crate::metrics::PerformanceMetrics;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("market data for {symbol}/{timeframe} is stale and stale_policy is abort: {source}")]
    Stale {
        symbol: String,
        timeframe: Timeframe,
        #[source]
        source: TransientFetchError,
    },
}

/// Candles for one run, fully materialized.
#[derive(Debug, Clone, Default)]
pub struct PreparedData {
    pub candles: BTreeMap<String, Vec<Candle>>,
    pub sync_reports: Vec<SyncReport>,
    /// Symbols whose sync gave up on transient errors; their stored data was used as-is.
    pub stale_symbols: Vec<String>,
}

impl PreparedData {
    pub fn candle_count(&self) -> usize {
        self.candles.values().map(Vec::len).sum()
    }

    /// BLAKE3 over every candle's timestamp and prices, hex.
    pub fn dataset_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (symbol, candles) in &self.candles {
            hasher.update(symbol.as_bytes());
            for c in candles {
                hasher.update(&c.timestamp_utc.timestamp_millis().to_le_bytes());
                for v in [c.open, c.high, c.low, c.close, c.volume] {
                    hasher.update(&v.to_le_bytes());
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub config: RunConfig,
    pub result: RunResult,
    pub metrics: PerformanceMetrics,
    pub dataset_hash: String,
    pub sync_reports: Vec<SyncReport>,
    pub stale_symbols: Vec<String>,
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        &self.result.run_id
    }
}

pub struct Runner {
    store: Arc<CandleStore>,
    gateway: Option<MarketDataGateway>,
}

impl Runner {
    /// A runner that only reads what is already stored.
    pub fn new(store: Arc<CandleStore>) -> Self {
        Self {
            store,
            gateway: None,
        }
    }

    /// Sync every symbol through `gateway` before reading.
    pub fn with_gateway(mut self, gateway: MarketDataGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn store(&self) -> &CandleStore {
        &self.store
    }

    /// Sync (when a gateway is attached) and read the candles of every configured symbol.
    pub fn prepare(&self, config: &RunConfig) -> Result<PreparedData, RunError> {
        config.validate()?;
        let timeframe = config.backtest.timeframe;
        let mut data = PreparedData::default();

        for symbol in config.backtest.sorted_symbols() {
            if let Some(gateway) = &self.gateway {
                match gateway.sync(&self.store, &symbol, timeframe, config.default_since()) {
                    Ok(report) => {
                        if !report.unresolved_gaps.is_empty() {
                            log::warn!(
                                "{symbol}/{timeframe}: {} gaps remain after back-fill",
                                report.unresolved_gaps.len()
                            );
                        }
                        data.sync_reports.push(report);
                    }
                    Err(GatewayError::Fetch(FetchError::Transient(e))) => match config.data.stale_policy {
                        StalePolicy::Proceed => {
                            log::warn!("{e}; proceeding with stored candles for {symbol}");
                            data.stale_symbols.push(symbol.clone());
                        }
                        StalePolicy::Abort => {
                            return Err(RunError::Stale {
                                symbol,
                                timeframe,
                                source: e,
                            });
                        }
                    },
                    Err(GatewayError::Fetch(e)) => return Err(e.into()),
                    Err(GatewayError::Store(e)) => return Err(e.into()),
                }
            }

            let (candles, last) = self.store.read(&symbol, timeframe)?;
            if candles.is_empty() {
                log::warn!("no stored candles for {symbol}/{timeframe}");
            } else {
                log::debug!(
                    "loaded {} candles for {symbol}/{timeframe}, last {}",
                    candles.len(),
                    last.map(|t| t.to_rfc3339()).unwrap_or_default()
                );
            }
            data.candles.insert(symbol, candles);
        }
        Ok(data)
    }

    /// Prepare and run one config.
    pub fn run(&self, config: &RunConfig, limits: &RunLimits) -> Result<RunOutcome, RunError> {
        let data = self.prepare(config)?;
        Ok(run_prepared(config, &data, limits))
    }

    /// Run independent configs in parallel. Outcomes come back in input order.
    ///
    /// Data is prepared (and synced) sequentially first; a preparation error
    /// fails the whole batch before any run starts.
    pub fn run_many(&self, configs: &[RunConfig], limits: &RunLimits) -> Result<Vec<RunOutcome>, RunError> {
        let prepared = configs
            .iter()
            .map(|c| self.prepare(c))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!("running {} jobs on {} threads", configs.len(), rayon::current_num_threads());
        Ok(configs
            .par_iter()
            .zip(prepared.par_iter())
            .map(|(config, data)| run_prepared(config, data, limits))
            .collect())
    }
}

/// Run the engine on already-prepared candles. No I/O.
pub fn run_prepared(config: &RunConfig, data: &PreparedData, limits: &RunLimits) -> RunOutcome {
    let mut strategy = config.strategy.build();
    log::info!(
        "running {} on {} symbols, {} candles",
        strategy.name(),
        data.candles.len(),
        data.candle_count()
    );
    let result = run_backtest(&config.backtest, &data.candles, strategy.as_mut(), limits);
    if let Some(e) = result.status.error() {
        log::error!("run {} failed: {e}", result.run_id);
    }
    let metrics = PerformanceMetrics::compute(&result.trades, &result.equity_curve, &config.backtest);
    RunOutcome {
        config: config.clone(),
        result,
        metrics,
        dataset_hash: data.dataset_hash(),
        sync_reports: data.sync_reports.clone(),
        stale_symbols: data.stale_symbols.clone(),
    }
}
