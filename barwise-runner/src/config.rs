//! TOML run configuration.
//!
//! A run file has three tables:
//! - `[backtest]`: the engine's [`BacktestConfig`], verbatim
//! - `[strategy]`: which reference strategy to build, tagged by `type`
//! - `[data]`: how stale or missing market data is handled
//!
//! ```toml
//! [backtest]
//! symbols = ["AAPL", "MSFT"]
//! timeframe = "5m"
//! start_utc = "2024-03-04T00:00:00Z"
//! end_utc = "2024-03-09T00:00:00Z"
//! timezone = "America/New_York"
//! entry_window = { start = "09:30", end = "15:30" }
//! force_close_window = { start = "15:50", end = "16:00" }
//! risk_fraction = 0.01
//! max_leverage = 1.0
//! daily_quota = 1
//! initial_capital = 10000.0
//!
//! [strategy]
//! type = "channel_breakout"
//! lookback = 12
//! ```

use crate::strategies::ChannelBreakout;
use barwise_core::engine::BacktestConfig;
use barwise_core::strategy::StrategyPort;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What to do when the market data gateway gives up on transient errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Warn and run on whatever is already stored.
    #[default]
    Proceed,
    /// Fail the run.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub stale_policy: StalePolicy,
    /// First timestamp to fetch for a symbol with no stored candles.
    /// Defaults to `backtest.start_utc`.
    #[serde(default)]
    pub default_since: Option<DateTime<Utc>>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            stale_policy: StalePolicy::Proceed,
            default_since: None,
        }
    }
}

/// Reference strategies buildable from config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Breakout of the previous `lookback` candles' high/low range.
    ChannelBreakout {
        lookback: usize,
        #[serde(default = "default_reward_risk")]
        reward_risk: f64,
        #[serde(default)]
        allow_short: bool,
    },
}

fn default_reward_risk() -> f64 {
    2.0
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::ChannelBreakout {
            lookback: 12,
            reward_risk: default_reward_risk(),
            allow_short: false,
        }
    }
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::ChannelBreakout { .. } => "channel_breakout",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            StrategyConfig::ChannelBreakout {
                lookback,
                reward_risk,
                ..
            } => {
                if *lookback == 0 {
                    return Err("channel_breakout.lookback must be at least 1".into());
                }
                if !(reward_risk.is_finite() && *reward_risk > 0.0) {
                    return Err(format!(
                        "channel_breakout.reward_risk must be positive, got {reward_risk}"
                    ));
                }
                Ok(())
            }
        }
    }

    /// A fresh strategy instance; every run gets its own.
    pub fn build(&self) -> Box<dyn StrategyPort + Send> {
        match self {
            StrategyConfig::ChannelBreakout {
                lookback,
                reward_risk,
                allow_short,
            } => Box::new(ChannelBreakout::new(*lookback, *reward_risk, *allow_short)),
        }
    }
}

/// Complete, reproducible description of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub data: DataConfig,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backtest.validate().map_err(ConfigError::Invalid)?;
        self.strategy.validate().map_err(ConfigError::Invalid)?;
        if let Some(since) = self.data.default_since {
            if since >= self.backtest.end_utc {
                return Err(ConfigError::Invalid(format!(
                    "data.default_since ({since}) must be before backtest.end_utc ({})",
                    self.backtest.end_utc
                )));
            }
        }
        Ok(())
    }

    /// Where an empty key starts syncing from.
    pub fn default_since(&self) -> DateTime<Utc> {
        self.data.default_since.unwrap_or(self.backtest.start_utc)
    }
}
