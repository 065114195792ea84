//! Barwise Core: domain types, candle store, data gateway, scheduler,
//! position simulator and the candle-by-candle engine.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (candles, signals, positions, trades, equity)
//! - Durable per-symbol candle store with gap detection
//! - Market data gateway with paging, retry and back-fill
//! - Trading scheduler (local-time windows, daily entry quota)
//! - Position simulator (risk sizing, stop/target/forced exits, costs)
//! - Strategy port and the deterministic event loop

pub mod broker;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod strategy;

pub use error::{DataIntegrityError, QuotaViolationError, StrategyFault, TransientFetchError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across threads are Send + Sync.
    ///
    /// Runs are executed in parallel by the runner, and the store is shared
    /// between sync workers. If any of these stop being thread-safe the
    /// build breaks here rather than in a downstream crate.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::EquityCurve>();
        require_sync::<domain::EquityCurve>();

        // Data layer
        require_send::<data::CandleStore>();
        require_sync::<data::CandleStore>();
        require_send::<data::MarketDataGateway>();
        require_sync::<data::MarketDataGateway>();
        require_send::<data::SyntheticSource>();
        require_sync::<data::SyntheticSource>();
        require_send::<data::HttpCandleSource>();
        require_sync::<data::HttpCandleSource>();
        require_send::<data::ManualClock>();
        require_sync::<data::ManualClock>();

        // Engine types
        require_send::<engine::BacktestConfig>();
        require_sync::<engine::BacktestConfig>();
        require_send::<engine::RunResult>();
        require_sync::<engine::RunResult>();
        require_send::<engine::CancelToken>();
        require_sync::<engine::CancelToken>();
        require_send::<scheduler::TradingScheduler>();
        require_send::<broker::PositionSimulator>();
    }

    /// Architecture contract: strategies never see the simulator or future candles.
    ///
    /// The only inputs are a `HistoryWindow` (bounded by the current candle)
    /// and, for exits, the open position. If the trait grows a parameter
    /// exposing more, this stops compiling.
    #[test]
    fn strategy_port_sees_only_history_and_position() {
        fn _check_trait_object_builds(
            strategy: &mut dyn strategy::StrategyPort,
            window: &strategy::HistoryWindow<'_>,
            position: &domain::Position,
        ) {
            let _ = strategy.generate_signal(window);
            let _ = strategy.should_close(position, window);
        }
    }
}
