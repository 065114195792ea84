//! Candle acquisition and persistence

pub mod gaps;
pub mod gateway;
pub mod http;
pub mod retry;
pub mod source;
pub mod store;
pub mod synthetic;

pub use gaps::{find_gaps, GapRange};
pub use gateway::{FetchError, GatewayError, MarketDataGateway, SyncReport};
pub use http::HttpCandleSource;
pub use retry::{Clock, ManualClock, RetryError, RetryPolicy, SystemClock};
pub use source::{CandleSource, SourceError};
pub use store::{CandleStore, KeyStatus, StoreError, WriteSummary};
pub use synthetic::SyntheticSource;
