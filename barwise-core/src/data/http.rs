//! HTTP candle source.
//!
//! Talks to a simple candle endpoint:
//!
//! ```text
//! GET {base_url}/candles?symbol=AAPL&timeframe=1m&start=<ms>&end=<ms>
//! -> [{"t": 1709562600000, "o": 1.0, "h": 1.2, "l": 0.9, "c": 1.1, "v": 1200}, ...]
//! ```
//!
//! The source performs one request per call. Retry and paging belong to the
//! gateway; this type only classifies failures into [`SourceError`].

use super::source::{CandleSource, SourceError};
use crate::domain::{Candle, CandleOrigin, Timeframe};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Default `Retry-After` when a 429 carries no usable header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct WireCandle {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

pub struct HttpCandleSource {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCandleSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SourceError> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("barwise/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::BadRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn candles_url(&self) -> String {
        format!("{}/candles", self.base_url)
    }

    fn classify_status(status: reqwest::StatusCode, retry_after: Option<u64>, body: String) -> SourceError {
        use reqwest::StatusCode;
        match status {
            StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SourceError::Unauthorized(format!("HTTP {status}"))
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                SourceError::Timeout(format!("HTTP {status}"))
            }
            s if s.is_server_error() => SourceError::Unavailable(format!("HTTP {status}")),
            _ => SourceError::BadRequest(format!("HTTP {status}: {body}")),
        }
    }

    fn classify_transport(e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            SourceError::Unavailable(e.to_string())
        } else if e.is_decode() {
            SourceError::Malformed(e.to_string())
        } else {
            SourceError::Unavailable(e.to_string())
        }
    }

    fn to_candle(
        symbol: &str,
        timeframe: Timeframe,
        wire: WireCandle,
        received_at: DateTime<Utc>,
    ) -> Result<Candle, SourceError> {
        let ts = DateTime::from_timestamp_millis(wire.t)
            .ok_or_else(|| SourceError::Malformed(format!("invalid timestamp: {}", wire.t)))?;
        Ok(Candle {
            symbol: symbol.to_string(),
            timeframe,
            timestamp_utc: ts,
            open: wire.o,
            high: wire.h,
            low: wire.l,
            close: wire.c,
            volume: wire.v,
            source: CandleOrigin::LiveFetch,
            last_updated_utc: received_at,
        })
    }
}

impl CandleSource for HttpCandleSource {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, SourceError> {
        let start_ms = start.timestamp_millis().to_string();
        let end_ms = end.timestamp_millis().to_string();
        let mut request = self.client.get(self.candles_url()).query(&[
            ("symbol", symbol),
            ("timeframe", timeframe.as_str()),
            ("start", start_ms.as_str()),
            ("end", end_ms.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().map_err(Self::classify_transport)?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = resp.text().unwrap_or_default();
            return Err(Self::classify_status(status, retry_after, body));
        }

        let text = resp.text().map_err(Self::classify_transport)?;
        let wire: Vec<WireCandle> = serde_json::from_str(&text)
            .map_err(|e| SourceError::Malformed(format!("failed to parse candles for {symbol}: {e}")))?;

        let received_at = Utc::now();
        let mut candles = wire
            .into_iter()
            .map(|w| Self::to_candle(symbol, timeframe, w, received_at))
            .collect::<Result<Vec<_>, _>>()?;
        candles.retain(|c| start <= c.timestamp_utc && c.timestamp_utc < end);
        candles.sort_by_key(|c| c.timestamp_utc);
        Ok(candles)
    }
}
