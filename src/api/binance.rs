use crate::api::MarketDataProvider;
use crate::models::{Candle, Timeframe};
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const KLINES_PATH: &str = "/api/v3/klines";
const RATE_LIMIT_RPM: u32 = 1200; // Binance request weight budget per minute
const MAX_RETRIES: u32 = 3;
const MAX_KLINES_PER_REQUEST: usize = 1000;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance spot klines client with rate limiting and retries
///
/// Cloneable; clones share the HTTP connection pool and rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
    backoff_unit: Duration,
}

impl BinanceClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            backoff_unit: Duration::from_secs(1),
        })
    }

    /// Scale retry backoff (2^attempt units)
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Make a rate-limited request with retry on 429, 5xx and network errors
    async fn make_request(&self, symbol: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, KLINES_PATH);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;
            let backoff = self.backoff_unit * 2u32.pow(attempt);

            match self.client.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json::<Value>().await?);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(
                            "Binance returned {} for {}, retrying in {:?} (attempt {}/{})",
                            status,
                            symbol,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    // Other 4xx: not retryable
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(Error::data_unavailable(
                        symbol,
                        format!("Binance API error ({}): {}", status, error_text),
                    ));
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error for {}: {}, retrying in {:?} (attempt {}/{})",
                        symbol,
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(Error::data_unavailable(
                        symbol,
                        format!("network error after {} retries: {}", MAX_RETRIES, e),
                    ))
                }
            }
        }

        Err(Error::data_unavailable(
            symbol,
            format!("failed after {} retries", MAX_RETRIES),
        ))
    }

    async fn fetch_klines(&self, symbol: &str, query: Vec<(&str, String)>) -> Result<Vec<Candle>> {
        let body = self.make_request(symbol, &query).await?;
        parse_klines(symbol, &body)
    }

    /// All bars with open time in `[start, end)`, paging 1000 at a time
    pub async fn fetch_range(
        &self,
        symbol: &str,
        interval: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let mut candles: Vec<Candle> = Vec::new();
        let mut cursor = start;

        while cursor < end {
            let query = vec![
                ("symbol", symbol.to_string()),
                ("interval", interval.to_string()),
                ("startTime", cursor.timestamp_millis().to_string()),
                ("endTime", (end.timestamp_millis() - 1).to_string()),
                ("limit", MAX_KLINES_PER_REQUEST.to_string()),
            ];

            let page = self.fetch_klines(symbol, query).await?;
            let page_len = page.len();

            let Some(last) = page.last() else {
                break;
            };
            let next = last.timestamp + interval.duration();
            if next <= cursor {
                break;
            }
            cursor = next;

            candles.extend(page.into_iter().filter(|c| c.timestamp < end));
            tracing::debug!("Fetched {} {} bars for {} (total {})", page_len, interval, symbol, candles.len());

            if page_len < MAX_KLINES_PER_REQUEST {
                break;
            }
        }

        if candles.is_empty() {
            return Err(Error::data_unavailable(
                symbol,
                format!("no {} bars between {} and {}", interval, start, end),
            ));
        }

        tracing::info!("📥 Loaded {} {} bars for {}", candles.len(), interval, symbol);
        Ok(candles)
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for BinanceClient {
    async fn fetch(&self, symbol: &str, interval: Timeframe, lookback: usize) -> Result<Vec<Candle>> {
        let query = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", lookback.clamp(1, MAX_KLINES_PER_REQUEST).to_string()),
        ];

        let candles = self.fetch_klines(symbol, query).await?;
        if candles.is_empty() {
            return Err(Error::data_unavailable(symbol, format!("no {} bars returned", interval)));
        }

        Ok(candles)
    }
}

/// Parse the klines array format: `[openTime, open, high, low, close, volume, ...]`
fn parse_klines(symbol: &str, body: &Value) -> Result<Vec<Candle>> {
    let rows = body
        .as_array()
        .ok_or_else(|| Error::data_unavailable(symbol, "klines response is not an array"))?;

    rows.iter()
        .map(|row| {
            let fields = row
                .as_array()
                .filter(|f| f.len() >= 6)
                .ok_or_else(|| Error::data_unavailable(symbol, "malformed kline row"))?;

            let open_ms = fields[0]
                .as_i64()
                .ok_or_else(|| Error::data_unavailable(symbol, "kline open time is not an integer"))?;
            let timestamp = Utc
                .timestamp_millis_opt(open_ms)
                .single()
                .ok_or_else(|| Error::data_unavailable(symbol, "kline open time out of range"))?;

            let decimal = |i: usize| -> Result<Decimal> {
                fields[i]
                    .as_str()
                    .and_then(|s| Decimal::from_str(s).ok())
                    .ok_or_else(|| Error::data_unavailable(symbol, format!("bad kline field {}", i)))
            };

            Ok(Candle {
                symbol: symbol.to_string(),
                timestamp,
                open: decimal(1)?,
                high: decimal(2)?,
                low: decimal(3)?,
                close: decimal(4)?,
                volume: decimal(5)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    fn kline(open_ms: i64, close: &str) -> Value {
        serde_json::json!([
            open_ms, "100.0", "101.5", "99.25", close, "12.5",
            open_ms + 899_999, "1250.0", 42, "6.0", "600.0", "0"
        ])
    }

    fn client(url: &str) -> BinanceClient {
        BinanceClient::new(url)
            .unwrap()
            .with_backoff_unit(Duration::from_millis(1))
    }

    #[test]
    fn test_parse_klines() {
        let body = Value::Array(vec![kline(1_704_067_200_000, "100.75")]);
        let candles = parse_klines("BTCUSDT", &body).unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(candles[0].high, dec!(101.5));
        assert_eq!(candles[0].low, dec!(99.25));
        assert_eq!(candles[0].close, dec!(100.75));
    }

    #[test]
    fn test_parse_rejects_malformed_rows() {
        let body = serde_json::json!([[1, "1"]]);
        let err = parse_klines("BTCUSDT", &body).unwrap_err();
        assert!(matches!(err, Error::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_returns_candles() {
        let mut server = mockito::Server::new_async().await;
        let body = Value::Array(vec![
            kline(1_704_067_200_000, "100.5"),
            kline(1_704_068_100_000, "101.0"),
        ]);
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("interval".into(), "15m".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let candles = client(&server.url())
            .fetch("BTCUSDT", Timeframe::M15, 2)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, dec!(101.0));
    }

    #[tokio::test]
    async fn test_empty_response_is_data_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let err = client(&server.url())
            .fetch("BTCUSDT", Timeframe::H1, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DataUnavailable { .. }));
        assert!(err.is_symbol_local());
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server.url())
            .fetch("NOPE", Timeframe::M15, 10)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("Invalid symbol"));
    }

    #[tokio::test]
    async fn test_server_error_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let err = client(&server.url())
            .fetch("BTCUSDT", Timeframe::M15, 10)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, Error::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_range_stops_on_short_page() {
        let mut server = mockito::Server::new_async().await;
        let body = Value::Array(vec![
            kline(1_704_067_200_000, "100.5"),
            kline(1_704_068_100_000, "101.0"),
            kline(1_704_069_000_000, "101.5"),
        ]);
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::UrlEncoded("startTime".into(), "1704067200000".into()))
            .with_status(200)
            .with_body(body.to_string())
            .expect(1)
            .create_async()
            .await;

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let candles = client(&server.url())
            .fetch_range("BTCUSDT", Timeframe::M15, start, end)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 3);
    }
}
