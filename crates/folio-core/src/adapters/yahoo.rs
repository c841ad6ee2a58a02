use std::sync::Arc;

use serde::Deserialize;
use time::{Date, Duration, OffsetDateTime, Time, Weekday};

use crate::data_source::{HistoryRequest, PriceSource, SourceError, SourceErrorKind, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, NoopHttpClient};
use crate::{PricePoint, PriceSeries, Ticker};

const CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const TRADING_DAYS: f64 = 252.0;

// ============================================================================
// Yahoo Adapter
// ============================================================================

/// Yahoo chart adapter supporting both real API calls and an offline mode.
///
/// Offline mode is selected by handing in a transport whose
/// [`HttpClient::is_mock`] is true. It serves seeded synthetic daily closes for
/// a fixed catalog and reports every other ticker as not found.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    use_real_api: bool,
    timeout_ms: u64,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::offline()
    }
}

impl YahooAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        let use_real_api = !http_client.is_mock();
        Self {
            http_client,
            use_real_api,
            timeout_ms: 10_000,
        }
    }

    pub fn offline() -> Self {
        Self::with_http_client(Arc::new(NoopHttpClient))
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn is_mock(&self) -> bool {
        !self.use_real_api
    }

    /// Tickers the offline mode knows about.
    pub fn offline_catalog() -> impl Iterator<Item = &'static str> {
        CATALOG.iter().map(|profile| profile.symbol)
    }
}

impl PriceSource for YahooAdapter {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, PriceSeries> {
        Box::pin(async move {
            if self.use_real_api {
                self.fetch_real_history(&req).await
            } else {
                fake_history(&req, OffsetDateTime::now_utc().date())
            }
        })
    }

    fn probe<'a>(&'a self, ticker: Ticker) -> SourceFuture<'a, bool> {
        Box::pin(async move {
            if self.use_real_api {
                self.probe_real(&ticker).await
            } else {
                Ok(profile_for(&ticker).is_some())
            }
        })
    }
}

// ============================================================================
// Real API
// ============================================================================

impl YahooAdapter {
    async fn fetch_real_history(&self, req: &HistoryRequest) -> Result<PriceSeries, SourceError> {
        let (start, end) = req.lookback.resolve(OffsetDateTime::now_utc().date());
        let endpoint = format!(
            "{CHART_ENDPOINT}/{}?period1={}&period2={}&interval=1d&includeAdjustedClose=true",
            urlencoding::encode(req.ticker.as_str()),
            unix_midnight(start),
            unix_midnight(end),
        );

        let response = self.get(&endpoint).await?;
        let body = check_status(response, &req.ticker)?;
        let points = parse_chart(&body, &req.ticker)?;
        if points.is_empty() {
            return Err(SourceError::not_found(&req.ticker));
        }

        Ok(PriceSeries::new(req.ticker.clone(), points)?)
    }

    async fn probe_real(&self, ticker: &Ticker) -> Result<bool, SourceError> {
        let endpoint = format!(
            "{CHART_ENDPOINT}/{}?range=5d&interval=1d",
            urlencoding::encode(ticker.as_str()),
        );

        let response = self.get(&endpoint).await?;
        if response.status == 404 {
            return Ok(false);
        }
        let body = check_status(response, ticker)?;

        match parse_chart(&body, ticker) {
            Ok(points) => Ok(!points.is_empty()),
            Err(error) if error.kind() == SourceErrorKind::NotFound => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn get(&self, endpoint: &str) -> Result<HttpResponse, SourceError> {
        let request = HttpRequest::get(endpoint)
            .with_header("referer", "https://finance.yahoo.com/")
            .with_timeout_ms(self.timeout_ms);

        self.http_client.execute(request).await.map_err(|e| {
            if e.timed_out() {
                SourceError::unavailable(format!("yahoo request timed out: {}", e.message()))
            } else {
                SourceError::unavailable(format!("yahoo transport error: {}", e.message()))
            }
        })
    }
}

fn unix_midnight(date: Date) -> i64 {
    date.with_time(Time::MIDNIGHT).assume_utc().unix_timestamp()
}

fn check_status(response: HttpResponse, ticker: &Ticker) -> Result<String, SourceError> {
    match response.status {
        200..=299 => Ok(response.body),
        404 => Err(SourceError::not_found(ticker)),
        429 => Err(SourceError::rate_limited("yahoo returned status 429")),
        408 | 500..=599 => Err(SourceError::unavailable(format!(
            "yahoo returned status {}",
            response.status
        ))),
        status => Err(SourceError::invalid_request(format!(
            "yahoo returned status {status}"
        ))),
    }
}

/// Daily closes from a v8 chart payload, preferring adjusted close.
fn parse_chart(body: &str, ticker: &Ticker) -> Result<Vec<PricePoint>, SourceError> {
    let chart_response: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo chart: {e}")))?;

    if let Some(error) = chart_response.chart.error {
        return match error.code.as_deref() {
            Some("Not Found") => Err(SourceError::not_found(ticker)),
            _ => Err(SourceError::unavailable(format!(
                "yahoo chart API error: {}",
                error.description.unwrap_or_default()
            ))),
        };
    }

    let Some(result) = chart_response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(SourceError::not_found(ticker));
    };

    let timestamps = result.timestamp.unwrap_or_default();
    let adjusted = result
        .indicators
        .adjclose
        .and_then(|series| series.into_iter().next())
        .map(|series| series.adjclose)
        .unwrap_or_default();
    let raw = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|quote| quote.close)
        .unwrap_or_default();

    let mut points: Vec<PricePoint> = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let close = adjusted
            .get(i)
            .copied()
            .flatten()
            .or_else(|| raw.get(i).copied().flatten());
        let Some(close) = close.filter(|c| c.is_finite() && *c > 0.0) else {
            continue;
        };

        let date = OffsetDateTime::from_unix_timestamp(ts)
            .map_err(|e| SourceError::internal(format!("invalid timestamp: {e}")))?
            .date();

        // Yahoo may append an intraday bar sharing the last session's date.
        match points.last_mut() {
            Some(last) if last.date == date => last.close = close,
            Some(last) if last.date > date => continue,
            _ => points.push(PricePoint::new(date, close)),
        }
    }

    Ok(points)
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
    #[serde(default)]
    adjclose: Option<Vec<YahooAdjClose>>,
}

#[derive(Debug, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

// ============================================================================
// Offline mode
// ============================================================================

struct MockProfile {
    symbol: &'static str,
    start_price: f64,
    drift: f64,
    volatility: f64,
    beta: f64,
}

impl MockProfile {
    /// Annualized drift and volatility; `beta` loads the shared market shock.
    const fn new(
        symbol: &'static str,
        start_price: f64,
        drift: f64,
        volatility: f64,
        beta: f64,
    ) -> Self {
        Self {
            symbol,
            start_price,
            drift,
            volatility,
            beta,
        }
    }
}

const CATALOG: &[MockProfile] = &[
    MockProfile::new("AAPL", 150.0, 0.18, 0.28, 0.75),
    MockProfile::new("MSFT", 300.0, 0.16, 0.26, 0.75),
    MockProfile::new("GOOGL", 120.0, 0.14, 0.30, 0.70),
    MockProfile::new("AMZN", 130.0, 0.15, 0.33, 0.70),
    MockProfile::new("SPY", 420.0, 0.10, 0.17, 0.95),
    MockProfile::new("QQQ", 360.0, 0.13, 0.22, 0.90),
    MockProfile::new("TLT", 95.0, 0.03, 0.15, -0.30),
    MockProfile::new("GLD", 180.0, 0.06, 0.14, 0.05),
    MockProfile::new("NVDA", 450.0, 0.35, 0.50, 0.65),
    MockProfile::new("META", 300.0, 0.20, 0.38, 0.65),
    MockProfile::new("JPM", 145.0, 0.09, 0.24, 0.60),
    MockProfile::new("XOM", 105.0, 0.07, 0.26, 0.35),
];

fn profile_for(ticker: &Ticker) -> Option<&'static MockProfile> {
    CATALOG.iter().find(|profile| profile.symbol == ticker.as_str())
}

/// Seeded one-factor random walk over business days in the requested window.
///
/// A day's market shock depends only on the date, so different baskets see
/// the same history for the same ticker and date.
fn fake_history(req: &HistoryRequest, today: Date) -> Result<PriceSeries, SourceError> {
    let profile = profile_for(&req.ticker).ok_or_else(|| SourceError::not_found(&req.ticker))?;
    let (start, end) = req.lookback.resolve(today);
    let seed = ticker_seed(&req.ticker);

    let daily_drift = profile.drift / TRADING_DAYS;
    let daily_vol = profile.volatility / TRADING_DAYS.sqrt();
    let idiosyncratic = (1.0 - profile.beta * profile.beta).max(0.0).sqrt();

    let mut points = Vec::new();
    let mut price = profile.start_price;
    let mut day = start;
    while day < end {
        if !matches!(day.weekday(), Weekday::Saturday | Weekday::Sunday) {
            let day_key = u64::from(day.to_julian_day().unsigned_abs());
            let market = standard_normal(&mut fastrand::Rng::with_seed(day_key));
            let mut own_rng = fastrand::Rng::with_seed(seed ^ day_key.rotate_left(17));
            let own = standard_normal(&mut own_rng);
            let shock = profile.beta * market + idiosyncratic * own;

            price *= (daily_drift - 0.5 * daily_vol * daily_vol + daily_vol * shock).exp();
            points.push(PricePoint::new(day, price));
        }
        day += Duration::days(1);
    }

    Ok(PriceSeries::new(req.ticker.clone(), points)?)
}

fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    let u1 = rng.f64().max(f64::MIN_POSITIVE);
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn ticker_seed(ticker: &Ticker) -> u64 {
    ticker.as_str().bytes().fold(5381_u64, |acc, byte| {
        acc.wrapping_mul(33).wrapping_add(u64::from(byte))
    })
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use time::macros::date;

    use super::*;
    use crate::http_client::HttpError;
    use crate::Lookback;

    #[derive(Debug)]
    struct RecordingHttpClient {
        response: HttpResponse,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn with(status: u16, body: &str) -> Self {
            Self {
                response: HttpResponse {
                    status,
                    body: body.to_owned(),
                },
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_urls(&self) -> Vec<String> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .iter()
                .map(|request| request.url.clone())
                .collect()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { Ok(response) })
        }
    }

    /// Transport that fails every request with a fixed error.
    struct FailingHttpClient(HttpError);

    impl HttpClient for FailingHttpClient {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            let error = self.0.clone();
            Box::pin(async move { Err(error) })
        }
    }

    const CHART_BODY: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {
                    "quote": [{ "close": [185.64, 184.25, 181.91] }],
                    "adjclose": [{ "adjclose": [184.73, null, 181.02] }]
                }
            }],
            "error": null
        }
    }"#;

    fn ticker(symbol: &str) -> Ticker {
        Ticker::parse(symbol).expect("valid ticker")
    }

    #[test]
    fn chart_prefers_adjusted_close_and_falls_back_to_close() {
        let points = parse_chart(CHART_BODY, &ticker("AAPL")).expect("chart parses");

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, date!(2024 - 01 - 02));
        assert!((points[0].close - 184.73).abs() < 1e-12);
        assert!((points[1].close - 184.25).abs() < 1e-12);
        assert!((points[2].close - 181.02).abs() < 1e-12);
    }

    #[test]
    fn chart_error_not_found_maps_to_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart(body, &ticker("ZZZZ")).expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::NotFound);
    }

    #[tokio::test]
    async fn real_history_requests_daily_adjusted_chart() {
        let client = Arc::new(RecordingHttpClient::with(200, CHART_BODY));
        let adapter = YahooAdapter::with_http_client(client.clone());
        assert!(!adapter.is_mock());

        let series = adapter
            .history(HistoryRequest::new(ticker("AAPL"), Lookback::one_year()))
            .await
            .expect("history succeeds");
        assert_eq!(series.len(), 3);

        let urls = client.recorded_urls();
        assert_eq!(urls.len(), 1);
        assert!(urls[0]
            .starts_with("https://query1.finance.yahoo.com/v8/finance/chart/AAPL?period1="));
        assert!(urls[0].contains("interval=1d"));
        assert!(urls[0].contains("includeAdjustedClose=true"));
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        for (status, kind) in [
            (404, SourceErrorKind::NotFound),
            (429, SourceErrorKind::RateLimited),
            (503, SourceErrorKind::Unavailable),
            (400, SourceErrorKind::InvalidRequest),
        ] {
            let adapter =
                YahooAdapter::with_http_client(Arc::new(RecordingHttpClient::with(status, "")));
            let err = adapter
                .history(HistoryRequest::new(ticker("AAPL"), Lookback::one_year()))
                .await
                .expect_err("non-success status must fail");
            assert_eq!(err.kind(), kind, "status {status}");
        }
    }

    #[tokio::test]
    async fn transport_timeouts_stay_retryable_with_their_own_message() {
        let timed_out = YahooAdapter::with_http_client(Arc::new(FailingHttpClient(
            HttpError::timeout("operation timed out after 10000ms"),
        )));
        let err = timed_out
            .history(HistoryRequest::new(ticker("AAPL"), Lookback::one_year()))
            .await
            .expect_err("transport failed");
        assert_eq!(err.kind(), SourceErrorKind::Unavailable);
        assert!(err.retryable());
        assert!(err.message().starts_with("yahoo request timed out"), "{err}");

        let refused = YahooAdapter::with_http_client(Arc::new(FailingHttpClient(HttpError::new(
            "connection refused",
        ))));
        let err = refused
            .history(HistoryRequest::new(ticker("AAPL"), Lookback::one_year()))
            .await
            .expect_err("transport failed");
        assert!(err.retryable());
        assert!(err.message().starts_with("yahoo transport error"), "{err}");
    }

    #[tokio::test]
    async fn real_probe_treats_404_as_invalid() {
        let adapter = YahooAdapter::with_http_client(Arc::new(RecordingHttpClient::with(404, "")));
        assert!(!adapter.probe(ticker("ZZZZ")).await.expect("probe answers"));
    }

    #[test]
    fn offline_history_is_deterministic_business_days() {
        let req = HistoryRequest::new(ticker("SPY"), Lookback::one_year());
        let first = fake_history(&req, date!(2024 - 06 - 28)).expect("catalog ticker");
        let second = fake_history(&req, date!(2024 - 06 - 28)).expect("catalog ticker");

        assert_eq!(first, second);
        assert!(first.len() > 250 && first.len() < 265);
        assert!(first
            .points()
            .iter()
            .all(|p| !matches!(p.date.weekday(), Weekday::Saturday | Weekday::Sunday)));
    }

    #[tokio::test]
    async fn offline_mode_rejects_unknown_tickers() {
        let adapter = YahooAdapter::offline();
        assert!(adapter.is_mock());

        let err = adapter
            .history(HistoryRequest::new(ticker("ZZZZ"), Lookback::one_year()))
            .await
            .expect_err("unknown ticker");
        assert_eq!(err.kind(), SourceErrorKind::NotFound);
        assert!(adapter.probe(ticker("AAPL")).await.expect("probe answers"));
        assert!(!adapter.probe(ticker("ZZZZ")).await.expect("probe answers"));
    }

    #[tokio::test]
    async fn every_catalog_ticker_has_offline_history() {
        let adapter = YahooAdapter::offline();
        for symbol in YahooAdapter::offline_catalog() {
            let window = Lookback::trailing_days(90).expect("valid window");
            let series = adapter
                .history(HistoryRequest::new(ticker(symbol), window))
                .await
                .expect("catalog ticker");
            assert!(!series.is_empty(), "{symbol} has no offline prices");
        }
    }
}
