use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use tracing::debug;

use crate::api::latency::LatencyStats;
use crate::config::{
    Config, ProviderKind, EXCHANGERATE_API_URL, EXCHANGERATE_HOST_URL, FRANKFURTER_URL,
};
use crate::error::{AppError, Result};

pub const BASE_CURRENCY: &str = "USD";
pub const QUOTE_CURRENCY: &str = "TRY";

/// Source of USD→TRY rates. Implementations make one upstream request per
/// call and never retry.
#[async_trait]
pub trait RateProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Most recent rate.
    async fn latest(&self) -> Result<f64>;

    /// Rate published for `date`.
    async fn historical(&self, date: NaiveDate) -> Result<f64>;
}

/// Build the provider selected by `RATE_PROVIDER`. Every request it sends is
/// timed into `latency`.
pub fn build_provider(
    cfg: &Config,
    latency: Arc<LatencyStats>,
) -> Result<Arc<dyn RateProvider>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.upstream_timeout_secs))
        .build()?;
    let client = Upstream::new(client, latency);

    let provider: Arc<dyn RateProvider> = match cfg.rate_provider {
        ProviderKind::ExchangeRateApi => Arc::new(ExchangeRateApi::new(
            client,
            EXCHANGERATE_API_URL,
            cfg.erate_api_key.clone(),
        )),
        ProviderKind::ExchangeRateHost => {
            Arc::new(ExchangeRateHost::new(client, EXCHANGERATE_HOST_URL))
        }
        ProviderKind::Frankfurter => Arc::new(Frankfurter::new(client, FRANKFURTER_URL)),
    };
    Ok(provider)
}

/// HTTP client shared by the providers. Only requests that actually go out
/// are recorded in the latency histogram.
#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    latency: Arc<LatencyStats>,
}

impl Upstream {
    pub fn new(client: reqwest::Client, latency: Arc<LatencyStats>) -> Self {
        Self { client, latency }
    }

    /// Body of a GET, whatever the status; the parsers reject error payloads.
    async fn get_body(&self, url: &str) -> Result<String> {
        let started = Instant::now();
        let sent = self.client.get(url).send().await;
        let resp = match sent {
            Ok(resp) => resp,
            Err(e) => {
                self.latency.record(started.elapsed());
                return Err(e.into());
            }
        };
        let status = resp.status();
        let body = resp.text().await;
        self.latency.record(started.elapsed());
        let body = body?;
        debug!(%status, bytes = body.len(), "upstream rate response");
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// exchangerate-api.com (v6, keyed)
// ---------------------------------------------------------------------------

pub struct ExchangeRateApi {
    client: Upstream,
    base_url: String,
    api_key: Option<String>,
}

impl ExchangeRateApi {
    pub fn new(client: Upstream, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            AppError::BackendUnavailable("ERATE_API_KEY not set".to_string())
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeRateApiBody {
    result: Option<String>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    conversion_rates: Option<HashMap<String, f64>>,
}

/// `{"result": "success", "conversion_rates": {"TRY": ...}}`; anything else is invalid.
pub fn parse_exchangerate_api(body: &str) -> Result<f64> {
    let parsed: ExchangeRateApiBody = serde_json::from_str(body)
        .map_err(|e| AppError::UpstreamDataInvalid(format!("exchangerate-api: {e}")))?;

    if parsed.result.as_deref() != Some("success") {
        return Err(AppError::UpstreamDataInvalid(format!(
            "exchangerate-api error: {}",
            parsed.error_type.as_deref().unwrap_or("unknown")
        )));
    }

    parsed
        .conversion_rates
        .and_then(|rates| rates.get(QUOTE_CURRENCY).copied())
        .ok_or_else(|| {
            AppError::UpstreamDataInvalid(format!("exchangerate-api: no {QUOTE_CURRENCY} rate"))
        })
}

#[async_trait]
impl RateProvider for ExchangeRateApi {
    fn name(&self) -> &'static str {
        "exchangerate-api"
    }

    async fn latest(&self) -> Result<f64> {
        let url = format!("{}/{}/latest/{BASE_CURRENCY}", self.base_url, self.key()?);
        parse_exchangerate_api(&self.client.get_body(&url).await?)
    }

    async fn historical(&self, date: NaiveDate) -> Result<f64> {
        let url = format!(
            "{}/{}/history/{BASE_CURRENCY}/{}/{}/{}",
            self.base_url,
            self.key()?,
            date.year(),
            date.month(),
            date.day()
        );
        parse_exchangerate_api(&self.client.get_body(&url).await?)
    }
}

// ---------------------------------------------------------------------------
// Keyless providers sharing the `{"rates": {"TRY": ...}}` shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RatesBody {
    success: Option<bool>,
    message: Option<String>,
    rates: Option<HashMap<String, f64>>,
}

/// Shape shared by exchangerate.host and frankfurter.app.
pub fn parse_rates_body(provider: &str, body: &str) -> Result<f64> {
    let parsed: RatesBody = serde_json::from_str(body)
        .map_err(|e| AppError::UpstreamDataInvalid(format!("{provider}: {e}")))?;

    if parsed.success == Some(false) {
        return Err(AppError::UpstreamDataInvalid(format!(
            "{provider}: success=false{}",
            parsed.message.map(|m| format!(" ({m})")).unwrap_or_default()
        )));
    }

    parsed
        .rates
        .and_then(|rates| rates.get(QUOTE_CURRENCY).copied())
        .ok_or_else(|| {
            AppError::UpstreamDataInvalid(match parsed.message {
                Some(m) => format!("{provider}: {m}"),
                None => format!("{provider}: no {QUOTE_CURRENCY} rate"),
            })
        })
}

pub struct ExchangeRateHost {
    client: Upstream,
    base_url: String,
}

impl ExchangeRateHost {
    pub fn new(client: Upstream, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RateProvider for ExchangeRateHost {
    fn name(&self) -> &'static str {
        "exchangerate-host"
    }

    async fn latest(&self) -> Result<f64> {
        let url = format!(
            "{}/latest?base={BASE_CURRENCY}&symbols={QUOTE_CURRENCY}",
            self.base_url
        );
        parse_rates_body(self.name(), &self.client.get_body(&url).await?)
    }

    async fn historical(&self, date: NaiveDate) -> Result<f64> {
        let url = format!(
            "{}/{}?base={BASE_CURRENCY}&symbols={QUOTE_CURRENCY}",
            self.base_url,
            date.format("%Y-%m-%d")
        );
        parse_rates_body(self.name(), &self.client.get_body(&url).await?)
    }
}

pub struct Frankfurter {
    client: Upstream,
    base_url: String,
}

impl Frankfurter {
    pub fn new(client: Upstream, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RateProvider for Frankfurter {
    fn name(&self) -> &'static str {
        "frankfurter"
    }

    async fn latest(&self) -> Result<f64> {
        let url = format!(
            "{}/latest?from={BASE_CURRENCY}&to={QUOTE_CURRENCY}",
            self.base_url
        );
        parse_rates_body(self.name(), &self.client.get_body(&url).await?)
    }

    async fn historical(&self, date: NaiveDate) -> Result<f64> {
        let url = format!(
            "{}/{}?from={BASE_CURRENCY}&to={QUOTE_CURRENCY}",
            self.base_url,
            date.format("%Y-%m-%d")
        );
        parse_rates_body(self.name(), &self.client.get_body(&url).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchangerate_api_success() {
        let body = r#"{"result":"success","base_code":"USD","conversion_rates":{"USD":1,"TRY":41.87}}"#;
        let rate = parse_exchangerate_api(body).unwrap();
        assert!((rate - 41.87).abs() < 1e-9);
    }

    #[test]
    fn exchangerate_api_error_type_is_reported() {
        let body = r#"{"result":"error","error-type":"invalid-key"}"#;
        let err = parse_exchangerate_api(body).unwrap_err();
        assert!(matches!(err, AppError::UpstreamDataInvalid(ref m) if m.contains("invalid-key")), "{err}");
    }

    #[test]
    fn exchangerate_api_missing_try_is_invalid() {
        let body = r#"{"result":"success","conversion_rates":{"EUR":0.92}}"#;
        assert!(matches!(
            parse_exchangerate_api(body),
            Err(AppError::UpstreamDataInvalid(_))
        ));
    }

    #[test]
    fn non_json_body_is_invalid_not_a_panic() {
        assert!(matches!(
            parse_exchangerate_api("<html>502 Bad Gateway</html>"),
            Err(AppError::UpstreamDataInvalid(_))
        ));
        assert!(matches!(
            parse_rates_body("frankfurter", ""),
            Err(AppError::UpstreamDataInvalid(_))
        ));
    }

    #[test]
    fn rates_body_frankfurter_shape() {
        let body = r#"{"amount":1.0,"base":"USD","date":"2026-10-15","rates":{"TRY":41.9}}"#;
        let rate = parse_rates_body("frankfurter", body).unwrap();
        assert!((rate - 41.9).abs() < 1e-9);
    }

    #[test]
    fn rates_body_success_false() {
        let body = r#"{"success":false,"rates":{"TRY":1.0}}"#;
        assert!(parse_rates_body("exchangerate-host", body).is_err());
    }

    #[test]
    fn rates_body_not_found_message() {
        let body = r#"{"message":"not found"}"#;
        let err = parse_rates_body("frankfurter", body).unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");
    }

    // -----------------------------------------------------------------------
    // Requests against an in-process rate server
    // -----------------------------------------------------------------------

    type Seen = Arc<std::sync::Mutex<Vec<String>>>;

    /// Serves a TRY quote on every path. Paths under `/erapi` use the
    /// exchangerate-api shape, paths under `/broken` answer 502 with HTML.
    /// Returns the base URL and the path+query of every request received.
    async fn rate_server() -> (String, Seen) {
        use axum::http::{StatusCode, Uri};
        use axum::response::{Html, IntoResponse};

        let seen: Seen = Arc::default();
        let recorder = Arc::clone(&seen);
        let app = axum::Router::new().fallback(move |uri: Uri| {
            let recorder = Arc::clone(&recorder);
            async move {
                let target = uri
                    .path_and_query()
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                recorder.lock().unwrap().push(target);

                if uri.path().starts_with("/broken") {
                    return (StatusCode::BAD_GATEWAY, Html("<html>502 Bad Gateway</html>"))
                        .into_response();
                }
                let body = if uri.path().starts_with("/erapi") {
                    serde_json::json!({
                        "result": "success",
                        "base_code": "USD",
                        "conversion_rates": {"USD": 1.0, "TRY": 41.25}
                    })
                } else {
                    serde_json::json!({"base": "USD", "rates": {"TRY": 41.25}})
                };
                axum::Json(body).into_response()
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), seen)
    }

    fn upstream(latency: &Arc<LatencyStats>) -> Upstream {
        Upstream::new(reqwest::Client::new(), Arc::clone(latency))
    }

    fn jan_2() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
    }

    #[tokio::test]
    async fn exchangerate_api_builds_keyed_paths() {
        let (base, seen) = rate_server().await;
        let latency = Arc::new(LatencyStats::new());
        let provider = ExchangeRateApi::new(
            upstream(&latency),
            &format!("{base}/erapi/"),
            Some("k3y".to_string()),
        );

        assert!((provider.latest().await.unwrap() - 41.25).abs() < 1e-9);
        assert!((provider.historical(jan_2()).await.unwrap() - 41.25).abs() < 1e-9);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "/erapi/k3y/latest/USD".to_string(),
                "/erapi/k3y/history/USD/2026/1/2".to_string(),
            ]
        );
        assert_eq!(latency.len(), 2);
    }

    #[tokio::test]
    async fn exchangerate_host_builds_symbol_queries() {
        let (base, seen) = rate_server().await;
        let latency = Arc::new(LatencyStats::new());
        let provider = ExchangeRateHost::new(upstream(&latency), &base);

        assert!((provider.latest().await.unwrap() - 41.25).abs() < 1e-9);
        assert!((provider.historical(jan_2()).await.unwrap() - 41.25).abs() < 1e-9);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "/latest?base=USD&symbols=TRY".to_string(),
                "/2026-01-02?base=USD&symbols=TRY".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn frankfurter_builds_from_to_queries() {
        let (base, seen) = rate_server().await;
        let latency = Arc::new(LatencyStats::new());
        let provider = Frankfurter::new(upstream(&latency), &base);

        assert!((provider.latest().await.unwrap() - 41.25).abs() < 1e-9);
        assert!((provider.historical(jan_2()).await.unwrap() - 41.25).abs() < 1e-9);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "/latest?from=USD&to=TRY".to_string(),
                "/2026-01-02?from=USD&to=TRY".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn non_2xx_html_response_is_invalid_data() {
        let (base, seen) = rate_server().await;
        let latency = Arc::new(LatencyStats::new());

        let keyless = Frankfurter::new(upstream(&latency), &format!("{base}/broken"));
        let err = keyless.latest().await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamDataInvalid(_)), "{err}");

        let keyed = ExchangeRateApi::new(
            upstream(&latency),
            &format!("{base}/broken"),
            Some("k3y".to_string()),
        );
        let err = keyed.historical(jan_2()).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamDataInvalid(_)), "{err}");

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(latency.len(), 2, "failed requests still count as sent");
    }

    #[tokio::test]
    async fn keyed_provider_without_key_is_unavailable_and_sends_nothing() {
        let latency = Arc::new(LatencyStats::new());
        let provider = ExchangeRateApi::new(upstream(&latency), EXCHANGERATE_API_URL, None);

        let err = provider.latest().await.unwrap_err();
        assert!(matches!(err, AppError::BackendUnavailable(_)));
        assert!(provider.historical(jan_2()).await.unwrap_err().is_backend_unavailable());
        assert_eq!(latency.len(), 0, "no request went out, nothing to time");
    }

    #[test]
    fn build_provider_follows_config() {
        let cfg = Config {
            rate_provider: ProviderKind::Frankfurter,
            ..Config::default()
        };
        let latency = Arc::new(LatencyStats::new());
        assert_eq!(build_provider(&cfg, latency).unwrap().name(), "frankfurter");
    }
}
