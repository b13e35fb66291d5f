use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fetcher::RateProvider;
use crate::state::RateCache;
use crate::types::RateBundle;

/// Serves USD→TRY rate bundles, refreshing from the provider at most once
/// per freshness window.
pub struct RateService {
    provider: Arc<dyn RateProvider>,
    cache: RateCache,
    default_start_rate: f64,
    last_error: Mutex<Option<String>>,
}

impl RateService {
    pub fn new(provider: Arc<dyn RateProvider>, ttl: Duration, default_start_rate: f64) -> Self {
        Self {
            provider,
            cache: RateCache::new(ttl),
            default_start_rate,
            last_error: Mutex::new(None),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn cache_age(&self) -> Option<Duration> {
        self.cache.age()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|g| g.clone())
    }

    /// Cached bundle while fresh; otherwise one refresh sequence against the
    /// provider. Failed refreshes are returned as errors and not cached.
    pub async fn get_rates(&self, start_date: Option<&str>) -> Result<RateBundle> {
        if let Some(bundle) = self.cache.get_fresh() {
            debug!("rate cache hit");
            return Ok(bundle);
        }

        let today = Utc::now().date_naive();
        match self.refresh(start_date, today).await {
            Ok(bundle) => {
                self.set_last_error(None);
                self.cache.store(bundle.clone());
                info!(
                    provider = self.provider.name(),
                    start_rate = bundle.start_rate,
                    current_rate = ?bundle.current_rate,
                    yesterday_rate = ?bundle.yesterday_rate,
                    "rate cache refreshed"
                );
                Ok(bundle)
            }
            Err(e) => {
                self.set_last_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn refresh(&self, start_date: Option<&str>, today: NaiveDate) -> Result<RateBundle> {
        let current = self.provider.latest().await;
        let yesterday = self.provider.historical(prior_business_day(today)).await;

        let (current_rate, yesterday_rate) = match (current, yesterday) {
            (Err(e), Err(y)) => {
                warn!("current and yesterday rate fetches both failed: {e}; {y}");
                return Err(e);
            }
            (current, yesterday) => (
                current.map_err(|e| warn!("current rate unavailable: {e}")).ok(),
                yesterday.map_err(|e| warn!("yesterday rate unavailable: {e}")).ok(),
            ),
        };

        let start_rate = match start_date.map(str::trim).filter(|s| !s.is_empty()) {
            None => self.default_start_rate,
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => match self.provider.historical(date).await {
                    Ok(rate) => rate,
                    Err(e) => {
                        warn!(start_date = raw, "start rate lookup failed, using default: {e}");
                        self.default_start_rate
                    }
                },
                Err(e) => {
                    warn!(start_date = raw, "unparsable start_date, using default: {e}");
                    self.default_start_rate
                }
            },
        };

        Ok(RateBundle {
            start_rate,
            current_rate,
            yesterday_rate,
            as_of: Some(today.format("%Y-%m-%d").to_string()),
        })
    }

    fn set_last_error(&self, err: Option<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = err;
        }
    }
}

/// The business day before `today`: weekends and Mondays roll back to Friday.
pub fn prior_business_day(today: NaiveDate) -> NaiveDate {
    let back = match today.weekday() {
        Weekday::Mon => 3,
        Weekday::Sun => 2,
        _ => 1,
    };
    today - chrono::Duration::days(back)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
