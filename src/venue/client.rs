//! HTTP clients for the venue REST book endpoints.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use super::types::{RawSnapshot, VenueId};
use super::VenueFeed;
use crate::config::Config;
use crate::error::{ConfigError, FetchError};
use crate::metrics;

/// Build the shared HTTP client used by every venue.
///
/// The per-request timeout is left to the poller so that a timeout is reported
/// as [`FetchError::Timeout`] instead of a transport error.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        // Coinbase rejects requests without a User-Agent
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_millis(config.fetch_timeout_ms))
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(30))
        .pool_max_idle_per_host(config.http_pool_size)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}

/// One HTTP feed per venue in [`VenueId::ALL`] order, sharing `http`.
pub fn venue_feeds(
    config: &Config,
    http: reqwest::Client,
) -> Result<[Arc<dyn VenueFeed>; 2], ConfigError> {
    let coinbase: Arc<dyn VenueFeed> = Arc::new(HttpVenueClient::coinbase(config, http.clone())?);
    let gemini: Arc<dyn VenueFeed> = Arc::new(HttpVenueClient::gemini(config, http)?);
    Ok([coinbase, gemini])
}

/// Build the shared HTTP client and both venue feeds on it.
pub fn http_feeds(config: &Config) -> crate::Result<[Arc<dyn VenueFeed>; 2]> {
    let http = build_http_client(config)?;
    Ok(venue_feeds(config, http)?)
}

/// Order book endpoint for one venue.
#[derive(Debug, Clone)]
pub struct HttpVenueClient {
    venue: VenueId,
    http: reqwest::Client,
    url: Url,
}

impl HttpVenueClient {
    /// Coinbase level-2 aggregated book: `GET {base}/products/{product}/book?level=2`.
    pub fn coinbase(config: &Config, http: reqwest::Client) -> Result<Self, ConfigError> {
        let mut url = base_url("COINBASE_URL", &config.coinbase_url)?;
        extend_path("COINBASE_URL", &mut url, &["products", &config.coinbase_product, "book"])?;
        url.query_pairs_mut().append_pair("level", "2");

        Ok(Self {
            venue: VenueId::Coinbase,
            http,
            url,
        })
    }

    /// Gemini public book: `GET {base}/v1/book/{symbol}`.
    pub fn gemini(config: &Config, http: reqwest::Client) -> Result<Self, ConfigError> {
        let mut url = base_url("GEMINI_URL", &config.gemini_url)?;
        extend_path("GEMINI_URL", &mut url, &["v1", "book", &config.gemini_symbol])?;

        Ok(Self {
            venue: VenueId::Gemini,
            http,
            url,
        })
    }

    /// Fully-qualified endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

pub(crate) fn base_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            field,
            reason: "cannot be a base".to_string(),
        });
    }

    Ok(url)
}

fn extend_path(field: &'static str, url: &mut Url, segments: &[&str]) -> Result<(), ConfigError> {
    url.path_segments_mut()
        .map_err(|_| ConfigError::InvalidUrl {
            field,
            reason: "cannot be a base".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(())
}

#[async_trait]
impl VenueFeed for HttpVenueClient {
    fn venue(&self) -> VenueId {
        self.venue
    }

    #[instrument(skip(self), fields(venue = %self.venue))]
    async fn fetch(&self) -> Result<RawSnapshot, FetchError> {
        let start = Instant::now();
        let venue = self.venue;

        let response = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Http { venue, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                venue,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Http { venue, source })?;

        let snapshot: RawSnapshot =
            serde_json::from_slice(&body).map_err(|e| FetchError::Malformed {
                venue,
                reason: e.to_string(),
            })?;

        metrics::record_http_latency(start, venue);
        debug!(
            levels = snapshot.level_count(),
            bytes = body.len(),
            "Fetched raw snapshot"
        );

        Ok(snapshot)
    }
}
