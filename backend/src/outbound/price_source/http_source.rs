//! Reqwest-backed price source adapter.
//!
//! This adapter owns transport details only: URL construction, timeout and
//! HTTP error mapping, and JSON decoding into domain points. Ordering and
//! per-day deduplication are left to the domain.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use super::dto::PriceResponseDto;
use crate::domain::PricePoint;
use crate::domain::ports::{PriceSource, PriceSourceError, PriceSourceRequest};

const USER_AGENT: &str = concat!("price-series/", env!("CARGO_PKG_VERSION"));
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Price source adapter issuing `GET {base}/v1/prices/{key}` requests.
pub struct HttpPriceSource {
    client: Client,
    base_url: Url,
}

impl HttpPriceSource {
    /// Build an adapter using a reqwest client with an explicit request timeout.
    /// ```rust,ignore
    /// let source = HttpPriceSource::new(base_url, Duration::from_secs(30))?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch_prices(
        &self,
        request: &PriceSourceRequest,
    ) -> Result<Vec<PricePoint>, PriceSourceError> {
        let url = build_request_url(&self.base_url, request)?;
        debug!(%url, "fetching daily prices");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }

        let points = parse_points(body.as_ref())?;
        debug!(key = %request.key, points = points.len(), "decoded daily prices");
        Ok(points)
    }
}

fn build_request_url(
    base_url: &Url,
    request: &PriceSourceRequest,
) -> Result<Url, PriceSourceError> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|()| {
            PriceSourceError::invalid_request(format!("base URL {base_url} cannot carry a path"))
        })?
        .pop_if_empty()
        .extend(["v1", "prices", request.key.as_str()]);
    url.query_pairs_mut()
        .clear()
        .append_pair("start", &request.start.format(DATE_FORMAT).to_string())
        .append_pair("granularity", request.granularity.as_str());
    Ok(url)
}

fn parse_points(body: &[u8]) -> Result<Vec<PricePoint>, PriceSourceError> {
    let decoded: PriceResponseDto = serde_json::from_slice(body).map_err(|error| {
        PriceSourceError::decode(format!("invalid price JSON payload: {error}"))
    })?;
    decoded
        .into_domain_points()
        .map_err(PriceSourceError::decode)
}

fn map_transport_error(error: reqwest::Error) -> PriceSourceError {
    if error.is_timeout() {
        PriceSourceError::timeout(error.to_string())
    } else {
        PriceSourceError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> PriceSourceError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => PriceSourceError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            PriceSourceError::timeout(message)
        }
        _ if status.is_client_error() => PriceSourceError::invalid_request(message),
        _ => PriceSourceError::transport(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
