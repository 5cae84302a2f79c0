//! OpenSea collection stats client
//!
//! `GET /collections/{slug}/stats`, floor price at `total.floor_price`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;

use super::{floor_at, unexpected_payload, HttpFetcher, Payload, PriceSource};
use crate::error::{SourceError, SourceErrorKind};
use crate::types::Quote;

pub(super) const SOURCE_ID: &str = "opensea";
pub(super) const API_KEY_HEADER: &str = "x-api-key";

const FLOOR_POINTER: &str = "/total/floor_price";

pub struct OpenSeaSource {
    base_url: String,
    http: HttpFetcher,
}

impl OpenSeaSource {
    pub fn new(base_url: &str, http: HttpFetcher) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    /// The slug is read from the market contract, so it is added as one
    /// escaped path segment and can never alter the rest of the request
    fn stats_url(&self, slug: &str) -> Result<Url, SourceError> {
        let invalid = |detail: String| SourceError::new(SOURCE_ID, SourceErrorKind::Network, detail);

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| invalid(format!("invalid base url {:?}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("base url {:?} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["collections", slug, "stats"]);
        Ok(url)
    }

    /// Extract a quote from a classified stats response
    pub fn parse(asset_id: &str, payload: Payload) -> Result<Quote, SourceError> {
        match payload {
            Payload::Decoded(body) => {
                let price = floor_at(SOURCE_ID, &body, FLOOR_POINTER)?;
                Ok(Quote {
                    source_id: SOURCE_ID.to_string(),
                    asset_id: asset_id.to_string(),
                    price,
                    observed_at: Utc::now(),
                })
            }
            other => Err(unexpected_payload(SOURCE_ID, other)),
        }
    }
}

#[async_trait]
impl PriceSource for OpenSeaSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch(&self, asset_id: &str) -> Result<Quote, SourceError> {
        let url = self.stats_url(asset_id)?;
        tracing::debug!(source = %SOURCE_ID, url = %url, "Fetching collection stats");
        let payload = self.http.get(url.as_str(), &[]).await?;
        Self::parse(asset_id, payload)
    }
}
