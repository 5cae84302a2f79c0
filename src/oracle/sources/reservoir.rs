//! Reservoir collections client
//!
//! `GET /collections/v7?slug={slug}`, floor at
//! `collections[0].floorAsk.price.amount.decimal`.

use async_trait::async_trait;
use chrono::Utc;

use super::{floor_at, unexpected_payload, HttpFetcher, Payload, PriceSource};
use crate::error::{SourceError, SourceErrorKind};
use crate::types::Quote;

pub(super) const SOURCE_ID: &str = "reservoir";
pub(super) const API_KEY_HEADER: &str = "x-api-key";

const FLOOR_POINTER: &str = "/collections/0/floorAsk/price/amount/decimal";

pub struct ReservoirSource {
    base_url: String,
    http: HttpFetcher,
}

impl ReservoirSource {
    pub fn new(base_url: &str, http: HttpFetcher) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn parse(asset_id: &str, payload: Payload) -> Result<Quote, SourceError> {
        let body = match payload {
            Payload::Decoded(body) => body,
            other => return Err(unexpected_payload(SOURCE_ID, other)),
        };

        let empty = body
            .get("collections")
            .and_then(|c| c.as_array())
            .map(|c| c.is_empty())
            .unwrap_or(true);
        if empty {
            return Err(SourceError::new(
                SOURCE_ID,
                SourceErrorKind::MissingField,
                format!("no collection for slug {}", asset_id),
            ));
        }

        let price = floor_at(SOURCE_ID, &body, FLOOR_POINTER)?;
        Ok(Quote {
            source_id: SOURCE_ID.to_string(),
            asset_id: asset_id.to_string(),
            price,
            observed_at: Utc::now(),
        })
    }
}

#[async_trait]
impl PriceSource for ReservoirSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch(&self, asset_id: &str) -> Result<Quote, SourceError> {
        let url = format!("{}/collections/v7", self.base_url);
        let payload = self.http.get(&url, &[("slug", asset_id)]).await?;
        Self::parse(asset_id, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_floor_ask() {
        let body = json!({
            "collections": [{
                "slug": "pudgypenguins",
                "floorAsk": {"price": {"currency": {"symbol": "ETH"}, "amount": {"raw": "11450000000000000000", "decimal": 11.45}}}
            }]
        });
        let quote = ReservoirSource::parse("pudgypenguins", Payload::Decoded(body)).unwrap();
        assert_eq!(quote.price, dec!(11.45));
        assert_eq!(quote.source_id, "reservoir");
    }

    #[test]
    fn test_parse_unknown_slug() {
        let err = ReservoirSource::parse("ghost", Payload::Decoded(json!({"collections": []})))
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::MissingField);
    }

    #[test]
    fn test_parse_html_body() {
        let err = ReservoirSource::parse("x", Payload::Bytes(b"<html/>".to_vec())).unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::MalformedPayload);
    }
}
