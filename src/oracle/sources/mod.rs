//! Price source implementations (OpenSea, Reservoir)

mod http;
mod opensea;
mod reservoir;

pub use http::{HttpFetcher, Payload};
pub use opensea::OpenSeaSource;
pub use reservoir::ReservoirSource;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{OracleConfig, SourcesConfig};
use crate::error::{SourceError, SourceErrorKind};
use crate::types::Quote;

/// A single external floor-price provider.
///
/// Implementations apply their own request timeout and never retry; a failure
/// is returned as a value so sibling fetches keep running.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Stable identifier used in quotes and logs
    fn id(&self) -> &str;

    /// Fetch the current floor price for a collection
    async fn fetch(&self, asset_id: &str) -> Result<Quote, SourceError>;
}

/// Build every source enabled in the configuration
pub fn from_config(sources: &SourcesConfig, oracle: &OracleConfig) -> Vec<Arc<dyn PriceSource>> {
    let mut out: Vec<Arc<dyn PriceSource>> = Vec::new();
    if sources.opensea.enabled {
        let fetcher = HttpFetcher::new(
            opensea::SOURCE_ID,
            oracle.source_timeout(),
            opensea::API_KEY_HEADER,
            sources.opensea.api_key(),
        );
        out.push(Arc::new(OpenSeaSource::new(&sources.opensea.base_url, fetcher)));
    }
    if sources.reservoir.enabled {
        let fetcher = HttpFetcher::new(
            reservoir::SOURCE_ID,
            oracle.source_timeout(),
            reservoir::API_KEY_HEADER,
            sources.reservoir.api_key(),
        );
        out.push(Arc::new(ReservoirSource::new(
            &sources.reservoir.base_url,
            fetcher,
        )));
    }
    out
}

/// Walk a JSON pointer and parse the number found there as a floor price.
///
/// Missing, null or zero values are `MissingField` (no listed floor);
/// non-numeric or negative values are `MalformedPayload`.
pub(crate) fn floor_at(source_id: &str, body: &Value, pointer: &str) -> Result<Decimal, SourceError> {
    let raw = match body.pointer(pointer) {
        None | Some(Value::Null) => {
            return Err(SourceError::new(
                source_id,
                SourceErrorKind::MissingField,
                format!("{} absent", pointer),
            ))
        }
        Some(v) => v,
    };

    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(SourceError::new(
                source_id,
                SourceErrorKind::MalformedPayload,
                format!("{} is not a number: {}", pointer, other),
            ))
        }
    };

    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| {
            SourceError::new(
                source_id,
                SourceErrorKind::MalformedPayload,
                format!("{} = {:?}: {}", pointer, text, e),
            )
        })?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(SourceError::new(
            source_id,
            SourceErrorKind::MalformedPayload,
            format!("negative floor {}", price),
        ));
    }
    if price.is_zero() {
        return Err(SourceError::new(
            source_id,
            SourceErrorKind::MissingField,
            format!("{} is zero", pointer),
        ));
    }
    Ok(price.normalize())
}

/// Map a non-JSON or error payload to the matching source error
pub(crate) fn unexpected_payload(source_id: &str, payload: Payload) -> SourceError {
    match payload {
        Payload::Decoded(_) => SourceError::new(
            source_id,
            SourceErrorKind::MalformedPayload,
            "unexpected JSON shape",
        ),
        Payload::Bytes(bytes) => SourceError::new(
            source_id,
            SourceErrorKind::MalformedPayload,
            format!("non-JSON body ({} bytes)", bytes.len()),
        ),
        Payload::StatusError { status, body } => SourceError::new(
            source_id,
            SourceErrorKind::HttpStatus(status),
            body.chars().take(200).collect::<String>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_floor_parses_number_and_string() {
        let body = json!({"total": {"floor_price": 12.345}, "s": "0.5"});
        assert_eq!(floor_at("t", &body, "/total/floor_price").unwrap(), dec!(12.345));
        assert_eq!(floor_at("t", &body, "/s").unwrap(), dec!(0.5));
    }

    #[test]
    fn test_floor_missing_and_zero() {
        let body = json!({"total": {"floor_price": 0}});
        let err = floor_at("t", &body, "/total/floor_price").unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::MissingField);

        let err = floor_at("t", &body, "/total/volume").unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::MissingField);
    }

    #[test]
    fn test_floor_rejects_garbage() {
        let body = json!({"a": true, "b": "abc", "c": -1.5});
        assert_eq!(
            floor_at("t", &body, "/a").unwrap_err().kind,
            SourceErrorKind::MalformedPayload
        );
        assert_eq!(
            floor_at("t", &body, "/b").unwrap_err().kind,
            SourceErrorKind::MalformedPayload
        );
        assert_eq!(
            floor_at("t", &body, "/c").unwrap_err().kind,
            SourceErrorKind::MalformedPayload
        );
    }

    #[test]
    fn test_status_payload_maps_to_http_kind() {
        let err = unexpected_payload(
            "t",
            Payload::StatusError {
                status: 503,
                body: "unavailable".into(),
            },
        );
        assert_eq!(err.kind, SourceErrorKind::HttpStatus(503));
    }
}
