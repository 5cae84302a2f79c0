//! Shared HTTP GET helper for price sources
//!
//! Every response is classified into a `Payload` so adapters match on an
//! explicit shape instead of probing whatever came back.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Client;
use std::time::Duration;

use crate::error::{SourceError, SourceErrorKind};

/// Classified HTTP response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// 2xx with a JSON body
    Decoded(serde_json::Value),
    /// 2xx with a body that is not JSON
    Bytes(Vec<u8>),
    /// Non-2xx status
    StatusError { status: u16, body: String },
}

impl Payload {
    /// Classify a status code and raw body
    pub fn classify(status: u16, body: Vec<u8>) -> Self {
        if !(200..300).contains(&status) {
            return Payload::StatusError {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            };
        }
        match serde_json::from_slice(&body) {
            Ok(value) => Payload::Decoded(value),
            Err(_) => Payload::Bytes(body),
        }
    }
}

/// HTTP client bound to one source, with its timeout and optional API key
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    source_id: String,
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(
        source_id: &str,
        timeout: Duration,
        api_key_header: &'static str,
        api_key: Option<String>,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            match HeaderValue::from_str(&key) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(api_key_header), value);
                }
                Err(_) => {
                    tracing::warn!(source = %source_id, "API key is not a valid header value; sending without it");
                }
            }
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(source = %source_id, error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            source_id: source_id.to_string(),
            client,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET a URL; transport failures become `SourceError`, everything else a `Payload`
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Payload, SourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok(Payload::classify(status, body.to_vec()))
    }

    fn transport_error(&self, e: reqwest::Error) -> SourceError {
        let kind = if e.is_timeout() {
            SourceErrorKind::Timeout
        } else {
            SourceErrorKind::Network
        };
        SourceError::new(&self.source_id, kind, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_json() {
        let payload = Payload::classify(200, br#"{"total":{"floor_price":1.5}}"#.to_vec());
        assert_eq!(payload, Payload::Decoded(json!({"total": {"floor_price": 1.5}})));
    }

    #[test]
    fn test_classify_bytes() {
        let payload = Payload::classify(200, b"<html>maintenance</html>".to_vec());
        assert!(matches!(payload, Payload::Bytes(_)));
    }

    #[test]
    fn test_classify_status_error_wins_over_json() {
        let payload = Payload::classify(429, br#"{"detail":"throttled"}"#.to_vec());
        assert_eq!(
            payload,
            Payload::StatusError {
                status: 429,
                body: r#"{"detail":"throttled"}"#.to_string()
            }
        );
    }
}
