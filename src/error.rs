//! Error taxonomy
//!
//! Every failure crosses layer boundaries as a typed value. Source failures are
//! per-source and never abort sibling fetches; resolution failures say whether
//! the next scheduled cycle may retry.

use thiserror::Error;

/// Why a single price source failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceErrorKind {
    Timeout,
    Network,
    HttpStatus(u16),
    MalformedPayload,
    MissingField,
}

impl std::fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceErrorKind::Timeout => write!(f, "timeout"),
            SourceErrorKind::Network => write!(f, "network"),
            SourceErrorKind::HttpStatus(code) => write!(f, "http {}", code),
            SourceErrorKind::MalformedPayload => write!(f, "malformed payload"),
            SourceErrorKind::MissingField => write!(f, "missing field"),
        }
    }
}

/// A price source could not produce a quote
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{source_id}: {kind}: {detail}")]
pub struct SourceError {
    pub source_id: String,
    pub kind: SourceErrorKind,
    pub detail: String,
}

impl SourceError {
    pub fn new(source_id: &str, kind: SourceErrorKind, detail: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            kind,
            detail: detail.into(),
        }
    }
}

/// Errors from combining quotes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// No source produced a usable quote
    #[error("No price data available")]
    NoData,
}

/// Errors talking to the market contract or the RPC node
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid contract data: {0}")]
    InvalidData(String),

    #[error("Unknown market status code {0}")]
    UnknownStatus(u8),

    #[error("No resolver signing key configured")]
    SignerMissing,
}

/// Failures before a settlement transaction has an id
#[derive(Error, Debug, Clone)]
pub enum SettlementError {
    #[error("Price cannot be encoded on-chain: {0}")]
    Encoding(String),

    #[error("Failed to submit transaction: {0}")]
    Submission(#[from] ChainError),
}

/// Why a resolution attempt did not settle a market
#[derive(Error, Debug, Clone)]
pub enum ResolutionError {
    #[error("Market already resolved")]
    AlreadyResolved,

    #[error("Resolution time not reached (in {remaining_secs}s)")]
    TooEarly { remaining_secs: i64 },

    #[error("Not authorized resolver")]
    Unauthorized,

    #[error("Consensus price unavailable")]
    PriceUnavailable,

    #[error("Another resolution attempt holds this market")]
    Busy,

    #[error("Settlement transaction {0:#x} has no receipt yet")]
    SettlementPending(ethers::types::H256),

    #[error("Previous settlement reverted; manual reconciliation required")]
    NeedsReconciliation,

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl ResolutionError {
    /// Whether the next scheduled cycle may try again without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolutionError::PriceUnavailable
                | ResolutionError::Busy
                | ResolutionError::SettlementPending(_)
                | ResolutionError::Chain(_)
        )
    }
}

impl From<AggregationError> for ResolutionError {
    fn from(_: AggregationError) -> Self {
        ResolutionError::PriceUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ResolutionError::PriceUnavailable.is_retryable());
        assert!(ResolutionError::Busy.is_retryable());
        assert!(ResolutionError::Chain(ChainError::Rpc("down".into())).is_retryable());
        assert!(!ResolutionError::AlreadyResolved.is_retryable());
        assert!(!ResolutionError::Unauthorized.is_retryable());
        assert!(!ResolutionError::TooEarly { remaining_secs: 5 }.is_retryable());
        assert!(!ResolutionError::NeedsReconciliation.is_retryable());
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::new("opensea", SourceErrorKind::HttpStatus(429), "rate limited");
        assert_eq!(err.to_string(), "opensea: http 429: rate limited");
    }

    #[test]
    fn test_too_early_message() {
        let err = ResolutionError::TooEarly { remaining_secs: 42 };
        assert_eq!(err.to_string(), "Resolution time not reached (in 42s)");
    }
}
