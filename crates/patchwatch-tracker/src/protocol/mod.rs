//! Upstream version protocol
//!
//! - **parser**: pure text-to-rows parsing of the pipe-delimited format
//! - **client**: HTTP fetch with timeout and error tolerance
//!
//! [`VersionSource`] is the seam the poll scheduler depends on, so cycles can
//! be driven by the real [`ProtocolClient`] or by any other source.

pub mod client;
pub mod parser;

use async_trait::async_trait;

use crate::models::ParsedFieldRow;

pub use client::ProtocolClient;
pub use parser::{parse, parse_document, VersionsDocument};

/// Why a fetch produced no document
#[derive(Debug, thiserror::Error)]
pub enum ProtocolFetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream answered with status {0}")]
    Status(u16),

    #[error("Response body is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
}

impl ProtocolFetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolFetchError::Http(e) if e.is_timeout())
    }
}

/// Result of fetching one product
///
/// [`FetchOutcome::into_rows`] collapses everything to a row list, which is
/// what ingestion consumes: "no data" and "upstream down" are treated alike.
/// The variants stay distinguishable for logging and cycle reports.
#[derive(Debug)]
pub enum FetchOutcome {
    Rows(Vec<ParsedFieldRow>),
    NotFound,
    Unavailable(ProtocolFetchError),
}

impl FetchOutcome {
    pub fn into_rows(self) -> Vec<ParsedFieldRow> {
        match self {
            FetchOutcome::Rows(rows) => rows,
            FetchOutcome::NotFound | FetchOutcome::Unavailable(_) => Vec::new(),
        }
    }

    pub fn has_rows(&self) -> bool {
        matches!(self, FetchOutcome::Rows(rows) if !rows.is_empty())
    }

    pub fn kind(&self) -> FetchKind {
        match self {
            FetchOutcome::Rows(rows) => FetchKind::Rows(rows.len()),
            FetchOutcome::NotFound => FetchKind::NotFound,
            FetchOutcome::Unavailable(_) => FetchKind::Unavailable,
        }
    }
}

/// Data-free summary of a [`FetchOutcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Rows(usize),
    NotFound,
    Unavailable,
}

/// Anything that can produce the current version rows of a product
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn fetch_versions(&self, product: &str) -> FetchOutcome;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_outcomes_collapse_to_no_rows() {
        assert!(FetchOutcome::NotFound.into_rows().is_empty());
        assert!(FetchOutcome::Unavailable(ProtocolFetchError::Status(503))
            .into_rows()
            .is_empty());
    }

    #[test]
    fn test_kind_and_has_rows() {
        let rows = FetchOutcome::Rows(vec![ParsedFieldRow::new()]);
        assert_eq!(rows.kind(), FetchKind::Rows(1));
        assert!(rows.has_rows());

        let empty = FetchOutcome::Rows(Vec::new());
        assert!(!empty.has_rows());
        assert_eq!(FetchOutcome::NotFound.kind(), FetchKind::NotFound);
        assert!(!ProtocolFetchError::Status(500).is_timeout());
    }
}
