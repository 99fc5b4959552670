//! Error types for loading and running scrapers

use thiserror::Error;

/// Result type for scraper operations
pub type ScrapeResult<T> = Result<T, ScrapeError>;

/// Errors that reach the caller of the library
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Scraper definition XML unreadable under every attempted encoding
    #[error("Unparseable scraper definition: {0}")]
    Parse(String),

    /// Addon manifest is missing required data
    #[error("Invalid addon manifest: {0}")]
    Manifest(String),

    /// Document bytes match none of the supported charsets
    #[error("Document could not be decoded: {0}")]
    Encoding(String),

    /// Execution stopped through its cancellation token
    #[error("Scrape cancelled")]
    Cancelled,

    /// Execution ran past its deadline
    #[error("Scrape exceeded its deadline")]
    DeadlineExceeded,

    /// Document source failed to deliver a page
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },
}

impl From<quick_xml::Error> for ScrapeError {
    fn from(err: quick_xml::Error) -> Self {
        ScrapeError::Parse(err.to_string())
    }
}

/// Failures while resolving a call embedded in scraped text
///
/// These never leave the processor; they are rendered into the destination
/// register as an inline error marker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("Invalid Function Name: {0}")]
    UnknownFunction(String),

    #[error("Malformed call marker: {0}")]
    MalformedMarker(String),

    #[error("Call depth limit of {0} exceeded")]
    DepthExceeded(usize),
}
