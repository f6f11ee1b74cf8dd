//! Port for retrieving API specifications from a tool's provider.

use crate::discovery::domain::ApiDocument;
use async_trait::async_trait;
use thiserror::Error;

/// Result type for specification fetches.
pub type SpecFetchResult<T> = Result<T, SpecFetchError>;

/// Where to look for a tool's specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecLocation {
    /// Base URL of the tool.
    pub base_url: String,
    /// Explicit specification URL, tried before well-known paths.
    pub spec_url: Option<String>,
    /// Extra paths relative to `base_url`, or absolute URLs, tried after
    /// the well-known paths.
    pub hints: Vec<String>,
}

/// A specification that was fetched and parsed.
#[derive(Debug, Clone)]
pub struct FetchedSpec {
    /// URL the document was read from.
    pub url: String,
    /// Parsed document.
    pub document: ApiDocument,
}

/// Retrieves a tool's specification over the network.
#[async_trait]
pub trait SpecFetcher: Send + Sync {
    /// Fetches and parses the specification for `location`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecFetchError::Transient`] for network failures and
    /// server errors, and [`SpecFetchError::NotFound`] or
    /// [`SpecFetchError::Permanent`] when retrying cannot help.
    async fn fetch(&self, location: &SpecLocation) -> SpecFetchResult<FetchedSpec>;
}

/// Errors returned by specification fetchers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecFetchError {
    /// The target was unreachable or answered with a server error.
    #[error("transient failure fetching {url}: {message}")]
    Transient {
        /// URL that failed.
        url: String,
        /// Failure detail.
        message: String,
    },

    /// The target rejected the request or served an invalid document.
    #[error("failed to fetch {url}: {message}")]
    Permanent {
        /// URL that failed.
        url: String,
        /// Failure detail.
        message: String,
    },

    /// No candidate location served a specification.
    #[error("no API specification found under {base_url}")]
    NotFound {
        /// Base URL that was probed.
        base_url: String,
    },
}

impl SpecFetchError {
    /// Returns whether retrying may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
