//! `reqwest`-backed specification fetcher.

use crate::discovery::{
    domain::ApiDocument,
    ports::{FetchedSpec, SpecFetchError, SpecFetchResult, SpecFetcher, SpecLocation},
};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("meshgate/", env!("CARGO_PKG_VERSION"));

/// Well-known specification paths probed when no explicit URL is set.
pub const WELL_KNOWN_SPEC_PATHS: [&str; 9] = [
    "/openapi.json",
    "/swagger.json",
    "/api/openapi.json",
    "/api/v1/openapi.json",
    "/api/v3/openapi.json",
    "/v3/api-docs",
    "/.well-known/openapi.json",
    "/openapi.yaml",
    "/swagger.yaml",
];

/// Documentation pages scanned for specification links once every path
/// and hint has missed.
pub const DOCUMENTATION_PAGES: [&str; 2] = ["/", "/docs"];

/// Upper bound on links followed out of documentation pages.
const MAX_PAGE_LINKS: usize = 10;

/// Quoted `href`, `src` and `url` values in an HTML page.
static LINK_ATTRIBUTE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:href|src|url)\s*[=:]\s*["']([^"'#\s]+)["']"#).ok()
});

/// Fetches specifications over HTTP.
///
/// An explicit `spec_url` is tried on its own. Otherwise the well-known
/// paths, then the location's hints, then the documentation pages are
/// fetched in order and the first response that parses wins. HTML
/// responses along the way are scanned for same-host specification links,
/// which are tried last.
#[derive(Debug, Clone)]
pub struct HttpSpecFetcher {
    client: Client,
    paths: Vec<String>,
}

/// What a single candidate URL served.
enum Probe {
    Document(ApiDocument),
    Page(Vec<String>),
}

impl HttpSpecFetcher {
    /// Creates a fetcher probing `paths` with an existing client.
    #[must_use]
    pub const fn new(client: Client, paths: Vec<String>) -> Self {
        Self { client, paths }
    }

    /// Creates a fetcher with a default client and the well-known paths.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] when the TLS backend cannot be initialised.
    pub fn with_default_client(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self::new(
            client,
            WELL_KNOWN_SPEC_PATHS.iter().map(|path| (*path).to_owned()).collect(),
        ))
    }

    /// Replaces the probed paths; an empty list keeps the current ones.
    #[must_use]
    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        if !paths.is_empty() {
            self.paths = paths;
        }
        self
    }

    fn candidates(&self, location: &SpecLocation) -> Vec<String> {
        if let Some(spec_url) = &location.spec_url {
            return vec![spec_url.clone()];
        }
        let base = location.base_url.trim_end_matches('/');
        let relative = |path: &str| format!("{base}{path}");
        self.paths
            .iter()
            .map(|path| relative(path))
            .chain(location.hints.iter().map(|hint| {
                if hint.starts_with('/') {
                    relative(hint)
                } else {
                    hint.clone()
                }
            }))
            .chain(DOCUMENTATION_PAGES.iter().map(|page| relative(page)))
            .collect()
    }

    async fn fetch_one(&self, url: &str) -> SpecFetchResult<Probe> {
        let response = self
            .client
            .get(url)
            .header(
                "Accept",
                "application/json, application/yaml;q=0.9, text/html;q=0.5, */*;q=0.3",
            )
            .send()
            .await
            .map_err(|err| SpecFetchError::Transient {
                url: url.to_owned(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SpecFetchError::Transient {
                url: url.to_owned(),
                message: format!("server answered {status}"),
            });
        }
        if !status.is_success() {
            return Err(SpecFetchError::Permanent {
                url: url.to_owned(),
                message: format!("server answered {status}"),
            });
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.to_ascii_lowercase().contains("text/html"));
        // Final URL after redirects, so relative links resolve correctly.
        let served_from = response.url().clone();
        let text = response.text().await.map_err(|err| SpecFetchError::Transient {
            url: url.to_owned(),
            message: err.to_string(),
        })?;
        if is_html || text.trim_start().starts_with('<') {
            return Ok(Probe::Page(spec_links(&served_from, &text)));
        }
        ApiDocument::parse(&text)
            .map(Probe::Document)
            .map_err(|err| SpecFetchError::Permanent {
                url: url.to_owned(),
                message: err.to_string(),
            })
    }
}

#[async_trait]
impl SpecFetcher for HttpSpecFetcher {
    async fn fetch(&self, location: &SpecLocation) -> SpecFetchResult<FetchedSpec> {
        let explicit = location.spec_url.is_some();
        let mut transient = None;
        let mut tried = HashSet::new();
        let mut page_links = Vec::new();

        for url in self.candidates(location) {
            if !tried.insert(url.clone()) {
                continue;
            }
            match self.fetch_one(&url).await {
                Ok(Probe::Document(document)) => {
                    debug!(url = %url, "fetched API specification");
                    return Ok(FetchedSpec { url, document });
                }
                Ok(Probe::Page(links)) => {
                    debug!(url = %url, links = links.len(), "scanned documentation page");
                    page_links.extend(links);
                }
                Err(err) if explicit => return Err(err),
                Err(err) if err.is_transient() => {
                    debug!(url = %url, error = %err, "specification probe failed");
                    transient.get_or_insert(err);
                }
                Err(err) => debug!(url = %url, error = %err, "no specification at path"),
            }
        }

        let mut followed = 0;
        for url in page_links {
            if followed == MAX_PAGE_LINKS {
                break;
            }
            if !tried.insert(url.clone()) {
                continue;
            }
            followed += 1;
            match self.fetch_one(&url).await {
                Ok(Probe::Document(document)) => {
                    debug!(url = %url, "fetched API specification from a page link");
                    return Ok(FetchedSpec { url, document });
                }
                Ok(Probe::Page(_)) => debug!(url = %url, "page link served another page"),
                Err(err) if err.is_transient() => {
                    debug!(url = %url, error = %err, "page link failed");
                    transient.get_or_insert(err);
                }
                Err(err) => debug!(url = %url, error = %err, "no specification at page link"),
            }
        }

        if explicit {
            return Err(transient.unwrap_or_else(|| SpecFetchError::Permanent {
                url: location.spec_url.clone().unwrap_or_default(),
                message: "page does not link an API specification".to_owned(),
            }));
        }
        Err(transient.unwrap_or_else(|| SpecFetchError::NotFound {
            base_url: location.base_url.clone(),
        }))
    }
}

/// Extracts same-host links that look like specification documents.
fn spec_links(page: &Url, html: &str) -> Vec<String> {
    let Some(pattern) = LINK_ATTRIBUTE.as_ref() else {
        return Vec::new();
    };
    let mut links: Vec<String> = Vec::new();
    for captures in pattern.captures_iter(html) {
        let Some(link) = captures
            .get(1)
            .and_then(|raw| page.join(raw.as_str()).ok())
            .filter(|link| matches!(link.scheme(), "http" | "https"))
            .filter(|link| link.host_str() == page.host_str())
            .filter(looks_like_spec)
        else {
            continue;
        };
        let rendered = link.to_string();
        if !links.contains(&rendered) {
            links.push(rendered);
        }
    }
    links
}

fn looks_like_spec(link: &Url) -> bool {
    let path = link.path().to_ascii_lowercase();
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
        Some((_, extension)) => matches!(extension, "json" | "yaml" | "yml"),
        None => ["openapi", "swagger", "api-docs"]
            .iter()
            .any(|keyword| path.contains(keyword)),
    }
}
