//! `reqwest`-backed provider adapter for REST APIs.

use crate::provider::{
    domain::{
        Credential, HttpMethod, ProviderFailure, ProviderName, ProviderRequest, ProviderResponse,
    },
    ports::ProviderAdapter,
};
use crate::tool_registry::domain::{OperationCatalog, OperationKey};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("meshgate/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_DETAIL: usize = 300;

/// Provider-specific request conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPreset {
    /// GitHub REST API conventions.
    GitHub,
    /// GitLab REST API conventions.
    GitLab,
    /// Plain REST API.
    Generic,
}

impl ProviderPreset {
    /// Picks the preset matching a provider name.
    #[must_use]
    pub fn for_provider(provider: &ProviderName) -> Self {
        match provider.as_str() {
            "github" => Self::GitHub,
            "gitlab" => Self::GitLab,
            _ => Self::Generic,
        }
    }

    fn default_api_key_header(self) -> &'static str {
        match self {
            Self::GitLab => "PRIVATE-TOKEN",
            Self::GitHub | Self::Generic => "X-API-Key",
        }
    }

    fn decorate(self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Self::GitHub => builder
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28"),
            Self::GitLab | Self::Generic => builder.header("Accept", "application/json"),
        }
    }
}

/// Adapter that executes catalog operations as HTTP calls.
#[derive(Debug, Clone)]
pub struct HttpProviderAdapter {
    provider: ProviderName,
    preset: ProviderPreset,
    client: Client,
}

impl HttpProviderAdapter {
    /// Creates an adapter using an existing HTTP client.
    #[must_use]
    pub fn new(provider: ProviderName, client: Client) -> Self {
        let preset = ProviderPreset::for_provider(&provider);
        Self {
            provider,
            preset,
            client,
        }
    }

    /// Creates an adapter with a default client.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] when the TLS backend cannot be initialised.
    pub fn with_default_client(provider: ProviderName) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::new(provider, client))
    }

    /// Returns the preset used for requests.
    #[must_use]
    pub const fn preset(&self) -> ProviderPreset {
        self.preset
    }

    fn authorize(&self, builder: RequestBuilder, credential: Option<&Credential>) -> RequestBuilder {
        match credential {
            None => builder,
            Some(Credential::Bearer(token)) => builder.bearer_auth(token.expose_secret()),
            Some(Credential::Basic { username, password }) => {
                builder.basic_auth(username, Some(password.expose_secret()))
            }
            Some(Credential::ApiKey { header, key }) => {
                let header_name = header
                    .as_deref()
                    .unwrap_or_else(|| self.preset.default_api_key_header());
                builder.header(header_name, key.expose_secret())
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    fn provider(&self) -> ProviderName {
        self.provider.clone()
    }

    fn list_operations(&self, catalog: &OperationCatalog) -> Vec<OperationKey> {
        catalog
            .operations()
            .iter()
            .map(|operation| operation.key().clone())
            .collect()
    }

    async fn execute(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderFailure> {
        let url = build_url(&request)?;
        debug!(
            provider = %self.provider,
            method = %request.method,
            path = %url.path(),
            "dispatching provider request"
        );

        let mut builder = self.client.request(to_reqwest_method(request.method), url);
        builder = self.preset.decorate(builder);
        builder = self.authorize(builder, request.credential.as_ref());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_transport_error)?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ProviderFailure::transient(err.to_string()))?;
        let body = decode_body(&bytes);

        match ProviderFailure::from_status(status, error_detail(&body)) {
            Some(failure) => Err(failure),
            None => Ok(ProviderResponse::new(status, body)),
        }
    }
}

/// Builds the target URL from the base URL, path template and query.
///
/// # Errors
///
/// Returns [`ProviderFailure::InvalidRequest`] when a placeholder has no
/// value or the resulting URL does not parse.
pub fn build_url(request: &ProviderRequest) -> Result<Url, ProviderFailure> {
    let path = substitute_path(&request.path_template, &request.path_params)?;
    let joined = format!("{}{}", request.base_url.trim_end_matches('/'), path);
    let mut url = Url::parse(&joined)
        .map_err(|err| ProviderFailure::InvalidRequest(format!("invalid URL '{joined}': {err}")))?;

    if !request.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &request.query {
            match value {
                Value::Array(items) => {
                    for item in items {
                        pairs.append_pair(name, &scalar_to_string(item));
                    }
                }
                Value::Null => {}
                other => {
                    pairs.append_pair(name, &scalar_to_string(other));
                }
            }
        }
    }

    Ok(url)
}

fn substitute_path(template: &str, params: &Map<String, Value>) -> Result<String, ProviderFailure> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let (before, after_open) = rest.split_at(open);
        output.push_str(before);
        let Some(close) = after_open.find('}') else {
            return Err(ProviderFailure::InvalidRequest(format!(
                "unterminated placeholder in path template '{template}'"
            )));
        };
        let name = after_open.get(1..close).unwrap_or_default();
        let value = params.get(name).ok_or_else(|| {
            ProviderFailure::InvalidRequest(format!("missing path parameter '{name}'"))
        })?;
        output.push_str(&urlencoding::encode(&scalar_to_string(value)));
        rest = after_open.get(close + 1..).unwrap_or_default();
    }
    output.push_str(rest);

    if !output.starts_with('/') {
        output.insert(0, '/');
    }
    Ok(output)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn classify_transport_error(err: reqwest::Error) -> ProviderFailure {
    if err.is_builder() {
        return ProviderFailure::InvalidRequest(err.to_string());
    }
    ProviderFailure::transient(err.to_string())
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn error_detail(body: &Value) -> String {
    let detail = body
        .get("message")
        .or_else(|| body.get("error"))
        .map_or_else(|| scalar_to_string(body), scalar_to_string);
    detail.chars().take(MAX_ERROR_DETAIL).collect()
}
