use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Serialize;

use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::resources::{OrderResource, WaybillResource};
use crate::token::{TokenCache, TokenProvider};

const BASE_URL: &str = "https://api.ninjavan.co";
const SANDBOX_BASE_URL: &str = "https://api-sandbox.ninjavan.co";

/// Country codes the production API is partitioned into.
pub const SUPPORTED_COUNTRY_CODES: [&str; 7] = ["SG", "MY", "TH", "ID", "VN", "PH", "MM"];

/// The only region available in sandbox mode.
pub const SANDBOX_COUNTRY_CODE: &str = "SG";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`NinjaVanClient`].
#[derive(Debug, Clone, Default)]
pub struct NinjaVanConfig {
    pub client_id: String,
    pub client_secret: String,
    /// One of [`SUPPORTED_COUNTRY_CODES`]; sandbox mode accepts only
    /// [`SANDBOX_COUNTRY_CODE`].
    pub country_code: String,
    /// Route requests to the sandbox environment.
    pub test_mode: bool,
    /// Request timeout for all API calls (default 30 s).
    pub timeout: Option<Duration>,
    /// Pre-shared token for dev deployments; skips the token endpoint
    /// entirely while keeping the same cache semantics.
    pub dev_access_token: Option<String>,
    /// Override the API origin. Intended for tests and self-hosted
    /// gateways; the country segment is still appended.
    pub base_url: Option<String>,
}

/// Client for the courier REST API.
///
/// Holds an immutable credential and region for its lifetime. The bearer
/// token is resolved per request at send time, because tokens expire
/// independently of client lifetime.
pub struct NinjaVanClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    base_url: String,
    country_code: String,
    test_mode: bool,
}

/// Captured request descriptor, created once before the first send and
/// reused verbatim for the single 401 retry.
pub(crate) struct PendingRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl PendingRequest {
    fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    fn json<T: Serialize + ?Sized>(method: Method, url: String, body: &T) -> Result<Self> {
        let mut request = Self::new(method, url);
        request.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        request.body = Some(serde_json::to_vec(body)?);
        Ok(request)
    }
}

impl NinjaVanClient {
    pub fn new(config: NinjaVanConfig) -> Result<Self> {
        Self::with_token_cache(config, TokenCache::new())
    }

    /// Build a client against an injected token cache, so several clients
    /// (or tests) can share one process-wide store.
    pub fn with_token_cache(config: NinjaVanConfig, cache: TokenCache) -> Result<Self> {
        validate_country_code(&config.country_code, config.test_mode)?;

        let origin = match &config.base_url {
            Some(origin) => origin.trim_end_matches('/'),
            None if config.test_mode => SANDBOX_BASE_URL,
            None => BASE_URL,
        };
        let base_url = format!("{}/{}", origin, config.country_code.to_lowercase());

        let http = reqwest::Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        let credential = Credential::new(config.client_id, config.client_secret);
        let tokens = TokenProvider::new(
            http.clone(),
            cache,
            credential,
            &base_url,
            &config.country_code,
            config.test_mode,
            config.dev_access_token,
        );

        Ok(Self {
            http,
            tokens,
            base_url,
            country_code: config.country_code,
            test_mode: config.test_mode,
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// The country-scoped request origin, e.g.
    /// `https://api-sandbox.ninjavan.co/sg`.
    pub fn base_request_url(&self) -> &str {
        &self.base_url
    }

    pub fn orders(&self) -> OrderResource<'_> {
        OrderResource::new(self)
    }

    pub fn waybills(&self) -> WaybillResource<'_> {
        WaybillResource::new(self)
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = self.request_url(path, query)?;
        self.execute(PendingRequest::new(Method::GET, url)).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response> {
        let url = self.request_url(path, &[])?;
        self.execute(PendingRequest::json(Method::POST, url, body)?)
            .await
    }

    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response> {
        let url = self.request_url(path, &[])?;
        self.execute(PendingRequest::json(Method::PUT, url, body)?)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Response> {
        let url = self.request_url(path, &[])?;
        self.execute(PendingRequest::new(Method::DELETE, url)).await
    }

    fn request_url(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if query.is_empty() {
            return Ok(joined);
        }

        let mut url = Url::parse(&joined).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url.to_string())
    }

    /// Single response-handling policy for every verb.
    ///
    /// A 401 on the first attempt forces a token refresh and reissues the
    /// captured request exactly once; a second 401 escalates. 5xx is never
    /// retried here, since blind retry of non-idempotent operations like
    /// order creation is unsafe.
    async fn execute(&self, request: PendingRequest) -> Result<Response> {
        let mut retried = false;
        loop {
            let token = if retried {
                self.tokens.force_refresh().await?
            } else {
                self.tokens.get_valid_token().await?
            };

            let response = self.send(&request, &token).await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && !retried {
                tracing::warn!(
                    url = %request.url,
                    "request unauthorized, refreshing token and retrying once"
                );
                retried = true;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, body));
        }
    }

    async fn send(&self, request: &PendingRequest, token: &str) -> Result<Response> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.as_str())
            .headers(request.headers.clone())
            .bearer_auth(token);

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        Ok(builder.send().await?)
    }
}

fn validate_country_code(country_code: &str, test_mode: bool) -> Result<()> {
    let supported = if test_mode {
        country_code == SANDBOX_COUNTRY_CODE
    } else {
        SUPPORTED_COUNTRY_CODES.contains(&country_code)
    };

    if supported {
        Ok(())
    } else {
        Err(Error::UnsupportedCountryCode {
            country_code: country_code.to_string(),
            test_mode,
        })
    }
}
