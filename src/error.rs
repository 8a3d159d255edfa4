use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

fn mode_suffix(test_mode: &bool) -> &'static str {
    if *test_mode { " on test mode" } else { "" }
}

/// Errors raised by the API client.
///
/// Non-2xx statuses are never swallowed: each maps to a variant carrying the
/// raw response body for diagnostics. The single exception is a first 401,
/// which the client recovers locally with one token refresh and retry before
/// surfacing `Authentication`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{country_code} is not supported{}", mode_suffix(.test_mode))]
    UnsupportedCountryCode {
        country_code: String,
        test_mode: bool,
    },

    /// Token fetch rejected, or a request still unauthorized after the retry.
    #[error("invalid authorization credentials: {0}")]
    Authentication(String),

    /// 400: a bad request or a validation exception has occurred.
    #[error("a bad request or a validation exception has occurred: {0}")]
    Validation(String),

    /// 403: the connection does not have permission to access the resource.
    #[error("connection doesn't have permission to access the resource: {0}")]
    Permission(String),

    /// 404: the resource you have specified cannot be found.
    #[error("the resource you have specified cannot be found: {0}")]
    NotFound(String),

    /// 429: the API rate limit for the application has been exceeded.
    #[error("the API rate limit for your application has been exceeded: {0}")]
    RateLimit(String),

    /// 500: an unhandled error with the server.
    #[error("an unhandled error with the server: {0}")]
    Server(String),

    /// 503: typically a scheduled outage.
    #[error("API is currently unavailable, try again soon: {0}")]
    Unavailable(String),

    /// Any other non-2xx status outside the documented set.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response body: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Map a non-2xx response status to its error variant.
    ///
    /// 401 is not mapped here on the first attempt; the request executor
    /// handles it with a refresh-and-retry before classifying.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 => Self::Validation(body),
            401 => Self::Authentication(body),
            403 => Self::Permission(body),
            404 => Self::NotFound(body),
            429 => Self::RateLimit(body),
            500 => Self::Server(body),
            503 => Self::Unavailable(body),
            status => Self::UnexpectedStatus { status, body },
        }
    }
}

/// Reasons an inbound webhook is not handed to the dispatcher.
///
/// Callers of the webhook endpoint only ever see `status_code()`; the
/// variant detail stays in server logs so verification internals are not
/// leaked to the sender.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook path does not end in a country code")]
    MissingCountryCode,

    #[error("no webhook secret configured for country {0}")]
    UnknownCountryCode(String),

    #[error("missing webhook signature header")]
    MissingSignature,

    #[error("webhook signature mismatch")]
    SignatureMismatch,

    #[error("webhook payload is not a JSON object")]
    InvalidPayload,

    #[error("no webhook dispatcher configured")]
    NoDispatcher,
}

impl WebhookError {
    /// The HTTP status the webhook endpoint answers with.
    ///
    /// Signature and routing failures are unauthorized; a verified payload
    /// that cannot be processed (missing dispatcher, non-object body) is
    /// unprocessable, so misconfiguration is distinguishable from rejection.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingCountryCode
            | Self::UnknownCountryCode(_)
            | Self::MissingSignature
            | Self::SignatureMismatch => 401,
            Self::InvalidPayload | Self::NoDispatcher => 422,
        }
    }
}
