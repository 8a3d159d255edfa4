//! Inbound webhook signature verification.
//!
//! The API signs every webhook body with HMAC-SHA256 under a per-country
//! shared secret and sends the base64 digest in the
//! `X-Ninjavan-Hmac-Sha256` header. The country is routed through the
//! request path, e.g. `POST /webhooks/sg`, and the signature is computed
//! over the exact raw bytes received. Parsing or re-serializing the body
//! before verification can alter it byte-for-byte and break the HMAC, so
//! the verifier takes the raw body and only parses after the signature
//! matches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "X-Ninjavan-Hmac-Sha256";

/// Receives verified webhook payloads, e.g. by enqueueing a background job.
///
/// Supplied once at configuration time; replaces runtime lookup of a
/// handler by name, so a missing dispatch target is visible at startup
/// instead of on the first delivery.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn dispatch(&self, payload: Map<String, Value>);
}

/// Immutable mapping from lowercase country code to webhook secret.
///
/// Populated once at startup and read-only from the request path.
#[derive(Clone, Default)]
pub struct WebhookSecrets {
    secrets: HashMap<String, String>,
}

impl WebhookSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret for a country code. Codes are lowercased so the
    /// path-derived lookup is case-insensitive.
    pub fn with_secret(
        mut self,
        country_code: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.secrets
            .insert(country_code.into().to_lowercase(), secret.into());
        self
    }

    pub fn get(&self, country_code: &str) -> Option<&str> {
        self.secrets.get(country_code).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl fmt::Debug for WebhookSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut countries: Vec<&str> = self.secrets.keys().map(String::as_str).collect();
        countries.sort_unstable();
        f.debug_struct("WebhookSecrets")
            .field("countries", &countries)
            .finish()
    }
}

/// Compute the signature the API would send for `payload` under `secret`:
/// base64-encoded HMAC-SHA256 with trailing whitespace stripped.
pub fn compute_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
    mac.update(payload);
    let digest = mac.finalize().into_bytes();
    base64::engine::general_purpose::STANDARD
        .encode(digest)
        .trim_end()
        .to_string()
}

/// Comparison whose timing does not depend on where the first mismatching
/// byte occurs, preventing signature guessing via timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Last non-empty path segment, lowercased.
fn country_from_path(path: &str) -> Option<String> {
    path.split('/')
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_lowercase)
}

/// Validates inbound signed payloads before handing them to a dispatcher.
#[derive(Clone)]
pub struct WebhookVerifier {
    secrets: WebhookSecrets,
    dispatcher: Option<Arc<dyn WebhookDispatcher>>,
}

impl WebhookVerifier {
    pub fn new(secrets: WebhookSecrets) -> Self {
        Self {
            secrets,
            dispatcher: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn WebhookDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Verify a payload's signature without dispatching.
    ///
    /// Returns the path-derived country code on success. Idempotent: the
    /// secret table is never mutated, so repeated calls with identical
    /// inputs produce identical results.
    pub fn verify(
        &self,
        path: &str,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<String, WebhookError> {
        let country = country_from_path(path).ok_or(WebhookError::MissingCountryCode)?;
        let secret = self
            .secrets
            .get(&country)
            .ok_or_else(|| WebhookError::UnknownCountryCode(country.clone()))?;
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::MissingSignature)?;

        let expected = compute_signature(secret, raw_body);
        if !constant_time_eq(signature.trim().as_bytes(), expected.as_bytes()) {
            return Err(WebhookError::SignatureMismatch);
        }

        Ok(country)
    }

    /// Verify, parse, and dispatch a webhook delivery.
    ///
    /// A verified payload with no configured dispatcher is reported as
    /// unprocessable rather than silently dropped, so misconfiguration is
    /// distinguishable from a rejected signature.
    pub async fn handle(
        &self,
        path: &str,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<String, WebhookError> {
        let country = self.verify(path, signature, raw_body)?;

        let dispatcher = self
            .dispatcher
            .as_ref()
            .ok_or(WebhookError::NoDispatcher)?;

        let payload = match serde_json::from_slice::<Value>(raw_body) {
            Ok(Value::Object(map)) => map,
            _ => return Err(WebhookError::InvalidPayload),
        };

        tracing::debug!(country = %country, "dispatching verified webhook payload");
        dispatcher.dispatch(payload).await;
        Ok(country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        received: Mutex<Vec<Map<String, Value>>>,
    }

    #[async_trait]
    impl WebhookDispatcher for RecordingDispatcher {
        async fn dispatch(&self, payload: Map<String, Value>) {
            self.received.lock().unwrap().push(payload);
        }
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(
            WebhookSecrets::new()
                .with_secret("SG", "test_sg_secret")
                .with_secret("my", "test_my_secret"),
        )
    }

    const BODY: &[u8] = br#"{"tracking_number":"TEST1234","status":"Delivered"}"#;

    #[test]
    fn accepts_a_valid_signature() {
        let signature = compute_signature("test_sg_secret", BODY);
        let country = verifier()
            .verify("/webhooks/sg", Some(&signature), BODY)
            .unwrap();
        assert_eq!(country, "sg");
    }

    #[test]
    fn rejects_a_mutated_body() {
        let signature = compute_signature("test_sg_secret", BODY);
        let mut mutated = BODY.to_vec();
        mutated[0] ^= 1;
        assert_eq!(
            verifier().verify("/webhooks/sg", Some(&signature), &mutated),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn rejects_a_mutated_signature() {
        let mut signature = compute_signature("test_sg_secret", BODY);
        signature.replace_range(0..1, if signature.starts_with('A') { "B" } else { "A" });
        assert_eq!(
            verifier().verify("/webhooks/sg", Some(&signature), BODY),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn rejects_a_missing_or_empty_signature() {
        assert_eq!(
            verifier().verify("/webhooks/sg", None, BODY),
            Err(WebhookError::MissingSignature)
        );
        assert_eq!(
            verifier().verify("/webhooks/sg", Some(""), BODY),
            Err(WebhookError::MissingSignature)
        );
    }

    #[test]
    fn rejects_an_unconfigured_country_even_with_a_valid_signature() {
        // Signed with a secret the verifier also knows, but for a country
        // that has no entry.
        let signature = compute_signature("test_sg_secret", BODY);
        assert_eq!(
            verifier().verify("/webhooks/th", Some(&signature), BODY),
            Err(WebhookError::UnknownCountryCode("th".to_string()))
        );
    }

    #[test]
    fn rejects_a_path_without_a_country_segment() {
        let signature = compute_signature("test_sg_secret", BODY);
        assert_eq!(
            verifier().verify("/", Some(&signature), BODY),
            Err(WebhookError::MissingCountryCode)
        );
    }

    #[test]
    fn country_extraction_uses_the_last_segment_and_ignores_trailing_slash() {
        assert_eq!(country_from_path("/webhooks/sg"), Some("sg".to_string()));
        assert_eq!(country_from_path("/webhooks/SG/"), Some("sg".to_string()));
        assert_eq!(country_from_path("/sg"), Some("sg".to_string()));
        assert_eq!(country_from_path("/"), None);
        assert_eq!(country_from_path(""), None);
    }

    #[test]
    fn verification_is_idempotent() {
        let v = verifier();
        let signature = compute_signature("test_sg_secret", BODY);
        for _ in 0..3 {
            assert!(v.verify("/webhooks/sg", Some(&signature), BODY).is_ok());
        }
        // A failing path stays failing too.
        for _ in 0..3 {
            assert!(v.verify("/webhooks/th", Some(&signature), BODY).is_err());
        }
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn signature_matches_known_shape() {
        // base64 of an HMAC-SHA256 digest is always 44 chars ending in '='.
        let signature = compute_signature("secret", b"payload");
        assert_eq!(signature.len(), 44);
        assert!(signature.ends_with('='));
        assert_eq!(signature, compute_signature("secret", b"payload"));
    }

    #[tokio::test]
    async fn handle_dispatches_the_parsed_payload() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let v = verifier().with_dispatcher(dispatcher.clone());
        let signature = compute_signature("test_sg_secret", BODY);

        v.handle("/webhooks/sg", Some(&signature), BODY)
            .await
            .unwrap();

        let received = dispatcher.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["tracking_number"], "TEST1234");
        assert_eq!(received[0]["status"], "Delivered");
    }

    #[tokio::test]
    async fn handle_without_dispatcher_is_unprocessable() {
        let signature = compute_signature("test_sg_secret", BODY);
        assert_eq!(
            verifier().handle("/webhooks/sg", Some(&signature), BODY).await,
            Err(WebhookError::NoDispatcher)
        );
    }

    #[tokio::test]
    async fn handle_rejects_a_non_object_payload() {
        let body = b"[1, 2, 3]";
        let signature = compute_signature("test_sg_secret", body);
        let v = verifier().with_dispatcher(Arc::new(RecordingDispatcher::default()));
        assert_eq!(
            v.handle("/webhooks/sg", Some(&signature), body).await,
            Err(WebhookError::InvalidPayload)
        );
    }

    #[tokio::test]
    async fn handle_does_not_dispatch_on_rejection() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let v = verifier().with_dispatcher(dispatcher.clone());

        let result = v.handle("/webhooks/sg", Some("bogus"), BODY).await;
        assert_eq!(result, Err(WebhookError::SignatureMismatch));
        assert!(dispatcher.received.lock().unwrap().is_empty());
    }
}
