//! API credential pair and cache-key fingerprinting.

use std::fmt;

use sha2::{Digest, Sha256};

/// OAuth client credentials for the API.
///
/// The secret is never logged: `Debug` redacts it, and cache keys only ever
/// embed `fingerprint()`, a one-way hash, so the key space cannot leak the
/// raw secret.
#[derive(Clone)]
pub struct Credential {
    client_id: String,
    client_secret: String,
}

impl Credential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// One-way hash of the credential pair, hex-encoded and truncated to
    /// 128 bits. Deterministic, so clients built from the same credentials
    /// land on the same token cache entry.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.client_id.as_bytes());
        hasher.update(b":");
        hasher.update(self.client_secret.as_bytes());
        let digest = hasher.finalize();

        let mut out = String::with_capacity(32);
        for byte in &digest[..16] {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}
