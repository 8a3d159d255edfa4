pub mod client;
pub mod credential;
pub mod error;
pub mod resources;
pub mod token;
pub mod types;
pub mod webhook;

pub use client::{NinjaVanClient, NinjaVanConfig, SANDBOX_COUNTRY_CODE, SUPPORTED_COUNTRY_CODES};
pub use credential::Credential;
pub use error::{Error, Result, WebhookError};
pub use resources::{OrderResource, WaybillOptions, WaybillResource};
pub use token::{TokenCache, TokenProvider, TokenRecord};
pub use types::{Order, Waybill};
pub use webhook::{
    SIGNATURE_HEADER, WebhookDispatcher, WebhookSecrets, WebhookVerifier, compute_signature,
};
