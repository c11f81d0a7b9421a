//! Request authenticity: provider webhook signatures and HS256 tokens

pub mod access_token;
pub mod webhook_signature;

pub use access_token::{IssuedToken, TokenService};
pub use webhook_signature::{sign, SignatureError, WebhookVerifier, SIGNATURE_HEADER};
