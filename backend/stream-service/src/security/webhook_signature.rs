//! Media provider webhook signatures
//!
//! The provider sends `Livepeer-Signature: t=<unix-ms>,v1=<hex>` where `v1` is
//! HMAC-SHA256 of the raw request body keyed with the shared secret.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Livepeer-Signature";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    MissingHeader,

    #[error("no webhook secret is configured")]
    MissingSecret,

    #[error("malformed signature header: {0}")]
    Malformed(&'static str),

    #[error("signature does not match")]
    Mismatch,

    #[error("signature timestamp is outside the accepted window")]
    Expired,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance: Option<Duration>,
}

struct SignatureHeader<'a> {
    timestamp: Option<&'a str>,
    digest: &'a str,
}

fn parse_header(header: &str) -> Result<SignatureHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut digest = None;

    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or(SignatureError::Malformed("expected key=value pairs"))?;
        match key {
            "t" => timestamp = Some(value),
            "v1" => digest = Some(value),
            _ => {}
        }
    }

    Ok(SignatureHeader {
        timestamp,
        digest: digest.ok_or(SignatureError::Malformed("missing v1"))?,
    })
}

impl WebhookVerifier {
    /// `tolerance_secs == 0` disables the timestamp check.
    pub fn new(secret: Option<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance: (tolerance_secs > 0).then(|| Duration::from_secs(tolerance_secs)),
        }
    }

    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(header, body, Utc::now().timestamp_millis())
    }

    fn verify_at(&self, header: Option<&str>, body: &[u8], now_ms: i64) -> Result<(), SignatureError> {
        let secret = self.secret.as_deref().ok_or(SignatureError::MissingSecret)?;
        let header = header
            .filter(|h| !h.trim().is_empty())
            .ok_or(SignatureError::MissingHeader)?;
        let parsed = parse_header(header)?;

        if let Some(tolerance) = self.tolerance {
            let sent_ms: i64 = parsed
                .timestamp
                .ok_or(SignatureError::Malformed("missing t"))?
                .parse()
                .map_err(|_| SignatureError::Malformed("t is not a number"))?;
            if (now_ms - sent_ms).unsigned_abs() > tolerance.as_millis() as u64 {
                return Err(SignatureError::Expired);
            }
        }

        let expected =
            hex::decode(parsed.digest).map_err(|_| SignatureError::Malformed("v1 is not hex"))?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::MissingSecret)?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

/// Hex HMAC-SHA256 of `body`, the value a provider puts in `v1`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MissingSecret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"stream":{"id":"abc"}}"#;
    const DIGEST: &str = "b1b88d4e9cb15e7d29b8561eacd58abadfc0c3cef0f173afe5fb65aebc884e68";

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Some("s3cret".into()), 0)
    }

    #[test]
    fn accepts_known_digest() {
        let header = format!("t=1700000000000,v1={DIGEST}");
        assert_eq!(verifier().verify(Some(&header), BODY), Ok(()));
        assert_eq!(sign("s3cret", BODY).unwrap(), DIGEST);
    }

    #[test]
    fn rejects_tampered_body() {
        let header = format!("t=1700000000000,v1={DIGEST}");
        assert_eq!(
            verifier().verify(Some(&header), br#"{"stream":{"id":"abd"}}"#),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_wrong_secret() {
        let other = WebhookVerifier::new(Some("other".into()), 0);
        let header = format!("v1={DIGEST}");
        assert_eq!(other.verify(Some(&header), BODY), Err(SignatureError::Mismatch));
    }

    #[test]
    fn missing_pieces() {
        assert_eq!(verifier().verify(None, BODY), Err(SignatureError::MissingHeader));
        assert_eq!(
            WebhookVerifier::new(None, 0).verify(Some("v1=00"), BODY),
            Err(SignatureError::MissingSecret)
        );
        assert_eq!(
            WebhookVerifier::new(Some(String::new()), 0).verify(Some("v1=00"), BODY),
            Err(SignatureError::MissingSecret)
        );
    }

    #[test]
    fn malformed_headers() {
        assert!(matches!(
            verifier().verify(Some("garbage"), BODY),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            verifier().verify(Some("t=1"), BODY),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            verifier().verify(Some("v1=zz"), BODY),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn tolerance_window() {
        let verifier = WebhookVerifier::new(Some("s3cret".into()), 300);
        let sent = 1_700_000_000_000_i64;
        let header = format!("t={sent},v1={DIGEST}");

        assert_eq!(verifier.verify_at(Some(&header), BODY, sent + 60_000), Ok(()));
        assert_eq!(
            verifier.verify_at(Some(&header), BODY, sent + 301_000),
            Err(SignatureError::Expired)
        );
        assert!(matches!(
            verifier.verify_at(Some(&format!("v1={DIGEST}")), BODY, sent),
            Err(SignatureError::Malformed(_))
        ));
    }
}
