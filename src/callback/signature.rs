//! HMAC-SHA256 authenticity check for callbacks.
//!
//! The gateway signs `conversationData:conversationId:mdStatus:paymentId:status`
//! with the merchant's shared secret and sends the lowercase hex digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::config::GatewayMode;
use crate::domain::CallbackEvent;

type HmacSha256 = Hmac<Sha256>;

pub const FIELD_DELIMITER: &str = ":";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature missing")]
    Missing,

    #[error("signature is not valid hex")]
    Malformed,

    #[error("signature mismatch")]
    Mismatch,

    #[error("live mode requires a signature secret")]
    SecretNotConfigured,

    #[error("signature secret rejected by HMAC")]
    InvalidKey,
}

/// Whether a callback must be authenticated before it may touch the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck<'a> {
    Enforce(&'a str),
    /// Sandbox only.
    Skip,
    /// Live mode without a secret; every callback is refused.
    Refuse,
}

pub fn signature_check<'a>(
    mode: GatewayMode,
    secret: Option<&'a str>,
    event: &CallbackEvent,
) -> SignatureCheck<'a> {
    let secret = secret.filter(|s| !s.is_empty());
    match (mode, secret) {
        (GatewayMode::Live, Some(secret)) => SignatureCheck::Enforce(secret),
        (GatewayMode::Live, None) => SignatureCheck::Refuse,
        (GatewayMode::Sandbox, Some(secret)) if event.signature.is_some() => {
            SignatureCheck::Enforce(secret)
        }
        (GatewayMode::Sandbox, _) => SignatureCheck::Skip,
    }
}

pub fn signing_message(event: &CallbackEvent) -> String {
    [
        event.conversation_data.as_deref().unwrap_or(""),
        event.conversation_id.as_str(),
        event.md_status.as_str(),
        event.payment_id.as_str(),
        event.status.as_str(),
    ]
    .join(FIELD_DELIMITER)
}

fn keyed_mac(secret: &str, event: &CallbackEvent) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(signing_message(event).as_bytes());
    Ok(mac)
}

pub fn compute_signature(secret: &str, event: &CallbackEvent) -> Result<String, SignatureError> {
    let mac = keyed_mac(secret, event)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies `event.signature` against the secret. The comparison runs in
/// constant time over the decoded digest.
pub fn verify_signature(secret: &str, event: &CallbackEvent) -> Result<(), SignatureError> {
    let supplied = event.signature.as_deref().ok_or(SignatureError::Missing)?;
    let supplied = hex::decode(supplied.trim()).map_err(|_| SignatureError::Malformed)?;

    keyed_mac(secret, event)?
        .verify_slice(&supplied)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallbackSource;
    use serde_json::json;

    fn event(signature: Option<&str>) -> CallbackEvent {
        CallbackEvent {
            conversation_id: "conv-1".to_string(),
            payment_id: "pay-1".to_string(),
            status: "success".to_string(),
            md_status: "1".to_string(),
            conversation_data: None,
            signature: signature.map(str::to_string),
            source: CallbackSource::BrowserRedirect,
            raw_fields: json!({}),
        }
    }

    #[test]
    fn test_signing_message_uses_empty_conversation_data() {
        assert_eq!(signing_message(&event(None)), ":conv-1:1:pay-1:success");
    }

    #[test]
    fn test_valid_signature_verifies() {
        let mut ev = event(None);
        ev.signature = Some(compute_signature("secret", &ev).unwrap());
        assert_eq!(verify_signature("secret", &ev), Ok(()));
    }

    #[test]
    fn test_uppercase_hex_is_accepted() {
        let mut ev = event(None);
        ev.signature = Some(compute_signature("secret", &ev).unwrap().to_uppercase());
        assert_eq!(verify_signature("secret", &ev), Ok(()));
    }

    #[test]
    fn test_tampered_field_is_rejected() {
        let mut ev = event(None);
        ev.signature = Some(compute_signature("secret", &ev).unwrap());
        ev.md_status = "2".to_string();
        assert_eq!(verify_signature("secret", &ev), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_missing_and_garbage_signatures() {
        assert_eq!(
            verify_signature("secret", &event(None)),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verify_signature("secret", &event(Some("zz-not-hex"))),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_check_policy_by_mode() {
        let unsigned = event(None);
        let signed = event(Some("abcd"));

        assert_eq!(
            signature_check(GatewayMode::Live, Some("k"), &unsigned),
            SignatureCheck::Enforce("k")
        );
        assert_eq!(
            signature_check(GatewayMode::Live, None, &signed),
            SignatureCheck::Refuse
        );
        assert_eq!(
            signature_check(GatewayMode::Sandbox, Some("k"), &unsigned),
            SignatureCheck::Skip
        );
        assert_eq!(
            signature_check(GatewayMode::Sandbox, Some("k"), &signed),
            SignatureCheck::Enforce("k")
        );
        assert_eq!(
            signature_check(GatewayMode::Sandbox, None, &signed),
            SignatureCheck::Skip
        );
    }
}
