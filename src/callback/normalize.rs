//! Maps the two inbound shapes onto one `CallbackEvent`.
//!
//! Browser redirects arrive as query strings or form bodies using the
//! redirect vocabulary (`status=success|failure`, numeric `mdStatus`).
//! Server notifications arrive as JSON carrying `iyziEventType`, their own
//! field names and a status vocabulary that is translated through
//! [`NOTIFICATION_STATUS_TABLE`].

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{CallbackEvent, CallbackSource};

/// Field present only in server-to-server notifications.
pub const NOTIFICATION_DISCRIMINATOR: &str = "iyziEventType";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationVerdict {
    Success,
    Failure,
    /// Challenge still in flight; nothing to reconcile yet.
    Interim,
}

/// Gateway notification statuses. Anything not listed is treated as a failure.
pub const NOTIFICATION_STATUS_TABLE: &[(&str, NotificationVerdict)] = &[
    ("SUCCESS", NotificationVerdict::Success),
    ("FAILURE", NotificationVerdict::Failure),
    ("FAILED", NotificationVerdict::Failure),
    ("ERROR", NotificationVerdict::Failure),
    ("CANCELLED", NotificationVerdict::Failure),
    ("INIT_THREEDS", NotificationVerdict::Interim),
    ("CALLBACK_THREEDS", NotificationVerdict::Interim),
    ("PENDING_CREDIT", NotificationVerdict::Interim),
];

pub fn notification_verdict(status: &str) -> NotificationVerdict {
    let status = status.trim();
    NOTIFICATION_STATUS_TABLE
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(status))
        .map(|(_, verdict)| *verdict)
        .unwrap_or(NotificationVerdict::Failure)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload<'a> {
    /// Query string or `application/x-www-form-urlencoded` body.
    Form(&'a [u8]),
    Json(&'a [u8]),
}

impl<'a> InboundPayload<'a> {
    /// Picks the payload to parse from a request's parts. A JSON content type
    /// wins; otherwise the body is read as form data, falling back to the
    /// query string when the body is empty.
    pub fn detect(content_type: Option<&str>, query: Option<&'a str>, body: &'a [u8]) -> Self {
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);

        if is_json {
            return InboundPayload::Json(body);
        }
        if body.is_empty() {
            return InboundPayload::Form(query.unwrap_or_default().as_bytes());
        }
        InboundPayload::Form(body)
    }
}

#[derive(Debug, Clone)]
pub struct InboundCallback<'a> {
    pub payload: InboundPayload<'a>,
    /// Signature supplied out of band, e.g. in a request header.
    pub signature_header: Option<&'a str>,
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Interim notification {status} for {conversation_id}")]
    Interim {
        conversation_id: String,
        status: String,
        raw_fields: Value,
    },
}

pub fn normalize(inbound: &InboundCallback<'_>) -> Result<CallbackEvent, NormalizeError> {
    let fields = match inbound.payload {
        InboundPayload::Form(bytes) => parse_form(bytes)?,
        InboundPayload::Json(bytes) => parse_json(bytes)?,
    };

    let mut event = if fields.contains_key(NOTIFICATION_DISCRIMINATOR) {
        from_notification(fields)?
    } else {
        from_redirect(fields)
    };

    if event.signature.is_none() {
        event.signature = inbound
            .signature_header
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    Ok(event)
}

fn parse_form(bytes: &[u8]) -> Result<Map<String, Value>, NormalizeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| NormalizeError::Malformed("form data is not valid UTF-8".to_string()))?;

    Ok(url::form_urlencoded::parse(text.as_bytes())
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect())
}

fn parse_json(bytes: &[u8]) -> Result<Map<String, Value>, NormalizeError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(NormalizeError::Malformed(
            "JSON body must be an object".to_string(),
        )),
        Err(e) => Err(NormalizeError::Malformed(format!("invalid JSON: {}", e))),
    }
}

fn from_redirect(fields: Map<String, Value>) -> CallbackEvent {
    CallbackEvent {
        conversation_id: text_field(&fields, "conversationId"),
        payment_id: text_field(&fields, "paymentId"),
        status: text_field(&fields, "status"),
        md_status: text_field(&fields, "mdStatus"),
        conversation_data: optional_field(&fields, "conversationData"),
        signature: optional_field(&fields, "signature"),
        source: CallbackSource::BrowserRedirect,
        raw_fields: Value::Object(fields),
    }
}

fn from_notification(fields: Map<String, Value>) -> Result<CallbackEvent, NormalizeError> {
    let conversation_id = text_field(&fields, "paymentConversationId");
    let gateway_status = text_field(&fields, "status");

    let (status, md_status) = match notification_verdict(&gateway_status) {
        NotificationVerdict::Success => ("success", "1"),
        NotificationVerdict::Failure => ("failure", "0"),
        NotificationVerdict::Interim => {
            return Err(NormalizeError::Interim {
                conversation_id,
                status: gateway_status,
                raw_fields: Value::Object(fields),
            })
        }
    };

    Ok(CallbackEvent {
        conversation_id,
        payment_id: text_field(&fields, "paymentId"),
        status: status.to_string(),
        md_status: md_status.to_string(),
        conversation_data: None,
        signature: optional_field(&fields, "signature"),
        source: CallbackSource::ServerNotification,
        raw_fields: Value::Object(fields),
    })
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn optional_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    Some(text_field(fields, key)).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(query: &str) -> InboundCallback<'_> {
        InboundCallback {
            payload: InboundPayload::Form(query.as_bytes()),
            signature_header: None,
        }
    }

    #[test]
    fn test_redirect_query_is_normalized() {
        let event = normalize(&form(
            "conversationId=conv-1&paymentId=pay-1&status=success&mdStatus=1&conversationData=abc&signature=dead",
        ))
        .unwrap();

        assert_eq!(event.conversation_id, "conv-1");
        assert_eq!(event.payment_id, "pay-1");
        assert_eq!(event.status, "success");
        assert_eq!(event.md_status, "1");
        assert_eq!(event.conversation_data.as_deref(), Some("abc"));
        assert_eq!(event.signature.as_deref(), Some("dead"));
        assert_eq!(event.source, CallbackSource::BrowserRedirect);
        assert_eq!(event.raw_fields["paymentId"], "pay-1");
    }

    #[test]
    fn test_notification_success_maps_to_redirect_vocabulary() {
        let body = json!({
            "iyziEventType": "THREE_DS_AUTH",
            "iyziEventTime": 1718000000000u64,
            "paymentConversationId": "conv-2",
            "paymentId": 42,
            "status": "SUCCESS"
        })
        .to_string();
        let event = normalize(&InboundCallback {
            payload: InboundPayload::Json(body.as_bytes()),
            signature_header: Some("abc123"),
        })
        .unwrap();

        assert_eq!(event.conversation_id, "conv-2");
        assert_eq!(event.payment_id, "42");
        assert_eq!(event.status, "success");
        assert_eq!(event.md_status, "1");
        assert_eq!(event.signature.as_deref(), Some("abc123"));
        assert_eq!(event.source, CallbackSource::ServerNotification);
        assert_eq!(event.raw_fields["iyziEventType"], "THREE_DS_AUTH");
    }

    #[test]
    fn test_notification_failure_and_unknown_status_fail_closed() {
        for status in ["FAILURE", "SOMETHING_NEW"] {
            let body = json!({
                "iyziEventType": "THREE_DS_AUTH",
                "paymentConversationId": "conv-3",
                "paymentId": "pay-3",
                "status": status
            })
            .to_string();
            let event = normalize(&InboundCallback {
                payload: InboundPayload::Json(body.as_bytes()),
                signature_header: None,
            })
            .unwrap();

            assert_eq!(event.status, "failure");
            assert_eq!(event.md_status, "0");
        }
    }

    #[test]
    fn test_interim_notification_is_reported() {
        let body = json!({
            "iyziEventType": "THREE_DS_AUTH",
            "paymentConversationId": "conv-4",
            "status": "INIT_THREEDS"
        })
        .to_string();
        let err = normalize(&InboundCallback {
            payload: InboundPayload::Json(body.as_bytes()),
            signature_header: None,
        })
        .unwrap_err();

        assert!(matches!(err, NormalizeError::Interim { ref conversation_id, .. } if conversation_id == "conv-4"));
    }

    #[test]
    fn test_json_without_discriminator_uses_redirect_keys() {
        let body = json!({
            "conversationId": "conv-5",
            "paymentId": "pay-5",
            "status": "failure",
            "mdStatus": 2
        })
        .to_string();
        let event = normalize(&InboundCallback {
            payload: InboundPayload::Json(body.as_bytes()),
            signature_header: None,
        })
        .unwrap();

        assert_eq!(event.md_status, "2");
        assert_eq!(event.source, CallbackSource::BrowserRedirect);
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = normalize(&InboundCallback {
            payload: InboundPayload::Json(b"{not json"),
            signature_header: None,
        })
        .unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed(_)));

        let err = normalize(&InboundCallback {
            payload: InboundPayload::Json(b"[1,2]"),
            signature_header: None,
        })
        .unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed(_)));
    }

    #[test]
    fn test_non_utf8_form_is_malformed() {
        let err = normalize(&InboundCallback {
            payload: InboundPayload::Form(&[0xff, 0xfe, 0x3d]),
            signature_header: None,
        })
        .unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed(_)));
    }

    #[test]
    fn test_detect_prefers_json_content_type_and_falls_back_to_query() {
        assert_eq!(
            InboundPayload::detect(Some("application/json; charset=utf-8"), None, b"{}"),
            InboundPayload::Json(b"{}")
        );
        assert_eq!(
            InboundPayload::detect(None, Some("a=1"), b""),
            InboundPayload::Form(b"a=1")
        );
        assert_eq!(
            InboundPayload::detect(
                Some("application/x-www-form-urlencoded"),
                Some("a=1"),
                b"b=2"
            ),
            InboundPayload::Form(b"b=2")
        );
    }
}
