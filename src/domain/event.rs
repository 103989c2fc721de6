use serde::Serialize;

/// Canonical form of an inbound callback, whichever shape it arrived in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackEvent {
    pub conversation_id: String,
    pub payment_id: String,
    pub status: String,
    pub md_status: String,
    pub conversation_data: Option<String>,
    pub signature: Option<String>,
    pub source: CallbackSource,
    /// Original payload, kept verbatim for the audit log.
    pub raw_fields: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackSource {
    BrowserRedirect,
    ServerNotification,
}

impl CallbackSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackSource::BrowserRedirect => "browser_redirect",
            CallbackSource::ServerNotification => "server_notification",
        }
    }
}
