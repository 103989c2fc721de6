use std::fmt;

use crate::domain::CallbackEvent;

pub const CONVERSATION_ID_MAX_LEN: usize = 255;
pub const PAYMENT_ID_MAX_LEN: usize = 255;
pub const CONVERSATION_DATA_MAX_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Fields every callback must carry before anything else happens.
/// Returns the names of all missing fields, not just the first.
pub fn missing_required_fields(event: &CallbackEvent) -> Vec<&'static str> {
    [
        ("paymentId", event.payment_id.as_str()),
        ("conversationId", event.conversation_id.as_str()),
        ("mdStatus", event.md_status.as_str()),
    ]
    .into_iter()
    .filter(|(field, value)| validate_required(field, value).is_err())
    .map(|(field, _)| field)
    .collect()
}

pub fn validate_field_lengths(event: &CallbackEvent) -> ValidationResult {
    validate_max_len("conversationId", &event.conversation_id, CONVERSATION_ID_MAX_LEN)?;
    validate_max_len("paymentId", &event.payment_id, PAYMENT_ID_MAX_LEN)?;
    if let Some(data) = &event.conversation_data {
        validate_max_len("conversationData", data, CONVERSATION_DATA_MAX_LEN)?;
    }
    Ok(())
}
