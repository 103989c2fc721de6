use serde_json::Value;

/// Sanitizes sensitive fields in JSON payloads for logging
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "signature"
            | "conversationdata"
            | "token"
            | "cardnumber"
            | "cvc"
            | "password"
            | "secret"
            | "api_key"
            | "apikey"
            | "authorization"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > 8 => {
            let chars: Vec<char> = s.chars().collect();
            let visible: String = chars[..4].iter().collect();
            let end: String = chars[chars.len() - 4..].iter().collect();
            Value::String(format!("{}****{}", visible, end))
        }
        _ => Value::String("****".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_signature() {
        let input = json!({
            "signature": "0123456789abcdef0123456789abcdef",
            "mdStatus": "1"
        });

        let sanitized = sanitize_json(&input);
        let signature = sanitized["signature"].as_str().unwrap();

        assert_eq!(signature, "0123****cdef");
        assert_eq!(sanitized["mdStatus"], "1");
    }

    #[test]
    fn test_sanitize_nested() {
        let input = json!({
            "fields": {
                "conversationData": "short",
                "paymentId": "pay-1"
            }
        });

        let sanitized = sanitize_json(&input);
        assert_eq!(sanitized["fields"]["conversationData"], "****");
        assert_eq!(sanitized["fields"]["paymentId"], "pay-1");
    }

    #[test]
    fn test_sanitize_multibyte_does_not_panic() {
        let input = json!({ "token": "ğüşiöçĞÜŞİÖÇ" });
        let sanitized = sanitize_json(&input);
        assert_eq!(sanitized["token"], "ğüşi****ŞİÖÇ");
    }
}
