//! Sensitive-field redaction for audit payloads

use serde_json::Value;

/// Map keys whose values are redacted before persistence (case-insensitive)
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "token",
    "access_token",
    "refresh_token",
    "secret",
    "api_key",
    "private_key",
    "ssn",
    "social_security_number",
    "credit_card",
    "card_number",
    "cvv",
    "authorization",
];

const REDACTED: &str = "[REDACTED]";

fn is_sensitive(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_FIELDS.contains(&lowered.as_str())
}

/// Replace the values of sensitive keys with `[REDACTED]`, recursing through
/// nested objects and arrays. Idempotent.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if is_sensitive(&key) {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, sanitize_value(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_redaction() {
        let sanitized = sanitize_value(json!({"username": "u", "password": "secret"}));
        assert_eq!(sanitized["username"], "u");
        assert_eq!(sanitized["password"], REDACTED);
    }

    #[test]
    fn test_case_insensitive_keys() {
        let sanitized = sanitize_value(json!({"Password": "x", "API_KEY": "y", "Token": "z"}));
        assert_eq!(sanitized["Password"], REDACTED);
        assert_eq!(sanitized["API_KEY"], REDACTED);
        assert_eq!(sanitized["Token"], REDACTED);
    }

    #[test]
    fn test_nested_objects_and_lists() {
        let sanitized = sanitize_value(json!({
            "profile": {"ssn": "123-45-6789", "name": "a"},
            "cards": [
                {"card_number": "4111", "label": "work"},
                {"cvv": "999"}
            ]
        }));

        assert_eq!(sanitized["profile"]["ssn"], REDACTED);
        assert_eq!(sanitized["profile"]["name"], "a");
        assert_eq!(sanitized["cards"][0]["card_number"], REDACTED);
        assert_eq!(sanitized["cards"][0]["label"], "work");
        assert_eq!(sanitized["cards"][1]["cvv"], REDACTED);
    }

    #[test]
    fn test_non_sensitive_values_untouched() {
        let original = json!({"count": 3, "ok": true, "note": null, "items": [1, "two"]});
        assert_eq!(sanitize_value(original.clone()), original);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let original = json!({
            "password": "secret",
            "nested": {"token": "t", "list": [{"secret": "s"}]}
        });
        let once = sanitize_value(original);
        let twice = sanitize_value(once.clone());
        assert_eq!(once, twice);
    }
}
