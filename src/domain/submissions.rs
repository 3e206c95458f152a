//! Per-category validation of form submission payloads.

use serde_json::{Map, Value};

use super::{error::DomainError, types::SubmissionCategory, validation::validate_email};

pub const MESSAGE_MAX: usize = 5000;
pub const PAYLOAD_MAX_BYTES: usize = 16 * 1024;

/// Payload fields that submissions may be sorted by.
pub const SORTABLE_PAYLOAD_FIELDS: &[&str] = &["name", "email", "company", "country"];

/// Validate `payload` for `category` and return it with string fields trimmed.
pub fn validate_payload(category: SubmissionCategory, payload: &Value) -> Result<Value, DomainError> {
    let object = payload
        .as_object()
        .ok_or_else(|| DomainError::validation("Submission payload must be a JSON object"))?;

    let encoded_len = serde_json::to_vec(payload).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
    if encoded_len > PAYLOAD_MAX_BYTES {
        return Err(DomainError::validation("Submission payload is too large"));
    }

    let normalized = trim_strings(object);

    required_text(&normalized, "name", "Name")?;
    let email = required_text(&normalized, "email", "Email")?;
    validate_email(email)?;

    match category {
        SubmissionCategory::Contact => {
            let message = required_text(&normalized, "message", "Message")?;
            if message.chars().count() > MESSAGE_MAX {
                return Err(DomainError::validation(format!(
                    "Message must be at most {MESSAGE_MAX} characters"
                )));
            }
        }
        SubmissionCategory::RequestSample => {
            required_text(&normalized, "company", "Company")?;
            let has_report = matches!(normalized.get("report_id"), Some(Value::Number(_)))
                || matches!(normalized.get("report_slug"), Some(Value::String(slug)) if !slug.is_empty());
            if !has_report {
                return Err(DomainError::validation(
                    "A report reference (report_id or report_slug) is required",
                ));
            }
        }
    }

    Ok(Value::Object(normalized))
}

fn trim_strings(object: &Map<String, Value>) -> Map<String, Value> {
    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => Value::String(text.trim().to_string()),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn required_text<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    label: &str,
) -> Result<&'a str, DomainError> {
    match object.get(field) {
        Some(Value::String(text)) if !text.is_empty() => Ok(text.as_str()),
        _ => Err(DomainError::validation(format!("{label} is required"))),
    }
}
