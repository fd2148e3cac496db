use serde::de::DeserializeOwned;
use serde_json::Value;

/// PATCH field state: absent, explicitly `null`, or a value.
#[derive(Debug, PartialEq)]
pub enum Patch<T> {
    Omitted,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    /// `None` when omitted, `Some(None)` when cleared.
    pub fn into_change(self) -> Option<Option<T>> {
        match self {
            Patch::Omitted => None,
            Patch::Null => Some(None),
            Patch::Value(value) => Some(Some(value)),
        }
    }
}

pub fn classify<T: DeserializeOwned>(body: &Value, field: &str) -> Result<Patch<T>, String> {
    match body.get(field) {
        None => Ok(Patch::Omitted),
        Some(Value::Null) => Ok(Patch::Null),
        Some(other) => serde_json::from_value(other.clone())
            .map(Patch::Value)
            .map_err(|err| format!("invalid value for `{field}`: {err}")),
    }
}

/// Trimmed string field that may not be null or blank.
pub fn required_text(body: &Value, field: &str) -> Result<Option<String>, String> {
    match classify::<String>(body, field)? {
        Patch::Omitted => Ok(None),
        Patch::Null => Err(format!("{field} cannot be null")),
        Patch::Value(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(format!("{field} must not be empty"))
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
    }
}

/// Trimmed nullable string field; blank strings clear the value.
pub fn optional_text(body: &Value, field: &str) -> Result<Patch<String>, String> {
    Ok(match classify::<String>(body, field)? {
        Patch::Value(value) if value.trim().is_empty() => Patch::Null,
        Patch::Value(value) => Patch::Value(value.trim().to_string()),
        other => other,
    })
}
