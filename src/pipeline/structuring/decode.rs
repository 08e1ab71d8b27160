use serde::de::DeserializeOwned;
use serde_json::Value;

use super::LlmError;

/// Decode a provider value into `T` without coercion.
///
/// Unknown labels, missing fields and extra fields (for types declared
/// with `deny_unknown_fields`) are all reported as a schema violation.
pub fn decode<T: DeserializeOwned>(schema_name: &str, value: Value) -> Result<T, LlmError> {
    serde_json::from_value(value).map_err(|e| LlmError::SchemaViolation {
        schema: schema_name.to_string(),
        detail: e.to_string(),
    })
}

/// Range check for bounded numeric fields, applied after decoding.
pub fn check_unit_interval(schema_name: &str, field: &str, value: f64) -> Result<(), LlmError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        return Ok(());
    }
    Err(LlmError::SchemaViolation {
        schema: schema_name.to_string(),
        detail: format!("{field} = {value} is outside [0, 1]"),
    })
}
