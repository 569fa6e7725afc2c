use serde::Serialize;

/// A single field-level validation failure.
///
/// Rendered in API error bodies under `invalid_params` so clients can map
/// each problem back to the offending input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `attrs.color`.
    pub name: String,
    /// Machine-readable error code, e.g. `undeclared_attribute`.
    pub code: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl FieldError {
    pub fn new(name: impl Into<String>, code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Validation failed for {} field(s)", .0.len())]
    InvalidParams(Vec<FieldError>),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let reason = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{field} is invalid ({})", e.code));
                    FieldError::new(field.to_string(), e.code.to_string(), reason)
                })
            })
            .collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        CoreError::InvalidParams(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_params_display_counts_fields() {
        let err = CoreError::InvalidParams(vec![
            FieldError::new("attrs.a", "undeclared_attribute", "not declared"),
            FieldError::new("attrs.b", "undeclared_attribute", "not declared"),
        ]);
        assert_eq!(err.to_string(), "Validation failed for 2 field(s)");
    }

    #[test]
    fn not_found_display_names_entity() {
        let err = CoreError::NotFound {
            entity: "Channel",
            id: "orders".into(),
        };
        assert_eq!(err.to_string(), "Entity not found: Channel with id orders");
    }
}
