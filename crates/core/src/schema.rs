//! Channel schema rules.
//!
//! A channel declares the attribute names its notifications may carry. The
//! publish path rejects any attribute outside that list; the channel create
//! and update paths check the declaration itself.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoreError, FieldError};
use crate::types::Attributes;

/// Maximum length of a channel name.
pub const MAX_CHANNEL_NAME_LEN: usize = 100;

/// Maximum number of filter attributes a channel may declare.
pub const MAX_CHANNEL_FILTERS: usize = 64;

/// Maximum length of a single attribute name.
pub const MAX_ATTRIBUTE_NAME_LEN: usize = 100;

static CHANNEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_.-]*$").expect("static regex is valid"));

static ATTRIBUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("static regex is valid"));

/// Validate a channel name: lowercase, starts with a letter or digit, may
/// contain `_`, `.` and `-`.
pub fn validate_channel_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation("Channel name must not be empty".into()));
    }
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Channel name must not exceed {MAX_CHANNEL_NAME_LEN} characters"
        )));
    }
    if !CHANNEL_NAME.is_match(name) {
        return Err(CoreError::Validation(
            "Channel name may only contain lowercase letters, digits, '_', '.' or '-'".into(),
        ));
    }
    Ok(())
}

/// Validate the declared filter attribute names of a channel.
///
/// Rules:
/// - At most [`MAX_CHANNEL_FILTERS`] names.
/// - Each name is a valid identifier of at most [`MAX_ATTRIBUTE_NAME_LEN`].
/// - No duplicates.
pub fn validate_filter_names(names: &[String]) -> Result<(), CoreError> {
    if names.len() > MAX_CHANNEL_FILTERS {
        return Err(CoreError::Validation(format!(
            "A channel may declare at most {MAX_CHANNEL_FILTERS} filter attributes"
        )));
    }

    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();
    for (i, name) in names.iter().enumerate() {
        if name.len() > MAX_ATTRIBUTE_NAME_LEN || !ATTRIBUTE_NAME.is_match(name) {
            errors.push(FieldError::new(
                format!("filters.{i}"),
                "invalid_name",
                format!("'{name}' is not a valid attribute name"),
            ));
        } else if !seen.insert(name.as_str()) {
            errors.push(FieldError::new(
                format!("filters.{i}"),
                "duplicate",
                format!("'{name}' is declared more than once"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::InvalidParams(errors))
    }
}

/// Return the attribute keys that are not declared on the channel, sorted.
///
/// An empty result means the attributes conform to the schema. A
/// notification may carry any subset of the declared names.
pub fn undeclared_attributes(declared: &[String], attrs: &Attributes) -> Vec<String> {
    attrs
        .keys()
        .filter(|key| !declared.iter().any(|d| d == *key))
        .cloned()
        .collect()
}

/// Build the field errors reported for undeclared attribute keys.
pub fn undeclared_attribute_errors(channel: &str, keys: &[String]) -> Vec<FieldError> {
    keys.iter()
        .map(|key| {
            FieldError::new(
                format!("attrs.{key}"),
                "undeclared_attribute",
                format!("Attribute '{key}' is not declared on channel '{channel}'"),
            )
        })
        .collect()
}

/// Channel filter lists may only grow: every previously declared name must
/// still be present, in any position.
pub fn ensure_filters_extended(current: &[String], proposed: &[String]) -> Result<(), CoreError> {
    let removed: Vec<&str> = current
        .iter()
        .filter(|name| !proposed.contains(*name))
        .map(String::as_str)
        .collect();

    if removed.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Declared filters cannot be removed: {}",
            removed.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn channel_name_rules() {
        assert!(validate_channel_name("orders").is_ok());
        assert!(validate_channel_name("zaken.v2-beta_1").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("Orders").is_err());
        assert!(validate_channel_name("-orders").is_err());
        assert!(validate_channel_name("with space").is_err());
        assert!(validate_channel_name(&"a".repeat(MAX_CHANNEL_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn filter_names_reject_duplicates_and_bad_names() {
        assert!(validate_filter_names(&names(&["kind", "region"])).is_ok());

        let err = validate_filter_names(&names(&["kind", "kind", "9bad"])).unwrap_err();
        assert_matches!(err, CoreError::InvalidParams(fields) => {
            assert_eq!(fields.len(), 2);
            assert_eq!(fields[0].name, "filters.1");
            assert_eq!(fields[0].code, "duplicate");
            assert_eq!(fields[1].name, "filters.2");
            assert_eq!(fields[1].code, "invalid_name");
        });
    }

    #[test]
    fn undeclared_attributes_are_sorted() {
        let declared = names(&["a", "b"]);
        let attrs: Attributes = [("z", "1"), ("a", "1"), ("c", "1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(undeclared_attributes(&declared, &attrs), names(&["c", "z"]));
    }

    #[test]
    fn subset_of_schema_is_accepted() {
        let declared = names(&["a", "b", "c"]);
        let attrs: Attributes = [("b".to_string(), "x".to_string())].into_iter().collect();
        assert!(undeclared_attributes(&declared, &attrs).is_empty());
        assert!(undeclared_attributes(&declared, &Attributes::new()).is_empty());
    }

    #[test]
    fn filters_may_only_be_extended() {
        let current = names(&["a", "b"]);
        assert!(ensure_filters_extended(&current, &names(&["b", "a", "c"])).is_ok());
        assert!(ensure_filters_extended(&current, &names(&["a"])).is_err());
    }
}
