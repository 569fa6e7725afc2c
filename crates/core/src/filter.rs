//! Subscription filter matching.
//!
//! A subscription carries an ordered list of filter groups. Each group is a
//! conjunction of `attribute == value` constraints; the groups themselves are
//! alternatives. A subscription without any groups receives every
//! notification published on its channel.
//!
//! Matching is pure: the same inputs always produce the same answer, which
//! is what makes re-running a dispatch job after a crash safe.

use std::collections::BTreeMap;

use crate::error::{CoreError, FieldError};
use crate::types::Attributes;

/// Attribute name -> expected value. All pairs must match.
pub type FilterGroup = BTreeMap<String, String>;

/// Does a single filter group accept the given attributes?
///
/// Every key in the group must be present in `attrs` with an exactly equal
/// value. Keys in `attrs` that the group does not mention are ignored. An
/// empty group accepts everything.
pub fn group_matches(group: &FilterGroup, attrs: &Attributes) -> bool {
    group
        .iter()
        .all(|(key, expected)| attrs.get(key).is_some_and(|actual| actual == expected))
}

/// Does a list of filter groups accept the given attributes?
///
/// No groups at all means "match everything"; otherwise at least one group
/// must match.
pub fn matches(groups: &[FilterGroup], attrs: &Attributes) -> bool {
    groups.is_empty() || groups.iter().any(|group| group_matches(group, attrs))
}

/// Check that every key referenced by `groups` is declared on the channel.
///
/// Offending keys are reported as `filters.<group index>.<key>`, in group
/// order then key order.
pub fn validate_filter_groups(declared: &[String], groups: &[FilterGroup]) -> Result<(), CoreError> {
    let errors: Vec<FieldError> = groups
        .iter()
        .enumerate()
        .flat_map(|(index, group)| {
            group
                .keys()
                .filter(move |key| !declared.iter().any(|d| d == *key))
                .map(move |key| {
                    FieldError::new(
                        format!("filters.{index}.{key}"),
                        "undeclared_filter",
                        format!("Attribute '{key}' is not declared on the channel"),
                    )
                })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::InvalidParams(errors))
    }
}
