//! Audit trail record describing one attempted remote operation.
//!
//! A record is written after the fact and never participates in the
//! operation's own success or failure. Exactly one of `result` and `error` is
//! set on a well-formed record; stores do not enforce this.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length (in characters) of the `operation` column.
pub const OPERATION_MAX_LEN: usize = 100;

/// One persisted outcome of an attempted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Synthetic identifier assigned by the store. `None` until persisted.
    pub id: Option<i64>,
    /// User on whose behalf the operation ran, if known.
    pub user_id: Option<i64>,
    /// Operation tag, bounded to [`OPERATION_MAX_LEN`] characters.
    pub operation: String,
    /// Free-text description of what the operation targeted.
    pub target_value: String,
    /// Success message. `None` for failures.
    pub result: Option<String>,
    /// Failure message. `None` for successes.
    pub error: Option<String>,
    /// Construction time, truncated to microseconds to match storage precision.
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Builds a record for a successful operation.
    #[must_use]
    pub fn success(
        user_id: Option<i64>,
        operation: &str,
        target_value: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self::build(user_id, operation, target_value.into(), Some(result.into()), None)
    }

    /// Builds a record for a failed operation.
    #[must_use]
    pub fn failure(
        user_id: Option<i64>,
        operation: &str,
        target_value: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::build(user_id, operation, target_value.into(), None, Some(error.into()))
    }

    fn build(
        user_id: Option<i64>,
        operation: &str,
        target_value: String,
        result: Option<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            id: None,
            user_id,
            operation: bound_operation(operation),
            target_value,
            result,
            error,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Returns a copy carrying the store-assigned identifier.
    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// `true` if the record documents a successful operation.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_some() && self.error.is_none()
    }

    /// `true` if exactly one of `result` and `error` is set.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.result.is_some() != self.error.is_some()
    }
}

/// Truncates an operation tag to [`OPERATION_MAX_LEN`] characters.
fn bound_operation(operation: &str) -> String {
    match operation.char_indices().nth(OPERATION_MAX_LEN) {
        Some((cut, _)) => operation[..cut].to_string(),
        None => operation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn success_record_has_result_only() {
        let record = AuditRecord::success(None, "updateAppsTop", "all spreadsheets", "done");
        assert!(record.id.is_none());
        assert!(record.is_success());
        assert!(record.is_well_formed());
        assert_eq!(record.result.as_deref(), Some("done"));
        assert!(record.error.is_none());
    }

    #[test]
    fn failure_record_has_error_only() {
        let record = AuditRecord::failure(Some(7), "updateAppsTop", "all spreadsheets", "boom");
        assert!(!record.is_success());
        assert!(record.is_well_formed());
        assert_eq!(record.user_id, Some(7));
        assert!(record.result.is_none());
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn created_at_has_microsecond_precision() {
        let record = AuditRecord::success(None, "op", "t", "r");
        assert_eq!(record.created_at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn with_id_assigns_identifier() {
        let record = AuditRecord::success(None, "op", "t", "r").with_id(42);
        assert_eq!(record.id, Some(42));
    }

    #[test]
    fn hand_built_record_with_both_fields_is_not_well_formed() {
        let mut record = AuditRecord::success(None, "op", "t", "r");
        record.error = Some("also failed".to_string());
        assert!(!record.is_well_formed());
    }

    proptest! {
        #[test]
        fn operation_never_exceeds_bound(tag in "\\PC{0,250}") {
            let record = AuditRecord::failure(None, &tag, "t", "e");
            prop_assert!(record.operation.chars().count() <= OPERATION_MAX_LEN);
            prop_assert!(tag.starts_with(&record.operation));
        }
    }
}
