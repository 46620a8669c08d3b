//! Kubernetes-standard status condition helpers
//!
//! Provides constants and builder functions for managing the APIManager
//! status conditions following the Kubernetes API conventions.

use crate::crd::APIManagerCondition;
use chrono::Utc;

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

// APIManager condition types
pub const APIMANAGER_CONDITION_AVAILABLE: &str = "Available";

/// Build a condition with the current timestamp.
pub fn build_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> ConditionFields {
    ConditionFields {
        condition_type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Generic condition fields, convertible to and from the CRD condition type.
#[derive(Debug, Clone)]
pub struct ConditionFields {
    pub condition_type: String,
    pub status: String,
    pub last_transition_time: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ConditionFields {
    pub fn into_apimanager_condition(self) -> APIManagerCondition {
        APIManagerCondition {
            r#type: self.condition_type,
            status: self.status,
            last_transition_time: self.last_transition_time,
            reason: self.reason,
            message: self.message,
        }
    }
}

impl From<APIManagerCondition> for ConditionFields {
    fn from(c: APIManagerCondition) -> Self {
        ConditionFields {
            condition_type: c.r#type,
            status: c.status,
            last_transition_time: c.last_transition_time,
            reason: c.reason,
            message: c.message,
        }
    }
}

/// Set or update a condition in a list, preserving lastTransitionTime when status hasn't changed.
pub fn set_condition(conditions: &mut Vec<ConditionFields>, new: ConditionFields) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    {
        if existing.status != new.status {
            *existing = new;
        } else {
            existing.reason = new.reason;
            existing.message = new.message;
        }
    } else {
        conditions.push(new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_condition() {
        let cond = build_condition(
            APIMANAGER_CONDITION_AVAILABLE,
            CONDITION_TRUE,
            "DeploymentsReady",
            "All deployments ready",
        );
        assert_eq!(cond.condition_type, "Available");
        assert_eq!(cond.status, "True");
        assert!(cond.last_transition_time.is_some());
        assert_eq!(cond.reason.as_deref(), Some("DeploymentsReady"));
    }

    #[test]
    fn test_set_condition_adds_new() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, build_condition("Available", CONDITION_TRUE, "OK", "ok"));
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_set_condition_preserves_transition_time_on_same_status() {
        let mut conditions = vec![ConditionFields {
            condition_type: "Available".to_string(),
            status: CONDITION_TRUE.to_string(),
            last_transition_time: Some("2024-01-01T00:00:00Z".to_string()),
            reason: Some("First".to_string()),
            message: Some("first".to_string()),
        }];

        set_condition(&mut conditions, build_condition("Available", CONDITION_TRUE, "Second", "second"));

        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(conditions[0].reason.as_deref(), Some("Second"));
    }

    #[test]
    fn test_set_condition_updates_transition_time_on_status_change() {
        let mut conditions = vec![ConditionFields {
            condition_type: "Available".to_string(),
            status: CONDITION_FALSE.to_string(),
            last_transition_time: Some("2024-01-01T00:00:00Z".to_string()),
            reason: Some("Starting".to_string()),
            message: Some("starting".to_string()),
        }];

        set_condition(&mut conditions, build_condition("Available", CONDITION_TRUE, "Ready", "ready"));

        assert_eq!(conditions.len(), 1);
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_condition_conversion_is_lossless() {
        let cond = build_condition("Available", CONDITION_TRUE, "OK", "ok");
        let crd = cond.clone().into_apimanager_condition();
        assert_eq!(crd.r#type, "Available");
        let back = ConditionFields::from(crd);
        assert_eq!(back.last_transition_time, cond.last_transition_time);
        assert_eq!(back.message, cond.message);
    }
}
