//! Local access-request ticket draft for the ITSM profile.
//!
//! Extraction is keyword-based and intentionally shallow. The placeholders
//! (`requested_for`, `business_justification`, `approvals_required`,
//! `recommended_actions`) are fixed strings, not derived from the message.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const UNKNOWN: &str = "unknown";

/// Checked in order; a later match overwrites an earlier one.
const RESOURCES: [&str; 3] = ["snowflake", "datadog", "github"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDraft {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub requested_for: String,
    pub resource: String,
    pub access_level: String,
    pub duration: String,
    pub business_justification: String,
    pub approvals_required: String,
    pub risk_level: String,
    pub status: String,
    pub created_at: String,
    pub recommended_actions: String,
}

impl TicketDraft {
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Build a draft from one user message. Only `id` and `created_at` vary between
/// calls with the same input.
pub fn infer_access_request(message: &str) -> TicketDraft {
    let lower = message.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    let mut resource = RESOURCES
        .iter()
        .rev()
        .find(|&&r| has(r))
        .copied()
        .unwrap_or(UNKNOWN)
        .to_string();
    if has("prod") || has("production") {
        resource.push_str("_prod");
    }

    let access_level = if has("admin") {
        "admin"
    } else if has("read") {
        "read"
    } else if has("write") {
        "write"
    } else {
        UNKNOWN
    };

    // Independent substring checks: "7" and "day" anywhere both count.
    let duration = if has("24") && has("hour") {
        "24h"
    } else if has("7") && has("day") {
        "7d"
    } else {
        UNKNOWN
    };

    let risk_level = if has("prod") || has("admin") {
        "high"
    } else {
        "medium"
    };

    TicketDraft {
        id: ticket_id(),
        kind: "access_request".into(),
        requested_for: "self".into(),
        resource,
        access_level: access_level.into(),
        duration: duration.into(),
        business_justification: "provided_in_chat".into(),
        approvals_required: "manager + system_owner".into(),
        risk_level: risk_level.into(),
        status: "draft".into(),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        recommended_actions:
            "collect justification; confirm duration; route for approval; provision access; log audit"
                .into(),
    }
}

fn ticket_id() -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("AR-{}", uuid[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn datadog_prod_admin_for_seven_days() {
        let d = infer_access_request("I need admin access to Datadog prod for 7 days");
        assert_eq!(d.resource, "datadog_prod");
        assert_eq!(d.access_level, "admin");
        assert_eq!(d.duration, "7d");
        assert_eq!(d.risk_level, "high");
    }

    #[test]
    fn github_read_for_a_day_window() {
        let d = infer_access_request("need read access to github for 24 hour window");
        assert_eq!(d.resource, "github");
        assert_eq!(d.access_level, "read");
        assert_eq!(d.duration, "24h");
        assert_eq!(d.risk_level, "medium");
    }

    #[test]
    fn later_vocabulary_entries_win() {
        let d = infer_access_request("move dashboards from Snowflake to GitHub");
        assert_eq!(d.resource, "github");
        let d = infer_access_request("snowflake and datadog please");
        assert_eq!(d.resource, "datadog");
    }

    #[test]
    fn prod_marker_applies_to_unknown_resource() {
        let d = infer_access_request("write access on the Production cluster");
        assert_eq!(d.resource, "unknown_prod");
        assert_eq!(d.access_level, "write");
        assert_eq!(d.risk_level, "high");
    }

    #[test]
    fn access_level_priority_is_admin_read_write() {
        assert_eq!(infer_access_request("read and write, maybe admin").access_level, "admin");
        assert_eq!(infer_access_request("read and write").access_level, "read");
        assert_eq!(infer_access_request("hello").access_level, "unknown");
    }

    #[test]
    fn duration_matches_loose_substrings() {
        // "7" and "day" are checked independently of each other.
        let d = infer_access_request("a 7-year-old system, need day access");
        assert_eq!(d.duration, "7d");
        // Numbers alone are not enough.
        assert_eq!(infer_access_request("for 3 days").duration, "unknown");
        assert_eq!(infer_access_request("for 24 minutes").duration, "unknown");
    }

    #[test]
    fn no_low_risk_tier() {
        let d = infer_access_request("read access to snowflake");
        assert_eq!(d.risk_level, "medium");
    }

    #[test]
    fn constant_fields_and_identity() {
        let d = infer_access_request("anything");
        assert_eq!(d.kind, "access_request");
        assert_eq!(d.requested_for, "self");
        assert_eq!(d.status, "draft");
        assert_eq!(d.business_justification, "provided_in_chat");
        assert_eq!(d.approvals_required, "manager + system_owner");
        assert!(d.id.starts_with("AR-"));
        assert_eq!(d.id.len(), 11);
        assert_eq!(d.id, d.id.to_uppercase());
        assert!(DateTime::parse_from_rfc3339(&d.created_at).is_ok());
        assert!(d.created_at.ends_with('Z'));
        assert_ne!(d.id, infer_access_request("anything").id);
    }

    #[test]
    fn json_uses_wire_field_names() {
        let json = infer_access_request("github").to_pretty_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "access_request");
        assert_eq!(v["resource"], "github");
        assert!(v.get("kind").is_none());
        assert!(json.contains("\n  \"id\""));
    }
}
