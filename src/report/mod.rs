//! Plan execution report: the per-action status table a chaos run produces,
//! rendered both as JSON (for tooling) and as plain text (for the e-mail
//! body, per SPEC_FULL.md §6).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::action::Status;
use crate::plan::PlanStatus;

#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub id: u32,
    pub description: String,
    #[serde(with = "status_serde")]
    pub status: Status,
    pub duration_ms: u64,
    pub dependee_ids: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub plan_name: String,
    #[serde(with = "plan_status_serde")]
    pub status: PlanStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Excludes the synthetic SOURCE/SINK rows (SPEC_FULL.md §8 testable
    /// property: "report omits source/sink rows").
    pub actions: Vec<ActionReport>,
}

impl PlanReport {
    /// The textual rendering sent as both stdout output and the
    /// notification e-mail body.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Plan: {}\n", self.plan_name));
        out.push_str(&format!("Status: {}\n", self.status));
        out.push_str(&format!("Duration: {}ms\n", self.duration_ms));
        out.push_str("Actions:\n");
        for a in &self.actions {
            out.push_str(&format!(
                "  [{:>3}] {:<9} {:>6}ms  {}\n",
                a.id, a.status, a.duration_ms, a.description
            ));
        }
        out
    }
}

mod status_serde {
    use crate::action::Status;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(status: &Status, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&status.to_string())
    }
}

mod plan_status_serde {
    use crate::plan::PlanStatus;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(status: &PlanStatus, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn render_text_omits_nothing_it_was_given() {
        let report = PlanReport {
            plan_name: "smoke".to_string(),
            status: PlanStatus::Succeeded,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 42,
            actions: vec![ActionReport {
                id: 0,
                description: "wait 5ms".to_string(),
                status: Status::Succeeded,
                duration_ms: 5,
                dependee_ids: vec![],
            }],
        };
        let text = report.render_text();
        assert!(text.contains("smoke"));
        assert!(text.contains("SUCCEEDED"));
        assert!(text.contains("wait 5ms"));
    }
}
