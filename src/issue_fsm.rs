//! Issue lifecycle transitions.
//!
//! The Store is the system of record, so the authoritative logic here is
//! a pure transition function over an `Issue` value rather than an
//! in-memory actor — unit-tested directly against the transition table.

use chrono::{DateTime, Utc};

use crate::detector;
use crate::models::{Issue, IssueStatus};

/// Applies the side effects of a legal status transition in place.
/// Idempotent with respect to timestamps: repeated calls with the same
/// `to` never clear an already-set `started_at`/`completed_at`.
pub fn transition(issue: &mut Issue, to: IssueStatus, now: DateTime<Utc>) {
    let from = issue.status;

    match to {
        IssueStatus::Todo => {
            if issue.queued_agent_id.is_none() {
                issue.queued_agent_id = issue
                    .assigned_agent_id
                    .clone()
                    .or_else(|| detect_from_body(issue).map(|s| s.to_string()));
            }
            if from != IssueStatus::Todo {
                issue.queued_at = Some(now);
            }
        }
        IssueStatus::InProgress => {
            issue.started_at = Some(issue.started_at.unwrap_or(now));
            issue.queued_agent_id = None;
        }
        IssueStatus::Done => {
            issue.completed_at = Some(issue.completed_at.unwrap_or(now));
            issue.queued_agent_id = None;
        }
        IssueStatus::Review | IssueStatus::Proposed => {
            issue.queued_agent_id = None;
        }
    }

    issue.status = to;
}

fn detect_from_body(issue: &Issue) -> Option<&'static str> {
    let combined = format!("{} {}", issue.title, issue.description);
    detector::detect(&combined)
}
