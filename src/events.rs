//! Fan-out event payloads pushed to connected clients.
//!
//! Tagged the way a server-sent-events feed usually is, so a client
//! only needs `type` to decide how to deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Dialog, Issue, Message, QueueStat};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "issue.created")]
    IssueCreated { issue: Issue, requires_approval: bool },
    #[serde(rename = "issue.updated")]
    IssueUpdated { issue: Issue },
    #[serde(rename = "dialog.requested")]
    DialogOpened { dialog: Dialog },
    #[serde(rename = "dialog.responded")]
    DialogResolved { dialog: Dialog },
    #[serde(rename = "message.received")]
    MessagePosted { message: Message },
    #[serde(rename = "agent.queue")]
    AgentQueueSnapshot { stats: Vec<QueueStat>, at: DateTime<Utc> },
    #[serde(rename = "agent.status")]
    AgentStatusSnapshot { stats: Vec<QueueStat>, at: DateTime<Utc> },
}

impl ServerEvent {
    pub fn project_id(&self) -> &str {
        match self {
            ServerEvent::IssueCreated { issue, .. } | ServerEvent::IssueUpdated { issue } => &issue.project_id,
            ServerEvent::DialogOpened { dialog } | ServerEvent::DialogResolved { dialog } => &dialog.project_id,
            ServerEvent::MessagePosted { message } => &message.project_id,
            ServerEvent::AgentQueueSnapshot { stats, .. } | ServerEvent::AgentStatusSnapshot { stats, .. } => {
                stats.first().map(|s| s.project_id.as_str()).unwrap_or("")
            }
        }
    }
}
