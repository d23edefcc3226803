//! Transport-agnostic entry points for client-originated requests.
//! Whatever sits on the wire — WebSocket, HTTP, a test harness — calls
//! through here; none of it depends on a transport.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::detector;
use crate::errors::{DialogError, StoreError};
use crate::events::ServerEvent;
use crate::hub::Hub;
use crate::models::{CreatedByType, Dialog, DialogStatus, Issue, Message, MessageType, Priority, Project, QueueStat, SenderType, WorkspaceSettings};
use crate::runner::AgentRunner;
use crate::store::Store;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Dialog(#[from] DialogError),
}

pub struct RequestRouter {
    store: Arc<dyn Store>,
    hub: Hub,
    runner: Arc<AgentRunner>,
}

impl RequestRouter {
    pub fn new(store: Arc<dyn Store>, hub: Hub, runner: Arc<AgentRunner>) -> Self {
        Self { store, hub, runner }
    }

    pub async fn create_project(&self, name: &str, workspace_path: &str) -> Result<Project, RouterError> {
        Ok(self.store.create_project(name, workspace_path).await?)
    }

    pub async fn update_workspace_settings(&self, project_id: &str, settings: &WorkspaceSettings) -> Result<(), RouterError> {
        Ok(self.store.update_workspace_settings(project_id, settings).await?)
    }

    pub async fn create_issue(
        &self,
        project_id: &str,
        title: &str,
        description: &str,
        priority: Priority,
        created_by: &str,
        assignee: Option<&str>,
    ) -> Result<Issue, RouterError> {
        let resolved_assignee = assignee.map(str::to_string).or_else(|| detector::detect(&format!("{title} {description}")).map(str::to_string));

        let issue = self
            .store
            .create_issue(project_id, title, description, priority, created_by, CreatedByType::User, resolved_assignee.as_deref())
            .await?;
        let issue = self.store.enqueue_issue(&issue.id, resolved_assignee.as_deref()).await?;

        self.hub.publish(ServerEvent::IssueCreated { issue: issue.clone(), requires_approval: false }).await;
        Ok(issue)
    }

    /// Posts a user chat message. If the text routes to an agent via
    /// `detector::detect`, this also opens a new issue for that agent —
    /// the same routing the dispatcher otherwise leaves to `@issue`
    /// blocks — and runs that agent inline for a conversational reply,
    /// with no issue attached to the run.
    pub async fn submit_chat_message(&self, project_id: &str, sender_id: &str, content: &str) -> Result<Message, RouterError> {
        let message = self
            .store
            .create_message(project_id, sender_id, SenderType::User, None, content, MessageType::Chat, None)
            .await?;
        self.hub.publish(ServerEvent::MessagePosted { message: message.clone() }).await;

        if let Some(agent_id) = detector::detect(content) {
            let title = first_sentence(content);
            let issue = self
                .store
                .create_issue(project_id, &title, content, Priority::Medium, sender_id, CreatedByType::User, Some(agent_id))
                .await?;
            let issue = self.store.enqueue_issue(&issue.id, Some(agent_id)).await?;
            self.hub.publish(ServerEvent::IssueCreated { issue, requires_approval: false }).await;

            let project = self.store.get_project(project_id).await?;
            if let Err(e) = self.runner.run(&project, agent_id, None, content).await {
                warn!(error = %e, "inline agent reply failed");
            }
        }

        Ok(message)
    }

    /// Resolves a dialog following the blank/mismatch fallback chain: a
    /// blank selection falls back to the default option, then the
    /// first listed option; a non-blank selection is matched
    /// case-insensitively and trimmed, falling back to the default
    /// option on a mismatch. Either fallback fails only when no default
    /// option is set. Persists a system chat message describing the
    /// resolution.
    pub async fn resolve_dialog(&self, dialog_id: &str, selected_option: &str, responded_by: &str) -> Result<Dialog, RouterError> {
        let dialog = self.store.get_dialog(dialog_id).await?;
        if dialog.status == DialogStatus::Resolved {
            return Err(RouterError::Dialog(DialogError::AlreadyResolved));
        }

        let trimmed = selected_option.trim();
        let resolved_selection = if trimmed.is_empty() {
            dialog
                .default_option
                .clone()
                .or_else(|| dialog.options.first().cloned())
                .ok_or(RouterError::Dialog(DialogError::NoOptionAvailable))?
        } else {
            match dialog.options.iter().find(|o| o.trim().eq_ignore_ascii_case(trimmed)) {
                Some(matched) => matched.clone(),
                None => dialog.default_option.clone().ok_or(RouterError::Dialog(DialogError::NoOptionAvailable))?,
            }
        };

        let resolved = self.store.resolve_dialog(dialog_id, &resolved_selection, responded_by).await?;

        let note = format!("{responded_by} selected \"{resolved_selection}\" for \"{}\"", resolved.title);
        let system_message = self
            .store
            .create_message(&resolved.project_id, responded_by, SenderType::System, None, &note, MessageType::System, None)
            .await?;
        self.hub.publish(ServerEvent::MessagePosted { message: system_message }).await;
        self.hub.publish(ServerEvent::DialogResolved { dialog: resolved.clone() }).await;
        Ok(resolved)
    }

    pub async fn queue_stats(&self, project_id: &str) -> Result<Vec<QueueStat>, RouterError> {
        Ok(self.store.queue_stats(project_id).await?)
    }

    pub async fn subscribe(&self) -> tokio::sync::mpsc::Receiver<ServerEvent> {
        self.hub.subscribe().await
    }
}

fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.find('.') {
        Some(idx) if idx > 0 => trimmed[..idx].to_string(),
        _ => trimmed.chars().take(80).collect(),
    }
}
