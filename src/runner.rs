//! Drives one agent through one turn: generate a reply, extract its
//! structured blocks, apply any plan it carries, and record the result.
//! A turn is either a claimed issue being worked end to end, or a
//! single conversational reply to a chat message with no issue
//! attached.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::agents::{self, AgentProfile};
use crate::blocks::{self, Block};
use crate::errors::{GatewayError, StoreError, VcsError, WorkspaceError};
use crate::events::ServerEvent;
use crate::gateway::{GenerationRequest, ModelGateway};
use crate::git::{CommitOutcome, Vcs, VcsMode};
use crate::hub::Hub;
use crate::models::{
    CreatedByType, GitSummary, Issue, IssueStatus, MessageMetadata, MessageType, PlanSummary,
    Priority, Project, SenderType,
};
use crate::plan;
use crate::store::Store;
use crate::workspace;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("unknown agent id {0:?}")]
    UnknownAgent(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

const FALLBACK_REPLY: &str =
    "I wasn't able to reach the model this time, so no changes were made. Retrying on the next tick.";

pub struct AgentRunner {
    store: Arc<dyn Store>,
    vcs: Arc<dyn Vcs>,
    gateway: Arc<dyn ModelGateway>,
    hub: Hub,
    gateway_deadline: Duration,
}

impl AgentRunner {
    pub fn new(store: Arc<dyn Store>, vcs: Arc<dyn Vcs>, gateway: Arc<dyn ModelGateway>, hub: Hub, gateway_deadline: Duration) -> Self {
        Self { store, vcs, gateway, hub, gateway_deadline }
    }

    /// Runs one turn for `agent_id`. When `issue` is `Some` (already
    /// claimed, `status == inProgress`), the issue is carried to
    /// completion. When `issue` is `None`, this is a standalone
    /// conversational reply to `user_message` with no issue to
    /// advance.
    ///
    /// Every stage past agent resolution is non-fatal: a failure is
    /// logged and folded into the outgoing chat message's `notes`
    /// rather than aborting the run, so one bad plan or a flaky VCS
    /// push never leaves an issue stuck in `inProgress`. The only hard
    /// failure is an unrecognized `agent_id`, which signals a data
    /// problem upstream rather than anything this run can recover from.
    pub async fn run(&self, project: &Project, agent_id: &str, issue: Option<&Issue>, user_message: &str) -> Result<(), RunnerError> {
        let profile = agents::find(agent_id).ok_or_else(|| RunnerError::UnknownAgent(agent_id.to_string()))?;

        let workspace_path = Path::new(&project.workspace_path);
        let mut notes = Vec::new();
        if let Err(e) = self.ensure_workspace_ready(workspace_path, project) {
            warn!(error = %e, "workspace setup failed");
            notes.push(format!("workspace setup failed: {e}"));
        }

        let history = self.store.list_messages(&project.id, None).await?;
        let conversation: Vec<String> = history.iter().rev().take(10).rev().map(|m| m.content.clone()).collect();

        let request = GenerationRequest {
            agent_id: profile.id,
            system_prompt: profile.system_prompt,
            issue_title: issue.map(|i| i.title.as_str()).unwrap_or(""),
            issue_description: issue.map(|i| i.description.as_str()).unwrap_or(user_message),
            conversation: &conversation,
        };
        let reply = match self.gateway.generate(request, self.gateway_deadline).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "model gateway failed, falling back to canned reply");
                notes.push(format!("model gateway error: {e}"));
                FALLBACK_REPLY.to_string()
            }
        };

        let (cleaned, blocks) = blocks::extract(&reply);
        if let Err(e) = self.dispatch_blocks(project, issue, &profile, &blocks).await {
            warn!(error = %e, "a structured block failed to apply");
            notes.push(format!("block dispatch error: {e}"));
        }

        if let Some(sentence) = heuristic_task_proposal(user_message) {
            if let Err(e) = self.propose_task(project, &profile, &sentence).await {
                warn!(error = %e, "heuristic task proposal failed");
                notes.push(format!("task proposal error: {e}"));
            }
        }

        let git_summary = match self.apply_plan_if_present(workspace_path, &profile, &cleaned).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "plan produced changes but hit an error");
                notes.push(format!("produced changes but hit an error: {e}"));
                None
            }
        };

        let metadata = MessageMetadata {
            workspace_path: Some(project.workspace_path.clone()),
            notes,
            plan: git_summary.as_ref().map(|_| PlanSummary { files: vec![], mutations: vec![] }),
            git: git_summary,
        };
        let message = self
            .store
            .create_message(
                &project.id,
                profile.id,
                SenderType::Agent,
                Some(profile.display_name),
                &cleaned,
                MessageType::Chat,
                Some(metadata),
            )
            .await?;
        self.hub.publish(ServerEvent::MessagePosted { message }).await;

        if let Some(issue) = issue {
            let has_open_dialog = !self.store.list_open_dialogs(&project.id).await?.is_empty();
            let next_status = if has_open_dialog { IssueStatus::Review } else { IssueStatus::Done };
            self.store.set_issue_status(&issue.id, next_status).await?;
        }

        Ok(())
    }

    fn ensure_workspace_ready(&self, workspace_path: &Path, project: &Project) -> Result<(), RunnerError> {
        if workspace_path.join(".git").exists() {
            return Ok(());
        }
        let mode = if project.repo_origin.is_some() { VcsMode::Clone } else { VcsMode::Init };
        self.vcs.setup(workspace_path, mode, project.repo_origin.as_deref())?;
        Ok(())
    }

    /// Creates a `proposed` issue awaiting human approval and emits
    /// `issue.created` flagged accordingly, rather than enqueuing it
    /// for any agent the way `create_issue` + `enqueue_issue` does.
    async fn propose_task(&self, project: &Project, profile: &AgentProfile, title: &str) -> Result<(), StoreError> {
        let created = self
            .store
            .create_issue(&project.id, title, "", Priority::Medium, profile.id, CreatedByType::Agent, None)
            .await?;
        self.hub.publish(ServerEvent::IssueCreated { issue: created, requires_approval: true }).await;
        Ok(())
    }

    /// Dispatches each recognized block's side effect against the
    /// store. A single block's `StoreError` is logged and skipped
    /// rather than aborting the remaining blocks in the same reply.
    async fn dispatch_blocks(
        &self,
        project: &Project,
        issue: Option<&Issue>,
        profile: &AgentProfile,
        blocks: &[Block],
    ) -> Result<(), RunnerError> {
        for block in blocks {
            match block.type_name.as_str() {
                "issue" => {
                    let title = block.get("title").unwrap_or("untitled").to_string();
                    let description = block.get("description").unwrap_or("").to_string();
                    let priority = block
                        .get("priority")
                        .and_then(Priority::parse)
                        .unwrap_or_default();
                    let assignee = block.get("assignee").map(str::to_string).or_else(|| {
                        crate::detector::detect(&format!("{title} {description}")).map(str::to_string)
                    });

                    let result: Result<Issue, StoreError> = async {
                        let created = self
                            .store
                            .create_issue(
                                &project.id,
                                &title,
                                &description,
                                priority,
                                profile.id,
                                CreatedByType::Agent,
                                assignee.as_deref(),
                            )
                            .await?;
                        self.store.enqueue_issue(&created.id, assignee.as_deref()).await
                    }
                    .await;

                    match result {
                        Ok(created) => self.hub.publish(ServerEvent::IssueCreated { issue: created, requires_approval: false }).await,
                        Err(e) => warn!(block_type = "issue", error = %e, "block dispatch failed, skipping this block"),
                    }
                }
                "dialog" => {
                    let title = block.get("title").unwrap_or("question").to_string();
                    let message = block.get("message").unwrap_or("").to_string();
                    let options: Vec<String> = block
                        .get("options")
                        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
                        .unwrap_or_default();
                    let default_option = block.get("default");
                    let result = self
                        .store
                        .create_dialog(&project.id, profile.id, issue.map(|i| i.id.as_str()), &title, &message, &options, default_option)
                        .await;

                    match result {
                        Ok(dialog) => self.hub.publish(ServerEvent::DialogOpened { dialog }).await,
                        Err(e) => warn!(block_type = "dialog", error = %e, "block dispatch failed, skipping this block"),
                    }
                }
                "mention" => {
                    let target = block.get("target").unwrap_or("");
                    let message = block.get("message").unwrap_or("");
                    if agents::normalize(target).is_none() {
                        warn!(target, "mention block referenced an unknown agent");
                        continue;
                    }
                    let result = self
                        .store
                        .create_message(&project.id, profile.id, SenderType::Agent, Some(profile.display_name), message, MessageType::Chat, None)
                        .await;

                    match result {
                        Ok(posted) => self.hub.publish(ServerEvent::MessagePosted { message: posted }).await,
                        Err(e) => warn!(block_type = "mention", error = %e, "block dispatch failed, skipping this block"),
                    }
                }
                other => {
                    warn!(block_type = other, "ignoring unrecognized block type");
                }
            };
        }
        Ok(())
    }

    async fn apply_plan_if_present(
        &self,
        workspace_path: &Path,
        profile: &AgentProfile,
        cleaned_reply: &str,
    ) -> Result<Option<GitSummary>, RunnerError> {
        let plan = match plan::parse(cleaned_reply) {
            Ok(plan) if !plan.is_empty() => plan,
            _ => return Ok(None),
        };

        let outcome = workspace::apply(workspace_path, profile.display_name, &plan)?;
        info!(summary = %outcome.summary, "applied workspace plan");

        let message = format!("{}: {} files, {} mutations", profile.display_name, outcome.applied_files.len(), outcome.applied_mutations.len());
        match self.vcs.commit(workspace_path, &message)? {
            CommitOutcome::Committed(result) => Ok(Some(GitSummary {
                commit_id: Some(result.commit_id),
                branch: Some(result.branch),
                pushed: result.pushed,
            })),
            CommitOutcome::NoChanges => Ok(None),
        }
    }
}

/// Heuristic fallback: a message that asks to "create a task"/"add a task"
/// produces a backlog entry titled from the sentence that triggered it,
/// even with no `@issue` block present.
pub fn heuristic_task_proposal(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    for phrase in ["create a task", "create task", "add a task", "add task"] {
        if let Some(idx) = lowered.find(phrase) {
            let sentence_start = lowered[..idx].rfind('.').map(|p| p + 1).unwrap_or(0);
            let sentence_end = lowered[idx..].find('.').map(|p| idx + p).unwrap_or(text.len());
            let sentence = text[sentence_start..sentence_end].trim();
            if !sentence.is_empty() {
                return Some(sentence.to_string());
            }
        }
    }
    None
}
