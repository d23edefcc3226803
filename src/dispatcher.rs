//! Cooperative scheduler: each tick claims at most one issue — the
//! single highest-priority, earliest-queued ready issue across every
//! project and every queued agent — runs it, and re-publishes its
//! state. A separate low-frequency worker keeps the queue/status
//! snapshot fresh for subscribers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::events::ServerEvent;
use crate::hub::Hub;
use crate::models::Issue;
use crate::runner::AgentRunner;
use crate::store::Store;

pub struct Dispatcher {
    store: Arc<dyn Store>,
    hub: Hub,
    runner: Arc<AgentRunner>,
    tick_interval: Duration,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, hub: Hub, runner: Arc<AgentRunner>, tick_interval: Duration) -> Self {
        Self { store, hub, runner, tick_interval }
    }

    /// Runs the dispatch loop until `shutdown` is signaled. Each tick
    /// claims and runs at most one issue in this process.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "dispatcher tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("dispatcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<(), crate::errors::StoreError> {
        let Some(issue) = self.store.claim_next_ready().await? else {
            return Ok(());
        };
        let project = self.store.get_project(&issue.project_id).await?;
        let agent_id = issue.assigned_agent_id.clone().unwrap_or_default();

        self.hub.publish(ServerEvent::IssueUpdated { issue: issue.clone() }).await;

        if let Err(e) = self.runner.run(&project, &agent_id, Some(&issue), &task_prompt(&issue)).await {
            error!(issue_id = %issue.id, error = %e, "agent run failed");
            return Ok(());
        }

        let updated = self.store.get_issue(&issue.id).await?;
        self.hub.publish(ServerEvent::IssueUpdated { issue: updated }).await;

        let stats = self.store.queue_stats(&project.id).await?;
        self.hub.publish(ServerEvent::AgentQueueSnapshot { stats: stats.clone(), at: chrono::Utc::now() }).await;
        self.hub.publish(ServerEvent::AgentStatusSnapshot { stats, at: chrono::Utc::now() }).await;

        Ok(())
    }
}

/// The prompt context handed to the runner as the triggering message
/// for a dispatcher-claimed issue, built from its title/priority/
/// description.
fn task_prompt(issue: &Issue) -> String {
    format!("New {} priority task: {}\n{}", issue.priority.as_str(), issue.title, issue.description)
}

/// Periodically recomputes and broadcasts per-agent queue depth and
/// status so idle clients stay current without polling.
pub async fn run_snapshot_worker(
    store: Arc<dyn Store>,
    hub: Hub,
    interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.list_projects().await {
                    Ok(projects) => {
                        for project in projects {
                            match store.queue_stats(&project.id).await {
                                Ok(stats) => {
                                    hub.publish(ServerEvent::AgentQueueSnapshot { stats: stats.clone(), at: chrono::Utc::now() }).await;
                                    hub.publish(ServerEvent::AgentStatusSnapshot { stats, at: chrono::Utc::now() }).await;
                                }
                                Err(e) => error!(project_id = %project.id, error = %e, "failed to compute queue stats"),
                            }
                        }
                    }
                    Err(e) => error!(error = %e, "failed to list projects for snapshot worker"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("snapshot worker shutting down");
                    break;
                }
            }
        }
    }
}
