//! Persistent state for projects, issues, dialogs, and chat messages.
//!
//! A trait at the seam — `Store` — breaks the dependency cycle between
//! the dispatcher and whatever persistence backend is wired in, the
//! same way `Vcs` sits between the runner and `Git2Vcs`.
//! `SqliteStore` is the only implementation, backed by a single
//! `sqlx::SqlitePool` under a single-writer discipline (no global,
//! passed around as `Arc<dyn Store>`).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{
    CreatedByType, Dialog, DialogStatus, Issue, IssueStatus, Message, MessageMetadata,
    MessageType, Priority, Project, QueueStat, SenderType, WorkspaceSettings,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_project(&self, name: &str, workspace_path: &str) -> Result<Project, StoreError>;
    async fn get_project(&self, id: &str) -> Result<Project, StoreError>;
    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;
    async fn update_workspace_settings(&self, project_id: &str, settings: &WorkspaceSettings) -> Result<(), StoreError>;

    async fn create_issue(
        &self,
        project_id: &str,
        title: &str,
        description: &str,
        priority: Priority,
        created_by: &str,
        created_by_type: CreatedByType,
        assigned_agent_id: Option<&str>,
    ) -> Result<Issue, StoreError>;
    async fn get_issue(&self, id: &str) -> Result<Issue, StoreError>;
    async fn list_issues(&self, project_id: &str) -> Result<Vec<Issue>, StoreError>;
    async fn enqueue_issue(&self, id: &str, queued_agent_id: Option<&str>) -> Result<Issue, StoreError>;
    async fn set_issue_status(&self, id: &str, status: IssueStatus) -> Result<Issue, StoreError>;

    /// Atomically claims the single highest-priority, earliest-queued
    /// `todo` issue across every project and every queued agent,
    /// flipping it to `inProgress`. `None` if nothing is queued —
    /// never blocks waiting for work to appear. At most one issue is
    /// claimed per call.
    async fn claim_next_ready(&self) -> Result<Option<Issue>, StoreError>;

    async fn create_dialog(
        &self,
        project_id: &str,
        agent_id: &str,
        issue_id: Option<&str>,
        title: &str,
        message: &str,
        options: &[String],
        default_option: Option<&str>,
    ) -> Result<Dialog, StoreError>;
    async fn get_dialog(&self, id: &str) -> Result<Dialog, StoreError>;
    async fn list_open_dialogs(&self, project_id: &str) -> Result<Vec<Dialog>, StoreError>;
    /// Conditionally resolves a dialog: fails with `LostRace` semantics
    /// at the caller if the dialog was already resolved by someone else.
    async fn resolve_dialog(&self, id: &str, selected_option: &str, responded_by: &str) -> Result<Dialog, StoreError>;

    async fn create_message(
        &self,
        project_id: &str,
        sender_id: &str,
        sender_type: SenderType,
        sender_name: Option<&str>,
        content: &str,
        message_type: MessageType,
        metadata: Option<MessageMetadata>,
    ) -> Result<Message, StoreError>;
    async fn list_messages(&self, project_id: &str, since: Option<chrono::DateTime<Utc>>) -> Result<Vec<Message>, StoreError>;

    async fn queue_stats(&self, project_id: &str) -> Result<Vec<QueueStat>, StoreError>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url).await.unwrap_or(false) {
            info!("creating database at {database_url}");
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new().max_connections(1).connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| StoreError::Database(e.into()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn shutdown(&self) {
        info!("closing database connections");
        self.pool.close().await;
    }

    fn row_to_project(row: &sqlx::sqlite::SqliteRow) -> Result<Project, StoreError> {
        Ok(Project {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            workspace_path: row.try_get("workspace_path")?,
            repo_origin: row.try_get("repo_origin")?,
            repo_kind: row.try_get("repo_kind")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_issue(row: &sqlx::sqlite::SqliteRow) -> Result<Issue, StoreError> {
        let priority_raw: String = row.try_get("priority")?;
        let status_raw: String = row.try_get("status")?;
        let created_by_type_raw: String = row.try_get("created_by_type")?;
        let tags_raw: Option<String> = row.try_get("tags")?;

        Ok(Issue {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            priority: Priority::parse(&priority_raw).ok_or_else(|| StoreError::InvalidEnum {
                field: "priority",
                value: priority_raw.clone(),
            })?,
            status: IssueStatus::parse(&status_raw).ok_or_else(|| StoreError::InvalidEnum {
                field: "status",
                value: status_raw.clone(),
            })?,
            created_by: row.try_get("created_by")?,
            created_by_type: CreatedByType::parse(&created_by_type_raw).ok_or_else(|| StoreError::InvalidEnum {
                field: "created_by_type",
                value: created_by_type_raw.clone(),
            })?,
            assigned_agent_id: row.try_get("assigned_agent_id")?,
            queued_agent_id: row.try_get("queued_agent_id")?,
            queued_at: row.try_get("queued_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
            tags: tags_raw.map(|raw| raw.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect()),
        })
    }

    fn row_to_dialog(row: &sqlx::sqlite::SqliteRow) -> Result<Dialog, StoreError> {
        let status_raw: String = row.try_get("status")?;
        let options_raw: String = row.try_get("options")?;
        Ok(Dialog {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            agent_id: row.try_get("agent_id")?,
            issue_id: row.try_get("issue_id")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            options: options_raw.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect(),
            default_option: row.try_get("default_option")?,
            status: DialogStatus::parse(&status_raw).ok_or_else(|| StoreError::InvalidEnum {
                field: "status",
                value: status_raw.clone(),
            })?,
            selected_option: row.try_get("selected_option")?,
            responded_by: row.try_get("responded_by")?,
            responded_at: row.try_get("responded_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let sender_type_raw: String = row.try_get("sender_type")?;
        let message_type_raw: String = row.try_get("message_type")?;
        let metadata_raw: Option<String> = row.try_get("metadata")?;

        Ok(Message {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            sender_id: row.try_get("sender_id")?,
            sender_type: SenderType::parse(&sender_type_raw).ok_or_else(|| StoreError::InvalidEnum {
                field: "sender_type",
                value: sender_type_raw.clone(),
            })?,
            sender_name: row.try_get("sender_name")?,
            content: row.try_get("content")?,
            message_type: MessageType::parse(&message_type_raw).ok_or_else(|| StoreError::InvalidEnum {
                field: "message_type",
                value: message_type_raw.clone(),
            })?,
            metadata: metadata_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
            timestamp: row.try_get("timestamp")?,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_project(&self, name: &str, workspace_path: &str) -> Result<Project, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query("INSERT INTO projects (id, name, workspace_path, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&id)
            .bind(name)
            .bind(workspace_path)
            .bind(now)
            .execute(&self.pool)
            .await?;
        self.get_project(&id).await
    }

    async fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound { kind: "project", id: id.to_string() })?;
        Self::row_to_project(&row)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY created_at ASC").fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_project).collect()
    }

    async fn update_workspace_settings(&self, project_id: &str, settings: &WorkspaceSettings) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE projects SET workspace_path = ?1, repo_origin = ?2, repo_kind = ?3 WHERE id = ?4",
        )
        .bind(&settings.workspace_path)
        .bind(&settings.repo_origin)
        .bind(&settings.repo_kind)
        .bind(project_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "project", id: project_id.to_string() });
        }
        Ok(())
    }

    async fn create_issue(
        &self,
        project_id: &str,
        title: &str,
        description: &str,
        priority: Priority,
        created_by: &str,
        created_by_type: CreatedByType,
        assigned_agent_id: Option<&str>,
    ) -> Result<Issue, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO issues (id, project_id, title, description, priority, status, created_by, created_by_type, assigned_agent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&id)
        .bind(project_id)
        .bind(title)
        .bind(description)
        .bind(priority.as_str())
        .bind(IssueStatus::Proposed.as_str())
        .bind(created_by)
        .bind(created_by_type.as_str())
        .bind(assigned_agent_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_issue(&id).await
    }

    async fn get_issue(&self, id: &str) -> Result<Issue, StoreError> {
        let row = sqlx::query("SELECT * FROM issues WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound { kind: "issue", id: id.to_string() })?;
        Self::row_to_issue(&row)
    }

    async fn list_issues(&self, project_id: &str) -> Result<Vec<Issue>, StoreError> {
        let rows = sqlx::query("SELECT * FROM issues WHERE project_id = ?1 ORDER BY created_at ASC")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_issue).collect()
    }

    async fn enqueue_issue(&self, id: &str, queued_agent_id: Option<&str>) -> Result<Issue, StoreError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE issues SET status = ?1, queued_agent_id = ?2, queued_at = ?3 WHERE id = ?4",
        )
        .bind(IssueStatus::Todo.as_str())
        .bind(queued_agent_id)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.get_issue(id).await
    }

    async fn set_issue_status(&self, id: &str, status: IssueStatus) -> Result<Issue, StoreError> {
        let now = Utc::now();
        match status {
            IssueStatus::InProgress => {
                sqlx::query(
                    "UPDATE issues SET status = ?1, queued_agent_id = NULL, started_at = COALESCE(started_at, ?2) WHERE id = ?3",
                )
                .bind(status.as_str())
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            IssueStatus::Done => {
                sqlx::query(
                    "UPDATE issues SET status = ?1, queued_agent_id = NULL, completed_at = COALESCE(completed_at, ?2) WHERE id = ?3",
                )
                .bind(status.as_str())
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            _ => {
                sqlx::query("UPDATE issues SET status = ?1, queued_agent_id = NULL WHERE id = ?2")
                    .bind(status.as_str())
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        self.get_issue(id).await
    }

    async fn claim_next_ready(&self) -> Result<Option<Issue>, StoreError> {
        let candidate = sqlx::query(
            "SELECT id FROM issues
             WHERE status = 'todo' AND queued_agent_id IS NOT NULL
             ORDER BY
               CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END ASC,
               queued_at ASC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = candidate else { return Ok(None) };
        let id: String = row.try_get("id")?;

        let now = Utc::now();
        let claimed = sqlx::query(
            "UPDATE issues SET status = 'inProgress', queued_agent_id = NULL, started_at = ?1
             WHERE id = ?2 AND status = 'todo'",
        )
        .bind(now)
        .bind(&id)
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() == 0 {
            // Another dispatcher tick (or a concurrent claim) won the race.
            return Ok(None);
        }

        Ok(Some(self.get_issue(&id).await?))
    }

    async fn create_dialog(
        &self,
        project_id: &str,
        agent_id: &str,
        issue_id: Option<&str>,
        title: &str,
        message: &str,
        options: &[String],
        default_option: Option<&str>,
    ) -> Result<Dialog, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO dialogs (id, project_id, agent_id, issue_id, title, message, options, default_option, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&id)
        .bind(project_id)
        .bind(agent_id)
        .bind(issue_id)
        .bind(title)
        .bind(message)
        .bind(options.join(","))
        .bind(default_option)
        .bind(DialogStatus::Open.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_dialog(&id).await
    }

    async fn get_dialog(&self, id: &str) -> Result<Dialog, StoreError> {
        let row = sqlx::query("SELECT * FROM dialogs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound { kind: "dialog", id: id.to_string() })?;
        Self::row_to_dialog(&row)
    }

    async fn list_open_dialogs(&self, project_id: &str) -> Result<Vec<Dialog>, StoreError> {
        let rows = sqlx::query("SELECT * FROM dialogs WHERE project_id = ?1 AND status = 'open' ORDER BY created_at ASC")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_dialog).collect()
    }

    async fn resolve_dialog(&self, id: &str, selected_option: &str, responded_by: &str) -> Result<Dialog, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE dialogs SET status = 'resolved', selected_option = ?1, responded_by = ?2, responded_at = ?3
             WHERE id = ?4 AND status = 'open'",
        )
        .bind(selected_option)
        .bind(responded_by)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self.get_dialog(id).await?;
            return Err(if existing.status == DialogStatus::Resolved {
                StoreError::InvalidEnum { field: "status", value: "resolved".into() }
            } else {
                StoreError::NotFound { kind: "dialog", id: id.to_string() }
            });
        }

        self.get_dialog(id).await
    }

    async fn create_message(
        &self,
        project_id: &str,
        sender_id: &str,
        sender_type: SenderType,
        sender_name: Option<&str>,
        content: &str,
        message_type: MessageType,
        metadata: Option<MessageMetadata>,
    ) -> Result<Message, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata_json = metadata.as_ref().map(|m| serde_json::to_string(m).unwrap_or_default());

        sqlx::query(
            "INSERT INTO messages (id, project_id, sender_id, sender_type, sender_name, content, message_type, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&id)
        .bind(project_id)
        .bind(sender_id)
        .bind(sender_type.as_str())
        .bind(sender_name)
        .bind(content)
        .bind(message_type.as_str())
        .bind(metadata_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM messages WHERE id = ?1").bind(&id).fetch_one(&self.pool).await?;
        Self::row_to_message(&row)
    }

    async fn list_messages(&self, project_id: &str, since: Option<chrono::DateTime<Utc>>) -> Result<Vec<Message>, StoreError> {
        let rows = match since {
            Some(ts) => {
                sqlx::query("SELECT * FROM messages WHERE project_id = ?1 AND timestamp > ?2 ORDER BY timestamp ASC")
                    .bind(project_id)
                    .bind(ts)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM messages WHERE project_id = ?1 ORDER BY timestamp ASC")
                    .bind(project_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(Self::row_to_message).collect()
    }

    async fn queue_stats(&self, project_id: &str) -> Result<Vec<QueueStat>, StoreError> {
        use crate::agents::DEFAULT_AGENTS;
        use crate::models::AgentRuntimeStatus;

        let issues = self.list_issues(project_id).await?;
        let mut stats = Vec::new();

        for profile in DEFAULT_AGENTS {
            let queued: Vec<&Issue> = issues
                .iter()
                .filter(|i| i.status == IssueStatus::Todo && i.queued_agent_id.as_deref() == Some(profile.id))
                .collect();
            let in_progress: Vec<&Issue> = issues
                .iter()
                .filter(|i| i.status == IssueStatus::InProgress && i.assigned_agent_id.as_deref() == Some(profile.id))
                .collect();

            let (status, current) = if let Some(issue) = in_progress.first() {
                (AgentRuntimeStatus::Working, Some(*issue))
            } else if let Some(issue) = queued.first() {
                (AgentRuntimeStatus::Queued, Some(*issue))
            } else {
                (AgentRuntimeStatus::Idle, None)
            };

            stats.push(QueueStat {
                project_id: project_id.to_string(),
                agent_id: profile.id.to_string(),
                queue_depth: queued.len() as u32,
                in_progress: in_progress.len() as u32,
                status,
                current_issue_id: current.map(|i| i.id.clone()),
                current_issue_title: current.map(|i| i.title.clone()),
            });
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn creates_and_fetches_a_project() {
        let s = store().await;
        let p = s.create_project("demo", "/tmp/demo").await.unwrap();
        let fetched = s.get_project(&p.id).await.unwrap();
        assert_eq!(fetched.name, "demo");
    }

    #[tokio::test]
    async fn claim_next_ready_is_atomic_and_priority_ordered_across_agents() {
        let s = store().await;
        let p = s.create_project("demo", "/tmp/demo").await.unwrap();

        let low = s.create_issue(&p.id, "low", "", Priority::Low, "u", CreatedByType::User, None).await.unwrap();
        let urgent = s.create_issue(&p.id, "urgent", "", Priority::Urgent, "u", CreatedByType::User, None).await.unwrap();
        s.enqueue_issue(&low.id, Some("backend_architect")).await.unwrap();
        s.enqueue_issue(&urgent.id, Some("qa_tester")).await.unwrap();

        // The urgent issue wins the claim even though it's queued for a
        // different agent than the one queued first.
        let claimed = s.claim_next_ready().await.unwrap().unwrap();
        assert_eq!(claimed.id, urgent.id);
        assert_eq!(claimed.status, IssueStatus::InProgress);

        let second_claim = s.claim_next_ready().await.unwrap().unwrap();
        assert_eq!(second_claim.id, low.id);

        assert!(s.claim_next_ready().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolving_a_resolved_dialog_is_rejected() {
        let s = store().await;
        let p = s.create_project("demo", "/tmp/demo").await.unwrap();
        let dialog = s
            .create_dialog(&p.id, "qa_tester", None, "pick one", "a or b?", &["a".into(), "b".into()], None)
            .await
            .unwrap();

        s.resolve_dialog(&dialog.id, "a", "user-1").await.unwrap();
        let err = s.resolve_dialog(&dialog.id, "b", "user-2").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidEnum { .. }));
    }

    #[tokio::test]
    async fn queue_stats_reflects_working_and_queued_agents() {
        let s = store().await;
        let p = s.create_project("demo", "/tmp/demo").await.unwrap();
        let issue = s.create_issue(&p.id, "build api", "", Priority::High, "u", CreatedByType::User, None).await.unwrap();
        s.enqueue_issue(&issue.id, Some("backend_architect")).await.unwrap();

        let stats = s.queue_stats(&p.id).await.unwrap();
        let backend = stats.iter().find(|s| s.agent_id == "backend_architect").unwrap();
        assert_eq!(backend.queue_depth, 1);
    }
}
