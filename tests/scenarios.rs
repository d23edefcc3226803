//! End-to-end scenarios driven through the same seams a real deployment
//! uses: an in-memory SQLite store, a `tempfile` workspace, a bare
//! `git2` repository, and either the echo gateway or a small scripted
//! gateway standing in for a real model backend.

use std::sync::Arc;
use std::time::Duration;

use agentdesk::models::{CreatedByType, DialogStatus, IssueStatus, Priority};
use agentdesk::{AgentRunner, EchoModelGateway, Git2Vcs, GenerationRequest, Hub, ModelGateway, RequestRouter, RouterError, ServerEvent, SqliteStore, Store};
use async_trait::async_trait;
use tempfile::tempdir;

async fn store_and_workspace() -> (Arc<dyn Store>, tempfile::TempDir) {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    let dir = tempdir().unwrap();
    (store, dir)
}

fn runner(store: Arc<dyn Store>, gateway: Arc<dyn ModelGateway>, hub: Hub) -> AgentRunner {
    AgentRunner::new(store, Arc::new(Git2Vcs::new()), gateway, hub, Duration::from_secs(5))
}

fn router(store: Arc<dyn Store>, hub: Hub) -> RequestRouter {
    let runner = Arc::new(AgentRunner::new(store.clone(), Arc::new(Git2Vcs::new()), Arc::new(EchoModelGateway), hub.clone(), Duration::from_secs(5)));
    RequestRouter::new(store, hub, runner)
}

/// A gateway whose reply is fixed at construction time, for scenarios
/// that need a specific block/plan shape without a real model.
struct ScriptedGateway {
    reply: String,
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn generate(&self, _request: GenerationRequest<'_>, _deadline: Duration) -> Result<String, agentdesk::GatewayError> {
        Ok(self.reply.clone())
    }
}

/// A gateway that always fails, to exercise the canned-fallback path.
struct FailingGateway;

#[async_trait]
impl ModelGateway for FailingGateway {
    async fn generate(&self, _request: GenerationRequest<'_>, _deadline: Duration) -> Result<String, agentdesk::GatewayError> {
        Err(agentdesk::GatewayError::Upstream("simulated outage".to_string()))
    }
}

#[tokio::test]
async fn scenario_1_keyword_dispatch_routes_to_backend_architect_and_replies_inline() {
    let (store, dir) = store_and_workspace().await;
    let hub = Hub::new();
    let router = router(store, hub);
    let project = router.create_project("demo", dir.path().to_str().unwrap()).await.unwrap();
    let mut events = router.subscribe().await;

    router
        .submit_chat_message(&project.id, "user-1", "please build the backend and database layer")
        .await
        .unwrap();

    let message_event = events.recv().await.unwrap();
    assert!(matches!(message_event, ServerEvent::MessagePosted { .. }));

    let issue_event = events.recv().await.unwrap();
    match issue_event {
        ServerEvent::IssueCreated { issue, requires_approval } => {
            assert_eq!(issue.assigned_agent_id.as_deref(), Some("backend_architect"));
            assert!(!requires_approval);
        }
        other => panic!("expected IssueCreated, got {other:?}"),
    }

    // The detected agent also replies inline, with no issue attached.
    let reply_event = events.recv().await.unwrap();
    match reply_event {
        ServerEvent::MessagePosted { message } => {
            assert_eq!(message.sender_id, "backend_architect");
            assert_eq!(message.sender_name.as_deref(), Some("Backend Architect"));
        }
        other => panic!("expected an agent MessagePosted reply, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_2_issue_lifecycle_claims_runs_and_completes() {
    let (store, dir) = store_and_workspace().await;
    let hub = Hub::new();
    let router = router(store.clone(), hub.clone());
    let project = router
        .create_project("demo", dir.path().to_str().unwrap())
        .await
        .unwrap();

    let issue = router
        .create_issue(&project.id, "API schema", "design the backend database schema", Priority::Medium, "user-1", None)
        .await
        .unwrap();
    assert_eq!(issue.queued_agent_id.as_deref(), Some("backend_architect"));
    assert_eq!(issue.status, IssueStatus::Todo);

    let claimed = store.claim_next_ready().await.unwrap().expect("issue should be claimable");
    assert_eq!(claimed.status, IssueStatus::InProgress);
    assert!(claimed.started_at.is_some());
    assert!(claimed.queued_agent_id.is_none());

    // No second claim while the first is in progress.
    assert!(store.claim_next_ready().await.unwrap().is_none());

    let runner = runner(store.clone(), Arc::new(EchoModelGateway), hub);
    runner.run(&project, "backend_architect", Some(&claimed), "design the backend database schema").await.unwrap();

    let finished = store.get_issue(&claimed.id).await.unwrap();
    assert_eq!(finished.status, IssueStatus::Done);
    assert!(finished.queued_agent_id.is_none());
    assert!(finished.completed_at.is_some());
}

#[tokio::test]
async fn scenario_3_plan_apply_writes_a_file_and_commits() {
    let (store, dir) = store_and_workspace().await;
    let hub = Hub::new();
    let project = store.create_project("demo", dir.path().to_str().unwrap()).await.unwrap();
    let issue = store
        .create_issue(&project.id, "seed readme", "", Priority::Medium, "user-1", CreatedByType::User, Some("backend_architect"))
        .await
        .unwrap();
    store.enqueue_issue(&issue.id, Some("backend_architect")).await.unwrap();
    let issue = store.claim_next_ready().await.unwrap().unwrap();

    let plan_reply = r#"{"files":[{"path":"README.md","content":"hi","overwrite":true}],"notes":["seeded readme"]}"#;
    let gateway = ScriptedGateway { reply: plan_reply.to_string() };
    let runner = runner(store.clone(), Arc::new(gateway), hub);
    runner.run(&project, "backend_architect", Some(&issue), "seed readme").await.unwrap();

    assert!(dir.path().join("README.md").exists());
    assert_eq!(std::fs::read_to_string(dir.path().join("README.md")).unwrap(), "hi");
    assert!(dir.path().join(".git").exists());

    let messages = store.list_messages(&project.id, None).await.unwrap();
    let reply_message = messages.last().unwrap();
    let metadata = reply_message.metadata.as_ref().unwrap();
    assert_eq!(metadata.plan.as_ref().unwrap().files, vec!["README.md".to_string()]);
    assert!(metadata.git.as_ref().unwrap().commit_id.is_some());
}

#[tokio::test]
async fn scenario_4_path_escape_is_rejected_and_noted_not_fatal() {
    let (store, dir) = store_and_workspace().await;
    let hub = Hub::new();
    let project = store.create_project("demo", dir.path().to_str().unwrap()).await.unwrap();
    let issue = store
        .create_issue(&project.id, "sneaky plan", "", Priority::Medium, "user-1", CreatedByType::User, Some("backend_architect"))
        .await
        .unwrap();
    store.enqueue_issue(&issue.id, Some("backend_architect")).await.unwrap();
    let issue = store.claim_next_ready().await.unwrap().unwrap();

    let plan_reply = r#"{"files":[{"path":"../evil.txt","content":"x"}]}"#;
    let gateway = ScriptedGateway { reply: plan_reply.to_string() };
    let runner = runner(store.clone(), Arc::new(gateway), hub);

    // The run itself still succeeds — the failure is downgraded to a note.
    runner.run(&project, "backend_architect", Some(&issue), "sneaky plan").await.unwrap();

    assert!(!dir.path().parent().unwrap().join("evil.txt").exists());

    let messages = store.list_messages(&project.id, None).await.unwrap();
    let reply_message = messages.last().unwrap();
    let metadata = reply_message.metadata.as_ref().unwrap();
    assert!(metadata.git.is_none());
    assert!(metadata.notes.iter().any(|n| n.contains("produced changes but hit an error")));

    // The issue still completes rather than being stuck in-progress.
    let finished = store.get_issue(&issue.id).await.unwrap();
    assert_eq!(finished.status, IssueStatus::Done);
}

#[tokio::test]
async fn scenario_5_dialog_round_trip_rejects_a_second_resolve() {
    let (store, dir) = store_and_workspace().await;
    let hub = Hub::new();
    let router = router(store.clone(), hub.clone());
    let project = router.create_project("demo", dir.path().to_str().unwrap()).await.unwrap();
    let issue = store
        .create_issue(&project.id, "pick a database", "", Priority::Medium, "user-1", CreatedByType::User, Some("backend_architect"))
        .await
        .unwrap();
    store.enqueue_issue(&issue.id, Some("backend_architect")).await.unwrap();
    let claimed = store.claim_next_ready().await.unwrap().unwrap();

    let dialog_reply = "@dialog\ntitle: pick a database\nmessage: Postgres or SQLite?\noptions: A, B\ndefault: A\n---\n";
    let gateway = ScriptedGateway { reply: dialog_reply.to_string() };
    let runner = runner(store.clone(), Arc::new(gateway), hub);
    runner.run(&project, "backend_architect", Some(&claimed), "pick a database").await.unwrap();

    // A dialog was opened and the issue therefore moved to review, not done.
    let open_dialogs = store.list_open_dialogs(&project.id).await.unwrap();
    assert_eq!(open_dialogs.len(), 1);
    let dialog = &open_dialogs[0];
    assert_eq!(dialog.status, DialogStatus::Open);
    let after_dialog = store.get_issue(&claimed.id).await.unwrap();
    assert_eq!(after_dialog.status, IssueStatus::Review);

    let resolved = router.resolve_dialog(&dialog.id, "B", "user-1").await.unwrap();
    assert_eq!(resolved.selected_option.as_deref(), Some("B"));
    assert_eq!(resolved.status, DialogStatus::Resolved);

    let second_attempt = router.resolve_dialog(&dialog.id, "A", "user-1").await;
    assert!(matches!(second_attempt, Err(RouterError::Dialog(agentdesk::DialogError::AlreadyResolved))));
}

#[tokio::test]
async fn scenario_6_overflowing_subscriber_is_closed_and_deregistered() {
    // The Hub gives each connection its own bounded mpsc channel: a
    // connection that never drains falls behind, and the first publish
    // that finds its buffer full closes and deregisters it rather than
    // blocking the publisher or the other, attentive subscriber.
    let (store, dir) = store_and_workspace().await;
    let hub = Hub::new();
    let router = router(store, hub.clone());
    let project = router.create_project("demo", dir.path().to_str().unwrap()).await.unwrap();

    let mut slow = router.subscribe().await;
    let mut attentive = router.subscribe().await;
    assert_eq!(hub.subscriber_count().await, 2);

    const N: usize = 300; // exceeds the hub's 256-slot-per-connection buffer
    let attentive_drain = tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..N {
            match attentive.recv().await {
                Some(ServerEvent::MessagePosted { message }) => seen.push(message.content),
                Some(_) => {}
                None => break,
            }
        }
        seen
    });

    for i in 0..N {
        router
            .submit_chat_message(&project.id, "user-1", &format!("message number {i}"))
            .await
            .unwrap();
    }

    let seen = attentive_drain.await.unwrap();
    assert_eq!(seen.len(), N);
    for (i, content) in seen.iter().enumerate() {
        assert_eq!(content, &format!("message number {i}"));
    }

    // The slow subscriber never drained while the burst was in flight, so
    // the hub closed and deregistered its connection; only the attentive
    // one remains registered.
    assert_eq!(hub.subscriber_count().await, 1);
    assert!(slow.recv().await.is_none(), "expected the overflowing connection's channel to be closed");
}

#[tokio::test]
async fn gateway_failure_falls_back_to_canned_reply_and_still_completes() {
    let (store, dir) = store_and_workspace().await;
    let hub = Hub::new();
    let project = store.create_project("demo", dir.path().to_str().unwrap()).await.unwrap();
    let issue = store
        .create_issue(&project.id, "flaky model call", "", Priority::Medium, "user-1", CreatedByType::User, Some("backend_architect"))
        .await
        .unwrap();
    store.enqueue_issue(&issue.id, Some("backend_architect")).await.unwrap();
    let issue = store.claim_next_ready().await.unwrap().unwrap();

    let runner = runner(store.clone(), Arc::new(FailingGateway), hub);
    runner.run(&project, "backend_architect", Some(&issue), "flaky model call").await.unwrap();

    let messages = store.list_messages(&project.id, None).await.unwrap();
    let reply_message = messages.last().unwrap();
    assert!(reply_message.metadata.as_ref().unwrap().notes.iter().any(|n| n.contains("model gateway error")));

    let finished = store.get_issue(&issue.id).await.unwrap();
    assert_eq!(finished.status, IssueStatus::Done);
}

#[tokio::test]
async fn heuristic_task_proposal_creates_a_proposed_issue_requiring_approval() {
    let (store, dir) = store_and_workspace().await;
    let hub = Hub::new();
    let project = store.create_project("demo", dir.path().to_str().unwrap()).await.unwrap();
    let mut events = hub.subscribe().await;

    let runner = runner(store.clone(), Arc::new(EchoModelGateway), hub);
    runner
        .run(&project, "product_manager", None, "Let's create a task for the onboarding revamp next sprint.")
        .await
        .unwrap();

    // The proposed issue is published before the agent's own reply.
    let proposal_event = events.recv().await.unwrap();
    match proposal_event {
        ServerEvent::IssueCreated { issue, requires_approval } => {
            assert!(requires_approval);
            assert_eq!(issue.status, IssueStatus::Proposed);
        }
        other => panic!("expected a proposed IssueCreated event, got {other:?}"),
    }
    let _reply_event = events.recv().await.unwrap();
}
