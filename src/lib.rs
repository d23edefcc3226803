//! Agent Orchestration Core: a priority task queue, cooperative
//! scheduler, structured-response protocol, sandboxed workspace
//! mutator, VCS integration, and a real-time fan-out hub for
//! coordinating multiple AI agents over a shared project.

pub mod agents;
pub mod blocks;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod git;
pub mod hub;
pub mod issue_fsm;
pub mod models;
pub mod plan;
pub mod router;
pub mod runner;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod workspace;

pub use config::{config, init_config, ServerConfig};
pub use dispatcher::{run_snapshot_worker, Dispatcher};
pub use errors::{DialogError, GatewayError, StoreError, VcsError, WorkspaceError};
pub use events::ServerEvent;
pub use gateway::{EchoModelGateway, GenerationRequest, HttpModelGateway, ModelGateway};
pub use git::{Git2Vcs, Vcs, VcsMode};
pub use hub::Hub;
pub use router::{RequestRouter, RouterError};
pub use runner::{AgentRunner, RunnerError};
pub use shutdown::ShutdownCoordinator;
pub use store::{SqliteStore, Store};
pub use telemetry::{create_dispatch_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
