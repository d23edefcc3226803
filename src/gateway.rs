//! Model gateway: the seam between an `AgentRunner` and whatever
//! actually produces a reply for a given agent.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::GatewayError;

/// Everything an agent needs to generate a reply to one issue.
pub struct GenerationRequest<'a> {
    pub agent_id: &'a str,
    pub system_prompt: &'a str,
    pub issue_title: &'a str,
    pub issue_description: &'a str,
    pub conversation: &'a [String],
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Produces the agent's raw reply text, or times out after
    /// `deadline` has elapsed.
    async fn generate(&self, request: GenerationRequest<'_>, deadline: Duration) -> Result<String, GatewayError>;
}

/// Deterministic gateway with no external dependency, used in tests and
/// as a safe default before a real model backend is wired up.
pub struct EchoModelGateway;

#[async_trait]
impl ModelGateway for EchoModelGateway {
    async fn generate(&self, request: GenerationRequest<'_>, _deadline: Duration) -> Result<String, GatewayError> {
        Ok(format!(
            "Acknowledged \"{}\" as {}. {}",
            request.issue_title, request.agent_id, request.issue_description
        ))
    }
}

/// Talks to an HTTP-compatible completion endpoint, enforcing `deadline`
/// with `tokio::time::timeout` rather than trusting the client's own
/// timeout configuration.
pub struct HttpModelGateway {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpModelGateway {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl ModelGateway for HttpModelGateway {
    async fn generate(&self, request: GenerationRequest<'_>, deadline: Duration) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "agent_id": request.agent_id,
            "system_prompt": request.system_prompt,
            "issue_title": request.issue_title,
            "issue_description": request.issue_description,
            "conversation": request.conversation,
        });

        let call = self.client.post(&self.endpoint).json(&body).send();
        let response = tokio::time::timeout(deadline, call)
            .await
            .map_err(|_| GatewayError::Timeout(deadline))?
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        let text = tokio::time::timeout(deadline, response.text())
            .await
            .map_err(|_| GatewayError::Timeout(deadline))?
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        Ok(text)
    }
}
