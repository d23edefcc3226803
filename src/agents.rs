//! Static agent registry.
//!
//! Agents are a value, not a Store row: a fixed set of role-specialized
//! profiles compiled into the binary, the same way `Priority` is a
//! closed, compiled-in enum rather than a configurable table.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentProfile {
    pub id: &'static str,
    pub display_name: &'static str,
    pub system_prompt: &'static str,
}

pub const PRODUCT_MANAGER: AgentProfile = AgentProfile {
    id: "product_manager",
    display_name: "Product Manager",
    system_prompt: "You are the product manager. Turn ambiguous requests into scoped, prioritized work.",
};

pub const BACKEND_ARCHITECT: AgentProfile = AgentProfile {
    id: "backend_architect",
    display_name: "Backend Architect",
    system_prompt: "You are the backend architect. Design and implement server-side and data-layer changes.",
};

pub const FRONTEND_DEVELOPER: AgentProfile = AgentProfile {
    id: "frontend_developer",
    display_name: "Frontend Developer",
    system_prompt: "You are the frontend developer. Implement UI and client-facing changes.",
};

pub const QA_TESTER: AgentProfile = AgentProfile {
    id: "qa_tester",
    display_name: "QA Tester",
    system_prompt: "You are the QA tester. Write tests and verify behavior against requirements.",
};

pub const DEVOPS_ENGINEER: AgentProfile = AgentProfile {
    id: "devops_engineer",
    display_name: "DevOps Engineer",
    system_prompt: "You are the DevOps engineer. Own build, deploy, and infrastructure concerns.",
};

pub const DEFAULT_AGENTS: &[AgentProfile] = &[
    PRODUCT_MANAGER,
    BACKEND_ARCHITECT,
    FRONTEND_DEVELOPER,
    QA_TESTER,
    DEVOPS_ENGINEER,
];

pub fn find(agent_id: &str) -> Option<AgentProfile> {
    DEFAULT_AGENTS.iter().copied().find(|a| a.id == agent_id)
}

/// Normalizes loose model output ("pm", "backend", "Backend Architect")
/// to a known agent id. Returns `None` for unrecognized input.
pub fn normalize(raw: &str) -> Option<&'static str> {
    let lowered = raw.trim().to_lowercase();
    let candidate = lowered.replace([' ', '-'], "_");
    if let Some(agent) = DEFAULT_AGENTS.iter().find(|a| a.id == candidate) {
        return Some(agent.id);
    }
    match candidate.as_str() {
        "pm" | "product" | "product_manager" => Some(PRODUCT_MANAGER.id),
        "backend" | "backend_architect" | "architect" => Some(BACKEND_ARCHITECT.id),
        "frontend" | "frontend_developer" | "ui" => Some(FRONTEND_DEVELOPER.id),
        "qa" | "qa_tester" | "tester" | "test" => Some(QA_TESTER.id),
        "devops" | "devops_engineer" | "infra" | "infrastructure" => Some(DEVOPS_ENGINEER.id),
        _ => None,
    }
}
