//! Free-text to agent-id routing.
//!
//! Pure and deterministic: mention tokens unconditionally preempt keyword
//! scoring, and keyword ties resolve to the highest-priority rule in
//! declaration order, the same highest-wins scan `Priority::from_labels`
//! uses to resolve a tie between label matches.

struct KeywordRule {
    keyword: &'static str,
    agent_id: &'static str,
    priority: u8,
    word_only: bool,
}

/// Declaration order matters for priority ties: first rule of the
/// highest priority wins.
const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule { keyword: "database", agent_id: "backend_architect", priority: 3, word_only: false },
    KeywordRule { keyword: "backend", agent_id: "backend_architect", priority: 3, word_only: false },
    KeywordRule { keyword: "api", agent_id: "backend_architect", priority: 3, word_only: true },
    KeywordRule { keyword: "server", agent_id: "backend_architect", priority: 2, word_only: false },
    KeywordRule { keyword: "ui", agent_id: "frontend_developer", priority: 3, word_only: true },
    KeywordRule { keyword: "frontend", agent_id: "frontend_developer", priority: 3, word_only: false },
    KeywordRule { keyword: "css", agent_id: "frontend_developer", priority: 3, word_only: false },
    KeywordRule { keyword: "component", agent_id: "frontend_developer", priority: 2, word_only: false },
    KeywordRule { keyword: "test", agent_id: "qa_tester", priority: 3, word_only: false },
    KeywordRule { keyword: "qa", agent_id: "qa_tester", priority: 3, word_only: true },
    KeywordRule { keyword: "bug", agent_id: "qa_tester", priority: 2, word_only: false },
    KeywordRule { keyword: "deploy", agent_id: "devops_engineer", priority: 3, word_only: false },
    KeywordRule { keyword: "ci/cd", agent_id: "devops_engineer", priority: 3, word_only: false },
    KeywordRule { keyword: "infrastructure", agent_id: "devops_engineer", priority: 3, word_only: false },
    KeywordRule { keyword: "pipeline", agent_id: "devops_engineer", priority: 2, word_only: false },
    KeywordRule { keyword: "roadmap", agent_id: "product_manager", priority: 2, word_only: false },
    KeywordRule { keyword: "prioritize", agent_id: "product_manager", priority: 2, word_only: false },
    KeywordRule { keyword: "build", agent_id: "product_manager", priority: 1, word_only: true },
    KeywordRule { keyword: "create", agent_id: "product_manager", priority: 1, word_only: true },
    KeywordRule { keyword: "plan", agent_id: "product_manager", priority: 1, word_only: true },
];

const MENTION_TOKENS: &[(&str, &str)] = &[
    ("@pm", "product_manager"),
    ("@product", "product_manager"),
    ("@backend", "backend_architect"),
    ("@frontend", "frontend_developer"),
    ("@qa", "qa_tester"),
    ("@devops", "devops_engineer"),
];

fn is_word_boundary_match(haystack: &str, needle: &str) -> bool {
    let mut search_from = 0;
    while let Some(rel) = haystack[search_from..].find(needle) {
        let start = search_from + rel;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .last()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        if before_ok && after_ok {
            return true;
        }
        search_from = end;
    }
    false
}

/// Detects which agent a free-text utterance should route to, or `None`
/// if nothing matched.
pub fn detect(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();

    for (token, agent_id) in MENTION_TOKENS {
        if lowered.contains(token) {
            return Some(agent_id);
        }
    }

    let mut best: Option<(u8, &'static str)> = None;
    for rule in KEYWORD_RULES {
        let matched = if rule.word_only {
            is_word_boundary_match(&lowered, rule.keyword)
        } else {
            lowered.contains(rule.keyword)
        };
        if !matched {
            continue;
        }
        match best {
            Some((best_priority, _)) if best_priority >= rule.priority => {}
            _ => best = Some((rule.priority, rule.agent_id)),
        }
    }
    best.map(|(_, agent_id)| agent_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_preempts_keywords() {
        assert_eq!(detect("@qa please build the backend"), Some("qa_tester"));
    }

    #[test]
    fn specific_keyword_outranks_generic_verb() {
        assert_eq!(detect("please build the backend and database layer"), Some("backend_architect"));
    }

    #[test]
    fn case_insensitive() {
        let x = "Ship the DEPLOY pipeline";
        assert_eq!(detect(x), detect(&x.to_lowercase()));
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(detect("good morning team"), None);
    }

    #[test]
    fn word_boundary_respected() {
        // "api" should not match inside "rapidly"
        assert_eq!(detect("rapidly iterate on the roadmap"), Some("product_manager"));
    }

    #[test]
    fn same_agent_for_text_and_lowercased() {
        for sample in ["Build the Backend", "DEPLOY the API", "write a TEST"] {
            assert_eq!(detect(sample), detect(&sample.to_lowercase()));
        }
    }
}
