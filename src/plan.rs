//! Mutation plan parsing.
//!
//! Permissive by design: semantics like path-escape detection are the
//! `workspace` module's job, not this parser's.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PlanFile {
    pub path: String,
    pub content: String,
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanMutation {
    pub path: String,
    pub find: String,
    pub replace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Plan {
    #[serde(default)]
    pub files: Vec<PlanFile>,
    #[serde(default)]
    pub mutations: Vec<PlanMutation>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.mutations.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no JSON object found in text")]
    NoObjectFound,
    #[error("failed to parse plan JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parses a `Plan` out of arbitrary text: first by treating the whole
/// trimmed text as JSON, then by locating the outermost `{...}` span.
pub fn parse(text: &str) -> Result<Plan, PlanError> {
    let trimmed = text.trim();
    if let Ok(plan) = serde_json::from_str::<Plan>(trimmed) {
        return Ok(plan);
    }

    let start = trimmed.find('{').ok_or(PlanError::NoObjectFound)?;
    let end = trimmed.rfind('}').ok_or(PlanError::NoObjectFound)?;
    if end < start {
        return Err(PlanError::NoObjectFound);
    }
    let candidate = &trimmed[start..=end];
    let plan: Plan = serde_json::from_str(candidate)?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_bare_json() {
        let text = r#"{"files":[{"path":"README.md","content":"hi","overwrite":true}],"notes":["seeded readme"]}"#;
        let plan = parse(text).unwrap();
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.files[0].path, "README.md");
        assert_eq!(plan.notes, vec!["seeded readme".to_string()]);
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let text = "Here is my plan:\n{\"files\":[],\"mutations\":[],\"notes\":[\"no changes\"]}\nThanks!";
        let plan = parse(text).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.notes, vec!["no changes".to_string()]);
    }

    #[test]
    fn rejects_text_with_no_object() {
        assert!(matches!(parse("just prose, no plan here"), Err(PlanError::NoObjectFound)));
    }

    #[test]
    fn empty_files_and_mutations_is_legal() {
        let plan = parse(r#"{"files":[],"mutations":[]}"#).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn overwrite_defaults_to_true() {
        let plan = parse(r#"{"files":[{"path":"a.txt","content":"x"}]}"#).unwrap();
        assert!(plan.files[0].overwrite);
    }

    proptest::proptest! {
        /// Wrapping a valid plan object in arbitrary prose before and
        /// after never changes what it parses to: the brace-span fallback
        /// always recovers exactly the embedded object.
        #[test]
        fn surrounding_prose_never_changes_the_parsed_plan(
            prefix in "[^{}]{0,40}",
            suffix in "[^{}]{0,40}",
            path in "[a-z/]{1,12}",
        ) {
            let object = format!(r#"{{"files":[{{"path":"{path}","content":"x","overwrite":true}}]}}"#);
            let bare = parse(&object).unwrap();
            let wrapped = format!("{prefix}{object}{suffix}");
            let recovered = parse(&wrapped).unwrap();
            prop_assert_eq!(bare, recovered);
        }
    }
}
