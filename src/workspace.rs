//! Sandboxed application of a `Plan` to a project's workspace directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::WorkspaceError;
use crate::plan::Plan;

/// Result of successfully applying a plan.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub summary: String,
    pub applied_files: Vec<String>,
    pub applied_mutations: Vec<String>,
}

/// Applies `plan` to the workspace rooted at `workspace_path`, on behalf
/// of `agent_display_name` (used only for the human-readable summary).
///
/// Every path in the plan is normalized and checked against the
/// canonicalized workspace root before anything is written; any path
/// that would escape the root fails the whole apply with no partial
/// writes for the offending entry.
pub fn apply(
    workspace_path: &Path,
    agent_display_name: &str,
    plan: &Plan,
) -> Result<ApplyOutcome, WorkspaceError> {
    let root = canonical_root(workspace_path)?;

    let mut applied_files = Vec::new();
    for file in &plan.files {
        let target = resolve_within(&root, &file.path)?;
        if target.exists() && !file.overwrite {
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::Io {
                path: file.path.clone(),
                source,
            })?;
        }
        fs::write(&target, &file.content).map_err(|source| WorkspaceError::Io {
            path: file.path.clone(),
            source,
        })?;
        applied_files.push(file.path.clone());
    }

    let mut applied_mutations = Vec::new();
    for mutation in &plan.mutations {
        let target = resolve_within(&root, &mutation.path)?;
        let existing = match fs::read_to_string(&target) {
            Ok(contents) => contents,
            Err(_) => continue,
        };
        if !existing.contains(&mutation.find) {
            continue;
        }
        let updated = existing.replacen(&mutation.find, &mutation.replace, 1);
        fs::write(&target, updated).map_err(|source| WorkspaceError::Io {
            path: mutation.path.clone(),
            source,
        })?;
        applied_mutations.push(mutation.path.clone());
    }

    let mut summary = format!(
        "{} updated workspace (files={}, mutations={})",
        agent_display_name,
        applied_files.len(),
        applied_mutations.len()
    );
    if !plan.notes.is_empty() {
        summary.push_str(" — ");
        summary.push_str(&plan.notes.join("; "));
    }

    Ok(ApplyOutcome { summary, applied_files, applied_mutations })
}

fn canonical_root(workspace_path: &Path) -> Result<PathBuf, WorkspaceError> {
    fs::create_dir_all(workspace_path).map_err(|source| WorkspaceError::Io {
        path: workspace_path.display().to_string(),
        source,
    })?;
    fs::canonicalize(workspace_path).map_err(|source| WorkspaceError::Io {
        path: workspace_path.display().to_string(),
        source,
    })
}

/// Normalizes `raw_path` (stripping a leading `/` or a duplicated
/// workspace-root prefix a model sometimes echoes back) and joins it
/// under `root`, rejecting anything that escapes the root once resolved.
fn resolve_within(root: &Path, raw_path: &str) -> Result<PathBuf, WorkspaceError> {
    let normalized = normalize_relative(root, raw_path);
    let joined = root.join(&normalized);

    let check = lexically_resolve(&joined);
    if !check.starts_with(root) {
        return Err(WorkspaceError::PathEscape { path: raw_path.to_string() });
    }
    Ok(joined)
}

fn normalize_relative(root: &Path, raw_path: &str) -> PathBuf {
    let mut candidate = raw_path.trim();
    candidate = candidate.trim_start_matches('/');

    if let Some(root_name) = root.file_name().and_then(|n| n.to_str()) {
        let prefix = format!("{root_name}/");
        if let Some(stripped) = candidate.strip_prefix(&prefix) {
            candidate = stripped;
        }
    }

    PathBuf::from(candidate)
}

/// Resolves `..`/`.` components purely lexically (the target file may
/// not exist yet, so `fs::canonicalize` isn't usable here).
fn lexically_resolve(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanFile, PlanMutation};
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn plan_with_file(path: &str, content: &str) -> Plan {
        Plan {
            files: vec![PlanFile { path: path.to_string(), content: content.to_string(), overwrite: true }],
            mutations: vec![],
            notes: vec![],
        }
    }

    #[test]
    fn writes_a_new_file() {
        let dir = tempdir().unwrap();
        let plan = plan_with_file("src/lib.rs", "fn main() {}");
        let outcome = apply(dir.path(), "backend_architect", &plan).unwrap();
        assert_eq!(outcome.applied_files, vec!["src/lib.rs".to_string()]);
        let written = fs::read_to_string(dir.path().join("src/lib.rs")).unwrap();
        assert_eq!(written, "fn main() {}");
    }

    #[test]
    fn rejects_path_escape() {
        let dir = tempdir().unwrap();
        let plan = plan_with_file("../outside.txt", "nope");
        let err = apply(dir.path(), "backend_architect", &plan).unwrap_err();
        assert!(matches!(err, WorkspaceError::PathEscape { .. }));
    }

    #[test]
    fn respects_overwrite_false() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "original").unwrap();
        let plan = Plan {
            files: vec![PlanFile { path: "keep.txt".into(), content: "new".into(), overwrite: false }],
            mutations: vec![],
            notes: vec![],
        };
        let outcome = apply(dir.path(), "qa_tester", &plan).unwrap();
        assert!(outcome.applied_files.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "original");
    }

    #[test]
    fn mutation_replaces_first_match_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "foo foo foo").unwrap();
        let plan = Plan {
            files: vec![],
            mutations: vec![PlanMutation { path: "a.txt".into(), find: "foo".into(), replace: "bar".into() }],
            notes: vec![],
        };
        let outcome = apply(dir.path(), "backend_architect", &plan).unwrap();
        assert_eq!(outcome.applied_mutations, vec!["a.txt".to_string()]);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "bar foo foo");
    }

    #[test]
    fn mutation_on_missing_find_is_skipped_silently() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let plan = Plan {
            files: vec![],
            mutations: vec![PlanMutation { path: "a.txt".into(), find: "absent".into(), replace: "x".into() }],
            notes: vec![],
        };
        let outcome = apply(dir.path(), "backend_architect", &plan).unwrap();
        assert!(outcome.applied_mutations.is_empty());
    }

    #[test]
    fn summary_includes_notes() {
        let dir = tempdir().unwrap();
        let plan = Plan { files: vec![], mutations: vec![], notes: vec!["nothing to do".into()] };
        let outcome = apply(dir.path(), "product_manager", &plan).unwrap();
        assert!(outcome.summary.contains("nothing to do"));
        assert!(outcome.summary.contains("files=0"));
    }

    #[test]
    fn strips_duplicated_workspace_root_prefix() {
        let dir = tempdir().unwrap();
        let root_name = dir.path().file_name().unwrap().to_str().unwrap().to_string();
        let echoed_path = format!("{root_name}/notes.txt");
        let plan = plan_with_file(&echoed_path, "hi");
        let outcome = apply(dir.path(), "backend_architect", &plan).unwrap();
        assert_eq!(outcome.applied_files, vec![echoed_path]);
        assert!(dir.path().join("notes.txt").exists());
    }

    proptest::proptest! {
        /// `apply` never creates a file outside the workspace root: any
        /// plan path built from an arbitrary run of `../` segments either
        /// lands inside the root or is rejected with `PathEscape`.
        #[test]
        fn apply_never_escapes_the_workspace_root(depth in 0usize..6, leaf in "[a-z]{1,8}") {
            let dir = tempdir().unwrap();
            let escaping_path = format!("{}{leaf}.txt", "../".repeat(depth));
            let plan = plan_with_file(&escaping_path, "payload");

            match apply(dir.path(), "qa_tester", &plan) {
                Ok(outcome) => {
                    for file in &outcome.applied_files {
                        let target = dir.path().join(file);
                        let resolved = lexically_resolve(&target);
                        prop_assert!(resolved.starts_with(dir.path()));
                    }
                }
                Err(WorkspaceError::PathEscape { .. }) => {}
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
