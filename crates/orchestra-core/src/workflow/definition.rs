//! Workflow definition validation, YAML parsing, and filesystem operations.
//!
//! Converts between YAML files and the canonical `WorkflowDefinition`,
//! validates structural constraints (unique step IDs and worker references,
//! value ranges), and loads or saves workflow files.
//!
//! Dependency references are deliberately NOT resolved here: a dependency on
//! a worker that no step provides is reported by the planner, which cannot
//! make progress past it.

use std::collections::HashSet;
use std::path::Path;

use orchestra_types::workflow::WorkflowDefinition;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - Name is non-empty
/// - Step IDs are non-empty and unique
/// - Worker references are non-empty and unique (results are keyed by them)
/// - `min_confidence` lies within `[0, 1]`
/// - `max_concurrency >= 1` if set
/// - Timeouts are `> 0` if set
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    let mut seen_workers = HashSet::new();
    for step in &def.steps {
        if step.id.is_empty() {
            return Err(WorkflowError::ValidationError(
                "step ID must not be empty".to_string(),
            ));
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
        if step.worker_ref.is_empty() {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' has an empty worker reference",
                step.id
            )));
        }
        if !seen_workers.insert(step.worker_ref.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "worker '{}' is bound to more than one step",
                step.worker_ref
            )));
        }
        if step.timeout_ms == Some(0) {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' timeout must be > 0",
                step.id
            )));
        }
        for dep in &step.depends_on {
            if let Some(min) = dep.min_confidence {
                if !(0.0..=1.0).contains(&min) {
                    return Err(WorkflowError::ValidationError(format!(
                        "step '{}' dependency on '{}' has min_confidence {} outside [0, 1]",
                        step.id, dep.worker_ref, min
                    )));
                }
            }
        }
    }

    if def.max_concurrency == Some(0) {
        return Err(WorkflowError::ValidationError(
            "max_concurrency must be >= 1".to_string(),
        ));
    }

    if def.global_timeout_ms == Some(0) {
        return Err(WorkflowError::ValidationError(
            "global timeout must be > 0".to_string(),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Save a workflow definition to a YAML file.
///
/// Creates parent directories if they don't exist.
pub fn save_workflow_file(path: &Path, def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_workflow_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_types::workflow::{
        DependencyRef, ErrorHandlingMode, FallbackBehavior, StepSpec,
    };
    use std::collections::HashMap;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn minimal_workflow(name: &str, steps: Vec<StepSpec>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: None,
            created_at: chrono::Utc::now(),
            steps,
            max_concurrency: None,
            global_timeout_ms: None,
            error_handling: ErrorHandlingMode::Strict,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_parse_yaml_full() {
        let yaml = r#"
name: daily-digest
description: Gather news and summarize
max_concurrency: 2
global_timeout_ms: 30000
error_handling: lenient
steps:
  - id: gather
    worker_ref: gatherer
    parallel: true
    retry:
      max_retries: 2
      backoff_ms: 50
  - id: summarize
    worker_ref: summarizer
    skip_on_error: true
    depends_on:
      - worker_ref: gatherer
        min_confidence: 0.6
        fallback: skip
"#;
        let def = parse_workflow_yaml(yaml).unwrap();
        assert_eq!(def.name, "daily-digest");
        assert_eq!(def.max_concurrency, Some(2));
        assert_eq!(def.global_timeout_ms, Some(30_000));
        assert_eq!(def.error_handling, ErrorHandlingMode::Lenient);
        assert_eq!(def.steps.len(), 2);
        assert!(def.steps[0].parallel);
        assert_eq!(def.steps[0].retry.max_retries, 2);
        assert!(def.steps[1].skip_on_error);
        assert_eq!(def.steps[1].depends_on[0].fallback, FallbackBehavior::Skip);
    }

    #[test]
    fn test_parse_yaml_invalid_syntax() {
        let err = parse_workflow_yaml("name: [unterminated").unwrap_err();
        assert!(matches!(err, WorkflowError::ParseError(_)));
    }

    #[test]
    fn test_serialize_then_parse_preserves_definition() {
        let mut step = StepSpec::new("b", "writer");
        step.depends_on = vec![DependencyRef::required("reader").with_min_confidence(0.7)];
        let def = minimal_workflow("pipeline", vec![StepSpec::new("a", "reader"), step]);

        let yaml = serialize_workflow_yaml(&def).unwrap();
        let parsed = parse_workflow_yaml(&yaml).unwrap();
        assert_eq!(parsed, def);
    }

    #[test]
    fn test_validate_empty_name() {
        let def = minimal_workflow("  ", vec![StepSpec::new("a", "w")]);
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("name must not be empty"));
    }

    #[test]
    fn test_validate_duplicate_step_ids() {
        let def = minimal_workflow(
            "dup",
            vec![StepSpec::new("a", "w1"), StepSpec::new("a", "w2")],
        );
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("duplicate step ID"));
    }

    #[test]
    fn test_validate_duplicate_worker_refs() {
        let def = minimal_workflow(
            "dup",
            vec![StepSpec::new("a", "writer"), StepSpec::new("b", "writer")],
        );
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("more than one step"));
    }

    #[test]
    fn test_validate_confidence_range() {
        let mut step = StepSpec::new("b", "writer");
        step.depends_on = vec![DependencyRef::required("reader").with_min_confidence(1.2)];
        let def = minimal_workflow("range", vec![StepSpec::new("a", "reader"), step]);
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
    }

    #[test]
    fn test_validate_zero_limits() {
        let mut def = minimal_workflow("limits", vec![StepSpec::new("a", "w")]);
        def.max_concurrency = Some(0);
        assert!(validate_definition(&def).is_err());

        def.max_concurrency = Some(1);
        def.global_timeout_ms = Some(0);
        assert!(validate_definition(&def).is_err());

        def.global_timeout_ms = None;
        def.steps[0].timeout_ms = Some(0);
        assert!(validate_definition(&def).is_err());
    }

    #[test]
    fn test_validate_allows_dangling_dependency() {
        // Reported by the planner, not by validation.
        let mut step = StepSpec::new("a", "writer");
        step.depends_on = vec![DependencyRef::required("ghost")];
        let def = minimal_workflow("dangling", vec![step]);
        assert!(validate_definition(&def).is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let def = minimal_workflow("saved", vec![StepSpec::new("a", "w")]);
        let path = tmp.path().join("nested").join("saved.yaml");
        save_workflow_file(&path, &def).unwrap();

        let loaded = load_workflow_file(&path).unwrap();
        assert_eq!(loaded.id, def.id);
        assert_eq!(loaded.steps.len(), 1);
    }
}
