//! Named, ready-to-run workflow factories.

use orchestra_types::config::EngineConfig;
use orchestra_types::workflow::{DependencyRef, ErrorHandlingMode, WorkflowDefinition};

use super::builder::{StepOptions, WorkflowBuilder};

/// A catalog entry: name, one-line description and factory.
struct Preset {
    name: &'static str,
    description: &'static str,
    build: fn(&EngineConfig) -> WorkflowDefinition,
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "research-pipeline",
        description: "parallel gatherers feed an analyst, then a writer (confidence gated)",
        build: research_pipeline,
    },
    Preset {
        name: "review-chain",
        description: "drafter, reviewer gated at the default confidence, reviser (lenient)",
        build: review_chain,
    },
    Preset {
        name: "fan-out",
        description: "three independent workers in one parallel stage",
        build: fan_out,
    },
];

/// Lookup of preset workflows by name.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    config: EngineConfig,
}

impl PresetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presets built with `config`'s default confidence threshold and backoff.
    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Preset names, in catalog order.
    pub fn names(&self) -> Vec<&'static str> {
        PRESETS.iter().map(|p| p.name).collect()
    }

    /// `(name, description)` pairs, in catalog order.
    pub fn entries(&self) -> Vec<(&'static str, &'static str)> {
        PRESETS.iter().map(|p| (p.name, p.description)).collect()
    }

    /// Build a fresh definition for `name`, or `None` if no such preset exists.
    pub fn build(&self, name: &str) -> Option<WorkflowDefinition> {
        PRESETS
            .iter()
            .find(|p| p.name == name)
            .map(|p| (p.build)(&self.config))
    }
}

fn research_pipeline(config: &EngineConfig) -> WorkflowDefinition {
    WorkflowBuilder::with_config("research-pipeline", config)
        .description("Gather sources in parallel, analyze them, write a report")
        .add_parallel_steps(&["web-gatherer", "paper-gatherer"], StepOptions::new().retry(1, 500))
        .add_dependent_step("analyst", &["web-gatherer", "paper-gatherer"], StepOptions::new())
        .add_dependent_step("writer", &["analyst"], StepOptions::new().retry(1, 500))
        .build()
}

fn review_chain(config: &EngineConfig) -> WorkflowDefinition {
    WorkflowBuilder::with_config("review-chain", config)
        .description("Draft, review and revise; low-confidence drafts skip review")
        .error_handling(ErrorHandlingMode::Lenient)
        .add_step("drafter", StepOptions::new())
        .add_dependent_step("reviewer", &["drafter"], StepOptions::new().skip_on_error(true))
        .add_step(
            "reviser",
            StepOptions::new()
                .depends_on(DependencyRef::required("drafter"))
                .depends_on(DependencyRef::optional("reviewer")),
        )
        .build()
}

fn fan_out(config: &EngineConfig) -> WorkflowDefinition {
    WorkflowBuilder::with_config("fan-out", config)
        .description("Independent workers run side by side")
        .add_parallel_steps(&["alpha", "beta", "gamma"], StepOptions::new())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::definition::validate_definition;
    use crate::workflow::planner::SchedulePlanner;

    #[test]
    fn every_preset_validates_and_plans() {
        let catalog = PresetCatalog::new();
        assert_eq!(catalog.names(), vec!["research-pipeline", "review-chain", "fan-out"]);
        for name in catalog.names() {
            let def = catalog.build(name).unwrap();
            assert_eq!(def.name, name);
            validate_definition(&def).unwrap();
            let plan = SchedulePlanner::plan(&def).unwrap();
            assert_eq!(plan.step_count(), def.steps.len());
        }
    }

    #[test]
    fn research_pipeline_shape() {
        let def = PresetCatalog::new().build("research-pipeline").unwrap();
        let plan = SchedulePlanner::plan(&def).unwrap();
        assert_eq!(plan.stages.len(), 3);
        assert!(plan.stages[0].can_run_in_parallel);
        assert_eq!(plan.stage_of("writer"), Some(2));
        let analyst = def.step_for_worker("analyst").unwrap();
        assert!(analyst.depends_on.iter().all(|d| d.min_confidence == Some(0.7)));
    }

    #[test]
    fn review_chain_is_lenient() {
        let def = PresetCatalog::new().build("review-chain").unwrap();
        assert_eq!(def.error_handling, ErrorHandlingMode::Lenient);
        assert!(def.step_for_worker("reviewer").unwrap().skip_on_error);
    }

    #[test]
    fn fan_out_is_one_stage() {
        let def = PresetCatalog::new().build("fan-out").unwrap();
        let plan = SchedulePlanner::plan(&def).unwrap();
        assert_eq!(plan.stages.len(), 1);
        assert_eq!(plan.stages[0].steps.len(), 3);
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(PresetCatalog::new().build("nope").is_none());
    }

    #[test]
    fn with_config_threads_threshold() {
        let config = EngineConfig {
            default_min_confidence: 0.5,
            ..EngineConfig::default()
        };
        let def = PresetCatalog::with_config(config).build("review-chain").unwrap();
        let reviewer = def.step_for_worker("reviewer").unwrap();
        assert_eq!(reviewer.depends_on[0].min_confidence, Some(0.5));
    }
}
