// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::scenario::definition::{ScenarioDefinition, ScenarioStep};
use crate::state::types::ClusterConfig;
use crate::traits::CommandResult;
use crate::validation::inference::{InferenceEngine, InferredValidation};
use crate::validation::matcher::matching_indices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Incomplete,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: String,
    pub status: StepStatus,
    /// Indices into the step's expected commands matched so far.
    pub matched: BTreeSet<usize>,
    pub required: usize,
}

impl StepProgress {
    pub fn fraction(&self) -> f64 {
        (self.matched.len().min(self.required) as f64) / (self.required as f64)
    }
}

/// Something the learner should hear about after a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum StepEvent {
    Progress { step_id: String, progress: f64 },
    /// The command matched but its result did not meet expectations.
    CheckFailed { step_id: String, reasons: Vec<String> },
    Completed { step_id: String },
    ScenarioCompleted { scenario_id: String },
}

/// Tracks a learner's way through one scenario's steps.
///
/// Steps are worked in order; a command only counts toward the first step
/// that is not yet complete.
#[derive(Debug, Clone)]
pub struct ScenarioValidator {
    definition: ScenarioDefinition,
    progress: Vec<StepProgress>,
    engine: InferenceEngine,
}

impl ScenarioValidator {
    pub fn new(definition: ScenarioDefinition) -> Self {
        let progress = definition
            .steps
            .iter()
            .map(|step| StepProgress {
                step_id: step.id.clone(),
                status: StepStatus::Incomplete,
                matched: BTreeSet::new(),
                required: step.required_matches(),
            })
            .collect();
        Self {
            definition,
            progress,
            engine: InferenceEngine::new(),
        }
    }

    pub fn definition(&self) -> &ScenarioDefinition {
        &self.definition
    }

    pub fn progress(&self) -> &[StepProgress] {
        &self.progress
    }

    pub fn step_status(&self, step_id: &str) -> Option<StepStatus> {
        self.progress
            .iter()
            .find(|p| p.step_id == step_id)
            .map(|p| p.status)
    }

    fn current_index(&self) -> Option<usize> {
        self.progress
            .iter()
            .position(|p| p.status == StepStatus::Incomplete)
    }

    pub fn current_step(&self) -> Option<&ScenarioStep> {
        self.current_index().map(|i| &self.definition.steps[i])
    }

    pub fn is_complete(&self) -> bool {
        self.current_index().is_none()
    }

    /// Expectations for `command` under the current step.
    pub fn expectations(
        &self,
        step: &ScenarioStep,
        command: &str,
        cluster: &ClusterConfig,
        current_node: &str,
    ) -> InferredValidation {
        let inferred = self
            .engine
            .infer(command, cluster, current_node, &self.definition.faults);
        match &step.validation {
            Some(overrides) => inferred.merged_with(overrides),
            None => inferred,
        }
    }

    /// Feed one executed command and its result.
    pub fn observe(
        &mut self,
        command: &str,
        result: &CommandResult,
        cluster: &ClusterConfig,
        current_node: &str,
    ) -> Vec<StepEvent> {
        let Some(index) = self.current_index() else {
            return Vec::new();
        };
        let step = &self.definition.steps[index];

        let matched = if step.expected_commands.is_empty() {
            vec![0]
        } else {
            matching_indices(command, &step.expected_commands)
        };
        if matched.is_empty() {
            return Vec::new();
        }

        let step_id = step.id.clone();
        let failures = self
            .expectations(step, command, cluster, current_node)
            .check(result);
        if !failures.is_empty() {
            debug!("Command '{command}' matched step '{step_id}' but failed checks: {failures:?}");
            return vec![StepEvent::CheckFailed {
                step_id,
                reasons: failures,
            }];
        }

        let progress = &mut self.progress[index];
        let before = progress.matched.len();
        progress.matched.extend(matched);
        if progress.matched.len() == before {
            return Vec::new();
        }

        let mut events = vec![StepEvent::Progress {
            step_id: step_id.clone(),
            progress: progress.fraction(),
        }];
        if progress.matched.len() >= progress.required {
            progress.status = StepStatus::Completed;
            info!("Step '{step_id}' completed");
            events.push(StepEvent::Completed { step_id });
            if self.is_complete() {
                info!("Scenario '{}' completed", self.definition.id);
                events.push(StepEvent::ScenarioCompleted {
                    scenario_id: self.definition.id.clone(),
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{build_cluster, ClusterBuildConfig};

    fn definition(require_all: bool) -> ScenarioDefinition {
        ScenarioDefinition::from_json(&format!(
            r#"{{"id": "triage", "title": "Triage", "steps": [
                {{"id": "look", "title": "Look", "requireAllCommands": {require_all},
                  "expectedCommands": ["sinfo", "squeue"]}},
                {{"id": "node", "title": "Node", "expectedCommands": ["scontrol show node"]}}
            ]}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_any_of_step_completes_on_first_match() {
        let cluster = build_cluster(&ClusterBuildConfig::default());
        let mut validator = ScenarioValidator::new(definition(false));
        let events = validator.observe("squeue", &CommandResult::ok(""), &cluster, "dgx-01");
        assert!(events.contains(&StepEvent::Completed {
            step_id: "look".to_string()
        }));
        assert_eq!(validator.current_step().unwrap().id, "node");
    }

    #[test]
    fn test_require_all_tracks_progress() {
        let cluster = build_cluster(&ClusterBuildConfig::default());
        let mut validator = ScenarioValidator::new(definition(true));
        let events = validator.observe("sinfo -N", &CommandResult::ok(""), &cluster, "dgx-01");
        assert_eq!(
            events,
            vec![StepEvent::Progress {
                step_id: "look".to_string(),
                progress: 0.5
            }]
        );
        // Repeating a matched command adds nothing
        assert!(validator
            .observe("sinfo", &CommandResult::ok(""), &cluster, "dgx-01")
            .is_empty());
        validator.observe("squeue", &CommandResult::ok(""), &cluster, "dgx-01");
        assert_eq!(validator.step_status("look"), Some(StepStatus::Completed));
    }

    #[test]
    fn test_failed_check_does_not_advance() {
        let cluster = build_cluster(&ClusterBuildConfig::default());
        let mut validator = ScenarioValidator::new(definition(false));
        let events = validator.observe("sinfo", &CommandResult::error(1, "boom"), &cluster, "dgx-01");
        assert!(matches!(events[0], StepEvent::CheckFailed { .. }));
        assert_eq!(validator.step_status("look"), Some(StepStatus::Incomplete));
    }

    #[test]
    fn test_plural_satisfies_singular_and_scenario_completes() {
        let cluster = build_cluster(&ClusterBuildConfig::default());
        let mut validator = ScenarioValidator::new(definition(false));
        validator.observe("sinfo", &CommandResult::ok(""), &cluster, "dgx-01");
        let events = validator.observe(
            "scontrol show nodes",
            &CommandResult::ok("NodeName=dgx-01 State=IDLE"),
            &cluster,
            "dgx-01",
        );
        assert!(events.contains(&StepEvent::ScenarioCompleted {
            scenario_id: "triage".to_string()
        }));
        assert!(validator.is_complete());
    }
}
