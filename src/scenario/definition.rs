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

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scenario::faults::FaultConfig;
use crate::validation::inference::ValidationOverride;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStep {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default)]
    pub expected_commands: Vec<String>,
    /// Every expected command must be run, not just one of them.
    #[serde(default)]
    pub require_all_commands: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOverride>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

impl ScenarioStep {
    /// How many expected commands must match before the step completes.
    pub fn required_matches(&self) -> usize {
        if self.require_all_commands {
            self.expected_commands.len().max(1)
        } else {
            1
        }
    }
}

/// A training exercise: faults to inject and the steps a learner works through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDefinition {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub faults: Vec<FaultConfig>,
    pub steps: Vec<ScenarioStep>,
}

impl ScenarioDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: ScenarioDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Structural checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidScenario("scenario id is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(Error::InvalidScenario(format!(
                "scenario '{}' has no steps",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(Error::InvalidScenario(format!(
                    "duplicate step id '{}' in scenario '{}'",
                    step.id, self.id
                )));
            }
            if step.expected_commands.is_empty() && step.validation.is_none() {
                return Err(Error::InvalidScenario(format!(
                    "step '{}' has neither expected commands nor validation",
                    step.id
                )));
            }
        }
        Ok(())
    }

    pub fn step(&self, step_id: &str) -> Option<&ScenarioStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const XID_DRILL: &str = r#"{
        "id": "xid-79-drill",
        "title": "GPU fallen off the bus",
        "faults": [
            {"nodeId": "dgx-01", "gpuId": 0, "type": "xid-error", "severity": "critical",
             "parameters": {"xid": 79}}
        ],
        "steps": [
            {"id": "inspect", "title": "Find the failed GPU",
             "expectedCommands": ["nvidia-smi", "nvidia-smi -q"]},
            {"id": "drain", "title": "Drain the node",
             "expectedCommands": ["scontrol update nodename=dgx-01 state=drain"],
             "validation": {"expectedExitCode": 0}}
        ]
    }"#;

    #[test]
    fn test_parse_definition() {
        let def = ScenarioDefinition::from_json(XID_DRILL).unwrap();
        assert_eq!(def.faults.len(), 1);
        assert_eq!(def.steps[0].required_matches(), 1);
        assert_eq!(
            def.step("drain").unwrap().validation,
            Some(ValidationOverride {
                expected_exit_code: Some(0),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let json = r#"{"id": "s", "title": "t", "steps": [
            {"id": "a", "title": "A", "expectedCommands": ["sinfo"]},
            {"id": "a", "title": "B", "expectedCommands": ["squeue"]}
        ]}"#;
        let err = ScenarioDefinition::from_json(json).unwrap_err();
        assert!(matches!(err, Error::InvalidScenario(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(XID_DRILL.as_bytes()).unwrap();
        let def = ScenarioDefinition::load(file.path()).unwrap();
        assert_eq!(def.id, "xid-79-drill");

        let err = ScenarioDefinition::load("/nonexistent/scenario.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
