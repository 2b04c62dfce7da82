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

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::scenario::context::ScenarioContext;
use crate::state::types::ClusterConfig;

/// Owns the scenario contexts of a session and tracks the active one.
#[derive(Debug, Default)]
pub struct ScenarioContextManager {
    contexts: HashMap<String, ScenarioContext>,
    active: Option<String>,
}

impl ScenarioContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the context for `scenario_id`, creating it from `baseline` on first use.
    pub fn get_or_create(&mut self, scenario_id: &str, baseline: &ClusterConfig) -> &mut ScenarioContext {
        self.contexts
            .entry(scenario_id.to_string())
            .or_insert_with(|| {
                info!("Creating scenario context '{scenario_id}'");
                ScenarioContext::new(scenario_id, baseline)
            })
    }

    pub fn get(&self, scenario_id: &str) -> Option<&ScenarioContext> {
        self.contexts.get(scenario_id)
    }

    pub fn get_mut(&mut self, scenario_id: &str) -> Option<&mut ScenarioContext> {
        self.contexts.get_mut(scenario_id)
    }

    /// Activate a context, or deactivate with `None`.
    pub fn set_active_context(&mut self, scenario_id: Option<&str>) -> Result<()> {
        match scenario_id {
            Some(id) if !self.contexts.contains_key(id) => Err(Error::InvalidScenario(format!(
                "no context for scenario '{id}'"
            ))),
            Some(id) => {
                debug!("Activating scenario context '{id}'");
                self.active = Some(id.to_string());
                Ok(())
            }
            None => {
                self.active = None;
                Ok(())
            }
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_context(&self) -> Option<&ScenarioContext> {
        self.active.as_ref().and_then(|id| self.contexts.get(id))
    }

    pub fn active_context_mut(&mut self) -> Option<&mut ScenarioContext> {
        match &self.active {
            Some(id) => self.contexts.get_mut(id),
            None => None,
        }
    }

    /// Drop a context, deactivating it first if it is active.
    pub fn destroy_context(&mut self, scenario_id: &str) -> bool {
        if self.active.as_deref() == Some(scenario_id) {
            self.active = None;
        }
        let removed = self.contexts.remove(scenario_id).is_some();
        if removed {
            info!("Destroyed scenario context '{scenario_id}'");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{build_cluster, ClusterBuildConfig, GpuUpdate};
    use crate::traits::ClusterState;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let baseline = build_cluster(&ClusterBuildConfig::default());
        let mut manager = ScenarioContextManager::new();
        manager
            .get_or_create("s1", &baseline)
            .update_gpu(
                "dgx-01",
                0,
                GpuUpdate {
                    temperature: Some(70),
                    ..Default::default()
                },
            )
            .unwrap();
        let again = manager.get_or_create("s1", &baseline);
        assert_eq!(again.mutation_count(), 1);
        assert_eq!(again.gpu("dgx-01", 0).unwrap().temperature, 70);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_activation_lifecycle() {
        let baseline = build_cluster(&ClusterBuildConfig::default());
        let mut manager = ScenarioContextManager::new();
        assert!(manager.set_active_context(Some("missing")).is_err());

        manager.get_or_create("s1", &baseline);
        manager.set_active_context(Some("s1")).unwrap();
        assert_eq!(manager.active_id(), Some("s1"));

        assert!(manager.destroy_context("s1"));
        assert!(manager.active_context().is_none());
        assert!(!manager.destroy_context("s1"));
        assert!(manager.is_empty());
    }
}
