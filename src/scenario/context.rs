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

use chrono::{DateTime, Utc};

use crate::state::types::ClusterConfig;
use crate::traits::ClusterState;

/// Private, mutable copy of the cluster for one exercise.
///
/// The cluster is deep-cloned at construction and never written back.
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    scenario_id: String,
    cluster: ClusterConfig,
    mutation_count: u64,
    created_at: DateTime<Utc>,
}

impl ScenarioContext {
    pub fn new(scenario_id: impl Into<String>, baseline: &ClusterConfig) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            cluster: baseline.clone(),
            mutation_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    pub fn mutation_count(&self) -> u64 {
        self.mutation_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl ClusterState for ScenarioContext {
    fn cluster(&self) -> &ClusterConfig {
        &self.cluster
    }

    fn cluster_mut(&mut self) -> &mut ClusterConfig {
        &mut self.cluster
    }

    fn record_mutation(&mut self) {
        self.mutation_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{build_cluster, ClusterBuildConfig, GpuUpdate, HealthStatus};

    #[test]
    fn test_context_is_isolated_from_baseline() {
        let baseline = build_cluster(&ClusterBuildConfig::default());
        let mut ctx = ScenarioContext::new("xid-drill", &baseline);
        ctx.update_gpu(
            "dgx-01",
            3,
            GpuUpdate {
                health_status: Some(HealthStatus::Critical),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(ctx.mutation_count(), 1);
        assert_eq!(
            ctx.gpu("dgx-01", 3).unwrap().health_status,
            HealthStatus::Critical
        );
        assert_eq!(
            baseline.gpu("dgx-01", 3).unwrap().health_status,
            HealthStatus::Ok
        );
    }

    #[test]
    fn test_every_named_operation_counts() {
        let baseline = build_cluster(&ClusterBuildConfig::default());
        let mut ctx = ScenarioContext::new("ops", &baseline);
        ctx.set_slurm_state("dgx-02", crate::state::SlurmNodeState::Drained, None)
            .unwrap();
        ctx.reset_gpu("dgx-01", 0).unwrap();
        ctx.clear_sel("dgx-01").unwrap();
        assert_eq!(ctx.mutation_count(), 3);
    }
}
