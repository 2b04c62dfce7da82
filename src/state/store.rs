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

use tracing::info;

use crate::state::factory::{build_cluster, ClusterBuildConfig};
use crate::state::types::ClusterConfig;
use crate::traits::ClusterState;

/// The canonical cluster model.
///
/// Owned by the session and handed to simulators through the
/// [`ClusterState`] trait when no scenario context is active.
#[derive(Debug, Clone)]
pub struct ClusterStore {
    build_config: ClusterBuildConfig,
    cluster: ClusterConfig,
    revision: u64,
}

impl ClusterStore {
    pub fn new(build_config: ClusterBuildConfig) -> Self {
        let cluster = build_cluster(&build_config);
        info!(
            "Built cluster '{}' with {} {} nodes",
            cluster.name,
            cluster.nodes.len(),
            build_config.system_type
        );
        Self {
            build_config,
            cluster,
            revision: 0,
        }
    }

    /// Wrap an existing cluster model, e.g. one loaded from JSON.
    pub fn from_cluster(cluster: ClusterConfig) -> Self {
        let build_config = ClusterBuildConfig {
            name: cluster.name.clone(),
            node_count: cluster.nodes.len(),
            ..ClusterBuildConfig::default()
        };
        Self {
            build_config,
            cluster,
            revision: 0,
        }
    }

    pub fn build_config(&self) -> &ClusterBuildConfig {
        &self.build_config
    }

    /// Rebuild the cluster from the build configuration, discarding all changes.
    pub fn reset(&mut self) {
        self.cluster = build_cluster(&self.build_config);
        self.revision += 1;
        info!("Cluster '{}' reset to baseline", self.cluster.name);
    }

    /// Deep copy of the current model.
    pub fn snapshot(&self) -> ClusterConfig {
        self.cluster.clone()
    }

    /// Number of state changes applied since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl Default for ClusterStore {
    fn default() -> Self {
        Self::new(ClusterBuildConfig::default())
    }
}

impl ClusterState for ClusterStore {
    fn cluster(&self) -> &ClusterConfig {
        &self.cluster
    }

    fn cluster_mut(&mut self) -> &mut ClusterConfig {
        &mut self.cluster
    }

    fn record_mutation(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::mutations::GpuUpdate;

    #[test]
    fn test_snapshot_is_detached() {
        let mut store = ClusterStore::default();
        let snapshot = store.snapshot();
        store
            .update_gpu(
                "dgx-01",
                0,
                GpuUpdate {
                    temperature: Some(88),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_ne!(snapshot, *store.cluster());
        assert_eq!(snapshot.gpu("dgx-01", 0).unwrap().temperature, 30);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_reset_restores_baseline() {
        let mut store = ClusterStore::default();
        let baseline = store.snapshot();
        store
            .set_slurm_state("dgx-02", crate::state::SlurmNodeState::Down, None)
            .unwrap();
        store.reset();
        assert_eq!(*store.cluster(), baseline);
    }

    #[test]
    fn test_failed_mutation_is_not_counted() {
        let mut store = ClusterStore::default();
        assert!(store.update_gpu("dgx-01", 8, GpuUpdate::default()).is_err());
        assert_eq!(store.revision(), 0);
    }
}
