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

use std::collections::BTreeMap;

use crate::error::Result;
use crate::state::mutations::{GpuUpdate, HcaUpdate, JobRequest, NvLinkUpdate};
use crate::state::types::{
    ClusterConfig, Container, EccErrors, Gpu, HealthStatus, MigInstance, Node, PowerState, SlurmNodeState,
    XidError,
};

/// Read/write view of a cluster model.
///
/// Implemented by the canonical store and by scenario contexts. Simulators
/// only ever see this trait, so the same command code runs against either.
///
/// Implementors provide access to the model and a mutation hook; the named
/// operations are provided on top. Every provided operation that succeeds
/// calls [`record_mutation`](Self::record_mutation) exactly once, and one
/// that fails leaves the model untouched.
pub trait ClusterState {
    fn cluster(&self) -> &ClusterConfig;

    fn cluster_mut(&mut self) -> &mut ClusterConfig;

    /// Called after every successful state change.
    fn record_mutation(&mut self);

    fn node(&self, node_id: &str) -> Option<&Node> {
        self.cluster().node(node_id)
    }

    fn gpu(&self, node_id: &str, gpu_id: u32) -> Option<&Gpu> {
        self.cluster().gpu(node_id, gpu_id)
    }

    fn update_gpu(&mut self, node_id: &str, gpu_id: u32, update: GpuUpdate) -> Result<()> {
        self.cluster_mut().update_gpu(node_id, gpu_id, update)?;
        self.record_mutation();
        Ok(())
    }

    fn add_xid_error(&mut self, node_id: &str, gpu_id: u32, xid: XidError) -> Result<()> {
        self.cluster_mut().add_xid_error(node_id, gpu_id, xid)?;
        self.record_mutation();
        Ok(())
    }

    fn set_slurm_state(
        &mut self,
        node_id: &str,
        state: SlurmNodeState,
        reason: Option<String>,
    ) -> Result<()> {
        self.cluster_mut().set_slurm_state(node_id, state, reason)?;
        self.record_mutation();
        Ok(())
    }

    fn allocate_gpus_for_job(&mut self, job_id: u32, node_id: &str, gpu_ids: &[u32]) -> Result<()> {
        self.cluster_mut()
            .allocate_gpus_for_job(job_id, node_id, gpu_ids)?;
        self.record_mutation();
        Ok(())
    }

    fn deallocate_gpus_for_job(&mut self, job_id: u32) -> Result<()> {
        self.cluster_mut().deallocate_gpus_for_job(job_id)?;
        self.record_mutation();
        Ok(())
    }

    fn update_hca(&mut self, node_id: &str, hca_name: &str, update: HcaUpdate) -> Result<()> {
        self.cluster_mut().update_hca(node_id, hca_name, update)?;
        self.record_mutation();
        Ok(())
    }

    fn update_nvlink(
        &mut self,
        node_id: &str,
        gpu_id: u32,
        link_id: u32,
        update: NvLinkUpdate,
    ) -> Result<()> {
        self.cluster_mut()
            .update_nvlink(node_id, gpu_id, link_id, update)?;
        self.record_mutation();
        Ok(())
    }

    fn submit_job(&mut self, request: JobRequest) -> Result<u32> {
        let job_id = self.cluster_mut().submit_job(request)?;
        self.record_mutation();
        Ok(job_id)
    }

    fn complete_job(&mut self, job_id: u32, exit_code: i32) -> Result<()> {
        self.cluster_mut().complete_job(job_id, exit_code)?;
        self.record_mutation();
        Ok(())
    }

    fn cancel_job(&mut self, job_id: u32) -> Result<()> {
        self.cluster_mut().cancel_job(job_id)?;
        self.record_mutation();
        Ok(())
    }

    fn set_power_state(&mut self, node_id: &str, power: PowerState) -> Result<()> {
        self.cluster_mut().set_power_state(node_id, power)?;
        self.record_mutation();
        Ok(())
    }

    fn set_mig_instances(
        &mut self,
        node_id: &str,
        gpu_id: u32,
        instances: Vec<MigInstance>,
    ) -> Result<()> {
        self.cluster_mut()
            .set_mig_instances(node_id, gpu_id, instances)?;
        self.record_mutation();
        Ok(())
    }

    /// Reset a GPU: clears volatile ECC counters, utilization and health.
    ///
    /// XID history and aggregate counters survive a reset.
    fn reset_gpu(&mut self, node_id: &str, gpu_id: u32) -> Result<()> {
        let ecc = self
            .gpu(node_id, gpu_id)
            .map(|g| EccErrors {
                single_bit: 0,
                double_bit: 0,
                ..g.ecc_errors
            })
            .unwrap_or_default();
        self.update_gpu(
            node_id,
            gpu_id,
            GpuUpdate {
                utilization: Some(0),
                health_status: Some(HealthStatus::Ok),
                ecc_errors: Some(ecc),
                processes: Some(Vec::new()),
                ..Default::default()
            },
        )
    }

    fn set_firmware_config(
        &mut self,
        node_id: &str,
        device: &str,
        config: BTreeMap<String, String>,
    ) -> Result<()> {
        self.cluster_mut().set_firmware_config(node_id, device, config)?;
        self.record_mutation();
        Ok(())
    }

    fn clear_sel(&mut self, node_id: &str) -> Result<()> {
        self.cluster_mut().clear_sel(node_id)?;
        self.record_mutation();
        Ok(())
    }

    fn start_container(&mut self, node_id: &str, container: Container) -> Result<()> {
        self.cluster_mut().start_container(node_id, container)?;
        self.record_mutation();
        Ok(())
    }

    fn remove_container(&mut self, node_id: &str, container: &str) -> Result<()> {
        self.cluster_mut().remove_container(node_id, container)?;
        self.record_mutation();
        Ok(())
    }
}
