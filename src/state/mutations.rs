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

//! Named mutations over [`ClusterConfig`].
//!
//! Each operation validates everything it needs before touching state, so a
//! failed call leaves the cluster unchanged. The store and scenario contexts
//! call these through the [`ClusterState`](crate::traits::ClusterState) trait,
//! which is also where mutation counting happens.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::state::types::*;

/// Field-wise GPU update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuUpdate {
    pub temperature: Option<u32>,
    pub power_draw: Option<f64>,
    pub power_limit: Option<f64>,
    pub utilization: Option<u32>,
    pub memory_used: Option<u64>,
    pub health_status: Option<HealthStatus>,
    pub persistence_mode: Option<bool>,
    pub mig_mode: Option<bool>,
    pub ecc_errors: Option<EccErrors>,
    pub clocks: Option<GpuClocks>,
    pub processes: Option<Vec<GpuProcess>>,
}

#[derive(Debug, Clone, Default)]
pub struct PortUpdate {
    pub number: u32,
    pub state: Option<PortState>,
    pub physical_state: Option<PhysicalState>,
    pub rate_gbps: Option<u32>,
    pub errors: Option<PortErrors>,
}

#[derive(Debug, Clone, Default)]
pub struct HcaUpdate {
    pub firmware_version: Option<String>,
    pub port: Option<PortUpdate>,
}

#[derive(Debug, Clone, Default)]
pub struct NvLinkUpdate {
    pub status: Option<LinkStatus>,
    pub replay_errors: Option<u64>,
    pub recovery_errors: Option<u64>,
    pub crc_errors: Option<u64>,
}

/// A job submission as produced by `sbatch`/`srun`.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub name: String,
    pub user: String,
    pub partition: Option<String>,
    pub num_nodes: u32,
    pub gpus_per_node: u32,
    pub nodelist: Vec<String>,
    pub command: String,
    pub time_limit: Option<String>,
}

impl ClusterConfig {
    /// Look a node up by id or hostname.
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.id == node_id || n.hostname == node_id)
    }

    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == node_id || n.hostname == node_id)
    }

    pub fn gpu(&self, node_id: &str, gpu_id: u32) -> Option<&Gpu> {
        self.node(node_id).and_then(|n| n.gpu(gpu_id))
    }

    pub fn gpu_mut(&mut self, node_id: &str, gpu_id: u32) -> Option<&mut Gpu> {
        self.node_mut(node_id).and_then(|n| n.gpu_mut(gpu_id))
    }

    pub fn require_node_mut(&mut self, node_id: &str) -> Result<&mut Node> {
        self.node_mut(node_id)
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))
    }

    pub fn require_gpu_mut(&mut self, node_id: &str, gpu_id: u32) -> Result<&mut Gpu> {
        let node = self.require_node_mut(node_id)?;
        let name = node.hostname.clone();
        node.gpu_mut(gpu_id).ok_or(Error::GpuNotFound {
            node: name,
            gpu: gpu_id,
        })
    }

    pub fn update_gpu(&mut self, node_id: &str, gpu_id: u32, update: GpuUpdate) -> Result<()> {
        let gpu = self.require_gpu_mut(node_id, gpu_id)?;
        if let Some(t) = update.temperature {
            gpu.temperature = t;
        }
        if let Some(p) = update.power_draw {
            gpu.power_draw = p;
        }
        if let Some(p) = update.power_limit {
            gpu.power_limit = p;
        }
        if let Some(u) = update.utilization {
            gpu.utilization = u.min(100);
        }
        if let Some(m) = update.memory_used {
            gpu.memory_used = m.min(gpu.memory_total);
        }
        if let Some(h) = update.health_status {
            gpu.health_status = h;
        }
        if let Some(p) = update.persistence_mode {
            gpu.persistence_mode = p;
        }
        if let Some(mig) = update.mig_mode {
            gpu.mig_mode = mig;
            if !mig {
                gpu.mig_instances.clear();
            }
        }
        if let Some(ecc) = update.ecc_errors {
            gpu.ecc_errors = ecc;
        }
        if let Some(clocks) = update.clocks {
            gpu.clocks = clocks;
        }
        if let Some(processes) = update.processes {
            gpu.processes = processes;
        }
        Ok(())
    }

    pub fn add_xid_error(&mut self, node_id: &str, gpu_id: u32, xid: XidError) -> Result<()> {
        let gpu = self.require_gpu_mut(node_id, gpu_id)?;
        gpu.xid_errors.push(xid);
        Ok(())
    }

    pub fn set_slurm_state(
        &mut self,
        node_id: &str,
        state: SlurmNodeState,
        reason: Option<String>,
    ) -> Result<()> {
        let node = self.require_node_mut(node_id)?;
        node.slurm_state = match state {
            // Resuming returns the node to whatever its allocations imply
            SlurmNodeState::Idle | SlurmNodeState::Mixed | SlurmNodeState::Allocated => {
                allocation_state(node)
            }
            other => other,
        };
        node.slurm_reason = match node.slurm_state {
            SlurmNodeState::Drained | SlurmNodeState::Down => reason,
            _ => None,
        };
        Ok(())
    }

    pub fn allocate_gpus_for_job(&mut self, job_id: u32, node_id: &str, gpu_ids: &[u32]) -> Result<()> {
        if self.slurm.job(job_id).is_none() {
            return Err(Error::JobNotFound(job_id));
        }
        let node = self
            .node(node_id)
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?;
        let hostname = node.hostname.clone();
        for &gpu_id in gpu_ids {
            let gpu = node.gpu(gpu_id).ok_or(Error::GpuNotFound {
                node: hostname.clone(),
                gpu: gpu_id,
            })?;
            if let Some(owner) = gpu.allocated_job_id {
                if owner != job_id {
                    return Err(Error::GpuAlreadyAllocated {
                        node: hostname,
                        gpu: gpu_id,
                        job: owner,
                    });
                }
            }
        }

        let node = self.require_node_mut(node_id)?;
        for &gpu_id in gpu_ids {
            if let Some(gpu) = node.gpu_mut(gpu_id) {
                gpu.allocated_job_id = Some(job_id);
            }
        }
        if !matches!(node.slurm_state, SlurmNodeState::Drained | SlurmNodeState::Down) {
            node.slurm_state = allocation_state(node);
        }

        if let Some(job) = self.slurm.jobs.iter_mut().find(|j| j.id == job_id) {
            for &gpu_id in gpu_ids {
                let allocation = GpuAllocation {
                    node_id: hostname.clone(),
                    gpu_id,
                };
                if !job.gpu_allocations.contains(&allocation) {
                    job.gpu_allocations.push(allocation);
                }
            }
            if !job.nodes.contains(&hostname) {
                job.nodes.push(hostname);
            }
        }
        Ok(())
    }

    pub fn deallocate_gpus_for_job(&mut self, job_id: u32) -> Result<()> {
        let job = self
            .slurm
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(Error::JobNotFound(job_id))?;
        job.gpu_allocations.clear();

        for node in &mut self.nodes {
            let mut touched = false;
            for gpu in &mut node.gpus {
                if gpu.allocated_job_id == Some(job_id) {
                    gpu.allocated_job_id = None;
                    gpu.processes.retain(|p| p.job_id != Some(job_id));
                    gpu.utilization = 0;
                    touched = true;
                }
            }
            if touched && !matches!(node.slurm_state, SlurmNodeState::Drained | SlurmNodeState::Down) {
                node.slurm_state = allocation_state(node);
            }
        }
        Ok(())
    }

    pub fn update_hca(&mut self, node_id: &str, hca_name: &str, update: HcaUpdate) -> Result<()> {
        let node = self.require_node_mut(node_id)?;
        let hostname = node.hostname.clone();
        let hca = node
            .hcas
            .iter_mut()
            .find(|h| h.name == hca_name)
            .ok_or_else(|| Error::HcaNotFound {
                node: hostname,
                hca: hca_name.to_string(),
            })?;
        if let Some(port_update) = &update.port {
            if hca.port(port_update.number).is_none() {
                return Err(Error::PortNotFound {
                    hca: hca.name.clone(),
                    port: port_update.number,
                });
            }
        }

        if let Some(fw) = update.firmware_version {
            hca.firmware_version = fw;
        }
        if let Some(port_update) = update.port {
            if let Some(port) = hca.ports.iter_mut().find(|p| p.number == port_update.number) {
                if let Some(state) = port_update.state {
                    port.state = state;
                }
                if let Some(phys) = port_update.physical_state {
                    port.physical_state = phys;
                }
                if let Some(rate) = port_update.rate_gbps {
                    port.rate_gbps = rate;
                }
                if let Some(errors) = port_update.errors {
                    port.errors = errors;
                }
            }
        }
        Ok(())
    }

    pub fn update_nvlink(&mut self, node_id: &str, gpu_id: u32, link_id: u32, update: NvLinkUpdate) -> Result<()> {
        let gpu = self.require_gpu_mut(node_id, gpu_id)?;
        let link = gpu
            .nvlinks
            .iter_mut()
            .find(|l| l.link_id == link_id)
            .ok_or_else(|| Error::NvLinkNotFound {
                node: node_id.to_string(),
                gpu: gpu_id,
                link: link_id,
            })?;
        if let Some(status) = update.status {
            link.status = status;
        }
        if let Some(v) = update.replay_errors {
            link.replay_errors = v;
        }
        if let Some(v) = update.recovery_errors {
            link.recovery_errors = v;
        }
        if let Some(v) = update.crc_errors {
            link.crc_errors = v;
        }
        Ok(())
    }

    pub fn set_mig_instances(&mut self, node_id: &str, gpu_id: u32, instances: Vec<MigInstance>) -> Result<()> {
        let gpu = self.require_gpu_mut(node_id, gpu_id)?;
        if !gpu.mig_mode && !instances.is_empty() {
            return Err(Error::InvalidState(format!(
                "MIG mode is disabled on GPU {gpu_id}"
            )));
        }
        gpu.mig_instances = instances;
        Ok(())
    }

    pub fn set_power_state(&mut self, node_id: &str, power: PowerState) -> Result<()> {
        let node = self.require_node_mut(node_id)?;
        node.bmc.power_state = power;
        match power {
            PowerState::Off => {
                node.slurm_state = SlurmNodeState::Down;
                node.slurm_reason = Some("Not responding".to_string());
            }
            PowerState::On => {
                node.uptime_secs = 0;
                if node.slurm_state == SlurmNodeState::Down {
                    node.slurm_state = allocation_state(node);
                    node.slurm_reason = None;
                }
            }
        }
        Ok(())
    }

    /// Replace the next-boot firmware parameters of an HCA or DPU.
    ///
    /// An empty map restores the defaults.
    pub fn set_firmware_config(
        &mut self,
        node_id: &str,
        device: &str,
        config: BTreeMap<String, String>,
    ) -> Result<()> {
        let node = self.require_node_mut(node_id)?;
        if let Some(hca) = node.hcas.iter_mut().find(|h| h.name == device) {
            hca.firmware_config = config;
            return Ok(());
        }
        if let Some(dpu) = node.dpus.iter_mut().find(|d| d.name == device) {
            dpu.firmware_config = config;
            return Ok(());
        }
        Err(Error::HcaNotFound {
            node: node.hostname.clone(),
            hca: device.to_string(),
        })
    }

    pub fn clear_sel(&mut self, node_id: &str) -> Result<()> {
        let node = self.require_node_mut(node_id)?;
        node.bmc.sel = vec![SelEntry {
            id: 1,
            timestamp: Utc::now(),
            sensor: "Event Log".to_string(),
            event: "Log area reset/cleared".to_string(),
            asserted: true,
        }];
        Ok(())
    }

    pub fn start_container(&mut self, node_id: &str, container: Container) -> Result<()> {
        let node = self.require_node_mut(node_id)?;
        if node.containers.iter().any(|c| c.name == container.name) {
            return Err(Error::InvalidState(format!(
                "Conflict. The container name \"/{}\" is already in use",
                container.name
            )));
        }
        for &gpu_id in &container.gpus {
            if node.gpu(gpu_id).is_none() {
                return Err(Error::GpuNotFound {
                    node: node.hostname.clone(),
                    gpu: gpu_id,
                });
            }
        }
        node.containers.push(container);
        Ok(())
    }

    /// Remove a container by id prefix or name.
    pub fn remove_container(&mut self, node_id: &str, container: &str) -> Result<()> {
        let node = self.require_node_mut(node_id)?;
        let index = node
            .containers
            .iter()
            .position(|c| c.name == container || (!container.is_empty() && c.id.starts_with(container)))
            .ok_or_else(|| Error::InvalidState(format!("No such container: {container}")))?;
        node.containers.remove(index);
        Ok(())
    }

    /// Queue a job and start it immediately when resources allow.
    pub fn submit_job(&mut self, request: JobRequest) -> Result<u32> {
        let partition_name = match &request.partition {
            Some(name) => name.clone(),
            None => self
                .slurm
                .default_partition()
                .map(|p| p.name.clone())
                .ok_or_else(|| Error::InvalidState("no partitions configured".to_string()))?,
        };
        let partition = self
            .slurm
            .partition(&partition_name)
            .ok_or_else(|| Error::InvalidState(format!("invalid partition name specified: {partition_name}")))?
            .clone();
        for requested in &request.nodelist {
            if !partition.nodes.contains(requested) {
                return Err(Error::InvalidState(format!(
                    "node {requested} is not in partition {partition_name}"
                )));
            }
        }

        let job_id = self.slurm.next_job_id;
        self.slurm.next_job_id += 1;
        let now = Utc::now();
        self.slurm.jobs.push(Job {
            id: job_id,
            name: request.name.clone(),
            user: request.user.clone(),
            partition: partition_name,
            state: JobState::Pending,
            reason: Some("Resources".to_string()),
            num_nodes: request.num_nodes.max(1),
            gpus_per_node: request.gpus_per_node,
            nodes: Vec::new(),
            gpu_allocations: Vec::new(),
            command: request.command.clone(),
            time_limit: request.time_limit.clone().unwrap_or(partition.max_time.clone()),
            submit_time: now,
            start_time: None,
            end_time: None,
            exit_code: 0,
        });

        let candidates: Vec<String> = if request.nodelist.is_empty() {
            partition.nodes.clone()
        } else {
            request.nodelist.clone()
        };
        let placement = self.find_placement(&candidates, request.num_nodes.max(1), request.gpus_per_node);
        if partition.state == PartitionState::Up {
            if let Some(placement) = placement {
                for (node_id, gpus) in &placement {
                    self.allocate_gpus_for_job(job_id, node_id, gpus)?;
                    self.attach_processes(job_id, node_id, gpus, &request.command);
                }
                if let Some(job) = self.slurm.jobs.iter_mut().find(|j| j.id == job_id) {
                    job.state = JobState::Running;
                    job.reason = None;
                    job.start_time = Some(now);
                    job.nodes = placement.into_iter().map(|(n, _)| n).collect();
                }
            }
        }
        Ok(job_id)
    }

    pub fn complete_job(&mut self, job_id: u32, exit_code: i32) -> Result<()> {
        self.finish_job(job_id, if exit_code == 0 { JobState::Completed } else { JobState::Failed }, exit_code)
    }

    pub fn cancel_job(&mut self, job_id: u32) -> Result<()> {
        let job = self.slurm.job(job_id).ok_or(Error::JobNotFound(job_id))?;
        if !job.state.is_active() {
            return Err(Error::InvalidState(format!(
                "Job/step already completing or completed: {job_id}"
            )));
        }
        self.finish_job(job_id, JobState::Cancelled, 0)
    }

    fn finish_job(&mut self, job_id: u32, state: JobState, exit_code: i32) -> Result<()> {
        self.deallocate_gpus_for_job(job_id)?;
        if let Some(job) = self.slurm.jobs.iter_mut().find(|j| j.id == job_id) {
            job.state = state;
            job.reason = None;
            job.exit_code = exit_code;
            job.end_time = Some(Utc::now());
        }
        Ok(())
    }

    fn find_placement(&self, candidates: &[String], num_nodes: u32, gpus_per_node: u32) -> Option<Vec<(String, Vec<u32>)>> {
        let mut placement = Vec::new();
        for name in candidates {
            let Some(node) = self.node(name) else { continue };
            if !node.is_schedulable() {
                continue;
            }
            let free = node.free_gpus();
            if free.len() >= gpus_per_node as usize {
                placement.push((node.hostname.clone(), free[..gpus_per_node as usize].to_vec()));
                if placement.len() == num_nodes as usize {
                    return Some(placement);
                }
            }
        }
        None
    }

    fn attach_processes(&mut self, job_id: u32, node_id: &str, gpus: &[u32], command: &str) {
        let process_name = command
            .split_whitespace()
            .next()
            .unwrap_or("python")
            .to_string();
        if let Some(node) = self.node_mut(node_id) {
            for &gpu_id in gpus {
                if let Some(gpu) = node.gpu_mut(gpu_id) {
                    let used = gpu.memory_total / 2;
                    gpu.processes.push(GpuProcess {
                        pid: 40_000 + job_id * 10 + gpu_id,
                        name: process_name.clone(),
                        used_memory: used,
                        job_id: Some(job_id),
                    });
                    gpu.memory_used = gpu.memory_used.saturating_add(used).min(gpu.memory_total);
                    gpu.utilization = 97;
                }
            }
        }
    }
}

/// Scheduler state implied purely by GPU allocations.
fn allocation_state(node: &Node) -> SlurmNodeState {
    let allocated = node.allocated_gpu_count();
    if allocated == 0 {
        SlurmNodeState::Idle
    } else if allocated == node.gpus.len() {
        SlurmNodeState::Allocated
    } else {
        SlurmNodeState::Mixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::factory::{build_cluster, ClusterBuildConfig};

    fn cluster() -> ClusterConfig {
        build_cluster(&ClusterBuildConfig::default())
    }

    fn request(gpus: u32) -> JobRequest {
        JobRequest {
            name: "train".to_string(),
            user: "alice".to_string(),
            partition: None,
            num_nodes: 1,
            gpus_per_node: gpus,
            nodelist: Vec::new(),
            command: "python train.py".to_string(),
            time_limit: None,
        }
    }

    #[test]
    fn test_update_gpu_clamps_memory() {
        let mut c = cluster();
        c.update_gpu(
            "dgx-01",
            0,
            GpuUpdate {
                memory_used: Some(u64::MAX),
                ..Default::default()
            },
        )
        .unwrap();
        let gpu = c.gpu("dgx-01", 0).unwrap();
        assert_eq!(gpu.memory_used, gpu.memory_total);
    }

    #[test]
    fn test_update_unknown_gpu_fails() {
        let mut c = cluster();
        let err = c.update_gpu("dgx-01", 42, GpuUpdate::default()).unwrap_err();
        assert!(matches!(err, Error::GpuNotFound { gpu: 42, .. }));
    }

    #[test]
    fn test_submit_job_allocates_exclusively() {
        let mut c = cluster();
        let first = c.submit_job(request(8)).unwrap();
        let job = c.slurm.job(first).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.nodes, vec!["dgx-01".to_string()]);
        assert_eq!(c.node("dgx-01").unwrap().slurm_state, SlurmNodeState::Allocated);

        // A second full-node job lands on the next node
        let second = c.submit_job(request(8)).unwrap();
        assert_eq!(c.slurm.job(second).unwrap().nodes, vec!["dgx-02".to_string()]);

        let err = c.allocate_gpus_for_job(second, "dgx-01", &[0]).unwrap_err();
        assert!(matches!(err, Error::GpuAlreadyAllocated { job, .. } if job == first));
    }

    #[test]
    fn test_failed_allocation_changes_nothing() {
        let mut c = cluster();
        let first = c.submit_job(request(2)).unwrap();
        let second = c.submit_job(request(1)).unwrap();
        let before = c.clone();
        // GPU 1 belongs to the first job; GPU 7 is free but must not be taken
        assert!(c.allocate_gpus_for_job(second, "dgx-01", &[7, 1]).is_err());
        assert_eq!(c, before);
        assert_eq!(c.gpu("dgx-01", 1).unwrap().allocated_job_id, Some(first));
    }

    #[test]
    fn test_job_completion_frees_gpus() {
        let mut c = cluster();
        let job_id = c.submit_job(request(4)).unwrap();
        assert_eq!(c.node("dgx-01").unwrap().slurm_state, SlurmNodeState::Mixed);
        c.complete_job(job_id, 0).unwrap();
        let node = c.node("dgx-01").unwrap();
        assert_eq!(node.slurm_state, SlurmNodeState::Idle);
        assert!(node.gpus.iter().all(|g| g.allocated_job_id.is_none()));
        assert!(node.gpus.iter().all(|g| g.processes.is_empty()));
        assert_eq!(c.slurm.job(job_id).unwrap().state, JobState::Completed);
    }

    #[test]
    fn test_drained_nodes_are_skipped() {
        let mut c = cluster();
        c.set_slurm_state("dgx-01", SlurmNodeState::Drained, Some("xid 79".to_string()))
            .unwrap();
        let job_id = c.submit_job(request(8)).unwrap();
        assert_eq!(c.slurm.job(job_id).unwrap().nodes, vec!["dgx-02".to_string()]);
        assert_eq!(
            c.node("dgx-01").unwrap().slurm_reason.as_deref(),
            Some("xid 79")
        );
    }

    #[test]
    fn test_job_pends_without_resources() {
        let mut c = cluster();
        let job_id = c
            .submit_job(JobRequest {
                num_nodes: 99,
                ..request(8)
            })
            .unwrap();
        let job = c.slurm.job(job_id).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.gpu_allocations.is_empty());
    }

    #[test]
    fn test_resume_restores_allocation_state() {
        let mut c = cluster();
        c.submit_job(request(3)).unwrap();
        c.set_slurm_state("dgx-01", SlurmNodeState::Drained, Some("maint".to_string()))
            .unwrap();
        c.set_slurm_state("dgx-01", SlurmNodeState::Idle, None).unwrap();
        let node = c.node("dgx-01").unwrap();
        assert_eq!(node.slurm_state, SlurmNodeState::Mixed);
        assert!(node.slurm_reason.is_none());
    }

    #[test]
    fn test_update_hca_port() {
        let mut c = cluster();
        c.update_hca(
            "dgx-01",
            "mlx5_0",
            HcaUpdate {
                port: Some(PortUpdate {
                    number: 1,
                    state: Some(PortState::Down),
                    physical_state: Some(PhysicalState::Disabled),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .unwrap();
        let port = c.node("dgx-01").unwrap().hcas[0].port(1).unwrap();
        assert!(!port.is_up());

        let err = c
            .update_hca(
                "dgx-01",
                "mlx5_0",
                HcaUpdate {
                    port: Some(PortUpdate {
                        number: 2,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::PortNotFound { port: 2, .. }));
    }

    #[test]
    fn test_firmware_config_on_hca_and_dpu() {
        let mut c = cluster();
        let config = BTreeMap::from([("SRIOV_EN".to_string(), "True(1)".to_string())]);
        c.set_firmware_config("dgx-01", "mlx5_2", config.clone()).unwrap();
        assert_eq!(c.node("dgx-01").unwrap().hcas[2].firmware_config, config);
        assert!(c.node("dgx-01").unwrap().hcas[1].firmware_config.is_empty());

        let dpu = c.node("dgx-01").unwrap().dpus[0].name.clone();
        c.set_firmware_config("dgx-01", &dpu, config).unwrap();
        c.set_firmware_config("dgx-01", &dpu, BTreeMap::new()).unwrap();
        assert!(c.node("dgx-01").unwrap().dpus[0].firmware_config.is_empty());

        let err = c
            .set_firmware_config("dgx-01", "mlx5_99", BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::HcaNotFound { .. }));
    }

    #[test]
    fn test_power_off_marks_node_down() {
        let mut c = cluster();
        c.set_power_state("dgx-02", PowerState::Off).unwrap();
        let node = c.node("dgx-02").unwrap();
        assert_eq!(node.slurm_state, SlurmNodeState::Down);
        c.set_power_state("dgx-02", PowerState::On).unwrap();
        assert_eq!(c.node("dgx-02").unwrap().slurm_state, SlurmNodeState::Idle);
    }

    #[test]
    fn test_mig_instances_require_mig_mode() {
        let mut c = cluster();
        let instance = MigInstance {
            gpu_instance_id: 1,
            profile_id: 19,
            profile_name: "1g.10gb".to_string(),
            placement_start: 0,
            placement_size: 1,
            memory_mib: 9856,
        };
        assert!(c.set_mig_instances("dgx-01", 0, vec![instance.clone()]).is_err());
        c.update_gpu(
            "dgx-01",
            0,
            GpuUpdate {
                mig_mode: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        c.set_mig_instances("dgx-01", 0, vec![instance]).unwrap();
        assert_eq!(c.gpu("dgx-01", 0).unwrap().mig_instances.len(), 1);
    }
}
