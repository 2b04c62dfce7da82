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

//! Cluster state data model.
//!
//! Every type here owns its data outright (no `Rc`, no shared references), so
//! `Clone` on [`ClusterConfig`] is a full structural deep copy. Scenario
//! isolation relies on that: a cloned cluster shares nothing with its source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::common::config::SimConfig;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub name: String,
    pub nodes: Vec<Node>,
    pub fabric_topology: FabricTopology,
    pub ha: HaConfig,
    pub slurm: SlurmConfig,
    pub lustre: LustreFs,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FabricTopology {
    FatTree,
    RailOptimized,
    Dragonfly,
}

impl fmt::Display for FabricTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FabricTopology::FatTree => write!(f, "fat-tree"),
            FabricTopology::RailOptimized => write!(f, "rail-optimized"),
            FabricTopology::Dragonfly => write!(f, "dragonfly"),
        }
    }
}

/// Control-plane high availability (primary/secondary head nodes)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HaConfig {
    pub enabled: bool,
    pub primary_head_node: String,
    pub secondary_head_node: String,
    pub virtual_ip: String,
    pub active_head_node: String,
    pub failover_count: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemType {
    #[serde(rename = "DGX-A100")]
    DgxA100,
    #[serde(rename = "DGX-H100")]
    DgxH100,
    #[serde(rename = "DGX-H200")]
    DgxH200,
    #[serde(rename = "DGX-B200")]
    DgxB200,
}

impl SystemType {
    pub const ALL: [SystemType; 4] = [
        SystemType::DgxA100,
        SystemType::DgxH100,
        SystemType::DgxH200,
        SystemType::DgxB200,
    ];

    /// Parse a user-facing tag such as `dgx-h100`, `H100` or `DGX-H100`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let normalized = tag.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let normalized = normalized.strip_prefix("dgx-").unwrap_or(&normalized);
        match normalized {
            "a100" => Some(SystemType::DgxA100),
            "h100" => Some(SystemType::DgxH100),
            "h200" => Some(SystemType::DgxH200),
            "b200" => Some(SystemType::DgxB200),
            _ => None,
        }
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            SystemType::DgxA100 => "DGX-A100",
            SystemType::DgxH100 => "DGX-H100",
            SystemType::DgxH200 => "DGX-H200",
            SystemType::DgxB200 => "DGX-B200",
        };
        write!(f, "{tag}")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub hostname: String,
    pub system_type: SystemType,
    pub management_ip: String,
    pub gpus: Vec<Gpu>,
    pub hcas: Vec<Hca>,
    pub dpus: Vec<Dpu>,
    pub bmc: Bmc,
    pub slurm_state: SlurmNodeState,
    pub slurm_reason: Option<String>,
    pub cpu: CpuInfo,
    pub ram_total_gb: u64,
    pub ram_used_gb: u64,
    pub os_version: String,
    pub kernel_version: String,
    pub driver_version: String,
    pub cuda_version: String,
    pub bios_version: String,
    pub uptime_secs: u64,
    pub mounts: Vec<Mount>,
    pub containers: Vec<Container>,
}

impl Node {
    pub fn gpu(&self, gpu_id: u32) -> Option<&Gpu> {
        self.gpus.iter().find(|g| g.id == gpu_id)
    }

    pub fn gpu_mut(&mut self, gpu_id: u32) -> Option<&mut Gpu> {
        self.gpus.iter_mut().find(|g| g.id == gpu_id)
    }

    pub fn hca(&self, name: &str) -> Option<&Hca> {
        self.hcas.iter().find(|h| h.name == name)
    }

    /// GPUs a new job could be given.
    pub fn free_gpus(&self) -> Vec<u32> {
        self.gpus
            .iter()
            .filter(|g| g.allocated_job_id.is_none() && g.is_accessible())
            .map(|g| g.id)
            .collect()
    }

    pub fn allocated_gpu_count(&self) -> usize {
        self.gpus
            .iter()
            .filter(|g| g.allocated_job_id.is_some())
            .count()
    }

    /// Whether the scheduler may place new work here.
    pub fn is_schedulable(&self) -> bool {
        matches!(
            self.slurm_state,
            SlurmNodeState::Idle | SlurmNodeState::Mixed
        ) && self.bmc.power_state == PowerState::On
    }

    pub fn total_cpus(&self) -> u32 {
        self.cpu.sockets * self.cpu.cores_per_socket * self.cpu.threads_per_core
    }
}

/// Ordered by severity, so `max` picks the worse of two statuses.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub enum HealthStatus {
    #[default]
    #[serde(rename = "OK")]
    Ok,
    Warning,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "OK"),
            HealthStatus::Warning => write!(f, "Warning"),
            HealthStatus::Critical => write!(f, "Critical"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gpu {
    pub id: u32,
    pub uuid: String,
    pub name: String,
    pub pci_bus_id: String,
    pub serial: String,
    pub vbios_version: String,
    pub health_status: HealthStatus,
    pub temperature: u32,   // celsius
    pub power_draw: f64,    // watts
    pub power_limit: f64,   // watts
    pub max_power_limit: f64,
    pub utilization: u32,   // percent
    pub memory_used: u64,   // MiB
    pub memory_total: u64,  // MiB
    pub clocks: GpuClocks,
    pub ecc_errors: EccErrors,
    pub xid_errors: Vec<XidError>,
    pub nvlinks: Vec<NvLink>,
    pub mig_mode: bool,
    pub mig_instances: Vec<MigInstance>,
    pub persistence_mode: bool,
    pub allocated_job_id: Option<u32>,
    pub processes: Vec<GpuProcess>,
}

impl Gpu {
    /// The GPU has dropped off the PCIe bus (XID 79 class) and no longer
    /// answers driver queries until the node is rebooted.
    pub fn is_accessible(&self) -> bool {
        !self
            .xid_errors
            .iter()
            .any(|x| crate::state::xid::is_bus_loss(x.code))
    }

    pub fn memory_free(&self) -> u64 {
        self.memory_total.saturating_sub(self.memory_used)
    }

    pub fn active_nvlinks(&self) -> usize {
        self.nvlinks
            .iter()
            .filter(|l| l.status == LinkStatus::Active)
            .count()
    }

    pub fn latest_xid(&self) -> Option<&XidError> {
        self.xid_errors.last()
    }

    /// Temperature-derived condition used by BMC sensors and health checks.
    pub fn thermal_status(&self) -> HealthStatus {
        if self.temperature >= SimConfig::GPU_TEMP_CRITICAL {
            HealthStatus::Critical
        } else if self.temperature >= SimConfig::GPU_TEMP_WARNING {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        }
    }

    /// Performance state as shown by nvidia-smi.
    pub fn pstate(&self) -> &'static str {
        if self.utilization > 0 || !self.processes.is_empty() || self.persistence_mode {
            "P0"
        } else {
            "P8"
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GpuClocks {
    pub graphics: u32,
    pub sm: u32,
    pub memory: u32,
    pub max_graphics: u32,
    pub max_memory: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EccErrors {
    pub single_bit: u64,
    pub double_bit: u64,
    pub aggregated_single_bit: u64,
    pub aggregated_double_bit: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct XidError {
    pub code: u32,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Active,
    Down,
    Inactive,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NvLink {
    pub link_id: u32,
    pub status: LinkStatus,
    pub speed_gbps: f64, // GB/s per link
    pub replay_errors: u64,
    pub recovery_errors: u64,
    pub crc_errors: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigInstance {
    pub gpu_instance_id: u32,
    pub profile_id: u32,
    pub profile_name: String,
    pub placement_start: u32,
    pub placement_size: u32,
    pub memory_mib: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GpuProcess {
    pub pid: u32,
    pub name: String,
    pub used_memory: u64, // MiB
    pub job_id: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Hca {
    pub name: String, // e.g. mlx5_0
    pub ca_type: String,
    pub model: String,
    pub firmware_version: String,
    pub psid: String,
    pub node_guid: String,
    pub pci_address: String,
    pub ports: Vec<IbPort>,
    /// `mlxconfig` parameters set for the next boot; unset keys keep their defaults.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub firmware_config: BTreeMap<String, String>,
}

impl Hca {
    pub fn port(&self, number: u32) -> Option<&IbPort> {
        self.ports.iter().find(|p| p.number == number)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Active,
    Down,
    Initializing,
    Armed,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Active => write!(f, "Active"),
            PortState::Down => write!(f, "Down"),
            PortState::Initializing => write!(f, "Initializing"),
            PortState::Armed => write!(f, "Armed"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalState {
    LinkUp,
    Disabled,
    Polling,
}

impl fmt::Display for PhysicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalState::LinkUp => write!(f, "LinkUp"),
            PhysicalState::Disabled => write!(f, "Disabled"),
            PhysicalState::Polling => write!(f, "Polling"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PortErrors {
    pub symbol_errors: u64,
    pub link_error_recovery: u64,
    pub link_downed: u64,
    pub port_rcv_errors: u64,
    pub port_xmit_discards: u64,
    pub port_xmit_wait: u64,
}

impl PortErrors {
    pub fn total(&self) -> u64 {
        self.symbol_errors
            + self.link_error_recovery
            + self.link_downed
            + self.port_rcv_errors
            + self.port_xmit_discards
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IbPort {
    pub number: u32,
    pub state: PortState,
    pub physical_state: PhysicalState,
    pub rate_gbps: u32,
    pub lid: u32,
    pub sm_lid: u32,
    pub guid: String,
    pub link_layer: String,
    pub errors: PortErrors,
}

impl IbPort {
    pub fn is_up(&self) -> bool {
        self.state == PortState::Active && self.physical_state == PhysicalState::LinkUp
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dpu {
    pub id: u32,
    pub name: String,
    pub model: String,
    pub ca_type: String,
    pub firmware_version: String,
    pub mode: String,
    pub arm_os: String,
    pub pci_address: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub firmware_config: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bmc {
    pub ip_address: String,
    pub mac_address: String,
    pub firmware_version: String,
    pub manufacturer: String,
    pub power_state: PowerState,
    /// Chassis sensors. GPU temperature sensors are not stored here; they are
    /// derived from the GPU entities when read.
    pub sensors: Vec<BmcSensor>,
    pub sel: Vec<SelEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BmcSensor {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub sensor_type: String,
    pub upper_critical: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelEntry {
    pub id: u32,
    pub timestamp: DateTime<Utc>,
    pub sensor: String,
    pub event: String,
    pub asserted: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SlurmNodeState {
    Idle,
    Mixed,
    Allocated,
    Drained,
    Down,
}

impl SlurmNodeState {
    /// Parse a state keyword as accepted by `scontrol update State=...`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "idle" | "resume" => Some(SlurmNodeState::Idle),
            "mix" | "mixed" => Some(SlurmNodeState::Mixed),
            "alloc" | "allocated" => Some(SlurmNodeState::Allocated),
            "drain" | "drained" | "draining" => Some(SlurmNodeState::Drained),
            "down" => Some(SlurmNodeState::Down),
            _ => None,
        }
    }

    /// Short form used by sinfo.
    pub fn short(&self) -> &'static str {
        match self {
            SlurmNodeState::Idle => "idle",
            SlurmNodeState::Mixed => "mix",
            SlurmNodeState::Allocated => "alloc",
            SlurmNodeState::Drained => "drain",
            SlurmNodeState::Down => "down",
        }
    }
}

impl fmt::Display for SlurmNodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlurmNodeState::Idle => "IDLE",
            SlurmNodeState::Mixed => "MIXED",
            SlurmNodeState::Allocated => "ALLOCATED",
            SlurmNodeState::Drained => "DRAINED",
            SlurmNodeState::Down => "DOWN",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    pub model: String,
    pub architecture: String,
    pub sockets: u32,
    pub cores_per_socket: u32,
    pub threads_per_core: u32,
    pub base_mhz: u32,
    pub max_mhz: u32,
    pub numa_nodes: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: String,
    pub size_bytes: u64,
    pub used_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub command: String,
    pub gpus: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlurmConfig {
    pub cluster_name: String,
    pub controller: String,
    pub partitions: Vec<Partition>,
    pub jobs: Vec<Job>,
    pub next_job_id: u32,
}

impl SlurmConfig {
    pub fn job(&self, job_id: u32) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == job_id)
    }

    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    pub fn default_partition(&self) -> Option<&Partition> {
        self.partitions
            .iter()
            .find(|p| p.is_default)
            .or_else(|| self.partitions.first())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PartitionState {
    Up,
    Down,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub name: String,
    pub nodes: Vec<String>,
    pub is_default: bool,
    pub max_time: String,
    pub state: PartitionState,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn short(&self) -> &'static str {
        match self {
            JobState::Pending => "PD",
            JobState::Running => "R",
            JobState::Completed => "CD",
            JobState::Cancelled => "CA",
            JobState::Failed => "F",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Pending | JobState::Running)
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_uppercase().as_str() {
            "PD" | "PENDING" => Some(JobState::Pending),
            "R" | "RUNNING" => Some(JobState::Running),
            "CD" | "COMPLETED" => Some(JobState::Completed),
            "CA" | "CANCELLED" => Some(JobState::Cancelled),
            "F" | "FAILED" => Some(JobState::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Cancelled => "CANCELLED",
            JobState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GpuAllocation {
    pub node_id: String,
    pub gpu_id: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: u32,
    pub name: String,
    pub user: String,
    pub partition: String,
    pub state: JobState,
    pub reason: Option<String>,
    pub num_nodes: u32,
    pub gpus_per_node: u32,
    pub nodes: Vec<String>,
    pub gpu_allocations: Vec<GpuAllocation>,
    pub command: String,
    pub time_limit: String,
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LustreFs {
    pub fs_name: String,
    pub mount_point: String,
    pub mgs_nid: String,
    pub mdts: Vec<LustreTarget>,
    pub osts: Vec<LustreTarget>,
}

impl LustreFs {
    pub fn total_bytes(&self) -> u64 {
        self.osts
            .iter()
            .filter(|t| t.active)
            .map(|t| t.size_bytes)
            .sum()
    }

    pub fn used_bytes(&self) -> u64 {
        self.osts
            .iter()
            .filter(|t| t.active)
            .map(|t| t.used_bytes)
            .sum()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LustreTarget {
    pub name: String,
    pub index: u32,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub active: bool,
}
