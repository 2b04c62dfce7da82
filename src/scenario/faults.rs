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

//! Fault injection.
//!
//! Faults are declarative descriptors applied once to a scenario context.
//! Each fault that lands counts as exactly one mutation, however many GPUs
//! it touches. A fault that cannot land (unknown type, missing node or GPU)
//! is logged and skipped; it never aborts the rest of the list.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::config::SimConfig;
use crate::scenario::context::ScenarioContext;
use crate::state::types::{Gpu, HealthStatus, LinkStatus, Severity, XidError};
use crate::state::xid;
use crate::traits::ClusterState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultType {
    XidError,
    Thermal,
    EccError,
    MemoryFull,
    NvlinkFailure,
    GpuHang,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaultParameters {
    pub xid: Option<u32>,
    pub description: Option<String>,
    pub target_temp: Option<u32>,
    pub single_bit: Option<u64>,
    pub double_bit: Option<u64>,
    /// Percent of GPU memory in use, 0-100.
    pub memory_used_percent: Option<f64>,
    pub link_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultConfig {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_id: Option<u32>,
    #[serde(rename = "type")]
    pub fault_type: FaultType,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<FaultParameters>,
}

impl FaultConfig {
    pub fn new(node_id: impl Into<String>, gpu_id: Option<u32>, fault_type: FaultType) -> Self {
        Self {
            node_id: node_id.into(),
            gpu_id,
            fault_type,
            severity: Severity::Critical,
            parameters: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_parameters(mut self, parameters: FaultParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    fn params(&self) -> FaultParameters {
        self.parameters.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFault {
    pub index: usize,
    pub reason: String,
}

/// What happened to a fault list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultReport {
    pub applied: usize,
    pub skipped: Vec<SkippedFault>,
}

/// Apply faults in list order.
pub fn apply_faults_to_context(faults: &[FaultConfig], ctx: &mut ScenarioContext) -> FaultReport {
    let mut report = FaultReport::default();
    for (index, fault) in faults.iter().enumerate() {
        match apply_fault(fault, ctx) {
            Ok(touched) => {
                debug!(
                    "Applied {:?} fault to {} ({} GPU(s)) in scenario '{}'",
                    fault.fault_type,
                    fault.node_id,
                    touched,
                    ctx.scenario_id()
                );
                ctx.record_mutation();
                report.applied += 1;
            }
            Err(reason) => {
                warn!(
                    "Skipping fault #{index} in scenario '{}': {reason}",
                    ctx.scenario_id()
                );
                report.skipped.push(SkippedFault { index, reason });
            }
        }
    }
    report
}

fn apply_fault(fault: &FaultConfig, ctx: &mut ScenarioContext) -> Result<usize, String> {
    if fault.fault_type == FaultType::Unknown {
        return Err("unknown fault type".to_string());
    }
    let node = ctx
        .cluster_mut()
        .node_mut(&fault.node_id)
        .ok_or_else(|| format!("node '{}' does not exist", fault.node_id))?;
    let hostname = node.hostname.clone();

    let targets: Vec<&mut Gpu> = match fault.gpu_id {
        Some(id) => {
            let gpu = node
                .gpu_mut(id)
                .ok_or_else(|| format!("GPU {id} does not exist on {hostname}"))?;
            vec![gpu]
        }
        None => node.gpus.iter_mut().collect(),
    };
    if targets.is_empty() {
        return Err(format!("{hostname} has no GPUs"));
    }

    let params = fault.params();
    if let (FaultType::NvlinkFailure, Some(link_id)) = (fault.fault_type, params.link_id) {
        if targets
            .iter()
            .any(|gpu| !gpu.nvlinks.iter().any(|l| l.link_id == link_id))
        {
            return Err(format!("NVLink {link_id} does not exist"));
        }
    }

    let touched = targets.len();
    for gpu in targets {
        apply_to_gpu(fault, &params, gpu);
    }
    Ok(touched)
}

fn apply_to_gpu(fault: &FaultConfig, params: &FaultParameters, gpu: &mut Gpu) {
    match fault.fault_type {
        FaultType::XidError => {
            let code = params.xid.unwrap_or(SimConfig::DEFAULT_XID_CODE);
            gpu.xid_errors.push(XidError {
                code,
                timestamp: Utc::now(),
                description: params
                    .description
                    .clone()
                    .unwrap_or_else(|| xid::description(code)),
                severity: fault.severity,
            });
            escalate(gpu, fault.severity);
        }
        FaultType::Thermal => {
            gpu.temperature = params
                .target_temp
                .unwrap_or(SimConfig::THERMAL_FAULT_DEFAULT_TEMP);
        }
        FaultType::EccError => {
            let (single, double) = match (params.single_bit, params.double_bit) {
                (None, None) if fault.severity == Severity::Critical => (0, 1),
                (None, None) => (1, 0),
                (s, d) => (s.unwrap_or(0), d.unwrap_or(0)),
            };
            let ecc = &mut gpu.ecc_errors;
            ecc.single_bit += single;
            ecc.double_bit += double;
            ecc.aggregated_single_bit += single;
            ecc.aggregated_double_bit += double;
        }
        FaultType::MemoryFull => {
            let ratio = params
                .memory_used_percent
                .map(|p| (p / 100.0).clamp(0.0, 1.0))
                .unwrap_or(SimConfig::MEMORY_FULL_RATIO);
            gpu.memory_used = ((gpu.memory_total as f64) * ratio) as u64;
        }
        FaultType::NvlinkFailure => {
            gpu.health_status = gpu.health_status.max(HealthStatus::Warning);
            if let Some(link_id) = params.link_id {
                if let Some(link) = gpu.nvlinks.iter_mut().find(|l| l.link_id == link_id) {
                    link.status = LinkStatus::Down;
                }
            }
        }
        FaultType::GpuHang => {
            gpu.utilization = 0;
            gpu.health_status = HealthStatus::Critical;
        }
        FaultType::Unknown => {}
    }
}

/// Raise health to match an XID's severity; never lowers it.
fn escalate(gpu: &mut Gpu, severity: Severity) {
    let implied = match severity {
        Severity::Info => return,
        Severity::Warning => HealthStatus::Warning,
        Severity::Critical => HealthStatus::Critical,
    };
    gpu.health_status = gpu.health_status.max(implied);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{build_cluster, ClusterBuildConfig};

    fn context() -> ScenarioContext {
        ScenarioContext::new("test", &build_cluster(&ClusterBuildConfig::default()))
    }

    #[test]
    fn test_fault_json_shape() {
        let json = r#"[
            {"nodeId": "dgx-01", "gpuId": 0, "type": "xid-error", "severity": "critical",
             "parameters": {"xid": 48}},
            {"nodeId": "dgx-02", "type": "thermal", "severity": "warning",
             "parameters": {"targetTemp": 88}},
            {"nodeId": "dgx-01", "type": "cosmic-ray", "severity": "info"}
        ]"#;
        let faults: Vec<FaultConfig> = serde_json::from_str(json).unwrap();
        assert_eq!(faults[0].fault_type, FaultType::XidError);
        assert_eq!(faults[0].params().xid, Some(48));
        assert_eq!(faults[1].gpu_id, None);
        assert_eq!(faults[2].fault_type, FaultType::Unknown);
    }

    #[test]
    fn test_empty_list_changes_nothing() {
        let mut ctx = context();
        let report = apply_faults_to_context(&[], &mut ctx);
        assert_eq!(report, FaultReport::default());
        assert_eq!(ctx.mutation_count(), 0);
    }

    #[test]
    fn test_xid_defaults() {
        let mut ctx = context();
        let fault = FaultConfig::new("dgx-01", Some(0), FaultType::XidError);
        apply_faults_to_context(&[fault], &mut ctx);
        let gpu = ctx.gpu("dgx-01", 0).unwrap();
        let xid = gpu.latest_xid().unwrap();
        assert_eq!(xid.code, 79);
        assert_eq!(xid.description, "GPU has fallen off the bus");
        assert_eq!(gpu.health_status, HealthStatus::Critical);
        assert!(!gpu.is_accessible());
        assert!(ctx.gpu("dgx-01", 1).unwrap().is_accessible());
    }

    #[test]
    fn test_each_type_counts_once() {
        let mut ctx = context();
        let faults = vec![
            FaultConfig::new("dgx-01", Some(1), FaultType::Thermal),
            FaultConfig::new("dgx-01", Some(2), FaultType::EccError),
            FaultConfig::new("dgx-01", Some(3), FaultType::MemoryFull),
            FaultConfig::new("dgx-01", Some(4), FaultType::NvlinkFailure).with_parameters(
                FaultParameters {
                    link_id: Some(2),
                    ..Default::default()
                },
            ),
            FaultConfig::new("dgx-01", Some(5), FaultType::GpuHang),
        ];
        let report = apply_faults_to_context(&faults, &mut ctx);
        assert_eq!(report.applied, 5);
        assert_eq!(ctx.mutation_count(), 5);

        let node = ctx.node("dgx-01").unwrap();
        assert_eq!(node.gpus[1].temperature, 92);
        assert_eq!(node.gpus[2].ecc_errors.double_bit, 1);
        assert_eq!(node.gpus[2].ecc_errors.aggregated_double_bit, 1);
        assert_eq!(
            node.gpus[3].memory_used,
            (node.gpus[3].memory_total as f64 * 0.98) as u64
        );
        assert_eq!(node.gpus[4].health_status, HealthStatus::Warning);
        assert_eq!(node.gpus[4].nvlinks[2].status, LinkStatus::Down);
        assert_eq!(node.gpus[5].health_status, HealthStatus::Critical);
        assert_eq!(node.gpus[5].utilization, 0);
    }

    #[test]
    fn test_bad_targets_are_skipped() {
        let mut ctx = context();
        let faults = vec![
            FaultConfig::new("dgx-99", Some(0), FaultType::Thermal),
            FaultConfig::new("dgx-01", Some(8), FaultType::Thermal),
            FaultConfig::new("dgx-01", Some(0), FaultType::Unknown),
            FaultConfig::new("dgx-01", Some(0), FaultType::Thermal),
        ];
        let report = apply_faults_to_context(&faults, &mut ctx);
        assert_eq!(report.applied, 1);
        assert_eq!(
            report.skipped.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(ctx.mutation_count(), 1);
    }

    #[test]
    fn test_node_wide_fault_is_one_mutation() {
        let mut ctx = context();
        let fault = FaultConfig::new("dgx-02", None, FaultType::Thermal).with_parameters(
            FaultParameters {
                target_temp: Some(91),
                ..Default::default()
            },
        );
        apply_faults_to_context(&[fault], &mut ctx);
        assert_eq!(ctx.mutation_count(), 1);
        assert!(ctx
            .node("dgx-02")
            .unwrap()
            .gpus
            .iter()
            .all(|g| g.temperature == 91));
    }
}
