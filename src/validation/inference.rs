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

//! Default expectations for a command, inferred from cluster state.
//!
//! Rules are regular expressions over the normalized command line, grouped
//! by tool family. The first matching rule produces an [`InferredValidation`];
//! a step may override any of its fields.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::common::config::SimConfig;
use crate::scenario::faults::{FaultConfig, FaultType};
use crate::state::types::{ClusterConfig, HealthStatus, Node};
use crate::state::xid;
use crate::traits::CommandResult;
use crate::utils::text::strip_ansi;
use crate::validation::matcher::normalize_command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolFamily {
    GpuMonitor,
    Dcgm,
    Nvsm,
    Bmc,
    Scheduler,
    Fabric,
    Mellanox,
    Storage,
    System,
    Container,
    ClusterManager,
    Nccl,
    Other,
}

impl ToolFamily {
    pub fn from_command(base_command: &str) -> Self {
        match base_command {
            "nvidia-smi" => ToolFamily::GpuMonitor,
            "dcgmi" => ToolFamily::Dcgm,
            "nvsm" => ToolFamily::Nvsm,
            "ipmitool" => ToolFamily::Bmc,
            "sinfo" | "squeue" | "scontrol" | "sbatch" | "srun" | "scancel" | "sacct" => {
                ToolFamily::Scheduler
            }
            "ibstat" | "ibstatus" | "iblinkinfo" | "perfquery" | "ibdiagnet" | "ibnetdiscover"
            | "ibportstate" => ToolFamily::Fabric,
            "mst" | "mlxconfig" | "mlxlink" | "flint" => ToolFamily::Mellanox,
            "df" | "lfs" | "mount" => ToolFamily::Storage,
            "lscpu" | "free" | "dmidecode" | "dmesg" | "uname" | "hostname" | "nproc" | "ip"
            | "uptime" => ToolFamily::System,
            "docker" | "enroot" => ToolFamily::Container,
            "cmsh" | "cmha" => ToolFamily::ClusterManager,
            "all_reduce_perf" => ToolFamily::Nccl,
            _ => ToolFamily::Other,
        }
    }
}

/// Expectations about a command's result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredValidation {
    pub expected_exit_code: Option<i32>,
    pub required_output: Vec<String>,
    pub forbidden_output: Vec<String>,
}

/// Step-level replacement for any field of an [`InferredValidation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOverride {
    pub expected_exit_code: Option<i32>,
    pub required_output: Option<Vec<String>>,
    pub forbidden_output: Option<Vec<String>>,
}

impl InferredValidation {
    /// A new record with every field the override sets replaced.
    pub fn merged_with(&self, overrides: &ValidationOverride) -> InferredValidation {
        InferredValidation {
            expected_exit_code: overrides.expected_exit_code.or(self.expected_exit_code),
            required_output: overrides
                .required_output
                .clone()
                .unwrap_or_else(|| self.required_output.clone()),
            forbidden_output: overrides
                .forbidden_output
                .clone()
                .unwrap_or_else(|| self.forbidden_output.clone()),
        }
    }

    /// Reasons the result falls short; empty when it passes.
    ///
    /// Output checks are case-insensitive and ignore terminal styling.
    pub fn check(&self, result: &CommandResult) -> Vec<String> {
        let mut failures = Vec::new();
        if let Some(code) = self.expected_exit_code {
            if result.exit_code != code {
                failures.push(format!(
                    "expected exit code {code}, got {}",
                    result.exit_code
                ));
            }
        }
        let output = strip_ansi(&result.output).to_lowercase();
        for needle in &self.required_output {
            if !output.contains(&needle.to_lowercase()) {
                failures.push(format!("output should mention '{needle}'"));
            }
        }
        for needle in &self.forbidden_output {
            if output.contains(&needle.to_lowercase()) {
                failures.push(format!("output should not mention '{needle}'"));
            }
        }
        failures
    }
}

/// What a rule may look at.
pub struct InferenceInput<'a> {
    pub command: &'a str,
    pub cluster: &'a ClusterConfig,
    pub current_node: &'a str,
    pub faults: &'a [FaultConfig],
}

impl InferenceInput<'_> {
    fn node(&self) -> Option<&Node> {
        self.cluster.node(self.current_node)
    }

    /// Current temperatures of GPUs on this node hit by a thermal fault.
    fn thermal_readings(&self) -> Vec<u32> {
        let Some(node) = self.node() else {
            return Vec::new();
        };
        let mut readings: Vec<u32> = self
            .faults
            .iter()
            .filter(|f| f.fault_type == FaultType::Thermal)
            .filter(|f| f.node_id == node.id || f.node_id == node.hostname)
            .flat_map(|f| match f.gpu_id {
                Some(id) => node
                    .gpu(id)
                    .map(|g| g.temperature)
                    .into_iter()
                    .collect::<Vec<_>>(),
                None => node.gpus.iter().map(|g| g.temperature).collect::<Vec<_>>(),
            })
            .collect();
        readings.sort_unstable();
        readings.dedup();
        readings
    }
}

type InferFn = fn(&Captures, &InferenceInput) -> InferredValidation;

struct InferenceRule {
    family: ToolFamily,
    pattern: Regex,
    infer: InferFn,
}

fn rule(family: ToolFamily, pattern: &str, infer: InferFn) -> InferenceRule {
    InferenceRule {
        family,
        pattern: Regex::new(pattern).unwrap(),
        infer,
    }
}

fn exit_only(code: i32) -> InferredValidation {
    InferredValidation {
        expected_exit_code: Some(code),
        ..Default::default()
    }
}

static RULES: Lazy<Vec<InferenceRule>> = Lazy::new(|| {
    vec![
        rule(ToolFamily::GpuMonitor, r"^nvidia-smi\b.*\s(?:-r|--gpu-reset)\b", infer_gpu_reset),
        rule(ToolFamily::GpuMonitor, r"^nvidia-smi(?:\s+-l)?\s*$", infer_gpu_listing),
        rule(ToolFamily::GpuMonitor, r"^nvidia-smi\b", |_, _| exit_only(0)),
        rule(ToolFamily::Dcgm, r"^dcgmi\s+diag\b", infer_dcgm_diag),
        rule(ToolFamily::Dcgm, r"^dcgmi\s+health\b", infer_dcgm_health),
        rule(ToolFamily::Dcgm, r"^dcgmi\s+(?:discovery|dmon)\b", |_, _| exit_only(0)),
        rule(ToolFamily::Bmc, r"^ipmitool\b.*\b(?:sensor|sdr)\b", infer_bmc_sensors),
        rule(ToolFamily::Scheduler, r"^scontrol\s+show\s+node\s+(\S+)", infer_scontrol_node),
        rule(ToolFamily::Scheduler, r"^scancel\s+(\d+)", infer_scancel),
        rule(ToolFamily::Scheduler, r"^(?:sinfo|squeue|sacct)\b", |_, _| exit_only(0)),
        rule(ToolFamily::Fabric, r"^ibstatus?\b", infer_ib_status),
        rule(ToolFamily::Fabric, r"^(?:iblinkinfo|ibnetdiscover)\b", |_, _| exit_only(0)),
        rule(ToolFamily::Storage, r"^(?:df|lfs\s+df|mount)\b", |_, _| exit_only(0)),
        rule(
            ToolFamily::System,
            r"^(?:lscpu|free|uname|hostname|nproc|uptime|dmesg|ip)\b",
            |_, _| exit_only(0),
        ),
    ]
});

fn infer_gpu_reset(_: &Captures, input: &InferenceInput) -> InferredValidation {
    static INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s(?:-i|--id=)\s*(\d+)").unwrap());
    let Some(node) = input.node() else {
        return InferredValidation::default();
    };
    let target = INDEX_RE
        .captures(input.command)
        .and_then(|c| c[1].parse::<u32>().ok());
    let lost = node
        .gpus
        .iter()
        .filter(|g| match target {
            Some(t) => g.id == t,
            None => true,
        })
        .any(|g| !g.is_accessible());
    if lost {
        InferredValidation {
            expected_exit_code: Some(15),
            required_output: vec!["fallen off the bus".to_string()],
            forbidden_output: Vec::new(),
        }
    } else {
        exit_only(0)
    }
}

fn infer_gpu_listing(_: &Captures, input: &InferenceInput) -> InferredValidation {
    let mut inferred = exit_only(0);
    if let Some(node) = input.node() {
        if node.gpus.iter().any(|g| !g.is_accessible()) {
            inferred.required_output.push("GPU is lost".to_string());
        }
    }
    if !input.command.contains("-l") {
        inferred.required_output.extend(
            input
                .thermal_readings()
                .into_iter()
                .map(|t| format!("{t}C")),
        );
    }
    inferred
}

fn infer_dcgm_diag(_: &Captures, input: &InferenceInput) -> InferredValidation {
    let failing = input.node().is_some_and(|node| {
        node.gpus.iter().any(|g| {
            !g.is_accessible()
                || g.ecc_errors.double_bit > 0
                || g.xid_errors.iter().any(|x| xid::fails_diagnostics(x.code))
        })
    });
    if failing {
        InferredValidation {
            expected_exit_code: Some(SimConfig::EXIT_FAILURE),
            required_output: vec!["Fail".to_string()],
            forbidden_output: Vec::new(),
        }
    } else {
        InferredValidation {
            expected_exit_code: Some(0),
            required_output: vec!["Pass".to_string()],
            forbidden_output: vec!["Fail".to_string()],
        }
    }
}

fn infer_dcgm_health(_: &Captures, input: &InferenceInput) -> InferredValidation {
    let worst = input
        .node()
        .and_then(|node| node.gpus.iter().map(|g| g.health_status).max())
        .unwrap_or_default();
    let word = match worst {
        HealthStatus::Ok => "Healthy",
        HealthStatus::Warning => "Warning",
        HealthStatus::Critical => "Failure",
    };
    InferredValidation {
        expected_exit_code: Some(0),
        required_output: vec![word.to_string()],
        forbidden_output: Vec::new(),
    }
}

fn infer_bmc_sensors(_: &Captures, input: &InferenceInput) -> InferredValidation {
    let mut inferred = exit_only(0);
    inferred.required_output = input
        .thermal_readings()
        .into_iter()
        .map(|t| t.to_string())
        .collect();
    inferred
}

fn infer_scontrol_node(caps: &Captures, input: &InferenceInput) -> InferredValidation {
    match input.cluster.node(&caps[1]) {
        None => exit_only(SimConfig::EXIT_FAILURE),
        Some(node) => {
            let mut inferred = exit_only(0);
            inferred.required_output.push(format!("NodeName={}", node.hostname));
            if let Some(reason) = &node.slurm_reason {
                inferred.required_output.push(reason.clone());
            }
            inferred
        }
    }
}

fn infer_scancel(caps: &Captures, input: &InferenceInput) -> InferredValidation {
    let active = caps[1]
        .parse::<u32>()
        .ok()
        .and_then(|id| input.cluster.slurm.job(id))
        .is_some_and(|job| job.state.is_active());
    exit_only(if active { 0 } else { SimConfig::EXIT_FAILURE })
}

fn infer_ib_status(_: &Captures, input: &InferenceInput) -> InferredValidation {
    let mut inferred = exit_only(0);
    let down = input
        .node()
        .is_some_and(|n| n.hcas.iter().flat_map(|h| &h.ports).any(|p| !p.is_up()));
    if down {
        inferred.required_output.push("Down".to_string());
    }
    inferred
}

/// Regex rule table keyed by tool family.
#[derive(Debug, Default, Clone, Copy)]
pub struct InferenceEngine;

impl InferenceEngine {
    pub fn new() -> Self {
        Self
    }

    /// Expectations for `command` given the current state, or the empty
    /// record when no rule applies.
    pub fn infer(
        &self,
        command: &str,
        cluster: &ClusterConfig,
        current_node: &str,
        faults: &[FaultConfig],
    ) -> InferredValidation {
        let normalized = normalize_command(command);
        let base = normalized.split_whitespace().next().unwrap_or_default();
        let family = ToolFamily::from_command(base);
        let input = InferenceInput {
            command: &normalized,
            cluster,
            current_node,
            faults,
        };
        RULES
            .iter()
            .filter(|r| r.family == family)
            .find_map(|r| r.pattern.captures(&normalized).map(|c| (r.infer)(&c, &input)))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::faults::FaultParameters;
    use crate::state::{build_cluster, ClusterBuildConfig, XidError};
    use chrono::Utc;

    fn lose_gpu0(cluster: &mut ClusterConfig) {
        cluster
            .add_xid_error(
                "dgx-01",
                0,
                XidError {
                    code: 79,
                    timestamp: Utc::now(),
                    description: xid::description(79),
                    severity: crate::state::Severity::Critical,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_merge_is_field_wise_and_non_destructive() {
        let inferred = InferredValidation {
            expected_exit_code: Some(0),
            required_output: vec!["Pass".to_string()],
            forbidden_output: vec!["Fail".to_string()],
        };
        let merged = inferred.merged_with(&ValidationOverride {
            required_output: Some(vec!["GPU 0".to_string()]),
            ..Default::default()
        });
        assert_eq!(merged.expected_exit_code, Some(0));
        assert_eq!(merged.required_output, vec!["GPU 0"]);
        assert_eq!(merged.forbidden_output, vec!["Fail"]);
        assert_eq!(inferred.required_output, vec!["Pass"]);
    }

    #[test]
    fn test_reset_of_lost_gpu_is_expected_to_fail() {
        let mut cluster = build_cluster(&ClusterBuildConfig::default());
        lose_gpu0(&mut cluster);
        let engine = InferenceEngine::new();

        let inferred = engine.infer("nvidia-smi -r -i 0", &cluster, "dgx-01", &[]);
        assert_eq!(inferred.expected_exit_code, Some(15));
        assert_eq!(inferred.required_output, vec!["fallen off the bus"]);

        let inferred = engine.infer("nvidia-smi -r -i 1", &cluster, "dgx-01", &[]);
        assert_eq!(inferred.expected_exit_code, Some(0));
    }

    #[test]
    fn test_thermal_reading_required_in_listing() {
        let mut cluster = build_cluster(&ClusterBuildConfig::default());
        cluster.gpu_mut("dgx-01", 2).unwrap().temperature = 95;
        let fault = FaultConfig::new("dgx-01", Some(2), FaultType::Thermal).with_parameters(
            FaultParameters {
                target_temp: Some(95),
                ..Default::default()
            },
        );
        let inferred = InferenceEngine::new().infer("nvidia-smi", &cluster, "dgx-01", &[fault]);
        assert_eq!(inferred.required_output, vec!["95C"]);
    }

    #[test]
    fn test_unknown_command_infers_nothing() {
        let cluster = build_cluster(&ClusterBuildConfig::default());
        let inferred = InferenceEngine::new().infer("frobnicate --all", &cluster, "dgx-01", &[]);
        assert_eq!(inferred, InferredValidation::default());
    }

    #[test]
    fn test_check_ignores_case_and_styling() {
        let inferred = InferredValidation {
            expected_exit_code: Some(0),
            required_output: vec!["healthy".to_string()],
            forbidden_output: vec!["failure".to_string()],
        };
        let result = CommandResult::ok("Overall Health: \u{1b}[32mHealthy\u{1b}[0m");
        assert!(inferred.check(&result).is_empty());

        let result = CommandResult::error(1, "Overall Health: Failure");
        assert_eq!(inferred.check(&result).len(), 3);
    }
}
