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

//! Which tool commands report the same piece of state.
//!
//! Every command of a group reads the named domain from the one cluster view,
//! so after any mutation they must agree. The integration tests use these
//! groups as their oracle.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateDomain {
    GpuTemperature,
    GpuAccessibility,
    GpuMemory,
    GpuInventory,
    SlurmNodeState,
    IbPortState,
    LustreCapacity,
    NodePower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsistencyGroup {
    pub id: &'static str,
    pub domain: StateDomain,
    pub description: &'static str,
    /// Command lines, run on a compute node unless noted otherwise.
    pub commands: &'static [&'static str],
}

const GROUPS: &[ConsistencyGroup] = &[
    ConsistencyGroup {
        id: "gpu-temperature",
        domain: StateDomain::GpuTemperature,
        description: "GPU core temperature",
        commands: &[
            "nvidia-smi --query-gpu=index,temperature.gpu --format=csv,noheader",
            "nvidia-smi -q -d TEMPERATURE",
            "dcgmi dmon -e 150 -c 1",
            "ipmitool sensor",
        ],
    },
    ConsistencyGroup {
        id: "gpu-accessibility",
        domain: StateDomain::GpuAccessibility,
        description: "GPUs that fell off the bus",
        commands: &[
            "nvidia-smi",
            "nvidia-smi -r -i 0",
            "dcgmi diag -r 1",
            "nvsm show gpus",
            "dmesg",
            "docker run --rm --gpus all nvcr.io/nvidia/cuda:12.2.0-base-ubuntu22.04 nvidia-smi -L",
        ],
    },
    ConsistencyGroup {
        id: "gpu-memory",
        domain: StateDomain::GpuMemory,
        description: "Framebuffer memory in use",
        commands: &[
            "nvidia-smi --query-gpu=index,memory.used,memory.total --format=csv,noheader",
            "nvidia-smi -q -d MEMORY",
        ],
    },
    ConsistencyGroup {
        id: "gpu-inventory",
        domain: StateDomain::GpuInventory,
        description: "GPU count, names and UUIDs",
        commands: &["nvidia-smi -L", "dcgmi discovery -l", "nvsm show gpus"],
    },
    ConsistencyGroup {
        id: "slurm-node-state",
        domain: StateDomain::SlurmNodeState,
        description: "Scheduler state and reason of each node (head node)",
        commands: &["sinfo -N", "sinfo -R", "scontrol show node"],
    },
    ConsistencyGroup {
        id: "ib-port-state",
        domain: StateDomain::IbPortState,
        description: "InfiniBand port state and rate",
        commands: &["ibstat", "ibstatus", "iblinkinfo", "mlxlink -d mlx5_0", "ip -br link"],
    },
    ConsistencyGroup {
        id: "lustre-capacity",
        domain: StateDomain::LustreCapacity,
        description: "Lustre size and usage",
        commands: &["df -h /lustre", "lfs df -h"],
    },
    ConsistencyGroup {
        id: "node-power",
        domain: StateDomain::NodePower,
        description: "Chassis power (head node)",
        commands: &["ipmitool -H dgx-01 chassis power status", "cmsh -c \"device; power status\""],
    },
];

pub fn consistency_groups() -> &'static [ConsistencyGroup] {
    GROUPS
}

pub fn group(id: &str) -> Option<&'static ConsistencyGroup> {
    GROUPS.iter().find(|g| g.id == id)
}

/// Groups containing a command whose base tool is `tool`.
pub fn groups_for_tool(tool: &str) -> Vec<&'static ConsistencyGroup> {
    GROUPS
        .iter()
        .filter(|g| {
            g.commands
                .iter()
                .any(|c| c.split_whitespace().next() == Some(tool))
        })
        .collect()
}
