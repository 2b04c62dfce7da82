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

use std::path::PathBuf;

use clap::Parser;

use crate::common::config::SimConfig;
use crate::state::types::{FabricTopology, SystemType};
use crate::state::ClusterBuildConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated DGX cluster administration shell", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub cluster: ClusterArgs,
    /// Scenario definition (JSON) to start before the first command.
    #[arg(long)]
    pub scenario: Option<PathBuf>,
    /// Extra command definitions (JSON) merged over the built-in ones.
    #[arg(long)]
    pub definitions: Option<PathBuf>,
    /// Node the shell starts on. Defaults to the first compute node.
    #[arg(long)]
    pub node: Option<String>,
    /// Run these commands in order and exit instead of starting the shell.
    #[arg(short, long = "command")]
    pub commands: Vec<String>,
    /// Print results as JSON lines.
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Number of compute nodes.
    #[arg(long, default_value_t = SimConfig::DEFAULT_NODE_COUNT)]
    pub nodes: usize,
    /// DGX system type of every compute node (a100, h100, h200, b200).
    #[arg(long, default_value = "h100", value_parser = parse_system_type)]
    pub system_type: SystemType,
    #[arg(long, default_value = SimConfig::DEFAULT_CLUSTER_NAME)]
    pub cluster_name: String,
    /// Compute node hostname prefix.
    #[arg(long, default_value = SimConfig::DEFAULT_HOSTNAME_PREFIX)]
    pub hostname_prefix: String,
    /// InfiniBand fabric layout (fat-tree, rail-optimized, dragonfly).
    #[arg(long, default_value = "fat-tree", value_parser = parse_topology)]
    pub topology: FabricTopology,
    /// Seed for serial numbers, GUIDs and other generated values.
    #[arg(long, default_value_t = SimConfig::DEFAULT_SEED)]
    pub seed: u64,
}

impl ClusterArgs {
    pub fn build_config(&self) -> ClusterBuildConfig {
        ClusterBuildConfig {
            name: self.cluster_name.clone(),
            node_count: self.nodes,
            system_type: self.system_type,
            hostname_prefix: self.hostname_prefix.clone(),
            fabric_topology: self.topology,
            seed: self.seed,
        }
    }
}

fn parse_system_type(value: &str) -> Result<SystemType, String> {
    SystemType::from_tag(value).ok_or_else(|| format!("unknown system type '{value}'"))
}

fn parse_topology(value: &str) -> Result<FabricTopology, String> {
    match value.to_ascii_lowercase().as_str() {
        "fat-tree" | "fattree" => Ok(FabricTopology::FatTree),
        "rail-optimized" | "rail" => Ok(FabricTopology::RailOptimized),
        "dragonfly" => Ok(FabricTopology::Dragonfly),
        _ => Err(format!("unknown fabric topology '{value}'")),
    }
}
