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

//! Simulated tools, one module per tool family.

pub mod cmsh;
pub mod common;
pub mod container;
pub mod dcgmi;
pub mod infiniband;
pub mod ipmitool;
pub mod mellanox;
pub mod meta;
pub mod nccl;
pub mod nvidia_smi;
pub mod nvsm;
pub mod shell;
pub mod slurm;
pub mod storage;
pub mod system;

use std::sync::Arc;

pub use cmsh::CmshSimulator;
pub use container::ContainerSimulator;
pub use dcgmi::DcgmiSimulator;
pub use infiniband::InfinibandSimulator;
pub use ipmitool::IpmitoolSimulator;
pub use mellanox::MellanoxSimulator;
pub use meta::MetaSimulator;
pub use nccl::NcclSimulator;
pub use nvidia_smi::NvidiaSmiSimulator;
pub use nvsm::NvsmSimulator;
pub use shell::ShellSimulator;
pub use slurm::SlurmSimulator;
pub use storage::StorageSimulator;
pub use system::SystemSimulator;

use crate::docs::DefinitionRegistry;
use crate::router::CommandRouter;
use crate::traits::Simulator;

/// Every simulator shipped with the crate.
pub fn all_simulators(registry: Arc<DefinitionRegistry>) -> Vec<Arc<dyn Simulator>> {
    vec![
        Arc::new(NvidiaSmiSimulator::new()),
        Arc::new(DcgmiSimulator::new()),
        Arc::new(NvsmSimulator::new()),
        Arc::new(IpmitoolSimulator::new()),
        Arc::new(SlurmSimulator::new()),
        Arc::new(InfinibandSimulator::new()),
        Arc::new(MellanoxSimulator::new()),
        Arc::new(StorageSimulator::new()),
        Arc::new(SystemSimulator::new()),
        Arc::new(ShellSimulator::new()),
        Arc::new(ContainerSimulator::new()),
        Arc::new(CmshSimulator::new()),
        Arc::new(NcclSimulator::new()),
        Arc::new(MetaSimulator::new(registry)),
    ]
}

/// A router with every simulator registered under its tool names.
pub fn default_router(registry: Arc<DefinitionRegistry>) -> CommandRouter {
    let mut router = CommandRouter::new();
    for simulator in all_simulators(registry) {
        router.register_simulator(simulator);
    }
    router
}
