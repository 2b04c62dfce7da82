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

use crate::state::types::SystemType;

pub const GPUS_PER_NODE: usize = 8;

pub const DEFAULT_OS_VERSION: &str = "Ubuntu 22.04.4 LTS";
pub const DEFAULT_KERNEL_VERSION: &str = "5.15.0-1053-nvidia";
pub const DCGM_VERSION: &str = "3.3.5";
pub const NVSM_VERSION: &str = "24.03.07";
pub const SLURM_VERSION: &str = "23.11.4";
pub const MLNX_OFED_VERSION: &str = "MLNX_OFED_LINUX-23.10-1.1.9.0";
pub const MFT_VERSION: &str = "4.26.1-3";
pub const IPMITOOL_VERSION: &str = "1.8.19";
pub const LUSTRE_VERSION: &str = "2.15.4";
pub const BCM_VERSION: &str = "10.24.03";
pub const DOCKER_VERSION: &str = "24.0.7";
pub const ENROOT_VERSION: &str = "3.4.1";
pub const NCCL_VERSION: &str = "2.20.5";

/// PCI bus numbers of the eight SXM GPUs on the HGX baseboard.
pub const GPU_PCI_BUSES: [&str; GPUS_PER_NODE] = ["18", "2A", "3A", "5D", "9A", "AB", "BA", "DB"];

/// PCI bus numbers of the compute-fabric ConnectX adapters.
pub const HCA_PCI_BUSES: [&str; GPUS_PER_NODE] = ["1A", "3C", "4D", "5E", "9C", "BC", "CC", "DC"];

/// Hardware profile of one DGX generation
pub struct SystemProfile {
    pub system_type: SystemType,
    pub product_name: &'static str,
    pub gpu_name: &'static str,
    pub gpu_memory_mib: u64,
    pub gpu_count: usize,
    pub nvlinks_per_gpu: u32,
    pub nvlink_speed_gbps: f64,
    pub power_limit_w: f64,
    pub idle_power_w: f64,
    pub idle_graphics_mhz: u32,
    pub max_graphics_mhz: u32,
    pub max_memory_mhz: u32,
    pub vbios_version: &'static str,
    pub hca_count: usize,
    pub hca_model: &'static str,
    pub hca_ca_type: &'static str,
    pub hca_firmware: &'static str,
    pub hca_psid: &'static str,
    pub ib_rate_gbps: u32,
    pub dpu_count: u32,
    pub dpu_model: &'static str,
    pub dpu_ca_type: &'static str,
    pub dpu_firmware: &'static str,
    pub cpu_model: &'static str,
    pub cpu_sockets: u32,
    pub cores_per_socket: u32,
    pub cpu_base_mhz: u32,
    pub cpu_max_mhz: u32,
    pub ram_total_gb: u64,
    pub raid_size_tb: u64,
    pub bios_version: &'static str,
    pub bmc_firmware: &'static str,
    pub driver_version: &'static str,
    pub cuda_version: &'static str,
    pub nvlink_label: &'static str,
}

const DGX_A100: SystemProfile = SystemProfile {
    system_type: SystemType::DgxA100,
    product_name: "DGX A100",
    gpu_name: "NVIDIA A100-SXM4-80GB",
    gpu_memory_mib: 81920,
    gpu_count: GPUS_PER_NODE,
    nvlinks_per_gpu: 12,
    nvlink_speed_gbps: 25.0,
    power_limit_w: 400.0,
    idle_power_w: 62.0,
    idle_graphics_mhz: 210,
    max_graphics_mhz: 1410,
    max_memory_mhz: 1593,
    vbios_version: "92.00.45.00.05",
    hca_count: 8,
    hca_model: "ConnectX-6",
    hca_ca_type: "MT4123",
    hca_firmware: "20.39.1002",
    hca_psid: "MT_0000000223",
    ib_rate_gbps: 200,
    dpu_count: 0,
    dpu_model: "",
    dpu_ca_type: "",
    dpu_firmware: "",
    cpu_model: "AMD EPYC 7742 64-Core Processor",
    cpu_sockets: 2,
    cores_per_socket: 64,
    cpu_base_mhz: 2250,
    cpu_max_mhz: 3400,
    ram_total_gb: 2048,
    raid_size_tb: 15,
    bios_version: "1.25",
    bmc_firmware: "00.22.06",
    driver_version: "535.161.08",
    cuda_version: "12.2",
    nvlink_label: "NV12",
};

const DGX_H100: SystemProfile = SystemProfile {
    system_type: SystemType::DgxH100,
    product_name: "DGX H100",
    gpu_name: "NVIDIA H100 80GB HBM3",
    gpu_memory_mib: 81559,
    gpu_count: GPUS_PER_NODE,
    nvlinks_per_gpu: 18,
    nvlink_speed_gbps: 26.562,
    power_limit_w: 700.0,
    idle_power_w: 71.0,
    idle_graphics_mhz: 345,
    max_graphics_mhz: 1980,
    max_memory_mhz: 2619,
    vbios_version: "96.00.89.00.01",
    hca_count: 8,
    hca_model: "ConnectX-7",
    hca_ca_type: "MT4129",
    hca_firmware: "28.39.1002",
    hca_psid: "MT_0000000838",
    ib_rate_gbps: 400,
    dpu_count: 2,
    dpu_model: "BlueField-3",
    dpu_ca_type: "MT41692",
    dpu_firmware: "32.39.2048",
    cpu_model: "Intel(R) Xeon(R) Platinum 8480C",
    cpu_sockets: 2,
    cores_per_socket: 56,
    cpu_base_mhz: 2000,
    cpu_max_mhz: 3800,
    ram_total_gb: 2048,
    raid_size_tb: 30,
    bios_version: "1.06.03",
    bmc_firmware: "24.01.05",
    driver_version: "535.161.08",
    cuda_version: "12.2",
    nvlink_label: "NV18",
};

const DGX_H200: SystemProfile = SystemProfile {
    system_type: SystemType::DgxH200,
    product_name: "DGX H200",
    gpu_name: "NVIDIA H200",
    gpu_memory_mib: 143771,
    gpu_count: GPUS_PER_NODE,
    nvlinks_per_gpu: 18,
    nvlink_speed_gbps: 26.562,
    power_limit_w: 700.0,
    idle_power_w: 76.0,
    idle_graphics_mhz: 345,
    max_graphics_mhz: 1980,
    max_memory_mhz: 3201,
    vbios_version: "96.00.A1.00.01",
    hca_count: 8,
    hca_model: "ConnectX-7",
    hca_ca_type: "MT4129",
    hca_firmware: "28.40.1000",
    hca_psid: "MT_0000000838",
    ib_rate_gbps: 400,
    dpu_count: 2,
    dpu_model: "BlueField-3",
    dpu_ca_type: "MT41692",
    dpu_firmware: "32.40.1000",
    cpu_model: "Intel(R) Xeon(R) Platinum 8480C",
    cpu_sockets: 2,
    cores_per_socket: 56,
    cpu_base_mhz: 2000,
    cpu_max_mhz: 3800,
    ram_total_gb: 2048,
    raid_size_tb: 30,
    bios_version: "1.07.01",
    bmc_firmware: "24.03.01",
    driver_version: "550.54.15",
    cuda_version: "12.4",
    nvlink_label: "NV18",
};

const DGX_B200: SystemProfile = SystemProfile {
    system_type: SystemType::DgxB200,
    product_name: "DGX B200",
    gpu_name: "NVIDIA B200",
    gpu_memory_mib: 183359,
    gpu_count: GPUS_PER_NODE,
    nvlinks_per_gpu: 18,
    nvlink_speed_gbps: 50.0,
    power_limit_w: 1000.0,
    idle_power_w: 120.0,
    idle_graphics_mhz: 120,
    max_graphics_mhz: 1965,
    max_memory_mhz: 3996,
    vbios_version: "97.00.3B.00.02",
    hca_count: 8,
    hca_model: "ConnectX-7",
    hca_ca_type: "MT4129",
    hca_firmware: "28.41.1000",
    hca_psid: "MT_0000000838",
    ib_rate_gbps: 400,
    dpu_count: 2,
    dpu_model: "BlueField-3",
    dpu_ca_type: "MT41692",
    dpu_firmware: "32.41.1000",
    cpu_model: "Intel(R) Xeon(R) Platinum 8570",
    cpu_sockets: 2,
    cores_per_socket: 56,
    cpu_base_mhz: 2100,
    cpu_max_mhz: 4000,
    ram_total_gb: 4096,
    raid_size_tb: 30,
    bios_version: "0.15.02",
    bmc_firmware: "24.09.17",
    driver_version: "570.86.15",
    cuda_version: "12.8",
    nvlink_label: "NV18",
};

pub fn profile(system_type: SystemType) -> &'static SystemProfile {
    match system_type {
        SystemType::DgxA100 => &DGX_A100,
        SystemType::DgxH100 => &DGX_H100,
        SystemType::DgxH200 => &DGX_H200,
        SystemType::DgxB200 => &DGX_B200,
    }
}

/// A MIG GPU-instance profile as listed by `nvidia-smi mig -lgip`.
pub struct MigProfile {
    pub id: u32,
    pub name: &'static str,
    pub slices: u32,
    pub max_instances: u32,
    pub memory_fraction: f64,
}

pub const MIG_PROFILES: &[MigProfile] = &[
    MigProfile {
        id: 19,
        name: "1g",
        slices: 1,
        max_instances: 7,
        memory_fraction: 0.125,
    },
    MigProfile {
        id: 15,
        name: "1g+2",
        slices: 1,
        max_instances: 4,
        memory_fraction: 0.25,
    },
    MigProfile {
        id: 14,
        name: "2g",
        slices: 2,
        max_instances: 3,
        memory_fraction: 0.25,
    },
    MigProfile {
        id: 9,
        name: "3g",
        slices: 3,
        max_instances: 2,
        memory_fraction: 0.5,
    },
    MigProfile {
        id: 5,
        name: "4g",
        slices: 4,
        max_instances: 1,
        memory_fraction: 0.5,
    },
    MigProfile {
        id: 0,
        name: "7g",
        slices: 7,
        max_instances: 1,
        memory_fraction: 1.0,
    },
];

pub fn mig_profile(id: u32) -> Option<&'static MigProfile> {
    MIG_PROFILES.iter().find(|p| p.id == id)
}

/// Display name such as `1g.10gb` for a profile on a GPU with the given memory.
pub fn mig_profile_display(profile: &MigProfile, gpu_memory_mib: u64) -> String {
    let gb = ((gpu_memory_mib as f64 / 1024.0) * profile.memory_fraction).round() as u64;
    let base = profile.name.split('+').next().unwrap_or(profile.name);
    if profile.name.contains('+') {
        format!("{base}.{gb}gb+me")
    } else {
        format!("{base}.{gb}gb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_have_eight_gpus() {
        for system_type in SystemType::ALL {
            let p = profile(system_type);
            assert_eq!(p.gpu_count, GPUS_PER_NODE);
            assert_eq!(p.system_type, system_type);
            assert!(p.hca_count <= HCA_PCI_BUSES.len());
        }
    }

    #[test]
    fn test_mig_profile_display() {
        let p = mig_profile(19).unwrap();
        assert_eq!(mig_profile_display(p, 81920), "1g.10gb");
        let p = mig_profile(0).unwrap();
        assert_eq!(mig_profile_display(p, 81920), "7g.80gb");
    }
}
