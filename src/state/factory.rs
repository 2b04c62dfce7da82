//! Cluster factory: derives per-node hardware from the system-type profile

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

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::config::SimConfig;
use crate::state::constants::{
    profile, SystemProfile, DEFAULT_KERNEL_VERSION, DEFAULT_OS_VERSION, GPU_PCI_BUSES,
    HCA_PCI_BUSES,
};
use crate::state::types::*;
use crate::utils::units::{GIB, TIB};

/// Parameters for building a cluster. Same config, same cluster.
#[derive(Debug, Clone)]
pub struct ClusterBuildConfig {
    pub name: String,
    pub node_count: usize,
    pub system_type: SystemType,
    pub hostname_prefix: String,
    pub fabric_topology: FabricTopology,
    /// Seed for UUIDs, GUIDs and serial numbers
    pub seed: u64,
}

impl Default for ClusterBuildConfig {
    fn default() -> Self {
        Self {
            name: SimConfig::DEFAULT_CLUSTER_NAME.to_string(),
            node_count: SimConfig::DEFAULT_NODE_COUNT,
            system_type: SystemType::DgxH100,
            hostname_prefix: SimConfig::DEFAULT_HOSTNAME_PREFIX.to_string(),
            fabric_topology: FabricTopology::FatTree,
            seed: SimConfig::DEFAULT_SEED,
        }
    }
}

pub fn build_cluster(config: &ClusterBuildConfig) -> ClusterConfig {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let hw = profile(config.system_type);

    let nodes: Vec<Node> = (0..config.node_count)
        .map(|i| generate_node(&mut rng, hw, config, i))
        .collect();
    let node_names: Vec<String> = nodes.iter().map(|n| n.hostname.clone()).collect();

    let partitions = vec![
        Partition {
            name: "batch".to_string(),
            nodes: node_names.clone(),
            is_default: true,
            max_time: "7-00:00:00".to_string(),
            state: PartitionState::Up,
        },
        Partition {
            name: "debug".to_string(),
            nodes: node_names.iter().take(1).cloned().collect(),
            is_default: false,
            max_time: "02:00:00".to_string(),
            state: PartitionState::Up,
        },
    ];

    ClusterConfig {
        name: config.name.clone(),
        nodes,
        fabric_topology: config.fabric_topology,
        ha: HaConfig {
            enabled: true,
            primary_head_node: SimConfig::HEAD_NODE.to_string(),
            secondary_head_node: SimConfig::STANDBY_HEAD_NODE.to_string(),
            virtual_ip: SimConfig::HEAD_NODE_VIRTUAL_IP.to_string(),
            active_head_node: SimConfig::HEAD_NODE.to_string(),
            failover_count: 0,
        },
        slurm: SlurmConfig {
            cluster_name: config.name.clone(),
            controller: SimConfig::HEAD_NODE.to_string(),
            partitions,
            jobs: Vec::new(),
            next_job_id: SimConfig::FIRST_JOB_ID,
        },
        lustre: generate_lustre(&mut rng),
    }
}

fn generate_node(
    rng: &mut StdRng,
    hw: &SystemProfile,
    config: &ClusterBuildConfig,
    index: usize,
) -> Node {
    let hostname = format!("{}-{:02}", config.hostname_prefix, index + 1);
    let node_octet = 10 + index;

    let gpus = (0..hw.gpu_count)
        .map(|g| generate_gpu(rng, hw, index, g))
        .collect();
    let hcas = (0..hw.hca_count)
        .map(|h| generate_hca(rng, hw, index, h))
        .collect();
    let dpus = (0..hw.dpu_count)
        .map(|d| Dpu {
            id: d,
            name: format!("mlx5_{}", hw.hca_count as u32 + d * 2),
            model: hw.dpu_model.to_string(),
            ca_type: hw.dpu_ca_type.to_string(),
            firmware_version: hw.dpu_firmware.to_string(),
            mode: "DPU".to_string(),
            arm_os: "DOCA 2.6.0 BSP".to_string(),
            pci_address: format!("0000:{:02x}:00.0", 0x29 + d * 0x80),
            firmware_config: BTreeMap::new(),
        })
        .collect();

    let raid_bytes = hw.raid_size_tb * TIB;
    let mounts = vec![
        Mount {
            device: "/dev/md0".to_string(),
            mount_point: "/".to_string(),
            fs_type: "ext4".to_string(),
            options: "rw,relatime".to_string(),
            size_bytes: 1788 * GIB,
            used_bytes: (212 + rng.random_range(0..40)) * GIB,
        },
        Mount {
            device: "/dev/md1".to_string(),
            mount_point: "/raid".to_string(),
            fs_type: "ext4".to_string(),
            options: "rw,relatime".to_string(),
            size_bytes: raid_bytes,
            used_bytes: raid_bytes / 100 * rng.random_range(5..30),
        },
        Mount {
            device: "10.0.2.10@o2ib:/lustre".to_string(),
            mount_point: "/lustre".to_string(),
            fs_type: "lustre".to_string(),
            options: "rw,flock,lazystatfs".to_string(),
            // Sized from the cluster filesystem when displayed
            size_bytes: 0,
            used_bytes: 0,
        },
    ];

    Node {
        id: hostname.clone(),
        hostname: hostname.clone(),
        system_type: hw.system_type,
        management_ip: format!("10.0.0.{node_octet}"),
        gpus,
        hcas,
        dpus,
        bmc: generate_bmc(rng, hw, index),
        slurm_state: SlurmNodeState::Idle,
        slurm_reason: None,
        cpu: CpuInfo {
            model: hw.cpu_model.to_string(),
            architecture: "x86_64".to_string(),
            sockets: hw.cpu_sockets,
            cores_per_socket: hw.cores_per_socket,
            threads_per_core: 2,
            base_mhz: hw.cpu_base_mhz,
            max_mhz: hw.cpu_max_mhz,
            numa_nodes: hw.cpu_sockets,
        },
        ram_total_gb: hw.ram_total_gb,
        ram_used_gb: 38 + rng.random_range(0..24),
        os_version: DEFAULT_OS_VERSION.to_string(),
        kernel_version: DEFAULT_KERNEL_VERSION.to_string(),
        driver_version: hw.driver_version.to_string(),
        cuda_version: hw.cuda_version.to_string(),
        bios_version: hw.bios_version.to_string(),
        uptime_secs: 86_400 * (3 + index as u64) + rng.random_range(0..86_400),
        mounts,
        containers: vec![Container {
            id: generate_hex(rng, 12),
            name: "dcgm-exporter".to_string(),
            image: "nvcr.io/nvidia/k8s/dcgm-exporter:3.3.5-3.4.0-ubuntu22.04".to_string(),
            status: "Up 3 days".to_string(),
            command: "/usr/local/dcgm/dcgm-exporter-entrypoint.sh".to_string(),
            gpus: Vec::new(),
        }],
    }
}

fn generate_gpu(rng: &mut StdRng, hw: &SystemProfile, node_index: usize, gpu_index: usize) -> Gpu {
    let nvlinks = (0..hw.nvlinks_per_gpu)
        .map(|link_id| NvLink {
            link_id,
            status: LinkStatus::Active,
            speed_gbps: hw.nvlink_speed_gbps,
            replay_errors: 0,
            recovery_errors: 0,
            crc_errors: 0,
        })
        .collect();

    // Idle baseline: stable temperatures spread over a few degrees
    let temperature = 30 + ((node_index * 7 + gpu_index * 3) % 8) as u32;
    let power_draw = hw.idle_power_w + ((node_index + gpu_index) % 5) as f64;

    Gpu {
        id: gpu_index as u32,
        uuid: format!("GPU-{}", generate_uuid(rng)),
        name: hw.gpu_name.to_string(),
        pci_bus_id: format!("00000000:{}:00.0", GPU_PCI_BUSES[gpu_index % GPU_PCI_BUSES.len()]),
        serial: format!("165{:010}", rng.random_range(0..10_000_000_000u64)),
        vbios_version: hw.vbios_version.to_string(),
        health_status: HealthStatus::Ok,
        temperature,
        power_draw,
        power_limit: hw.power_limit_w,
        max_power_limit: hw.power_limit_w,
        utilization: 0,
        memory_used: 0,
        memory_total: hw.gpu_memory_mib,
        clocks: GpuClocks {
            graphics: hw.idle_graphics_mhz,
            sm: hw.idle_graphics_mhz,
            memory: hw.max_memory_mhz,
            max_graphics: hw.max_graphics_mhz,
            max_memory: hw.max_memory_mhz,
        },
        ecc_errors: EccErrors::default(),
        xid_errors: Vec::new(),
        nvlinks,
        mig_mode: false,
        mig_instances: Vec::new(),
        persistence_mode: true,
        allocated_job_id: None,
        processes: Vec::new(),
    }
}

fn generate_hca(rng: &mut StdRng, hw: &SystemProfile, node_index: usize, hca_index: usize) -> Hca {
    let node_guid = generate_guid(rng);
    let lid = (node_index * 16 + hca_index + 1) as u32;
    Hca {
        name: format!("mlx5_{hca_index}"),
        ca_type: hw.hca_ca_type.to_string(),
        model: hw.hca_model.to_string(),
        firmware_version: hw.hca_firmware.to_string(),
        psid: hw.hca_psid.to_string(),
        pci_address: format!("0000:{}:00.0", HCA_PCI_BUSES[hca_index % HCA_PCI_BUSES.len()].to_ascii_lowercase()),
        ports: vec![IbPort {
            number: 1,
            state: PortState::Active,
            physical_state: PhysicalState::LinkUp,
            rate_gbps: hw.ib_rate_gbps,
            lid,
            sm_lid: 1,
            guid: node_guid.clone(),
            link_layer: "InfiniBand".to_string(),
            errors: PortErrors::default(),
        }],
        node_guid,
        firmware_config: BTreeMap::new(),
    }
}

fn generate_bmc(rng: &mut StdRng, hw: &SystemProfile, node_index: usize) -> Bmc {
    let mut sensors = vec![
        BmcSensor {
            name: "Inlet_Temp".to_string(),
            value: 22.0 + (node_index % 3) as f64,
            unit: "degrees C".to_string(),
            sensor_type: "Temperature".to_string(),
            upper_critical: Some(45.0),
        },
        BmcSensor {
            name: "Exhaust_Temp".to_string(),
            value: 35.0 + (node_index % 4) as f64,
            unit: "degrees C".to_string(),
            sensor_type: "Temperature".to_string(),
            upper_critical: Some(70.0),
        },
    ];
    for socket in 0..hw.cpu_sockets {
        sensors.push(BmcSensor {
            name: format!("CPU{socket}_Temp"),
            value: 41.0 + socket as f64 * 2.0,
            unit: "degrees C".to_string(),
            sensor_type: "Temperature".to_string(),
            upper_critical: Some(95.0),
        });
    }
    for fan in 1..=6 {
        sensors.push(BmcSensor {
            name: format!("FAN{fan}_RPM"),
            value: (7800 + rng.random_range(0..8) * 60) as f64,
            unit: "RPM".to_string(),
            sensor_type: "Fan".to_string(),
            upper_critical: None,
        });
    }
    for psu in 0..6 {
        sensors.push(BmcSensor {
            name: format!("PSU{psu}_Power"),
            value: (520 + rng.random_range(0..40)) as f64,
            unit: "Watts".to_string(),
            sensor_type: "Power Supply".to_string(),
            upper_critical: Some(3300.0),
        });
    }

    let boot = Utc
        .with_ymd_and_hms(2025, 3, 14, 8, 12, 40)
        .single()
        .unwrap_or_else(Utc::now);
    Bmc {
        ip_address: format!("10.0.1.{}", 10 + node_index),
        mac_address: generate_mac(rng),
        firmware_version: hw.bmc_firmware.to_string(),
        manufacturer: "NVIDIA".to_string(),
        power_state: PowerState::On,
        sensors,
        sel: vec![
            SelEntry {
                id: 1,
                timestamp: boot,
                sensor: "Event Log".to_string(),
                event: "Log area reset/cleared".to_string(),
                asserted: true,
            },
            SelEntry {
                id: 2,
                timestamp: boot + chrono::Duration::seconds(95),
                sensor: "System ACPI Power State".to_string(),
                event: "S0/G0: working".to_string(),
                asserted: true,
            },
        ],
    }
}

fn generate_lustre(rng: &mut StdRng) -> LustreFs {
    let mdts = (0..2)
        .map(|i| LustreTarget {
            name: format!("lustre-MDT{i:04x}"),
            index: i,
            size_bytes: 4 * TIB,
            used_bytes: TIB / 10 * rng.random_range(2..6),
            active: true,
        })
        .collect();
    let osts = (0..8)
        .map(|i| LustreTarget {
            name: format!("lustre-OST{i:04x}"),
            index: i,
            size_bytes: 120 * TIB,
            used_bytes: TIB * rng.random_range(40..60),
            active: true,
        })
        .collect();
    LustreFs {
        fs_name: "lustre".to_string(),
        mount_point: "/lustre".to_string(),
        mgs_nid: "10.0.2.10@o2ib".to_string(),
        mdts,
        osts,
    }
}

/// Generate a GPU UUID body from the seeded generator
pub fn generate_uuid(rng: &mut StdRng) -> String {
    let bytes: [u8; 16] = rng.random();
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

fn generate_guid(rng: &mut StdRng) -> String {
    let value: u64 = rng.random();
    // Mellanox OUI prefix keeps the GUIDs recognisable
    format!("0x{:016x}", 0xb83f_d203_0000_0000u64 | (value & 0xffff_ffff))
}

fn generate_mac(rng: &mut StdRng) -> String {
    let bytes: [u8; 3] = rng.random();
    format!(
        "7c:c2:55:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2]
    )
}

fn generate_hex(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| char::from_digit(rng.random_range(0..16), 16).unwrap_or('0'))
        .collect()
}
