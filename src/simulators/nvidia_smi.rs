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

//! `nvidia-smi` simulator.
//!
//! GPUs that have fallen off the bus (see [`Gpu::is_accessible`]) cannot be
//! queried: listings flag them with `ERR!` and a "GPU is lost" notice, and
//! every operation targeting one fails.

use crate::common::config::SimConfig;
use crate::parsing::common::parse_index_list;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, is_true, local_node, state_error};
use crate::state::constants::{mig_profile, mig_profile_display, profile, MigProfile, MIG_PROFILES};
use crate::state::types::{Gpu, LinkStatus, MigInstance, Node};
use crate::state::GpuUpdate;
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};

const WIDTH: usize = 87;
const EXIT_NO_DEVICES: i32 = 6;
const EXIT_DRIVER: i32 = 9;
const EXIT_GPU_LOST: i32 = 15;

const USAGE: &str = "NVIDIA System Management Interface -- v535.161.08

NVSMI provides monitoring information for Tesla and select Quadro devices.
The data is presented in either a plain text or an XML format, via stdout or a file.

Usage: nvidia-smi [OPTION1 [ARG1]] [OPTION2 [ARG2]] ...

    -h,   --help                Print usage information and exit.
    -L,   --list-gpus           Display a list of GPUs connected to the system.
    -q,   --query               Display GPU or Unit info.
    -d,   --display=            Display only selected information: MEMORY,
                                    UTILIZATION, ECC, TEMPERATURE, POWER, CLOCK,
                                    PERFORMANCE, PIDS
    -i,   --id=                 Target a specific GPU.
    --query-gpu=                Information about GPU.
    --query-compute-apps=       List of currently active compute processes.
    --format=                   Comma separated list of format options: csv, noheader, nounits
    -pm,  --persistence-mode=   Set persistence mode: 0/DISABLED, 1/ENABLED
    -pl,  --power-limit=        Specifies maximum power management limit in watts.
    -r,   --gpu-reset           Trigger reset of the GPU.
    -mig, --multi-instance-gpu= Enable or disable Multi Instance GPU: 0/DISABLED, 1/ENABLED

    SUBCOMMANDS:
    topo -m                     Display the GPUDirect communication matrix.
    nvlink -s | -e              Display NVLink status or error counters.
    mig -lgip | -lgi | -cgi | -dgi  Manage MIG GPU instances.";

pub struct NvidiaSmiSimulator;

impl NvidiaSmiSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NvidiaSmiSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn lost_notice(gpu: &Gpu) -> String {
    format!(
        "Unable to determine the device handle for GPU {}: GPU is lost.  Reboot the system to recover this GPU",
        gpu.pci_bus_id
    )
}

fn fit(text: &str, width: usize) -> String {
    let mut out: String = text.chars().take(width).collect();
    while out.chars().count() < width {
        out.push(' ');
    }
    out
}

fn boxed(content: &str) -> String {
    format!("|{}|", fit(content, WIDTH))
}

fn border(fill: char) -> String {
    format!("+{}+", fill.to_string().repeat(WIDTH))
}

fn section_border(fill: char, joint: char) -> String {
    format!(
        "{joint}{}{joint}{}{joint}{}{joint}",
        fill.to_string().repeat(41),
        fill.to_string().repeat(22),
        fill.to_string().repeat(22)
    )
}

fn row(c1: &str, c2: &str, c3: &str) -> String {
    format!("|{}|{}|{}|", fit(c1, 41), fit(c2, 22), fit(c3, 22))
}

/// GPUs selected by `-i`/`--id`: an index list, UUID or PCI bus id.
fn select_gpus<'a>(node: &'a Node, parsed: &ParsedCommand) -> Result<Vec<&'a Gpu>, CommandResult> {
    let Some(selector) = parsed.flag_value_any(&["i", "id"]) else {
        return Ok(node.gpus.iter().collect());
    };
    let selected: Vec<&Gpu> = match parse_index_list(selector) {
        Some(ids) => ids.iter().filter_map(|id| node.gpu(*id)).collect(),
        None => node
            .gpus
            .iter()
            .filter(|g| {
                g.uuid.eq_ignore_ascii_case(selector)
                    || g.pci_bus_id.eq_ignore_ascii_case(selector)
            })
            .collect(),
    };
    if selected.is_empty() {
        return Err(CommandResult::error(
            EXIT_NO_DEVICES,
            "No devices were found",
        ));
    }
    Ok(selected)
}

fn render_table(node: &Node, gpus: &[&Gpu]) -> String {
    let mut lines = Vec::new();
    for gpu in gpus.iter().filter(|g| !g.is_accessible()) {
        lines.push(lost_notice(gpu));
    }

    lines.push(border('-'));
    lines.push(boxed(&format!(
        " NVIDIA-SMI {:<22}Driver Version: {:<14}CUDA Version: {:<9}",
        node.driver_version, node.driver_version, node.cuda_version
    )));
    lines.push(section_border('-', '|'));
    lines.push(row(
        " GPU  Name                 Persistence-M",
        " Bus-Id        Disp.A",
        " Volatile Uncorr. ECC",
    ));
    lines.push(row(
        " Fan  Temp   Perf          Pwr:Usage/Cap",
        "         Memory-Usage",
        " GPU-Util  Compute M.",
    ));
    lines.push(row("", "", "               MIG M."));
    lines.push(section_border('=', '|'));

    for (n, gpu) in gpus.iter().enumerate() {
        let pm = if gpu.persistence_mode { "On" } else { "Off" };
        if gpu.is_accessible() {
            lines.push(row(
                &format!("{:>4}  {:<22}{:>11} ", gpu.id, gpu.name, pm),
                &format!(" {} Off ", gpu.pci_bus_id),
                &format!("{:>21} ", gpu.ecc_errors.double_bit),
            ));
            lines.push(row(
                &format!(
                    " N/A  {:>4}   {:<4}{:>24} ",
                    format!("{}C", gpu.temperature),
                    gpu.pstate(),
                    format!("{:.0}W / {:.0}W", gpu.power_draw, gpu.power_limit)
                ),
                &format!(
                    "{:>21} ",
                    format!("{}MiB / {}MiB", gpu.memory_used, gpu.memory_total)
                ),
                &format!("{:>9}{:>12} ", format!("{}%", gpu.utilization), "Default"),
            ));
            let mig = if gpu.mig_mode { "Enabled" } else { "Disabled" };
            lines.push(row("", "", &format!("{mig:>21} ")));
        } else {
            lines.push(row(
                &format!("{:>4}  {:<22}{:>11} ", gpu.id, gpu.name, "ERR!"),
                &format!(" {} Off ", gpu.pci_bus_id),
                &format!("{:>21} ", "ERR!"),
            ));
            lines.push(row(
                &format!(" ERR!  {:>4}   {:<4}{:>24} ", "ERR!", "ERR!", "ERR! / ERR!"),
                &format!("{:>21} ", "ERR!"),
                &format!("{:>9}{:>12} ", "ERR!", "Default"),
            ));
            lines.push(row("", "", &format!("{:>21} ", "ERR!")));
        }
        if n + 1 < gpus.len() {
            lines.push(section_border('-', '+'));
        }
    }
    lines.push(section_border('-', '+'));
    lines.push(String::new());

    lines.push(border('-'));
    lines.push(boxed(" Processes:"));
    lines.push(boxed(
        "  GPU   GI   CI        PID   Type   Process name                            GPU Memory",
    ));
    lines.push(boxed(
        "        ID   ID                                                             Usage",
    ));
    lines.push(format!("|{}|", "=".repeat(WIDTH)));
    let processes: Vec<_> = gpus
        .iter()
        .filter(|g| g.is_accessible())
        .flat_map(|g| g.processes.iter().map(move |p| (g.id, p)))
        .collect();
    if processes.is_empty() {
        lines.push(boxed("  No running processes found"));
    } else {
        for (gpu_id, p) in processes {
            lines.push(boxed(&format!(
                "  {:>3}   N/A  N/A  {:>9}      C   {:<38}{:>9}MiB",
                gpu_id, p.pid, p.name, p.used_memory
            )));
        }
    }
    lines.push(border('-'));
    lines.join("\n")
}

fn render_list(gpus: &[&Gpu]) -> String {
    let mut lines = Vec::new();
    for gpu in gpus {
        if !gpu.is_accessible() {
            lines.push(lost_notice(gpu));
            continue;
        }
        lines.push(format!("GPU {}: {} (UUID: {})", gpu.id, gpu.name, gpu.uuid));
        for (n, mig) in gpu.mig_instances.iter().enumerate() {
            lines.push(format!(
                "  MIG {:<11} Device {:>2}: (UUID: MIG-{}-{})",
                mig.profile_name,
                n,
                gpu.uuid.trim_start_matches("GPU-"),
                mig.gpu_instance_id
            ));
        }
    }
    lines.join("\n")
}

fn kv(indent: usize, key: &str, value: impl std::fmt::Display) -> String {
    let pad = "    ".repeat(indent);
    let width = 42usize.saturating_sub(pad.len());
    format!("{pad}{key:<width$}: {value}")
}

fn heading(indent: usize, title: &str) -> String {
    format!("{}{title}", "    ".repeat(indent))
}

const QUERY_SECTIONS: &[&str] = &[
    "MEMORY",
    "UTILIZATION",
    "ECC",
    "TEMPERATURE",
    "POWER",
    "CLOCK",
    "PERFORMANCE",
    "PIDS",
];

fn render_query(node: &Node, gpus: &[&Gpu], sections: Option<&[String]>) -> String {
    let show = |name: &str| match sections {
        None => true,
        Some(list) => list.iter().any(|s| s == name),
    };
    let mut lines = vec![
        String::new(),
        "==============NVSMI LOG==============".to_string(),
        String::new(),
        kv(0, "Driver Version", &node.driver_version),
        kv(0, "CUDA Version", &node.cuda_version),
        String::new(),
        kv(0, "Attached GPUs", node.gpus.len()),
    ];

    for gpu in gpus {
        lines.push(format!("GPU {}", gpu.pci_bus_id));
        if !gpu.is_accessible() {
            lines.push(heading(1, "Unable to determine the device handle: GPU is lost"));
            lines.push(kv(1, "Last XID", gpu.latest_xid().map(|x| x.code).unwrap_or(79)));
            lines.push(String::new());
            continue;
        }
        if sections.is_none() {
            lines.push(kv(1, "Product Name", &gpu.name));
            lines.push(kv(1, "Product Brand", "NVIDIA"));
            lines.push(kv(
                1,
                "Persistence Mode",
                if gpu.persistence_mode { "Enabled" } else { "Disabled" },
            ));
            let mig = if gpu.mig_mode { "Enabled" } else { "Disabled" };
            lines.push(heading(1, "MIG Mode"));
            lines.push(kv(2, "Current", mig));
            lines.push(kv(2, "Pending", mig));
            lines.push(kv(1, "Serial Number", &gpu.serial));
            lines.push(kv(1, "GPU UUID", &gpu.uuid));
            lines.push(kv(1, "Minor Number", gpu.id));
            lines.push(kv(1, "VBIOS Version", &gpu.vbios_version));
            lines.push(heading(1, "PCI"));
            lines.push(kv(2, "Bus Id", &gpu.pci_bus_id));
        }
        if show("MEMORY") {
            lines.push(heading(1, "FB Memory Usage"));
            lines.push(kv(2, "Total", format!("{} MiB", gpu.memory_total)));
            lines.push(kv(2, "Used", format!("{} MiB", gpu.memory_used)));
            lines.push(kv(2, "Free", format!("{} MiB", gpu.memory_free())));
        }
        if show("UTILIZATION") {
            let mem_util = gpu.memory_used * 100 / gpu.memory_total.max(1);
            lines.push(heading(1, "Utilization"));
            lines.push(kv(2, "Gpu", format!("{} %", gpu.utilization)));
            lines.push(kv(2, "Memory", format!("{mem_util} %")));
        }
        if show("ECC") {
            let ecc = &gpu.ecc_errors;
            lines.push(heading(1, "ECC Errors"));
            lines.push(heading(2, "Volatile"));
            lines.push(kv(3, "SRAM Correctable", ecc.single_bit));
            lines.push(kv(3, "SRAM Uncorrectable", ecc.double_bit));
            lines.push(heading(2, "Aggregate"));
            lines.push(kv(3, "SRAM Correctable", ecc.aggregated_single_bit));
            lines.push(kv(3, "SRAM Uncorrectable", ecc.aggregated_double_bit));
        }
        if show("TEMPERATURE") {
            lines.push(heading(1, "Temperature"));
            lines.push(kv(2, "GPU Current Temp", format!("{} C", gpu.temperature)));
            lines.push(kv(
                2,
                "GPU Shutdown Temp",
                format!("{} C", SimConfig::GPU_TEMP_SHUTDOWN),
            ));
            lines.push(kv(
                2,
                "GPU Slowdown Temp",
                format!("{} C", SimConfig::GPU_TEMP_CRITICAL),
            ));
            lines.push(kv(
                2,
                "GPU Max Operating Temp",
                format!("{} C", SimConfig::GPU_TEMP_WARNING),
            ));
        }
        if show("POWER") {
            lines.push(heading(1, "GPU Power Readings"));
            lines.push(kv(2, "Power Draw", format!("{:.2} W", gpu.power_draw)));
            lines.push(kv(2, "Current Power Limit", format!("{:.2} W", gpu.power_limit)));
            lines.push(kv(2, "Max Power Limit", format!("{:.2} W", gpu.max_power_limit)));
        }
        if show("CLOCK") {
            lines.push(heading(1, "Clocks"));
            lines.push(kv(2, "Graphics", format!("{} MHz", gpu.clocks.graphics)));
            lines.push(kv(2, "SM", format!("{} MHz", gpu.clocks.sm)));
            lines.push(kv(2, "Memory", format!("{} MHz", gpu.clocks.memory)));
            lines.push(heading(1, "Max Clocks"));
            lines.push(kv(2, "Graphics", format!("{} MHz", gpu.clocks.max_graphics)));
            lines.push(kv(2, "Memory", format!("{} MHz", gpu.clocks.max_memory)));
        }
        if show("PERFORMANCE") {
            lines.push(kv(1, "Performance State", gpu.pstate()));
        }
        if show("PIDS") {
            if gpu.processes.is_empty() {
                lines.push(kv(1, "Processes", "None"));
            } else {
                lines.push(heading(1, "Processes"));
                for p in &gpu.processes {
                    lines.push(kv(2, "Process ID", p.pid));
                    lines.push(kv(3, "Type", "C"));
                    lines.push(kv(3, "Name", &p.name));
                    lines.push(kv(3, "Used GPU Memory", format!("{} MiB", p.used_memory)));
                }
            }
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// One `--query-gpu` field: header label, unit suffix and value.
fn query_field(gpu: &Gpu, node: &Node, field: &str) -> Option<(String, Option<&'static str>, String)> {
    let (unit, value) = match field {
        "index" => (None, gpu.id.to_string()),
        "name" | "gpu_name" => (None, gpu.name.clone()),
        "uuid" | "gpu_uuid" => (None, gpu.uuid.clone()),
        "pci.bus_id" | "gpu_bus_id" => (None, gpu.pci_bus_id.clone()),
        "serial" => (None, gpu.serial.clone()),
        "driver_version" => (None, node.driver_version.clone()),
        "vbios_version" => (None, gpu.vbios_version.clone()),
        "count" => (None, node.gpus.len().to_string()),
        "persistence_mode" => (
            None,
            if gpu.persistence_mode { "Enabled" } else { "Disabled" }.to_string(),
        ),
        "pstate" => (None, gpu.pstate().to_string()),
        "temperature.gpu" => (None, gpu.temperature.to_string()),
        "utilization.gpu" => (Some("%"), gpu.utilization.to_string()),
        "utilization.memory" => (
            Some("%"),
            (gpu.memory_used * 100 / gpu.memory_total.max(1)).to_string(),
        ),
        "memory.total" => (Some("MiB"), gpu.memory_total.to_string()),
        "memory.used" => (Some("MiB"), gpu.memory_used.to_string()),
        "memory.free" => (Some("MiB"), gpu.memory_free().to_string()),
        "power.draw" => (Some("W"), format!("{:.2}", gpu.power_draw)),
        "power.limit" => (Some("W"), format!("{:.2}", gpu.power_limit)),
        "power.max_limit" => (Some("W"), format!("{:.2}", gpu.max_power_limit)),
        "clocks.gr" | "clocks.current.graphics" => (Some("MHz"), gpu.clocks.graphics.to_string()),
        "clocks.sm" | "clocks.current.sm" => (Some("MHz"), gpu.clocks.sm.to_string()),
        "clocks.mem" | "clocks.current.memory" => (Some("MHz"), gpu.clocks.memory.to_string()),
        "clocks.max.gr" | "clocks.max.graphics" => {
            (Some("MHz"), gpu.clocks.max_graphics.to_string())
        }
        "clocks.max.mem" | "clocks.max.memory" => (Some("MHz"), gpu.clocks.max_memory.to_string()),
        "ecc.errors.corrected.volatile.total" => (None, gpu.ecc_errors.single_bit.to_string()),
        "ecc.errors.uncorrected.volatile.total" => (None, gpu.ecc_errors.double_bit.to_string()),
        "ecc.errors.corrected.aggregate.total" => {
            (None, gpu.ecc_errors.aggregated_single_bit.to_string())
        }
        "ecc.errors.uncorrected.aggregate.total" => {
            (None, gpu.ecc_errors.aggregated_double_bit.to_string())
        }
        "mig.mode.current" => (
            None,
            if gpu.mig_mode { "Enabled" } else { "Disabled" }.to_string(),
        ),
        _ => return None,
    };
    Some((field.to_string(), unit, value))
}

struct CsvFormat {
    header: bool,
    units: bool,
}

fn csv_format(parsed: &ParsedCommand) -> Result<CsvFormat, CommandResult> {
    let Some(format) = parsed.flag_value("format") else {
        return Err(CommandResult::usage(
            "Please specify output format using --format=csv[,noheader][,nounits]",
        ));
    };
    let options: Vec<&str> = format.split(',').map(str::trim).collect();
    if !options.contains(&"csv") {
        return Err(CommandResult::usage(format!(
            "\"{format}\" is not a valid output format."
        )));
    }
    Ok(CsvFormat {
        header: !options.contains(&"noheader"),
        units: !options.contains(&"nounits"),
    })
}

fn render_query_gpu(node: &Node, gpus: &[&Gpu], parsed: &ParsedCommand) -> CommandResult {
    let Some(fields) = parsed.flag_value("query-gpu") else {
        return CommandResult::usage("--query-gpu requires a field list");
    };
    let format = match csv_format(parsed) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let fields: Vec<&str> = fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    let Some(sample) = node.gpus.first() else {
        return CommandResult::error(EXIT_NO_DEVICES, "No devices were found");
    };
    for field in &fields {
        if query_field(sample, node, field).is_none() {
            return CommandResult::usage(format!(
                "Field \"{field}\" is not a valid field to query."
            ));
        }
    }

    let mut lines = Vec::new();
    if format.header {
        let header: Vec<String> = fields
            .iter()
            .filter_map(|f| query_field(sample, node, f))
            .map(|(name, unit, _)| match unit {
                Some(u) if format.units => format!("{name} [{u}]"),
                _ => name,
            })
            .collect();
        lines.push(header.join(", "));
    }
    for gpu in gpus {
        if !gpu.is_accessible() {
            let lost = vec!["[GPU is lost]"; fields.len()];
            lines.push(lost.join(", "));
            continue;
        }
        let values: Vec<String> = fields
            .iter()
            .filter_map(|f| query_field(gpu, node, f))
            .map(|(_, unit, value)| match unit {
                Some(u) if format.units => format!("{value} {u}"),
                _ => value,
            })
            .collect();
        lines.push(values.join(", "));
    }
    CommandResult::ok(lines.join("\n"))
}

fn render_query_apps(gpus: &[&Gpu], parsed: &ParsedCommand) -> CommandResult {
    let fields_arg = parsed.flag_value("query-compute-apps").unwrap_or("pid,process_name,used_memory");
    let format = match csv_format(parsed) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let fields: Vec<&str> = fields_arg.split(',').map(str::trim).collect();
    let mut header = Vec::new();
    for field in &fields {
        header.push(match *field {
            "pid" | "process_name" | "gpu_uuid" | "gpu_bus_id" | "gpu_name" => field.to_string(),
            "used_memory" | "used_gpu_memory" if format.units => "used_gpu_memory [MiB]".to_string(),
            "used_memory" | "used_gpu_memory" => "used_gpu_memory".to_string(),
            other => {
                return CommandResult::usage(format!(
                    "Field \"{other}\" is not a valid field to query."
                ))
            }
        });
    }

    let mut lines = Vec::new();
    if format.header {
        lines.push(header.join(", "));
    }
    for gpu in gpus.iter().filter(|g| g.is_accessible()) {
        for p in &gpu.processes {
            let values: Vec<String> = fields
                .iter()
                .map(|f| match *f {
                    "pid" => p.pid.to_string(),
                    "process_name" => p.name.clone(),
                    "gpu_uuid" => gpu.uuid.clone(),
                    "gpu_bus_id" => gpu.pci_bus_id.clone(),
                    "gpu_name" => gpu.name.clone(),
                    _ if format.units => format!("{} MiB", p.used_memory),
                    _ => p.used_memory.to_string(),
                })
                .collect();
            lines.push(values.join(", "));
        }
    }
    CommandResult::ok(lines.join("\n"))
}

fn render_topology(node: &Node) -> String {
    let gpu_count = node.gpus.len();
    let nic_count = node.hcas.len();
    let label = profile(node.system_type).nvlink_label;
    let cores = node.cpu.cores_per_socket;
    let threads = node.total_cpus() / 2;

    let mut header = vec!["\t".to_string()];
    header.extend((0..gpu_count).map(|g| format!("GPU{g}\t")));
    header.extend((0..nic_count).map(|n| format!("NIC{n}\t")));
    header.push("CPU Affinity\tNUMA Affinity\tGPU NUMA ID".to_string());

    let socket = |index: usize, count: usize| index * 2 / count.max(1);
    let affinity = |s: usize| {
        let start = s as u32 * cores;
        format!(
            "{}-{},{}-{}",
            start,
            start + cores - 1,
            threads + start,
            threads + start + cores - 1
        )
    };

    let mut lines = vec![header.concat()];
    for g in 0..gpu_count {
        let mut cells = vec![format!("GPU{g}\t")];
        for other in 0..gpu_count {
            cells.push(if other == g {
                " X \t".to_string()
            } else {
                format!("{label}\t")
            });
        }
        for n in 0..nic_count {
            let link = if n == g {
                "PIX"
            } else if socket(n, nic_count) == socket(g, gpu_count) {
                "NODE"
            } else {
                "SYS"
            };
            cells.push(format!("{link}\t"));
        }
        let s = socket(g, gpu_count);
        cells.push(format!("{}\t{}\t\tN/A", affinity(s), s));
        lines.push(cells.concat());
    }
    for n in 0..nic_count {
        let mut cells = vec![format!("NIC{n}\t")];
        for g in 0..gpu_count {
            let link = if n == g {
                "PIX"
            } else if socket(n, nic_count) == socket(g, gpu_count) {
                "NODE"
            } else {
                "SYS"
            };
            cells.push(format!("{link}\t"));
        }
        for other in 0..nic_count {
            let link = if other == n {
                " X "
            } else if socket(n, nic_count) == socket(other, nic_count) {
                "NODE"
            } else {
                "SYS"
            };
            cells.push(format!("{link}\t"));
        }
        lines.push(cells.concat().trim_end().to_string());
    }
    lines.push(String::new());
    lines.push("Legend:".to_string());
    lines.push(String::new());
    lines.push("  X    = Self".to_string());
    lines.push("  SYS  = Connection traversing PCIe as well as the SMP interconnect between NUMA nodes (e.g., QPI/UPI)".to_string());
    lines.push("  NODE = Connection traversing PCIe as well as the interconnect between PCIe Host Bridges within a NUMA node".to_string());
    lines.push("  PIX  = Connection traversing at most a single PCIe bridge".to_string());
    lines.push("  NV#  = Connection traversing a bonded set of # NVLinks".to_string());
    lines.push(String::new());
    lines.push("NIC Legend:".to_string());
    lines.push(String::new());
    for hca in &node.hcas {
        let n = hca.name.trim_start_matches("mlx5_");
        lines.push(format!("  NIC{n}: {}", hca.name));
    }
    lines.join("\n")
}

fn render_nvlink(gpus: &[&Gpu], errors: bool) -> String {
    let mut lines = Vec::new();
    for gpu in gpus {
        if !gpu.is_accessible() {
            lines.push(lost_notice(gpu));
            continue;
        }
        lines.push(format!("GPU {}: {} (UUID: {})", gpu.id, gpu.name, gpu.uuid));
        for link in &gpu.nvlinks {
            if errors {
                lines.push(format!("\t Link {}: Replay Errors: {}", link.link_id, link.replay_errors));
                lines.push(format!("\t Link {}: Recovery Errors: {}", link.link_id, link.recovery_errors));
                lines.push(format!("\t Link {}: CRC Errors: {}", link.link_id, link.crc_errors));
            } else if link.status == LinkStatus::Active {
                lines.push(format!("\t Link {}: {:.3} GB/s", link.link_id, link.speed_gbps));
            } else {
                lines.push(format!("\t Link {}: <inactive>", link.link_id));
            }
        }
    }
    lines.join("\n")
}

fn lost_error(gpu: &Gpu) -> CommandResult {
    cmd_error!(
        EXIT_GPU_LOST,
        "GPU {} is not accessible: GPU has fallen off the bus.\nReboot the system to recover this GPU.",
        gpu.pci_bus_id
    )
}

impl NvidiaSmiSimulator {
    fn reset(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let node = match local_node(ctx, "nvidia-smi") {
            Ok(n) => n,
            Err(e) => return e,
        };
        let gpus = match select_gpus(node, parsed) {
            Ok(g) => g,
            Err(e) => return e,
        };
        if let Some(lost) = gpus.iter().find(|g| !g.is_accessible()) {
            return lost_error(lost);
        }
        if let Some(busy) = gpus.iter().find(|g| !g.processes.is_empty()) {
            return cmd_error!(
                SimConfig::EXIT_FAILURE,
                "GPU {}: In use by another client\nUnable to reset this GPU because it's being used by some other process.",
                busy.pci_bus_id
            );
        }
        let targets: Vec<(u32, String)> = gpus.iter().map(|g| (g.id, g.pci_bus_id.clone())).collect();
        let hostname = node.hostname.clone();

        let mut lines = Vec::new();
        for (id, bus) in targets {
            if let Err(err) = ctx.state.reset_gpu(&hostname, id) {
                return state_error("nvidia-smi", &err);
            }
            lines.push(format!("GPU {bus} was successfully reset."));
        }
        lines.push("All done.".to_string());
        CommandResult::ok(lines.join("\n"))
    }

    fn apply_to_selected<F>(
        &self,
        parsed: &ParsedCommand,
        ctx: &mut CommandContext<'_>,
        mut apply: F,
    ) -> CommandResult
    where
        F: FnMut(&Gpu) -> Result<(GpuUpdate, String), CommandResult>,
    {
        let node = match local_node(ctx, "nvidia-smi") {
            Ok(n) => n,
            Err(e) => return e,
        };
        let gpus = match select_gpus(node, parsed) {
            Ok(g) => g,
            Err(e) => return e,
        };
        if let Some(lost) = gpus.iter().find(|g| !g.is_accessible()) {
            return lost_error(lost);
        }
        let mut planned = Vec::new();
        for gpu in &gpus {
            match apply(gpu) {
                Ok((update, message)) => planned.push((gpu.id, update, message)),
                Err(e) => return e,
            }
        }
        let hostname = node.hostname.clone();

        let mut lines = Vec::new();
        for (id, update, message) in planned {
            if let Err(err) = ctx.state.update_gpu(&hostname, id, update) {
                return state_error("nvidia-smi", &err);
            }
            lines.push(message);
        }
        lines.push("All done.".to_string());
        CommandResult::ok(lines.join("\n"))
    }

    fn persistence(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let Some(value) = parsed.flag_value_any(&["pm", "persistence-mode"]) else {
            return CommandResult::usage("Option -pm requires a value: 0/DISABLED, 1/ENABLED");
        };
        let enable = is_true(value);
        self.apply_to_selected(parsed, ctx, |gpu| {
            let verb = if enable { "Enabled" } else { "Disabled" };
            Ok((
                GpuUpdate {
                    persistence_mode: Some(enable),
                    ..Default::default()
                },
                format!("{verb} persistence mode for GPU {}.", gpu.pci_bus_id),
            ))
        })
    }

    fn power_limit(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let Some(watts) = flag_number!(parsed, f64, "pl", "power-limit") else {
            return CommandResult::usage("Option -pl requires a numeric value in watts");
        };
        self.apply_to_selected(parsed, ctx, |gpu| {
            let min = (gpu.max_power_limit * 0.3).round();
            if watts < min || watts > gpu.max_power_limit {
                return Err(CommandResult::usage(format!(
                    "Provided power limit {watts:.2} W is not a valid power limit which should be between {min:.2} W and {:.2} W for GPU {}\nTerminating early due to previous errors.",
                    gpu.max_power_limit, gpu.pci_bus_id
                )));
            }
            Ok((
                GpuUpdate {
                    power_limit: Some(watts),
                    power_draw: Some(gpu.power_draw.min(watts)),
                    ..Default::default()
                },
                format!(
                    "Power limit for GPU {} was set to {watts:.2} W from {:.2} W.",
                    gpu.pci_bus_id, gpu.power_limit
                ),
            ))
        })
    }

    fn mig_mode(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let Some(value) = parsed.flag_value_any(&["mig", "multi-instance-gpu"]) else {
            return CommandResult::usage("Option -mig requires a value: 0/DISABLED, 1/ENABLED");
        };
        let enable = is_true(value);
        self.apply_to_selected(parsed, ctx, |gpu| {
            if !enable && !gpu.mig_instances.is_empty() {
                return Err(cmd_error!(
                    SimConfig::EXIT_FAILURE,
                    "Unable to disable MIG Mode for GPU {}: In use by another client\nDestroy all GPU instances first.",
                    gpu.pci_bus_id
                ));
            }
            let verb = if enable { "Enabled" } else { "Disabled" };
            Ok((
                GpuUpdate {
                    mig_mode: Some(enable),
                    ..Default::default()
                },
                format!("{verb} MIG Mode for GPU {}", gpu.pci_bus_id),
            ))
        })
    }

    fn mig(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let node = match local_node(ctx, "nvidia-smi") {
            Ok(n) => n,
            Err(e) => return e,
        };
        let gpus = match select_gpus(node, parsed) {
            Ok(g) => g,
            Err(e) => return e,
        };
        let mig_gpus: Vec<&Gpu> = gpus
            .into_iter()
            .filter(|g| g.is_accessible() && g.mig_mode)
            .collect();
        if mig_gpus.is_empty() {
            return CommandResult::error(EXIT_NO_DEVICES, "No MIG-enabled devices found.");
        }

        if parsed.has_flag("lgip") {
            return CommandResult::ok(render_mig_profiles(&mig_gpus));
        }
        if parsed.has_flag("lgi") {
            return CommandResult::ok(render_mig_instances(&mig_gpus));
        }

        let hostname = node.hostname.clone();
        if let Some(spec) = parsed.flag_value("cgi") {
            let mut plans = Vec::new();
            let mut messages = Vec::new();
            for gpu in &mig_gpus {
                match plan_instances(gpu, spec, parsed.has_flag("C")) {
                    Ok((instances, mut lines)) => {
                        plans.push((gpu.id, instances));
                        messages.append(&mut lines);
                    }
                    Err(e) => return e,
                }
            }
            for (id, instances) in plans {
                if let Err(err) = ctx.state.set_mig_instances(&hostname, id, instances) {
                    return state_error("nvidia-smi", &err);
                }
            }
            return CommandResult::ok(messages.join("\n"));
        }

        if parsed.has_flag("dgi") {
            let wanted = parsed
                .flag_value("gi")
                .and_then(parse_index_list);
            let mut plans = Vec::new();
            let mut messages = Vec::new();
            for gpu in &mig_gpus {
                let (gone, kept): (Vec<&MigInstance>, Vec<&MigInstance>) = gpu
                    .mig_instances
                    .iter()
                    .partition(|m| match &wanted {
                        Some(ids) => ids.contains(&m.gpu_instance_id),
                        None => true,
                    });
                for m in &gone {
                    messages.push(format!(
                        "Successfully destroyed GPU instance ID {:>2} from GPU {:>2}",
                        m.gpu_instance_id, gpu.id
                    ));
                }
                plans.push((gpu.id, kept.into_iter().cloned().collect::<Vec<_>>()));
            }
            if messages.is_empty() {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    "Failed to destroy GPU instances: Not Found",
                );
            }
            for (id, instances) in plans {
                if let Err(err) = ctx.state.set_mig_instances(&hostname, id, instances) {
                    return state_error("nvidia-smi", &err);
                }
            }
            return CommandResult::ok(messages.join("\n"));
        }

        CommandResult::usage("Usage: nvidia-smi mig [-lgip | -lgi | -cgi <profiles> [-C] | -dgi [-gi <ids>]] [-i <gpu>]")
    }
}

fn render_mig_profiles(gpus: &[&Gpu]) -> String {
    let rule = "+-----------------------------------------------------------------------------+";
    let mut lines = vec![
        rule.to_string(),
        "| GPU instance profiles:                                                      |".to_string(),
        "| GPU   Name             ID    Instances   Memory     P2P    SM    DEC   ENC  |".to_string(),
        "|                              Free/Total   GiB              CE    JPEG  OFA  |".to_string(),
        "|=============================================================================|".to_string(),
    ];
    for gpu in gpus {
        let used_slices: u32 = gpu.mig_instances.iter().map(|m| m.placement_size).sum();
        for p in MIG_PROFILES {
            let existing = gpu
                .mig_instances
                .iter()
                .filter(|m| m.profile_id == p.id)
                .count() as u32;
            let room = (7u32.saturating_sub(used_slices)) / p.slices;
            let free = room.min(p.max_instances.saturating_sub(existing));
            let gib = gpu.memory_total as f64 / 1024.0 * p.memory_fraction;
            lines.push(format!(
                "|{:>4}  MIG {:<12}{:>4}     {:>2}/{:<2}      {:>6.2}      No     {:<3}  {:<4}  {:<3}|",
                gpu.id,
                mig_profile_display(p, gpu.memory_total),
                p.id,
                free,
                p.max_instances,
                gib,
                p.slices * 16,
                p.slices.saturating_sub(1),
                0
            ));
        }
        lines.push(rule.to_string());
    }
    lines.join("\n")
}

fn render_mig_instances(gpus: &[&Gpu]) -> String {
    let rule = "+-------------------------------------------------------+";
    let mut lines = vec![
        rule.to_string(),
        "| GPU instances:                                        |".to_string(),
        "| GPU   Name             Profile  Instance   Placement  |".to_string(),
        "|                          ID       ID       Start:Size |".to_string(),
        "|=======================================================|".to_string(),
    ];
    let mut any = false;
    for gpu in gpus {
        for m in &gpu.mig_instances {
            any = true;
            lines.push(format!(
                "|{:>4}  MIG {:<14}{:>5}{:>9}{:>11}:{:<4}|",
                gpu.id, m.profile_name, m.profile_id, m.gpu_instance_id, m.placement_start, m.placement_size
            ));
        }
    }
    if !any {
        return "No GPU instances found: Not Found".to_string();
    }
    lines.push(rule.to_string());
    lines.join("\n")
}

fn resolve_profile(token: &str, gpu: &Gpu) -> Option<&'static MigProfile> {
    if let Ok(id) = token.parse::<u32>() {
        return mig_profile(id);
    }
    let wanted = token.trim_start_matches("MIG ").to_ascii_lowercase();
    MIG_PROFILES
        .iter()
        .find(|p| mig_profile_display(p, gpu.memory_total) == wanted)
}

/// New instance list for `gpu` after creating the profiles in `spec`.
fn plan_instances(
    gpu: &Gpu,
    spec: &str,
    with_compute: bool,
) -> Result<(Vec<MigInstance>, Vec<String>), CommandResult> {
    let mut instances = gpu.mig_instances.clone();
    let mut messages = Vec::new();
    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let Some(p) = resolve_profile(token, gpu) else {
            return Err(cmd_error!(
                SimConfig::EXIT_FAILURE,
                "Unable to create a GPU instance on GPU {:>2} using profile {token}: Invalid Argument",
                gpu.id
            ));
        };
        let used: u32 = instances.iter().map(|m| m.placement_size).sum();
        let existing = instances.iter().filter(|m| m.profile_id == p.id).count() as u32;
        if used + p.slices > 7 || existing >= p.max_instances {
            return Err(cmd_error!(
                SimConfig::EXIT_FAILURE,
                "Unable to create a GPU instance on GPU {:>2} using profile {}: Insufficient Resources",
                gpu.id,
                p.id
            ));
        }
        let next_id = instances.iter().map(|m| m.gpu_instance_id).max().map_or(1, |m| m + 1);
        let name = mig_profile_display(p, gpu.memory_total);
        instances.push(MigInstance {
            gpu_instance_id: next_id,
            profile_id: p.id,
            profile_name: name.clone(),
            placement_start: used,
            placement_size: p.slices,
            memory_mib: (gpu.memory_total as f64 * p.memory_fraction) as u64,
        });
        messages.push(format!(
            "Successfully created GPU instance ID {next_id:>2} on GPU {:>2} using profile MIG {name} (ID {:>2})",
            gpu.id, p.id
        ));
        if with_compute {
            messages.push(format!(
                "Successfully created compute instance ID  0 on GPU {:>2} GPU instance ID {next_id:>2} using profile MIG {name} (ID  0)",
                gpu.id
            ));
        }
    }
    Ok((instances, messages))
}

impl Simulator for NvidiaSmiSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "nvidia-smi",
            version: "535.161.08",
            description: "NVIDIA System Management Interface",
            commands: &["nvidia-smi"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), USAGE, true) {
            return result;
        }
        let node = match local_node(ctx, "nvidia-smi") {
            Ok(n) => n,
            Err(_) => {
                return CommandResult::error(
                    EXIT_DRIVER,
                    "NVIDIA-SMI has failed because it couldn't communicate with the NVIDIA driver. Make sure that the latest NVIDIA driver is installed and running.",
                )
            }
        };

        match parsed.subcommand(0) {
            Some("topo") => {
                return if parsed.has_flag("m") {
                    CommandResult::ok(render_topology(node))
                } else {
                    CommandResult::usage("Usage: nvidia-smi topo -m")
                };
            }
            Some("nvlink") => {
                let gpus = match select_gpus(node, parsed) {
                    Ok(g) => g,
                    Err(e) => return e,
                };
                return if parsed.has_any_flag(&["s", "status"]) {
                    CommandResult::ok(render_nvlink(&gpus, false))
                } else if parsed.has_any_flag(&["e", "errorcounters"]) {
                    CommandResult::ok(render_nvlink(&gpus, true))
                } else {
                    CommandResult::usage("Usage: nvidia-smi nvlink [-s | -e] [-i <gpu>]")
                };
            }
            Some("mig") => return self.mig(parsed, ctx),
            Some(other) => {
                return CommandResult::usage(format!(
                    "Invalid combination of input arguments. Please run 'nvidia-smi -h' for help.\nUnknown subcommand: {other}"
                ))
            }
            None => {}
        }

        if parsed.has_any_flag(&["r", "gpu-reset"]) {
            return self.reset(parsed, ctx);
        }
        if parsed.has_any_flag(&["pm", "persistence-mode"]) {
            return self.persistence(parsed, ctx);
        }
        if parsed.has_any_flag(&["pl", "power-limit"]) {
            return self.power_limit(parsed, ctx);
        }
        if parsed.has_any_flag(&["mig", "multi-instance-gpu"]) {
            return self.mig_mode(parsed, ctx);
        }

        let gpus = match select_gpus(node, parsed) {
            Ok(g) => g,
            Err(e) => return e,
        };
        if parsed.has_flag("query-gpu") {
            return render_query_gpu(node, &gpus, parsed);
        }
        if parsed.has_flag("query-compute-apps") {
            return render_query_apps(&gpus, parsed);
        }
        if parsed.has_any_flag(&["L", "list-gpus"]) {
            return CommandResult::ok(render_list(&gpus));
        }
        if parsed.has_any_flag(&["q", "query"]) {
            let sections: Option<Vec<String>> = parsed
                .flag_value_any(&["d", "display"])
                .map(|d| d.split(',').map(|s| s.trim().to_ascii_uppercase()).collect());
            if let Some(list) = &sections {
                if let Some(bad) = list.iter().find(|s| !QUERY_SECTIONS.contains(&s.as_str())) {
                    return CommandResult::usage(format!(
                        "Invalid display type \"{bad}\". Please run 'nvidia-smi -h' for help."
                    ));
                }
            }
            return CommandResult::ok(render_query(node, &gpus, sections.as_deref()));
        }
        if let Some((name, _)) = parsed.flags.iter().find(|(name, _)| !matches!(name.as_str(), "i" | "id")) {
            return CommandResult::usage(format!(
                "Invalid combination of input arguments. Please run 'nvidia-smi -h' for help.\nUnknown option: {name}"
            ));
        }
        CommandResult::ok(render_table(node, &gpus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::types::{Severity, XidError};
    use crate::state::ClusterStore;
    use crate::traits::ClusterState;
    use chrono::Utc;

    fn run(store: &mut ClusterStore, line: &str) -> CommandResult {
        let mut ctx = CommandContext::new(store, "dgx-01");
        NvidiaSmiSimulator::new().execute(&parse(line), &mut ctx)
    }

    fn lose_gpu(store: &mut ClusterStore, gpu: u32) {
        store
            .add_xid_error(
                "dgx-01",
                gpu,
                XidError {
                    code: 79,
                    timestamp: Utc::now(),
                    description: "GPU has fallen off the bus".to_string(),
                    severity: Severity::Critical,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_default_table_lists_all_gpus() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "nvidia-smi");
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("Driver Version: 535.161.08"));
        assert_eq!(result.output.matches("NVIDIA H100 80GB HBM3").count(), 8);
        assert!(result.output.contains("No running processes found"));
        for line in result.output.lines().filter(|l| l.starts_with('|')) {
            assert_eq!(line.chars().count(), WIDTH + 2, "{line}");
        }
    }

    #[test]
    fn test_lost_gpu_is_flagged() {
        let mut store = ClusterStore::default();
        lose_gpu(&mut store, 0);
        let result = run(&mut store, "nvidia-smi");
        assert!(result.output.contains("00000000:18:00.0: GPU is lost"));
        assert!(result.output.contains("ERR!"));
        assert!(!result.output.contains("00000000:2A:00.0: GPU is lost"));

        let list = run(&mut store, "nvidia-smi -L");
        assert!(list.output.lines().next().unwrap().contains("GPU is lost"));
        assert!(list.output.contains("GPU 1: NVIDIA H100 80GB HBM3"));
    }

    #[test]
    fn test_reset_lost_gpu_fails() {
        let mut store = ClusterStore::default();
        lose_gpu(&mut store, 0);
        let result = run(&mut store, "nvidia-smi -r -i 0");
        assert_eq!(result.exit_code, EXIT_GPU_LOST);
        assert!(result.output.contains("not accessible"));
        assert!(result.output.contains("fallen off the bus"));

        let result = run(&mut store, "nvidia-smi -r -i 1");
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("successfully reset"));
    }

    #[test]
    fn test_query_gpu_csv() {
        let mut store = ClusterStore::default();
        let result = run(
            &mut store,
            "nvidia-smi --query-gpu=index,temperature.gpu,memory.total --format=csv -i 0",
        );
        assert_eq!(
            result.output,
            "index, temperature.gpu, memory.total [MiB]\n0, 30, 81559 MiB"
        );
        let result = run(
            &mut store,
            "nvidia-smi --query-gpu=index,temperature.gpu --format=csv,noheader,nounits -i 1",
        );
        assert_eq!(result.output, "1, 33");
        let result = run(&mut store, "nvidia-smi --query-gpu=bogus --format=csv");
        assert_eq!(result.exit_code, 2);
    }

    #[test]
    fn test_query_display_section() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "nvidia-smi -q -d TEMPERATURE -i 0");
        assert!(result.output.contains("GPU Current Temp"));
        assert!(!result.output.contains("FB Memory Usage"));
        let result = run(&mut store, "nvidia-smi -q -d BOGUS");
        assert_eq!(result.exit_code, 2);
    }

    #[test]
    fn test_invalid_gpu_index() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "nvidia-smi -i 12");
        assert_eq!(result.exit_code, EXIT_NO_DEVICES);
    }

    #[test]
    fn test_power_limit_and_persistence() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "nvidia-smi -pl 500 -i 2");
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(store.gpu("dgx-01", 2).unwrap().power_limit, 500.0);
        let result = run(&mut store, "nvidia-smi -pl 5000 -i 2");
        assert_eq!(result.exit_code, 2);

        run(&mut store, "nvidia-smi -pm 0");
        assert!(store.node("dgx-01").unwrap().gpus.iter().all(|g| !g.persistence_mode));
    }

    #[test]
    fn test_mig_workflow() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "nvidia-smi mig -lgip -i 0");
        assert_eq!(result.exit_code, EXIT_NO_DEVICES);

        assert_eq!(run(&mut store, "nvidia-smi -mig 1 -i 0").exit_code, 0);
        let result = run(&mut store, "nvidia-smi mig -cgi 19,19 -C -i 0");
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(store.gpu("dgx-01", 0).unwrap().mig_instances.len(), 2);
        assert!(run(&mut store, "nvidia-smi mig -lgi -i 0").output.contains("1g.10gb"));

        // Instances block disabling MIG mode
        assert_eq!(run(&mut store, "nvidia-smi -mig 0 -i 0").exit_code, 1);
        assert_eq!(run(&mut store, "nvidia-smi mig -dgi -i 0").exit_code, 0);
        assert!(store.gpu("dgx-01", 0).unwrap().mig_instances.is_empty());
    }

    #[test]
    fn test_topology_matrix() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "nvidia-smi topo -m");
        assert!(result.output.contains("NV18"));
        assert!(result.output.contains("NIC7: mlx5_7"));
    }

    #[test]
    fn test_nvlink_status_shows_down_link() {
        let mut store = ClusterStore::default();
        store
            .update_nvlink(
                "dgx-01",
                3,
                4,
                crate::state::NvLinkUpdate {
                    status: Some(LinkStatus::Down),
                    ..Default::default()
                },
            )
            .unwrap();
        let result = run(&mut store, "nvidia-smi nvlink -s -i 3");
        assert!(result.output.contains("Link 4: <inactive>"));
        assert!(result.output.contains("Link 5: 26.562 GB/s"));
    }

    #[test]
    fn test_head_node_has_no_driver() {
        let mut store = ClusterStore::default();
        let mut ctx = CommandContext::new(&mut store, "bcm-head01");
        let result = NvidiaSmiSimulator::new().execute(&parse("nvidia-smi"), &mut ctx);
        assert_eq!(result.exit_code, EXIT_DRIVER);
    }
}
