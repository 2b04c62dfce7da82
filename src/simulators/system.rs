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

//! Host inspection tools: `lscpu`, `free`, `dmidecode`, `dmesg`, `uname`,
//! `hostname`, `nproc`, `ip` and `uptime`.

use chrono::Utc;

use crate::common::config::SimConfig;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, local_node, reject_operand, unknown_subcommand};
use crate::state::constants::DEFAULT_KERNEL_VERSION;
use crate::state::types::{Gpu, Node};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};
use crate::utils::format_uptime;
use crate::utils::units::GIB;

const KERNEL_BUILD: &str = "#54-Ubuntu SMP Fri Feb 2 22:07:12 UTC 2024";
const HEAD_NODE_IP: &str = "10.0.0.1";
/// Head node uptime; it is not part of the compute inventory.
const HEAD_NODE_UPTIME_SECS: u64 = 41 * 86_400 + 7 * 3600 + 12 * 60;

pub struct SystemSimulator;

impl SystemSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn lscpu(node: &Node) -> String {
    let cpu = &node.cpu;
    let total = node.total_cpus();
    let rows = [
        ("Architecture", cpu.architecture.clone()),
        ("CPU op-mode(s)", "32-bit, 64-bit".to_string()),
        ("Address sizes", "52 bits physical, 57 bits virtual".to_string()),
        ("Byte Order", "Little Endian".to_string()),
        ("CPU(s)", total.to_string()),
        ("On-line CPU(s) list", format!("0-{}", total.saturating_sub(1))),
        (
            "Vendor ID",
            if cpu.model.contains("AMD") { "AuthenticAMD" } else { "GenuineIntel" }.to_string(),
        ),
        ("Model name", cpu.model.clone()),
        ("Thread(s) per core", cpu.threads_per_core.to_string()),
        ("Core(s) per socket", cpu.cores_per_socket.to_string()),
        ("Socket(s)", cpu.sockets.to_string()),
        ("CPU max MHz", format!("{}.0000", cpu.max_mhz)),
        ("CPU min MHz", "800.0000".to_string()),
        ("Virtualization", "VT-x".to_string()),
        ("NUMA node(s)", cpu.numa_nodes.to_string()),
    ];
    let mut lines: Vec<String> = rows
        .iter()
        .map(|(k, v)| lscpu_line(k, v))
        .collect();

    // Linux numbers the first hardware thread of every core before the siblings
    let per_node_cores = cpu.sockets * cpu.cores_per_socket / cpu.numa_nodes.max(1);
    let physical = cpu.sockets * cpu.cores_per_socket;
    for numa in 0..cpu.numa_nodes {
        let start = numa * per_node_cores;
        let end = start + per_node_cores - 1;
        let mut ranges = vec![format!("{start}-{end}")];
        if cpu.threads_per_core > 1 {
            ranges.push(format!("{}-{}", start + physical, end + physical));
        }
        lines.push(lscpu_line(&format!("NUMA node{numa} CPU(s)"), &ranges.join(",")));
    }
    lines.join("\n")
}

fn lscpu_line(key: &str, value: &str) -> String {
    format!("{:<33}{value}", format!("{key}:"))
}

fn free(node: &Node, parsed: &ParsedCommand) -> String {
    let total = node.ram_total_gb * GIB;
    let used = node.ram_used_gb * GIB;
    let shared = 64 * 1024 * 1024;
    let cache = total / 20;
    let free = total.saturating_sub(used + cache);
    let available = total.saturating_sub(used);
    let swap = 0u64;

    let human = parsed.has_any_flag(&["h", "human"]);
    let divisor = if parsed.has_any_flag(&["g", "gibi"]) {
        GIB
    } else if parsed.has_any_flag(&["m", "mebi"]) {
        1024 * 1024
    } else {
        1024
    };
    let fmt = |bytes: u64| {
        if human {
            human_free(bytes)
        } else {
            (bytes / divisor).to_string()
        }
    };
    [
        format!(
            "{:<8}{:>12}{:>12}{:>12}{:>12}{:>12}{:>12}",
            "", "total", "used", "free", "shared", "buff/cache", "available"
        ),
        format!(
            "{:<8}{:>12}{:>12}{:>12}{:>12}{:>12}{:>12}",
            "Mem:",
            fmt(total),
            fmt(used),
            fmt(free),
            fmt(shared),
            fmt(cache),
            fmt(available)
        ),
        format!(
            "{:<8}{:>12}{:>12}{:>12}",
            "Swap:",
            fmt(swap),
            fmt(swap),
            fmt(swap)
        ),
    ]
    .join("\n")
}

/// `free -h` style: one decimal below ten, binary suffixes with an `i`.
fn human_free(bytes: u64) -> String {
    const UNITS: [(u64, &str); 4] = [(1 << 40, "Ti"), (1 << 30, "Gi"), (1 << 20, "Mi"), (1 << 10, "Ki")];
    for (size, suffix) in UNITS {
        if bytes >= size {
            let value = bytes as f64 / size as f64;
            return if value < 10.0 {
                format!("{value:.1}{suffix}")
            } else {
                format!("{value:.0}{suffix}")
            };
        }
    }
    format!("{bytes}B")
}

fn system_serial(node: &Node) -> String {
    let digits: String = node.hostname.chars().filter(char::is_ascii_digit).collect();
    format!("1660{:0>8}", digits)
}

fn dmidecode(node: &Node, parsed: &ParsedCommand) -> CommandResult {
    let product = node.system_type.to_string().replace('-', " ");
    if let Some(keyword) = parsed.flag_value_any(&["s", "string"]) {
        let value = match keyword {
            "system-manufacturer" | "baseboard-manufacturer" => "NVIDIA".to_string(),
            "system-product-name" => product,
            "system-serial-number" => system_serial(node),
            "bios-version" => node.bios_version.clone(),
            "bios-vendor" => "American Megatrends International, LLC.".to_string(),
            "processor-version" => node.cpu.model.clone(),
            other => {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    format!("dmidecode: Invalid string keyword: {other}"),
                )
            }
        };
        return CommandResult::ok(value);
    }

    let bios = vec![
        "Handle 0x0000, DMI type 0, 26 bytes".to_string(),
        "BIOS Information".to_string(),
        "\tVendor: American Megatrends International, LLC.".to_string(),
        format!("\tVersion: {}", node.bios_version),
        "\tRelease Date: 01/15/2024".to_string(),
    ];
    let system = vec![
        "Handle 0x0001, DMI type 1, 27 bytes".to_string(),
        "System Information".to_string(),
        "\tManufacturer: NVIDIA".to_string(),
        format!("\tProduct Name: {product}"),
        "\tVersion: A01".to_string(),
        format!("\tSerial Number: {}", system_serial(node)),
        "\tSKU Number: 920-23687-2530-000".to_string(),
        "\tFamily: DGX".to_string(),
    ];
    let processors: Vec<String> = (0..node.cpu.sockets)
        .flat_map(|socket| {
            vec![
                format!("Handle 0x{:04X}, DMI type 4, 48 bytes", 0x40 + socket),
                "Processor Information".to_string(),
                format!("\tSocket Designation: CPU{socket}"),
                format!("\tVersion: {}", node.cpu.model),
                format!("\tMax Speed: {} MHz", node.cpu.max_mhz),
                format!("\tCurrent Speed: {} MHz", node.cpu.base_mhz),
                format!("\tCore Count: {}", node.cpu.cores_per_socket),
                format!("\tThread Count: {}", node.cpu.cores_per_socket * node.cpu.threads_per_core),
                String::new(),
            ]
        })
        .collect();
    // 32 DIMMs per system
    let dimm_gb = node.ram_total_gb / 32;
    let memory = vec![
        "Handle 0x1000, DMI type 16, 23 bytes".to_string(),
        "Physical Memory Array".to_string(),
        "\tLocation: System Board Or Motherboard".to_string(),
        "\tError Correction Type: Multi-bit ECC".to_string(),
        format!("\tMaximum Capacity: {} TB", (node.ram_total_gb * 2).div_ceil(1024)),
        "\tNumber Of Devices: 32".to_string(),
        String::new(),
        "Handle 0x1100, DMI type 17, 92 bytes".to_string(),
        "Memory Device".to_string(),
        format!("\tSize: {dimm_gb} GB"),
        "\tForm Factor: DIMM".to_string(),
        "\tType: DDR5".to_string(),
        "\tSpeed: 4800 MT/s".to_string(),
    ];

    let sections: Vec<Vec<String>> = match parsed.flag_value_any(&["t", "type"]) {
        None => vec![bios, system, processors, memory],
        Some("bios" | "0") => vec![bios],
        Some("system" | "1") => vec![system],
        Some("processor" | "4") => vec![processors],
        Some("memory" | "16" | "17") => vec![memory],
        Some(other) => {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("Invalid type keyword: {other}\nValid type keywords are:\n  bios\n  system\n  processor\n  memory"),
            )
        }
    };
    let mut lines = vec![
        "# dmidecode 3.3".to_string(),
        "Getting SMBIOS data from sysfs.".to_string(),
        "SMBIOS 3.5.0 present.".to_string(),
        String::new(),
    ];
    for section in sections {
        lines.extend(section);
        lines.push(String::new());
    }
    CommandResult::ok(lines.join("\n").trim_end().to_string())
}

/// Kernel log line; `seconds` counts from boot.
fn klog(seconds: f64, message: impl AsRef<str>) -> (f64, bool, String) {
    (seconds, false, format!("[{seconds:>12.6}] {}", message.as_ref()))
}

fn klog_err(seconds: f64, message: impl AsRef<str>) -> (f64, bool, String) {
    (seconds, true, format!("[{seconds:>12.6}] {}", message.as_ref()))
}

fn nvrm_bus(gpu: &Gpu) -> String {
    let bus = gpu.pci_bus_id.strip_prefix("0000").unwrap_or(&gpu.pci_bus_id);
    bus.strip_suffix(".0").unwrap_or(bus).to_string()
}

fn dmesg(node: &Node, parsed: &ParsedCommand) -> String {
    let mut entries = vec![
        klog(0.0, format!("Linux version {} (buildd@lcy02-amd64-047) {KERNEL_BUILD}", node.kernel_version)),
        klog(0.0, format!("Command line: BOOT_IMAGE=/boot/vmlinuz-{} root=/dev/md0 ro iommu=pt", node.kernel_version)),
        klog(1.482_113, format!("DMI: NVIDIA {}/{}, BIOS {}", node.system_type, node.system_type, node.bios_version)),
    ];
    for (i, hca) in node.hcas.iter().enumerate() {
        entries.push(klog(
            6.210_441 + i as f64 * 0.137,
            format!("mlx5_core {}: firmware version: {}", hca.pci_address, hca.firmware_version),
        ));
    }
    entries.push(klog(
        14.902_338,
        format!("nvidia: loading out-of-tree module taints kernel. NVRM: loading NVIDIA UNIX x86_64 Kernel Module  {}", node.driver_version),
    ));
    for gpu in &node.gpus {
        entries.push(klog(
            15.004_912 + gpu.id as f64 * 0.011,
            format!(
                "nvidia {}: enabling device (0000 -> 0002)",
                gpu.pci_bus_id.strip_prefix("0000").unwrap_or(&gpu.pci_bus_id)
            ),
        ));
    }

    // Events are placed in the last hour of uptime, in a fixed order
    let base = node.uptime_secs.saturating_sub(3600) as f64;
    let mut offset = 0.0;
    for hca in &node.hcas {
        for port in hca.ports.iter().filter(|p| !p.is_up()) {
            offset += 41.250_017;
            entries.push(klog_err(
                base + offset,
                format!(
                    "mlx5_core {}: mlx5_port_module_event:1122:(pid 0): Port {} link down, state {}",
                    hca.pci_address, port.number, port.physical_state
                ),
            ));
        }
    }
    for gpu in &node.gpus {
        for xid in &gpu.xid_errors {
            offset += 17.031_115 + f64::from(xid.code % 7);
            entries.push(klog_err(
                base + offset,
                format!(
                    "NVRM: Xid (PCI:{}): {}, pid='<unknown>', name=<unknown>, {}",
                    nvrm_bus(gpu),
                    xid.code,
                    xid.description
                ),
            ));
        }
        if gpu.temperature >= SimConfig::GPU_TEMP_SHUTDOWN {
            offset += 3.5;
            entries.push(klog_err(
                base + offset,
                format!(
                    "NVRM: GPU at PCI:{}: GPU temperature {}C has reached the shutdown threshold",
                    nvrm_bus(gpu),
                    gpu.temperature
                ),
            ));
        }
    }
    entries.sort_by(|a, b| a.0.total_cmp(&b.0));

    let errors_only = parsed
        .flag_value_any(&["l", "level"])
        .is_some_and(|level| level.split(',').any(|l| matches!(l, "err" | "crit" | "emerg" | "alert")));
    entries
        .into_iter()
        .filter(|(_, is_err, _)| !errors_only || *is_err)
        .map(|(_, _, line)| line)
        .collect::<Vec<_>>()
        .join("\n")
}

struct HostIdentity {
    hostname: String,
    kernel: String,
    architecture: String,
    ip: String,
    uptime_secs: u64,
    load: f64,
}

fn identity(ctx: &CommandContext<'_>) -> HostIdentity {
    match ctx.state.node(&ctx.current_node) {
        Some(node) => {
            let util: u32 = node.gpus.iter().map(|g| g.utilization).sum();
            HostIdentity {
                hostname: node.hostname.clone(),
                kernel: node.kernel_version.clone(),
                architecture: node.cpu.architecture.clone(),
                ip: node.management_ip.clone(),
                uptime_secs: node.uptime_secs,
                load: 0.35 + f64::from(util) / 100.0,
            }
        }
        None => HostIdentity {
            hostname: ctx.current_node.clone(),
            kernel: DEFAULT_KERNEL_VERSION.to_string(),
            architecture: "x86_64".to_string(),
            ip: HEAD_NODE_IP.to_string(),
            uptime_secs: HEAD_NODE_UPTIME_SECS,
            load: 0.12,
        },
    }
}

fn uname(host: &HostIdentity, parsed: &ParsedCommand) -> String {
    let all = parsed.has_any_flag(&["a", "all"]);
    let mut parts = Vec::new();
    if all || parsed.has_any_flag(&["s", "kernel-name"]) || parsed.flags.is_empty() {
        parts.push("Linux".to_string());
    }
    if all || parsed.has_any_flag(&["n", "nodename"]) {
        parts.push(host.hostname.clone());
    }
    if all || parsed.has_any_flag(&["r", "kernel-release"]) {
        parts.push(host.kernel.clone());
    }
    if all || parsed.has_any_flag(&["v", "kernel-version"]) {
        parts.push(KERNEL_BUILD.to_string());
    }
    if all || parsed.has_any_flag(&["m", "machine"]) {
        parts.push(host.architecture.clone());
    }
    if all {
        parts.push(host.architecture.clone());
        parts.push(host.architecture.clone());
    }
    if all || parsed.has_any_flag(&["o", "operating-system"]) {
        parts.push("GNU/Linux".to_string());
    }
    parts.join(" ")
}

fn ip(ctx: &CommandContext<'_>, host: &HostIdentity, parsed: &ParsedCommand) -> CommandResult {
    // (name, state, link type, address)
    let mut interfaces: Vec<(String, bool, &str, Option<String>)> = vec![
        ("lo".to_string(), true, "loopback", Some("127.0.0.1/8".to_string())),
        ("eno1".to_string(), true, "ether", Some(format!("{}/24", host.ip))),
    ];
    if let Some(node) = ctx.state.node(&ctx.current_node) {
        for (i, hca) in node.hcas.iter().enumerate() {
            let up = hca.ports.iter().all(|p| p.is_up());
            let octet = host.ip.rsplit('.').next().unwrap_or("0");
            interfaces.push((format!("ibp{i}s0"), up, "infiniband", Some(format!("192.168.{}.{octet}/24", 10 + i))));
        }
    }

    let args = parsed.operands(&["br", "c", "s"]);
    let object = args.first().copied().unwrap_or("");
    let brief = parsed.has_any_flag(&["br", "brief"]);
    let show_addr = match object {
        "a" | "addr" | "address" => true,
        "l" | "link" => false,
        "" => return CommandResult::usage("Usage: ip [ OPTIONS ] OBJECT { COMMAND | help }\nwhere  OBJECT := { address | link | route }"),
        "r" | "route" => {
            return CommandResult::ok(format!(
                "default via 10.0.0.254 dev eno1 proto static\n10.0.0.0/24 dev eno1 proto kernel scope link src {}",
                host.ip
            ))
        }
        other => {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("Object \"{other}\" is unknown, try \"ip help\"."),
            )
        }
    };

    let mut lines = Vec::new();
    for (index, (name, up, kind, addr)) in interfaces.iter().enumerate() {
        let state = if *up { "UP" } else { "DOWN" };
        if brief {
            let detail = if show_addr { addr.clone().unwrap_or_default() } else { String::new() };
            lines.push(format!("{name:<16} {state:<14} {detail}").trim_end().to_string());
            continue;
        }
        let mtu = match *kind {
            "loopback" => 65536,
            "infiniband" => 4092,
            _ => 1500,
        };
        lines.push(format!(
            "{}: {name}: <BROADCAST,MULTICAST{}> mtu {mtu} qdisc mq state {state} group default qlen 1000",
            index + 1,
            if *up { ",UP,LOWER_UP" } else { "" }
        ));
        lines.push(format!("    link/{kind}"));
        if show_addr {
            if let Some(addr) = addr {
                lines.push(format!("    inet {addr} scope global {name}"));
            }
        }
    }
    CommandResult::ok(lines.join("\n"))
}

fn uptime(host: &HostIdentity, parsed: &ParsedCommand) -> String {
    if parsed.has_any_flag(&["p", "pretty"]) {
        let days = host.uptime_secs / 86_400;
        let hours = (host.uptime_secs % 86_400) / 3600;
        let minutes = (host.uptime_secs % 3600) / 60;
        return format!("up {days} days, {hours} hours, {minutes} minutes");
    }
    format!(
        " {} {},  1 user,  load average: {:.2}, {:.2}, {:.2}",
        Utc::now().format("%H:%M:%S"),
        format_uptime(host.uptime_secs),
        host.load,
        host.load * 1.04,
        host.load * 0.97
    )
}

impl Simulator for SystemSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "system",
            version: "2.37.2",
            description: "Host hardware and operating system inspection",
            commands: &["lscpu", "free", "dmidecode", "dmesg", "uname", "hostname", "nproc", "ip", "uptime"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let usage = format!("Usage: {} [OPTION]...", parsed.base_command);
        let short_help = !matches!(parsed.base_command.as_str(), "free" | "uptime" | "ip" | "dmidecode");
        // `uname -v` prints the kernel version
        if parsed.base_command != "uname" || parsed.has_any_flag(&["version", "help"]) {
            if let Some(result) = handle_meta_flags(parsed, &self.describe(), &usage, short_help) {
                return result;
            }
        }
        if !matches!(parsed.base_command.as_str(), "hostname" | "ip") {
            if let Some(result) = reject_operand(parsed) {
                return result;
            }
        }

        let host = identity(ctx);
        match parsed.base_command.as_str() {
            "uname" => return CommandResult::ok(uname(&host, parsed)),
            "hostname" => {
                return CommandResult::ok(if parsed.has_any_flag(&["I", "i", "all-ip-addresses", "ip-address"]) {
                    host.ip
                } else if parsed.has_any_flag(&["f", "fqdn"]) {
                    format!("{}.cm.cluster", host.hostname)
                } else {
                    host.hostname
                })
            }
            "uptime" => return CommandResult::ok(uptime(&host, parsed)),
            "ip" => return ip(ctx, &host, parsed),
            _ => {}
        }

        let node = match local_node(ctx, &parsed.base_command) {
            Ok(n) => n,
            Err(err) => return err,
        };
        match parsed.base_command.as_str() {
            "lscpu" => CommandResult::ok(lscpu(node)),
            "free" => CommandResult::ok(free(node, parsed)),
            "dmidecode" => dmidecode(node, parsed),
            "dmesg" => CommandResult::ok(dmesg(node, parsed)),
            "nproc" => CommandResult::ok(node.total_cpus().to_string()),
            other => unknown_subcommand("system", other, ""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::{ClusterStore, Severity, XidError};
    use crate::traits::ClusterState;

    fn run(store: &mut ClusterStore, node: &str, line: &str) -> CommandResult {
        let mut ctx = CommandContext::new(store, node);
        SystemSimulator::new().execute(&parse(line), &mut ctx)
    }

    #[test]
    fn test_dmesg_reports_xid() {
        let mut store = ClusterStore::default();
        store
            .add_xid_error(
                "dgx-01",
                0,
                XidError {
                    code: 79,
                    timestamp: Utc::now(),
                    description: "GPU has fallen off the bus".to_string(),
                    severity: Severity::Critical,
                },
            )
            .unwrap();
        let result = run(&mut store, "dgx-01", "dmesg");
        assert!(result
            .output
            .contains("NVRM: Xid (PCI:0000:18:00): 79, pid='<unknown>', name=<unknown>, GPU has fallen off the bus"));

        let errors = run(&mut store, "dgx-01", "dmesg -l err");
        assert_eq!(errors.output.lines().count(), 1);
        assert_eq!(result.output, run(&mut store, "dgx-01", "dmesg").output);
    }

    #[test]
    fn test_uname_and_hostname() {
        let mut store = ClusterStore::default();
        assert_eq!(run(&mut store, "dgx-02", "uname").output, "Linux");
        assert_eq!(run(&mut store, "dgx-02", "uname -r").output, DEFAULT_KERNEL_VERSION);
        assert!(run(&mut store, "dgx-02", "uname -a")
            .output
            .starts_with("Linux dgx-02 "));
        assert_eq!(run(&mut store, "dgx-02", "hostname").output, "dgx-02");
        assert_eq!(run(&mut store, "dgx-02", "hostname -I").output, "10.0.0.11");
        assert_eq!(run(&mut store, "bcm-head01", "hostname").output, "bcm-head01");
    }

    #[test]
    fn test_lscpu_and_nproc_agree() {
        let mut store = ClusterStore::default();
        let nproc = run(&mut store, "dgx-01", "nproc").output;
        let lscpu = run(&mut store, "dgx-01", "lscpu").output;
        assert!(lscpu
            .lines()
            .any(|l| l.starts_with("CPU(s):") && l.ends_with(&nproc)));
    }

    #[test]
    fn test_ip_shows_down_ib_link() {
        let mut store = ClusterStore::default();
        store.cluster_mut().nodes[0].hcas[3].ports[0].state = crate::state::types::PortState::Down;
        let result = run(&mut store, "dgx-01", "ip -br addr");
        assert!(result
            .output
            .lines()
            .any(|l| l.starts_with("ibp3s0") && l.contains("DOWN")));
        assert!(result.output.contains("10.0.0.10/24"));
    }

    #[test]
    fn test_compute_only_tools_on_head_node() {
        let mut store = ClusterStore::default();
        assert_eq!(run(&mut store, "bcm-head01", "lscpu").exit_code, 1);
        assert_eq!(run(&mut store, "bcm-head01", "uptime -p").exit_code, 0);
    }

    #[test]
    fn test_uname_flags_and_operands() {
        let mut store = ClusterStore::default();
        let kernel = run(&mut store, "dgx-01", "uname -v");
        assert_eq!(kernel.output, KERNEL_BUILD);
        let version = run(&mut store, "dgx-01", "uname --version");
        assert_eq!(version.exit_code, 0);
        assert!(version.output.starts_with("uname version"));

        let extra = run(&mut store, "dgx-01", "uname bogus");
        assert_eq!(extra.exit_code, 1);
        assert!(extra.output.contains("Try 'uname --help'"));
        assert_eq!(run(&mut store, "dgx-01", "hostname").output, "dgx-01");
    }
}
