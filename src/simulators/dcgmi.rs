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

//! `dcgmi` simulator: discovery, diagnostics, health watches and field monitoring.

use crate::common::config::{SimConfig, ThemeConfig};
use crate::parsing::common::parse_index_list;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, local_node, unknown_subcommand};
use crate::state::constants::DCGM_VERSION;
use crate::state::types::{Gpu, HealthStatus, LinkStatus, Node};
use crate::state::xid;
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};
use crate::utils::colored;

const USAGE: &str = "Usage: dcgmi <subsystem>

Subsystems:
    discovery   Discover GPUs on the system (-l)
    diag        System validation and diagnostic (-r 1|2|3|4)
    health      Monitor and check GPU health (-s <systems>, -c)
    dmon        Stream field values (-e <fieldIds> [-c <count>] [-i <gpuIds>])
    group       GPU group management (-l)

Run 'dcgmi <subsystem> --help' for details.";

const RULE: &str = "+---------------------------+------------------------------------------------+";

pub struct DcgmiSimulator;

impl DcgmiSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DcgmiSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn selected_gpus<'a>(node: &'a Node, parsed: &ParsedCommand) -> Result<Vec<&'a Gpu>, CommandResult> {
    match parsed.flag_value_any(&["i", "gpuid"]) {
        None => Ok(node.gpus.iter().collect()),
        Some(list) => {
            let ids = parse_index_list(list).ok_or_else(|| {
                CommandResult::usage(format!("Error: Invalid GPU ID list '{list}'"))
            })?;
            let gpus: Vec<&Gpu> = ids.iter().filter_map(|id| node.gpu(*id)).collect();
            if gpus.len() != ids.len() {
                return Err(cmd_error!(
                    SimConfig::EXIT_FAILURE,
                    "Error: Invalid GPU ID list '{list}'. One or more GPUs do not exist."
                ));
            }
            Ok(gpus)
        }
    }
}

fn discovery(node: &Node) -> String {
    let rule = "+--------+----------------------------------------------------------------------+";
    let mut lines = vec![
        format!("{} GPUs found.", node.gpus.len()),
        rule.to_string(),
        "| GPU ID | Device Information                                                   |".to_string(),
        rule.to_string(),
    ];
    for gpu in &node.gpus {
        let name = if gpu.is_accessible() {
            gpu.name.clone()
        } else {
            "Unknown (GPU is lost)".to_string()
        };
        lines.push(format!("| {:<6} | {:<68} |", gpu.id, format!("Name: {name}")));
        lines.push(format!("| {:<6} | {:<68} |", "", format!("PCI Bus ID: {}", gpu.pci_bus_id)));
        lines.push(format!("| {:<6} | {:<68} |", "", format!("Device UUID: {}", gpu.uuid)));
        lines.push(rule.to_string());
    }
    lines.push("0 NvSwitches found.".to_string());
    lines.join("\n")
}

/// Why a GPU fails diagnostics, if it does.
fn diag_failure(gpu: &Gpu) -> Option<String> {
    if !gpu.is_accessible() {
        return Some("GPU has fallen off the bus".to_string());
    }
    if gpu.ecc_errors.double_bit > 0 {
        return Some(format!(
            "{} double-bit ECC error(s) detected",
            gpu.ecc_errors.double_bit
        ));
    }
    gpu.xid_errors
        .iter()
        .find(|x| xid::fails_diagnostics(x.code))
        .map(|x| format!("XID {} ({})", x.code, x.description))
}

fn diag_warning(gpu: &Gpu) -> Option<String> {
    if gpu.temperature >= SimConfig::GPU_TEMP_WARNING {
        return Some(format!("thermal violation at {}C", gpu.temperature));
    }
    if gpu.nvlinks.iter().any(|l| l.status != LinkStatus::Active) {
        return Some("NVLink inactive".to_string());
    }
    None
}

struct DiagTest {
    name: &'static str,
    level: u32,
    check: fn(&Gpu) -> Option<(bool, String)>,
}

fn fails_if_lost(gpu: &Gpu) -> Option<(bool, String)> {
    (!gpu.is_accessible()).then(|| (true, "GPU is lost".to_string()))
}

fn fails_on_memory(gpu: &Gpu) -> Option<(bool, String)> {
    diag_failure(gpu).map(|reason| (true, reason))
}

fn warns_on_stress(gpu: &Gpu) -> Option<(bool, String)> {
    diag_failure(gpu)
        .map(|reason| (true, reason))
        .or_else(|| diag_warning(gpu).map(|reason| (false, reason)))
}

const DIAG_TESTS: &[(&str, &[DiagTest])] = &[
    (
        "Deployment",
        &[
            DiagTest { name: "Denylist", level: 1, check: |_| None },
            DiagTest { name: "NVML Library", level: 1, check: fails_if_lost },
            DiagTest { name: "CUDA Main Library", level: 1, check: |_| None },
            DiagTest { name: "Permissions and OS Blocks", level: 1, check: |_| None },
            DiagTest { name: "Persistence Mode", level: 1, check: |_| None },
            DiagTest { name: "Environment Variables", level: 1, check: |_| None },
            DiagTest { name: "Page Retirement/Row Remap", level: 1, check: fails_on_memory },
            DiagTest { name: "Graphics Processes", level: 1, check: |_| None },
            DiagTest { name: "Inforom", level: 1, check: |_| None },
        ],
    ),
    (
        "Integration",
        &[DiagTest { name: "PCIe", level: 2, check: fails_if_lost }],
    ),
    (
        "Hardware",
        &[
            DiagTest { name: "GPU Memory", level: 2, check: fails_on_memory },
            DiagTest { name: "Diagnostic", level: 3, check: fails_on_memory },
        ],
    ),
    (
        "Stress",
        &[
            DiagTest { name: "Targeted Stress", level: 3, check: warns_on_stress },
            DiagTest { name: "Targeted Power", level: 3, check: warns_on_stress },
            DiagTest { name: "Memory Bandwidth", level: 3, check: fails_on_memory },
        ],
    ),
];

fn diag_level(value: &str) -> Option<u32> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "short" => Some(1),
        "2" | "medium" => Some(2),
        "3" | "long" => Some(3),
        "4" | "xlong" => Some(4),
        _ => None,
    }
}

fn diag_row(name: &str, result: &str) -> String {
    format!("| {name:<25} | {result:<46} |")
}

fn run_diag(node: &Node, gpus: &[&Gpu], level: u32) -> CommandResult {
    let mut lines = vec![
        "Successfully ran diagnostic for group.".to_string(),
        RULE.to_string(),
        diag_row("Diagnostic", "Result"),
        "+===========================+================================================+".to_string(),
        "|-----  Metadata  ----------+------------------------------------------------|".to_string(),
        diag_row("DCGM Version", DCGM_VERSION),
        diag_row("Driver Version Detected", &node.driver_version),
        diag_row(
            "GPU Device IDs Detected",
            &gpus.iter().map(|g| g.id.to_string()).collect::<Vec<_>>().join(","),
        ),
    ];

    let mut failed = false;
    for (category, tests) in DIAG_TESTS {
        let tests: Vec<&DiagTest> = tests.iter().filter(|t| t.level <= level).collect();
        if tests.is_empty() {
            continue;
        }
        lines.push(format!(
            "+-----  {category}  {}+{}+",
            "-".repeat(18usize.saturating_sub(category.len())),
            "-".repeat(48)
        ));
        for test in tests {
            let findings: Vec<(u32, bool, String)> = gpus
                .iter()
                .filter_map(|g| (test.check)(g).map(|(fail, why)| (g.id, fail, why)))
                .collect();
            if findings.is_empty() {
                lines.push(diag_row(test.name, "Pass - All"));
                continue;
            }
            let failing: Vec<String> = findings
                .iter()
                .filter(|(_, fail, _)| *fail)
                .map(|(id, _, _)| id.to_string())
                .collect();
            let headline = if failing.is_empty() {
                let ids: Vec<String> = findings.iter().map(|(id, _, _)| id.to_string()).collect();
                format!("Warn - GPU: {}", ids.join(", "))
            } else {
                failed = true;
                format!("Fail - GPU: {}", failing.join(", "))
            };
            lines.push(diag_row(test.name, &headline));
            for (id, _, why) in &findings {
                lines.push(diag_row("", &format!("GPU {id}: {why}")));
            }
        }
    }
    lines.push(RULE.to_string());

    let output = lines.join("\n");
    if failed {
        CommandResult::error(SimConfig::EXIT_FAILURE, output)
    } else {
        CommandResult::ok(output)
    }
}

fn health_word(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Ok => "Healthy",
        HealthStatus::Warning => "Warning",
        HealthStatus::Critical => "Failure",
    }
}

/// Incidents explaining a GPU's health status, one per subsystem.
fn health_incidents(gpu: &Gpu) -> Vec<String> {
    let mut incidents = Vec::new();
    if !gpu.is_accessible() {
        incidents.push("PCIe system: Failure - GPU has fallen off the bus (XID 79)".to_string());
    }
    for x in gpu.xid_errors.iter().filter(|x| !xid::is_bus_loss(x.code)) {
        incidents.push(format!("Driver system: XID {} - {}", x.code, x.description));
    }
    if gpu.ecc_errors.double_bit > 0 {
        incidents.push(format!(
            "Memory system: Failure - {} volatile double-bit ECC error(s)",
            gpu.ecc_errors.double_bit
        ));
    } else if gpu.ecc_errors.single_bit > 0 {
        incidents.push(format!(
            "Memory system: Warning - {} volatile single-bit ECC error(s)",
            gpu.ecc_errors.single_bit
        ));
    }
    for link in gpu.nvlinks.iter().filter(|l| l.status != LinkStatus::Active) {
        incidents.push(format!("NVLink system: Warning - NVLink {} is down", link.link_id));
    }
    if gpu.temperature >= SimConfig::GPU_TEMP_WARNING {
        incidents.push(format!("Thermal system: Warning - temperature {}C", gpu.temperature));
    }
    if gpu.utilization == 0 && gpu.health_status == HealthStatus::Critical && incidents.is_empty() {
        incidents.push("SM system: Failure - GPU stopped responding".to_string());
    }
    incidents
}

fn health_check(gpus: &[&Gpu]) -> String {
    let overall = gpus.iter().map(|g| g.health_status).max().unwrap_or_default();
    let rule = "+----------------------------------------------------------------------------+";
    let mut lines = vec![
        "Health Monitor Report".to_string(),
        rule.to_string(),
        format!(
            "| {:<16} | Overall Health: {}",
            "Group 0",
            colored(health_word(overall), ThemeConfig::health_color(overall))
        ),
        "+==================+=========================================================+".to_string(),
    ];
    for gpu in gpus.iter().filter(|g| g.health_status != HealthStatus::Ok) {
        lines.push(format!(
            "| {:<16} | {}",
            format!("GPU ID: {}", gpu.id),
            colored(health_word(gpu.health_status), ThemeConfig::health_color(gpu.health_status))
        ));
        for incident in health_incidents(gpu) {
            lines.push(format!("| {:<16} | {incident}", ""));
        }
    }
    lines.push(rule.to_string());
    lines.join("\n")
}

/// A DCGM field id with its dmon column tag.
struct Field {
    id: u32,
    tag: &'static str,
    name: &'static str,
    read: fn(&Gpu) -> String,
}

const FIELDS: &[Field] = &[
    Field { id: 100, tag: "SMCLK", name: "SM clock", read: |g| g.clocks.sm.to_string() },
    Field { id: 101, tag: "MMCLK", name: "Memory clock", read: |g| g.clocks.memory.to_string() },
    Field { id: 150, tag: "TMPTR", name: "GPU temperature", read: |g| g.temperature.to_string() },
    Field { id: 155, tag: "POWER", name: "Power usage", read: |g| format!("{:.3}", g.power_draw) },
    Field { id: 203, tag: "GPUTL", name: "GPU utilization", read: |g| g.utilization.to_string() },
    Field {
        id: 204,
        tag: "MCUTL",
        name: "Memory copy utilization",
        read: |g| (g.memory_used * 100 / g.memory_total.max(1)).to_string(),
    },
    Field { id: 250, tag: "FBTTL", name: "Framebuffer total", read: |g| g.memory_total.to_string() },
    Field { id: 251, tag: "FBFRE", name: "Framebuffer free", read: |g| g.memory_free().to_string() },
    Field { id: 252, tag: "FBUSD", name: "Framebuffer used", read: |g| g.memory_used.to_string() },
    Field {
        id: 312,
        tag: "ECCSB",
        name: "Volatile single-bit ECC",
        read: |g| g.ecc_errors.single_bit.to_string(),
    },
    Field {
        id: 313,
        tag: "ECCDB",
        name: "Volatile double-bit ECC",
        read: |g| g.ecc_errors.double_bit.to_string(),
    },
];

fn dmon(gpus: &[&Gpu], parsed: &ParsedCommand) -> CommandResult {
    if parsed.has_flag("l") {
        let mut lines = vec![format!("{:<28}{:<8}{}", "Long Name", "Short", "Field ID")];
        for f in FIELDS {
            lines.push(format!("{:<28}{:<8}{}", f.name, f.tag, f.id));
        }
        return CommandResult::ok(lines.join("\n"));
    }
    let Some(spec) = parsed.flag_value("e") else {
        return CommandResult::usage("Error: dmon requires -e <fieldIds>. Use 'dcgmi dmon -l' to list fields.");
    };
    let mut fields = Vec::new();
    for token in spec.split(',').map(str::trim) {
        match token.parse::<u32>().ok().and_then(|id| FIELDS.iter().find(|f| f.id == id)) {
            Some(f) => fields.push(f),
            None => {
                return CommandResult::usage(format!("Error: Invalid field ID '{token}'"));
            }
        }
    }
    let count = flag_number!(parsed, u32, "c", "count").unwrap_or(1).clamp(1, 100);

    let mut header = format!("{:<10}", "#Entity");
    for f in &fields {
        header.push_str(&format!("{:<10}", f.tag));
    }
    let mut lines = vec![header.trim_end().to_string(), "ID".to_string()];
    for _ in 0..count {
        for gpu in gpus {
            let mut line = format!("{:<10}", format!("GPU {}", gpu.id));
            for f in &fields {
                let value = if gpu.is_accessible() { (f.read)(gpu) } else { "N/A".to_string() };
                line.push_str(&format!("{value:<10}"));
            }
            lines.push(line.trim_end().to_string());
        }
    }
    CommandResult::ok(lines.join("\n"))
}

impl Simulator for DcgmiSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "dcgmi",
            version: DCGM_VERSION,
            description: "NVIDIA Data Center GPU Manager CLI",
            commands: &["dcgmi"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), USAGE, true) {
            return result;
        }
        let node = match local_node(ctx, "dcgmi") {
            Ok(n) => n,
            Err(_) => {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    "Error: unable to establish a connection to the specified host: localhost\nError: Unable to connect to host engine. Host engine connection invalid/disconnected.",
                )
            }
        };

        match parsed.subcommand(0) {
            Some("discovery") => {
                if parsed.has_any_flag(&["l", "list"]) {
                    CommandResult::ok(discovery(node))
                } else {
                    CommandResult::usage("Usage: dcgmi discovery -l")
                }
            }
            Some("diag") => {
                let Some(level) = parsed.flag_value_any(&["r", "run"]).and_then(diag_level) else {
                    return CommandResult::usage(
                        "Usage: dcgmi diag -r <1|2|3|4|short|medium|long|xlong> [-i <gpuIds>]",
                    );
                };
                match selected_gpus(node, parsed) {
                    Ok(gpus) => run_diag(node, &gpus, level),
                    Err(e) => e,
                }
            }
            Some("health") => {
                if let Some(systems) = parsed.flag_value("s") {
                    if systems.chars().all(|c| "apimtnx".contains(c)) {
                        return CommandResult::ok("Health monitor systems set successfully.");
                    }
                    return CommandResult::usage(format!("Error: Invalid health systems '{systems}'"));
                }
                if parsed.has_any_flag(&["c", "check"]) {
                    return match selected_gpus(node, parsed) {
                        Ok(gpus) => CommandResult::ok(health_check(&gpus)),
                        Err(e) => e,
                    };
                }
                CommandResult::usage("Usage: dcgmi health [-s <systems>] [-c]")
            }
            Some("dmon") => match selected_gpus(node, parsed) {
                Ok(gpus) => dmon(&gpus, parsed),
                Err(e) => e,
            },
            Some("group") => {
                let rule = "+-------------------+----------------------------------------------------------+";
                let entities: Vec<String> = node.gpus.iter().map(|g| format!("GPU {}", g.id)).collect();
                let lines = [
                    rule.to_string(),
                    format!("| {:<76} |", "GROUPS"),
                    format!("| {:<76} |", "1 group found."),
                    "+===================+==========================================================+".to_string(),
                    format!("| {:<17} | {:<56} |", "Groups", ""),
                    format!("| {:<17} | {:<56} |", "-> 0", ""),
                    format!("| {:<17} | {:<56} |", "   -> Group ID", "0"),
                    format!("| {:<17} | {:<56} |", "   -> Group Name", "DCGM_ALL_SUPPORTED_GPUS"),
                    format!("| {:<17} | {:<56} |", "   -> Entities", entities.join(", ")),
                    rule.to_string(),
                ];
                CommandResult::ok(lines.join("\n"))
            }
            Some(other) => unknown_subcommand("dcgmi", other, "Run 'dcgmi --help' for usage."),
            None => CommandResult::usage(USAGE),
        }
    }
}
