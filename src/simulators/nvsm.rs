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

//! `nvsm` simulator.
//!
//! Running `nvsm` with no arguments enters the interactive shell; the
//! session keeps feeding lines to [`Simulator::execute_interactive`] while
//! results carry the `nvsm->` prompt.

use crate::common::config::SimConfig;
use crate::parsing::{parse, ParsedCommand};
use crate::simulators::common::{handle_meta_flags, local_node, unknown_subcommand};
use crate::state::constants::NVSM_VERSION;
use crate::state::types::{Gpu, HealthStatus, LinkStatus, Node};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};

pub const PROMPT: &str = "nvsm->";

const USAGE: &str = "Usage: nvsm [options] [command]

NVIDIA System Management

Commands:
    show health          Show the system health summary
    show gpus            Show GPU inventory and status
    show alerts          Show active alerts
    dump health          Collect a health snapshot for NVIDIA support

With no command, nvsm starts an interactive shell (type 'exit' to leave).";

pub struct NvsmSimulator;

impl NvsmSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NvsmSimulator {
    fn default() -> Self {
        Self::new()
    }
}

struct Check {
    description: String,
    healthy: bool,
}

fn check(description: impl Into<String>, healthy: bool) -> Check {
    Check {
        description: description.into(),
        healthy,
    }
}

fn health_checks(node: &Node) -> Vec<Check> {
    let accessible = node.gpus.iter().filter(|g| g.is_accessible()).count();
    let mut checks = vec![check(
        "Verify installed GPU count",
        accessible == node.gpus.len(),
    )];
    for gpu in &node.gpus {
        checks.push(check(
            format!("Check GPU{} health", gpu.id),
            gpu.is_accessible() && gpu.health_status == HealthStatus::Ok,
        ));
    }
    for gpu in &node.gpus {
        checks.push(check(
            format!("Verify GPU{} NVLink link count", gpu.id),
            gpu.active_nvlinks() == gpu.nvlinks.len(),
        ));
    }
    for gpu in &node.gpus {
        checks.push(check(
            format!("Check GPU{} temperature", gpu.id),
            gpu.thermal_status() == HealthStatus::Ok,
        ));
    }
    for hca in &node.hcas {
        checks.push(check(
            format!("Verify InfiniBand port {} link state", hca.name),
            hca.ports.iter().all(|p| p.is_up()),
        ));
    }
    for sensor in node.bmc.sensors.iter().filter(|s| s.sensor_type == "Fan") {
        checks.push(check(format!("Check fan {} speed", sensor.name), sensor.value > 1000.0));
    }
    for sensor in node.bmc.sensors.iter().filter(|s| s.sensor_type == "Power Supply") {
        checks.push(check(
            format!("Check power supply {} status", sensor.name),
            sensor.value > 0.0,
        ));
    }
    checks.push(check("Verify data drive RAID-0 volume status", true));
    checks
}

fn show_health(node: &Node) -> String {
    let checks = health_checks(node);
    let unhealthy = checks.iter().filter(|c| !c.healthy).count();
    let total = checks.len();

    let mut lines = vec![
        String::new(),
        "Info".to_string(),
        "----".to_string(),
        format!("{:<30}: {}", "Hostname", node.hostname),
        format!("{:<30}: {}", "Platform", node.system_type),
        format!("{:<30}: {}", "Version", NVSM_VERSION),
        String::new(),
        "Checks".to_string(),
        "------".to_string(),
    ];
    for c in &checks {
        let dots = ".".repeat(60usize.saturating_sub(c.description.len()));
        let status = if c.healthy { "Healthy" } else { "Unhealthy" };
        lines.push(format!("{} {dots} {status}", c.description));
    }
    lines.push(String::new());
    lines.push("Health Summary".to_string());
    lines.push("--------------".to_string());
    lines.push(format!("{} out of {total} checks are healthy", total - unhealthy));
    lines.push(format!("{unhealthy} out of {total} checks are unhealthy"));
    lines.push(format!("0 out of {total} checks are unknown"));
    lines.push(format!("0 out of {total} checks are informational"));
    lines.push(String::new());
    let overall = if unhealthy == 0 { "Healthy" } else { "Unhealthy" };
    lines.push(format!("Overall system status is {overall}"));
    lines.join("\n")
}

fn gpu_health(gpu: &Gpu) -> HealthStatus {
    if gpu.is_accessible() {
        gpu.health_status.max(gpu.thermal_status())
    } else {
        HealthStatus::Critical
    }
}

fn show_gpus(node: &Node) -> String {
    let mut blocks = Vec::new();
    for gpu in &node.gpus {
        let health = gpu_health(gpu);
        let (name, serial) = if gpu.is_accessible() {
            (gpu.name.as_str(), gpu.serial.as_str())
        } else {
            ("N/A", "N/A")
        };
        let lines = [
            format!("/systems/localhost/gpus/GPU{}", gpu.id),
            "Properties:".to_string(),
            format!("    Inventory_ModelName = {name}"),
            format!("    Inventory_SerialNumber = {serial}"),
            format!("    Inventory_UUID = {}", gpu.uuid),
            format!("    Inventory_PCIeBusId = {}", gpu.pci_bus_id),
            format!("    Stats_Temperature = {} C", gpu.temperature),
            format!(
                "    Stats_NVLinkActive = {}/{}",
                gpu.active_nvlinks(),
                gpu.nvlinks.len()
            ),
            format!("    Status_Health = {health}"),
            "Targets:".to_string(),
            "    pcie".to_string(),
            "    processors".to_string(),
            "Verbs:".to_string(),
            "    cd".to_string(),
            "    show".to_string(),
        ];
        blocks.push(lines.join("\n"));
    }
    blocks.join("\n\n")
}

fn show_alerts(node: &Node) -> String {
    let mut alerts = Vec::new();
    for gpu in &node.gpus {
        if !gpu.is_accessible() {
            alerts.push((HealthStatus::Critical, format!("GPU{} has fallen off the bus (XID 79)", gpu.id)));
        } else if let Some(x) = gpu.latest_xid() {
            alerts.push((gpu.health_status.max(HealthStatus::Warning), format!("GPU{} reported XID {}: {}", gpu.id, x.code, x.description)));
        }
        if gpu.thermal_status() != HealthStatus::Ok {
            alerts.push((gpu.thermal_status(), format!("GPU{} temperature is {} C", gpu.id, gpu.temperature)));
        }
        for link in gpu.nvlinks.iter().filter(|l| l.status != LinkStatus::Active) {
            alerts.push((HealthStatus::Warning, format!("GPU{} NVLink {} is down", gpu.id, link.link_id)));
        }
    }
    for hca in &node.hcas {
        if hca.ports.iter().any(|p| !p.is_up()) {
            alerts.push((HealthStatus::Warning, format!("InfiniBand adapter {} port is down", hca.name)));
        }
    }
    if alerts.is_empty() {
        return "No alerts found".to_string();
    }
    alerts
        .iter()
        .enumerate()
        .map(|(i, (severity, message))| {
            format!(
                "/systems/localhost/alerts/alert{i}\nProperties:\n    Severity = {severity}\n    Message_Details = {message}"
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl NvsmSimulator {
    fn run(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let node = match local_node(ctx, "nvsm") {
            Ok(n) => n,
            Err(e) => return e,
        };
        let verb = parsed.subcommand(0);
        let target = parsed.subcommand(1).map(str::to_ascii_lowercase);
        match (verb, target.as_deref()) {
            (Some("show"), Some("health")) => CommandResult::ok(show_health(node)),
            (Some("show"), Some("gpus" | "gpu")) => CommandResult::ok(show_gpus(node)),
            (Some("show"), Some("alerts")) => CommandResult::ok(show_alerts(node)),
            (Some("show"), _) => CommandResult::usage("Usage: show [health | gpus | alerts]"),
            (Some("dump"), Some("health")) => CommandResult::ok(format!(
                "Unable to find NVSM health dump directory, creating /tmp/nvsm\nCollecting health information ... done\nWriting output to /tmp/nvsm/nvsm-health-{}.tar.xz\nDone.",
                node.hostname
            )),
            (Some("dump"), _) => CommandResult::usage("Usage: dump health"),
            (Some(other), _) => unknown_subcommand("nvsm", other, "Run 'nvsm --help' for usage."),
            (None, _) => CommandResult::ok(String::new()),
        }
    }
}

impl Simulator for NvsmSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "nvsm",
            version: NVSM_VERSION,
            description: "NVIDIA System Management",
            commands: &["nvsm"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), USAGE, true) {
            return result;
        }
        if parsed.subcommands.is_empty() && parsed.flags.is_empty() {
            if let Err(e) = local_node(ctx, "nvsm") {
                return e;
            }
            return CommandResult::ok("").with_prompt(PROMPT);
        }
        self.run(parsed, ctx)
    }

    fn execute_interactive(
        &self,
        line: &str,
        _prompt: &str,
        ctx: &mut CommandContext<'_>,
    ) -> CommandResult {
        let trimmed = line.trim();
        match trimmed {
            "exit" | "quit" => return CommandResult::ok(""),
            "" => return CommandResult::ok("").with_prompt(PROMPT),
            "help" | "?" => return CommandResult::ok(USAGE).with_prompt(PROMPT),
            _ => {}
        }
        // Lines typed at the prompt omit the leading `nvsm`
        let parsed = parse(&format!("nvsm {trimmed}"));
        let result = self.run(&parsed, ctx);
        let result = if result.exit_code == SimConfig::EXIT_USAGE && result.output.contains("invalid command") {
            CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("ERROR:nvsm:Unknown command '{trimmed}'"),
            )
        } else {
            result
        };
        result.with_prompt(PROMPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{Severity, XidError};
    use crate::state::ClusterStore;
    use crate::traits::ClusterState;
    use chrono::Utc;

    #[test]
    fn test_show_health_healthy_node() {
        let mut store = ClusterStore::default();
        let mut ctx = CommandContext::new(&mut store, "dgx-01");
        let result = NvsmSimulator::new().execute(&parse("nvsm show health"), &mut ctx);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("Overall system status is Healthy"));
        assert!(result.output.contains("0 out of"));
    }

    #[test]
    fn test_lost_gpu_is_unhealthy() {
        let mut store = ClusterStore::default();
        store
            .add_xid_error(
                "dgx-01",
                4,
                XidError {
                    code: 79,
                    timestamp: Utc::now(),
                    description: "GPU has fallen off the bus".to_string(),
                    severity: Severity::Critical,
                },
            )
            .unwrap();
        let mut ctx = CommandContext::new(&mut store, "dgx-01");
        let sim = NvsmSimulator::new();
        let health = sim.execute(&parse("nvsm show health"), &mut ctx);
        assert!(health.output.contains("Overall system status is Unhealthy"));
        let gpus = sim.execute(&parse("nvsm show gpus"), &mut ctx);
        assert!(gpus.output.contains("Status_Health = Critical"));
        let alerts = sim.execute(&parse("nvsm show alerts"), &mut ctx);
        assert!(alerts.output.contains("GPU4 has fallen off the bus"));
    }

    #[test]
    fn test_interactive_mode() {
        let mut store = ClusterStore::default();
        let mut ctx = CommandContext::new(&mut store, "dgx-01");
        let sim = NvsmSimulator::new();
        let entered = sim.execute(&parse("nvsm"), &mut ctx);
        assert_eq!(entered.prompt.as_deref(), Some(PROMPT));

        let shown = sim.execute_interactive("show health", PROMPT, &mut ctx);
        assert_eq!(shown.prompt.as_deref(), Some(PROMPT));
        assert!(shown.output.contains("Health Summary"));

        let bad = sim.execute_interactive("frobnicate", PROMPT, &mut ctx);
        assert_eq!(bad.exit_code, 1);
        assert_eq!(bad.prompt.as_deref(), Some(PROMPT));

        let left = sim.execute_interactive("exit", PROMPT, &mut ctx);
        assert!(left.prompt.is_none());
    }
}
