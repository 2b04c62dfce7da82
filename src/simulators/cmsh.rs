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

//! Base Command Manager shell (`cmsh`) and HA status (`cmha`).
//!
//! The interactive mode keeps its position in the prompt itself:
//! `[bcm-head01]% `, `[bcm-head01->device]% ` and
//! `[bcm-head01->device[dgx-01]]% `.

use crate::common::config::SimConfig;
use crate::parsing::ParsedCommand;
use crate::simulators::common::handle_meta_flags;
use crate::state::constants::BCM_VERSION;
use crate::state::types::{ClusterConfig, HealthStatus, Node, PowerState, SlurmNodeState};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};
use crate::utils::hostlist;

const SOFTWARE_IMAGE: &str = "dgx-os-6.1-image";
const HEAD_NODE_IP: &str = "10.0.0.1";
const STANDBY_NODE_IP: &str = "10.0.0.2";

const USAGE: &str = "Usage: cmsh [options]
  -c <commands>   Run the semicolon separated commands and exit
  -v, --version   Print version and exit
  --help          Print this help";

const MODE_HELP: &str = "================================ Top =================================
category ....................... Enter category mode
device ......................... Enter device mode
partition ...................... Enter partition mode
softwareimage .................. Enter softwareimage mode
exit ........................... Exit from current object or mode
quit ........................... Quit shell
=============================== Device ===============================
list ........................... List overview
status ......................... Device status
use ............................ Use the specified object
show ........................... Show object properties
get ............................ Get a property of the current object
power .......................... Power on, off, reset or status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Device,
    Category,
    SoftwareImage,
    Partition,
}

impl Section {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "device" => Some(Section::Device),
            "category" => Some(Section::Category),
            "softwareimage" => Some(Section::SoftwareImage),
            "partition" => Some(Section::Partition),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Section::Device => "device",
            Section::Category => "category",
            Section::SoftwareImage => "softwareimage",
            Section::Partition => "partition",
        }
    }
}

/// Where the shell currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mode {
    host: String,
    section: Option<Section>,
    object: Option<String>,
}

impl Mode {
    fn top(host: &str) -> Self {
        Self {
            host: host.to_string(),
            section: None,
            object: None,
        }
    }

    fn from_prompt(prompt: &str, fallback_host: &str) -> Self {
        let inner = prompt
            .trim_end()
            .strip_suffix('%')
            .and_then(|p| p.strip_prefix('['))
            .and_then(|p| p.strip_suffix(']'));
        let Some(inner) = inner else {
            return Self::top(fallback_host);
        };
        let (host, rest) = inner.split_once("->").unwrap_or((inner, ""));
        let (section, object) = match rest.split_once('[') {
            Some((section, object)) => (section, object.strip_suffix(']')),
            None => (rest, None),
        };
        Self {
            host: host.to_string(),
            section: Section::from_name(section),
            object: object.map(str::to_string),
        }
    }

    fn prompt(&self) -> String {
        match (self.section, &self.object) {
            (None, _) => format!("[{}]% ", self.host),
            (Some(section), None) => format!("[{}->{}]% ", self.host, section.name()),
            (Some(section), Some(object)) => {
                format!("[{}->{}[{}]]% ", self.host, section.name(), object)
            }
        }
    }

    /// `exit`: drop the object first, then the section.
    fn up(&mut self) {
        if self.object.take().is_none() {
            self.section = None;
        }
    }
}

/// One line of cmsh output plus whether it failed.
struct Reply {
    output: String,
    failed: bool,
}

impl Reply {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            failed: false,
        }
    }

    fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            failed: true,
        }
    }
}

fn category_name(node: &Node) -> String {
    node.system_type.to_string().to_lowercase()
}

fn device_status(node: &Node) -> String {
    if node.bmc.power_state == PowerState::Off || node.slurm_state == SlurmNodeState::Down {
        return "[  DOWN  ]".to_string();
    }
    let failing = node
        .gpus
        .iter()
        .any(|g| !g.is_accessible() || g.health_status == HealthStatus::Critical);
    if failing {
        "[   UP   ], health check failed".to_string()
    } else {
        "[   UP   ]".to_string()
    }
}

fn dotted(name: &str, value: &str) -> String {
    format!("{name} {} {value}", ".".repeat(24usize.saturating_sub(name.len()).max(3)))
}

struct HeadNode<'a> {
    hostname: &'a str,
    ip: &'static str,
}

fn head_nodes(cluster: &ClusterConfig) -> Vec<HeadNode<'_>> {
    let mut heads = vec![HeadNode {
        hostname: &cluster.ha.primary_head_node,
        ip: HEAD_NODE_IP,
    }];
    if cluster.ha.enabled {
        heads.push(HeadNode {
            hostname: &cluster.ha.secondary_head_node,
            ip: STANDBY_NODE_IP,
        });
    }
    heads
}

fn device_list(cluster: &ClusterConfig) -> String {
    let mut lines = vec![
        format!(
            "{:<16} {:<16} {:<18} {:<16} {:<15} {:<14} {}",
            "Type", "Hostname (key)", "MAC", "Category", "Ip", "Network", "Status"
        ),
        format!(
            "{} {} {} {} {} {} {}",
            "-".repeat(16),
            "-".repeat(16),
            "-".repeat(18),
            "-".repeat(16),
            "-".repeat(15),
            "-".repeat(14),
            "-".repeat(20)
        ),
    ];
    for (i, head) in head_nodes(cluster).iter().enumerate() {
        lines.push(format!(
            "{:<16} {:<16} {:<18} {:<16} {:<15} {:<14} {}",
            "HeadNode",
            head.hostname,
            format!("FA:16:3E:00:00:{:02X}", i + 1),
            "",
            head.ip,
            "internalnet",
            "[   UP   ]"
        ));
    }
    for node in &cluster.nodes {
        lines.push(format!(
            "{:<16} {:<16} {:<18} {:<16} {:<15} {:<14} {}",
            "PhysicalNode",
            node.hostname,
            node.bmc.mac_address,
            category_name(node),
            node.management_ip,
            "internalnet",
            device_status(node)
        ));
    }
    lines.join("\n")
}

fn parameter_table(rows: &[(&str, String)]) -> String {
    let mut lines = vec![
        format!("{:<32} {}", "Parameter", "Value"),
        format!("{} {}", "-".repeat(32), "-".repeat(48)),
    ];
    lines.extend(rows.iter().map(|(k, v)| format!("{k:<32} {v}")));
    lines.join("\n")
}

fn device_properties(node: &Node) -> Vec<(&'static str, String)> {
    vec![
        ("Activation", "Fri Mar  1 09:00:00 2024".to_string()),
        ("BMC IP", node.bmc.ip_address.clone()),
        ("Category", category_name(node)),
        ("Hostname", node.hostname.clone()),
        ("Ip", node.management_ip.clone()),
        ("Mac", node.bmc.mac_address.clone()),
        ("Network", "internalnet".to_string()),
        ("Power control", "ipmi0".to_string()),
        ("Software image", SOFTWARE_IMAGE.to_string()),
        ("Status", device_status(node)),
        ("Type", "PhysicalNode".to_string()),
    ]
}

fn power_line(node: &Node) -> String {
    let state = match node.bmc.power_state {
        PowerState::On => "[   ON    ]",
        PowerState::Off => "[   OFF   ]",
    };
    format!("{} {state} {}", dotted("ipmi0", "").trim_end(), node.hostname)
}

pub struct CmshSimulator;

impl CmshSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CmshSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl CmshSimulator {
    /// Run one cmsh line, possibly moving to another mode.
    fn run_line(&self, mode: &mut Mode, line: &str, ctx: &mut CommandContext<'_>) -> Reply {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&first, rest)) = words.split_first() else {
            return Reply::ok("");
        };

        if let Some(section) = Section::from_name(first) {
            mode.section = Some(section);
            mode.object = None;
            if rest.is_empty() {
                return Reply::ok("");
            }
            return self.run_line(mode, &rest.join(" "), ctx);
        }

        match (first, mode.section) {
            ("help" | "?", _) => Reply::ok(MODE_HELP),
            ("exit", _) => {
                mode.up();
                Reply::ok("")
            }
            (_, None) => Reply::error(format!("Unknown command: {first}")),
            (_, Some(Section::Device)) => self.device_command(mode, first, rest, ctx),
            (_, Some(Section::Category)) => category_command(mode, first, rest, ctx.state.cluster()),
            ("list", Some(Section::SoftwareImage)) => Reply::ok(parameter_list(
                &["Name (key)", "Path", "Kernel version", "Nodes"],
                &[vec![
                    SOFTWARE_IMAGE.to_string(),
                    format!("/cm/images/{SOFTWARE_IMAGE}"),
                    ctx.state
                        .cluster()
                        .nodes
                        .first()
                        .map(|n| n.kernel_version.clone())
                        .unwrap_or_default(),
                    ctx.state.cluster().nodes.len().to_string(),
                ]],
            )),
            ("list", Some(Section::Partition)) => {
                let cluster = ctx.state.cluster();
                Reply::ok(parameter_list(
                    &["Name (key)", "Cluster name", "Head node", "Nodes"],
                    &[vec![
                        "base".to_string(),
                        cluster.name.clone(),
                        cluster.ha.active_head_node.clone(),
                        cluster.nodes.len().to_string(),
                    ]],
                ))
            }
            _ => Reply::error(format!("Unknown command: {first}")),
        }
    }

    fn device_command(
        &self,
        mode: &mut Mode,
        command: &str,
        args: &[&str],
        ctx: &mut CommandContext<'_>,
    ) -> Reply {
        match command {
            "list" => Reply::ok(device_list(ctx.state.cluster())),
            "status" => {
                let cluster = ctx.state.cluster();
                let mut lines: Vec<String> = head_nodes(cluster)
                    .iter()
                    .map(|h| dotted(h.hostname, "[   UP   ]"))
                    .collect();
                lines.extend(
                    cluster
                        .nodes
                        .iter()
                        .filter(|n| args.is_empty() || args.contains(&n.hostname.as_str()))
                        .map(|n| dotted(&n.hostname, &device_status(n))),
                );
                Reply::ok(lines.join("\n"))
            }
            "use" => match args.first() {
                Some(name) if ctx.state.node(name).is_some() => {
                    mode.object = Some(name.to_string());
                    Reply::ok("")
                }
                Some(name) if head_nodes(ctx.state.cluster()).iter().any(|h| h.hostname == *name) => {
                    mode.object = Some(name.to_string());
                    Reply::ok("")
                }
                Some(name) => Reply::error(format!("No object with name {name} found")),
                None => Reply::error("use: object name required"),
            },
            "show" | "get" => {
                let target = match command {
                    "show" => args.first().map(|s| s.to_string()).or_else(|| mode.object.clone()),
                    _ => mode.object.clone(),
                };
                let Some(target) = target else {
                    return Reply::error("No object selected, use 'use <name>' first");
                };
                let Some(node) = ctx.state.node(&target) else {
                    return Reply::error(format!("No object with name {target} found"));
                };
                let properties = device_properties(node);
                if command == "show" {
                    return Reply::ok(parameter_table(&properties));
                }
                let Some(wanted) = args.first() else {
                    return Reply::error("get: property name required");
                };
                match properties.iter().find(|(k, _)| k.eq_ignore_ascii_case(wanted)) {
                    Some((_, value)) => Reply::ok(value.clone()),
                    None => Reply::error(format!("Unknown property: {wanted}")),
                }
            }
            "power" => self.power(mode, args, ctx),
            other => Reply::error(format!("Unknown command: {other}")),
        }
    }

    fn power(&self, mode: &Mode, args: &[&str], ctx: &mut CommandContext<'_>) -> Reply {
        let Some((&action, options)) = args.split_first() else {
            return Reply::error("power: action required (on, off, reset, status)");
        };
        let targets: Vec<String> = match options.iter().position(|o| *o == "-n") {
            Some(i) => options
                .get(i + 1)
                .map(|list| hostlist::expand(list))
                .unwrap_or_default(),
            None => match &mode.object {
                Some(object) => vec![object.clone()],
                None => ctx.state.cluster().nodes.iter().map(|n| n.hostname.clone()).collect(),
            },
        };
        if let Some(missing) = targets.iter().find(|t| ctx.state.node(t).is_none()) {
            return Reply::error(format!("No object with name {missing} found"));
        }

        let power = match action {
            "status" => None,
            "on" | "reset" => Some(PowerState::On),
            "off" => Some(PowerState::Off),
            other => return Reply::error(format!("power: unknown action {other}")),
        };
        let mut lines = Vec::new();
        for target in &targets {
            if let Some(power) = power {
                if let Err(err) = ctx.state.set_power_state(target, power) {
                    return Reply::error(format!("power: {err}"));
                }
            }
            if let Some(node) = ctx.state.node(target) {
                lines.push(power_line(node));
            }
        }
        Reply::ok(lines.join("\n"))
    }
}

fn parameter_list(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len().max(12)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.len());
            }
        }
    }
    let line = |cells: Vec<String>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join(" ")
            .trim_end()
            .to_string()
    };
    let mut out = vec![
        line(header.iter().map(|h| h.to_string()).collect()),
        line(widths.iter().map(|w| "-".repeat(*w)).collect()),
    ];
    out.extend(rows.iter().map(|r| line(r.clone())));
    out.join("\n")
}

fn category_command(mode: &mut Mode, command: &str, args: &[&str], cluster: &ClusterConfig) -> Reply {
    let mut categories: Vec<(String, usize)> = Vec::new();
    for node in &cluster.nodes {
        let name = category_name(node);
        match categories.iter_mut().find(|(c, _)| *c == name) {
            Some((_, count)) => *count += 1,
            None => categories.push((name, 1)),
        }
    }
    match command {
        "list" => Reply::ok(parameter_list(
            &["Name (key)", "Software image", "Nodes"],
            &categories
                .iter()
                .map(|(name, count)| vec![name.clone(), SOFTWARE_IMAGE.to_string(), count.to_string()])
                .collect::<Vec<_>>(),
        )),
        "use" => match args.first() {
            Some(name) if categories.iter().any(|(c, _)| c == name) => {
                mode.object = Some(name.to_string());
                Reply::ok("")
            }
            Some(name) => Reply::error(format!("No object with name {name} found")),
            None => Reply::error("use: object name required"),
        },
        "show" => {
            let Some(name) = args.first().map(|s| s.to_string()).or_else(|| mode.object.clone()) else {
                return Reply::error("No object selected, use 'use <name>' first");
            };
            let Some((_, count)) = categories.iter().find(|(c, _)| *c == name) else {
                return Reply::error(format!("No object with name {name} found"));
            };
            Reply::ok(parameter_table(&[
                ("Name", name.clone()),
                ("Nodes", count.to_string()),
                ("Software image", SOFTWARE_IMAGE.to_string()),
                ("Default gateway", "10.0.0.1".to_string()),
                ("Management network", "internalnet".to_string()),
            ]))
        }
        other => Reply::error(format!("Unknown command: {other}")),
    }
}

fn cmha_status(cluster: &ClusterConfig) -> CommandResult {
    if !cluster.ha.enabled {
        return CommandResult::error(
            SimConfig::EXIT_FAILURE,
            "cmha: high availability is not configured",
        );
    }
    let ha = &cluster.ha;
    let star = |name: &str| {
        if name == ha.active_head_node {
            format!("{name}*")
        } else {
            name.to_string()
        }
    };
    let block = |from: &str, to: &str| {
        let mut lines = vec![format!("{} -> {}", star(from), star(to))];
        for check in ["failoverping", "mysql", "ping", "status"] {
            lines.push(format!("  {check:<13} [  OK  ]"));
        }
        lines.join("\n")
    };
    CommandResult::ok(format!(
        "Node Status: running in active mode\n\n{}\n\n{}",
        block(&ha.primary_head_node, &ha.secondary_head_node),
        block(&ha.secondary_head_node, &ha.primary_head_node)
    ))
}

impl Simulator for CmshSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "cmsh",
            version: BCM_VERSION,
            description: "Base Command Manager cluster management shell",
            commands: &["cmsh", "cmha"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), USAGE, true) {
            return result;
        }
        if parsed.base_command == "cmha" {
            return match parsed.subcommand(0) {
                Some("status") | None => cmha_status(ctx.state.cluster()),
                Some(other) => CommandResult::usage(format!(
                    "cmha: unknown command '{other}'\nUsage: cmha status"
                )),
            };
        }

        if let Some(word) = parsed.subcommand(0) {
            return CommandResult::usage(format!("cmsh: unexpected argument '{word}'\n{USAGE}"));
        }
        let mut mode = Mode::top(&ctx.current_node);
        let Some(script) = parsed.flag_value("c") else {
            return CommandResult::ok("").with_prompt(mode.prompt());
        };
        let mut outputs = Vec::new();
        let mut exit_code = SimConfig::EXIT_SUCCESS;
        for line in script.split(';') {
            let reply = self.run_line(&mut mode, line.trim(), ctx);
            if reply.failed {
                exit_code = SimConfig::EXIT_FAILURE;
            }
            if !reply.output.is_empty() {
                outputs.push(reply.output);
            }
        }
        CommandResult {
            output: outputs.join("\n"),
            exit_code,
            prompt: None,
        }
    }

    fn execute_interactive(
        &self,
        line: &str,
        prompt: &str,
        ctx: &mut CommandContext<'_>,
    ) -> CommandResult {
        let mut mode = Mode::from_prompt(prompt, &ctx.current_node);
        let line = line.trim();
        if line == "quit" || (line == "exit" && mode.section.is_none()) {
            return CommandResult::ok("");
        }
        let mut outputs = Vec::new();
        let mut failed = false;
        for part in line.split(';') {
            let reply = self.run_line(&mut mode, part.trim(), ctx);
            failed |= reply.failed;
            if !reply.output.is_empty() {
                outputs.push(reply.output);
            }
        }
        let exit_code = if failed {
            SimConfig::EXIT_FAILURE
        } else {
            SimConfig::EXIT_SUCCESS
        };
        CommandResult {
            output: outputs.join("\n"),
            exit_code,
            prompt: Some(mode.prompt()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::ClusterStore;
    use crate::traits::ClusterState;

    fn run(store: &mut ClusterStore, line: &str) -> CommandResult {
        let mut ctx = CommandContext::new(store, SimConfig::HEAD_NODE);
        CmshSimulator::new().execute(&parse(line), &mut ctx)
    }

    fn interactive(store: &mut ClusterStore, line: &str, prompt: &str) -> CommandResult {
        let mut ctx = CommandContext::new(store, SimConfig::HEAD_NODE);
        CmshSimulator::new().execute_interactive(line, prompt, &mut ctx)
    }

    #[test]
    fn test_prompt_round_trip() {
        for prompt in ["[bcm-head01]% ", "[bcm-head01->device]% ", "[bcm-head01->device[dgx-02]]% "] {
            assert_eq!(Mode::from_prompt(prompt, "x").prompt(), prompt);
        }
    }

    #[test]
    fn test_batch_device_list() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "cmsh -c \"device; list\"");
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert!(result.output.starts_with("Type"));
        assert!(result.output.contains("bcm-head01"));
        assert!(result.output.contains("dgx-04"));
        assert!(result.prompt.is_none());
    }

    #[test]
    fn test_stray_argument_does_not_enter_shell() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "cmsh bogus");
        assert_eq!(result.exit_code, SimConfig::EXIT_USAGE);
        assert!(result.prompt.is_none());
        assert!(result.output.contains("Usage: cmsh"));
    }

    #[test]
    fn test_interactive_navigation() {
        let mut store = ClusterStore::default();
        let entered = run(&mut store, "cmsh");
        assert_eq!(entered.prompt.as_deref(), Some("[bcm-head01]% "));

        let device = interactive(&mut store, "device", "[bcm-head01]% ");
        assert_eq!(device.prompt.as_deref(), Some("[bcm-head01->device]% "));

        let used = interactive(&mut store, "use dgx-03", "[bcm-head01->device]% ");
        assert_eq!(used.prompt.as_deref(), Some("[bcm-head01->device[dgx-03]]% "));

        let got = interactive(&mut store, "get ip", "[bcm-head01->device[dgx-03]]% ");
        assert_eq!(got.output, "10.0.0.12");

        let up = interactive(&mut store, "exit", "[bcm-head01->device[dgx-03]]% ");
        assert_eq!(up.prompt.as_deref(), Some("[bcm-head01->device]% "));

        let left = interactive(&mut store, "quit", "[bcm-head01->device]% ");
        assert!(left.prompt.is_none());
    }

    #[test]
    fn test_power_off_marks_node_down() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "cmsh -c \"device; power off -n dgx-02\"");
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert!(result.output.contains("OFF"));
        let node = store.node("dgx-02").unwrap();
        assert_eq!(node.slurm_state, SlurmNodeState::Down);

        let status = run(&mut store, "cmsh -c \"device; status\"");
        assert!(status.output.lines().any(|l| l.starts_with("dgx-02") && l.contains("DOWN")));
    }

    #[test]
    fn test_unknown_command_fails() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "cmsh -c \"frobnicate\"");
        assert_eq!(result.exit_code, SimConfig::EXIT_FAILURE);
    }

    #[test]
    fn test_cmha_status() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "cmha status");
        assert!(result.output.contains("bcm-head01* -> bcm-head02"));
    }
}
