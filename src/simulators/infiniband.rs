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

//! InfiniBand diagnostics: `ibstat`, `ibstatus`, `iblinkinfo`, `perfquery`,
//! `ibdiagnet`, `ibnetdiscover` and `ibportstate`.
//!
//! The fabric is rail-optimized: HCA `mlx5_N` of every node is cabled to the
//! leaf switch of rail N. Switches are not part of the cluster state, their
//! identity is derived from the rail number.

use crate::common::config::SimConfig;
use crate::parsing::common::parse_number;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, local_node, reject_operand, state_error};
use crate::state::constants::MLNX_OFED_VERSION;
use crate::state::types::{ClusterConfig, Hca, IbPort, Node, PhysicalState, PortErrors, PortState};
use crate::state::{HcaUpdate, PortUpdate};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};

/// Exit status of the ibpanic() helper used by the infiniband-diags tools.
const EXIT_IBPANIC: i32 = 255;

const SWITCH_MODEL: &str = "MF0;leaf:MQM9700/U1";
const SWITCH_PORTS: u32 = 64;

pub struct InfinibandSimulator;

impl InfinibandSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InfinibandSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn switch_guid(rail: usize) -> String {
    format!("0x{:016x}", 0xfc6a_1c03_00a0_0000u64 + rail as u64)
}

fn switch_lid(rail: usize) -> u32 {
    2000 + rail as u32
}

fn rail_of(hca: &Hca) -> usize {
    hca.name
        .strip_prefix("mlx5_")
        .and_then(parse_number)
        .unwrap_or(0)
}

fn speed_name(rate_gbps: u32) -> &'static str {
    match rate_gbps {
        r if r >= 800 => "XDR",
        r if r >= 400 => "NDR",
        r if r >= 200 => "HDR",
        r if r >= 100 => "EDR",
        _ => "SDR",
    }
}

fn lane_speed(rate_gbps: u32) -> &'static str {
    match speed_name(rate_gbps) {
        "XDR" => "212.5",
        "NDR" => "106.25",
        "HDR" => "53.125",
        "EDR" => "25.78125",
        _ => "2.5",
    }
}

fn port_state_code(state: PortState) -> (u8, &'static str) {
    match state {
        PortState::Down => (1, "DOWN"),
        PortState::Initializing => (2, "INIT"),
        PortState::Armed => (3, "ARMED"),
        PortState::Active => (4, "ACTIVE"),
    }
}

fn phys_state_code(state: PhysicalState) -> u8 {
    match state {
        PhysicalState::Polling => 2,
        PhysicalState::Disabled => 3,
        PhysicalState::LinkUp => 5,
    }
}

/// Rate as reported by the port; a port without link trains at SDR.
fn effective_rate(port: &IbPort) -> u32 {
    if port.is_up() {
        port.rate_gbps
    } else {
        10
    }
}

fn find_hca<'a>(node: &'a Node, name: &str, tool: &str) -> Result<&'a Hca, CommandResult> {
    node.hca(name).ok_or_else(|| {
        CommandResult::error(
            EXIT_IBPANIC,
            format!("ibpanic: [{tool}] main: '{name}' IB device can't be found"),
        )
    })
}

fn port_selected(filter: Option<u32>, number: u32) -> bool {
    filter.is_none() || filter == Some(number)
}

fn render_ibstat_port(port: &IbPort) -> Vec<String> {
    vec![
        format!("\tPort {}:", port.number),
        format!("\t\tState: {}", port.state),
        format!("\t\tPhysical state: {}", port.physical_state),
        format!("\t\tRate: {}", effective_rate(port)),
        format!("\t\tBase lid: {}", port.lid),
        "\t\tLMC: 0".to_string(),
        format!("\t\tSM lid: {}", port.sm_lid),
        "\t\tCapability mask: 0xa751e848".to_string(),
        format!("\t\tPort GUID: {}", port.guid),
        format!("\t\tLink layer: {}", port.link_layer),
    ]
}

fn render_ibstat_ca(hca: &Hca, port: Option<u32>) -> Vec<String> {
    let mut lines = vec![
        format!("CA '{}'", hca.name),
        format!("\tCA type: {}", hca.ca_type),
        format!("\tNumber of ports: {}", hca.ports.len()),
        format!("\tFirmware version: {}", hca.firmware_version),
        "\tHardware version: 0".to_string(),
        format!("\tNode GUID: {}", hca.node_guid),
        format!("\tSystem image GUID: {}", hca.node_guid),
    ];
    for p in hca.ports.iter().filter(|p| port_selected(port, p.number)) {
        lines.extend(render_ibstat_port(p));
    }
    lines
}

fn ibstat(node: &Node, parsed: &ParsedCommand) -> CommandResult {
    if parsed.has_any_flag(&["l", "list_of_cas"]) {
        return CommandResult::ok(
            node.hcas
                .iter()
                .map(|h| h.name.clone())
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
    if parsed.has_any_flag(&["p", "port_list"]) {
        return CommandResult::ok(
            node.hcas
                .iter()
                .flat_map(|h| h.ports.iter().map(|p| p.guid.clone()))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }

    let args: Vec<&str> = parsed.args().collect();
    let port = args.get(1).and_then(|p| parse_number::<u32>(p));
    let hcas: Vec<&Hca> = match args.first() {
        Some(name) => match find_hca(node, name, "ibstat") {
            Ok(hca) => vec![hca],
            Err(err) => return err,
        },
        None => node.hcas.iter().collect(),
    };
    if let (Some(hca), Some(number)) = (hcas.first(), port) {
        if hca.port(number).is_none() {
            return CommandResult::error(
                EXIT_IBPANIC,
                format!("ibpanic: [ibstat] main: '{}' port {number} not found", hca.name),
            );
        }
    }

    let short = parsed.has_any_flag(&["s", "short"]);
    let blocks: Vec<String> = hcas
        .iter()
        .map(|hca| {
            if short {
                let ports: Vec<String> = hca
                    .ports
                    .iter()
                    .map(|p| format!("\tport {}: {}", p.number, p.state))
                    .collect();
                format!("CA: '{}':\n{}", hca.name, ports.join("\n"))
            } else {
                render_ibstat_ca(hca, port).join("\n")
            }
        })
        .collect();
    CommandResult::ok(blocks.join("\n"))
}

fn ibstatus(node: &Node, parsed: &ParsedCommand) -> CommandResult {
    let mut targets: Vec<(&Hca, Option<u32>)> = Vec::new();
    for arg in parsed.args() {
        let (name, port) = match arg.split_once(':') {
            Some((name, port)) => (name, parse_number::<u32>(port)),
            None => (arg, None),
        };
        match node.hca(name) {
            Some(hca) => targets.push((hca, port)),
            None => {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    format!("Fatal error:  device '{name}': sys files not found (/sys/class/infiniband/{name}/ports)"),
                )
            }
        }
    }
    if targets.is_empty() {
        targets = node.hcas.iter().map(|h| (h, None)).collect();
    }

    let mut blocks = Vec::new();
    for (hca, port) in targets {
        for p in hca.ports.iter().filter(|p| port_selected(port, p.number)) {
            let (state_code, state_name) = port_state_code(p.state);
            let rate = effective_rate(p);
            let guid = p.guid.trim_start_matches("0x");
            blocks.push(
                [
                    format!("Infiniband device '{}' port {} status:", hca.name, p.number),
                    format!(
                        "\tdefault gid:\t fe80:0000:0000:0000:{}:{}:{}:{}",
                        &guid[0..4],
                        &guid[4..8],
                        &guid[8..12],
                        &guid[12..16]
                    ),
                    format!("\tbase lid:\t 0x{:x}", p.lid),
                    format!("\tsm lid:\t\t 0x{:x}", p.sm_lid),
                    format!("\tstate:\t\t {state_code}: {state_name}"),
                    format!(
                        "\tphys state:\t {}: {}",
                        phys_state_code(p.physical_state),
                        p.physical_state
                    ),
                    format!("\trate:\t\t {rate} Gb/sec (4X {})", speed_name(rate)),
                    format!("\tlink_layer:\t {}", p.link_layer),
                ]
                .join("\n"),
            );
        }
    }
    CommandResult::ok(blocks.join("\n\n"))
}

fn iblinkinfo(cluster: &ClusterConfig, parsed: &ParsedCommand) -> CommandResult {
    let down_only = parsed.has_any_flag(&["d", "down"]);
    let rails = cluster.nodes.iter().map(|n| n.hcas.len()).max().unwrap_or(0);
    let mut lines = Vec::new();
    for rail in 0..rails {
        let mut links = Vec::new();
        let mut switch_port = 1;
        for node in &cluster.nodes {
            for hca in node.hcas.iter().filter(|h| rail_of(h) == rail) {
                for port in &hca.ports {
                    let peer = format!("\"{} {}\"", node.hostname, hca.name);
                    let link = if port.is_up() {
                        format!(
                            "{:>5} {:>4}[  ] ==( 4X {:>10} Gbps {:>7}/{:>8})==> {:>6} {:>4}[  ] {peer} ( )",
                            switch_lid(rail),
                            switch_port,
                            lane_speed(port.rate_gbps),
                            port.state.to_string(),
                            port.physical_state.to_string(),
                            port.lid,
                            port.number
                        )
                    } else {
                        format!(
                            "{:>5} {:>4}[  ] ==( {:>19} {:>4}/{:>8})==> {:>6} {:>4}[  ] {peer} ( )",
                            switch_lid(rail),
                            switch_port,
                            "",
                            port.state.to_string(),
                            port.physical_state.to_string(),
                            "",
                            ""
                        )
                    };
                    if !down_only || !port.is_up() {
                        links.push(link);
                    }
                    switch_port += 1;
                }
            }
        }
        if down_only && links.is_empty() {
            continue;
        }
        lines.push(format!(
            "Switch: {} {}/leaf-rail{}:",
            switch_guid(rail),
            SWITCH_MODEL,
            rail
        ));
        lines.extend(links);
    }
    CommandResult::ok(lines.join("\n"))
}

fn counter_line(name: &str, value: impl std::fmt::Display) -> String {
    format!("{:.<33}{value}", format!("{name}:"))
}

fn render_counters(port: &IbPort, extended: bool) -> String {
    let e = &port.errors;
    let mut lines = vec![
        format!(
            "# Port {}counters: Lid {} port {} (CapMask: 0x5A00)",
            if extended { "extended " } else { "" },
            port.lid,
            port.number
        ),
        counter_line("PortSelect", port.number),
        counter_line("CounterSelect", "0x0000"),
    ];
    if !extended {
        lines.extend([
            counter_line("SymbolErrorCounter", e.symbol_errors),
            counter_line("LinkErrorRecoveryCounter", e.link_error_recovery),
            counter_line("LinkDownedCounter", e.link_downed),
            counter_line("PortRcvErrors", e.port_rcv_errors),
            counter_line("PortRcvRemotePhysicalErrors", 0),
            counter_line("PortRcvSwitchRelayErrors", 0),
            counter_line("PortXmitDiscards", e.port_xmit_discards),
            counter_line("PortXmitConstraintErrors", 0),
            counter_line("PortRcvConstraintErrors", 0),
            counter_line("CounterSelect2", "0x00"),
            counter_line("LocalLinkIntegrityErrors", 0),
            counter_line("ExcessiveBufferOverrunErrors", 0),
            counter_line("VL15Dropped", 0),
        ]);
    }
    // Traffic counters scale with the port number so repeated reads agree
    let traffic = if port.is_up() { 4_096_000_000u64 * u64::from(port.number) } else { 0 };
    lines.extend([
        counter_line("PortXmitData", traffic),
        counter_line("PortRcvData", traffic),
        counter_line("PortXmitPkts", traffic / 1024),
        counter_line("PortRcvPkts", traffic / 1024),
        counter_line("PortXmitWait", e.port_xmit_wait),
    ]);
    lines.join("\n")
}

/// Locate a port either by `-C ca -P port` or by `<lid> [port]`.
fn locate_port(
    cluster: &ClusterConfig,
    local: Option<&Node>,
    parsed: &ParsedCommand,
    tool: &str,
) -> Result<(String, String, u32), CommandResult> {
    let args: Vec<&str> = parsed.args().collect();
    if let Some(lid) = args.first().and_then(|a| parse_number::<u32>(a)) {
        let port_number = args.get(1).and_then(|p| parse_number::<u32>(p)).unwrap_or(1);
        for node in &cluster.nodes {
            for hca in &node.hcas {
                if hca.ports.iter().any(|p| p.lid == lid && p.number == port_number) {
                    return Ok((node.hostname.clone(), hca.name.clone(), port_number));
                }
            }
        }
        return Err(CommandResult::error(
            EXIT_IBPANIC,
            format!("ibwarn: [{tool}] mad_rpc: _do_madrpc failed; dport (Lid {lid})\nibpanic: [{tool}] main: query failed"),
        ));
    }

    let Some(node) = local else {
        return Err(CommandResult::error(
            EXIT_IBPANIC,
            format!("ibpanic: [{tool}] main: can't open UMAD port ((null):0)"),
        ));
    };
    let ca = parsed.flag_value_any(&["C", "Ca"]).unwrap_or("mlx5_0");
    let hca = find_hca(node, ca, tool)?;
    let port_number = parsed
        .flag_value_any(&["P", "Port"])
        .and_then(parse_number::<u32>)
        .unwrap_or(1);
    if hca.port(port_number).is_none() {
        return Err(CommandResult::error(
            EXIT_IBPANIC,
            format!("ibpanic: [{tool}] main: can't open UMAD port ({ca}:{port_number})"),
        ));
    }
    Ok((node.hostname.clone(), hca.name.clone(), port_number))
}

fn lookup_port<'a>(cluster: &'a ClusterConfig, node: &str, hca: &str, port: u32) -> Option<&'a IbPort> {
    cluster.node(node)?.hca(hca)?.port(port)
}

impl InfinibandSimulator {
    fn perfquery(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let local = ctx.state.node(&ctx.current_node);
        let (node, hca, number) = match locate_port(ctx.state.cluster(), local, parsed, "perfquery") {
            Ok(found) => found,
            Err(err) => return err,
        };
        let Some(port) = lookup_port(ctx.state.cluster(), &node, &hca, number) else {
            return CommandResult::error(EXIT_IBPANIC, "ibpanic: [perfquery] main: query failed");
        };
        let output = render_counters(port, parsed.has_any_flag(&["x", "extended"]));

        if parsed.has_any_flag(&["r", "reset_after_read", "R", "Reset_only"]) {
            let update = HcaUpdate {
                port: Some(PortUpdate {
                    number,
                    errors: Some(PortErrors::default()),
                    ..Default::default()
                }),
                ..Default::default()
            };
            if let Err(err) = ctx.state.update_hca(&node, &hca, update) {
                return state_error("perfquery", &err);
            }
            if parsed.has_any_flag(&["R", "Reset_only"]) {
                return CommandResult::ok("");
            }
        }
        CommandResult::ok(output)
    }

    fn ibportstate(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let args: Vec<&str> = parsed.args().collect();
        if args.len() < 2 {
            return CommandResult::usage(
                "Usage: ibportstate [options] <dest dr_path|lid|guid> <portnum> [<op>]\nSupported ops: enable, disable, reset, query",
            );
        }
        let local = ctx.state.node(&ctx.current_node);
        let (node, hca, number) = match locate_port(ctx.state.cluster(), local, parsed, "ibportstate") {
            Ok(found) => found,
            Err(err) => return err,
        };
        let op = args.get(2).copied().unwrap_or("query");
        let (state, physical_state) = match op {
            "query" => (None, None),
            "enable" | "reset" => (Some(PortState::Active), Some(PhysicalState::LinkUp)),
            "disable" => (Some(PortState::Down), Some(PhysicalState::Disabled)),
            other => {
                return CommandResult::usage(format!(
                    "ibpanic: [ibportstate] main: invalid operation '{other}'"
                ))
            }
        };
        if state.is_some() {
            let update = HcaUpdate {
                port: Some(PortUpdate {
                    number,
                    state,
                    physical_state,
                    ..Default::default()
                }),
                ..Default::default()
            };
            if let Err(err) = ctx.state.update_hca(&node, &hca, update) {
                return state_error("ibportstate", &err);
            }
        }

        let Some(port) = lookup_port(ctx.state.cluster(), &node, &hca, number) else {
            return CommandResult::error(EXIT_IBPANIC, "ibpanic: [ibportstate] main: query failed");
        };
        let rate = effective_rate(port);
        let lines = [
            format!("CA/RT PortInfo:\n# Port info: Lid {} port {}", port.lid, port.number),
            counter_line("LinkState", port.state),
            counter_line("PhysLinkState", port.physical_state),
            counter_line("Lid", port.lid),
            counter_line("SMLid", port.sm_lid),
            counter_line("LinkSpeedActive", format!("{} Gbps", lane_speed(rate))),
            counter_line("LinkWidthActive", "4X"),
        ];
        CommandResult::ok(lines.join("\n"))
    }
}

struct FabricIssue {
    severity: &'static str,
    text: String,
}

fn fabric_issues(cluster: &ClusterConfig) -> Vec<FabricIssue> {
    let mut issues = Vec::new();
    for node in &cluster.nodes {
        for hca in &node.hcas {
            for port in &hca.ports {
                let location = format!("{}/{}/P{}", node.hostname, hca.name, port.number);
                if !port.is_up() {
                    issues.push(FabricIssue {
                        severity: "-E-",
                        text: format!(
                            "Link is down: {location} (state {}, phys {})",
                            port.state, port.physical_state
                        ),
                    });
                } else if port.rate_gbps < node_expected_rate(node) {
                    issues.push(FabricIssue {
                        severity: "-W-",
                        text: format!(
                            "Link speed degraded: {location} running {} Gb/s",
                            port.rate_gbps
                        ),
                    });
                }
                let e = &port.errors;
                // Counters at or below their threshold only warn
                for (name, value, threshold) in [
                    ("symbol_error_counter", e.symbol_errors, SimConfig::SYMBOL_ERROR_THRESHOLD),
                    ("link_error_recovery_counter", e.link_error_recovery, 0),
                    ("link_downed_counter", e.link_downed, SimConfig::LINK_DOWNED_THRESHOLD),
                    ("port_rcv_errors", e.port_rcv_errors, 0),
                    ("port_xmit_discards", e.port_xmit_discards, 0),
                ] {
                    if value == 0 {
                        continue;
                    }
                    issues.push(FabricIssue {
                        severity: if value > threshold { "-E-" } else { "-W-" },
                        text: format!("{location}: {name} value={value} (threshold={threshold})"),
                    });
                }
            }
        }
    }
    issues
}

fn node_expected_rate(node: &Node) -> u32 {
    node.hcas
        .iter()
        .flat_map(|h| h.ports.iter())
        .map(|p| p.rate_gbps)
        .max()
        .unwrap_or(0)
}

fn ibdiagnet(cluster: &ClusterConfig) -> CommandResult {
    let rails = cluster.nodes.iter().map(|n| n.hcas.len()).max().unwrap_or(0);
    let cas: usize = cluster.nodes.iter().map(|n| n.hcas.len()).sum();
    let links: usize = cluster
        .nodes
        .iter()
        .flat_map(|n| n.hcas.iter())
        .flat_map(|h| h.ports.iter())
        .filter(|p| p.is_up())
        .count();
    let issues = fabric_issues(cluster);
    let errors = issues.iter().filter(|i| i.severity == "-E-").count();
    let warnings = issues.len() - errors;

    let mut lines = vec![
        format!("Running ibdiagnet (version {MLNX_OFED_VERSION})"),
        String::new(),
        "Load Plugins from:".to_string(),
        "/usr/share/ibdiagnet2.1.1/plugins/".to_string(),
        String::new(),
        "Discovery".to_string(),
        format!("-I- Discovering ... {} nodes ({rails} Switches & {cas} CA-s) discovered.", rails + cas),
        "-I- Fabric Discover finished successfully".to_string(),
        String::new(),
        "Lids Check".to_string(),
        "-I- Lids Check finished successfully".to_string(),
        String::new(),
        "Links Check".to_string(),
        format!("-I- {links} links checked"),
    ];
    for issue in &issues {
        lines.push(format!("{} {}", issue.severity, issue.text));
    }
    lines.extend([
        String::new(),
        "Summary".to_string(),
        "-I- Stage                     Warnings   Errors     Comment".to_string(),
        "-I- Discovery                 0          0".to_string(),
        format!("-I- Links Check               {warnings:<10} {errors:<10}"),
        String::new(),
        "-I- You can find detailed errors/warnings in: /var/tmp/ibdiagnet2/ibdiagnet2.log".to_string(),
    ]);
    CommandResult::ok(lines.join("\n"))
}

fn ibnetdiscover(cluster: &ClusterConfig) -> CommandResult {
    let rails = cluster.nodes.iter().map(|n| n.hcas.len()).max().unwrap_or(0);
    let mut lines = vec![
        "#".to_string(),
        "# Topology file: generated by ibnetdiscover".to_string(),
        "#".to_string(),
    ];
    for rail in 0..rails {
        let guid = switch_guid(rail);
        lines.push(String::new());
        lines.push(format!("vendid=0x2c9\ndevid=0xd2f2\nsysimgguid={guid}\nswitchguid={guid}({guid})"));
        lines.push(format!(
            "Switch\t{SWITCH_PORTS} \"S-{}\"\t\t# \"{SWITCH_MODEL}/leaf-rail{rail}\" enhanced port 0 lid {} lmc 0",
            guid.trim_start_matches("0x"),
            switch_lid(rail)
        ));
        let mut switch_port = 1;
        for node in &cluster.nodes {
            for hca in node.hcas.iter().filter(|h| rail_of(h) == rail) {
                for port in hca.ports.iter().filter(|p| p.is_up()) {
                    lines.push(format!(
                        "[{switch_port}]\t\"H-{}\"[{}]({})\t\t# \"{} {}\" lid {} 4x{}",
                        hca.node_guid.trim_start_matches("0x"),
                        port.number,
                        port.guid.trim_start_matches("0x"),
                        node.hostname,
                        hca.name,
                        port.lid,
                        speed_name(port.rate_gbps)
                    ));
                    switch_port += 1;
                }
            }
        }
    }
    for node in &cluster.nodes {
        for hca in &node.hcas {
            let guid = hca.node_guid.trim_start_matches("0x");
            lines.push(String::new());
            lines.push(format!("vendid=0x2c9\ndevid=0x1021\nsysimgguid={}\ncaguid={}", hca.node_guid, hca.node_guid));
            lines.push(format!(
                "Ca\t{}ptr \"H-{guid}\"\t\t# \"{} {}\"",
                hca.ports.len(),
                node.hostname,
                hca.name
            ));
            for port in hca.ports.iter().filter(|p| p.is_up()) {
                lines.push(format!(
                    "[{}]({})\t\"S-{}\"[{}]\t\t# lid {} lmc 0 \"{SWITCH_MODEL}/leaf-rail{}\" lid {} 4x{}",
                    port.number,
                    port.guid.trim_start_matches("0x"),
                    switch_guid(rail_of(hca)).trim_start_matches("0x"),
                    port.number,
                    port.lid,
                    rail_of(hca),
                    switch_lid(rail_of(hca)),
                    speed_name(port.rate_gbps)
                ));
            }
        }
    }
    CommandResult::ok(lines.join("\n"))
}

impl Simulator for InfinibandSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "infiniband",
            version: MLNX_OFED_VERSION,
            description: "InfiniBand fabric diagnostics (infiniband-diags)",
            commands: &[
                "ibstat",
                "ibstatus",
                "iblinkinfo",
                "perfquery",
                "ibdiagnet",
                "ibnetdiscover",
                "ibportstate",
            ],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let usage = format!(
            "Usage: {} [options] [<args>]\nSee the {} man page for details.",
            parsed.base_command, parsed.base_command
        );
        if parsed.has_flag("V") {
            return CommandResult::ok(format!(
                "{} BUILD VERSION: {MLNX_OFED_VERSION}",
                parsed.base_command
            ));
        }
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), &usage, true) {
            return result;
        }
        if matches!(parsed.base_command.as_str(), "iblinkinfo" | "ibdiagnet" | "ibnetdiscover") {
            if let Some(result) = reject_operand(parsed) {
                return result;
            }
        }

        match parsed.base_command.as_str() {
            "ibstat" | "ibstatus" => {
                let node = match local_node(ctx, &parsed.base_command) {
                    Ok(node) => node,
                    Err(err) => return err,
                };
                if parsed.base_command == "ibstat" {
                    ibstat(node, parsed)
                } else {
                    ibstatus(node, parsed)
                }
            }
            "iblinkinfo" => iblinkinfo(ctx.state.cluster(), parsed),
            "perfquery" => self.perfquery(parsed, ctx),
            "ibportstate" => self.ibportstate(parsed, ctx),
            "ibdiagnet" => ibdiagnet(ctx.state.cluster()),
            "ibnetdiscover" => ibnetdiscover(ctx.state.cluster()),
            other => CommandResult::error(
                SimConfig::EXIT_COMMAND_NOT_FOUND,
                format!("{other}: command not found"),
            ),
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
        let mut ctx = CommandContext::new(store, "dgx-01");
        InfinibandSimulator::new().execute(&parse(line), &mut ctx)
    }

    fn take_port_down(store: &mut ClusterStore) {
        store
            .update_hca(
                "dgx-01",
                "mlx5_2",
                HcaUpdate {
                    port: Some(PortUpdate {
                        number: 1,
                        state: Some(PortState::Down),
                        physical_state: Some(PhysicalState::Disabled),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    #[test]
    fn test_ibstat_lists_every_ca() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "ibstat");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output.matches("CA '").count(), 8);
        assert!(result.output.contains("State: Active"));
        assert!(!result.output.contains("Down"));

        let listed = run(&mut store, "ibstat -l");
        assert_eq!(listed.output.lines().count(), 8);
    }

    #[test]
    fn test_ibstat_unknown_device() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "ibstat mlx5_9");
        assert_eq!(result.exit_code, EXIT_IBPANIC);
        assert!(result.output.contains("can't be found"));
    }

    #[test]
    fn test_down_port_is_reported() {
        let mut store = ClusterStore::default();
        take_port_down(&mut store);

        let ibstat = run(&mut store, "ibstat mlx5_2");
        assert!(ibstat.output.contains("State: Down"));
        assert!(ibstat.output.contains("Physical state: Disabled"));

        let ibstatus = run(&mut store, "ibstatus mlx5_2");
        assert!(ibstatus.output.contains("1: DOWN"));

        let diag = run(&mut store, "ibdiagnet");
        assert!(diag.output.contains("-E- Link is down: dgx-01/mlx5_2/P1"));

        let links = run(&mut store, "iblinkinfo -d");
        assert!(links.output.contains("\"dgx-01 mlx5_2\""));
        assert!(!links.output.contains("\"dgx-02 mlx5_2\""));
    }

    #[test]
    fn test_perfquery_reset_clears_counters() {
        let mut store = ClusterStore::default();
        store
            .update_hca(
                "dgx-01",
                "mlx5_0",
                HcaUpdate {
                    port: Some(PortUpdate {
                        number: 1,
                        errors: Some(PortErrors {
                            symbol_errors: 42,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        let first = run(&mut store, "perfquery -r");
        assert!(first.output.contains("SymbolErrorCounter:..............42"));
        let second = run(&mut store, "perfquery");
        assert!(second.output.contains("SymbolErrorCounter:..............0"));
    }

    #[test]
    fn test_ibportstate_disable_and_enable() {
        let mut store = ClusterStore::default();
        let lid = store.node("dgx-02").unwrap().hcas[0].ports[0].lid;

        let disabled = run(&mut store, &format!("ibportstate {lid} 1 disable"));
        assert_eq!(disabled.exit_code, 0, "{}", disabled.output);
        assert!(!store.node("dgx-02").unwrap().hcas[0].ports[0].is_up());

        run(&mut store, &format!("ibportstate {lid} 1 enable"));
        assert!(store.node("dgx-02").unwrap().hcas[0].ports[0].is_up());
    }
}
