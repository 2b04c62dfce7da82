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

//! Mellanox firmware tools (MFT): `mst`, `mlxconfig`, `mlxlink` and `flint`.

use std::collections::BTreeMap;

use crate::common::config::SimConfig;
use crate::parsing::common::parse_number;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, local_node, state_error};
use crate::state::constants::MFT_VERSION;
use crate::state::types::{Hca, IbPort, Node, PhysicalState, PortState};
use crate::state::{HcaUpdate, PortUpdate};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};

/// A device as exposed under `/dev/mst`.
#[derive(Debug, Clone)]
struct MstDevice {
    path: String,
    /// RDMA device name (`mlx5_N`)
    rdma: String,
    pci_address: String,
    model: String,
    firmware_version: String,
    psid: String,
    firmware_config: BTreeMap<String, String>,
    is_dpu: bool,
}

impl MstDevice {
    fn matches(&self, name: &str) -> bool {
        let short_pci = self.pci_address.trim_start_matches("0000:");
        name == self.path
            || name == self.rdma
            || name == self.pci_address
            || name == short_pci
            || self.path.ends_with(&format!("/{name}"))
    }
}

fn mst_devices(node: &Node) -> Vec<MstDevice> {
    let mut devices = Vec::new();
    let mut per_type: Vec<(String, usize)> = Vec::new();
    let mut next_index = |ca_type: &str| -> usize {
        match per_type.iter_mut().find(|(t, _)| t == ca_type) {
            Some((_, n)) => {
                *n += 1;
                *n
            }
            None => {
                per_type.push((ca_type.to_string(), 0));
                0
            }
        }
    };
    for hca in &node.hcas {
        let index = next_index(&hca.ca_type);
        devices.push(MstDevice {
            path: format!("/dev/mst/{}_pciconf{index}", hca.ca_type.to_ascii_lowercase()),
            rdma: hca.name.clone(),
            pci_address: hca.pci_address.clone(),
            model: hca.model.clone(),
            firmware_version: hca.firmware_version.clone(),
            psid: hca.psid.clone(),
            firmware_config: hca.firmware_config.clone(),
            is_dpu: false,
        });
    }
    for dpu in &node.dpus {
        let index = next_index(&dpu.ca_type);
        devices.push(MstDevice {
            path: format!("/dev/mst/{}_pciconf{index}", dpu.ca_type.to_ascii_lowercase()),
            rdma: dpu.name.clone(),
            pci_address: dpu.pci_address.clone(),
            model: dpu.model.clone(),
            firmware_version: dpu.firmware_version.clone(),
            psid: format!("MT_{:010}", 1000 + dpu.id),
            firmware_config: dpu.firmware_config.clone(),
            is_dpu: true,
        });
    }
    devices
}

fn require_device(node: &Node, parsed: &ParsedCommand, tool: &str) -> Result<MstDevice, CommandResult> {
    let Some(name) = parsed.flag_value_any(&["d", "dev", "device"]) else {
        return Err(CommandResult::error(
            SimConfig::EXIT_FAILURE,
            format!("-E- {tool}: missing device argument (-d <device>)\nSee '{tool} -h' for usage."),
        ));
    };
    mst_devices(node)
        .into_iter()
        .find(|d| d.matches(name))
        .ok_or_else(|| {
            CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("-E- Failed to open the device: {name}\n-E- MST driver not loaded or device does not exist"),
            )
        })
}

/// Port 1 of the HCA backing `device`, if it is an HCA.
fn device_port<'a>(node: &'a Node, device: &MstDevice) -> Option<(&'a Hca, &'a IbPort)> {
    let hca = node.hca(&device.rdma)?;
    Some((hca, hca.ports.first()?))
}

pub struct MellanoxSimulator;

impl MellanoxSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MellanoxSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn mst(node: &Node, parsed: &ParsedCommand) -> CommandResult {
    match parsed.subcommand(0) {
        Some("start") => CommandResult::ok(
            "Starting MST (Mellanox Software Tools) driver set\nLoading MST PCI module - Success\nLoading MST PCI configuration module - Success\nCreate devices",
        ),
        Some("stop") => CommandResult::ok(
            "Stopping MST (Mellanox Software Tools) driver set\nUnloading MST PCI module - Success",
        ),
        Some("restart") => CommandResult::ok(
            "Stopping MST (Mellanox Software Tools) driver set\nStarting MST (Mellanox Software Tools) driver set\nCreate devices",
        ),
        Some("status") => {
            let devices = mst_devices(node);
            let mut lines = vec![
                "MST modules:".to_string(),
                "------------".to_string(),
                "    MST PCI module is not loaded".to_string(),
                "    MST PCI configuration module loaded".to_string(),
                String::new(),
            ];
            if parsed.has_flag("v") {
                lines.push(format!(
                    "{:<22}{:<36}{:<14}{:<12}{:<8}{}",
                    "DEVICE_TYPE", "MST", "PCI", "RDMA", "NET", "NUMA"
                ));
                for (i, d) in devices.iter().enumerate() {
                    let family = d.model.replace('-', "");
                    lines.push(format!(
                        "{:<22}{:<36}{:<14}{:<12}{:<8}{}",
                        format!("{family}({})", d.psid),
                        d.path,
                        d.pci_address.trim_start_matches("0000:"),
                        d.rdma,
                        format!("net-ib{i}"),
                        if i < devices.len() / 2 { 0 } else { 1 }
                    ));
                }
            } else {
                lines.push("MST devices:".to_string());
                lines.push("------------".to_string());
                for d in &devices {
                    lines.push(format!("{:<30}- PCI configuration cycles access.", d.path));
                    lines.push(format!(
                        "                           domain:bus:dev.fn={} addr.reg=88 data.reg=92 cr_bar.gw_offset=-1",
                        d.pci_address
                    ));
                    lines.push("                           Chip revision is: 00".to_string());
                }
            }
            CommandResult::ok(lines.join("\n"))
        }
        Some(other) => CommandResult::usage(format!(
            "-E- Unknown argument \"{other}\"\nUsage: mst {{start|stop|restart|status [-v]}}"
        )),
        None => CommandResult::usage("Usage: mst {start|stop|restart|status [-v]}"),
    }
}

const BOOL_CHOICES: &[(&str, u32)] = &[("False", 0), ("True", 1)];

/// Named values of enumerated parameters.
const CONFIG_CHOICES: &[(&str, &[(&str, u32)])] = &[
    ("SRIOV_EN", BOOL_CHOICES),
    ("ADVANCED_PCI_SETTINGS", BOOL_CHOICES),
    ("ATS_ENABLED", BOOL_CHOICES),
    ("LINK_TYPE_P1", &[("IB", 1), ("ETH", 2)]),
    ("INTERNAL_CPU_MODEL", &[("SEPARATED_HOST", 0), ("EMBEDDED_CPU", 1)]),
    ("INTERNAL_CPU_OFFLOAD_ENGINE", &[("ENABLED", 0), ("DISABLED", 1)]),
];

/// Next-boot configuration shown by `mlxconfig q`: defaults overlaid with
/// whatever has been set on the device.
fn config_items(device: &MstDevice) -> Vec<(&'static str, String)> {
    let mut items = vec![
        ("MEMIC_BAR_SIZE", "0".to_string()),
        ("NUM_OF_VFS", "0".to_string()),
        ("SRIOV_EN", "False(0)".to_string()),
        ("PF_LOG_BAR_SIZE", "5".to_string()),
        ("ADVANCED_PCI_SETTINGS", "False(0)".to_string()),
        ("LINK_TYPE_P1", "IB(1)".to_string()),
        ("ROCE_CC_PRIO_MASK_P1", "255".to_string()),
        ("ATS_ENABLED", "False(0)".to_string()),
    ];
    if device.is_dpu {
        items.push(("INTERNAL_CPU_MODEL", "EMBEDDED_CPU(1)".to_string()));
        items.push(("INTERNAL_CPU_OFFLOAD_ENGINE", "ENABLED(0)".to_string()));
    }
    for (key, value) in &mut items {
        if let Some(stored) = device.firmware_config.get(*key) {
            value.clone_from(stored);
        }
    }
    items
}

/// Canonical form of a value given on the command line (`1`, `true`, `ETH`).
fn config_value(key: &str, raw: &str) -> Option<String> {
    match CONFIG_CHOICES.iter().find(|(k, _)| *k == key) {
        Some((_, choices)) => {
            let number = parse_number::<u32>(raw);
            choices
                .iter()
                .find(|(name, n)| name.eq_ignore_ascii_case(raw) || number == Some(*n))
                .map(|(name, n)| format!("{name}({n})"))
        }
        None => parse_number::<u64>(raw).map(|n| n.to_string()),
    }
}

fn mlxconfig(parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
    let node = match local_node(ctx, "mlxconfig") {
        Ok(n) => n,
        Err(err) => return err,
    };
    let hostname = node.hostname.clone();
    let device = match require_device(node, parsed, "mlxconfig") {
        Ok(d) => d,
        Err(err) => return err,
    };
    let header = [
        String::new(),
        "Device #1:".to_string(),
        "----------".to_string(),
        String::new(),
        format!("Device type:        {}", device.model.replace('-', "")),
        format!("Name:               {}", device.psid),
        format!("Device:             {}", device.path),
        String::new(),
    ];
    let confirmed = parsed.has_any_flag(&["y", "yes"]);
    let mut args: Vec<&str> = parsed.flag_value("y").into_iter().collect();
    args.extend(parsed.args());
    match args.first().copied() {
        Some("q" | "query") => {
            let mut lines = header.to_vec();
            lines.push(format!("{:<40}{}", "Configurations:", "Next Boot"));
            let items = config_items(&device);
            let wanted = &args[1..];
            for (key, value) in items
                .iter()
                .filter(|(k, _)| wanted.is_empty() || wanted.iter().any(|w| w.eq_ignore_ascii_case(k)))
            {
                lines.push(format!("        {key:<36}{value}"));
            }
            CommandResult::ok(lines.join("\n"))
        }
        Some("set" | "s") => {
            let items = config_items(&device);
            let mut config = device.firmware_config.clone();
            let mut lines = header.to_vec();
            lines.push(format!(
                "{:<40}{:<20}{}",
                "Configurations:", "Next Boot", "New"
            ));
            for assignment in &args[1..] {
                let Some((key, raw)) = assignment.split_once('=') else {
                    return CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("-E- Failed to parse parameter: {assignment}"),
                    );
                };
                let Some((name, current)) = items.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)) else {
                    return CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("-E- The Device doesn't support {key} parameter"),
                    );
                };
                let Some(value) = config_value(name, raw) else {
                    return CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("-E- Bad value \"{raw}\" for parameter {name}"),
                    );
                };
                lines.push(format!("        {name:<32}{current:<20}{value}"));
                config.insert(name.to_string(), value);
            }
            if !confirmed {
                lines.push(String::new());
                lines.push("Apply new Configuration? (y/n) [n] : n".to_string());
                lines.push("Aborted by user".to_string());
                return CommandResult::error(SimConfig::EXIT_FAILURE, lines.join("\n"));
            }
            if let Err(err) = ctx.state.set_firmware_config(&hostname, &device.rdma, config) {
                return state_error("mlxconfig", &err);
            }
            lines.push(String::new());
            lines.push("Apply new Configuration? (y/n) [n] : y".to_string());
            lines.push("Applying... Done!".to_string());
            lines.push("-I- Please reboot machine to load new configurations.".to_string());
            CommandResult::ok(lines.join("\n"))
        }
        Some("reset" | "r") => {
            if !confirmed {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    "Reset configuration for device to default values? (y/n) [n] : n\nAborted by user",
                );
            }
            if let Err(err) = ctx.state.set_firmware_config(&hostname, &device.rdma, BTreeMap::new()) {
                return state_error("mlxconfig", &err);
            }
            CommandResult::ok(
                "Reset configuration for device to default values? (y/n) [n] : y\nApplying... Done!\n-I- Please reboot machine to load new configurations.",
            )
        }
        Some(other) => CommandResult::error(
            SimConfig::EXIT_FAILURE,
            format!("-E- Unknown command \"{other}\""),
        ),
        None => CommandResult::error(
            SimConfig::EXIT_FAILURE,
            "-E- Please specify a command (query, set, reset)",
        ),
    }
}

fn speed_label(rate_gbps: u32) -> &'static str {
    match rate_gbps {
        r if r >= 800 => "IB-XDR",
        r if r >= 400 => "IB-NDR",
        r if r >= 200 => "IB-HDR",
        r if r >= 100 => "IB-EDR",
        _ => "IB-SDR",
    }
}

fn mlxlink_section(title: &str, rows: &[(&str, String)]) -> Vec<String> {
    let mut lines = vec![
        title.to_string(),
        "-".repeat(title.len()),
    ];
    lines.extend(rows.iter().map(|(k, v)| format!("{k:<40}: {v}")));
    lines.push(String::new());
    lines
}

fn render_mlxlink(device: &MstDevice, port: &IbPort, counters: bool) -> String {
    let up = port.is_up();
    let (state, physical) = if up {
        ("Active".to_string(), "LinkUp".to_string())
    } else {
        (port.state.to_string(), port.physical_state.to_string())
    };
    let mut lines = mlxlink_section(
        "Operational Info",
        &[
            ("State", state),
            ("Physical state", physical),
            ("Speed", if up { speed_label(port.rate_gbps).to_string() } else { "N/A".to_string() }),
            ("Width", if up { "4x".to_string() } else { "N/A".to_string() }),
            ("FEC", if up { "Standard_RS-FEC - (544,514)".to_string() } else { "N/A".to_string() }),
            ("Loopback Mode", "No Loopback".to_string()),
            ("Auto Negotiation", "ON".to_string()),
        ],
    );
    lines.extend(mlxlink_section(
        "Supported Info",
        &[
            ("Enabled Link Speed", format!("0x000000f0 ({})", speed_label(port.rate_gbps))),
            ("Supported Cable Speed", format!("0x000000f0 ({})", speed_label(port.rate_gbps))),
        ],
    ));

    let (opcode, recommendation) = if !up {
        ("1024", "Cable is unplugged or the port was administratively disabled")
    } else if port.errors.total() > 0 {
        ("3", "Check the cable and the transceiver, physical errors were observed")
    } else {
        ("0", "No issue was observed")
    };
    lines.extend(mlxlink_section(
        "Troubleshooting Info",
        &[
            ("Status Opcode", opcode.to_string()),
            ("Group Opcode", "N/A".to_string()),
            ("Recommendation", recommendation.to_string()),
        ],
    ));
    lines.extend(mlxlink_section(
        "Tool Information",
        &[
            ("Firmware Version", device.firmware_version.clone()),
            ("MFT Version", format!("mft {MFT_VERSION}")),
        ],
    ));

    if counters {
        let e = &port.errors;
        let raw_ber = if e.symbol_errors > 0 { "1E-8" } else { "15E-255" };
        lines.extend(mlxlink_section(
            "Physical Counters and BER Info",
            &[
                ("Time Since Last Clear [Min]", "1440.0".to_string()),
                ("Effective Physical Errors", e.symbol_errors.to_string()),
                ("Effective Physical BER", if e.symbol_errors > 0 { "1E-12" } else { "15E-255" }.to_string()),
                ("Raw Physical BER", raw_ber.to_string()),
                ("Link Down Counter", e.link_downed.to_string()),
                ("Link Error Recovery Counter", e.link_error_recovery.to_string()),
            ],
        ));
    }
    lines.join("\n").trim_end().to_string()
}

impl MellanoxSimulator {
    fn mlxlink(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let node = match local_node(ctx, "mlxlink") {
            Ok(n) => n,
            Err(err) => return err,
        };
        let hostname = node.hostname.clone();
        let device = match require_device(node, parsed, "mlxlink") {
            Ok(d) => d,
            Err(err) => return err,
        };
        if device_port(node, &device).is_none() {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("-E- {} does not expose a network port to this host", device.path),
            );
        }

        if let Some(action) = parsed.flag_value_any(&["a", "port_state"]) {
            let (state, physical_state) = match action.to_ascii_uppercase().as_str() {
                "UP" | "TG" => (PortState::Active, PhysicalState::LinkUp),
                "DN" => (PortState::Down, PhysicalState::Disabled),
                other => {
                    return CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("-E- Invalid port state: {other} (use UP, DN or TG)"),
                    )
                }
            };
            let update = HcaUpdate {
                port: Some(PortUpdate {
                    number: 1,
                    state: Some(state),
                    physical_state: Some(physical_state),
                    ..Default::default()
                }),
                ..Default::default()
            };
            if let Err(err) = ctx.state.update_hca(&hostname, &device.rdma, update) {
                return state_error("mlxlink", &err);
            }
            return CommandResult::ok(format!(
                "Configuring Port State...\n-I- Port state {} configured successfully",
                action.to_ascii_uppercase()
            ));
        }

        match device_port(node, &device) {
            Some((_, port)) => CommandResult::ok(render_mlxlink(
                &device,
                port,
                parsed.has_any_flag(&["c", "show_counters", "e", "show_eye"]),
            )),
            None => CommandResult::error(SimConfig::EXIT_FAILURE, "-E- port not found"),
        }
    }
}

fn flint(node: &Node, parsed: &ParsedCommand) -> CommandResult {
    let device = match require_device(node, parsed, "flint") {
        Ok(d) => d,
        Err(err) => return err,
    };
    let args: Vec<&str> = parsed.args().collect();
    match args.first().copied() {
        Some("q" | "query") => {
            let guid = node
                .hca(&device.rdma)
                .map(|h| h.node_guid.trim_start_matches("0x").to_string())
                .unwrap_or_else(|| "N/A".to_string());
            CommandResult::ok(
                [
                    "Image type:            FS4".to_string(),
                    format!("FW Version:            {}", device.firmware_version),
                    "FW Release Date:       12.1.2024".to_string(),
                    format!("Product Version:       {}", device.firmware_version),
                    "Rom Info:              type=UEFI version=14.32.17 cpu=AMD64,AARCH64".to_string(),
                    "Description:           UID                GuidsNumber".to_string(),
                    format!("Base GUID:             {guid}        4"),
                    "Image VSD:             N/A".to_string(),
                    "Device VSD:            N/A".to_string(),
                    format!("PSID:                  {}", device.psid),
                    "Security Attributes:   secure-fw".to_string(),
                ]
                .join("\n"),
            )
        }
        Some("v" | "verify") => CommandResult::ok(
            "\n     FS4 failsafe image\n\n-I- FW image verification succeeded. Image is bootable.",
        ),
        Some(other) => CommandResult::error(
            SimConfig::EXIT_FAILURE,
            format!("-E- Invalid command \"{other}\""),
        ),
        None => CommandResult::error(SimConfig::EXIT_FAILURE, "-E- No command given. See flint -h for usage."),
    }
}

impl Simulator for MellanoxSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "mellanox",
            version: MFT_VERSION,
            description: "NVIDIA/Mellanox firmware tools",
            commands: &["mst", "mlxconfig", "mlxlink", "flint"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let usage = format!(
            "Usage: {} -d <device> [command]\nSee 'man {}' for details.",
            parsed.base_command, parsed.base_command
        );
        if parsed.has_flag("version") || (parsed.has_flag("v") && parsed.base_command != "mst") {
            return CommandResult::ok(format!(
                "{}, mft {MFT_VERSION}, built on Mar 12 2024, 09:15:03. Git SHA Hash: N/A",
                parsed.base_command
            ));
        }
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), &usage, true) {
            return result;
        }
        match parsed.base_command.as_str() {
            "mlxlink" => return self.mlxlink(parsed, ctx),
            "mlxconfig" => return mlxconfig(parsed, ctx),
            _ => {}
        }
        let node = match local_node(ctx, &parsed.base_command) {
            Ok(n) => n,
            Err(err) => return err,
        };
        match parsed.base_command.as_str() {
            "mst" => mst(node, parsed),
            _ => flint(node, parsed),
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
        MellanoxSimulator::new().execute(&parse(line), &mut ctx)
    }

    #[test]
    fn test_mst_status_lists_hcas_and_dpus() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "mst status");
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("/dev/mst/mt4129_pciconf0"));
        assert!(result.output.contains("/dev/mst/mt4129_pciconf7"));
        assert!(result.output.contains("/dev/mst/mt41692_pciconf1"));
    }

    #[test]
    fn test_flint_query_by_rdma_name() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "flint -d mlx5_3 q");
        assert!(result.output.contains("FW Version:            28.39.1002"));
        assert!(result.output.contains("PSID:                  MT_0000000838"));

        let missing = run(&mut store, "flint -d /dev/mst/mt9999_pciconf0 q");
        assert_eq!(missing.exit_code, 1);
    }

    #[test]
    fn test_mlxconfig_set_requires_confirmation() {
        let mut store = ClusterStore::default();
        let aborted = run(&mut store, "mlxconfig -d mlx5_0 set SRIOV_EN=1");
        assert_eq!(aborted.exit_code, 1);
        let applied = run(&mut store, "mlxconfig -d mlx5_0 -y set SRIOV_EN=1");
        assert_eq!(applied.exit_code, 0, "{}", applied.output);
        assert!(applied.output.contains("Please reboot"));
    }

    #[test]
    fn test_mlxconfig_set_is_stored_until_reset() {
        let mut store = ClusterStore::default();
        let device = "/dev/mst/mt4129_pciconf0";
        let applied = run(&mut store, &format!("mlxconfig -d {device} -y set SRIOV_EN=1 NUM_OF_VFS=8"));
        assert_eq!(applied.exit_code, 0, "{}", applied.output);
        assert_eq!(
            store.node("dgx-01").unwrap().hcas[0].firmware_config["SRIOV_EN"],
            "True(1)"
        );

        let query = run(&mut store, &format!("mlxconfig -d {device} q SRIOV_EN NUM_OF_VFS"));
        assert!(query.output.contains("SRIOV_EN                            True(1)"), "{}", query.output);
        assert!(query.output.contains("NUM_OF_VFS                          8"));
        let other = run(&mut store, "mlxconfig -d mlx5_1 q SRIOV_EN");
        assert!(other.output.contains("False(0)"));

        let bad = run(&mut store, &format!("mlxconfig -d {device} -y set LINK_TYPE_P1=FDDI"));
        assert_eq!(bad.exit_code, 1);
        let eth = run(&mut store, &format!("mlxconfig -d {device} -y set LINK_TYPE_P1=eth"));
        assert!(eth.output.contains("ETH(2)"));

        let reset = run(&mut store, &format!("mlxconfig -d {device} -y reset"));
        assert_eq!(reset.exit_code, 0);
        assert!(store.node("dgx-01").unwrap().hcas[0].firmware_config.is_empty());
        let query = run(&mut store, &format!("mlxconfig -d {device} q SRIOV_EN"));
        assert!(query.output.contains("False(0)"));
    }

    #[test]
    fn test_mlxlink_port_toggle() {
        let mut store = ClusterStore::default();
        let healthy = run(&mut store, "mlxlink -d mlx5_1");
        assert!(healthy.output.contains("No issue was observed"));
        assert!(healthy.output.contains("IB-NDR"));

        run(&mut store, "mlxlink -d mlx5_1 -a DN");
        assert!(!store.node("dgx-01").unwrap().hcas[1].ports[0].is_up());
        let down = run(&mut store, "mlxlink -d mlx5_1");
        assert!(down.output.contains("Disabled"));
    }
}
