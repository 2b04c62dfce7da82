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

//! `ipmitool` simulator.
//!
//! Without `-H` the tool talks to the local BMC over the in-band interface;
//! with `-I lanplus -H <bmc>` it reaches any node's BMC by address or
//! hostname, which keeps working while the host itself is powered off.

use crate::common::config::SimConfig;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, state_error, unknown_subcommand};
use crate::state::constants::IPMITOOL_VERSION;
use crate::state::types::{BmcSensor, HealthStatus, Node, PowerState};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};

const USAGE: &str = "ipmitool version 1.8.19

usage: ipmitool [options...] <command>

       -I intf       Interface to use (open, lanplus)
       -H hostname   Remote host name for LAN interface
       -U username   Remote session username
       -P password   Remote session password
       -V            Show version information

Commands:
	sensor        Print detailed sensor information
	sdr           Print Sensor Data Repository entries and readings
	sel           Print System Event Log (SEL)
	mc            Management Controller status and global enables
	chassis       Get chassis status and set power state
	lan           Configure LAN Channels";

pub struct IpmitoolSimulator;

impl IpmitoolSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IpmitoolSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// A sensor reading; `None` when the device behind it does not answer.
struct Reading {
    name: String,
    value: Option<f64>,
    unit: String,
    sensor_type: String,
    upper_critical: Option<f64>,
    status: HealthStatus,
}

impl Reading {
    fn from_sensor(sensor: &BmcSensor) -> Self {
        let status = match sensor.upper_critical {
            Some(uc) if sensor.value >= uc => HealthStatus::Critical,
            Some(uc) if sensor.value >= uc * 0.9 => HealthStatus::Warning,
            _ => HealthStatus::Ok,
        };
        Self {
            name: sensor.name.clone(),
            value: Some(sensor.value),
            unit: sensor.unit.clone(),
            sensor_type: sensor.sensor_type.clone(),
            upper_critical: sensor.upper_critical,
            status,
        }
    }

    fn status_code(&self) -> &'static str {
        match (self.value, self.status) {
            (None, _) => "na",
            (_, HealthStatus::Ok) => "ok",
            (_, HealthStatus::Warning) => "nc",
            (_, HealthStatus::Critical) => "cr",
        }
    }
}

/// Chassis sensors plus one temperature sensor per GPU, read live from the GPU.
fn readings(node: &Node) -> Vec<Reading> {
    let mut out: Vec<Reading> = node.bmc.sensors.iter().map(Reading::from_sensor).collect();
    for gpu in &node.gpus {
        out.push(Reading {
            name: format!("GPU{}_Temp", gpu.id),
            value: gpu.is_accessible().then_some(gpu.temperature as f64),
            unit: "degrees C".to_string(),
            sensor_type: "Temperature".to_string(),
            upper_critical: Some(SimConfig::GPU_TEMP_CRITICAL as f64),
            status: gpu.thermal_status(),
        });
    }
    if node.bmc.power_state == PowerState::Off {
        for r in out.iter_mut().filter(|r| r.sensor_type != "Power Supply") {
            r.value = None;
        }
    }
    out
}

fn fmt3(value: Option<f64>) -> String {
    value.map_or_else(|| "na".to_string(), |v| format!("{v:.3}"))
}

fn sensor_list(node: &Node) -> String {
    readings(node)
        .iter()
        .map(|r| {
            format!(
                "{:<16} | {:<10} | {:<10} | {:<5} | na        | na        | na        | {:<9} | na        | na",
                r.name,
                fmt3(r.value),
                r.unit,
                r.status_code(),
                fmt3(r.upper_critical)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn sdr_list(node: &Node, sensor_type: Option<&str>) -> String {
    readings(node)
        .iter()
        .filter(|r| match sensor_type {
            Some(t) => r.sensor_type.eq_ignore_ascii_case(t),
            None => true,
        })
        .map(|r| {
            let reading = match r.value {
                Some(v) => format!("{v:.0} {}", r.unit),
                None => "no reading".to_string(),
            };
            format!("{:<16} | {:<17} | {}", r.name, reading, r.status_code())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn sel_list(node: &Node) -> String {
    node.bmc
        .sel
        .iter()
        .map(|e| {
            format!(
                "{:>4} | {} | {} | {} | {} | {}",
                e.id,
                e.timestamp.format("%m/%d/%Y"),
                e.timestamp.format("%H:%M:%S"),
                e.sensor,
                e.event,
                if e.asserted { "Asserted" } else { "Deasserted" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn mc_info(node: &Node) -> String {
    [
        "Device ID                 : 32".to_string(),
        "Device Revision           : 1".to_string(),
        format!("Firmware Revision         : {}", node.bmc.firmware_version),
        "IPMI Version              : 2.0".to_string(),
        format!("Manufacturer Name         : {}", node.bmc.manufacturer),
        format!("Product Name              : {}", node.system_type),
        "Device Available          : yes".to_string(),
        "Provides Device SDRs      : yes".to_string(),
    ]
    .join("\n")
}

fn chassis_status(node: &Node) -> String {
    [
        format!("System Power         : {}", node.bmc.power_state),
        "Power Overload       : false".to_string(),
        "Power Interlock      : inactive".to_string(),
        "Main Power Fault     : false".to_string(),
        "Power Control Fault  : false".to_string(),
        "Power Restore Policy : always-on".to_string(),
        "Last Power Event     : command".to_string(),
        "Chassis Intrusion    : inactive".to_string(),
        "Drive Fault          : false".to_string(),
        "Cooling/Fan Fault    : false".to_string(),
    ]
    .join("\n")
}

fn lan_print(node: &Node) -> String {
    let gateway = node
        .bmc
        .ip_address
        .rsplit_once('.')
        .map(|(net, _)| format!("{net}.1"))
        .unwrap_or_default();
    [
        "Set in Progress         : Set Complete".to_string(),
        "IP Address Source       : Static Address".to_string(),
        format!("IP Address              : {}", node.bmc.ip_address),
        "Subnet Mask             : 255.255.255.0".to_string(),
        format!("MAC Address             : {}", node.bmc.mac_address),
        format!("Default Gateway IP      : {gateway}"),
        "802.1q VLAN ID          : Disabled".to_string(),
        "Cipher Suite Priv Max   : aaaaXXaaaXXaaXX".to_string(),
    ]
    .join("\n")
}

impl IpmitoolSimulator {
    /// Resolve the BMC to talk to, returning the owning node's hostname.
    fn target(&self, parsed: &ParsedCommand, ctx: &CommandContext<'_>) -> Result<String, CommandResult> {
        match parsed.flag_value("H") {
            Some(host) => {
                let host = host.trim_end_matches("-bmc");
                ctx.state
                    .cluster()
                    .nodes
                    .iter()
                    .find(|n| n.bmc.ip_address == host || n.hostname == host || n.management_ip == host)
                    .map(|n| n.hostname.clone())
                    .ok_or_else(|| {
                        CommandResult::error(
                            SimConfig::EXIT_FAILURE,
                            format!("Error: Unable to establish IPMI v2 / RMCP+ session\nUnable to get Chassis Power Status ({host})"),
                        )
                    })
            }
            None => ctx
                .state
                .node(&ctx.current_node)
                .map(|n| n.hostname.clone())
                .ok_or_else(|| {
                    CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        "Could not open device at /dev/ipmi0 or /dev/ipmi/0 or /dev/ipmidev/0: No such file or directory",
                    )
                }),
        }
    }

    fn chassis_power(&self, action: Option<&str>, hostname: &str, ctx: &mut CommandContext<'_>) -> CommandResult {
        let current = ctx.state.node(hostname).map(|n| n.bmc.power_state);
        let steps: &[PowerState] = match action {
            Some("status") | None => {
                return CommandResult::ok(format!(
                    "Chassis Power is {}",
                    current.unwrap_or(PowerState::Off)
                ))
            }
            Some("on") => &[PowerState::On],
            Some("off") | Some("soft") => &[PowerState::Off],
            Some("cycle") | Some("reset") => &[PowerState::Off, PowerState::On],
            Some(other) => {
                return CommandResult::usage(format!(
                    "Invalid chassis power command: {other}\nchassis power Commands: status, on, off, cycle, reset, soft"
                ))
            }
        };
        for step in steps {
            if let Err(err) = ctx.state.set_power_state(hostname, *step) {
                return state_error("ipmitool", &err);
            }
        }
        let message = match action {
            Some("on") => "Up/On",
            Some("off") | Some("soft") => "Down/Off",
            Some("cycle") => "Cycle",
            _ => "Reset",
        };
        CommandResult::ok(format!("Chassis Power Control: {message}"))
    }
}

impl Simulator for IpmitoolSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "ipmitool",
            version: IPMITOOL_VERSION,
            description: "IPMI BMC management utility",
            commands: &["ipmitool"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        if parsed.has_flag("V") {
            return CommandResult::ok(format!("ipmitool version {IPMITOOL_VERSION}"));
        }
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), USAGE, true) {
            return result;
        }
        let words: Vec<String> = parsed.args().map(str::to_ascii_lowercase).collect();
        if words.is_empty() {
            return CommandResult::usage(USAGE);
        }
        let hostname = match self.target(parsed, ctx) {
            Ok(h) => h,
            Err(e) => return e,
        };
        let word = |i: usize| words.get(i).map(String::as_str);

        if word(0) == Some("chassis") && word(1) == Some("power") {
            return self.chassis_power(word(2), &hostname, ctx);
        }
        if word(0) == Some("sel") && word(1) == Some("clear") {
            return match ctx.state.clear_sel(&hostname) {
                Ok(()) => CommandResult::ok("Clearing SEL.  Please allow a few seconds to erase."),
                Err(err) => state_error("ipmitool", &err),
            };
        }

        let Some(node) = ctx.state.node(&hostname) else {
            return CommandResult::error(SimConfig::EXIT_FAILURE, format!("ipmitool: unknown host '{hostname}'"));
        };
        match (word(0), word(1)) {
            (Some("sensor"), None | Some("list")) => CommandResult::ok(sensor_list(node)),
            (Some("sensor"), Some("get")) => {
                let wanted: Vec<&str> = parsed.args().skip(2).collect();
                let readings = readings(node);
                let mut lines = Vec::new();
                for name in &wanted {
                    match readings.iter().find(|r| r.name.eq_ignore_ascii_case(name)) {
                        Some(r) => {
                            lines.push(format!("Locating sensor record...\nSensor ID              : {}", r.name));
                            lines.push(format!(" Sensor Reading        : {} {}", fmt3(r.value), r.unit));
                            lines.push(format!(" Status                : {}", r.status_code()));
                        }
                        None => {
                            return CommandResult::error(
                                SimConfig::EXIT_FAILURE,
                                format!("Sensor data record \"{name}\" not found!"),
                            )
                        }
                    }
                }
                CommandResult::ok(lines.join("\n"))
            }
            (Some("sdr"), None | Some("list") | Some("elist")) => CommandResult::ok(sdr_list(node, None)),
            (Some("sdr"), Some("type")) => {
                let kind = parsed.args().nth(2).unwrap_or("Temperature");
                CommandResult::ok(sdr_list(node, Some(kind)))
            }
            (Some("sel"), None | Some("list") | Some("elist")) => {
                if node.bmc.sel.is_empty() {
                    CommandResult::ok("SEL has no entries")
                } else {
                    CommandResult::ok(sel_list(node))
                }
            }
            (Some("sel"), Some("info")) => CommandResult::ok(format!(
                "SEL Information\nVersion          : 1.5 (v1.5, v2 compliant)\nEntries          : {}\nFree Space       : {} bytes",
                node.bmc.sel.len(),
                65536 - node.bmc.sel.len() * 16
            )),
            (Some("mc"), Some("info")) => CommandResult::ok(mc_info(node)),
            (Some("chassis"), Some("status")) => CommandResult::ok(chassis_status(node)),
            (Some("lan"), Some("print")) => CommandResult::ok(lan_print(node)),
            (Some(cmd @ ("sensor" | "sdr" | "sel" | "mc" | "chassis" | "lan")), Some(sub)) => {
                unknown_subcommand(&format!("ipmitool {cmd}"), sub, "Run 'ipmitool help' for usage.")
            }
            (Some(cmd @ ("mc" | "chassis" | "lan")), None) => {
                CommandResult::usage(format!("{cmd} Commands: see 'ipmitool {cmd} help'"))
            }
            (Some("help"), _) => CommandResult::ok(USAGE),
            (Some(other), _) => CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("Invalid command: {other}\n\n{USAGE}"),
            ),
            (None, _) => CommandResult::usage(USAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::{ClusterStore, GpuUpdate};
    use crate::traits::ClusterState;

    fn run(store: &mut ClusterStore, node: &str, line: &str) -> CommandResult {
        let mut ctx = CommandContext::new(store, node);
        IpmitoolSimulator::new().execute(&parse(line), &mut ctx)
    }

    #[test]
    fn test_gpu_sensor_follows_gpu_temperature() {
        let mut store = ClusterStore::default();
        store
            .update_gpu(
                "dgx-01",
                1,
                GpuUpdate {
                    temperature: Some(95),
                    ..Default::default()
                },
            )
            .unwrap();
        let result = run(&mut store, "dgx-01", "ipmitool sensor list");
        let line = result
            .output
            .lines()
            .find(|l| l.starts_with("GPU1_Temp"))
            .unwrap();
        assert!(line.contains("95.000"));
        assert!(line.contains("| cr "));
        assert!(result.output.contains("Inlet_Temp"));
    }

    #[test]
    fn test_sdr_type_filter() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "dgx-01", "ipmitool sdr type Fan");
        assert_eq!(result.output.lines().count(), 6);
        assert!(result.output.lines().all(|l| l.starts_with("FAN")));
    }

    #[test]
    fn test_remote_power_cycle_and_sel_clear() {
        let mut store = ClusterStore::default();
        let result = run(
            &mut store,
            "bcm-head01",
            "ipmitool -I lanplus -H 10.0.1.11 -U admin -P admin chassis power off",
        );
        assert_eq!(result.output, "Chassis Power Control: Down/Off");
        assert_eq!(store.node("dgx-02").unwrap().bmc.power_state, PowerState::Off);

        let status = run(&mut store, "bcm-head01", "ipmitool -H dgx-02 chassis power status");
        assert_eq!(status.output, "Chassis Power is off");

        run(&mut store, "dgx-01", "ipmitool sel clear");
        assert_eq!(store.node("dgx-01").unwrap().bmc.sel.len(), 1);
    }

    #[test]
    fn test_in_band_requires_local_bmc() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "bcm-head01", "ipmitool sensor");
        assert_eq!(result.exit_code, 1);
        let result = run(&mut store, "dgx-01", "ipmitool -H 10.9.9.9 mc info");
        assert!(result.output.contains("Unable to establish"));
    }

    #[test]
    fn test_unknown_command() {
        let mut store = ClusterStore::default();
        assert_eq!(run(&mut store, "dgx-01", "ipmitool frob").exit_code, 1);
        assert!(run(&mut store, "dgx-01", "ipmitool -V").output.contains("1.8.19"));
    }
}
