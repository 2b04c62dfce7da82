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

//! Every tool that reports a piece of state must agree on it.

use std::sync::Arc;

use hpc_sim::docs::consistency_groups;
use hpc_sim::scenario::ScenarioDefinition;
use hpc_sim::traits::ClusterState;
use hpc_sim::{ClusterBuildConfig, DefinitionRegistry, Session};

fn session() -> Session {
    Session::with_cluster(
        ClusterBuildConfig::default(),
        Arc::new(DefinitionRegistry::builtin()),
    )
}

fn scenario(faults: &str) -> ScenarioDefinition {
    ScenarioDefinition::from_json(&format!(
        r#"{{
            "id": "consistency",
            "title": "Consistency",
            "faults": {faults},
            "steps": [{{"id": "look", "title": "Look", "expectedCommands": ["nvidia-smi"]}}]
        }}"#
    ))
    .unwrap()
}

fn line_starting<'a>(output: &'a str, prefix: &str) -> &'a str {
    output
        .lines()
        .find(|l| l.trim_start().starts_with(prefix))
        .unwrap_or_else(|| panic!("no line starting with '{prefix}' in:\n{output}"))
}

#[test]
fn test_thermal_fault_reads_the_same_everywhere() {
    let mut session = session();
    let report = session
        .start_scenario(scenario(
            r#"[{"nodeId": "dgx-01", "gpuId": 0, "type": "thermal", "parameters": {"targetTemp": 95}}]"#,
        ))
        .unwrap();
    assert_eq!(report.applied, 1);

    let query = session
        .execute("nvidia-smi --query-gpu=index,temperature.gpu --format=csv,noheader")
        .result;
    assert!(query.is_success());
    assert_eq!(query.output.lines().next(), Some("0, 95"));

    let detail = session.execute("nvidia-smi -q -d TEMPERATURE -i 0").result;
    assert!(line_starting(&detail.output, "GPU Current Temp").ends_with(": 95 C"));

    let dmon = session.execute("dcgmi dmon -e 150 -c 1").result;
    let fields: Vec<&str> = line_starting(&dmon.output, "GPU 0 ").split_whitespace().collect();
    assert_eq!(fields, vec!["GPU", "0", "95"]);

    let sensors = session.execute("ipmitool sensor").result;
    assert!(line_starting(&sensors.output, "GPU0_Temp").contains("| 95.000"));

    // Untouched GPUs keep their baseline reading
    let gpu1 = session
        .execute("nvidia-smi --query-gpu=temperature.gpu --format=csv,noheader -i 1")
        .result;
    assert_ne!(gpu1.output.trim(), "95");
}

#[test]
fn test_lost_gpu_is_lost_everywhere() {
    let mut session = session();
    session
        .start_scenario(scenario(
            r#"[{"nodeId": "dgx-01", "gpuId": 0, "type": "xid-error", "severity": "critical", "parameters": {"xid": 79}}]"#,
        ))
        .unwrap();

    let listing = session.execute("nvidia-smi").result;
    assert!(listing.output.contains("GPU is lost"));
    assert_eq!(listing.output.matches("Unable to determine the device handle").count(), 1);

    let query = session
        .execute("nvidia-smi --query-gpu=index,temperature.gpu --format=csv,noheader")
        .result;
    let rows: Vec<&str> = query.output.lines().collect();
    assert_eq!(rows.len(), 8);
    assert!(rows[0].contains("[GPU is lost]"));
    assert!(rows[1..].iter().all(|r| !r.contains("lost")));

    let reset = session.execute("nvidia-smi -r -i 0").result;
    assert!(!reset.is_success());
    assert!(reset.output.contains("not accessible"));
    assert!(reset.output.contains("fallen off the bus"));

    let diag = session.execute("dcgmi diag -r 1").result;
    assert!(!diag.is_success());
    assert!(diag.output.contains("Fail - GPU: 0"));
    assert!(!diag.output.contains("Fail - GPU: 0, 1"));

    let dmon = session.execute("dcgmi dmon -e 150 -c 1").result;
    assert!(line_starting(&dmon.output, "GPU 0 ").contains("N/A"));
    assert!(!line_starting(&dmon.output, "GPU 1 ").contains("N/A"));

    let container = session
        .execute("docker run --rm --gpus device=0 nvcr.io/nvidia/cuda:12.2.0-base-ubuntu22.04 nvidia-smi -L")
        .result;
    assert_eq!(container.exit_code, 125);
}

#[test]
fn test_other_nodes_are_unaffected() {
    let mut session = session();
    session
        .start_scenario(scenario(
            r#"[{"nodeId": "dgx-01", "gpuId": 0, "type": "xid-error", "parameters": {"xid": 79}}]"#,
        ))
        .unwrap();
    session.execute("ssh dgx-02");
    let listing = session.execute("nvidia-smi").result;
    assert!(listing.is_success());
    assert!(!listing.output.contains("GPU is lost"));
}

#[test]
fn test_every_consistency_command_is_routed() {
    let mut session = session();
    for group in consistency_groups() {
        for command in group.commands {
            let out = session.execute(command);
            assert_ne!(
                out.result.exit_code, 127,
                "'{command}' from group '{}' is not routed: {}",
                group.id, out.result.output
            );
            // Leave any interactive sub-mode before the next command
            if session.in_interactive_mode() {
                session.execute("exit");
            }
        }
    }
}

#[test]
fn test_firmware_config_reads_back_after_set() {
    let device = "/dev/mst/mt4129_pciconf0";
    let mut session = session();
    let set = session
        .execute(&format!("mlxconfig -d {device} -y set SRIOV_EN=1"))
        .result;
    assert!(set.is_success(), "{}", set.output);
    assert!(set.output.contains("Applying... Done!"));

    let query = session.execute(&format!("mlxconfig -d {device} q SRIOV_EN")).result;
    assert!(line_starting(&query.output, "SRIOV_EN").ends_with("True(1)"));
    let stored = &session.store().node("dgx-01").unwrap().hcas[0].firmware_config;
    assert_eq!(stored.get("SRIOV_EN").map(String::as_str), Some("True(1)"));

    // Inside a scenario the change stays in the scenario's copy
    let mut drill = crate::session();
    drill.start_scenario(scenario("[]")).unwrap();
    drill.execute(&format!("mlxconfig -d {device} -y set NUM_OF_VFS=16"));
    let query = drill.execute(&format!("mlxconfig -d {device} q NUM_OF_VFS")).result;
    assert!(line_starting(&query.output, "NUM_OF_VFS").ends_with("16"));
    assert!(drill.store().node("dgx-01").unwrap().hcas[0].firmware_config.is_empty());
}
