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

//! Step validation as a learner would drive it.

use std::sync::Arc;

use hpc_sim::scenario::ScenarioDefinition;
use hpc_sim::validation::{command_matches, StepEvent, StepStatus};
use hpc_sim::{ClusterBuildConfig, DefinitionRegistry, Session};

const XID_DRILL: &str = r#"{
    "id": "xid-79-drill",
    "title": "GPU fallen off the bus",
    "faults": [
        {"nodeId": "dgx-01", "gpuId": 2, "type": "xid-error", "severity": "critical", "parameters": {"xid": 79}}
    ],
    "steps": [
        {"id": "spot", "title": "Spot the lost GPU", "expectedCommands": ["nvidia-smi"]},
        {
            "id": "logs",
            "title": "Find the XID in the kernel log",
            "expectedCommands": ["dmesg", "nvidia-smi -q -d PERFORMANCE"],
            "requireAllCommands": true
        },
        {
            "id": "drain",
            "title": "Drain the node",
            "expectedCommands": ["scontrol update nodename=dgx-01 state=drain"],
            "validation": {"expectedExitCode": 0, "requiredOutput": []}
        }
    ]
}"#;

fn session() -> Session {
    Session::with_cluster(
        ClusterBuildConfig::default(),
        Arc::new(DefinitionRegistry::builtin()),
    )
}

fn completed(events: &[StepEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            StepEvent::Completed { step_id } => Some(step_id.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_command_matching_tolerates_real_world_variants() {
    assert!(command_matches("scontrol show nodes", "scontrol show node"));
    assert!(command_matches("NVIDIA-SMI", "nvidia-smi"));
    assert!(command_matches("nvidia-smi -q -d TEMPERATURE -i 0", "nvidia-smi -q"));
    assert!(command_matches("  nvidia-smi   -L ", "nvidia-smi -L"));
    assert!(!command_matches("dcgmi discovery -l", "dcgmi diag"));
    assert!(!command_matches("", "nvidia-smi"));
}

#[test]
fn test_scenario_walkthrough() {
    let mut session = session();
    session
        .start_scenario(ScenarioDefinition::from_json(XID_DRILL).unwrap())
        .unwrap();

    // Commands for later steps do not count yet
    assert!(session.execute("dmesg").step_events.is_empty());

    let out = session.execute("nvidia-smi");
    assert_eq!(completed(&out.step_events), vec!["spot"]);

    let half = session.execute("dmesg");
    assert!(matches!(
        half.step_events.as_slice(),
        [StepEvent::Progress { step_id, progress }] if step_id == "logs" && (*progress - 0.5).abs() < f64::EPSILON
    ));
    // Repeating a matched command is not new progress
    assert!(session.execute("dmesg").step_events.is_empty());

    let out = session.execute("nvidia-smi -q -d PERFORMANCE");
    assert_eq!(completed(&out.step_events), vec!["logs"]);

    let out = session.execute("scontrol update nodename=dgx-01 state=drain reason=xid79");
    assert!(out.result.is_success(), "{}", out.result.output);
    assert_eq!(completed(&out.step_events), vec!["drain"]);
    assert!(out
        .step_events
        .iter()
        .any(|e| matches!(e, StepEvent::ScenarioCompleted { scenario_id } if scenario_id == "xid-79-drill")));

    let validator = session.validator().unwrap();
    assert!(validator.is_complete());
    assert!(validator
        .progress()
        .iter()
        .all(|p| p.status == StepStatus::Completed));
}

#[test]
fn test_failed_expectation_does_not_complete_step() {
    let mut session = session();
    let definition = ScenarioDefinition::from_json(
        r#"{
            "id": "reset-drill",
            "title": "Reset a lost GPU",
            "faults": [{"nodeId": "dgx-01", "gpuId": 0, "type": "xid-error", "parameters": {"xid": 79}}],
            "steps": [{
                "id": "reset",
                "title": "Try a reset",
                "expectedCommands": ["nvidia-smi -r"],
                "validation": {"expectedExitCode": 0}
            }]
        }"#,
    )
    .unwrap();
    session.start_scenario(definition).unwrap();

    let out = session.execute("nvidia-smi -r -i 0");
    assert!(!out.result.is_success());
    assert!(matches!(
        out.step_events.as_slice(),
        [StepEvent::CheckFailed { step_id, reasons }] if step_id == "reset" && !reasons.is_empty()
    ));
    assert!(!session.validator().unwrap().is_complete());
}

#[test]
fn test_definition_rejects_structural_errors() {
    assert!(ScenarioDefinition::from_json(r#"{"id": "x", "title": "x", "steps": []}"#).is_err());
    assert!(ScenarioDefinition::from_json(
        r#"{"id": "x", "title": "x", "steps": [{"id": "a", "title": "a"}]}"#
    )
    .is_err());
    assert!(ScenarioDefinition::from_json(
        r#"{"id": "x", "title": "x", "steps": [
            {"id": "a", "title": "a", "expectedCommands": ["sinfo"]},
            {"id": "a", "title": "b", "expectedCommands": ["squeue"]}
        ]}"#
    )
    .is_err());
}

#[test]
fn test_bundled_scenarios_complete() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios");
    let xid = ScenarioDefinition::load(format!("{dir}/xid-79.json")).unwrap();
    let thermal = ScenarioDefinition::load(format!("{dir}/thermal.json")).unwrap();

    let mut session = session();
    session.start_scenario(xid).unwrap();
    for line in [
        "nvidia-smi",
        "dmesg | grep -i xid",
        "nvidia-smi -r -i 2",
        "scontrol update NodeName=dgx-01 State=DRAIN Reason=xid79",
    ] {
        let out = session.execute(line);
        assert!(
            !out.step_events.is_empty(),
            "'{line}' did not advance the scenario: {}",
            out.result.output
        );
    }
    assert!(session.validator().unwrap().is_complete());

    session.start_scenario(thermal).unwrap();
    session.execute("ssh dgx-02");
    session.execute("nvidia-smi -q -d TEMPERATURE");
    session.execute("ipmitool sensor");
    assert!(session.validator().unwrap().is_complete());
}
