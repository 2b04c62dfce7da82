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

//! The shell session end to end.

use std::sync::Arc;

use hpc_sim::scenario::ScenarioDefinition;
use hpc_sim::state::{SlurmNodeState, SystemType};
use hpc_sim::traits::ClusterState;
use hpc_sim::simulators::default_router;
use hpc_sim::{ClusterBuildConfig, ClusterStore, DefinitionRegistry, Session};

fn registry() -> Arc<DefinitionRegistry> {
    Arc::new(DefinitionRegistry::builtin())
}

fn session() -> Session {
    Session::with_cluster(ClusterBuildConfig::default(), registry())
}

fn drill() -> ScenarioDefinition {
    ScenarioDefinition::from_json(
        r#"{
            "id": "drain-drill",
            "title": "Drain a node",
            "faults": [{"nodeId": "dgx-03", "type": "thermal", "parameters": {"targetTemp": 92}}],
            "steps": [{"id": "drain", "title": "Drain", "expectedCommands": ["scontrol update"]}]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_scenario_leaves_store_untouched() {
    let mut session = session();
    let baseline = session.store().snapshot();

    let report = session.start_scenario(drill()).unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(session.contexts().active_id(), Some("drain-drill"));

    let out = session.execute("scontrol update NodeName=dgx-03 State=DRAIN Reason=hot_gpus");
    assert!(out.result.is_success(), "{}", out.result.output);
    assert_eq!(
        session.cluster().node("dgx-03").unwrap().slurm_state,
        SlurmNodeState::Drained
    );
    assert_eq!(session.cluster().gpu("dgx-03", 7).unwrap().temperature, 92);
    assert_eq!(*session.store().cluster(), baseline);

    let validator = session.end_scenario().unwrap();
    assert!(validator.is_complete());
    assert!(session.contexts().is_empty());
    assert_eq!(*session.cluster(), baseline);
    assert!(session.end_scenario().is_none());
}

#[test]
fn test_restarting_a_scenario_starts_clean() {
    let mut session = session();
    session.start_scenario(drill()).unwrap();
    session.execute("scontrol update NodeName=dgx-03 State=DRAIN Reason=hot");
    session.start_scenario(drill()).unwrap();
    assert_eq!(
        session.cluster().node("dgx-03").unwrap().slurm_state,
        session.store().cluster().node("dgx-03").unwrap().slurm_state
    );
    assert_eq!(session.contexts().len(), 1);
}

#[test]
fn test_reset_cluster_discards_store_changes() {
    let mut session = session();
    let baseline = session.store().snapshot();
    let out = session.execute("scontrol update NodeName=dgx-02 State=DOWN Reason=maint");
    assert!(out.result.is_success(), "{}", out.result.output);
    assert_ne!(*session.store().cluster(), baseline);

    session.reset_cluster();
    assert_eq!(*session.store().cluster(), baseline);
}

#[test]
fn test_every_routed_command_is_documented() {
    let registry = registry();
    let session = Session::with_cluster(ClusterBuildConfig::default(), registry.clone());
    for command in session.router().commands() {
        assert!(
            registry.get(command).is_some(),
            "'{command}' has no command definition"
        );
    }
    for definition in registry.iter() {
        assert!(
            session.router().contains(&definition.name),
            "'{}' is documented but not routed",
            definition.name
        );
    }
}

#[test]
fn test_help_and_explain() {
    let mut session = session();
    let help = session.execute("help").result;
    assert!(help.is_success());
    assert!(help.output.contains("nvidia-smi"));

    let explain = session.execute("explain dcgmi").result;
    assert!(explain.is_success());
    assert!(explain.output.contains("SYNOPSIS"));
    assert_eq!(session.execute("explain frobnicate").result.exit_code, 1);
}

#[test]
fn test_json_output_shape() {
    let mut session = session();
    let out = session.execute("hostname");
    let value = serde_json::to_value(&out).unwrap();
    assert_eq!(value["result"]["output"], "dgx-01");
    assert_eq!(value["result"]["exitCode"], 0);
    assert!(value["result"].get("prompt").is_none());
    assert!(value["stepEvents"].as_array().unwrap().is_empty());
}

#[test]
fn test_custom_cluster_shape() {
    let config = ClusterBuildConfig {
        node_count: 2,
        system_type: SystemType::DgxB200,
        ..ClusterBuildConfig::default()
    };
    let mut session = Session::with_cluster(config, registry());
    assert_eq!(session.cluster().nodes.len(), 2);

    let listing = session.execute("nvidia-smi -L").result;
    assert!(listing.output.lines().all(|l| l.contains("NVIDIA B200")));

    session.execute("ssh dgx-02");
    assert_eq!(session.current_node(), "dgx-02");
    let out = session.execute("ssh dgx-03").result;
    assert!(out.output.contains("Could not resolve hostname"));
    assert_eq!(session.current_node(), "dgx-02");
}

#[test]
fn test_session_over_loaded_cluster() {
    let mut cluster = ClusterStore::default().snapshot();
    cluster.name = "lab".to_string();
    cluster.nodes.truncate(1);
    let mut session = Session::new(ClusterStore::from_cluster(cluster), default_router(registry()));
    assert_eq!(session.store().build_config().node_count, 1);

    session.set_env("USER", "trainee");
    assert_eq!(session.prompt(), "trainee@dgx-01:~$ ");
    assert_eq!(session.execute("whoami").result.output, "trainee");
    assert!(session
        .execute("ssh dgx-02")
        .result
        .output
        .contains("Could not resolve hostname"));
}
