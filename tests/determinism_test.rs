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

//! Same seed, same cluster, same answers.

use std::sync::Arc;

use hpc_sim::scenario::ScenarioDefinition;
use hpc_sim::{ClusterBuildConfig, ClusterStore, DefinitionRegistry, Session};

const STABLE_COMMANDS: &[&str] = &[
    "nvidia-smi -L",
    "nvidia-smi --query-gpu=index,uuid,serial,temperature.gpu,memory.used --format=csv",
    "dcgmi discovery -l",
    "ipmitool sensor",
    "ibstat",
    "sinfo -N",
    "df -h",
    "lfs df -h",
    "cmsh -c \"device; list\"",
    "all_reduce_perf -b 8 -e 1M -f 2 -g 8",
];

fn run_all(session: &mut Session) -> Vec<String> {
    STABLE_COMMANDS
        .iter()
        .map(|c| session.execute(c).result.output)
        .collect()
}

fn session(config: ClusterBuildConfig) -> Session {
    Session::with_cluster(config, Arc::new(DefinitionRegistry::builtin()))
}

#[test]
fn test_same_seed_builds_same_cluster() {
    let a = ClusterStore::new(ClusterBuildConfig::default());
    let b = ClusterStore::new(ClusterBuildConfig::default());
    assert_eq!(a.snapshot(), b.snapshot());

    let other = ClusterStore::new(ClusterBuildConfig {
        seed: ClusterBuildConfig::default().seed + 1,
        ..ClusterBuildConfig::default()
    });
    assert_ne!(a.snapshot(), other.snapshot());
}

#[test]
fn test_fresh_sessions_answer_identically() {
    let mut first = session(ClusterBuildConfig::default());
    let mut second = session(ClusterBuildConfig::default());
    assert_eq!(run_all(&mut first), run_all(&mut second));
}

#[test]
fn test_scenario_contexts_from_one_baseline_match() {
    let definition = ScenarioDefinition::from_json(
        r#"{
            "id": "ecc",
            "title": "ECC",
            "faults": [{"nodeId": "dgx-01", "gpuId": 4, "type": "ecc-error", "severity": "critical"}],
            "steps": [{"id": "look", "title": "Look", "expectedCommands": ["nvidia-smi -q"]}]
        }"#,
    )
    .unwrap();

    let mut session = session(ClusterBuildConfig::default());
    session.start_scenario(definition.clone()).unwrap();
    let first = run_all(&mut session);
    session.start_scenario(definition).unwrap();
    let second = run_all(&mut session);
    assert_eq!(first, second);
}

#[test]
fn test_documented_examples_are_routed() {
    let registry = DefinitionRegistry::builtin();
    for definition in registry.iter() {
        for example in &definition.examples {
            let mut session = session(ClusterBuildConfig::default());
            let out = session.execute(&example.command);
            assert_ne!(
                out.result.exit_code, 127,
                "example '{}' of {} is not routed: {}",
                example.command, definition.name, out.result.output
            );
        }
    }
}
