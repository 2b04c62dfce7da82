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

//! Fault injection and scenario isolation through the public API.

use hpc_sim::scenario::{
    apply_faults_to_context, FaultConfig, FaultParameters, FaultType, ScenarioContext,
    ScenarioContextManager,
};
use hpc_sim::parsing::parse;
use hpc_sim::simulators::NvidiaSmiSimulator;
use hpc_sim::state::{GpuUpdate, HealthStatus, Severity};
use hpc_sim::traits::{ClusterState, CommandContext, Simulator};
use hpc_sim::ClusterStore;

fn xid(node: &str, gpu: Option<u32>, code: u32) -> FaultConfig {
    FaultConfig::new(node, gpu, FaultType::XidError).with_parameters(FaultParameters {
        xid: Some(code),
        ..Default::default()
    })
}

#[test]
fn test_context_mutations_never_reach_the_store() {
    let store = ClusterStore::default();
    let before = store.snapshot();

    let mut ctx = ScenarioContext::new("isolation", store.cluster());
    ctx.update_gpu(
        "dgx-01",
        0,
        GpuUpdate {
            temperature: Some(99),
            health_status: Some(HealthStatus::Critical),
            ..Default::default()
        },
    )
    .unwrap();
    apply_faults_to_context(&[xid("dgx-02", Some(3), 79)], &mut ctx);

    assert_eq!(*store.cluster(), before);
    assert_eq!(ctx.gpu("dgx-01", 0).unwrap().temperature, 99);
    assert!(!ctx.gpu("dgx-02", 3).unwrap().is_accessible());
    assert!(store.gpu("dgx-02", 3).unwrap().is_accessible());
}

#[test]
fn test_each_fault_counts_once() {
    let store = ClusterStore::default();
    let mut ctx = ScenarioContext::new("counting", store.cluster());

    let faults = vec![
        xid("dgx-01", Some(0), 48),
        FaultConfig::new("dgx-01", Some(1), FaultType::Thermal).with_parameters(FaultParameters {
            target_temp: Some(91),
            ..Default::default()
        }),
        // Node-wide: eight GPUs, still one mutation
        FaultConfig::new("dgx-02", None, FaultType::GpuHang).with_severity(Severity::Critical),
    ];
    let report = apply_faults_to_context(&faults, &mut ctx);
    assert_eq!(report.applied, 3);
    assert!(report.skipped.is_empty());
    assert_eq!(ctx.mutation_count(), 3);

    let report = apply_faults_to_context(&[], &mut ctx);
    assert_eq!(report.applied, 0);
    assert_eq!(ctx.mutation_count(), 3);
}

#[test]
fn test_bad_faults_are_skipped() {
    let store = ClusterStore::default();
    let mut ctx = ScenarioContext::new("skipping", store.cluster());

    let faults = vec![
        xid("dgx-99", Some(0), 79),
        xid("dgx-01", Some(42), 79),
        xid("dgx-01", Some(5), 79),
    ];
    let report = apply_faults_to_context(&faults, &mut ctx);
    assert_eq!(report.applied, 1);
    let skipped: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
    assert_eq!(skipped, vec![0, 1]);
    assert_eq!(ctx.mutation_count(), 1);
    assert!(!ctx.gpu("dgx-01", 5).unwrap().is_accessible());
}

#[test]
fn test_unknown_fault_type_from_json() {
    let fault: FaultConfig =
        serde_json::from_str(r#"{"nodeId": "dgx-01", "type": "cosmic-ray"}"#).unwrap();
    assert_eq!(fault.fault_type, FaultType::Unknown);

    let store = ClusterStore::default();
    let mut ctx = ScenarioContext::new("unknown", store.cluster());
    let report = apply_faults_to_context(&[fault], &mut ctx);
    assert_eq!(report.applied, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(*ctx.cluster(), *store.cluster());
}

#[test]
fn test_contexts_are_independent() {
    let store = ClusterStore::default();
    let mut manager = ScenarioContextManager::new();

    let first = manager.get_or_create("first", store.cluster());
    apply_faults_to_context(&[xid("dgx-01", Some(0), 79)], first);
    let second = manager.get_or_create("second", store.cluster());
    assert!(second.gpu("dgx-01", 0).unwrap().is_accessible());

    manager.set_active_context(Some("first")).unwrap();
    assert_eq!(manager.active_context().unwrap().scenario_id(), "first");
    assert!(manager.set_active_context(Some("missing")).is_err());
    assert!(manager.destroy_context("second"));
    assert!(manager.get("second").is_none());
}

#[test]
fn test_critical_fault_flags_one_gpu() {
    let store = ClusterStore::default();
    let mut ctx = ScenarioContext::new("one-gpu", store.cluster());
    assert_eq!(ctx.node("dgx-01").unwrap().gpus.len(), 8);

    let fault = xid("dgx-01", Some(0), 79).with_severity(Severity::Critical);
    apply_faults_to_context(&[fault], &mut ctx);
    assert_eq!(ctx.mutation_count(), 1);

    let mut command_ctx = CommandContext::new(&mut ctx, "dgx-01");
    let listing = NvidiaSmiSimulator::new().execute(&parse("nvidia-smi -L"), &mut command_ctx);
    let lines: Vec<&str> = listing.output.lines().collect();
    assert_eq!(lines.len(), 8);
    assert!(lines[0].contains("GPU is lost"));
    for (i, line) in lines.iter().enumerate().skip(1) {
        assert!(line.starts_with(&format!("GPU {i}: NVIDIA H100")), "{line}");
    }
    assert_eq!(ctx.gpu("dgx-01", 0).unwrap().health_status, HealthStatus::Critical);
    assert!(ctx.node("dgx-01").unwrap().gpus[1..]
        .iter()
        .all(|g| g.health_status == HealthStatus::Ok));
}
