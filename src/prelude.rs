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

//! The hpc-sim prelude.
//!
//! Convenient re-exports for embedding the simulator. Import everything with:
//!
//! ```rust
//! use hpc_sim::prelude::*;
//! ```
//!
//! # Example
//!
//! ```rust
//! use hpc_sim::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut session = Session::with_cluster(
//!         ClusterBuildConfig::default(),
//!         std::sync::Arc::new(DefinitionRegistry::builtin()),
//!     );
//!     let scenario = ScenarioDefinition::from_json(
//!         r#"{"id": "hot", "title": "Hot GPU",
//!             "faults": [{"nodeId": "dgx-01", "gpuId": 0, "type": "thermal", "severity": "warning"}],
//!             "steps": [{"id": "look", "title": "Check temperatures",
//!                        "expectedCommands": ["nvidia-smi"]}]}"#,
//!     )?;
//!     let report = session.start_scenario(scenario)?;
//!     assert_eq!(report.applied, 1);
//!
//!     let out = session.execute("nvidia-smi");
//!     assert!(!out.step_events.is_empty());
//!     Ok(())
//! }
//! ```

// Session and dispatch
pub use crate::router::CommandRouter;
pub use crate::session::{Session, SessionOutput};

// Error types
pub use crate::error::{Error, Result};

// Parsing
pub use crate::parsing::{parse, FlagValue, ParsedCommand};

// Cluster model
pub use crate::state::types::{
    ClusterConfig, Gpu, HealthStatus, Hca, Node, Severity, SlurmNodeState, SystemType, XidError,
};
pub use crate::state::{build_cluster, ClusterBuildConfig, ClusterStore};

// Scenarios and validation
pub use crate::scenario::{
    apply_faults_to_context, FaultConfig, FaultReport, FaultType, ScenarioContext,
    ScenarioContextManager, ScenarioDefinition,
};
pub use crate::validation::{ScenarioValidator, StepEvent, StepStatus};

// Traits for custom simulators
pub use crate::traits::{ClusterState, CommandContext, CommandResult, Simulator, SimulatorMetadata};

// Documentation registry
pub use crate::docs::DefinitionRegistry;
