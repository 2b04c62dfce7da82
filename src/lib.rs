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

//! Simulated HPC/GPU cluster administration tools.
//!
//! A [`Session`] takes one command line at a time, routes it to the
//! simulator answering to its base command and returns what the real tool
//! would print. All simulators read and write one shared cluster model, so
//! `nvidia-smi`, `dcgmi` and `ipmitool` agree about the same GPU, and
//! scenarios inject faults into a private copy of that model.
//!
//! ```rust
//! use std::sync::Arc;
//! use hpc_sim::{ClusterBuildConfig, DefinitionRegistry, Session};
//!
//! let mut session = Session::with_cluster(
//!     ClusterBuildConfig::default(),
//!     Arc::new(DefinitionRegistry::builtin()),
//! );
//! let out = session.execute("nvidia-smi -L");
//! assert_eq!(out.result.exit_code, 0);
//! assert_eq!(out.result.output.lines().count(), 8);
//! ```

#[macro_use]
pub mod parsing;
pub mod cli;
pub mod docs;
pub mod error;
pub mod pipeline;
pub mod prelude;
pub mod router;
pub mod scenario;
pub mod session;
pub mod simulators;
pub mod state;
pub mod traits;
pub mod utils;
pub mod validation;

// Re-export just the config module from common for library users
pub mod common {
    pub mod config;
}

pub use docs::DefinitionRegistry;
pub use error::{Error, Result};
pub use router::CommandRouter;
pub use session::{Session, SessionOutput};
pub use state::{ClusterBuildConfig, ClusterStore};
