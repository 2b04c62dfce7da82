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

//! Unified error types for the hpc-sim library.
//!
//! Errors here are returned by state mutations and by file loaders. Simulators
//! never surface them directly: they translate them into a [`CommandResult`]
//! with a nonzero exit code, the way the real tools print an error and exit.
//!
//! # Example
//!
//! ```rust
//! use hpc_sim::{ClusterBuildConfig, ClusterStore, Error};
//! use hpc_sim::state::GpuUpdate;
//! use hpc_sim::traits::ClusterState;
//!
//! let mut store = ClusterStore::new(ClusterBuildConfig::default());
//! let err = store
//!     .update_gpu("no-such-node", 0, GpuUpdate::default())
//!     .unwrap_err();
//! assert!(matches!(err, Error::NodeNotFound(_)));
//! ```
//!
//! [`CommandResult`]: crate::traits::CommandResult

use thiserror::Error;

/// The main error type for hpc-sim library operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No node with the given id or hostname exists in the cluster.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The node exists but has no GPU with this index.
    #[error("GPU {gpu} not found on node {node}")]
    GpuNotFound { node: String, gpu: u32 },

    #[error("HCA {hca} not found on node {node}")]
    HcaNotFound { node: String, hca: String },

    #[error("Port {port} not found on {hca}")]
    PortNotFound { hca: String, port: u32 },

    #[error("NVLink {link} not found on GPU {gpu} of node {node}")]
    NvLinkNotFound { node: String, gpu: u32, link: u32 },

    /// No job with this id is known to the scheduler.
    #[error("Invalid job id specified: {0}")]
    JobNotFound(u32),

    /// The GPU already belongs to another job.
    ///
    /// Allocation is exclusive; the request is rejected as a whole and no
    /// GPU of the request is allocated.
    #[error("GPU {gpu} on node {node} is already allocated to job {job}")]
    GpuAlreadyAllocated { node: String, gpu: u32, job: u32 },

    /// The requested change is not valid for the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A scenario or command definition document is malformed.
    #[error("Invalid scenario definition: {0}")]
    InvalidScenario(String),

    /// A command definition registry document is malformed.
    #[error("Invalid command definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while loading a definition file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for hpc-sim operations.
pub type Result<T> = std::result::Result<T, Error>;
