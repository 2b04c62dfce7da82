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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::common::config::SimConfig;
use crate::parsing::ParsedCommand;
use crate::traits::ClusterState;

/// Static description of a simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatorMetadata {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    /// Base command names this simulator answers to.
    pub commands: &'static [&'static str],
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub output: String,
    pub exit_code: i32,
    /// Set when the command enters (or stays in) an interactive sub-mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl CommandResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: SimConfig::EXIT_SUCCESS,
            prompt: None,
        }
    }

    pub fn error(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code,
            prompt: None,
        }
    }

    /// Usage error, exit code 2 like most argument parsers.
    pub fn usage(output: impl Into<String>) -> Self {
        Self::error(SimConfig::EXIT_USAGE, output)
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == SimConfig::EXIT_SUCCESS
    }
}

/// Everything a simulator may look at or change while running a command.
pub struct CommandContext<'a> {
    /// Hostname the shell is logged into.
    pub current_node: String,
    pub cwd: String,
    pub env: HashMap<String, String>,
    pub history: Vec<String>,
    pub state: &'a mut dyn ClusterState,
}

impl<'a> CommandContext<'a> {
    pub fn new(state: &'a mut dyn ClusterState, current_node: impl Into<String>) -> Self {
        Self {
            current_node: current_node.into(),
            cwd: SimConfig::DEFAULT_CWD.to_string(),
            env: HashMap::new(),
            history: Vec::new(),
            state,
        }
    }

    pub fn user(&self) -> &str {
        self.env
            .get("USER")
            .map(String::as_str)
            .unwrap_or(SimConfig::DEFAULT_USER)
    }
}

/// A simulated command-line tool.
///
/// Implementations are stateless between calls: everything persistent lives in
/// the cluster state, and interactive sub-modes are carried by the prompt
/// string that the caller hands back on the next line.
pub trait Simulator: Send + Sync {
    fn describe(&self) -> SimulatorMetadata;

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult;

    /// Handle one line typed while in the sub-mode identified by `prompt`.
    ///
    /// Returning a result without a prompt leaves the sub-mode.
    fn execute_interactive(
        &self,
        line: &str,
        _prompt: &str,
        ctx: &mut CommandContext<'_>,
    ) -> CommandResult {
        self.execute(&crate::parsing::parse(line), ctx)
    }
}
