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

//! One learner's shell: what runs a line end to end.
//!
//! The session owns the canonical store, the scenario contexts and the
//! router. Commands read and write the active scenario context when one is
//! running and the store otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::common::config::SimConfig;
use crate::docs::DefinitionRegistry;
use crate::error::Result;
use crate::parsing::parse;
use crate::pipeline::apply_pipeline;
use crate::router::CommandRouter;
use crate::scenario::{
    apply_faults_to_context, FaultReport, ScenarioContextManager, ScenarioDefinition,
};
use crate::simulators::default_router;
use crate::state::types::ClusterConfig;
use crate::state::{ClusterBuildConfig, ClusterStore};
use crate::traits::{ClusterState, CommandContext, CommandResult};
use crate::validation::{ScenarioValidator, StepEvent};

/// What a line produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutput {
    pub result: CommandResult,
    pub step_events: Vec<StepEvent>,
}

/// A tool sub-mode such as `nvsm->` or a cmsh prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InteractiveMode {
    command: String,
    prompt: String,
}

/// Where `ssh` came from, restored by `exit`.
#[derive(Debug, Clone)]
struct Login {
    node: String,
    cwd: String,
}

pub struct Session {
    store: ClusterStore,
    contexts: ScenarioContextManager,
    router: CommandRouter,
    current_node: String,
    cwd: String,
    env: HashMap<String, String>,
    history: Vec<String>,
    logins: Vec<Login>,
    mode: Option<InteractiveMode>,
    scenario: Option<ScenarioValidator>,
    exited: bool,
}

fn active_state<'a>(
    contexts: &'a mut ScenarioContextManager,
    store: &'a mut ClusterStore,
) -> &'a mut dyn ClusterState {
    match contexts.active_context_mut() {
        Some(context) => context,
        None => store,
    }
}

fn active_cluster<'a>(contexts: &'a ScenarioContextManager, store: &'a ClusterStore) -> &'a ClusterConfig {
    match contexts.active_context() {
        Some(context) => context.cluster(),
        None => store.cluster(),
    }
}

impl Session {
    pub fn new(store: ClusterStore, router: CommandRouter) -> Self {
        let current_node = store
            .cluster()
            .nodes
            .first()
            .map(|n| n.hostname.clone())
            .unwrap_or_else(|| SimConfig::HEAD_NODE.to_string());
        let mut env = HashMap::new();
        env.insert("USER".to_string(), SimConfig::DEFAULT_USER.to_string());
        env.insert("HOME".to_string(), SimConfig::DEFAULT_CWD.to_string());
        Self {
            store,
            contexts: ScenarioContextManager::new(),
            router,
            current_node,
            cwd: SimConfig::DEFAULT_CWD.to_string(),
            env,
            history: Vec::new(),
            logins: Vec::new(),
            mode: None,
            scenario: None,
            exited: false,
        }
    }

    /// A session over a freshly built cluster with every simulator registered.
    pub fn with_cluster(config: ClusterBuildConfig, registry: Arc<DefinitionRegistry>) -> Self {
        Self::new(ClusterStore::new(config), default_router(registry))
    }

    pub fn current_node(&self) -> &str {
        &self.current_node
    }

    /// Log the shell into `node` without going through `ssh`.
    pub fn set_current_node(&mut self, node: impl Into<String>) {
        self.current_node = node.into();
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn store(&self) -> &ClusterStore {
        &self.store
    }

    /// The cluster as commands currently see it.
    pub fn cluster(&self) -> &ClusterConfig {
        active_cluster(&self.contexts, &self.store)
    }

    pub fn contexts(&self) -> &ScenarioContextManager {
        &self.contexts
    }

    pub fn validator(&self) -> Option<&ScenarioValidator> {
        self.scenario.as_ref()
    }

    pub fn in_interactive_mode(&self) -> bool {
        self.mode.is_some()
    }

    /// Set once `exit` is typed at the outermost shell.
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    pub fn prompt(&self) -> String {
        if let Some(mode) = &self.mode {
            return mode.prompt.clone();
        }
        let user = self
            .env
            .get("USER")
            .map(String::as_str)
            .unwrap_or(SimConfig::DEFAULT_USER);
        let home = self
            .env
            .get("HOME")
            .map(String::as_str)
            .unwrap_or(SimConfig::DEFAULT_CWD);
        let dir = match self.cwd.strip_prefix(home) {
            Some("") => "~".to_string(),
            Some(rest) if rest.starts_with('/') => format!("~{rest}"),
            _ => self.cwd.clone(),
        };
        let sigil = if user == "root" { '#' } else { '$' };
        format!("{user}@{}:{dir}{sigil} ", self.current_node)
    }

    /// Start a scenario: build its private context, apply its faults and
    /// make it the one commands see. A running scenario is ended first.
    pub fn start_scenario(&mut self, definition: ScenarioDefinition) -> Result<FaultReport> {
        if self.scenario.is_some() {
            self.end_scenario();
        }
        let context = self.contexts.get_or_create(&definition.id, self.store.cluster());
        let report = apply_faults_to_context(&definition.faults, context);
        self.contexts.set_active_context(Some(&definition.id))?;
        info!(
            "Started scenario '{}' ({} faults applied, {} skipped)",
            definition.id,
            report.applied,
            report.skipped.len()
        );
        self.mode = None;
        self.scenario = Some(ScenarioValidator::new(definition));
        Ok(report)
    }

    /// Leave the running scenario and drop its context. The store is untouched.
    pub fn end_scenario(&mut self) -> Option<ScenarioValidator> {
        let validator = self.scenario.take()?;
        let id = validator.definition().id.clone();
        // Deactivating a known id cannot fail
        let _ = self.contexts.set_active_context(None);
        self.contexts.destroy_context(&id);
        self.mode = None;
        info!("Ended scenario '{id}'");
        Some(validator)
    }

    /// Rebuild the canonical cluster from its build configuration.
    pub fn reset_cluster(&mut self) {
        self.store.reset();
        self.mode = None;
        info!("Cluster state reset");
    }

    /// Run one line typed by the learner.
    pub fn execute(&mut self, line: &str) -> SessionOutput {
        let result = match self.mode.clone() {
            Some(mode) => self.execute_in_mode(&mode, line),
            None => self.execute_shell(line),
        };
        let step_events = self.observe(line, &result);
        SessionOutput {
            result,
            step_events,
        }
    }

    fn context_parts(&mut self) -> (CommandContext<'_>, &CommandRouter) {
        let ctx = CommandContext {
            current_node: self.current_node.clone(),
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            history: self.history.clone(),
            state: active_state(&mut self.contexts, &mut self.store),
        };
        (ctx, &self.router)
    }

    fn execute_in_mode(&mut self, mode: &InteractiveMode, line: &str) -> CommandResult {
        self.record_history(line);
        let Some(simulator) = self.router.get(&mode.command) else {
            self.mode = None;
            return CommandResult::error(
                SimConfig::EXIT_COMMAND_NOT_FOUND,
                format!("{}: command not found", mode.command),
            );
        };
        let result = {
            let (mut ctx, _) = self.context_parts();
            simulator.execute_interactive(line, &mode.prompt, &mut ctx)
        };
        self.mode = result.prompt.clone().map(|prompt| InteractiveMode {
            command: mode.command.clone(),
            prompt,
        });
        if self.mode.is_none() {
            debug!("Left {} interactive mode", mode.command);
        }
        result
    }

    fn execute_shell(&mut self, line: &str) -> CommandResult {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return CommandResult::ok("");
        }
        self.record_history(trimmed);

        let parsed = parse(trimmed);
        if matches!(parsed.base_command.as_str(), "exit" | "logout") {
            return self.logout();
        }

        let (dispatched, current_node, cwd, env, history) = {
            let (mut ctx, router) = self.context_parts();
            let dispatched = router.dispatch(&parsed, &mut ctx);
            (dispatched, ctx.current_node, ctx.cwd, ctx.env, ctx.history)
        };
        let Some(result) = dispatched else {
            return CommandResult::error(
                SimConfig::EXIT_COMMAND_NOT_FOUND,
                format!("{}: command not found", parsed.base_command),
            );
        };

        if current_node != self.current_node {
            debug!("Login moved from {} to {current_node}", self.current_node);
            self.logins.push(Login {
                node: std::mem::replace(&mut self.current_node, current_node),
                cwd: self.cwd.clone(),
            });
        }
        self.cwd = cwd;
        self.env = env;
        self.history = history;

        if let Some(prompt) = result.prompt.clone() {
            self.mode = Some(InteractiveMode {
                command: parsed.base_command.clone(),
                prompt,
            });
        }
        if parsed.pipe_segments().is_empty() {
            result
        } else {
            apply_pipeline(result, parsed.pipe_segments())
        }
    }

    fn record_history(&mut self, line: &str) {
        self.history.push(line.to_string());
        if self.history.len() > SimConfig::HISTORY_MAX_ENTRIES {
            let excess = self.history.len() - SimConfig::HISTORY_MAX_ENTRIES;
            self.history.drain(..excess);
        }
    }

    fn logout(&mut self) -> CommandResult {
        match self.logins.pop() {
            Some(login) => {
                let left = std::mem::replace(&mut self.current_node, login.node);
                self.cwd = login.cwd;
                CommandResult::ok(format!("logout\nConnection to {left} closed."))
            }
            None => {
                self.exited = true;
                CommandResult::ok("logout")
            }
        }
    }

    fn observe(&mut self, line: &str, result: &CommandResult) -> Vec<StepEvent> {
        let Some(validator) = self.scenario.as_mut() else {
            return Vec::new();
        };
        let command = match &self.mode {
            Some(mode) if !line.trim_start().starts_with(&mode.command) => {
                format!("{} {}", mode.command, line.trim())
            }
            _ => line.trim().to_string(),
        };
        let cluster = active_cluster(&self.contexts, &self.store);
        validator.observe(&command, result, cluster, &self.current_node)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("current_node", &self.current_node)
            .field("cwd", &self.cwd)
            .field("mode", &self.mode)
            .field("scenario", &self.scenario.as_ref().map(|v| &v.definition().id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::with_cluster(
            ClusterBuildConfig::default(),
            Arc::new(DefinitionRegistry::builtin()),
        )
    }

    #[test]
    fn test_unknown_command() {
        let mut session = session();
        let out = session.execute("frobnicate --now");
        assert_eq!(out.result.exit_code, SimConfig::EXIT_COMMAND_NOT_FOUND);
        assert_eq!(out.result.output, "frobnicate: command not found");
    }

    #[test]
    fn test_history_and_cwd_persist() {
        let mut session = session();
        session.execute("cd /lustre");
        assert_eq!(session.cwd(), "/lustre");
        assert_eq!(session.execute("pwd").result.output, "/lustre");
        let history = session.execute("history").result.output;
        assert!(history.contains("cd /lustre"));
        assert_eq!(session.history().len(), 3);
    }

    #[test]
    fn test_ssh_and_exit() {
        let mut session = session();
        assert_eq!(session.current_node(), "dgx-01");
        session.execute("ssh dgx-03");
        assert_eq!(session.current_node(), "dgx-03");
        assert!(session.prompt().starts_with("root@dgx-03:~#"));
        let out = session.execute("exit");
        assert!(out.result.output.contains("Connection to dgx-03 closed."));
        assert_eq!(session.current_node(), "dgx-01");
        assert!(!session.has_exited());
        session.execute("exit");
        assert!(session.has_exited());
    }

    #[test]
    fn test_interactive_mode_round_trip() {
        let mut session = session();
        let entered = session.execute("nvsm");
        assert!(entered.result.prompt.is_some());
        assert!(session.in_interactive_mode());
        assert_eq!(session.prompt(), entered.result.prompt.unwrap());

        let shown = session.execute("show health");
        assert!(shown.result.output.contains("Health"));
        session.execute("exit");
        assert!(!session.in_interactive_mode());
    }

    #[test]
    fn test_pipes_filter_output() {
        let mut session = session();
        let out = session.execute("nvidia-smi -L | wc -l");
        assert_eq!(out.result.output, "8");
        let none = session.execute("nvidia-smi -L | grep B200");
        assert_eq!(none.result.exit_code, SimConfig::EXIT_FAILURE);
    }
}
