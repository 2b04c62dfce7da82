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

//! Tool name to simulator dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::parsing::ParsedCommand;
use crate::traits::{CommandContext, CommandResult, Simulator};

/// Maps base command names to simulators. Registering a name again replaces
/// the earlier handler.
#[derive(Clone, Default)]
pub struct CommandRouter {
    routes: BTreeMap<String, Arc<dyn Simulator>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn Simulator>) {
        let name = name.into();
        if self.routes.contains_key(&name) {
            debug!("Replacing handler for '{name}'");
        }
        self.routes.insert(name, handler);
    }

    pub fn register_many(&mut self, names: &[&str], handler: Arc<dyn Simulator>) {
        for name in names {
            self.register(*name, Arc::clone(&handler));
        }
    }

    /// Register under every name the simulator declares.
    pub fn register_simulator(&mut self, simulator: Arc<dyn Simulator>) {
        let commands = simulator.describe().commands;
        self.register_many(commands, simulator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Simulator>> {
        self.routes.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Look up and run; `None` when nothing answers to the base command.
    pub fn dispatch(
        &self,
        parsed: &ParsedCommand,
        ctx: &mut CommandContext<'_>,
    ) -> Option<CommandResult> {
        let simulator = self.routes.get(&parsed.base_command)?;
        debug!(
            "Dispatching '{}' to {}",
            parsed.base_command,
            simulator.describe().name
        );
        Some(simulator.execute(parsed, ctx))
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("commands", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::ClusterStore;
    use crate::traits::SimulatorMetadata;

    struct Fixed(&'static str);

    impl Simulator for Fixed {
        fn describe(&self) -> SimulatorMetadata {
            SimulatorMetadata {
                name: self.0,
                version: "1.0",
                description: "fixed output",
                commands: &["alpha", "beta"],
            }
        }

        fn execute(&self, _parsed: &ParsedCommand, _ctx: &mut CommandContext<'_>) -> CommandResult {
            CommandResult::ok(self.0)
        }
    }

    #[test]
    fn test_register_simulator_uses_declared_names() {
        let mut router = CommandRouter::new();
        router.register_simulator(Arc::new(Fixed("first")));
        assert!(router.contains("alpha"));
        assert!(router.contains("beta"));
        assert!(router.get("gamma").is_none());
        assert_eq!(router.commands().collect::<Vec<_>>(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut router = CommandRouter::new();
        router.register_simulator(Arc::new(Fixed("first")));
        router.register("beta", Arc::new(Fixed("second")));

        let mut store = ClusterStore::default();
        let mut ctx = CommandContext::new(&mut store, "dgx-01");
        let alpha = router.dispatch(&parse("alpha"), &mut ctx).unwrap();
        let beta = router.dispatch(&parse("beta"), &mut ctx).unwrap();
        assert_eq!(alpha.output, "first");
        assert_eq!(beta.output, "second");
        assert!(router.dispatch(&parse("gamma"), &mut ctx).is_none());
    }
}
