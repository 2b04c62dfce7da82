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

//! `help` and `explain`, answered from the command definition registry.

use std::sync::Arc;

use crate::common::config::SimConfig;
use crate::docs::{CommandDefinition, DefinitionRegistry};
use crate::parsing::ParsedCommand;
use crate::simulators::common::handle_meta_flags;
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};

const HELP_USAGE: &str = "Usage: help [command|category]";
const EXPLAIN_USAGE: &str = "Usage: explain <command> [flags...]";

pub struct MetaSimulator {
    registry: Arc<DefinitionRegistry>,
}

impl MetaSimulator {
    pub fn new(registry: Arc<DefinitionRegistry>) -> Self {
        Self { registry }
    }

    fn help(&self, topic: Option<&str>) -> CommandResult {
        if let Some(topic) = topic {
            if let Some(definition) = self.registry.get(topic) {
                return CommandResult::ok(explain(definition, &[]));
            }
            if !self.registry.categories().contains(&topic) {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    format!("help: no help topics match '{topic}'"),
                );
            }
        }

        let width = self
            .registry
            .iter()
            .map(|d| d.name.len())
            .max()
            .unwrap_or(0);
        let mut out = vec!["Available commands:".to_string()];
        for category in self.registry.categories() {
            if topic.is_some_and(|t| t != category) {
                continue;
            }
            out.push(String::new());
            out.push(format!("[{category}]"));
            out.extend(
                self.registry
                    .iter()
                    .filter(|d| d.category == category)
                    .map(|d| format!("  {:<width$}  {}", d.name, d.description)),
            );
        }
        out.push(String::new());
        out.push("Type 'explain <command>' for details on a command.".to_string());
        CommandResult::ok(out.join("\n"))
    }
}

fn explain(definition: &CommandDefinition, asked: &[String]) -> String {
    if !asked.is_empty() {
        return asked
            .iter()
            .map(|flag| match definition.flag(flag) {
                Some(f) => format!("{}\n    {}", f.display_name(), f.description),
                None => format!("-{flag}: not a documented option of {}", definition.name),
            })
            .collect::<Vec<_>>()
            .join("\n");
    }

    let mut out = vec![
        format!("{} - {}", definition.name, definition.description),
        String::new(),
        "SYNOPSIS".to_string(),
        format!("    {}", definition.synopsis),
    ];
    if !definition.subcommands.is_empty() {
        out.push(String::new());
        out.push("SUBCOMMANDS".to_string());
        out.extend(
            definition
                .subcommands
                .iter()
                .map(|s| format!("    {:<16} {}", s.name, s.description)),
        );
    }
    if !definition.flags.is_empty() {
        out.push(String::new());
        out.push("OPTIONS".to_string());
        for flag in &definition.flags {
            out.push(format!("    {}", flag.display_name()));
            out.push(format!("        {}", flag.description));
        }
    }
    if !definition.exit_codes.is_empty() {
        out.push(String::new());
        out.push("EXIT STATUS".to_string());
        out.extend(
            definition
                .exit_codes
                .iter()
                .map(|c| format!("    {:<4} {}", c.code, c.meaning)),
        );
    }
    if !definition.examples.is_empty() {
        out.push(String::new());
        out.push("EXAMPLES".to_string());
        for example in &definition.examples {
            out.push(format!("    $ {}", example.command));
            out.push(format!("      {}", example.description));
        }
    }
    out.join("\n")
}

impl Simulator for MetaSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "meta",
            version: env!("CARGO_PKG_VERSION"),
            description: "Built-in help",
            commands: &["help", "explain"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, _ctx: &mut CommandContext<'_>) -> CommandResult {
        let words = parsed.words();
        // `explain nvidia-smi --help` documents the flag instead
        if words.iter().all(|w| w.starts_with('-')) {
            let usage = if parsed.base_command == "help" { HELP_USAGE } else { EXPLAIN_USAGE };
            if let Some(result) = handle_meta_flags(parsed, &self.describe(), usage, true) {
                return result;
            }
        }
        if parsed.base_command == "help" {
            return self.help(words.first().map(String::as_str));
        }

        let Some((tool, rest)) = words.split_first() else {
            return CommandResult::usage(EXPLAIN_USAGE);
        };
        let Some(definition) = self.registry.get(tool) else {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("explain: no documentation for '{tool}'"),
            );
        };
        let asked: Vec<String> = rest
            .iter()
            .filter(|w| w.starts_with('-'))
            .map(|w| {
                let name = w.trim_start_matches('-');
                name.split_once('=').map_or(name, |(n, _)| n).to_string()
            })
            .collect();
        CommandResult::ok(explain(definition, &asked))
    }
}
