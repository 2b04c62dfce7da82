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

//! Helpers shared by the simulators.

use crate::common::config::SimConfig;
use crate::error::Error;
use crate::parsing::ParsedCommand;
use crate::state::types::Node;
use crate::traits::{CommandContext, CommandResult, SimulatorMetadata};

/// Answer `--version` and `--help` uniformly.
///
/// A lone `-v` is also taken as a version request.
/// `-h` counts as help only when `short_help` is set, since several tools
/// use it for something else (`ipmitool -H`, `df -h`).
pub fn handle_meta_flags(
    parsed: &ParsedCommand,
    meta: &SimulatorMetadata,
    usage: &str,
    short_help: bool,
) -> Option<CommandResult> {
    let lone_v = parsed.flags.len() == 1
        && parsed.has_flag("v")
        && parsed.subcommands.is_empty()
        && parsed.positional_args.is_empty();
    if parsed.has_flag("version") || lone_v {
        return Some(CommandResult::ok(version_banner(parsed, meta)));
    }
    if parsed.has_flag("help") || (short_help && parsed.has_flag("h")) {
        return Some(CommandResult::ok(usage.to_string()));
    }
    None
}

pub fn version_banner(parsed: &ParsedCommand, meta: &SimulatorMetadata) -> String {
    format!("{} version {}", parsed.base_command, meta.version)
}

/// The node the shell is on, or an error result naming the tool.
pub fn local_node<'a>(ctx: &'a CommandContext<'_>, tool: &str) -> Result<&'a Node, CommandResult> {
    ctx.state.node(&ctx.current_node).ok_or_else(|| {
        CommandResult::error(
            SimConfig::EXIT_FAILURE,
            format!("{tool}: not supported on {}", ctx.current_node),
        )
    })
}

/// Turn a state error into the tool's error output.
pub fn state_error(tool: &str, err: &Error) -> CommandResult {
    CommandResult::error(SimConfig::EXIT_FAILURE, format!("{tool}: {err}"))
}

/// Nonzero result for an unrecognized subcommand, with a usage hint.
pub fn unknown_subcommand(tool: &str, sub: &str, usage_hint: &str) -> CommandResult {
    CommandResult::usage(format!(
        "{tool}: invalid command '{sub}'\n{usage_hint}"
    ))
}

/// Reject a bare word given to a tool that takes no operands.
pub fn reject_operand(parsed: &ParsedCommand) -> Option<CommandResult> {
    let word = parsed.subcommand(0)?;
    let tool = &parsed.base_command;
    Some(CommandResult::error(
        SimConfig::EXIT_FAILURE,
        format!("{tool}: extra operand '{word}'\nTry '{tool} --help' for more information."),
    ))
}

pub fn is_true(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "on" | "enable" | "enabled" | "true" | "yes")
}
