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

//! Command-line conventions every routed tool honors.
//!
//! `--version` and a lone `-v` print a version banner, `--help` prints usage,
//! and a stray bare word is refused with a pointer to the usage text.
//! The exemption lists below name the tools whose real counterparts
//! treat those words as data.

use std::sync::Arc;

use hpc_sim::common::config::SimConfig;
use hpc_sim::{ClusterBuildConfig, DefinitionRegistry, Session};
use regex::Regex;

/// Prints its arguments verbatim.
const NO_META_FLAGS: &[&str] = &["echo"];

/// `uname -v` is the kernel build string.
const NO_LONE_V: &[&str] = &["echo", "uname"];

/// Bare words are hosts, paths, job ids, CA names or help topics.
const TAKES_OPERANDS: &[&str] = &[
    "cd",
    "df",
    "echo",
    "explain",
    "help",
    "history",
    "hostname",
    "ibportstate",
    "ibstat",
    "ibstatus",
    "mount",
    "perfquery",
    "sbatch",
    "scancel",
    "srun",
    "ssh",
];

fn session() -> Session {
    Session::with_cluster(
        ClusterBuildConfig::default(),
        Arc::new(DefinitionRegistry::builtin()),
    )
}

fn commands() -> Vec<String> {
    session().router().commands().map(str::to_string).collect()
}

#[test]
fn test_every_tool_prints_a_version_banner() {
    let banner = Regex::new(r"\d+\.\d+").unwrap();
    for command in commands() {
        if NO_META_FLAGS.contains(&command.as_str()) {
            continue;
        }
        let mut flags = vec!["--version"];
        if !NO_LONE_V.contains(&command.as_str()) {
            flags.push("-v");
        }
        for flag in flags {
            let mut session = session();
            let line = format!("{command} {flag}");
            let result = session.execute(&line).result;
            assert_eq!(result.exit_code, SimConfig::EXIT_SUCCESS, "{line}: {}", result.output);
            assert!(banner.is_match(&result.output), "{line}: {}", result.output);
            assert!(!session.in_interactive_mode(), "{line} opened a prompt");
        }
    }
}

#[test]
fn test_every_tool_prints_usage_on_help() {
    for command in commands() {
        if NO_META_FLAGS.contains(&command.as_str()) {
            continue;
        }
        let mut session = session();
        let line = format!("{command} --help");
        let result = session.execute(&line).result;
        assert_eq!(result.exit_code, SimConfig::EXIT_SUCCESS, "{line}: {}", result.output);
        assert!(
            result.output.to_ascii_lowercase().contains("usage"),
            "{line}: {}",
            result.output
        );
        assert!(!session.in_interactive_mode(), "{line} opened a prompt");
    }
}

#[test]
fn test_unknown_subcommand_points_at_usage() {
    for command in commands() {
        if TAKES_OPERANDS.contains(&command.as_str()) {
            continue;
        }
        let mut session = session();
        let line = format!("{command} bogussub");
        let result = session.execute(&line).result;
        assert_ne!(result.exit_code, SimConfig::EXIT_SUCCESS, "{line}: {}", result.output);
        let output = result.output.to_ascii_lowercase();
        assert!(
            output.contains("usage") || output.contains("help"),
            "{line}: {}",
            result.output
        );
        assert!(!session.in_interactive_mode(), "{line} opened a prompt");
    }
}

#[test]
fn test_exemptions_name_routed_tools() {
    let routed = commands();
    for name in NO_META_FLAGS.iter().chain(NO_LONE_V).chain(TAKES_OPERANDS) {
        assert!(routed.iter().any(|c| c == name), "{name} is not routed");
    }
}
