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

//! Command matching for step validation.
//!
//! Both sides are normalized first (case, whitespace, shell substitution
//! syntax, plural object names after `show`/`list`), then compared
//! structurally: the executed command may carry extra flags and extra
//! trailing operands, but must contain everything the expected one names.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parsing::{parse, FlagValue, ParsedCommand};

static BACKTICK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").unwrap());
static SUBSTITUTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\(\s*([^()]*?)\s*\)").unwrap());

const OBJECT_SYNONYMS: &[(&str, &str)] = &[
    ("nodes", "node"),
    ("jobs", "job"),
    ("partitions", "partition"),
    ("gpus", "gpu"),
    ("devices", "device"),
];

/// Canonical form of a command line for comparison.
pub fn normalize_command(command: &str) -> String {
    let lowered = command.trim().to_lowercase();
    let substituted = BACKTICK_RE.replace_all(&lowered, "$$(${1})");
    let substituted = SUBSTITUTION_RE.replace_all(&substituted, |caps: &regex::Captures| {
        let inner: Vec<&str> = caps[1].split_whitespace().collect();
        format!("$({})", inner.join(" "))
    });

    let mut tokens: Vec<String> = Vec::new();
    let mut fold_next = false;
    for token in substituted.split_whitespace() {
        let token = if fold_next {
            OBJECT_SYNONYMS
                .iter()
                .find(|(plural, _)| *plural == token)
                .map(|(_, singular)| singular.to_string())
                .unwrap_or_else(|| token.to_string())
        } else {
            token.to_string()
        };
        fold_next = token == "show" || token == "list";
        tokens.push(token);
    }
    tokens.join(" ")
}

/// Whether `executed` satisfies `expected`.
pub fn command_matches(executed: &str, expected: &str) -> bool {
    let executed = parse(&normalize_command(executed));
    let expected = parse(&normalize_command(expected));
    structurally_matches(&executed, &expected)
}

fn structurally_matches(executed: &ParsedCommand, expected: &ParsedCommand) -> bool {
    if expected.is_empty() || executed.base_command != expected.base_command {
        return false;
    }
    if !executed.subcommands.starts_with(&expected.subcommands) {
        return false;
    }
    let executed_args: Vec<&str> = executed.args().collect();
    if !expected
        .positional_args
        .iter()
        .all(|p| executed_args.contains(&p.as_str()))
    {
        return false;
    }
    expected.flags.iter().all(|(name, value)| match value {
        FlagValue::Bool(_) => executed.has_flag(name),
        FlagValue::Value(v) => executed.flag_value(name) == Some(v.as_str()),
    })
}

/// Indices of the expected commands that `executed` satisfies.
pub fn matching_indices(executed: &str, expected: &[String]) -> Vec<usize> {
    expected
        .iter()
        .enumerate()
        .filter(|(_, e)| command_matches(executed, e))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_whitespace() {
        assert_eq!(normalize_command("  NVIDIA-SMI   -q  "), "nvidia-smi -q");
    }

    #[test]
    fn test_normalize_plural_after_show() {
        assert_eq!(
            normalize_command("scontrol show nodes"),
            "scontrol show node"
        );
        assert_eq!(normalize_command("cmsh -c 'device list'"), "cmsh -c 'device list'");
        // Only the object right after show/list is folded
        assert_eq!(normalize_command("echo nodes"), "echo nodes");
    }

    #[test]
    fn test_normalize_substitution() {
        assert_eq!(
            normalize_command("echo `hostname`"),
            normalize_command("echo $( hostname )")
        );
    }

    #[test]
    fn test_flag_tolerance() {
        assert!(command_matches("nvidia-smi -q -d TEMPERATURE", "nvidia-smi -q"));
        assert!(!command_matches("nvidia-smi", "nvidia-smi -q"));
        assert!(command_matches("nvidia-smi -r -i 0", "nvidia-smi -r -i 0"));
        assert!(!command_matches("nvidia-smi -r -i 1", "nvidia-smi -r -i 0"));
    }

    #[test]
    fn test_extra_operands_accepted() {
        assert!(command_matches("scontrol show node dgx-01", "scontrol show node"));
        assert!(command_matches("scontrol show nodes", "scontrol show node"));
        assert!(!command_matches("scontrol show job", "scontrol show node"));
        assert!(command_matches("NVIDIA-SMI", "nvidia-smi"));
    }

    #[test]
    fn test_matching_indices() {
        let expected = vec!["sinfo".to_string(), "squeue".to_string(), "sinfo -R".to_string()];
        assert_eq!(matching_indices("sinfo -R", &expected), vec![0, 2]);
        assert!(matching_indices("ibstat", &expected).is_empty());
    }
}
