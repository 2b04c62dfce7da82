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

//! Shell builtins: `pwd`, `cd`, `echo`, `whoami`, `history` and `ssh`.
//!
//! Builtins work on every host, including the head node. `cd`, `ssh` and
//! `history -c` change the context's cwd, current node or history; the session
//! keeps whatever the context holds after the command.

use crate::common::config::SimConfig;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, reject_operand};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};

/// Directories that exist on every simulated host.
const KNOWN_DIRS: &[&str] = &[
    "/", "/root", "/home", "/tmp", "/etc", "/opt", "/var", "/var/log", "/raid", "/lustre",
    "/cm", "/cm/shared", "/cm/shared/apps",
];

const OPENSSH_VERSION: &str = "OpenSSH_8.9p1 Ubuntu-3ubuntu0.6, OpenSSL 3.0.2 15 Mar 2022";

fn usage(command: &str) -> &'static str {
    match command {
        "pwd" => "pwd: usage: pwd [-LP]",
        "cd" => "cd: usage: cd [-L|[-P [-e]] [-@]] [dir]",
        "whoami" => "Usage: whoami [OPTION]...\nPrint the user name associated with the current effective user ID.",
        "history" => "history: usage: history [-c] [-d offset] [n]",
        _ => "usage: ssh [-l login_name] [-p port] destination [command]",
    }
}

pub struct ShellSimulator;

impl ShellSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShellSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn home(ctx: &CommandContext<'_>) -> String {
    ctx.env
        .get("HOME")
        .cloned()
        .unwrap_or_else(|| SimConfig::DEFAULT_CWD.to_string())
}

/// Resolve `target` against `cwd`, folding `.` and `..`.
fn resolve_path(cwd: &str, target: &str, home: &str) -> String {
    let joined = if target == "~" {
        home.to_string()
    } else if let Some(rest) = target.strip_prefix("~/") {
        format!("{home}/{rest}")
    } else if target.starts_with('/') {
        target.to_string()
    } else {
        format!("{cwd}/{target}")
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

fn is_directory(path: &str) -> bool {
    KNOWN_DIRS.contains(&path)
        || path.starts_with("/lustre/")
        || path.starts_with("/raid/")
        || path.starts_with("/home/")
}

/// Expand `$VAR` and `${VAR}` from the context environment.
fn expand_vars(text: &str, ctx: &CommandContext<'_>) -> String {
    let lookup = |name: &str| -> String {
        match name {
            "HOSTNAME" => ctx.current_node.clone(),
            "PWD" => ctx.cwd.clone(),
            "USER" => ctx.user().to_string(),
            "HOME" => home(ctx),
            _ => ctx.env.get(name).cloned().unwrap_or_default(),
        }
    };
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if braced && chars.peek() == Some(&'}') {
            chars.next();
        }
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&lookup(&name));
        }
    }
    out
}

fn echo(parsed: &ParsedCommand, ctx: &CommandContext<'_>) -> CommandResult {
    let words = parsed.words();
    let mut escapes = false;
    let mut skip = 0;
    for word in &words {
        match word.as_str() {
            "-n" => {}
            "-e" => escapes = true,
            "-E" => escapes = false,
            _ => break,
        }
        skip += 1;
    }
    let text = expand_vars(&words[skip..].join(" "), ctx);
    let text = if escapes {
        text.replace("\\n", "\n").replace("\\t", "\t")
    } else {
        text
    };
    CommandResult::ok(text)
}

fn history(parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
    if parsed.has_flag("c") {
        ctx.history.clear();
        return CommandResult::ok("");
    }
    let skip = match parsed.args().next() {
        Some(n) => match n.parse::<usize>() {
            Ok(n) => ctx.history.len().saturating_sub(n),
            Err(_) => {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    format!("bash: history: {n}: numeric argument required"),
                )
            }
        },
        None => 0,
    };
    CommandResult::ok(
        ctx.history
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, line)| format!("{:>5}  {line}", i + 1))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn ssh(parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
    let Some(target) = parsed.args().next() else {
        return CommandResult::error(255, usage("ssh"));
    };
    let host = target.rsplit('@').next().unwrap_or(target);
    let known = ctx.state.node(host).map(|n| n.hostname.clone()).or_else(|| {
        let ha = &ctx.state.cluster().ha;
        [ha.primary_head_node.as_str(), ha.secondary_head_node.as_str()]
            .contains(&host)
            .then(|| host.to_string())
    });
    match known {
        Some(hostname) => {
            ctx.current_node = hostname;
            ctx.cwd = home(ctx);
            CommandResult::ok("")
        }
        None => CommandResult::error(
            255,
            format!("ssh: Could not resolve hostname {host}: Name or service not known"),
        ),
    }
}

impl Simulator for ShellSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "shell",
            version: "5.1.16",
            description: "Shell builtins",
            commands: &["pwd", "cd", "echo", "whoami", "history", "ssh"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let command = parsed.base_command.as_str();
        // echo prints option-looking words like any other operand
        if command == "echo" {
            return echo(parsed, ctx);
        }
        let lone_v = parsed.has_flag("v") && parsed.args().next().is_none();
        if command == "ssh" && (parsed.has_any_flag(&["V", "version"]) || lone_v) {
            return CommandResult::ok(OPENSSH_VERSION);
        }
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), usage(command), false) {
            return result;
        }
        if matches!(command, "pwd" | "whoami") {
            if let Some(result) = reject_operand(parsed) {
                return result;
            }
        }
        match command {
            "pwd" => CommandResult::ok(ctx.cwd.clone()),
            "whoami" => CommandResult::ok(ctx.user().to_string()),
            "history" => history(parsed, ctx),
            "ssh" => ssh(parsed, ctx),
            "cd" => {
                let home = home(ctx);
                let target = parsed.args().next().unwrap_or(home.as_str());
                let path = resolve_path(&ctx.cwd, target, &home);
                if is_directory(&path) {
                    ctx.cwd = path;
                    CommandResult::ok("")
                } else {
                    CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("bash: cd: {target}: No such file or directory"),
                    )
                }
            }
            other => CommandResult::error(
                SimConfig::EXIT_COMMAND_NOT_FOUND,
                format!("{other}: command not found"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::ClusterStore;

    #[test]
    fn test_cd_and_pwd() {
        let mut store = ClusterStore::default();
        let mut ctx = CommandContext::new(&mut store, "bcm-head01");
        let shell = ShellSimulator::new();

        assert_eq!(shell.execute(&parse("cd /lustre/projects"), &mut ctx).exit_code, 0);
        assert_eq!(shell.execute(&parse("pwd"), &mut ctx).output, "/lustre/projects");
        shell.execute(&parse("cd ../.."), &mut ctx);
        assert_eq!(ctx.cwd, "/");
        let missing = shell.execute(&parse("cd /nonexistent"), &mut ctx);
        assert_eq!(missing.exit_code, 1);
        assert_eq!(ctx.cwd, "/");
        shell.execute(&parse("cd"), &mut ctx);
        assert_eq!(ctx.cwd, "/root");
    }

    #[test]
    fn test_echo_expands_variables() {
        let mut store = ClusterStore::default();
        let mut ctx = CommandContext::new(&mut store, "dgx-03");
        ctx.env.insert("CUDA_VISIBLE_DEVICES".to_string(), "0,1".to_string());
        let result = ShellSimulator::new().execute(
            &parse("echo host=$HOSTNAME gpus=${CUDA_VISIBLE_DEVICES} cost=$"),
            &mut ctx,
        );
        assert_eq!(result.output, "host=dgx-03 gpus=0,1 cost=$");
    }

    #[test]
    fn test_history_numbering() {
        let mut store = ClusterStore::default();
        let mut ctx = CommandContext::new(&mut store, "dgx-01");
        ctx.history = vec!["nvidia-smi".to_string(), "sinfo".to_string(), "history 2".to_string()];
        let result = ShellSimulator::new().execute(&parse("history 2"), &mut ctx);
        assert_eq!(result.output, "    2  sinfo\n    3  history 2");
    }

    #[test]
    fn test_builtin_meta_flags() {
        let mut store = ClusterStore::default();
        let mut ctx = CommandContext::new(&mut store, "dgx-01");
        let shell = ShellSimulator::new();

        let version = shell.execute(&parse("pwd --version"), &mut ctx);
        assert_eq!(version.output, "pwd version 5.1.16");
        let help = shell.execute(&parse("cd --help"), &mut ctx);
        assert!(help.output.starts_with("cd: usage:"));
        assert_eq!(ctx.cwd, "/root");
        assert!(shell.execute(&parse("ssh -V"), &mut ctx).output.starts_with("OpenSSH_"));
        assert_eq!(ctx.current_node, "dgx-01");

        let extra = shell.execute(&parse("whoami bogus"), &mut ctx);
        assert_eq!(extra.exit_code, 1);
        assert_eq!(shell.execute(&parse("echo --version"), &mut ctx).output, "--version");
    }

    #[test]
    fn test_ssh_switches_node() {
        let mut store = ClusterStore::default();
        let mut ctx = CommandContext::new(&mut store, "bcm-head01");
        let shell = ShellSimulator::new();
        assert_eq!(shell.execute(&parse("ssh root@dgx-04"), &mut ctx).exit_code, 0);
        assert_eq!(ctx.current_node, "dgx-04");
        assert_eq!(shell.execute(&parse("ssh dgx-99"), &mut ctx).exit_code, 255);
        assert_eq!(ctx.current_node, "dgx-04");
        shell.execute(&parse("ssh bcm-head01"), &mut ctx);
        assert_eq!(ctx.current_node, "bcm-head01");
    }
}
