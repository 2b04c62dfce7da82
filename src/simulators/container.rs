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

//! Container runtimes: `docker` and `enroot`.
//!
//! Containers started detached (and enroot containers) are kept in the node
//! state; foreground runs only report what the container would print.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::common::config::SimConfig;
use crate::error::Error;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, local_node, state_error};
use crate::state::constants::{DOCKER_VERSION, ENROOT_VERSION};
use crate::state::types::{Container, Node};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};
use crate::utils::render_table;

/// docker exits with 125 when the daemon refuses to create the container.
const EXIT_DAEMON_ERROR: i32 = 125;
/// Status that marks an enroot container in the node's container list.
const ENROOT_STATUS: &str = "enroot";

/// Images present in the local cache of every node: (repository, tag, size).
const CACHED_IMAGES: &[(&str, &str, &str)] = &[
    ("nvcr.io/nvidia/pytorch", "24.01-py3", "22.1GB"),
    ("nvcr.io/nvidia/cuda", "12.2.0-base-ubuntu22.04", "243MB"),
    ("nvcr.io/nvidia/k8s/dcgm-exporter", "3.3.5-3.4.0-ubuntu22.04", "1.06GB"),
    ("nvcr.io/nvidia/hpc-benchmarks", "24.03", "7.85GB"),
];

pub struct ContainerSimulator;

impl ContainerSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ContainerSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn split_image(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

fn is_cached(image: &str) -> bool {
    let (repo, tag) = split_image(image);
    CACHED_IMAGES.iter().any(|(r, t, _)| *r == repo && *t == tag)
}

fn image_id(image: &str) -> String {
    let mut hasher = DefaultHasher::new();
    image.hash(&mut hasher);
    format!("{:012x}", hasher.finish() & 0xffff_ffff_ffff)
}

fn container_id(node: &Node, image: &str) -> String {
    let mut hasher = DefaultHasher::new();
    (&node.hostname, image, node.containers.len()).hash(&mut hasher);
    let high = hasher.finish();
    high.hash(&mut hasher);
    format!("{high:016x}{:016x}{high:016x}{:016x}", hasher.finish(), hasher.finish().rotate_left(17))
}

/// GPU ids selected by a `--gpus` request (`all`, a count or `device=0,1`).
fn requested_gpus(node: &Node, request: &str) -> Result<Vec<u32>, String> {
    let request = request.trim_matches(['"', '\'']);
    if request == "all" {
        return Ok(node.gpus.iter().map(|g| g.id).collect());
    }
    if let Ok(count) = request.parse::<usize>() {
        return Ok(node.gpus.iter().take(count).map(|g| g.id).collect());
    }
    let devices = request.strip_prefix("device=").unwrap_or(request);
    devices
        .split(',')
        .map(|d| {
            d.trim()
                .parse::<u32>()
                .ok()
                .filter(|id| node.gpu(*id).is_some())
                .ok_or_else(|| d.trim().to_string())
        })
        .collect()
}

#[derive(Debug, Default)]
struct RunOptions {
    detach: bool,
    gpus: Option<String>,
    name: Option<String>,
    image: Option<String>,
    command: Vec<String>,
}

/// Options that take a value as the following word.
const VALUE_OPTIONS: &[&str] = &[
    "--gpus", "--name", "-e", "--env", "-v", "--volume", "-w", "--workdir", "--shm-size",
    "--ipc", "--network", "--entrypoint", "-p", "--ulimit",
];

fn parse_run(words: &[String]) -> RunOptions {
    let mut opts = RunOptions::default();
    let mut iter = words.iter();
    while let Some(word) = iter.next() {
        if opts.image.is_some() {
            opts.command.push(word.clone());
            continue;
        }
        let (flag, inline) = match word.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f, Some(v.to_string())),
            _ => (word.as_str(), None),
        };
        if !flag.starts_with('-') {
            opts.image = Some(word.clone());
            continue;
        }
        let value = if VALUE_OPTIONS.contains(&flag) {
            inline.or_else(|| iter.next().cloned())
        } else {
            None
        };
        match flag {
            "--gpus" => opts.gpus = value,
            "--name" => opts.name = value,
            "-d" | "--detach" | "-dit" | "-itd" => opts.detach = true,
            _ => {}
        }
    }
    opts
}

fn gpu_listing(node: &Node, gpus: &[u32]) -> String {
    gpus.iter()
        .filter_map(|id| node.gpu(*id))
        .enumerate()
        .map(|(i, g)| format!("GPU {i}: {} (UUID: {})", g.name, g.uuid))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ContainerSimulator {
    fn docker_run(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let words = parsed.words();
        let opts = parse_run(&words[1..]);
        let Some(image) = opts.image.clone() else {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                "\"docker run\" requires at least 1 argument.\nSee 'docker run --help'.",
            );
        };
        let node = match local_node(ctx, "docker") {
            Ok(n) => n,
            Err(err) => return err,
        };
        let hostname = node.hostname.clone();

        let gpus = match opts.gpus.as_deref().map(|r| requested_gpus(node, r)) {
            Some(Ok(gpus)) => gpus,
            Some(Err(device)) => {
                return CommandResult::error(
                    EXIT_DAEMON_ERROR,
                    format!("docker: Error response from daemon: failed to create task for container: nvidia-container-cli: device error: {device}: unknown device: unknown."),
                )
            }
            None => Vec::new(),
        };
        if let Some(lost) = gpus
            .iter()
            .filter_map(|id| node.gpu(*id))
            .find(|g| !g.is_accessible())
        {
            return CommandResult::error(
                EXIT_DAEMON_ERROR,
                format!(
                    "docker: Error response from daemon: failed to create task for container: nvidia-container-cli: initialization error: nvml error: GPU is lost: {}: unknown.",
                    lost.pci_bus_id
                ),
            );
        }

        let mut output = Vec::new();
        if !is_cached(&image) {
            let (_, tag) = split_image(&image);
            output.push(format!("Unable to find image '{image}' locally"));
            output.push(format!("{tag}: Pulling from {}", split_image(&image).0));
            output.push(format!("Digest: sha256:{}{}", image_id(&image), image_id(tag)));
            output.push(format!("Status: Downloaded newer image for {image}"));
        }

        if opts.detach {
            let id = container_id(node, &image);
            let container = Container {
                id: id[..12].to_string(),
                name: opts
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}", split_image(&image).0.rsplit('/').next().unwrap_or("c"), node.containers.len())),
                image: image.clone(),
                status: "Up Less than a second".to_string(),
                command: opts.command.join(" "),
                gpus,
            };
            if let Err(err) = ctx.state.start_container(&hostname, container) {
                return CommandResult::error(
                    EXIT_DAEMON_ERROR,
                    format!("docker: Error response from daemon: {}.", daemon_message(&err)),
                );
            }
            output.push(id);
            return CommandResult::ok(output.join("\n"));
        }

        match opts.command.first().map(String::as_str) {
            Some("nvidia-smi") if gpus.is_empty() => {
                output.push("docker: Error response from daemon: failed to create task for container: exec: \"nvidia-smi\": executable file not found in $PATH: unknown.".to_string());
                return CommandResult::error(SimConfig::EXIT_COMMAND_NOT_FOUND, output.join("\n"));
            }
            Some("nvidia-smi") => output.push(gpu_listing(node, &gpus)),
            Some("hostname") => output.push(id_prefix(&container_id(node, &image))),
            Some("echo") => output.push(opts.command[1..].join(" ")),
            _ => {}
        }
        CommandResult::ok(output.join("\n"))
    }

    fn docker(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let words = parsed.words();
        let Some(sub) = words.first().map(String::as_str) else {
            return CommandResult::ok(DOCKER_USAGE);
        };
        match sub {
            "run" => self.docker_run(parsed, ctx),
            "ps" => {
                let node = match local_node(ctx, "docker") {
                    Ok(n) => n,
                    Err(err) => return err,
                };
                let rows: Vec<Vec<String>> = node
                    .containers
                    .iter()
                    .filter(|c| c.status != ENROOT_STATUS)
                    .map(|c| {
                        let command: String = c.command.chars().take(20).collect();
                        let command = if c.command.chars().count() > 20 {
                            format!("\"{command}…\"")
                        } else {
                            format!("\"{command}\"")
                        };
                        vec![
                            c.id.clone(),
                            c.image.clone(),
                            command,
                            "3 days ago".to_string(),
                            c.status.clone(),
                            String::new(),
                            c.name.clone(),
                        ]
                    })
                    .collect();
                CommandResult::ok(render_table(
                    &["CONTAINER ID", "IMAGE", "COMMAND", "CREATED", "STATUS", "PORTS", "NAMES"],
                    &rows,
                    3,
                ))
            }
            "images" => {
                let rows: Vec<Vec<String>> = CACHED_IMAGES
                    .iter()
                    .map(|(repo, tag, size)| {
                        let full = format!("{repo}:{tag}");
                        vec![
                            repo.to_string(),
                            tag.to_string(),
                            image_id(&full),
                            "2 months ago".to_string(),
                            size.to_string(),
                        ]
                    })
                    .collect();
                CommandResult::ok(render_table(
                    &["REPOSITORY", "TAG", "IMAGE ID", "CREATED", "SIZE"],
                    &rows,
                    3,
                ))
            }
            "stop" | "rm" | "kill" => {
                let hostname = match local_node(ctx, "docker") {
                    Ok(n) => n.hostname.clone(),
                    Err(err) => return err,
                };
                let targets: Vec<&String> = words[1..].iter().filter(|w| !w.starts_with('-')).collect();
                if targets.is_empty() {
                    return CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("\"docker {sub}\" requires at least 1 argument."),
                    );
                }
                let mut out = Vec::new();
                for target in targets {
                    if let Err(err) = ctx.state.remove_container(&hostname, target) {
                        return CommandResult::error(
                            SimConfig::EXIT_FAILURE,
                            format!("Error response from daemon: {}", daemon_message(&err)),
                        );
                    }
                    out.push(target.clone());
                }
                CommandResult::ok(out.join("\n"))
            }
            "version" | "--version" => CommandResult::ok(format!(
                "Docker version {DOCKER_VERSION}, build afdd53b"
            )),
            "info" => {
                let node = match local_node(ctx, "docker") {
                    Ok(n) => n,
                    Err(err) => return err,
                };
                let running = node.containers.iter().filter(|c| c.status != ENROOT_STATUS).count();
                CommandResult::ok(format!(
                    "Server:\n Containers: {running}\n  Running: {running}\n Images: {}\n Server Version: {DOCKER_VERSION}\n Runtimes: io.containerd.runc.v2 nvidia runc\n Default Runtime: runc\n Kernel Version: {}\n Operating System: {}",
                    CACHED_IMAGES.len(),
                    node.kernel_version,
                    node.os_version
                ))
            }
            other => CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("docker: '{other}' is not a docker command.\nSee 'docker --help'"),
            ),
        }
    }

    fn enroot(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let words = parsed.words();
        let node = match local_node(ctx, "enroot") {
            Ok(n) => n,
            Err(err) => return err,
        };
        let hostname = node.hostname.clone();
        match words.first().map(String::as_str) {
            Some("version") => CommandResult::ok(ENROOT_VERSION),
            Some("list") => CommandResult::ok(
                node.containers
                    .iter()
                    .filter(|c| c.status == ENROOT_STATUS)
                    .map(|c| c.name.clone())
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Some("import") => {
                let Some(uri) = words.get(1).and_then(|u| u.strip_prefix("docker://")) else {
                    return CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        "[ERROR] Invalid image reference, expected docker://[USER@][REGISTRY#]IMAGE[:TAG]",
                    );
                };
                let image = uri.replace('#', "/");
                let file = format!("{}.sqsh", image.replace(['/', ':'], "+"));
                CommandResult::ok(format!(
                    "[INFO] Querying registry for permission grant\n[INFO] Fetching image manifest list\n[INFO] Fetching image manifest\n[INFO] Downloading {} layers\n[INFO] Extracting image layers...\n[INFO] Converting whiteouts...\n[INFO] Creating squashfs filesystem...\nParallel mksquashfs: Using {} processors\nCreating 4.0 filesystem on {file}, block size 131072.",
                    8 + image.len() % 7,
                    node.total_cpus()
                ))
            }
            Some("create") => {
                let mut name = None;
                let mut image = None;
                let mut iter = words[1..].iter();
                while let Some(word) = iter.next() {
                    match word.as_str() {
                        "-n" | "--name" => name = iter.next().cloned(),
                        w if w.starts_with("--name=") => name = Some(w["--name=".len()..].to_string()),
                        w => image = Some(w.to_string()),
                    }
                }
                let Some(image) = image else {
                    return CommandResult::error(SimConfig::EXIT_FAILURE, "Usage: enroot create [options] [--] IMAGE");
                };
                let name = name.unwrap_or_else(|| image.trim_end_matches(".sqsh").to_string());
                let container = Container {
                    id: container_id(node, &image)[..12].to_string(),
                    name: name.clone(),
                    image,
                    status: ENROOT_STATUS.to_string(),
                    command: String::new(),
                    gpus: Vec::new(),
                };
                match ctx.state.start_container(&hostname, container) {
                    Ok(()) => CommandResult::ok(format!(
                        "[INFO] Extracting squashfs filesystem...\n\nParallel unsquashfs: Using {} processors",
                        ctx.state.node(&hostname).map(Node::total_cpus).unwrap_or(1)
                    )),
                    Err(err) => CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("[ERROR] {}", daemon_message(&err)),
                    ),
                }
            }
            Some("remove") => match words.iter().skip(1).find(|w| !w.starts_with('-')) {
                Some(name) => match ctx.state.remove_container(&hostname, name) {
                    Ok(()) => CommandResult::ok(""),
                    Err(err) => state_error("enroot", &err),
                },
                None => CommandResult::error(SimConfig::EXIT_FAILURE, "Usage: enroot remove [options] [--] NAME..."),
            },
            Some("start") => {
                let Some(name) = words.iter().skip(1).find(|w| !w.starts_with('-')) else {
                    return CommandResult::error(SimConfig::EXIT_FAILURE, "Usage: enroot start [options] [--] NAME|IMAGE [COMMAND] [ARG...]");
                };
                if !node.containers.iter().any(|c| c.status == ENROOT_STATUS && &c.name == name) {
                    return CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("[ERROR] No such file or directory: /raid/enroot/data/{name}"),
                    );
                }
                let command: Vec<&String> = words.iter().skip_while(|w| *w != name).skip(1).collect();
                match command.first().map(|c| c.as_str()) {
                    Some("nvidia-smi") => {
                        let ids: Vec<u32> = node.gpus.iter().filter(|g| g.is_accessible()).map(|g| g.id).collect();
                        CommandResult::ok(gpu_listing(node, &ids))
                    }
                    _ => CommandResult::ok(""),
                }
            }
            Some(other) => CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("Usage: enroot COMMAND [ARG...]\n[ERROR] Unknown command: {other}"),
            ),
            None => CommandResult::ok(ENROOT_USAGE),
        }
    }
}

/// Daemon errors carry the bare message, without the library's prefix.
fn daemon_message(err: &Error) -> String {
    match err {
        Error::InvalidState(message) => message.clone(),
        other => other.to_string(),
    }
}

fn id_prefix(id: &str) -> String {
    id.chars().take(12).collect()
}

const DOCKER_USAGE: &str = "Usage:  docker [OPTIONS] COMMAND

Common Commands:
  run         Create and run a new container from an image
  ps          List containers
  images      List images
  stop        Stop one or more running containers
  rm          Remove one or more containers
  info        Display system-wide information
  version     Show the Docker version information";

const ENROOT_USAGE: &str = "Usage: enroot COMMAND [ARG...]

Command line utility for manipulating container sandboxes.

 Commands:
   create  [options] [--] IMAGE
   import  [options] [--] URI
   list    [options]
   remove  [options] [--] NAME...
   start   [options] [--] NAME|IMAGE [COMMAND] [ARG...]
   version";

impl Simulator for ContainerSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "container",
            version: DOCKER_VERSION,
            description: "Docker and enroot container runtimes",
            commands: &["docker", "enroot"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        if parsed.base_command == "docker" && parsed.subcommands.is_empty() {
            if parsed.has_any_flag(&["v", "version"]) {
                return CommandResult::ok(format!("Docker version {DOCKER_VERSION}, build afdd53b"));
            }
            if parsed.has_flag("help") {
                return CommandResult::ok(DOCKER_USAGE);
            }
        }
        if parsed.base_command == "enroot" {
            let meta = SimulatorMetadata {
                version: ENROOT_VERSION,
                ..self.describe()
            };
            if let Some(result) = handle_meta_flags(parsed, &meta, ENROOT_USAGE, true) {
                return result;
            }
            return self.enroot(parsed, ctx);
        }
        self.docker(parsed, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::{ClusterStore, Severity, XidError};
    use crate::traits::ClusterState;
    use chrono::Utc;

    fn run(store: &mut ClusterStore, line: &str) -> CommandResult {
        let mut ctx = CommandContext::new(store, "dgx-01");
        ContainerSimulator::new().execute(&parse(line), &mut ctx)
    }

    #[test]
    fn test_docker_ps_shows_exporter() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "docker ps");
        assert!(result.output.starts_with("CONTAINER ID"));
        assert!(result.output.contains("dcgm-exporter"));
    }

    #[test]
    fn test_run_with_gpus_lists_devices() {
        let mut store = ClusterStore::default();
        let result = run(
            &mut store,
            "docker run --rm --gpus \"device=0,1\" nvcr.io/nvidia/cuda:12.2.0-base-ubuntu22.04 nvidia-smi -L",
        );
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(result.output.lines().count(), 2);
        assert!(result.output.starts_with("GPU 0: NVIDIA H100 80GB HBM3"));

        let without = run(&mut store, "docker run --rm nvcr.io/nvidia/cuda:12.2.0-base-ubuntu22.04 nvidia-smi");
        assert_eq!(without.exit_code, SimConfig::EXIT_COMMAND_NOT_FOUND);
    }

    #[test]
    fn test_run_on_lost_gpu_fails() {
        let mut store = ClusterStore::default();
        store
            .add_xid_error(
                "dgx-01",
                2,
                XidError {
                    code: 79,
                    timestamp: Utc::now(),
                    description: "GPU has fallen off the bus".to_string(),
                    severity: Severity::Critical,
                },
            )
            .unwrap();
        let result = run(&mut store, "docker run --gpus all nvcr.io/nvidia/pytorch:24.01-py3 nvidia-smi");
        assert_eq!(result.exit_code, EXIT_DAEMON_ERROR);
        assert!(result.output.contains("GPU is lost"));
    }

    #[test]
    fn test_detached_container_lifecycle() {
        let mut store = ClusterStore::default();
        let started = run(
            &mut store,
            "docker run -d --gpus all --name trainer nvcr.io/nvidia/pytorch:24.01-py3 python train.py",
        );
        assert_eq!(started.exit_code, 0, "{}", started.output);
        assert!(run(&mut store, "docker ps").output.contains("trainer"));

        let clash = run(&mut store, "docker run -d --name trainer nvcr.io/nvidia/pytorch:24.01-py3");
        assert_eq!(clash.exit_code, EXIT_DAEMON_ERROR);

        assert_eq!(run(&mut store, "docker rm trainer").exit_code, 0);
        assert!(!run(&mut store, "docker ps").output.contains("trainer"));
    }

    #[test]
    fn test_enroot_create_and_list() {
        let mut store = ClusterStore::default();
        let created = run(&mut store, "enroot create --name pyt nvidia+pytorch+24.01-py3.sqsh");
        assert_eq!(created.exit_code, 0, "{}", created.output);
        assert_eq!(run(&mut store, "enroot list").output, "pyt");
        assert!(!run(&mut store, "docker ps").output.contains("pyt"));
    }
}
