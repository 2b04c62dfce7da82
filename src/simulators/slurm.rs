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

//! Slurm client commands: `sinfo`, `squeue`, `scontrol`, `sbatch`, `srun`,
//! `scancel` and `sacct`.
//!
//! The scheduler itself lives in the cluster state (`submit_job`,
//! `cancel_job`, ...); these commands only format it and forward requests.

use chrono::{DateTime, Utc};

use crate::common::config::SimConfig;
use crate::error::Error;
use crate::parsing::common::find_key_value;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, reject_operand, unknown_subcommand};
use crate::state::constants::SLURM_VERSION;
use crate::state::types::{
    ClusterConfig, Job, JobState, Node, Partition, PartitionState, PowerState, SlurmNodeState,
};
use crate::state::JobRequest;
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};
use crate::utils::hostlist;

const SINFO_USAGE: &str = "Usage: sinfo [OPTIONS]
  -N, --Node                 Node-centric format
  -p, --partition=PARTITION  report on specific partition
  -R, --list-reasons         list reason nodes are down or drained
  -s, --summarize            report state summary only";

const SQUEUE_USAGE: &str = "Usage: squeue [OPTIONS]
  -j, --jobs=job(s)          comma separated list of jobs IDs to view
  -p, --partition=partition  comma separated list of partitions to view
  -t, --states=states        comma separated list of states to view
  -u, --user=user_name(s)    comma separated list of users to view
      --me                   equivalent to --user=<my username>";

const SCONTROL_USAGE: &str = "Usage: scontrol [<OPTION>] [<COMMAND>]
    show <ENTITY> [<ID>]     display state of identified entity (node, job, partition, config)
    update <SPECIFICATIONS>  update node state, e.g. NodeName=dgx-01 State=DRAIN Reason=\"...\"
    ping                     print status of slurmctld daemons
    reconfigure              re-read the configuration file";

const SCANCEL_USAGE: &str = "Usage: scancel [OPTIONS] [job_id[_array_id][.step_id]] [job_id...]
  -u, --user=user_name      act only on jobs of this user
  -p, --partition=partition act only on jobs in this partition
  -n, --name=job_name       act only on jobs with this name";

const SACCT_USAGE: &str = "Usage: sacct [OPTIONS]
  -j, --jobs=job(.step)     display information about this job or comma-separated list of jobs
  -u, --user=user_list      display jobs for this comma-separated list of users
  -S, --starttime=time      select jobs eligible after this time
  -X, --allocations         only show statistics relevant to the job allocation";

const SBATCH_USAGE: &str = "Usage: sbatch [OPTIONS(0)...] [ : [OPTIONS(N)...]] script(0) [args(0)...]
  -J, --job-name=jobname      name of job
  -N, --nodes=N               number of nodes on which to run
  -p, --partition=partition   partition requested
  -t, --time=minutes          time limit
  -w, --nodelist=hosts...     request a specific list of hosts
  -G, --gpus=n                count of GPUs required for the job
      --gres=gpu:n            required generic resources
      --gpus-per-node=n       number of GPUs required per allocated node
      --wrap=\"command\"        wrap command string in a sh script and submit";

pub struct SlurmSimulator;

impl SlurmSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SlurmSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Value of a short option, whether given as `-N 2` or attached as `-N2`.
fn short_value(parsed: &ParsedCommand, short: &str) -> Option<String> {
    if let Some(v) = parsed.flag_value(short) {
        return Some(v.to_string());
    }
    parsed.flags.keys().find_map(|k| {
        let rest = k.strip_prefix(short)?;
        (!rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())).then(|| rest.to_string())
    })
}

fn option(parsed: &ParsedCommand, short: &str, long: &str) -> Option<String> {
    parsed
        .flag_value(long)
        .map(str::to_string)
        .or_else(|| short_value(parsed, short))
}

/// State as shown by sinfo; `*` marks a node that does not respond.
fn sinfo_state(node: &Node) -> String {
    let mut state = node.slurm_state.short().to_string();
    if node.bmc.power_state == PowerState::Off {
        state.push('*');
    }
    state
}

fn partition_label(partition: &Partition) -> String {
    if partition.is_default {
        format!("{}*", partition.name)
    } else {
        partition.name.clone()
    }
}

fn partition_avail(partition: &Partition) -> &'static str {
    match partition.state {
        PartitionState::Up => "up",
        PartitionState::Down => "down",
    }
}

/// True when no filter is given or `value` is in the comma-separated filter.
fn selected(filter: Option<&str>, value: &str) -> bool {
    match filter {
        None => true,
        Some(wanted) => wanted.split(',').any(|w| w == value),
    }
}

fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (days, hours, minutes, secs) = (
        seconds / 86_400,
        (seconds % 86_400) / 3600,
        (seconds % 3600) / 60,
        seconds % 60,
    );
    if days > 0 {
        format!("{days}-{hours:02}:{minutes:02}:{secs:02}")
    } else if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

fn job_elapsed(job: &Job, now: DateTime<Utc>) -> String {
    match job.start_time {
        Some(start) => format_elapsed((job.end_time.unwrap_or(now) - start).num_seconds()),
        None => "0:00".to_string(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(width - 1).collect();
        short.push('+');
        short
    }
}

fn cpus_per_gpu(node: &Node) -> u32 {
    node.total_cpus() / (node.gpus.len().max(1) as u32)
}

fn sinfo(cluster: &ClusterConfig, parsed: &ParsedCommand) -> CommandResult {
    let wanted = option(parsed, "p", "partition");
    let partitions: Vec<&Partition> = cluster
        .slurm
        .partitions
        .iter()
        .filter(|p| selected(wanted.as_deref(), &p.name))
        .collect();

    if parsed.has_any_flag(&["R", "list-reasons"]) {
        let mut lines = vec![format!("{:<20} {:<9} {:<19} {}", "REASON", "USER", "TIMESTAMP", "NODELIST")];
        for node in cluster.nodes.iter().filter(|n| {
            matches!(n.slurm_state, SlurmNodeState::Drained | SlurmNodeState::Down)
        }) {
            let reason = node.slurm_reason.as_deref().unwrap_or("Not responding");
            lines.push(format!(
                "{:<20} {:<9} {:<19} {}",
                truncate(reason, 20),
                "root",
                "Unknown",
                node.hostname
            ));
        }
        return CommandResult::ok(lines.join("\n"));
    }

    if parsed.has_any_flag(&["N", "Node"]) {
        let mut lines = vec![format!("{:<10} {:>5} {:<9} {}", "NODELIST", "NODES", "PARTITION", "STATE")];
        for node in &cluster.nodes {
            for p in partitions.iter().filter(|p| p.nodes.contains(&node.hostname)) {
                lines.push(format!(
                    "{:<10} {:>5} {:<9} {}",
                    node.hostname,
                    1,
                    partition_label(p),
                    sinfo_state(node)
                ));
            }
        }
        return CommandResult::ok(lines.join("\n"));
    }

    if parsed.has_any_flag(&["s", "summarize"]) {
        let mut lines = vec![format!(
            "{:<9} {:<5} {:>10} {:>15} {}",
            "PARTITION", "AVAIL", "TIMELIMIT", "NODES(A/I/O/T)", "NODELIST"
        )];
        for p in &partitions {
            let nodes: Vec<&Node> = p.nodes.iter().filter_map(|n| cluster.node(n)).collect();
            let count = |f: fn(&Node) -> bool| nodes.iter().filter(|n| f(n)).count();
            let allocated = count(|n| matches!(n.slurm_state, SlurmNodeState::Allocated | SlurmNodeState::Mixed));
            let idle = count(|n| n.slurm_state == SlurmNodeState::Idle);
            let other = nodes.len() - allocated - idle;
            lines.push(format!(
                "{:<9} {:<5} {:>10} {:>15} {}",
                partition_label(p),
                partition_avail(p),
                p.max_time,
                format!("{allocated}/{idle}/{other}/{}", nodes.len()),
                hostlist::compress(&p.nodes)
            ));
        }
        return CommandResult::ok(lines.join("\n"));
    }

    let mut lines = vec![format!(
        "{:<9} {:<5} {:>10} {:>6} {:>6} {}",
        "PARTITION", "AVAIL", "TIMELIMIT", "NODES", "STATE", "NODELIST"
    )];
    for p in &partitions {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for node in p.nodes.iter().filter_map(|n| cluster.node(n)) {
            let state = sinfo_state(node);
            match groups.iter_mut().find(|(s, _)| *s == state) {
                Some((_, hosts)) => hosts.push(node.hostname.clone()),
                None => groups.push((state, vec![node.hostname.clone()])),
            }
        }
        for (state, hosts) in groups {
            lines.push(format!(
                "{:<9} {:<5} {:>10} {:>6} {:>6} {}",
                partition_label(p),
                partition_avail(p),
                p.max_time,
                hosts.len(),
                state,
                hostlist::compress(&hosts)
            ));
        }
    }
    CommandResult::ok(lines.join("\n"))
}

fn squeue(cluster: &ClusterConfig, parsed: &ParsedCommand, user: &str) -> CommandResult {
    let users = if parsed.has_flag("me") {
        Some(user.to_string())
    } else {
        option(parsed, "u", "user")
    };
    let jobs_filter = option(parsed, "j", "jobs");
    let partition_filter = option(parsed, "p", "partition");
    let state_filter: Option<Vec<JobState>> = option(parsed, "t", "states")
        .map(|s| s.split(',').filter_map(JobState::from_keyword).collect());

    let now = Utc::now();
    let row = |cols: [&str; 8]| {
        format!(
            "{:>18} {:>9} {:>8} {:>8} {:>2} {:>10} {:>6} {}",
            cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6], cols[7]
        )
    };
    let mut lines = vec![row([
        "JOBID", "PARTITION", "NAME", "USER", "ST", "TIME", "NODES", "NODELIST(REASON)",
    ])];
    for job in &cluster.slurm.jobs {
        let visible = match &state_filter {
            Some(states) => states.contains(&job.state),
            None => job.state.is_active(),
        };
        if !visible
            || !selected(users.as_deref(), &job.user)
            || !selected(jobs_filter.as_deref(), &job.id.to_string())
            || !selected(partition_filter.as_deref(), &job.partition)
        {
            continue;
        }
        let location = match (&job.reason, job.nodes.is_empty()) {
            (Some(reason), _) => format!("({reason})"),
            (None, false) => hostlist::compress(&job.nodes),
            (None, true) => String::new(),
        };
        lines.push(row([
            &job.id.to_string(),
            &job.partition,
            &truncate(&job.name, 8),
            &truncate(&job.user, 8),
            job.state.short(),
            &job_elapsed(job, now),
            &job.num_nodes.to_string(),
            &location,
        ]));
    }
    CommandResult::ok(lines.join("\n"))
}

fn gres_model(node: &Node) -> String {
    node.system_type
        .to_string()
        .trim_start_matches("DGX-")
        .to_ascii_lowercase()
}

fn node_state_label(node: &Node) -> String {
    let allocated = node.allocated_gpu_count();
    let base = if allocated == 0 {
        "IDLE"
    } else if allocated == node.gpus.len() {
        "ALLOCATED"
    } else {
        "MIXED"
    };
    let mut label = match node.slurm_state {
        SlurmNodeState::Drained => format!("{base}+DRAIN"),
        SlurmNodeState::Down => "DOWN".to_string(),
        other => other.to_string(),
    };
    if node.bmc.power_state == PowerState::Off {
        label.push_str("+NOT_RESPONDING");
    }
    label
}

fn show_node(cluster: &ClusterConfig, node: &Node) -> String {
    let cpus = node.total_cpus();
    let allocated = node.allocated_gpu_count() as u32;
    let partitions: Vec<&str> = cluster
        .slurm
        .partitions
        .iter()
        .filter(|p| p.nodes.contains(&node.hostname))
        .map(|p| p.name.as_str())
        .collect();
    let memory_mb = node.ram_total_gb * 1024;
    let mut lines = vec![
        format!(
            "NodeName={} Arch={} CoresPerSocket={}",
            node.hostname, node.cpu.architecture, node.cpu.cores_per_socket
        ),
        format!(
            "   CPUAlloc={} CPUEfctv={cpus} CPUTot={cpus}",
            allocated * cpus_per_gpu(node)
        ),
        format!("   AvailableFeatures={}", node.system_type),
        format!("   ActiveFeatures={}", node.system_type),
        format!("   Gres=gpu:{}:{}", gres_model(node), node.gpus.len()),
        format!(
            "   NodeAddr={} NodeHostName={} Version={SLURM_VERSION}",
            node.hostname, node.hostname
        ),
        format!("   OS=Linux {}", node.kernel_version),
        format!(
            "   RealMemory={memory_mb} AllocMem=0 FreeMem={} Sockets={} Boards=1",
            (node.ram_total_gb - node.ram_used_gb) * 1024,
            node.cpu.sockets
        ),
        format!(
            "   State={} ThreadsPerCore={} TmpDisk=0 Weight=1 Owner=N/A MCS_label=N/A",
            node_state_label(node),
            node.cpu.threads_per_core
        ),
        format!("   Partitions={}", partitions.join(",")),
        format!(
            "   CfgTRES=cpu={cpus},mem={memory_mb}M,billing={cpus},gres/gpu={}",
            node.gpus.len()
        ),
        format!("   AllocTRES=gres/gpu={allocated}"),
    ];
    if let Some(reason) = &node.slurm_reason {
        lines.push(format!("   Reason={reason} [root]"));
    }
    lines.join("\n")
}

fn show_job(job: &Job) -> String {
    let now = Utc::now();
    let time = |t: Option<DateTime<Utc>>| {
        t.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    };
    [
        format!("JobId={} JobName={}", job.id, job.name),
        format!("   UserId={}(0) GroupId={}(0)", job.user, job.user),
        "   Priority=4294901759 Nice=0 Account=root QOS=normal".to_string(),
        format!(
            "   JobState={} Reason={} Dependency=(null)",
            job.state,
            job.reason.as_deref().unwrap_or("None")
        ),
        format!(
            "   RunTime={} TimeLimit={}",
            job_elapsed(job, now),
            job.time_limit
        ),
        format!(
            "   SubmitTime={} StartTime={} EndTime={}",
            time(Some(job.submit_time)),
            time(job.start_time),
            time(job.end_time)
        ),
        format!("   Partition={}", job.partition),
        format!(
            "   NodeList={}",
            if job.nodes.is_empty() {
                "(null)".to_string()
            } else {
                hostlist::compress(&job.nodes)
            }
        ),
        format!("   NumNodes={}", job.num_nodes),
        format!(
            "   TRES=node={},gres/gpu={}",
            job.num_nodes,
            job.num_nodes * job.gpus_per_node
        ),
        format!("   Command={}", job.command),
        format!("   ExitCode={}:0", job.exit_code),
    ]
    .join("\n")
}

fn show_partition(cluster: &ClusterConfig, p: &Partition) -> String {
    let cpus: u32 = p
        .nodes
        .iter()
        .filter_map(|n| cluster.node(n))
        .map(Node::total_cpus)
        .sum();
    [
        format!("PartitionName={}", p.name),
        format!(
            "   AllowGroups=ALL Default={} MaxTime={}",
            if p.is_default { "YES" } else { "NO" },
            p.max_time
        ),
        format!("   Nodes={}", hostlist::compress(&p.nodes)),
        format!(
            "   State={} TotalCPUs={cpus} TotalNodes={}",
            partition_avail(p).to_ascii_uppercase(),
            p.nodes.len()
        ),
    ]
    .join("\n")
}

impl SlurmSimulator {
    fn scontrol(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let args: Vec<&str> = parsed.args().collect();
        match args.first().map(|a| a.to_ascii_lowercase()).as_deref() {
            Some("show") => self.scontrol_show(&args[1..], ctx),
            Some("update") => self.scontrol_update(&args[1..], ctx),
            Some("ping") => {
                let ha = &ctx.state.cluster().ha;
                let mut out = format!("Slurmctld(primary) at {} is UP", ctx.state.cluster().slurm.controller);
                if ha.enabled {
                    out.push_str(&format!("\nSlurmctld(backup) at {} is UP", ha.secondary_head_node));
                }
                CommandResult::ok(out)
            }
            Some("reconfigure") => CommandResult::ok(""),
            Some(other) => CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("invalid keyword: {other}\nTry \"scontrol --help\" for usage."),
            ),
            None => CommandResult::usage(SCONTROL_USAGE),
        }
    }

    fn scontrol_show(&self, args: &[&str], ctx: &CommandContext<'_>) -> CommandResult {
        let cluster = ctx.state.cluster();
        let entity = args.first().map(|a| a.to_ascii_lowercase());
        let id = args.get(1).copied();
        match entity.as_deref() {
            Some("node" | "nodes") => match id {
                Some(name) => {
                    let hosts = hostlist::expand(name);
                    let mut blocks = Vec::new();
                    for host in &hosts {
                        match cluster.node(host) {
                            Some(node) => blocks.push(show_node(cluster, node)),
                            None => {
                                return CommandResult::error(
                                    SimConfig::EXIT_FAILURE,
                                    format!("Node {host} not found"),
                                )
                            }
                        }
                    }
                    CommandResult::ok(blocks.join("\n\n"))
                }
                None => CommandResult::ok(
                    cluster
                        .nodes
                        .iter()
                        .map(|n| show_node(cluster, n))
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                ),
            },
            Some("job" | "jobs") => match id {
                Some(raw) => match raw.parse::<u32>().ok().and_then(|id| cluster.slurm.job(id)) {
                    Some(job) => CommandResult::ok(show_job(job)),
                    None => CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        "slurm_load_jobs error: Invalid job id specified",
                    ),
                },
                None if cluster.slurm.jobs.is_empty() => CommandResult::ok("No jobs in the system"),
                None => CommandResult::ok(
                    cluster
                        .slurm
                        .jobs
                        .iter()
                        .map(show_job)
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                ),
            },
            Some("partition" | "partitions") => {
                let shown: Vec<String> = cluster
                    .slurm
                    .partitions
                    .iter()
                    .filter(|p| selected(id, &p.name))
                    .map(|p| show_partition(cluster, p))
                    .collect();
                if shown.is_empty() {
                    CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("Partition {} not found", id.unwrap_or_default()),
                    )
                } else {
                    CommandResult::ok(shown.join("\n\n"))
                }
            }
            Some("config") => CommandResult::ok(format!(
                "Configuration data as of {}\nClusterName             = {}\nSlurmctldHost[0]        = {}\nSLURM_VERSION           = {SLURM_VERSION}\nGresTypes               = gpu\nSelectType              = select/cons_tres",
                Utc::now().format("%Y-%m-%dT%H:%M:%S"),
                cluster.slurm.cluster_name,
                cluster.slurm.controller
            )),
            Some(other) => CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("invalid entity:{other} for keyword:show"),
            ),
            None => CommandResult::usage("Usage: scontrol show <node|job|partition|config> [<ID>]"),
        }
    }

    fn scontrol_update(&self, args: &[&str], ctx: &mut CommandContext<'_>) -> CommandResult {
        let Some(names) = find_key_value(args.iter().copied(), "NodeName") else {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                "Invalid input: only node updates are supported (NodeName=...)",
            );
        };
        let Some(state_word) = find_key_value(args.iter().copied(), "State") else {
            return CommandResult::error(SimConfig::EXIT_FAILURE, "Invalid input: State= is required");
        };
        let state = match state_word.to_ascii_lowercase().as_str() {
            "undrain" => Some(SlurmNodeState::Idle),
            other => SlurmNodeState::from_keyword(other),
        };
        let Some(state) = state else {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("Invalid node state specified: {state_word}"),
            );
        };
        let reason = find_key_value(args.iter().copied(), "Reason").filter(|r| !r.is_empty());
        if matches!(state, SlurmNodeState::Drained | SlurmNodeState::Down) && reason.is_none() {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                "You must specify a reason when DOWNING or DRAINING a node. Request denied",
            );
        }

        let hosts = hostlist::expand(&names);
        if hosts.iter().any(|h| ctx.state.node(h).is_none()) {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                "slurm_update error: Invalid node name specified",
            );
        }
        for host in &hosts {
            if let Err(err) = ctx.state.set_slurm_state(host, state, reason.clone()) {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    format!("slurm_update error: {err}"),
                );
            }
        }
        CommandResult::ok("")
    }

    fn build_request(&self, parsed: &ParsedCommand, ctx: &CommandContext<'_>, command: String, name: String) -> Result<JobRequest, CommandResult> {
        let num_nodes = match option(parsed, "N", "nodes") {
            Some(n) => n.parse::<u32>().map_err(|_| {
                CommandResult::error(SimConfig::EXIT_FAILURE, format!("error: Invalid node count specified: {n}"))
            })?,
            None => 1,
        };
        let gpus_per_node = if let Some(gres) = parsed.flag_value("gres") {
            gres.rsplit(':').next().and_then(|n| n.parse::<u32>().ok()).ok_or_else(|| {
                CommandResult::error(SimConfig::EXIT_FAILURE, format!("error: Invalid generic resource (gres) specification: {gres}"))
            })?
        } else if let Some(n) = parsed.flag_value("gpus-per-node") {
            n.rsplit(':').next().and_then(|n| n.parse::<u32>().ok()).unwrap_or(0)
        } else if let Some(total) = option(parsed, "G", "gpus") {
            total.parse::<u32>().unwrap_or(0).div_ceil(num_nodes.max(1))
        } else {
            0
        };
        let nodelist = option(parsed, "w", "nodelist")
            .map(|w| hostlist::expand(&w))
            .unwrap_or_default();
        Ok(JobRequest {
            name: option(parsed, "J", "job-name").unwrap_or(name),
            user: ctx.user().to_string(),
            partition: option(parsed, "p", "partition"),
            num_nodes: num_nodes.max(nodelist.len() as u32),
            gpus_per_node,
            nodelist,
            command,
            time_limit: option(parsed, "t", "time"),
        })
    }

    fn sbatch(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let (command, name) = match (parsed.flag_value("wrap"), parsed.args().next()) {
            (Some(wrap), _) => (wrap.to_string(), "wrap".to_string()),
            (None, Some(script)) => {
                let name = script.rsplit('/').next().unwrap_or(script).to_string();
                (script.to_string(), name)
            }
            (None, None) => {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    "sbatch: error: Batch script is empty!",
                )
            }
        };
        let request = match self.build_request(parsed, ctx, command, name) {
            Ok(r) => r,
            Err(e) => return prefixed("sbatch", e),
        };
        match ctx.state.submit_job(request) {
            Ok(id) => CommandResult::ok(format!("Submitted batch job {id}")),
            Err(err) => submission_error("sbatch", &err),
        }
    }

    fn srun(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let Some(first) = parsed.args().next() else {
            return CommandResult::error(SimConfig::EXIT_FAILURE, "srun: fatal: No command given to execute.");
        };
        let command = trailing_command(parsed, first);
        let name = first.rsplit('/').next().unwrap_or(first).to_string();
        let request = match self.build_request(parsed, ctx, command.clone(), name) {
            Ok(r) => r,
            Err(e) => return prefixed("srun", e),
        };
        let job_id = match ctx.state.submit_job(request) {
            Ok(id) => id,
            Err(err) => return submission_error("srun", &err),
        };
        let nodes = match ctx.state.cluster().slurm.job(job_id) {
            Some(job) if job.state == JobState::Running => job.nodes.clone(),
            _ => {
                // Interactive steps do not wait in the queue
                let _ = ctx.state.cancel_job(job_id);
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    format!("srun: job {job_id} queued and waiting for resources\nsrun: error: Unable to allocate resources: Requested node configuration is not available"),
                );
            }
        };
        let output = if first == "hostname" {
            nodes.join("\n")
        } else {
            String::new()
        };
        if let Err(err) = ctx.state.complete_job(job_id, 0) {
            return CommandResult::error(SimConfig::EXIT_FAILURE, format!("srun: error: {err}"));
        }
        CommandResult::ok(output)
    }

    fn scancel(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let mut targets: Vec<u32> = Vec::new();
        for arg in parsed.args() {
            match arg.split('_').next().and_then(|id| id.parse::<u32>().ok()) {
                Some(id) => targets.push(id),
                None => {
                    return CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("scancel: error: Invalid job id {arg}"),
                    )
                }
            }
        }
        if let Some(user) = option(parsed, "u", "user") {
            targets.extend(
                ctx.state
                    .cluster()
                    .slurm
                    .jobs
                    .iter()
                    .filter(|j| j.user == user && j.state.is_active())
                    .map(|j| j.id),
            );
        } else if targets.is_empty() {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                "scancel: error: No job identification provided",
            );
        }

        let mut errors = Vec::new();
        for id in targets {
            let reason = match ctx.state.cluster().slurm.job(id) {
                None => Some("Invalid job id specified".to_string()),
                Some(job) if !job.state.is_active() => {
                    Some("Job/step already completing or completed".to_string())
                }
                Some(_) => ctx.state.cancel_job(id).err().map(|e| e.to_string()),
            };
            if let Some(reason) = reason {
                errors.push(format!("scancel: error: Kill job error on job id {id}: {reason}"));
            }
        }
        if errors.is_empty() {
            CommandResult::ok("")
        } else {
            CommandResult::error(SimConfig::EXIT_FAILURE, errors.join("\n"))
        }
    }
}

/// The command line starting at `first`, keeping the command's own flags.
fn trailing_command(parsed: &ParsedCommand, first: &str) -> String {
    let after_base = parsed
        .raw
        .trim_start()
        .strip_prefix(parsed.base_command.as_str())
        .unwrap_or(&parsed.raw);
    match after_base.find(first) {
        Some(i) => after_base[i..].trim().to_string(),
        None => first.to_string(),
    }
}

fn prefixed(tool: &str, result: CommandResult) -> CommandResult {
    CommandResult::error(result.exit_code, format!("{tool}: {}", result.output))
}

fn submission_error(tool: &str, err: &Error) -> CommandResult {
    let detail = match err {
        Error::InvalidState(msg) => msg.clone(),
        other => other.to_string(),
    };
    CommandResult::error(
        SimConfig::EXIT_FAILURE,
        format!("{tool}: error: Batch job submission failed: {detail}"),
    )
}

fn sacct(cluster: &ClusterConfig, parsed: &ParsedCommand) -> CommandResult {
    let jobs_filter = option(parsed, "j", "jobs");
    let user_filter = option(parsed, "u", "user");
    let row = |cols: [&str; 7]| {
        format!(
            "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} ",
            cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6]
        )
    };
    let mut lines = vec![
        row(["JobID", "JobName", "Partition", "Account", "AllocCPUS", "State", "ExitCode"]),
        row([
            "------------", "----------", "----------", "----------", "----------", "----------",
            "--------",
        ]),
    ];
    for job in cluster.slurm.jobs.iter().filter(|j| {
        selected(jobs_filter.as_deref(), &j.id.to_string())
            && selected(user_filter.as_deref(), &j.user)
    }) {
        let cpus: u32 = job
            .nodes
            .iter()
            .filter_map(|n| cluster.node(n))
            .map(|n| cpus_per_gpu(n) * job.gpus_per_node)
            .sum();
        lines.push(row([
            &job.id.to_string(),
            &truncate(&job.name, 10),
            &job.partition,
            &job.user,
            &cpus.to_string(),
            &job.state.to_string(),
            &format!("{}:0", job.exit_code),
        ]));
    }
    CommandResult::ok(lines.join("\n"))
}

impl Simulator for SlurmSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "slurm",
            version: SLURM_VERSION,
            description: "Slurm workload manager client commands",
            commands: &["sinfo", "squeue", "scontrol", "sbatch", "srun", "scancel", "sacct"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let usage = match parsed.base_command.as_str() {
            "sinfo" => SINFO_USAGE,
            "squeue" => SQUEUE_USAGE,
            "scontrol" => SCONTROL_USAGE,
            "sbatch" | "srun" => SBATCH_USAGE,
            "scancel" => SCANCEL_USAGE,
            _ => SACCT_USAGE,
        };
        if parsed.has_any_flag(&["V", "version"]) {
            return CommandResult::ok(format!("slurm {SLURM_VERSION}"));
        }
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), usage, false) {
            return result;
        }
        if matches!(parsed.base_command.as_str(), "sinfo" | "squeue" | "sacct") {
            if let Some(result) = reject_operand(parsed) {
                return result;
            }
        }
        match parsed.base_command.as_str() {
            "sinfo" => sinfo(ctx.state.cluster(), parsed),
            "squeue" => {
                let user = ctx.user().to_string();
                squeue(ctx.state.cluster(), parsed, &user)
            }
            "scontrol" => self.scontrol(parsed, ctx),
            "sbatch" => self.sbatch(parsed, ctx),
            "srun" => self.srun(parsed, ctx),
            "scancel" => self.scancel(parsed, ctx),
            "sacct" => sacct(ctx.state.cluster(), parsed),
            other => unknown_subcommand("slurm", other, ""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::ClusterStore;
    use crate::traits::ClusterState;

    fn run(store: &mut ClusterStore, line: &str) -> CommandResult {
        let mut ctx = CommandContext::new(store, "bcm-head01");
        SlurmSimulator::new().execute(&parse(line), &mut ctx)
    }

    #[test]
    fn test_sinfo_groups_by_state() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "sinfo");
        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines[0], "PARTITION AVAIL  TIMELIMIT  NODES  STATE NODELIST");
        assert!(lines[1].starts_with("batch*"));
        assert!(lines[1].ends_with("4   idle dgx-[01-04]"));
        assert!(lines[2].starts_with("debug"));
    }

    #[test]
    fn test_drain_requires_reason() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "scontrol update NodeName=dgx-02 State=DRAIN");
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("must specify a reason"));
        assert_eq!(
            store.node("dgx-02").unwrap().slurm_state,
            SlurmNodeState::Idle
        );
    }

    #[test]
    fn test_drain_and_show_node() {
        let mut store = ClusterStore::default();
        let result = run(
            &mut store,
            "scontrol update NodeName=dgx-02 State=drain Reason=\"XID 79 on GPU 3\"",
        );
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let shown = run(&mut store, "scontrol show node dgx-02");
        assert!(shown.output.starts_with("NodeName=dgx-02"));
        assert!(shown.output.contains("State=IDLE+DRAIN"));
        assert!(shown.output.contains("Reason=XID 79 on GPU 3"));

        let sinfo = run(&mut store, "sinfo -R");
        assert!(sinfo.output.contains("XID 79 on GPU 3"));
        assert!(sinfo.output.contains("dgx-02"));

        run(&mut store, "scontrol update NodeName=dgx-02 State=RESUME");
        let node = store.node("dgx-02").unwrap();
        assert_eq!(node.slurm_state, SlurmNodeState::Idle);
        assert_eq!(node.slurm_reason, None);
    }

    #[test]
    fn test_show_unknown_node() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "scontrol show node dgx-99");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output, "Node dgx-99 not found");
    }

    #[test]
    fn test_sbatch_squeue_scancel() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "sbatch -N 1 --gres=gpu:8 -J train train.sh");
        assert_eq!(result.output, "Submitted batch job 1001");

        let queue = run(&mut store, "squeue");
        assert!(queue.output.contains("1001"));
        assert!(queue.output.contains(" R "));
        assert!(queue.output.contains("dgx-01"));

        assert_eq!(run(&mut store, "scancel 1001").exit_code, 0);
        let again = run(&mut store, "scancel 1001");
        assert_eq!(again.exit_code, 1);
        assert!(again.output.contains("already completing or completed"));
        assert_eq!(run(&mut store, "scancel 4242").exit_code, 1);

        let acct = run(&mut store, "sacct -j 1001");
        assert!(acct.output.contains("CANCELLED"));
    }

    #[test]
    fn test_sbatch_pending_when_full() {
        let mut store = ClusterStore::default();
        run(&mut store, "sbatch -N 4 --gres=gpu:8 big.sh");
        let result = run(&mut store, "sbatch --gres=gpu:1 --wrap=\"python train.py\"");
        assert_eq!(result.output, "Submitted batch job 1002");
        let queue = run(&mut store, "squeue -j 1002");
        assert!(queue.output.contains("(Resources)"));
        assert!(queue.output.contains("PD"));
    }

    #[test]
    fn test_sbatch_invalid_partition() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "sbatch -p nosuch job.sh");
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("invalid partition name specified: nosuch"));
    }

    #[test]
    fn test_srun_hostname() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "srun -N2 hostname");
        assert_eq!(result.output, "dgx-01\ndgx-02");
        let job = store.cluster().slurm.job(1001).unwrap();
        assert_eq!(job.state, JobState::Completed);
    }

    #[test]
    fn test_elapsed_format() {
        assert_eq!(format_elapsed(5), "0:05");
        assert_eq!(format_elapsed(3725), "1:02:05");
        assert_eq!(format_elapsed(90_061), "1-01:01:01");
    }
}
