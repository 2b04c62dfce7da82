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

//! Filesystem views: `df`, `lfs` and `mount`.

use crate::common::config::SimConfig;
use crate::parsing::ParsedCommand;
use crate::simulators::common::handle_meta_flags;
use crate::state::constants::LUSTRE_VERSION;
use crate::state::types::{ClusterConfig, LustreFs, LustreTarget, Mount};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};
use crate::utils::format_bytes_human;
use crate::utils::units::{bytes_to_kblocks, percent_used, GIB};

/// `mount` exits with 32 when the filesystem is already mounted.
const EXIT_MOUNT_FAILURE: i32 = 32;

/// Pseudo filesystems every Linux host shows in `mount`.
const PSEUDO_MOUNTS: &[(&str, &str, &str, &str)] = &[
    ("sysfs", "/sys", "sysfs", "rw,nosuid,nodev,noexec,relatime"),
    ("proc", "/proc", "proc", "rw,nosuid,nodev,noexec,relatime"),
    ("udev", "/dev", "devtmpfs", "rw,nosuid,relatime,mode=755"),
    ("tmpfs", "/run", "tmpfs", "rw,nosuid,nodev,noexec,relatime,mode=755"),
];

pub struct StorageSimulator;

impl StorageSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StorageSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Mount table of the current host with Lustre sized from the cluster
/// filesystem. The head node is not part of the compute inventory and
/// gets a fixed system disk.
fn mount_table(ctx: &CommandContext<'_>) -> Vec<Mount> {
    let cluster = ctx.state.cluster();
    let mounts = match ctx.state.node(&ctx.current_node) {
        Some(node) => node.mounts.clone(),
        None => vec![
            Mount {
                device: "/dev/sda2".to_string(),
                mount_point: "/".to_string(),
                fs_type: "ext4".to_string(),
                options: "rw,relatime".to_string(),
                size_bytes: 468 * GIB,
                used_bytes: 121 * GIB,
            },
            Mount {
                device: format!("{}:/{}", cluster.lustre.mgs_nid, cluster.lustre.fs_name),
                mount_point: cluster.lustre.mount_point.clone(),
                fs_type: "lustre".to_string(),
                options: "rw,flock,lazystatfs".to_string(),
                size_bytes: 0,
                used_bytes: 0,
            },
        ],
    };
    mounts
        .into_iter()
        .map(|mut m| {
            if m.fs_type == "lustre" {
                m.size_bytes = cluster.lustre.total_bytes();
                m.used_bytes = cluster.lustre.used_bytes();
            }
            m
        })
        .collect()
}

fn type_selected(filter: Option<&str>, fs_type: &str) -> bool {
    match filter {
        None => true,
        Some(wanted) => wanted.split(',').any(|w| w == fs_type),
    }
}

/// The mount holding `path`: the longest mount point that prefixes it.
fn mount_for<'a>(mounts: &'a [Mount], path: &str) -> Option<&'a Mount> {
    mounts
        .iter()
        .filter(|m| {
            m.mount_point == "/"
                || path == m.mount_point
                || path.starts_with(&format!("{}/", m.mount_point))
        })
        .max_by_key(|m| m.mount_point.len())
}

fn df(ctx: &CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
    let human = parsed.has_any_flag(&["h", "human-readable"]);
    let show_type = parsed.has_any_flag(&["T", "print-type"]);
    let type_filter = parsed.flag_value_any(&["t", "type"]);
    let mounts = mount_table(ctx);

    let mut selected: Vec<&Mount> = Vec::new();
    let paths = parsed.operands(&["h", "T", "a", "l"]);
    for path in &paths {
        let absolute = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{path}", ctx.cwd.trim_end_matches('/'))
        };
        match mount_for(&mounts, &absolute) {
            Some(m) => selected.push(m),
            None => {
                return CommandResult::error(
                    SimConfig::EXIT_FAILURE,
                    format!("df: {path}: No such file or directory"),
                )
            }
        }
    }
    if paths.is_empty() {
        selected = mounts
            .iter()
            .filter(|m| type_selected(type_filter, &m.fs_type))
            .collect();
    }

    let mut rows = Vec::new();
    for m in selected {
        let avail = m.size_bytes.saturating_sub(m.used_bytes);
        let (size, used, avail) = if human {
            (
                format_bytes_human(m.size_bytes),
                format_bytes_human(m.used_bytes),
                format_bytes_human(avail),
            )
        } else {
            (
                bytes_to_kblocks(m.size_bytes).to_string(),
                bytes_to_kblocks(m.used_bytes).to_string(),
                bytes_to_kblocks(avail).to_string(),
            )
        };
        let mut row = vec![m.device.clone()];
        if show_type {
            row.push(m.fs_type.clone());
        }
        row.extend([
            size,
            used,
            avail,
            format!("{}%", percent_used(m.used_bytes, m.size_bytes)),
            m.mount_point.clone(),
        ]);
        rows.push(row);
    }

    let mut header = vec!["Filesystem"];
    if show_type {
        header.push("Type");
    }
    header.extend(if human {
        ["Size", "Used", "Avail", "Use%", "Mounted on"]
    } else {
        ["1K-blocks", "Used", "Available", "Use%", "Mounted on"]
    });
    CommandResult::ok(render_df(&header, &rows))
}

/// df pads the device column left and every numeric column right.
fn render_df(header: &[&str], rows: &[Vec<String>]) -> String {
    let columns = header.len();
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    let render = |cells: Vec<&str>| {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            let width = widths[i];
            if i == 0 || i == columns - 1 || header[i] == "Type" {
                if i == columns - 1 {
                    line.push_str(cell);
                } else {
                    line.push_str(&format!("{cell:<width$} "));
                }
            } else {
                line.push_str(&format!("{cell:>width$} "));
            }
        }
        line
    };
    let mut lines = vec![render(header.to_vec())];
    lines.extend(rows.iter().map(|r| render(r.iter().map(String::as_str).collect())));
    lines.join("\n")
}

fn lfs_row(uuid: &str, target: Option<&LustreTarget>, suffix: &str, human: bool) -> String {
    let Some(target) = target else {
        return format!("{uuid:<22}: inactive device");
    };
    let avail = target.size_bytes.saturating_sub(target.used_bytes);
    let fmt = |bytes: u64| {
        if human {
            format_bytes_human(bytes)
        } else {
            bytes_to_kblocks(bytes).to_string()
        }
    };
    format!(
        "{uuid:<22} {:>14} {:>14} {:>14} {:>4}% {suffix}",
        fmt(target.size_bytes),
        fmt(target.used_bytes),
        fmt(avail),
        percent_used(target.used_bytes, target.size_bytes)
    )
}

fn lfs_df(fs: &LustreFs, human: bool) -> String {
    let mut lines = vec![format!(
        "{:<22} {:>14} {:>14} {:>14} {:>5} {}",
        "UUID",
        if human { "bytes" } else { "1K-blocks" },
        "Used",
        "Available",
        "Use%",
        "Mounted on"
    )];
    for mdt in &fs.mdts {
        lines.push(lfs_row(
            &format!("{}_UUID", mdt.name),
            mdt.active.then_some(mdt),
            &format!("{}[MDT:{}]", fs.mount_point, mdt.index),
            human,
        ));
    }
    for ost in &fs.osts {
        lines.push(lfs_row(
            &format!("{}_UUID", ost.name),
            ost.active.then_some(ost),
            &format!("{}[OST:{}]", fs.mount_point, ost.index),
            human,
        ));
    }
    let summary = LustreTarget {
        name: "filesystem_summary".to_string(),
        index: 0,
        size_bytes: fs.total_bytes(),
        used_bytes: fs.used_bytes(),
        active: true,
    };
    lines.push(String::new());
    lines.push(lfs_row("filesystem_summary:", Some(&summary), &fs.mount_point, human));
    lines.join("\n")
}

fn lfs_check_servers(fs: &LustreFs) -> CommandResult {
    let mut lines = Vec::new();
    let mut failed = false;
    for (target, kind) in fs
        .mdts
        .iter()
        .map(|t| (t, "mdc"))
        .chain(fs.osts.iter().map(|t| (t, "osc")))
    {
        if target.active {
            lines.push(format!("{}-{kind}-ffff8f2a0c4e3000: active", target.name));
        } else {
            failed = true;
            lines.push(format!(
                "{}-{kind}-ffff8f2a0c4e3000: check error: Resource temporarily unavailable",
                target.name
            ));
        }
    }
    let output = lines.join("\n");
    if failed {
        CommandResult::error(SimConfig::EXIT_FAILURE, output)
    } else {
        CommandResult::ok(output)
    }
}

fn lfs(cluster: &ClusterConfig, parsed: &ParsedCommand) -> CommandResult {
    let fs = &cluster.lustre;
    let args = parsed.operands(&["h"]);
    match args.first().copied() {
        Some("df") => {
            if let Some(path) = args.get(1) {
                if !path.starts_with(&fs.mount_point) {
                    return CommandResult::error(
                        SimConfig::EXIT_FAILURE,
                        format!("lfs df: {path} is not a Lustre filesystem"),
                    );
                }
            }
            CommandResult::ok(lfs_df(fs, parsed.has_any_flag(&["h", "human-readable"])))
        }
        Some("check") => match args.get(1).copied() {
            Some("servers" | "all" | "osts" | "mds") => lfs_check_servers(fs),
            _ => CommandResult::usage("usage: check <osts|mds|servers|all>"),
        },
        Some("osts") => CommandResult::ok(
            std::iter::once("OBDS:".to_string())
                .chain(fs.osts.iter().map(|o| {
                    format!(
                        "{}: {}_UUID {}",
                        o.index,
                        o.name,
                        if o.active { "ACTIVE" } else { "INACTIVE" }
                    )
                }))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Some("mdts") => CommandResult::ok(
            std::iter::once("MDTS:".to_string())
                .chain(fs.mdts.iter().map(|m| format!("{}: {}_UUID ACTIVE", m.index, m.name)))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Some("getstripe") => match args.get(1) {
            Some(path) if path.starts_with(&fs.mount_point) => CommandResult::ok(format!(
                "{path}\nstripe_count:  1 stripe_size:   1048576 pattern:       raid0 stripe_offset: -1"
            )),
            Some(path) => CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("lfs getstripe: {path} is not on a Lustre filesystem: Inappropriate ioctl for device (25)"),
            ),
            None => CommandResult::usage("usage: getstripe [--ost|-O <uuid>] <directory|filename> ..."),
        },
        Some(other) => CommandResult::error(
            SimConfig::EXIT_FAILURE,
            format!("lfs: unknown command '{other}'\n'lfs help' for a list of commands"),
        ),
        None => CommandResult::usage(
            "Available commands are:\n\tdf\tcheck\tosts\tmdts\tgetstripe",
        ),
    }
}

fn mount(ctx: &CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
    let mounts = mount_table(ctx);
    let args: Vec<&str> = parsed.args().collect();
    if let Some(target) = args.last() {
        return match mounts
            .iter()
            .find(|m| m.mount_point == *target || m.device == *target)
        {
            Some(m) => CommandResult::error(
                EXIT_MOUNT_FAILURE,
                format!("mount: {}: {} already mounted on {}.", m.mount_point, m.device, m.mount_point),
            ),
            None => CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!("mount: {target}: can't find in /etc/fstab."),
            ),
        };
    }

    let type_filter = parsed.flag_value_any(&["t", "types"]);
    let lines: Vec<String> = PSEUDO_MOUNTS
        .iter()
        .map(|(dev, point, fs_type, opts)| (dev.to_string(), point.to_string(), fs_type.to_string(), opts.to_string()))
        .chain(
            mounts
                .into_iter()
                .map(|m| (m.device, m.mount_point, m.fs_type, m.options)),
        )
        .filter(|(_, _, fs_type, _)| type_selected(type_filter, fs_type))
        .map(|(dev, point, fs_type, opts)| format!("{dev} on {point} type {fs_type} ({opts})"))
        .collect();
    CommandResult::ok(lines.join("\n"))
}

impl Simulator for StorageSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "storage",
            version: LUSTRE_VERSION,
            description: "Local and Lustre filesystem views",
            commands: &["df", "lfs", "mount"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        let usage = match parsed.base_command.as_str() {
            "df" => "Usage: df [OPTION]... [FILE]...\n  -h, --human-readable  print sizes in powers of 1024\n  -T, --print-type      print file system type\n  -t, --type=TYPE       limit listing to file systems of type TYPE",
            "lfs" => "Usage: lfs <df|check|osts|mdts|getstripe> [options]",
            _ => "Usage: mount [-t type] [device|dir]",
        };
        if parsed.base_command == "lfs" && parsed.has_flag("version") {
            return CommandResult::ok(format!("lfs {LUSTRE_VERSION}"));
        }
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), usage, false) {
            return result;
        }
        match parsed.base_command.as_str() {
            "df" => df(ctx, parsed),
            "lfs" => lfs(ctx.state.cluster(), parsed),
            _ => mount(ctx, parsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::ClusterStore;
    use crate::traits::ClusterState;

    fn run(store: &mut ClusterStore, node: &str, line: &str) -> CommandResult {
        let mut ctx = CommandContext::new(store, node);
        StorageSimulator::new().execute(&parse(line), &mut ctx)
    }

    #[test]
    fn test_df_sizes_lustre_from_cluster() {
        let mut store = ClusterStore::default();
        let total = store.cluster().lustre.total_bytes();
        let result = run(&mut store, "dgx-01", "df");
        let lustre = result
            .output
            .lines()
            .find(|l| l.ends_with("/lustre"))
            .unwrap();
        assert!(lustre.contains(&bytes_to_kblocks(total).to_string()));
        assert!(result.output.lines().next().unwrap().starts_with("Filesystem"));
    }

    #[test]
    fn test_df_human_and_path() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "dgx-01", "df -h /raid/datasets");
        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Size"));
        assert!(lines[1].ends_with("/raid"));
    }

    #[test]
    fn test_df_on_head_node() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "bcm-head01", "df -h");
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("/lustre"));
    }

    #[test]
    fn test_lfs_inactive_ost() {
        let mut store = ClusterStore::default();
        store.cluster_mut().lustre.osts[3].active = false;

        let df = run(&mut store, "dgx-01", "lfs df");
        let ost3 = df
            .output
            .lines()
            .find(|l| l.starts_with("lustre-OST0003_UUID"))
            .unwrap();
        assert!(ost3.ends_with(": inactive device"));
        assert!(df.output.contains("filesystem_summary:"));

        let check = run(&mut store, "dgx-01", "lfs check servers");
        assert_eq!(check.exit_code, 1);
        assert!(check.output.contains("lustre-OST0003-osc"));
    }

    #[test]
    fn test_mount_listing_and_remount() {
        let mut store = ClusterStore::default();
        let listing = run(&mut store, "dgx-01", "mount -t lustre");
        assert_eq!(listing.output.lines().count(), 1);
        assert!(listing.output.contains("on /lustre type lustre"));

        let again = run(&mut store, "dgx-01", "mount /lustre");
        assert_eq!(again.exit_code, EXIT_MOUNT_FAILURE);
        assert!(again.output.contains("already mounted"));
    }
}
