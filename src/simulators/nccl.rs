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

//! `all_reduce_perf` from nccl-tests, run on the local node's GPUs.
//!
//! Bandwidth follows a latency plus bandwidth model whose peak is set by the
//! slowest participating GPU's active NVLinks, so a downed link shows up as a
//! lower bus bandwidth.

use crate::common::config::SimConfig;
use crate::parsing::common::parse_number;
use crate::parsing::ParsedCommand;
use crate::simulators::common::{handle_meta_flags, local_node};
use crate::state::constants::NCCL_VERSION;
use crate::state::types::{Gpu, LinkStatus, Node};
use crate::traits::{CommandContext, CommandResult, Simulator, SimulatorMetadata};
use crate::utils::units::{GIB, KIB, MIB};

const FLOAT_BYTES: u64 = 4;
const BASE_LATENCY_US: f64 = 18.0;
/// Share of the raw NVLink bandwidth NCCL reaches on large messages.
const LINK_EFFICIENCY: f64 = 0.82;
const MAX_ROWS: usize = 64;
const TEST_PID: u32 = 58_213;

const USAGE: &str = "USAGE: all_reduce_perf
\t[-t,--nthreads <num threads>]
\t[-g,--ngpus <gpus per thread>]
\t[-b,--minbytes <min size in bytes>]
\t[-e,--maxbytes <max size in bytes>]
\t[-i,--stepbytes <increment size>]
\t[-f,--stepfactor <increment factor>]
\t[-n,--iters <iteration count>]
\t[-w,--warmup_iters <warmup iteration count>]
\t[-c,--check <0/1>]
\t[-h,--help]";

/// Sizes such as `8`, `128K`, `32M` or `8G`. Sizes past `u64` are rejected.
fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, unit) = match value.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&value[..i], c.to_ascii_uppercase()),
        _ => (value, 'B'),
    };
    let base: u64 = parse_number(digits)?;
    let multiplier = match unit {
        'B' => 1,
        'K' => KIB,
        'M' => MIB,
        'G' => GIB,
        _ => return None,
    };
    base.checked_mul(multiplier)
}

#[derive(Debug, Clone, PartialEq)]
struct PerfOptions {
    gpus: usize,
    min_bytes: u64,
    max_bytes: u64,
    step_bytes: u64,
    step_factor: Option<u64>,
    iters: u32,
    warmup: u32,
    check: bool,
}

impl PerfOptions {
    fn from_parsed(parsed: &ParsedCommand) -> Result<Self, String> {
        let size = |short: &str, long: &str, default: u64| -> Result<u64, String> {
            match parsed.flag_value_any(&[short, long]) {
                Some(v) => parse_size(v).ok_or_else(|| format!("invalid size '{v}'")),
                None => Ok(default),
            }
        };
        let count = |short: &str, long: &str, default: u64| -> Result<u64, String> {
            match parsed.flag_value_any(&[short, long]) {
                Some(v) => parse_number(v).ok_or_else(|| format!("invalid value '{v}' for -{short}")),
                None => Ok(default),
            }
        };
        let factor = match parsed.flag_value_any(&["f", "stepfactor"]) {
            Some(v) => Some(parse_number::<u64>(v).ok_or_else(|| format!("invalid value '{v}' for -f"))?),
            None => None,
        };
        let options = Self {
            gpus: count("g", "ngpus", 1)? as usize,
            min_bytes: size("b", "minbytes", 32 * MIB)?,
            max_bytes: size("e", "maxbytes", 32 * MIB)?,
            step_bytes: size("i", "stepbytes", MIB)?,
            step_factor: factor,
            iters: count("n", "iters", 20)? as u32,
            warmup: count("w", "warmup_iters", 5)? as u32,
            check: count("c", "check", 1)? != 0,
        };
        if options.min_bytes > options.max_bytes {
            return Err(format!(
                "invalid size range: minBytes {} > maxBytes {}",
                options.min_bytes, options.max_bytes
            ));
        }
        Ok(options)
    }

    fn sizes(&self) -> Vec<u64> {
        let mut sizes = Vec::new();
        let mut size = self.min_bytes.max(FLOAT_BYTES);
        while size <= self.max_bytes && sizes.len() < MAX_ROWS {
            sizes.push(size);
            let next = match self.step_factor {
                Some(f) if f > 1 => size.checked_mul(f),
                _ if self.step_bytes > 0 => size.checked_add(self.step_bytes),
                _ => None,
            };
            match next {
                Some(next) => size = next,
                None => break,
            }
        }
        sizes
    }
}

/// Peak bus bandwidth in GB/s for a set of GPUs.
fn peak_busbw(gpus: &[&Gpu]) -> f64 {
    gpus.iter()
        .map(|g| {
            g.nvlinks
                .iter()
                .filter(|l| l.status == LinkStatus::Active)
                .map(|l| l.speed_gbps)
                .sum::<f64>()
        })
        .fold(f64::INFINITY, f64::min)
        * LINK_EFFICIENCY
}

struct Measurement {
    time_us: f64,
    algbw: f64,
    busbw: f64,
}

fn measure(bytes: u64, ranks: usize, peak_busbw: f64, in_place: bool) -> Measurement {
    let factor = if ranks > 1 {
        2.0 * (ranks as f64 - 1.0) / ranks as f64
    } else {
        0.0
    };
    let peak_algbw = if factor > 0.0 { peak_busbw / factor } else { peak_busbw };
    let latency = if in_place { BASE_LATENCY_US - 0.3 } else { BASE_LATENCY_US };
    let time_us = if peak_algbw > 0.0 {
        latency + bytes as f64 / (peak_algbw * 1e3)
    } else {
        latency
    };
    let algbw = bytes as f64 / time_us / 1e3;
    Measurement {
        time_us,
        algbw,
        busbw: algbw * factor,
    }
}

fn bus_label(gpu: &Gpu) -> String {
    let bus = gpu
        .pci_bus_id
        .split(':')
        .nth(1)
        .unwrap_or("00")
        .to_ascii_lowercase();
    format!("0x{bus}")
}

fn column(m: &Measurement, check: bool) -> String {
    let wrong = if check { "0" } else { "N/A" };
    format!(
        "{:>8.2}  {:>6.2}  {:>6.2}  {:>6}",
        m.time_us, m.algbw, m.busbw, wrong
    )
}

fn report(node: &Node, gpus: &[&Gpu], opts: &PerfOptions, nccl_debug: bool) -> String {
    let mut out = vec![format!(
        "# nThread 1 nGpus {} minBytes {} maxBytes {} step: {} warmup iters: {} iters: {} agg iters: 1 validation: {} graph: 0",
        gpus.len(),
        opts.min_bytes,
        opts.max_bytes,
        match opts.step_factor {
            Some(f) => format!("{f}(factor)"),
            None => format!("{}(bytes)", opts.step_bytes),
        },
        opts.warmup,
        opts.iters,
        u8::from(opts.check)
    )];
    out.push("#".to_string());
    out.push("# Using devices".to_string());
    for (rank, gpu) in gpus.iter().enumerate() {
        out.push(format!(
            "#  Rank {rank:2} Group  0 Pid {TEST_PID:6} on {:>10} device {:2} [{}] {}",
            node.hostname,
            gpu.id,
            bus_label(gpu),
            gpu.name
        ));
    }
    if nccl_debug {
        out.push(format!(
            "{}:{TEST_PID}:{TEST_PID} [0] NCCL INFO NCCL version {NCCL_VERSION}+cuda{}",
            node.hostname, node.cuda_version
        ));
    }
    out.push("#".to_string());
    out.push(format!("#{:>62}{:>35}", "out-of-place", "in-place"));
    out.push(
        "#       size         count      type   redop    root     time   algbw   busbw #wrong     time   algbw   busbw #wrong"
            .to_string(),
    );
    out.push(
        "#        (B)    (elements)                               (us)  (GB/s)  (GB/s)            (us)  (GB/s)  (GB/s)"
            .to_string(),
    );

    let peak = peak_busbw(gpus);
    let mut busbw_sum = 0.0;
    let sizes = opts.sizes();
    for &size in &sizes {
        let count = size / FLOAT_BYTES;
        let bytes = count * FLOAT_BYTES;
        let out_of_place = measure(bytes, gpus.len(), peak, false);
        let in_place = measure(bytes, gpus.len(), peak, true);
        busbw_sum += in_place.busbw;
        out.push(format!(
            "{bytes:>12}  {count:>12}  {:>8}  {:>6}  {:>6}  {}  {}",
            "float",
            "sum",
            -1,
            column(&out_of_place, opts.check),
            column(&in_place, opts.check)
        ));
    }
    let avg = if sizes.is_empty() {
        0.0
    } else {
        busbw_sum / sizes.len() as f64
    };
    out.push("# Out of bounds values : 0 OK".to_string());
    out.push(format!("# Avg bus bandwidth    : {avg:.4} "));
    out.push("#".to_string());
    out.join("\n")
}

pub struct NcclSimulator;

impl NcclSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NcclSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator for NcclSimulator {
    fn describe(&self) -> SimulatorMetadata {
        SimulatorMetadata {
            name: "nccl-tests",
            version: NCCL_VERSION,
            description: "NCCL collective bandwidth tests",
            commands: &["all_reduce_perf"],
        }
    }

    fn execute(&self, parsed: &ParsedCommand, ctx: &mut CommandContext<'_>) -> CommandResult {
        if let Some(result) = handle_meta_flags(parsed, &self.describe(), USAGE, true) {
            return result;
        }
        if let Some(word) = parsed.subcommand(0) {
            return CommandResult::usage(format!("invalid argument '{word}'\n{USAGE}"));
        }
        let opts = match PerfOptions::from_parsed(parsed) {
            Ok(opts) => opts,
            Err(message) => return CommandResult::usage(format!("{message}\n{USAGE}")),
        };
        let nccl_debug = ctx
            .env
            .get("NCCL_DEBUG")
            .is_some_and(|v| v.eq_ignore_ascii_case("info"));
        let node = match local_node(ctx, "all_reduce_perf") {
            Ok(node) => node,
            Err(err) => return err,
        };
        if opts.gpus == 0 || opts.gpus > node.gpus.len() {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!(
                    "{}: Test CUDA failure common.cu:892 'invalid device ordinal'\n .. {} pid {TEST_PID}: Test failure common.cu:1005",
                    node.hostname, node.hostname
                ),
            );
        }
        let gpus: Vec<&Gpu> = node.gpus.iter().take(opts.gpus).collect();
        if let Some(lost) = gpus.iter().find(|g| !g.is_accessible()) {
            return CommandResult::error(
                SimConfig::EXIT_FAILURE,
                format!(
                    "{host}: Test NCCL failure common.cu:961 'unhandled cuda error (run with NCCL_DEBUG=INFO for details) / '\n .. {host} pid {TEST_PID}: Test failure common.cu:1005\nGPU {} ({}) is not accessible",
                    lost.id,
                    lost.pci_bus_id,
                    host = node.hostname
                ),
            );
        }
        CommandResult::ok(report(node, &gpus, &opts, nccl_debug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::state::{ClusterStore, NvLinkUpdate};
    use crate::traits::ClusterState;

    fn run(store: &mut ClusterStore, line: &str) -> CommandResult {
        let mut ctx = CommandContext::new(store, "dgx-01");
        NcclSimulator::new().execute(&parse(line), &mut ctx)
    }

    fn avg_busbw(output: &str) -> f64 {
        output
            .lines()
            .find_map(|l| l.strip_prefix("# Avg bus bandwidth    : "))
            .and_then(|v| v.trim().parse().ok())
            .unwrap()
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("8"), Some(8));
        assert_eq!(parse_size("128M"), Some(128 * MIB));
        assert_eq!(parse_size("8G"), Some(8 * GIB));
        assert_eq!(parse_size("1x"), None);
    }

    #[test]
    fn test_size_sweep() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "all_reduce_perf -b 8 -e 128M -f 2 -g 8");
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let rows = result
            .output
            .lines()
            .filter(|l| !l.starts_with('#'))
            .count();
        assert_eq!(rows, 25);
        assert_eq!(result.output.matches("#  Rank").count(), 8);
        assert!(avg_busbw(&result.output) > 0.0);
    }

    #[test]
    fn test_huge_sizes_are_usage_errors() {
        assert_eq!(parse_size("99999999999G"), None);
        assert_eq!(parse_size("18446744073709551615"), Some(u64::MAX));

        let mut store = ClusterStore::default();
        let result = run(&mut store, "all_reduce_perf -b 8 -e 99999999999G -g 8");
        assert_eq!(result.exit_code, SimConfig::EXIT_USAGE);
        assert!(result.output.contains("invalid size '99999999999G'"));
        assert!(result.output.contains("USAGE: all_reduce_perf"));
    }

    #[test]
    fn test_sweep_stops_before_overflowing() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "all_reduce_perf -b 8 -e 128M -f 4000000000000000000 -g 8");
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let rows: Vec<&str> = result.output.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].trim_start().starts_with("8 "));

        let opts = PerfOptions {
            gpus: 8,
            min_bytes: u64::MAX - 8,
            max_bytes: u64::MAX,
            step_bytes: 16,
            step_factor: None,
            iters: 1,
            warmup: 0,
            check: true,
        };
        assert_eq!(opts.sizes(), vec![u64::MAX - 8]);
        let opts = PerfOptions {
            step_factor: Some(2),
            ..opts
        };
        assert_eq!(opts.sizes(), vec![u64::MAX - 8]);
    }

    #[test]
    fn test_single_gpu_has_no_bus_traffic() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "all_reduce_perf");
        assert_eq!(avg_busbw(&result.output), 0.0);
    }

    #[test]
    fn test_down_nvlink_lowers_bandwidth() {
        let mut store = ClusterStore::default();
        let healthy = avg_busbw(&run(&mut store, "all_reduce_perf -b 1G -e 1G -g 8").output);
        store
            .update_nvlink(
                "dgx-01",
                3,
                0,
                NvLinkUpdate {
                    status: Some(LinkStatus::Down),
                    ..Default::default()
                },
            )
            .unwrap();
        let degraded = avg_busbw(&run(&mut store, "all_reduce_perf -b 1G -e 1G -g 8").output);
        assert!(degraded < healthy);
    }

    #[test]
    fn test_stray_argument_is_rejected() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "all_reduce_perf bogus -g 8");
        assert_eq!(result.exit_code, SimConfig::EXIT_USAGE);
        assert!(result.output.starts_with("invalid argument 'bogus'\nUSAGE: all_reduce_perf"));
    }

    #[test]
    fn test_too_many_gpus() {
        let mut store = ClusterStore::default();
        let result = run(&mut store, "all_reduce_perf -g 16");
        assert_eq!(result.exit_code, SimConfig::EXIT_FAILURE);
    }
}
