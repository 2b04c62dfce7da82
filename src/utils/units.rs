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

//! Unit conversion and human-readable size formatting

pub const KIB: u64 = 1024;
pub const MIB: u64 = KIB * 1024;
pub const GIB: u64 = MIB * 1024;
pub const TIB: u64 = GIB * 1024;

/// Convert mebibytes to gibibytes
#[inline]
pub fn mib_to_gib(mib: u64) -> f64 {
    mib as f64 / 1024.0
}

/// Convert bytes to 1K blocks, rounding up like coreutils df
#[inline]
pub fn bytes_to_kblocks(bytes: u64) -> u64 {
    bytes.div_ceil(KIB)
}

/// Format a byte count the way `df -h` does (e.g. 1.8T, 212G, 500M)
pub fn format_bytes_human(bytes: u64) -> String {
    const UNITS: [(u64, &str); 5] = [(1 << 50, "P"), (TIB, "T"), (GIB, "G"), (MIB, "M"), (KIB, "K")];
    for (size, suffix) in UNITS {
        if bytes >= size {
            let value = bytes as f64 / size as f64;
            return if value < 10.0 {
                format!("{value:.1}{suffix}")
            } else {
                format!("{value:.0}{suffix}")
            };
        }
    }
    bytes.to_string()
}

/// Format seconds as `up N days, HH:MM` for uptime
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    match days {
        0 => format!("up {hours:2}:{minutes:02}"),
        1 => format!("up 1 day, {hours:2}:{minutes:02}"),
        _ => format!("up {days} days, {hours:2}:{minutes:02}"),
    }
}

/// Percentage used, rounded up like df's Use% column
pub fn percent_used(used: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (used * 100).div_ceil(total)
}
