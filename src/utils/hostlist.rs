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

//! Slurm-style hostlist expressions such as `dgx-[01-04,07]`.

use crate::parsing::common::parse_number;

/// Expand a hostlist expression into hostnames.
///
/// Comma-separated at the top level; each item may carry one bracketed range
/// list. Zero padding of the range start is kept. Malformed brackets are taken
/// literally.
pub fn expand(expr: &str) -> Vec<String> {
    let mut hosts = Vec::new();
    for item in split_top_level(expr) {
        let (Some(open), Some(close)) = (item.find('['), item.rfind(']')) else {
            hosts.push(item.to_string());
            continue;
        };
        if close < open {
            hosts.push(item.to_string());
            continue;
        }
        let prefix = &item[..open];
        let suffix = &item[close + 1..];
        for range in item[open + 1..close].split(',') {
            let (lo, hi) = range.split_once('-').unwrap_or((range, range));
            let width = lo.len();
            match (parse_number::<u32>(lo), parse_number::<u32>(hi)) {
                (Some(lo), Some(hi)) if lo <= hi => {
                    hosts.extend((lo..=hi).map(|n| format!("{prefix}{n:0width$}{suffix}")));
                }
                _ => hosts.push(format!("{prefix}{range}{suffix}")),
            }
        }
    }
    hosts
}

fn split_top_level(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(expr[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(expr[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Compress hostnames sharing a prefix into a hostlist expression.
pub fn compress(hosts: &[String]) -> String {
    let mut groups: Vec<(String, usize, Vec<u32>)> = Vec::new();
    let mut singles: Vec<String> = Vec::new();

    for host in hosts {
        let digits = host.len() - host.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            singles.push(host.clone());
            continue;
        }
        let (prefix, number) = host.split_at(host.len() - digits);
        let Some(n) = parse_number::<u32>(number) else {
            singles.push(host.clone());
            continue;
        };
        match groups
            .iter_mut()
            .find(|(p, w, _)| p == prefix && *w == digits)
        {
            Some((_, _, numbers)) => numbers.push(n),
            None => groups.push((prefix.to_string(), digits, vec![n])),
        }
    }

    let mut parts = Vec::new();
    for (prefix, width, mut numbers) in groups {
        numbers.sort_unstable();
        numbers.dedup();
        if numbers.len() == 1 {
            parts.push(format!("{prefix}{:0width$}", numbers[0]));
            continue;
        }
        let mut ranges = Vec::new();
        let mut start = numbers[0];
        let mut prev = numbers[0];
        for &n in &numbers[1..] {
            if n != prev + 1 {
                ranges.push(format_range(start, prev, width));
                start = n;
            }
            prev = n;
        }
        ranges.push(format_range(start, prev, width));
        parts.push(format!("{prefix}[{}]", ranges.join(",")));
    }
    parts.extend(singles);
    parts.join(",")
}

fn format_range(start: u32, end: u32, width: usize) -> String {
    if start == end {
        format!("{start:0width$}")
    } else {
        format!("{start:0width$}-{end:0width$}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expand() {
        assert_eq!(expand("dgx-[01-03]"), hosts(&["dgx-01", "dgx-02", "dgx-03"]));
        assert_eq!(
            expand("dgx-[01,04],bcm-head01"),
            hosts(&["dgx-01", "dgx-04", "bcm-head01"])
        );
        assert_eq!(expand("dgx-02"), hosts(&["dgx-02"]));
    }

    #[test]
    fn test_compress() {
        assert_eq!(
            compress(&hosts(&["dgx-01", "dgx-02", "dgx-03", "dgx-05"])),
            "dgx-[01-03,05]"
        );
        assert_eq!(compress(&hosts(&["dgx-04"])), "dgx-04");
        assert_eq!(compress(&[]), "");
    }
}
