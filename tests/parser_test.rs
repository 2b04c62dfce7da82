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

//! Parser behavior on lines learners actually type.

use hpc_sim::parsing::{parse, FlagValue};

const LINES: &[&str] = &[
    "nvidia-smi",
    "  nvidia-smi   -q  -d TEMPERATURE ",
    "nvidia-smi --query-gpu=index,temperature.gpu --format=csv,noheader",
    "nvidia-smi mig -cgi 9,9 -C -i 0",
    "scontrol update NodeName=dgx-[01-02] State=DRAIN Reason=\"gpu fault | xid 79\"",
    "dmesg | grep -i xid | tail -n 5",
    "ls -la /lustre",
    "head -5",
    "cmsh -c 'device; status'",
    "echo 'unterminated",
    "",
    "   ",
];

#[test]
fn test_raw_is_preserved_byte_for_byte() {
    for line in LINES {
        assert_eq!(parse(line).raw, *line);
    }
}

#[test]
fn test_pipes_outside_quotes_only() {
    let parsed = parse("scontrol update NodeName=dgx-01 Reason=\"a | b\" | cat");
    assert_eq!(parsed.pipe_segments(), ["cat".to_string()]);
    assert!(parsed.subcommands.contains(&"Reason=a | b".to_string()));

    let parsed = parse("dmesg | grep -i xid | tail -n 5");
    assert_eq!(parsed.base_command, "dmesg");
    assert_eq!(parsed.pipe_segments().len(), 2);
    assert!(parsed.flags.is_empty());
}

#[test]
fn test_tool_specific_short_flags() {
    let parsed = parse("nvidia-smi mig -cgi 9,9 -C -i 0");
    assert_eq!(parsed.subcommands, vec!["mig"]);
    assert_eq!(parsed.flag_value("cgi"), Some("9,9"));
    assert_eq!(parsed.flag("C"), Some(&FlagValue::Bool(true)));
    assert_eq!(parsed.flag_value("i"), Some("0"));

    let parsed = parse("ls -la /lustre");
    assert!(parsed.has_flag("la"));
    assert!(!parsed.has_flag("l"));

    let parsed = parse("head -5");
    assert!(parsed.flags.is_empty());
    assert_eq!(parsed.subcommands, vec!["-5"]);
}

#[test]
fn test_blank_lines_parse_empty() {
    assert!(parse("").is_empty());
    assert!(parse("   \t ").is_empty());
}
