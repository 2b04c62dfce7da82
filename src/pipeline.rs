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

//! Text filters for the pipe segments after a simulated command.
//!
//! Only the filters learners reach for when reading tool output are
//! understood: `grep`, `head`, `tail`, `wc`, `sort` and `uniq`.

use regex::RegexBuilder;

use crate::common::config::SimConfig;
use crate::parsing::parse;
use crate::parsing::common::parse_number;
use crate::traits::CommandResult;

/// Run `result`'s output through each segment in turn.
pub fn apply_pipeline(result: CommandResult, segments: &[String]) -> CommandResult {
    segments
        .iter()
        .fold(result, |input, segment| apply_filter(&input, segment))
}

fn apply_filter(input: &CommandResult, segment: &str) -> CommandResult {
    let parsed = parse(segment);
    let words = parsed.words();
    let lines: Vec<&str> = input.output.lines().collect();
    match parsed.base_command.as_str() {
        "grep" | "egrep" => grep(&lines, &words),
        "head" => CommandResult::ok(lines[..line_count(&words).min(lines.len())].join("\n")),
        "tail" => {
            let n = line_count(&words).min(lines.len());
            CommandResult::ok(lines[lines.len() - n..].join("\n"))
        }
        "wc" => CommandResult::ok(wc(&input.output, &words)),
        "sort" => {
            let mut sorted: Vec<&str> = lines.clone();
            if words.iter().any(|w| w == "-n") {
                sorted.sort_by_key(|l| leading_number(l));
            } else {
                sorted.sort_unstable();
            }
            if words.iter().any(|w| w == "-r") {
                sorted.reverse();
            }
            CommandResult::ok(sorted.join("\n"))
        }
        "uniq" => {
            let mut unique: Vec<&str> = lines.clone();
            unique.dedup();
            CommandResult::ok(unique.join("\n"))
        }
        "" => CommandResult::usage("bash: syntax error near unexpected token `|'"),
        other => CommandResult::error(
            SimConfig::EXIT_COMMAND_NOT_FOUND,
            format!("{other}: command not found"),
        ),
    }
}

/// `-n N`, `-nN` or `-N`; ten lines otherwise.
fn line_count(words: &[String]) -> usize {
    let mut iter = words.iter();
    while let Some(word) = iter.next() {
        if word == "-n" {
            return iter.next().and_then(|n| parse_number(n)).unwrap_or(10);
        }
        if let Some(n) = word.strip_prefix("-n").or_else(|| word.strip_prefix('-')) {
            if let Some(n) = parse_number(n) {
                return n;
            }
        }
    }
    10
}

fn leading_number(line: &str) -> i64 {
    let digits: String = line
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    digits.parse().unwrap_or(0)
}

fn grep(lines: &[&str], words: &[String]) -> CommandResult {
    let mut ignore_case = false;
    let mut invert = false;
    let mut count = false;
    let mut pattern: Option<&str> = None;
    let mut iter = words.iter();
    while let Some(word) = iter.next() {
        match word.as_str() {
            "-e" => pattern = iter.next().map(String::as_str),
            w if w.starts_with('-') && w.len() > 1 => {
                for c in w[1..].chars() {
                    match c {
                        'i' => ignore_case = true,
                        'v' => invert = true,
                        'c' => count = true,
                        _ => {}
                    }
                }
            }
            w if pattern.is_none() => pattern = Some(w),
            _ => {}
        }
    }
    let Some(pattern) = pattern else {
        return CommandResult::usage("Usage: grep [OPTION]... PATTERNS [FILE]...");
    };
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(pattern))
                .case_insensitive(ignore_case)
                .build()
        });
    let regex = match regex {
        Ok(regex) => regex,
        Err(e) => return CommandResult::usage(format!("grep: {e}")),
    };
    let selected: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| regex.is_match(l) != invert)
        .collect();
    let exit_code = if selected.is_empty() {
        SimConfig::EXIT_FAILURE
    } else {
        SimConfig::EXIT_SUCCESS
    };
    let output = if count {
        selected.len().to_string()
    } else {
        selected.join("\n")
    };
    CommandResult {
        output,
        exit_code,
        prompt: None,
    }
}

fn wc(text: &str, words: &[String]) -> String {
    let lines = if text.is_empty() { 0 } else { text.lines().count() };
    let word_count = text.split_whitespace().count();
    let bytes = if text.is_empty() { 0 } else { text.len() + 1 };
    let wanted: Vec<char> = words
        .iter()
        .filter_map(|w| w.strip_prefix('-'))
        .flat_map(str::chars)
        .collect();
    if wanted.is_empty() {
        return format!("{lines:>7} {word_count:>7} {bytes:>7}");
    }
    let mut parts = Vec::new();
    if wanted.contains(&'l') {
        parts.push(lines.to_string());
    }
    if wanted.contains(&'w') {
        parts.push(word_count.to_string());
    }
    if wanted.contains(&'c') {
        parts.push(bytes.to_string());
    }
    parts.join(" ")
}
