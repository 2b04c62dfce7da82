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

//! Command-line parser.
//!
//! Grammar, in order of precedence:
//! - whitespace separates tokens except inside single or double quotes; quotes
//!   are stripped and a quoted token is never a flag
//! - `|` outside quotes starts a new pipe segment; only the first segment is
//!   parsed into structure
//! - `--name` is a boolean flag, `--name=value` splits on the first `=`
//! - `-x` takes the next token as its value unless that token is itself a flag
//! - `-la` is one flag named `la`; short flags are never bundled, since tools
//!   such as nvidia-smi use multi-letter short flags (`-mig`, `-lgip`)
//! - `-` and `-<digits>` are values, not flags
//!
//! Parsing never fails. Malformed input (an unterminated quote, say) yields a
//! best-effort structure.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Value(String),
}

impl FlagValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::Value(v) => Some(v),
            FlagValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{b}"),
            FlagValue::Value(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCommand {
    pub base_command: String,
    /// Bare tokens before the first flag.
    pub subcommands: Vec<String>,
    /// Bare tokens after the first flag that no flag consumed.
    pub positional_args: Vec<String>,
    pub flags: BTreeMap<String, FlagValue>,
    /// The input line, byte for byte.
    pub raw: String,
    /// Pipe segments after the first, trimmed.
    pub pipes: Vec<String>,
}

#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn is_flag(&self) -> bool {
        if self.quoted || self.text.len() < 2 || !self.text.starts_with('-') {
            return false;
        }
        !is_negative_number(&self.text)
    }
}

fn is_negative_number(text: &str) -> bool {
    let rest = &text[1..];
    !rest.is_empty()
        && rest.chars().any(|c| c.is_ascii_digit())
        && rest.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Split on `|` outside quotes.
fn split_pipes(line: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '|') => {
                segments.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&line[start..]);
    segments
}

fn tokenize(segment: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut quote: Option<char> = None;

    for c in segment.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                if !in_token {
                    quoted = true;
                }
                in_token = true;
                quote = Some(c);
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                    in_token = false;
                    quoted = false;
                }
            }
            None => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(Token {
            text: current,
            quoted,
        });
    }
    tokens
}

/// Parse one command line.
pub fn parse(line: &str) -> ParsedCommand {
    let mut parsed = ParsedCommand {
        raw: line.to_string(),
        ..Default::default()
    };

    let mut segments = split_pipes(line).into_iter();
    let first = segments.next().unwrap_or_default();
    parsed.pipes = segments.map(|s| s.trim().to_string()).collect();

    let tokens = tokenize(first);
    let mut iter = tokens.into_iter().peekable();
    let Some(base) = iter.next() else {
        return parsed;
    };
    parsed.base_command = base.text;

    let mut seen_flag = false;
    while let Some(token) = iter.next() {
        if !token.is_flag() {
            if seen_flag {
                parsed.positional_args.push(token.text);
            } else {
                parsed.subcommands.push(token.text);
            }
            continue;
        }

        seen_flag = true;
        if let Some(long) = token.text.strip_prefix("--") {
            match long.split_once('=') {
                Some((name, value)) => {
                    parsed
                        .flags
                        .insert(name.to_string(), FlagValue::Value(value.to_string()));
                }
                None => {
                    parsed.flags.insert(long.to_string(), FlagValue::Bool(true));
                }
            }
            continue;
        }

        let name = token.text[1..].to_string();
        let takes_value = iter.peek().is_some_and(|next| !next.is_flag());
        let value = if takes_value {
            iter.next()
                .map(|next| FlagValue::Value(next.text))
                .unwrap_or(FlagValue::Bool(true))
        } else {
            FlagValue::Bool(true)
        };
        parsed.flags.insert(name, value);
    }

    parsed
}

impl ParsedCommand {
    pub fn is_empty(&self) -> bool {
        self.base_command.is_empty()
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn has_any_flag(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has_flag(n))
    }

    pub fn flag(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(name)
    }

    /// String value of a flag; `None` for missing or boolean flags.
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(FlagValue::as_str)
    }

    /// First value among several spellings of the same option.
    pub fn flag_value_any(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| self.flag_value(n))
    }

    pub fn subcommand(&self, index: usize) -> Option<&str> {
        self.subcommands.get(index).map(String::as_str)
    }

    /// All bare tokens, subcommands first.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.subcommands
            .iter()
            .chain(self.positional_args.iter())
            .map(String::as_str)
    }

    /// Tokens of the first pipe segment after the base command, in order and
    /// with quotes stripped.
    ///
    /// For tools whose long options take a separate value
    /// (`docker run --gpus all`), which the flag grammar cannot express.
    pub fn words(&self) -> Vec<String> {
        let first = split_pipes(&self.raw).into_iter().next().unwrap_or_default();
        tokenize(first).into_iter().skip(1).map(|t| t.text).collect()
    }

    /// Bare tokens plus the words captured by `switches`.
    ///
    /// A short boolean switch followed by an operand (`df -h /raid`) parses
    /// with the operand as its value; tools that know which of their flags
    /// are switches recover the operand here.
    pub fn operands(&self, switches: &[&str]) -> Vec<&str> {
        let mut operands: Vec<&str> = self.args().collect();
        operands.extend(switches.iter().filter_map(|s| self.flag_value(s)));
        operands
    }

    pub fn pipe_segments(&self) -> &[String] {
        &self.pipes
    }

    /// Re-derive a line that parses to the same structure.
    pub fn to_command_line(&self) -> String {
        let mut parts = vec![quote_if_needed(&self.base_command)];
        parts.extend(self.subcommands.iter().map(|s| quote_if_needed(s)));

        let has_values = self
            .flags
            .values()
            .any(|v| matches!(v, FlagValue::Value(_)));
        // A trailing short boolean would swallow the first positional
        let long_bools = !self.positional_args.is_empty() && !has_values;

        for (name, value) in &self.flags {
            if let FlagValue::Bool(_) = value {
                if long_bools || name.len() > 1 {
                    parts.push(format!("--{name}"));
                } else {
                    parts.push(format!("-{name}"));
                }
            }
        }
        for (name, value) in &self.flags {
            if let FlagValue::Value(v) = value {
                parts.push(format!("--{name}={}", quote_if_needed(v)));
            }
        }
        parts.extend(self.positional_args.iter().map(|s| quote_if_needed(s)));
        parts.join(" ")
    }
}

fn quote_if_needed(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '|' | '\'' | '"'))
        || (text.len() > 1 && text.starts_with('-') && !is_negative_number(text));
    if !needs_quotes {
        return text.to_string();
    }
    if text.contains('"') {
        format!("'{text}'")
    } else {
        format!("\"{text}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(v: &str) -> FlagValue {
        FlagValue::Value(v.to_string())
    }

    #[test]
    fn test_empty_input() {
        let parsed = parse("   ");
        assert!(parsed.is_empty());
        assert!(parsed.flags.is_empty());
        assert_eq!(parsed.raw, "   ");
    }

    #[test]
    fn test_short_flag_takes_value() {
        let parsed = parse("nvidia-smi -r -i 2");
        assert_eq!(parsed.base_command, "nvidia-smi");
        assert_eq!(parsed.flag("r"), Some(&FlagValue::Bool(true)));
        assert_eq!(parsed.flag("i"), Some(&value("2")));
    }

    #[test]
    fn test_words_keep_order() {
        let parsed = parse("docker run --gpus all --name \"my job\" img | head");
        assert_eq!(
            parsed.words(),
            vec!["run", "--gpus", "all", "--name", "my job", "img"]
        );
    }

    #[test]
    fn test_operands_recovers_switch_values() {
        let parsed = parse("df -h /raid");
        assert_eq!(parsed.args().count(), 0);
        assert_eq!(parsed.operands(&["h"]), vec!["/raid"]);
        assert!(parsed.has_flag("h"));
    }

    #[test]
    fn test_multi_letter_short_flag_is_not_bundled() {
        let parsed = parse("nvidia-smi mig -lgip");
        assert_eq!(parsed.subcommands, vec!["mig"]);
        assert!(parsed.has_flag("lgip"));
        assert!(!parsed.has_flag("l"));

        let parsed = parse("ls -la");
        assert!(parsed.has_flag("la"));
    }

    #[test]
    fn test_long_flag_splits_on_first_equals() {
        let parsed = parse("mlxconfig --option=key=value --verbose");
        assert_eq!(parsed.flag("option"), Some(&value("key=value")));
        assert_eq!(parsed.flag("verbose"), Some(&FlagValue::Bool(true)));
    }

    #[test]
    fn test_long_flag_never_takes_next_token() {
        let parsed = parse("sinfo --long partition");
        assert_eq!(parsed.flag("long"), Some(&FlagValue::Bool(true)));
        assert_eq!(parsed.positional_args, vec!["partition"]);
    }

    #[test]
    fn test_quotes_group_tokens() {
        let parsed = parse(r#"scontrol update NodeName=dgx-01 State=DRAIN Reason="bad gpu""#);
        assert_eq!(
            parsed.subcommands,
            vec!["update", "NodeName=dgx-01", "State=DRAIN", "Reason=bad gpu"]
        );

        let parsed = parse("echo 'a | b' -n");
        assert_eq!(parsed.subcommands, vec!["a | b"]);
        assert!(parsed.pipes.is_empty());
    }

    #[test]
    fn test_negative_numbers_and_dash_are_values() {
        let parsed = parse("tool -n -5 -");
        assert_eq!(parsed.flag("n"), Some(&value("-5")));
        assert_eq!(parsed.positional_args, vec!["-"]);
    }

    #[test]
    fn test_subcommands_and_positionals() {
        let parsed = parse("dcgmi diag -r 3 extra");
        assert_eq!(parsed.subcommands, vec!["diag"]);
        assert_eq!(parsed.flag_value("r"), Some("3"));
        assert_eq!(parsed.positional_args, vec!["extra"]);
    }

    #[test]
    fn test_pipes_are_split_outside_quotes() {
        let line = "nvidia-smi -q | grep -i temp | head -5";
        let parsed = parse(line);
        assert_eq!(parsed.raw, line);
        assert!(parsed.has_flag("q"));
        assert_eq!(parsed.pipe_segments(), ["grep -i temp", "head -5"]);
    }

    #[test]
    fn test_quoted_dash_token_is_not_a_flag() {
        let parsed = parse(r#"echo "-n""#);
        assert_eq!(parsed.subcommands, vec!["-n"]);
        assert!(parsed.flags.is_empty());
    }

    #[test]
    fn test_unterminated_quote_is_best_effort() {
        let parsed = parse("echo \"hello world");
        assert_eq!(parsed.subcommands, vec!["hello world"]);
    }

    #[test]
    fn test_to_command_line_reparses_equal() {
        for line in [
            "nvidia-smi -q -d TEMPERATURE -i 0",
            "ls -l /tmp",
            "sinfo -N --long",
            "scontrol update NodeName=dgx-01 Reason=\"gpu fault\"",
            "mlxconfig -d /dev/mst/mt4129_pciconf0 q --option=a=b rest",
            "ibportstate -D 0 1 disable",
        ] {
            let first = parse(line);
            let second = parse(&first.to_command_line());
            assert_eq!(first.base_command, second.base_command, "{line}");
            assert_eq!(first.subcommands, second.subcommands, "{line}");
            assert_eq!(first.positional_args, second.positional_args, "{line}");
            assert_eq!(first.flags, second.flags, "{line}");
        }
    }
}
