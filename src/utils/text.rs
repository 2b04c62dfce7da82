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

use std::sync::OnceLock;

use crossterm::style::{Color, Stylize};
use regex::Regex;

static ANSI_REGEX: OnceLock<Regex> = OnceLock::new();

/// Remove terminal styling escapes.
pub fn strip_ansi(text: &str) -> String {
    let ansi_regex = ANSI_REGEX.get_or_init(|| {
        Regex::new(r"[\u001b\u009b][\[()#;?]*(?:[0-9]{1,4}(?:;[0-9]{0,4})*)?[0-9A-ORZcf-nqry=><]")
            .unwrap()
    });
    ansi_regex.replace_all(text, "").into_owned()
}

/// Wrap text in a foreground color.
pub fn colored(text: &str, color: Color) -> String {
    text.with(color).to_string()
}

pub fn bold(text: &str) -> String {
    text.bold().to_string()
}

/// Render rows as a left-aligned table with the given column gap.
pub fn render_table(header: &[&str], rows: &[Vec<String>], gap: usize) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            } else {
                widths.push(cell.len());
            }
        }
    }

    let render_row = |cells: Vec<&str>| -> String {
        let last = cells.len().saturating_sub(1);
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i == last {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{cell:<width$}", width = widths[i] + gap));
            }
        }
        line.trim_end().to_string()
    };

    let mut out = vec![render_row(header.to_vec())];
    out.extend(
        rows.iter()
            .map(|row| render_row(row.iter().map(String::as_str).collect())),
    );
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        let styled = colored("Healthy", Color::Green);
        assert_eq!(strip_ansi(&styled), "Healthy");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_render_table() {
        let table = render_table(
            &["NAME", "STATE"],
            &[
                vec!["dgx-01".to_string(), "idle".to_string()],
                vec!["dgx-100".to_string(), "drain".to_string()],
            ],
            2,
        );
        assert_eq!(table, "NAME     STATE\ndgx-01   idle\ndgx-100  drain");
    }
}
