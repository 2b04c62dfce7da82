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

// Common parsing utilities for numbers, index lists and key=value arguments.

use std::str::FromStr;

/// Parse a number from a string after sanitizing by removing commas, underscores, and trimming.
/// Returns None if parsing fails.
pub fn parse_number<T: FromStr>(s: &str) -> Option<T> {
    let cleaned = s.trim().replace([',', '_'], "");
    cleaned.parse::<T>().ok()
}

/// Parse an index list such as `0`, `0,2,5` or `0-3` (ranges inclusive).
/// Returns None if any element fails to parse.
pub fn parse_index_list(s: &str) -> Option<Vec<u32>> {
    let mut out = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = parse_number(lo)?;
                let hi: u32 = parse_number(hi)?;
                if lo > hi {
                    return None;
                }
                out.extend(lo..=hi);
            }
            None => out.push(parse_number(part)?),
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Split a `Key=Value` argument. The key is matched case-insensitively by callers.
pub fn key_value(arg: &str) -> Option<(&str, &str)> {
    arg.split_once('=').filter(|(k, _)| !k.is_empty())
}

/// Find `Key=Value` among arguments, comparing keys case-insensitively.
pub fn find_key_value<'a, I>(args: I, key: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    args.into_iter()
        .filter_map(key_value)
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| sanitize_label_value(v))
}

/// Sanitize a quoted label/value by trimming whitespace and removing surrounding double quotes.
pub fn sanitize_label_value(s: &str) -> String {
    let trimmed = s.trim();
    trimmed.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_util() {
        assert_eq!(parse_number::<u32>("1_234"), Some(1234));
        assert_eq!(parse_number::<u64>("1,234,567"), Some(1_234_567));
        assert_eq!(parse_number::<f64>("  3.1234 "), Some(3.1234));
        assert_eq!(parse_number::<i32>("abc"), None);
    }

    #[test]
    fn test_parse_index_list() {
        assert_eq!(parse_index_list("3"), Some(vec![3]));
        assert_eq!(parse_index_list("0,2,5"), Some(vec![0, 2, 5]));
        assert_eq!(parse_index_list("0-3"), Some(vec![0, 1, 2, 3]));
        assert_eq!(parse_index_list("x"), None);
        assert_eq!(parse_index_list("3-1"), None);
    }

    #[test]
    fn test_find_key_value() {
        let args = ["update", "nodename=dgx-01", "State=DRAIN", "Reason=\"xid 79\""];
        assert_eq!(
            find_key_value(args, "NodeName").as_deref(),
            Some("dgx-01")
        );
        assert_eq!(find_key_value(args, "reason").as_deref(), Some("xid 79"));
        assert_eq!(find_key_value(args, "Weight"), None);
    }

    #[test]
    fn test_sanitize_label_value() {
        assert_eq!(sanitize_label_value(r#" "hello" "#), "hello".to_string());
        assert_eq!(sanitize_label_value("world"), "world".to_string());
    }
}
