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

/// Parse a flag's value into a number, trying each spelling in turn.
/// - Looks the flag up on a `ParsedCommand` by each given name.
/// - Skips boolean flags (no value).
/// - Parses the value with `parse_number`, so `1,024` and `1_024` work.
///
/// Returns Option<T> (None if no spelling is present or parsing fails).
#[macro_export]
macro_rules! flag_number {
    ($parsed:expr, $ty:ty, $($name:expr),+ $(,)?) => {{
        let mut found: Option<$ty> = None;
        $(
            if found.is_none() {
                found = $parsed
                    .flag_value($name)
                    .and_then(|v| $crate::parsing::common::parse_number::<$ty>(v));
            }
        )+
        found
    }};
}

/// Build a failing `CommandResult` from a format string.
///
/// `cmd_error!(2, "bad flag {}", name)` is shorthand for
/// `CommandResult::error(2, format!("bad flag {}", name))`.
#[macro_export]
macro_rules! cmd_error {
    ($code:expr, $($arg:tt)+) => {
        $crate::traits::CommandResult::error($code, format!($($arg)+))
    };
}
