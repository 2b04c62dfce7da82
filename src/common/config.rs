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

use crate::state::HealthStatus;

/// Simulation configuration constants
pub struct SimConfig;

impl SimConfig {
    // Cluster defaults
    pub const DEFAULT_NODE_COUNT: usize = 4;
    pub const DEFAULT_HOSTNAME_PREFIX: &'static str = "dgx";
    pub const DEFAULT_CLUSTER_NAME: &'static str = "dgx-superpod";
    pub const DEFAULT_SEED: u64 = 0x5EED_CAFE;
    pub const HEAD_NODE: &'static str = "bcm-head01";
    pub const STANDBY_HEAD_NODE: &'static str = "bcm-head02";
    pub const HEAD_NODE_VIRTUAL_IP: &'static str = "10.0.0.100";
    pub const DEFAULT_USER: &'static str = "root";
    pub const DEFAULT_CWD: &'static str = "/root";
    pub const FIRST_JOB_ID: u32 = 1001;

    // GPU thermal thresholds (celsius)
    pub const GPU_TEMP_WARNING: u32 = 83;
    pub const GPU_TEMP_CRITICAL: u32 = 90;
    pub const GPU_TEMP_SHUTDOWN: u32 = 95;

    // Fault injection defaults
    pub const THERMAL_FAULT_DEFAULT_TEMP: u32 = 92;
    pub const MEMORY_FULL_RATIO: f64 = 0.98;
    pub const DEFAULT_XID_CODE: u32 = 79;

    // Fabric thresholds
    pub const SYMBOL_ERROR_THRESHOLD: u64 = 10;
    pub const LINK_DOWNED_THRESHOLD: u64 = 1;

    // Shell conventions
    pub const EXIT_SUCCESS: i32 = 0;
    pub const EXIT_FAILURE: i32 = 1;
    pub const EXIT_USAGE: i32 = 2;
    pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;
    pub const HISTORY_MAX_ENTRIES: usize = 1000;
}

/// Terminal styling for simulator output
pub struct ThemeConfig;

impl ThemeConfig {
    pub fn health_color(status: HealthStatus) -> crossterm::style::Color {
        use crossterm::style::Color;

        match status {
            HealthStatus::Ok => Color::Green,
            HealthStatus::Warning => Color::Yellow,
            HealthStatus::Critical => Color::Red,
        }
    }

    pub fn prompt_color(in_scenario: bool) -> crossterm::style::Color {
        use crossterm::style::Color;

        if in_scenario {
            Color::Cyan
        } else {
            Color::Green
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::style::Color;

    #[test]
    fn test_health_color() {
        assert_eq!(ThemeConfig::health_color(HealthStatus::Ok), Color::Green);
        assert_eq!(ThemeConfig::health_color(HealthStatus::Critical), Color::Red);
    }

    #[test]
    fn test_prompt_color() {
        assert_eq!(ThemeConfig::prompt_color(true), Color::Cyan);
        assert_eq!(ThemeConfig::prompt_color(false), Color::Green);
    }
}
