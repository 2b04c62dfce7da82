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

//! XID error catalog
//!
//! XID codes are reported by the NVIDIA kernel driver. The catalog supplies the
//! description and severity used when a fault omits them, and classifies the
//! codes that make a GPU unreachable.

use crate::state::types::Severity;

pub struct XidInfo {
    pub code: u32,
    pub description: &'static str,
    pub severity: Severity,
    /// Recommended operator action, shown by diagnostics tools.
    pub action: &'static str,
}

const CATALOG: &[XidInfo] = &[
    XidInfo {
        code: 13,
        description: "Graphics Engine Exception",
        severity: Severity::Warning,
        action: "Run diagnostics; check application for out-of-range memory access",
    },
    XidInfo {
        code: 31,
        description: "GPU memory page fault",
        severity: Severity::Warning,
        action: "Debug the application; illegal address access",
    },
    XidInfo {
        code: 43,
        description: "GPU stopped processing",
        severity: Severity::Warning,
        action: "Application fault; restart the job",
    },
    XidInfo {
        code: 45,
        description: "Preemptive cleanup, due to previous errors",
        severity: Severity::Info,
        action: "None; follows other errors",
    },
    XidInfo {
        code: 48,
        description: "Double Bit ECC Error",
        severity: Severity::Critical,
        action: "Reset the GPU; if it recurs, replace the GPU",
    },
    XidInfo {
        code: 61,
        description: "Internal micro-controller breakpoint/warning",
        severity: Severity::Warning,
        action: "Reset the GPU",
    },
    XidInfo {
        code: 62,
        description: "Internal micro-controller halt",
        severity: Severity::Critical,
        action: "Reset the GPU",
    },
    XidInfo {
        code: 63,
        description: "ECC page retirement or row remapping recording event",
        severity: Severity::Warning,
        action: "Reset the GPU to complete row remapping",
    },
    XidInfo {
        code: 64,
        description: "ECC page retirement or row remapper recording failure",
        severity: Severity::Critical,
        action: "Replace the GPU",
    },
    XidInfo {
        code: 74,
        description: "NVLink Error",
        severity: Severity::Critical,
        action: "Check NVLink/NVSwitch health; reset the GPU",
    },
    XidInfo {
        code: 79,
        description: "GPU has fallen off the bus",
        severity: Severity::Critical,
        action: "Drain the node and reboot; if it recurs, reseat or replace the GPU",
    },
    XidInfo {
        code: 92,
        description: "High single-bit ECC error rate",
        severity: Severity::Warning,
        action: "Monitor; schedule GPU replacement",
    },
    XidInfo {
        code: 94,
        description: "Contained ECC error",
        severity: Severity::Warning,
        action: "Restart the affected application",
    },
    XidInfo {
        code: 95,
        description: "Uncontained ECC error",
        severity: Severity::Critical,
        action: "Reset the GPU",
    },
    XidInfo {
        code: 119,
        description: "GSP RPC timeout",
        severity: Severity::Critical,
        action: "Reset the GPU; update the driver",
    },
    XidInfo {
        code: 120,
        description: "GSP error",
        severity: Severity::Critical,
        action: "Reset the GPU",
    },
];

pub fn lookup(code: u32) -> Option<&'static XidInfo> {
    CATALOG.iter().find(|info| info.code == code)
}

pub fn description(code: u32) -> String {
    lookup(code)
        .map(|info| info.description.to_string())
        .unwrap_or_else(|| format!("Unknown XID {code}"))
}

pub fn default_severity(code: u32) -> Severity {
    lookup(code).map(|info| info.severity).unwrap_or_default()
}

/// Codes after which the GPU no longer answers on the PCIe bus.
pub fn is_bus_loss(code: u32) -> bool {
    code == 79
}

/// Codes that fail a diagnostic run for the GPU that raised them.
pub fn fails_diagnostics(code: u32) -> bool {
    matches!(code, 48 | 62 | 64 | 74 | 79 | 95 | 119 | 120)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_code() {
        let info = lookup(79).unwrap();
        assert_eq!(info.description, "GPU has fallen off the bus");
        assert_eq!(info.severity, Severity::Critical);
    }

    #[test]
    fn test_unknown_code_description() {
        assert_eq!(description(999), "Unknown XID 999");
        assert_eq!(default_severity(999), Severity::Warning);
    }

    #[test]
    fn test_classification() {
        assert!(is_bus_loss(79));
        assert!(!is_bus_loss(48));
        assert!(fails_diagnostics(48));
        assert!(!fails_diagnostics(13));
    }
}
