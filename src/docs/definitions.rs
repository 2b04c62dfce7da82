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

//! Command definition registry consulted by `help` and `explain`.
//!
//! A registry ships with the crate (`data/commands.json`); a site may load
//! another file on top of it, whose entries replace built-in ones by name.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

const BUILTIN_DEFINITIONS: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/commands.json"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    pub description: String,
    #[serde(default)]
    pub takes_value: bool,
}

impl FlagDefinition {
    /// Whether `flag` (without dashes) names this flag.
    pub fn matches(&self, flag: &str) -> bool {
        self.name == flag || self.short.as_deref() == Some(flag)
    }

    pub fn display_name(&self) -> String {
        let value = if self.takes_value { " <value>" } else { "" };
        match &self.short {
            Some(short) => format!("-{short}, --{}{value}", self.name),
            None => format!("--{}{value}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcommandDefinition {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitCodeDefinition {
    pub code: i32,
    pub meaning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleDefinition {
    pub command: String,
    pub description: String,
}

/// Everything known about one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDefinition {
    pub name: String,
    pub category: String,
    pub description: String,
    pub synopsis: String,
    #[serde(default)]
    pub flags: Vec<FlagDefinition>,
    #[serde(default)]
    pub subcommands: Vec<SubcommandDefinition>,
    #[serde(default)]
    pub exit_codes: Vec<ExitCodeDefinition>,
    #[serde(default)]
    pub examples: Vec<ExampleDefinition>,
}

impl CommandDefinition {
    pub fn flag(&self, flag: &str) -> Option<&FlagDefinition> {
        self.flags.iter().find(|f| f.matches(flag))
    }
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    version: u32,
    commands: Vec<CommandDefinition>,
}

/// Read-only map of tool name to definition.
#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    definitions: BTreeMap<String, CommandDefinition>,
}

impl DefinitionRegistry {
    /// The definitions bundled with the crate.
    pub fn builtin() -> Self {
        match Self::from_json(BUILTIN_DEFINITIONS) {
            Ok(registry) => registry,
            Err(e) => {
                tracing::error!("Bundled command definitions are invalid: {e}");
                Self::default()
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let document: RegistryDocument = serde_json::from_str(json)?;
        debug!(
            "Parsed definition document v{} with {} commands",
            document.version,
            document.commands.len()
        );
        let mut definitions = BTreeMap::new();
        for definition in document.commands {
            if definition.name.trim().is_empty() {
                return Err(Error::InvalidDefinition(
                    "command with an empty name".to_string(),
                ));
            }
            if definitions.contains_key(&definition.name) {
                return Err(Error::InvalidDefinition(format!(
                    "duplicate command '{}'",
                    definition.name
                )));
            }
            definitions.insert(definition.name.clone(), definition);
        }
        Ok(Self { definitions })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Load a definition file without blocking the runtime.
    pub async fn load_async(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let registry = Self::from_json(&text)?;
        info!(
            "Loaded {} command definitions from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Entries of `other` replace entries with the same name.
    pub fn merge(&mut self, other: DefinitionRegistry) {
        self.definitions.extend(other.definitions);
    }

    pub fn get(&self, name: &str) -> Option<&CommandDefinition> {
        self.definitions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDefinition> {
        self.definitions.values()
    }

    /// Category names in first-seen order of the sorted tool names.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for definition in self.definitions.values() {
            if !categories.contains(&definition.category.as_str()) {
                categories.push(&definition.category);
            }
        }
        categories
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_registry() {
        let registry = DefinitionRegistry::builtin();
        assert!(registry.len() > 40);
        let smi = registry.get("nvidia-smi").unwrap();
        assert_eq!(smi.category, "gpu");
        assert!(smi.flag("q").is_some());
        assert!(smi.flag("query-gpu").unwrap().takes_value);
        assert!(smi.exit_codes.iter().any(|c| c.code == 15));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let json = r#"{"commands": [
            {"name": "a", "category": "x", "description": "", "synopsis": "a"},
            {"name": "a", "category": "x", "description": "", "synopsis": "a"}
        ]}"#;
        let err = DefinitionRegistry::from_json(json).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition(_)));
    }

    #[test]
    fn test_merge_replaces_by_name() {
        let mut registry = DefinitionRegistry::builtin();
        let before = registry.len();
        let site = DefinitionRegistry::from_json(
            r#"{"commands": [
                {"name": "sinfo", "category": "slurm", "description": "Site sinfo", "synopsis": "sinfo"},
                {"name": "site-check", "category": "site", "description": "Local checks", "synopsis": "site-check"}
            ]}"#,
        )
        .unwrap();
        registry.merge(site);
        assert_eq!(registry.len(), before + 1);
        assert_eq!(registry.get("sinfo").unwrap().description, "Site sinfo");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version": 2, "commands": [{{"name": "x", "category": "y", "description": "z", "synopsis": "x"}}]}}"#
        )
        .unwrap();
        let registry = DefinitionRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_load_async_missing_file() {
        let err = DefinitionRegistry::load_async("/nonexistent/commands.json")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
