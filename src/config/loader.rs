// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::consts::{DEFAULT_INSTANCE_ID, DEFAULT_MAX_LEASES_PER_ITEM};
use crate::decoration::{DecorationOrdering, DecoratorConfig};
use crate::errors::ConfigError;
use crate::graph::{DependantChain, Hop};
use crate::observability::messages::validation::ConfigLoaded;
use crate::observability::messages::StructuredLog;

/// Executor settings. The serialisable part can be loaded from YAML or TOML; decoration
/// settings are attached in code.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    #[serde(default)]
    pub command_order: CommandOrder,
    #[serde(default)]
    pub dispatch: DispatchStrategy,
    /// Each entry is one chain, written as its hops from the root.
    #[serde(default)]
    pub disabled_dependant_chains: Vec<Vec<Hop>>,
    #[serde(default)]
    pub queue_pool: QueuePoolConfig,
    #[serde(skip)]
    decoration_ordering: DecorationOrdering,
    #[serde(skip)]
    decorator_configs: Vec<DecoratorConfig>,
}

/// Where commands produced while handling a command are run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOrder {
    /// Every command goes to the back of the queue.
    #[default]
    Breadth,
    /// Commands run inline, ahead of anything already queued.
    Depth,
}

/// How a flush hands registered root requests to their nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// One command per request.
    #[default]
    Granular,
    /// One batch command per node.
    Batch,
}

impl CommandOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandOrder::Breadth => "breadth",
            CommandOrder::Depth => "depth",
        }
    }
}

impl DispatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStrategy::Granular => "granular",
            DispatchStrategy::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueuePoolConfig {
    #[serde(default = "default_max_leases_per_item")]
    pub max_leases_per_item: usize,
}

impl Default for QueuePoolConfig {
    fn default() -> Self {
        Self {
            max_leases_per_item: DEFAULT_MAX_LEASES_PER_ITEM,
        }
    }
}

fn default_instance_id() -> String {
    DEFAULT_INSTANCE_ID.to_string()
}

fn default_max_leases_per_item() -> usize {
    DEFAULT_MAX_LEASES_PER_ITEM
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            command_order: CommandOrder::default(),
            dispatch: DispatchStrategy::default(),
            disabled_dependant_chains: Vec::new(),
            queue_pool: QueuePoolConfig::default(),
            decoration_ordering: DecorationOrdering::default(),
            decorator_configs: Vec::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Self::default()
        }
    }

    pub fn with_command_order(mut self, command_order: CommandOrder) -> Self {
        self.command_order = command_order;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchStrategy) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_disabled_chain<I>(mut self, hops: I) -> Self
    where
        I: IntoIterator<Item = Hop>,
    {
        self.disabled_dependant_chains.push(hops.into_iter().collect());
        self
    }

    pub fn with_decoration_ordering(mut self, ordering: DecorationOrdering) -> Self {
        self.decoration_ordering = ordering;
        self
    }

    /// Adds an executor-level request-scoped decorator config. Logic-level configs of the same
    /// decorator type take precedence.
    pub fn with_decorator_config(mut self, config: DecoratorConfig) -> Self {
        self.decorator_configs.push(config);
        self
    }

    pub fn disabled_chains(&self) -> HashSet<DependantChain> {
        self.disabled_dependant_chains
            .iter()
            .map(|hops| DependantChain::from_hops(hops.iter().cloned()))
            .collect()
    }

    pub fn decoration_ordering(&self) -> &DecorationOrdering {
        &self.decoration_ordering
    }

    pub fn decorator_configs(&self) -> &[DecoratorConfig] {
        &self.decorator_configs
    }
}

/// Loads an [`ExecutorConfig`], choosing the format from the file extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ExecutorConfig, ConfigError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let content = fs::read_to_string(path)?;

    let (config, format) = match extension.as_str() {
        "yaml" | "yml" => (serde_yaml::from_str::<ExecutorConfig>(&content)?, "yaml"),
        "toml" => (toml::from_str::<ExecutorConfig>(&content)?, "toml"),
        _ => return Err(ConfigError::UnsupportedExtension(extension)),
    };

    ConfigLoaded {
        path: &path.display().to_string(),
        format,
    }
    .log();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_yaml_config() {
        let yaml = r#"
instance_id: greeter
command_order: depth
dispatch: batch
disabled_dependant_chains:
  - - node: greeting
      dependency: user_info
queue_pool:
  max_leases_per_item: 2
"#;
        let file = write_config(".yaml", yaml);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.instance_id, "greeter");
        assert_eq!(config.command_order, CommandOrder::Depth);
        assert_eq!(config.dispatch, DispatchStrategy::Batch);
        assert_eq!(config.queue_pool.max_leases_per_item, 2);

        let expected = DependantChain::start().extend(&"greeting".into(), "user_info");
        assert!(config.disabled_chains().contains(&expected));
    }

    #[test]
    fn parse_toml_config_with_defaults() {
        let toml = r#"
instance_id = "toml-instance"
"#;
        let file = write_config(".toml", toml);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.instance_id, "toml-instance");
        assert_eq!(config.command_order, CommandOrder::Breadth);
        assert_eq!(config.dispatch, DispatchStrategy::Granular);
        assert_eq!(config.queue_pool.max_leases_per_item, DEFAULT_MAX_LEASES_PER_ITEM);
        assert!(config.disabled_chains().is_empty());
    }

    #[test]
    fn empty_yaml_mapping_uses_defaults() {
        let file = write_config(".yml", "{}\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.instance_id, DEFAULT_INSTANCE_ID);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let file = write_config(".json", "{}");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedExtension(ext)) if ext == "json"));
    }

    #[test]
    fn invalid_yaml_is_reported() {
        let file = write_config(".yaml", "command_order: sideways\n");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load_config("/definitely/not/here.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
