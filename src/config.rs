// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesher configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::mesher::refiner::DEFAULT_MAX_INSERTIONS;
use crate::mesher::{OptimizerConfig, RefinementCriteria};

/// Default configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "volmesh.toml";

/// Mesher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MesherConfig {
    /// Refinement insertion budget
    pub max_insertions: usize,
    /// Run the optimizer after refinement
    pub optimize: bool,
    /// Criteria used when a caller does not pass its own
    pub criteria: RefinementCriteria,
    pub optimizer: OptimizerConfig,
}

impl Default for MesherConfig {
    fn default() -> Self {
        Self {
            max_insertions: DEFAULT_MAX_INSERTIONS,
            optimize: false,
            criteria: RefinementCriteria::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl MesherConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: MesherConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load `volmesh.toml` if present, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from(CONFIG_FILE).exists() {
            Self::from_file(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `VOLMESH_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("VOLMESH_MAX_INSERTIONS") {
            self.max_insertions = value
                .parse()
                .with_context(|| format!("Invalid VOLMESH_MAX_INSERTIONS: {}", value))?;
        }

        if let Some(value) = lookup("VOLMESH_SEED") {
            self.optimizer.seed = value
                .parse()
                .with_context(|| format!("Invalid VOLMESH_SEED: {}", value))?;
        }

        if let Some(value) = lookup("VOLMESH_OPTIMIZE") {
            self.optimize = value.parse().unwrap_or(false);
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::CellSize;
    use std::collections::HashMap;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volmesh.toml");

        let mut config = MesherConfig::default();
        config.criteria.cell_size = CellSize::Field;
        config.optimizer.exude = false;
        config.max_insertions = 42;
        config.save(&path).unwrap();

        let loaded = MesherConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volmesh.toml");
        std::fs::write(&path, "optimize = true\n\n[optimizer]\nseed = 9\n").unwrap();

        let loaded = MesherConfig::from_file(&path).unwrap();
        assert!(loaded.optimize);
        assert_eq!(loaded.optimizer.seed, 9);
        assert!(loaded.optimizer.perturb);
        assert_eq!(loaded.max_insertions, DEFAULT_MAX_INSERTIONS);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VOLMESH_MAX_INSERTIONS", "1000"),
            ("VOLMESH_SEED", "17"),
            ("VOLMESH_OPTIMIZE", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = MesherConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.max_insertions, 1000);
        assert_eq!(config.optimizer.seed, 17);
        assert!(config.optimize);

        let mut config = MesherConfig::default();
        assert!(config
            .apply_env(|key| (key == "VOLMESH_SEED").then(|| "abc".to_string()))
            .is_err());
    }
}
