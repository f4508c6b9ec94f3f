//! On-disk configuration for the pool and its engines, loaded from TOML.

use std::collections::HashMap;

use serde::Deserialize;

use crate::transport::ProcessSpec;

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub pwd: Option<String>,
}

impl EngineConfig {
    pub fn to_process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            command: self.command.clone(),
            args: self.args.clone(),
            pwd: self.pwd.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PoolConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { capacity: default_capacity() }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub engines: HashMap<String, EngineConfig>,
}
