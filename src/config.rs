// src/config.rs
use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cycle::EngineConfig;
use crate::ranking::MAX_RANKED;

const ENV_PATH: &str = "PULSE_CONFIG_PATH";
const ENV_BIND: &str = "PULSE_BIND";
const ENV_DB_PATH: &str = "PULSE_DB_PATH";
const ENV_INTERVAL: &str = "PULSE_CYCLE_INTERVAL_SECS";
const DEFAULT_PATH: &str = "config/pulse.toml";

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PulseConfig {
    pub cycle: CycleConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub translation: TranslationConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CycleConfig {
    pub interval_secs: u64,
    /// Per-cycle deadline enforced by the scheduler.
    pub deadline_secs: u64,
    pub analysis_lookback_secs: u64,
    pub interest_window_secs: u64,
    pub history_cutoff_secs: u64,
    pub retention_secs: u64,
    pub top_n: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            deadline_secs: 240,
            analysis_lookback_secs: 3600,
            interest_window_secs: 300,
            history_cutoff_secs: 1200,
            retention_secs: 86_400,
            top_n: MAX_RANKED,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub max_items: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/pulse.db"),
            max_items: 50_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub cache_capacity: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
        }
    }
}

/// Ten years; keeps `now - window` arithmetic in range.
const MAX_WINDOW_SECS: u64 = 10 * 365 * 86_400;

fn secs(s: u64) -> Duration {
    Duration::seconds(s.min(MAX_WINDOW_SECS) as i64)
}

impl PulseConfig {
    /// Parse TOML and normalize.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PulseConfig = toml::from_str(s).context("parsing pulse config")?;
        cfg.normalize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $PULSE_CONFIG_PATH
    /// 2) config/pulse.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("PULSE_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_PATH);
            if default.exists() {
                Self::load_from(&default)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env()?;
        cfg.normalize();
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(bind) = std::env::var(ENV_BIND) {
            if !bind.trim().is_empty() {
                self.server.bind = bind.trim().to_string();
            }
        }
        if let Ok(p) = std::env::var(ENV_DB_PATH) {
            if !p.trim().is_empty() {
                self.storage.db_path = PathBuf::from(p.trim());
            }
        }
        if let Ok(v) = std::env::var(ENV_INTERVAL) {
            self.cycle.interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_INTERVAL} must be a number of seconds, got {v:?}"))?;
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.cycle.top_n = self.cycle.top_n.clamp(1, MAX_RANKED);
        self.cycle.interval_secs = self.cycle.interval_secs.max(1);
        self.cycle.deadline_secs = self.cycle.deadline_secs.max(1);
        self.storage.max_items = self.storage.max_items.max(1);
        self.translation.cache_capacity = self.translation.cache_capacity.max(1);
    }

    pub fn engine_config(&self) -> EngineConfig {
        let c = &self.cycle;
        EngineConfig {
            interval: secs(c.interval_secs),
            analysis_lookback: secs(c.analysis_lookback_secs),
            interest_window: secs(c.interest_window_secs),
            history_cutoff: secs(c.history_cutoff_secs),
            retention: secs(c.retention_secs),
            top_n: c.top_n,
        }
    }
}
