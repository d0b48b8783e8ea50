use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{
    DetectorParams, RejectionCriteria, DEFAULT_MAX_SCALE, DEFAULT_MIN_SCALE, DEFAULT_SCALES,
};

pub const CONFIG_ENV: &str = "SOFTCASCADE_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CascadeConfigFile {
    model_path: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    min_scale: Option<f64>,
    max_scale: Option<f64>,
    scales: Option<i32>,
    rejection: Option<RejectionCriteria>,
}

/// Settings for loading a soft cascade: where the model lives and how to search.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeConfig {
    pub model_path: Option<PathBuf>,
    pub params: DetectorParams,
}

impl CascadeConfig {
    /// Load from the file named by `SOFTCASCADE_CONFIG` (if set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like [`load`](Self::load), with an explicit config file.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => CascadeConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CascadeConfigFile) -> Self {
        let detector = file.detector.unwrap_or_default();
        Self {
            model_path: file.model_path,
            params: DetectorParams {
                min_scale: detector.min_scale.unwrap_or(DEFAULT_MIN_SCALE),
                max_scale: detector.max_scale.unwrap_or(DEFAULT_MAX_SCALE),
                scales: detector.scales.unwrap_or(DEFAULT_SCALES),
                rejection: detector.rejection.unwrap_or_default(),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SOFTCASCADE_MODEL") {
            if !path.trim().is_empty() {
                self.model_path = Some(PathBuf::from(path));
            }
        }
        if let Some(v) = env_parse::<f64>("SOFTCASCADE_MIN_SCALE")? {
            self.params.min_scale = v;
        }
        if let Some(v) = env_parse::<f64>("SOFTCASCADE_MAX_SCALE")? {
            self.params.max_scale = v;
        }
        if let Some(v) = env_parse::<i32>("SOFTCASCADE_SCALES")? {
            self.params.scales = v;
        }
        if let Ok(value) = std::env::var("SOFTCASCADE_REJECTION") {
            if !value.trim().is_empty() {
                self.params.rejection = value
                    .parse()
                    .map_err(|e| anyhow!("SOFTCASCADE_REJECTION: {}", e))?;
            }
        }
        Ok(())
    }

    /// Reject parameter sets the native search cannot use.
    pub fn validate(&self) -> Result<()> {
        let p = &self.params;
        if !p.min_scale.is_finite() || !p.max_scale.is_finite() {
            return Err(anyhow!("scale range must be finite"));
        }
        if p.min_scale <= 0.0 {
            return Err(anyhow!("min_scale must be greater than zero"));
        }
        if p.min_scale >= p.max_scale {
            return Err(anyhow!(
                "min_scale ({}) must be less than max_scale ({})",
                p.min_scale,
                p.max_scale
            ));
        }
        if p.scales <= 0 {
            return Err(anyhow!("scales must be a positive integer"));
        }
        Ok(())
    }

    /// Model path, or an error naming how to set one.
    pub fn require_model_path(&self) -> Result<&Path> {
        self.model_path.as_deref().ok_or_else(|| {
            anyhow!("no model path configured (set model_path, SOFTCASCADE_MODEL or --model)")
        })
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self::from_file(CascadeConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<CascadeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = serde_json::from_str(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    Ok(cfg)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number, got '{}'", key, value)),
        _ => Ok(None),
    }
}
