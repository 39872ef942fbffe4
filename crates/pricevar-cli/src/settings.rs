//! TOML settings file with `[analysis]` and `[llm]` tables.
//!
//! Every key is optional. Command-line flags override the file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pricevar_ai::LlmConfig;
use pricevar_core::AnalysisConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub analysis: AnalysisConfig,
    pub llm: LlmConfig,
}

/// Flag values that take precedence over the settings file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub dataset_id: Option<String>,
    pub llm_url: Option<String>,
    pub llm_model: Option<String>,
    pub query_timeout_secs: Option<u64>,
}

impl Settings {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(id) = overrides.dataset_id {
            self.analysis.dataset_id = id;
        }
        if let Some(url) = overrides.llm_url {
            self.llm.base_url = url;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(secs) = overrides.query_timeout_secs {
            self.analysis.query_timeout_secs = secs;
        }
        self
    }
}
