//! Inbound invocation contract.

use pricevar_ai::{DEFAULT_INSIGHT_PROMPT, DEFAULT_MAX_PROMPT};
use pricevar_core::{OtherFilters, PeriodToken};
use serde::{Deserialize, Serialize};

use crate::report::FINAL_PROMPT_TEMPLATE;

/// One analysis request from the host platform.
///
/// Every field is optional on the wire; missing prompts fall back to the
/// built-in templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillRequest {
    pub time_periods: Vec<PeriodToken>,
    pub other_filters: OtherFilters,
    pub max_prompt: String,
    pub insight_prompt: String,
    pub final_prompt_template: String,
}

impl Default for SkillRequest {
    fn default() -> Self {
        Self {
            time_periods: Vec::new(),
            other_filters: OtherFilters::default(),
            max_prompt: DEFAULT_MAX_PROMPT.to_string(),
            insight_prompt: DEFAULT_INSIGHT_PROMPT.to_string(),
            final_prompt_template: FINAL_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl SkillRequest {
    pub fn with_periods<I, T>(mut self, periods: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PeriodToken>,
    {
        self.time_periods = periods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filters(mut self, filters: OtherFilters) -> Self {
        self.other_filters = filters;
        self
    }
}
