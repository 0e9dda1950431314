//! Invocation configuration for the external research agent.
//!
//! [`build`] derives an [`InvocationConfig`] from the current [`Settings`] on
//! every invocation. Nothing here is persisted.

use crate::config::Settings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

pub const MAX_RESEARCHER_ITERATIONS: u32 = 6;
pub const MAX_REACT_TOOL_CALLS: u32 = 10;
pub const MAX_CONCURRENT_RESEARCH_UNITS: u32 = 5;
pub const SEARCH_PROVIDER: &str = "tavily";

/// A model-backed stage of the research pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Summarization,
    Compression,
    FinalReport,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Research,
        Stage::Summarization,
        Stage::Compression,
        Stage::FinalReport,
    ];

    /// Prefix of this stage's keys in the agent's `configurable` object.
    pub fn key(self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Summarization => "summarization",
            Stage::Compression => "compression",
            Stage::FinalReport => "final_report",
        }
    }
}

/// Everything the research agent needs to run one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationConfig {
    pub model_name: String,
    pub per_stage_token_limits: BTreeMap<Stage, u32>,
    pub allow_clarification: bool,
    pub max_researcher_iterations: u32,
    pub max_react_tool_calls: u32,
    pub max_concurrent_research_units: u32,
    pub search_provider: String,
    #[serde(skip)]
    pub credentials: BTreeMap<String, String>,
    pub temperature: f32,
}

/// Derive the invocation configuration from user settings.
///
/// Temperature and token budget pass through unchanged; every stage gets the
/// provider's model and the same budget. Clarification is allowed by default.
pub fn build(settings: &Settings) -> InvocationConfig {
    let per_stage_token_limits = Stage::ALL
        .iter()
        .map(|stage| (*stage, settings.max_tokens))
        .collect();

    InvocationConfig {
        model_name: settings.provider.default_model().to_string(),
        per_stage_token_limits,
        allow_clarification: true,
        max_researcher_iterations: MAX_RESEARCHER_ITERATIONS,
        max_react_tool_calls: MAX_REACT_TOOL_CALLS,
        max_concurrent_research_units: MAX_CONCURRENT_RESEARCH_UNITS,
        search_provider: SEARCH_PROVIDER.to_string(),
        credentials: settings.credentials.clone(),
        temperature: settings.temperature,
    }
}

impl InvocationConfig {
    pub fn with_allow_clarification(mut self, allow: bool) -> Self {
        self.allow_clarification = allow;
        self
    }

    /// Model used for `stage`. Every stage currently shares one model.
    pub fn stage_model(&self, _stage: Stage) -> &str {
        &self.model_name
    }

    pub fn stage_token_limit(&self, stage: Stage) -> Option<u32> {
        self.per_stage_token_limits.get(&stage).copied()
    }

    /// Render the agent's `configurable` object.
    ///
    /// Stage keys follow `<stage>_model` / `<stage>_model_max_tokens`;
    /// credentials travel under `apiKeys`.
    pub fn to_configurable(&self) -> Value {
        let mut map = Map::new();
        for stage in Stage::ALL {
            map.insert(
                format!("{}_model", stage.key()),
                Value::from(self.stage_model(stage)),
            );
            if let Some(limit) = self.stage_token_limit(stage) {
                map.insert(
                    format!("{}_model_max_tokens", stage.key()),
                    Value::from(limit),
                );
            }
        }
        map.insert(
            "allow_clarification".into(),
            Value::from(self.allow_clarification),
        );
        map.insert(
            "max_researcher_iterations".into(),
            Value::from(self.max_researcher_iterations),
        );
        map.insert(
            "max_react_tool_calls".into(),
            Value::from(self.max_react_tool_calls),
        );
        map.insert(
            "max_concurrent_research_units".into(),
            Value::from(self.max_concurrent_research_units),
        );
        map.insert("search_api".into(), Value::from(self.search_provider.clone()));
        map.insert("apiKeys".into(), json!(self.credentials));
        map.insert("temperature".into(), Value::from(self.temperature));
        Value::Object(map)
    }
}
