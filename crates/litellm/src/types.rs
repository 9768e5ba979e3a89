//! LiteLLM wire types
//!
//! Only the fields the portal reads are modelled; everything else in the
//! upstream payloads is ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Daily activity (/user/daily/activity)
// =============================================================================

/// Spend/usage counters reported by LiteLLM for one bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpendMetrics {
    #[serde(default)]
    pub spend: f64,
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(default)]
    pub api_requests: i64,
    #[serde(default)]
    pub successful_requests: i64,
    #[serde(default)]
    pub failed_requests: i64,
}

/// Metadata LiteLLM attaches to an API key bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyMetadata {
    #[serde(default)]
    pub key_alias: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

/// Usage attributed to one API key (identified by its LiteLLM token hash)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyActivity {
    #[serde(default)]
    pub metrics: SpendMetrics,
    #[serde(default)]
    pub metadata: KeyMetadata,
}

/// Usage for one model, optionally split by API key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelActivity {
    #[serde(default)]
    pub metrics: SpendMetrics,
    #[serde(default, alias = "api_keys")]
    pub api_key_breakdown: BTreeMap<String, KeyActivity>,
}

/// Usage for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderActivity {
    #[serde(default)]
    pub metrics: SpendMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityBreakdown {
    #[serde(default)]
    pub models: BTreeMap<String, ModelActivity>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderActivity>,
    #[serde(default)]
    pub api_keys: BTreeMap<String, KeyActivity>,
}

/// One calendar day of gateway activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyActivityDay {
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub metrics: SpendMetrics,
    #[serde(default)]
    pub breakdown: ActivityBreakdown,
}

impl DailyActivityDay {
    /// A day with no recorded activity
    pub fn empty(date: &str) -> Self {
        Self {
            date: date.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyActivityResponse {
    #[serde(default)]
    pub results: Vec<DailyActivityDay>,
}

// =============================================================================
// Models (/model/info)
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelInfoResponse {
    #[serde(default)]
    pub data: Vec<ModelInfoEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelInfoEntry {
    pub model_name: String,
    #[serde(default)]
    pub litellm_params: LiteLlmParams,
    #[serde(default)]
    pub model_info: ModelInfoDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiteLlmParams {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub custom_llm_provider: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelInfoDetails {
    #[serde(default)]
    pub litellm_provider: Option<String>,
    #[serde(default)]
    pub max_input_tokens: Option<i64>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub input_cost_per_token: Option<f64>,
    #[serde(default)]
    pub output_cost_per_token: Option<f64>,
    #[serde(default)]
    pub supports_vision: Option<bool>,
    #[serde(default)]
    pub supports_function_calling: Option<bool>,
}

impl ModelInfoEntry {
    /// Provider as reported, falling back to the `provider/` prefix of the routed model
    pub fn provider(&self) -> String {
        self.model_info
            .litellm_provider
            .clone()
            .or_else(|| self.litellm_params.custom_llm_provider.clone())
            .or_else(|| {
                self.litellm_params
                    .model
                    .as_deref()
                    .and_then(|m| m.split_once('/'))
                    .map(|(provider, _)| provider.to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn context_length(&self) -> Option<i64> {
        self.model_info.max_input_tokens.or(self.model_info.max_tokens)
    }
}

// =============================================================================
// Keys (/key/generate, /key/delete)
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateKeyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_alias: Option<String>,
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpm_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// e.g. `30d`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateKeyResponse {
    /// The secret key, only returned once
    pub key: String,
    /// LiteLLM's hashed token id; this is what daily activity is keyed by
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub key_alias: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DeleteKeysRequest<'a> {
    pub keys: &'a [String],
}

// =============================================================================
// Teams (/team/new)
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateTeamRequest {
    pub team_alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamResponse {
    pub team_id: String,
    #[serde(default)]
    pub team_alias: Option<String>,
}
