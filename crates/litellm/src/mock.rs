//! Deterministic mock responses for running without a gateway

use sha2::{Digest, Sha256};

use crate::types::*;

/// (model name, provider, input cost, output cost, context)
const MOCK_MODELS: &[(&str, &str, f64, f64, i64)] = &[
    ("gpt-4o", "openai", 0.000_002_5, 0.000_01, 128_000),
    ("granite-3-8b-instruct", "watsonx", 0.000_000_2, 0.000_000_2, 8_192),
    ("llama-3.1-8b-instruct", "vllm", 0.0, 0.0, 131_072),
];

/// Mock key buckets: (token hash, alias)
const MOCK_KEYS: &[(&str, &str)] = &[
    ("mock-token-0001", "mock-key-alice"),
    ("mock-token-0002", "mock-key-bob"),
];

/// LiteLLM identifies keys by the SHA-256 of the secret
pub fn token_hash(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn seed(date: &str, salt: &str) -> u64 {
    let digest = Sha256::digest(format!("{}:{}", date, salt).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn mock_metrics(date: &str, salt: &str, input_cost: f64, output_cost: f64) -> SpendMetrics {
    let s = seed(date, salt);
    let api_requests = (s % 200) as i64 + 5;
    let failed_requests = ((s >> 8) % 5) as i64;
    let prompt_tokens = api_requests * ((s >> 16) % 400 + 50) as i64;
    let completion_tokens = api_requests * ((s >> 24) % 200 + 20) as i64;
    SpendMetrics {
        spend: prompt_tokens as f64 * input_cost + completion_tokens as f64 * output_cost,
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
        api_requests,
        successful_requests: api_requests - failed_requests.min(api_requests),
        failed_requests: failed_requests.min(api_requests),
    }
}

fn add(into: &mut SpendMetrics, m: &SpendMetrics) {
    into.spend += m.spend;
    into.prompt_tokens += m.prompt_tokens;
    into.completion_tokens += m.completion_tokens;
    into.total_tokens += m.total_tokens;
    into.api_requests += m.api_requests;
    into.successful_requests += m.successful_requests;
    into.failed_requests += m.failed_requests;
}

/// Activity for a day; identical inputs always yield identical output
pub fn daily_activity(date: &str) -> DailyActivityDay {
    let mut day = DailyActivityDay::empty(date);

    for (model, provider, input_cost, output_cost, _) in MOCK_MODELS {
        let mut model_activity = ModelActivity::default();
        for (hash, alias) in MOCK_KEYS {
            let salt = format!("{}:{}", model, hash);
            let metrics = mock_metrics(date, &salt, *input_cost, *output_cost);
            add(&mut model_activity.metrics, &metrics);

            let key_entry = day
                .breakdown
                .api_keys
                .entry(hash.to_string())
                .or_insert_with(|| KeyActivity {
                    metrics: SpendMetrics::default(),
                    metadata: KeyMetadata {
                        key_alias: Some(alias.to_string()),
                        team_id: None,
                    },
                });
            add(&mut key_entry.metrics, &metrics);

            model_activity.api_key_breakdown.insert(
                hash.to_string(),
                KeyActivity {
                    metrics,
                    metadata: KeyMetadata {
                        key_alias: Some(alias.to_string()),
                        team_id: None,
                    },
                },
            );
        }

        add(
            &mut day
                .breakdown
                .providers
                .entry(provider.to_string())
                .or_default()
                .metrics,
            &model_activity.metrics,
        );
        add(&mut day.metrics, &model_activity.metrics);
        day.breakdown.models.insert(model.to_string(), model_activity);
    }

    day
}

pub fn model_info() -> Vec<ModelInfoEntry> {
    MOCK_MODELS
        .iter()
        .map(|(name, provider, input_cost, output_cost, context)| ModelInfoEntry {
            model_name: name.to_string(),
            litellm_params: LiteLlmParams {
                model: Some(format!("{}/{}", provider, name)),
                custom_llm_provider: None,
            },
            model_info: ModelInfoDetails {
                litellm_provider: Some(provider.to_string()),
                max_input_tokens: Some(*context),
                max_tokens: None,
                input_cost_per_token: Some(*input_cost),
                output_cost_per_token: Some(*output_cost),
                supports_vision: Some(*name == "gpt-4o"),
                supports_function_calling: Some(*provider != "vllm"),
            },
        })
        .collect()
}

pub fn generate_key(req: &GenerateKeyRequest) -> GenerateKeyResponse {
    let random_bytes: [u8; 24] = rand::random();
    let key = format!("sk-{}", hex::encode(random_bytes));
    GenerateKeyResponse {
        token: Some(token_hash(&key)),
        key,
        key_alias: req.key_alias.clone(),
    }
}

pub fn create_team(req: &CreateTeamRequest) -> TeamResponse {
    TeamResponse {
        team_id: req
            .team_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        team_alias: Some(req.team_alias.clone()),
    }
}
