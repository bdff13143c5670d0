//! Caffeine estimation for drink names.
//!
//! Two layers: a static lookup table for common drinks, and an optional
//! model-backed estimator for anything else. The estimator must never fail a
//! caller: every failure mode (missing key, network error, timeout, non-2xx,
//! unparseable reply) collapses to `None`.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::EstimatorConfig;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-5-mini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Caffeine content in mg for common coffee drinks. Keys are lowercase;
/// lookup is longest-substring-first so "double espresso" beats "espresso".
const CAFFEINE_TABLE: &[(&str, i64)] = &[
    ("double espresso", 126),
    ("triple espresso", 189),
    ("cold brew", 200),
    ("drip coffee", 95),
    ("filter coffee", 95),
    ("flat white", 130),
    ("cappuccino", 130),
    ("americano", 95),
    ("cortado", 63),
    ("macchiato", 63),
    ("espresso", 63),
    ("mocha", 130),
    ("latte", 130),
    ("matcha", 70),
    ("chai", 50),
    ("decaf", 3),
    ("hot chocolate", 5),
    ("tea", 47),
    ("coffee", 95),
];

static SORTED_TABLE: Lazy<Vec<(&'static str, i64)>> = Lazy::new(|| {
    let mut entries = CAFFEINE_TABLE.to_vec();
    entries.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
    entries
});

/// Table-based estimate. Unrecognised drinks resolve to 0.
pub fn table_estimate_mg(drink_name: &str) -> i64 {
    let lower = drink_name.to_lowercase();
    for (key, mg) in SORTED_TABLE.iter() {
        if lower.contains(key) {
            return *mg;
        }
    }
    0
}

/// Ask the model for a per-serving milligram estimate.
pub async fn ai_estimate_mg(config: &EstimatorConfig, drink_name: &str) -> Option<i64> {
    let api_key = config.api_key.as_deref()?;

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .ok()?;

    let body = json!({
        "model": MODEL,
        "messages": [
            {
                "role": "system",
                "content": "You are a caffeine content expert. Given a drink name, reply with \
                            your best estimate of the caffeine content in milligrams for a \
                            standard single serving. Reply with ONLY an integer. For \
                            non-caffeinated drinks reply 0.",
            },
            {
                "role": "user",
                "content": format!("How many mg of caffeine in \"{}\"?", drink_name),
            },
        ],
        "max_completion_tokens": 2048,
    });

    let response = match client
        .post(API_URL)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!("Caffeine estimator request failed: {}", e);
            return None;
        }
    };

    if !response.status().is_success() {
        warn!("Caffeine estimator non-OK response: {}", response.status());
        return None;
    }

    let data: serde_json::Value = match response.json().await {
        Ok(data) => data,
        Err(e) => {
            warn!("Caffeine estimator body read failed: {}", e);
            return None;
        }
    };
    debug!("Caffeine estimator raw response: {}", data);

    let text = data["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .trim()
        .to_string();

    match text.parse::<i64>() {
        Ok(mg) if mg >= 0 => Some(mg),
        _ => {
            warn!("Caffeine estimator unparseable reply: {:?}", text);
            None
        }
    }
}
