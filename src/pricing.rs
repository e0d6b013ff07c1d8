//! Per-token prices used to turn provider usage into cost.

use crate::model::Usage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Price of one prompt token and one completion token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub prompt_token_rate: f64,
    pub completion_token_rate: f64,
}

impl Pricing {
    pub fn new(prompt_token_rate: f64, completion_token_rate: f64) -> Self {
        Self {
            prompt_token_rate,
            completion_token_rate,
        }
    }

    /// Rates quoted per thousand tokens.
    pub fn per_thousand(prompt: f64, completion: f64) -> Self {
        Self::new(prompt / 1000.0, completion / 1000.0)
    }

    pub fn cost(&self, usage: &Usage) -> f64 {
        usage.prompt_tokens as f64 * self.prompt_token_rate
            + usage.completion_tokens as f64 * self.completion_token_rate
    }
}

/// Model identifier to [`Pricing`].
///
/// Lookups try the exact identifier first, then the longest registered
/// prefix, so dated snapshots such as `gpt-4o-2024-08-06` resolve to the
/// `gpt-4o` entry.
///
/// ```
/// use gears::{Pricing, PricingTable, Usage};
///
/// let table = PricingTable::new().with_model("tiny", Pricing::new(0.001, 0.002));
/// let cost = table.cost("tiny", &Usage::new(10, 5)).unwrap();
/// assert!((cost - 0.02).abs() < 1e-12);
/// assert!(table.cost("unknown", &Usage::new(1, 1)).is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    rates: HashMap<String, Pricing>,
}

impl PricingTable {
    /// An empty table; every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// List prices for common OpenAI chat models.
    pub fn openai() -> Self {
        Self::new()
            .with_model("gpt-3.5-turbo", Pricing::per_thousand(0.0015, 0.002))
            .with_model("gpt-3.5-turbo-16k", Pricing::per_thousand(0.003, 0.004))
            .with_model("gpt-4", Pricing::per_thousand(0.03, 0.06))
            .with_model("gpt-4-32k", Pricing::per_thousand(0.06, 0.12))
            .with_model("gpt-4-turbo", Pricing::per_thousand(0.01, 0.03))
            .with_model("gpt-4o", Pricing::per_thousand(0.0025, 0.01))
            .with_model("gpt-4o-mini", Pricing::per_thousand(0.00015, 0.0006))
    }

    pub fn with_model(mut self, model: impl Into<String>, pricing: Pricing) -> Self {
        self.insert(model, pricing);
        self
    }

    pub fn insert(&mut self, model: impl Into<String>, pricing: Pricing) {
        self.rates.insert(model.into(), pricing);
    }

    pub fn get(&self, model: &str) -> Option<&Pricing> {
        if let Some(pricing) = self.rates.get(model) {
            return Some(pricing);
        }
        self.rates
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| pricing)
    }

    /// Cost of `usage` on `model`, `None` when the model has no price.
    pub fn cost(&self, model: &str, usage: &Usage) -> Option<f64> {
        self.get(model).map(|pricing| pricing.cost(usage))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}
