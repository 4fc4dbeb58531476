//! Provider response schemas
//!
//! Each provider answers in its own shape. They are decoded into one of the
//! [`ProviderPayload`] variants and reduced to a provider-agnostic
//! [`NluResult`] at this boundary; nothing past it knows which provider ran.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use hub_core::{NluResult, RawEntity};
use hub_core::model::UNKNOWN_INTENT;

/// Decoded response of any supported provider
#[derive(Debug, Clone)]
pub enum ProviderPayload {
    /// JSON object produced by a chat model following the extraction prompt
    Structured(StructuredExtraction),
    /// Azure CLU analyze-conversations result
    Clu(CluResponse),
    /// LUIS v3 prediction result
    Luis(LuisResponse),
}

impl ProviderPayload {
    pub fn into_nlu_result(self) -> NluResult {
        let result = match self {
            Self::Structured(extraction) => extraction.into_nlu_result(),
            Self::Clu(response) => response.into_nlu_result(),
            Self::Luis(response) => response.into_nlu_result(),
        };
        debug!(
            intent = %result.intent,
            entities = result.entities.len(),
            "Reduced provider payload"
        );
        result
    }
}

fn intent_or_unknown(intent: Option<String>) -> String {
    intent
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| UNKNOWN_INTENT.to_string())
}

// ============================================================================
// Chat-model structured extraction
// ============================================================================

/// The JSON object the extraction prompt asks the model for
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredExtraction {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub end_date_time: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub recurrence_pattern: Option<String>,
    #[serde(default)]
    pub exceptions: Option<Vec<Option<String>>>,
}

impl StructuredExtraction {
    fn into_nlu_result(self) -> NluResult {
        let mut entities = Vec::new();

        for name in self.attendees.into_iter().flatten().flatten() {
            entities.push(RawEntity::new("PersonName", name));
        }

        // An end without a start would be read as the start.
        if let Some(start) = self.start_date_time {
            entities.push(RawEntity::new("DateTime", start));
            if let Some(end) = self.end_date_time {
                entities.push(RawEntity::new("DateTime", end));
            }
        }

        if let Some(subject) = self.subject {
            entities.push(RawEntity::new("Subject", subject));
        }
        if let Some(location) = self.location {
            entities.push(RawEntity::new("Location", location));
        }
        if let Some(pattern) = self.recurrence_pattern {
            entities.push(RawEntity::new("Recurrence", pattern));
        }
        for exception in self.exceptions.into_iter().flatten().flatten() {
            entities.push(RawEntity::new("Exception", exception));
        }

        NluResult::new(intent_or_unknown(self.intent), entities)
    }
}

// ============================================================================
// Azure CLU
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CluResponse {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub result: Option<CluResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CluResult {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub prediction: Option<CluPrediction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CluPrediction {
    #[serde(default)]
    pub top_intent: Option<String>,
    #[serde(default)]
    pub entities: Vec<CluEntity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CluEntity {
    pub category: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Prebuilt-entity resolutions (`[{"resolutionKind": .., "timex": ..}]`)
    #[serde(default)]
    pub resolutions: Option<Vec<Value>>,
    #[serde(default)]
    pub extra_information: Option<Value>,
}

impl CluEntity {
    fn resolution(&self) -> Option<Value> {
        if let Some(resolutions) = self.resolutions.as_ref().filter(|r| !r.is_empty()) {
            return Some(serde_json::json!({ "values": resolutions }));
        }
        self.extra_information
            .as_ref()
            .filter(|info| info.get("values").is_some())
            .cloned()
    }
}

impl CluResponse {
    fn into_nlu_result(self) -> NluResult {
        let Some(prediction) = self.result.and_then(|r| r.prediction) else {
            return NluResult::unknown();
        };

        let entities = prediction
            .entities
            .iter()
            .map(|entity| {
                let raw = RawEntity::new(&entity.category, &entity.text);
                match entity.resolution() {
                    Some(resolution) => raw.with_resolution(resolution),
                    None => raw,
                }
            })
            .collect();

        NluResult::new(intent_or_unknown(prediction.top_intent), entities)
    }
}

// ============================================================================
// LUIS v3
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LuisResponse {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub prediction: Option<LuisPrediction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LuisPrediction {
    #[serde(default)]
    pub top_intent: Option<String>,
    /// Category name to matches. Values are either plain strings or objects;
    /// the `$instance` metadata key is skipped.
    #[serde(default)]
    pub entities: serde_json::Map<String, Value>,
}

impl LuisResponse {
    fn into_nlu_result(self) -> NluResult {
        let Some(prediction) = self.prediction else {
            return NluResult::unknown();
        };

        let mut entities = Vec::new();
        for (category, matches) in &prediction.entities {
            if category.starts_with('$') {
                continue;
            }
            let Some(matches) = matches.as_array() else {
                continue;
            };
            entities.extend(matches.iter().filter_map(|m| luis_entity(category, m)));
        }

        NluResult::new(intent_or_unknown(prediction.top_intent), entities)
    }
}

fn luis_entity(category: &str, value: &Value) -> Option<RawEntity> {
    match value {
        Value::String(text) => Some(RawEntity::new(category, text.as_str())),
        Value::Object(map) => {
            let text = map
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let raw = RawEntity::new(category, text);
            // datetimeV2 carries its values inline; other entities nest them
            // under "resolution".
            let resolution = map
                .get("resolution")
                .cloned()
                .or_else(|| map.get("values").map(|_| value.clone()));
            Some(match resolution {
                Some(resolution) => raw.with_resolution(resolution),
                None => raw,
            })
        }
        _ => None,
    }
}
