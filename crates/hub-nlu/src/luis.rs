//! LUIS v3 prediction client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use hub_core::{NluConfig, NluProvider, NluResult};

use crate::error::{NluError, Result};
use crate::schema::{LuisResponse, ProviderPayload};

const DEFAULT_SLOT: &str = "production";

/// Prediction-endpoint backed [`NluProvider`]
#[derive(Clone)]
pub struct LuisClient {
    client: Client,
    endpoint: String,
    app_id: String,
    key: String,
    slot: String,
}

impl LuisClient {
    pub fn new(config: &NluConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| NluError::Config("LUIS requires nlu.endpoint".to_string()))?;
        let app_id = config
            .app_id
            .clone()
            .ok_or_else(|| NluError::Config("LUIS requires nlu.app_id".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(NluError::Http)?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            app_id,
            key: config.api_key.clone(),
            slot: config
                .deployment
                .clone()
                .unwrap_or_else(|| DEFAULT_SLOT.to_string()),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/luis/prediction/v3.0/apps/{}/slots/{}/predict",
            self.endpoint, self.app_id, self.slot
        )
    }

    async fn try_extract(&self, text: &str) -> Result<NluResult> {
        let url = self.url();
        debug!(url = %url, "Sending LUIS prediction request");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("subscription-key", self.key.as_str()),
                ("verbose", "true"),
                ("show-all-intents", "true"),
                ("log", "true"),
                ("query", text),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(NluError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: LuisResponse = serde_json::from_str(&body)?;
        Ok(ProviderPayload::Luis(parsed).into_nlu_result())
    }
}

#[async_trait]
impl NluProvider for LuisClient {
    fn name(&self) -> &str {
        "luis"
    }

    async fn extract(&self, text: &str) -> NluResult {
        match self.try_extract(text).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "LUIS prediction failed");
                NluResult::provider_error()
            }
        }
    }
}
