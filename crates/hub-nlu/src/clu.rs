//! Azure Conversational Language Understanding client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error};

use hub_core::{NluConfig, NluProvider, NluResult};

use crate::error::{NluError, Result};
use crate::schema::{CluResponse, ProviderPayload};

const DEFAULT_API_VERSION: &str = "2022-05-01";
const DEFAULT_DEPLOYMENT: &str = "production";

/// analyze-conversations backed [`NluProvider`]
#[derive(Clone)]
pub struct CluClient {
    client: Client,
    endpoint: String,
    key: String,
    project_name: String,
    deployment: String,
    api_version: String,
}

impl CluClient {
    pub fn new(config: &NluConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| NluError::Config("CLU requires nlu.endpoint".to_string()))?;
        let project_name = config
            .project_name
            .clone()
            .ok_or_else(|| NluError::Config("CLU requires nlu.project_name".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(NluError::Http)?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key: config.api_key.clone(),
            project_name,
            deployment: config
                .deployment
                .clone()
                .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/language/:analyze-conversations?api-version={}",
            self.endpoint, self.api_version
        )
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        json!({
            "kind": "Conversation",
            "analysisInput": {
                "conversationItem": {
                    "id": "1",
                    "text": text,
                    "modality": "text",
                    "language": "en-US",
                    "participantId": "1"
                }
            },
            "parameters": {
                "projectName": self.project_name,
                "deploymentName": self.deployment,
                "stringIndexType": "Utf16CodeUnit"
            }
        })
    }

    async fn try_extract(&self, text: &str) -> Result<NluResult> {
        let url = self.url();
        debug!(url = %url, project = %self.project_name, "Sending CLU request");

        let response = self
            .client
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .json(&self.request_body(text))
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

        let parsed: CluResponse = serde_json::from_str(&body)?;
        Ok(ProviderPayload::Clu(parsed).into_nlu_result())
    }
}

#[async_trait]
impl NluProvider for CluClient {
    fn name(&self) -> &str {
        "clu"
    }

    async fn extract(&self, text: &str) -> NluResult {
        match self.try_extract(text).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "CLU extraction failed");
                NluResult::provider_error()
            }
        }
    }
}
