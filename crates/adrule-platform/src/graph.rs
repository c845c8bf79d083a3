use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::{PlatformError, Result};
use crate::{PlatformClient, PlatformConfig, PlatformStatus, TokenProvider};

/// Client for Graph-style ad APIs where every object is updated with a
/// `POST {base_url}/{object_id}` carrying the changed fields.
pub struct GraphApiClient {
    name: String,
    base_url: String,
    client: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl GraphApiClient {
    pub fn new(config: &PlatformConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(PlatformError::Config(format!(
                "platform {} has an empty base_url",
                config.name
            )));
        }
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PlatformError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
        })
    }

    fn object_url(&self, object_id: &str) -> String {
        format!("{}/{}", self.base_url, object_id)
    }

    async fn update_object(
        &self,
        user_id: &str,
        object_id: &str,
        fields: serde_json::Value,
    ) -> Result<()> {
        let token = self
            .tokens
            .access_token(user_id, &self.name)?
            .ok_or_else(|| PlatformError::MissingCredentials {
                platform: self.name.clone(),
                user_id: user_id.to_string(),
            })?;

        let response = self
            .client
            .post(self.object_url(object_id))
            .bearer_auth(token)
            .json(&fields)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(
            platform = %self.name,
            object_id,
            status = status.as_u16(),
            "Platform update response"
        );
        check_response(&self.name, status, &body)
    }
}

/// Maps an update response onto success or a typed error.
fn check_response(platform: &str, status: StatusCode, body: &str) -> Result<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PlatformError::RateLimited {
            platform: platform.to_string(),
        });
    }
    if !status.is_success() {
        return Err(PlatformError::Http {
            platform: platform.to_string(),
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    if body.trim().is_empty() {
        return Ok(());
    }

    let json: serde_json::Value = serde_json::from_str(body)?;
    if let Some(error) = json.get("error") {
        let code = error
            .get("code")
            .map(|c| match c {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "Unknown".to_string());
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown")
            .to_string();
        return Err(PlatformError::Api {
            platform: platform.to_string(),
            code,
            message,
        });
    }
    if json.get("success").and_then(|s| s.as_bool()) == Some(false) {
        return Err(PlatformError::Api {
            platform: platform.to_string(),
            code: "Unknown".to_string(),
            message: "update reported success=false".to_string(),
        });
    }
    Ok(())
}

#[async_trait::async_trait]
impl PlatformClient for GraphApiClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_status(
        &self,
        user_id: &str,
        platform_entity_id: &str,
        status: PlatformStatus,
    ) -> Result<()> {
        self.update_object(
            user_id,
            platform_entity_id,
            serde_json::json!({ "status": status.as_str() }),
        )
        .await
    }

    async fn set_daily_budget(
        &self,
        user_id: &str,
        platform_entity_id: &str,
        minor_units: i64,
    ) -> Result<()> {
        self.update_object(
            user_id,
            platform_entity_id,
            serde_json::json!({ "daily_budget": minor_units }),
        )
        .await
    }
}
