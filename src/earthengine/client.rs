use super::expression::Expression;
use super::ComputeService;
use crate::config::EarthEngineConfig;
use crate::error::PipelineError;
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::env;
use url::Url;

pub struct EarthEngine {
    client: reqwest::Client,
    endpoint: Url,
    token: String,
}

#[derive(Deserialize)]
struct ComputeResponse {
    result: Value,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl EarthEngine {
    pub fn new(base_url: &str, project: &str, token: &str) -> Result<Self> {
        let endpoint = compute_endpoint(base_url, project)?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            token: token.to_string(),
        })
    }

    /// Build a client from config, reading the access token from the configured
    /// environment variable.
    pub fn from_config(config: &EarthEngineConfig) -> Result<Self> {
        let token = env::var(&config.token_env).map_err(|_| {
            PipelineError::Config(format!(
                "environment variable {} must hold an Earth Engine access token",
                config.token_env
            ))
        })?;
        Self::new(&config.base_url, &config.project, &token)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn compute_endpoint(base_url: &str, project: &str) -> Result<Url> {
    let base = Url::parse(base_url)
        .map_err(|e| PipelineError::Config(format!("invalid base_url {base_url}: {e}")))?;
    let endpoint = base
        .join(&format!("v1/projects/{project}/value:compute"))
        .map_err(|e| PipelineError::Config(e.to_string()))?;
    Ok(endpoint)
}

impl ComputeService for EarthEngine {
    async fn compute(&self, expression: &Expression) -> Result<Value> {
        log::debug!(
            "POST {} ({} expression values)",
            self.endpoint,
            expression.len()
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "expression": expression }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(PipelineError::Remote {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let reply: ComputeResponse =
            serde_json::from_str(&body).map_err(|e| PipelineError::Remote {
                status: status.as_u16(),
                message: format!("unreadable response: {e}"),
            })?;
        Ok(reply.result)
    }
}
