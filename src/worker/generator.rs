//! Client for the external Generator service — opaque from the
//! orchestrator's perspective beyond its HTTP contract.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GeneratorError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    narrative: &'a str,
    duration: i32,
    model: &'a Option<String>,
    options: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub artifact_url: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub artifact_bytes_base64: Option<String>,
    #[serde(default)]
    pub artifact_ext: Option<String>,
}

pub struct GeneratorClient {
    http: reqwest::Client,
    endpoints: HashMap<String, String>,
    timeout: Duration,
    service_token: SecretString,
}

impl GeneratorClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: HashMap<String, String>,
        timeout: Duration,
        service_token: SecretString,
    ) -> Self {
        Self {
            http,
            endpoints,
            timeout,
            service_token,
        }
    }

    pub async fn generate(
        &self,
        generator: &str,
        request_id: &str,
        narrative: &str,
        duration: i32,
        model: &Option<String>,
        options: &serde_json::Value,
    ) -> Result<GenerateResponse, GeneratorError> {
        let base = self.endpoints.get(generator).cloned().unwrap_or_else(|| {
            tracing::warn!(generator, "no endpoint configured, using bare generator name as host");
            generator.to_string()
        });
        let url = format!("{}/generate", base.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .header("x-request-id", request_id)
            .header(
                "authorization",
                format!("Bearer {}", self.service_token.expose_secret()),
            )
            .json(&GenerateRequest {
                narrative,
                duration,
                model,
                options,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeneratorError::Timeout(self.timeout)
                } else {
                    GeneratorError::Transport(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(GeneratorError::Transport);
        }

        let message = response.text().await.unwrap_or_default();
        let code = status.as_u16();

        // 5xx, and 408/429 among 4xx, are treated as transient; every other
        // 4xx is a permanent validation-style failure.
        if status.is_server_error() || code == 408 || code == 429 {
            Err(GeneratorError::Transient { status: code, message })
        } else {
            Err(GeneratorError::Permanent { status: code, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeneratorClient {
        GeneratorClient::new(
            reqwest::Client::new(),
            HashMap::from([("jen1".to_string(), "http://localhost:9999".to_string())]),
            Duration::from_secs(1),
            SecretString::from("token"),
        )
    }

    #[test]
    fn unknown_generator_falls_back_to_bare_name() {
        let c = client();
        assert!(c.endpoints.get("muscgen").is_none());
    }

    #[tokio::test]
    async fn connection_refused_is_transport_not_timeout() {
        let c = client();
        let err = c
            .generate("jen1", "req-1", "a song", 30, &None, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Transport(_)));
    }
}
