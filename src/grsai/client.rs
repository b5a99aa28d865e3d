use super::types::ApiResponse;
use crate::config::{ApiKey, Config};
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Thin GrsAI REST client shared by the job, upload and download paths.
///
/// One instance owns one `reqwest` connection pool; clone the inner client
/// rather than building new ones per request.
pub struct GrsaiHttpClient {
    pub(crate) client: Client,
    pub(crate) api_base_url: String,
    pub(crate) upload_base_url: String,
    pub(crate) retry: RetryPolicy,
}

impl GrsaiHttpClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent("grsai-nodes/0.1")
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::new_with_client(config, client))
    }

    pub fn new_with_client(config: &Config, client: Client) -> Self {
        Self {
            client,
            api_base_url: config.api_base_url.clone(),
            upload_base_url: config.upload_base_url.clone(),
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay),
        }
    }

    /// POSTs to a GrsAI API path and unwraps the `{code, msg, data}` envelope.
    /// Transient failures are retried per the configured policy.
    pub async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        api_key: &ApiKey,
        url: &str,
        request: &Req,
    ) -> Result<Resp> {
        self.retry
            .run(&format!("POST {}", url), || {
                self.post_once(api_key, url, request)
            })
            .await
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    pub fn upload_url(&self, path: &str) -> String {
        format!("{}{}", self.upload_base_url, path)
    }

    async fn post_once<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        api_key: &ApiKey,
        url: &str,
        request: &Req,
    ) -> Result<Resp> {
        tracing::debug!("Sending request to GrsAI: {}", url);

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key.expose()))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to GrsAI: {}", e);
                Error::from_transport(e)
            })?;

        let body = read_success_body(response).await?;
        let envelope: ApiResponse<Resp> = parse_body(&body)?;

        if envelope.code != 0 {
            let msg = envelope.msg.unwrap_or_else(|| "unknown error".to_string());
            tracing::error!("GrsAI returned code {}: {}", envelope.code, msg);
            return Err(Error::Http {
                status: 200,
                message: format!("code {}: {}", envelope.code, msg),
            });
        }

        envelope
            .data
            .ok_or_else(|| Error::Http {
                status: 200,
                message: "response has no data".to_string(),
            })
    }
}

/// Checks the HTTP status and returns the body text.
///
/// 5xx is a transient `Network` error; 401/403 is `Auth`; 429 is `RateLimited`.
pub(crate) async fn read_success_body(response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(Error::from_transport)?;

    if status.is_success() {
        return Ok(body);
    }

    tracing::error!("GrsAI API error (status {}): {}", status, body);
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth("API key is invalid or expired".to_string())
        }
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited(body),
        s if s.is_server_error() => Error::Network(format!("server error (status {})", s)),
        s => Error::Http {
            status: s.as_u16(),
            message: error_message(&body),
        },
    })
}

/// Parses a JSON body, tolerating the `data: ` prefix some endpoints emit.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let json = body.trim_start();
    let json = json.strip_prefix("data: ").unwrap_or(json);
    serde_json::from_str(json).map_err(|e| {
        tracing::error!("Failed to parse GrsAI response: {}\nBody: {}", e, body);
        Error::Serialization(e)
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("msg"))
                .and_then(|e| e.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}
