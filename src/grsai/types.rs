//! GrsAI request/response payloads.

use serde::{Deserialize, Serialize};

/// `webHook` value that makes the draw endpoints return a job id immediately
/// instead of holding the connection open until the image is ready.
pub const ASYNC_WEBHOOK: &str = "-1";

/// Envelope wrapping every GrsAI API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

/// Body for `/v1/draw/flux`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxDrawRequest {
    pub model: String,
    pub prompt: String,
    pub urls: Vec<String>,
    pub shut_progress: bool,
    pub web_hook: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(rename = "output_format", skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_tolerance: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_upsampling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
}

/// Body for `/v1/draw/completions` (sora-image).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionsDrawRequest {
    pub model: String,
    pub prompt: String,
    pub urls: Vec<String>,
    pub shut_progress: bool,
    pub web_hook: String,
    pub size: String,
    pub variants: u32,
}

/// Body for `/v1/draw/nano-banana`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BananaDrawRequest {
    pub model: String,
    pub prompt: String,
    pub urls: Vec<String>,
    pub shut_progress: bool,
    pub web_hook: String,
    pub aspect_ratio: String,
}

/// Any of the per-endpoint draw bodies.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DrawRequest {
    Flux(FluxDrawRequest),
    Completions(CompletionsDrawRequest),
    Banana(BananaDrawRequest),
}

#[derive(Debug, Deserialize)]
pub struct SubmitData {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ResultRequest<'a> {
    pub id: &'a str,
}

/// Job state returned by `/v1/draw/result`.
#[derive(Debug, Deserialize)]
pub struct JobData {
    #[serde(default)]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub progress: Option<u32>,
    /// Flux jobs report their single image here.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<JobImage>>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JobImage {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct UploadTokenRequest<'a> {
    /// File extension of the object to upload.
    pub sux: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct UploadTokenData {
    pub url: String,
    pub key: String,
    pub domain: String,
}
