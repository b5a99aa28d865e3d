//! Reference image upload to GrsAI's object storage.
//!
//! Uploading is two calls: a token request that returns a pre-signed PUT URL
//! plus the object key, then the PUT itself. The public URL is `domain/key`.

use super::client::GrsaiHttpClient;
use super::types::{UploadTokenData, UploadTokenRequest};
use crate::config::ApiKey;
use crate::mime::detect_image_format;
use crate::{Error, Result};

const UPLOAD_TOKEN_PATH: &str = "/client/resource/newUploadToken";

pub async fn upload_image(http: &GrsaiHttpClient, api_key: &ApiKey, bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(Error::Validation("cannot upload an empty image".to_string()));
    }

    let extension = detect_image_format(bytes).extension();
    let token: UploadTokenData = http
        .post(
            api_key,
            &http.upload_url(UPLOAD_TOKEN_PATH),
            &UploadTokenRequest { sux: extension },
        )
        .await?;

    http.retry
        .run("upload reference image", || put_object(http, &token.url, bytes))
        .await?;

    let url = format!("{}/{}", token.domain.trim_end_matches('/'), token.key);
    tracing::info!("Uploaded reference image ({} bytes) to {}", bytes.len(), url);
    Ok(url)
}

async fn put_object(http: &GrsaiHttpClient, url: &str, bytes: &[u8]) -> Result<()> {
    let response = http
        .client
        .put(url)
        .header("Content-Type", "application/octet-stream")
        .body(bytes.to_vec())
        .send()
        .await
        .map_err(|e| {
            tracing::error!("Failed to upload reference image: {}", e);
            Error::from_transport(e)
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!("Reference image upload failed (status {}): {}", status, body);
    if status.is_server_error() {
        Err(Error::Network(format!("storage server error (status {})", status)))
    } else {
        Err(Error::Http {
            status: status.as_u16(),
            message: format!("reference image upload rejected: {}", body),
        })
    }
}
