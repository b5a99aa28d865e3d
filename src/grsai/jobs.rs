use super::client::GrsaiHttpClient;
use super::types::{
    BananaDrawRequest, CompletionsDrawRequest, DrawRequest, FluxDrawRequest, JobData,
    ResultRequest, SubmitData, ASYNC_WEBHOOK,
};
use super::upload::upload_image;
use super::GenerationService;
use crate::config::{ApiKey, Config};
use crate::models::{
    Endpoint, GenerationRequest, GenerationResult, ImageRef, JobHandle, JobStatus, OutputFormat,
    ReferenceImage,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};

const RESULT_PATH: &str = "/v1/draw/result";

/// Drives GrsAI draw jobs: submit, poll until terminal, fetch results.
pub struct GrsaiClient {
    http: GrsaiHttpClient,
    config: Config,
}

impl GrsaiClient {
    pub fn new(config: Config) -> Result<Self> {
        let http = GrsaiHttpClient::new(&config)?;
        Ok(Self { http, config })
    }

    pub fn new_with_client(config: Config, client: reqwest::Client) -> Self {
        let http = GrsaiHttpClient::new_with_client(&config, client);
        Self { http, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn resolve_references(
        &self,
        api_key: &ApiKey,
        references: &[ReferenceImage],
    ) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(references.len());
        for reference in references {
            match reference {
                ReferenceImage::Url(url) => urls.push(url.clone()),
                ReferenceImage::Bytes(bytes) => {
                    urls.push(upload_image(&self.http, api_key, bytes).await?)
                }
            }
        }
        Ok(urls)
    }

    async fn poll_once(&self, handle: &JobHandle) -> Result<JobData> {
        let api_key = self.config.api_key()?;
        let request = ResultRequest { id: &handle.id };

        self.http
            .post(&api_key, &self.http.api_url(RESULT_PATH), &request)
            .await
            .map_err(|err| match err {
                // A non-zero envelope code on the result endpoint means the
                // service no longer knows the job (e.g. -22 task not found).
                Error::Http {
                    status: 200,
                    message,
                } => Error::RemoteJob {
                    job_id: handle.id.clone(),
                    message,
                },
                other => other,
            })
    }

    async fn poll_until_terminal(&self, handle: &JobHandle) -> Result<GenerationResult> {
        let mut polls = 0u32;
        loop {
            polls += 1;
            let data = self.poll_once(handle).await?;

            match JobStatus::parse(&data.status) {
                JobStatus::Succeeded => {
                    tracing::info!(
                        "Job {} ({}) succeeded after {} polls",
                        handle.id,
                        handle.model,
                        polls
                    );
                    return collect_images(handle, data);
                }
                JobStatus::Failed => {
                    let message = non_empty(data.failure_reason)
                        .or_else(|| non_empty(data.error))
                        .unwrap_or_else(|| "no reason given".to_string());
                    tracing::error!("Job {} failed: {}", handle.id, message);
                    return Err(Error::RemoteJob {
                        job_id: handle.id.clone(),
                        message,
                    });
                }
                status => {
                    tracing::debug!(
                        "Job {} is {:?} ({}%), poll #{}",
                        handle.id,
                        status,
                        data.progress.unwrap_or(0),
                        polls
                    );
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    async fn download_once(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .client
            .get(url)
            .send()
            .await
            .map_err(Error::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Image download failed (status {}): {}", status, url);
            return Err(if status.is_server_error() {
                Error::Network(format!("image host error (status {})", status))
            } else {
                Error::Http {
                    status: status.as_u16(),
                    message: format!("could not download {}", url),
                }
            });
        }

        Ok(response.bytes().await.map_err(Error::from_transport)?.to_vec())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Turns a succeeded job into exactly `expected_images` image references.
fn collect_images(handle: &JobHandle, data: JobData) -> Result<GenerationResult> {
    let urls: Vec<String> = match data.results {
        Some(results) if !results.is_empty() => results.into_iter().map(|r| r.url).collect(),
        _ => non_empty(data.url).into_iter().collect(),
    };

    if let Some(bad) = urls.iter().find(|u| !u.starts_with("http")) {
        return Err(Error::RemoteJob {
            job_id: handle.id.clone(),
            message: format!(
                "invalid image URL in result: {}",
                bad.chars().take(100).collect::<String>()
            ),
        });
    }

    if urls.len() != handle.expected_images as usize {
        return Err(Error::RemoteJob {
            job_id: handle.id.clone(),
            message: format!(
                "returned {} of {} requested images",
                urls.len(),
                handle.expected_images
            ),
        });
    }

    Ok(GenerationResult {
        job_id: handle.id.clone(),
        images: urls.into_iter().map(|url| ImageRef { url }).collect(),
    })
}

/// Shapes a validated request into the body its model's endpoint expects.
pub fn build_draw_request(request: &GenerationRequest, urls: Vec<String>) -> DrawRequest {
    let model = request.model.id().to_string();
    let prompt = request.prompt.clone();
    let web_hook = ASYNC_WEBHOOK.to_string();

    match request.model.endpoint() {
        Endpoint::Flux => {
            let flux = request.flux.clone().unwrap_or_default();
            DrawRequest::Flux(FluxDrawRequest {
                model,
                prompt,
                urls,
                shut_progress: true,
                web_hook,
                seed: request.seed,
                aspect_ratio: Some(request.aspect_ratio.to_string()),
                output_format: flux.output_format.map(|f| match f {
                    OutputFormat::Png => "png".to_string(),
                    OutputFormat::Jpeg => "jpeg".to_string(),
                }),
                safety_tolerance: flux.safety_tolerance,
                prompt_upsampling: flux.prompt_upsampling,
                guidance: flux.guidance,
                steps: flux.steps,
            })
        }
        Endpoint::Completions => DrawRequest::Completions(CompletionsDrawRequest {
            model,
            prompt,
            urls,
            shut_progress: true,
            web_hook,
            size: request.aspect_ratio.to_string(),
            variants: request.count,
        }),
        Endpoint::NanoBanana => DrawRequest::Banana(BananaDrawRequest {
            model,
            prompt,
            urls,
            shut_progress: true,
            web_hook,
            aspect_ratio: request.aspect_ratio.to_string(),
        }),
    }
}

#[async_trait]
impl GenerationService for GrsaiClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle> {
        let api_key = self.config.api_key()?;
        request.validate()?;

        let urls = self.resolve_references(&api_key, &request.references).await?;
        let body = build_draw_request(request, urls);
        let path = request.model.endpoint().path();

        let data: SubmitData = self
            .http
            .post(&api_key, &self.http.api_url(path), &body)
            .await?;

        tracing::info!(
            "Submitted {} job {} ({} image(s))",
            request.model,
            data.id,
            request.count
        );

        Ok(JobHandle {
            id: data.id,
            model: request.model,
            expected_images: request.count,
        })
    }

    async fn await_completion(
        &self,
        handle: &JobHandle,
        timeout: Duration,
    ) -> Result<GenerationResult> {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.poll_until_terminal(handle)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    "Job {} did not reach a terminal state within {:?}",
                    handle.id,
                    timeout
                );
                Err(Error::Timeout {
                    job_id: handle.id.clone(),
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    async fn upload(&self, image: &[u8]) -> Result<String> {
        let api_key = self.config.api_key()?;
        upload_image(&self.http, &api_key, image).await
    }

    async fn download(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let bytes = self
            .http
            .retry
            .run(&format!("download {}", image.url), || {
                self.download_once(&image.url)
            })
            .await?;
        tracing::debug!("Downloaded {} bytes from {}", bytes.len(), image.url);
        Ok(bytes)
    }
}
