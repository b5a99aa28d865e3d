//! Runs generation requests to completion, one at a time or as a batch.

use crate::config::Config;
use crate::grsai::GenerationService;
use crate::models::{GenerationRequest, GenerationResult, ImageRef};
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Submits jobs through a [`GenerationService`] and waits for them.
///
/// All jobs started by one driver share its cancellation token: cancelling it
/// stops every outstanding poll, and the affected requests resolve to
/// [`Error::Cancelled`]. Remote jobs are abandoned, not cancelled server-side.
#[derive(Clone)]
pub struct JobDriver {
    service: Arc<dyn GenerationService>,
    job_timeout: Duration,
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl JobDriver {
    pub fn new(service: Arc<dyn GenerationService>, config: &Config) -> Self {
        Self::with_limits(service, config.job_timeout, config.max_concurrency)
    }

    pub fn with_limits(
        service: Arc<dyn GenerationService>,
        job_timeout: Duration,
        max_concurrency: usize,
    ) -> Self {
        Self {
            service,
            job_timeout,
            max_concurrency: max_concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Submits one request and waits for its result.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::warn!("Generation for {} cancelled", request.model);
                Err(Error::Cancelled)
            }
            result = self.run(request) => result,
        }
    }

    async fn run(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let handle = self.service.submit(request).await?;
        self.service
            .await_completion(&handle, self.job_timeout)
            .await
    }

    /// Runs independent requests with at most `max_concurrency` in flight.
    ///
    /// Results are in input order; one failure never aborts the others.
    pub async fn batch(&self, requests: Vec<GenerationRequest>) -> Vec<Result<GenerationResult>> {
        let total = requests.len();
        tracing::info!(
            "Running batch of {} request(s), {} at a time",
            total,
            self.max_concurrency
        );

        let results: Vec<Result<GenerationResult>> = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| async move {
                let result = self.generate(&request).await;
                if let Err(e) = &result {
                    tracing::warn!("Batch request {}/{} failed: {}", index + 1, total, e);
                }
                result
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        tracing::info!("Batch finished: {}/{} succeeded", succeeded, total);
        results
    }

    /// Uploads a reference image, giving up as soon as the driver is cancelled.
    pub async fn upload(&self, image: &[u8]) -> Result<String> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::warn!("Reference upload cancelled");
                Err(Error::Cancelled)
            }
            url = self.service.upload(image) => url,
        }
    }

    /// Downloads result images with the same concurrency bound, in order.
    pub async fn download_all(&self, images: &[ImageRef]) -> Vec<Result<Vec<u8>>> {
        stream::iter(images)
            .map(|image| async move {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(Error::Cancelled),
                    bytes = self.service.download(image) => bytes,
                }
            })
            .buffered(self.max_concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grsai::MockGenerationService;
    use crate::models::Model;
    use pretty_assertions::assert_eq;

    fn driver(mock: MockGenerationService, max_concurrency: usize) -> (JobDriver, Arc<MockGenerationService>) {
        let mock = Arc::new(mock);
        let driver = JobDriver::with_limits(mock.clone(), Duration::from_secs(5), max_concurrency);
        (driver, mock)
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest::text_to_image(Model::NanoBanana, prompt)
    }

    #[tokio::test]
    async fn test_generate_returns_images() {
        let (driver, mock) = driver(MockGenerationService::new(), 2);
        let result = driver
            .generate(&GenerationRequest::text_to_image(Model::SoraImage, "owl").with_count(2))
            .await
            .unwrap();
        assert_eq!(result.images.len(), 2);
        assert_eq!(mock.get_submit_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_isolates_validation_failure_and_keeps_order() {
        let (driver, _mock) = driver(MockGenerationService::new(), 3);

        let results = driver
            .batch(vec![request("first"), request(""), request("third")])
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Validation(_))));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_batch_order_independent_of_completion_order() {
        let mock = MockGenerationService::new()
            .with_delay("slow", Duration::from_millis(120))
            .with_delay("medium", Duration::from_millis(60));
        let (driver, mock) = driver(mock, 3);

        let results = driver
            .batch(vec![request("slow"), request("medium"), request("fast")])
            .await;

        let prompts: Vec<String> = mock
            .submitted_requests()
            .into_iter()
            .map(|r| r.prompt)
            .collect();
        assert_eq!(prompts.len(), 3);

        let job_ids: Vec<String> = results
            .into_iter()
            .map(|r| r.unwrap().job_id)
            .collect();
        // Each result belongs to the job submitted for the prompt at that index.
        for (i, job_id) in job_ids.iter().enumerate() {
            let index: usize = job_id.trim_start_matches("mock-job-").parse().unwrap();
            assert_eq!(prompts[index - 1], ["slow", "medium", "fast"][i]);
        }
    }

    #[tokio::test]
    async fn test_batch_respects_concurrency_bound() {
        let mock = MockGenerationService::new()
            .with_delay("a", Duration::from_millis(50))
            .with_delay("b", Duration::from_millis(50))
            .with_delay("c", Duration::from_millis(50));
        let (driver, _mock) = driver(mock, 1);

        let started = std::time::Instant::now();
        let results = driver
            .batch(vec![request("a"), request("b"), request("c")])
            .await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_remote_failure_does_not_abort_siblings() {
        let mock = MockGenerationService::new().with_failure("broken", "upstream error");
        let (driver, _mock) = driver(mock, 2);

        let results = driver
            .batch(vec![request("ok-1"), request("broken"), request("ok-2")])
            .await;

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::RemoteJob { .. })));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_stops_outstanding_jobs() {
        let mock = MockGenerationService::new()
            .with_delay("long-1", Duration::from_secs(30))
            .with_delay("long-2", Duration::from_secs(30));
        let mock = Arc::new(mock);
        let driver = JobDriver::with_limits(mock, Duration::from_secs(60), 2);

        let token = driver.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        });

        let results = driver
            .batch(vec![request("long-1"), request("long-2"), request("queued")])
            .await;

        assert!(results.iter().all(|r| matches!(r, Err(Error::Cancelled))));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_slow_upload() {
        let mock = MockGenerationService::new().with_upload_delay(Duration::from_secs(3));
        let (driver, mock) = driver(mock, 1);

        let token = driver.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let err = driver.upload(&[0x89, 0x50, 0x4E, 0x47]).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(mock.get_upload_count(), 0);
    }

    #[tokio::test]
    async fn test_download_all_keeps_order_and_failures() {
        let mock = MockGenerationService::new().with_download_failure("/bad");
        let (driver, _mock) = driver(mock, 2);

        let images = vec![
            ImageRef { url: "https://x/good.png".to_string() },
            ImageRef { url: "https://x/bad.png".to_string() },
        ];
        let downloads = driver.download_all(&images).await;

        assert!(downloads[0].is_ok());
        assert!(downloads[1].is_err());
    }
}
