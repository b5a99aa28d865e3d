use super::GenerationService;
use crate::models::{GenerationRequest, GenerationResult, ImageRef, JobHandle};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Smallest valid PNG, returned by `download` unless overridden.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1 pixel
    0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44,
    0x41, // IDAT chunk
    0x54, 0x08, 0x99, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0xE2, 0x25,
    0x00, 0xBC, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, // IEND chunk
    0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[derive(Debug, Clone)]
struct MockJob {
    prompt: String,
    count: u32,
}

/// In-memory [`GenerationService`] keyed by prompt.
///
/// Jobs succeed with `count` fake URLs unless their prompt was registered as
/// failing, delayed, or hanging.
pub struct MockGenerationService {
    jobs: Arc<Mutex<HashMap<String, MockJob>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    download_failures: Arc<Mutex<Vec<String>>>,
    upload_delay: Arc<Mutex<Option<Duration>>>,
    submit_count: Arc<Mutex<usize>>,
    upload_count: Arc<Mutex<usize>>,
    submitted: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockGenerationService {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            delays: Arc::new(Mutex::new(HashMap::new())),
            download_failures: Arc::new(Mutex::new(Vec::new())),
            upload_delay: Arc::new(Mutex::new(None)),
            submit_count: Arc::new(Mutex::new(0)),
            upload_count: Arc::new(Mutex::new(0)),
            submitted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Jobs for `prompt` finish as failed with `reason`.
    pub fn with_failure(self, prompt: &str, reason: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(prompt.to_string(), reason.to_string());
        self
    }

    /// Jobs for `prompt` take `delay` to complete.
    pub fn with_delay(self, prompt: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(prompt.to_string(), delay);
        self
    }

    /// Downloads of URLs containing `fragment` fail.
    pub fn with_download_failure(self, fragment: &str) -> Self {
        self.download_failures
            .lock()
            .unwrap()
            .push(fragment.to_string());
        self
    }

    /// Every upload takes `delay` before it returns a URL.
    pub fn with_upload_delay(self, delay: Duration) -> Self {
        *self.upload_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn get_submit_count(&self) -> usize {
        *self.submit_count.lock().unwrap()
    }

    pub fn get_upload_count(&self) -> usize {
        *self.upload_count.lock().unwrap()
    }

    /// Every request that passed validation, in submission order.
    pub fn submitted_requests(&self) -> Vec<GenerationRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

impl Default for MockGenerationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle> {
        request.validate()?;

        let id = {
            let mut count = self.submit_count.lock().unwrap();
            *count += 1;
            format!("mock-job-{}", *count)
        };

        self.submitted.lock().unwrap().push(request.clone());
        self.jobs.lock().unwrap().insert(
            id.clone(),
            MockJob {
                prompt: request.prompt.clone(),
                count: request.count,
            },
        );

        Ok(JobHandle {
            id,
            model: request.model,
            expected_images: request.count,
        })
    }

    async fn await_completion(
        &self,
        handle: &JobHandle,
        timeout: Duration,
    ) -> Result<GenerationResult> {
        let job = self
            .jobs
            .lock()
            .unwrap()
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| Error::RemoteJob {
                job_id: handle.id.clone(),
                message: "task not found".to_string(),
            })?;

        let delay = self.delays.lock().unwrap().get(&job.prompt).copied();
        if let Some(delay) = delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(Error::Timeout {
                    job_id: handle.id.clone(),
                    elapsed: timeout,
                });
            }
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = self.failures.lock().unwrap().get(&job.prompt) {
            return Err(Error::RemoteJob {
                job_id: handle.id.clone(),
                message: reason.clone(),
            });
        }

        Ok(GenerationResult {
            job_id: handle.id.clone(),
            images: (0..job.count)
                .map(|i| ImageRef {
                    url: format!("https://mock.grsai.example/{}/{}.png", handle.id, i),
                })
                .collect(),
        })
    }

    async fn upload(&self, image: &[u8]) -> Result<String> {
        if image.is_empty() {
            return Err(Error::Validation("cannot upload an empty image".to_string()));
        }
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut count = self.upload_count.lock().unwrap();
        *count += 1;
        Ok(format!("https://mock.grsai.example/uploads/{}.png", *count))
    }

    async fn download(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let fails = self
            .download_failures
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| image.url.contains(fragment.as_str()));
        if fails {
            return Err(Error::Network(format!("could not download {}", image.url)));
        }
        Ok(TINY_PNG.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Model;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_mock_default_success() {
        let mock = MockGenerationService::new();
        let request = GenerationRequest::text_to_image(Model::SoraImage, "cat").with_count(2);

        let handle = mock.submit(&request).await.unwrap();
        let result = mock.await_completion(&handle, TIMEOUT).await.unwrap();

        assert_eq!(result.images.len(), 2);
        assert_eq!(mock.get_submit_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_and_validation() {
        let mock = MockGenerationService::new().with_failure("bad", "moderated");

        let handle = mock
            .submit(&GenerationRequest::text_to_image(Model::NanoBanana, "bad"))
            .await
            .unwrap();
        let err = mock.await_completion(&handle, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::RemoteJob { .. }));

        let err = mock
            .submit(&GenerationRequest::text_to_image(Model::NanoBanana, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(mock.get_submit_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_delay_beyond_timeout() {
        let mock = MockGenerationService::new().with_delay("slow", Duration::from_secs(60));
        let handle = mock
            .submit(&GenerationRequest::text_to_image(Model::NanoBanana, "slow"))
            .await
            .unwrap();

        let err = mock
            .await_completion(&handle, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_mock_download_returns_png() {
        let mock = MockGenerationService::new();
        let bytes = mock
            .download(&ImageRef {
                url: "https://mock/1.png".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(&bytes[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }
}
