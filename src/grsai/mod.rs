//! GrsAI image-generation API integration
//!
//! Submits draw jobs, polls them to a terminal state, and moves reference and
//! result images to and from GrsAI's storage.

pub mod client;
pub mod jobs;
pub mod mock;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::GrsaiHttpClient;
pub use jobs::GrsaiClient;
pub use mock::MockGenerationService;

use crate::models::{GenerationRequest, GenerationResult, ImageRef, JobHandle};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Submits one remote job. Fails with `Auth` before any network call
    /// when no usable API key is configured.
    async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle>;

    /// Polls until the job succeeds, fails, or `timeout` elapses.
    async fn await_completion(
        &self,
        handle: &JobHandle,
        timeout: Duration,
    ) -> Result<GenerationResult>;

    /// Uploads a reference image and returns its public URL.
    async fn upload(&self, image: &[u8]) -> Result<String>;

    async fn download(&self, image: &ImageRef) -> Result<Vec<u8>>;
}
