//! The four generation nodes: text-to-image, image-to-image, multi-image
//! fusion and prompt batches.
//!
//! Nodes never fail outright. Every error is folded into the status text of
//! the returned [`NodeOutput`], so one bad job never takes down the caller.

use crate::driver::JobDriver;
use crate::models::{
    AspectRatio, FluxOptions, GenerationMode, GenerationRequest, ImageRef, Model, ReferenceImage,
};
use crate::{Error, Result};
use rand::Rng;

pub const MAX_IMAGES_PER_NODE: u32 = 4;
pub const MAX_REFERENCE_IMAGES: usize = 4;

/// Seeds are kept in the positive 32-bit range the API accepts.
const MAX_SEED: u64 = 2_147_483_647;

/// Parameters shared by every node.
#[derive(Debug, Clone)]
pub struct NodeParams {
    pub model: Model,
    /// 1 to [`MAX_IMAGES_PER_NODE`].
    pub num_images: u32,
    /// 0 picks a random seed per job.
    pub seed: u64,
    pub aspect_ratio: AspectRatio,
    pub flux: Option<FluxOptions>,
}

impl NodeParams {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            num_images: 1,
            seed: 0,
            aspect_ratio: AspectRatio::Square,
            flux: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.num_images == 0 || self.num_images > MAX_IMAGES_PER_NODE {
            return Err(Error::Validation(format!(
                "num_images must be between 1 and {}, got {}",
                MAX_IMAGES_PER_NODE, self.num_images
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    /// Downloaded image files, in generation order.
    pub images: Vec<Vec<u8>>,
    pub urls: Vec<String>,
    pub status: String,
}

impl NodeOutput {
    fn failed(message: &str) -> Self {
        tracing::error!("Node execution failed: {}", message);
        Self {
            images: Vec::new(),
            urls: Vec::new(),
            status: format!("failed: {}", message),
        }
    }

    pub fn is_success(&self) -> bool {
        !self.images.is_empty()
    }
}

pub async fn text_to_image(driver: &JobDriver, prompt: &str, params: &NodeParams) -> NodeOutput {
    run_node(driver, GenerationMode::TextToImage, prompt, Vec::new(), params).await
}

pub async fn image_to_image(
    driver: &JobDriver,
    image: ReferenceImage,
    prompt: &str,
    params: &NodeParams,
) -> NodeOutput {
    run_node(driver, GenerationMode::ImageToImage, prompt, vec![image], params).await
}

/// Fuses up to four reference images into new images.
pub async fn multi_image_to_image(
    driver: &JobDriver,
    images: Vec<ReferenceImage>,
    prompt: &str,
    params: &NodeParams,
) -> NodeOutput {
    if images.is_empty() {
        return NodeOutput::failed("at least one input image is required");
    }
    if images.len() > MAX_REFERENCE_IMAGES {
        return NodeOutput::failed(&format!(
            "at most {} input images are supported, got {}",
            MAX_REFERENCE_IMAGES,
            images.len()
        ));
    }
    run_node(driver, GenerationMode::MultiImageToImage, prompt, images, params).await
}

/// Runs one text-to-image job group per prompt with shared parameters.
pub async fn batch_generate(driver: &JobDriver, prompts: &[String], params: &NodeParams) -> NodeOutput {
    if prompts.is_empty() {
        return NodeOutput::failed("no prompts given");
    }
    if let Err(e) = params.validate() {
        return NodeOutput::failed(&e.status_message());
    }

    let mut requests = Vec::new();
    let mut owners = Vec::new();
    for (index, prompt) in prompts.iter().enumerate() {
        for request in expand_requests(GenerationMode::TextToImage, prompt, &[], params) {
            requests.push(request);
            owners.push(index);
        }
    }

    let results = driver.batch(requests).await;

    let mut refs = Vec::new();
    let mut errors = Vec::new();
    for (owner, result) in owners.into_iter().zip(results) {
        match result {
            Ok(result) => refs.extend(result.images.into_iter().map(|image| (owner, image))),
            Err(e) => errors.push(format!("prompt {}: {}", owner + 1, e.status_message())),
        }
    }

    let Downloads {
        images,
        urls,
        owners,
        errors: download_errors,
    } = download(driver, refs).await;
    errors.extend(download_errors);

    if images.is_empty() {
        return NodeOutput::failed(&all_failed(&errors));
    }

    // A prompt only counts once at least one of its images made it to disk.
    let mut delivered = vec![false; prompts.len()];
    for owner in owners {
        delivered[owner] = true;
    }
    let prompts_ok = delivered.iter().filter(|ok| **ok).count();

    let mut status = format!(
        "batch | prompts succeeded: {}/{} | images: {}/{}",
        prompts_ok,
        prompts.len(),
        images.len(),
        prompts.len() as u32 * params.num_images
    );
    if !errors.is_empty() {
        status.push_str(&format!(" | failed: {}", errors.len()));
    }
    tracing::info!("{}", status);

    NodeOutput {
        images,
        urls,
        status,
    }
}

async fn run_node(
    driver: &JobDriver,
    mode: GenerationMode,
    prompt: &str,
    references: Vec<ReferenceImage>,
    params: &NodeParams,
) -> NodeOutput {
    if let Err(e) = params.validate() {
        return NodeOutput::failed(&e.status_message());
    }

    let prototype = job_request(
        mode,
        prompt,
        references,
        params,
        params.num_images.min(params.model.max_images_per_job()),
        params.model.accepts_seed().then_some(1),
    );
    if let Err(e) = prototype.validate() {
        return NodeOutput::failed(&e.status_message());
    }
    let references = prototype.references;

    let reference_count = references.len();
    let urls = match upload_references(driver, references).await {
        Ok(urls) => urls,
        Err(e) => {
            return NodeOutput::failed(&format!(
                "{} preparation failed: {}",
                mode.label(),
                e.status_message()
            ))
        }
    };

    let requests = expand_requests(mode, prompt, &urls, params);
    let results = driver.batch(requests).await;

    let mut refs = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(result) => refs.extend(result.images.into_iter().map(|image| (0, image))),
            Err(e) => errors.push(e.status_message()),
        }
    }

    let Downloads {
        images,
        urls,
        errors: download_errors,
        ..
    } = download(driver, refs).await;
    errors.extend(download_errors);

    if images.is_empty() {
        return NodeOutput::failed(&all_failed(&errors));
    }

    let mut status = mode.label().to_string();
    if mode == GenerationMode::MultiImageToImage {
        status.push_str(&format!(" | reference images: {}", reference_count));
    }
    status.push_str(&format!(
        " | generated: {}/{} images",
        images.len(),
        params.num_images
    ));
    if !errors.is_empty() {
        status.push_str(&format!(" | failed: {}", errors.len()));
        tracing::warn!("Partial failures: {}", errors.join("; "));
    }
    tracing::info!("{}", status);

    NodeOutput {
        images,
        urls,
        status,
    }
}

/// Uploads byte references once so every job of the node reuses the URLs.
async fn upload_references(driver: &JobDriver, references: Vec<ReferenceImage>) -> Result<Vec<ReferenceImage>> {
    let mut resolved = Vec::with_capacity(references.len());
    for reference in references {
        match reference {
            ReferenceImage::Bytes(bytes) => {
                let url = driver.upload(&bytes).await?;
                resolved.push(ReferenceImage::Url(url));
            }
            url @ ReferenceImage::Url(_) => resolved.push(url),
        }
    }
    Ok(resolved)
}

/// Splits `num_images` into jobs the model can serve, deriving one seed per job.
pub fn expand_requests(
    mode: GenerationMode,
    prompt: &str,
    references: &[ReferenceImage],
    params: &NodeParams,
) -> Vec<GenerationRequest> {
    let model = params.model;
    let per_job = model.max_images_per_job().max(1);
    let mut remaining = params.num_images;
    let mut requests = Vec::new();
    let mut rng = rand::thread_rng();

    let mut job_index = 0u64;
    while remaining > 0 {
        let count = remaining.min(per_job);
        remaining -= count;

        let seed = model.accepts_seed().then(|| {
            if params.seed == 0 {
                rng.gen_range(1..=MAX_SEED) as u32
            } else {
                derive_seed(params.seed, job_index)
            }
        });

        requests.push(job_request(mode, prompt, references.to_vec(), params, count, seed));
        job_index += 1;
    }

    requests
}

fn job_request(
    mode: GenerationMode,
    prompt: &str,
    references: Vec<ReferenceImage>,
    params: &NodeParams,
    count: u32,
    seed: Option<u32>,
) -> GenerationRequest {
    GenerationRequest {
        prompt: prompt.to_string(),
        model: params.model,
        mode,
        references,
        count,
        seed,
        aspect_ratio: params.aspect_ratio,
        flux: params.flux.clone(),
    }
}

fn derive_seed(base: u64, offset: u64) -> u32 {
    (base.wrapping_add(offset).wrapping_sub(1) % MAX_SEED + 1) as u32
}

/// Downloaded images with the index of the job group each one came from.
struct Downloads {
    images: Vec<Vec<u8>>,
    urls: Vec<String>,
    owners: Vec<usize>,
    errors: Vec<String>,
}

async fn download(driver: &JobDriver, refs: Vec<(usize, ImageRef)>) -> Downloads {
    let images: Vec<ImageRef> = refs.iter().map(|(_, image)| image.clone()).collect();
    let results = driver.download_all(&images).await;

    let mut downloads = Downloads {
        images: Vec::new(),
        urls: Vec::new(),
        owners: Vec::new(),
        errors: Vec::new(),
    };
    for ((owner, image), result) in refs.into_iter().zip(results) {
        match result {
            Ok(bytes) => {
                downloads.images.push(bytes);
                downloads.urls.push(image.url);
                downloads.owners.push(owner);
            }
            Err(e) => downloads
                .errors
                .push(format!("download failed: {}", e.status_message())),
        }
    }
    downloads
}

fn all_failed(errors: &[String]) -> String {
    format!("All image generations failed.\n{}", errors.join("; "))
}
