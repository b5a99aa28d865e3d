//! Generation requests, job handles and results.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream models reachable through GrsAI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "flux-pro-1.1")]
    FluxPro11,
    #[serde(rename = "flux-pro-1.1-ultra")]
    FluxPro11Ultra,
    #[serde(rename = "flux-kontext-pro")]
    FluxKontextPro,
    #[serde(rename = "flux-kontext-max")]
    FluxKontextMax,
    #[serde(rename = "sora-image")]
    SoraImage,
    #[serde(rename = "nano-banana")]
    NanoBanana,
}

/// Request body shape a model's endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Flux,
    Completions,
    NanoBanana,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Flux => "/v1/draw/flux",
            Endpoint::Completions => "/v1/draw/completions",
            Endpoint::NanoBanana => "/v1/draw/nano-banana",
        }
    }
}

impl Model {
    pub const ALL: [Model; 6] = [
        Model::FluxPro11,
        Model::FluxPro11Ultra,
        Model::FluxKontextPro,
        Model::FluxKontextMax,
        Model::SoraImage,
        Model::NanoBanana,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Model::FluxPro11 => "flux-pro-1.1",
            Model::FluxPro11Ultra => "flux-pro-1.1-ultra",
            Model::FluxKontextPro => "flux-kontext-pro",
            Model::FluxKontextMax => "flux-kontext-max",
            Model::SoraImage => "sora-image",
            Model::NanoBanana => "nano-banana",
        }
    }

    pub fn endpoint(self) -> Endpoint {
        match self {
            Model::SoraImage => Endpoint::Completions,
            Model::NanoBanana => Endpoint::NanoBanana,
            _ => Endpoint::Flux,
        }
    }

    pub fn is_flux(self) -> bool {
        self.endpoint() == Endpoint::Flux
    }

    /// Flux models take a seed and [`FluxOptions`].
    pub fn accepts_seed(self) -> bool {
        self.is_flux()
    }

    pub fn max_reference_images(self) -> usize {
        match self {
            Model::FluxPro11 | Model::FluxPro11Ultra => 0,
            _ => 4,
        }
    }

    /// Images one remote job can return; sora-image produces variants natively.
    pub fn max_images_per_job(self) -> u32 {
        match self {
            Model::SoraImage => 2,
            _ => 1,
        }
    }

    pub fn supports_aspect_ratio(self, ratio: AspectRatio) -> bool {
        match self {
            Model::SoraImage => matches!(
                ratio,
                AspectRatio::Square | AspectRatio::Landscape3x2 | AspectRatio::Portrait2x3
            ),
            _ => true,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Model::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| Error::Validation(format!("Unsupported model '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "21:9")]
    Ultrawide21x9,
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "1:1")]
    #[default]
    Square,
    #[serde(rename = "2:3")]
    Portrait2x3,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "9:21")]
    Portrait9x21,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 9] = [
        AspectRatio::Ultrawide21x9,
        AspectRatio::Landscape16x9,
        AspectRatio::Landscape4x3,
        AspectRatio::Landscape3x2,
        AspectRatio::Square,
        AspectRatio::Portrait2x3,
        AspectRatio::Portrait3x4,
        AspectRatio::Portrait9x16,
        AspectRatio::Portrait9x21,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Ultrawide21x9 => "21:9",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Portrait9x21 => "9:21",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AspectRatio::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Unsupported aspect ratio '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
}

/// Parameters only the flux endpoint understands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxOptions {
    pub guidance: Option<f32>,
    pub steps: Option<u32>,
    pub safety_tolerance: Option<u8>,
    pub prompt_upsampling: Option<bool>,
    pub output_format: Option<OutputFormat>,
}

impl FluxOptions {
    fn validate(&self) -> Result<()> {
        if let Some(guidance) = self.guidance {
            if !(0.0..=10.0).contains(&guidance) {
                return Err(Error::Validation(format!(
                    "guidance must be between 0.0 and 10.0, got {}",
                    guidance
                )));
            }
        }
        if let Some(steps) = self.steps {
            if !(1..=100).contains(&steps) {
                return Err(Error::Validation(format!(
                    "steps must be between 1 and 100, got {}",
                    steps
                )));
            }
        }
        if let Some(tolerance) = self.safety_tolerance {
            if tolerance > 6 {
                return Err(Error::Validation(format!(
                    "safety_tolerance must be between 0 and 6, got {}",
                    tolerance
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceImage {
    /// Raw image file contents, uploaded before submission.
    Bytes(Vec<u8>),
    Url(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    TextToImage,
    ImageToImage,
    MultiImageToImage,
}

impl GenerationMode {
    pub fn label(self) -> &'static str {
        match self {
            GenerationMode::TextToImage => "text-to-image",
            GenerationMode::ImageToImage => "image-to-image",
            GenerationMode::MultiImageToImage => "multi-image",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: Model,
    pub mode: GenerationMode,
    pub references: Vec<ReferenceImage>,
    pub count: u32,
    pub seed: Option<u32>,
    pub aspect_ratio: AspectRatio,
    pub flux: Option<FluxOptions>,
}

impl GenerationRequest {
    pub fn text_to_image(model: Model, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model,
            mode: GenerationMode::TextToImage,
            references: Vec::new(),
            count: 1,
            seed: None,
            aspect_ratio: AspectRatio::default(),
            flux: None,
        }
    }

    pub fn image_to_image(model: Model, prompt: impl Into<String>, image: ReferenceImage) -> Self {
        Self {
            mode: GenerationMode::ImageToImage,
            references: vec![image],
            ..Self::text_to_image(model, prompt)
        }
    }

    pub fn multi_image(
        model: Model,
        prompt: impl Into<String>,
        images: Vec<ReferenceImage>,
    ) -> Self {
        Self {
            mode: GenerationMode::MultiImageToImage,
            references: images,
            ..Self::text_to_image(model, prompt)
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_flux_options(mut self, options: FluxOptions) -> Self {
        self.flux = Some(options);
        self
    }

    /// Checks the request against what its model recognises.
    pub fn validate(&self) -> Result<()> {
        let model = self.model;

        if self.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt must not be empty".to_string()));
        }

        let refs = self.references.len();
        match self.mode {
            GenerationMode::TextToImage if refs != 0 => {
                return Err(Error::Validation(
                    "text-to-image requests take no reference images".to_string(),
                ));
            }
            GenerationMode::ImageToImage if refs != 1 => {
                return Err(Error::Validation(format!(
                    "image-to-image requires exactly one reference image, got {}",
                    refs
                )));
            }
            GenerationMode::MultiImageToImage if refs == 0 => {
                return Err(Error::Validation(
                    "multi-image requires at least one reference image".to_string(),
                ));
            }
            _ => {}
        }
        if refs > model.max_reference_images() {
            return Err(Error::Validation(format!(
                "{} accepts at most {} reference images, got {}",
                model,
                model.max_reference_images(),
                refs
            )));
        }
        for reference in &self.references {
            match reference {
                ReferenceImage::Bytes(bytes) if bytes.is_empty() => {
                    return Err(Error::Validation("reference image is empty".to_string()));
                }
                ReferenceImage::Url(url) if !url.starts_with("http") => {
                    return Err(Error::Validation(format!(
                        "reference image URL must be http(s): {}",
                        url
                    )));
                }
                _ => {}
            }
        }

        if self.count == 0 || self.count > model.max_images_per_job() {
            return Err(Error::Validation(format!(
                "{} produces 1 to {} images per job, requested {}",
                model,
                model.max_images_per_job(),
                self.count
            )));
        }

        if self.seed.is_some() && !model.accepts_seed() {
            return Err(Error::Validation(format!("{} does not accept a seed", model)));
        }

        if !model.supports_aspect_ratio(self.aspect_ratio) {
            return Err(Error::Validation(format!(
                "{} does not support aspect ratio {}",
                model, self.aspect_ratio
            )));
        }

        if let Some(flux) = &self.flux {
            if !model.is_flux() {
                return Err(Error::Validation(format!(
                    "{} does not accept flux options",
                    model
                )));
            }
            flux.validate()?;
        }

        Ok(())
    }
}

/// A submitted remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub model: Model,
    pub expected_images: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "queued" | "pending" | "waiting" => JobStatus::Queued,
            "succeeded" | "success" => JobStatus::Succeeded,
            "failed" | "error" => JobStatus::Failed,
            "running" => JobStatus::Running,
            other => {
                tracing::debug!("Unknown job status '{}', treating as running", other);
                JobStatus::Running
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub job_id: String,
    pub images: Vec<ImageRef>,
}
