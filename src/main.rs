use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use grsai_nodes::grsai::GrsaiClient;
use grsai_nodes::mime::detect_image_format;
use grsai_nodes::models::{AspectRatio, FluxOptions, Model, ReferenceImage};
use grsai_nodes::nodes::{self, NodeOutput, NodeParams};
use grsai_nodes::{Config, JobDriver};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "grsai-nodes")]
#[command(about = "Generate images with the GrsAI API")]
struct CliArgs {
    /// Env file holding GRSAI_KEY and optional overrides (default: ./.env).
    #[arg(long, value_name = "PATH", global = true)]
    env_file: Option<PathBuf>,

    /// Directory generated images are written to.
    #[arg(long, value_name = "DIR", default_value = "output", global = true)]
    out: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate images from a prompt.
    TextToImage {
        #[arg(long)]
        prompt: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Edit a single input image.
    ImageToImage {
        #[arg(long, value_name = "PATH_OR_URL")]
        image: String,
        #[arg(long)]
        prompt: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Fuse up to four input images.
    MultiImage {
        #[arg(long = "image", value_name = "PATH_OR_URL", required = true, num_args = 1..=4)]
        images: Vec<String>,
        #[arg(long)]
        prompt: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Run one generation per prompt.
    Batch {
        #[arg(long = "prompt", required = true)]
        prompts: Vec<String>,
        #[command(flatten)]
        params: ParamArgs,
    },
}

#[derive(Debug, Args)]
struct ParamArgs {
    #[arg(long, value_parser = parse_model_arg, default_value = "flux-kontext-max")]
    model: Model,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=4))]
    num_images: u32,
    /// 0 picks a random seed for every image.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, value_parser = parse_aspect_ratio_arg, default_value = "1:1")]
    aspect_ratio: AspectRatio,
    /// Flux only.
    #[arg(long)]
    guidance: Option<f32>,
    /// Flux only.
    #[arg(long)]
    safety_tolerance: Option<u8>,
    /// Flux only.
    #[arg(long)]
    prompt_upsampling: bool,
}

impl ParamArgs {
    fn to_node_params(&self) -> NodeParams {
        let flux = self.model.is_flux().then(|| FluxOptions {
            guidance: self.guidance,
            safety_tolerance: self.safety_tolerance,
            prompt_upsampling: self.prompt_upsampling.then_some(true),
            ..Default::default()
        });

        NodeParams {
            model: self.model,
            num_images: self.num_images,
            seed: self.seed,
            aspect_ratio: self.aspect_ratio,
            flux,
        }
    }
}

fn parse_model_arg(input: &str) -> std::result::Result<Model, String> {
    input.parse().map_err(|_| {
        let known: Vec<&str> = Model::ALL.iter().map(|m| m.id()).collect();
        format!("Unknown model '{}'. Expected one of: {}", input, known.join(", "))
    })
}

fn parse_aspect_ratio_arg(input: &str) -> std::result::Result<AspectRatio, String> {
    input.parse().map_err(|_| {
        let known: Vec<&str> = AspectRatio::ALL.iter().map(|r| r.as_str()).collect();
        format!("Unknown aspect ratio '{}'. Expected one of: {}", input, known.join(", "))
    })
}

fn load_reference(input: &str) -> Result<ReferenceImage> {
    if input.starts_with("http://") || input.starts_with("https://") {
        return Ok(ReferenceImage::Url(input.to_string()));
    }
    let bytes = fs::read(input).with_context(|| format!("Failed to read image {}", input))?;
    Ok(ReferenceImage::Bytes(bytes))
}

fn write_images(out_dir: &Path, output: &NodeOutput) -> Result<()> {
    if output.images.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for (index, bytes) in output.images.iter().enumerate() {
        let ext = detect_image_format(bytes).extension();
        let path = out_dir.join(format!("image_{}.{}", index + 1, ext));
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grsai_nodes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting grsai-nodes");

    let args = CliArgs::parse();

    let config = match &args.env_file {
        Some(path) => Config::from_env_file(path),
        None => Config::from_env(),
    }
    .context("Failed to load configuration")?;

    let client = GrsaiClient::new(config.clone()).context("Failed to initialize GrsAI client")?;
    let driver = JobDriver::new(Arc::new(client), &config);

    let cancel = driver.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning outstanding jobs");
            cancel.cancel();
        }
    });

    let output = match &args.command {
        Command::TextToImage { prompt, params } => {
            nodes::text_to_image(&driver, prompt, &params.to_node_params()).await
        }
        Command::ImageToImage {
            image,
            prompt,
            params,
        } => {
            let image = load_reference(image)?;
            nodes::image_to_image(&driver, image, prompt, &params.to_node_params()).await
        }
        Command::MultiImage {
            images,
            prompt,
            params,
        } => {
            let images = images
                .iter()
                .map(|i| load_reference(i))
                .collect::<Result<Vec<_>>>()?;
            nodes::multi_image_to_image(&driver, images, prompt, &params.to_node_params()).await
        }
        Command::Batch { prompts, params } => {
            nodes::batch_generate(&driver, prompts, &params.to_node_params()).await
        }
    };

    write_images(&args.out, &output)?;
    for url in &output.urls {
        info!("Result URL: {}", url);
    }
    println!("{}", output.status);

    if !output.is_success() {
        error!("Generation failed");
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_arg_valid() {
        assert_eq!(parse_model_arg("sora-image").unwrap(), Model::SoraImage);
    }

    #[test]
    fn test_parse_model_arg_invalid_lists_models() {
        let err = parse_model_arg("midjourney").unwrap_err();
        assert!(err.contains("nano-banana"));
    }

    #[test]
    fn test_parse_aspect_ratio_arg() {
        assert_eq!(parse_aspect_ratio_arg("16:9").unwrap(), AspectRatio::Landscape16x9);
        assert!(parse_aspect_ratio_arg("5:4").is_err());
    }

    #[test]
    fn test_flux_options_only_for_flux_models() {
        let args = CliArgs::parse_from([
            "grsai-nodes",
            "text-to-image",
            "--prompt",
            "a cat",
            "--model",
            "nano-banana",
            "--guidance",
            "3.0",
        ]);
        let Command::TextToImage { params, .. } = args.command else {
            panic!("expected text-to-image");
        };
        assert!(params.to_node_params().flux.is_none());
    }

    #[test]
    fn test_load_reference_url_passthrough() {
        let reference = load_reference("https://img.example/a.png").unwrap();
        assert_eq!(
            reference,
            ReferenceImage::Url("https://img.example/a.png".to_string())
        );
    }
}
