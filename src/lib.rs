//! Drives GrsAI hosted image generation from node-style calls
//!
//! Requests are submitted as remote jobs, polled to completion with bounded
//! retries, and surfaced as text-to-image, image-to-image, multi-image and
//! batch generation nodes.

pub mod config;
pub mod driver;
pub mod error;
pub mod grsai;
pub mod mime;
pub mod models;
pub mod nodes;
pub mod retry;

pub use config::Config;
pub use driver::JobDriver;
pub use error::{Error, Result};
