/// Image formats GrsAI accepts as references and returns as results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// Recognises a format from the file signature, if it is one of ours.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    /// Suffix used for upload tokens and saved files.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Like [`ImageFormat::from_magic`], but unknown data is treated as PNG.
pub fn detect_image_format(bytes: &[u8]) -> ImageFormat {
    ImageFormat::from_magic(bytes).unwrap_or_else(|| {
        tracing::warn!(
            "{} byte image has no known signature, uploading as png",
            bytes.len()
        );
        ImageFormat::Png
    })
}
