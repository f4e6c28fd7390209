use std::fs;
use std::path::{Path, PathBuf};

use studio_contracts::codec::{self, CodecError};
use studio_contracts::models::AspectRatio;
use thiserror::Error;

pub const MAX_INPUT_IMAGE_BYTES: usize = 4 * 1024 * 1024;
pub const SUPPORTED_INPUT_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];
pub const NO_TEXT_RESPONSE: &str = "No text response from model.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Service(String),
    #[error("{0}")]
    EmptyResult(String),
    #[error("Request was blocked due to: {reason}. Please adjust your prompt.")]
    BlockedRequest { reason: String },
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Please select a valid image file (PNG, JPG, WEBP); got '{0}'.")]
    UnsupportedType(String),
    #[error("Image file size should not exceed 4MB ({size} bytes given).")]
    TooLarge { size: usize },
    #[error("could not rebuild image from history: {0}")]
    Codec(#[from] CodecError),
    #[error("failed reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An uploaded image accepted for remixing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

impl InputImage {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, InputError> {
        let mime_type = mime_type.into().trim().to_ascii_lowercase();
        if !SUPPORTED_INPUT_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(InputError::UnsupportedType(mime_type));
        }
        if bytes.len() > MAX_INPUT_IMAGE_BYTES {
            return Err(InputError::TooLarge { size: bytes.len() });
        }
        Ok(Self {
            name: name.into(),
            mime_type,
            bytes,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, InputError> {
        let mime_type = codec::mime_for_path(path).unwrap_or("application/octet-stream");
        let bytes = fs::read(path).map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("upload")
            .to_string();
        Self::new(name, mime_type, bytes)
    }

    /// Rebuilds a file-like image from a stored data URL.
    pub fn from_data_url(data_url: &str, name: impl Into<String>) -> Result<Self, InputError> {
        let blob = codec::decode(data_url)?;
        Self::new(name, blob.mime_type, blob.bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_data_url(&self) -> String {
        codec::encode(&self.bytes, &self.mime_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemixOutput {
    pub image_data_url: String,
    pub text: String,
}

/// A remote (or simulated) generative image service.
///
/// Both calls block until the service answers; nothing is retried here.
pub trait ImageService: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<String, ServiceError>;
    fn remix(&self, prompt: &str, image: &InputImage) -> Result<RemixOutput, ServiceError>;
}

#[cfg(test)]
mod tests {
    use studio_contracts::codec;

    use super::{InputError, InputImage, MAX_INPUT_IMAGE_BYTES};

    #[test]
    fn accepts_common_raster_types() -> anyhow::Result<()> {
        let image = InputImage::new("a.png", "IMAGE/PNG", vec![1, 2, 3])?;
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.to_data_url(), codec::encode(&[1, 2, 3], "image/png"));
        Ok(())
    }

    #[test]
    fn rejects_other_types_and_oversized_files() {
        assert!(matches!(
            InputImage::new("a.gif", "image/gif", vec![0]),
            Err(InputError::UnsupportedType(_))
        ));
        assert!(matches!(
            InputImage::new("a.png", "image/png", vec![0; MAX_INPUT_IMAGE_BYTES + 1]),
            Err(InputError::TooLarge { .. })
        ));
        assert!(InputImage::new("a.png", "image/png", vec![0; MAX_INPUT_IMAGE_BYTES]).is_ok());
    }

    #[test]
    fn rebuilds_from_data_url() -> anyhow::Result<()> {
        let url = codec::encode(b"pixels", "image/webp");
        let image = InputImage::from_data_url(&url, "remix-source.webp")?;
        assert_eq!(image.name(), "remix-source.webp");
        assert_eq!(image.bytes(), b"pixels");
        assert!(matches!(
            InputImage::from_data_url("garbage", "x"),
            Err(InputError::Codec(_))
        ));
        Ok(())
    }

    #[test]
    fn reads_from_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("photo.jpg");
        std::fs::write(&path, b"jpeg-bytes")?;
        let image = InputImage::from_path(&path)?;
        assert_eq!(image.name(), "photo.jpg");
        assert_eq!(image.mime_type(), "image/jpeg");

        let missing = InputImage::from_path(&temp.path().join("missing.png"));
        assert!(matches!(missing, Err(InputError::Io { .. })));

        let gif = temp.path().join("anim.gif");
        std::fs::write(&gif, b"GIF89a")?;
        assert!(matches!(
            InputImage::from_path(&gif),
            Err(InputError::UnsupportedType(_))
        ));
        Ok(())
    }
}
