use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use studio_contracts::codec;
use studio_contracts::models::AspectRatio;

use crate::service::{ImageService, InputImage, RemixOutput, ServiceError};

/// Prompts containing this marker are refused the way a moderation block would be.
pub const DRYRUN_BLOCK_MARKER: &str = "[blocked]";
/// Prompts containing this marker produce a response without an image.
pub const DRYRUN_EMPTY_MARKER: &str = "[empty]";

const DRYRUN_LONG_EDGE: u32 = 256;

/// Offline stand-in for the remote service; renders deterministic placeholder images.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunImageService;

impl DryrunImageService {
    fn check_markers(prompt: &str) -> Result<(), ServiceError> {
        if prompt.contains(DRYRUN_BLOCK_MARKER) {
            return Err(ServiceError::BlockedRequest {
                reason: "DRYRUN_BLOCKED".to_string(),
            });
        }
        if prompt.contains(DRYRUN_EMPTY_MARKER) {
            return Err(ServiceError::EmptyResult(
                "No image was generated. The prompt may have been blocked.".to_string(),
            ));
        }
        Ok(())
    }
}

impl ImageService for DryrunImageService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<String, ServiceError> {
        Self::check_markers(prompt)?;
        let (width, height) = aspect_ratio.dimensions(DRYRUN_LONG_EDGE);
        let (r, g, b) = color_from_prompt(prompt);
        let mut canvas = RgbImage::new(width, height);
        for pixel in canvas.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let bytes = encode_png(DynamicImage::ImageRgb8(canvas))?;
        Ok(codec::encode(&bytes, "image/png"))
    }

    fn remix(&self, prompt: &str, image: &InputImage) -> Result<RemixOutput, ServiceError> {
        Self::check_markers(prompt)?;
        let source = image::load_from_memory(image.bytes()).map_err(|err| {
            ServiceError::Service(format!("Dry-run remix could not decode input image: {err}"))
        })?;
        let (r, g, b) = color_from_prompt(prompt);
        let mut canvas = source.to_rgb8();
        for pixel in canvas.pixels_mut() {
            let [pr, pg, pb] = pixel.0;
            *pixel = Rgb([blend(pr, r), blend(pg, g), blend(pb, b)]);
        }
        let bytes = encode_png(DynamicImage::ImageRgb8(canvas))?;
        Ok(RemixOutput {
            image_data_url: codec::encode(&bytes, "image/png"),
            text: format!(
                "Dry-run remix {} of {} ({}x{}).",
                short_digest(prompt),
                image.name(),
                source.width(),
                source.height()
            ),
        })
    }
}

fn encode_png(image: DynamicImage) -> Result<Vec<u8>, ServiceError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| ServiceError::Service(format!("Dry-run PNG encoding failed: {err}")))?;
    Ok(bytes)
}

fn blend(source: u8, tint: u8) -> u8 {
    ((source as u16 + tint as u16) / 2) as u8
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}

fn short_digest(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use studio_contracts::codec;
    use studio_contracts::models::AspectRatio;

    use crate::service::{ImageService, InputImage, ServiceError};

    use super::{color_from_prompt, DryrunImageService};

    #[test]
    fn generate_renders_png_at_aspect_ratio() -> anyhow::Result<()> {
        let url = DryrunImageService.generate("boat", AspectRatio::Landscape)?;
        let blob = codec::decode(&url)?;
        assert_eq!(blob.mime_type, "image/png");
        let decoded = image::load_from_memory(&blob.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (256, 144));

        let (r, g, b) = color_from_prompt("boat");
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0).0, [r, g, b]);
        Ok(())
    }

    #[test]
    fn generate_is_deterministic_per_prompt() -> anyhow::Result<()> {
        let a = DryrunImageService.generate("boat", AspectRatio::Square)?;
        let b = DryrunImageService.generate("boat", AspectRatio::Square)?;
        let c = DryrunImageService.generate("car", AspectRatio::Square)?;
        assert_eq!(a, b);
        assert_ne!(a, c);
        Ok(())
    }

    #[test]
    fn remix_keeps_dimensions_and_describes_result() -> anyhow::Result<()> {
        let source = DryrunImageService.generate("portrait", AspectRatio::Portrait)?;
        let input = InputImage::from_data_url(&source, "source.png")?;
        let output = DryrunImageService.remix("add a hat", &input)?;
        let decoded = image::load_from_memory(&codec::decode(&output.image_data_url)?.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (192, 256));
        assert!(output.text.contains("source.png"));
        Ok(())
    }

    #[test]
    fn remix_rejects_undecodable_input() -> anyhow::Result<()> {
        let input = InputImage::new("broken.png", "image/png", b"not a png".to_vec())?;
        assert!(matches!(
            DryrunImageService.remix("x", &input),
            Err(ServiceError::Service(_))
        ));
        Ok(())
    }

    #[test]
    fn markers_simulate_refusals() {
        assert_eq!(
            DryrunImageService.generate("a [blocked] prompt", AspectRatio::Square),
            Err(ServiceError::BlockedRequest {
                reason: "DRYRUN_BLOCKED".to_string()
            })
        );
        assert!(matches!(
            DryrunImageService.generate("[empty]", AspectRatio::Square),
            Err(ServiceError::EmptyResult(_))
        ));
    }
}
