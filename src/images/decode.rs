//! Decoding raw payloads into RGBA pixels.

use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::models::Target;

/// Decoded RGBA8 pixels ready to upload as a texture
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major RGBA8 data, `width * height * 4` bytes
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Size of the pixel data in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Decode `payload` and shape it for `target`.
///
/// Cancellation is checked before and after each expensive step.
pub fn decode(payload: &[u8], target: Target, cancel: &CancellationToken) -> Result<PixelBuffer> {
    check(cancel)?;
    let image = image::load_from_memory(payload)?;

    check(cancel)?;
    let image = match target.max_dimension() {
        Some(max) => fit_within(image, max),
        None => image,
    };

    check(cancel)?;
    let image = match target.quarter_turns() {
        1 => image.rotate90(),
        2 => image.rotate180(),
        3 => image.rotate270(),
        _ => image,
    };

    let rgba = image.into_rgba8();
    Ok(PixelBuffer {
        width: rgba.width(),
        height: rgba.height(),
        data: rgba.into_raw(),
    })
}

fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Downscale so neither edge exceeds `max_dimension`, keeping aspect ratio.
fn fit_within(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());

    if width <= max_dimension && height <= max_dimension {
        return image;
    }

    let ratio = f64::from(width) / f64::from(height);
    let (new_width, new_height) = if width > height {
        (max_dimension, (f64::from(max_dimension) / ratio) as u32)
    } else {
        ((f64::from(max_dimension) * ratio) as u32, max_dimension)
    };

    image.resize_exact(
        new_width.max(1),
        new_height.max(1),
        image::imageops::FilterType::Triangle,
    )
}
