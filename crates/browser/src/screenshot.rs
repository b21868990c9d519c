//! Screenshot Budgeting Pipeline
//!
//! Captures the full page extent once, then shrinks the PNG until it fits a
//! byte budget. PNG size is a non-linear, content-dependent function of pixel
//! count, so the scale is narrowed iteratively instead of computed once.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::imageops::FilterType as ResizeFilter;
use image::{DynamicImage, ImageFormat};

use crate::config::Viewport;
use crate::error::{BrowserError, Result};
use crate::page::Page;

pub const MIN_DIMENSION: u32 = 100;
pub const MAX_DIMENSION: u32 = 10_000;
pub const DEFAULT_MAX_BYTES: usize = 500_000;

const MAX_ATTEMPTS: usize = 5;
/// Head-room on the first estimate; PNG size does not scale linearly
const SAFETY_MARGIN: f64 = 0.8;
const SCALE_STEP: f64 = 0.7;
const FINAL_PASS: (u32, u32) = (640, 480);

/// Capture the page and return a PNG of at most `max_bytes` where possible.
///
/// Fails fast with `TooSmall` when the page extent is below `MIN_DIMENSION`.
/// When no attempt fits, the final low-resolution pass is returned anyway.
/// The viewport is widened to the full extent for the capture and set back
/// to `restore` afterwards, whether or not the capture succeeded.
pub async fn capture_bounded(page: &dyn Page, max_bytes: usize, restore: Viewport) -> Result<Vec<u8>> {
    let (width, height) = page.content_size().await?;
    let width = width.min(MAX_DIMENSION);
    let height = height.min(MAX_DIMENSION);
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(BrowserError::TooSmall { width, height });
    }

    let captured = capture_full_extent(page, width, height).await;
    if let Err(e) = page.set_viewport(restore).await {
        tracing::warn!(
            "[Screenshot] Could not restore {}x{} viewport: {}",
            restore.width,
            restore.height,
            e
        );
    }
    let raw = captured?;
    if raw.len() <= max_bytes {
        tracing::debug!(
            "[Screenshot] {}x{} capture fits budget ({} bytes)",
            width,
            height,
            raw.len()
        );
        return Ok(raw);
    }

    tracing::debug!(
        "[Screenshot] {}x{} capture is {} bytes, budget {}",
        width,
        height,
        raw.len(),
        max_bytes
    );
    tokio::task::spawn_blocking(move || fit_to_budget(&raw, max_bytes))
        .await
        .map_err(|e| BrowserError::Capture(format!("resize task failed: {e}")))?
}

async fn capture_full_extent(page: &dyn Page, width: u32, height: u32) -> Result<Vec<u8>> {
    page.set_viewport(Viewport { width, height }).await?;
    page.capture_png(width, height).await
}

/// Resize and recompress `png` until it fits `max_bytes`
pub fn fit_to_budget(png: &[u8], max_bytes: usize) -> Result<Vec<u8>> {
    let original = image::load_from_memory_with_format(png, ImageFormat::Png)?;
    let (width, height) = (original.width(), original.height());

    let mut scale = (max_bytes as f64 / png.len() as f64).sqrt() * SAFETY_MARGIN;
    for attempt in 1..=MAX_ATTEMPTS {
        let w = scaled(width, scale);
        let h = scaled(height, scale);
        let bytes = encode(&original.resize_exact(w, h, ResizeFilter::Triangle))?;
        tracing::debug!(
            "[Screenshot] Attempt {}: {}x{} -> {} bytes",
            attempt,
            w,
            h,
            bytes.len()
        );
        if bytes.len() <= max_bytes {
            return Ok(bytes);
        }
        scale *= SCALE_STEP;
    }

    let (w, h) = final_pass_size(width, height);
    let fallback =
        DynamicImage::ImageRgb8(original.resize_exact(w, h, ResizeFilter::Triangle).to_rgb8());
    let bytes = encode(&fallback)?;
    if bytes.len() > max_bytes {
        tracing::warn!(
            "[Screenshot] Final pass still {} bytes over a {} byte budget, returning it",
            bytes.len(),
            max_bytes
        );
    }
    Ok(bytes)
}

/// Fit inside `FINAL_PASS` keeping the aspect ratio; no side below `MIN_DIMENSION`
fn final_pass_size(width: u32, height: u32) -> (u32, u32) {
    let (max_w, max_h) = FINAL_PASS;
    let ratio = (max_w as f64 / width as f64)
        .min(max_h as f64 / height as f64)
        .min(1.0);
    (scaled(width, ratio), scaled(height, ratio))
}

fn scaled(dimension: u32, scale: f64) -> u32 {
    ((dimension as f64 * scale).round() as u32).max(MIN_DIMENSION)
}

fn encode(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{synth_png, CapturePattern, FakePage, FakePageSpec};

    fn dimensions(png: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory_with_format(png, ImageFormat::Png).unwrap();
        (img.width(), img.height())
    }

    const BASELINE: Viewport = Viewport {
        width: 1920,
        height: 1080,
    };

    #[tokio::test]
    async fn test_large_solid_capture_within_budget() {
        let page = FakePage::new(FakePageSpec::default().with_content_size(4000, 3000));
        let bytes = capture_bounded(&page, DEFAULT_MAX_BYTES, BASELINE).await.unwrap();

        assert!(bytes.len() <= DEFAULT_MAX_BYTES);
        let (w, h) = dimensions(&bytes);
        assert!(w >= MIN_DIMENSION && h >= MIN_DIMENSION);
        assert_eq!(
            page.viewports(),
            vec![Viewport { width: 4000, height: 3000 }, BASELINE]
        );
        assert_eq!(page.viewport(), Some(BASELINE));
    }

    #[tokio::test]
    async fn test_viewport_restored_when_capture_fails() {
        let page = FakePage::new(
            FakePageSpec::default()
                .with_content_size(1200, 900)
                .with_capture_failure(),
        );

        let err = capture_bounded(&page, DEFAULT_MAX_BYTES, BASELINE).await.unwrap_err();

        assert!(matches!(err, BrowserError::Capture(_)));
        assert_eq!(
            page.viewports(),
            vec![Viewport { width: 1200, height: 900 }, BASELINE]
        );
    }

    #[tokio::test]
    async fn test_tiny_page_fails_fast() {
        let page = FakePage::new(FakePageSpec::default().with_content_size(50, 50));
        let err = capture_bounded(&page, DEFAULT_MAX_BYTES, BASELINE).await.unwrap_err();

        assert!(matches!(err, BrowserError::TooSmall { width: 50, height: 50 }));
        assert_eq!(page.captures(), 0);
        assert!(page.viewports().is_empty());
    }

    #[tokio::test]
    async fn test_extent_capped_at_max_dimension() {
        let page = FakePage::new(FakePageSpec::default().with_content_size(1200, 40_000));
        capture_bounded(&page, usize::MAX, BASELINE).await.unwrap();
        assert_eq!(
            page.viewports(),
            vec![Viewport { width: 1200, height: MAX_DIMENSION }, BASELINE]
        );
    }

    #[tokio::test]
    async fn test_noisy_capture_is_shrunk() {
        let page = FakePage::new(
            FakePageSpec::default()
                .with_content_size(1200, 900)
                .with_pattern(CapturePattern::Noise),
        );
        let bytes = capture_bounded(&page, 200_000, BASELINE).await.unwrap();

        assert!(bytes.len() <= 200_000);
        let (w, h) = dimensions(&bytes);
        assert!(w < 1200 && h < 900);
        assert!(w >= MIN_DIMENSION && h >= MIN_DIMENSION);
        assert_eq!(page.viewport(), Some(BASELINE));
    }

    #[test]
    fn test_unreachable_budget_returns_final_pass() {
        let png = synth_png(800, 600, CapturePattern::Noise).unwrap();
        let bytes = fit_to_budget(&png, 10).unwrap();
        assert_eq!(dimensions(&bytes), FINAL_PASS);
    }

    #[test]
    fn test_final_pass_of_tall_page_keeps_min_width() {
        // Aspect ratio squeezes the plain 640x480 fit below the minimum width
        let png = synth_png(960, 5000, CapturePattern::Noise).unwrap();
        let bytes = fit_to_budget(&png, 10_000).unwrap();
        let (w, h) = dimensions(&bytes);
        assert!(w >= MIN_DIMENSION, "width {w} below minimum");
        assert!(h >= MIN_DIMENSION && h <= FINAL_PASS.1);
    }

    #[test]
    fn test_final_pass_size() {
        assert_eq!(final_pass_size(800, 600), (640, 480));
        assert_eq!(final_pass_size(1920, 10_000), (MIN_DIMENSION, 480));
        assert_eq!(final_pass_size(10_000, 150), (640, MIN_DIMENSION));
        assert_eq!(final_pass_size(320, 240), (320, 240));
    }

    #[test]
    fn test_scaled_floor() {
        assert_eq!(scaled(4000, 0.001), MIN_DIMENSION);
        assert_eq!(scaled(1000, 0.5), 500);
    }
}
