//! Full-frame backgrounds for the compositor.

use crate::error::SynthesisError;
use image::{imageops, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Background placed behind the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum BackgroundMode {
    /// Muted tint. The live background is not actually blurred.
    #[default]
    Blur,
    Black,
    White,
    Gradient,
    #[value(name = "image", alias = "custom-image")]
    CustomImage,
}

impl BackgroundMode {
    pub const ALL: [BackgroundMode; 5] = [
        BackgroundMode::Blur,
        BackgroundMode::Black,
        BackgroundMode::White,
        BackgroundMode::Gradient,
        BackgroundMode::CustomImage,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            BackgroundMode::Blur => "Blur",
            BackgroundMode::Black => "Black",
            BackgroundMode::White => "White",
            BackgroundMode::Gradient => "Gradient",
            BackgroundMode::CustomImage => "Custom Image",
        }
    }
}

impl std::fmt::Display for BackgroundMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// rgb(0.2, 0.3, 0.5)
const BLUR_TINT: Rgb<u8> = Rgb([51, 77, 128]);
/// rgb(0.9, 0.3, 0.8), top-left corner.
const GRADIENT_START: Rgb<u8> = Rgb([230, 77, 204]);
/// rgb(0.2, 0.6, 0.9), bottom-right corner.
const GRADIENT_END: Rgb<u8> = Rgb([51, 153, 230]);

/// Asset looked up in the asset directory.
pub const ASSET_NAME: &str = "background";
const ASSET_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Produces backgrounds of an exact size.
///
/// Output depends only on the mode, the size and the custom asset, so equal
/// arguments always give pixel-identical images.
#[derive(Debug, Clone, Default)]
pub struct BackgroundSynthesizer {
    asset: Option<RgbImage>,
}

impl BackgroundSynthesizer {
    /// No custom asset; `CustomImage` renders the gradient.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(asset: RgbImage) -> Self {
        Self { asset: Some(asset) }
    }

    /// Load the asset from an explicit file.
    pub fn from_path(path: &Path) -> Self {
        match load_asset(path) {
            Ok(asset) => {
                tracing::info!(
                    "Loaded background {} ({}x{})",
                    path.display(),
                    asset.width(),
                    asset.height()
                );
                Self::with_asset(asset)
            }
            Err(e) => {
                tracing::warn!("Background {} unusable: {}", path.display(), e);
                Self::new()
            }
        }
    }

    /// Look up the `background` asset in `dir`.
    pub fn from_asset_dir(dir: &Path) -> Self {
        match find_asset(dir, ASSET_NAME) {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::warn!("No {} asset in {}", ASSET_NAME, dir.display());
                Self::new()
            }
        }
    }

    pub fn has_asset(&self) -> bool {
        self.asset.is_some()
    }

    /// Render `mode` at exactly `size`.
    pub fn synthesize(&self, mode: BackgroundMode, size: (u32, u32)) -> RgbImage {
        let _span = tracing::debug_span!("synthesize", %mode).entered();
        let (width, height) = size;
        if width == 0 || height == 0 {
            return RgbImage::new(width, height);
        }

        match mode {
            BackgroundMode::Blur => RgbImage::from_pixel(width, height, BLUR_TINT),
            BackgroundMode::Black => RgbImage::from_pixel(width, height, Rgb([0, 0, 0])),
            BackgroundMode::White => RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
            BackgroundMode::Gradient => gradient(width, height),
            BackgroundMode::CustomImage => self.custom(width, height).unwrap_or_else(|e| {
                tracing::warn!("Custom background failed ({}), using gradient", e);
                gradient(width, height)
            }),
        }
    }

    /// Scale uniformly to fill the width, growing further if needed to cover
    /// the height, then crop from the top-left corner.
    fn custom(&self, width: u32, height: u32) -> Result<RgbImage, SynthesisError> {
        let asset = self.asset.as_ref().ok_or(SynthesisError::AssetMissing)?;
        let (asset_w, asset_h) = asset.dimensions();
        if asset_w == 0 || asset_h == 0 {
            return Err(SynthesisError::EmptyAsset);
        }

        if (asset_w, asset_h) == (width, height) {
            return Ok(asset.clone());
        }

        let scale = (width as f64 / asset_w as f64).max(height as f64 / asset_h as f64);
        let scaled_w = ((asset_w as f64 * scale).ceil() as u32).max(width);
        let scaled_h = ((asset_h as f64 * scale).ceil() as u32).max(height);

        let scaled = imageops::resize(asset, scaled_w, scaled_h, imageops::FilterType::Lanczos3);
        Ok(imageops::crop_imm(&scaled, 0, 0, width, height).to_image())
    }
}

/// Diagonal two-stop gradient from the top-left to the bottom-right corner.
fn gradient(width: u32, height: u32) -> RgbImage {
    let w = width as f32;
    let h = height as f32;
    let norm = w * w + h * h;

    RgbImage::from_fn(width, height, |x, y| {
        let t = (((x as f32 + 0.5) * w + (y as f32 + 0.5) * h) / norm).clamp(0.0, 1.0);
        Rgb(std::array::from_fn(|c| {
            let a = GRADIENT_START[c] as f32;
            let b = GRADIENT_END[c] as f32;
            (a + (b - a) * t).round() as u8
        }))
    })
}

fn load_asset(path: &Path) -> Result<RgbImage, SynthesisError> {
    if !path.is_file() {
        return Err(SynthesisError::AssetMissing);
    }
    let asset = image::open(path)?.to_rgb8();
    if asset.width() == 0 || asset.height() == 0 {
        return Err(SynthesisError::EmptyAsset);
    }
    Ok(asset)
}

/// First `<name>.<ext>` in `dir` for the supported extensions.
pub fn find_asset(dir: &Path, name: &str) -> Option<PathBuf> {
    ASSET_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZES: [(u32, u32); 4] = [(1, 1), (100, 100), (17, 5), (3, 40)];

    #[test]
    fn every_mode_fills_exact_size() {
        let synth = BackgroundSynthesizer::with_asset(RgbImage::from_pixel(7, 3, Rgb([1, 2, 3])));
        for mode in BackgroundMode::ALL {
            for size in SIZES {
                assert_eq!(synth.synthesize(mode, size).dimensions(), size, "{mode} at {size:?}");
            }
        }
    }

    #[test]
    fn zero_area_is_empty_image() {
        let synth = BackgroundSynthesizer::new();
        assert_eq!(synth.synthesize(BackgroundMode::Gradient, (0, 12)).dimensions(), (0, 12));
    }

    #[test]
    fn synthesis_is_deterministic() {
        let synth = BackgroundSynthesizer::with_asset(gradient(31, 9));
        for mode in BackgroundMode::ALL {
            assert_eq!(
                synth.synthesize(mode, (64, 48)),
                synth.synthesize(mode, (64, 48)),
                "{mode}"
            );
        }
    }

    #[test]
    fn solid_modes() {
        let synth = BackgroundSynthesizer::new();
        let all = |image: RgbImage, color: Rgb<u8>| image.pixels().all(|p| *p == color);
        assert!(all(synth.synthesize(BackgroundMode::Black, (4, 4)), Rgb([0, 0, 0])));
        assert!(all(synth.synthesize(BackgroundMode::White, (4, 4)), Rgb([255, 255, 255])));
        assert!(all(synth.synthesize(BackgroundMode::Blur, (4, 4)), BLUR_TINT));
    }

    #[test]
    fn gradient_runs_corner_to_corner() {
        let image = BackgroundSynthesizer::new().synthesize(BackgroundMode::Gradient, (200, 100));
        let near = |a: &Rgb<u8>, b: Rgb<u8>| (0..3).all(|c| a[c].abs_diff(b[c]) <= 2);

        assert!(near(image.get_pixel(0, 0), GRADIENT_START));
        assert!(near(image.get_pixel(199, 99), GRADIENT_END));
        assert_ne!(image.get_pixel(0, 0), image.get_pixel(199, 99));
    }

    #[test]
    fn square_gradient_is_symmetric_about_the_diagonal() {
        let image = gradient(50, 50);
        for (x, y) in [(3, 41), (10, 20), (0, 49)] {
            assert_eq!(image.get_pixel(x, y), image.get_pixel(y, x));
        }
    }

    #[test]
    fn missing_asset_falls_back_to_gradient() {
        let synth = BackgroundSynthesizer::new();
        assert_eq!(
            synth.synthesize(BackgroundMode::CustomImage, (40, 30)),
            synth.synthesize(BackgroundMode::Gradient, (40, 30))
        );
    }

    #[test]
    fn empty_asset_falls_back_to_gradient() {
        let synth = BackgroundSynthesizer::with_asset(RgbImage::new(0, 0));
        assert_eq!(
            synth.synthesize(BackgroundMode::CustomImage, (8, 8)),
            gradient(8, 8)
        );
    }

    #[test]
    fn custom_asset_is_scaled_and_cropped() {
        let green = Rgb([0, 200, 0]);
        let synth = BackgroundSynthesizer::with_asset(RgbImage::from_pixel(2, 2, green));
        let image = synth.synthesize(BackgroundMode::CustomImage, (10, 6));
        assert_eq!(image.dimensions(), (10, 6));
        assert!(image.pixels().all(|p| *p == green));
    }

    #[test]
    fn wide_asset_still_covers_height() {
        let mut asset = RgbImage::from_pixel(8, 1, Rgb([10, 10, 10]));
        asset.put_pixel(0, 0, Rgb([250, 10, 10]));
        let synth = BackgroundSynthesizer::with_asset(asset);

        let image = synth.synthesize(BackgroundMode::CustomImage, (8, 8));
        assert_eq!(image.dimensions(), (8, 8));
        assert_ne!(image, gradient(8, 8));
    }

    #[test]
    fn asset_dir_lookup() {
        let dir = std::env::temp_dir().join(format!("backdrop-fx-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        assert!(find_asset(&dir, ASSET_NAME).is_none());
        assert!(!BackgroundSynthesizer::from_asset_dir(&dir).has_asset());

        RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]))
            .save(dir.join("background.png"))
            .unwrap();
        assert_eq!(find_asset(&dir, ASSET_NAME), Some(dir.join("background.png")));
        assert!(BackgroundSynthesizer::from_asset_dir(&dir).has_asset());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn undecodable_asset_is_ignored() {
        let path = std::env::temp_dir().join(format!("backdrop-fx-bad-{}.png", std::process::id()));
        std::fs::write(&path, b"not a png").unwrap();
        assert!(matches!(load_asset(&path), Err(SynthesisError::AssetDecode(_))));
        assert!(!BackgroundSynthesizer::from_path(&path).has_asset());
        std::fs::remove_file(&path).unwrap();
    }
}
