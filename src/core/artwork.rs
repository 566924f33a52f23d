//! Album art placement and squaring.

use crate::core::error::{Error, Result};
use clap::ValueEnum;
use image::{imageops, DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

/// File stem of the cover image written next to each downloaded track.
pub const COVER_FILE_STEM: &str = "cover";

/// How non-square album art is turned into a square cover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlbumArtAdjustment {
    /// Center-crop to the shorter side.
    Crop,
    /// Pad the shorter side with transparency, keeping the whole image.
    #[default]
    Fit,
}

impl AlbumArtAdjustment {
    pub fn apply(self, image: &DynamicImage) -> DynamicImage {
        match self {
            AlbumArtAdjustment::Crop => crop(image),
            AlbumArtAdjustment::Fit => fit(image),
        }
    }
}

impl fmt::Display for AlbumArtAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlbumArtAdjustment::Crop => f.write_str("crop"),
            AlbumArtAdjustment::Fit => f.write_str("fit"),
        }
    }
}

pub fn crop(image: &DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    let left = (width - side) / 2;
    let top = (height - side) / 2;

    image.crop_imm(left, top, side, side)
}

pub fn fit(image: &DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let side = width.max(height);
    let left = (side - width) / 2;
    let top = (side - height) / 2;

    let mut canvas = RgbaImage::from_pixel(side, side, Rgba([0, 0, 0, 0]));
    imageops::overlay(&mut canvas, &image.to_rgba8(), i64::from(left), i64::from(top));
    DynamicImage::ImageRgba8(canvas)
}

/// Decodes an image, guessing its format from content rather than extension.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Squares the cover at `path` in place, writing it back as PNG.
pub fn adjust_album_art(path: &Path, adjustment: AlbumArtAdjustment) -> Result<()> {
    let image = open_image(path)?;
    let adjusted = adjustment.apply(&image);
    debug!(
        "Adjusted album art {} from {:?} to {:?} ({})",
        path.display(),
        image.dimensions(),
        adjusted.dimensions(),
        adjustment
    );
    adjusted.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Path of the cover image that belongs next to `audio_path`.
pub fn cover_path_for(audio_path: &Path) -> PathBuf {
    let dir = audio_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}.png", COVER_FILE_STEM))
}

/// Moves a temporary album art file next to the downloaded audio as `cover.png`.
///
/// PNG input is moved as is; any other format is re-encoded. The temporary
/// file never outlives this call, whether it succeeds or not.
pub fn materialize_album_art(artwork: TempPath, audio_path: &Path) -> Result<PathBuf> {
    if !artwork.exists() {
        return Err(Error::MissingAlbumArt(artwork.to_path_buf()));
    }

    let target = cover_path_for(audio_path);
    let format = ImageReader::open(&artwork)?.with_guessed_format()?.format();

    if format == Some(ImageFormat::Png) {
        if let Err(err) = artwork.persist(&target) {
            // Renaming fails across filesystems; fall back to copying.
            debug!("Rename of album art failed ({}), copying instead", err.error);
            fs::copy(&err.path, &target)?;
        }
    } else {
        open_image(&artwork)?.save_with_format(&target, ImageFormat::Png)?;
    }

    Ok(target)
}
