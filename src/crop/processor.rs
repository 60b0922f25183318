/// Derivative generation
///
/// Applies the crop rectangles to a decoded original and encodes each
/// result as JPEG. Everything here is CPU-bound; the async entry point
/// moves the work onto the blocking pool.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use tokio::task;
use tracing::{debug, warn};

use crate::color::extract_muted_color;
use crate::config::CropConfig;
use crate::crop::geometry::{
    aspect_fit_crop, region_crop, square_crop, tiled_crops, CropSpec, Region, SourceDimensions,
};
use crate::error::CropError;
use crate::pipeline::naming::{article_suffix, color_suffix, product_region_suffix};
use crate::state::data::{DerivedArtifact, ImageCategory};

/// Decode an original into an RGB raster
pub fn decode(bytes: &[u8]) -> Result<(RgbImage, SourceDimensions), CropError> {
    if bytes.is_empty() {
        return Err(CropError::EmptyBuffer);
    }

    let raster = image::load_from_memory(bytes)
        .map_err(CropError::Decode)?
        .to_rgb8();
    let dims = SourceDimensions::new(raster.width(), raster.height())?;
    Ok((raster, dims))
}

/// Cut one rectangle out of the raster and encode it
pub fn encode_crop(raster: &RgbImage, crop: CropSpec, quality: u8) -> Result<Vec<u8>, CropError> {
    let view = imageops::crop_imm(raster, crop.left, crop.top, crop.width, crop.height).to_image();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&view)
        .map_err(CropError::Encode)?;
    Ok(bytes)
}

/// Muted color of an encoded crop, or the fallback token
fn color_or_fallback(bytes: &[u8], fallback: &str) -> String {
    match extract_muted_color(bytes) {
        Ok(hex) => hex,
        Err(e) => {
            warn!(error = %e, fallback, "Muted color unavailable");
            fallback.to_string()
        }
    }
}

fn artifact(bytes: Vec<u8>, suffix: String, crop: CropSpec) -> DerivedArtifact {
    DerivedArtifact {
        bytes,
        suffix,
        width: crop.width,
        height: crop.height,
        part: 1,
        total: 1,
    }
}

/// Square crop plus a crop around the region itself, both named by the
/// square crop's muted color
pub fn crop_product(
    raster: &RgbImage,
    dims: SourceDimensions,
    region: Option<&Region>,
    config: &CropConfig,
    color_fallback: &str,
) -> Result<Vec<DerivedArtifact>, CropError> {
    let square = square_crop(dims, region);
    let square_bytes = encode_crop(raster, square, config.jpeg_quality)?;
    let color = color_or_fallback(&square_bytes, color_fallback);

    let around = region_crop(dims, region);
    let around_bytes = encode_crop(raster, around, config.jpeg_quality)?;

    Ok(vec![
        artifact(square_bytes, color_suffix(&color), square),
        artifact(around_bytes, product_region_suffix(&color), around),
    ])
}

/// Single aspect-fit crop
pub fn crop_thumbnail(
    raster: &RgbImage,
    dims: SourceDimensions,
    region: Option<&Region>,
    config: &CropConfig,
    color_fallback: &str,
) -> Result<Vec<DerivedArtifact>, CropError> {
    let crop = aspect_fit_crop(dims, region, config.aspect_ratio);
    let bytes = encode_crop(raster, crop, config.jpeg_quality)?;
    let color = color_or_fallback(&bytes, color_fallback);

    Ok(vec![artifact(bytes, color_suffix(&color), crop)])
}

/// Full-width bands, named by the source dimensions
pub fn crop_article(
    raster: &RgbImage,
    dims: SourceDimensions,
    config: &CropConfig,
) -> Result<Vec<DerivedArtifact>, CropError> {
    tiled_crops(dims, config.max_tile_height)
        .into_iter()
        .map(|tile| {
            let bytes = encode_crop(raster, tile.crop, config.jpeg_quality)?;
            Ok(DerivedArtifact {
                bytes,
                suffix: article_suffix(dims.width(), dims.height(), tile.part, tile.total),
                width: tile.crop.width,
                height: tile.crop.height,
                part: tile.part,
                total: tile.total,
            })
        })
        .collect()
}

/// Decode and produce every derivative for one category
pub fn transform(
    category: ImageCategory,
    bytes: &[u8],
    region: Option<&Region>,
    config: &CropConfig,
    color_fallback: &str,
) -> Result<Vec<DerivedArtifact>, CropError> {
    let (raster, dims) = decode(bytes)?;
    debug!(%category, width = dims.width(), height = dims.height(), "Decoded original");

    match category {
        ImageCategory::Product => crop_product(&raster, dims, region, config, color_fallback),
        ImageCategory::Thumbnail => crop_thumbnail(&raster, dims, region, config, color_fallback),
        ImageCategory::Article => crop_article(&raster, dims, config),
    }
}

/// [`transform`] on the blocking pool
pub async fn transform_blocking(
    category: ImageCategory,
    bytes: Vec<u8>,
    region: Option<Region>,
    config: CropConfig,
    color_fallback: String,
) -> Result<Vec<DerivedArtifact>, CropError> {
    task::spawn_blocking(move || {
        transform(category, &bytes, region.as_ref(), &config, &color_fallback)
    })
    .await
    .map_err(|e| CropError::Worker(e.to_string()))?
}
