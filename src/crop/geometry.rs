/// Crop rectangle math
///
/// Pure functions from source dimensions and an optional region of
/// interest to pixel rectangles. Every rectangle returned here lies
/// fully inside the source and is at least 1x1.

use serde::{Deserialize, Serialize};

use crate::error::CropError;

/// Default maximum height of one article tile
pub const MAX_TILE_HEIGHT: u32 = 8192;

/// Width and height of a decoded source image, both positive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDimensions {
    width: u32,
    height: u32,
}

impl SourceDimensions {
    pub fn new(width: u32, height: u32) -> Result<Self, CropError> {
        if width == 0 || height == 0 {
            return Err(CropError::EmptySource { width, height });
        }
        Ok(Self { width, height })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Region of interest in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// A crop rectangle in integer source pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropSpec {
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
}

impl CropSpec {
    /// The whole source image
    pub fn full(dims: SourceDimensions) -> Self {
        Self {
            width: dims.width,
            height: dims.height,
            left: 0,
            top: 0,
        }
    }

    /// True when the rectangle is non-empty and inside the source
    pub fn fits(&self, dims: SourceDimensions) -> bool {
        self.width >= 1
            && self.height >= 1
            && u64::from(self.left) + u64::from(self.width) <= u64::from(dims.width)
            && u64::from(self.top) + u64::from(self.height) <= u64::from(dims.height)
    }
}

/// Target width:height ratio for aspect-fit crops
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectRatio {
    pub width: f64,
    pub height: f64,
}

impl AspectRatio {
    /// 3:4 portrait, used for thumbnails
    pub const PORTRAIT_3_4: AspectRatio = AspectRatio {
        width: 3.0,
        height: 4.0,
    };

    #[inline]
    pub fn value(&self) -> f64 {
        self.width / self.height
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PORTRAIT_3_4
    }
}

/// One horizontal band of a tiled crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub crop: CropSpec,
    /// 1-based, top to bottom
    pub part: u32,
    pub total: u32,
}

/// Round half away from zero, then clamp a length into 1..=limit
fn clamp_len(value: f64, limit: u32) -> u32 {
    let rounded = value.round();
    if !rounded.is_finite() || rounded < 1.0 {
        return 1;
    }
    if rounded >= f64::from(limit) {
        return limit;
    }
    rounded as u32
}

/// Place a span of `len` centered on `center`, clamped to 0..=limit-len
fn clamp_offset(center: f64, len: u32, limit: u32) -> u32 {
    let max_offset = limit.saturating_sub(len);
    let offset = (center - f64::from(len) / 2.0).round();
    if !offset.is_finite() || offset <= 0.0 {
        return 0;
    }
    if offset >= f64::from(max_offset) {
        return max_offset;
    }
    offset as u32
}

/// Largest square, centered on the region (or anchored at the origin)
pub fn square_crop(dims: SourceDimensions, region: Option<&Region>) -> CropSpec {
    let side = dims.width.min(dims.height);

    let (left, top) = match region {
        Some(region) => {
            let (cx, cy) = region.center();
            (
                clamp_offset(cx, side, dims.width),
                clamp_offset(cy, side, dims.height),
            )
        }
        None => (0, 0),
    };

    CropSpec {
        width: side,
        height: side,
        left,
        top,
    }
}

/// Square around the region itself, sized by its longer side.
///
/// Each axis is clamped to the source independently, so the result is
/// not square when the region's side exceeds the image.
pub fn region_crop(dims: SourceDimensions, region: Option<&Region>) -> CropSpec {
    let Some(region) = region else {
        return square_crop(dims, None);
    };

    let side = region.w.max(region.h);
    let width = clamp_len(side, dims.width);
    let height = clamp_len(side, dims.height);
    let (cx, cy) = region.center();

    CropSpec {
        width,
        height,
        left: clamp_offset(cx, width, dims.width),
        top: clamp_offset(cy, height, dims.height),
    }
}

/// Largest rectangle of the given ratio, centered on the region or the image
pub fn aspect_fit_crop(
    dims: SourceDimensions,
    region: Option<&Region>,
    ratio: AspectRatio,
) -> CropSpec {
    let (w, h) = (f64::from(dims.width), f64::from(dims.height));
    let target = ratio.value();

    let (crop_w, crop_h) = if w / h > target {
        (h * target, h)
    } else {
        (w, w / target)
    };
    let width = clamp_len(crop_w, dims.width);
    let height = clamp_len(crop_h, dims.height);

    let (cx, cy) = match region {
        Some(region) => region.center(),
        None => (w / 2.0, h / 2.0),
    };

    CropSpec {
        width,
        height,
        left: clamp_offset(cx, width, dims.width),
        top: clamp_offset(cy, height, dims.height),
    }
}

/// Full-width bands of at most `max_height` rows, top to bottom
pub fn tiled_crops(dims: SourceDimensions, max_height: u32) -> Vec<Tile> {
    let max_height = max_height.max(1);
    let total = dims.height.div_ceil(max_height);

    (0..total)
        .map(|index| {
            let top = index * max_height;
            Tile {
                crop: CropSpec {
                    width: dims.width,
                    height: max_height.min(dims.height - top),
                    left: 0,
                    top,
                },
                part: index + 1,
                total,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dims(width: u32, height: u32) -> SourceDimensions {
        SourceDimensions::new(width, height).unwrap()
    }

    #[test]
    fn test_zero_area_rejected() {
        assert!(matches!(
            SourceDimensions::new(0, 10),
            Err(CropError::EmptySource { width: 0, height: 10 })
        ));
        assert!(SourceDimensions::new(10, 0).is_err());
    }

    #[test]
    fn test_square_without_region_is_anchored_at_origin() {
        let crop = square_crop(dims(1200, 800), None);
        assert_eq!(
            crop,
            CropSpec {
                width: 800,
                height: 800,
                left: 0,
                top: 0
            }
        );
    }

    #[test]
    fn test_square_centers_on_region_and_clamps() {
        let region = Region::new(900.0, 100.0, 100.0, 100.0);
        let crop = square_crop(dims(1200, 800), Some(&region));
        // center x = 950, 950 - 400 = 550, max left = 400
        assert_eq!(crop.left, 400);
        assert_eq!(crop.top, 0);

        let region = Region::new(500.0, 300.0, 100.0, 100.0);
        let crop = square_crop(dims(1200, 800), Some(&region));
        assert_eq!(crop.left, 150);
        assert_eq!(crop.top, 0);
    }

    #[test]
    fn test_region_crop_uses_longer_side() {
        let region = Region::new(100.0, 200.0, 60.0, 120.0);
        let crop = region_crop(dims(1000, 1000), Some(&region));
        assert_eq!(crop.width, 120);
        assert_eq!(crop.height, 120);
        // center (130, 260)
        assert_eq!(crop.left, 70);
        assert_eq!(crop.top, 200);
    }

    #[test]
    fn test_region_crop_is_non_square_on_small_images() {
        let region = Region::new(0.0, 0.0, 500.0, 500.0);
        let crop = region_crop(dims(300, 800), Some(&region));
        assert_eq!(crop.width, 300);
        assert_eq!(crop.height, 500);
        assert_eq!(crop.left, 0);
        assert_eq!(crop.top, 0);
    }

    #[test]
    fn test_region_crop_without_region_matches_square() {
        let d = dims(640, 480);
        assert_eq!(region_crop(d, None), square_crop(d, None));
    }

    #[test]
    fn test_aspect_fit_wide_image_is_height_bound() {
        let crop = aspect_fit_crop(dims(1600, 800), None, AspectRatio::PORTRAIT_3_4);
        assert_eq!(crop.height, 800);
        assert_eq!(crop.width, 600);
        assert_eq!(crop.left, 500);
        assert_eq!(crop.top, 0);
    }

    #[test]
    fn test_aspect_fit_tall_image_is_width_bound() {
        let crop = aspect_fit_crop(dims(600, 2000), None, AspectRatio::PORTRAIT_3_4);
        assert_eq!(crop.width, 600);
        assert_eq!(crop.height, 800);
        assert_eq!(crop.left, 0);
        assert_eq!(crop.top, 600);
    }

    #[test]
    fn test_aspect_fit_follows_region() {
        let region = Region::new(1400.0, 0.0, 100.0, 100.0);
        let crop = aspect_fit_crop(dims(1600, 800), Some(&region), AspectRatio::PORTRAIT_3_4);
        assert_eq!(crop.left, 1000);
    }

    #[test]
    fn test_tiles_for_tall_article() {
        let tiles = tiled_crops(dims(800, 20_000), MAX_TILE_HEIGHT);
        let heights: Vec<u32> = tiles.iter().map(|t| t.crop.height).collect();
        assert_eq!(heights, vec![8192, 8192, 3616]);
        assert_eq!(tiles[2].crop.top, 16_384);
        assert!(tiles.iter().all(|t| t.total == 3 && t.crop.width == 800));
        assert_eq!(tiles.iter().map(|t| t.part).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_short_article_is_single_tile() {
        let tiles = tiled_crops(dims(800, 8192), MAX_TILE_HEIGHT);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].crop, CropSpec::full(dims(800, 8192)));
    }

    fn region_strategy() -> impl Strategy<Value = (u32, u32, f64, f64, f64, f64)> {
        (1u32..4000, 1u32..4000).prop_flat_map(|(w, h)| {
            (
                Just(w),
                Just(h),
                -100.0..f64::from(w) + 100.0,
                -100.0..f64::from(h) + 100.0,
                0.0..f64::from(w.max(h)) * 1.5,
                0.0..f64::from(w.max(h)) * 1.5,
            )
        })
    }

    proptest! {
        #[test]
        fn prop_crops_stay_inside((w, h, x, y, rw, rh) in region_strategy()) {
            let d = dims(w, h);
            let region = Region::new(x, y, rw, rh);
            for crop in [
                square_crop(d, Some(&region)),
                square_crop(d, None),
                region_crop(d, Some(&region)),
                aspect_fit_crop(d, Some(&region), AspectRatio::PORTRAIT_3_4),
                aspect_fit_crop(d, None, AspectRatio::PORTRAIT_3_4),
            ] {
                prop_assert!(crop.fits(d), "{:?} escapes {}x{}", crop, w, h);
            }
        }

        #[test]
        fn prop_aspect_fit_ratio_within_a_pixel(w in 1u32..6000, h in 1u32..6000) {
            let crop = aspect_fit_crop(dims(w, h), None, AspectRatio::PORTRAIT_3_4);
            let expected_width = f64::from(crop.height) * 0.75;
            let expected_height = f64::from(crop.width) / 0.75;
            prop_assert!(
                (f64::from(crop.width) - expected_width).abs() <= 1.0
                    || (f64::from(crop.height) - expected_height).abs() <= 1.0
            );
        }

        #[test]
        fn prop_tiles_cover_height(w in 1u32..64, h in 1u32..100_000) {
            let tiles = tiled_crops(dims(w, h), MAX_TILE_HEIGHT);
            let sum: u64 = tiles.iter().map(|t| u64::from(t.crop.height)).sum();
            prop_assert_eq!(sum, u64::from(h));
            prop_assert_eq!(tiles.len() as u32, h.div_ceil(MAX_TILE_HEIGHT));
            for (index, tile) in tiles.iter().enumerate() {
                prop_assert!(tile.crop.height <= MAX_TILE_HEIGHT);
                prop_assert_eq!(tile.part, index as u32 + 1);
                prop_assert_eq!(tile.crop.width, w);
            }
        }

        #[test]
        fn prop_geometry_is_deterministic((w, h, x, y, rw, rh) in region_strategy()) {
            let d = dims(w, h);
            let region = Region::new(x, y, rw, rh);
            prop_assert_eq!(region_crop(d, Some(&region)), region_crop(d, Some(&region)));
            prop_assert_eq!(
                aspect_fit_crop(d, Some(&region), AspectRatio::PORTRAIT_3_4),
                aspect_fit_crop(d, Some(&region), AspectRatio::PORTRAIT_3_4)
            );
        }
    }
}
