/// Dominant color extraction
///
/// This module derives the "muted" swatch of an image:
/// - Decode to an RGBA raster (lossless, whatever the input encoding)
/// - Quantize sampled pixels with modified median cut (quantize.rs)
/// - Score swatches against the six vibrant/muted targets by
///   saturation, lightness and population
///
/// The muted hex ends up in published filenames, so callers treat any
/// failure as cosmetic and substitute a fallback token.

pub mod quantize;

use palette::{Hsl, IntoColor, Srgb};

use crate::error::ColorError;
use quantize::{quantize, QuantizedColor};

/// Colors requested from the quantizer
const COLOR_COUNT: usize = 64;
/// Sample every Nth pixel
const SAMPLE_QUALITY: usize = 5;
/// Pixels more transparent than this are ignored
const MIN_ALPHA: u8 = 125;

const TARGET_DARK_LUMA: f32 = 0.26;
const MAX_DARK_LUMA: f32 = 0.45;
const MIN_LIGHT_LUMA: f32 = 0.55;
const TARGET_LIGHT_LUMA: f32 = 0.74;
const MIN_NORMAL_LUMA: f32 = 0.3;
const TARGET_NORMAL_LUMA: f32 = 0.5;
const MAX_NORMAL_LUMA: f32 = 0.7;
const TARGET_MUTED_SATURATION: f32 = 0.3;
const MAX_MUTED_SATURATION: f32 = 0.4;
const TARGET_VIBRANT_SATURATION: f32 = 1.0;
const MIN_VIBRANT_SATURATION: f32 = 0.35;

const WEIGHT_SATURATION: f32 = 3.0;
const WEIGHT_LUMA: f32 = 6.5;
const WEIGHT_POPULATION: f32 = 0.5;

/// A palette entry with its HSL coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swatch {
    pub rgb: [u8; 3],
    pub population: u32,
    pub saturation: f32,
    pub lightness: f32,
}

impl Swatch {
    fn from_quantized(color: QuantizedColor) -> Self {
        let [r, g, b] = color.rgb;
        let hsl: Hsl = Srgb::new(
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
        )
        .into_color();

        Self {
            rgb: color.rgb,
            population: color.population,
            saturation: hsl.saturation,
            lightness: hsl.lightness,
        }
    }

    /// Lowercase hex without a leading `#`
    pub fn hex(&self) -> String {
        let [r, g, b] = self.rgb;
        format!("{r:02x}{g:02x}{b:02x}")
    }
}

/// The six target swatches; any of them may be missing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Palette {
    pub vibrant: Option<Swatch>,
    pub light_vibrant: Option<Swatch>,
    pub dark_vibrant: Option<Swatch>,
    pub muted: Option<Swatch>,
    pub light_muted: Option<Swatch>,
    pub dark_muted: Option<Swatch>,
}

impl Palette {
    fn contains(&self, swatch: &Swatch) -> bool {
        [
            &self.vibrant,
            &self.light_vibrant,
            &self.dark_vibrant,
            &self.muted,
            &self.light_muted,
            &self.dark_muted,
        ]
        .into_iter()
        .flatten()
        .any(|selected| selected == swatch)
    }
}

/// Acceptable ranges and targets for one palette slot
struct Target {
    luma: (f32, f32, f32),
    saturation: (f32, f32, f32),
}

impl Target {
    const VIBRANT: Target = Target {
        luma: (MIN_NORMAL_LUMA, TARGET_NORMAL_LUMA, MAX_NORMAL_LUMA),
        saturation: (MIN_VIBRANT_SATURATION, TARGET_VIBRANT_SATURATION, 1.0),
    };
    const LIGHT_VIBRANT: Target = Target {
        luma: (MIN_LIGHT_LUMA, TARGET_LIGHT_LUMA, 1.0),
        saturation: (MIN_VIBRANT_SATURATION, TARGET_VIBRANT_SATURATION, 1.0),
    };
    const DARK_VIBRANT: Target = Target {
        luma: (0.0, TARGET_DARK_LUMA, MAX_DARK_LUMA),
        saturation: (MIN_VIBRANT_SATURATION, TARGET_VIBRANT_SATURATION, 1.0),
    };
    const MUTED: Target = Target {
        luma: (MIN_NORMAL_LUMA, TARGET_NORMAL_LUMA, MAX_NORMAL_LUMA),
        saturation: (0.0, TARGET_MUTED_SATURATION, MAX_MUTED_SATURATION),
    };
    const LIGHT_MUTED: Target = Target {
        luma: (MIN_LIGHT_LUMA, TARGET_LIGHT_LUMA, 1.0),
        saturation: (0.0, TARGET_MUTED_SATURATION, MAX_MUTED_SATURATION),
    };
    const DARK_MUTED: Target = Target {
        luma: (0.0, TARGET_DARK_LUMA, MAX_DARK_LUMA),
        saturation: (0.0, TARGET_MUTED_SATURATION, MAX_MUTED_SATURATION),
    };

    fn accepts(&self, swatch: &Swatch) -> bool {
        let (min_l, _, max_l) = self.luma;
        let (min_s, _, max_s) = self.saturation;
        (min_s..=max_s).contains(&swatch.saturation) && (min_l..=max_l).contains(&swatch.lightness)
    }

    fn score(&self, swatch: &Swatch, max_population: u32) -> f32 {
        let invert_diff = |value: f32, target: f32| 1.0 - (value - target).abs();
        let population = swatch.population as f32 / max_population.max(1) as f32;

        let weighted = invert_diff(swatch.saturation, self.saturation.1) * WEIGHT_SATURATION
            + invert_diff(swatch.lightness, self.luma.1) * WEIGHT_LUMA
            + population * WEIGHT_POPULATION;
        weighted / (WEIGHT_SATURATION + WEIGHT_LUMA + WEIGHT_POPULATION)
    }

    /// Best unselected swatch inside this target's ranges
    fn find(&self, swatches: &[Swatch], palette: &Palette, max_population: u32) -> Option<Swatch> {
        let mut best: Option<(Swatch, f32)> = None;
        for swatch in swatches {
            if !self.accepts(swatch) || palette.contains(swatch) {
                continue;
            }
            let value = self.score(swatch, max_population);
            if best.map_or(true, |(_, best_value)| value > best_value) {
                best = Some((*swatch, value));
            }
        }
        best.map(|(swatch, _)| swatch)
    }
}

/// Assign swatches to the six targets in vibrant-first order
pub fn build_palette(swatches: &[Swatch]) -> Palette {
    let max_population = swatches.iter().map(|s| s.population).max().unwrap_or(1);
    let mut palette = Palette::default();

    palette.vibrant = Target::VIBRANT.find(swatches, &palette, max_population);
    palette.light_vibrant = Target::LIGHT_VIBRANT.find(swatches, &palette, max_population);
    palette.dark_vibrant = Target::DARK_VIBRANT.find(swatches, &palette, max_population);
    palette.muted = Target::MUTED.find(swatches, &palette, max_population);
    palette.light_muted = Target::LIGHT_MUTED.find(swatches, &palette, max_population);
    palette.dark_muted = Target::DARK_MUTED.find(swatches, &palette, max_population);

    palette
}

/// Quantize an RGBA raster into scored swatches
pub fn swatches_from_raster(raster: &image::RgbaImage) -> Vec<Swatch> {
    let pixels: Vec<[u8; 3]> = raster
        .pixels()
        .step_by(SAMPLE_QUALITY)
        .filter(|pixel| {
            let [r, g, b, a] = pixel.0;
            // Transparent and near-white pixels say nothing about the subject
            a >= MIN_ALPHA && !(r > 250 && g > 250 && b > 250)
        })
        .map(|pixel| [pixel.0[0], pixel.0[1], pixel.0[2]])
        .collect();

    quantize(&pixels, COLOR_COUNT)
        .into_iter()
        .map(Swatch::from_quantized)
        .collect()
}

/// Extract the muted swatch of an encoded image as lowercase hex
///
/// # Errors
/// * `ColorError::InvalidBuffer` - empty or undecodable input
/// * `ColorError::NoMutedSwatch` - no swatch falls in the muted ranges
pub fn extract_muted_color(bytes: &[u8]) -> Result<String, ColorError> {
    if bytes.is_empty() {
        return Err(ColorError::InvalidBuffer("buffer is empty".to_string()));
    }

    let raster = image::load_from_memory(bytes)
        .map_err(|e| ColorError::InvalidBuffer(e.to_string()))?
        .to_rgba8();

    let swatches = swatches_from_raster(&raster);
    build_palette(&swatches)
        .muted
        .map(|swatch| swatch.hex())
        .ok_or(ColorError::NoMutedSwatch)
}
