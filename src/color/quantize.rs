/// Modified median cut quantization
///
/// Colors are reduced to 5 bits per channel and bucketed into a 32^3
/// histogram. Boxes over that histogram are split at the population
/// median along their longest axis, first by population, then by
/// population x volume, until the requested color count is reached.

use std::cmp::Ordering;

const SIGBITS: u32 = 5;
const RSHIFT: u32 = 8 - SIGBITS;
const SIDE: usize = 1 << SIGBITS;
/// Share of the color budget spent splitting by population alone
const FRACT_BY_POPULATION: f64 = 0.75;

/// A quantized color and how many sampled pixels fell into it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedColor {
    pub rgb: [u8; 3],
    pub population: u32,
}

#[inline]
fn index(r: usize, g: usize, b: usize) -> usize {
    (r << (2 * SIGBITS)) + (g << SIGBITS) + b
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Red,
    Green,
    Blue,
}

/// Axis-aligned box over the reduced color histogram (inclusive bounds)
#[derive(Debug, Clone, Copy)]
struct VBox {
    min: [usize; 3],
    max: [usize; 3],
    count: u64,
}

impl VBox {
    fn new(min: [usize; 3], max: [usize; 3], histogram: &[u32]) -> Self {
        let mut vbox = Self { min, max, count: 0 };
        vbox.count = vbox.population(histogram);
        vbox
    }

    fn is_empty_range(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    fn population(&self, histogram: &[u32]) -> u64 {
        if self.is_empty_range() {
            return 0;
        }
        let mut total = 0u64;
        for r in self.min[0]..=self.max[0] {
            for g in self.min[1]..=self.max[1] {
                for b in self.min[2]..=self.max[2] {
                    total += u64::from(histogram[index(r, g, b)]);
                }
            }
        }
        total
    }

    fn volume(&self) -> u64 {
        if self.is_empty_range() {
            return 0;
        }
        (0..3)
            .map(|axis| (self.max[axis] - self.min[axis] + 1) as u64)
            .product()
    }

    fn average(&self, histogram: &[u32]) -> [u8; 3] {
        let mult = f64::from(1u32 << RSHIFT);
        let mut total = 0f64;
        let mut sums = [0f64; 3];

        for r in self.min[0]..=self.max[0] {
            for g in self.min[1]..=self.max[1] {
                for b in self.min[2]..=self.max[2] {
                    let hits = f64::from(histogram[index(r, g, b)]);
                    if hits == 0.0 {
                        continue;
                    }
                    total += hits;
                    sums[0] += hits * (r as f64 + 0.5) * mult;
                    sums[1] += hits * (g as f64 + 0.5) * mult;
                    sums[2] += hits * (b as f64 + 0.5) * mult;
                }
            }
        }

        if total > 0.0 {
            sums.map(|sum| (sum / total).floor().clamp(0.0, 255.0) as u8)
        } else {
            let mut center = [0u8; 3];
            for axis in 0..3 {
                let mid = mult * (self.min[axis] + self.max[axis] + 1) as f64 / 2.0;
                center[axis] = mid.floor().clamp(0.0, 255.0) as u8;
            }
            center
        }
    }

    fn longest_axis(&self) -> Axis {
        let widths = [0, 1, 2].map(|axis| self.max[axis] - self.min[axis] + 1);
        let longest = widths.iter().copied().max().unwrap_or(1);
        if widths[0] == longest {
            Axis::Red
        } else if widths[1] == longest {
            Axis::Green
        } else {
            Axis::Blue
        }
    }

    /// Split at the population median of the longest axis
    fn split(&self, histogram: &[u32]) -> Option<(VBox, Option<VBox>)> {
        if self.count == 0 {
            return None;
        }
        if self.count == 1 {
            return Some((*self, None));
        }

        let axis = self.longest_axis() as usize;
        let (lo, hi) = (self.min[axis], self.max[axis]);

        // Cumulative population per slice along the axis; zero below `lo`
        let mut cumulative = vec![0u64; hi + 1];
        let mut total = 0u64;
        for slice in lo..=hi {
            let mut slab = *self;
            slab.min[axis] = slice;
            slab.max[axis] = slice;
            total += slab.population(histogram);
            cumulative[slice] = total;
        }

        let half = total as f64 / 2.0;
        let split_point = (lo..=hi).find(|&slice| cumulative[slice] as f64 > half)?;
        let remaining = |slice: usize| total - cumulative[slice];

        let left = split_point - lo;
        let right = hi - split_point;
        let mut cut = if left <= right {
            let candidate = split_point as f64 + right as f64 / 2.0;
            (hi.saturating_sub(1)).min(candidate.floor() as usize)
        } else {
            let candidate = split_point as f64 - 1.0 - left as f64 / 2.0;
            lo.max(candidate.max(0.0).floor() as usize).min(hi)
        };

        while cut < hi && cumulative[cut] == 0 {
            cut += 1;
        }
        let mut rest = remaining(cut);
        while rest == 0 && cut > 0 && cumulative[cut - 1] > 0 {
            cut -= 1;
            rest = remaining(cut);
        }

        let mut first = *self;
        first.max[axis] = cut;
        let mut second = *self;
        second.min[axis] = cut + 1;

        let first = VBox::new(first.min, first.max, histogram);
        let second = VBox::new(second.min, second.max, histogram);
        Some((first, (second.count > 0).then_some(second)))
    }
}

/// Split the box with the highest priority until `target` boxes exist.
///
/// Boxes that cannot be divided or trimmed any further are set aside so
/// the remaining ones keep splitting.
fn split_boxes<F>(boxes: &mut Vec<VBox>, target: usize, histogram: &[u32], priority: F)
where
    F: Fn(&VBox) -> u64,
{
    let mut settled = Vec::new();

    while boxes.len() + settled.len() < target {
        boxes.sort_by_key(|vbox| priority(vbox));
        let Some(vbox) = boxes.pop() else { break };

        match vbox.split(histogram) {
            Some((first, Some(second))) => {
                boxes.push(first);
                boxes.push(second);
            }
            Some((first, None)) if first.min != vbox.min || first.max != vbox.max => {
                boxes.push(first);
            }
            Some(_) | None => settled.push(vbox),
        }
    }

    boxes.append(&mut settled);
}

/// Quantize RGB samples into at most `max_colors` colors
pub fn quantize(pixels: &[[u8; 3]], max_colors: usize) -> Vec<QuantizedColor> {
    if pixels.is_empty() || max_colors == 0 {
        return Vec::new();
    }

    let mut histogram = vec![0u32; SIDE * SIDE * SIDE];
    let mut min = [SIDE - 1; 3];
    let mut max = [0usize; 3];
    for pixel in pixels {
        let reduced = pixel.map(|channel| (channel >> RSHIFT) as usize);
        histogram[index(reduced[0], reduced[1], reduced[2])] += 1;
        for axis in 0..3 {
            min[axis] = min[axis].min(reduced[axis]);
            max[axis] = max[axis].max(reduced[axis]);
        }
    }

    let mut boxes = vec![VBox::new(min, max, &histogram)];

    let by_population = ((FRACT_BY_POPULATION * max_colors as f64).ceil() as usize).max(1);
    split_boxes(&mut boxes, by_population, &histogram, |vbox| vbox.count);
    split_boxes(&mut boxes, max_colors, &histogram, |vbox| {
        vbox.count.saturating_mul(vbox.volume())
    });

    let mut colors: Vec<QuantizedColor> = boxes
        .iter()
        .filter(|vbox| vbox.count > 0)
        .map(|vbox| QuantizedColor {
            rgb: vbox.average(&histogram),
            population: u32::try_from(vbox.count).unwrap_or(u32::MAX),
        })
        .collect();

    colors.sort_by(|a, b| match b.population.cmp(&a.population) {
        Ordering::Equal => a.rgb.cmp(&b.rgb),
        other => other,
    });
    colors
}
