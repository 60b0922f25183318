/// Region-of-interest detection
///
/// The model itself lives behind the [`Detector`] trait. This module
/// owns the request options and the rule that reduces a detector's raw
/// output to the single box the crops are centered on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crop::geometry::Region;
use crate::error::DetectionError;

/// Options passed with every detector call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOptions {
    /// Class labels the model was trained on
    pub labels: Vec<String>,
    pub iou_threshold: f32,
    pub confidence_threshold: f32,
    /// Model input size [width, height]
    pub target_size: [u32; 2],
    pub model_path: Option<String>,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            labels: vec!["head".to_string()],
            iou_threshold: 0.6,
            confidence_threshold: 0.25,
            target_size: [384, 384],
            model_path: None,
        }
    }
}

/// One box as reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// [x, y, w, h] in source pixels
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
    pub confidence: f64,
    pub squareness: f64,
}

impl RawDetection {
    #[inline]
    pub fn score(&self) -> f64 {
        self.confidence * self.squareness
    }
}

/// The selected region of interest with its detector scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub confidence: f64,
    pub squareness: f64,
}

impl DetectionBox {
    pub fn region(&self) -> Region {
        Region::new(self.x, self.y, self.w, self.h)
    }
}

impl From<&RawDetection> for DetectionBox {
    fn from(raw: &RawDetection) -> Self {
        let [x, y, w, h] = raw.bbox;
        Self {
            x,
            y,
            w,
            h,
            confidence: raw.confidence,
            squareness: raw.squareness,
        }
    }
}

/// Pick the detection with the highest confidence x squareness.
///
/// Ties keep the earliest detection. Returns `None` for an empty list.
pub fn select_best(detections: &[RawDetection]) -> Option<DetectionBox> {
    detections
        .iter()
        .reduce(|best, current| {
            if current.score() > best.score() {
                current
            } else {
                best
            }
        })
        .map(DetectionBox::from)
}

/// Object detection model invocation
#[async_trait]
pub trait Detector: Send + Sync {
    /// Run the model over encoded image bytes. An empty list is a valid result.
    async fn detect(
        &self,
        image: &[u8],
        options: &DetectionOptions,
    ) -> Result<Vec<RawDetection>, DetectionError>;
}

/// Detector that never finds anything; crops fall back to their default anchor
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDetector;

#[async_trait]
impl Detector for NullDetector {
    async fn detect(
        &self,
        _image: &[u8],
        _options: &DetectionOptions,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        Ok(Vec::new())
    }
}
