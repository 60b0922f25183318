/// Shared data structures for a batch invocation
///
/// These structs represent the data model that flows between
/// the fetch/transform stage, the orchestrator and the persistence layer.
/// Nothing here outlives a single batch.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which derivative set an uploaded image produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Thumbnail,
    Article,
    Product,
}

impl ImageCategory {
    /// Product and thumbnail originals run through detection and get archived
    pub fn uses_detection(self) -> bool {
        matches!(self, ImageCategory::Product | ImageCategory::Thumbnail)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageCategory::Thumbnail => "thumbnail",
            ImageCategory::Article => "article",
            ImageCategory::Product => "product",
        }
    }
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image referenced by an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImageRef {
    pub category: ImageCategory,
    /// URL as received; its last path segment is the queue filename
    pub original_url: String,
}

impl SourceImageRef {
    pub fn new(category: ImageCategory, original_url: impl Into<String>) -> Self {
        Self {
            category,
            original_url: original_url.into(),
        }
    }
}

/// Progress of a single image through the fetch/transform stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStage {
    Pending,
    Downloaded,
    Detected,
    Cropped,
    Done,
}

impl fmt::Display for ImageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageStage::Pending => "pending",
            ImageStage::Downloaded => "downloaded",
            ImageStage::Detected => "detected",
            ImageStage::Cropped => "cropped",
            ImageStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A single encoded derivative ready for upload
#[derive(Clone, PartialEq)]
pub struct DerivedArtifact {
    /// Encoded JPEG bytes
    pub bytes: Vec<u8>,
    /// Filename suffix, e.g. `-c(8a7f6e)-p` or `-w(800)-h(20000)-d(1-3)`
    pub suffix: String,
    pub width: u32,
    pub height: u32,
    /// 1-based tile number (always 1 for untiled artifacts)
    pub part: u32,
    pub total: u32,
}

// Byte buffers are noisy in logs
impl fmt::Debug for DerivedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedArtifact")
            .field("suffix", &self.suffix)
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("part", &self.part)
            .field("total", &self.total)
            .finish()
    }
}

/// Outcome of the fetch/transform stage for one image
#[derive(Debug, Clone)]
pub enum ProcessedImageResult {
    Success {
        category: ImageCategory,
        original_url: String,
        artifacts: Vec<DerivedArtifact>,
    },
    Failure {
        category: ImageCategory,
        original_url: String,
        /// Last stage the image reached before failing
        failed_at: ImageStage,
        error_detail: String,
    },
}

impl ProcessedImageResult {
    pub fn category(&self) -> ImageCategory {
        match self {
            ProcessedImageResult::Success { category, .. }
            | ProcessedImageResult::Failure { category, .. } => *category,
        }
    }

    pub fn original_url(&self) -> &str {
        match self {
            ProcessedImageResult::Success { original_url, .. }
            | ProcessedImageResult::Failure { original_url, .. } => original_url,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessedImageResult::Success { .. })
    }

    pub fn artifacts(&self) -> &[DerivedArtifact] {
        match self {
            ProcessedImageResult::Success { artifacts, .. } => artifacts,
            ProcessedImageResult::Failure { .. } => &[],
        }
    }
}

/// Public URLs grouped the way the persistence call expects them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUrls {
    pub thumbnail: Option<String>,
    /// Original URL -> first article artifact URL
    pub article: BTreeMap<String, String>,
    /// Original URL -> square crop URL
    pub product: BTreeMap<String, String>,
}

/// Payload for the persistence upsert, built once per batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQuery {
    pub booth_id: i64,
    pub urls: UpdateUrls,
}
