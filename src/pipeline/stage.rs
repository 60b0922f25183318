/// Per-image fetch/transform stage
///
/// Pending -> Downloaded -> (Detected) -> Cropped -> Done. Any failure
/// turns the image into a [`ProcessedImageResult::Failure`] that records
/// the last stage it reached; siblings are never affected.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::crop::detection::{select_best, Detector};
use crate::crop::processor::transform_blocking;
use crate::error::ImageError;
use crate::pipeline::naming::{filename_from_url, queue_key};
use crate::state::data::{DerivedArtifact, ImageStage, ProcessedImageResult, SourceImageRef};
use crate::store::ObjectStore;

/// Collaborators shared by every image of a batch
#[derive(Clone)]
pub struct StageContext {
    pub store: Arc<dyn ObjectStore>,
    pub detector: Arc<dyn Detector>,
    pub config: Arc<PipelineConfig>,
}

/// Where one image currently is
struct Progress<'a> {
    source: &'a SourceImageRef,
    stage: ImageStage,
}

impl<'a> Progress<'a> {
    fn new(source: &'a SourceImageRef) -> Self {
        Self {
            source,
            stage: ImageStage::Pending,
        }
    }

    fn advance(&mut self, next: ImageStage) {
        debug!(
            category = %self.source.category,
            url = %self.source.original_url,
            from = %self.stage,
            to = %next,
            "Image stage"
        );
        self.stage = next;
    }
}

async fn run(
    ctx: &StageContext,
    progress: &mut Progress<'_>,
) -> Result<Vec<DerivedArtifact>, ImageError> {
    let source = progress.source;
    let filename = filename_from_url(&source.original_url);
    let key = queue_key(&ctx.config.storage, filename);

    let bytes = ctx.store.get(&key).await?;
    progress.advance(ImageStage::Downloaded);

    let region = if source.category.uses_detection() {
        let detections = ctx.detector.detect(&bytes, &ctx.config.detection).await?;
        let best = select_best(&detections);
        debug!(
            url = %source.original_url,
            candidates = detections.len(),
            found = best.is_some(),
            "Detection finished"
        );
        progress.advance(ImageStage::Detected);
        best.map(|b| b.region())
    } else {
        None
    };

    let artifacts = transform_blocking(
        source.category,
        bytes,
        region,
        ctx.config.crop,
        ctx.config.color_fallback.clone(),
    )
    .await?;
    progress.advance(ImageStage::Cropped);

    Ok(artifacts)
}

/// Download, detect and crop one original
pub async fn process_image(ctx: &StageContext, source: SourceImageRef) -> ProcessedImageResult {
    let mut progress = Progress::new(&source);

    match run(ctx, &mut progress).await {
        Ok(artifacts) => {
            progress.advance(ImageStage::Done);
            info!(
                category = %source.category,
                url = %source.original_url,
                artifacts = artifacts.len(),
                "Image processed"
            );
            ProcessedImageResult::Success {
                category: source.category,
                original_url: source.original_url.clone(),
                artifacts,
            }
        }
        Err(e) => {
            let failed_at = progress.stage;
            warn!(
                category = %source.category,
                url = %source.original_url,
                stage = %failed_at,
                error = %e,
                "Image failed"
            );
            ProcessedImageResult::Failure {
                category: source.category,
                original_url: source.original_url.clone(),
                failed_at,
                error_detail: e.to_string(),
            }
        }
    }
}
