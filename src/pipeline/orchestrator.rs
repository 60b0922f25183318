/// Batch orchestration
///
/// A batch runs in four phases:
/// 1. Fetch/transform every image concurrently; failures stay per image
/// 2. Upload every artifact and archive detected originals, all or nothing
/// 3. Delete the processed originals from the queue in one call
/// 4. Persist the public URLs; a failure here is only logged
///
/// The publish plan, the delete list and the update query are all pure
/// folds over the phase 1 results.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tracing::{error, info, warn};

use crate::config::{PipelineConfig, StorageLayout};
use crate::crop::detection::Detector;
use crate::error::{PipelineError, PublishError};
use crate::message::BatchMessage;
use crate::pipeline::naming::{
    artifact_filename, booth_key, build_update_query, filename_from_url, queue_key,
};
use crate::pipeline::stage::{process_image, StageContext};
use crate::sink::Persistence;
use crate::state::data::{ProcessedImageResult, UpdateQuery};
use crate::store::{relocate, ObjectStore};

/// One side effect of phase 2
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishTask {
    Upload { key: String, bytes: Vec<u8> },
    Relocate { from: String, to: String },
}

/// Everything a finished batch produced
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub booth_id: i64,
    pub results: Vec<ProcessedImageResult>,
    /// Queue keys removed in phase 3
    pub deleted: Vec<String>,
    pub query: UpdateQuery,
    pub persisted: bool,
}

impl BatchReport {
    pub fn successes(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.results.len() - self.successes()
    }
}

/// Uploads for every artifact and archive moves for detected originals
pub fn publish_plan(
    layout: &StorageLayout,
    booth_id: i64,
    results: &[ProcessedImageResult],
) -> Vec<PublishTask> {
    results
        .iter()
        .filter(|result| result.is_success())
        .flat_map(|result| {
            let filename = filename_from_url(result.original_url());

            let uploads = result.artifacts().iter().map(move |artifact| PublishTask::Upload {
                key: booth_key(
                    layout,
                    booth_id,
                    &artifact_filename(filename, &artifact.suffix),
                ),
                bytes: artifact.bytes.clone(),
            });

            let archive = result
                .category()
                .uses_detection()
                .then(|| PublishTask::Relocate {
                    from: queue_key(layout, filename),
                    to: booth_key(layout, booth_id, filename),
                });

            uploads.chain(archive)
        })
        .collect()
}

/// Queue keys of every successfully processed original
pub fn delete_list(layout: &StorageLayout, results: &[ProcessedImageResult]) -> Vec<String> {
    results
        .iter()
        .filter(|result| result.is_success())
        .map(|result| queue_key(layout, filename_from_url(result.original_url())))
        .collect()
}

/// Runs batches against injected collaborators
#[derive(Clone)]
pub struct Orchestrator {
    ctx: StageContext,
    persistence: Arc<dyn Persistence>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        detector: Arc<dyn Detector>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            ctx: StageContext {
                store,
                detector,
                config: Arc::new(config),
            },
            persistence,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    async fn run_task(&self, task: PublishTask) -> Result<(), PublishError> {
        let store = self.ctx.store.as_ref();
        match task {
            PublishTask::Upload { key, bytes } => store
                .put(&key, bytes)
                .await
                .map_err(|source| PublishError::Upload { key, source }),
            PublishTask::Relocate { from, to } => relocate(store, &from, &to)
                .await
                .map_err(|source| PublishError::Relocate { from, to, source }),
        }
    }

    /// Run one batch message through all four phases
    pub async fn process(&self, message: &BatchMessage) -> Result<BatchReport, PipelineError> {
        let booth_id = message.booth_id;
        let layout = &self.ctx.config.storage;
        let refs = message.refs();
        info!(booth_id, images = refs.len(), "Processing batch");

        // Phase 1
        let results: Vec<ProcessedImageResult> =
            join_all(refs.into_iter().map(|source| process_image(&self.ctx, source))).await;

        let plan = publish_plan(layout, booth_id, &results);
        let deleted = delete_list(layout, &results);
        let query = build_update_query(layout, booth_id, &results);

        // Phase 2
        let tasks = plan.len();
        try_join_all(plan.into_iter().map(|task| self.run_task(task)))
            .await
            .inspect_err(|e| error!(booth_id, error = %e, "Publishing failed, queue left untouched"))?;
        info!(booth_id, tasks, "Artifacts published");

        // Phase 3
        if !deleted.is_empty() {
            self.ctx
                .store
                .delete(&deleted)
                .await
                .map_err(PublishError::Cleanup)?;
            info!(booth_id, removed = deleted.len(), "Queue cleaned up");
        }

        // Phase 4
        let persisted = match self.persistence.update(&query).await {
            Ok(()) => true,
            Err(e) => {
                error!(booth_id, error = %e, "Failed to persist update query");
                false
            }
        };

        let report = BatchReport {
            booth_id,
            results,
            deleted,
            query,
            persisted,
        };
        if report.failures() > 0 {
            warn!(
                booth_id,
                succeeded = report.successes(),
                failed = report.failures(),
                "Batch finished with failed images"
            );
        } else {
            info!(booth_id, succeeded = report.successes(), "Batch finished");
        }

        Ok(report)
    }
}
