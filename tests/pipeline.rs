use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use booth_cropper::config::{PipelineConfig, StorageLayout};
use booth_cropper::crop::detection::{DetectionOptions, Detector, RawDetection};
use booth_cropper::error::{DetectionError, PersistenceError, PipelineError, StorageError};
use booth_cropper::handler::handle_records;
use booth_cropper::sink::Persistence;
use booth_cropper::state::data::{ImageCategory, ImageStage, ProcessedImageResult, UpdateQuery};
use booth_cropper::store::ObjectStore;
use booth_cropper::{BatchMessage, Orchestrator};

const UPLOAD: &str = "https://uploads.example.com/queue";
const PUBLIC: &str = "https://cdn.example.com";

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    reject_puts: bool,
}

impl MemoryStore {
    fn with(objects: &[(&str, Vec<u8>)]) -> Self {
        let store = Self::default();
        {
            let mut map = store.objects.lock().unwrap();
            for (key, bytes) in objects {
                map.insert(key.to_string(), bytes.clone());
            }
        }
        store
    }

    fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { key: key.to_string() })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        if self.reject_puts {
            return Err(StorageError::Backend {
                operation: "put",
                key: key.to_string(),
                message: "access denied".to_string(),
            });
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().unwrap();
        let bytes = objects
            .get(from)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { key: from.to_string() })?;
        objects.insert(to.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}

/// Reports the whole image as one box, or fails
enum FakeDetector {
    FullImage { width: f64, height: f64 },
    Broken,
}

#[async_trait]
impl Detector for FakeDetector {
    async fn detect(
        &self,
        _image: &[u8],
        _options: &DetectionOptions,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        match self {
            FakeDetector::FullImage { width, height } => Ok(vec![RawDetection {
                bbox: [0.0, 0.0, *width, *height],
                confidence: 0.9,
                squareness: 0.8,
            }]),
            FakeDetector::Broken => Err(DetectionError::Inference("model crashed".to_string())),
        }
    }
}

#[derive(Default)]
struct RecordingPersistence {
    queries: Mutex<Vec<UpdateQuery>>,
    fail: bool,
}

#[async_trait]
impl Persistence for RecordingPersistence {
    async fn update(&self, query: &UpdateQuery) -> Result<(), PersistenceError> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail {
            return Err(PersistenceError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn config() -> PipelineConfig {
    PipelineConfig {
        storage: StorageLayout {
            public_base_url: PUBLIC.to_string(),
            ..StorageLayout::default()
        },
        ..PipelineConfig::default()
    }
}

fn orchestrator(
    store: Arc<MemoryStore>,
    detector: FakeDetector,
    persistence: Arc<RecordingPersistence>,
) -> Orchestrator {
    Orchestrator::new(config(), store, Arc::new(detector), persistence)
}

fn message(json: &str) -> BatchMessage {
    BatchMessage::from_json(json).unwrap()
}

fn suffix_of(result: &ProcessedImageResult, index: usize) -> String {
    result.artifacts()[index].suffix.clone()
}

#[tokio::test]
async fn test_product_with_full_image_box() {
    let store = Arc::new(MemoryStore::with(&[("queue/p.png", png(300, 200, [128, 120, 112]))]));
    let persistence = Arc::new(RecordingPersistence::default());
    let orchestrator = orchestrator(
        store.clone(),
        FakeDetector::FullImage { width: 300.0, height: 200.0 },
        persistence.clone(),
    );

    let report = orchestrator
        .process(&message(&format!(
            r#"{{"booth_id": 7, "images": {{"product": "{UPLOAD}/p.png"}}}}"#
        )))
        .await
        .unwrap();

    assert_eq!(report.successes(), 1);
    let result = &report.results[0];
    let square = suffix_of(result, 0);
    assert!(square.starts_with("-c(") && square.ends_with(')'));
    assert_eq!(suffix_of(result, 1), format!("{square}-p"));

    // Derivatives published, original archived and gone from the queue
    assert!(store.contains(&format!("booth/7/p{square}.jpg")));
    assert!(store.contains(&format!("booth/7/p{square}-p.jpg")));
    assert!(store.contains("booth/7/p.png"));
    assert!(!store.contains("queue/p.png"));
    assert_eq!(report.deleted, vec!["queue/p.png".to_string()]);

    assert!(report.persisted);
    let queries = persistence.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(
        queries[0].urls.product[&format!("{UPLOAD}/p.png")],
        format!("{PUBLIC}/booth/7/p{square}.jpg")
    );
}

#[tokio::test]
async fn test_tall_article_is_published_in_tiles() {
    let store = Arc::new(MemoryStore::with(&[("queue/a.png", png(4, 20_000, [220, 220, 220]))]));
    let persistence = Arc::new(RecordingPersistence::default());
    let orchestrator = orchestrator(store.clone(), FakeDetector::Broken, persistence.clone());

    let report = orchestrator
        .process(&message(&format!(
            r#"{{"booth_id": 3, "images": {{"article": ["{UPLOAD}/a.png"]}}}}"#
        )))
        .await
        .unwrap();

    // Articles never call the detector
    assert_eq!(report.successes(), 1);
    let artifacts = report.results[0].artifacts();
    let heights: Vec<u32> = artifacts.iter().map(|a| a.height).collect();
    assert_eq!(heights, vec![8192, 8192, 3616]);

    for part in 1..=3 {
        assert!(store.contains(&format!("booth/3/a-w(4)-h(20000)-d({part}-3).jpg")));
    }
    // Articles are not archived, only removed from the queue
    assert!(!store.contains("booth/3/a.png"));
    assert!(!store.contains("queue/a.png"));

    assert_eq!(
        report.query.urls.article[&format!("{UPLOAD}/a.png")],
        format!("{PUBLIC}/booth/3/a-w(4)-h(20000).jpg")
    );
}

#[tokio::test]
async fn test_failed_download_is_isolated() {
    let store = Arc::new(MemoryStore::with(&[
        ("queue/good.png", png(64, 48, [90, 90, 90])),
        ("queue/t.png", png(160, 80, [90, 90, 90])),
    ]));
    let persistence = Arc::new(RecordingPersistence::default());
    let orchestrator = orchestrator(
        store.clone(),
        FakeDetector::FullImage { width: 64.0, height: 48.0 },
        persistence,
    );

    let report = orchestrator
        .process(&message(&format!(
            r#"{{"booth_id": 11, "images": {{
                "thumbnail": "{UPLOAD}/t.png",
                "product": ["{UPLOAD}/missing.png", "{UPLOAD}/good.png"]
            }}}}"#
        )))
        .await
        .unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.successes(), 2);

    let failed = report
        .results
        .iter()
        .find(|r| !r.is_success())
        .unwrap();
    assert_eq!(failed.original_url(), format!("{UPLOAD}/missing.png"));
    assert!(matches!(
        failed,
        ProcessedImageResult::Failure { failed_at: ImageStage::Pending, .. }
    ));

    assert!(!report.query.urls.product.contains_key(&format!("{UPLOAD}/missing.png")));
    assert!(report.query.urls.product.contains_key(&format!("{UPLOAD}/good.png")));
    assert!(report.query.urls.thumbnail.is_some());
    assert_eq!(
        report.deleted,
        vec!["queue/t.png".to_string(), "queue/good.png".to_string()]
    );
    assert!(store.contains("booth/11/good.png"));
}

#[tokio::test]
async fn test_detector_failure_fails_only_that_image() {
    let store = Arc::new(MemoryStore::with(&[
        ("queue/p.png", png(32, 32, [90, 90, 90])),
        ("queue/a.png", png(32, 32, [90, 90, 90])),
    ]));
    let persistence = Arc::new(RecordingPersistence::default());
    let orchestrator = orchestrator(store.clone(), FakeDetector::Broken, persistence);

    let report = orchestrator
        .process(&message(&format!(
            r#"{{"booth_id": 2, "images": {{"article": "{UPLOAD}/a.png", "product": "{UPLOAD}/p.png"}}}}"#
        )))
        .await
        .unwrap();

    let product = report
        .results
        .iter()
        .find(|r| r.category() == ImageCategory::Product)
        .unwrap();
    match product {
        ProcessedImageResult::Failure { failed_at, error_detail, .. } => {
            assert_eq!(*failed_at, ImageStage::Downloaded);
            assert!(error_detail.contains("model crashed"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    // The failed original stays queued for a retry
    assert!(store.contains("queue/p.png"));
    assert!(!store.contains("queue/a.png"));
}

#[tokio::test]
async fn test_publish_failure_skips_cleanup_and_persistence() {
    let store = Arc::new(MemoryStore {
        reject_puts: true,
        ..MemoryStore::with(&[("queue/p.png", png(40, 40, [90, 90, 90]))])
    });
    let persistence = Arc::new(RecordingPersistence::default());
    let orchestrator = orchestrator(
        store.clone(),
        FakeDetector::FullImage { width: 40.0, height: 40.0 },
        persistence.clone(),
    );

    let err = orchestrator
        .process(&message(&format!(
            r#"{{"booth_id": 5, "images": {{"product": "{UPLOAD}/p.png"}}}}"#
        )))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Publish(_)));
    assert!(store.contains("queue/p.png"));
    assert!(persistence.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_persistence_failure_is_not_fatal() {
    let store = Arc::new(MemoryStore::with(&[("queue/a.png", png(20, 20, [90, 90, 90]))]));
    let persistence = Arc::new(RecordingPersistence {
        fail: true,
        ..Default::default()
    });
    let orchestrator = orchestrator(store.clone(), FakeDetector::Broken, persistence.clone());

    let report = orchestrator
        .process(&message(&format!(
            r#"{{"booth_id": 9, "images": {{"article": "{UPLOAD}/a.png"}}}}"#
        )))
        .await
        .unwrap();

    assert!(!report.persisted);
    assert_eq!(persistence.queries.lock().unwrap().len(), 1);
    assert!(!store.contains("queue/a.png"));
}

#[tokio::test]
async fn test_record_handler_responses() {
    let store = Arc::new(MemoryStore::with(&[("queue/a.png", png(20, 20, [90, 90, 90]))]));
    let orchestrator = orchestrator(
        store.clone(),
        FakeDetector::Broken,
        Arc::new(RecordingPersistence::default()),
    );

    let bodies = vec![
        format!(r#"{{"booth_id": 1, "images": {{"article": "{UPLOAD}/a.png"}}}}"#),
        "not json".to_string(),
        format!(r#"{{"booth_id": 1, "images": {{"product": "{UPLOAD}/gone.png"}}}}"#),
    ];
    let responses = handle_records(&orchestrator, bodies.as_slice()).await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].status_code, 200);
    assert_eq!(responses[0].body["message"], "Record processed successfully");

    assert_eq!(responses[1].status_code, 500);
    assert_eq!(responses[1].body["error"], "Failed to process record");
    assert!(responses[1].body["details"].is_string());

    // A missing image is a per-image failure, not a record failure
    assert_eq!(responses[2].status_code, 200);
    assert_eq!(store.keys(), vec!["booth/1/a-w(20)-h(20).jpg".to_string()]);
}
