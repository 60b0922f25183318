//! Error types for the crop pipeline
//!
//! Per-image errors ([`ImageError`]) are captured as failure results and
//! never abort a batch. [`PipelineError`] is what a batch invocation
//! reports when publishing or cleanup fails.

use thiserror::Error;

/// Object storage failures (get/put/copy/delete)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("storage I/O failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage backend rejected {operation} on {key}: {message}")]
    Backend {
        operation: &'static str,
        key: String,
        message: String,
    },
}

impl StorageError {
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }
}

/// Detector invocation failure. Zero detections is not an error.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    #[error("detector failed: {0}")]
    Inference(String),
}

/// Crop failures: undecodable input, empty source, encoding
#[derive(Error, Debug)]
pub enum CropError {
    #[error("image buffer is empty")]
    EmptyBuffer,

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("source image has no area ({width}x{height})")]
    EmptySource { width: u32, height: u32 },

    #[error("failed to encode crop: {0}")]
    Encode(#[source] image::ImageError),

    #[error("crop worker stopped: {0}")]
    Worker(String),
}

/// Color extraction failures, recovered by the caller with a fallback token
#[derive(Error, Debug)]
pub enum ColorError {
    #[error("invalid image buffer for color extraction: {0}")]
    InvalidBuffer(String),

    #[error("no muted swatch found in the palette")]
    NoMutedSwatch,
}

/// Why a single image failed in the fetch/transform stage
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("download failed: {0}")]
    Download(#[from] StorageError),

    #[error("detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("crop failed: {0}")]
    Crop(#[from] CropError),
}

/// Upload, relocation or queue cleanup failure. Fatal for the batch.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to upload {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to relocate {from} to {to}: {source}")]
    Relocate {
        from: String,
        to: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to clean up queue: {0}")]
    Cleanup(#[source] StorageError),
}

/// Persistence call failure. Logged, never fatal.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("catalog location unavailable: {0}")]
    Location(#[from] std::io::Error),

    #[error("rpc request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("rpc rejected update with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("persistence worker stopped: {0}")]
    Worker(String),
}

/// Inbound record could not be decoded
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("invalid message body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration loading or validation failure
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value: {parameter} = {value}")]
    InvalidParameter { parameter: &'static str, value: String },
}

/// Batch-level failure surfaced to the caller
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}
