//! Batch crop pipeline for event-booth photos
//!
//! A batch message names a booth and its uploaded originals. Each
//! original is downloaded from the queue, optionally run through a
//! region-of-interest detector, and cut into derivatives:
//! - product: a square crop and a crop around the detected region
//! - thumbnail: a 3:4 portrait crop
//! - article: full-width bands at most 8192 px tall
//!
//! Derivatives are published under the booth's prefix, originals are
//! archived or removed from the queue, and the public URLs are handed to
//! a [`sink::Persistence`] backend.

pub mod color;
pub mod config;
pub mod crop;
pub mod error;
pub mod handler;
pub mod message;
pub mod pipeline;
pub mod sink;
pub mod state;
pub mod store;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use message::BatchMessage;
pub use pipeline::{BatchReport, Orchestrator};
