/// Crop module
///
/// This module handles everything between a downloaded original and its
/// encoded derivatives:
/// - Crop rectangle math (geometry.rs)
/// - Region-of-interest selection over detector output (detection.rs)
/// - Decoding, cropping and JPEG encoding per category (processor.rs)

pub mod detection;
pub mod geometry;
pub mod processor;
