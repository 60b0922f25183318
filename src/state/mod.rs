/// State management module
///
/// This module handles the batch data model and where results end up:
/// - Shared data structures (data.rs)
/// - SQLite catalog of published URLs (library.rs)

pub mod library;
pub mod data;
