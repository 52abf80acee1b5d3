//! Flashcards and spaced repetition for Recall
//!
//! This module provides:
//! - Deck, note and card models (one card per note)
//! - Day-granularity SM-2 scheduling
//! - A SQLite store with transactional cascades
//! - JSON snapshot and CSV note import/export

pub mod algorithm;
pub mod interchange;
pub mod models;
pub mod storage;

pub use algorithm::{schedule, Grade, InvalidGradeError};
pub use interchange::{CsvImportReport, CsvRowFailure, ExportMeta, JsonImportSummary, Snapshot};
pub use models::*;
pub use storage::{EntityKind, FlashcardStorage, FlashcardStorageError};
