//! Recall: a personal flashcard store with day-granularity SM-2 scheduling.
//!
//! The library owns the data model, the scheduler and the SQLite store;
//! the `recall-cli` binary is a thin front end over it.

pub mod config;
pub mod flashcards;
