//! JSON snapshots and CSV note exchange
//!
//! JSON carries the whole store, schedules included, and imports as a single
//! transaction. CSV carries only `(deckName, front, back)` and imports row by
//! row; a bad row is reported and skipped while the others are kept.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::models::*;
use super::storage::{
    create_note_in, find_deck_by_name, insert_card, insert_deck, insert_note, FlashcardStorage,
    FlashcardStorageError, Result,
};

pub const EXPORT_APP: &str = "recall";
pub const EXPORT_VERSION: u32 = 1;

const CSV_HEADER: &str = "deckName,front,back";

/// Metadata stamped on every JSON export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMeta {
    pub app: String,
    pub version: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub exported_at: DateTime<Utc>,
}

/// Full copy of the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: ExportMeta,
    pub decks: Vec<Deck>,
    pub notes: Vec<Note>,
    pub cards: Vec<Card>,
}

/// What a JSON import inserted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonImportSummary {
    pub decks: usize,
    pub notes: usize,
    pub cards: usize,
    /// Cards generated for imported notes that arrived without one
    pub generated_cards: usize,
}

/// A CSV row that could not be imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvRowFailure {
    pub line: u64,
    pub message: String,
}

/// Outcome of a CSV import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvImportReport {
    pub imported: usize,
    pub decks_created: usize,
    pub failures: Vec<CsvRowFailure>,
}

impl CsvImportReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

// Import-side shapes. Old ids may be strings or numbers and are only used to
// resolve references inside the payload.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedDeck {
    #[serde(default)]
    id: Value,
    name: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedNote {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    deck_id: Value,
    #[serde(default)]
    fields: NoteFields,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedCard {
    #[serde(default)]
    note_id: Value,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    due: Option<DateTime<Utc>>,
    interval: Option<u32>,
    ease: Option<f64>,
    reps: Option<u32>,
    lapses: Option<u32>,
    state: Option<CardStatus>,
}

/// Parent of an imported card, after remapping
struct NewNote {
    note_id: Uuid,
    deck_id: Uuid,
    created_at: DateTime<Utc>,
}

fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl FlashcardStorage {
    // ==================== JSON ====================

    /// Snapshot every deck, note and card
    pub fn export_json(&self) -> Result<Snapshot> {
        let snapshot = Snapshot {
            meta: ExportMeta {
                app: EXPORT_APP.to_string(),
                version: EXPORT_VERSION,
                exported_at: now_millis(),
            },
            decks: self.list_decks()?,
            notes: self.list_all_notes()?,
            cards: self.list_all_cards()?,
        };

        log::info!(
            "Exported {} decks, {} notes, {} cards",
            snapshot.decks.len(),
            snapshot.notes.len(),
            snapshot.cards.len()
        );
        Ok(snapshot)
    }

    /// Snapshot as pretty-printed JSON text
    pub fn export_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_json()?)?)
    }

    /// Import a snapshot under fresh ids, all or nothing
    pub fn import_json(&mut self, snapshot: &Value) -> Result<JsonImportSummary> {
        for key in ["decks", "notes", "cards"] {
            match snapshot.get(key) {
                Some(Value::Array(_)) => {}
                Some(_) => {
                    return Err(FlashcardStorageError::Validation(format!(
                        "`{}` must be an array",
                        key
                    )))
                }
                None => {
                    return Err(FlashcardStorageError::Validation(format!(
                        "snapshot is missing `{}`",
                        key
                    )))
                }
            }
        }

        let tx = self.transaction()?;
        let summary = match import_snapshot(&tx, snapshot) {
            Ok(summary) => summary,
            Err(err) => {
                log::warn!("JSON import rolled back: {}", err);
                return Err(FlashcardStorageError::Import(Box::new(err)));
            }
        };
        tx.commit()
            .map_err(|e| FlashcardStorageError::Import(Box::new(e.into())))?;

        log::info!(
            "Imported {} decks, {} notes, {} cards",
            summary.decks,
            summary.notes,
            summary.cards + summary.generated_cards
        );
        Ok(summary)
    }

    /// Parse JSON text and import it
    pub fn import_json_str(&mut self, text: &str) -> Result<JsonImportSummary> {
        let snapshot: Value = serde_json::from_str(text)
            .map_err(|e| FlashcardStorageError::Validation(format!("not valid JSON: {}", e)))?;
        self.import_json(&snapshot)
    }

    // ==================== CSV ====================

    /// One row per note: deck name, front, back
    pub fn export_csv(&self) -> Result<String> {
        let mut stmt = self.connection().prepare(
            "SELECT d.name, n.front, n.back
             FROM notes n JOIN decks d ON d.id = n.deck_id
             ORDER BY d.created_at, d.rowid, n.created_at, n.rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = format!("{}\n", CSV_HEADER).into_bytes();
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .quote_style(csv::QuoteStyle::Always)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(&mut out);
            for (deck_name, front, back) in &rows {
                writer.write_record([deck_name, front, back])?;
            }
            writer.flush()?;
        }

        log::info!("Exported {} notes to CSV", rows.len());
        String::from_utf8(out).map_err(|e| FlashcardStorageError::Format(e.to_string()))
    }

    /// Import `deckName,front,back` rows, one transaction per row
    ///
    /// Decks are matched by exact name and created when missing. Rows that
    /// fail are logged and listed in the report; earlier rows stay imported.
    pub fn import_csv(&mut self, text: &str) -> Result<CsvImportReport> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let header = text.lines().next().unwrap_or_default();
        if normalize_header(header) != CSV_HEADER.to_ascii_lowercase() {
            return Err(FlashcardStorageError::Format(format!(
                "expected header `{}`, found `{}`",
                CSV_HEADER,
                header.trim()
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut report = CsvImportReport::default();
        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    let line = err.position().map(|p| p.line()).unwrap_or_default();
                    log::warn!("Skipping CSV line {}: {}", line, err);
                    report.failures.push(CsvRowFailure {
                        line,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let deck_name = record.get(0).unwrap_or_default();
            let fields = NoteFields::new(
                record.get(1).unwrap_or_default(),
                record.get(2).unwrap_or_default(),
            );

            match self.import_csv_row(deck_name, fields) {
                Ok(created_deck) => {
                    report.imported += 1;
                    if created_deck {
                        report.decks_created += 1;
                    }
                }
                Err(err) => {
                    log::warn!("Skipping CSV line {}: {}", line, err);
                    report.failures.push(CsvRowFailure {
                        line,
                        message: err.to_string(),
                    });
                }
            }
        }

        log::info!(
            "CSV import: {} rows imported, {} failed, {} decks created",
            report.imported,
            report.failed(),
            report.decks_created
        );
        Ok(report)
    }

    /// Returns whether the row had to create its deck
    fn import_csv_row(&mut self, deck_name: &str, fields: NoteFields) -> Result<bool> {
        if deck_name.trim().is_empty() {
            return Err(FlashcardStorageError::Validation(
                "row has no deck name".to_string(),
            ));
        }

        let tx = self.transaction()?;
        let (deck_id, created) = match find_deck_by_name(&tx, deck_name)? {
            Some(id) => (id, false),
            None => {
                let deck = Deck::new(deck_name.to_string());
                insert_deck(&tx, &deck)?;
                (deck.id, true)
            }
        };
        create_note_in(&tx, deck_id, fields)?;
        tx.commit()?;

        Ok(created)
    }
}

fn import_snapshot(conn: &Connection, snapshot: &Value) -> Result<JsonImportSummary> {
    let now = now_millis();
    let decks: Vec<ImportedDeck> = serde_json::from_value(snapshot["decks"].clone())?;
    let notes: Vec<ImportedNote> = serde_json::from_value(snapshot["notes"].clone())?;
    let cards: Vec<ImportedCard> = serde_json::from_value(snapshot["cards"].clone())?;

    let mut summary = JsonImportSummary::default();

    let mut deck_ids: HashMap<String, Uuid> = HashMap::new();
    for imported in decks {
        let deck = Deck {
            id: Uuid::new_v4(),
            name: imported.name,
            created_at: imported.created_at.unwrap_or(now),
        };
        insert_deck(conn, &deck)?;
        if let Some(key) = id_key(&imported.id) {
            deck_ids.insert(key, deck.id);
        }
        summary.decks += 1;
    }

    let mut new_notes: Vec<NewNote> = Vec::new();
    let mut note_index: HashMap<String, usize> = HashMap::new();
    for imported in notes {
        let deck_id = id_key(&imported.deck_id)
            .and_then(|key| deck_ids.get(&key).copied())
            .ok_or_else(|| {
                FlashcardStorageError::Validation(format!(
                    "note {} references unknown deck {}",
                    imported.id, imported.deck_id
                ))
            })?;

        let created_at = imported.created_at.unwrap_or(now);
        let note = Note {
            id: Uuid::new_v4(),
            deck_id,
            fields: imported.fields,
            created_at,
            updated_at: imported.updated_at.unwrap_or(created_at),
        };
        insert_note(conn, &note)?;
        if let Some(key) = id_key(&imported.id) {
            note_index.insert(key, new_notes.len());
        }
        new_notes.push(NewNote {
            note_id: note.id,
            deck_id,
            created_at,
        });
        summary.notes += 1;
    }

    let mut carded: HashSet<Uuid> = HashSet::new();
    for imported in cards {
        let parent = id_key(&imported.note_id)
            .and_then(|key| note_index.get(&key))
            .map(|&idx| &new_notes[idx])
            .ok_or_else(|| {
                FlashcardStorageError::Validation(format!(
                    "card references unknown note {}",
                    imported.note_id
                ))
            })?;
        if !carded.insert(parent.note_id) {
            return Err(FlashcardStorageError::Validation(format!(
                "note {} has more than one card",
                imported.note_id
            )));
        }

        let card = Card {
            id: Uuid::new_v4(),
            deck_id: parent.deck_id,
            note_id: parent.note_id,
            schedule: CardState {
                due: imported.due.unwrap_or(now),
                interval: imported.interval.unwrap_or(0),
                ease: imported.ease.unwrap_or(DEFAULT_EASE).max(MIN_EASE),
                reps: imported.reps.unwrap_or(0),
                lapses: imported.lapses.unwrap_or(0),
                status: imported.state.unwrap_or_default(),
            },
        };
        insert_card(conn, &card)?;
        summary.cards += 1;
    }

    // Every note needs its card, even when the payload left it out
    for parent in new_notes.iter().filter(|n| !carded.contains(&n.note_id)) {
        insert_card(
            conn,
            &Card {
                id: Uuid::new_v4(),
                deck_id: parent.deck_id,
                note_id: parent.note_id,
                schedule: CardState::new(parent.created_at),
            },
        )?;
        summary.generated_cards += 1;
    }

    Ok(summary)
}

/// Lowercase, quote-free, whitespace-trimmed header for comparison
fn normalize_header(header: &str) -> String {
    header
        .replace('"', "")
        .split(',')
        .map(|field| field.trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}
