//! Storage operations for flashcards
//!
//! Everything lives in one SQLite database:
//! ```text
//! decks  (id, name, created_at)
//! notes  (id, deck_id -> decks, front, back, created_at, updated_at)
//! cards  (id, deck_id, note_id -> notes [unique], due, interval, ease, reps, lapses, state)
//! ```
//! Timestamps are stored as milliseconds since the Unix epoch. Mutations that
//! touch more than one row run inside a single transaction, so a reader never
//! sees a note without its card or a deck half deleted.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use rand::seq::SliceRandom;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Params, Row, Transaction};
use thiserror::Error;
use uuid::Uuid;

use super::algorithm::{schedule, Grade};
use super::models::*;

/// How many due cards `get_random_due_card` draws from.
///
/// The pick is uniform over this window only, so it is not uniform over the
/// whole due set once a deck has more than this many due cards.
pub const RANDOM_SCAN_LIMIT: usize = 100;

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS decks (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS notes (
        id TEXT PRIMARY KEY,
        deck_id TEXT NOT NULL REFERENCES decks(id),
        front TEXT NOT NULL,
        back TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS cards (
        id TEXT PRIMARY KEY,
        deck_id TEXT NOT NULL REFERENCES decks(id),
        note_id TEXT NOT NULL UNIQUE REFERENCES notes(id),
        due INTEGER NOT NULL,
        interval INTEGER NOT NULL,
        ease REAL NOT NULL,
        reps INTEGER NOT NULL,
        lapses INTEGER NOT NULL,
        state TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_decks_name ON decks(name);
    CREATE INDEX IF NOT EXISTS idx_notes_deck_id ON notes(deck_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_cards_deck_due ON cards(deck_id, due);
"#;

const DECK_COLUMNS: &str = "id, name, created_at";
const NOTE_COLUMNS: &str = "id, deck_id, front, back, created_at, updated_at";
const CARD_COLUMNS: &str = "id, deck_id, note_id, due, interval, ease, reps, lapses, state";

/// Which kind of entity a lookup missed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Deck,
    Note,
    Card,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deck => "Deck",
            Self::Note => "Note",
            Self::Card => "Card",
        })
    }
}

#[derive(Error, Debug)]
pub enum FlashcardStorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Import failed: {0}")]
    Import(#[source] Box<FlashcardStorageError>),
}

impl FlashcardStorageError {
    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }
}

pub type Result<T> = std::result::Result<T, FlashcardStorageError>;

/// Handle to an open flashcard database
pub struct FlashcardStorage {
    conn: Connection,
}

impl FlashcardStorage {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        log::debug!("Opened flashcard database at {}", path.display());
        Self::init(conn)
    }

    /// Open a database that lives only as long as the handle
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Close the database, surfacing any error SQLite reports on close
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }

    pub(super) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(super) fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    // ==================== Deck Operations ====================

    /// Create a new deck and return its id
    pub fn create_deck(&mut self, name: &str) -> Result<Uuid> {
        let deck = Deck::new(name.to_string());
        insert_deck(&self.conn, &deck)?;
        log::debug!("Created deck {} ({:?})", deck.id, deck.name);
        Ok(deck.id)
    }

    /// List all decks, oldest first
    pub fn list_decks(&self) -> Result<Vec<Deck>> {
        let sql = format!("SELECT {} FROM decks ORDER BY created_at, rowid", DECK_COLUMNS);
        query_all(&self.conn, &sql, [], row_to_deck)
    }

    /// Get a specific deck
    pub fn get_deck(&self, deck_id: Uuid) -> Result<Deck> {
        find_deck(&self.conn, deck_id)?
            .ok_or_else(|| FlashcardStorageError::not_found(EntityKind::Deck, deck_id))
    }

    /// Rename a deck
    pub fn rename_deck(&mut self, deck_id: Uuid, name: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE decks SET name = ?1 WHERE id = ?2",
            params![name, deck_id.to_string()],
        )?;
        if updated == 0 {
            return Err(FlashcardStorageError::not_found(EntityKind::Deck, deck_id));
        }
        Ok(())
    }

    /// Delete a deck together with all of its notes and cards
    pub fn delete_deck(&mut self, deck_id: Uuid) -> Result<()> {
        let id = deck_id.to_string();
        let tx = self.conn.transaction()?;

        if find_deck(&tx, deck_id)?.is_none() {
            return Err(FlashcardStorageError::not_found(EntityKind::Deck, deck_id));
        }

        let cards = tx.execute(
            "DELETE FROM cards WHERE deck_id = ?1
                OR note_id IN (SELECT id FROM notes WHERE deck_id = ?1)",
            params![id],
        )?;
        let notes = tx.execute("DELETE FROM notes WHERE deck_id = ?1", params![id])?;
        tx.execute("DELETE FROM decks WHERE id = ?1", params![id])?;
        tx.commit()?;

        log::info!(
            "Deleted deck {} with {} notes and {} cards",
            deck_id,
            notes,
            cards
        );
        Ok(())
    }

    /// Card counts for a deck
    pub fn deck_stats(&self, deck_id: Uuid) -> Result<DeckStats> {
        self.get_deck(deck_id)?;
        let now = Utc::now();

        let stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(state = 'new'), 0),
                    COALESCE(SUM(state = 'review'), 0),
                    COALESCE(SUM(state = 'suspended'), 0),
                    COALESCE(SUM(state != 'suspended' AND due <= ?2), 0)
             FROM cards WHERE deck_id = ?1",
            params![deck_id.to_string(), now.timestamp_millis()],
            |row| {
                Ok(DeckStats {
                    total: row.get::<_, i64>(0)? as usize,
                    new: row.get::<_, i64>(1)? as usize,
                    review: row.get::<_, i64>(2)? as usize,
                    suspended: row.get::<_, i64>(3)? as usize,
                    due: row.get::<_, i64>(4)? as usize,
                })
            },
        )?;
        Ok(stats)
    }

    // ==================== Note Operations ====================

    /// Create a note and its card in one step
    pub fn create_note(&mut self, deck_id: Uuid, fields: NoteFields) -> Result<CreatedNote> {
        let tx = self.conn.transaction()?;
        let created = create_note_in(&tx, deck_id, fields)?;
        tx.commit()?;
        Ok(created)
    }

    /// Get a specific note
    pub fn get_note(&self, note_id: Uuid) -> Result<Note> {
        let sql = format!("SELECT {} FROM notes WHERE id = ?1", NOTE_COLUMNS);
        self.conn
            .query_row(&sql, params![note_id.to_string()], row_to_note)
            .optional()?
            .ok_or_else(|| FlashcardStorageError::not_found(EntityKind::Note, note_id))
    }

    /// Replace a note's fields; its card keeps its schedule
    pub fn update_note(&mut self, note_id: Uuid, fields: NoteFields) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE notes SET front = ?1, back = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                fields.front,
                fields.back,
                now_millis().timestamp_millis(),
                note_id.to_string()
            ],
        )?;
        if updated == 0 {
            return Err(FlashcardStorageError::not_found(EntityKind::Note, note_id));
        }
        Ok(())
    }

    /// Delete a note and its card
    pub fn delete_note(&mut self, note_id: Uuid) -> Result<()> {
        let id = note_id.to_string();
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM cards WHERE note_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
        if deleted == 0 {
            // Dropping the transaction rolls back the card delete
            return Err(FlashcardStorageError::not_found(EntityKind::Note, note_id));
        }

        tx.commit()?;
        log::debug!("Deleted note {}", note_id);
        Ok(())
    }

    /// Notes in a deck, most recently created first
    pub fn get_notes_by_deck(&self, deck_id: Uuid) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {} FROM notes WHERE deck_id = ?1 ORDER BY created_at DESC, rowid DESC",
            NOTE_COLUMNS
        );
        query_all(&self.conn, &sql, params![deck_id.to_string()], row_to_note)
    }

    /// Every note in the store, in creation order
    pub fn list_all_notes(&self) -> Result<Vec<Note>> {
        let sql = format!("SELECT {} FROM notes ORDER BY created_at, rowid", NOTE_COLUMNS);
        query_all(&self.conn, &sql, [], row_to_note)
    }

    // ==================== Card Operations ====================

    /// Get a specific card
    pub fn get_card(&self, card_id: Uuid) -> Result<Card> {
        find_card(&self.conn, card_id)?
            .ok_or_else(|| FlashcardStorageError::not_found(EntityKind::Card, card_id))
    }

    /// Get the card that belongs to a note
    pub fn get_card_for_note(&self, note_id: Uuid) -> Result<Card> {
        let sql = format!("SELECT {} FROM cards WHERE note_id = ?1", CARD_COLUMNS);
        self.conn
            .query_row(&sql, params![note_id.to_string()], row_to_card)
            .optional()?
            .ok_or_else(|| FlashcardStorageError::not_found(EntityKind::Note, note_id))
    }

    /// Every card in the store, in creation order
    pub fn list_all_cards(&self) -> Result<Vec<Card>> {
        let sql = format!("SELECT {} FROM cards ORDER BY rowid", CARD_COLUMNS);
        query_all(&self.conn, &sql, [], row_to_card)
    }

    /// Merge a patch onto a stored card and return the result
    pub fn update_card(&mut self, card_id: Uuid, patch: &CardPatch) -> Result<Card> {
        patch.validate().map_err(FlashcardStorageError::Validation)?;

        let tx = self.conn.transaction()?;
        let mut card = find_card(&tx, card_id)?
            .ok_or_else(|| FlashcardStorageError::not_found(EntityKind::Card, card_id))?;

        patch.apply(&mut card.schedule);
        card.schedule.due = card.schedule.due.trunc_subsecs(3);

        let state = &card.schedule;
        tx.execute(
            "UPDATE cards SET due = ?1, interval = ?2, ease = ?3, reps = ?4, lapses = ?5, state = ?6
             WHERE id = ?7",
            params![
                state.due.timestamp_millis(),
                state.interval,
                state.ease,
                state.reps,
                state.lapses,
                state.status.as_str(),
                card_id.to_string()
            ],
        )?;
        tx.commit()?;

        Ok(card)
    }

    /// Grade a card at `now` and persist the new schedule
    pub fn review_card<Tz: TimeZone>(
        &mut self,
        card_id: Uuid,
        grade: Grade,
        now: DateTime<Tz>,
    ) -> Result<Card> {
        let card = self.get_card(card_id)?;
        let next = schedule(&card.schedule, grade, now);
        log::debug!(
            "Reviewed card {} as {}: interval {} -> {} days",
            card_id,
            grade,
            card.schedule.interval,
            next.interval
        );
        self.update_card(card_id, &CardPatch::from(&next))
    }

    /// Suspend a card, or return it to the review queue
    pub fn set_suspended(&mut self, card_id: Uuid, suspended: bool) -> Result<Card> {
        let card = self.get_card(card_id)?;
        let status = if suspended {
            CardStatus::Suspended
        } else if card.schedule.status != CardStatus::Suspended {
            card.schedule.status
        } else if card.schedule.reps > 0 || card.schedule.lapses > 0 {
            CardStatus::Review
        } else {
            CardStatus::New
        };

        self.update_card(
            card_id,
            &CardPatch {
                status: Some(status),
                ..Default::default()
            },
        )
    }

    // ==================== Review Queue ====================

    /// Due, unsuspended cards in a deck, at most `limit` of them, most
    /// overdue first
    pub fn get_due_cards(&self, deck_id: Uuid, limit: usize) -> Result<Vec<Card>> {
        self.get_due_cards_at(deck_id, limit, Utc::now())
    }

    pub fn get_due_cards_at(
        &self,
        deck_id: Uuid,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Card>> {
        let sql = format!(
            "SELECT {} FROM cards
             WHERE deck_id = ?1 AND state != 'suspended' AND due <= ?2
             ORDER BY due, rowid
             LIMIT ?3",
            CARD_COLUMNS
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        query_all(
            &self.conn,
            &sql,
            params![deck_id.to_string(), now.timestamp_millis(), limit],
            row_to_card,
        )
    }

    /// A random card among the deck's most overdue cards, if any are due
    pub fn get_random_due_card(&self, deck_id: Uuid) -> Result<Option<Card>> {
        self.get_random_due_card_at(deck_id, Utc::now())
    }

    pub fn get_random_due_card_at(
        &self,
        deck_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Card>> {
        let due = self.get_due_cards_at(deck_id, RANDOM_SCAN_LIMIT, now)?;
        Ok(due.choose(&mut rand::thread_rng()).cloned())
    }

    /// Row counts across all three collections
    pub fn counts(&self) -> Result<EntityCounts> {
        let count = |table: &str| -> Result<usize> {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(EntityCounts {
            decks: count("decks")?,
            notes: count("notes")?,
            cards: count("cards")?,
        })
    }
}

// ==================== Row Helpers ====================

pub(super) fn insert_deck(conn: &Connection, deck: &Deck) -> Result<()> {
    conn.execute(
        "INSERT INTO decks (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![
            deck.id.to_string(),
            deck.name,
            deck.created_at.timestamp_millis()
        ],
    )?;
    Ok(())
}

pub(super) fn insert_note(conn: &Connection, note: &Note) -> Result<()> {
    conn.execute(
        "INSERT INTO notes (id, deck_id, front, back, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            note.id.to_string(),
            note.deck_id.to_string(),
            note.fields.front,
            note.fields.back,
            note.created_at.timestamp_millis(),
            note.updated_at.timestamp_millis()
        ],
    )?;
    Ok(())
}

pub(super) fn insert_card(conn: &Connection, card: &Card) -> Result<()> {
    let state = &card.schedule;
    conn.execute(
        "INSERT INTO cards (id, deck_id, note_id, due, interval, ease, reps, lapses, state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            card.id.to_string(),
            card.deck_id.to_string(),
            card.note_id.to_string(),
            state.due.timestamp_millis(),
            state.interval,
            state.ease,
            state.reps,
            state.lapses,
            state.status.as_str()
        ],
    )?;
    Ok(())
}

/// Insert a note and its fresh card; the caller owns the transaction
pub(super) fn create_note_in(
    conn: &Connection,
    deck_id: Uuid,
    fields: NoteFields,
) -> Result<CreatedNote> {
    if find_deck(conn, deck_id)?.is_none() {
        return Err(FlashcardStorageError::not_found(EntityKind::Deck, deck_id));
    }

    let note = Note::new(deck_id, fields);
    let card = Card::for_note(&note);
    insert_note(conn, &note)?;
    insert_card(conn, &card)?;

    log::debug!("Created note {} with card {} in deck {}", note.id, card.id, deck_id);
    Ok(CreatedNote {
        note_id: note.id,
        card_id: card.id,
    })
}

pub(super) fn find_deck(conn: &Connection, deck_id: Uuid) -> Result<Option<Deck>> {
    let sql = format!("SELECT {} FROM decks WHERE id = ?1", DECK_COLUMNS);
    Ok(conn
        .query_row(&sql, params![deck_id.to_string()], row_to_deck)
        .optional()?)
}

/// Oldest deck with exactly this name
pub(super) fn find_deck_by_name(conn: &Connection, name: &str) -> Result<Option<Uuid>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM decks WHERE name = ?1 ORDER BY created_at, rowid LIMIT 1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    match id {
        Some(raw) => Ok(Some(parse_uuid(0, &raw)?)),
        None => Ok(None),
    }
}

fn find_card(conn: &Connection, card_id: Uuid) -> Result<Option<Card>> {
    let sql = format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS);
    Ok(conn
        .query_row(&sql, params![card_id.to_string()], row_to_card)
        .optional()?)
}

fn query_all<T, P, F>(conn: &Connection, sql: &str, params: P, map: F) -> Result<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map)?;
    Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
}

fn row_to_deck(row: &Row<'_>) -> rusqlite::Result<Deck> {
    Ok(Deck {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        created_at: timestamp_column(row, 2)?,
    })
}

fn row_to_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: uuid_column(row, 0)?,
        deck_id: uuid_column(row, 1)?,
        fields: NoteFields {
            front: row.get(2)?,
            back: row.get(3)?,
        },
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

fn row_to_card(row: &Row<'_>) -> rusqlite::Result<Card> {
    let raw_state: String = row.get(8)?;
    let status = CardStatus::parse(&raw_state).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            Type::Text,
            format!("unknown card state {:?}", raw_state).into(),
        )
    })?;

    Ok(Card {
        id: uuid_column(row, 0)?,
        deck_id: uuid_column(row, 1)?,
        note_id: uuid_column(row, 2)?,
        schedule: CardState {
            due: timestamp_column(row, 3)?,
            interval: row.get(4)?,
            ease: row.get(5)?,
            reps: row.get(6)?,
            lapses: row.get(7)?,
            status,
        },
    })
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    parse_uuid(idx, &raw)
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn create_test_storage() -> (FlashcardStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FlashcardStorage::open(temp_dir.path().join("cards.db")).unwrap();
        (storage, temp_dir)
    }

    fn fields(front: &str, back: &str) -> NoteFields {
        NoteFields::new(front, back)
    }

    #[test]
    fn test_create_and_rename_deck() {
        let (mut storage, _temp) = create_test_storage();

        let id = storage.create_deck("Spanish").unwrap();
        storage.create_deck("Spanish").unwrap();
        assert_eq!(storage.list_decks().unwrap().len(), 2);

        storage.rename_deck(id, "Español").unwrap();
        assert_eq!(storage.get_deck(id).unwrap().name, "Español");
    }

    #[test]
    fn test_rename_missing_deck() {
        let (mut storage, _temp) = create_test_storage();
        let missing = Uuid::new_v4();

        let err = storage.rename_deck(missing, "Nope").unwrap_err();
        assert!(matches!(
            err,
            FlashcardStorageError::NotFound { kind: EntityKind::Deck, id } if id == missing
        ));
    }

    #[test]
    fn test_lookups_report_missing_entities() {
        let (mut storage, _temp) = create_test_storage();
        let missing = Uuid::new_v4();

        assert!(matches!(
            storage.get_deck(missing),
            Err(FlashcardStorageError::NotFound { kind: EntityKind::Deck, id }) if id == missing
        ));
        assert!(matches!(
            storage.get_note(missing),
            Err(FlashcardStorageError::NotFound { kind: EntityKind::Note, id }) if id == missing
        ));
        assert!(matches!(
            storage.get_card(missing),
            Err(FlashcardStorageError::NotFound { kind: EntityKind::Card, id }) if id == missing
        ));
        assert!(matches!(
            storage.get_card_for_note(missing),
            Err(FlashcardStorageError::NotFound { kind: EntityKind::Note, id }) if id == missing
        ));
        assert!(matches!(
            storage.update_card(missing, &CardPatch::default()),
            Err(FlashcardStorageError::NotFound { kind: EntityKind::Card, id }) if id == missing
        ));
    }

    #[test]
    fn test_create_note_creates_new_card() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Capitals").unwrap();

        let created = storage
            .create_note(deck_id, fields("France", "Paris"))
            .unwrap();

        let note = storage.get_note(created.note_id).unwrap();
        let card = storage.get_card(created.card_id).unwrap();
        assert_eq!(card.note_id, note.id);
        assert_eq!(card.deck_id, deck_id);
        assert_eq!(card.schedule.due, note.created_at);
        assert_eq!(card.schedule.interval, 0);
        assert_eq!(card.schedule.ease, DEFAULT_EASE);
        assert_eq!(card.schedule.reps, 0);
        assert_eq!(card.schedule.lapses, 0);
        assert_eq!(card.schedule.status, CardStatus::New);
    }

    #[test]
    fn test_create_note_in_missing_deck() {
        let (mut storage, _temp) = create_test_storage();

        let result = storage.create_note(Uuid::new_v4(), fields("a", "b"));
        assert!(matches!(
            result,
            Err(FlashcardStorageError::NotFound { kind: EntityKind::Deck, .. })
        ));
        assert_eq!(storage.counts().unwrap(), EntityCounts::default());
    }

    #[test]
    fn test_update_note_keeps_schedule() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Capitals").unwrap();
        let created = storage.create_note(deck_id, fields("Peru", "Lima")).unwrap();

        let reviewed = storage
            .review_card(created.card_id, Grade::Good, Utc::now())
            .unwrap();
        storage
            .update_note(created.note_id, fields("Peru?", "Lima!"))
            .unwrap();

        let note = storage.get_note(created.note_id).unwrap();
        assert_eq!(note.fields, fields("Peru?", "Lima!"));
        assert!(note.updated_at >= note.created_at);
        assert_eq!(storage.get_card(created.card_id).unwrap(), reviewed);
    }

    #[test]
    fn test_update_missing_note() {
        let (mut storage, _temp) = create_test_storage();
        let result = storage.update_note(Uuid::new_v4(), fields("a", "b"));
        assert!(matches!(result, Err(FlashcardStorageError::NotFound { .. })));
    }

    #[test]
    fn test_delete_note_removes_card() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        let keep = storage.create_note(deck_id, fields("keep", "1")).unwrap();
        let gone = storage.create_note(deck_id, fields("gone", "2")).unwrap();

        storage.delete_note(gone.note_id).unwrap();

        assert!(storage.get_note(gone.note_id).is_err());
        assert!(storage.get_card(gone.card_id).is_err());
        assert!(storage.get_card(keep.card_id).is_ok());
        let counts = storage.counts().unwrap();
        assert_eq!((counts.notes, counts.cards), (1, 1));
    }

    #[test]
    fn test_delete_missing_note_changes_nothing() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        storage.create_note(deck_id, fields("a", "b")).unwrap();

        assert!(storage.delete_note(Uuid::new_v4()).is_err());
        assert_eq!(storage.counts().unwrap().cards, 1);
    }

    #[test]
    fn test_delete_deck_cascades() {
        let (mut storage, _temp) = create_test_storage();
        let doomed = storage.create_deck("Doomed").unwrap();
        let other = storage.create_deck("Other").unwrap();
        for i in 0..5 {
            storage
                .create_note(doomed, fields(&format!("q{}", i), "a"))
                .unwrap();
        }
        let survivor = storage.create_note(other, fields("stay", "here")).unwrap();

        storage.delete_deck(doomed).unwrap();

        assert!(storage.get_deck(doomed).is_err());
        assert!(storage.get_notes_by_deck(doomed).unwrap().is_empty());
        assert_eq!(
            storage.counts().unwrap(),
            EntityCounts {
                decks: 1,
                notes: 1,
                cards: 1
            }
        );
        assert_eq!(storage.get_card(survivor.card_id).unwrap().deck_id, other);
        for card in storage.list_all_cards().unwrap() {
            assert!(storage.get_note(card.note_id).is_ok());
        }
    }

    #[test]
    fn test_delete_missing_deck() {
        let (mut storage, _temp) = create_test_storage();
        assert!(matches!(
            storage.delete_deck(Uuid::new_v4()),
            Err(FlashcardStorageError::NotFound { kind: EntityKind::Deck, .. })
        ));
    }

    #[test]
    fn test_notes_newest_first() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        let first = storage.create_note(deck_id, fields("1", "")).unwrap();
        let second = storage.create_note(deck_id, fields("2", "")).unwrap();
        let third = storage.create_note(deck_id, fields("3", "")).unwrap();

        let ids: Vec<Uuid> = storage
            .get_notes_by_deck(deck_id)
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![third.note_id, second.note_id, first.note_id]);
    }

    #[test]
    fn test_due_cards_filter() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        let other = storage.create_deck("Other").unwrap();

        let due = storage.create_note(deck_id, fields("due", "")).unwrap();
        let future = storage.create_note(deck_id, fields("future", "")).unwrap();
        let suspended = storage.create_note(deck_id, fields("suspended", "")).unwrap();
        storage.create_note(other, fields("elsewhere", "")).unwrap();

        let now = Utc::now() + Duration::seconds(1);
        storage
            .update_card(
                future.card_id,
                &CardPatch {
                    due: Some(now + Duration::days(3)),
                    ..Default::default()
                },
            )
            .unwrap();
        storage.set_suspended(suspended.card_id, true).unwrap();

        let cards = storage.get_due_cards_at(deck_id, 10, now).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, due.card_id);
        for card in &cards {
            assert_ne!(card.schedule.status, CardStatus::Suspended);
            assert!(card.schedule.due <= now);
        }
    }

    #[test]
    fn test_due_cards_limit() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        for i in 0..7 {
            storage.create_note(deck_id, fields(&i.to_string(), "")).unwrap();
        }

        let now = Utc::now() + Duration::seconds(1);
        assert_eq!(storage.get_due_cards_at(deck_id, 3, now).unwrap().len(), 3);
        assert_eq!(storage.get_due_cards_at(deck_id, 50, now).unwrap().len(), 7);
        assert!(storage.get_due_cards_at(deck_id, 0, now).unwrap().is_empty());
    }

    #[test]
    fn test_due_cards_most_overdue_first() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        let now = Utc::now() + Duration::seconds(1);

        let mut created = Vec::new();
        for (front, days_overdue) in [("recent", 1), ("oldest", 9), ("middle", 4)] {
            let note = storage.create_note(deck_id, fields(front, "")).unwrap();
            storage
                .update_card(
                    note.card_id,
                    &CardPatch {
                        due: Some(now - Duration::days(days_overdue)),
                        ..Default::default()
                    },
                )
                .unwrap();
            created.push(note.card_id);
        }

        let ids: Vec<Uuid> = storage
            .get_due_cards_at(deck_id, 10, now)
            .unwrap()
            .iter()
            .map(|card| card.id)
            .collect();
        assert_eq!(ids, vec![created[1], created[2], created[0]]);

        let first = storage.get_due_cards_at(deck_id, 1, now).unwrap();
        assert_eq!(first[0].id, created[1]);
    }

    #[test]
    fn test_random_due_card() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        let now = Utc::now() + Duration::seconds(1);

        assert!(storage.get_random_due_card_at(deck_id, now).unwrap().is_none());

        let a = storage.create_note(deck_id, fields("a", "")).unwrap();
        let b = storage.create_note(deck_id, fields("b", "")).unwrap();
        for _ in 0..10 {
            let card = storage.get_random_due_card_at(deck_id, now).unwrap().unwrap();
            assert!(card.id == a.card_id || card.id == b.card_id);
        }
    }

    #[test]
    fn test_update_card_merges_patch() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        let created = storage.create_note(deck_id, fields("a", "b")).unwrap();

        let card = storage
            .update_card(
                created.card_id,
                &CardPatch {
                    interval: Some(12),
                    ease: Some(2.1),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(card.schedule.interval, 12);
        assert_eq!(card.schedule.ease, 2.1);
        assert_eq!(card.schedule.status, CardStatus::New);
        assert_eq!(storage.get_card(created.card_id).unwrap(), card);
    }

    #[test]
    fn test_update_card_rejects_invalid_patch() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        let created = storage.create_note(deck_id, fields("a", "b")).unwrap();

        let result = storage.update_card(
            created.card_id,
            &CardPatch {
                ease: Some(0.5),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(FlashcardStorageError::Validation(_))));
        assert_eq!(storage.get_card(created.card_id).unwrap().schedule.ease, DEFAULT_EASE);

        let missing = storage.update_card(Uuid::new_v4(), &CardPatch::default());
        assert!(matches!(
            missing,
            Err(FlashcardStorageError::NotFound { kind: EntityKind::Card, .. })
        ));
    }

    #[test]
    fn test_review_card_persists_schedule() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        let created = storage.create_note(deck_id, fields("a", "b")).unwrap();
        let now = Utc::now();

        let card = storage.review_card(created.card_id, Grade::Easy, now).unwrap();

        assert_eq!(card.schedule.interval, 4);
        assert_eq!(card.schedule.reps, 1);
        assert_eq!(card.schedule.status, CardStatus::Review);
        assert_eq!(card.schedule.due, (now + Duration::days(4)).trunc_subsecs(3));
        assert!(storage
            .get_due_cards_at(deck_id, 10, now + Duration::days(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unsuspend_restores_status() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        let fresh = storage.create_note(deck_id, fields("fresh", "")).unwrap();
        let seen = storage.create_note(deck_id, fields("seen", "")).unwrap();
        storage.review_card(seen.card_id, Grade::Again, Utc::now()).unwrap();

        for id in [fresh.card_id, seen.card_id] {
            storage.set_suspended(id, true).unwrap();
        }
        let stats = storage.deck_stats(deck_id).unwrap();
        assert_eq!(stats.suspended, 2);
        assert_eq!(stats.due, 0);

        assert_eq!(
            storage.set_suspended(fresh.card_id, false).unwrap().schedule.status,
            CardStatus::New
        );
        assert_eq!(
            storage.set_suspended(seen.card_id, false).unwrap().schedule.status,
            CardStatus::Review
        );
    }

    #[test]
    fn test_deck_stats() {
        let (mut storage, _temp) = create_test_storage();
        let deck_id = storage.create_deck("Deck").unwrap();
        storage.create_note(deck_id, fields("a", "")).unwrap();
        let reviewed = storage.create_note(deck_id, fields("b", "")).unwrap();
        storage.review_card(reviewed.card_id, Grade::Good, Utc::now()).unwrap();

        let stats = storage.deck_stats(deck_id).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.new, 1);
        assert_eq!(stats.review, 1);
        assert_eq!(stats.suspended, 0);
        assert_eq!(stats.due, 1);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("cards.db");

        let mut storage = FlashcardStorage::open(&path).unwrap();
        let deck_id = storage.create_deck("Persistent").unwrap();
        let created = storage.create_note(deck_id, fields("q", "a")).unwrap();
        storage.close().unwrap();

        let storage = FlashcardStorage::open(&path).unwrap();
        assert_eq!(storage.get_deck(deck_id).unwrap().name, "Persistent");
        assert_eq!(storage.get_card_for_note(created.note_id).unwrap().id, created.card_id);
    }
}
