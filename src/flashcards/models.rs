//! Data models for the flashcard system

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Starting ease for every new card
pub const DEFAULT_EASE: f64 = 2.5;

/// Lowest ease a card may ever carry
pub const MIN_EASE: f64 = 1.3;

/// Current time at the precision the store persists (milliseconds)
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// A deck is a named collection of notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            created_at: now_millis(),
        }
    }
}

/// The two sides of a note
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFields {
    #[serde(default)]
    pub front: String,
    #[serde(default)]
    pub back: String,
}

impl NoteFields {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
        }
    }
}

/// A note holds the content; its single card holds the schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub fields: NoteFields,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(deck_id: Uuid, fields: NoteFields) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4(),
            deck_id,
            fields,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status of a card in the spaced repetition system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    /// Never reviewed
    New,
    /// Reviewed at least once
    Review,
    /// Excluded from review queues until unsuspended
    Suspended,
}

impl Default for CardStatus {
    fn default() -> Self {
        Self::New
    }
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Review => "review",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "review" => Some(Self::Review),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// Spaced repetition state of a card, the part the scheduler reads and writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardState {
    /// When the card is due for review
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub due: DateTime<Utc>,
    /// Current interval in days
    #[serde(default)]
    pub interval: u32,
    /// Ease factor, never below 1.3
    #[serde(default = "default_ease")]
    pub ease: f64,
    /// Successful reviews since the last lapse
    #[serde(default)]
    pub reps: u32,
    /// Number of failed reviews
    #[serde(default)]
    pub lapses: u32,
    #[serde(rename = "state", default)]
    pub status: CardStatus,
}

fn default_ease() -> f64 {
    DEFAULT_EASE
}

impl CardState {
    /// State of a card that has never been reviewed, due at `due`
    pub fn new(due: DateTime<Utc>) -> Self {
        Self {
            due,
            interval: 0,
            ease: DEFAULT_EASE,
            reps: 0,
            lapses: 0,
            status: CardStatus::New,
        }
    }

    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.status != CardStatus::Suspended && self.due <= now
    }
}

/// A card is owned by exactly one note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub note_id: Uuid,
    #[serde(flatten)]
    pub schedule: CardState,
}

impl Card {
    pub fn for_note(note: &Note) -> Self {
        Self {
            id: Uuid::new_v4(),
            deck_id: note.deck_id,
            note_id: note.id,
            schedule: CardState::new(note.created_at),
        }
    }
}

/// Ids produced by creating a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedNote {
    pub note_id: Uuid,
    pub card_id: Uuid,
}

/// Partial update of a card's scheduling fields
///
/// Unset fields are left as stored. `ease` is checked against the floor
/// before anything is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub due: Option<DateTime<Utc>>,
    pub interval: Option<u32>,
    pub ease: Option<f64>,
    pub reps: Option<u32>,
    pub lapses: Option<u32>,
    #[serde(rename = "state")]
    pub status: Option<CardStatus>,
}

impl CardPatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ease) = self.ease {
            if !ease.is_finite() {
                return Err(format!("ease must be a finite number, got {}", ease));
            }
            if ease < MIN_EASE {
                return Err(format!("ease {} is below the minimum of {}", ease, MIN_EASE));
            }
        }
        Ok(())
    }

    pub fn apply(&self, state: &mut CardState) {
        if let Some(due) = self.due {
            state.due = due;
        }
        if let Some(interval) = self.interval {
            state.interval = interval;
        }
        if let Some(ease) = self.ease {
            state.ease = ease;
        }
        if let Some(reps) = self.reps {
            state.reps = reps;
        }
        if let Some(lapses) = self.lapses {
            state.lapses = lapses;
        }
        if let Some(status) = self.status {
            state.status = status;
        }
    }
}

impl From<&CardState> for CardPatch {
    fn from(state: &CardState) -> Self {
        Self {
            due: Some(state.due),
            interval: Some(state.interval),
            ease: Some(state.ease),
            reps: Some(state.reps),
            lapses: Some(state.lapses),
            status: Some(state.status),
        }
    }
}

/// Card counts for a deck
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckStats {
    pub total: usize,
    pub new: usize,
    pub review: usize,
    pub suspended: usize,
    pub due: usize,
}

/// Row counts across the whole store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCounts {
    pub decks: usize,
    pub notes: usize,
    pub cards: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_serializes_flat() {
        let note = Note::new(Uuid::new_v4(), NoteFields::new("q", "a"));
        let card = Card::for_note(&note);

        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value["noteId"], note.id.to_string());
        assert_eq!(value["state"], "new");
        assert_eq!(value["ease"], 2.5);
        assert_eq!(value["due"], note.created_at.timestamp_millis());
    }

    #[test]
    fn test_patch_rejects_low_ease() {
        let patch = CardPatch {
            ease: Some(1.2),
            ..Default::default()
        };
        assert!(patch.validate().is_err());

        let patch = CardPatch {
            ease: Some(f64::NAN),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_patch_merges_only_set_fields() {
        let mut state = CardState::new(now_millis());
        let patch = CardPatch {
            reps: Some(3),
            status: Some(CardStatus::Suspended),
            ..Default::default()
        };
        patch.apply(&mut state);

        assert_eq!(state.reps, 3);
        assert_eq!(state.status, CardStatus::Suspended);
        assert_eq!(state.interval, 0);
        assert_eq!(state.ease, DEFAULT_EASE);
    }
}
