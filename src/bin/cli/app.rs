use std::path::Path;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use recall_lib::config::Config;
use recall_lib::flashcards::{Deck, FlashcardStorage};

/// Shared application state for CLI commands
pub struct App {
    pub config: Config,
    pub storage: FlashcardStorage,
}

impl App {
    /// Load the config and open the database (`database` overrides the config)
    pub fn new(database: Option<&Path>) -> Result<Self> {
        let config = Config::load().context("Failed to load config")?;
        let db_path = match database {
            Some(path) => path.to_path_buf(),
            None => config
                .database_path()
                .context("Failed to locate the database")?,
        };

        let storage = FlashcardStorage::open(&db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        log::debug!("Using database {}", db_path.display());

        Ok(Self { config, storage })
    }

    pub fn close(self) -> Result<()> {
        self.storage.close().context("Failed to close database")
    }

    /// Find a deck by id, exact name, or unique name prefix (case-insensitive)
    pub fn find_deck(&self, name_or_id: &str) -> Result<Deck> {
        if let Ok(id) = Uuid::parse_str(name_or_id) {
            return self
                .storage
                .get_deck(id)
                .with_context(|| format!("No deck with id {}", id));
        }

        let decks = self.storage.list_decks().context("Failed to list decks")?;
        let name_lower = name_or_id.to_lowercase();

        // Exact match first
        if let Some(deck) = decks.iter().find(|d| d.name.to_lowercase() == name_lower) {
            return Ok(deck.clone());
        }

        let matches: Vec<&Deck> = decks
            .iter()
            .filter(|d| d.name.to_lowercase().starts_with(&name_lower))
            .collect();

        match matches.len() {
            0 => bail!(
                "No deck matching '{}'. Available decks:\n{}",
                name_or_id,
                decks
                    .iter()
                    .map(|d| format!("  - {}", d.name))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            1 => Ok(matches[0].clone()),
            _ => bail!(
                "Ambiguous deck name '{}'. Matches:\n{}",
                name_or_id,
                matches
                    .iter()
                    .map(|d| format!("  - {} ({})", d.name, d.id))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        }
    }
}

/// Parse an id given on the command line
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid {} id: {}", what, raw))
}
