use anyhow::Result;
use serde::Serialize;

use recall_lib::flashcards::{Deck, DeckStats};

use crate::app::App;
use crate::render::terminal::{paint, rule, truncate, Color};
use crate::OutputFormat;

/// A deck with its counts, in the same wire shape as exported decks
#[derive(Serialize)]
struct DeckListing<'a> {
    #[serde(flatten)]
    deck: &'a Deck,
    stats: &'a DeckStats,
}

pub fn run_list(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let decks = app.storage.list_decks()?;
    let mut rows = Vec::with_capacity(decks.len());
    for deck in decks {
        let stats = app.storage.deck_stats(deck.id)?;
        rows.push((deck, stats));
    }

    match format {
        OutputFormat::Json => {
            let output: Vec<DeckListing> = rows
                .iter()
                .map(|(deck, stats)| DeckListing { deck, stats })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if rows.is_empty() {
                println!("No decks yet. Create one with `recall-cli deck create <name>`.");
                return Ok(());
            }

            let name_width = rows
                .iter()
                .map(|(d, _)| d.name.chars().count())
                .max()
                .unwrap_or(4)
                .clamp(4, 40);

            println!("{:<nw$} {:>6} {:>6} {:>6}", "Deck", "Cards", "New", "Due", nw = name_width);
            println!("{}", rule(&[name_width, 6, 6, 6]));
            for (deck, stats) in &rows {
                let due = format!("{:>6}", stats.due);
                let due = if stats.due > 0 {
                    paint(&due, Color::GREEN, use_color)
                } else {
                    due
                };
                println!(
                    "{:<nw$} {:>6} {:>6} {}",
                    truncate(&deck.name, name_width),
                    stats.total,
                    stats.new,
                    due,
                    nw = name_width
                );
            }
        }
    }

    Ok(())
}

pub fn run_create(app: &mut App, name: &str, format: &OutputFormat) -> Result<()> {
    let id = app.storage.create_deck(name)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "id": id.to_string(), "name": name });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Created deck \"{}\"", name);
            println!("  ID: {}", id);
        }
    }

    Ok(())
}

pub fn run_rename(app: &mut App, deck: &str, name: &str, format: &OutputFormat) -> Result<()> {
    let deck = app.find_deck(deck)?;
    app.storage.rename_deck(deck.id, name)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "id": deck.id.to_string(), "name": name });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => println!("Renamed \"{}\" to \"{}\"", deck.name, name),
    }

    Ok(())
}

pub fn run_delete(app: &mut App, deck: &str, format: &OutputFormat) -> Result<()> {
    let deck = app.find_deck(deck)?;
    let notes = app.storage.get_notes_by_deck(deck.id)?.len();
    app.storage.delete_deck(deck.id)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "id": deck.id.to_string(),
                "deletedNotes": notes,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Deleted deck \"{}\" and its {} notes", deck.name, notes)
        }
    }

    Ok(())
}

pub fn run_stats(app: &App, deck: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let deck = app.find_deck(deck)?;
    let stats = app.storage.deck_stats(deck.id)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Plain => {
            println!("{}", paint(&deck.name, Color::BOLD, use_color));
            println!("  Cards:     {}", stats.total);
            println!("  New:       {}", stats.new);
            println!("  Review:    {}", stats.review);
            println!("  Suspended: {}", stats.suspended);
            println!("  Due now:   {}", stats.due);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_listing_uses_export_timestamps() {
        let deck = Deck::new("Spanish".to_string());
        let stats = DeckStats {
            total: 3,
            due: 1,
            ..Default::default()
        };

        let value = serde_json::to_value(DeckListing { deck: &deck, stats: &stats }).unwrap();
        assert_eq!(value["id"], deck.id.to_string());
        assert_eq!(value["name"], "Spanish");
        assert_eq!(value["createdAt"], deck.created_at.timestamp_millis());
        assert_eq!(value["stats"]["total"], 3);
        assert_eq!(value["stats"]["due"], 1);
    }
}
