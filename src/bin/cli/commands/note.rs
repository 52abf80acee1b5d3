use anyhow::{bail, Result};

use recall_lib::flashcards::NoteFields;

use crate::app::{parse_id, App};
use crate::render::terminal::{format_due, paint, rule, truncate, Color};
use crate::OutputFormat;

pub fn run_add(
    app: &mut App,
    deck: &str,
    front: String,
    back: String,
    format: &OutputFormat,
) -> Result<()> {
    let deck = app.find_deck(deck)?;
    let created = app.storage.create_note(deck.id, NoteFields { front, back })?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&created)?),
        OutputFormat::Plain => {
            println!("Added note to \"{}\"", deck.name);
            println!("  Note: {}", created.note_id);
            println!("  Card: {}", created.card_id);
        }
    }

    Ok(())
}

pub fn run_list(app: &App, deck: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let deck = app.find_deck(deck)?;
    let notes = app.storage.get_notes_by_deck(deck.id)?;

    match format {
        OutputFormat::Json => {
            let mut output = Vec::with_capacity(notes.len());
            for note in &notes {
                let card = app.storage.get_card_for_note(note.id)?;
                output.push(serde_json::json!({ "note": note, "card": card }));
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if notes.is_empty() {
                println!("No notes in \"{}\".", deck.name);
                return Ok(());
            }

            let (front_w, back_w, state_w, due_w) = (30, 30, 9, 16);
            println!(
                "{:<fw$} {:<bw$} {:<sw$} {:<dw$} {}",
                "Front",
                "Back",
                "State",
                "Due",
                "Note",
                fw = front_w,
                bw = back_w,
                sw = state_w,
                dw = due_w
            );
            println!("{}", rule(&[front_w, back_w, state_w, due_w, 36]));

            for note in &notes {
                let card = app.storage.get_card_for_note(note.id)?;
                let state = format!("{:<sw$}", card.schedule.status.as_str(), sw = state_w);
                println!(
                    "{:<fw$} {:<bw$} {} {:<dw$} {}",
                    truncate(&note.fields.front, front_w),
                    truncate(&note.fields.back, back_w),
                    state,
                    format_due(card.schedule.due),
                    paint(&note.id.to_string(), Color::DIM, use_color),
                    fw = front_w,
                    bw = back_w,
                    dw = due_w
                );
            }
        }
    }

    Ok(())
}

pub fn run_edit(
    app: &mut App,
    note: &str,
    front: Option<String>,
    back: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    if front.is_none() && back.is_none() {
        bail!("Nothing to change: pass --front and/or --back");
    }

    let note_id = parse_id(note, "note")?;
    let existing = app.storage.get_note(note_id)?;
    let fields = NoteFields {
        front: front.unwrap_or(existing.fields.front),
        back: back.unwrap_or(existing.fields.back),
    };
    app.storage.update_note(note_id, fields)?;

    match format {
        OutputFormat::Json => {
            let updated = app.storage.get_note(note_id)?;
            println!("{}", serde_json::to_string_pretty(&updated)?)
        }
        OutputFormat::Plain => println!("Updated note {}", note_id),
    }

    Ok(())
}

pub fn run_delete(app: &mut App, note: &str, format: &OutputFormat) -> Result<()> {
    let note_id = parse_id(note, "note")?;
    app.storage.delete_note(note_id)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "deleted": note_id.to_string() }))
        }
        OutputFormat::Plain => println!("Deleted note {}", note_id),
    }

    Ok(())
}
