use std::io::{self, BufRead, Write};

use anyhow::Result;
use chrono::Local;

use recall_lib::flashcards::algorithm::{format_interval, preview_intervals};
use recall_lib::flashcards::{Card, Grade};

use crate::app::{parse_id, App};
use crate::render::terminal::{format_due, paint, rule, truncate, Color};
use crate::OutputFormat;

pub fn run_due(
    app: &App,
    deck: &str,
    limit: Option<usize>,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let deck = app.find_deck(deck)?;
    let limit = limit.unwrap_or(app.config.due_limit);
    let cards = app.storage.get_due_cards(deck.id, limit)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&cards)?),
        OutputFormat::Plain => {
            if cards.is_empty() {
                println!("Nothing due in \"{}\".", deck.name);
                return Ok(());
            }

            println!("{:<40} {:<9} {:>8} {}", "Front", "State", "Interval", "Card");
            println!("{}", rule(&[40, 9, 8, 36]));
            for card in &cards {
                let note = app.storage.get_note(card.note_id)?;
                println!(
                    "{:<40} {:<9} {:>8} {}",
                    truncate(&note.fields.front, 40),
                    card.schedule.status.as_str(),
                    format_interval(card.schedule.interval),
                    paint(&card.id.to_string(), Color::DIM, use_color)
                );
            }
        }
    }

    Ok(())
}

/// Read one trimmed line from stdin; `None` on end of input
fn prompt(message: &str) -> Result<Option<String>> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask until the user gives a grade; `None` means quit
fn ask_grade(card: &Card, use_color: bool) -> Result<Option<Grade>> {
    let previews = preview_intervals(&card.schedule, Local::now());
    let options: Vec<String> = Grade::ALL
        .iter()
        .zip(previews)
        .enumerate()
        .map(|(i, (grade, days))| format!("[{}] {} ({})", i + 1, grade, format_interval(days)))
        .collect();
    println!("{}", paint(&options.join("  "), Color::CYAN, use_color));

    loop {
        let Some(answer) = prompt("Grade (1-4, q to quit): ")? else {
            return Ok(None);
        };
        if answer.eq_ignore_ascii_case("q") {
            return Ok(None);
        }

        let parsed = match answer.parse::<i32>() {
            Ok(rating) => Grade::from_rating(rating),
            Err(_) => answer.parse::<Grade>(),
        };
        match parsed {
            Ok(grade) => return Ok(Some(grade)),
            Err(err) => println!("{}", paint(&err.to_string(), Color::RED, use_color)),
        }
    }
}

pub fn run_review(app: &mut App, deck: &str, limit: Option<usize>, use_color: bool) -> Result<()> {
    let deck = app.find_deck(deck)?;
    let mut reviewed = 0usize;

    println!("Reviewing \"{}\"", paint(&deck.name, Color::BOLD, use_color));

    loop {
        if limit.is_some_and(|max| reviewed >= max) {
            break;
        }
        let Some(card) = app.storage.get_random_due_card(deck.id)? else {
            println!("{}", paint("No more cards due.", Color::GREEN, use_color));
            break;
        };
        let note = app.storage.get_note(card.note_id)?;

        println!();
        println!("{}", paint(&note.fields.front, Color::BOLD, use_color));
        match prompt("Press Enter to show the answer (q to quit) ")? {
            Some(answer) if !answer.eq_ignore_ascii_case("q") => {}
            _ => break,
        }
        println!("{}", paint(&note.fields.back, Color::YELLOW, use_color));

        let Some(grade) = ask_grade(&card, use_color)? else {
            break;
        };
        let updated = app.storage.review_card(card.id, grade, Local::now())?;
        reviewed += 1;
        println!(
            "{}",
            paint(
                &format!("Next review: {}", format_due(updated.schedule.due)),
                Color::DIM,
                use_color
            )
        );
    }

    println!("Reviewed {} card{}.", reviewed, if reviewed == 1 { "" } else { "s" });
    Ok(())
}

pub fn run_suspend(app: &mut App, card: &str, suspend: bool, format: &OutputFormat) -> Result<()> {
    let card_id = parse_id(card, "card")?;
    let card = app.storage.set_suspended(card_id, suspend)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&card)?),
        OutputFormat::Plain => println!(
            "Card {} is now {}",
            card.id,
            card.schedule.status.as_str()
        ),
    }

    Ok(())
}
