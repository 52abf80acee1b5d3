use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::app::App;
use crate::{OutputFormat, TransferFormat};

pub fn run_export(app: &App, kind: TransferFormat, output: Option<&Path>) -> Result<()> {
    let text = match kind {
        TransferFormat::Json => app.storage.export_json_string()?,
        TransferFormat::Csv => app.storage.export_csv()?,
    };

    match output {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported to {}", path.display());
        }
        None => print!("{}", text),
    }

    Ok(())
}

fn read_input(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

pub fn run_import(
    app: &mut App,
    kind: TransferFormat,
    file: &Path,
    format: &OutputFormat,
) -> Result<()> {
    let text = read_input(file)?;

    match kind {
        TransferFormat::Json => {
            let summary = app
                .storage
                .import_json_str(&text)
                .context("JSON import failed; nothing was imported")?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Plain => {
                    println!(
                        "Imported {} decks, {} notes, {} cards",
                        summary.decks, summary.notes, summary.cards
                    );
                    if summary.generated_cards > 0 {
                        println!(
                            "  {} notes had no card and were given a new one",
                            summary.generated_cards
                        );
                    }
                }
            }
        }
        TransferFormat::Csv => {
            let report = app.storage.import_csv(&text).context("CSV import failed")?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Plain => {
                    println!(
                        "Imported {} notes ({} new decks), {} rows failed",
                        report.imported,
                        report.decks_created,
                        report.failed()
                    );
                    for failure in &report.failures {
                        println!("  line {}: {}", failure.line, failure.message);
                    }
                }
            }
        }
    }

    Ok(())
}
