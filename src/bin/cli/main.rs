mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "recall-cli", about = "Recall flashcards from the terminal", version)]
struct Cli {
    /// Use a specific database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum TransferFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Command {
    /// Deck management
    #[command(subcommand)]
    Deck(DeckCommand),

    /// Note management
    #[command(subcommand)]
    Note(NoteCommand),

    /// List cards that are due in a deck
    Due {
        /// Deck name (case-insensitive prefix match) or id
        deck: String,
        /// Maximum cards to list (defaults to `due_limit` from the config)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Review due cards interactively
    Review {
        /// Deck name (case-insensitive prefix match) or id
        deck: String,
        /// Stop after this many cards
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Take a card out of review
    Suspend {
        /// Card id
        card: String,
    },

    /// Put a suspended card back into review
    Unsuspend {
        /// Card id
        card: String,
    },

    /// Export the whole collection
    Export {
        #[arg(value_enum)]
        kind: TransferFormat,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Import a JSON snapshot or a deckName,front,back CSV file
    Import {
        #[arg(value_enum)]
        kind: TransferFormat,
        /// File to read ("-" for stdin)
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum DeckCommand {
    /// List all decks with card counts
    List,

    /// Create a new deck
    Create {
        name: String,
    },

    /// Rename a deck
    Rename {
        /// Deck name or id
        deck: String,
        /// New name
        name: String,
    },

    /// Delete a deck with all of its notes and cards
    Delete {
        /// Deck name or id
        deck: String,
    },

    /// Show card counts for a deck
    Stats {
        /// Deck name or id
        deck: String,
    },
}

#[derive(Subcommand)]
enum NoteCommand {
    /// Add a note (and its card) to a deck
    Add {
        /// Deck name or id
        deck: String,
        front: String,
        back: String,
    },

    /// List notes in a deck, newest first
    List {
        /// Deck name or id
        deck: String,
    },

    /// Change a note's front and/or back
    Edit {
        /// Note id
        note: String,
        #[arg(long)]
        front: Option<String>,
        #[arg(long)]
        back: Option<String>,
    },

    /// Delete a note and its card
    Delete {
        /// Note id
        note: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    let mut app = app::App::new(cli.database.as_deref())?;

    match cli.command {
        Command::Deck(subcmd) => match subcmd {
            DeckCommand::List => commands::deck::run_list(&app, &cli.format, use_color)?,
            DeckCommand::Create { name } => {
                commands::deck::run_create(&mut app, &name, &cli.format)?
            }
            DeckCommand::Rename { deck, name } => {
                commands::deck::run_rename(&mut app, &deck, &name, &cli.format)?
            }
            DeckCommand::Delete { deck } => {
                commands::deck::run_delete(&mut app, &deck, &cli.format)?
            }
            DeckCommand::Stats { deck } => {
                commands::deck::run_stats(&app, &deck, &cli.format, use_color)?
            }
        },
        Command::Note(subcmd) => match subcmd {
            NoteCommand::Add { deck, front, back } => {
                commands::note::run_add(&mut app, &deck, front, back, &cli.format)?
            }
            NoteCommand::List { deck } => {
                commands::note::run_list(&app, &deck, &cli.format, use_color)?
            }
            NoteCommand::Edit { note, front, back } => {
                commands::note::run_edit(&mut app, &note, front, back, &cli.format)?
            }
            NoteCommand::Delete { note } => {
                commands::note::run_delete(&mut app, &note, &cli.format)?
            }
        },
        Command::Due { deck, limit } => {
            commands::review::run_due(&app, &deck, limit, &cli.format, use_color)?
        }
        Command::Review { deck, limit } => {
            commands::review::run_review(&mut app, &deck, limit, use_color)?
        }
        Command::Suspend { card } => {
            commands::review::run_suspend(&mut app, &card, true, &cli.format)?
        }
        Command::Unsuspend { card } => {
            commands::review::run_suspend(&mut app, &card, false, &cli.format)?
        }
        Command::Export { kind, output } => {
            commands::transfer::run_export(&app, kind, output.as_deref())?
        }
        Command::Import { kind, file } => {
            commands::transfer::run_import(&mut app, kind, &file, &cli.format)?
        }
    }

    app.close()
}
