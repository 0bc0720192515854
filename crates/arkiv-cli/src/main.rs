//! Command front-end for the archive engine: inspection, search and export
//! over an existing archive. Paths come from the environment (`.env` is
//! honored); see `Config::from_env` for the variables.

use anyhow::Result;
use arkiv_engine::{Config, Engine};
use arkiv_types::ArchivedMessage;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arkiv")]
#[command(author, version, about = "Channel archive engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate archive statistics
    Stats,

    /// Years with archived messages
    Years,

    /// Months of a year with archived messages
    Months { year: i32 },

    /// Days of a month with archived messages
    Days { year: i32, month: u32 },

    /// List the messages archived on a day
    Day { date: NaiveDate },

    /// Case-insensitive content search
    Search { term: String },

    /// Export one day to a JSON document
    Export { date: NaiveDate },

    /// Regenerate the day-document tree from the table
    Rebuild,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arkiv=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let engine = Engine::open(&Config::from_env())?;

    match cli.command {
        Commands::Stats => {
            let stats = engine.stats()?;
            println!("Total messages:  {}", stats.total_messages);
            println!("Today:           {}", stats.today);
            println!("This month:      {}", stats.this_month);
            println!(
                "Engagement:      {} views, {} forwards, {} replies",
                stats.views, stats.forwards, stats.replies
            );
            for (kind, count) in &stats.media_counts {
                println!("Media {:<10} {}", format!("{}:", kind), count);
            }
            match stats.latest {
                Some(latest) => println!("Latest message:  {}", latest),
                None => println!("Latest message:  (none)"),
            }
            println!("Database size:   {} bytes", stats.db_size_bytes);
        }
        Commands::Years => {
            for (year, count) in engine.list_years()? {
                println!("{}  ({} messages)", year, count);
            }
        }
        Commands::Months { year } => {
            for (month, count) in engine.list_months(year)? {
                println!("{}-{:02}  ({} messages)", year, month, count);
            }
        }
        Commands::Days { year, month } => {
            for (day, count) in engine.list_days(year, month)? {
                println!("{}-{:02}-{:02}  ({} messages)", year, month, day, count);
            }
        }
        Commands::Day { date } => {
            for msg in engine.messages_for_day(date)? {
                print_message(&msg);
            }
        }
        Commands::Search { term } => {
            let (hits, more) = engine.search(&term)?;
            if hits.is_empty() {
                println!("No matches for '{}'", term);
            }
            for msg in &hits {
                print_message(msg);
            }
            if more {
                println!("(more matches available — narrow the search)");
            }
        }
        Commands::Export { date } => {
            let path = engine.export_day(date)?;
            println!("Exported {} to {}", date, path.display());
        }
        Commands::Rebuild => {
            let written = engine.rebuild_day_tree()?;
            println!("Rebuilt {} day documents", written);
        }
    }

    Ok(())
}

fn print_message(msg: &ArchivedMessage) {
    let preview: String = msg.content.chars().take(80).collect();
    match msg.media.kind() {
        Some(kind) => println!("{}  [{}] {}", msg.date, kind, preview),
        None => println!("{}  {}", msg.date, preview),
    }
}
