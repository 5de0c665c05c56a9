use anyhow::Result;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use flashrep::config::Config;
use flashrep::{Engine, Rating, Storage};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flashrep", about = "Spaced-repetition scheduler for flashcards", version)]
struct Cli {
    /// Config file (default: <config dir>/flashrep/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act on this user instead of the configured one
    #[arg(long, global = true)]
    user: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Register a flashcard and make it due immediately
    Init {
        flashcard: String,
        /// Topic used by topic filters
        #[arg(long, default_value = "general")]
        topic: String,
        #[arg(long, default_value = "")]
        title: String,
    },

    /// Record a review of a flashcard
    Review {
        flashcard: String,
        /// again, hard, good or easy
        rating: Rating,
        /// Response time in seconds
        #[arg(long, default_value_t = 0.0)]
        time: f64,
    },

    /// List due cards, highest priority first
    Due {
        /// Only these topics (overrides config)
        #[arg(long)]
        topic: Vec<String>,
        /// Maximum number of cards (overrides config)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show study statistics
    Stats,

    /// Show dashboard aggregates: ratings today, topics, last seven days
    Dashboard,

    /// Reset one card to the unreviewed state
    ResetCard { flashcard: String },

    /// Delete all progress and review history of the user
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

fn print<T: Serialize>(format: OutputFormat, value: &T, plain: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Plain => plain(value),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("FLASHREP_LOG", "warn")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.ensure_dirs()?;

    let user = cli.user.clone().unwrap_or_else(|| config.user_id.clone());
    let storage = Storage::open(&config.db_path)?;
    let mut engine = Engine::new(storage, config.scheduler_params());

    match cli.command {
        Command::Init {
            flashcard,
            topic,
            title,
        } => {
            engine
                .store()
                .upsert_flashcard(&user, &flashcard, &topic, &title)?;
            let created = engine.initialize_progress(&user, &flashcard, Utc::now())?;
            if created {
                println!("Initialized {flashcard}");
            } else {
                println!("{flashcard} already has progress");
            }
        }
        Command::Review {
            flashcard,
            rating,
            time,
        } => {
            let record = engine.review(&user, &flashcard, rating, time, Utc::now())?;
            print(cli.format, &record, |r| {
                println!(
                    "{}: next review {} (interval {:.1} days, ease {:.2}, streak {})",
                    r.flashcard_id,
                    r.next_review_date.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    r.interval_days,
                    r.ease_factor,
                    r.correct_streak
                )
            })?;
        }
        Command::Due { topic, limit } => {
            let mut query = config.due_query();
            if !topic.is_empty() {
                query.topics = topic;
            }
            if limit.is_some() {
                query.limit = limit;
            }

            let due = engine.due_cards(&user, &query, Utc::now())?;
            print(cli.format, &due, |cards| {
                if cards.is_empty() {
                    println!("Nothing due");
                }
                for card in cards {
                    println!(
                        "{:>8.2}  {}  ({} reviews, ease {:.2})",
                        card.priority,
                        card.progress.flashcard_id,
                        card.progress.total_reviews,
                        card.progress.ease_factor
                    );
                }
            })?;
        }
        Command::Stats => {
            let stats = engine.study_stats(&user, &config.due_query(), &Local::now())?;
            print(cli.format, &stats, |s| {
                println!("Due now:        {}", s.due_today);
                println!("Reviewed today: {}", s.reviewed_today);
                println!("Streak:         {} days", s.current_streak);
                println!("Accuracy:       {:.0}%", s.average_accuracy * 100.0);
                println!("Cards:          {}", s.total_cards);
            })?;
        }
        Command::Dashboard => {
            let dashboard = engine.dashboard(&user, &Local::now())?;
            print(cli.format, &dashboard, |d| {
                println!(
                    "Today: {} reviews (again {}, hard {}, good {}, easy {})",
                    d.today.total, d.today.again, d.today.hard, d.today.good, d.today.easy
                );
                println!("Average response: {}s", d.average_session_time);
                for (topic, progress) in &d.topics {
                    println!(
                        "{topic}: {}/{} mastered, accuracy {:.0}%",
                        progress.mastered,
                        progress.total,
                        progress.accuracy * 100.0
                    );
                }
                for day in &d.weekly {
                    println!("{}  {:>3} reviews", day.date.format("%a %d"), day.completed);
                }
            })?;
        }
        Command::ResetCard { flashcard } => {
            engine.reset_card_progress(&user, &flashcard, Utc::now())?;
            println!("Reset {flashcard}");
        }
        Command::Reset { yes } => {
            if !yes {
                anyhow::bail!("Refusing to delete all progress for {user} without --yes");
            }
            engine.reset_all_progress(&user)?;
            println!("Deleted all progress for {user}");
        }
    }

    Ok(())
}
