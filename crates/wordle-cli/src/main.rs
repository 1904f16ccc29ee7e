use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wordle_adapters::PuzzleFormat;
use wordle_core::Period;
use wordle_storage::{JsonFileStore, Store};
use wordle_stats::{StatsService, DEFAULT_LEADERBOARD_LIMIT};
use wordle_sync::{ImportConfig, ImportOptions, IngestSummary};

#[derive(Debug, Parser)]
#[command(name = "wordle-cli")]
#[command(about = "Wordle stats import and aggregation")]
struct Cli {
    /// Snapshot store path; overrides WORDLE_STORE_PATH.
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Auto,
    Log,
    Csv,
}

impl From<FormatArg> for PuzzleFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Auto => PuzzleFormat::Auto,
            FormatArg::Log => PuzzleFormat::Log,
            FormatArg::Csv => PuzzleFormat::Csv,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import puzzles, then scores, writing a run report.
    Import {
        #[arg(long)]
        puzzles: Option<PathBuf>,
        #[arg(long)]
        scores: Option<PathBuf>,
        #[arg(long, conflicts_with = "scores_only")]
        puzzles_only: bool,
        #[arg(long)]
        scores_only: bool,
        #[arg(long, value_enum, default_value = "auto")]
        format: FormatArg,
        #[arg(long)]
        no_archive: bool,
        /// Recompute current-period stats after the import.
        #[arg(long)]
        refresh_stats: bool,
    },
    ImportPuzzles {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "auto")]
        format: FormatArg,
    },
    ImportScores {
        path: PathBuf,
    },
    /// Rewrite a puzzle log as `#<number>,<WORD>` CSV.
    ConvertLog {
        input: PathBuf,
        output: PathBuf,
    },
    Stats {
        player: String,
        /// `all-time`, `2024`, `2024-03` or `2024-W05`.
        #[arg(long, default_value = "all-time")]
        period: Period,
        #[arg(long)]
        json: bool,
    },
    Leaderboard {
        #[arg(long, default_value = "all-time")]
        period: Period,
        #[arg(long, default_value_t = DEFAULT_LEADERBOARD_LIMIT)]
        limit: usize,
    },
    /// Recompute entries for a period, or for every period containing today.
    RefreshStats {
        #[arg(long)]
        period: Option<Period>,
    },
    Overview {
        /// Summarize a single puzzle instead.
        #[arg(long)]
        puzzle: Option<u32>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_summary(label: &str, summary: &IngestSummary) {
    println!(
        "{label}: created={} already_existed={} duplicates={} malformed={} missing_puzzle={} players_created={}",
        summary.created,
        summary.already_existed,
        summary.duplicates,
        summary.malformed,
        summary.missing_reference,
        summary.players_created
    );
}

fn refresh_current(store: &dyn Store) -> Result<()> {
    let now = Utc::now();
    let service = StatsService::new(store);
    for period in Period::containing(now.date_naive()) {
        let entries = service
            .refresh(period, now)
            .with_context(|| format!("refreshing stats for {period}"))?;
        println!("refreshed {period}: {entries} entries");
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = ImportConfig::from_env();
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    debug!(store = %config.store_path.display(), "resolved configuration");
    let open_store = || {
        JsonFileStore::open(&config.store_path)
            .with_context(|| format!("opening store {}", config.store_path.display()))
    };

    match cli.command.unwrap_or(Commands::Overview { puzzle: None }) {
        Commands::Import {
            puzzles,
            scores,
            puzzles_only,
            scores_only,
            format,
            no_archive,
            refresh_stats,
        } => {
            let mut config = config.clone();
            if let Some(path) = puzzles {
                config.puzzles_file = path;
            }
            if let Some(path) = scores {
                config.scores_file = path;
            }
            if no_archive {
                config.archive_inputs = false;
            }
            let summary = wordle_sync::run_import(
                &config,
                ImportOptions {
                    puzzles_only,
                    scores_only,
                    puzzle_format: format.into(),
                },
            )?;
            if let Some(puzzles) = &summary.puzzles {
                print_summary("puzzles", puzzles);
            }
            if let Some(scores) = &summary.scores {
                print_summary("scores", scores);
            }
            println!("import complete: run_id={} report={}", summary.run_id, summary.report_dir);
            if refresh_stats {
                refresh_current(&open_store()?)?;
            }
        }
        Commands::ImportPuzzles { path, format } => {
            let store = open_store()?;
            let summary = wordle_sync::import_puzzles(&store, &path, format.into())?;
            print_summary("puzzles", &summary);
        }
        Commands::ImportScores { path } => {
            let store = open_store()?;
            let summary = wordle_sync::import_scores(&store, &path)?;
            print_summary("scores", &summary);
        }
        Commands::ConvertLog { input, output } => {
            let written = wordle_sync::convert_log(&input, &output)?;
            println!("wrote {written} puzzles to {}", output.display());
        }
        Commands::Stats {
            player,
            period,
            json,
        } => {
            let store = open_store()?;
            let found = store
                .find_player(&player)?
                .with_context(|| format!("no player named {player:?}"))?;
            let entry = StatsService::new(&store).get_stats(found.id, period)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                let average = entry
                    .average_guesses
                    .map_or_else(|| "-".to_string(), |avg| format!("{avg:.2}"));
                let best = entry
                    .best_score
                    .map_or_else(|| "-".to_string(), |best| best.to_string());
                println!(
                    "{} {period}: played={} solved={} failed={} average={average} best={best} winner={}",
                    found.name, entry.games_played, entry.games_solved, entry.games_failed, entry.is_winner
                );
                let distribution: Vec<String> = entry
                    .distribution
                    .iter()
                    .map(|(guesses, count)| format!("{guesses}:{count}"))
                    .collect();
                println!("distribution {}", distribution.join(" "));
            }
        }
        Commands::Leaderboard { period, limit } => {
            let store = open_store()?;
            let rows = StatsService::new(&store).get_leaderboard(period, limit)?;
            if rows.is_empty() {
                println!("no solves in {period}");
            }
            for (rank, row) in rows.iter().enumerate() {
                println!(
                    "{:>2}. {} {:.2} ({} solved / {} played)",
                    rank + 1,
                    row.name,
                    row.average_guesses,
                    row.games_solved,
                    row.games_played
                );
            }
        }
        Commands::RefreshStats { period } => {
            let store = open_store()?;
            match period {
                Some(period) => {
                    let entries = StatsService::new(&store).refresh(period, Utc::now())?;
                    println!("refreshed {period}: {entries} entries");
                }
                None => refresh_current(&store)?,
            }
        }
        Commands::Overview { puzzle } => {
            let store = open_store()?;
            let service = StatsService::new(&store);
            match puzzle {
                Some(number) => {
                    let summary = service.puzzle_summary(number)?;
                    let average = summary
                        .solve_average
                        .map_or_else(|| "-".to_string(), |avg| format!("{avg:.2}"));
                    println!(
                        "#{} {} {}: players={} solved={} failed={} average={average}",
                        summary.number,
                        summary.date,
                        summary.word,
                        summary.players,
                        summary.solved,
                        summary.failed
                    );
                }
                None => {
                    let overview = service.overview()?;
                    let average = overview
                        .solve_average
                        .map_or_else(|| "-".to_string(), |avg| format!("{avg:.2}"));
                    println!(
                        "players={} games={} average={average}",
                        overview.total_players, overview.total_games
                    );
                }
            }
        }
    }

    Ok(())
}
