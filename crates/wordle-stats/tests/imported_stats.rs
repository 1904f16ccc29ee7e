use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};
use wordle_adapters::PuzzleFormat;
use wordle_core::{Guesses, Period};
use wordle_storage::{MemoryStore, Store};
use wordle_stats::StatsService;

fn input(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures")
        .join(name)
}

#[fixture]
fn imported() -> MemoryStore {
    let store = MemoryStore::new();
    wordle_sync::import_puzzles(&store, &input("puzzle-log.txt"), PuzzleFormat::Log).unwrap();
    wordle_sync::import_scores(&store, &input("score-matrix.csv")).unwrap();
    store
}

#[rstest]
#[case("all-time", 4, 3.0)]
#[case("2022-01", 4, 3.0)]
#[case("2021-W52", 2, 3.5)]
fn alice_stats_per_period(
    imported: MemoryStore,
    #[case] period: &str,
    #[case] played: u32,
    #[case] average: f64,
) {
    let alice = imported.find_player("Alice").unwrap().unwrap();
    let now = Utc.with_ymd_and_hms(2022, 1, 10, 0, 0, 0).unwrap();
    let entry = StatsService::new(&imported)
        .get_stats_at(alice.id, period.parse::<Period>().unwrap(), now)
        .unwrap();

    assert_eq!(entry.games_played, played);
    assert_eq!(entry.average_guesses, Some(average));
    assert_eq!(entry.games_played, entry.games_solved + entry.games_failed);
    assert_eq!(entry.distribution.values().sum::<u32>(), entry.games_played);
}

#[rstest]
fn dnf_counts_as_failure(imported: MemoryStore) {
    let alice = imported.find_player("Alice").unwrap().unwrap();
    let now = Utc.with_ymd_and_hms(2022, 1, 10, 0, 0, 0).unwrap();
    let entry = StatsService::new(&imported)
        .get_stats_at(alice.id, Period::AllTime, now)
        .unwrap();

    assert_eq!(entry.games_failed, 1);
    assert_eq!(entry.distribution[&7], 1);
    assert_eq!(entry.total_guesses, 16);
    assert_eq!(entry.best_score, Some(Guesses::new(2).unwrap()));
    assert!(entry.is_winner);
}

#[rstest]
fn leaderboard_after_import(imported: MemoryStore) {
    let board = StatsService::new(&imported)
        .get_leaderboard(Period::AllTime, 5)
        .unwrap();
    let ranking: Vec<(&str, f64)> = board
        .iter()
        .map(|row| (row.name.as_str(), row.average_guesses))
        .collect();
    assert_eq!(ranking, vec![("Alice", 3.0), ("Bob", 3.5), ("Cara", 6.0)]);
}
