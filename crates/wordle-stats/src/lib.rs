//! Per-player aggregates over period scopes, cached behind a staleness policy.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use wordle_core::{
    empty_distribution, DateRange, DatedScore, Guesses, Period, StatsCacheEntry, StatsKey,
    ValueError,
};
use wordle_storage::{Store, StoreError};

pub const CRATE_NAME: &str = "wordle-stats";
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("unknown player {0}")]
    UnknownPlayer(Uuid),
    #[error("unknown puzzle #{0}")]
    UnknownPuzzle(u32),
}

pub fn all_time_ttl() -> Duration {
    Duration::days(7)
}

pub fn current_year_ttl() -> Duration {
    Duration::hours(24)
}

/// Whether an entry computed at `last_computed` must be recomputed before it is served.
///
/// All-time entries live for 7 days. Scopes whose window reaches into the current
/// calendar year (or later) live for 24 hours; this includes an ISO week keyed by
/// last year that ends in January. Scopes that ended before this year never go
/// stale. Both bounds are strict.
pub fn is_stale(period: &Period, last_computed: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let ttl = match period {
        Period::AllTime => all_time_ttl(),
        scoped if reaches_year_of(scoped, now) => current_year_ttl(),
        _ => return false,
    };
    now.signed_duration_since(last_computed) > ttl
}

fn reaches_year_of(period: &Period, now: DateTime<Utc>) -> bool {
    let year_start = NaiveDate::from_ymd_opt(now.year(), 1, 1);
    match (period.date_range(), year_start) {
        (Ok(DateRange { end: Some(end), .. }), Some(start)) => end > start,
        _ => false,
    }
}

/// Exact mean of solved guess counts. Ordering cross-multiplies instead of dividing.
#[derive(Debug, Clone, Copy)]
pub struct SolveAverage {
    total: u32,
    solves: u32,
}

impl SolveAverage {
    pub fn new(total: u32, solves: u32) -> Option<Self> {
        (solves > 0).then_some(Self { total, solves })
    }

    pub fn value(self) -> f64 {
        f64::from(self.total) / f64::from(self.solves)
    }
}

impl Ord for SolveAverage {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = u64::from(self.total) * u64::from(other.solves);
        let rhs = u64::from(other.total) * u64::from(self.solves);
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for SolveAverage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SolveAverage {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SolveAverage {}

/// Running counts for one player's scores in a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub played: u32,
    pub solved: u32,
    pub failed: u32,
    /// Every guess count, DNF included.
    pub total_guesses: u32,
    pub solve_guesses: u32,
    pub best: Option<Guesses>,
    pub distribution: BTreeMap<u8, u32>,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            played: 0,
            solved: 0,
            failed: 0,
            total_guesses: 0,
            solve_guesses: 0,
            best: None,
            distribution: empty_distribution(),
        }
    }
}

impl Tally {
    pub fn record(&mut self, guesses: Guesses) {
        let value = u32::from(guesses.get());
        self.played += 1;
        self.total_guesses += value;
        *self.distribution.entry(guesses.get()).or_insert(0) += 1;
        if guesses.is_solve() {
            self.solved += 1;
            self.solve_guesses += value;
            self.best = Some(self.best.map_or(guesses, |best| best.min(guesses)));
        } else {
            self.failed += 1;
        }
    }

    pub fn solve_average(&self) -> Option<SolveAverage> {
        SolveAverage::new(self.solve_guesses, self.solved)
    }
}

impl FromIterator<Guesses> for Tally {
    fn from_iter<I: IntoIterator<Item = Guesses>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), |mut tally, guesses| {
            tally.record(guesses);
            tally
        })
    }
}

fn tally_by_player(scores: &[DatedScore]) -> BTreeMap<Uuid, Tally> {
    scores.iter().fold(BTreeMap::new(), |mut tallies, dated| {
        tallies
            .entry(dated.score.player_id)
            .or_insert_with(Tally::default)
            .record(dated.score.guesses);
        tallies
    })
}

/// The lowest average among players with at least one solve.
fn winning_average(tallies: &BTreeMap<Uuid, Tally>) -> Option<SolveAverage> {
    tallies.values().filter_map(Tally::solve_average).min()
}

fn entry_for(
    player_id: Uuid,
    period: Period,
    tally: Tally,
    winning: Option<SolveAverage>,
    now: DateTime<Utc>,
) -> StatsCacheEntry {
    let average = tally.solve_average();
    StatsCacheEntry {
        id: Uuid::new_v4(),
        player_id,
        period,
        games_played: tally.played,
        games_solved: tally.solved,
        games_failed: tally.failed,
        total_guesses: tally.total_guesses,
        average_guesses: average.map(SolveAverage::value),
        best_score: tally.best,
        distribution: tally.distribution,
        is_winner: matches!((average, winning), (Some(mine), Some(best)) if mine == best),
        last_computed: now,
    }
}

/// Recomputes stats entries from scores and replaces them in full.
pub struct StatsAggregator<'a> {
    store: &'a dyn Store,
}

impl<'a> StatsAggregator<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    fn period_tallies(&self, period: &Period) -> Result<BTreeMap<Uuid, Tally>, StatsError> {
        let scores = self.store.dated_scores(None, period.date_range()?)?;
        Ok(tally_by_player(&scores))
    }

    /// Computes one player's entry. Winner status is judged against every
    /// player who played in the period; all players sharing the best average win.
    pub fn compute(
        &self,
        player_id: Uuid,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<StatsCacheEntry, StatsError> {
        if self.store.get_player(player_id)?.is_none() {
            return Err(StatsError::UnknownPlayer(player_id));
        }
        let mut tallies = self.period_tallies(&period)?;
        let winning = winning_average(&tallies);
        let tally = tallies.remove(&player_id).unwrap_or_default();
        let entry = self
            .store
            .replace_stats_entry(entry_for(player_id, period, tally, winning, now))?;
        debug!(
            player = %player_id,
            %period,
            played = entry.games_played,
            winner = entry.is_winner,
            "computed stats entry"
        );
        Ok(entry)
    }

    /// Computes entries for every player who played in the period.
    pub fn compute_all(
        &self,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatsCacheEntry>, StatsError> {
        let tallies = self.period_tallies(&period)?;
        let winning = winning_average(&tallies);
        tallies
            .into_iter()
            .map(|(player_id, tally)| {
                let entry = entry_for(player_id, period, tally, winning, now);
                Ok(self.store.replace_stats_entry(entry)?)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub player_id: Uuid,
    pub name: String,
    pub average_guesses: f64,
    pub games_solved: u32,
    pub games_played: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_players: usize,
    pub total_games: usize,
    /// Mean over solves only; `None` when nothing has been solved.
    pub solve_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PuzzleSummary {
    pub number: u32,
    pub date: NaiveDate,
    pub word: String,
    pub players: usize,
    pub solved: u32,
    pub failed: u32,
    pub solve_average: Option<f64>,
}

/// Read surface over the stats cache.
pub struct StatsService<'a> {
    store: &'a dyn Store,
    aggregator: StatsAggregator<'a>,
}

impl<'a> StatsService<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            aggregator: StatsAggregator::new(store),
        }
    }

    pub fn get_stats(&self, player_id: Uuid, period: Period) -> Result<StatsCacheEntry, StatsError> {
        self.get_stats_at(player_id, period, Utc::now())
    }

    /// Serves the cached entry, recomputing first when it is missing or stale.
    pub fn get_stats_at(
        &self,
        player_id: Uuid,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<StatsCacheEntry, StatsError> {
        if let Some(entry) = self.store.stats_entry(StatsKey { player_id, period })? {
            if !is_stale(&entry.period, entry.last_computed, now) {
                return Ok(entry);
            }
            debug!(player = %player_id, %period, last_computed = %entry.last_computed, "stale stats entry");
        }
        let entry = self.aggregator.compute(player_id, period, now)?;
        self.store.flush()?;
        Ok(entry)
    }

    /// Players ordered by ascending solve average, then name. Players without a solve are left out.
    pub fn get_leaderboard(
        &self,
        period: Period,
        limit: usize,
    ) -> Result<Vec<LeaderboardRow>, StatsError> {
        let names: HashMap<Uuid, String> = self
            .store
            .players()?
            .into_iter()
            .map(|player| (player.id, player.name))
            .collect();

        let mut ranked: Vec<(SolveAverage, LeaderboardRow)> = self
            .aggregator
            .period_tallies(&period)?
            .into_iter()
            .filter_map(|(player_id, tally)| {
                let average = tally.solve_average()?;
                let row = LeaderboardRow {
                    player_id,
                    name: names.get(&player_id).cloned().unwrap_or_default(),
                    average_guesses: average.value(),
                    games_solved: tally.solved,
                    games_played: tally.played,
                };
                Some((average, row))
            })
            .collect();
        ranked.sort_by(|(a, row_a), (b, row_b)| a.cmp(b).then_with(|| row_a.name.cmp(&row_b.name)));

        Ok(ranked.into_iter().take(limit).map(|(_, row)| row).collect())
    }

    /// Recomputes every entry for the period so winner flags agree across players.
    pub fn refresh(&self, period: Period, now: DateTime<Utc>) -> Result<usize, StatsError> {
        let entries = self.aggregator.compute_all(period, now)?;
        self.store.flush()?;
        info!(%period, entries = entries.len(), "refreshed stats");
        Ok(entries.len())
    }

    pub fn overview(&self) -> Result<Overview, StatsError> {
        let scores = self.store.dated_scores(None, DateRange::unbounded())?;
        let tally: Tally = scores.iter().map(|dated| dated.score.guesses).collect();
        Ok(Overview {
            total_players: self.store.players()?.len(),
            total_games: scores.len(),
            solve_average: tally.solve_average().map(SolveAverage::value),
        })
    }

    pub fn puzzle_summary(&self, number: u32) -> Result<PuzzleSummary, StatsError> {
        let puzzle = self
            .store
            .find_puzzle(number)?
            .ok_or(StatsError::UnknownPuzzle(number))?;
        let range = DateRange {
            start: Some(puzzle.date),
            end: puzzle.date.succ_opt(),
        };
        let tally: Tally = self
            .store
            .dated_scores(None, range)?
            .iter()
            .filter(|dated| dated.score.puzzle_number == number)
            .map(|dated| dated.score.guesses)
            .collect();
        Ok(PuzzleSummary {
            number,
            date: puzzle.date,
            word: puzzle.word,
            players: tally.played as usize,
            solved: tally.solved,
            failed: tally.failed,
            solve_average: tally.solve_average().map(SolveAverage::value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use wordle_core::{Player, Puzzle, ScoreKey};
    use wordle_storage::{MemoryStore, NewPlayer};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn player(store: &MemoryStore, name: &str) -> Player {
        store
            .create_player(NewPlayer {
                name: name.to_string(),
                contact: format!("{}@example.com", name.to_lowercase()),
            })
            .unwrap()
            .into_inner()
    }

    fn play(store: &MemoryStore, who: &Player, number: u32, guesses: i64) {
        if store.find_puzzle(number).unwrap().is_none() {
            store
                .create_puzzle(Puzzle::numbered(number, "crane").unwrap())
                .unwrap();
        }
        store
            .create_score(
                ScoreKey {
                    player_id: who.id,
                    puzzle_number: number,
                },
                Guesses::new(guesses).unwrap(),
            )
            .unwrap();
    }

    fn guesses(values: &[i64]) -> Tally {
        values.iter().map(|&g| Guesses::new(g).unwrap()).collect()
    }

    #[rstest]
    #[case(Period::AllTime, 24 * 6, false)]
    #[case(Period::AllTime, 24 * 8, true)]
    #[case(Period::Year { year: 2024 }, 23, false)]
    #[case(Period::Year { year: 2024 }, 25, true)]
    #[case(Period::Month { year: 2024, month: 6 }, 25, true)]
    #[case(Period::Week { year: 2024, week: 23 }, 23, false)]
    #[case(Period::Year { year: 2023 }, 24 * 400, false)]
    #[case(Period::Month { year: 2021, month: 1 }, 24 * 1000, false)]
    fn staleness_windows(#[case] period: Period, #[case] age_hours: i64, #[case] stale: bool) {
        let now = at(2024, 6, 15, 12);
        let computed = now - Duration::hours(age_hours);
        assert_eq!(is_stale(&period, computed, now), stale);
    }

    #[rstest]
    #[case(Period::Week { year: 2026, week: 53 }, true)]
    #[case(Period::Week { year: 2026, week: 52 }, false)]
    #[case(Period::Month { year: 2026, month: 12 }, false)]
    #[case(Period::Year { year: 2026 }, false)]
    #[case(Period::Month { year: 2027, month: 1 }, true)]
    fn staleness_across_the_new_year(#[case] period: Period, #[case] stale: bool) {
        let now = at(2027, 1, 2, 12);
        assert_eq!(is_stale(&period, now - Duration::hours(48), now), stale);
    }

    #[test]
    fn current_week_in_early_january_goes_stale() {
        let now = at(2027, 1, 2, 12);
        let [week, ..] = Period::containing(now.date_naive());
        assert_eq!(week, Period::Week { year: 2026, week: 53 });
        assert!(!is_stale(&week, now - Duration::hours(23), now));
        assert!(is_stale(&week, now - Duration::hours(25), now));
    }

    #[test]
    fn staleness_bounds_are_strict() {
        let now = at(2024, 6, 15, 12);
        assert!(!is_stale(&Period::AllTime, now - all_time_ttl(), now));
        assert!(!is_stale(&Period::Year { year: 2024 }, now - current_year_ttl(), now));
    }

    #[test]
    fn averages_compare_exactly() {
        let a = SolveAverage::new(7, 2).unwrap();
        let b = SolveAverage::new(14, 4).unwrap();
        let c = SolveAverage::new(10, 3).unwrap();
        assert_eq!(a, b);
        assert!(c < a);
        assert!(SolveAverage::new(3, 0).is_none());
    }

    #[test]
    fn tally_counts_dnf_as_failed_outside_the_average() {
        let tally = guesses(&[3, 4, 7, 5]);
        assert_eq!(tally.played, 4);
        assert_eq!(tally.solved, 3);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.played, tally.solved + tally.failed);
        assert_eq!(tally.total_guesses, 19);
        assert_eq!(tally.solve_average().unwrap().value(), 4.0);
        assert_eq!(tally.best, Some(Guesses::new(3).unwrap()));
        assert_eq!(tally.distribution[&7], 1);
        assert_eq!(tally.distribution.values().sum::<u32>(), tally.played);
    }

    #[test]
    fn all_dnf_has_no_average_or_best() {
        let tally = guesses(&[7, 7]);
        assert_eq!(tally.solve_average(), None);
        assert_eq!(tally.best, None);
        assert_eq!(tally.distribution.len(), 7);
    }

    #[test]
    fn compute_scopes_scores_to_the_period() {
        let store = MemoryStore::new();
        let alice = player(&store, "Alice");
        // #196 is 2022-01-01, #226 is 2022-01-31, #227 is 2022-02-01.
        play(&store, &alice, 196, 4);
        play(&store, &alice, 226, 7);
        play(&store, &alice, 227, 2);

        let aggregator = StatsAggregator::new(&store);
        let now = at(2022, 2, 2, 0);
        let january = aggregator
            .compute(alice.id, Period::month(2022, 1).unwrap(), now)
            .unwrap();
        assert_eq!(january.games_played, 2);
        assert_eq!(january.games_failed, 1);
        assert_eq!(january.total_guesses, 11);
        assert_eq!(january.average_guesses, Some(4.0));
        assert_eq!(january.distribution.values().sum::<u32>(), january.games_played);
        assert_eq!(january.last_computed, now);

        let all_time = aggregator.compute(alice.id, Period::AllTime, now).unwrap();
        assert_eq!(all_time.games_played, 3);
        assert_eq!(all_time.best_score, Some(Guesses::new(2).unwrap()));
        assert_eq!(all_time.average_guesses, Some(3.0));
    }

    #[test]
    fn recompute_replaces_the_single_entry() {
        let store = MemoryStore::new();
        let alice = player(&store, "Alice");
        play(&store, &alice, 196, 4);
        let aggregator = StatsAggregator::new(&store);

        let first = aggregator
            .compute(alice.id, Period::AllTime, at(2022, 1, 2, 0))
            .unwrap();
        play(&store, &alice, 197, 2);
        let second = aggregator
            .compute(alice.id, Period::AllTime, at(2022, 1, 3, 0))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.games_played, 2);
        let cached = store
            .stats_entry(StatsKey {
                player_id: alice.id,
                period: Period::AllTime,
            })
            .unwrap()
            .unwrap();
        assert_eq!(cached, second);
    }

    #[test]
    fn tied_best_averages_are_all_winners() {
        let store = MemoryStore::new();
        let alice = player(&store, "Alice");
        let bob = player(&store, "Bob");
        let cara = player(&store, "Cara");
        play(&store, &alice, 196, 3);
        play(&store, &alice, 197, 4);
        play(&store, &bob, 196, 4);
        play(&store, &bob, 197, 3);
        play(&store, &cara, 196, 5);

        let now = at(2022, 1, 3, 0);
        let entries = StatsAggregator::new(&store)
            .compute_all(Period::AllTime, now)
            .unwrap();
        let winners: Vec<Uuid> = entries
            .iter()
            .filter(|e| e.is_winner)
            .map(|e| e.player_id)
            .collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(winners.len(), 2);
        assert!(winners.contains(&alice.id) && winners.contains(&bob.id));
    }

    #[test]
    fn player_without_scores_is_not_a_winner() {
        let store = MemoryStore::new();
        let alice = player(&store, "Alice");
        let idle = player(&store, "Idle");
        play(&store, &alice, 196, 7);

        let aggregator = StatsAggregator::new(&store);
        let now = at(2022, 1, 3, 0);
        let dnf_only = aggregator.compute(alice.id, Period::AllTime, now).unwrap();
        let empty = aggregator.compute(idle.id, Period::AllTime, now).unwrap();
        assert!(!dnf_only.is_winner);
        assert!(!empty.is_winner);
        assert_eq!(empty.games_played, 0);
        assert!(matches!(
            aggregator.compute(Uuid::new_v4(), Period::AllTime, now),
            Err(StatsError::UnknownPlayer(_))
        ));
    }

    #[test]
    fn concurrent_recomputes_of_one_key_leave_one_consistent_entry() {
        let store = MemoryStore::new();
        let alice = player(&store, "Alice");
        let bob = player(&store, "Bob");
        for (number, guesses) in [(196, 3), (197, 7), (198, 4), (199, 2)] {
            play(&store, &alice, number, guesses);
        }
        play(&store, &bob, 196, 5);

        let aggregator = StatsAggregator::new(&store);
        let base = at(2022, 1, 10, 0);
        let entries: Vec<StatsCacheEntry> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|offset| {
                    let aggregator = &aggregator;
                    let alice_id = alice.id;
                    scope.spawn(move || {
                        aggregator
                            .compute(alice_id, Period::AllTime, base + Duration::minutes(offset))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let ids: std::collections::HashSet<Uuid> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 1);

        let stored = store
            .stats_entry(StatsKey {
                player_id: alice.id,
                period: Period::AllTime,
            })
            .unwrap()
            .unwrap();
        assert!(ids.contains(&stored.id));
        assert!(entries.contains(&stored));
        assert_eq!(stored.games_played, 4);
        assert_eq!(stored.games_played, stored.games_solved + stored.games_failed);
        assert_eq!(stored.distribution.values().sum::<u32>(), stored.games_played);
        assert_eq!(stored.average_guesses, Some(3.0));
        assert!(stored.is_winner);
    }

    #[test]
    fn get_stats_serves_fresh_entries_from_cache() {
        let store = MemoryStore::new();
        let alice = player(&store, "Alice");
        play(&store, &alice, 196, 4);
        let service = StatsService::new(&store);

        let computed_at = at(2022, 1, 2, 0);
        let first = service
            .get_stats_at(alice.id, Period::AllTime, computed_at)
            .unwrap();
        play(&store, &alice, 197, 2);

        let cached = service
            .get_stats_at(alice.id, Period::AllTime, computed_at + Duration::days(6))
            .unwrap();
        assert_eq!(cached, first);

        let refreshed = service
            .get_stats_at(alice.id, Period::AllTime, computed_at + Duration::days(8))
            .unwrap();
        assert_eq!(refreshed.games_played, 2);
    }

    #[test]
    fn leaderboard_orders_by_average_then_name() {
        let store = MemoryStore::new();
        let zed = player(&store, "Zed");
        let amy = player(&store, "Amy");
        let bo = player(&store, "Bo");
        let dnf = player(&store, "Dnf");
        play(&store, &zed, 196, 3);
        play(&store, &amy, 196, 3);
        play(&store, &bo, 196, 2);
        play(&store, &bo, 197, 6);
        play(&store, &dnf, 196, 7);

        let service = StatsService::new(&store);
        let board = service.get_leaderboard(Period::AllTime, 10).unwrap();
        let names: Vec<&str> = board.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["Amy", "Zed", "Bo"]);
        assert_eq!(board[2].average_guesses, 4.0);

        let top = service.get_leaderboard(Period::AllTime, 1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "Amy");
    }

    #[test]
    fn overview_and_puzzle_summary() {
        let store = MemoryStore::new();
        let alice = player(&store, "Alice");
        let bob = player(&store, "Bob");
        player(&store, "Idle");
        play(&store, &alice, 196, 3);
        play(&store, &bob, 196, 7);
        play(&store, &bob, 197, 5);

        let service = StatsService::new(&store);
        let overview = service.overview().unwrap();
        assert_eq!(overview.total_players, 3);
        assert_eq!(overview.total_games, 3);
        assert_eq!(overview.solve_average, Some(4.0));

        let summary = service.puzzle_summary(196).unwrap();
        assert_eq!(summary.players, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.solve_average, Some(3.0));
        assert_eq!(summary.word, "CRANE");
        assert!(matches!(
            service.puzzle_summary(9999),
            Err(StatsError::UnknownPuzzle(9999))
        ));
    }

    #[test]
    fn refresh_counts_players_in_period() {
        let store = MemoryStore::new();
        let alice = player(&store, "Alice");
        let bob = player(&store, "Bob");
        play(&store, &alice, 196, 3);
        play(&store, &bob, 227, 3);

        let service = StatsService::new(&store);
        let january = Period::month(2022, 1).unwrap();
        assert_eq!(service.refresh(january, at(2022, 2, 2, 0)).unwrap(), 1);
        assert_eq!(service.refresh(Period::AllTime, at(2022, 2, 2, 0)).unwrap(), 2);
    }
}
