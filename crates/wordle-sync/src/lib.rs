//! Import pipeline: identity resolution, score normalization, puzzle and score
//! ingestion, and the combined run with its reports.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn};
use uuid::Uuid;
use wordle_adapters::{
    write_puzzle_csv, PuzzleEntry, PuzzleFormat, PuzzleLogParser, PuzzleSource, ScoreMatrix,
    ScoreTriple,
};
use wordle_core::{Guesses, IngestError, Player, Puzzle, Score, ScoreKey, Upsert};
use wordle_storage::{sha256_hex, ArtifactStore, JsonFileStore, NewPlayer, Store, StoreError};

pub const CRATE_NAME: &str = "wordle-sync";

const CONTACT_DOMAIN: &str = "example.com";
const MAX_CONTACT_ATTEMPTS: usize = 100;

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub store_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub puzzles_file: PathBuf,
    pub scores_file: PathBuf,
    pub archive_inputs: bool,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        Self {
            store_path: std::env::var("WORDLE_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/wordle-store.json")),
            artifacts_dir: std::env::var("WORDLE_ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./artifacts")),
            reports_dir: std::env::var("WORDLE_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./reports")),
            puzzles_file: std::env::var("WORDLE_PUZZLES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("Wordle Words - Sheet1.csv")),
            scores_file: std::env::var("WORDLE_SCORES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("Wordle Stats - Sheet1(1).csv")),
            archive_inputs: std::env::var("WORDLE_ARCHIVE_INPUTS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Immutable(key) => Self::Ingest(IngestError::ImmutabilityViolation {
                player_id: key.player_id,
                puzzle_number: key.puzzle_number,
            }),
            other => Self::Store(other),
        }
    }
}

impl SyncError {
    /// Store failures and immutability violations stop a run; everything else is per-row.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Ingest(err) => err.is_fatal(),
            Self::Store(_) => true,
        }
    }
}

/// Placeholder contact for a player first seen in an import.
///
/// `attempt` 1 yields `<slug>@example.com`; later attempts append `-<attempt>`.
pub fn placeholder_contact(name: &str, attempt: usize) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('.') {
            slug.push('.');
        }
    }
    let slug = slug.trim_end_matches('.');
    let slug = if slug.is_empty() { "player" } else { slug };
    if attempt <= 1 {
        format!("{slug}@{CONTACT_DOMAIN}")
    } else {
        format!("{slug}-{attempt}@{CONTACT_DOMAIN}")
    }
}

/// Maps names to players (creating them on first sight) and dates to puzzles.
pub struct IdentityResolver<'a> {
    store: &'a dyn Store,
    players: HashMap<String, Player>,
    players_created: usize,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            players: HashMap::new(),
            players_created: 0,
        }
    }

    pub fn players_created(&self) -> usize {
        self.players_created
    }

    pub fn resolve_player(&mut self, name: &str) -> Result<Player, SyncError> {
        if let Some(player) = self.players.get(name) {
            return Ok(player.clone());
        }

        let player = match self.store.find_player(name)? {
            Some(existing) => existing,
            None => self.create_player(name)?,
        };
        self.players.insert(name.to_string(), player.clone());
        Ok(player)
    }

    fn create_player(&mut self, name: &str) -> Result<Player, SyncError> {
        for attempt in 1..=MAX_CONTACT_ATTEMPTS {
            let candidate = NewPlayer {
                name: name.to_string(),
                contact: placeholder_contact(name, attempt),
            };
            match self.store.create_player(candidate) {
                Ok(Upsert::Created(player)) => {
                    self.players_created += 1;
                    info!(player = %player.name, contact = %player.contact, "created player");
                    return Ok(player);
                }
                Ok(Upsert::AlreadyExisted(player)) => return Ok(player),
                Err(StoreError::Conflict { field: "contact", .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Conflict {
            field: "contact",
            value: placeholder_contact(name, MAX_CONTACT_ATTEMPTS),
        }
        .into())
    }

    /// Never creates; a miss is a per-row [`IngestError::MissingReference`].
    pub fn resolve_puzzle(&self, date: NaiveDate) -> Result<Puzzle, SyncError> {
        self.store
            .find_puzzle_by_date(date)?
            .ok_or(SyncError::Ingest(IngestError::MissingReference { date }))
    }
}

/// Turns resolved triples into immutable scores, at most once per `(player, puzzle)`.
pub struct ScoreNormalizer<'a> {
    store: &'a dyn Store,
}

impl<'a> ScoreNormalizer<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    pub fn normalize(
        &self,
        player: &Player,
        puzzle: &Puzzle,
        guesses: i64,
        location: &str,
    ) -> Result<Upsert<Score>, SyncError> {
        let guesses = Guesses::new(guesses)
            .map_err(|err| IngestError::malformed(location, err.to_string()))?;
        let key = ScoreKey {
            player_id: player.id,
            puzzle_number: puzzle.number,
        };
        let outcome = self.store.create_score(key, guesses)?;
        if let Upsert::AlreadyExisted(existing) = &outcome {
            if existing.guesses != guesses {
                warn!(
                    player = %player.name,
                    puzzle = puzzle.number,
                    stored = %existing.guesses,
                    incoming = %guesses,
                    "ignoring a different guess count for an existing score"
                );
            }
        }
        Ok(outcome)
    }
}

/// Per-item result of an ingestion step.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome<T> {
    Upserted(Upsert<T>),
    Skipped(IngestError),
}

impl<T> ItemOutcome<T> {
    /// Folds a step result: non-fatal errors become skips, fatal ones propagate.
    fn from_step(step: Result<Upsert<T>, SyncError>) -> Result<Self, SyncError> {
        match step {
            Ok(upsert) => Ok(Self::Upserted(upsert)),
            Err(SyncError::Ingest(err)) if !err.is_fatal() => Ok(Self::Skipped(err)),
            Err(err) => Err(err),
        }
    }
}

/// Counts reported after an input has been fully consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub created: usize,
    pub already_existed: usize,
    /// Repeated keys within the same input; the first occurrence won.
    pub duplicates: usize,
    pub malformed: usize,
    /// Rows whose puzzle does not exist.
    pub missing_reference: usize,
    pub players_created: usize,
    pub warnings: Vec<String>,
}

impl IngestSummary {
    pub fn skipped(&self) -> usize {
        self.duplicates + self.malformed
    }

    pub fn errors(&self) -> usize {
        self.missing_reference
    }

    fn absorb<T>(mut self, outcome: ItemOutcome<T>) -> Self {
        match outcome {
            ItemOutcome::Upserted(Upsert::Created(_)) => self.created += 1,
            ItemOutcome::Upserted(Upsert::AlreadyExisted(_)) => self.already_existed += 1,
            ItemOutcome::Skipped(err) => {
                warn!(%err, "skipped input item");
                match err {
                    IngestError::DuplicateKey { .. } => self.duplicates += 1,
                    IngestError::MalformedInput { .. } => self.malformed += 1,
                    IngestError::MissingReference { .. } => self.missing_reference += 1,
                    IngestError::ImmutabilityViolation { .. } => {}
                }
                self.warnings.push(err.to_string());
            }
        }
        self
    }
}

fn ingest_puzzle_entry(
    store: &dyn Store,
    seen: &mut HashMap<u32, String>,
    entry: Result<PuzzleEntry, IngestError>,
) -> Result<Upsert<Puzzle>, SyncError> {
    let entry = entry?;
    if let Some(first) = seen.get(&entry.number) {
        return Err(IngestError::DuplicateKey {
            key: format!("#{}", entry.number),
            detail: format!(
                "{first:?} and {:?} (line {}); keeping the first",
                entry.word, entry.line
            ),
        }
        .into());
    }
    seen.insert(entry.number, entry.word.clone());

    let puzzle = Puzzle::numbered(entry.number, &entry.word).ok_or_else(|| {
        IngestError::malformed(
            format!("line {}", entry.line),
            format!("puzzle #{} has no calendar date", entry.number),
        )
    })?;
    match store.create_puzzle(puzzle) {
        Err(StoreError::Conflict { field, value }) => Err(IngestError::DuplicateKey {
            key: format!("#{}", entry.number),
            detail: format!("{field} {value} belongs to another puzzle"),
        }
        .into()),
        other => Ok(other?),
    }
}

/// Creates puzzles from parsed entries. Safe to repeat over overlapping input.
pub fn ingest_puzzles<I>(store: &dyn Store, entries: I) -> Result<IngestSummary, SyncError>
where
    I: IntoIterator<Item = Result<PuzzleEntry, IngestError>>,
{
    let mut seen = HashMap::new();
    entries
        .into_iter()
        .map(|entry| ItemOutcome::from_step(ingest_puzzle_entry(store, &mut seen, entry)))
        .try_fold(IngestSummary::default(), |summary, outcome| {
            Ok::<_, SyncError>(summary.absorb(outcome?))
        })
}

fn ingest_score_triple(
    resolver: &mut IdentityResolver<'_>,
    normalizer: &ScoreNormalizer<'_>,
    triple: Result<ScoreTriple, IngestError>,
) -> Result<Upsert<Score>, SyncError> {
    let triple = triple?;
    let player = resolver.resolve_player(&triple.player)?;
    let puzzle = resolver.resolve_puzzle(triple.date)?;
    let location = format!("row {}, column {}", triple.row, triple.column);
    normalizer.normalize(&player, &puzzle, triple.guesses, &location)
}

/// Creates players and scores from parsed triples. Existing scores are never overwritten.
pub fn ingest_scores<I>(store: &dyn Store, triples: I) -> Result<IngestSummary, SyncError>
where
    I: IntoIterator<Item = Result<ScoreTriple, IngestError>>,
{
    let mut resolver = IdentityResolver::new(store);
    let normalizer = ScoreNormalizer::new(store);
    let summary = triples
        .into_iter()
        .map(|triple| {
            ItemOutcome::from_step(ingest_score_triple(&mut resolver, &normalizer, triple))
        })
        .try_fold(IngestSummary::default(), |summary, outcome| {
            Ok::<_, SyncError>(summary.absorb(outcome?))
        })?;
    Ok(IngestSummary {
        players_created: resolver.players_created(),
        ..summary
    })
}

pub fn import_puzzles(store: &dyn Store, path: &Path, format: PuzzleFormat) -> Result<IngestSummary> {
    let span = info_span!("import_puzzles", path = %path.display());
    let _guard = span.enter();

    let source = PuzzleSource::load(path, format)
        .with_context(|| format!("loading puzzles from {}", path.display()))?;
    let summary = ingest_puzzles(store, source.entries())
        .with_context(|| format!("importing puzzles from {}", path.display()))?;
    store.flush().context("flushing store after puzzle import")?;

    info!(
        created = summary.created,
        already_existed = summary.already_existed,
        duplicates = summary.duplicates,
        malformed = summary.malformed,
        "puzzle import finished"
    );
    Ok(summary)
}

pub fn import_scores(store: &dyn Store, path: &Path) -> Result<IngestSummary> {
    let span = info_span!("import_scores", path = %path.display());
    let _guard = span.enter();

    let matrix = ScoreMatrix::load(path)
        .with_context(|| format!("loading score matrix from {}", path.display()))?;
    let summary = ingest_scores(store, matrix.triples())
        .with_context(|| format!("importing scores from {}", path.display()))?;
    store.flush().context("flushing store after score import")?;

    info!(
        players_created = summary.players_created,
        created = summary.created,
        already_existed = summary.already_existed,
        missing_reference = summary.missing_reference,
        malformed = summary.malformed,
        "score import finished"
    );
    Ok(summary)
}

/// Rewrites a puzzle announcement log as the derived `#<number>,<WORD>` CSV.
pub fn convert_log(input: &Path, output: &Path) -> Result<usize> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let entries: Vec<PuzzleEntry> = PuzzleLogParser::new(text.lines())
        .filter_map(|entry| {
            entry
                .map_err(|err| warn!(%err, "dropping log entry"))
                .ok()
        })
        .collect();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = fs::File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let written = write_puzzle_csv(&entries, file)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(input = %input.display(), output = %output.display(), written, "converted puzzle log");
    Ok(written)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub puzzles_only: bool,
    pub scores_only: bool,
    pub puzzle_format: PuzzleFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputDigest {
    pub kind: String,
    pub path: String,
    pub sha256: String,
    pub bytes: usize,
    pub archived_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub puzzles: Option<IngestSummary>,
    pub scores: Option<IngestSummary>,
    pub inputs: Vec<InputDigest>,
    pub report_dir: String,
}

/// Runs puzzles first, then scores, against the configured snapshot store.
pub fn run_import(config: &ImportConfig, options: ImportOptions) -> Result<ImportRunSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();
    let span = info_span!("import_run", %run_id);
    let _guard = span.enter();

    let store = JsonFileStore::open(&config.store_path)
        .with_context(|| format!("opening store {}", config.store_path.display()))?;
    let artifacts = config
        .archive_inputs
        .then(|| ArtifactStore::new(config.artifacts_dir.clone()));

    let mut inputs = Vec::new();
    let puzzles = if options.scores_only {
        None
    } else {
        inputs.push(digest_input("puzzles", &config.puzzles_file, artifacts.as_ref(), started_at)?);
        Some(import_puzzles(&store, &config.puzzles_file, options.puzzle_format)?)
    };
    let scores = if options.puzzles_only {
        None
    } else {
        inputs.push(digest_input("scores", &config.scores_file, artifacts.as_ref(), started_at)?);
        Some(import_scores(&store, &config.scores_file)?)
    };

    let report_dir = config.reports_dir.join(run_id.to_string());
    let summary = ImportRunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        puzzles,
        scores,
        inputs,
        report_dir: report_dir.display().to_string(),
    };
    write_reports(&report_dir, &summary)?;
    Ok(summary)
}

fn digest_input(
    kind: &str,
    path: &Path,
    artifacts: Option<&ArtifactStore>,
    archived_at: DateTime<Utc>,
) -> Result<InputDigest> {
    let bytes = fs::read(path).with_context(|| format!("reading {kind} input {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("txt");
    let archived = match artifacts {
        Some(store) => Some(store.store_bytes(archived_at, kind, extension, &bytes)?),
        None => None,
    };
    Ok(InputDigest {
        kind: kind.to_string(),
        path: path.display().to_string(),
        sha256: archived
            .as_ref()
            .map(|a| a.content_hash.clone())
            .unwrap_or_else(|| sha256_hex(&bytes)),
        bytes: bytes.len(),
        archived_at: archived.map(|a| a.absolute_path.display().to_string()),
    })
}

fn brief_section(title: &str, summary: &IngestSummary) -> String {
    let mut lines = vec![
        format!("## {title}"),
        format!("- created: {}", summary.created),
        format!("- already existed: {}", summary.already_existed),
        format!("- duplicates in input: {}", summary.duplicates),
        format!("- malformed: {}", summary.malformed),
        format!("- missing puzzle: {}", summary.missing_reference),
    ];
    if summary.players_created > 0 {
        lines.push(format!("- players created: {}", summary.players_created));
    }
    lines.join("\n")
}

fn write_reports(report_dir: &Path, summary: &ImportRunSummary) -> Result<()> {
    fs::create_dir_all(report_dir).with_context(|| format!("creating {}", report_dir.display()))?;

    let json = serde_json::to_vec_pretty(&serde_json::json!({
        "generator": CRATE_NAME,
        "run": summary,
    }))
    .context("serializing import summary")?;
    fs::write(report_dir.join("import_summary.json"), json).context("writing import_summary.json")?;

    let mut sections = vec![
        "# Wordle Import Brief".to_string(),
        format!(
            "- Run ID: `{}`\n- Started: {}\n- Finished: {}",
            summary.run_id, summary.started_at, summary.finished_at
        ),
    ];
    if let Some(puzzles) = &summary.puzzles {
        sections.push(brief_section("Puzzles", puzzles));
    }
    if let Some(scores) = &summary.scores {
        sections.push(brief_section("Scores", scores));
    }
    sections.push(
        summary
            .inputs
            .iter()
            .map(|input| format!("- {}: `{}` sha256 `{}`", input.kind, input.path, input.sha256))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    fs::write(report_dir.join("import_brief.md"), sections.join("\n\n") + "\n")
        .context("writing import_brief.md")?;
    Ok(())
}
