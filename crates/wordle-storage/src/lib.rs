//! Record store contract + in-memory and JSON snapshot implementations, and the
//! hash-addressed archive for raw exports.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use wordle_core::{
    DateRange, DatedScore, Guesses, Player, Puzzle, Score, ScoreKey, StatsCacheEntry, StatsKey,
    Upsert,
};

pub const CRATE_NAME: &str = "wordle-storage";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("score for player {} on puzzle #{} already exists and cannot be changed", .0.player_id, .0.puzzle_number)]
    Immutable(ScoreKey),
    #[error("{field} {value:?} is already taken")]
    Conflict { field: &'static str, value: String },
    #[error("unknown {entity} {id}")]
    UnknownReference { entity: &'static str, id: String },
    #[error("store lock poisoned")]
    Poisoned,
    #[error("snapshot io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    SnapshotVersion(u32),
}

/// Fields supplied when registering a player; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlayer {
    pub name: String,
    pub contact: String,
}

/// The only way components touch persisted records.
///
/// Every method is atomic with respect to the others: creates are
/// compare-and-create on their unique key, and stats entries are replaced in
/// full. `flush` makes prior mutations durable for stores that persist.
pub trait Store: Send + Sync {
    fn find_player(&self, name: &str) -> Result<Option<Player>, StoreError>;
    fn get_player(&self, id: Uuid) -> Result<Option<Player>, StoreError>;
    /// Get-or-create by exact name. A contact held by another player is a [`StoreError::Conflict`].
    fn create_player(&self, player: NewPlayer) -> Result<Upsert<Player>, StoreError>;
    fn players(&self) -> Result<Vec<Player>, StoreError>;

    fn find_puzzle(&self, number: u32) -> Result<Option<Puzzle>, StoreError>;
    fn find_puzzle_by_date(&self, date: NaiveDate) -> Result<Option<Puzzle>, StoreError>;
    /// Get-or-create by number; the existing record is returned untouched.
    fn create_puzzle(&self, puzzle: Puzzle) -> Result<Upsert<Puzzle>, StoreError>;

    fn find_score(&self, key: ScoreKey) -> Result<Option<Score>, StoreError>;
    /// Compare-and-create on `(player, puzzle)`. An existing score keeps its guesses.
    fn create_score(&self, key: ScoreKey, guesses: Guesses) -> Result<Upsert<Score>, StoreError>;
    /// Inserts a fully formed score. Fails with [`StoreError::Immutable`] if the
    /// id or the `(player, puzzle)` pair is already stored.
    fn save_score(&self, score: Score) -> Result<(), StoreError>;
    /// Administrative removal; returns whether the score existed.
    fn delete_score(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Scores whose puzzle date falls in `range`, optionally for one player.
    fn dated_scores(
        &self,
        player_id: Option<Uuid>,
        range: DateRange,
    ) -> Result<Vec<DatedScore>, StoreError>;

    fn stats_entry(&self, key: StatsKey) -> Result<Option<StatsCacheEntry>, StoreError>;
    /// Replaces the entry for `entry.key()` in full, keeping the stored id if one exists.
    fn replace_stats_entry(&self, entry: StatsCacheEntry) -> Result<StatsCacheEntry, StoreError>;

    fn flush(&self) -> Result<(), StoreError>;
}

/// Serialized shape of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    players: Vec<Player>,
    puzzles: Vec<Puzzle>,
    scores: Vec<Score>,
    #[serde(default)]
    stats: Vec<StatsCacheEntry>,
}

#[derive(Debug, Default)]
struct Tables {
    players: HashMap<Uuid, Player>,
    player_by_name: HashMap<String, Uuid>,
    player_by_contact: HashMap<String, Uuid>,
    puzzles: HashMap<u32, Puzzle>,
    puzzle_by_date: HashMap<NaiveDate, u32>,
    scores: HashMap<Uuid, Score>,
    score_by_key: HashMap<ScoreKey, Uuid>,
    stats: HashMap<StatsKey, StatsCacheEntry>,
}

impl Tables {
    fn from_snapshot(snapshot: Snapshot) -> Result<Self, StoreError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::SnapshotVersion(snapshot.version));
        }
        let mut tables = Tables::default();
        for player in snapshot.players {
            tables.index_player(player);
        }
        for puzzle in snapshot.puzzles {
            tables.puzzle_by_date.insert(puzzle.date, puzzle.number);
            tables.puzzles.insert(puzzle.number, puzzle);
        }
        for score in snapshot.scores {
            tables.save_score(score)?;
        }
        for entry in snapshot.stats {
            tables.stats.insert(entry.key(), entry);
        }
        Ok(tables)
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut players: Vec<_> = self.players.values().cloned().collect();
        players.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        let mut puzzles: Vec<_> = self.puzzles.values().cloned().collect();
        puzzles.sort_by_key(|p| p.number);
        let mut scores: Vec<_> = self.scores.values().cloned().collect();
        scores.sort_by_key(|s| (s.puzzle_number, s.created_at, s.id));
        let mut stats: Vec<_> = self.stats.values().cloned().collect();
        stats.sort_by_key(|e| (e.player_id, e.period.to_string()));
        Snapshot {
            version: SNAPSHOT_VERSION,
            players,
            puzzles,
            scores,
            stats,
        }
    }

    fn index_player(&mut self, player: Player) {
        self.player_by_name.insert(player.name.clone(), player.id);
        self.player_by_contact.insert(player.contact.clone(), player.id);
        self.players.insert(player.id, player);
    }

    fn find_player(&self, name: &str) -> Option<Player> {
        self.player_by_name
            .get(name)
            .and_then(|id| self.players.get(id))
            .cloned()
    }

    fn create_player(&mut self, new: NewPlayer, now: DateTime<Utc>) -> Result<Upsert<Player>, StoreError> {
        if let Some(existing) = self.find_player(&new.name) {
            return Ok(Upsert::AlreadyExisted(existing));
        }
        if self.player_by_contact.contains_key(&new.contact) {
            return Err(StoreError::Conflict {
                field: "contact",
                value: new.contact,
            });
        }
        let player = Player {
            id: Uuid::new_v4(),
            name: new.name,
            contact: new.contact,
            created_at: now,
        };
        self.index_player(player.clone());
        Ok(Upsert::Created(player))
    }

    fn find_puzzle_by_date(&self, date: NaiveDate) -> Option<Puzzle> {
        self.puzzle_by_date
            .get(&date)
            .and_then(|number| self.puzzles.get(number))
            .cloned()
    }

    fn create_puzzle(&mut self, puzzle: Puzzle) -> Result<Upsert<Puzzle>, StoreError> {
        if let Some(existing) = self.puzzles.get(&puzzle.number) {
            return Ok(Upsert::AlreadyExisted(existing.clone()));
        }
        if self.puzzle_by_date.contains_key(&puzzle.date) {
            return Err(StoreError::Conflict {
                field: "puzzle date",
                value: puzzle.date.to_string(),
            });
        }
        self.puzzle_by_date.insert(puzzle.date, puzzle.number);
        self.puzzles.insert(puzzle.number, puzzle.clone());
        Ok(Upsert::Created(puzzle))
    }

    fn check_references(&self, key: ScoreKey) -> Result<(), StoreError> {
        if !self.players.contains_key(&key.player_id) {
            return Err(StoreError::UnknownReference {
                entity: "player",
                id: key.player_id.to_string(),
            });
        }
        if !self.puzzles.contains_key(&key.puzzle_number) {
            return Err(StoreError::UnknownReference {
                entity: "puzzle",
                id: format!("#{}", key.puzzle_number),
            });
        }
        Ok(())
    }

    fn find_score(&self, key: ScoreKey) -> Option<Score> {
        self.score_by_key
            .get(&key)
            .and_then(|id| self.scores.get(id))
            .cloned()
    }

    fn create_score(
        &mut self,
        key: ScoreKey,
        guesses: Guesses,
        now: DateTime<Utc>,
    ) -> Result<Upsert<Score>, StoreError> {
        if let Some(existing) = self.find_score(key) {
            return Ok(Upsert::AlreadyExisted(existing));
        }
        let score = Score {
            id: Uuid::new_v4(),
            player_id: key.player_id,
            puzzle_number: key.puzzle_number,
            guesses,
            created_at: now,
        };
        self.save_score(score.clone())?;
        Ok(Upsert::Created(score))
    }

    fn save_score(&mut self, score: Score) -> Result<(), StoreError> {
        let key = score.key();
        if self.scores.contains_key(&score.id) || self.score_by_key.contains_key(&key) {
            return Err(StoreError::Immutable(key));
        }
        self.check_references(key)?;
        self.score_by_key.insert(key, score.id);
        self.scores.insert(score.id, score);
        Ok(())
    }

    fn delete_score(&mut self, id: Uuid) -> bool {
        match self.scores.remove(&id) {
            Some(score) => {
                self.score_by_key.remove(&score.key());
                true
            }
            None => false,
        }
    }

    fn dated_scores(&self, player_id: Option<Uuid>, range: DateRange) -> Vec<DatedScore> {
        let mut rows: Vec<DatedScore> = self
            .scores
            .values()
            .filter(|score| player_id.map_or(true, |id| score.player_id == id))
            .filter_map(|score| {
                let date = self.puzzles.get(&score.puzzle_number)?.date;
                range.contains(date).then(|| DatedScore {
                    score: score.clone(),
                    date,
                })
            })
            .collect();
        rows.sort_by_key(|row| (row.date, row.score.player_id));
        rows
    }

    fn replace_stats_entry(&mut self, mut entry: StatsCacheEntry) -> Result<StatsCacheEntry, StoreError> {
        if !self.players.contains_key(&entry.player_id) {
            return Err(StoreError::UnknownReference {
                entity: "player",
                id: entry.player_id.to_string(),
            });
        }
        let key = entry.key();
        if let Some(previous) = self.stats.get(&key) {
            entry.id = previous.id;
        }
        self.stats.insert(key, entry.clone());
        Ok(entry)
    }
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for MemoryStore {
    fn find_player(&self, name: &str) -> Result<Option<Player>, StoreError> {
        Ok(self.read()?.find_player(name))
    }

    fn get_player(&self, id: Uuid) -> Result<Option<Player>, StoreError> {
        Ok(self.read()?.players.get(&id).cloned())
    }

    fn create_player(&self, player: NewPlayer) -> Result<Upsert<Player>, StoreError> {
        self.write()?.create_player(player, Utc::now())
    }

    fn players(&self) -> Result<Vec<Player>, StoreError> {
        let mut players: Vec<_> = self.read()?.players.values().cloned().collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(players)
    }

    fn find_puzzle(&self, number: u32) -> Result<Option<Puzzle>, StoreError> {
        Ok(self.read()?.puzzles.get(&number).cloned())
    }

    fn find_puzzle_by_date(&self, date: NaiveDate) -> Result<Option<Puzzle>, StoreError> {
        Ok(self.read()?.find_puzzle_by_date(date))
    }

    fn create_puzzle(&self, puzzle: Puzzle) -> Result<Upsert<Puzzle>, StoreError> {
        self.write()?.create_puzzle(puzzle)
    }

    fn find_score(&self, key: ScoreKey) -> Result<Option<Score>, StoreError> {
        Ok(self.read()?.find_score(key))
    }

    fn create_score(&self, key: ScoreKey, guesses: Guesses) -> Result<Upsert<Score>, StoreError> {
        self.write()?.create_score(key, guesses, Utc::now())
    }

    fn save_score(&self, score: Score) -> Result<(), StoreError> {
        self.write()?.save_score(score)
    }

    fn delete_score(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.write()?.delete_score(id))
    }

    fn dated_scores(
        &self,
        player_id: Option<Uuid>,
        range: DateRange,
    ) -> Result<Vec<DatedScore>, StoreError> {
        Ok(self.read()?.dated_scores(player_id, range))
    }

    fn stats_entry(&self, key: StatsKey) -> Result<Option<StatsCacheEntry>, StoreError> {
        Ok(self.read()?.stats.get(&key).cloned())
    }

    fn replace_stats_entry(&self, entry: StatsCacheEntry) -> Result<StatsCacheEntry, StoreError> {
        self.write()?.replace_stats_entry(entry)
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store persisted as a single JSON snapshot file.
///
/// Mutations apply in memory immediately; `flush` rewrites the snapshot via a
/// temp file and an atomic rename, so readers never see a partial file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    dirty: AtomicBool,
    /// Held from the dirty check until the rename, so snapshots land in order.
    flush_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens the snapshot at `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = match fs::read_to_string(&path) {
            Ok(text) => Tables::from_snapshot(serde_json::from_str(&text)?)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        info!(
            path = %path.display(),
            players = tables.players.len(),
            puzzles = tables.puzzles.len(),
            scores = tables.scores.len(),
            "opened snapshot store"
        );
        Ok(Self {
            path,
            inner: MemoryStore {
                tables: RwLock::new(tables),
            },
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn write_snapshot(&self, bytes: &[u8]) -> Result<(), StoreError> {
        write_atomically(&self.path, bytes)
    }
}

/// Writes `bytes` to a fresh temp file beside `path`, syncs it, then renames it into place.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| io_error(&parent, e))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let written = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error(&temp_path, err));
    }

    fs::rename(&temp_path, path).map_err(|err| {
        let _ = fs::remove_file(&temp_path);
        io_error(path, err)
    })
}

impl Store for JsonFileStore {
    fn find_player(&self, name: &str) -> Result<Option<Player>, StoreError> {
        self.inner.find_player(name)
    }

    fn get_player(&self, id: Uuid) -> Result<Option<Player>, StoreError> {
        self.inner.get_player(id)
    }

    fn create_player(&self, player: NewPlayer) -> Result<Upsert<Player>, StoreError> {
        let outcome = self.inner.create_player(player)?;
        if outcome.is_created() {
            self.mark_dirty();
        }
        Ok(outcome)
    }

    fn players(&self) -> Result<Vec<Player>, StoreError> {
        self.inner.players()
    }

    fn find_puzzle(&self, number: u32) -> Result<Option<Puzzle>, StoreError> {
        self.inner.find_puzzle(number)
    }

    fn find_puzzle_by_date(&self, date: NaiveDate) -> Result<Option<Puzzle>, StoreError> {
        self.inner.find_puzzle_by_date(date)
    }

    fn create_puzzle(&self, puzzle: Puzzle) -> Result<Upsert<Puzzle>, StoreError> {
        let outcome = self.inner.create_puzzle(puzzle)?;
        if outcome.is_created() {
            self.mark_dirty();
        }
        Ok(outcome)
    }

    fn find_score(&self, key: ScoreKey) -> Result<Option<Score>, StoreError> {
        self.inner.find_score(key)
    }

    fn create_score(&self, key: ScoreKey, guesses: Guesses) -> Result<Upsert<Score>, StoreError> {
        let outcome = self.inner.create_score(key, guesses)?;
        if outcome.is_created() {
            self.mark_dirty();
        }
        Ok(outcome)
    }

    fn save_score(&self, score: Score) -> Result<(), StoreError> {
        self.inner.save_score(score)?;
        self.mark_dirty();
        Ok(())
    }

    fn delete_score(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.inner.delete_score(id)?;
        if removed {
            self.mark_dirty();
        }
        Ok(removed)
    }

    fn dated_scores(
        &self,
        player_id: Option<Uuid>,
        range: DateRange,
    ) -> Result<Vec<DatedScore>, StoreError> {
        self.inner.dated_scores(player_id, range)
    }

    fn stats_entry(&self, key: StatsKey) -> Result<Option<StatsCacheEntry>, StoreError> {
        self.inner.stats_entry(key)
    }

    fn replace_stats_entry(&self, entry: StatsCacheEntry) -> Result<StatsCacheEntry, StoreError> {
        let stored = self.inner.replace_stats_entry(entry)?;
        self.mark_dirty();
        Ok(stored)
    }

    fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().map_err(|_| StoreError::Poisoned)?;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        // Serialize under the read lock so the snapshot is a consistent cut.
        let bytes = {
            let tables = self.inner.read()?;
            serde_json::to_vec_pretty(&tables.to_snapshot())?
        };
        if let Err(err) = self.write_snapshot(&bytes) {
            self.mark_dirty();
            return Err(err);
        }
        debug!(path = %self.path.display(), bytes = bytes.len(), "flushed snapshot");
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Immutable archive of raw export files, addressed by content hash.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_relative_path(
        &self,
        archived_at: DateTime<Utc>,
        kind: &str,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let stamp = archived_at.format("%Y%m%d_%H%M%S").to_string();
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        PathBuf::from(stamp)
            .join(kind)
            .join(format!("{content_hash}.{ext}"))
    }

    /// Store bytes immutably using a hash-addressed path and atomic temp-file rename.
    pub fn store_bytes(
        &self,
        archived_at: DateTime<Utc>,
        kind: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let content_hash = sha256_hex(bytes);
        let relative_path = self.artifact_relative_path(archived_at, kind, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);
        let artifact = |deduplicated| StoredArtifact {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        if absolute_path.exists() {
            debug!(path = %absolute_path.display(), "artifact already archived");
            return Ok(artifact(true));
        }
        write_atomically(&absolute_path, bytes)
            .with_context(|| format!("archiving {kind} input as {}", absolute_path.display()))?;
        Ok(artifact(false))
    }
}
