//! Parsers for the raw exports: the puzzle announcement log, the derived
//! `#<number>,<WORD>` puzzle CSV, and the player-by-date score matrix.
//!
//! Files are read whole (a structural failure aborts the import); parsing
//! over the loaded content is lazy and can be restarted by asking again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use wordle_core::IngestError;

pub const CRATE_NAME: &str = "wordle-adapters";

/// First cell of a score-matrix header row.
pub const HEADER_MARKER: &str = "DATE";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("csv framing: {0}")]
    Csv(#[from] csv::Error),
}

/// One `(number, word)` pair recovered from a puzzle source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleEntry {
    pub number: u32,
    pub word: String,
    /// 1-based line (or row) the entry came from.
    pub line: usize,
}

fn puzzle_log_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Day\s+(\d+),.*:\s+(\w+)").expect("puzzle log pattern compiles")
    })
}

fn normalize_word(raw: &str, location: &str) -> Result<String, IngestError> {
    let word = raw.trim().to_ascii_uppercase();
    if word.len() == 5 && word.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(word)
    } else {
        Err(IngestError::malformed(
            location,
            format!("answer {raw:?} is not a five-letter word"),
        ))
    }
}

/// Parses one log line such as `Day 0, Jun 19 2021: CIGAR`.
///
/// Returns `None` for lines that do not look like an announcement at all.
pub fn parse_puzzle_line(line: &str, line_no: usize) -> Option<Result<PuzzleEntry, IngestError>> {
    let captures = puzzle_log_pattern().captures(line)?;
    let location = format!("line {line_no}");
    let parsed = captures[1]
        .parse::<u32>()
        .map_err(|_| {
            IngestError::malformed(
                &location,
                format!("puzzle number {:?} out of range", &captures[1]),
            )
        })
        .and_then(|number| {
            Ok(PuzzleEntry {
                number,
                word: normalize_word(&captures[2], &location)?,
                line: line_no,
            })
        });
    Some(parsed)
}

/// Lazy parser over puzzle log lines. Cloning it restarts from the same input.
#[derive(Debug, Clone)]
pub struct PuzzleLogParser<I> {
    lines: I,
    line_no: usize,
}

impl<I> PuzzleLogParser<I> {
    pub fn new<T>(lines: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            lines: lines.into_iter(),
            line_no: 0,
        }
    }
}

impl<I, S> Iterator for PuzzleLogParser<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = Result<PuzzleEntry, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            if let Some(parsed) = parse_puzzle_line(line.as_ref(), self.line_no) {
                return Some(parsed);
            }
        }
        None
    }
}

/// Parses `#<number>,<WORD>` rows. Rows without a `#` cell are ignored.
pub fn parse_puzzle_rows<'a, R>(
    rows: impl IntoIterator<Item = R> + 'a,
) -> impl Iterator<Item = Result<PuzzleEntry, IngestError>> + 'a
where
    R: AsRef<[String]> + 'a,
{
    rows.into_iter().enumerate().filter_map(|(index, row)| {
        let row = row.as_ref();
        let line = index + 1;
        let number_cell = row.first()?.trim();
        let word_cell = row.get(1)?;
        let digits = number_cell.strip_prefix('#')?;
        let location = format!("row {line}");
        let parsed = match digits.trim().parse::<u32>() {
            Ok(number) => normalize_word(word_cell, &location).map(|word| PuzzleEntry {
                number,
                word,
                line,
            }),
            Err(_) => Err(IngestError::malformed(
                location,
                format!("could not parse puzzle number {number_cell:?}"),
            )),
        };
        Some(parsed)
    })
}

/// Writes entries in the derived `#<number>,<WORD>` form, returning the row count.
pub fn write_puzzle_csv<'a, W: io::Write>(
    entries: impl IntoIterator<Item = &'a PuzzleEntry>,
    writer: W,
) -> Result<usize, AdapterError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    let mut written = 0;
    for entry in entries {
        csv_writer.write_record([format!("#{}", entry.number), entry.word.clone()])?;
        written += 1;
    }
    csv_writer
        .flush()
        .map_err(|source| AdapterError::Io {
            path: PathBuf::from("<puzzle csv writer>"),
            source,
        })?;
    Ok(written)
}

/// Reads every row of a headerless, ragged CSV document.
pub fn csv_rows_from_reader<R: io::Read>(reader: R) -> Result<Vec<Vec<String>>, AdapterError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    csv_reader
        .records()
        .map(|record| -> Result<Vec<String>, AdapterError> {
            Ok(record?.iter().map(str::to_string).collect())
        })
        .collect()
}

/// Reads a derived puzzle CSV; rows are filtered as in [`parse_puzzle_rows`].
pub fn parse_puzzle_csv<R: io::Read>(
    reader: R,
) -> Result<Vec<Result<PuzzleEntry, IngestError>>, AdapterError> {
    let rows = csv_rows_from_reader(reader)?;
    Ok(parse_puzzle_rows(rows.iter()).collect())
}

pub fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>, AdapterError> {
    let file = fs::File::open(path).map_err(|source| AdapterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    csv_rows_from_reader(io::BufReader::new(file))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PuzzleFormat {
    /// `.csv` files are read as the derived CSV, everything else as a log.
    #[default]
    Auto,
    Log,
    Csv,
}

impl PuzzleFormat {
    pub fn resolve(self, path: &Path) -> PuzzleFormat {
        match self {
            PuzzleFormat::Auto => {
                let is_csv = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
                if is_csv {
                    PuzzleFormat::Csv
                } else {
                    PuzzleFormat::Log
                }
            }
            explicit => explicit,
        }
    }
}

/// A loaded puzzle export, parsed on demand.
#[derive(Debug, Clone)]
pub enum PuzzleSource {
    Log(String),
    Csv(Vec<Vec<String>>),
}

impl PuzzleSource {
    pub fn load(path: &Path, format: PuzzleFormat) -> Result<Self, AdapterError> {
        match format.resolve(path) {
            PuzzleFormat::Csv => Ok(Self::Csv(read_csv_rows(path)?)),
            _ => fs::read_to_string(path)
                .map(Self::Log)
                .map_err(|source| AdapterError::Io {
                    path: path.to_path_buf(),
                    source,
                }),
        }
    }

    pub fn entries(&self) -> Box<dyn Iterator<Item = Result<PuzzleEntry, IngestError>> + '_> {
        match self {
            Self::Log(text) => Box::new(PuzzleLogParser::new(text.lines())),
            Self::Csv(rows) => Box::new(parse_puzzle_rows(rows.iter())),
        }
    }
}

/// One `(player, date, guesses)` observation from the score matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTriple {
    pub player: String,
    pub date: NaiveDate,
    /// Raw integer; range checking belongs to normalization.
    pub guesses: i64,
    pub row: usize,
    pub column: usize,
}

/// Parses `day/month/year`.
pub fn parse_matrix_date(cell: &str) -> Option<NaiveDate> {
    let mut parts = cell.trim().split('/');
    let day = parts.next()?.trim().parse().ok()?;
    let month = parts.next()?.trim().parse().ok()?;
    let year = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// The most recently seen header row: one optional date per data column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixHeader {
    pub row: usize,
    pub dates: Vec<Option<NaiveDate>>,
}

impl MatrixHeader {
    pub fn date_at(&self, column: usize) -> Option<NaiveDate> {
        self.dates.get(column).copied().flatten()
    }

    /// Folds one row into the header state, yielding that row's output.
    fn absorb(&mut self, row_no: usize, row: &[String]) -> Vec<Result<ScoreTriple, IngestError>> {
        let Some(first) = row.first().map(|cell| cell.trim()) else {
            return Vec::new();
        };
        if first.is_empty() {
            return Vec::new();
        }

        if first == HEADER_MARKER {
            let mut issues = Vec::new();
            self.row = row_no;
            self.dates = row[1..]
                .iter()
                .enumerate()
                .map(|(index, cell)| {
                    let cell = cell.trim();
                    if cell.is_empty() {
                        return None;
                    }
                    let date = parse_matrix_date(cell);
                    if date.is_none() {
                        issues.push(Err(IngestError::malformed(
                            format!("row {row_no}, column {}", index + 2),
                            format!("header date {cell:?} is not day/month/year"),
                        )));
                    }
                    date
                })
                .collect();
            debug!(row = row_no, columns = self.dates.len(), "score matrix header");
            return issues;
        }

        row[1..]
            .iter()
            .enumerate()
            .filter_map(|(index, cell)| {
                let date = self.date_at(index)?;
                let cell = cell.trim();
                if cell.is_empty() {
                    return None;
                }
                let column = index + 2;
                Some(match cell.parse::<i64>() {
                    Ok(guesses) => Ok(ScoreTriple {
                        player: first.to_string(),
                        date,
                        guesses,
                        row: row_no,
                        column,
                    }),
                    Err(_) => Err(IngestError::malformed(
                        format!("row {row_no}, column {column}"),
                        format!("{cell:?} is not a guess count"),
                    )),
                })
            })
            .collect()
    }
}

/// Lazily turns score-matrix rows into triples in row-then-column order.
///
/// The only state carried between rows is the current [`MatrixHeader`].
pub fn parse_score_matrix<'a, R>(
    rows: impl IntoIterator<Item = R> + 'a,
) -> impl Iterator<Item = Result<ScoreTriple, IngestError>> + 'a
where
    R: AsRef<[String]> + 'a,
{
    rows.into_iter()
        .enumerate()
        .scan(MatrixHeader::default(), |header, (index, row)| {
            Some(header.absorb(index + 1, row.as_ref()))
        })
        .flatten()
}

/// A loaded score matrix, parsed on demand.
#[derive(Debug, Clone)]
pub struct ScoreMatrix {
    rows: Vec<Vec<String>>,
}

impl ScoreMatrix {
    pub fn load(path: &Path) -> Result<Self, AdapterError> {
        Ok(Self {
            rows: read_csv_rows(path)?,
        })
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, AdapterError> {
        Ok(Self {
            rows: csv_rows_from_reader(reader)?,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn triples(&self) -> impl Iterator<Item = Result<ScoreTriple, IngestError>> + '_ {
        parse_score_matrix(self.rows.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rows(text: &str) -> Vec<Vec<String>> {
        csv_rows_from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn parses_announcement_line() {
        let entry = parse_puzzle_line("    Day 0, Jun 19 2021: CIGAR", 1)
            .unwrap()
            .unwrap();
        assert_eq!(entry.number, 0);
        assert_eq!(entry.word, "CIGAR");
    }

    #[test]
    fn uppercases_words_and_ignores_prose() {
        let log = "Wordle answers so far\n\nDay 1, Jun 20 2021: rebut\nnot a puzzle\nDay 2, Jun 21 2021: Sissy\n";
        let entries: Vec<_> = PuzzleLogParser::new(log.lines())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            entries,
            vec![
                PuzzleEntry { number: 1, word: "REBUT".into(), line: 3 },
                PuzzleEntry { number: 2, word: "SISSY".into(), line: 5 },
            ]
        );
    }

    #[test]
    fn log_parser_restarts_when_cloned() {
        let lines = vec!["Day 3, Jun 22 2021: HUMPH", "Day 4, Jun 23 2021: AWAKE"];
        let parser = PuzzleLogParser::new(lines.iter());
        assert_eq!(parser.clone().count(), 2);
        assert_eq!(parser.count(), 2);
    }

    #[test]
    fn overflowing_number_and_bad_word_are_malformed() {
        let log = "Day 99999999999, Jan 1 2300: CIGAR\nDay 5, Jun 24 2021: TOOLONG";
        let results: Vec<_> = PuzzleLogParser::new(log.lines()).collect();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(IngestError::MalformedInput { .. }))));
    }

    #[test]
    fn puzzle_csv_round_trip_keeps_order() {
        let entries = vec![
            PuzzleEntry { number: 0, word: "CIGAR".into(), line: 1 },
            PuzzleEntry { number: 1, word: "REBUT".into(), line: 2 },
        ];
        let mut buffer = Vec::new();
        assert_eq!(write_puzzle_csv(&entries, &mut buffer).unwrap(), 2);
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["#0,CIGAR", "#1,REBUT"]);

        let parsed: Vec<_> = parse_puzzle_csv(text.as_bytes())
            .unwrap()
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn puzzle_csv_skips_unmarked_rows_and_flags_bad_numbers() {
        let parsed: Vec<_> = parse_puzzle_rows(rows("Number,Word\n#12,pause\n#x1,oops\n#7\n")).collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].as_ref().unwrap().word, "PAUSE");
        assert!(matches!(parsed[1], Err(IngestError::MalformedInput { .. })));
    }

    #[test]
    fn format_resolves_from_extension() {
        assert_eq!(PuzzleFormat::Auto.resolve(Path::new("words.CSV")), PuzzleFormat::Csv);
        assert_eq!(PuzzleFormat::Auto.resolve(Path::new("words.txt")), PuzzleFormat::Log);
        assert_eq!(PuzzleFormat::Log.resolve(Path::new("words.csv")), PuzzleFormat::Log);
    }

    #[test]
    fn matrix_dates_are_day_month_year() {
        assert_eq!(parse_matrix_date("01/02/2022"), Some(ymd(2022, 2, 1)));
        assert_eq!(parse_matrix_date(" 5/1/2022 "), Some(ymd(2022, 1, 5)));
        assert_eq!(parse_matrix_date("31/02/2022"), None);
        assert_eq!(parse_matrix_date("2022-01-01"), None);
        assert_eq!(parse_matrix_date("1/1/2022/9"), None);
    }

    #[test]
    fn matrix_rows_follow_latest_header() {
        let matrix = rows(
            "DATE,01/01/2022,02/01/2022\n\
             Alice,4,\n\
             Bob,X,3\n\
             DATE,03/01/2022\n\
             Alice,7,5\n",
        );
        let triples: Vec<_> = parse_score_matrix(&matrix).collect();

        let ok: Vec<_> = triples.iter().filter_map(|t| t.as_ref().ok()).collect();
        assert_eq!(ok.len(), 3);
        assert_eq!((ok[0].player.as_str(), ok[0].date, ok[0].guesses), ("Alice", ymd(2022, 1, 1), 4));
        assert_eq!((ok[1].player.as_str(), ok[1].date, ok[1].guesses), ("Bob", ymd(2022, 1, 2), 3));
        // The second header has one column, so Alice's trailing 5 has no date.
        assert_eq!((ok[2].player.as_str(), ok[2].date, ok[2].guesses), ("Alice", ymd(2022, 1, 3), 7));

        let malformed: Vec<_> = triples.iter().filter(|t| t.is_err()).collect();
        assert_eq!(malformed.len(), 1);
    }

    #[test]
    fn unparseable_header_cell_leaves_a_gap() {
        let matrix = rows("DATE,someday,02/01/2022\nAlice,3,4\n");
        let triples: Vec<_> = parse_score_matrix(&matrix).collect();
        assert_eq!(triples.len(), 2);
        assert!(triples[0].is_err());
        let triple = triples[1].as_ref().unwrap();
        assert_eq!(triple.date, ymd(2022, 1, 2));
        assert_eq!(triple.column, 3);
    }

    #[test]
    fn rows_before_any_header_and_blank_names_are_skipped() {
        let matrix = rows("Alice,3\n,4\nDATE,01/01/2022\n  ,5\n");
        assert_eq!(parse_score_matrix(&matrix).count(), 0);
    }

    #[test]
    fn score_matrix_reads_from_any_reader() {
        let matrix = ScoreMatrix::from_reader("DATE,01/01/2022\nAlice,4\n".as_bytes()).unwrap();
        assert_eq!(matrix.row_count(), 2);
        let triples: Vec<_> = matrix.triples().collect::<Result<_, _>>().unwrap();
        assert_eq!(triples[0].player, "Alice");
        assert_eq!(matrix.triples().count(), 1);
    }
}
