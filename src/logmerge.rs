// src/logmerge.rs
//
// LogMerger: k-way merge of timestamped simulator log streams into one
// globally time-ordered stream.
//
// Each source is read lazily, one line at a time, behind a Cursor that
// tracks the line's logical time and a simulation-epoch counter. The
// epoch increments whenever the embedded clock resets to a lower value,
// which happens at the start of each repeated trial logged into the same
// file. The merge itself is a min-heap over (epoch, time) cursor keys.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Component, Path, PathBuf};

use regex::Regex;

/// Sentinel logical time for a line with no parseable timestamp.
/// Signals end-of-meaningful-order for that source.
pub const TIME_INFINITE: u64 = u64::MAX;

/// Timestamp extractor for log lines.
///
/// A pattern must capture the decimal timestamp in group 1. Two stock
/// shapes cover the simulator's log formats; `custom` accepts anything
/// else.
#[derive(Debug, Clone)]
pub struct TimePattern {
    re: Regex,
}

impl TimePattern {
    /// Leading decimal integer: `^\s*(\d+)`.
    pub fn leading() -> Self {
        Self {
            re: Regex::new(r"^\s*(\d+)").unwrap(),
        }
    }

    /// Decimal integer after a pipe-delimited source tag:
    /// `^\d+\|\s*(\d+)` (the shape of already-merged output).
    pub fn tagged() -> Self {
        Self {
            re: Regex::new(r"^\d+\|\s*(\d+)").unwrap(),
        }
    }

    /// Custom pattern; the timestamp must be capture group 1.
    pub fn custom(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            re: Regex::new(pattern)?,
        })
    }

    /// Extract the logical time of a line, if any.
    pub fn extract(&self, line: &str) -> Option<u64> {
        self.re
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
    }
}

/// How a decreasing timestamp within one source is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// A decrease starts a new simulation epoch within the file.
    #[default]
    EpochAware,
    /// A decrease is an OrderingViolation (no epoch support).
    Strict,
}

/// Errors raised while merging log streams.
#[derive(Debug)]
pub enum MergeError {
    /// Read or write failure, tagged with the stream it came from.
    Io { source: String, message: String },
    /// Strict mode: a source's timestamps went backwards.
    OrderingViolation {
        source: String,
        line: u64,
        prev: u64,
        time: u64,
    },
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::Io { source, message } => {
                write!(f, "I/O error on '{}': {}", source, message)
            }
            MergeError::OrderingViolation {
                source,
                line,
                prev,
                time,
            } => {
                write!(
                    f,
                    "ordering violation in '{}' at line {}: time {} after {}",
                    source, line, time, prev
                )
            }
        }
    }
}

impl std::error::Error for MergeError {}

/// One named, readable log source. The reader is owned: dropping the
/// merge (early or not) closes whatever is left unread.
pub struct LogSource {
    pub name: String,
    reader: Box<dyn BufRead>,
}

impl LogSource {
    pub fn new(name: impl Into<String>, reader: Box<dyn BufRead>) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }

    /// Open a file as a source named by its display name.
    pub fn open(path: &Path, name: impl Into<String>) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(name, Box::new(BufReader::new(file))))
    }
}

/// Per-source read cursor: holds the next unread line and its merge key.
///
/// Invariant: (epoch, time) pairs are non-decreasing as lines are
/// consumed in file order, which is what makes the global merge correct.
struct Cursor {
    name: String,
    reader: Box<dyn BufRead>,
    line: String,
    epoch: u64,
    time: u64,
    line_number: u64,
    ties: u64,
}

impl Cursor {
    /// Prime a cursor by reading the first line. Returns None for an
    /// empty source.
    fn prime(source: LogSource, pattern: &TimePattern) -> Result<Option<Self>, MergeError> {
        let LogSource { name, mut reader } = source;
        let first = match read_line(&mut reader, &name)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let time = pattern.extract(&first).unwrap_or(TIME_INFINITE);
        Ok(Some(Self {
            name,
            reader,
            line: first,
            epoch: 0,
            time,
            line_number: 1,
            ties: 0,
        }))
    }

    fn key(&self) -> (u64, u64) {
        (self.epoch, self.time)
    }

    /// Swap the held line for the next physical line and recompute the
    /// key. Returns the emitted (previous) line, or None once exhausted.
    fn advance(
        &mut self,
        pattern: &TimePattern,
        mode: MergeMode,
    ) -> Result<Option<String>, MergeError> {
        let next = match read_line(&mut self.reader, &self.name)? {
            Some(line) => line,
            None => return Ok(None),
        };
        self.line_number += 1;
        match pattern.extract(&next) {
            Some(t) if t < self.time => match mode {
                MergeMode::EpochAware => {
                    self.epoch += 1;
                    self.time = t;
                }
                MergeMode::Strict => {
                    return Err(MergeError::OrderingViolation {
                        source: self.name.clone(),
                        line: self.line_number,
                        prev: self.time,
                        time: t,
                    });
                }
            },
            Some(t) => {
                if t == self.time {
                    self.ties += 1;
                }
                self.time = t;
            }
            None => self.time = TIME_INFINITE,
        }
        Ok(Some(std::mem::replace(&mut self.line, next)))
    }
}

/// Read one line, stripping the trailing newline. Ok(None) at EOF.
fn read_line(reader: &mut dyn BufRead, source: &str) -> Result<Option<String>, MergeError> {
    let mut buf = String::new();
    let n = reader.read_line(&mut buf).map_err(|e| MergeError::Io {
        source: source.to_string(),
        message: e.to_string(),
    })?;
    if n == 0 {
        return Ok(None);
    }
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }
    Ok(Some(buf))
}

/// One merged output line.
#[derive(Debug, Clone)]
pub struct MergedLine {
    /// Index of the originating source (see `MergeIter::source_name`).
    pub source_index: usize,
    pub epoch: u64,
    pub time: u64,
    pub text: String,
}

/// Counters reported after (or during) a merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    /// Lines emitted.
    pub lines: u64,
    /// Lines whose parsed time equaled the previous line's time from the
    /// same source. A sanity metric on the input, never an ordering input.
    pub ties: u64,
}

/// Pull-based merged stream. Dropping it early drops every remaining
/// cursor and its reader; nothing leaks.
pub struct MergeIter {
    cursors: Vec<Cursor>,
    heap: BinaryHeap<Reverse<(u64, u64, usize)>>,
    pattern: TimePattern,
    mode: MergeMode,
    lines: u64,
}

impl MergeIter {
    fn new(
        sources: Vec<LogSource>,
        pattern: TimePattern,
        mode: MergeMode,
    ) -> Result<Self, MergeError> {
        let mut cursors = Vec::with_capacity(sources.len());
        for source in sources {
            if let Some(cursor) = Cursor::prime(source, &pattern)? {
                cursors.push(cursor);
            }
        }
        let heap = cursors
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let (epoch, time) = c.key();
                Reverse((epoch, time, i))
            })
            .collect();
        Ok(Self {
            cursors,
            heap,
            pattern,
            mode,
            lines: 0,
        })
    }

    /// Display name of the source behind `source_index`.
    pub fn source_name(&self, index: usize) -> &str {
        &self.cursors[index].name
    }

    /// Counters so far; complete once the iterator is exhausted.
    pub fn stats(&self) -> MergeStats {
        MergeStats {
            lines: self.lines,
            ties: self.cursors.iter().map(|c| c.ties).sum(),
        }
    }
}

impl Iterator for MergeIter {
    type Item = Result<MergedLine, MergeError>;

    fn next(&mut self) -> Option<Self::Item> {
        // Pop the minimum-key cursor; the index is part of the key so
        // ties across sources break deterministically within one run.
        let Reverse((epoch, time, index)) = self.heap.pop()?;
        let cursor = &mut self.cursors[index];
        match cursor.advance(&self.pattern, self.mode) {
            Ok(Some(text)) => {
                // Still Ready: reinsert under the new key.
                let (e, t) = cursor.key();
                self.heap.push(Reverse((e, t, index)));
                self.lines += 1;
                Some(Ok(MergedLine {
                    source_index: index,
                    epoch,
                    time,
                    text,
                }))
            }
            Ok(None) => {
                // Exhausted: emit the held line, drop the cursor from
                // the rotation permanently.
                self.lines += 1;
                Some(Ok(MergedLine {
                    source_index: index,
                    epoch,
                    time,
                    text: std::mem::take(&mut self.cursors[index].line),
                }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Configured log merger: a timestamp pattern plus a merge mode.
#[derive(Debug, Clone)]
pub struct LogMerger {
    pattern: TimePattern,
    mode: MergeMode,
}

impl LogMerger {
    pub fn new(pattern: TimePattern, mode: MergeMode) -> Self {
        Self { pattern, mode }
    }

    /// Lazily merged stream over the given sources.
    pub fn iter(&self, sources: Vec<LogSource>) -> Result<MergeIter, MergeError> {
        MergeIter::new(sources, self.pattern.clone(), self.mode)
    }

    /// Drive the merge to completion, writing each line prefixed by its
    /// source name right-justified to the widest name, `|`-separated.
    pub fn merge<W: Write>(
        &self,
        sources: Vec<LogSource>,
        out: &mut W,
    ) -> Result<MergeStats, MergeError> {
        let width = sources.iter().map(|s| s.name.len()).max().unwrap_or(0);
        let mut iter = self.iter(sources)?;
        while let Some(merged) = iter.next() {
            let merged = merged?;
            let name = iter.source_name(merged.source_index);
            writeln!(out, "{:>width$}|{}", name, merged.text).map_err(|e| MergeError::Io {
                source: "<output>".to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(iter.stats())
    }
}

/// Display names for a set of source paths: the common leading directory
/// components are stripped, leaving the shortest distinguishing suffix.
pub fn display_names(paths: &[PathBuf]) -> Vec<String> {
    let parents: Vec<Vec<Component>> = paths
        .iter()
        .map(|p| p.parent().unwrap_or(Path::new("")).components().collect())
        .collect();

    let common = match parents.iter().map(|c| c.len()).min() {
        Some(min_len) => {
            let mut n = 0;
            while n < min_len && parents.iter().all(|c| c[n] == parents[0][n]) {
                n += 1;
            }
            n
        }
        None => 0,
    };

    paths
        .iter()
        .map(|p| {
            let stripped: PathBuf = p.components().skip(common).collect();
            stripped.display().to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn source(name: &str, text: &str) -> LogSource {
        LogSource::new(name, Box::new(IoCursor::new(text.to_string().into_bytes())))
    }

    #[test]
    fn test_leading_pattern() {
        let p = TimePattern::leading();
        assert_eq!(p.extract("  42 agent arrived"), Some(42));
        assert_eq!(p.extract("42|message"), Some(42));
        assert_eq!(p.extract("no time here"), None);
    }

    #[test]
    fn test_tagged_pattern() {
        let p = TimePattern::tagged();
        assert_eq!(p.extract("3| 42 agent arrived"), Some(42));
        assert_eq!(p.extract("  42 agent arrived"), None);
    }

    #[test]
    fn test_epoch_increments_on_reset() {
        // Times [5, 8, 2, 9]: clock resets at the third line.
        let merger = LogMerger::new(TimePattern::leading(), MergeMode::EpochAware);
        let iter = merger
            .iter(vec![source("a.log", "5 x\n8 y\n2 z\n9 w\n")])
            .unwrap();
        let keys: Vec<(u64, u64)> = iter.map(|r| r.map(|l| (l.epoch, l.time)).unwrap()).collect();
        assert_eq!(keys, vec![(0, 5), (0, 8), (1, 2), (1, 9)]);
    }

    #[test]
    fn test_strict_mode_rejects_reset() {
        let merger = LogMerger::new(TimePattern::leading(), MergeMode::Strict);
        let mut out = Vec::new();
        let err = merger
            .merge(vec![source("a.log", "5 x\n8 y\n2 z\n9 w\n")], &mut out)
            .unwrap_err();
        match err {
            MergeError::OrderingViolation {
                source,
                line,
                prev,
                time,
            } => {
                assert_eq!(source, "a.log");
                assert_eq!(line, 3);
                assert_eq!(prev, 8);
                assert_eq!(time, 2);
            }
            other => panic!("expected OrderingViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_line_takes_sentinel() {
        let merger = LogMerger::new(TimePattern::leading(), MergeMode::EpochAware);
        let iter = merger
            .iter(vec![source("a.log", "1 x\ntrailer without time\n")])
            .unwrap();
        let keys: Vec<(u64, u64)> = iter.map(|r| r.map(|l| (l.epoch, l.time)).unwrap()).collect();
        assert_eq!(keys, vec![(0, 1), (0, TIME_INFINITE)]);
    }

    #[test]
    fn test_empty_source_is_skipped() {
        let merger = LogMerger::new(TimePattern::leading(), MergeMode::EpochAware);
        let mut out = Vec::new();
        let stats = merger
            .merge(
                vec![source("empty.log", ""), source("a.log", "1 x\n")],
                &mut out,
            )
            .unwrap();
        assert_eq!(stats.lines, 1);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "    a.log|1 x\n");
    }

    #[test]
    fn test_name_justified_to_widest() {
        let merger = LogMerger::new(TimePattern::leading(), MergeMode::EpochAware);
        let mut out = Vec::new();
        merger
            .merge(
                vec![source("ab", "1 x\n"), source("longer", "2 y\n")],
                &mut out,
            )
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "    ab|1 x\nlonger|2 y\n");
    }

    #[test]
    fn test_display_names_strip_common_prefix() {
        let paths = vec![
            PathBuf::from("/runs/exp1/a/sim.log"),
            PathBuf::from("/runs/exp1/b/sim.log"),
        ];
        let names = display_names(&paths);
        assert_eq!(names, vec!["a/sim.log", "b/sim.log"]);
    }

    #[test]
    fn test_display_names_single_source() {
        let paths = vec![PathBuf::from("/runs/exp1/a/sim.log")];
        let names = display_names(&paths);
        assert_eq!(names, vec!["sim.log"]);
    }
}
