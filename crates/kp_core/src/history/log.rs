//! Append-only play history.
//!
//! One line per completed play:
//! `timestamp<<<library<<<filename<<<semitones<<<steps<<<durationMs`

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};

use super::{HistoryError, HistoryResult, FIELD_SEPARATOR};
use crate::models::Track;

/// Timestamp format used in history lines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One completed play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub played_at: NaiveDateTime,
    pub library: String,
    pub file_name: String,
    pub semitones: i32,
    pub tempo_steps: i32,
    pub duration_ms: u64,
}

impl HistoryEntry {
    /// Entry for `track` played at `played_at`.
    pub fn from_track(track: &Track, played_at: NaiveDateTime) -> Self {
        let controls = track.controls();
        Self {
            played_at,
            library: track.library().unwrap_or_default().to_string(),
            file_name: track.file_name(),
            semitones: controls.semitones,
            tempo_steps: controls.tempo_steps,
            duration_ms: track.duration_ms(),
        }
    }

    /// Serialize to a history line (without newline).
    pub fn to_line(&self) -> String {
        [
            self.played_at.format(TIMESTAMP_FORMAT).to_string(),
            self.library.clone(),
            self.file_name.clone(),
            self.semitones.to_string(),
            self.tempo_steps.to_string(),
            self.duration_ms.to_string(),
        ]
        .join(FIELD_SEPARATOR)
    }

    /// Parse a history line. Malformed lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR).collect();
        if parts.len() < 6 {
            return None;
        }
        let played_at = NaiveDateTime::parse_from_str(parts[0].trim(), TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            played_at,
            library: parts[1].to_string(),
            file_name: parts[2].to_string(),
            semitones: parts[3].trim().parse().unwrap_or(0),
            tempo_steps: parts[4].trim().parse().unwrap_or(0),
            duration_ms: parts[5].trim().parse().unwrap_or(0),
        })
    }
}

/// Time window for browsing history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisYear,
    AllTime,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::Today,
        Timeframe::Yesterday,
        Timeframe::ThisWeek,
        Timeframe::LastWeek,
        Timeframe::ThisMonth,
        Timeframe::LastMonth,
        Timeframe::ThisYear,
        Timeframe::AllTime,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Today => "Today",
            Timeframe::Yesterday => "Yesterday",
            Timeframe::ThisWeek => "This Week",
            Timeframe::LastWeek => "Last Week",
            Timeframe::ThisMonth => "This Month",
            Timeframe::LastMonth => "Last Month",
            Timeframe::ThisYear => "This Year",
            Timeframe::AllTime => "All Time",
        }
    }

    /// Whether a play at `played` falls in this window as seen at `now`.
    ///
    /// Weeks start on Monday.
    pub fn matches(&self, played: NaiveDateTime, now: NaiveDateTime) -> bool {
        let day = played.date();
        let today = now.date();
        let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);

        match self {
            Timeframe::Today => day == today,
            Timeframe::Yesterday => Some(day) == today.pred_opt(),
            Timeframe::ThisWeek => day >= week_start,
            Timeframe::LastWeek => {
                let start = week_start - Duration::days(7);
                let end = week_start - Duration::days(1);
                start <= day && day <= end
            }
            Timeframe::ThisMonth => day.year() == today.year() && day.month() == today.month(),
            Timeframe::LastMonth => {
                let (year, month) = previous_month(today);
                day.year() == year && day.month() == month
            }
            Timeframe::ThisYear => day.year() == today.year(),
            Timeframe::AllTime => true,
        }
    }
}

fn previous_month(date: NaiveDate) -> (i32, u32) {
    if date.month() == 1 {
        (date.year() - 1, 12)
    } else {
        (date.year(), date.month() - 1)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        Timeframe::ALL
            .into_iter()
            .find(|t| t.label().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown timeframe '{}'", s))
    }
}

/// Play history backed by an append-only file.
#[derive(Debug)]
pub struct HistoryLog {
    /// History file; `None` keeps entries in memory only.
    path: Option<PathBuf>,
    /// Plays recorded through this log since it was opened.
    session: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            session: Vec::new(),
        }
    }

    /// Create a log without persistence (for testing).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            session: Vec::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a completed play of `track` now.
    pub fn append(&mut self, track: &Track) -> HistoryResult<()> {
        self.append_entry(HistoryEntry::from_track(track, Local::now().naive_local()))
    }

    /// Record an entry.
    ///
    /// The entry is kept in the session list even if the file write fails.
    pub fn append_entry(&mut self, entry: HistoryEntry) -> HistoryResult<()> {
        let line = entry.to_line();
        self.session.push(entry);

        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| HistoryError::io(parent, e))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| HistoryError::io(path, e))?;
        writeln!(file, "{}", line).map_err(|e| HistoryError::io(path, e))?;
        tracing::debug!("History: {}", line);
        Ok(())
    }

    /// Plays recorded since this log was opened.
    pub fn recorded(&self) -> &[HistoryEntry] {
        &self.session
    }

    /// All parseable entries, oldest first.
    ///
    /// A missing file is an empty history; in-memory logs return the
    /// session entries.
    pub fn read_all(&self) -> HistoryResult<Vec<HistoryEntry>> {
        let Some(path) = &self.path else {
            return Ok(self.session.clone());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path).map_err(|e| HistoryError::io(path, e))?;

        let mut skipped = 0usize;
        let entries: Vec<HistoryEntry> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| {
                let parsed = HistoryEntry::parse_line(l);
                if parsed.is_none() {
                    skipped += 1;
                }
                parsed
            })
            .collect();

        if skipped > 0 {
            tracing::warn!("Skipped {} malformed history lines in {}", skipped, path.display());
        }
        Ok(entries)
    }

    /// Entries within `timeframe` as seen at `now`, newest first.
    pub fn entries_in(&self, timeframe: Timeframe, now: NaiveDateTime) -> HistoryResult<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self
            .read_all()?
            .into_iter()
            .filter(|e| timeframe.matches(e.played_at, now))
            .collect();
        entries.reverse();
        Ok(entries)
    }
}
