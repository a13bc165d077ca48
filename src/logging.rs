use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const LOG_DIR: &str = ".radiotoggle";
const LOG_FILE: &str = "change_log.jsonl";
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSpanKind {
    Modified,
    Added,
}

/// Inclusive, 1-based line range in the written file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub kind: LineSpanKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub timestamp: String,
    pub command: String,
    pub path: String,
    pub action: String,
    #[serde(rename = "lines")]
    pub line_summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub toggled: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<LineSpan>,
}

pub fn record_change(
    command: &str,
    path: &Path,
    action: &str,
    line_summary: &str,
    toggled: &[String],
    spans: &[LineSpan],
) -> Result<()> {
    let entry = ChangeLogEntry {
        timestamp: now_rfc3339(),
        command: command.to_string(),
        path: path.display().to_string(),
        action: action.to_string(),
        line_summary: line_summary.to_string(),
        toggled: toggled.to_vec(),
        spans: spans.to_vec(),
    };
    append_entry(Path::new(LOG_DIR), &entry)
}

pub fn read_recent(tail: usize) -> Result<Vec<ChangeLogEntry>> {
    read_recent_in(Path::new(LOG_DIR), tail)
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into())
}

fn append_entry(dir: &Path, entry: &ChangeLogEntry) -> Result<()> {
    let log_path = ensure_log_file(dir)?;
    let json = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
        .with_context(|| format!("opening {log_path:?}"))?;
    writeln!(file, "{json}")?;
    truncate_log(&log_path)?;
    Ok(())
}

fn read_recent_in(dir: &Path, tail: usize) -> Result<Vec<ChangeLogEntry>> {
    let path = dir.join(LOG_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = OpenOptions::new()
        .read(true)
        .open(&path)
        .with_context(|| format!("reading {path:?}"))?;
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        // Lines written by other versions are skipped rather than fatal.
        if let Ok(entry) = serde_json::from_str::<ChangeLogEntry>(&line) {
            entries.push(entry);
        }
    }
    let skip = entries.len().saturating_sub(tail);
    Ok(entries.split_off(skip))
}

fn ensure_log_file(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir).with_context(|| format!("creating {dir:?}"))?;
    }
    Ok(dir.join(LOG_FILE))
}

fn truncate_log(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("reading {path:?}"))?;
    let reader = BufReader::new(file);
    let lines: Vec<_> = reader.lines().collect::<Result<_, _>>()?;
    if lines.len() <= MAX_ENTRIES {
        return Ok(());
    }
    let keep = &lines[lines.len() - MAX_ENTRIES..];
    fs::write(path, keep.join("\n") + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(action: &str) -> ChangeLogEntry {
        ChangeLogEntry {
            timestamp: now_rfc3339(),
            command: "toggle".into(),
            path: "RadioInfo_EN.xml".into(),
            action: action.into(),
            line_summary: "+3 -1".into(),
            toggled: vec!["track01".into()],
            spans: vec![LineSpan {
                kind: LineSpanKind::Modified,
                start: 4,
                end: 6,
            }],
        }
    }

    #[test]
    fn entries_round_trip_through_the_log() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join(LOG_DIR);
        append_entry(&log_dir, &entry("dry-run")).unwrap();
        append_entry(&log_dir, &entry("applied")).unwrap();

        let entries = read_recent_in(&log_dir, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].action, "applied");
        assert_eq!(entries[1].toggled, ["track01"]);
        assert_eq!(entries[1].spans[0].kind, LineSpanKind::Modified);

        let raw = fs::read_to_string(log_dir.join(LOG_FILE)).unwrap();
        assert!(raw.contains("\"lines\":\"+3 -1\""));
        assert!(raw.contains("\"kind\":\"modified\""));
    }

    #[test]
    fn tail_keeps_newest_entries() {
        let dir = tempdir().unwrap();
        for action in ["a", "b", "c"] {
            append_entry(dir.path(), &entry(action)).unwrap();
        }
        let entries = read_recent_in(dir.path(), 2).unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["b", "c"]);
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempdir().unwrap();
        assert!(read_recent_in(dir.path(), 5).unwrap().is_empty());
    }

    #[test]
    fn log_is_capped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let line = serde_json::to_string(&entry("applied")).unwrap();
        let lines = vec![line; MAX_ENTRIES + 5];
        fs::write(&path, lines.join("\n") + "\n").unwrap();
        truncate_log(&path).unwrap();
        let kept = fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(kept, MAX_ENTRIES);
    }
}
