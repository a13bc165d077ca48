use std::borrow::Cow;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Result, anyhow};
use diffy::{Patch as DiffPatch, apply as apply_patch};
use similar::{ChangeTag, DiffOp, TextDiff};

use crate::logging::{LineSpan, LineSpanKind};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
pub struct DiffDisplayConfig {
    pub context: usize,
    pub colorize: bool,
}

pub fn display_diff(old: &str, new: &str, config: &DiffDisplayConfig) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_diff(&mut out, old, new, config)?;
    out.flush()?;
    Ok(())
}

pub fn write_diff<W: Write>(
    out: &mut W,
    old: &str,
    new: &str,
    config: &DiffDisplayConfig,
) -> Result<()> {
    let diff = TextDiff::configure()
        .algorithm(similar::Algorithm::Myers)
        .diff_lines(old, new);

    for (idx, group) in diff.grouped_ops(config.context).iter().enumerate() {
        if idx > 0 {
            writeln!(out, "{}", paint("...", DIM, config.colorize))?;
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let (sign, color) = match change.tag() {
                    ChangeTag::Delete => ("- ", RED),
                    ChangeTag::Insert => ("+ ", GREEN),
                    ChangeTag::Equal => ("  ", ""),
                };
                let line = format!("{sign}{}", change.value().trim_end_matches(['\r', '\n']));
                writeln!(out, "{}", paint(&line, color, config.colorize))?;
            }
        }
    }

    Ok(())
}

fn paint(text: &str, color: &str, colorize: bool) -> String {
    if colorize && !color.is_empty() {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Short `+added -removed` summary of a change.
pub fn summarize_lines(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let (mut added, mut removed) = (0usize, 0usize);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }
    format!("+{added} -{removed}")
}

/// 1-based line ranges of the new text touched by the change.
pub fn collect_line_spans(old: &str, new: &str) -> Vec<LineSpan> {
    let diff = TextDiff::from_lines(old, new);
    diff.ops()
        .iter()
        .filter_map(|op| match *op {
            DiffOp::Equal { .. } | DiffOp::Delete { .. } => None,
            DiffOp::Insert {
                new_index, new_len, ..
            } => Some(LineSpan {
                kind: LineSpanKind::Added,
                start: new_index + 1,
                end: new_index + new_len,
            }),
            DiffOp::Replace {
                new_index, new_len, ..
            } => Some(LineSpan {
                kind: LineSpanKind::Modified,
                start: new_index + 1,
                end: new_index + new_len,
            }),
        })
        .collect()
}

/// Unified diff turning `from` into `to`, labelled with `path`.
///
/// Both sides are normalized to LF first so the patch applies regardless of
/// the file's line endings.
pub fn unified_diff(path: &Path, from: &str, to: &str, context: usize) -> String {
    let label = path.display().to_string();
    let from = normalize_to_lf(from);
    let to = normalize_to_lf(to);
    TextDiff::from_lines(from.as_ref(), to.as_ref())
        .unified_diff()
        .context_radius(context)
        .header(&label, &label)
        .to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineEndingStyle {
    Lf,
    Crlf,
    Cr,
}

pub fn detect_line_ending_style(text: &str) -> LineEndingStyle {
    if text.contains("\r\n") {
        LineEndingStyle::Crlf
    } else if text.contains('\r') {
        LineEndingStyle::Cr
    } else {
        LineEndingStyle::Lf
    }
}

fn normalize_to_lf(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    let mut normalized = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                normalized.push('\n');
            }
            _ => normalized.push(ch),
        }
    }
    Cow::Owned(normalized)
}

fn restore_from_lf(text: String, style: LineEndingStyle) -> String {
    match style {
        LineEndingStyle::Lf => text,
        LineEndingStyle::Crlf => text.replace('\n', "\r\n"),
        LineEndingStyle::Cr => text.replace('\n', "\r"),
    }
}

pub fn apply_patch_preserving_newlines(text: &str, patch_text: &str) -> Result<String> {
    let patch = DiffPatch::from_str(patch_text).map_err(|err| anyhow!("invalid patch: {err}"))?;
    let style = detect_line_ending_style(text);
    let normalized = normalize_to_lf(text);
    let patched = apply_patch(normalized.as_ref(), &patch)
        .map_err(|err| anyhow!("patch does not apply: {err}"))?;
    Ok(restore_from_lf(patched, style))
}
