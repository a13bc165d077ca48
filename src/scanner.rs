use serde::Serialize;

use crate::index::{ENTRY_TAG, Entry, EntryState, RadioIndex, SOUND_NAME, Station};
use crate::markup::{Element, parse_fragment};
use crate::sanitize::sanitize;

/// What a comment body turned out to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentKind {
    /// Prose or anything that does not start with an `Entry` tag.
    NotAnEntry,
    Entry(Element),
    /// Looked like an entry but could not be used.
    Skipped(String),
}

pub fn classify_comment(body: &str) -> CommentKind {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix('<').and_then(|tag| tag.strip_prefix(ENTRY_TAG)) else {
        return CommentKind::NotAnEntry;
    };
    if !rest.starts_with(|ch: char| ch.is_whitespace() || ch == '/' || ch == '>') {
        return CommentKind::NotAnEntry;
    }

    let sanitized = sanitize(trimmed);
    match parse_fragment(&sanitized.text) {
        Err(err) => CommentKind::Skipped(err.to_string()),
        Ok(element) if element.name != ENTRY_TAG => CommentKind::NotAnEntry,
        Ok(element) if element.attr(SOUND_NAME).is_none_or(str::is_empty) => {
            CommentKind::Skipped(format!("commented entry has no {SOUND_NAME}"))
        }
        Ok(element) => CommentKind::Entry(element),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFragment {
    pub station: String,
    pub playlist: String,
    /// Raw offset of the comment.
    pub offset: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct CommentScan {
    pub entries: Vec<Entry>,
    pub skipped: Vec<SkippedFragment>,
}

impl CommentScan {
    fn extend(&mut self, other: CommentScan) {
        self.entries.extend(other.entries);
        self.skipped.extend(other.skipped);
    }
}

/// Collects comment-hidden entries of a station.
///
/// Output is grouped by playlist type in the order given, then by position
/// in the document.
pub fn find_commented_entries(raw: &str, station: &Station, playlist_types: &[&str]) -> CommentScan {
    let mut scan = CommentScan::default();
    for kind in playlist_types {
        for playlist in station.playlists.iter().filter(|p| p.kind == *kind) {
            for comment in &playlist.comments {
                match classify_comment(&raw[comment.body.clone()]) {
                    CommentKind::NotAnEntry => {}
                    CommentKind::Entry(element) => scan.entries.push(Entry::from_element(
                        &playlist.kind,
                        EntryState::Commented,
                        &element,
                        comment.span.clone(),
                    )),
                    CommentKind::Skipped(reason) => scan.skipped.push(SkippedFragment {
                        station: station.name.clone(),
                        playlist: playlist.kind.clone(),
                        offset: comment.span.start,
                        reason,
                    }),
                }
            }
        }
    }
    scan
}

/// Every commented entry in every station, stations in document order.
pub fn find_all_commented_entries(raw: &str, index: &RadioIndex) -> CommentScan {
    let mut scan = CommentScan::default();
    for station in index.stations() {
        scan.extend(find_commented_entries(
            raw,
            station,
            &station.playlist_types(),
        ));
    }
    scan
}
