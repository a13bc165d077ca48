use std::ops::Range;

use serde::Serialize;
use thiserror::Error;

use crate::markup::{Comment, Document, Element, MarkupError};
use crate::sanitize::{SanitizedText, sanitize};

pub const STATIONS_TAG: &str = "RadioStations";
pub const STATION_TAG: &str = "RadioStation";
pub const PLAYLIST_TAG: &str = "Playlist";
pub const ENTRY_TAG: &str = "Entry";
pub const SOUND_NAME: &str = "SoundName";
pub const DISPLAY_NAME: &str = "DisplayName";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not well-formed: {0}")]
    Markup(#[from] MarkupError),
    #[error("no <RadioStations> element found under the root <{0}>")]
    MissingStations(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Live,
    Commented,
}

impl EntryState {
    pub fn label(self) -> &'static str {
        match self {
            EntryState::Live => "live",
            EntryState::Commented => "commented",
        }
    }
}

/// One `Entry` tag, live or hidden inside a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub playlist: String,
    pub state: EntryState,
    pub attributes: Vec<(String, String)>,
    /// Raw span: the element for live entries, the whole comment otherwise.
    #[serde(skip)]
    pub span: Range<usize>,
}

impl Entry {
    pub fn from_element(
        playlist: &str,
        state: EntryState,
        element: &Element,
        span: Range<usize>,
    ) -> Self {
        Self {
            playlist: playlist.to_string(),
            state,
            attributes: element
                .attributes
                .iter()
                .map(|attr| (attr.name.clone(), attr.value.clone()))
                .collect(),
            span,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn sound_name(&self) -> Option<&str> {
        self.attr(SOUND_NAME).filter(|value| !value.is_empty())
    }

    pub fn display_name(&self) -> &str {
        self.attr(DISPLAY_NAME)
            .filter(|value| !value.is_empty())
            .or_else(|| self.sound_name())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Playlist {
    pub kind: String,
    pub entries: Vec<Entry>,
    /// Comments directly inside the playlist, spans in raw coordinates.
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone)]
pub struct Station {
    pub name: String,
    pub number: Option<String>,
    pub span: Range<usize>,
    pub playlists: Vec<Playlist>,
}

impl Station {
    pub fn label(&self) -> String {
        format!("[{}] {}", self.number.as_deref().unwrap_or("-"), self.name)
    }

    /// Playlist types in document order, without repeats.
    pub fn playlist_types(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = Vec::new();
        for playlist in &self.playlists {
            if !kinds.contains(&playlist.kind.as_str()) {
                kinds.push(&playlist.kind);
            }
        }
        kinds
    }

    pub fn has_playlist(&self, kind: &str) -> bool {
        self.playlists.iter().any(|playlist| playlist.kind == kind)
    }

    /// Live entries of the requested playlist types, in document order.
    pub fn live_entries(&self, playlist_types: &[&str]) -> Vec<Entry> {
        self.playlists
            .iter()
            .filter(|playlist| playlist_types.contains(&playlist.kind.as_str()))
            .flat_map(|playlist| playlist.entries.iter().cloned())
            .collect()
    }
}

/// Read-only view over the stations of a document.
///
/// Built from the sanitized copy; every span it hands out has already been
/// mapped back onto the raw text.
#[derive(Debug, Clone)]
pub struct RadioIndex {
    stations: Vec<Station>,
}

impl RadioIndex {
    pub fn build(raw: &str) -> Result<Self, DocumentError> {
        let sanitized = sanitize(raw);
        let document = Document::parse(&sanitized.text)?;
        let collection = stations_element(&document.root)
            .ok_or_else(|| DocumentError::MissingStations(document.root.name.clone()))?;
        let stations = collection
            .children_named(STATION_TAG)
            .map(|element| build_station(element, &sanitized))
            .collect();
        Ok(Self { stations })
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn station(&self, name: &str) -> Option<&Station> {
        self.stations.iter().find(|station| station.name == name)
    }

    /// Finds a station by exact name, falling back to its `Number`.
    pub fn find_station(&self, selector: &str) -> Option<&Station> {
        self.station(selector).or_else(|| {
            self.stations
                .iter()
                .find(|station| station.number.as_deref() == Some(selector))
        })
    }
}

fn stations_element(root: &Element) -> Option<&Element> {
    if root.name == STATIONS_TAG {
        return Some(root);
    }
    root.children_named(STATIONS_TAG).next()
}

fn build_station(element: &Element, sanitized: &SanitizedText) -> Station {
    Station {
        name: element.attr("Name").unwrap_or_default().to_string(),
        number: element.attr("Number").map(str::to_string),
        span: sanitized.range_to_raw(&element.span),
        playlists: element
            .children_named(PLAYLIST_TAG)
            .map(|playlist| build_playlist(playlist, sanitized))
            .collect(),
    }
}

fn build_playlist(element: &Element, sanitized: &SanitizedText) -> Playlist {
    let kind = element.attr("Type").unwrap_or_default().to_string();
    let entries = element
        .children_named(ENTRY_TAG)
        .map(|entry| {
            Entry::from_element(
                &kind,
                EntryState::Live,
                entry,
                sanitized.range_to_raw(&entry.span),
            )
        })
        .collect();
    let comments = element
        .comments()
        .map(|comment| Comment {
            span: sanitized.range_to_raw(&comment.span),
            body: sanitized.range_to_raw(&comment.body),
        })
        .collect();
    Playlist {
        kind,
        entries,
        comments,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const RADIO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<RadioInfo>
  <RadioStations>
    <RadioStation Name="Radio1" Number="1">
      <Playlist Type="FreeroamTracks">
        <Entry SoundName="track01" DisplayName="Rock & Roll" />
        <!-- <Entry SoundName="track02" /> -->
        <Entry SoundName="track03" />
      </Playlist>
      <Playlist Type="EventTracks">
        <Entry SoundName="event01" DisplayName="Chase" />
      </Playlist>
    </RadioStation>
    <RadioStation Name="Radio2" Number="2">
      <Playlist Type="FreeroamTracks">
        <!--
          <Entry DisplayName="Late" SoundName="late01"/>
        -->
        <Entry SoundName="talk01" />
      </Playlist>
      <Playlist Type="DJ" />
    </RadioStation>
  </RadioStations>
</RadioInfo>
"#;

    #[test]
    fn lists_stations_in_document_order() {
        let index = RadioIndex::build(RADIO).expect("index builds");
        let labels: Vec<_> = index.stations().iter().map(Station::label).collect();
        assert_eq!(labels, ["[1] Radio1", "[2] Radio2"]);
        assert_eq!(
            index.station("Radio2").unwrap().playlist_types(),
            ["FreeroamTracks", "DJ"]
        );
    }

    #[test]
    fn live_entries_follow_requested_playlists() {
        let index = RadioIndex::build(RADIO).unwrap();
        let station = index.station("Radio1").unwrap();
        let names: Vec<_> = station
            .live_entries(&["FreeroamTracks"])
            .iter()
            .map(|entry| entry.display_name().to_string())
            .collect();
        assert_eq!(names, ["Rock & Roll", "track03"]);

        let both = station.live_entries(&["EventTracks", "FreeroamTracks"]);
        assert_eq!(both.len(), 3);
        assert_eq!(both[2].playlist, "EventTracks");
    }

    #[test]
    fn entry_spans_point_into_raw_text() {
        let index = RadioIndex::build(RADIO).unwrap();
        let station = index.station("Radio1").unwrap();
        let entries = station.live_entries(&["FreeroamTracks"]);
        assert_eq!(
            &RADIO[entries[0].span.clone()],
            r#"<Entry SoundName="track01" DisplayName="Rock & Roll" />"#
        );
        assert_eq!(
            &RADIO[entries[1].span.clone()],
            r#"<Entry SoundName="track03" />"#
        );
        assert!(RADIO[station.span.clone()].ends_with("</RadioStation>"));
    }

    #[test]
    fn station_lookup_accepts_number() {
        let index = RadioIndex::build(RADIO).unwrap();
        assert_eq!(index.find_station("2").unwrap().name, "Radio2");
        assert!(index.find_station("Radio9").is_none());
    }

    #[test]
    fn missing_collection_is_fatal() {
        let err = RadioIndex::build("<RadioInfo/>").unwrap_err();
        assert!(matches!(err, DocumentError::MissingStations(ref root) if root == "RadioInfo"));
    }

    #[test]
    fn malformed_document_is_fatal() {
        let err = RadioIndex::build("<RadioStations><RadioStation></RadioStations>").unwrap_err();
        assert!(matches!(err, DocumentError::Markup(_)));
    }
}
