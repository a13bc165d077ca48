use std::fmt;
use std::ops::Range;

use serde::Serialize;

use crate::index::{DocumentError, ENTRY_TAG, EntryState, SOUND_NAME};
use crate::markup::{Document, Element, Node, line_column};
use crate::sanitize::{SanitizedText, sanitize};
use crate::scanner::{CommentKind, classify_comment};

const COMMENT_OPEN: &str = "<!--";
const COMMENT_CLOSE: &str = "-->";

/// A place in the raw text where an entry can be toggled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub sound_name: String,
    pub state: EntryState,
    /// Whole element for live entries, whole comment for commented ones.
    pub span: Range<usize>,
    /// Text that becomes the live tag; the comment body for commented sites.
    pub tag: Range<usize>,
}

/// Finds every live `Entry` element and every comment holding exactly one
/// entry, in document order.
pub fn locate_sites(raw: &str) -> Result<Vec<Site>, DocumentError> {
    let sanitized = sanitize(raw);
    let document = Document::parse(&sanitized.text)?;
    let mut sites = Vec::new();
    collect_sites(raw, &sanitized, &document.root, &mut sites);
    Ok(sites)
}

fn collect_sites(raw: &str, sanitized: &SanitizedText, element: &Element, sites: &mut Vec<Site>) {
    for node in &element.children {
        match node {
            Node::Element(child) if child.name == ENTRY_TAG => {
                let Some(sound_name) = child.attr(SOUND_NAME).filter(|name| !name.is_empty())
                else {
                    continue;
                };
                let span = sanitized.range_to_raw(&child.span);
                sites.push(Site {
                    sound_name: sound_name.to_string(),
                    state: EntryState::Live,
                    tag: span.clone(),
                    span,
                });
            }
            Node::Element(child) => collect_sites(raw, sanitized, child, sites),
            Node::Comment(comment) => {
                let body = sanitized.range_to_raw(&comment.body);
                if let CommentKind::Entry(entry) = classify_comment(&raw[body.clone()]) {
                    sites.push(Site {
                        sound_name: entry.attr(SOUND_NAME).unwrap_or_default().to_string(),
                        state: EntryState::Commented,
                        span: sanitized.range_to_raw(&comment.span),
                        tag: body,
                    });
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ToggleEvent {
    Commented { sound_name: String, line: usize },
    Uncommented { sound_name: String, line: usize },
    NotFound { sound_name: String },
    MissingSoundName,
    Ambiguous { sound_name: String, occurrences: usize },
    /// The live tag holds `--`, which cannot appear inside a comment.
    CannotComment { sound_name: String, line: usize },
    AlreadyInState { sound_name: String, state: EntryState },
}

impl ToggleEvent {
    pub fn is_edit(&self) -> bool {
        matches!(
            self,
            ToggleEvent::Commented { .. } | ToggleEvent::Uncommented { .. }
        )
    }

    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ToggleEvent::NotFound { .. }
                | ToggleEvent::MissingSoundName
                | ToggleEvent::Ambiguous { .. }
                | ToggleEvent::CannotComment { .. }
        )
    }
}

impl fmt::Display for ToggleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleEvent::Commented { sound_name, line } => {
                write!(f, "commented entry {sound_name} (line {line})")
            }
            ToggleEvent::Uncommented { sound_name, line } => {
                write!(f, "uncommented entry {sound_name} (line {line})")
            }
            ToggleEvent::NotFound { sound_name } => {
                write!(f, "entry with SoundName={sound_name} not found in document")
            }
            ToggleEvent::MissingSoundName => f.write_str("entry missing SoundName, skipping"),
            ToggleEvent::Ambiguous {
                sound_name,
                occurrences,
            } => write!(
                f,
                "SoundName={sound_name} appears {occurrences} times; using the first match"
            ),
            ToggleEvent::CannotComment { sound_name, line } => write!(
                f,
                "entry {sound_name} (line {line}) contains '--' and cannot be commented out; skipping"
            ),
            ToggleEvent::AlreadyInState { sound_name, state } => {
                write!(f, "entry {sound_name} is already {}", state.label())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToggleOutcome {
    pub text: String,
    pub events: Vec<ToggleEvent>,
}

impl ToggleOutcome {
    pub fn edits(&self) -> usize {
        self.events.iter().filter(|event| event.is_edit()).count()
    }

    pub fn edited_names(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ToggleEvent::Commented { sound_name, .. }
                | ToggleEvent::Uncommented { sound_name, .. } => Some(sound_name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Flips the comment state of each target, in order.
///
/// A target resolves to the first matching site at or after the end of the
/// previous edit; keys that do not resolve are reported and skipped.
pub fn toggle<S: AsRef<str>>(raw: &str, targets: &[S]) -> Result<ToggleOutcome, DocumentError> {
    let sites = locate_sites(raw)?;
    Ok(run_pass(raw, &sites, targets.iter().map(|target| target.as_ref())))
}

/// Brings each target into `desired`, leaving entries already there alone.
///
/// Targets are applied in document order so none is passed over by the
/// forward-only cursor.
pub fn set_state<S: AsRef<str>>(
    raw: &str,
    targets: &[S],
    desired: EntryState,
) -> Result<ToggleOutcome, DocumentError> {
    let sites = locate_sites(raw)?;
    let mut settled = Vec::new();
    let mut pending: Vec<(usize, &str)> = Vec::new();
    for key in targets.iter().map(|target| target.as_ref()) {
        match sites.iter().find(|site| site.sound_name == key) {
            Some(site) if site.state == desired => settled.push(ToggleEvent::AlreadyInState {
                sound_name: key.to_string(),
                state: desired,
            }),
            Some(site) => pending.push((site.span.start, key)),
            None => pending.push((usize::MAX, key)),
        }
    }
    pending.sort_by_key(|(position, _)| *position);
    pending.dedup_by_key(|(_, key)| *key);

    let mut outcome = run_pass(raw, &sites, pending.into_iter().map(|(_, key)| key));
    settled.append(&mut outcome.events);
    outcome.events = settled;
    Ok(outcome)
}

fn run_pass<'k>(raw: &str, sites: &[Site], targets: impl Iterator<Item = &'k str>) -> ToggleOutcome {
    targets
        .fold(Pass::new(raw, sites), |pass, key| pass.toggle(key))
        .finish()
}

/// State carried from one target to the next.
///
/// `cursor` and site spans stay in original coordinates; `shift` is how far
/// text after the cursor has moved in `text` because of earlier edits.
struct Pass<'s> {
    sites: &'s [Site],
    text: String,
    cursor: usize,
    shift: isize,
    events: Vec<ToggleEvent>,
}

impl<'s> Pass<'s> {
    fn new(raw: &str, sites: &'s [Site]) -> Self {
        Self {
            sites,
            text: raw.to_string(),
            cursor: 0,
            shift: 0,
            events: Vec::new(),
        }
    }

    fn moved(&self, range: &Range<usize>) -> Range<usize> {
        range.start.saturating_add_signed(self.shift)..range.end.saturating_add_signed(self.shift)
    }

    fn toggle(mut self, key: &str) -> Self {
        if key.is_empty() {
            self.events.push(ToggleEvent::MissingSoundName);
            return self;
        }

        let occurrences = self
            .sites
            .iter()
            .filter(|site| site.span.start >= self.cursor && site.sound_name == key)
            .count();
        if occurrences > 1 {
            self.events.push(ToggleEvent::Ambiguous {
                sound_name: key.to_string(),
                occurrences,
            });
        }

        let sites = self.sites;
        let Some(site) = sites
            .iter()
            .find(|site| site.span.start >= self.cursor && site.sound_name == key)
        else {
            self.events.push(ToggleEvent::NotFound {
                sound_name: key.to_string(),
            });
            return self;
        };

        let span = self.moved(&site.span);
        let tag = &self.text[self.moved(&site.tag)];
        if site.state == EntryState::Live && tag.contains("--") {
            let line = line_column(&self.text, span.start).0;
            self.events.push(ToggleEvent::CannotComment {
                sound_name: key.to_string(),
                line,
            });
            return self;
        }
        let replacement = match site.state {
            EntryState::Live => format!("{COMMENT_OPEN}\n{tag}\n{COMMENT_CLOSE}"),
            EntryState::Commented => tag.trim().to_string(),
        };
        let removed = span.len();
        self.text.replace_range(span.clone(), &replacement);
        self.shift += replacement.len() as isize - removed as isize;
        self.cursor = site.span.end;

        let line = line_column(&self.text, span.start).0;
        let sound_name = key.to_string();
        self.events.push(match site.state {
            EntryState::Live => ToggleEvent::Commented { sound_name, line },
            EntryState::Commented => ToggleEvent::Uncommented { sound_name, line },
        });
        self
    }

    fn finish(self) -> ToggleOutcome {
        ToggleOutcome {
            text: self.text,
            events: self.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RadioIndex;
    use crate::index::tests::RADIO;
    use crate::scanner::find_commented_entries;

    const SCENARIO: &str = r#"<Radio>
  <RadioStations>
    <RadioStation Name="Radio1" Number="1">
      <Playlist Type="FreeroamTracks">
        <Entry SoundName="track01" />
        <!-- <Entry SoundName="track02" /> -->
      </Playlist>
    </RadioStation>
  </RadioStations>
</Radio>
"#;

    fn listing(raw: &str) -> Vec<(EntryState, String)> {
        let index = RadioIndex::build(raw).expect("index");
        let station = index.station("Radio1").expect("station");
        let mut rows = station.live_entries(&["FreeroamTracks"]);
        rows.extend(find_commented_entries(raw, station, &["FreeroamTracks"]).entries);
        rows.iter()
            .map(|entry| (entry.state, entry.display_name().to_string()))
            .collect()
    }

    #[test]
    fn scenario_toggles_both_entries() {
        assert_eq!(
            listing(SCENARIO),
            [
                (EntryState::Live, "track01".to_string()),
                (EntryState::Commented, "track02".to_string()),
            ]
        );

        let outcome = toggle(SCENARIO, &["track01", "track02"]).expect("toggle");
        assert_eq!(outcome.edits(), 2);
        assert!(
            outcome
                .text
                .contains("<!--\n<Entry SoundName=\"track01\" />\n-->")
        );
        assert!(
            outcome
                .text
                .contains("\n        <Entry SoundName=\"track02\" />\n")
        );

        assert_eq!(
            listing(&outcome.text),
            [
                (EntryState::Live, "track02".to_string()),
                (EntryState::Commented, "track01".to_string()),
            ]
        );
    }

    #[test]
    fn double_toggle_restores_live_tag() {
        let once = toggle(RADIO, &["track03"]).unwrap();
        let twice = toggle(&once.text, &["track03"]).unwrap();
        assert_eq!(twice.text, RADIO);
    }

    #[test]
    fn double_toggle_normalizes_comment_whitespace_only() {
        let once = toggle(RADIO, &["track02"]).unwrap();
        let twice = toggle(&once.text, &["track02"]).unwrap();
        let expected = RADIO.replace(
            "<!-- <Entry SoundName=\"track02\" /> -->",
            "<!--\n<Entry SoundName=\"track02\" />\n-->",
        );
        assert_eq!(twice.text, expected);
    }

    #[test]
    fn edit_is_isolated_to_the_target_span() {
        let sites = locate_sites(RADIO).unwrap();
        let site = sites
            .iter()
            .find(|site| site.sound_name == "event01")
            .unwrap();
        let outcome = toggle(RADIO, &["event01"]).unwrap();
        let inserted = outcome.text.len() - RADIO.len();
        assert_eq!(&outcome.text[..site.span.start], &RADIO[..site.span.start]);
        assert_eq!(
            &outcome.text[site.span.end + inserted..],
            &RADIO[site.span.end..]
        );
    }

    #[test]
    fn unescaped_ampersand_survives_untouched() {
        let outcome = toggle(RADIO, &["talk01"]).unwrap();
        assert!(
            outcome
                .text
                .contains(r#"DisplayName="Rock & Roll""#)
        );
        assert!(!outcome.text.contains("&amp;"));
    }

    #[test]
    fn toggling_an_entry_with_ampersand_keeps_it_raw() {
        let outcome = toggle(RADIO, &["track01"]).unwrap();
        assert!(
            outcome
                .text
                .contains("<!--\n<Entry SoundName=\"track01\" DisplayName=\"Rock & Roll\" />\n-->")
        );
        let back = toggle(&outcome.text, &["track01"]).unwrap();
        assert_eq!(back.text, RADIO);
    }

    #[test]
    fn missing_target_warns_and_continues() {
        let outcome = toggle(RADIO, &["nope", "", "track03"]).unwrap();
        assert_eq!(
            outcome.events[0],
            ToggleEvent::NotFound {
                sound_name: "nope".into()
            }
        );
        assert_eq!(outcome.events[1], ToggleEvent::MissingSoundName);
        assert!(outcome.events[2].is_edit());
        assert_eq!(outcome.edited_names(), ["track03"]);
    }

    #[test]
    fn missing_target_alone_leaves_document_unchanged() {
        let outcome = toggle(RADIO, &["nope"]).unwrap();
        assert_eq!(outcome.text, RADIO);
        assert!(outcome.events[0].is_warning());
    }

    #[test]
    fn other_entries_keep_their_state() {
        let outcome = toggle(RADIO, &["track01"]).unwrap();
        let sites = locate_sites(&outcome.text).unwrap();
        let state_of = |name: &str| {
            sites
                .iter()
                .find(|site| site.sound_name == name)
                .map(|site| site.state)
        };
        assert_eq!(state_of("track01"), Some(EntryState::Commented));
        assert_eq!(state_of("track02"), Some(EntryState::Commented));
        assert_eq!(state_of("track03"), Some(EntryState::Live));
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let outcome = toggle(RADIO, &["track03", "track01"]).unwrap();
        assert_eq!(outcome.edited_names(), ["track03"]);
        assert_eq!(
            outcome.events[1],
            ToggleEvent::NotFound {
                sound_name: "track01".into()
            }
        );
    }

    #[test]
    fn repeated_target_does_not_match_inside_fresh_comment() {
        let outcome = toggle(RADIO, &["track01", "track01"]).unwrap();
        assert_eq!(outcome.edits(), 1);
        assert!(matches!(outcome.events[1], ToggleEvent::NotFound { .. }));
    }

    #[test]
    fn duplicate_sound_names_use_first_match_and_warn() {
        let raw = "<R><Entry SoundName=\"a\"/><Entry SoundName=\"a\"/></R>";
        let outcome = toggle(raw, &["a"]).unwrap();
        assert_eq!(
            outcome.events[0],
            ToggleEvent::Ambiguous {
                sound_name: "a".into(),
                occurrences: 2
            }
        );
        assert_eq!(
            outcome.text,
            "<R><!--\n<Entry SoundName=\"a\"/>\n--><Entry SoundName=\"a\"/></R>"
        );
    }

    #[test]
    fn duplicates_behind_the_cursor_are_not_ambiguous() {
        let raw = "<R><Entry SoundName=\"a\"/><Entry SoundName=\"b\"/><Entry SoundName=\"a\"/></R>";
        let outcome = toggle(raw, &["b", "a"]).unwrap();
        assert_eq!(outcome.edited_names(), ["b", "a"]);
        assert!(
            !outcome
                .events
                .iter()
                .any(|event| matches!(event, ToggleEvent::Ambiguous { .. }))
        );
        assert!(outcome.text.starts_with("<R><Entry SoundName=\"a\"/><!--"));
    }

    #[test]
    fn entry_with_double_dash_is_left_live() {
        let raw = "<R>\n<Entry SoundName=\"a\" DisplayName=\"Drum -- Bass\"/>\n<Entry SoundName=\"b\"/>\n</R>";
        let outcome = toggle(raw, &["a", "b"]).unwrap();
        assert_eq!(
            outcome.events[0],
            ToggleEvent::CannotComment {
                sound_name: "a".into(),
                line: 2
            }
        );
        assert!(outcome.events[0].is_warning());
        assert_eq!(outcome.edited_names(), ["b"]);
        assert!(outcome.text.starts_with("<R>\n<Entry SoundName=\"a\" DisplayName=\"Drum -- Bass\"/>\n<!--"));
        assert!(locate_sites(&outcome.text).is_ok());

        let disabled = set_state(raw, &["a"], EntryState::Commented).unwrap();
        assert_eq!(disabled.text, raw);
        assert_eq!(disabled.edits(), 0);
    }

    #[test]
    fn prose_comments_are_not_sites() {
        let raw = "<R><!-- old: <Entry SoundName=\"a\"/> was here --><Entry SoundName=\"b\"/></R>";
        let sites = locate_sites(raw).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].sound_name, "b");
    }

    #[test]
    fn set_state_only_flips_entries_in_the_wrong_state() {
        let outcome = set_state(RADIO, &["track03", "track02", "track01"], EntryState::Live).unwrap();
        assert_eq!(
            outcome.events[0],
            ToggleEvent::AlreadyInState {
                sound_name: "track03".into(),
                state: EntryState::Live
            }
        );
        assert_eq!(outcome.edited_names(), ["track02"]);
    }

    #[test]
    fn set_state_orders_targets_by_position() {
        let outcome =
            set_state(RADIO, &["talk01", "track03", "track01"], EntryState::Commented).unwrap();
        assert_eq!(outcome.edited_names(), ["track01", "track03", "talk01"]);
    }

    #[test]
    fn malformed_document_aborts() {
        assert!(toggle("<R><Entry SoundName=\"a\"></R>", &["a"]).is_err());
    }
}
