use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Bytes added to the text for every bare `&` rewritten to `&amp;`.
const ESCAPE_GROWTH: usize = "amp;".len();

static AMPERSAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(amp;|lt;|gt;|quot;|apos;|#)?").expect("ampersand pattern is valid")
});

/// Parse-safe copy of a raw document.
///
/// Only used to build read-only views; the raw text stays the source of
/// truth for every edit. `growth_points` records, in sanitized coordinates,
/// where each `amp;` insertion begins so spans can be mapped back.
#[derive(Debug, Clone)]
pub struct SanitizedText {
    pub text: String,
    growth_points: Vec<usize>,
}

impl SanitizedText {
    /// Maps an offset in the sanitized text back onto the raw text.
    ///
    /// Offsets falling inside an inserted `amp;` collapse onto the byte after
    /// the raw `&`.
    pub fn to_raw(&self, offset: usize) -> usize {
        let fully_before = self
            .growth_points
            .partition_point(|&point| point + ESCAPE_GROWTH <= offset);
        let partial = self
            .growth_points
            .get(fully_before)
            .filter(|&&point| point < offset)
            .map(|&point| offset - point)
            .unwrap_or(0);
        offset - fully_before * ESCAPE_GROWTH - partial
    }

    pub fn range_to_raw(&self, range: &Range<usize>) -> Range<usize> {
        self.to_raw(range.start)..self.to_raw(range.end)
    }
}

pub fn sanitize(raw: &str) -> SanitizedText {
    let mut growth_points = Vec::new();
    let text = AMPERSAND
        .replace_all(raw, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                caps[0].to_string()
            } else {
                let whole = caps.get(0).map(|m| m.start()).unwrap_or_default();
                growth_points.push(whole + 1 + growth_points.len() * ESCAPE_GROWTH);
                "&amp;".to_string()
            }
        })
        .into_owned();
    SanitizedText {
        text,
        growth_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_only_bare_ampersands() {
        let raw = r#"<a b="Rock & Roll" c="&amp;" d="&#38;" e="&lt;&gt;&quot;&apos;"/>"#;
        let sanitized = sanitize(raw);
        assert_eq!(
            sanitized.text,
            r#"<a b="Rock &amp; Roll" c="&amp;" d="&#38;" e="&lt;&gt;&quot;&apos;"/>"#
        );
        assert_eq!(sanitized.growth_points.len(), 1);
    }

    #[test]
    fn comment_markers_are_untouched() {
        let raw = "<!-- <Entry SoundName=\"x&y\" /> -->";
        let sanitized = sanitize(raw);
        assert!(sanitized.text.starts_with("<!-- <Entry"));
        assert!(sanitized.text.ends_with("/> -->"));
    }

    #[test]
    fn offsets_map_back_to_raw() {
        let raw = "A & B & C <x/>";
        let sanitized = sanitize(raw);
        assert_eq!(sanitized.text, "A &amp; B &amp; C <x/>");
        let tag_start = sanitized.text.find("<x/>").unwrap();
        assert_eq!(sanitized.to_raw(tag_start), raw.find("<x/>").unwrap());
        assert_eq!(sanitized.to_raw(sanitized.text.len()), raw.len());
        assert_eq!(sanitized.to_raw(0), 0);
    }

    #[test]
    fn offset_inside_escape_collapses_to_ampersand() {
        let sanitized = sanitize("a&b");
        assert_eq!(sanitized.to_raw(2), 2);
        assert_eq!(sanitized.to_raw(4), 2);
        assert_eq!(sanitized.to_raw(6), 2);
        assert_eq!(sanitized.to_raw(7), 3);
    }

    #[test]
    fn untouched_text_is_identical() {
        let raw = "<Root><RadioStations/></Root>";
        let sanitized = sanitize(raw);
        assert_eq!(sanitized.text, raw);
        assert_eq!(sanitized.range_to_raw(&(0..raw.len())), 0..raw.len());
    }
}
