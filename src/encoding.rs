use std::fmt;

use anyhow::{Result, anyhow};
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};

/// How many leading bytes are searched for an XML declaration.
const DECLARATION_WINDOW: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    Override,
    Bom,
    Declaration,
    Detector,
    AssumedUtf8,
}

impl fmt::Display for EncodingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EncodingSource::Override => "override",
            EncodingSource::Bom => "bom",
            EncodingSource::Declaration => "xml-declaration",
            EncodingSource::Detector => "detector",
            EncodingSource::AssumedUtf8 => "assumed-utf8",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct EncodingDecision {
    pub encoding: &'static Encoding,
    pub source: EncodingSource,
    pub had_bom: bool,
}

#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub had_errors: bool,
    pub decision: EncodingDecision,
}

impl DecodedText {
    /// Encodes `text` the way the source file was stored, BOM included.
    ///
    /// The flag reports whether unmappable characters were replaced.
    pub fn encode_like_source(&self, text: &str) -> (Vec<u8>, bool) {
        encode_with(self.decision.encoding, self.decision.had_bom, text)
    }
}

#[derive(Debug, Clone)]
pub struct EncodingStrategy {
    override_encoding: Option<&'static Encoding>,
    override_label: Option<String>,
}

impl EncodingStrategy {
    pub fn new(override_label: Option<&str>) -> Result<Self> {
        if let Some(label) = override_label {
            let trimmed = label.trim();
            let encoding = Encoding::for_label(trimmed.as_bytes())
                .ok_or_else(|| anyhow!("unknown encoding override '{trimmed}'"))?;
            Ok(Self {
                override_encoding: Some(encoding),
                override_label: Some(trimmed.to_string()),
            })
        } else {
            Ok(Self {
                override_encoding: None,
                override_label: None,
            })
        }
    }

    pub fn describe(&self) -> String {
        if let (Some(label), Some(enc)) = (&self.override_label, self.override_encoding) {
            format!(
                "override '{}' ({}), auto-detect disabled",
                label,
                enc.name()
            )
        } else {
            "auto-detect (BOM → xml declaration → UTF-8 → detector)".to_string()
        }
    }

    pub fn decide(&self, bytes: &[u8]) -> EncodingDecision {
        let bom = detect_bom(bytes);
        if let Some(encoding) = self.override_encoding {
            return EncodingDecision {
                encoding,
                source: EncodingSource::Override,
                had_bom: bom == Some(encoding),
            };
        }

        detect_auto(bytes, bom)
    }

    pub fn decode(&self, bytes: &[u8]) -> DecodedText {
        let decision = self.decide(bytes);
        let body = if decision.had_bom {
            &bytes[bom_len(decision.encoding)..]
        } else {
            bytes
        };
        let (cow, had_errors) = decision.encoding.decode_without_bom_handling(body);
        DecodedText {
            text: cow.into_owned(),
            had_errors,
            decision,
        }
    }
}

fn detect_auto(bytes: &[u8], bom: Option<&'static Encoding>) -> EncodingDecision {
    if let Some(encoding) = bom {
        return EncodingDecision {
            encoding,
            source: EncodingSource::Bom,
            had_bom: true,
        };
    }

    if let Some(encoding) = detect_declaration(bytes) {
        return EncodingDecision {
            encoding,
            source: EncodingSource::Declaration,
            had_bom: false,
        };
    }

    if std::str::from_utf8(bytes).is_ok() {
        return EncodingDecision {
            encoding: UTF_8,
            source: EncodingSource::AssumedUtf8,
            had_bom: false,
        };
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    EncodingDecision {
        encoding,
        source: EncodingSource::Detector,
        had_bom: false,
    }
}

fn detect_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(UTF_8);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some(UTF_16LE);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some(UTF_16BE);
    }

    None
}

fn bom_len(encoding: &'static Encoding) -> usize {
    if encoding == UTF_8 { 3 } else { 2 }
}

/// Reads `encoding="..."` from an ASCII-compatible `<?xml ...?>` prolog.
fn detect_declaration(bytes: &[u8]) -> Option<&'static Encoding> {
    let window = &bytes[..bytes.len().min(DECLARATION_WINDOW)];
    if !window.starts_with(b"<?xml") {
        return None;
    }
    let end = window.windows(2).position(|pair| pair == b"?>")?;
    let declaration = std::str::from_utf8(&window[..end]).ok()?;
    let after = &declaration[declaration.find("encoding")? + "encoding".len()..];
    let after = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = after.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let value = &after[1..];
    let label = &value[..value.find(quote)?];
    let encoding = Encoding::for_label(label.trim().as_bytes())?;
    // UTF-16 files are found by their BOM.
    encoding.is_ascii_compatible().then_some(encoding)
}

fn encode_with(encoding: &'static Encoding, with_bom: bool, text: &str) -> (Vec<u8>, bool) {
    let mut out = Vec::with_capacity(text.len() + 3);
    if encoding == UTF_16LE || encoding == UTF_16BE {
        let little = encoding == UTF_16LE;
        if with_bom {
            out.extend_from_slice(if little { &[0xFF, 0xFE] } else { &[0xFE, 0xFF] });
        }
        for unit in text.encode_utf16() {
            let bytes = if little {
                unit.to_le_bytes()
            } else {
                unit.to_be_bytes()
            };
            out.extend_from_slice(&bytes);
        }
        return (out, false);
    }

    if with_bom && encoding == UTF_8 {
        out.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
    }
    let (encoded, _, had_errors) = encoding.encode(text);
    out.extend_from_slice(&encoded);
    (out, had_errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_validation() {
        let strategy = EncodingStrategy::new(Some("windows-1252")).expect("valid encoding");
        assert_eq!(strategy.override_label.as_deref(), Some("windows-1252"));
        assert!(EncodingStrategy::new(Some("klingon")).is_err());
    }

    #[test]
    fn utf8_detection_without_bom() {
        let decision = detect_auto(b"<RadioInfo/>", None);
        assert_eq!(decision.source, EncodingSource::AssumedUtf8);
        assert_eq!(decision.encoding.name(), "UTF-8");
    }

    #[test]
    fn declaration_is_honoured() {
        let data = b"<?xml version=\"1.0\" encoding='ISO-8859-1'?><a/>";
        let decision = detect_auto(data, None);
        assert_eq!(decision.source, EncodingSource::Declaration);
        assert_eq!(decision.encoding.name(), "windows-1252");
    }

    #[test]
    fn bom_round_trips_byte_for_byte() {
        let strategy = EncodingStrategy::new(None).unwrap();
        let data = b"\xEF\xBB\xBF<a>Caf\xC3\xA9</a>";
        let decoded = strategy.decode(data);
        assert_eq!(decoded.decision.source, EncodingSource::Bom);
        assert_eq!(decoded.text, "<a>Café</a>");
        let (bytes, lossy) = decoded.encode_like_source(&decoded.text);
        assert!(!lossy);
        assert_eq!(bytes, data);
    }

    #[test]
    fn utf16_round_trips_byte_for_byte() {
        let strategy = EncodingStrategy::new(None).unwrap();
        let data = [0xFF, 0xFE, b'<', 0x00, b'a', 0x00, b'/', 0x00, b'>', 0x00];
        let decoded = strategy.decode(&data);
        assert_eq!(decoded.text, "<a/>");
        assert_eq!(decoded.encode_like_source(&decoded.text).0, data);
    }

    #[test]
    fn stray_byte_under_utf8_declaration_is_flagged() {
        let strategy = EncodingStrategy::new(None).unwrap();
        let data = b"<?xml version=\"1.0\" encoding=\"utf-8\"?><a b=\"Caf\xE9\"/>";
        let decoded = strategy.decode(data);
        assert_eq!(decoded.decision.source, EncodingSource::Declaration);
        assert!(decoded.had_errors);
        assert!(decoded.text.contains('\u{FFFD}'));

        let latin = EncodingStrategy::new(Some("windows-1252")).unwrap().decode(data);
        assert!(!latin.had_errors);
        assert_eq!(latin.encode_like_source(&latin.text).0, data);
    }
}
