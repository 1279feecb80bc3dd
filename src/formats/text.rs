//! Plain text recognizer.
//!
//! Accepts nearly anything printable, so it is registered last. Encoding is
//! taken from a byte order mark, then UTF-8 validity, then the configured
//! default.

use crate::entity::{Entity, TextDocument};
use crate::error::Result;
use crate::format::{
    matched, EncodingDetector, FormatFlags, FormatRecognizer, MatchContext, MatchOutcome,
};
use crate::input::Input;
use tracing::trace;

const FORMAT: &str = "text";

/// Recognizer of last resort for plain text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRecognizer;

impl FormatRecognizer for TextRecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        1
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("text/plain")
    }

    fn extension(&self) -> Option<&'static str> {
        Some("txt")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::TEXT
    }

    fn check_header(&self, header: &[u8], is_binary: bool, detector: &EncodingDetector) -> bool {
        !is_binary && detector.looks_textual(header)
    }

    fn decode(&self, input: &Input, cx: &MatchContext) -> Result<MatchOutcome> {
        let limit = cx.options().spool_memory_limit as u64;
        if input.len() > limit {
            trace!(len = input.len(), limit, "text too large to decode");
            return Ok(MatchOutcome::NoMatch);
        }
        let bytes = input.to_vec()?;
        let detector = cx.detector();
        if detector.is_binary(&bytes) {
            return Ok(MatchOutcome::NoMatch);
        }

        let (encoding, bom) = detector.detect(&bytes);
        let (text, _) = detector.decode(&bytes);
        matched(Entity::Text(TextDocument::from_text(&text, encoding, bom > 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatObject;
    use crate::types::{AnalyzerOptions, TextEncoding};
    use std::sync::Arc;

    fn decode(bytes: &[u8]) -> Option<TextDocument> {
        let cx = MatchContext::new(Arc::new(AnalyzerOptions::new()));
        let input = Input::from_slice(bytes);
        let header = input.header(64).unwrap();
        let detector = cx.detector();
        if !TextRecognizer.check_header(&header, detector.is_binary(&header), detector) {
            return None;
        }
        match TextRecognizer.decode(&input, &cx).unwrap() {
            MatchOutcome::Matched(decoded) => {
                let mut object = FormatObject::new(Arc::new(TextRecognizer), decoded);
                match object.value_mut().unwrap() {
                    Entity::Text(doc) => Some(doc.clone()),
                    other => panic!("unexpected entity {:?}", other),
                }
            }
            MatchOutcome::NoMatch => None,
        }
    }

    #[test]
    fn test_utf8_text() {
        let doc = decode("héllo\nworld\n".as_bytes()).unwrap();
        assert_eq!(doc.encoding, TextEncoding::Utf8);
        assert_eq!(doc.lines, 2);
        assert_eq!(doc.characters, 12);
        assert!(!doc.has_bom);
    }

    #[test]
    fn test_bom_and_fallback() {
        let doc = decode(b"\xEF\xBB\xBFa\r\nb").unwrap();
        assert!(doc.has_bom);
        assert_eq!(doc.lines, 2);

        let doc = decode(b"caf\xE9 au lait").unwrap();
        assert_eq!(doc.encoding, TextEncoding::Latin1);
        assert_eq!(doc.characters, 12);
    }

    #[test]
    fn test_rejects_binary() {
        assert!(decode(&[0x00, 0x9F, 0x13, 0x77]).is_none());
        assert!(decode(b"\x01\x02\x03").is_none());
    }
}
