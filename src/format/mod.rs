//! Format recognizer contract and matching.
//!
//! A recognizer declares how many header bytes it needs, an optional fixed
//! signature, and two checks: a cheap [`FormatRecognizer::check_header`] on the
//! buffered header and an expensive [`FormatRecognizer::decode`] on the full
//! input. The [`Matcher`] walks a [`FormatRegistry`] in registration order and
//! wraps the first successful decode in a [`FormatObject`].

pub mod matcher;
pub mod object;
pub mod registry;

pub use matcher::Matcher;
pub use object::{Decoded, FormatObject};
pub use registry::FormatRegistry;

use crate::context::{CancellationToken, Services};
use crate::entity::Entity;
use crate::error::Result;
use crate::hierarchy::FileNode;
use crate::identity::{EntityKey, ReferenceKey};
use crate::input::Input;
use crate::types::{AnalyzerOptions, TextEncoding};
use bitflags::bitflags;
use std::sync::Arc;

/// Fixed bytes a recognizer requires at an offset of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Offset into the header.
    pub offset: usize,
    /// Bytes expected there.
    pub bytes: &'static [u8],
}

impl Signature {
    /// Signature at the start of the data.
    pub const fn prefix(bytes: &'static [u8]) -> Self {
        Self { offset: 0, bytes }
    }

    /// Signature at `offset`.
    pub const fn at(offset: usize, bytes: &'static [u8]) -> Self {
        Self { offset, bytes }
    }

    /// Bytes needed to test this signature.
    pub fn end(&self) -> usize {
        self.offset + self.bytes.len()
    }

    /// Whether `header` carries the signature.
    pub fn matches(&self, header: &[u8]) -> bool {
        header
            .get(self.offset..self.end())
            .map_or(false, |window| window == self.bytes)
    }
}

bitflags! {
    /// Coarse traits of a format, for listings and filters.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FormatFlags: u8 {
        /// Binary content.
        const BINARY = 0x01;
        /// Textual content.
        const TEXT = 0x02;
        /// Exposes child entities.
        const CONTAINER = 0x04;
        /// Compressed content.
        const COMPRESSED = 0x08;
    }
}

/// Detects text encodings from byte order marks and validity.
///
/// The default encoding is the configured fallback for text that has no BOM
/// and is not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodingDetector {
    default: TextEncoding,
}

impl EncodingDetector {
    /// Create a detector with a fallback encoding.
    pub fn new(default: TextEncoding) -> Self {
        Self { default }
    }

    /// Fallback encoding.
    pub fn default_encoding(&self) -> TextEncoding {
        self.default
    }

    /// Encoding of `bytes` and the length of its BOM.
    pub fn detect(&self, bytes: &[u8]) -> (TextEncoding, usize) {
        if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
            return (TextEncoding::Utf8, 3);
        }
        if bytes.starts_with(&[0xFF, 0xFE]) {
            return (TextEncoding::Utf16Le, 2);
        }
        if bytes.starts_with(&[0xFE, 0xFF]) {
            return (TextEncoding::Utf16Be, 2);
        }
        match std::str::from_utf8(bytes) {
            Ok(_) => (TextEncoding::Utf8, 0),
            // A multi-byte sequence cut off by the end of a header is still UTF-8.
            Err(e) if e.error_len().is_none() => (TextEncoding::Utf8, 0),
            Err(_) => (self.default, 0),
        }
    }

    /// Whether a header looks binary: it has NUL bytes and no UTF-16 BOM.
    pub fn is_binary(&self, header: &[u8]) -> bool {
        if header.starts_with(&[0xFF, 0xFE]) || header.starts_with(&[0xFE, 0xFF]) {
            return false;
        }
        memchr::memchr(0, header).is_some()
    }

    /// Decode `bytes` with the detected encoding.
    pub fn decode(&self, bytes: &[u8]) -> (String, TextEncoding) {
        let (encoding, bom) = self.detect(bytes);
        (decode_with(encoding, &bytes[bom..]), encoding)
    }

    /// Whether decoded header text has no control characters besides
    /// whitespace, form feed, and escape.
    pub fn looks_textual(&self, header: &[u8]) -> bool {
        let (text, _) = self.decode(header);
        !text.is_empty()
            && text
                .chars()
                .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r' | '\x0c' | '\x1b'))
    }
}

/// Decode `bytes` (without BOM) as `encoding`, replacing invalid sequences.
pub fn decode_with(encoding: TextEncoding, bytes: &[u8]) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            let units = bytes.chunks_exact(2).map(|pair| {
                if encoding == TextEncoding::Utf16Le {
                    u16::from_le_bytes([pair[0], pair[1]])
                } else {
                    u16::from_be_bytes([pair[0], pair[1]])
                }
            });
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
    }
}

/// What a recognizer's decode produced.
pub enum MatchOutcome {
    /// The content is this format.
    Matched(Decoded),
    /// Deep inspection disproved the header-level guess.
    NoMatch,
}

/// Recognizer-facing context: services, options, and cancellation.
#[derive(Clone)]
pub struct MatchContext {
    services: Services,
    options: Arc<AnalyzerOptions>,
    cancel: CancellationToken,
    detector: EncodingDetector,
}

impl MatchContext {
    /// Context with no services and a fresh cancellation token.
    pub fn new(options: Arc<AnalyzerOptions>) -> Self {
        let detector = EncodingDetector::new(options.default_encoding);
        Self {
            services: Services::new(),
            options,
            cancel: CancellationToken::new(),
            detector,
        }
    }

    /// Replace the service bag.
    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// Replace the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Most recent service of type `T`.
    pub fn service<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services.get::<T>()
    }

    /// Hierarchy node whose content is being matched.
    pub fn file_node(&self) -> Option<Arc<FileNode>> {
        self.service::<FileNode>()
    }

    /// Identity of the store opened by decoding the current content as
    /// `format`.
    pub fn nested_reference(&self, format: &str) -> ReferenceKey {
        match self.file_node() {
            Some(node) => ReferenceKey::nested(&node.key, format),
            None => ReferenceKey::anonymous(),
        }
    }

    /// Identity key of the content being matched.
    pub fn key(&self) -> Option<EntityKey> {
        self.file_node().map(|node| node.key.clone())
    }

    /// Analyzer options.
    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Encoding detector configured from the options.
    pub fn detector(&self) -> &EncodingDetector {
        &self.detector
    }

    /// Cancellation token.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail if cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.checkpoint()
    }
}

/// A pluggable format recognizer.
///
/// Recognizers are registered once and are stateless afterwards. `decode`
/// reads from an [`Input`] it does not consume; returning
/// [`MatchOutcome::NoMatch`] or a non-fatal error lets the next candidate try.
pub trait FormatRecognizer: Send + Sync {
    /// Short, stable format name.
    fn name(&self) -> &'static str;

    /// Minimum header bytes needed to decide.
    fn header_length(&self) -> usize;

    /// Fixed bytes the header must carry.
    fn signature(&self) -> Option<Signature> {
        None
    }

    /// Default media type.
    fn media_type(&self) -> Option<&'static str> {
        None
    }

    /// Default file extension, without the dot.
    fn extension(&self) -> Option<&'static str> {
        None
    }

    /// Coarse traits of the format.
    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY
    }

    /// Cheap pre-filter on the buffered header.
    fn check_header(&self, _header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        true
    }

    /// Decode the content into an entity.
    fn decode(&self, input: &Input, cx: &MatchContext) -> Result<MatchOutcome>;
}

/// Shorthand for a matched, ready entity.
pub fn matched(entity: Entity) -> Result<MatchOutcome> {
    Ok(MatchOutcome::Matched(Decoded::ready(entity)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_matches() {
        let sig = Signature::at(2, b"AB");
        assert!(sig.matches(b"xxAByy"));
        assert!(!sig.matches(b"xxA"));
        assert!(!sig.matches(b"ABxxxx"));
        assert_eq!(sig.end(), 4);
    }

    #[test]
    fn test_detect_boms_and_fallback() {
        let detector = EncodingDetector::new(TextEncoding::Latin1);
        assert_eq!(detector.detect(b"\xEF\xBB\xBFhi"), (TextEncoding::Utf8, 3));
        assert_eq!(detector.detect(b"\xFF\xFEh\x00"), (TextEncoding::Utf16Le, 2));
        assert_eq!(detector.detect("caf\u{e9}".as_bytes()), (TextEncoding::Utf8, 0));
        assert_eq!(detector.detect(b"caf\xE9!"), (TextEncoding::Latin1, 0));
        // Truncated multi-byte sequence at the end.
        assert_eq!(detector.detect(b"caf\xC3"), (TextEncoding::Utf8, 0));
    }

    #[test]
    fn test_decode_utf16() {
        let detector = EncodingDetector::default();
        let (text, encoding) = detector.decode(b"\xFE\xFF\x00h\x00i");
        assert_eq!(text, "hi");
        assert_eq!(encoding, TextEncoding::Utf16Be);
        assert!(!detector.is_binary(b"\xFE\xFF\x00h"));
    }

    #[test]
    fn test_looks_textual() {
        let detector = EncodingDetector::default();
        assert!(detector.looks_textual(b"hello\r\n\tworld"));
        assert!(!detector.looks_textual(b"hi\x01there"));
        assert!(!detector.looks_textual(b""));
        assert!(detector.is_binary(b"ab\x00cd"));
    }
}
