//! Zstandard stream adapter.

use super::{decompressed_payload, magic, payload_name, PayloadLimits};
use crate::entity::Entity;
use crate::error::{Result, ResultExt};
use crate::format::{
    Decoded, EncodingDetector, FormatFlags, FormatRecognizer, MatchContext, MatchOutcome,
    Signature,
};
use crate::input::Input;

const FORMAT: &str = "zstd";
const SUFFIXES: [(&str, &str); 3] = [(".tzst", ".tar"), (".zst", ""), (".zstd", "")];
/// Reserved bit of the frame header descriptor.
const DESCRIPTOR_RESERVED: u8 = 1 << 3;

/// Recognizer for Zstandard frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdRecognizer;

impl FormatRecognizer for ZstdRecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        5
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::prefix(&magic::ZSTD))
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/zstd")
    }

    fn extension(&self) -> Option<&'static str> {
        Some("zst")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY | FormatFlags::COMPRESSED
    }

    fn check_header(&self, header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        header.len() >= 5 && header[4] & DESCRIPTOR_RESERVED == 0
    }

    fn decode(&self, input: &Input, cx: &MatchContext) -> Result<MatchOutcome> {
        let parent = cx.file_node();
        let name = payload_name(parent.as_ref().map(|n| n.name.as_str()), &SUFFIXES);
        let reference = cx.nested_reference(FORMAT);
        let limits = PayloadLimits::from_context(cx);
        let input = input.clone();

        let decoded = Decoded::deferred(move || {
            let decoder = ::zstd::stream::read::Decoder::new(input.reader())
                .context(FORMAT, "initializing decoder")?;
            let payload = decompressed_payload(name, reference, decoder, &limits)?;
            Ok(Entity::Node(payload))
        });
        Ok(MatchOutcome::Matched(decoded))
    }
}
