//! gzip stream adapter.
//!
//! The decompressed payload becomes one embedded file node. Concatenated
//! members are decoded as a single stream.

use super::{decompressed_payload, magic, payload_name, read_bytes, read_u16, read_u32, PayloadLimits};
use crate::entity::Entity;
use crate::error::Result;
use crate::format::{
    decode_with, Decoded, EncodingDetector, FormatFlags, FormatRecognizer, MatchContext,
    MatchOutcome, Signature,
};
use crate::input::Input;
use crate::types::TextEncoding;
use chrono::{DateTime, TimeZone, Utc};
use flate2::read::MultiGzDecoder;

const FORMAT: &str = "gzip";
const FIXED_HEADER: usize = 10;
const DEFLATE: u8 = 8;
const SUFFIXES: [(&str, &str); 4] = [(".tgz", ".tar"), (".gz", ""), ("-gz", ""), (".z", "")];

/// Header flag bits.
#[allow(missing_docs)]
pub mod flags {
    pub const FHCRC: u8 = 1 << 1;
    pub const FEXTRA: u8 = 1 << 2;
    pub const FNAME: u8 = 1 << 3;
    pub const FCOMMENT: u8 = 1 << 4;
    pub const RESERVED: u8 = 0xE0;
}

/// Recognizer for gzip streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipRecognizer;

impl FormatRecognizer for GzipRecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        FIXED_HEADER
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::prefix(&magic::GZIP))
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/gzip")
    }

    fn extension(&self) -> Option<&'static str> {
        Some("gz")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY | FormatFlags::COMPRESSED
    }

    fn check_header(&self, header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        header.len() >= FIXED_HEADER
            && header[2] == DEFLATE
            && header[3] & flags::RESERVED == 0
    }

    fn decode(&self, input: &Input, cx: &MatchContext) -> Result<MatchOutcome> {
        let header = GzipHeader::read(input)?;
        let parent = cx.file_node();
        let name = header
            .file_name
            .clone()
            .unwrap_or_else(|| payload_name(parent.as_ref().map(|n| n.name.as_str()), &SUFFIXES));
        let reference = cx.nested_reference(FORMAT);
        let limits = PayloadLimits::from_context(cx);
        let input = input.clone();

        let decoded = Decoded::deferred(move || {
            let mut payload = decompressed_payload(
                name,
                reference,
                MultiGzDecoder::new(input.reader()),
                &limits,
            )?;
            payload.modified = header.modified;
            Ok(Entity::Node(payload))
        });
        Ok(MatchOutcome::Matched(decoded))
    }
}

/// Optional fields of a gzip member header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GzipHeader {
    /// Original file name (`FNAME`).
    pub file_name: Option<String>,
    /// `MTIME`, unless zero.
    pub modified: Option<DateTime<Utc>>,
}

impl GzipHeader {
    /// Parse the header of the first member.
    pub fn read(input: &Input) -> Result<Self> {
        let data = input.header(64 * 1024)?;
        let fixed = read_bytes(&data, 0, FIXED_HEADER)?;
        let flg = fixed[3];
        let mtime = read_u32(fixed, 4, true)?;

        let mut pos = FIXED_HEADER;
        if flg & flags::FEXTRA != 0 {
            let extra = read_u16(&data, pos, true)?;
            pos += 2 + usize::from(extra);
        }
        let mut file_name = None;
        if flg & flags::FNAME != 0 {
            let rest = data.get(pos..).unwrap_or_default();
            if let Some(end) = memchr::memchr(0, rest) {
                // FNAME is ISO 8859-1 by definition
                let name = decode_with(TextEncoding::Latin1, &rest[..end]);
                let name = name.rsplit(['/', '\\']).next().unwrap_or_default();
                if !name.is_empty() {
                    file_name = Some(name.to_string());
                }
            }
        }

        let modified = if mtime == 0 {
            None
        } else {
            Utc.timestamp_opt(i64::from(mtime), 0).single()
        };
        Ok(Self {
            file_name,
            modified,
        })
    }
}
