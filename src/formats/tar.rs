//! tar archive adapter.
//!
//! A tar stream can only be read front to back, so it is exposed as an
//! [`ArchiveReader`]. Supports POSIX ustar headers with name prefixes, GNU
//! long names (`L` records), pax `path` records, and base-256 sizes.
//! Links and device nodes are passed over.

use super::{field_number, field_str, magic};
use crate::context::CancellationToken;
use crate::entity::{ArchiveEntry, ArchiveReader, Entity};
use crate::error::{AnalysisError, Result};
use crate::format::{
    matched, EncodingDetector, FormatFlags, FormatRecognizer, MatchContext, MatchOutcome,
    Signature,
};
use crate::identity::ReferenceKey;
use crate::input::Input;
use chrono::{DateTime, TimeZone, Utc};
use std::io::{self, Read};
use tracing::trace;

const FORMAT: &str = "tar";

/// Size of a header or data block.
pub const BLOCK_SIZE: usize = 512;

/// Header field ranges.
#[allow(missing_docs)]
pub mod header {
    use std::ops::Range;

    pub const NAME: Range<usize> = 0..100;
    pub const SIZE: Range<usize> = 124..136;
    pub const MTIME: Range<usize> = 136..148;
    pub const CHECKSUM: Range<usize> = 148..156;
    pub const TYPEFLAG: usize = 156;
    pub const MAGIC: Range<usize> = 257..263;
    pub const PREFIX: Range<usize> = 345..500;
}

/// Entry type flags.
#[allow(missing_docs)]
pub mod typeflag {
    pub const REGULAR: u8 = b'0';
    pub const REGULAR_OLD: u8 = 0;
    pub const CONTIGUOUS: u8 = b'7';
    pub const DIRECTORY: u8 = b'5';
    pub const GNU_LONG_NAME: u8 = b'L';
    pub const PAX_HEADER: u8 = b'x';
    pub const PAX_GLOBAL: u8 = b'g';
}

/// Recognizer for ustar and GNU tar streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarRecognizer;

impl FormatRecognizer for TarRecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        BLOCK_SIZE
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::at(header::MAGIC.start, &magic::USTAR))
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/x-tar")
    }

    fn extension(&self) -> Option<&'static str> {
        Some("tar")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY | FormatFlags::CONTAINER
    }

    fn check_header(&self, header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        header.len() >= BLOCK_SIZE && checksum_matches(&header[..BLOCK_SIZE])
    }

    fn decode(&self, input: &Input, cx: &MatchContext) -> Result<MatchOutcome> {
        let reader = TarReader::new(
            Box::new(input.reader()),
            cx.nested_reference(FORMAT),
            cx.cancel().clone(),
        );
        matched(Entity::Reader(Box::new(reader)))
    }
}

/// Whether the stored header checksum matches the block.
pub fn checksum_matches(block: &[u8]) -> bool {
    let Some(stored) = field_number(&block[header::CHECKSUM], 8) else {
        return false;
    };
    let sum: u64 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if header::CHECKSUM.contains(&i) {
                u64::from(b' ')
            } else {
                u64::from(b)
            }
        })
        .sum();
    sum == stored
}

fn entry_size(field: &[u8]) -> Option<u64> {
    if field[0] & 0x80 != 0 {
        // base-256: big-endian binary in the remaining bytes
        let mut value: u64 = u64::from(field[0] & 0x7F);
        for &b in &field[1..] {
            value = value.checked_mul(256)?.checked_add(u64::from(b))?;
        }
        return Some(value);
    }
    field_number(field, 8)
}

fn padding(size: u64) -> u64 {
    (BLOCK_SIZE as u64 - size % BLOCK_SIZE as u64) % BLOCK_SIZE as u64
}

/// Bytes an entry occupies in the stream, content plus block padding.
fn padded(size: u64) -> Result<u64> {
    size.checked_add(padding(size))
        .ok_or_else(|| AnalysisError::malformed(FORMAT, "invalid size field"))
}

fn pax_path(records: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(records);
    text.lines().find_map(|line| {
        let (_, record) = line.split_once(' ')?;
        record.strip_prefix("path=").map(str::to_string)
    })
}

struct Pending {
    path: String,
    remaining: u64,
    padding: u64,
}

/// Single-pass reader over a tar stream.
pub struct TarReader {
    stream: Box<dyn Read + Send>,
    reference: ReferenceKey,
    cancel: CancellationToken,
    current: Option<Pending>,
    index: usize,
    finished: bool,
}

impl TarReader {
    /// Reader over `stream`, positioned before the first header.
    pub fn new(
        stream: Box<dyn Read + Send>,
        reference: ReferenceKey,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            reference,
            cancel,
            current: None,
            index: 0,
            finished: false,
        }
    }

    /// Read one block; `false` at a clean end of stream.
    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> Result<bool> {
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.stream.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(false),
            BLOCK_SIZE => Ok(true),
            actual => Err(AnalysisError::TruncatedData {
                offset: 0,
                expected: BLOCK_SIZE,
                actual,
            }),
        }
    }

    fn discard(&mut self, count: u64) -> Result<()> {
        let copied = io::copy(&mut self.stream.by_ref().take(count), &mut io::sink())?;
        if copied < count {
            return Err(AnalysisError::malformed(FORMAT, "stream ends inside an entry"));
        }
        Ok(())
    }

    fn read_payload(&mut self, size: u64) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.stream.by_ref().take(size).read_to_end(&mut data)?;
        if (data.len() as u64) < size {
            return Err(AnalysisError::malformed(FORMAT, "stream ends inside an entry"));
        }
        self.discard(padding(size))?;
        Ok(data)
    }
}

impl ArchiveReader for TarReader {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn reference(&self) -> &ReferenceKey {
        &self.reference
    }

    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        self.skip()?;
        if self.finished {
            return Ok(None);
        }

        let mut long_name: Option<String> = None;
        loop {
            let mut block = [0u8; BLOCK_SIZE];
            if !self.read_block(&mut block)? || block.iter().all(|&b| b == 0) {
                self.finished = true;
                return Ok(None);
            }
            if !checksum_matches(&block) {
                return Err(AnalysisError::malformed(FORMAT, "header checksum mismatch"));
            }

            let size = entry_size(&block[header::SIZE])
                .ok_or_else(|| AnalysisError::malformed(FORMAT, "invalid size field"))?;
            let stored = padded(size)?;
            let flag = block[header::TYPEFLAG];
            match flag {
                typeflag::GNU_LONG_NAME => {
                    let data = self.read_payload(size)?;
                    long_name = Some(field_str(&data));
                    continue;
                }
                typeflag::PAX_HEADER => {
                    let data = self.read_payload(size)?;
                    if let Some(path) = pax_path(&data) {
                        long_name = Some(path);
                    }
                    continue;
                }
                typeflag::PAX_GLOBAL => {
                    self.read_payload(size)?;
                    continue;
                }
                _ => {}
            }

            let path = long_name.take().unwrap_or_else(|| {
                let name = field_str(&block[header::NAME]);
                let prefix = if block[header::MAGIC].starts_with(&magic::USTAR) {
                    field_str(&block[header::PREFIX])
                } else {
                    String::new()
                };
                if prefix.is_empty() {
                    name
                } else {
                    format!("{}/{}", prefix, name)
                }
            });
            let path = path.trim_start_matches("./").to_string();

            let is_dir = flag == typeflag::DIRECTORY;
            let is_file = matches!(
                flag,
                typeflag::REGULAR | typeflag::REGULAR_OLD | typeflag::CONTIGUOUS
            );
            if !is_dir && !is_file {
                trace!(path = %path, flag, "passing over special tar entry");
                self.discard(stored)?;
                continue;
            }

            let modified: Option<DateTime<Utc>> = field_number(&block[header::MTIME], 8)
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
            let payload = if is_dir { 0 } else { size };
            let entry = ArchiveEntry {
                path: path.clone(),
                size: payload,
                compressed_size: None,
                modified,
                is_dir,
                encrypted: false,
                index: self.index,
            };
            self.index += 1;
            self.current = Some(Pending {
                path,
                remaining: size,
                padding: padding(size),
            });
            return Ok(Some(entry));
        }
    }

    fn open_current(&mut self, memory_limit: usize) -> Result<Input> {
        let pending = self.current.take().ok_or_else(|| AnalysisError::EntryConsumed {
            path: String::new(),
        })?;
        let input = Input::spool(
            &mut self.stream.by_ref().take(pending.remaining),
            memory_limit,
            &self.cancel,
        )?;
        if input.len() < pending.remaining {
            return Err(AnalysisError::malformed(
                FORMAT,
                format!("stream ends inside {}", pending.path),
            ));
        }
        self.discard(pending.padding)?;
        Ok(input)
    }

    fn skip(&mut self) -> Result<()> {
        if let Some(pending) = self.current.take() {
            self.discard(padded(pending.remaining)?)?;
        }
        Ok(())
    }
}
