//! ZIP archive adapter.
//!
//! Reads the end-of-central-directory record and the central directory
//! (32-bit offsets only). Stored entries are exposed as windows of the
//! archive's own store; deflated entries are decompressed on open.
//! Entries with the encryption flag fail to open with
//! [`AnalysisError::Encrypted`].

use super::{magic, read_bytes, read_u16, read_u32};
use crate::entity::{ArchiveEntry, ArchiveFile, Entity};
use crate::error::{AnalysisError, Result, ResultExt};
use crate::format::{
    decode_with, Decoded, EncodingDetector, FormatFlags, FormatRecognizer, MatchContext,
    MatchOutcome, Signature,
};
use crate::identity::ReferenceKey;
use crate::input::{Input, StreamFactoryAccess};
use crate::types::TextEncoding;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use flate2::read::DeflateDecoder;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::trace;

const FORMAT: &str = "zip";

const EOCD_SIZE: usize = 22;
const MAX_COMMENT: usize = 0xFFFF;
const CENTRAL_HEADER_SIZE: usize = 46;
const LOCAL_HEADER_SIZE: usize = 30;
const CENTRAL_SIGNATURE: u32 = 0x0201_4B50;
const LOCAL_SIGNATURE: u32 = 0x0403_4B50;

/// Compression methods.
#[allow(missing_docs)]
pub mod method {
    pub const STORED: u16 = 0;
    pub const DEFLATED: u16 = 8;
}

/// General purpose flag bits.
#[allow(missing_docs)]
pub mod flags {
    pub const ENCRYPTED: u16 = 1 << 0;
    pub const UTF8_NAMES: u16 = 1 << 11;
}

/// Recognizer for ZIP archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipRecognizer;

impl FormatRecognizer for ZipRecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        4
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::prefix(b"PK"))
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/zip")
    }

    fn extension(&self) -> Option<&'static str> {
        Some("zip")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY | FormatFlags::CONTAINER | FormatFlags::COMPRESSED
    }

    fn check_header(&self, header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        header.starts_with(&magic::ZIP_LOCAL) || header.starts_with(&magic::ZIP_EOCD)
    }

    fn decode(&self, input: &Input, cx: &MatchContext) -> Result<MatchOutcome> {
        let Some(directory) = find_directory(input)? else {
            return Ok(MatchOutcome::NoMatch);
        };
        let input = input.clone();
        let reference = cx.nested_reference(FORMAT);
        let decoded = Decoded::deferred(move || {
            let archive = ZipArchive::read(input, reference, directory)?;
            Ok(Entity::Archive(Arc::new(archive)))
        });
        Ok(MatchOutcome::Matched(decoded))
    }
}

/// Location of the central directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CentralDirectory {
    entries: u16,
    offset: u64,
    size: u64,
}

fn find_directory(input: &Input) -> Result<Option<CentralDirectory>> {
    let len = input.len();
    if len < EOCD_SIZE as u64 {
        return Ok(None);
    }
    let tail_len = len.min((EOCD_SIZE + MAX_COMMENT) as u64);
    let mut tail = vec![0u8; tail_len as usize];
    input.read_exact_at(len - tail_len, &mut tail)?;

    let Some(pos) = memchr::memmem::rfind(&tail, &magic::ZIP_EOCD) else {
        return Ok(None);
    };
    let record = read_bytes(&tail, pos, EOCD_SIZE)?;
    let entries = read_u16(record, 10, true)?;
    let size = u64::from(read_u32(record, 12, true)?);
    let offset = u64::from(read_u32(record, 16, true)?);

    if entries == 0xFFFF || size == 0xFFFF_FFFF || offset == 0xFFFF_FFFF {
        return Err(AnalysisError::malformed(FORMAT, "zip64 archives are not supported"));
    }
    if offset + size > len {
        return Err(AnalysisError::malformed(
            FORMAT,
            "central directory lies outside the archive",
        ));
    }
    Ok(Some(CentralDirectory {
        entries,
        offset,
        size,
    }))
}

#[derive(Debug, Clone, Copy)]
struct EntryRecord {
    method: u16,
    local_offset: u64,
    compressed_size: u64,
}

/// An opened ZIP archive.
pub struct ZipArchive {
    input: Input,
    reference: ReferenceKey,
    entries: Vec<ArchiveEntry>,
    records: Vec<EntryRecord>,
}

impl ZipArchive {
    fn read(input: Input, reference: ReferenceKey, directory: CentralDirectory) -> Result<Self> {
        let mut data = vec![0u8; directory.size as usize];
        input.read_exact_at(directory.offset, &mut data)?;

        let mut entries = Vec::with_capacity(directory.entries as usize);
        let mut records = Vec::with_capacity(directory.entries as usize);
        let mut pos = 0usize;
        for index in 0..directory.entries as usize {
            let header = read_bytes(&data, pos, CENTRAL_HEADER_SIZE)
                .context(FORMAT, "central directory truncated")?;
            if read_u32(header, 0, true)? != CENTRAL_SIGNATURE {
                return Err(AnalysisError::malformed(
                    FORMAT,
                    format!("bad central directory signature at entry {}", index),
                ));
            }
            let flag_bits = read_u16(header, 8, true)?;
            let method = read_u16(header, 10, true)?;
            let time = read_u16(header, 12, true)?;
            let date = read_u16(header, 14, true)?;
            let compressed_size = u64::from(read_u32(header, 20, true)?);
            let size = u64::from(read_u32(header, 24, true)?);
            let name_len = read_u16(header, 28, true)? as usize;
            let extra_len = read_u16(header, 30, true)? as usize;
            let comment_len = read_u16(header, 32, true)? as usize;
            let local_offset = u64::from(read_u32(header, 42, true)?);

            let raw_name = read_bytes(&data, pos + CENTRAL_HEADER_SIZE, name_len)
                .context(FORMAT, "entry name truncated")?;
            let path = decode_name(raw_name, flag_bits & flags::UTF8_NAMES != 0);

            entries.push(ArchiveEntry {
                is_dir: path.ends_with('/'),
                path,
                size,
                compressed_size: Some(compressed_size),
                modified: dos_datetime(date, time),
                encrypted: flag_bits & flags::ENCRYPTED != 0,
                index,
            });
            records.push(EntryRecord {
                method,
                local_offset,
                compressed_size,
            });
            pos += CENTRAL_HEADER_SIZE + name_len + extra_len + comment_len;
        }

        trace!(entries = entries.len(), "read zip central directory");
        Ok(Self {
            input,
            reference,
            entries,
            records,
        })
    }

    fn record(&self, entry: &ArchiveEntry) -> Result<EntryRecord> {
        self.records.get(entry.index).copied().ok_or_else(|| {
            AnalysisError::malformed(FORMAT, format!("no entry with index {}", entry.index))
        })
    }

    /// Window over the entry's stored bytes, after its local header.
    fn data_window(&self, entry: &ArchiveEntry) -> Result<(Input, u16)> {
        if entry.encrypted {
            return Err(AnalysisError::Encrypted {
                path: entry.path.clone(),
            });
        }
        let record = self.record(entry)?;
        let mut local = [0u8; LOCAL_HEADER_SIZE];
        self.input
            .read_exact_at(record.local_offset, &mut local)
            .context(FORMAT, "local header truncated")?;
        if read_u32(&local, 0, true)? != LOCAL_SIGNATURE {
            return Err(AnalysisError::malformed(
                FORMAT,
                format!("bad local header signature for {}", entry.path),
            ));
        }
        let name_len = u64::from(read_u16(&local, 26, true)?);
        let extra_len = u64::from(read_u16(&local, 28, true)?);
        let start = record.local_offset + LOCAL_HEADER_SIZE as u64 + name_len + extra_len;
        let window = self.input.window(start, record.compressed_size)?;
        Ok((window, record.method))
    }
}

impl ArchiveFile for ZipArchive {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn reference(&self) -> &ReferenceKey {
        &self.reference
    }

    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn open(&self, entry: &ArchiveEntry) -> Result<Box<dyn Read + Send>> {
        let (window, method) = self.data_window(entry)?;
        match method {
            method::STORED => Ok(Box::new(window.reader())),
            method::DEFLATED => Ok(Box::new(DeclaredSize {
                inner: DeflateDecoder::new(window.reader()),
                remaining: entry.size,
            })),
            other => Err(AnalysisError::UnsupportedMethod {
                format: FORMAT,
                method: other,
            }),
        }
    }

    fn open_input(&self, entry: &ArchiveEntry) -> Result<Option<Input>> {
        let (window, method) = self.data_window(entry)?;
        Ok((method == method::STORED).then_some(window))
    }

    fn access(&self) -> StreamFactoryAccess {
        self.input.access()
    }
}

/// Inflated content cut off at the size the central directory declares.
///
/// Output past that size is an error rather than silently truncated, so a
/// lying entry ends up with a diagnostic.
struct DeclaredSize<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> Read for DeclaredSize<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            let mut extra = [0u8; 1];
            return match self.inner.read(&mut extra)? {
                0 => Ok(0),
                _ => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "zip entry inflates past its declared size",
                )),
            };
        }
        let limit = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..limit])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

fn decode_name(raw: &[u8], utf8: bool) -> String {
    let name = match std::str::from_utf8(raw) {
        Ok(name) => name.to_string(),
        Err(_) if utf8 => String::from_utf8_lossy(raw).into_owned(),
        Err(_) => decode_with(TextEncoding::Latin1, raw),
    };
    name.replace('\\', "/").trim_start_matches('/').to_string()
}

/// MS-DOS date and time fields; `None` for the zero date or invalid values.
pub fn dos_datetime(date: u16, time: u16) -> Option<DateTime<Utc>> {
    let year = 1980 + i32::from(date >> 9);
    let month = u32::from((date >> 5) & 0x0F);
    let day = u32::from(date & 0x1F);
    let hour = u32::from(time >> 11);
    let minute = u32::from((time >> 5) & 0x3F);
    let second = u32::from(time & 0x1F) * 2;
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use flate2::write::DeflateEncoder;
    use flate2::{Compression, Crc};
    use std::io::Write;

    /// Minimal ZIP writer for fixtures.
    #[derive(Default)]
    pub(crate) struct ZipBuilder {
        data: Vec<u8>,
        central: Vec<u8>,
        count: u16,
    }

    impl ZipBuilder {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn stored(self, name: &str, content: &[u8]) -> Self {
            self.entry(name, content, method::STORED, 0)
        }

        pub(crate) fn deflated(self, name: &str, content: &[u8]) -> Self {
            self.entry(name, content, method::DEFLATED, 0)
        }

        pub(crate) fn encrypted(self, name: &str, content: &[u8]) -> Self {
            self.entry(name, content, method::STORED, flags::ENCRYPTED)
        }

        fn entry(mut self, name: &str, content: &[u8], method: u16, flag_bits: u16) -> Self {
            let mut crc = Crc::new();
            crc.update(content);
            let stored = if method == method::DEFLATED {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(content).unwrap();
                encoder.finish().unwrap()
            } else {
                content.to_vec()
            };
            let offset = self.data.len() as u32;
            // 2021-06-15 12:30:10
            let (time, date) = ((12 << 11) | (30 << 5) | 5, (41 << 9) | (6 << 5) | 15);

            let d = &mut self.data;
            d.write_u32::<LittleEndian>(LOCAL_SIGNATURE).unwrap();
            d.write_u16::<LittleEndian>(20).unwrap();
            d.write_u16::<LittleEndian>(flag_bits).unwrap();
            d.write_u16::<LittleEndian>(method).unwrap();
            d.write_u16::<LittleEndian>(time).unwrap();
            d.write_u16::<LittleEndian>(date).unwrap();
            d.write_u32::<LittleEndian>(crc.sum()).unwrap();
            d.write_u32::<LittleEndian>(stored.len() as u32).unwrap();
            d.write_u32::<LittleEndian>(content.len() as u32).unwrap();
            d.write_u16::<LittleEndian>(name.len() as u16).unwrap();
            d.write_u16::<LittleEndian>(0).unwrap();
            d.extend_from_slice(name.as_bytes());
            d.extend_from_slice(&stored);

            let c = &mut self.central;
            c.write_u32::<LittleEndian>(CENTRAL_SIGNATURE).unwrap();
            c.write_u16::<LittleEndian>(20).unwrap();
            c.write_u16::<LittleEndian>(20).unwrap();
            c.write_u16::<LittleEndian>(flag_bits).unwrap();
            c.write_u16::<LittleEndian>(method).unwrap();
            c.write_u16::<LittleEndian>(time).unwrap();
            c.write_u16::<LittleEndian>(date).unwrap();
            c.write_u32::<LittleEndian>(crc.sum()).unwrap();
            c.write_u32::<LittleEndian>(stored.len() as u32).unwrap();
            c.write_u32::<LittleEndian>(content.len() as u32).unwrap();
            c.write_u16::<LittleEndian>(name.len() as u16).unwrap();
            c.write_u16::<LittleEndian>(0).unwrap();
            c.write_u16::<LittleEndian>(0).unwrap();
            c.write_u16::<LittleEndian>(0).unwrap();
            c.write_u16::<LittleEndian>(0).unwrap();
            c.write_u32::<LittleEndian>(0).unwrap();
            c.write_u32::<LittleEndian>(offset).unwrap();
            c.extend_from_slice(name.as_bytes());

            self.count += 1;
            self
        }

        pub(crate) fn finish(mut self) -> Vec<u8> {
            let cd_offset = self.data.len() as u32;
            let cd_size = self.central.len() as u32;
            self.data.extend_from_slice(&self.central);
            let d = &mut self.data;
            d.extend_from_slice(&magic::ZIP_EOCD);
            d.write_u16::<LittleEndian>(0).unwrap();
            d.write_u16::<LittleEndian>(0).unwrap();
            d.write_u16::<LittleEndian>(self.count).unwrap();
            d.write_u16::<LittleEndian>(self.count).unwrap();
            d.write_u32::<LittleEndian>(cd_size).unwrap();
            d.write_u32::<LittleEndian>(cd_offset).unwrap();
            d.write_u16::<LittleEndian>(0).unwrap();
            self.data
        }
    }

    fn open(bytes: Vec<u8>) -> ZipArchive {
        let input = Input::from_vec(bytes);
        let directory = find_directory(&input).unwrap().unwrap();
        ZipArchive::read(input, ReferenceKey::anonymous(), directory).unwrap()
    }

    fn read_all(archive: &ZipArchive, index: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        archive.open(&archive.entries()[index])?.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_entries_and_content() {
        let archive = open(
            ZipBuilder::new()
                .stored("docs/", b"")
                .stored("docs/a.txt", b"alpha")
                .deflated("b.bin", &[7u8; 4096])
                .finish(),
        );
        let entries = archive.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].name(), "a.txt");
        assert_eq!(entries[2].size, 4096);
        assert!(entries[2].compressed_size.unwrap() < 4096);

        assert_eq!(read_all(&archive, 1).unwrap(), b"alpha");
        assert_eq!(read_all(&archive, 2).unwrap(), vec![7u8; 4096]);

        assert!(archive.open_input(&entries[1]).unwrap().is_some());
        assert!(archive.open_input(&entries[2]).unwrap().is_none());
        assert_eq!(archive.access(), StreamFactoryAccess::Parallel);
    }

    #[test]
    fn test_encrypted_entry_fails_to_open() {
        let archive = open(
            ZipBuilder::new()
                .stored("one", b"1")
                .encrypted("two", b"secret")
                .finish(),
        );
        assert!(archive.entries()[1].encrypted);
        assert!(read_all(&archive, 1).unwrap_err().is_encryption());
        assert_eq!(read_all(&archive, 0).unwrap(), b"1");
    }

    /// Overwrite the uncompressed size in the last central directory record.
    fn patch_declared_size(bytes: &mut [u8], size: u32) {
        let signature = CENTRAL_SIGNATURE.to_le_bytes();
        let at = bytes.windows(4).rposition(|w| w == signature).unwrap();
        bytes[at + 24..at + 28].copy_from_slice(&size.to_le_bytes());
    }

    #[test]
    fn test_inflate_stops_at_declared_size() {
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut bytes = ZipBuilder::new().deflated("big.bin", &content).finish();
        patch_declared_size(&mut bytes, 10);
        let archive = open(bytes);
        assert_eq!(archive.entries()[0].size, 10);

        let mut reader = archive.open(&archive.entries()[0]).unwrap();
        let mut head = Vec::new();
        let err = reader.read_to_end(&mut head).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(head, content[..10]);
    }

    #[test]
    fn test_lying_entry_gets_a_diagnostic() {
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut bytes = ZipBuilder::new().deflated("big.bin", &content).finish();
        patch_declared_size(&mut bytes, 10);

        let engine = crate::engine::Engine::new(crate::types::AnalyzerOptions {
            max_entry_size: 1000,
            ..crate::types::AnalyzerOptions::new()
        })
        .unwrap();
        let analysis = engine.analyze_bytes("lying.zip", bytes).unwrap();
        let entry = analysis
            .graph
            .nodes
            .iter()
            .find(|n| n.value(crate::vocab::Property::FileName) == Some("big.bin"))
            .unwrap();
        assert_eq!(entry.value(crate::vocab::Property::FileSize), Some("10"));
        assert!(entry.value(crate::vocab::Property::Diagnostic).is_some());
        assert!(entry.links(crate::vocab::Property::Content).is_empty());
    }

    #[test]
    fn test_dos_datetime() {
        let dt = dos_datetime((41 << 9) | (6 << 5) | 15, (12 << 11) | (30 << 5) | 5).unwrap();
        assert_eq!(dt.to_rfc3339(), "2021-06-15T12:30:10+00:00");
        assert!(dos_datetime(0, 0).is_none());
    }

    #[test]
    fn test_recognizer_rejects_missing_directory() {
        let cx = MatchContext::new(Arc::new(crate::types::AnalyzerOptions::new()));
        let input = Input::from_slice(b"PK\x03\x04 but nothing else follows here");
        assert!(matches!(
            ZipRecognizer.decode(&input, &cx).unwrap(),
            MatchOutcome::NoMatch
        ));
    }
}
