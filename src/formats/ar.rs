//! ar archive adapter.
//!
//! ar archives are used for Unix static libraries (.a files). Both the
//! GNU/SysV and the BSD naming schemes are understood; symbol tables are
//! skipped. Members are stored uncompressed, so each one is a window of the
//! archive's store.

use super::{field_number, field_str, magic};
use crate::entity::{ArchiveEntry, ArchiveFile, Entity};
use crate::error::{AnalysisError, Result};
use crate::format::{Decoded, FormatFlags, FormatRecognizer, MatchContext, MatchOutcome, Signature};
use crate::identity::ReferenceKey;
use crate::input::{Input, StreamFactoryAccess};
use chrono::{TimeZone, Utc};
use std::io::Read;
use std::sync::Arc;
use tracing::trace;

const FORMAT: &str = "ar";

/// ar member header size
pub const MEMBER_HEADER_SIZE: usize = 60;

/// ar member header field ranges
#[allow(missing_docs)]
pub mod member_header {
    use std::ops::Range;

    pub const NAME: Range<usize> = 0..16;
    pub const DATE: Range<usize> = 16..28;
    pub const SIZE: Range<usize> = 48..58;
    pub const FMAG: Range<usize> = 58..60;
    pub const FMAG_BYTES: [u8; 2] = [b'`', b'\n'];
}

/// ar naming scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArVariant {
    /// GNU/SysV: `name/`, `/offset` into a `//` table
    Gnu,
    /// BSD: `#1/len` with the name in front of the data
    Bsd,
}

/// Recognizer for ar archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArRecognizer;

impl FormatRecognizer for ArRecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        magic::AR.len()
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::prefix(&magic::AR))
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/x-archive")
    }

    fn extension(&self) -> Option<&'static str> {
        Some("a")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY | FormatFlags::CONTAINER
    }

    fn decode(&self, input: &Input, cx: &MatchContext) -> Result<MatchOutcome> {
        let input = input.clone();
        let reference = cx.nested_reference(FORMAT);
        let decoded = Decoded::deferred(move || {
            let archive = ArArchive::read(input, reference)?;
            Ok(Entity::Archive(Arc::new(archive)))
        });
        Ok(MatchOutcome::Matched(decoded))
    }
}

/// Parsed ar archive.
pub struct ArArchive {
    input: Input,
    reference: ReferenceKey,
    variant: ArVariant,
    entries: Vec<ArchiveEntry>,
    /// Data offset of each entry.
    offsets: Vec<u64>,
}

impl ArArchive {
    /// Walk the member headers of `input`.
    pub fn read(input: Input, reference: ReferenceKey) -> Result<Self> {
        let mut entries = Vec::new();
        let mut offsets = Vec::new();
        let mut name_table: Vec<u8> = Vec::new();
        let mut variant = ArVariant::Gnu;
        let mut pos = magic::AR.len() as u64;
        let len = input.len();

        while pos + MEMBER_HEADER_SIZE as u64 <= len {
            let mut header = [0u8; MEMBER_HEADER_SIZE];
            input.read_exact_at(pos, &mut header)?;
            if header[member_header::FMAG] != member_header::FMAG_BYTES {
                return Err(AnalysisError::malformed(
                    FORMAT,
                    format!("bad member header at offset {}", pos),
                ));
            }

            let raw_name = String::from_utf8_lossy(&header[member_header::NAME]);
            let raw_name = raw_name.trim_end();
            let size = field_number(&header[member_header::SIZE], 10)
                .ok_or_else(|| AnalysisError::malformed(FORMAT, "invalid member size"))?;
            let mut data = pos + MEMBER_HEADER_SIZE as u64;
            let mut data_size = size;
            if data + size > len {
                return Err(AnalysisError::malformed(FORMAT, "member extends past the archive"));
            }

            let name = match raw_name {
                "/" | "/SYM64/" | "__.SYMDEF" | "__.SYMDEF SORTED" => None,
                "//" => {
                    name_table = vec![0u8; size as usize];
                    input.read_exact_at(data, &mut name_table)?;
                    None
                }
                bsd if bsd.starts_with("#1/") => {
                    variant = ArVariant::Bsd;
                    let name_len = bsd[3..]
                        .parse::<u64>()
                        .ok()
                        .filter(|&n| n <= size)
                        .ok_or_else(|| AnalysisError::malformed(FORMAT, "invalid BSD name length"))?;
                    let mut name = vec![0u8; name_len as usize];
                    input.read_exact_at(data, &mut name)?;
                    data += name_len;
                    data_size -= name_len;
                    let name = field_str(&name);
                    (!name.starts_with("__.SYMDEF")).then_some(name)
                }
                gnu if gnu.starts_with('/') => {
                    let offset: usize = gnu[1..]
                        .parse()
                        .map_err(|_| AnalysisError::malformed(FORMAT, "invalid name table offset"))?;
                    Some(long_name(&name_table, offset)?)
                }
                short => Some(short.trim_end_matches('/').to_string()),
            };

            if let Some(name) = name {
                let modified = field_number(&header[member_header::DATE], 10)
                    .and_then(|secs| i64::try_from(secs).ok())
                    .filter(|&secs| secs > 0)
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
                entries.push(ArchiveEntry {
                    path: name,
                    size: data_size,
                    compressed_size: None,
                    modified,
                    is_dir: false,
                    encrypted: false,
                    index: entries.len(),
                });
                offsets.push(data);
            } else {
                trace!(member = raw_name, "skipping ar table member");
            }

            // members are aligned to an even boundary
            pos += MEMBER_HEADER_SIZE as u64 + size + (size % 2);
        }

        Ok(Self {
            input,
            reference,
            variant,
            entries,
            offsets,
        })
    }

    /// Naming scheme seen in the archive.
    pub fn variant(&self) -> ArVariant {
        self.variant
    }

    fn window(&self, entry: &ArchiveEntry) -> Result<Input> {
        let offset = self
            .offsets
            .get(entry.index)
            .copied()
            .ok_or_else(|| AnalysisError::malformed(FORMAT, "entry does not belong to archive"))?;
        self.input.window(offset, entry.size)
    }
}

fn long_name(table: &[u8], offset: usize) -> Result<String> {
    let rest = table
        .get(offset..)
        .ok_or_else(|| AnalysisError::malformed(FORMAT, "name table offset out of range"))?;
    let end = memchr::memchr(b'\n', rest).unwrap_or(rest.len());
    Ok(String::from_utf8_lossy(&rest[..end])
        .trim_end_matches('/')
        .to_string())
}

impl ArchiveFile for ArArchive {
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
        Ok(Box::new(self.window(entry)?.reader()))
    }

    fn open_input(&self, entry: &ArchiveEntry) -> Result<Option<Input>> {
        self.window(entry).map(Some)
    }

    fn access(&self) -> StreamFactoryAccess {
        self.input.access()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, content: &[u8]) -> Vec<u8> {
        let mut header = [b' '; MEMBER_HEADER_SIZE];
        header[..name.len()].copy_from_slice(name.as_bytes());
        header[member_header::DATE.start..member_header::DATE.start + 10]
            .copy_from_slice(b"1600000000");
        let size = content.len().to_string();
        header[member_header::SIZE.start..member_header::SIZE.start + size.len()]
            .copy_from_slice(size.as_bytes());
        header[member_header::FMAG].copy_from_slice(&member_header::FMAG_BYTES);
        let mut out = header.to_vec();
        out.extend_from_slice(content);
        if content.len() % 2 == 1 {
            out.push(b'\n');
        }
        out
    }

    fn archive(members: &[Vec<u8>]) -> ArArchive {
        let mut data = magic::AR.to_vec();
        for m in members {
            data.extend_from_slice(m);
        }
        ArArchive::read(Input::from_vec(data), ReferenceKey::anonymous()).unwrap()
    }

    #[test]
    fn test_gnu_archive() {
        let long = "a_rather_long_object_name.o";
        let ar = archive(&[
            member("/", &[0, 0, 0, 0]),
            member("//", format!("{}/\n", long).as_bytes()),
            member("test.o/", b"abc"),
            member("/0", b"long"),
        ]);
        assert_eq!(ar.variant(), ArVariant::Gnu);
        let names: Vec<&str> = ar.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(names, vec!["test.o", long]);
        assert_eq!(ar.entries()[0].modified.unwrap().timestamp(), 1_600_000_000);

        let mut content = String::new();
        ar.open(&ar.entries()[1])
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "long");
    }

    #[test]
    fn test_bsd_archive() {
        let ar = archive(&[
            member("#1/20", b"__.SYMDEF SORTED\0\0\0\0"),
            member("#1/12", b"module.o\0\0\0\0data"),
        ]);
        assert_eq!(ar.variant(), ArVariant::Bsd);
        assert_eq!(ar.entries().len(), 1);
        let entry = &ar.entries()[0];
        assert_eq!(entry.path, "module.o");
        assert_eq!(entry.size, 4);
        let input = ar.open_input(entry).unwrap().unwrap();
        assert_eq!(input.to_vec().unwrap(), b"data");
    }

    #[test]
    fn test_bad_member_header() {
        let mut data = magic::AR.to_vec();
        data.extend_from_slice(&[b'x'; MEMBER_HEADER_SIZE]);
        assert!(ArArchive::read(Input::from_vec(data), ReferenceKey::anonymous()).is_err());
    }
}
