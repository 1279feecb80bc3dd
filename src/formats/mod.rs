//! Built-in format recognizers.
//!
//! This module provides recognizers for common container and executable
//! formats:
//! - ZIP, tar, ar (archives)
//! - gzip, zstd (compressed streams)
//! - ELF, PE, MZ, Mach-O (executable headers)
//! - Plain text (last resort)
//!
//! Registration order is precedence. Archives come first because their
//! signatures are the most specific; PE precedes MZ so that an MZ stub with
//! a valid PE header is reported as PE; text goes last because it accepts
//! almost anything printable.

pub mod ar;
pub mod elf;
pub mod executable;
pub mod gzip;
pub mod macho;
pub mod mz;
pub mod pe;
pub mod tar;
pub mod text;
pub mod zip;
#[cfg(feature = "zstd")]
pub mod zstd;

use crate::context::CancellationToken;
use crate::error::{AnalysisError, Result};
use crate::format::{FormatRecognizer, FormatRegistry, MatchContext};
use crate::hierarchy::{FileKind, FileNode};
use crate::identity::{DataKey, EntityKey, ReferenceKey};
use crate::input::Input;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::Read;
use std::sync::Arc;

/// Magic byte signatures for format detection.
pub mod magic {
    /// ELF magic bytes: 0x7F 'E' 'L' 'F'
    pub const ELF: [u8; 4] = [0x7F, b'E', b'L', b'F'];

    /// DOS stub magic: 'M' 'Z'
    pub const MZ: [u8; 2] = [b'M', b'Z'];

    /// PE signature: 'P' 'E' '\0' '\0'
    pub const PE: [u8; 4] = [b'P', b'E', 0, 0];

    /// Mach-O 32-bit big-endian
    pub const MACHO_32_BE: [u8; 4] = [0xFE, 0xED, 0xFA, 0xCE];

    /// Mach-O 32-bit little-endian
    pub const MACHO_32_LE: [u8; 4] = [0xCE, 0xFA, 0xED, 0xFE];

    /// Mach-O 64-bit big-endian
    pub const MACHO_64_BE: [u8; 4] = [0xFE, 0xED, 0xFA, 0xCF];

    /// Mach-O 64-bit little-endian
    pub const MACHO_64_LE: [u8; 4] = [0xCF, 0xFA, 0xED, 0xFE];

    /// Mach-O fat/universal (always big-endian on disk)
    pub const MACHO_FAT: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// ar archive: "!<arch>\n"
    pub const AR: [u8; 8] = *b"!<arch>\n";

    /// ZIP local file header: "PK\x03\x04"
    pub const ZIP_LOCAL: [u8; 4] = [b'P', b'K', 3, 4];

    /// ZIP end of central directory: "PK\x05\x06"
    pub const ZIP_EOCD: [u8; 4] = [b'P', b'K', 5, 6];

    /// gzip member header
    pub const GZIP: [u8; 2] = [0x1F, 0x8B];

    /// zstd frame
    pub const ZSTD: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

    /// POSIX ustar magic at offset 257 (GNU tar uses "ustar  \0")
    pub const USTAR: [u8; 5] = *b"ustar";
}

/// Built-in recognizers in precedence order.
pub fn builtin_recognizers() -> Vec<Arc<dyn FormatRecognizer>> {
    let mut recognizers: Vec<Arc<dyn FormatRecognizer>> = vec![
        Arc::new(zip::ZipRecognizer),
        Arc::new(tar::TarRecognizer),
        Arc::new(gzip::GzipRecognizer),
    ];
    #[cfg(feature = "zstd")]
    recognizers.push(Arc::new(zstd::ZstdRecognizer));
    recognizers.extend([
        Arc::new(ar::ArRecognizer) as Arc<dyn FormatRecognizer>,
        Arc::new(macho::FatRecognizer),
        Arc::new(elf::ElfRecognizer),
        Arc::new(pe::PeRecognizer),
        Arc::new(mz::MzRecognizer),
        Arc::new(macho::MachORecognizer),
        Arc::new(text::TextRecognizer),
    ]);
    recognizers
}

/// Registry holding every built-in recognizer.
pub fn default_registry() -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    for recognizer in builtin_recognizers() {
        registry.register(recognizer);
    }
    registry
}

/// Read bytes with bounds checking.
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(AnalysisError::TruncatedData {
            offset: offset as u64,
            expected: len,
            actual: data.len().saturating_sub(offset),
        }),
    }
}

/// Read a u16 with specified endianness.
pub fn read_u16(data: &[u8], offset: usize, little_endian: bool) -> Result<u16> {
    let bytes = read_bytes(data, offset, 2)?;
    Ok(if little_endian {
        LittleEndian::read_u16(bytes)
    } else {
        BigEndian::read_u16(bytes)
    })
}

/// Read a u32 with specified endianness.
pub fn read_u32(data: &[u8], offset: usize, little_endian: bool) -> Result<u32> {
    let bytes = read_bytes(data, offset, 4)?;
    Ok(if little_endian {
        LittleEndian::read_u32(bytes)
    } else {
        BigEndian::read_u32(bytes)
    })
}

/// Read a u64 with specified endianness.
pub fn read_u64(data: &[u8], offset: usize, little_endian: bool) -> Result<u64> {
    let bytes = read_bytes(data, offset, 8)?;
    Ok(if little_endian {
        LittleEndian::read_u64(bytes)
    } else {
        BigEndian::read_u64(bytes)
    })
}

/// Limits for materializing a decompressed stream.
#[derive(Debug, Clone)]
pub(crate) struct PayloadLimits {
    memory_limit: usize,
    max_size: u64,
    cancel: CancellationToken,
}

impl PayloadLimits {
    pub(crate) fn from_context(cx: &MatchContext) -> Self {
        Self {
            memory_limit: cx.options().spool_memory_limit,
            max_size: cx.options().max_entry_size,
            cancel: cx.cancel().clone(),
        }
    }
}

/// Name of a compressed file's payload: the parent name with the first
/// matching suffix replaced.
pub(crate) fn payload_name(parent: Option<&str>, suffixes: &[(&str, &str)]) -> String {
    let Some(parent) = parent else {
        return "payload".to_string();
    };
    let lower = parent.to_ascii_lowercase();
    for (suffix, replacement) in suffixes {
        if lower.len() > suffix.len() && lower.ends_with(suffix) {
            return format!("{}{}", &parent[..parent.len() - suffix.len()], replacement);
        }
    }
    parent.to_string()
}

/// Decompress `stream` into an embedded file node.
///
/// Reading stops one byte past the size limit so that the file analyzer
/// reports the payload as too large instead of spooling it all.
pub(crate) fn decompressed_payload(
    name: String,
    reference: ReferenceKey,
    mut stream: impl Read,
    limits: &PayloadLimits,
) -> Result<FileNode> {
    let mut bounded = (&mut stream).take(limits.max_size.saturating_add(1));
    let input = Input::spool(&mut bounded, limits.memory_limit, &limits.cancel)?;
    let key = EntityKey::new(reference, DataKey::Stream("payload".to_string()));
    let mut node = FileNode::from_input(name, key, input);
    node.kind = FileKind::Embedded;
    Ok(node)
}

/// Decode a fixed-width, NUL- or space-padded ASCII field.
pub(crate) fn field_str(bytes: &[u8]) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

/// Parse a fixed-width number field in the given radix.
pub(crate) fn field_number(bytes: &[u8], radix: u32) -> Option<u64> {
    let text = field_str(bytes);
    let text = text.trim();
    if text.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(text, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_u32(&data, 0, true).unwrap(), 0x04030201);
        assert_eq!(read_u32(&data, 0, false).unwrap(), 0x01020304);
        assert!(read_u32(&data, 1, true).is_err());
        assert!(read_u32(&data, usize::MAX, true).is_err());
    }

    #[test]
    fn test_fields() {
        assert_eq!(field_str(b"hello\0\0\0"), "hello");
        assert_eq!(field_number(b"0000644\0", 8), Some(0o644));
        assert_eq!(field_number(b"   ", 10), Some(0));
        assert_eq!(field_number(b"12x", 10), None);
    }

    #[test]
    fn test_payload_name() {
        let gz = [(".tgz", ".tar"), (".gz", "")];
        assert_eq!(payload_name(Some("a.tar.gz"), &gz), "a.tar");
        assert_eq!(payload_name(Some("B.TGZ"), &gz), "B.tar");
        assert_eq!(payload_name(Some("plain"), &gz), "plain");
        assert_eq!(payload_name(Some(".gz"), &gz), ".gz");
        assert_eq!(payload_name(None, &gz), "payload");
    }

    #[test]
    fn test_precedence_order() {
        let registry = default_registry();
        let names = registry.names();
        let pos = |name: &str| names.iter().position(|n| *n == name).unwrap();
        assert!(pos("pe") < pos("mz"));
        assert_eq!(names.last().copied(), Some("text"));
        assert!(pos("zip") < pos("elf"));
    }
}
