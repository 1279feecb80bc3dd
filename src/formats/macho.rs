//! Mach-O (Mach Object) recognizers.
//!
//! Thin images produce an executable header. Fat/universal binaries are
//! archives whose entries are the per-architecture slices, each of which is
//! matched again as a thin image.

use super::executable::{ExecutableHeader, ExecutableKind};
use super::{magic, read_u32};
use crate::entity::{ArchiveEntry, ArchiveFile, Entity};
use crate::error::{AnalysisError, Result};
use crate::format::{
    matched, Decoded, EncodingDetector, FormatFlags, FormatRecognizer, MatchContext,
    MatchOutcome, Signature,
};
use crate::identity::ReferenceKey;
use crate::input::{Input, StreamFactoryAccess};
use crate::types::Endianness;
use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;

const FORMAT: &str = "macho";
const FAT_FORMAT: &str = "macho-fat";

const FAT_ARCH_SIZE: usize = 20;
/// More slices than this means the `CAFEBABE` file is a Java class.
const MAX_FAT_ARCHS: u32 = 20;

/// Mach-O CPU type constants.
#[allow(missing_docs)]
pub mod cpu_type {
    pub const VAX: u32 = 1;
    pub const MC680X0: u32 = 6;
    pub const X86: u32 = 7;
    pub const X86_64: u32 = 0x0100_0007;
    pub const HPPA: u32 = 11;
    pub const ARM: u32 = 12;
    pub const ARM64: u32 = 0x0100_000C;
    pub const ARM64_32: u32 = 0x0200_000C;
    pub const SPARC: u32 = 14;
    pub const I860: u32 = 15;
    pub const POWERPC: u32 = 18;
    pub const POWERPC64: u32 = 0x0100_0012;
}

/// Mach-O ARM64 subtypes.
#[allow(missing_docs)]
pub mod arm64_subtype {
    /// ARM64E - ARMv8.3+ with PAC (Pointer Authentication)
    pub const E: u32 = 2;
}

/// Mach-O file types.
#[allow(missing_docs)]
pub mod file_type {
    pub const MH_OBJECT: u32 = 1;
    pub const MH_EXECUTE: u32 = 2;
    pub const MH_CORE: u32 = 4;
    pub const MH_DYLIB: u32 = 6;
    pub const MH_BUNDLE: u32 = 8;
}

/// Architecture name (as used by `lipo`) and address width of a CPU type.
pub fn cpu_name(cpu_type: u32, cpu_subtype: u32) -> (&'static str, u8) {
    match cpu_type {
        cpu_type::VAX => ("vax", 32),
        cpu_type::MC680X0 => ("m68k", 32),
        cpu_type::X86 => ("i386", 32),
        cpu_type::X86_64 => ("x86_64", 64),
        cpu_type::HPPA => ("hppa", 32),
        cpu_type::ARM => ("arm", 32),
        cpu_type::ARM64 if cpu_subtype & 0xFF == arm64_subtype::E => ("arm64e", 64),
        cpu_type::ARM64 => ("arm64", 64),
        cpu_type::ARM64_32 => ("arm64_32", 32),
        cpu_type::SPARC => ("sparc", 32),
        cpu_type::I860 => ("i860", 32),
        cpu_type::POWERPC => ("ppc", 32),
        cpu_type::POWERPC64 => ("ppc64", 64),
        _ => ("unknown", 32),
    }
}

/// Address width and byte order of a thin Mach-O magic.
fn thin_magic(header: &[u8]) -> Option<(u8, bool)> {
    let bytes: [u8; 4] = header.get(..4)?.try_into().ok()?;
    match bytes {
        magic::MACHO_32_BE => Some((32, true)),
        magic::MACHO_32_LE => Some((32, false)),
        magic::MACHO_64_BE => Some((64, true)),
        magic::MACHO_64_LE => Some((64, false)),
        _ => None,
    }
}

/// Parse a thin Mach-O header.
pub fn parse(data: &[u8]) -> Result<ExecutableHeader> {
    let (bits, big_endian) = thin_magic(data)
        .ok_or_else(|| AnalysisError::malformed(FORMAT, "not a thin Mach-O image"))?;
    let little_endian = !big_endian;
    let cpu_type = read_u32(data, 4, little_endian)?;
    let cpu_subtype = read_u32(data, 8, little_endian)?;
    let file_type = read_u32(data, 12, little_endian)?;
    let (architecture, cpu_bits) = cpu_name(cpu_type, cpu_subtype);

    let kind = match file_type {
        file_type::MH_OBJECT => ExecutableKind::Object,
        file_type::MH_EXECUTE => ExecutableKind::Executable,
        file_type::MH_CORE => ExecutableKind::Core,
        file_type::MH_DYLIB | file_type::MH_BUNDLE => ExecutableKind::SharedLibrary,
        _ => ExecutableKind::Unknown,
    };

    Ok(ExecutableHeader {
        format: "Mach-O",
        kind,
        machine: cpu_type,
        architecture: architecture.to_string(),
        bitwidth: bits.max(cpu_bits),
        endianness: if big_endian {
            Endianness::Big
        } else {
            Endianness::Little
        },
        entry_point: None,
        sections: None,
    })
}

/// Recognizer for thin Mach-O images.
#[derive(Debug, Default, Clone, Copy)]
pub struct MachORecognizer;

impl FormatRecognizer for MachORecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        16
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/x-mach-binary")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY
    }

    fn check_header(&self, header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        header.len() >= 16 && thin_magic(header).is_some()
    }

    fn decode(&self, input: &Input, _cx: &MatchContext) -> Result<MatchOutcome> {
        let data = input.header(16)?;
        matched(Entity::Custom(Box::new(parse(&data)?)))
    }
}

/// Recognizer for fat/universal binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct FatRecognizer;

impl FormatRecognizer for FatRecognizer {
    fn name(&self) -> &'static str {
        FAT_FORMAT
    }

    fn header_length(&self) -> usize {
        8
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::prefix(&magic::MACHO_FAT))
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/x-mach-binary")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY | FormatFlags::CONTAINER
    }

    fn check_header(&self, header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        read_u32(header, 4, false).map_or(false, |n| n > 0 && n <= MAX_FAT_ARCHS)
    }

    fn decode(&self, input: &Input, cx: &MatchContext) -> Result<MatchOutcome> {
        let input = input.clone();
        let reference = cx.nested_reference(FAT_FORMAT);
        let decoded = Decoded::deferred(move || {
            let archive = FatArchive::read(input, reference)?;
            Ok(Entity::Archive(Arc::new(archive)))
        });
        Ok(MatchOutcome::Matched(decoded))
    }
}

/// Slices of a fat binary.
pub struct FatArchive {
    input: Input,
    reference: ReferenceKey,
    entries: Vec<ArchiveEntry>,
    offsets: Vec<u64>,
}

impl FatArchive {
    /// Read the fat header and its architecture table.
    pub fn read(input: Input, reference: ReferenceKey) -> Result<Self> {
        let mut head = [0u8; 8];
        input.read_exact_at(0, &mut head)?;
        let count = read_u32(&head, 4, false)?;
        if count > MAX_FAT_ARCHS {
            return Err(AnalysisError::malformed(FAT_FORMAT, "too many architectures"));
        }
        let count = count as usize;
        let mut table = vec![0u8; count * FAT_ARCH_SIZE];
        input.read_exact_at(8, &mut table)?;

        let mut entries = Vec::with_capacity(count);
        let mut offsets = Vec::with_capacity(count);
        let mut names = HashSet::new();
        for i in 0..count {
            let base = i * FAT_ARCH_SIZE;
            let cpu_type = read_u32(&table, base, false)?;
            let cpu_subtype = read_u32(&table, base + 4, false)?;
            let offset = u64::from(read_u32(&table, base + 8, false)?);
            let size = u64::from(read_u32(&table, base + 12, false)?);
            if offset + size > input.len() {
                return Err(AnalysisError::malformed(
                    FAT_FORMAT,
                    format!("slice {} extends past the file", i),
                ));
            }

            let (name, _) = cpu_name(cpu_type, cpu_subtype);
            let mut path = name.to_string();
            if !names.insert(path.clone()) {
                path = format!("{}.{}", name, i);
                names.insert(path.clone());
            }
            entries.push(ArchiveEntry {
                path,
                size,
                compressed_size: None,
                modified: None,
                is_dir: false,
                encrypted: false,
                index: i,
            });
            offsets.push(offset);
        }

        Ok(Self {
            input,
            reference,
            entries,
            offsets,
        })
    }

    fn window(&self, entry: &ArchiveEntry) -> Result<Input> {
        let offset = self
            .offsets
            .get(entry.index)
            .copied()
            .ok_or_else(|| AnalysisError::malformed(FAT_FORMAT, "entry does not belong to archive"))?;
        self.input.window(offset, entry.size)
    }
}

impl ArchiveFile for FatArchive {
    fn format(&self) -> &'static str {
        FAT_FORMAT
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
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_thin(cpu: u32, file_type: u32) -> Vec<u8> {
        let mut data = vec![0u8; 32];
        data[0..4].copy_from_slice(&magic::MACHO_64_LE);
        data[4..8].copy_from_slice(&cpu.to_le_bytes());
        data[12..16].copy_from_slice(&file_type.to_le_bytes());
        data
    }

    fn make_fat(slices: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut data = magic::MACHO_FAT.to_vec();
        data.extend_from_slice(&(slices.len() as u32).to_be_bytes());
        let mut offset = 8 + slices.len() * FAT_ARCH_SIZE;
        let mut body = Vec::new();
        for (cpu, slice) in slices {
            data.extend_from_slice(&cpu.to_be_bytes());
            data.extend_from_slice(&0u32.to_be_bytes());
            data.extend_from_slice(&(offset as u32).to_be_bytes());
            data.extend_from_slice(&(slice.len() as u32).to_be_bytes());
            data.extend_from_slice(&0u32.to_be_bytes());
            body.extend_from_slice(slice);
            offset += slice.len();
        }
        data.extend(body);
        data
    }

    #[test]
    fn test_parse_thin() {
        let header = parse(&make_thin(cpu_type::ARM64, file_type::MH_EXECUTE)).unwrap();
        assert_eq!(header.summary(), "Mach-O 64-bit executable, arm64");
        assert_eq!(header.endianness, Endianness::Little);
    }

    #[test]
    fn test_fat_slices() {
        let fat = make_fat(&[
            (cpu_type::X86_64, make_thin(cpu_type::X86_64, file_type::MH_DYLIB)),
            (cpu_type::ARM64, make_thin(cpu_type::ARM64, file_type::MH_DYLIB)),
            (cpu_type::ARM64, make_thin(cpu_type::ARM64, file_type::MH_DYLIB)),
        ]);
        let archive = FatArchive::read(Input::from_vec(fat), ReferenceKey::anonymous()).unwrap();
        let names: Vec<&str> = archive.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(names, vec!["x86_64", "arm64", "arm64.2"]);

        let slice = archive.open_input(&archive.entries()[1]).unwrap().unwrap();
        let header = parse(&slice.to_vec().unwrap()).unwrap();
        assert_eq!(header.architecture, "arm64");
        assert_eq!(header.kind, ExecutableKind::SharedLibrary);
    }

    #[test]
    fn test_java_class_is_not_fat() {
        // CAFEBABE, minor 0, major 52
        let class = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        assert!(!FatRecognizer.check_header(&class, true, &EncodingDetector::default()));
        let fat = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x02];
        assert!(FatRecognizer.check_header(&fat, true, &EncodingDetector::default()));
    }
}
