//! ELF (Executable and Linkable Format) header recognizer.

use super::executable::{ExecutableHeader, ExecutableKind};
use super::{magic, read_u16, read_u32, read_u64};
use crate::entity::Entity;
use crate::error::{AnalysisError, Result};
use crate::format::{
    matched, EncodingDetector, FormatFlags, FormatRecognizer, MatchContext, MatchOutcome,
    Signature,
};
use crate::input::Input;
use crate::types::Endianness;

const FORMAT: &str = "elf";

/// ELF class values (32-bit vs 64-bit)
#[allow(missing_docs)]
pub mod class {
    pub const ELFCLASS32: u8 = 1;
    pub const ELFCLASS64: u8 = 2;
}

/// ELF data encoding (endianness)
#[allow(missing_docs)]
pub mod data {
    pub const ELFDATA2LSB: u8 = 1; // Little-endian
    pub const ELFDATA2MSB: u8 = 2; // Big-endian
}

/// e_type values
#[allow(missing_docs)]
pub mod file_type {
    pub const ET_REL: u16 = 1;
    pub const ET_EXEC: u16 = 2;
    pub const ET_DYN: u16 = 3;
    pub const ET_CORE: u16 = 4;
}

/// Size of the 64-bit file header; the 32-bit one is shorter.
pub const HEADER_SIZE: usize = 64;
const HEADER_SIZE_32: usize = 52;

/// Architecture name and address width for an e_machine value.
pub fn machine_name(e_machine: u16, ei_class: u8) -> (&'static str, u8) {
    let is_64 = ei_class == class::ELFCLASS64;
    let native = if is_64 { 64 } else { 32 };

    match e_machine {
        0x02 => ("SPARC", 32),
        0x03 => ("x86", 32),
        0x04 => ("Motorola 68000", 32),
        0x06 => ("Intel MCU", 32),
        0x07 => ("Intel 80860", 32),
        0x08 | 0x0A => (if is_64 { "MIPS64" } else { "MIPS" }, native),
        0x0F => ("PA-RISC", native),
        0x12 => ("SPARC V8+", 32),
        0x14 => ("PowerPC", 32),
        0x15 => ("PowerPC64", 64),
        0x16 => (if is_64 { "IBM z/Architecture" } else { "IBM S/390" }, native),
        0x28 => ("ARM", 32),
        0x29 => ("Alpha", 64),
        0x2A => ("SuperH", 32),
        0x2B => ("SPARC V9", 64),
        0x32 => ("IA-64", 64),
        0x3E => ("x86-64", 64),
        0x53 => ("AVR", 8),
        0x5C => ("OpenRISC", 32),
        0x5E => ("Xtensa", 32),
        0x69 => ("MSP430", 16),
        0x71 => ("Nios II", 32),
        0xA4 => ("Hexagon", 32),
        0xB7 => ("AArch64", 64),
        0xBA => ("MicroBlaze", 32),
        0xF3 => (if is_64 { "RISC-V 64" } else { "RISC-V 32" }, native),
        0xF7 => ("eBPF", 64),
        0x102 => (if is_64 { "LoongArch64" } else { "LoongArch32" }, native),
        _ => ("unknown", native),
    }
}

fn kind_of(e_type: u16) -> ExecutableKind {
    match e_type {
        file_type::ET_REL => ExecutableKind::Object,
        file_type::ET_EXEC => ExecutableKind::Executable,
        file_type::ET_DYN => ExecutableKind::SharedLibrary,
        file_type::ET_CORE => ExecutableKind::Core,
        _ => ExecutableKind::Unknown,
    }
}

/// Parse an ELF file header.
pub fn parse(data: &[u8]) -> Result<ExecutableHeader> {
    let ei_class = *data.get(4).unwrap_or(&0);
    let ei_data = *data.get(5).unwrap_or(&0);
    let is_64 = match ei_class {
        class::ELFCLASS32 => false,
        class::ELFCLASS64 => true,
        other => {
            return Err(AnalysisError::malformed(FORMAT, format!("invalid class {}", other)));
        }
    };
    let little_endian = match ei_data {
        data::ELFDATA2LSB => true,
        data::ELFDATA2MSB => false,
        other => {
            return Err(AnalysisError::malformed(FORMAT, format!("invalid data encoding {}", other)));
        }
    };
    let needed = if is_64 { HEADER_SIZE } else { HEADER_SIZE_32 };
    if data.len() < needed {
        return Err(AnalysisError::TruncatedData {
            offset: 0,
            expected: needed,
            actual: data.len(),
        });
    }

    let e_type = read_u16(data, 0x10, little_endian)?;
    let e_machine = read_u16(data, 0x12, little_endian)?;
    let (entry_point, e_shnum) = if is_64 {
        (read_u64(data, 0x18, little_endian)?, read_u16(data, 0x3C, little_endian)?)
    } else {
        (
            u64::from(read_u32(data, 0x18, little_endian)?),
            read_u16(data, 0x30, little_endian)?,
        )
    };
    let (architecture, bitwidth) = machine_name(e_machine, ei_class);

    Ok(ExecutableHeader {
        format: "ELF",
        kind: kind_of(e_type),
        machine: u32::from(e_machine),
        architecture: architecture.to_string(),
        bitwidth,
        endianness: if little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        },
        entry_point: (entry_point != 0).then_some(entry_point),
        sections: Some(u32::from(e_shnum)),
    })
}

/// Recognizer for ELF images.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfRecognizer;

impl FormatRecognizer for ElfRecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        HEADER_SIZE
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::prefix(&magic::ELF))
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/x-elf")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY
    }

    fn check_header(&self, header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        header.len() >= HEADER_SIZE_32
            && matches!(header[4], class::ELFCLASS32 | class::ELFCLASS64)
            && matches!(header[5], data::ELFDATA2LSB | data::ELFDATA2MSB)
            && header[6] == 1
    }

    fn decode(&self, input: &Input, _cx: &MatchContext) -> Result<MatchOutcome> {
        let data = input.header(HEADER_SIZE)?;
        matched(Entity::Custom(Box::new(parse(&data)?)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_elf_header(e_machine: u16, class: u8, endian: u8) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0..4].copy_from_slice(&magic::ELF);
        data[4] = class;
        data[5] = endian;
        data[6] = 1; // EV_CURRENT

        let put16 = |buf: &mut [u8], off: usize, v: u16| {
            let bytes = if endian == data::ELFDATA2LSB {
                v.to_le_bytes()
            } else {
                v.to_be_bytes()
            };
            buf[off..off + 2].copy_from_slice(&bytes);
        };
        put16(data.as_mut_slice(), 0x10, file_type::ET_DYN);
        put16(data.as_mut_slice(), 0x12, e_machine);
        if endian == data::ELFDATA2LSB {
            data[0x18..0x1C].copy_from_slice(&0x1040u32.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_parse_x86_64_elf() {
        let header = parse(&make_elf_header(0x3E, 2, 1)).unwrap();
        assert_eq!(header.architecture, "x86-64");
        assert_eq!(header.bitwidth, 64);
        assert_eq!(header.endianness, Endianness::Little);
        assert_eq!(header.kind, ExecutableKind::SharedLibrary);
        assert_eq!(header.entry_point, Some(0x1040));
        assert_eq!(header.summary(), "ELF 64-bit shared library, x86-64");
    }

    #[test]
    fn test_parse_big_endian_mips() {
        let header = parse(&make_elf_header(0x08, 1, 2)).unwrap();
        assert_eq!(header.architecture, "MIPS");
        assert_eq!(header.bitwidth, 32);
        assert_eq!(header.endianness, Endianness::Big);
        assert_eq!(header.entry_point, None);
    }

    #[test]
    fn test_rejects_bad_class() {
        let mut data = make_elf_header(0x3E, 2, 1);
        data[4] = 7;
        assert!(parse(&data).is_err());
        assert!(!ElfRecognizer.check_header(&data, true, &EncodingDetector::default()));
    }

    #[test]
    fn test_machine_names() {
        assert_eq!(machine_name(0x03, 1).0, "x86");
        assert_eq!(machine_name(0x28, 1).0, "ARM");
        assert_eq!(machine_name(0xB7, 2).0, "AArch64");
        assert_eq!(machine_name(0xF3, 2), ("RISC-V 64", 64));
        assert_eq!(machine_name(0x16, 2).0, "IBM z/Architecture");
        assert_eq!(machine_name(0xFFFF, 1), ("unknown", 32));
    }
}
