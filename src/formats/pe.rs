//! PE/COFF (Portable Executable) header recognizer.
//!
//! Shares the `MZ` signature with plain DOS executables. Decoding follows
//! `e_lfanew` and reports no match when there is no `PE\0\0` header there,
//! which hands the file to the MZ recognizer registered after this one.

use super::executable::{ExecutableHeader, ExecutableKind};
use super::{magic, read_u16, read_u32};
use crate::entity::Entity;
use crate::error::Result;
use crate::format::{
    matched, EncodingDetector, FormatFlags, FormatRecognizer, MatchContext, MatchOutcome,
    Signature,
};
use crate::input::Input;
use crate::types::Endianness;
use tracing::trace;

const FORMAT: &str = "pe";

/// Offset of `e_lfanew` in the DOS header.
pub const LFANEW_OFFSET: usize = 0x3C;
const COFF_HEADER_SIZE: usize = 20;
/// Largest `e_lfanew` that is followed.
const MAX_PE_OFFSET: u64 = 0x1000_0000;

/// PE machine type constants.
#[allow(missing_docs)]
pub mod machine {
    pub const UNKNOWN: u16 = 0x0000;
    pub const I386: u16 = 0x014C;
    pub const R4000: u16 = 0x0166;
    pub const ALPHA: u16 = 0x0184;
    pub const SH4: u16 = 0x01A6;
    pub const ARM: u16 = 0x01C0;
    pub const ARMNT: u16 = 0x01C4;
    pub const POWERPC: u16 = 0x01F0;
    pub const IA64: u16 = 0x0200;
    pub const EBC: u16 = 0x0EBC;
    pub const RISCV32: u16 = 0x5032;
    pub const RISCV64: u16 = 0x5064;
    pub const LOONGARCH64: u16 = 0x6264;
    pub const AMD64: u16 = 0x8664;
    pub const ARM64EC: u16 = 0xA641;
    pub const ARM64: u16 = 0xAA64;
}

/// COFF characteristics bits.
#[allow(missing_docs)]
pub mod characteristics {
    pub const EXECUTABLE_IMAGE: u16 = 0x0002;
    pub const DLL: u16 = 0x2000;
}

/// PE optional header magic values.
#[allow(missing_docs)]
pub mod optional_magic {
    pub const PE32: u16 = 0x10B;
    pub const PE32PLUS: u16 = 0x20B;
}

/// Get a human-readable description of a PE machine type.
pub fn machine_description(machine: u16) -> &'static str {
    match machine {
        machine::UNKNOWN => "any machine",
        machine::I386 => "Intel 386",
        machine::R4000 => "MIPS R4000",
        machine::ALPHA => "DEC Alpha",
        machine::SH4 => "Hitachi SH-4",
        machine::ARM => "ARM",
        machine::ARMNT => "ARM Thumb-2",
        machine::POWERPC => "PowerPC",
        machine::IA64 => "Intel IA-64",
        machine::EBC => "EFI Byte Code",
        machine::RISCV32 => "RISC-V 32-bit",
        machine::RISCV64 => "RISC-V 64-bit",
        machine::LOONGARCH64 => "LoongArch 64-bit",
        machine::AMD64 => "x86-64",
        machine::ARM64EC => "ARM64EC",
        machine::ARM64 => "AArch64",
        _ => "unknown",
    }
}

/// Location of the PE header, if the DOS header points at one.
pub fn pe_offset(input: &Input) -> Result<Option<u64>> {
    if input.len() < (LFANEW_OFFSET + 4) as u64 {
        return Ok(None);
    }
    let mut lfanew = [0u8; 4];
    input.read_exact_at(LFANEW_OFFSET as u64, &mut lfanew)?;
    let offset = u64::from(u32::from_le_bytes(lfanew));
    if offset < 0x40 || offset > MAX_PE_OFFSET || offset + 4 > input.len() {
        return Ok(None);
    }
    let mut signature = [0u8; 4];
    input.read_exact_at(offset, &mut signature)?;
    Ok((signature == magic::PE).then_some(offset))
}

/// Parse the COFF and optional headers that follow `PE\0\0`.
pub fn parse(input: &Input, pe_offset: u64) -> Result<ExecutableHeader> {
    let mut coff = [0u8; COFF_HEADER_SIZE];
    input.read_exact_at(pe_offset + 4, &mut coff)?;
    let machine = read_u16(&coff, 0, true)?;
    let sections = read_u16(&coff, 2, true)?;
    let optional_size = read_u16(&coff, 16, true)?;
    let flags = read_u16(&coff, 18, true)?;

    let mut bitwidth = 0;
    let mut entry_point = None;
    if optional_size >= 20 {
        let mut optional = [0u8; 20];
        input.read_exact_at(pe_offset + 4 + COFF_HEADER_SIZE as u64, &mut optional)?;
        bitwidth = match read_u16(&optional, 0, true)? {
            optional_magic::PE32 => 32,
            optional_magic::PE32PLUS => 64,
            _ => 0,
        };
        let entry = read_u32(&optional, 16, true)?;
        entry_point = (entry != 0).then_some(u64::from(entry));
    }

    let kind = if flags & characteristics::DLL != 0 {
        ExecutableKind::SharedLibrary
    } else if flags & characteristics::EXECUTABLE_IMAGE != 0 {
        ExecutableKind::Executable
    } else {
        ExecutableKind::Object
    };

    Ok(ExecutableHeader {
        format: "PE",
        kind,
        machine: u32::from(machine),
        architecture: machine_description(machine).to_string(),
        bitwidth,
        endianness: Endianness::Little,
        entry_point,
        sections: Some(u32::from(sections)),
    })
}

/// Recognizer for PE images.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeRecognizer;

impl FormatRecognizer for PeRecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        LFANEW_OFFSET + 4
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::prefix(&magic::MZ))
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/vnd.microsoft.portable-executable")
    }

    fn extension(&self) -> Option<&'static str> {
        Some("exe")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY
    }

    fn check_header(&self, header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        header.starts_with(&magic::MZ)
    }

    fn decode(&self, input: &Input, _cx: &MatchContext) -> Result<MatchOutcome> {
        let Some(offset) = pe_offset(input)? else {
            trace!("MZ header without PE signature");
            return Ok(MatchOutcome::NoMatch);
        };
        matched(Entity::Custom(Box::new(parse(input, offset)?)))
    }
}
