//! DOS MZ, NE (New Executable), and LE/LX (Linear Executable) recognizer.
//!
//! This recognizer handles legacy Microsoft/IBM executable formats:
//! - MZ: Original DOS executable format (16-bit real mode)
//! - NE: New Executable for 16-bit Windows and OS/2
//! - LE/LX: Linear Executable for OS/2 32-bit and VxD drivers
//!
//! PE images also start with `MZ` but are taken by the PE recognizer first.

use super::executable::{ExecutableHeader, ExecutableKind};
use super::{magic, read_u16};
use crate::entity::Entity;
use crate::error::{AnalysisError, Result};
use crate::format::{
    matched, EncodingDetector, FormatFlags, FormatRecognizer, MatchContext, MatchOutcome,
    Signature,
};
use crate::input::Input;
use crate::types::Endianness;

const FORMAT: &str = "mz";

/// NE header signature.
pub const NE_SIGNATURE: [u8; 2] = [b'N', b'E'];

/// LE header signature.
pub const LE_SIGNATURE: [u8; 2] = [b'L', b'E'];

/// LX header signature.
pub const LX_SIGNATURE: [u8; 2] = [b'L', b'X'];

/// MZ header size.
pub const MZ_HEADER_SIZE: usize = 64;

/// LE/LX CPU types.
#[allow(missing_docs)]
pub mod le_cpu {
    pub const I286: u16 = 1;
    pub const I386: u16 = 2;
    pub const I486: u16 = 3;
    pub const PENTIUM: u16 = 4;
    pub const I860: u16 = 0x20;
    pub const MIPS1: u16 = 0x40;
}

/// Detected extended executable type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedType {
    /// Pure DOS MZ executable
    Mz,
    /// NE (New Executable)
    Ne,
    /// LE (Linear Executable)
    Le {
        /// CPU type field.
        cpu: u16,
    },
    /// LX (Linear Executable Extended)
    Lx {
        /// CPU type field.
        cpu: u16,
    },
}

/// Detect MZ and extended types.
pub fn detect(input: &Input, header: &[u8]) -> Result<ExtendedType> {
    let lfanew = u64::from(super::read_u32(header, 0x3C, true)?);
    if lfanew < MZ_HEADER_SIZE as u64 || lfanew + 12 > input.len() {
        return Ok(ExtendedType::Mz);
    }
    let mut ext = [0u8; 12];
    input.read_exact_at(lfanew, &mut ext)?;
    let sig = [ext[0], ext[1]];
    let cpu = read_u16(&ext, 8, true)?;
    Ok(match sig {
        NE_SIGNATURE => ExtendedType::Ne,
        LE_SIGNATURE => ExtendedType::Le { cpu },
        LX_SIGNATURE => ExtendedType::Lx { cpu },
        _ => ExtendedType::Mz,
    })
}

fn le_cpu_name(cpu: u16) -> (&'static str, u8) {
    match cpu {
        le_cpu::I286 => ("Intel 80286", 16),
        le_cpu::I386 | le_cpu::I486 | le_cpu::PENTIUM => ("x86", 32),
        le_cpu::I860 => ("Intel 80860", 32),
        le_cpu::MIPS1 => ("MIPS", 32),
        _ => ("unknown", 32),
    }
}

/// Parse the DOS header and the extended header it points at.
pub fn parse(input: &Input) -> Result<ExecutableHeader> {
    let header = input.header(MZ_HEADER_SIZE)?;
    if header.len() < MZ_HEADER_SIZE {
        return Err(AnalysisError::TruncatedData {
            offset: 0,
            expected: MZ_HEADER_SIZE,
            actual: header.len(),
        });
    }

    let ip = read_u16(&header, 0x14, true)?;
    let cs = read_u16(&header, 0x16, true)?;
    let (format, architecture, bitwidth) = match detect(input, &header)? {
        ExtendedType::Mz => ("MZ", "x86 (real mode)", 16),
        ExtendedType::Ne => ("NE", "x86 (16-bit protected mode)", 16),
        ExtendedType::Le { cpu } => {
            let (name, bits) = le_cpu_name(cpu);
            ("LE", name, bits)
        }
        ExtendedType::Lx { cpu } => {
            let (name, bits) = le_cpu_name(cpu);
            ("LX", name, bits)
        }
    };
    let entry_point = (format == "MZ").then(|| u64::from(cs) * 16 + u64::from(ip));

    Ok(ExecutableHeader {
        format,
        kind: ExecutableKind::Executable,
        machine: 0,
        architecture: architecture.to_string(),
        bitwidth,
        endianness: Endianness::Little,
        entry_point,
        sections: None,
    })
}

/// Recognizer for DOS and pre-PE Windows/OS2 executables.
#[derive(Debug, Default, Clone, Copy)]
pub struct MzRecognizer;

impl FormatRecognizer for MzRecognizer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn header_length(&self) -> usize {
        MZ_HEADER_SIZE
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::prefix(&magic::MZ))
    }

    fn media_type(&self) -> Option<&'static str> {
        Some("application/x-dosexec")
    }

    fn extension(&self) -> Option<&'static str> {
        Some("exe")
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags::BINARY
    }

    fn check_header(&self, header: &[u8], _is_binary: bool, _detector: &EncodingDetector) -> bool {
        header.len() >= MZ_HEADER_SIZE
    }

    fn decode(&self, input: &Input, _cx: &MatchContext) -> Result<MatchOutcome> {
        matched(Entity::Custom(Box::new(parse(input)?)))
    }
}
