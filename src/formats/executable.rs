//! Executable header entity.
//!
//! The ELF, PE, MZ, and Mach-O recognizers decode only the fixed header of
//! an image. The result is a plugin-style [`CustomEntity`] so that it flows
//! through the open end of dispatch rather than a dedicated variant.

use crate::entity::CustomEntity;
use crate::types::Endianness;
use serde::Serialize;
use std::any::Any;
use std::fmt;

/// Dispatch kind of [`ExecutableHeader`].
pub const KIND: &str = "executable";

/// Role of an executable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutableKind {
    /// Directly runnable program.
    Executable,
    /// Library loaded at run time.
    SharedLibrary,
    /// Relocatable object.
    Object,
    /// Process dump.
    Core,
    /// The header does not say.
    Unknown,
}

impl fmt::Display for ExecutableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutableKind::Executable => "executable",
            ExecutableKind::SharedLibrary => "shared library",
            ExecutableKind::Object => "object file",
            ExecutableKind::Core => "core dump",
            ExecutableKind::Unknown => "image",
        };
        f.write_str(name)
    }
}

/// Fixed-header facts of an executable image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableHeader {
    /// Container format ("ELF", "PE", ...).
    pub format: &'static str,
    /// Role of the image.
    pub kind: ExecutableKind,
    /// Raw machine field of the header.
    pub machine: u32,
    /// Human-readable architecture name.
    pub architecture: String,
    /// Address width; 0 when the header does not say.
    pub bitwidth: u8,
    /// Byte order of the header.
    pub endianness: Endianness,
    /// Entry point address, when present.
    pub entry_point: Option<u64>,
    /// Section or segment count, when the header carries one.
    pub sections: Option<u32>,
}

impl ExecutableHeader {
    /// One-line description, e.g. `ELF 64-bit executable, x86-64`.
    pub fn summary(&self) -> String {
        if self.bitwidth > 0 {
            format!(
                "{} {}-bit {}, {}",
                self.format, self.bitwidth, self.kind, self.architecture
            )
        } else {
            format!("{} {}, {}", self.format, self.kind, self.architecture)
        }
    }
}

impl CustomEntity for ExecutableHeader {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_without_bitwidth() {
        let header = ExecutableHeader {
            format: "MZ",
            kind: ExecutableKind::Executable,
            machine: 0,
            architecture: "x86 (real mode)".to_string(),
            bitwidth: 0,
            endianness: Endianness::Little,
            entry_point: None,
            sections: None,
        };
        assert_eq!(header.summary(), "MZ executable, x86 (real mode)");
    }
}
