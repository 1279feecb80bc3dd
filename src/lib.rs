//! formscope - Recursive Content Analysis
//!
//! This library identifies what a file, directory, or byte buffer contains,
//! opens every container it recognizes, and describes the whole tree as a
//! graph of linked nodes.
//!
//! # Features
//!
//! - **Format Detection**: An ordered registry of recognizers with cheap header checks and lazy decoding
//! - **Recursive Descent**: Archives, compressed streams, and directories are walked to any configured depth
//! - **Typed Dispatch**: Each decoded value is described by the most specific registered analyzer
//! - **Container Hooks**: Pluggable analyzers wrap descent into a hierarchy (e.g. package description files)
//! - **Identity**: Nodes for the same entity are shared within a session
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use formscope::{analyze_path, Property};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analysis = analyze_path("path/to/archive.zip")?;
//!     println!("Summary: {}", analysis.label.as_deref().unwrap_or("-"));
//!     for node in &analysis.graph.nodes {
//!         if let Some(name) = node.value(Property::FileName) {
//!             println!("  {}", name);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Built-in Formats
//!
//! - ZIP, tar, ar archives
//! - gzip and zstd compressed streams
//! - ELF, PE, MZ/NE/LE, Mach-O (thin and fat) executable headers
//! - Plain text in UTF-8, UTF-16, or the configured legacy encoding

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]

pub mod analyzers;
pub mod container;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod entity;
pub mod error;
pub mod format;
pub mod formats;
pub mod formatter;
pub mod graph;
pub mod hashing;
pub mod hierarchy;
pub mod identity;
pub mod input;
pub mod types;
pub mod vocab;

pub use container::{Behaviour, ContainerAnalyzer, ContainerProvider, DescriptionFileProvider};
pub use context::{AnalysisContext, CancellationToken, UriPath};
pub use dispatch::{AnalysisResult, AnalyzerRegistry, Dispatcher, EntityAnalyzer};
pub use engine::{Analysis, Engine, EngineBuilder, Session};
pub use entity::{
    ArchiveEntry, ArchiveFile, ArchiveReader, CustomEntity, Entity, EntityTag, TextDocument,
};
pub use error::{AnalysisError, Result};
pub use format::{
    matched, Decoded, EncodingDetector, FormatFlags, FormatObject, FormatRecognizer,
    FormatRegistry, MatchContext, MatchOutcome, Matcher, Signature,
};
pub use graph::{GraphSnapshot, LinkedNode, MemoryGraph, Node, NodeFactory, NodeRecord, Term};
pub use hierarchy::{FileKind, FileNode};
pub use identity::{DataKey, EntityKey, IdentityMap, ReferenceKey};
pub use input::{Input, StreamFactoryAccess};
pub use types::{AnalyzerOptions, Endianness, HashAlgorithm, TextEncoding};
pub use vocab::{Class, Property};

use std::path::Path;

/// Analyze a file or directory with default options.
///
/// This is the primary entry point for path-based analysis. Each call runs
/// in its own session, so nothing is shared between calls.
///
/// # Arguments
///
/// * `path` - File or directory to analyze
///
/// # Returns
///
/// * `Ok(Analysis)` - The root's summary and the resulting graph
/// * `Err(AnalysisError)` - If the path cannot be opened or analysis was cancelled
///
/// # Example
///
/// ```rust,no_run
/// use formscope::analyze_path;
///
/// let analysis = analyze_path("/usr/lib")?;
/// println!("{} nodes", analysis.graph.nodes.len());
/// # Ok::<(), formscope::AnalysisError>(())
/// ```
pub fn analyze_path<P: AsRef<Path>>(path: P) -> Result<Analysis> {
    analyze_path_with_options(path, AnalyzerOptions::new())
}

/// Analyze a file or directory with custom options.
pub fn analyze_path_with_options<P: AsRef<Path>>(
    path: P,
    options: AnalyzerOptions,
) -> Result<Analysis> {
    Engine::new(options)?.analyze_path(path.as_ref())
}

/// Analyze an in-memory buffer with default options.
///
/// The root is a blank node named `name`.
///
/// # Example
///
/// ```rust
/// use formscope::{analyze_bytes, Class};
///
/// let analysis = analyze_bytes("hello.txt", b"hello\n".to_vec())?;
/// let root = analysis.graph.node(analysis.root.as_deref().unwrap()).unwrap();
/// assert!(root.has_class(Class::PlainTextDocument));
/// # Ok::<(), formscope::AnalysisError>(())
/// ```
pub fn analyze_bytes(name: &str, bytes: Vec<u8>) -> Result<Analysis> {
    Engine::new(AnalyzerOptions::new())?.analyze_bytes(name, bytes)
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Names of the built-in recognizers in precedence order.
pub fn supported_formats() -> Vec<&'static str> {
    formats::default_registry().names()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let v = version();
        assert!(!v.is_empty());
    }

    #[test]
    fn test_supported_formats() {
        let names = supported_formats();
        assert_eq!(names.first(), Some(&"zip"));
        assert_eq!(names.last(), Some(&"text"));
        let pe = names.iter().position(|n| *n == "pe").unwrap();
        let mz = names.iter().position(|n| *n == "mz").unwrap();
        assert!(pe < mz);
    }

    #[test]
    fn test_analyze_elf_bytes() {
        let data = formats::elf::tests::make_elf_header(0x3E, 2, 1);
        let analysis = analyze_bytes("libdemo.so", data).unwrap();
        let root = analysis.graph.node(analysis.root.as_deref().unwrap()).unwrap();
        assert!(root.has_class(Class::Executable));
        assert_eq!(root.value(Property::RecognizedBy), Some("elf"));
        assert_eq!(root.value(Property::Architecture), Some("x86-64"));
        assert_eq!(root.value(Property::Bitwidth), Some("64"));
    }

    #[test]
    fn test_analyze_opaque_bytes() {
        let analysis = analyze_bytes("blob", vec![0x00, 0xFF, 0x00, 0xFF]).unwrap();
        let root = analysis.graph.node(analysis.root.as_deref().unwrap()).unwrap();
        assert_eq!(root.value(Property::NoFormat), Some("true"));
        assert_eq!(root.value(Property::FileSize), Some("4"));
    }
}
