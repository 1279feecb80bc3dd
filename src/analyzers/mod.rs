//! Built-in entity analyzers.
//!
//! Each analyzer turns one kind of [`crate::Entity`] into statements on the
//! current context's node and hands anything it discovers (format objects,
//! archive entries, embedded payloads) back to the dispatcher.
//!
//! | Analyzer | Tag |
//! |---|---|
//! | [`FileNodeAnalyzer`] | file |
//! | [`DirectoryAnalyzer`] | directory |
//! | [`FormatObjectAnalyzer`] | format |
//! | [`ArchiveAnalyzer`] | archive |
//! | [`ArchiveReaderAnalyzer`] | archive-reader |
//! | [`TextAnalyzer`] | text |
//! | [`ExecutableAnalyzer`] | custom:executable |

pub mod archive;
pub mod directory;
pub mod executable;
pub mod file;
pub mod format;
pub mod reader;
pub mod text;

pub use archive::ArchiveAnalyzer;
pub use directory::DirectoryAnalyzer;
pub use executable::ExecutableAnalyzer;
pub use file::FileNodeAnalyzer;
pub use format::FormatObjectAnalyzer;
pub use reader::ArchiveReaderAnalyzer;
pub use text::TextAnalyzer;

use crate::dispatch::{record_diagnostic, AnalyzerRegistry, MemberOutcome};
use crate::error::{AnalysisError, Result};
use crate::graph::{Node, Term};
use crate::vocab::{encryption, Property};
use std::sync::Arc;

/// Registry holding every built-in analyzer.
pub fn default_analyzers() -> AnalyzerRegistry {
    let mut registry = AnalyzerRegistry::new();
    registry
        .register(Arc::new(FileNodeAnalyzer))
        .register(Arc::new(DirectoryAnalyzer))
        .register(Arc::new(FormatObjectAnalyzer))
        .register(Arc::new(ArchiveAnalyzer))
        .register(Arc::new(ArchiveReaderAnalyzer))
        .register(Arc::new(TextAnalyzer))
        .register(Arc::new(ExecutableAnalyzer));
    registry
}

/// Mark `node` as holding encrypted content.
pub(crate) fn mark_encrypted(node: &Node) {
    node.set(
        Property::EncryptionStatus,
        Term::Uri(encryption::ENCRYPTED.to_string()),
    );
}

/// Attach a member's node to `container` and absorb its error.
///
/// Returns `true` when the member failed because its content is encrypted;
/// the caller annotates its own node in that case. Other non-fatal errors
/// become diagnostics on the member's node, or on `container` when the
/// member never got one.
pub(crate) fn link_member(container: &Node, outcome: &MemberOutcome) -> Result<bool> {
    match &outcome.result {
        Ok(result) => {
            if let Some(node) = &result.node {
                node.set(Property::BelongsToContainer, container.clone());
            }
            Ok(false)
        }
        Err(error) if error.is_fatal() => Err(AnalysisError::Cancelled),
        Err(error) if error.is_encryption() => {
            if let Some(node) = outcome.cx.existing_node() {
                node.set(Property::BelongsToContainer, container.clone());
            }
            Ok(true)
        }
        Err(error) => {
            match outcome.cx.existing_node() {
                Some(node) => {
                    node.set(Property::BelongsToContainer, container.clone());
                    record_diagnostic(&node, error);
                }
                None => record_diagnostic(container, error),
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityTag;

    #[test]
    fn test_default_resolution() {
        let registry = default_analyzers();
        let name = |tag| registry.resolve(tag).map(|a| a.name());
        assert_eq!(name(EntityTag::ArchiveItem), Some("file"));
        assert_eq!(name(EntityTag::Directory), Some("directory"));
        assert_eq!(name(EntityTag::Custom("executable")), Some("executable"));
        assert_eq!(name(EntityTag::Custom("unknown")), None);
    }
}
