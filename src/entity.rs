//! Typed entities handed to analyzers.
//!
//! Every value an analyzer can describe is one variant of [`Entity`]. Its
//! [`EntityTag`] selects the analyzer; tags form explicit fallback chains
//! (an archive item is a file is a file node) instead of a type hierarchy.

use crate::error::Result;
use crate::format::FormatObject;
use crate::hierarchy::{FileKind, FileNode, NodeBody};
use crate::identity::ReferenceKey;
use crate::input::{Input, StreamFactoryAccess};
use crate::types::TextEncoding;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Capability tag of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityTag {
    /// Fallback for every entity.
    Any,
    /// Any hierarchy node.
    FileNode,
    /// Hierarchy node with content.
    File,
    /// Hierarchy node with children.
    Directory,
    /// File owned by an archive.
    ArchiveItem,
    /// Matched format wrapper.
    Format,
    /// Eagerly enumerable archive.
    Archive,
    /// Single-pass archive.
    ArchiveReader,
    /// Decoded text.
    Text,
    /// Plugin-defined entity kind.
    Custom(&'static str),
}

impl EntityTag {
    /// Next less specific tag.
    pub fn parent(self) -> Option<EntityTag> {
        match self {
            EntityTag::Any => None,
            EntityTag::ArchiveItem => Some(EntityTag::File),
            EntityTag::File | EntityTag::Directory => Some(EntityTag::FileNode),
            EntityTag::FileNode
            | EntityTag::Format
            | EntityTag::Archive
            | EntityTag::ArchiveReader
            | EntityTag::Text
            | EntityTag::Custom(_) => Some(EntityTag::Any),
        }
    }

    /// This tag followed by each less specific one, ending with `Any`.
    pub fn chain(self) -> impl Iterator<Item = EntityTag> {
        std::iter::successors(Some(self), |tag| tag.parent())
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityTag::Any => write!(f, "any"),
            EntityTag::FileNode => write!(f, "file-node"),
            EntityTag::File => write!(f, "file"),
            EntityTag::Directory => write!(f, "directory"),
            EntityTag::ArchiveItem => write!(f, "archive-item"),
            EntityTag::Format => write!(f, "format"),
            EntityTag::Archive => write!(f, "archive"),
            EntityTag::ArchiveReader => write!(f, "archive-reader"),
            EntityTag::Text => write!(f, "text"),
            EntityTag::Custom(kind) => write!(f, "custom:{}", kind),
        }
    }
}

/// Entity type defined outside this crate.
pub trait CustomEntity: Send + Sync {
    /// Kind used as the dispatch tag.
    fn kind(&self) -> &'static str;

    /// Downcasting access for the analyzer of this kind.
    fn as_any(&self) -> &dyn Any;
}

/// One entry of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Slash-separated path inside the archive.
    pub path: String,
    /// Uncompressed size.
    pub size: u64,
    /// Stored size, when the format records one.
    pub compressed_size: Option<u64>,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
    /// Directory entries carry no content.
    pub is_dir: bool,
    /// Content cannot be read without a key.
    pub encrypted: bool,
    /// Position in the archive's own enumeration.
    pub index: usize,
}

impl ArchiveEntry {
    /// Path without trailing separators.
    pub fn clean_path(&self) -> &str {
        self.path.trim_end_matches('/')
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        let path = self.clean_path();
        path.rsplit_once('/').map_or(path, |(_, name)| name)
    }
}

/// Archive whose entries are all known up front.
pub trait ArchiveFile: Send + Sync {
    /// Format name of the adapter.
    fn format(&self) -> &'static str;

    /// Identity of the opened archive.
    fn reference(&self) -> &ReferenceKey;

    /// Entries in archive order.
    fn entries(&self) -> &[ArchiveEntry];

    /// Open an entry's content; encrypted entries fail with
    /// [`crate::AnalysisError::Encrypted`].
    fn open(&self, entry: &ArchiveEntry) -> Result<Box<dyn Read + Send>>;

    /// Random-access view of an entry, when stored uncompressed.
    fn open_input(&self, _entry: &ArchiveEntry) -> Result<Option<Input>> {
        Ok(None)
    }

    /// Whether entries may be opened concurrently.
    fn access(&self) -> StreamFactoryAccess;
}

/// Archive that can only be read front to back.
///
/// The current entry's content is available until the next call to
/// [`ArchiveReader::next_entry`]; [`ArchiveReader::skip`] discards it without
/// decoding.
pub trait ArchiveReader: Send {
    /// Format name of the adapter.
    fn format(&self) -> &'static str;

    /// Identity of the opened archive.
    fn reference(&self) -> &ReferenceKey;

    /// Advance to the next entry.
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>>;

    /// Read the current entry's content into a store, keeping at most
    /// `memory_limit` bytes in memory.
    fn open_current(&mut self, memory_limit: usize) -> Result<Input>;

    /// Discard the current entry's content.
    fn skip(&mut self) -> Result<()>;
}

/// Decoded text with its statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    /// Detected encoding.
    pub encoding: TextEncoding,
    /// Whether the content starts with a byte order mark.
    pub has_bom: bool,
    /// Line count.
    pub lines: u64,
    /// Character count, excluding the BOM.
    pub characters: u64,
}

impl TextDocument {
    /// Statistics of `text`.
    pub fn from_text(text: &str, encoding: TextEncoding, has_bom: bool) -> Self {
        let lines = if text.is_empty() {
            0
        } else {
            text.lines().count() as u64
        };
        Self {
            encoding,
            has_bom,
            lines,
            characters: text.chars().count() as u64,
        }
    }
}

/// A value that analyzers can describe.
pub enum Entity {
    /// File or directory of a hierarchy.
    Node(FileNode),
    /// Matched content awaiting description.
    Format(FormatObject),
    /// Random-access archive.
    Archive(Arc<dyn ArchiveFile>),
    /// Single-pass archive.
    Reader(Box<dyn ArchiveReader>),
    /// Decoded text.
    Text(TextDocument),
    /// Plugin-defined value.
    Custom(Box<dyn CustomEntity>),
}

impl Entity {
    /// Most specific tag of the entity.
    pub fn tag(&self) -> EntityTag {
        match self {
            Entity::Node(node) => match (&node.body, node.kind) {
                (NodeBody::Directory(_), _) => EntityTag::Directory,
                (NodeBody::File(_), FileKind::ArchiveItem) => EntityTag::ArchiveItem,
                (NodeBody::File(_), _) => EntityTag::File,
            },
            Entity::Format(_) => EntityTag::Format,
            Entity::Archive(_) => EntityTag::Archive,
            Entity::Reader(_) => EntityTag::ArchiveReader,
            Entity::Text(_) => EntityTag::Text,
            Entity::Custom(custom) => EntityTag::Custom(custom.kind()),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Entity::Format(object) => f.debug_tuple("Format").field(object).finish(),
            Entity::Archive(archive) => f.debug_tuple("Archive").field(&archive.format()).finish(),
            Entity::Reader(reader) => f.debug_tuple("Reader").field(&reader.format()).finish(),
            Entity::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Entity::Custom(custom) => f.debug_tuple("Custom").field(&custom.kind()).finish(),
        }
    }
}
