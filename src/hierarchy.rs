//! Hierarchy nodes: files and directories from any store.
//!
//! A [`FileNode`] is one tagged value for filesystem entries, archive
//! entries, and embedded payloads alike. Files carry a length and a
//! [`StreamOpener`]; directories carry a lazy [`ChildSource`].

use crate::error::Result;
use crate::identity::{EntityKey, ReferenceKey};
use crate::input::{Input, StreamFactoryAccess};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// How a node relates to the store that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Independently addressable (a filesystem entry).
    #[default]
    None,
    /// Owned by the content of another file (decompressed payload).
    Embedded,
    /// Member of an archive.
    ArchiveItem,
}

/// Opens the content of a file node.
pub trait StreamOpener: Send + Sync {
    /// Open a fresh stream positioned at the start of the content.
    fn open(&self) -> Result<Box<dyn Read + Send>>;

    /// Random-access view of the content, when the store offers one.
    fn open_input(&self) -> Result<Option<Input>> {
        Ok(None)
    }
}

/// Lazily enumerates the children of a directory node.
pub trait ChildSource: Send + Sync {
    /// Children in listing order.
    fn children(&self) -> Result<Box<dyn Iterator<Item = Result<FileNode>> + Send + '_>>;
}

/// Payload of a file node.
#[derive(Clone)]
pub struct FileBody {
    /// Content length in bytes.
    pub length: u64,
    /// Content cannot be read without a key.
    pub encrypted: bool,
    /// Opens the content.
    pub opener: Arc<dyn StreamOpener>,
    /// Whether `opener` may be used from several threads at once.
    pub access: StreamFactoryAccess,
}

/// File or directory payload.
#[derive(Clone)]
pub enum NodeBody {
    /// Content and its opener.
    File(FileBody),
    /// Lazily listed children.
    Directory(Arc<dyn ChildSource>),
}

/// A file or directory within some hierarchy.
#[derive(Clone)]
pub struct FileNode {
    /// Entry name.
    pub name: String,
    /// Disambiguator among equally named entries.
    pub sub_name: Option<String>,
    /// Slash-separated path from the hierarchy root; empty for the root.
    pub path: String,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// Last write time.
    pub modified: Option<DateTime<Utc>>,
    /// Last access time.
    pub accessed: Option<DateTime<Utc>>,
    /// Version number within a versioned store.
    pub revision: Option<u32>,
    /// Ownership by a container.
    pub kind: FileKind,
    /// Identity of the node's bytes.
    pub key: EntityKey,
    /// File or directory payload.
    pub body: NodeBody,
}

impl FileNode {
    /// File node with no timestamps.
    pub fn file(
        name: impl Into<String>,
        path: impl Into<String>,
        key: EntityKey,
        body: FileBody,
    ) -> Self {
        Self {
            name: name.into(),
            sub_name: None,
            path: path.into(),
            created: None,
            modified: None,
            accessed: None,
            revision: None,
            kind: FileKind::None,
            key,
            body: NodeBody::File(body),
        }
    }

    /// File node over an in-memory or shared input.
    pub fn from_input(name: impl Into<String>, key: EntityKey, input: Input) -> Self {
        let body = FileBody {
            length: input.len(),
            encrypted: false,
            access: input.access(),
            opener: Arc::new(InputOpener(input)),
        };
        Self::file(name, "", key, body)
    }

    /// Node for a filesystem path; it becomes the root of its hierarchy.
    pub fn from_path(path: &Path) -> Result<Self> {
        let absolute = fs::canonicalize(path)?;
        let name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| absolute.to_string_lossy().into_owned());
        Self::from_fs_entry(&absolute, name, String::new())
    }

    fn from_fs_entry(path: &Path, name: String, logical: String) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        let key = EntityKey::path(
            ReferenceKey::filesystem(),
            path.to_string_lossy().into_owned(),
        );
        let body = if metadata.is_dir() {
            NodeBody::Directory(Arc::new(DirectorySource {
                dir: path.to_path_buf(),
                logical: logical.clone(),
            }))
        } else {
            NodeBody::File(FileBody {
                length: metadata.len(),
                encrypted: false,
                opener: Arc::new(PathOpener(path.to_path_buf())),
                access: StreamFactoryAccess::Parallel,
            })
        };
        Ok(Self {
            name,
            sub_name: None,
            path: logical,
            created: metadata.created().ok().map(DateTime::<Utc>::from),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            accessed: metadata.accessed().ok().map(DateTime::<Utc>::from),
            revision: None,
            kind: FileKind::None,
            key,
            body,
        })
    }

    /// Whether the node is a directory.
    pub fn is_directory(&self) -> bool {
        matches!(self.body, NodeBody::Directory(_))
    }

    /// File payload, if this is a file.
    pub fn as_file(&self) -> Option<&FileBody> {
        match &self.body {
            NodeBody::File(body) => Some(body),
            NodeBody::Directory(_) => None,
        }
    }

    /// Path of the directory holding this node; empty at the root level.
    pub fn parent_path(&self) -> &str {
        parent_path(&self.path)
    }
}

impl fmt::Debug for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileNode")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("directory", &self.is_directory())
            .finish()
    }
}

/// Directory part of a slash-separated path.
pub fn parent_path(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit_once('/')
        .map_or("", |(parent, _)| parent)
}

/// Join a logical directory path and an entry name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// `file:` URI of an absolute filesystem path.
pub fn file_uri(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let escaped = crate::context::escape_path(&text);
    if escaped.starts_with('/') {
        format!("file://{}", escaped)
    } else {
        format!("file:///{}", escaped)
    }
}

/// Opens content that is already held by an [`Input`].
pub struct InputOpener(pub Input);

impl StreamOpener for InputOpener {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(self.0.reader()))
    }

    fn open_input(&self) -> Result<Option<Input>> {
        Ok(Some(self.0.clone()))
    }
}

struct PathOpener(PathBuf);

impl StreamOpener for PathOpener {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.0)?))
    }

    fn open_input(&self) -> Result<Option<Input>> {
        Input::open_file(&self.0).map(Some)
    }
}

struct DirectorySource {
    dir: PathBuf,
    logical: String,
}

impl ChildSource for DirectorySource {
    fn children(&self) -> Result<Box<dyn Iterator<Item = Result<FileNode>> + Send + '_>> {
        let walker = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter();
        Ok(Box::new(walker.map(move |entry| {
            let entry = entry.map_err(std::io::Error::from)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let logical = join_path(&self.logical, &name);
            FileNode::from_fs_entry(entry.path(), name, logical)
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("a/b/c.txt"), "a/b");
        assert_eq!(parent_path("c.txt"), "");
        assert_eq!(parent_path("a/b/"), "a");
        assert_eq!(join_path("", "x"), "x");
        assert_eq!(join_path("a", "x"), "a/x");
    }

    #[test]
    fn test_file_uri() {
        assert_eq!(file_uri(Path::new("/tmp/a b.txt")), "file:///tmp/a%20b.txt");
    }

    #[test]
    fn test_from_path_directory_children_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        let mut f = File::create(dir.path().join("a").join("inner.bin")).unwrap();
        f.write_all(&[0, 1, 2]).unwrap();

        let root = FileNode::from_path(dir.path()).unwrap();
        assert!(root.is_directory());
        assert_eq!(root.path, "");

        let NodeBody::Directory(source) = &root.body else {
            panic!("expected directory");
        };
        let children: Vec<FileNode> = source.children().unwrap().map(|c| c.unwrap()).collect();
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b.txt"]);
        assert_eq!(children[1].path, "b.txt");
        assert_eq!(children[1].as_file().unwrap().length, 1);

        let NodeBody::Directory(nested) = &children[0].body else {
            panic!("expected directory");
        };
        let inner: Vec<FileNode> = nested.children().unwrap().map(|c| c.unwrap()).collect();
        assert_eq!(inner[0].path, "a/inner.bin");
        assert_eq!(inner[0].parent_path(), "a");
    }

    #[test]
    fn test_from_input_opens_repeatedly() {
        let key = EntityKey::path(ReferenceKey::anonymous(), "mem");
        let node = FileNode::from_input("mem", key, Input::from_slice(b"abc"));
        let body = node.as_file().unwrap();
        for _ in 0..2 {
            let mut text = String::new();
            body.opener.open().unwrap().read_to_string(&mut text).unwrap();
            assert_eq!(text, "abc");
        }
    }
}
