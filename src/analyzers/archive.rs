//! Eagerly enumerable archives.
//!
//! Entries are analyzed in archive order through the active container chain.
//! Entries at the top level belong to the archive node; deeper entries belong
//! to synthesized folder nodes, which in turn chain up to the archive.
//! Encrypted entries annotate the archive node and never abort the walk.

use super::{link_member, mark_encrypted};
use crate::context::{AnalysisContext, UriPath};
use crate::dispatch::{AnalysisResult, Dispatcher, EntityAnalyzer, Member};
use crate::entity::{ArchiveEntry, ArchiveFile, Entity, EntityTag};
use crate::error::Result;
use crate::graph::{Node, Term};
use crate::hierarchy::{parent_path, FileBody, FileKind, FileNode, StreamOpener};
use crate::identity::{DataKey, EntityKey, ReferenceKey};
use crate::input::{Input, StreamFactoryAccess};
use crate::vocab::{Class, Property};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// Analyzer for [`ArchiveFile`] adapters.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveAnalyzer;

impl EntityAnalyzer for ArchiveAnalyzer {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn declared(&self) -> EntityTag {
        EntityTag::Archive
    }

    fn analyze(
        &self,
        entity: &mut Entity,
        cx: &AnalysisContext,
        dispatch: &Dispatcher,
    ) -> Result<AnalysisResult> {
        let Entity::Archive(archive) = entity else {
            return Ok(AnalysisResult::empty());
        };
        let archive = archive.clone();
        cx.node().set_class(Class::Archive);

        let walk = |cx: &AnalysisContext| walk_entries(&archive, cx, dispatch);
        match cx.service::<FileNode>() {
            Some(root) => dispatch.enter_hierarchy(&root, "", cx, walk),
            None => walk(cx),
        }
    }
}

fn walk_entries(
    archive: &Arc<dyn ArchiveFile>,
    cx: &AnalysisContext,
    dispatch: &Dispatcher,
) -> Result<AnalysisResult> {
    let mut layout = ArchiveLayout::new(cx, archive.reference().clone());
    let access = archive.access();

    let mut members = Vec::new();
    let mut containers = Vec::new();
    for entry in archive.entries() {
        cx.checkpoint()?;
        let path = entry.clean_path();
        if path.is_empty() {
            continue;
        }
        if entry.is_dir {
            layout.folder(path);
            continue;
        }

        let opener = Arc::new(EntryOpener {
            archive: archive.clone(),
            entry: entry.clone(),
        });
        let child = layout.entry_node(entry, opener, access);
        containers.push(layout.folder(parent_path(path)));
        members.push(Member {
            parent_path: parent_path(path).to_string(),
            cx: layout.child_context(&child),
            node: child,
        });
    }

    debug!(format = archive.format(), entries = members.len(), "walking archive");
    let count = members.len();
    let mut encrypted = false;
    for (outcome, container) in dispatch.analyze_members(members)?.iter().zip(containers) {
        encrypted |= link_member(&container, outcome)?;
    }
    if encrypted {
        mark_encrypted(layout.archive_node());
    }

    Ok(AnalysisResult::new(layout.archive_node().clone())
        .with_label(format!("{} archive, {} entries", archive.format(), count)))
}

/// Node layout of one archive: the archive node and its folder nodes.
pub(crate) struct ArchiveLayout<'a> {
    cx: &'a AnalysisContext,
    archive: Node,
    reference: ReferenceKey,
    folders: HashMap<String, Node>,
}

impl<'a> ArchiveLayout<'a> {
    pub(crate) fn new(cx: &'a AnalysisContext, reference: ReferenceKey) -> Self {
        Self {
            archive: cx.node(),
            cx,
            reference,
            folders: HashMap::new(),
        }
    }

    pub(crate) fn archive_node(&self) -> &Node {
        &self.archive
    }

    /// Node holding entries at `path`; the archive node for the top level.
    pub(crate) fn folder(&mut self, path: &str) -> Node {
        if path.is_empty() {
            return self.archive.clone();
        }
        if let Some(node) = self.folders.get(path) {
            return node.clone();
        }

        let parent = self.folder(parent_path(path));
        // distinct from a file entry that happens to share the path
        let key = EntityKey::new(self.reference.clone(), DataKey::Folder(path.to_string()));
        let node = self
            .cx
            .with_uri_path(UriPath::Hierarchical)
            .for_child(&format!("{}/", path), Some(key))
            .node();
        node.set_class(Class::Folder);
        node.set_class(Class::ArchiveItem);
        let name = path.rsplit_once('/').map_or(path, |(_, name)| name);
        node.set(Property::FileName, Term::literal(name));
        node.set(Property::BelongsToContainer, parent);

        self.folders.insert(path.to_string(), node.clone());
        node
    }

    /// Hierarchy node of a file entry.
    pub(crate) fn entry_node(
        &self,
        entry: &ArchiveEntry,
        opener: Arc<dyn StreamOpener>,
        access: StreamFactoryAccess,
    ) -> FileNode {
        let path = entry.clean_path();
        let mut node = FileNode::file(
            entry.name(),
            path,
            EntityKey::path(self.reference.clone(), path),
            FileBody {
                length: entry.size,
                encrypted: entry.encrypted,
                opener,
                access,
            },
        );
        node.modified = entry.modified;
        node.kind = FileKind::ArchiveItem;
        node
    }

    /// Context of an entry's node, named below the archive node.
    pub(crate) fn child_context(&self, child: &FileNode) -> AnalysisContext {
        self.cx
            .with_uri_path(UriPath::Hierarchical)
            .for_child(&child.path, Some(child.key.clone()))
    }
}

struct EntryOpener {
    archive: Arc<dyn ArchiveFile>,
    entry: ArchiveEntry,
}

impl StreamOpener for EntryOpener {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        self.archive.open(&self.entry)
    }

    fn open_input(&self) -> Result<Option<Input>> {
        self.archive.open_input(&self.entry)
    }
}
