//! File node analyzer.
//!
//! Describes the file itself (name, size, timestamps, digests), opens its
//! content, and runs the format matcher over it. Unmatched content is
//! recorded as opaque data.

use crate::context::AnalysisContext;
use crate::dispatch::{AnalysisResult, Dispatcher, EntityAnalyzer};
use crate::entity::{Entity, EntityTag};
use crate::error::{AnalysisError, Result};
use crate::graph::{Node, Term};
use crate::hashing;
use crate::hierarchy::{FileBody, FileKind, FileNode};
use crate::input::Input;
use crate::vocab::{Class, Property};
use tracing::{debug, trace};

const OPAQUE_MEDIA_TYPE: &str = "application/octet-stream";

/// Analyzer for file nodes of any store.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileNodeAnalyzer;

impl EntityAnalyzer for FileNodeAnalyzer {
    fn name(&self) -> &'static str {
        "file"
    }

    fn declared(&self) -> EntityTag {
        EntityTag::File
    }

    fn analyze(
        &self,
        entity: &mut Entity,
        cx: &AnalysisContext,
        dispatch: &Dispatcher,
    ) -> Result<AnalysisResult> {
        let Entity::Node(info) = entity else {
            return Ok(AnalysisResult::empty());
        };
        let Some(body) = info.as_file() else {
            return Ok(AnalysisResult::empty());
        };

        let node = cx.node();
        describe_node(&node, info);
        node.set(Property::FileSize, Term::integer(body.length));
        let result = AnalysisResult::new(node.clone()).with_label(info.name.clone());

        if body.encrypted {
            super::mark_encrypted(&node);
            return Err(AnalysisError::Encrypted {
                path: display_path(info).to_string(),
            });
        }

        let limit = cx.options().max_entry_size;
        if info.kind != FileKind::None && body.length > limit {
            return Ok(result.with_error(AnalysisError::EntryTooLarge {
                path: display_path(info).to_string(),
                size: body.length,
                limit,
            }));
        }

        let input = open_content(body, cx)?;
        hashing::describe(&node, &input, cx)?;

        let cx = cx.with_service(info.clone());
        match dispatch.matcher().try_match(&input, &cx.match_context())? {
            Some(object) => {
                debug!(file = %info.name, format = object.name(), "format matched");
                let nested = dispatch.analyze(&mut Entity::Format(object), &cx.as_initialized())?;
                Ok(result.merge(nested))
            }
            None => {
                trace!(file = %info.name, "no format matched");
                node.set(Property::NoFormat, Term::boolean(true));
                let data_limit = cx.options().data_uri_limit;
                if !input.is_empty() && input.len() <= data_limit {
                    let data = cx.factory().create_data(OPAQUE_MEDIA_TYPE, &input.to_vec()?);
                    node.set(Property::Content, data);
                }
                Ok(result)
            }
        }
    }
}

/// Classes, name, timestamps, and revision shared by files and folders.
pub(crate) fn describe_node(node: &Node, info: &FileNode) {
    node.set_class(if info.is_directory() {
        Class::Folder
    } else {
        Class::FileDataObject
    });
    match info.kind {
        FileKind::None => {}
        FileKind::Embedded => node.set_class(Class::EmbeddedFileDataObject),
        FileKind::ArchiveItem => node.set_class(Class::ArchiveItem),
    }

    node.set(Property::FileName, Term::literal(info.name.clone()));
    if let Some(sub_name) = &info.sub_name {
        node.set(
            Property::Label,
            Term::literal(format!("{} ({})", info.name, sub_name)),
        );
    }
    if let Some(created) = info.created {
        node.set(Property::FileCreated, Term::date_time(created));
    }
    if let Some(modified) = info.modified {
        node.set(Property::FileLastModified, Term::date_time(modified));
    }
    if let Some(accessed) = info.accessed {
        node.set(Property::FileLastAccessed, Term::date_time(accessed));
    }
    if let Some(revision) = info.revision {
        node.set(Property::Revision, Term::integer(revision));
    }
}

fn display_path(info: &FileNode) -> &str {
    if info.path.is_empty() {
        &info.name
    } else {
        &info.path
    }
}

/// Random-access content of a file, spooling streams that offer none.
pub(crate) fn open_content(body: &FileBody, cx: &AnalysisContext) -> Result<Input> {
    if let Some(input) = body.opener.open_input()? {
        return Ok(input);
    }
    let mut stream = body.opener.open()?;
    Input::spool(&mut stream, cx.options().spool_memory_limit, cx.cancel())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::default_analyzers;
    use crate::context::CancellationToken;
    use crate::format::{FormatRegistry, Matcher};
    use crate::graph::MemoryGraph;
    use crate::identity::{EntityKey, IdentityMap, ReferenceKey};
    use crate::types::AnalyzerOptions;
    use std::sync::Arc;

    fn run(bytes: &[u8], options: AnalyzerOptions) -> (Arc<MemoryGraph>, Result<AnalysisResult>) {
        let graph = Arc::new(MemoryGraph::new());
        let dispatch = Dispatcher::new(
            Arc::new(default_analyzers()),
            Matcher::new(Arc::new(FormatRegistry::new())),
            Arc::new(Vec::new()),
        );
        let cx = AnalysisContext::new(
            graph.clone(),
            Arc::new(IdentityMap::new()),
            Arc::new(options),
            CancellationToken::new(),
        )
        .with_uri("urn:test:blob");
        let info = FileNode::from_input(
            "blob",
            EntityKey::path(ReferenceKey::anonymous(), "blob"),
            Input::from_slice(bytes),
        );
        let result = dispatch.analyze(&mut Entity::Node(info), &cx);
        (graph, result)
    }

    #[test]
    fn test_opaque_file() {
        let (graph, result) = run(&[0x00, 0x9F, 0x13, 0x77], AnalyzerOptions::new());
        let result = result.unwrap();
        assert!(result.node.is_some());

        let snapshot = graph.snapshot();
        let node = snapshot.node("urn:test:blob").unwrap();
        assert_eq!(node.value(Property::NoFormat), Some("true"));
        assert_eq!(node.value(Property::FileSize), Some("4"));
        assert_eq!(node.value(Property::AnalyzedBy), Some("file"));
        assert_eq!(node.links(Property::HasHash).len(), 1);
        let content = node.links(Property::Content);
        assert_eq!(content, vec!["data:application/octet-stream;base64,AJ8Tdw=="]);
    }

    #[test]
    fn test_fast_mode_skips_digests_and_data() {
        let (graph, _) = run(b"abcd", AnalyzerOptions::fast());
        let snapshot = graph.snapshot();
        let node = snapshot.node("urn:test:blob").unwrap();
        assert!(node.links(Property::HasHash).is_empty());
        assert!(node.links(Property::Content).is_empty());
    }
}
