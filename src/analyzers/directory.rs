//! Directory analyzer.

use super::file::describe_node;
use super::link_member;
use crate::context::{AnalysisContext, UriPath};
use crate::dispatch::{record_diagnostic, AnalysisResult, Dispatcher, EntityAnalyzer, Member};
use crate::entity::{Entity, EntityTag};
use crate::error::Result;
use crate::hierarchy::{ChildSource, FileNode, NodeBody};

/// Describes a directory and descends into its children.
///
/// A directory is a hierarchy root when no container chain is active yet,
/// so container providers get to wrap the walk of its subtree.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryAnalyzer;

impl EntityAnalyzer for DirectoryAnalyzer {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn declared(&self) -> EntityTag {
        EntityTag::Directory
    }

    fn analyze(
        &self,
        entity: &mut Entity,
        cx: &AnalysisContext,
        dispatch: &Dispatcher,
    ) -> Result<AnalysisResult> {
        let Entity::Node(info) = &*entity else {
            return Ok(AnalysisResult::empty());
        };
        let NodeBody::Directory(source) = &info.body else {
            return Ok(AnalysisResult::empty());
        };

        describe_node(&cx.node(), info);
        dispatch.enter_hierarchy(info, &info.path, cx, |cx: &AnalysisContext| {
            walk_children(info, source.as_ref(), cx, dispatch)
        })
    }
}

fn walk_children(
    info: &FileNode,
    source: &dyn ChildSource,
    cx: &AnalysisContext,
    dispatch: &Dispatcher,
) -> Result<AnalysisResult> {
    let folder = cx.node();
    let cx = cx.with_uri_path(UriPath::Hierarchical);

    let mut members = Vec::new();
    for child in source.children()? {
        cx.checkpoint()?;
        match child {
            Ok(child) => {
                let child_cx = cx.for_child(&child.name, Some(child.key.clone()));
                members.push(Member {
                    parent_path: info.path.clone(),
                    node: child,
                    cx: child_cx,
                });
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => record_diagnostic(&folder, &e),
        }
    }

    let count = members.len();
    for outcome in dispatch.analyze_members(members)? {
        link_member(&folder, &outcome)?;
    }
    Ok(AnalysisResult::new(folder).with_label(format!("{} ({} entries)", info.name, count)))
}
