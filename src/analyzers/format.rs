//! Format object analyzer.
//!
//! Records which recognizer matched, then describes the decoded value on the
//! same node. Decoded payloads that are themselves files (decompressed
//! streams) become embedded child nodes instead.

use super::{link_member, mark_encrypted};
use crate::context::{AnalysisContext, UriPath};
use crate::dispatch::{AnalysisResult, Dispatcher, EntityAnalyzer, MemberOutcome};
use crate::entity::{Entity, EntityTag};
use crate::error::Result;
use crate::graph::{Node, Term};
use crate::hierarchy::FileNode;
use crate::vocab::Property;

/// Analyzer for matched [`crate::FormatObject`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatObjectAnalyzer;

impl EntityAnalyzer for FormatObjectAnalyzer {
    fn name(&self) -> &'static str {
        "format"
    }

    fn declared(&self) -> EntityTag {
        EntityTag::Format
    }

    fn analyze(
        &self,
        entity: &mut Entity,
        cx: &AnalysisContext,
        dispatch: &Dispatcher,
    ) -> Result<AnalysisResult> {
        let Entity::Format(object) = entity else {
            return Ok(AnalysisResult::empty());
        };

        let node = cx.node();
        node.set(Property::RecognizedBy, Term::literal(object.name()));
        if let Some(media_type) = object.media_type() {
            node.set(Property::MediaType, Term::literal(media_type));
        }
        if let Some(extension) = object.extension() {
            node.set(Property::Extension, Term::literal(extension));
        }
        let format = object.name();

        let nested = match object.value_mut()? {
            Entity::Node(payload) => {
                let payload = payload.clone();
                embed(&node, payload, cx, dispatch)?
            }
            value => dispatch.analyze(value, cx)?,
        };
        object.dispose();

        let result = AnalysisResult::new(node).merge(nested);
        Ok(match result.label {
            Some(_) => result,
            None => result.with_label(format),
        })
    }
}

fn embed(
    container: &Node,
    payload: FileNode,
    cx: &AnalysisContext,
    dispatch: &Dispatcher,
) -> Result<AnalysisResult> {
    let child_cx = cx
        .with_uri_path(UriPath::Fragment)
        .for_child(&payload.name, Some(payload.key.clone()));
    let result = dispatch.analyze(&mut Entity::Node(payload.clone()), &child_cx);
    let outcome = MemberOutcome {
        parent_path: String::new(),
        node: payload,
        cx: child_cx,
        result,
    };
    if link_member(container, &outcome)? {
        mark_encrypted(container);
    }
    Ok(AnalysisResult::empty())
}
