//! Plain text analyzer.

use crate::context::AnalysisContext;
use crate::dispatch::{AnalysisResult, Dispatcher, EntityAnalyzer};
use crate::entity::{Entity, EntityTag};
use crate::error::Result;
use crate::graph::Term;
use crate::vocab::{Class, Property};

/// Records encoding and size statistics of decoded text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextAnalyzer;

impl EntityAnalyzer for TextAnalyzer {
    fn name(&self) -> &'static str {
        "text"
    }

    fn declared(&self) -> EntityTag {
        EntityTag::Text
    }

    fn analyze(
        &self,
        entity: &mut Entity,
        cx: &AnalysisContext,
        _dispatch: &Dispatcher,
    ) -> Result<AnalysisResult> {
        let Entity::Text(doc) = entity else {
            return Ok(AnalysisResult::empty());
        };

        let node = cx.node();
        node.set_class(Class::PlainTextDocument);
        node.set(Property::Encoding, Term::literal(doc.encoding.name()));
        node.set(Property::LineCount, Term::integer(doc.lines));
        node.set(Property::CharacterCount, Term::integer(doc.characters));

        let bom = if doc.has_bom { " with BOM" } else { "" };
        Ok(AnalysisResult::new(node)
            .with_label(format!("{} text{}, {} lines", doc.encoding, bom, doc.lines)))
    }
}
