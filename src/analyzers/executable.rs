//! Executable header analyzer.

use crate::context::AnalysisContext;
use crate::dispatch::{AnalysisResult, Dispatcher, EntityAnalyzer};
use crate::entity::{Entity, EntityTag};
use crate::error::Result;
use crate::formats::executable::{ExecutableHeader, KIND};
use crate::graph::Term;
use crate::vocab::{Class, Property};

const ENTRY_POINT: Property = Property::Custom("https://formscope.dev/ns#entryPoint");
const SECTION_COUNT: Property = Property::Custom("https://formscope.dev/ns#sectionCount");

/// Describes [`ExecutableHeader`] entities produced by the executable
/// recognizers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutableAnalyzer;

impl EntityAnalyzer for ExecutableAnalyzer {
    fn name(&self) -> &'static str {
        "executable"
    }

    fn declared(&self) -> EntityTag {
        EntityTag::Custom(KIND)
    }

    fn analyze(
        &self,
        entity: &mut Entity,
        cx: &AnalysisContext,
        _dispatch: &Dispatcher,
    ) -> Result<AnalysisResult> {
        let Entity::Custom(custom) = entity else {
            return Ok(AnalysisResult::empty());
        };
        let Some(header) = custom.as_any().downcast_ref::<ExecutableHeader>() else {
            return Ok(AnalysisResult::empty());
        };

        let node = cx.node();
        node.set_class(Class::Executable);
        node.set(Property::Architecture, Term::literal(header.architecture.clone()));
        if header.bitwidth > 0 {
            node.set(Property::Bitwidth, Term::integer(header.bitwidth));
        }
        node.set(Property::Endianness, Term::literal(header.endianness.to_string()));
        if let Some(entry) = header.entry_point {
            node.set(ENTRY_POINT, Term::literal(format!("{:#x}", entry)));
        }
        if let Some(sections) = header.sections {
            node.set(SECTION_COUNT, Term::integer(sections));
        }

        Ok(AnalysisResult::new(node).with_label(header.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::default_analyzers;
    use crate::context::CancellationToken;
    use crate::format::{FormatRegistry, Matcher};
    use crate::formats::executable::ExecutableKind;
    use crate::graph::MemoryGraph;
    use crate::identity::IdentityMap;
    use crate::types::{AnalyzerOptions, Endianness};
    use std::sync::Arc;

    #[test]
    fn test_describes_header() {
        let graph = Arc::new(MemoryGraph::new());
        let dispatch = Dispatcher::new(
            Arc::new(default_analyzers()),
            Matcher::new(Arc::new(FormatRegistry::new())),
            Arc::new(Vec::new()),
        );
        let cx = AnalysisContext::new(
            graph.clone(),
            Arc::new(IdentityMap::new()),
            Arc::new(AnalyzerOptions::new()),
            CancellationToken::new(),
        )
        .with_uri("urn:test:exe");

        let header = ExecutableHeader {
            format: "ELF",
            kind: ExecutableKind::SharedLibrary,
            machine: 0x3E,
            architecture: "x86-64".to_string(),
            bitwidth: 64,
            endianness: Endianness::Little,
            entry_point: Some(0x1040),
            sections: None,
        };
        let result = dispatch
            .analyze(&mut Entity::Custom(Box::new(header)), &cx)
            .unwrap();
        assert_eq!(result.label.as_deref(), Some("ELF 64-bit shared library, x86-64"));

        let snapshot = graph.snapshot();
        let node = snapshot.node("urn:test:exe").unwrap();
        assert!(node.has_class(Class::Executable));
        assert_eq!(node.value(Property::Bitwidth), Some("64"));
        assert_eq!(node.value(ENTRY_POINT), Some("0x1040"));
    }
}
