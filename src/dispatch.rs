//! Entity analyzer dispatch.
//!
//! Analyzers register against an [`EntityTag`]. Resolution walks the entity's
//! tag chain from most to least specific; at each level the first registered
//! analyzer wins. The [`Dispatcher`] also owns the recursive descent helpers:
//! entering container hierarchies, analyzing members through the active
//! container chain, and analyzing sibling members concurrently when their
//! store allows it.

use crate::container::{ActiveHierarchy, ContainerProvider};
use crate::context::AnalysisContext;
use crate::entity::{Entity, EntityTag};
use crate::error::{AnalysisError, Result};
use crate::format::Matcher;
use crate::graph::{Node, Term};
use crate::hierarchy::FileNode;
use crate::vocab::Property;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, debug_span, trace, warn};

/// Outcome of describing one entity.
#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// Described node; `None` when there was nothing to describe.
    pub node: Option<Node>,
    /// Short human-readable summary.
    pub label: Option<String>,
    /// Non-fatal error captured during a partially successful analysis.
    pub error: Option<AnalysisError>,
}

impl AnalysisResult {
    /// Result describing `node`.
    pub fn new(node: Node) -> Self {
        Self {
            node: Some(node),
            label: None,
            error: None,
        }
    }

    /// Result with nothing described.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach a captured error; an existing one is kept.
    pub fn with_error(mut self, error: AnalysisError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    /// Take the label of a nested result describing the same node, if unset.
    ///
    /// The nested error is not carried over; it was already recorded on the
    /// node by the nested dispatch.
    pub fn merge(mut self, nested: AnalysisResult) -> Self {
        if self.label.is_none() {
            self.label = nested.label;
        }
        self
    }
}

/// Describes entities of one tag.
pub trait EntityAnalyzer: Send + Sync {
    /// Analyzer name, recorded on every node it describes.
    fn name(&self) -> &'static str;

    /// Most specific tag this analyzer handles.
    fn declared(&self) -> EntityTag;

    /// Describe `entity` on `cx`'s node, dispatching discovered children
    /// back through `dispatch`.
    fn analyze(
        &self,
        entity: &mut Entity,
        cx: &AnalysisContext,
        dispatch: &Dispatcher,
    ) -> Result<AnalysisResult>;
}

/// Data-driven table of `(tag, analyzer)` pairs.
#[derive(Default, Clone)]
pub struct AnalyzerRegistry {
    table: Vec<(EntityTag, Arc<dyn EntityAnalyzer>)>,
}

impl AnalyzerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analyzer under its declared tag.
    pub fn register(&mut self, analyzer: Arc<dyn EntityAnalyzer>) -> &mut Self {
        self.table.push((analyzer.declared(), analyzer));
        self
    }

    /// Most specific analyzer for `tag`; earlier registrations win ties.
    pub fn resolve(&self, tag: EntityTag) -> Option<&Arc<dyn EntityAnalyzer>> {
        tag.chain().find_map(|candidate| {
            self.table
                .iter()
                .find(|(declared, _)| *declared == candidate)
                .map(|(_, analyzer)| analyzer)
        })
    }

    /// `(tag, analyzer name)` pairs in registration order.
    pub fn entries(&self) -> Vec<(EntityTag, &'static str)> {
        self.table.iter().map(|(tag, a)| (*tag, a.name())).collect()
    }

    /// Number of registered analyzers.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// A child to analyze below a container.
pub struct Member {
    /// Path of the directory holding the child, relative to the hierarchy root.
    pub parent_path: String,
    /// The child itself.
    pub node: FileNode,
    /// Context the child is analyzed in.
    pub cx: AnalysisContext,
}

/// Result of analyzing one [`Member`].
pub struct MemberOutcome {
    /// See [`Member::parent_path`].
    pub parent_path: String,
    /// The analyzed child.
    pub node: FileNode,
    /// Context the child was analyzed in; its node may not exist.
    pub cx: AnalysisContext,
    /// Outcome of the analysis.
    pub result: Result<AnalysisResult>,
}

/// Record a non-fatal error on a node and in the log.
pub fn record_diagnostic(node: &Node, error: &AnalysisError) {
    warn!(subject = %node.subject(), error = %error, "non-fatal analysis error");
    node.set(Property::Diagnostic, Term::literal(error.to_string()));
}

/// Resolves analyzers and drives recursive descent.
#[derive(Clone)]
pub struct Dispatcher {
    analyzers: Arc<AnalyzerRegistry>,
    matcher: Matcher,
    providers: Arc<Vec<Arc<dyn ContainerProvider>>>,
}

impl Dispatcher {
    /// Dispatcher over fixed registries.
    pub fn new(
        analyzers: Arc<AnalyzerRegistry>,
        matcher: Matcher,
        providers: Arc<Vec<Arc<dyn ContainerProvider>>>,
    ) -> Self {
        Self {
            analyzers,
            matcher,
            providers,
        }
    }

    /// Format matcher.
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Analyzer registry.
    pub fn analyzers(&self) -> &AnalyzerRegistry {
        &self.analyzers
    }

    /// Describe `entity` with the most specific registered analyzer.
    ///
    /// Fatal and encryption errors propagate. Other errors are captured into
    /// the result when the context's node already exists, and propagate
    /// otherwise.
    pub fn analyze(&self, entity: &mut Entity, cx: &AnalysisContext) -> Result<AnalysisResult> {
        cx.checkpoint()?;
        let tag = entity.tag();

        let max_depth = cx.options().max_depth;
        if cx.depth() > max_depth {
            let node = cx.node();
            let error = AnalysisError::DepthExceeded { depth: max_depth };
            record_diagnostic(&node, &error);
            return Ok(AnalysisResult::new(node).with_error(error));
        }

        let Some(analyzer) = self.analyzers.resolve(tag) else {
            debug!(tag = %tag, "no analyzer registered");
            return Ok(AnalysisResult::empty());
        };

        let span = debug_span!("analyze", tag = %tag, analyzer = analyzer.name());
        let _guard = span.enter();
        trace!(depth = cx.depth(), "dispatching");

        match analyzer.analyze(entity, cx, self) {
            Ok(result) => {
                if let Some(node) = &result.node {
                    node.set(Property::AnalyzedBy, Term::literal(analyzer.name()));
                    if let Some(error) = &result.error {
                        record_diagnostic(node, error);
                    }
                }
                Ok(result)
            }
            Err(error) if error.is_fatal() || error.is_encryption() => Err(error),
            Err(error) => match cx.existing_node() {
                Some(node) => {
                    node.set(Property::AnalyzedBy, Term::literal(analyzer.name()));
                    record_diagnostic(&node, &error);
                    Ok(AnalysisResult::new(node).with_error(error))
                }
                None => Err(error),
            },
        }
    }

    /// Run `default` as the descent of a hierarchy rooted at `root`.
    ///
    /// When no hierarchy is active, every provider that matches `root`
    /// becomes a link of a new container chain wrapped around `default`.
    /// Inside an active hierarchy `default` runs directly.
    pub fn enter_hierarchy<'a>(
        &'a self,
        root: &'a FileNode,
        root_path: &'a str,
        cx: &'a AnalysisContext,
        default: impl FnOnce(&AnalysisContext) -> Result<AnalysisResult> + 'a,
    ) -> Result<AnalysisResult> {
        if cx.hierarchy().is_some() {
            return default(cx);
        }

        let links: Vec<_> = self
            .providers
            .iter()
            .filter_map(|provider| provider.match_root(root, root_path, cx))
            .collect();
        if links.is_empty() {
            return default(cx);
        }

        debug!(root = %root.name, links = links.len(), "entering container hierarchy");
        let hierarchy = Arc::new(ActiveHierarchy::new(links));
        let cx = cx.with_hierarchy(hierarchy.clone());
        let parent_path = crate::hierarchy::parent_path(root_path).to_string();
        hierarchy.run(&parent_path, root, &cx, self, Box::new(default))
    }

    /// Analyze a hierarchy member through the active container chain.
    pub fn analyze_member(
        &self,
        parent_path: &str,
        node: &FileNode,
        cx: &AnalysisContext,
    ) -> Result<AnalysisResult> {
        match cx.hierarchy() {
            Some(hierarchy) => {
                let hierarchy = hierarchy.clone();
                let base = Box::new(|cx: &AnalysisContext| {
                    self.analyze(&mut Entity::Node(node.clone()), cx)
                });
                hierarchy.run(parent_path, node, cx, self, base)
            }
            None => self.analyze(&mut Entity::Node(node.clone()), cx),
        }
    }

    /// Analyze sibling members, concurrently when allowed.
    ///
    /// Outcomes are returned in input order. Siblings run in parallel only
    /// when the options allow it and every member's store is
    /// [`crate::StreamFactoryAccess::Parallel`]. A fatal error in any member
    /// is returned after all members finish.
    pub fn analyze_members(&self, members: Vec<Member>) -> Result<Vec<MemberOutcome>> {
        let parallel = members.len() > 1
            && members.iter().all(|m| {
                m.cx.options().parallel
                    && m.node
                        .as_file()
                        .map_or(true, |body| body.access.allows_parallel())
            });

        let run = |member: Member| {
            let result = self.analyze_member(&member.parent_path, &member.node, &member.cx);
            MemberOutcome {
                parent_path: member.parent_path,
                node: member.node,
                cx: member.cx,
                result,
            }
        };

        let outcomes: Vec<MemberOutcome> = if parallel {
            trace!(count = members.len(), "analyzing members in parallel");
            members.into_par_iter().map(run).collect()
        } else {
            members.into_iter().map(run).collect()
        };

        if outcomes
            .iter()
            .any(|o| matches!(&o.result, Err(e) if e.is_fatal()))
        {
            return Err(AnalysisError::Cancelled);
        }
        Ok(outcomes)
    }
}
