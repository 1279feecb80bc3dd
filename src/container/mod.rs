//! Container analyzer chain.
//!
//! Providers look at a hierarchy root (a directory tree, an archive) and may
//! contribute a [`ContainerAnalyzer`] for it. The analyzers of one root form a
//! chain that wraps the descent into every node of that hierarchy, the root
//! included: each link receives an [`Inner`] continuation, runs code before
//! and after it, and chooses the [`Behaviour`] for the node.
//!
//! # Design Notes
//! - A link that never calls `inner` suppresses the default analysis of the node.
//! - The combined behaviour of a node is the most restrictive one requested.
//! - With [`Behaviour::None`] the node is still analyzed, but the chain is
//!   cleared below it, so links never see the content of opaque files or the
//!   internals of nested containers.

pub mod description;

pub use description::DescriptionFileProvider;

use crate::context::AnalysisContext;
use crate::dispatch::{AnalysisResult, Dispatcher};
use crate::error::Result;
use crate::hierarchy::FileNode;
use std::sync::Arc;
use tracing::trace;

/// How the chain treats the node below the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Behaviour {
    /// Analyze the node by default, but stop the chain below it.
    None,
    /// Keep the chain active for the node's children.
    FollowChildren,
}

/// Continuation performing the rest of the chain and the default analysis.
pub type Inner<'a> = Box<dyn FnOnce(Behaviour) -> Result<AnalysisResult> + 'a>;

/// Default analysis at the end of the chain.
pub type Base<'a> = Box<dyn FnOnce(&AnalysisContext) -> Result<AnalysisResult> + 'a>;

/// Recognizes hierarchy roots it wants to wrap.
pub trait ContainerProvider: Send + Sync {
    /// Provider name.
    fn name(&self) -> &'static str;

    /// Analyzer for the hierarchy at `root`, or `None` if the provider does
    /// not apply. `root_path` is the logical path of the root inside its own
    /// hierarchy (empty for archives and filesystem roots).
    fn match_root(
        &self,
        root: &FileNode,
        root_path: &str,
        cx: &AnalysisContext,
    ) -> Option<Arc<dyn ContainerAnalyzer>>;
}

/// One link of a container chain, shared by every node of its hierarchy.
pub trait ContainerAnalyzer: Send + Sync {
    /// Wrap the analysis of `node`, whose directory is `parent_path`.
    fn analyze(
        &self,
        parent_path: &str,
        node: &FileNode,
        cx: &AnalysisContext,
        inner: Inner<'_>,
        dispatch: &Dispatcher,
    ) -> Result<AnalysisResult>;
}

/// Container chain of the hierarchy currently being descended.
pub struct ActiveHierarchy {
    links: Vec<Arc<dyn ContainerAnalyzer>>,
}

impl ActiveHierarchy {
    /// Chain of `links`, outermost first.
    pub fn new(links: Vec<Arc<dyn ContainerAnalyzer>>) -> Self {
        Self { links }
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the chain has no links.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Run every link around `base` for `node`.
    pub fn run<'a>(
        &'a self,
        parent_path: &'a str,
        node: &'a FileNode,
        cx: &'a AnalysisContext,
        dispatch: &'a Dispatcher,
        base: Base<'a>,
    ) -> Result<AnalysisResult> {
        self.step(0, Behaviour::FollowChildren, parent_path, node, cx, dispatch, base)
    }

    #[allow(clippy::too_many_arguments)]
    fn step<'a>(
        &'a self,
        index: usize,
        behaviour: Behaviour,
        parent_path: &'a str,
        node: &'a FileNode,
        cx: &'a AnalysisContext,
        dispatch: &'a Dispatcher,
        base: Base<'a>,
    ) -> Result<AnalysisResult> {
        match self.links.get(index) {
            Some(link) => {
                let inner: Inner<'a> = Box::new(move |requested: Behaviour| {
                    self.step(
                        index + 1,
                        behaviour.min(requested),
                        parent_path,
                        node,
                        cx,
                        dispatch,
                        base,
                    )
                });
                link.analyze(parent_path, node, cx, inner, dispatch)
            }
            None => match behaviour {
                Behaviour::FollowChildren => base(cx),
                Behaviour::None => {
                    trace!(node = %node.name, "leaving container chain");
                    base(&cx.without_hierarchy())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancellationToken;
    use crate::dispatch::AnalyzerRegistry;
    use crate::format::{FormatRegistry, Matcher};
    use crate::graph::MemoryGraph;
    use crate::identity::{EntityKey, IdentityMap, ReferenceKey};
    use crate::input::Input;
    use crate::types::AnalyzerOptions;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        behaviour: Behaviour,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ContainerAnalyzer for Recorder {
        fn analyze(
            &self,
            _: &str,
            _: &FileNode,
            _: &AnalysisContext,
            inner: Inner<'_>,
            _: &Dispatcher,
        ) -> Result<AnalysisResult> {
            self.log.lock().push(format!("{}:before", self.name));
            let result = inner(self.behaviour);
            self.log.lock().push(format!("{}:after", self.name));
            result
        }
    }

    fn fixture() -> (Dispatcher, AnalysisContext, FileNode) {
        let dispatcher = Dispatcher::new(
            Arc::new(AnalyzerRegistry::new()),
            Matcher::new(Arc::new(FormatRegistry::new())),
            Arc::new(Vec::new()),
        );
        let cx = AnalysisContext::new(
            Arc::new(MemoryGraph::new()),
            Arc::new(IdentityMap::new()),
            Arc::new(AnalyzerOptions::new()),
            CancellationToken::new(),
        );
        let node = FileNode::from_input(
            "n",
            EntityKey::path(ReferenceKey::anonymous(), "n"),
            Input::from_slice(b"n"),
        );
        (dispatcher, cx, node)
    }

    #[test]
    fn test_links_wrap_in_order_and_combine_behaviour() {
        let (dispatch, cx, node) = fixture();
        let log = Arc::new(Mutex::new(Vec::new()));
        let hierarchy = Arc::new(ActiveHierarchy::new(vec![
            Arc::new(Recorder {
                name: "outer",
                behaviour: Behaviour::FollowChildren,
                log: log.clone(),
            }),
            Arc::new(Recorder {
                name: "inner",
                behaviour: Behaviour::None,
                log: log.clone(),
            }),
        ]));
        let cx = cx.with_hierarchy(hierarchy.clone());

        let base_log = log.clone();
        let result = hierarchy
            .run(
                "",
                &node,
                &cx,
                &dispatch,
                Box::new(move |cx: &AnalysisContext| {
                    base_log
                        .lock()
                        .push(format!("base:hierarchy={}", cx.hierarchy().is_some()));
                    Ok(AnalysisResult::new(cx.node()))
                }),
            )
            .unwrap();

        assert!(result.node.is_some());
        assert_eq!(
            *log.lock(),
            vec![
                "outer:before",
                "inner:before",
                "base:hierarchy=false",
                "inner:after",
                "outer:after"
            ]
        );
    }

    #[test]
    fn test_follow_children_keeps_chain() {
        let (dispatch, cx, node) = fixture();
        let log = Arc::new(Mutex::new(Vec::new()));
        let hierarchy = Arc::new(ActiveHierarchy::new(vec![Arc::new(Recorder {
            name: "only",
            behaviour: Behaviour::FollowChildren,
            log: log.clone(),
        })]));
        let cx = cx.with_hierarchy(hierarchy.clone());
        let kept = hierarchy
            .run(
                "",
                &node,
                &cx,
                &dispatch,
                Box::new(|cx: &AnalysisContext| {
                    Ok(AnalysisResult::empty().with_label(cx.hierarchy().is_some().to_string()))
                }),
            )
            .unwrap();
        assert_eq!(kept.label.as_deref(), Some("true"));
    }
}
