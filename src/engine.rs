//! Analysis engine: registries, worker pool, and sessions.
//!
//! An [`Engine`] is built once and reused. Each top-level analysis runs in a
//! [`Session`] that owns the graph and the identity map, so nodes are shared
//! between inputs of one session but never across sessions.

use crate::analyzers::default_analyzers;
use crate::container::{ContainerProvider, DescriptionFileProvider};
use crate::context::{AnalysisContext, CancellationToken};
use crate::dispatch::{AnalysisResult, AnalyzerRegistry, Dispatcher, EntityAnalyzer};
use crate::entity::Entity;
use crate::error::{AnalysisError, Result};
use crate::format::{FormatRecognizer, FormatRegistry, Matcher};
use crate::formats::default_registry;
use crate::graph::{GraphSnapshot, MemoryGraph};
use crate::hierarchy::{file_uri, FileNode};
use crate::identity::{EntityKey, IdentityMap, ReferenceKey};
use crate::input::Input;
use crate::types::AnalyzerOptions;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Graph and identity state shared by the analyses of one session.
#[derive(Clone)]
pub struct Session {
    graph: Arc<MemoryGraph>,
    identities: Arc<IdentityMap>,
    cancel: CancellationToken,
}

impl Session {
    /// Empty session.
    pub fn new() -> Self {
        Self {
            graph: Arc::new(MemoryGraph::new()),
            identities: Arc::new(IdentityMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels every analysis running in this session.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The session's graph.
    pub fn graph(&self) -> &Arc<MemoryGraph> {
        &self.graph
    }

    /// Copy of the graph as it is now.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    fn root_context(&self, options: &Arc<AnalyzerOptions>) -> AnalysisContext {
        AnalysisContext::new(
            self.graph.clone(),
            self.identities.clone(),
            options.clone(),
            self.cancel.clone(),
        )
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Finished analysis of one input.
#[derive(Debug)]
pub struct Analysis {
    /// Subject of the root node.
    pub root: Option<String>,
    /// Summary of the root.
    pub label: Option<String>,
    /// Non-fatal error captured on the root.
    pub error: Option<AnalysisError>,
    /// Everything the session's graph holds after the analysis.
    pub graph: GraphSnapshot,
}

impl Analysis {
    fn from_result(result: AnalysisResult, session: &Session) -> Self {
        Self {
            root: result.node.map(|node| node.subject().to_string()),
            label: result.label,
            error: result.error,
            graph: session.snapshot(),
        }
    }
}

/// Configured analyzer pipeline.
pub struct Engine {
    dispatcher: Dispatcher,
    options: Arc<AnalyzerOptions>,
    pool: rayon::ThreadPool,
}

impl Engine {
    /// Engine with the built-in recognizers, analyzers, and providers.
    pub fn new(options: AnalyzerOptions) -> Result<Self> {
        EngineBuilder::new().options(options).build()
    }

    /// Builder starting from the built-in registries.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Options every analysis runs with.
    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Dispatcher shared by every analysis.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Fresh session.
    pub fn session(&self) -> Session {
        Session::new()
    }

    /// Analyze a file or directory in a fresh session.
    pub fn analyze_path(&self, path: &Path) -> Result<Analysis> {
        let session = self.session();
        let result = self.analyze_path_in(&session, path)?;
        Ok(Analysis::from_result(result, &session))
    }

    /// Analyze in-memory content in a fresh session.
    ///
    /// The root node is blank; `name` becomes its file name.
    pub fn analyze_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<Analysis> {
        let session = self.session();
        let key = EntityKey::path(ReferenceKey::named("memory"), name);
        let node = FileNode::from_input(name, key, Input::from_vec(bytes));
        let result = self.analyze_node(&session, node, None)?;
        Ok(Analysis::from_result(result, &session))
    }

    /// Analyze a file or directory within `session`; the root node is named
    /// by the path's `file:` URI.
    pub fn analyze_path_in(&self, session: &Session, path: &Path) -> Result<AnalysisResult> {
        let absolute = fs::canonicalize(path)?;
        let node = FileNode::from_path(&absolute)?;
        let uri = file_uri(&absolute);
        self.analyze_node(session, node, Some(&uri))
    }

    /// Analyze a hierarchy node within `session`.
    ///
    /// Cancellation is returned as an error and the partial graph should be
    /// discarded with the session.
    pub fn analyze_node(
        &self,
        session: &Session,
        node: FileNode,
        uri: Option<&str>,
    ) -> Result<AnalysisResult> {
        let cx = session.root_context(&self.options);
        let cx = match uri {
            Some(uri) => cx.with_uri(uri),
            None => cx,
        }
        .with_key(node.key.clone());

        info!(name = %node.name, "analyzing");
        let result = self
            .pool
            .install(|| self.dispatcher.analyze(&mut Entity::Node(node), &cx));
        if let Err(e) = &result {
            debug!(error = %e, "analysis failed");
        }
        result
    }
}

/// Assembles an [`Engine`].
///
/// Registration order is precedence, both for recognizers and for analyzers
/// of the same tag.
pub struct EngineBuilder {
    options: AnalyzerOptions,
    formats: FormatRegistry,
    analyzers: AnalyzerRegistry,
    providers: Vec<Arc<dyn ContainerProvider>>,
}

impl EngineBuilder {
    /// Builder with the built-in registries and default options.
    pub fn new() -> Self {
        Self {
            options: AnalyzerOptions::new(),
            formats: default_registry(),
            analyzers: default_analyzers(),
            providers: vec![Arc::new(DescriptionFileProvider)],
        }
    }

    /// Replace the options.
    pub fn options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the recognizer registry.
    pub fn formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = formats;
        self
    }

    /// Append a recognizer; it is tried after every registered one.
    pub fn recognizer(mut self, recognizer: Arc<dyn FormatRecognizer>) -> Self {
        self.formats.register(recognizer);
        self
    }

    /// Insert a recognizer ahead of the one named `before`, or append it
    /// when there is no such recognizer.
    pub fn recognizer_before(mut self, before: &str, recognizer: Arc<dyn FormatRecognizer>) -> Self {
        if !self.formats.insert_before(before, recognizer.clone()) {
            self.formats.register(recognizer);
        }
        self
    }

    /// Append an analyzer.
    pub fn analyzer(mut self, analyzer: Arc<dyn EntityAnalyzer>) -> Self {
        self.analyzers.register(analyzer);
        self
    }

    /// Append a container provider.
    pub fn provider(mut self, provider: Arc<dyn ContainerProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Remove every container provider.
    pub fn without_providers(mut self) -> Self {
        self.providers.clear();
        self
    }

    /// Validate the options and start the worker pool.
    pub fn build(self) -> Result<Engine> {
        self.options.validate()?;
        let threads = self.options.effective_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("formscope-{}", i))
            .build()
            .map_err(|e| AnalysisError::ConfigError {
                message: format!("cannot start worker pool: {}", e),
            })?;
        debug!(
            threads,
            formats = self.formats.len(),
            analyzers = self.analyzers.len(),
            "engine ready"
        );

        let dispatcher = Dispatcher::new(
            Arc::new(self.analyzers),
            Matcher::new(Arc::new(self.formats)),
            Arc::new(self.providers),
        );
        Ok(Engine {
            dispatcher,
            options: Arc::new(self.options),
            pool,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{Class, Property};
    use std::io::Write;

    fn engine() -> Engine {
        Engine::new(AnalyzerOptions {
            threads: 2,
            ..AnalyzerOptions::new()
        })
        .unwrap()
    }

    #[test]
    fn test_analyze_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::File::create(&path)
            .unwrap()
            .write_all(b"first\nsecond\n")
            .unwrap();

        let analysis = engine().analyze_path(&path).unwrap();
        let root = analysis.root.unwrap();
        assert!(root.starts_with("file:///"));
        assert!(root.ends_with("/notes.txt"));
        assert_eq!(analysis.label.as_deref(), Some("notes.txt"));

        let node = analysis.graph.node(&root).unwrap();
        assert!(node.has_class(Class::PlainTextDocument));
        assert_eq!(node.value(Property::LineCount), Some("2"));
        assert_eq!(node.value(Property::RecognizedBy), Some("text"));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let engine = engine();
        let a = engine.analyze_bytes("a.bin", vec![0, 1, 2, 3]).unwrap();
        let b = engine.analyze_bytes("a.bin", vec![0, 1, 2, 3]).unwrap();
        assert_eq!(a.graph.nodes.len(), b.graph.nodes.len());
    }

    #[test]
    fn test_cancelled_session() {
        let engine = engine();
        let session = engine.session();
        session.cancel_token().cancel();
        let node = FileNode::from_input(
            "x",
            EntityKey::path(ReferenceKey::anonymous(), "x"),
            Input::from_slice(b"x"),
        );
        let err = engine.analyze_node(&session, node, None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_options() {
        let result = Engine::new(AnalyzerOptions {
            max_depth: 0,
            ..AnalyzerOptions::new()
        });
        assert!(matches!(result, Err(AnalysisError::ConfigError { .. })));
    }

    #[test]
    fn test_recognizer_before() {
        let engine = Engine::builder()
            .recognizer_before("zip", Arc::new(crate::formats::text::TextRecognizer))
            .build()
            .unwrap();
        let names = engine.dispatcher().matcher().registry().names();
        assert_eq!(names[0], "text");
    }
}
