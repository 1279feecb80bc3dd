//! Per-step analysis state.
//!
//! An [`AnalysisContext`] is never mutated after creation; analyzers derive
//! new contexts for children (`for_child`), for a different node
//! (`with_node`), or to attach services and hierarchy state. The current node
//! is created lazily, once per context, and shared by every derivation that
//! keeps the same node.

use crate::container::ActiveHierarchy;
use crate::error::{AnalysisError, Result};
use crate::format::MatchContext;
use crate::graph::{Node, NodeFactory};
use crate::identity::{EntityKey, IdentityMap};
use crate::types::AnalyzerOptions;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared cancellation flag observed at every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every analysis sharing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`AnalysisError::Cancelled`] once cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

struct ServiceEntry {
    type_id: TypeId,
    value: Arc<dyn Any + Send + Sync>,
    next: Option<Arc<ServiceEntry>>,
}

/// Service bag queried by type.
///
/// A persistent list: adding a service yields a new bag and leaves the old
/// one untouched, and a newer service of a type shadows older ones.
#[derive(Clone, Default)]
pub struct Services {
    head: Option<Arc<ServiceEntry>>,
}

impl Services {
    /// Empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bag with `value` added in front.
    pub fn with<T: Any + Send + Sync>(&self, value: T) -> Self {
        self.with_arc(Arc::new(value))
    }

    /// Bag with a shared `value` added in front.
    pub fn with_arc<T: Any + Send + Sync>(&self, value: Arc<T>) -> Self {
        Services {
            head: Some(Arc::new(ServiceEntry {
                type_id: TypeId::of::<T>(),
                value,
                next: self.head.clone(),
            })),
        }
    }

    /// Most recently added service of type `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let wanted = TypeId::of::<T>();
        let mut cursor = self.head.as_ref();
        while let Some(entry) = cursor {
            if entry.type_id == wanted {
                return entry.value.clone().downcast::<T>().ok();
            }
            cursor = entry.next.as_ref();
        }
        None
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut count = 0;
        let mut cursor = self.head.as_ref();
        while let Some(entry) = cursor {
            count += 1;
            cursor = entry.next.as_ref();
        }
        f.debug_struct("Services").field("len", &count).finish()
    }
}

/// Strategy for deriving child URIs from a parent URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UriPath {
    /// `parent/child`, for directory-shaped stores.
    #[default]
    Hierarchical,
    /// `parent#child`, for content embedded in an opaque file.
    Fragment,
}

impl UriPath {
    /// URI of `segment` beneath `base`; `/` inside `segment` is kept.
    pub fn child(&self, base: &str, segment: &str) -> String {
        let escaped = escape_path(segment);
        match self {
            UriPath::Hierarchical => format!("{}/{}", base.trim_end_matches('/'), escaped),
            UriPath::Fragment if base.contains('#') => {
                format!("{}/{}", base.trim_end_matches('/'), escaped)
            }
            UriPath::Fragment => format!("{}#{}", base, escaped),
        }
    }
}

/// Percent-encode a slash-separated path, keeping the separators.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => out.push(byte as char),
            b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*'
            | b'+' | b',' | b';' | b'=' | b':' | b'@' | b'/' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[derive(Clone)]
enum NodeInit {
    Uri(String),
    Blank,
    Existing(Node),
}

/// State of one recursion step.
#[derive(Clone)]
pub struct AnalysisContext {
    node: Arc<OnceLock<Node>>,
    init: NodeInit,
    key: Option<EntityKey>,
    parent: Option<Node>,
    factory: Arc<dyn NodeFactory>,
    identities: Arc<IdentityMap>,
    services: Services,
    uri_path: UriPath,
    cancel: CancellationToken,
    depth: usize,
    options: Arc<AnalyzerOptions>,
    hierarchy: Option<Arc<ActiveHierarchy>>,
}

impl AnalysisContext {
    /// Root context whose node will be blank.
    pub fn new(
        factory: Arc<dyn NodeFactory>,
        identities: Arc<IdentityMap>,
        options: Arc<AnalyzerOptions>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node: Arc::new(OnceLock::new()),
            init: NodeInit::Blank,
            key: None,
            parent: None,
            factory,
            identities,
            services: Services::new(),
            uri_path: UriPath::default(),
            cancel,
            depth: 0,
            options,
            hierarchy: None,
        }
    }

    fn reinit(&self, init: NodeInit, key: Option<EntityKey>) -> Self {
        let node = match &init {
            NodeInit::Existing(node) => OnceLock::from(node.clone()),
            _ => OnceLock::new(),
        };
        Self {
            node: Arc::new(node),
            init,
            key,
            ..self.clone()
        }
    }

    /// Same position, but the node will be named `uri`.
    pub fn with_uri(&self, uri: impl Into<String>) -> Self {
        self.reinit(NodeInit::Uri(uri.into()), self.key.clone())
    }

    /// Same position, but the node is resolved through `key` first.
    pub fn with_key(&self, key: EntityKey) -> Self {
        self.reinit(self.init.clone(), Some(key))
    }

    /// Context describing an existing node; parent and services are kept.
    pub fn with_node(&self, node: Node) -> Self {
        self.reinit(NodeInit::Existing(node), None)
    }

    /// Same node, different parent.
    pub fn with_parent(&self, parent: Node) -> Self {
        Self {
            parent: Some(parent),
            ..self.clone()
        }
    }

    /// Context whose node is created now, so later derivations cannot
    /// re-derive a different one.
    pub fn as_initialized(&self) -> Self {
        self.with_node(self.node())
    }

    /// Context for a child entity below the current node.
    ///
    /// The child URI is built from the current node's URI and `segment`
    /// using the context's [`UriPath`]; children of blank or data nodes are
    /// blank.
    pub fn for_child(&self, segment: &str, key: Option<EntityKey>) -> Self {
        let parent = self.node();
        let init = match parent.subject().as_uri() {
            Some(uri) => NodeInit::Uri(self.uri_path.child(uri, segment)),
            None => NodeInit::Blank,
        };
        Self {
            parent: Some(parent),
            depth: self.depth + 1,
            ..self.reinit(init, key)
        }
    }

    /// Same node with an additional service.
    pub fn with_service<T: std::any::Any + Send + Sync>(&self, value: T) -> Self {
        Self {
            services: self.services.with(value),
            ..self.clone()
        }
    }

    /// Same node with a different child URI strategy.
    pub fn with_uri_path(&self, uri_path: UriPath) -> Self {
        Self {
            uri_path,
            ..self.clone()
        }
    }

    /// Same node inside an active container hierarchy.
    pub fn with_hierarchy(&self, hierarchy: Arc<ActiveHierarchy>) -> Self {
        Self {
            hierarchy: Some(hierarchy),
            ..self.clone()
        }
    }

    /// Same node with no active container hierarchy.
    pub fn without_hierarchy(&self) -> Self {
        Self {
            hierarchy: None,
            ..self.clone()
        }
    }

    /// The node described by this context, created on first access.
    pub fn node(&self) -> Node {
        self.node.get_or_init(|| self.create_node()).clone()
    }

    /// The node if it has already been created.
    pub fn existing_node(&self) -> Option<Node> {
        self.node.get().cloned()
    }

    fn create_node(&self) -> Node {
        let make = || match &self.init {
            NodeInit::Existing(node) => node.clone(),
            NodeInit::Uri(uri) => self.factory.create_uri(uri),
            NodeInit::Blank => self.factory.create_blank(),
        };
        match &self.key {
            Some(key) => self.identities.get_or_create(key, make),
            None => make(),
        }
    }

    /// Containing node.
    pub fn parent(&self) -> Option<&Node> {
        self.parent.as_ref()
    }

    /// Identity key of the described entity.
    pub fn key(&self) -> Option<&EntityKey> {
        self.key.as_ref()
    }

    /// Node factory of the session.
    pub fn factory(&self) -> &Arc<dyn NodeFactory> {
        &self.factory
    }

    /// Identity table of the session.
    pub fn identities(&self) -> &Arc<IdentityMap> {
        &self.identities
    }

    /// Contextual services.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Most recent service of type `T`.
    pub fn service<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services.get::<T>()
    }

    /// Child URI strategy.
    pub fn uri_path(&self) -> UriPath {
        self.uri_path
    }

    /// Cancellation token.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail if cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.checkpoint()
    }

    /// Container nesting depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Analyzer options.
    pub fn options(&self) -> &Arc<AnalyzerOptions> {
        &self.options
    }

    /// Active container hierarchy.
    pub fn hierarchy(&self) -> Option<&Arc<ActiveHierarchy>> {
        self.hierarchy.as_ref()
    }

    /// Recognizer-facing view of this context.
    pub fn match_context(&self) -> MatchContext {
        MatchContext::new(self.options.clone())
            .with_services(self.services.clone())
            .with_cancel(self.cancel.clone())
    }
}

impl fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("node", &self.existing_node())
            .field("key", &self.key)
            .field("parent", &self.parent)
            .field("depth", &self.depth)
            .field("services", &self.services)
            .finish()
    }
}
