//! Linked-node graph sink contract.
//!
//! The analysis core never serializes statements itself. It creates nodes
//! through a [`NodeFactory`] and describes them through [`LinkedNode`];
//! [`MemoryGraph`] is the in-process sink used by the engine and the CLI.

pub mod memory;

pub use memory::{GraphSnapshot, MemoryGraph, NodeRecord, StatementRecord, ValueRecord};

use crate::vocab::{ns, Class, Property};
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Identity of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Subject {
    /// Named node.
    Uri(String),
    /// Blank node, numbered by its factory.
    Blank(u64),
    /// Node whose identity is its own content (`data:` URI).
    Data(String),
}

impl Subject {
    /// The URI when this subject can be extended with sub-paths.
    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Subject::Uri(uri) => Some(uri),
            _ => None,
        }
    }

    /// Build a `data:` subject for `bytes`.
    pub fn data(media_type: &str, bytes: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Subject::Data(format!("data:{};base64,{}", media_type, encoded))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Uri(uri) => write!(f, "{}", uri),
            Subject::Blank(id) => write!(f, "_:b{}", id),
            Subject::Data(uri) => write!(f, "{}", uri),
        }
    }
}

/// Literal datatypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Datatype {
    /// `xsd:integer`
    Integer,
    /// `xsd:boolean`
    Boolean,
    /// `xsd:dateTime`
    DateTime,
    /// `xsd:hexBinary`
    HexBinary,
}

impl Datatype {
    /// XSD IRI of the datatype.
    pub fn iri(&self) -> String {
        let local = match self {
            Datatype::Integer => "integer",
            Datatype::Boolean => "boolean",
            Datatype::DateTime => "dateTime",
            Datatype::HexBinary => "hexBinary",
        };
        format!("{}{}", ns::XSD, local)
    }
}

/// Object of a statement.
#[derive(Debug, Clone)]
pub enum Term {
    /// Link to another node.
    Node(Node),
    /// Link to a resource that is not described further.
    Uri(String),
    /// Plain string literal.
    Literal(String),
    /// Typed literal.
    Typed {
        /// Lexical form.
        value: String,
        /// Datatype of the lexical form.
        datatype: Datatype,
    },
}

impl Term {
    /// Plain string literal.
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(value.into())
    }

    /// `xsd:integer` literal.
    pub fn integer(value: impl Into<i128>) -> Self {
        Term::Typed {
            value: value.into().to_string(),
            datatype: Datatype::Integer,
        }
    }

    /// `xsd:boolean` literal.
    pub fn boolean(value: bool) -> Self {
        Term::Typed {
            value: value.to_string(),
            datatype: Datatype::Boolean,
        }
    }

    /// `xsd:dateTime` literal.
    pub fn date_time(value: DateTime<Utc>) -> Self {
        Term::Typed {
            value: value.to_rfc3339_opts(SecondsFormat::Secs, true),
            datatype: Datatype::DateTime,
        }
    }

    /// `xsd:hexBinary` literal.
    pub fn hex_binary(bytes: &[u8]) -> Self {
        Term::Typed {
            value: hex::encode_upper(bytes),
            datatype: Datatype::HexBinary,
        }
    }
}

impl From<Node> for Term {
    fn from(node: Node) -> Self {
        Term::Node(node)
    }
}

/// A node that statements can be attached to.
///
/// Implementations must be safe to describe from several threads at once.
pub trait LinkedNode: Send + Sync {
    /// Identity of the node.
    fn subject(&self) -> &Subject;

    /// Attach `property = value` to the node.
    fn set(&self, property: Property, value: Term);

    /// Declare the node an instance of `class`.
    fn set_class(&self, class: Class);
}

/// Creates nodes in a graph.
pub trait NodeFactory: Send + Sync {
    /// Create (or look up) the node for a URI or data subject.
    fn create(&self, subject: Subject) -> Node;

    /// Create a fresh blank node.
    fn create_blank(&self) -> Node;

    /// Create the node for a URI.
    fn create_uri(&self, uri: &str) -> Node {
        self.create(Subject::Uri(uri.to_string()))
    }

    /// Create a `data:` node carrying `bytes`.
    fn create_data(&self, media_type: &str, bytes: &[u8]) -> Node {
        self.create(Subject::data(media_type, bytes))
    }
}

/// Shared handle to a linked node.
#[derive(Clone)]
pub struct Node(Arc<dyn LinkedNode>);

impl Node {
    /// Wrap a sink-specific node.
    pub fn new(inner: Arc<dyn LinkedNode>) -> Self {
        Node(inner)
    }

    /// Identity of the node.
    pub fn subject(&self) -> &Subject {
        self.0.subject()
    }

    /// Attach `property = value`.
    pub fn set(&self, property: Property, value: impl Into<Term>) {
        self.0.set(property, value.into());
    }

    /// Declare the node an instance of `class`.
    pub fn set_class(&self, class: Class) {
        self.0.set_class(class);
    }

    /// Whether both handles refer to the same node object.
    pub fn same_as(&self, other: &Node) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Node").field(self.subject()).finish()
    }
}
