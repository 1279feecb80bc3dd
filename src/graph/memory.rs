//! In-memory graph sink.
//!
//! Named and data subjects are interned: creating the same subject twice
//! yields the same node object. Statements keep their insertion order.

use super::{Node, NodeFactory, Subject, Term};
use crate::vocab::{Class, Property};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe in-memory graph.
#[derive(Default)]
pub struct MemoryGraph {
    state: Mutex<GraphState>,
    next_blank: AtomicU64,
}

#[derive(Default)]
struct GraphState {
    index: HashMap<Subject, usize>,
    nodes: Vec<Arc<MemoryNode>>,
}

struct MemoryNode {
    subject: Subject,
    data: Mutex<NodeData>,
}

#[derive(Default)]
struct NodeData {
    classes: Vec<Class>,
    statements: Vec<(Property, Term)>,
}

impl super::LinkedNode for MemoryNode {
    fn subject(&self) -> &Subject {
        &self.subject
    }

    fn set(&self, property: Property, value: Term) {
        self.data.lock().statements.push((property, value));
    }

    fn set_class(&self, class: Class) {
        let mut data = self.data.lock();
        if !data.classes.contains(&class) {
            data.classes.push(class);
        }
    }
}

impl MemoryGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes created so far.
    pub fn len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Whether no node has been created.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, subject: Subject, intern: bool) -> Node {
        let mut state = self.state.lock();
        if intern {
            if let Some(&idx) = state.index.get(&subject) {
                return Node::new(state.nodes[idx].clone());
            }
        }
        let node = Arc::new(MemoryNode {
            subject: subject.clone(),
            data: Mutex::new(NodeData::default()),
        });
        let idx = state.nodes.len();
        state.nodes.push(node.clone());
        if intern {
            state.index.insert(subject, idx);
        }
        Node::new(node)
    }

    /// Copy the current graph into a serializable snapshot.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes: Vec<Arc<MemoryNode>> = self.state.lock().nodes.clone();
        let records = nodes
            .iter()
            .map(|node| {
                let data = node.data.lock();
                NodeRecord {
                    subject: node.subject.to_string(),
                    classes: data.classes.iter().map(Class::iri).collect(),
                    statements: data
                        .statements
                        .iter()
                        .map(|(property, term)| StatementRecord {
                            property: property.iri(),
                            value: ValueRecord::from_term(term),
                        })
                        .collect(),
                }
            })
            .collect();
        GraphSnapshot { nodes: records }
    }
}

impl NodeFactory for MemoryGraph {
    fn create(&self, subject: Subject) -> Node {
        self.insert(subject, true)
    }

    fn create_blank(&self) -> Node {
        let id = self.next_blank.fetch_add(1, Ordering::Relaxed);
        self.insert(Subject::Blank(id), false)
    }
}

/// Serializable copy of a graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    /// Nodes in creation order.
    pub nodes: Vec<NodeRecord>,
}

/// One node of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    /// IRI, blank label, or data URI.
    pub subject: String,
    /// Class IRIs.
    pub classes: Vec<String>,
    /// Statements in insertion order.
    pub statements: Vec<StatementRecord>,
}

/// One statement of a snapshot node.
#[derive(Debug, Clone, Serialize)]
pub struct StatementRecord {
    /// Property IRI.
    pub property: String,
    /// Object of the statement.
    pub value: ValueRecord,
}

/// Object of a snapshot statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueRecord {
    /// Another node of the snapshot.
    Node {
        /// Subject of the linked node.
        subject: String,
    },
    /// A resource outside the snapshot.
    Uri {
        /// Resource IRI.
        uri: String,
    },
    /// A literal value.
    Literal {
        /// Lexical form.
        value: String,
        /// Datatype IRI; absent for plain strings.
        #[serde(skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
    },
}

impl ValueRecord {
    fn from_term(term: &Term) -> Self {
        match term {
            Term::Node(node) => ValueRecord::Node {
                subject: node.subject().to_string(),
            },
            Term::Uri(uri) => ValueRecord::Uri { uri: uri.clone() },
            Term::Literal(value) => ValueRecord::Literal {
                value: value.clone(),
                datatype: None,
            },
            Term::Typed { value, datatype } => ValueRecord::Literal {
                value: value.clone(),
                datatype: Some(datatype.iri()),
            },
        }
    }

    /// Lexical form of a literal, subject of a node, or the URI.
    pub fn as_str(&self) -> &str {
        match self {
            ValueRecord::Node { subject } => subject,
            ValueRecord::Uri { uri } => uri,
            ValueRecord::Literal { value, .. } => value,
        }
    }
}

impl GraphSnapshot {
    /// Find a node by its subject string.
    pub fn node(&self, subject: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.subject == subject)
    }

    /// Nodes that are instances of `class`.
    pub fn nodes_of(&self, class: Class) -> Vec<&NodeRecord> {
        let iri = class.iri();
        self.nodes.iter().filter(|n| n.classes.contains(&iri)).collect()
    }

    /// Nodes with a `property` link pointing at `subject`.
    pub fn referrers(&self, property: Property, subject: &str) -> Vec<&NodeRecord> {
        self.nodes
            .iter()
            .filter(|n| n.links(property).iter().any(|s| *s == subject))
            .collect()
    }
}

impl NodeRecord {
    /// All values of `property`.
    pub fn values(&self, property: Property) -> Vec<&ValueRecord> {
        let iri = property.iri();
        self.statements
            .iter()
            .filter(|s| s.property == iri)
            .map(|s| &s.value)
            .collect()
    }

    /// First value of `property` as a string.
    pub fn value(&self, property: Property) -> Option<&str> {
        self.values(property).first().map(|v| v.as_str())
    }

    /// Subjects of nodes linked through `property`.
    pub fn links(&self, property: Property) -> Vec<&str> {
        self.values(property)
            .into_iter()
            .filter_map(|v| match v {
                ValueRecord::Node { subject } => Some(subject.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether the node is an instance of `class`.
    pub fn has_class(&self, class: Class) -> bool {
        self.classes.contains(&class.iri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_nodes_are_interned() {
        let graph = MemoryGraph::new();
        let a = graph.create_uri("file:///a");
        let b = graph.create_uri("file:///a");
        assert!(a.same_as(&b));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_blank_nodes_are_distinct() {
        let graph = MemoryGraph::new();
        let a = graph.create_blank();
        let b = graph.create_blank();
        assert!(!a.same_as(&b));
        assert_ne!(a.subject(), b.subject());
    }

    #[test]
    fn test_snapshot() {
        let graph = MemoryGraph::new();
        let dir = graph.create_uri("file:///dir");
        let file = graph.create_uri("file:///dir/a.txt");
        file.set_class(Class::FileDataObject);
        file.set_class(Class::FileDataObject);
        file.set(Property::FileName, Term::literal("a.txt"));
        file.set(Property::BelongsToContainer, dir);

        let snapshot = graph.snapshot();
        let record = snapshot.node("file:///dir/a.txt").unwrap();
        assert_eq!(record.classes.len(), 1);
        assert_eq!(record.value(Property::FileName), Some("a.txt"));
        assert_eq!(record.links(Property::BelongsToContainer), vec!["file:///dir"]);
        assert_eq!(
            snapshot
                .referrers(Property::BelongsToContainer, "file:///dir")
                .len(),
            1
        );
    }
}
