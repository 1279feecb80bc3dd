//! Ordered collection of format recognizers.
//!
//! Registration order is precedence: the matcher stops at the first
//! recognizer whose decode succeeds. More specific or cheaper-to-rule-out
//! formats belong earlier.

use super::FormatRecognizer;
use std::sync::Arc;

/// Recognizers in precedence order.
#[derive(Default, Clone)]
pub struct FormatRegistry {
    recognizers: Vec<Arc<dyn FormatRecognizer>>,
}

impl FormatRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a recognizer with the lowest precedence so far.
    pub fn register(&mut self, recognizer: Arc<dyn FormatRecognizer>) -> &mut Self {
        tracing::trace!(format = recognizer.name(), "registering recognizer");
        self.recognizers.push(recognizer);
        self
    }

    /// Insert a recognizer directly ahead of the one named `before`.
    ///
    /// Returns `false` (and appends) when no recognizer has that name.
    pub fn insert_before(&mut self, before: &str, recognizer: Arc<dyn FormatRecognizer>) -> bool {
        match self.position(before) {
            Some(index) => {
                self.recognizers.insert(index, recognizer);
                true
            }
            None => {
                self.recognizers.push(recognizer);
                false
            }
        }
    }

    /// Remove the recognizer named `name`.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn FormatRecognizer>> {
        self.position(name).map(|index| self.recognizers.remove(index))
    }

    /// Index of the recognizer named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.recognizers.iter().position(|r| r.name() == name)
    }

    /// Recognizers in precedence order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FormatRecognizer>> {
        self.recognizers.iter()
    }

    /// Names in precedence order.
    pub fn names(&self) -> Vec<&'static str> {
        self.recognizers.iter().map(|r| r.name()).collect()
    }

    /// Header bytes the matcher must buffer to serve every recognizer.
    pub fn max_header_length(&self) -> usize {
        self.recognizers
            .iter()
            .map(|r| {
                let signature_end = r.signature().map_or(0, |s| s.end());
                r.header_length().max(signature_end)
            })
            .max()
            .unwrap_or(0)
    }

    /// Number of recognizers.
    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }
}
