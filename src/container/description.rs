//! Package description files (`FILE_ID.DIZ` and friends).
//!
//! While a hierarchy is descended, files whose names match the configured
//! description names are collected together with the directory holding them.
//! After the root's own descent completes, the ones located exactly at the
//! root are decoded as text and attached as descriptions of the root node.

use super::{Behaviour, ContainerAnalyzer, ContainerProvider, Inner};
use crate::context::AnalysisContext;
use crate::dispatch::{record_diagnostic, AnalysisResult, Dispatcher};
use crate::error::Result;
use crate::format::EncodingDetector;
use crate::graph::{Node, Term};
use crate::hierarchy::FileNode;
use crate::identity::EntityKey;
use crate::vocab::Property;
use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

const MAX_DESCRIPTION_BYTES: u64 = 64 * 1024;

/// Attaches root-level description files to their hierarchy root.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptionFileProvider;

impl ContainerProvider for DescriptionFileProvider {
    fn name(&self) -> &'static str {
        "description-files"
    }

    fn match_root(
        &self,
        root: &FileNode,
        root_path: &str,
        cx: &AnalysisContext,
    ) -> Option<Arc<dyn ContainerAnalyzer>> {
        if cx.options().description_files.is_empty() {
            return None;
        }
        Some(Arc::new(DescriptionCollector {
            root_key: root.key.clone(),
            root_path: root_path.to_string(),
            found: Mutex::new(Vec::new()),
        }))
    }
}

struct DescriptionCollector {
    root_key: EntityKey,
    root_path: String,
    found: Mutex<Vec<(String, FileNode)>>,
}

impl DescriptionCollector {
    fn attach(&self, root: &Node, cx: &AnalysisContext) -> Result<()> {
        let found = std::mem::take(&mut *self.found.lock());
        let detector = EncodingDetector::new(cx.options().default_encoding);

        for (parent_path, file) in found {
            if parent_path != self.root_path {
                continue;
            }
            cx.checkpoint()?;
            match read_description(&file, &detector) {
                Ok(text) if !text.is_empty() => {
                    debug!(file = %file.name, "attaching package description");
                    root.set(Property::Description, Term::literal(text));
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => record_diagnostic(root, &e),
            }
        }
        Ok(())
    }
}

impl ContainerAnalyzer for DescriptionCollector {
    fn analyze(
        &self,
        parent_path: &str,
        node: &FileNode,
        cx: &AnalysisContext,
        inner: Inner<'_>,
        _dispatch: &Dispatcher,
    ) -> Result<AnalysisResult> {
        if node.key == self.root_key {
            let result = inner(Behaviour::FollowChildren)?;
            let root = result.node.clone().unwrap_or_else(|| cx.node());
            self.attach(&root, cx)?;
            return Ok(result);
        }

        if node.is_directory() {
            return inner(Behaviour::FollowChildren);
        }

        if cx.options().is_description_file(&node.name) {
            self.found
                .lock()
                .push((parent_path.to_string(), node.clone()));
        }
        inner(Behaviour::None)
    }
}

fn read_description(file: &FileNode, detector: &EncodingDetector) -> Result<String> {
    let Some(body) = file.as_file() else {
        return Ok(String::new());
    };
    let mut bytes = Vec::new();
    body.opener
        .open()?
        .take(MAX_DESCRIPTION_BYTES)
        .read_to_end(&mut bytes)?;
    let (text, _) = detector.decode(&bytes);
    Ok(clean_description(&text))
}

/// Strip control characters other than newline and tab, then trim.
pub fn clean_description(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_description() {
        assert_eq!(
            clean_description("\u{1b}[1mCool Tool\u{1b}[0m\r\n\tv1.0\u{1a}\n"),
            "[1mCool Tool[0m\n\tv1.0"
        );
    }
}
