//! Output formatters for analysis graphs.
//!
//! This module provides trait-based formatters for rendering an [`Analysis`]
//! in various output formats (human-readable tree, JSON, one line per node).

use crate::engine::Analysis;
use crate::graph::{GraphSnapshot, NodeRecord, ValueRecord};
use crate::vocab::{encryption, Class, Property};
use std::collections::HashSet;
use std::path::Path;

/// Trait for formatting analysis results.
///
/// Implementors render the pieces of an analysis; the default
/// [`AnalysisFormatter::format_analysis`] concatenates them.
pub trait AnalysisFormatter {
    /// Format the file path header.
    fn format_file(&self, path: &Path) -> String;

    /// Format the root summary.
    fn format_summary(&self, analysis: &Analysis) -> Option<String>;

    /// Format the container tree below the root.
    fn format_tree(&self, analysis: &Analysis) -> Option<String>;

    /// Format diagnostics recorded anywhere in the graph.
    fn format_diagnostics(&self, graph: &GraphSnapshot) -> Option<String>;

    /// Format the complete analysis.
    fn format_analysis(&self, analysis: &Analysis, path: &Path) -> String {
        let mut parts = vec![self.format_file(path)];
        if let Some(s) = self.format_summary(analysis) {
            parts.push(s);
        }
        if let Some(s) = self.format_tree(analysis) {
            parts.push(s);
        }
        if let Some(s) = self.format_diagnostics(&analysis.graph) {
            parts.push(s);
        }
        parts.join("")
    }
}

/// Local part of an IRI.
fn short_iri(iri: &str) -> &str {
    iri.rsplit(|c| c == '#' || c == '/').next().unwrap_or(iri)
}

/// Name shown for a node: file name, then label, then subject.
fn display_name(node: &NodeRecord) -> &str {
    node.value(Property::FileName)
        .or_else(|| node.value(Property::Label))
        .unwrap_or(&node.subject)
}

fn is_encrypted(node: &NodeRecord) -> bool {
    node.values(Property::EncryptionStatus)
        .iter()
        .any(|v| v.as_str() == encryption::ENCRYPTED)
}

/// Nodes contained in `subject`, ordered by name.
fn children<'a>(graph: &'a GraphSnapshot, subject: &str) -> Vec<&'a NodeRecord> {
    let mut children = graph.referrers(Property::BelongsToContainer, subject);
    children.sort_by(|a, b| {
        display_name(a)
            .cmp(display_name(b))
            .then_with(|| a.subject.cmp(&b.subject))
    });
    children
}

/// Human-readable output formatter.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    /// Show every statement of every node
    pub verbose: bool,
    /// Quiet mode (one line per input)
    pub quiet: bool,
}

impl HumanFormatter {
    /// Create a new human formatter with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a verbose formatter.
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            quiet: false,
        }
    }

    /// Create a quiet formatter.
    pub fn quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
        }
    }

    fn describe(node: &NodeRecord) -> String {
        let mut s = display_name(node).to_string();
        if let Some(format) = node.value(Property::RecognizedBy) {
            s.push_str(&format!(" [{}]", format));
        }

        let mut details = Vec::new();
        if node.has_class(Class::Folder) {
            details.push("folder".to_string());
        }
        if let Some(size) = node.value(Property::FileSize) {
            details.push(format!("{} bytes", size));
        }
        if let Some(media_type) = node.value(Property::MediaType) {
            details.push(media_type.to_string());
        }
        if is_encrypted(node) {
            details.push("encrypted".to_string());
        }
        if !details.is_empty() {
            s.push_str(&format!(" ({})", details.join(", ")));
        }
        s
    }

    fn write_statements(&self, s: &mut String, node: &NodeRecord, indent: usize) {
        for statement in &node.statements {
            let value = match &statement.value {
                ValueRecord::Node { subject } => format!("<{}>", subject),
                ValueRecord::Uri { uri } => format!("<{}>", uri),
                ValueRecord::Literal { value, .. } => value.clone(),
            };
            s.push_str(&format!(
                "{:indent$}- {}: {}\n",
                "",
                short_iri(&statement.property),
                value,
                indent = indent
            ));
        }
    }

    fn write_tree(
        &self,
        s: &mut String,
        graph: &GraphSnapshot,
        node: &NodeRecord,
        depth: usize,
        seen: &mut HashSet<String>,
    ) {
        if !seen.insert(node.subject.clone()) {
            return;
        }
        let indent = 4 + depth * 2;
        s.push_str(&format!("{:indent$}{}\n", "", Self::describe(node), indent = indent));
        if self.verbose {
            self.write_statements(s, node, indent + 2);
        }
        for child in children(graph, &node.subject) {
            self.write_tree(s, graph, child, depth + 1, seen);
        }
    }
}

impl AnalysisFormatter for HumanFormatter {
    fn format_file(&self, path: &Path) -> String {
        if self.quiet {
            String::new()
        } else {
            format!("File: {}\n", path.display())
        }
    }

    fn format_summary(&self, analysis: &Analysis) -> Option<String> {
        if self.quiet {
            return None;
        }
        let mut s = String::new();
        if let Some(label) = &analysis.label {
            s.push_str(&format!("  Summary:  {}\n", label));
        }
        if let Some(root) = analysis.root.as_deref().and_then(|r| analysis.graph.node(r)) {
            if let Some(format) = root.value(Property::RecognizedBy) {
                s.push_str(&format!("  Format:   {}\n", format));
            }
            if let Some(description) = root.value(Property::Description) {
                s.push_str(&format!("  About:    {}\n", description));
            }
        }
        s.push_str(&format!("  Nodes:    {}\n", analysis.graph.nodes.len()));
        if let Some(error) = &analysis.error {
            s.push_str(&format!("  [warn] {}\n", error));
        }
        Some(s)
    }

    fn format_tree(&self, analysis: &Analysis) -> Option<String> {
        let root = analysis.graph.node(analysis.root.as_deref()?)?;
        if !self.verbose && children(&analysis.graph, &root.subject).is_empty() {
            return None;
        }
        let mut s = String::from("  Contents:\n");
        let mut seen = HashSet::new();
        self.write_tree(&mut s, &analysis.graph, root, 0, &mut seen);
        Some(s)
    }

    fn format_diagnostics(&self, graph: &GraphSnapshot) -> Option<String> {
        if self.quiet {
            return None;
        }
        let mut s = String::new();
        for node in &graph.nodes {
            for diagnostic in node.values(Property::Diagnostic) {
                s.push_str(&format!(
                    "  [warn] {}: {}\n",
                    display_name(node),
                    diagnostic.as_str()
                ));
            }
        }
        (!s.is_empty()).then_some(s)
    }

    fn format_analysis(&self, analysis: &Analysis, path: &Path) -> String {
        if self.quiet {
            let label = analysis.label.as_deref().unwrap_or("unknown");
            return format!("{}: {}\n", path.display(), label);
        }

        let mut parts = vec![self.format_file(path)];
        if let Some(s) = self.format_summary(analysis) {
            parts.push(s);
        }
        if let Some(s) = self.format_tree(analysis) {
            parts.push(s);
        }
        if let Some(s) = self.format_diagnostics(&analysis.graph) {
            parts.push(s);
        }
        parts.push(String::from("\n"));
        parts.join("")
    }
}

/// JSON output formatter.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    /// Pretty-print JSON
    pub pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonFormatter {
    /// Create a new JSON formatter with pretty printing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact JSON formatter.
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl AnalysisFormatter for JsonFormatter {
    fn format_file(&self, _path: &Path) -> String {
        String::new()
    }

    fn format_summary(&self, _analysis: &Analysis) -> Option<String> {
        None
    }

    fn format_tree(&self, _analysis: &Analysis) -> Option<String> {
        None
    }

    fn format_diagnostics(&self, _graph: &GraphSnapshot) -> Option<String> {
        None
    }

    fn format_analysis(&self, analysis: &Analysis, path: &Path) -> String {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            file: String,
            root: Option<&'a str>,
            label: Option<&'a str>,
            error: Option<String>,
            nodes: &'a [NodeRecord],
        }

        let output = JsonOutput {
            file: path.display().to_string(),
            root: analysis.root.as_deref(),
            label: analysis.label.as_deref(),
            error: analysis.error.as_ref().map(ToString::to_string),
            nodes: &analysis.graph.nodes,
        };

        let json = if self.pretty {
            serde_json::to_string_pretty(&output)
        } else {
            serde_json::to_string(&output)
        };
        let mut s = json.unwrap_or_else(|_| "{}".to_string());
        s.push('\n');
        s
    }
}

/// Tab-separated output, one line per file node.
#[derive(Debug, Clone, Default)]
pub struct ShortFormatter;

impl ShortFormatter {
    /// Create a new short formatter.
    pub fn new() -> Self {
        Self
    }

    fn line(path: &Path, node: &NodeRecord) -> String {
        let format = node.value(Property::RecognizedBy).unwrap_or("-");
        let size = node.value(Property::FileSize).unwrap_or("-");
        let flag = if is_encrypted(node) { "\tencrypted" } else { "" };
        format!(
            "{}\t{}\t{}\t{}{}\n",
            path.display(),
            node.subject,
            format,
            size,
            flag
        )
    }
}

impl AnalysisFormatter for ShortFormatter {
    fn format_file(&self, _path: &Path) -> String {
        String::new()
    }

    fn format_summary(&self, _analysis: &Analysis) -> Option<String> {
        None
    }

    fn format_tree(&self, _analysis: &Analysis) -> Option<String> {
        None
    }

    fn format_diagnostics(&self, _graph: &GraphSnapshot) -> Option<String> {
        None
    }

    fn format_analysis(&self, analysis: &Analysis, path: &Path) -> String {
        let mut nodes: Vec<&NodeRecord> = analysis
            .graph
            .nodes
            .iter()
            .filter(|n| n.has_class(Class::FileDataObject) || n.has_class(Class::Folder))
            .collect();
        nodes.sort_by(|a, b| a.subject.cmp(&b.subject));
        nodes.into_iter().map(|n| Self::line(path, n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MemoryGraph, NodeFactory, Term};
    use std::path::PathBuf;

    fn sample_analysis() -> Analysis {
        let graph = MemoryGraph::new();
        let root = graph.create_uri("file:///tmp/bundle.zip");
        root.set_class(Class::FileDataObject);
        root.set(Property::FileName, Term::literal("bundle.zip"));
        root.set(Property::FileSize, Term::integer(300));
        root.set(Property::RecognizedBy, Term::literal("zip"));
        root.set(Property::MediaType, Term::literal("application/zip"));

        let entry = graph.create_uri("file:///tmp/bundle.zip#/secret.txt");
        entry.set_class(Class::FileDataObject);
        entry.set(Property::FileName, Term::literal("secret.txt"));
        entry.set(
            Property::EncryptionStatus,
            Term::Uri(encryption::ENCRYPTED.to_string()),
        );
        entry.set(Property::BelongsToContainer, root.clone());
        entry.set(Property::Diagnostic, Term::literal("unsupported method"));

        Analysis {
            root: Some("file:///tmp/bundle.zip".to_string()),
            label: Some("bundle.zip".to_string()),
            error: None,
            graph: graph.snapshot(),
        }
    }

    #[test]
    fn test_human_formatter() {
        let output =
            HumanFormatter::new().format_analysis(&sample_analysis(), &PathBuf::from("/tmp/bundle.zip"));

        assert!(output.contains("File: /tmp/bundle.zip"));
        assert!(output.contains("Format:   zip"));
        assert!(output.contains("bundle.zip [zip] (300 bytes, application/zip)"));
        assert!(output.contains("      secret.txt (encrypted)"));
        assert!(output.contains("[warn] secret.txt: unsupported method"));
    }

    #[test]
    fn test_human_formatter_quiet() {
        let output =
            HumanFormatter::quiet().format_analysis(&sample_analysis(), &PathBuf::from("/tmp/bundle.zip"));
        assert_eq!(output, "/tmp/bundle.zip: bundle.zip\n");
    }

    #[test]
    fn test_human_formatter_verbose() {
        let output = HumanFormatter::verbose()
            .format_analysis(&sample_analysis(), &PathBuf::from("/tmp/bundle.zip"));
        assert!(output.contains("- fileName: secret.txt"));
        assert!(output.contains("- belongsToContainer: <file:///tmp/bundle.zip>"));
    }

    #[test]
    fn test_json_formatter() {
        let output =
            JsonFormatter::new().format_analysis(&sample_analysis(), &PathBuf::from("/tmp/bundle.zip"));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["file"], "/tmp/bundle.zip");
        assert_eq!(value["root"], "file:///tmp/bundle.zip");
        assert_eq!(value["nodes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_short_formatter() {
        let output =
            ShortFormatter::new().format_analysis(&sample_analysis(), &PathBuf::from("/tmp/bundle.zip"));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "/tmp/bundle.zip\tfile:///tmp/bundle.zip\tzip\t300");
        assert!(lines[1].ends_with("\t-\t-\tencrypted"));
    }

    #[test]
    fn test_short_iri() {
        assert_eq!(short_iri("http://purl.org/dc/terms/format"), "format");
        assert_eq!(short_iri("https://formscope.dev/ns#recognizedBy"), "recognizedBy");
    }
}
