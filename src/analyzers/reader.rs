//! Single-pass archives.
//!
//! Entries are visited strictly in stream order. Each entry is either read
//! into a private store before the reader advances, or skipped without
//! decoding; the reader is never asked for an entry it has moved past.

use super::archive::ArchiveLayout;
use super::{link_member, mark_encrypted};
use crate::context::AnalysisContext;
use crate::dispatch::{record_diagnostic, AnalysisResult, Dispatcher, EntityAnalyzer, MemberOutcome};
use crate::entity::{ArchiveEntry, ArchiveReader, Entity, EntityTag};
use crate::error::{AnalysisError, Result};
use crate::hierarchy::{parent_path, FileNode, InputOpener, StreamOpener};
use crate::input::StreamFactoryAccess;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, trace};

/// Analyzer for [`ArchiveReader`] adapters.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveReaderAnalyzer;

impl EntityAnalyzer for ArchiveReaderAnalyzer {
    fn name(&self) -> &'static str {
        "archive-reader"
    }

    fn declared(&self) -> EntityTag {
        EntityTag::ArchiveReader
    }

    fn analyze(
        &self,
        entity: &mut Entity,
        cx: &AnalysisContext,
        dispatch: &Dispatcher,
    ) -> Result<AnalysisResult> {
        let Entity::Reader(reader) = entity else {
            return Ok(AnalysisResult::empty());
        };
        cx.node().set_class(crate::vocab::Class::Archive);

        let reader: &mut dyn ArchiveReader = reader.as_mut();
        let mut walk = |cx: &AnalysisContext| walk_stream(reader, cx, dispatch);
        match cx.service::<FileNode>() {
            Some(root) => dispatch.enter_hierarchy(&root, "", cx, walk),
            None => walk(cx),
        }
    }
}

/// Opener of an entry whose content was discarded.
struct SkippedOpener {
    path: String,
}

impl StreamOpener for SkippedOpener {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        Err(AnalysisError::EntryConsumed {
            path: self.path.clone(),
        })
    }
}

fn walk_stream(
    reader: &mut dyn ArchiveReader,
    cx: &AnalysisContext,
    dispatch: &Dispatcher,
) -> Result<AnalysisResult> {
    let mut layout = ArchiveLayout::new(cx, reader.reference().clone());
    let memory_limit = cx.options().spool_memory_limit;
    let max_entry_size = cx.options().max_entry_size;
    let mut count = 0usize;
    let mut encrypted = false;

    loop {
        cx.checkpoint()?;
        let entry = match reader.next_entry() {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                record_diagnostic(layout.archive_node(), &e);
                break;
            }
        };

        let path = entry.clean_path().to_string();
        if path.is_empty() || entry.is_dir {
            if !path.is_empty() {
                layout.folder(&path);
            }
            reader.skip()?;
            continue;
        }
        count += 1;

        let child = match open_entry(reader, &layout, &entry, memory_limit, max_entry_size) {
            Ok(child) => child,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if e.is_encryption() => {
                encrypted = true;
                continue;
            }
            // The failed read consumed part of the entry, so the stream no
            // longer sits on a header boundary and later entries are lost.
            Err(e) => {
                record_diagnostic(layout.archive_node(), &e);
                break;
            }
        };

        let container = layout.folder(parent_path(&path));
        let child_cx = layout.child_context(&child);
        let result = dispatch.analyze_member(parent_path(&path), &child, &child_cx);
        let outcome = MemberOutcome {
            parent_path: parent_path(&path).to_string(),
            node: child,
            cx: child_cx,
            result,
        };
        encrypted |= link_member(&container, &outcome)?;
    }

    if encrypted {
        mark_encrypted(layout.archive_node());
    }
    debug!(format = reader.format(), entries = count, "archive stream finished");
    Ok(AnalysisResult::new(layout.archive_node().clone())
        .with_label(format!("{} archive, {} entries", reader.format(), count)))
}

/// Take the current entry's content out of the reader.
///
/// Entries that will not be read (encrypted, oversized) are skipped and get
/// an opener that refuses to open; the file analyzer reports them without
/// touching the content.
fn open_entry(
    reader: &mut dyn ArchiveReader,
    layout: &ArchiveLayout<'_>,
    entry: &ArchiveEntry,
    memory_limit: usize,
    max_entry_size: u64,
) -> Result<FileNode> {
    if entry.encrypted || entry.size > max_entry_size {
        trace!(path = %entry.path, "skipping entry content");
        reader.skip()?;
        let opener = Arc::new(SkippedOpener {
            path: entry.path.clone(),
        });
        return Ok(layout.entry_node(entry, opener, StreamFactoryAccess::Exclusive));
    }

    let input = reader.open_current(memory_limit)?;
    let mut entry = entry.clone();
    entry.size = input.len();
    let access = input.access();
    Ok(layout.entry_node(&entry, Arc::new(InputOpener(input)), access))
}
