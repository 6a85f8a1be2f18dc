//! Collector configuration rendering
//!
//! Plain writer functions over the [`RoutingGraph`]. Output order follows the
//! graph's sorted order so equal graphs always render to equal text:
//!
//! 1. a header comment
//! 2. source routing, one `<match>` per built-in source kind
//! 3. one `<label>` per source fanning out to its stores
//! 4. one `<label>` per store holding the output plugin configuration

mod store;

use crate::crds::SourceKind;
use crate::error::Result;
use crate::graph::{RoutingGraph, SourceLabel};
use std::fmt::{self, Display, Write};
use tracing::debug;

const HEADER: &str = "\
## Generated collector routing configuration.
## Changes made here are overwritten on the next generation.";

/// Render the complete configuration text for `graph`
pub fn render(graph: &RoutingGraph) -> Result<String> {
    let mut w = ConfWriter::default();

    w.comment_block(HEADER)?;
    write_source_routing(&mut w, graph)?;
    for label in graph.labels() {
        write_source_label(&mut w, graph, label)?;
    }
    for store in graph.stores() {
        store::write_store_label(&mut w, store)?;
    }

    let text = w.finish();
    debug!(bytes = text.len(), "Rendered collector configuration");
    Ok(text)
}

/// Indenting writer for fluentd-style directives
#[derive(Debug, Default)]
pub(crate) struct ConfWriter {
    out: String,
    depth: usize,
}

impl ConfWriter {
    fn indent(&mut self) -> fmt::Result {
        for _ in 0..self.depth {
            self.out.write_str("  ")?;
        }
        Ok(())
    }

    /// `<name args>` and one level deeper
    pub(crate) fn open(&mut self, name: &str, args: &str) -> fmt::Result {
        self.indent()?;
        if args.is_empty() {
            writeln!(self.out, "<{name}>")?;
        } else {
            writeln!(self.out, "<{name} {args}>")?;
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn close(&mut self, name: &str) -> fmt::Result {
        self.depth = self.depth.saturating_sub(1);
        self.indent()?;
        writeln!(self.out, "</{name}>")
    }

    pub(crate) fn param(&mut self, key: &str, value: impl Display) -> fmt::Result {
        self.indent()?;
        writeln!(self.out, "{key} {value}")
    }

    pub(crate) fn blank(&mut self) -> fmt::Result {
        self.out.write_char('\n')
    }

    fn comment_block(&mut self, text: &str) -> fmt::Result {
        writeln!(self.out, "{text}")?;
        self.blank()
    }

    /// `<store> @type relabel @label X </store>`
    pub(crate) fn relabel_store(&mut self, label: &str) -> fmt::Result {
        self.open("store", "")?;
        self.param("@type", "relabel")?;
        self.param("@label", label)?;
        self.close("store")
    }

    pub(crate) fn null_match(&mut self, pattern: &str) -> fmt::Result {
        self.open("match", pattern)?;
        self.param("@type", "null")?;
        self.close("match")
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Send each source kind's collector tags to the labels reading that kind.
///
/// Infrastructure container tags overlap the application wildcard, so kinds
/// are matched in routing precedence order. Kinds nobody reads are discarded.
fn write_source_routing(w: &mut ConfWriter, graph: &RoutingGraph) -> fmt::Result {
    let mut kinds = SourceKind::ALL;
    kinds.sort_by_key(|kind| kind.routing_precedence());

    for kind in kinds {
        let pattern = kind.tags().join(" ");
        let labels: Vec<&SourceLabel> = graph.labels().iter().filter(|l| l.kind == kind).collect();
        match labels.as_slice() {
            [] => w.null_match(&pattern)?,
            [only] => {
                w.open("match", &pattern)?;
                w.param("@type", "relabel")?;
                w.param("@label", &only.label)?;
                w.close("match")?;
            }
            several => {
                w.open("match", &pattern)?;
                w.param("@type", "copy")?;
                for label in several {
                    w.relabel_store(&label.label)?;
                }
                w.close("match")?;
            }
        }
    }
    w.null_match("**")?;
    w.blank()
}

fn write_source_label(w: &mut ConfWriter, graph: &RoutingGraph, label: &SourceLabel) -> fmt::Result {
    let namespace_tags = label.namespace_tags();
    let pattern = if namespace_tags.is_empty() {
        "**".to_string()
    } else {
        namespace_tags.join(" ")
    };

    w.open("label", &label.label)?;
    w.open("match", &pattern)?;
    w.param("@type", "copy")?;
    for store in graph.targets(&label.source) {
        w.relabel_store(&store.label)?;
    }
    w.close("match")?;
    if !namespace_tags.is_empty() {
        w.null_match("**")?;
    }
    w.close("label")?;
    w.blank()
}
