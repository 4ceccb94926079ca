//! Comment-to-node attribution.
//!
//! Walks a file's node arena in source order, pairing comment groups
//! with the nodes they precede. Markers ahead of the file node become
//! package markers; markers ahead of a declaration block pend until the
//! first type spec inside it; field and function markers attach
//! directly. Non-marker comments still advance the pairing cursor so
//! the position math stays aligned.

use crate::syntax::{CommentGroup, Node, NodeId, NodeKind, Position, SourceFile};
use std::collections::HashMap;

/// A marker comment lifted out of a comment group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerComment {
    /// The marker text, starting at the `+` sigil
    pub text: String,
    pub position: Position,
}

/// Attribution result for one file.
#[derive(Debug, Default)]
pub(crate) struct FileMarkers {
    /// Markers attributed to the file as a whole
    pub(crate) package_markers: Vec<MarkerComment>,
    /// Markers per node; includes the file node carrying the package
    /// markers
    pub(crate) node_markers: HashMap<NodeId, Vec<MarkerComment>>,
}

/// Run attribution over one file.
pub(crate) fn collect_file_markers(file: &SourceFile) -> FileMarkers {
    let mut visitor = Visitor::new(file.comments());
    visitor.visit(file, file.root());

    let mut node_markers = visitor.node_markers;
    if !visitor.package_markers.is_empty() {
        node_markers.insert(file.root(), visitor.package_markers.clone());
    }
    FileMarkers {
        package_markers: visitor.package_markers,
        node_markers,
    }
}

struct Visitor<'a> {
    comments: &'a [CommentGroup],
    next_comment_index: usize,

    package_markers: Vec<MarkerComment>,
    declaration_markers: Vec<MarkerComment>,
    node_markers: HashMap<NodeId, Vec<MarkerComment>>,
}

impl<'a> Visitor<'a> {
    fn new(comments: &'a [CommentGroup]) -> Self {
        Self {
            comments,
            next_comment_index: 0,
            package_markers: Vec::new(),
            declaration_markers: Vec::new(),
            node_markers: HashMap::new(),
        }
    }

    fn visit(&mut self, file: &SourceFile, id: NodeId) {
        let node = file.node(id);
        let (from_comment, from_document) = self.pending_markers(node);

        match node.kind {
            NodeKind::File => {
                self.package_markers.extend(from_comment);
                self.package_markers.extend(from_document);
            }
            NodeKind::GenDecl => {
                self.declaration_markers.extend(from_comment);
                self.declaration_markers.extend(from_document);
            }
            NodeKind::TypeSpec(_) => {
                let pending = std::mem::take(&mut self.declaration_markers);
                if !(pending.is_empty() && from_comment.is_empty() && from_document.is_empty()) {
                    let entry = self.node_markers.entry(id).or_default();
                    entry.extend(pending);
                    entry.extend(from_comment);
                    entry.extend(from_document);
                }
            }
            NodeKind::Field { .. } | NodeKind::FuncDecl { .. } => {
                if !(from_comment.is_empty() && from_document.is_empty()) {
                    let entry = self.node_markers.entry(id).or_default();
                    entry.extend(from_comment);
                    entry.extend(from_document);
                }
            }
            // consumes its comment range, carries nothing
            NodeKind::Block => {}
        }

        for child in &node.children {
            self.visit(file, *child);
        }
    }

    /// Split the comments between the cursor and `node` into the group
    /// immediately preceding the node's doc group and the doc group
    /// itself, advancing the cursor past all of them.
    ///
    /// Floating groups further up are consumed without attribution.
    fn pending_markers(&mut self, node: &Node) -> (Vec<MarkerComment>, Vec<MarkerComment>) {
        let next = self.next_comment_index;
        let mut last = next;
        while last < self.comments.len() && self.comments[last].position() < node.position {
            last += 1;
        }

        // index of the group right before the node, stepping over the
        // doc group when the node has one
        let mut marker_index = last as isize - 1;
        if let Some(doc) = node.doc {
            if marker_index >= 0 && marker_index as usize == doc {
                marker_index -= 1;
            }
        }

        let from_comment = if marker_index >= next as isize {
            self.markers_in(marker_index as usize, marker_index as usize + 1)
        } else {
            Vec::new()
        };
        // the doc group may already have been consumed at an enclosing
        // node, hence the clamp to the cursor
        let doc_start = ((marker_index + 1).max(next as isize)) as usize;
        let from_document = self.markers_in(doc_start, last);

        self.next_comment_index = last;
        (from_comment, from_document)
    }

    fn markers_in(&self, start: usize, end: usize) -> Vec<MarkerComment> {
        if start >= end {
            return Vec::new();
        }
        self.comments[start..end]
            .iter()
            .flat_map(|group| group.comments.iter())
            .filter_map(|comment| {
                comment.marker_text().map(|text| MarkerComment {
                    text: text.to_string(),
                    position: comment.position,
                })
            })
            .collect()
    }
}
