//! Abstract host-language syntax model.
//!
//! The engine does not parse the host language itself. A loader (for Go
//! sources, the `markers-go` crate) supplies a [`Package`] of
//! [`SourceFile`]s whose comment groups and declarations are already
//! arranged in source order. Only the node kinds that can carry or
//! route markers are modeled; everything position-like is byte offsets
//! plus 1-indexed line/column.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A location in a source file.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    /// Byte offset from the start of the file
    pub offset: usize,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

/// A single comment, raw text included (`//` / `/* */` leaders kept).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub text: String,
    pub position: Position,
}

impl Comment {
    pub fn new(text: impl Into<String>, position: Position) -> Self {
        Self {
            text: text.into(),
            position,
        }
    }

    /// Comment content with the leader and surrounding whitespace
    /// stripped.
    pub fn content(&self) -> &str {
        let text = self.text.trim();
        if let Some(rest) = text.strip_prefix("//") {
            rest.trim()
        } else if let Some(rest) = text.strip_prefix("/*") {
            rest.strip_suffix("*/").unwrap_or(rest).trim()
        } else {
            text
        }
    }

    /// The marker text (`+name...`) when this is a marker comment.
    pub fn marker_text(&self) -> Option<&str> {
        let content = self.content();
        content.starts_with('+').then_some(content)
    }
}

/// A run of comments with nothing but at most one newline between its
/// members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommentGroup {
    pub comments: Vec<Comment>,
}

impl CommentGroup {
    pub fn new(comments: Vec<Comment>) -> Self {
        Self { comments }
    }

    /// Position of the group's first comment.
    pub fn position(&self) -> Position {
        self.comments
            .first()
            .map(|c| c.position)
            .unwrap_or_default()
    }
}

/// What a type declaration declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeForm {
    Struct,
    Interface,
    Alias,
    Other,
}

/// The kind of a syntax node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A whole source file; markers attributed here are package level
    File,
    /// A declaration block (`type (...)`, `import (...)`, ...) possibly
    /// holding several specs; markers here pend for the first enclosed
    /// type spec
    GenDecl,
    /// A single type declaration
    TypeSpec(TypeForm),
    /// A struct field or interface member; `func_type` marks
    /// function-typed members (interface methods, function fields)
    Field { func_type: bool },
    /// A function or method declaration
    FuncDecl { receiver: bool },
    /// A non-attributable span (a function body): consumes comment
    /// positions, never carries markers
    Block,
}

/// Index of a node within its file's arena.
pub type NodeId = usize;

/// Package-wide node address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeRef {
    /// Index of the file within the package
    pub file: usize,
    /// Index of the node within the file
    pub node: NodeId,
}

/// One syntax node.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub position: Position,
    /// Declared name, when the node has one
    pub name: Option<String>,
    /// Index of the node's doc comment group within the file's groups
    pub doc: Option<usize>,
    /// Children in source order
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind, position: Position) -> Self {
        Self {
            kind,
            position,
            name: None,
            doc: None,
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_doc(mut self, group: usize) -> Self {
        self.doc = Some(group);
        self
    }
}

/// One parsed source file: ordered comment groups plus a node arena
/// rooted at the file node (always id 0).
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    comments: Vec<CommentGroup>,
    nodes: Vec<Node>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            comments: Vec::new(),
            nodes: vec![Node::new(NodeKind::File, Position::default())],
        }
    }

    /// Id of the file node.
    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// All nodes with their ids, in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate()
    }

    /// Append a node under `parent`, returning its id.
    pub fn add_node(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    /// Comment groups in source order.
    pub fn comments(&self) -> &[CommentGroup] {
        &self.comments
    }

    /// Append a comment group; groups must arrive in source order.
    pub fn push_comment_group(&mut self, group: CommentGroup) -> usize {
        self.comments.push(group);
        self.comments.len() - 1
    }

    /// Find a node by name and kind, mostly a test convenience.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.name.as_deref() == Some(name))
    }
}

/// A set of files analyzed together.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub files: Vec<SourceFile>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, file: SourceFile) {
        self.files.push(file);
    }

    pub fn resolve(&self, node: NodeRef) -> Option<&Node> {
        let file = self.files.get(node.file)?;
        (node.node < file.nodes.len()).then(|| file.node(node.node))
    }

    /// Find `name` across all files, as a [`NodeRef`].
    pub fn find_node(&self, name: &str) -> Option<NodeRef> {
        self.files.iter().enumerate().find_map(|(file, f)| {
            f.find_node(name).map(|node| NodeRef { file, node })
        })
    }
}
