//! markers-go - Go host-syntax adapter for `markers-core`.
//!
//! Parses Go source text with tree-sitter and builds the abstract
//! [`Package`] model the marker collector consumes: comment groups in
//! source order, doc-comment association, and the declaration nodes
//! that can carry markers (the file, declaration blocks, type specs,
//! fields and interface members, functions and methods).
//!
//! No file system access happens here; sources arrive as strings, the
//! way an external build tool would hand them over:
//!
//! ```
//! use markers_go::GoSources;
//!
//! let pkg = GoSources::new("demo")
//!     .add("demo.go", "// +group:version=v1\npackage demo\n")
//!     .parse()
//!     .unwrap();
//! assert_eq!(pkg.files.len(), 1);
//! ```

use eyre::{bail, Result};
use markers_core::{
    Comment, CommentGroup, Node, NodeId, NodeKind, Package, Position, SourceFile, TypeForm,
};
use std::path::PathBuf;
use tree_sitter::{Node as SyntaxNode, Parser};

/// In-memory Go sources, parsed together into one [`Package`].
pub struct GoSources {
    name: String,
    files: Vec<(PathBuf, String)>,
}

impl GoSources {
    /// Create empty sources for a package named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    /// Add a file with content.
    pub fn add(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    /// Parse every file into the abstract package model.
    pub fn parse(self) -> Result<Package> {
        let mut pkg = Package::new(self.name);
        for (path, content) in self.files {
            pkg.add_file(parse_file(path, &content)?);
        }
        Ok(pkg)
    }
}

/// Parse one Go source file into the abstract model.
pub fn parse_file(path: impl Into<PathBuf>, source: &str) -> Result<SourceFile> {
    let path = path.into();

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .expect("Failed to load Go grammar");
    let Some(tree) = parser.parse(source, None) else {
        bail!("failed to parse {}", path.display());
    };
    let root = tree.root_node();

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(source.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    let mut comments = Vec::new();
    collect_comments(root, &mut comments);
    let groups = group_comments(source, &line_starts, &comments);

    let mut file = SourceFile::new(path);
    for group in &groups {
        file.push_comment_group(group.group.clone());
    }

    let builder = FileBuilder { source, groups };
    builder.build(root, &mut file);
    Ok(file)
}

/// A comment group plus the layout facts doc association needs.
struct GroupInfo {
    group: CommentGroup,
    end_line: usize,
    end_byte: usize,
    /// The group's first comment has nothing but whitespace before it
    /// on its line; trailing comments never become doc comments.
    own_line: bool,
}

fn collect_comments<'tree>(node: SyntaxNode<'tree>, out: &mut Vec<SyntaxNode<'tree>>) {
    if node.kind() == "comment" {
        out.push(node);
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_comments(child, out);
    }
}

/// Group consecutive comments: members may be separated by at most one
/// newline and nothing but whitespace.
fn group_comments(
    source: &str,
    line_starts: &[usize],
    comments: &[SyntaxNode],
) -> Vec<GroupInfo> {
    let mut groups: Vec<GroupInfo> = Vec::new();
    for node in comments {
        let comment = Comment::new(&source[node.byte_range()], start_position(*node));
        let end_line = node.end_position().row + 1;
        let end_byte = node.end_byte();

        let continues = groups.last().is_some_and(|prev| {
            let between = &source[prev.end_byte..node.start_byte()];
            between.chars().all(char::is_whitespace) && between.matches('\n').count() <= 1
        });
        if continues {
            let last = groups.last_mut().expect("continues implies a previous group");
            last.group.comments.push(comment);
            last.end_line = end_line;
            last.end_byte = end_byte;
        } else {
            let row = node.start_position().row;
            let own_line = line_starts
                .get(row)
                .is_some_and(|&start| source[start..node.start_byte()].trim().is_empty());
            groups.push(GroupInfo {
                group: CommentGroup::new(vec![comment]),
                end_line,
                end_byte,
                own_line,
            });
        }
    }
    groups
}

struct FileBuilder<'s> {
    source: &'s str,
    groups: Vec<GroupInfo>,
}

impl FileBuilder<'_> {
    fn build(&self, root: SyntaxNode, file: &mut SourceFile) {
        let file_id = file.root();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "package_clause" => {
                    let node = file.node_mut(file_id);
                    node.position = start_position(child);
                    node.doc = self.doc_for(child);
                }
                "type_declaration" => self.build_type_declaration(child, file, file_id),
                "import_declaration" | "const_declaration" | "var_declaration" => {
                    self.add_node(file, file_id, NodeKind::GenDecl, child);
                }
                "function_declaration" => {
                    let id = self.add_node(
                        file,
                        file_id,
                        NodeKind::FuncDecl { receiver: false },
                        child,
                    );
                    self.add_body_barrier(file, id, child);
                }
                "method_declaration" => {
                    let id = self.add_node(
                        file,
                        file_id,
                        NodeKind::FuncDecl { receiver: true },
                        child,
                    );
                    self.add_body_barrier(file, id, child);
                }
                _ => {}
            }
        }
    }

    fn build_type_declaration(&self, decl: SyntaxNode, file: &mut SourceFile, parent: NodeId) {
        let decl_id = self.add_node(file, parent, NodeKind::GenDecl, decl);
        let mut cursor = decl.walk();
        for spec in decl.children(&mut cursor) {
            match spec.kind() {
                "type_spec" => {
                    let type_node = spec.child_by_field_name("type");
                    let form = match type_node.map(|t| t.kind()) {
                        Some("struct_type") => TypeForm::Struct,
                        Some("interface_type") => TypeForm::Interface,
                        _ => TypeForm::Other,
                    };
                    let spec_id = self.add_node(file, decl_id, NodeKind::TypeSpec(form), spec);
                    match (form, type_node) {
                        (TypeForm::Struct, Some(ty)) => self.build_struct_fields(ty, file, spec_id),
                        (TypeForm::Interface, Some(ty)) => {
                            self.build_interface_members(ty, file, spec_id)
                        }
                        _ => {}
                    }
                }
                "type_alias" => {
                    self.add_node(file, decl_id, NodeKind::TypeSpec(TypeForm::Alias), spec);
                }
                _ => {}
            }
        }
    }

    fn build_struct_fields(&self, struct_type: SyntaxNode, file: &mut SourceFile, parent: NodeId) {
        let mut cursor = struct_type.walk();
        for child in struct_type.children(&mut cursor) {
            if child.kind() != "field_declaration_list" {
                continue;
            }
            let mut fields = child.walk();
            for field in child.children(&mut fields) {
                if field.kind() != "field_declaration" {
                    continue;
                }
                let func_type = field
                    .child_by_field_name("type")
                    .is_some_and(|ty| ty.kind() == "function_type");
                self.add_node(file, parent, NodeKind::Field { func_type }, field);
            }
        }
    }

    fn build_interface_members(
        &self,
        interface_type: SyntaxNode,
        file: &mut SourceFile,
        parent: NodeId,
    ) {
        let mut cursor = interface_type.walk();
        for member in interface_type.children(&mut cursor) {
            match member.kind() {
                // the grammar renamed method_spec to method_elem; accept both
                "method_spec" | "method_elem" => {
                    self.add_node(file, parent, NodeKind::Field { func_type: true }, member);
                }
                // embedded interfaces and type constraints
                "type_elem" | "constraint_elem" | "type_identifier" | "qualified_type"
                | "interface_type_name" => {
                    self.add_node(file, parent, NodeKind::Field { func_type: false }, member);
                }
                _ => {}
            }
        }
    }

    /// Function bodies cannot carry markers, but their comments must
    /// still advance the pairing cursor; a block node at the closing
    /// brace swallows them.
    fn add_body_barrier(&self, file: &mut SourceFile, parent: NodeId, decl: SyntaxNode) {
        if let Some(body) = decl.child_by_field_name("body") {
            let position = Position::new(
                body.end_byte(),
                body.end_position().row + 1,
                body.end_position().column + 1,
            );
            file.add_node(parent, Node::new(NodeKind::Block, position));
        }
    }

    fn add_node(
        &self,
        file: &mut SourceFile,
        parent: NodeId,
        kind: NodeKind,
        node: SyntaxNode,
    ) -> NodeId {
        let mut built = Node::new(kind, start_position(node));
        if let Some(name) = node.child_by_field_name("name") {
            built = built.with_name(&self.source[name.byte_range()]);
        }
        built.doc = self.doc_for(node);
        file.add_node(parent, built)
    }

    /// The node's doc group: an own-line group ending on the line
    /// immediately above the node.
    fn doc_for(&self, node: SyntaxNode) -> Option<usize> {
        let line = node.start_position().row + 1;
        let byte = node.start_byte();
        self.groups
            .iter()
            .position(|g| g.own_line && g.end_byte <= byte && g.end_line + 1 == line)
    }
}

fn start_position(node: SyntaxNode) -> Position {
    Position::new(
        node.start_byte(),
        node.start_position().row + 1,
        node.start_position().column + 1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use markers_core::NodeKind;

    fn parse(source: &str) -> SourceFile {
        parse_file("test.go", source).unwrap()
    }

    #[test]
    fn groups_adjacent_comments() {
        let file = parse(
            "package demo\n\n// one\n// two\n\n// three\ntype T struct{}\n",
        );
        let groups = file.comments();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].comments.len(), 2);
        assert_eq!(groups[1].comments.len(), 1);
        assert_eq!(groups[0].comments[0].content(), "one");
        assert_eq!(groups[1].comments[0].content(), "three");
    }

    #[test]
    fn code_between_comments_splits_groups() {
        let file = parse("package demo\n\n// a\nvar x = 1\n\n// b\nvar y = 2\n");
        assert_eq!(file.comments().len(), 2);
    }

    #[test]
    fn file_position_is_the_package_keyword() {
        let file = parse("// doc\npackage demo\n");
        let root = file.node(file.root());
        assert_eq!(root.position.line, 2);
        assert_eq!(root.doc, Some(0));
    }

    #[test]
    fn blank_line_breaks_doc_association() {
        let file = parse("// floating\n\npackage demo\n");
        assert_eq!(file.node(file.root()).doc, None);
    }

    #[test]
    fn trailing_comments_are_not_docs() {
        let file = parse("package demo\n\nvar x = 1 // trailing\ntype T struct{}\n");
        let spec = file.find_node("T").unwrap();
        assert_eq!(file.node(spec).doc, None);
    }

    #[test]
    fn builds_struct_fields() {
        let file = parse(
            "package demo\n\ntype User struct {\n\tName string\n\tOnClose func()\n}\n",
        );
        let spec = file.find_node("User").unwrap();
        assert_eq!(
            file.node(spec).kind,
            NodeKind::TypeSpec(TypeForm::Struct)
        );
        let name = file.find_node("Name").unwrap();
        assert_eq!(file.node(name).kind, NodeKind::Field { func_type: false });
        let on_close = file.find_node("OnClose").unwrap();
        assert_eq!(
            file.node(on_close).kind,
            NodeKind::Field { func_type: true }
        );
        assert_eq!(file.node(spec).children, vec![name, on_close]);
    }

    #[test]
    fn builds_interface_members() {
        let file = parse(
            "package demo\n\ntype Store interface {\n\tSave(u string) error\n}\n",
        );
        let spec = file.find_node("Store").unwrap();
        assert_eq!(
            file.node(spec).kind,
            NodeKind::TypeSpec(TypeForm::Interface)
        );
        let save = file.find_node("Save").unwrap();
        assert_eq!(file.node(save).kind, NodeKind::Field { func_type: true });
    }

    #[test]
    fn distinguishes_functions_and_methods() {
        let file = parse(
            "package demo\n\nfunc Run() {}\n\nfunc (s *Store) Save() {}\n",
        );
        let run = file.find_node("Run").unwrap();
        assert_eq!(
            file.node(run).kind,
            NodeKind::FuncDecl { receiver: false }
        );
        let save = file.find_node("Save").unwrap();
        assert_eq!(file.node(save).kind, NodeKind::FuncDecl { receiver: true });
        // each function body ends with a comment barrier
        assert_eq!(file.node(run).children.len(), 1);
        assert_eq!(
            file.node(file.node(run).children[0]).kind,
            NodeKind::Block
        );
    }

    #[test]
    fn type_alias_form() {
        let file = parse("package demo\n\ntype ID = string\n");
        let spec = file.find_node("ID").unwrap();
        assert_eq!(file.node(spec).kind, NodeKind::TypeSpec(TypeForm::Alias));
    }

    #[test]
    fn doc_groups_attach_to_fields() {
        let file = parse(
            "package demo\n\ntype User struct {\n\t// +required\n\tName string\n}\n",
        );
        let name = file.find_node("Name").unwrap();
        let doc = file.node(name).doc.expect("field has a doc group");
        assert_eq!(file.comments()[doc].comments[0].content(), "+required");
    }
}
