//! Top-level driver: collect marker values for every node of a package.
//!
//! Runs attribution over each file, resolves `+import` markers first
//! (they alias marker names from external processor packages into the
//! file), then parses every remaining marker through the registry,
//! keeping only those whose definition may attach at the node's level.
//! Bad markers are recorded with their source position and skipped; the
//! result always contains every marker that did parse.

use crate::error::{ErrorList, ParseError};
use crate::registry::{marker_name, ImportMarker, MarkerValue, Registry};
use crate::syntax::{Node, NodeKind, NodeRef, Package, TypeForm};
use crate::visitor::{collect_file_markers, MarkerComment};
use crate::Level;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Marker name to the ordered values parsed for that name on one node.
pub type MarkerValues = HashMap<String, Vec<MarkerValue>>;

/// Per-file map from import alias to canonical marker-name prefix.
pub type AliasMap = HashMap<String, String>;

/// Everything collected from one package.
#[derive(Debug, Default)]
pub struct Collected {
    /// Parsed marker values per node; file nodes carry the package
    /// markers
    pub node_markers: HashMap<NodeRef, MarkerValues>,
    /// Every marker that failed to parse or validate
    pub errors: ErrorList,
}

impl Collected {
    /// Values of one marker name on one node.
    pub fn markers_at<'a>(&'a self, node: NodeRef, name: &str) -> &'a [MarkerValue] {
        self.node_markers
            .get(&node)
            .and_then(|values| values.get(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Collects markers for whole packages against one registry.
pub struct Collector {
    registry: Registry,
}

impl Collector {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Collect every marker of `pkg`.
    pub fn collect(&self, pkg: &Package) -> Collected {
        let mut errors = ErrorList::new();

        // attribution; BTreeMap keeps everything in file/source order so
        // error output and alias resolution are deterministic
        let mut node_comments: BTreeMap<NodeRef, Vec<MarkerComment>> = BTreeMap::new();
        for (file_index, file) in pkg.files.iter().enumerate() {
            let file_markers = collect_file_markers(file);
            for (node, markers) in file_markers.node_markers {
                node_comments
                    .entry(NodeRef {
                        file: file_index,
                        node,
                    })
                    .or_default()
                    .extend(markers);
            }
        }

        let imports = self.parse_import_markers(pkg, &node_comments, &mut errors);
        let (file_aliases, import_markers) =
            self.extract_file_import_aliases(pkg, &imports, &mut errors);

        let mut node_markers: HashMap<NodeRef, MarkerValues> = HashMap::new();
        for (node_ref, values) in imports.node_values {
            node_markers.insert(node_ref, values);
        }

        for (node_ref, comments) in &node_comments {
            let file = &pkg.files[node_ref.file];
            let node = file.node(node_ref.node);
            let aliases = file_aliases.get(&node_ref.file);
            let mut marker_values: MarkerValues = HashMap::new();

            for comment in comments {
                let alias = alias_prefix(&comment.text);
                let mut marker_text = comment.text.clone();
                let mut pkg_id = "";
                if let Some(canonical) = aliases.and_then(|map| map.get(alias)) {
                    if canonical.as_str() != alias {
                        debug!(alias = %alias, canonical = %canonical, "rewriting marker alias");
                        marker_text = marker_text.replacen(
                            &format!("+{alias}"),
                            &format!("+{canonical}"),
                            1,
                        );
                    }
                    pkg_id = import_markers
                        .get(alias)
                        .map(|import| import.pkg_id.as_str())
                        .unwrap_or_default();
                }

                let Some(definition) = self.registry.lookup(&marker_text, pkg_id) else {
                    debug!(marker = %comment.text, "no definition for marker");
                    continue;
                };
                if definition.is_import() {
                    // already handled by the pre-pass
                    continue;
                }

                let Some(required) = required_level(node) else {
                    continue;
                };
                if !definition.level().intersects(required) {
                    debug!(
                        marker = %comment.text,
                        level = ?definition.level(),
                        required = ?required,
                        "marker may not attach here"
                    );
                    continue;
                }

                match definition.parse(&marker_text) {
                    Ok(value) => marker_values
                        .entry(definition.name().to_string())
                        .or_default()
                        .push(value),
                    Err(err) => errors.push(ParseError::new(
                        file.path.clone(),
                        comment.position,
                        comment.text.clone(),
                        err.message,
                    )),
                }
            }

            if !marker_values.is_empty() {
                let entry = node_markers.entry(*node_ref).or_default();
                for (name, mut values) in marker_values {
                    entry.entry(name).or_default().append(&mut values);
                }
            }
        }

        Collected {
            node_markers,
            errors,
        }
    }

    /// Parse every `+import` marker up front, wherever it appeared.
    fn parse_import_markers(
        &self,
        pkg: &Package,
        node_comments: &BTreeMap<NodeRef, Vec<MarkerComment>>,
        errors: &mut ErrorList,
    ) -> ImportPass {
        let mut pass = ImportPass::default();

        for (node_ref, comments) in node_comments {
            for comment in comments {
                let Some(definition) = self.registry.lookup(&comment.text, "") else {
                    continue;
                };
                if !definition.is_import() {
                    continue;
                }

                let file = &pkg.files[node_ref.file];
                match definition.parse(&comment.text) {
                    Ok(value) => {
                        match ImportMarker::from_marker_value(&value) {
                            Ok(import) => pass
                                .file_imports
                                .entry(node_ref.file)
                                .or_default()
                                .push((comment.clone(), import)),
                            Err(message) => {
                                errors.push(ParseError::new(
                                    file.path.clone(),
                                    comment.position,
                                    comment.text.clone(),
                                    message,
                                ));
                                continue;
                            }
                        }
                        pass.node_values
                            .entry(*node_ref)
                            .or_default()
                            .entry(definition.name().to_string())
                            .or_default()
                            .push(value);
                    }
                    Err(err) => errors.push(ParseError::new(
                        file.path.clone(),
                        comment.position,
                        comment.text.clone(),
                        err.message,
                    )),
                }
            }
        }
        pass
    }

    /// Build each file's alias map. A package imported twice in one
    /// file is an error; the duplicate is skipped.
    fn extract_file_import_aliases(
        &self,
        pkg: &Package,
        imports: &ImportPass,
        errors: &mut ErrorList,
    ) -> (HashMap<usize, AliasMap>, HashMap<String, ImportMarker>) {
        let mut file_aliases: HashMap<usize, AliasMap> = HashMap::new();
        let mut import_markers: HashMap<String, ImportMarker> = HashMap::new();

        for (&file_index, imports) in &imports.file_imports {
            let file = &pkg.files[file_index];
            let alias_map = file_aliases.entry(file_index).or_default();
            let mut seen_pkgs: HashSet<&str> = HashSet::new();

            for (comment, import) in imports {
                if !seen_pkgs.insert(&import.pkg_id) {
                    errors.push(ParseError::new(
                        file.path.clone(),
                        comment.position,
                        comment.text.clone(),
                        format!(
                            "processor package '{}' has already been imported",
                            import.pkg_id
                        ),
                    ));
                    continue;
                }
                let alias = import.alias_or_value().to_string();
                alias_map.insert(alias.clone(), import.value.clone());
                import_markers.insert(alias, import.clone());
            }
        }
        (file_aliases, import_markers)
    }
}

#[derive(Debug, Default)]
struct ImportPass {
    /// Parsed import marker values per node, for the result map
    node_values: HashMap<NodeRef, MarkerValues>,
    /// Typed import markers per file, in source order
    file_imports: BTreeMap<usize, Vec<(MarkerComment, ImportMarker)>>,
}

/// The level a definition must carry to attach at `node`.
fn required_level(node: &Node) -> Option<Level> {
    match node.kind {
        NodeKind::File => Some(Level::PACKAGE),
        NodeKind::GenDecl => Some(Level::IMPORT),
        NodeKind::TypeSpec(TypeForm::Struct) => Some(Level::TYPE | Level::STRUCT_TYPE),
        NodeKind::TypeSpec(TypeForm::Interface) => Some(Level::TYPE | Level::INTERFACE_TYPE),
        NodeKind::TypeSpec(_) => Some(Level::TYPE),
        NodeKind::Field { func_type: false } => Some(Level::FIELD),
        NodeKind::Field { func_type: true } => Some(Level::METHOD | Level::INTERFACE_METHOD),
        NodeKind::FuncDecl { receiver: true } => Some(Level::METHOD | Level::STRUCT_METHOD),
        NodeKind::FuncDecl { receiver: false } => Some(Level::FUNCTION),
        NodeKind::Block => None,
    }
}

/// First segment of the marker name: the candidate import alias.
fn alias_prefix(marker_text: &str) -> &str {
    let name = marker_name(marker_text).unwrap_or_default();
    let name = name.split(':').next().unwrap_or(name);
    name.split_whitespace().next().unwrap_or(name)
}
