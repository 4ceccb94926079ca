//! End-to-end tests: Go source text in, attributed marker values out.

use markers_core::{
    ArgumentTypeInfo, Collected, Collector, Definition, ImportMarker, Level, NodeRef, Registry,
    Value,
};
use markers_go::GoSources;

fn base_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            Definition::builder("group:version", Level::PACKAGE)
                .value_field("version", ArgumentTypeInfo::string())
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(Definition::builder("deprecated", Level::TYPE).build().unwrap())
        .unwrap();
    registry
        .register(Definition::builder("jsonTag", Level::TYPE).build().unwrap())
        .unwrap();
    registry
        .register(
            Definition::builder("cfg", Level::TYPE)
                .field("Data", ArgumentTypeInfo::any())
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            Definition::builder("async", Level::FUNCTION)
                .value_field("Enabled", ArgumentTypeInfo::boolean())
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            Definition::builder("transactional", Level::METHOD)
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
}

fn collect(registry: Registry, source: &str) -> (Collected, markers_core::Package) {
    let pkg = GoSources::new("demo")
        .add("demo.go", source)
        .parse()
        .expect("source parses");
    let collected = Collector::new(registry).collect(&pkg);
    (collected, pkg)
}

#[test]
fn package_marker_attaches_to_the_file_node() {
    let (collected, _pkg) = collect(
        base_registry(),
        "// +group:version=v1alpha1\npackage demo\n",
    );
    assert!(collected.errors.is_empty(), "{}", collected.errors);

    let file_node = NodeRef { file: 0, node: 0 };
    let values = collected.markers_at(file_node, "group:version");
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].get("version").unwrap().as_str(), Some("v1alpha1"));
}

#[test]
fn doc_text_never_becomes_a_marker() {
    let source = r#"package demo

// +deprecated
// This type is old.
type Foo struct{}
"#;
    let (collected, pkg) = collect(base_registry(), source);
    assert!(collected.errors.is_empty(), "{}", collected.errors);

    let foo = pkg.find_node("Foo").unwrap();
    assert_eq!(collected.markers_at(foo, "deprecated").len(), 1);

    // nothing but the marker survives; the prose line is ignored
    let all: usize = collected.node_markers[&foo].values().map(Vec::len).sum();
    assert_eq!(all, 1);
}

#[test]
fn declaration_markers_propagate_to_the_first_spec_only() {
    let source = r#"package demo

// +jsonTag
type (
	Bar struct{}
	Baz struct{}
)
"#;
    let (collected, pkg) = collect(base_registry(), source);
    assert!(collected.errors.is_empty(), "{}", collected.errors);

    let bar = pkg.find_node("Bar").unwrap();
    let baz = pkg.find_node("Baz").unwrap();
    assert_eq!(collected.markers_at(bar, "jsonTag").len(), 1);
    assert!(collected.markers_at(baz, "jsonTag").is_empty());
}

#[test]
fn import_alias_resolves_external_markers() {
    let mut registry = base_registry();
    registry
        .register_external(
            "example.com/x",
            Definition::builder("validation:required", Level::FIELD)
                .build()
                .unwrap(),
        )
        .unwrap();

    let source = r#"// +import=example.com/x, Alias=v, Value=validation
package demo

type User struct {
	// +v:required
	Name string
}
"#;
    let (collected, pkg) = collect(registry, source);
    assert!(collected.errors.is_empty(), "{}", collected.errors);

    let name = pkg.find_node("Name").unwrap();
    assert_eq!(collected.markers_at(name, "validation:required").len(), 1);

    // the import marker itself surfaces on the file node
    let imports = collected.markers_at(NodeRef { file: 0, node: 0 }, "import");
    assert_eq!(imports.len(), 1);
    let import = ImportMarker::from_marker_value(&imports[0]).unwrap();
    assert_eq!(import.pkg_id, "example.com/x");
    assert_eq!(import.alias_or_value(), "v");
}

#[test]
fn any_typed_field_infers_a_nested_map() {
    let source = r#"package demo

// +cfg:Data={a: 1, b: "x", c: {d: true}}
type Conf struct{}
"#;
    let (collected, pkg) = collect(base_registry(), source);
    assert!(collected.errors.is_empty(), "{}", collected.errors);

    let conf = pkg.find_node("Conf").unwrap();
    let values = collected.markers_at(conf, "cfg");
    assert_eq!(values.len(), 1);

    let data = values[0].get("Data").unwrap().as_map().unwrap();
    assert_eq!(data["a"], Value::Int(1));
    assert_eq!(data["b"], Value::String("x".into()));
    let nested = data["c"].as_map().unwrap();
    assert_eq!(nested["d"], Value::Bool(true));
}

#[test]
fn bad_markers_are_reported_and_good_ones_survive() {
    let source = r#"package demo

// +async=maybe
func Bad() {}

// +async=nope
func Bad2() {}

// +async=true
func Good() {}
"#;
    let (collected, pkg) = collect(base_registry(), source);

    assert_eq!(collected.errors.len(), 2);
    let mut lines: Vec<usize> = collected
        .errors
        .iter()
        .map(|error| {
            assert_eq!(error.file, std::path::PathBuf::from("demo.go"));
            assert!(
                error.message.contains("expected true or false"),
                "unexpected message: {}",
                error.message
            );
            assert!(error.position.column >= 1);
            error.position.line
        })
        .collect();
    lines.sort_unstable();
    assert_eq!(lines, vec![3, 6]);

    let good = pkg.find_node("Good").unwrap();
    assert_eq!(collected.markers_at(good, "async").len(), 1);
    assert_eq!(
        collected.markers_at(good, "async")[0]
            .get("Enabled")
            .unwrap()
            .as_bool(),
        Some(true)
    );
    let bad = pkg.find_node("Bad").unwrap();
    assert!(collected.markers_at(bad, "async").is_empty());
}

#[test]
fn markers_inside_function_bodies_do_not_leak() {
    let source = r#"package demo

func Run() {
	// +deprecated
	_ = 1
}

type T struct{}
"#;
    let (collected, pkg) = collect(base_registry(), source);
    assert!(collected.errors.is_empty(), "{}", collected.errors);

    let t = pkg.find_node("T").unwrap();
    assert!(collected.markers_at(t, "deprecated").is_empty());
    let run = pkg.find_node("Run").unwrap();
    assert!(collected.markers_at(run, "deprecated").is_empty());
}

#[test]
fn method_markers_attach_in_interfaces_and_on_receivers() {
    let source = r#"package demo

type Store interface {
	// +transactional
	Save(name string) error
}

// +transactional
func (s *Store) SaveAll() {}
"#;
    let (collected, pkg) = collect(base_registry(), source);
    assert!(collected.errors.is_empty(), "{}", collected.errors);

    let save = pkg.find_node("Save").unwrap();
    assert_eq!(collected.markers_at(save, "transactional").len(), 1);
    let save_all = pkg.find_node("SaveAll").unwrap();
    assert_eq!(collected.markers_at(save_all, "transactional").len(), 1);
}

#[test]
fn level_mismatch_drops_without_blocking_neighbors() {
    // +async cannot attach to a type; +deprecated still lands
    let source = r#"package demo

// +async=true
// +deprecated
type Foo struct{}
"#;
    let (collected, pkg) = collect(base_registry(), source);
    assert!(collected.errors.is_empty(), "{}", collected.errors);

    let foo = pkg.find_node("Foo").unwrap();
    assert_eq!(collected.markers_at(foo, "deprecated").len(), 1);
    assert!(collected.markers_at(foo, "async").is_empty());
}

#[test]
fn aliases_do_not_cross_files() {
    let mut registry = Registry::new();
    registry
        .register_external(
            "example.com/x",
            Definition::builder("validation:required", Level::FIELD)
                .build()
                .unwrap(),
        )
        .unwrap();

    let with_import = r#"// +import=example.com/x, Value=validation
package demo
"#;
    let without_import = r#"package demo

type User struct {
	// +validation:required
	Name string
}
"#;
    let pkg = GoSources::new("demo")
        .add("a.go", with_import)
        .add("b.go", without_import)
        .parse()
        .unwrap();
    let collected = Collector::new(registry).collect(&pkg);
    assert!(collected.errors.is_empty());

    // b.go never imported the package, so the marker stays unresolved
    let name = pkg.find_node("Name").unwrap();
    assert_eq!(name.file, 1);
    assert!(collected.markers_at(name, "validation:required").is_empty());
}

#[test]
fn duplicate_import_of_a_package_is_reported() {
    let source = r#"// +import=example.com/x, Alias=v, Value=validation
// +import=example.com/x, Alias=w, Value=validation
package demo
"#;
    let (collected, _pkg) = collect(Registry::new(), source);
    assert_eq!(collected.errors.len(), 1);
    let error = collected.errors.iter().next().unwrap();
    assert!(error
        .message
        .contains("'example.com/x' has already been imported"));
}

#[test]
fn repeated_markers_accumulate_in_order() {
    let mut registry = Registry::new();
    registry
        .register(
            Definition::builder("tag", Level::TYPE)
                .value_field("Name", ArgumentTypeInfo::string())
                .build()
                .unwrap(),
        )
        .unwrap();

    let source = r#"package demo

// +tag=one
// +tag=two
type Foo struct{}
"#;
    let (collected, pkg) = collect(registry, source);
    assert!(collected.errors.is_empty(), "{}", collected.errors);

    let foo = pkg.find_node("Foo").unwrap();
    let tags: Vec<_> = collected
        .markers_at(foo, "tag")
        .iter()
        .map(|v| v.get("Name").unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(tags, vec!["one", "two"]);
}
