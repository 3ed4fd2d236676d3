use serde_json::json;
use synctree_core::{
    generate_patch, FieldDescriptor, NodeSchema, PatchOp, SchemaRegistry, Store,
};

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register("Inner", NodeSchema::new().field("foo", FieldDescriptor::scalar()));
    registry.register(
        "Outer",
        NodeSchema::new()
            .field("foo", FieldDescriptor::scalar())
            .field("bar", FieldDescriptor::scalar())
            .field("baz", FieldDescriptor::scalar())
            .field("test", FieldDescriptor::object("Inner"))
            .field(
                "tests",
                FieldDescriptor::collection(FieldDescriptor::object("Inner")),
            )
            .field(
                "strings",
                FieldDescriptor::collection(FieldDescriptor::scalar()),
            ),
    );
    registry
}

fn outer_snapshot() -> serde_json::Value {
    json!({
        "foo": 30,
        "baz": "coucou",
        "test": { "foo": "string" },
        "tests": [ { "foo": "bar" } ],
        "strings": [ "foo", "bar" ],
    })
}

#[test]
fn fresh_deserialization_yields_empty_patch() {
    let mut store = Store::new(registry());
    let outer = store
        .node_from_snapshot("Outer", &outer_snapshot())
        .expect("snapshot must load");
    let patch = generate_patch(&mut store, outer).expect("generation must succeed");
    assert!(patch.is_empty());
}

#[test]
fn direct_and_child_writes_generate_ordered_operations() {
    let mut store = Store::new(registry());
    let outer = store
        .node_from_snapshot("Outer", &outer_snapshot())
        .expect("snapshot must load");
    let test = store
        .get(outer, "test")
        .expect("field is declared")
        .expect("field is present")
        .as_node()
        .expect("field holds a node");

    store.set(outer, "foo", json!(40)).expect("set must succeed");
    store
        .set(outer, "baz", json!("coucou2"))
        .expect("set must succeed");
    store
        .set(test, "foo", json!("other_string"))
        .expect("set must succeed");

    let patch = generate_patch(&mut store, outer).expect("generation must succeed");
    assert_eq!(
        patch,
        vec![
            PatchOp::add("foo", json!(40)),
            PatchOp::add("baz", json!("coucou2")),
            PatchOp::modify("test", vec![PatchOp::add("foo", json!("other_string"))]),
        ]
    );

    // Dirty sets are drained on read: a second generation is empty.
    let patch = generate_patch(&mut store, outer).expect("generation must succeed");
    assert!(patch.is_empty());
}

#[test]
fn collection_element_mutation_generates_nested_modify() {
    let mut store = Store::new(registry());
    let outer = store
        .node_from_snapshot("Outer", &outer_snapshot())
        .expect("snapshot must load");
    let tests = store
        .get(outer, "tests")
        .expect("field is declared")
        .expect("field is present")
        .as_list()
        .expect("field holds a collection");
    let first = store
        .list_get(tests, 0)
        .expect("element is present")
        .as_node()
        .expect("element is a node");

    store
        .set(first, "foo", json!("other_string"))
        .expect("set must succeed");

    let patch = generate_patch(&mut store, outer).expect("generation must succeed");
    assert_eq!(
        patch,
        vec![PatchOp::modify(
            "tests",
            vec![PatchOp::modify(
                0usize,
                vec![PatchOp::add("foo", json!("other_string"))]
            )]
        )]
    );
}

#[test]
fn scalar_element_overwrite_generates_nested_add() {
    let mut store = Store::new(registry());
    let outer = store
        .node_from_snapshot("Outer", &outer_snapshot())
        .expect("snapshot must load");
    let strings = store
        .get(outer, "strings")
        .expect("field is declared")
        .expect("field is present")
        .as_list()
        .expect("field holds a collection");

    store
        .list_set(strings, 0, json!("other_string"))
        .expect("set must succeed");

    let patch = generate_patch(&mut store, outer).expect("generation must succeed");
    assert_eq!(
        patch,
        vec![PatchOp::modify(
            "strings",
            vec![PatchOp::add(0usize, json!("other_string"))]
        )]
    );
}

#[test]
fn pushed_object_appears_as_add_with_full_snapshot() {
    let mut store = Store::new(registry());
    let outer = store
        .node_from_snapshot("Outer", &outer_snapshot())
        .expect("snapshot must load");
    let tests = store
        .get(outer, "tests")
        .expect("field is declared")
        .expect("field is present")
        .as_list()
        .expect("field holds a collection");

    // Fields written before the node is attached are part of construction,
    // not observable changes.
    let inner = store.create_node("Inner").expect("type is registered");
    store.set(inner, "foo", json!("hello")).expect("set must succeed");
    store.list_push(tests, inner).expect("push must succeed");

    let patch = generate_patch(&mut store, outer).expect("generation must succeed");
    assert_eq!(
        patch,
        vec![PatchOp::modify(
            "tests",
            vec![PatchOp::add(1usize, json!({ "foo": "hello" }))]
        )]
    );
}

#[test]
fn pushed_scalar_appears_as_add() {
    let mut store = Store::new(registry());
    let outer = store
        .node_from_snapshot("Outer", &outer_snapshot())
        .expect("snapshot must load");
    let strings = store
        .get(outer, "strings")
        .expect("field is declared")
        .expect("field is present")
        .as_list()
        .expect("field holds a collection");

    store.list_push(strings, json!("hello")).expect("push must succeed");

    let patch = generate_patch(&mut store, outer).expect("generation must succeed");
    assert_eq!(
        patch,
        vec![PatchOp::modify(
            "strings",
            vec![PatchOp::add(2usize, json!("hello"))]
        )]
    );
}

#[test]
fn push_marks_indices_in_insertion_order() {
    let mut store = Store::new(registry());
    let outer = store
        .node_from_snapshot("Outer", &json!({ "strings": [] }))
        .expect("snapshot must load");
    let strings = store
        .get(outer, "strings")
        .expect("field is declared")
        .expect("field is present")
        .as_list()
        .expect("field holds a collection");

    store
        .list_extend(strings, [json!("a"), json!("b"), json!("c")])
        .expect("extend must succeed");

    let patch = generate_patch(&mut store, strings).expect("generation must succeed");
    assert_eq!(
        patch,
        vec![
            PatchOp::add(0usize, json!("a")),
            PatchOp::add(1usize, json!("b")),
            PatchOp::add(2usize, json!("c")),
        ]
    );
}
