use planner_note_core::{
    Document, Editor, ElementKind, Initializer, LoadableState, ListType, Node, Point, Selection,
    SerializedState, normalize, normalize_str,
};
use serde_json::{Value, json};

fn loaded(raw: &Value) -> Document {
    let mut editor = Editor::with_planner_plugins();
    normalize(raw).load_into(&mut editor);
    editor.doc().clone()
}

#[test]
fn empty_string_loads_one_empty_paragraph() {
    assert_eq!(
        normalize(&json!("")),
        LoadableState::Initializer(Initializer::plain_text(""))
    );
    assert_eq!(loaded(&json!("")).children, vec![Node::paragraph("")]);
}

#[test]
fn empty_root_string_becomes_canonical_empty_state() {
    assert_eq!(
        normalize(&json!(r#"{"root":{"type":"root","children":[]}}"#)),
        LoadableState::Serialized(SerializedState::empty())
    );
}

#[test]
fn empty_root_object_becomes_canonical_empty_state() {
    assert_eq!(
        normalize(&json!({ "root": { "type": "root" } })),
        LoadableState::Serialized(SerializedState::empty())
    );
}

#[test]
fn canonical_object_with_children_is_used_as_is() {
    let raw = json!({
        "root": {
            "type": "root",
            "children": [{ "type": "paragraph", "children": [{ "type": "text", "text": "kept" }] }]
        }
    });

    let LoadableState::Serialized(state) = normalize(&raw) else {
        panic!("expected serialized state");
    };
    assert_eq!(state.as_value(), &raw);
    assert_eq!(loaded(&raw).children, vec![Node::paragraph("kept")]);
}

#[test]
fn legacy_plain_text_is_one_paragraph_verbatim() {
    let raw = json!("Buy milk\n  call mom ");
    assert_eq!(
        normalize(&raw),
        LoadableState::Initializer(Initializer::plain_text("Buy milk\n  call mom "))
    );
    assert_eq!(
        loaded(&raw).children,
        vec![Node::paragraph("Buy milk\n  call mom ")]
    );
}

#[test]
fn json_string_without_canonical_shape_is_plain_text() {
    assert_eq!(
        normalize(&json!("[1,2]")),
        LoadableState::Initializer(Initializer::plain_text("[1,2]"))
    );
    assert_eq!(
        normalize(&json!(r#"{"root":{"type":"paragraph"}}"#)),
        LoadableState::Initializer(Initializer::plain_text(r#"{"root":{"type":"paragraph"}}"#))
    );
}

#[test]
fn legacy_block_array_becomes_one_paragraph_per_line() {
    let raw = json!([
        { "type": "heading_1", "content": "Plan" },
        { "type": "bulletListItem", "content": "" },
        { "type": "paragraph", "content": "   " },
        { "type": "checkListItem", "content": [{ "text": "Milk" }], "props": { "checked": true } }
    ]);

    let LoadableState::Initializer(init) = normalize(&raw) else {
        panic!("expected initializer");
    };
    assert_eq!(init.paragraphs(), ["# Plan", "-", "- [x] Milk"]);
    assert_eq!(
        loaded(&raw).children,
        vec![
            Node::paragraph("# Plan"),
            Node::paragraph("-"),
            Node::paragraph("- [x] Milk"),
        ]
    );
}

#[test]
fn unreadable_values_load_one_empty_paragraph() {
    for raw in [
        Value::Null,
        json!(42),
        json!(true),
        json!({ "foo": 1 }),
        json!([]),
        json!([{ "type": "heading", "content": "" }]),
    ] {
        assert_eq!(
            normalize(&raw),
            LoadableState::Initializer(Initializer::plain_text("")),
            "{raw}"
        );
        assert_eq!(loaded(&raw).children, vec![Node::paragraph("")], "{raw}");
    }
}

#[test]
fn missing_note_is_treated_as_null() {
    assert_eq!(normalize_str(None), normalize(&Value::Null));
    assert_eq!(normalize_str(Some("")), normalize(&json!("")));
}

#[test]
fn loading_replaces_content_and_clears_history() {
    let mut editor = Editor::with_planner_plugins();
    editor.set_selection(Some(Selection::collapsed(Point::new(vec![0, 0], 0))));
    editor
        .run_command("core.insert_text", Some(json!({ "text": "old day" })))
        .unwrap();
    assert!(editor.can_undo());

    normalize(&json!("new day")).load_into(&mut editor);
    assert_eq!(editor.doc().children, vec![Node::paragraph("new day")]);
    assert!(!editor.can_undo());
    assert!(editor.selection().is_none());

    normalize(&json!(null)).load_into(&mut editor);
    assert!(editor.doc().is_empty_state());
    assert!(!editor.can_undo());
}

#[test]
fn legacy_crlf_content_splits_into_clean_paragraphs() {
    let raw = json!([{ "type": "paragraph", "content": "first\r\nsecond" }]);

    let LoadableState::Initializer(init) = normalize(&raw) else {
        panic!("expected initializer");
    };
    assert_eq!(init.paragraphs(), ["first", "second"]);
    assert_eq!(
        Initializer::markdown_lines("a\r\n\r\nb\r\n").paragraphs(),
        ["a", "b"]
    );
}

fn number_list(start: Value) -> Value {
    let item = |text: &str| {
        json!({
            "type": "listitem",
            "value": 1,
            "version": 1,
            "children": [{ "type": "text", "text": text, "format": 0, "version": 1 }]
        })
    };
    json!({
        "root": {
            "type": "root",
            "children": [{
                "type": "list",
                "listType": "number",
                "start": start,
                "version": 1,
                "children": [item("a"), item("b")]
            }]
        }
    })
}

fn item_values(doc: &Document) -> Vec<u64> {
    let Some(list) = doc.children.first().and_then(Node::as_element) else {
        panic!("expected a list");
    };
    assert!(matches!(
        list.kind,
        ElementKind::List {
            list_type: ListType::Number,
            ..
        }
    ));
    list.children
        .iter()
        .filter_map(Node::as_element)
        .map(|item| match item.kind {
            ElementKind::ListItem { value, .. } => value,
            ref other => panic!("expected list item, got {other:?}"),
        })
        .collect()
}

#[test]
fn huge_list_start_saturates_instead_of_overflowing() {
    let doc = loaded(&number_list(json!(u64::MAX)));
    assert_eq!(item_values(&doc), vec![u64::MAX, u64::MAX]);
}

#[test]
fn non_numeric_list_start_counts_from_one() {
    for start in [json!("seven"), json!(-3), json!(null)] {
        let doc = loaded(&number_list(start.clone()));
        assert_eq!(item_values(&doc), vec![1, 2], "{start}");
    }
}
