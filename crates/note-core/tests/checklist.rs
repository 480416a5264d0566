use planner_note_core::{
    Document, Editor, ElementKind, ListType, Node, PluginRegistry, Point, Selection, TextFormat,
};
use serde_json::json;

fn item(checked: Option<bool>, text: &str) -> Node {
    Node::element(
        ElementKind::ListItem { checked, value: 1 },
        vec![Node::text(text, TextFormat::empty())],
    )
}

fn list_editor(list_type: ListType, items: Vec<Node>) -> Editor {
    let doc = Document {
        children: vec![Node::element(ElementKind::list(list_type), items)],
    };
    Editor::new(doc, None, PluginRegistry::planner())
}

fn item_kinds(editor: &Editor) -> Vec<ElementKind> {
    let Node::Element(list) = &editor.doc().children[0] else {
        panic!("expected list");
    };
    list.children
        .iter()
        .map(|n| {
            let Node::Element(item) = n else {
                panic!("expected list item");
            };
            item.kind.clone()
        })
        .collect()
}

#[test]
fn check_list_items_always_carry_checked() {
    let editor = list_editor(
        ListType::Check,
        vec![item(None, "milk"), item(Some(true), "eggs")],
    );

    assert_eq!(
        item_kinds(&editor),
        vec![
            ElementKind::ListItem {
                checked: Some(false),
                value: 1
            },
            ElementKind::ListItem {
                checked: Some(true),
                value: 2
            },
        ]
    );
}

#[test]
fn bullet_list_items_drop_checked() {
    let editor = list_editor(ListType::Bullet, vec![item(Some(true), "milk")]);

    assert_eq!(
        item_kinds(&editor),
        vec![ElementKind::ListItem {
            checked: None,
            value: 1
        }]
    );
}

#[test]
fn stray_list_children_are_wrapped_in_items() {
    let editor = list_editor(ListType::Bullet, vec![Node::paragraph("loose")]);

    let Node::Element(list) = &editor.doc().children[0] else {
        panic!("expected list");
    };
    assert_eq!(list.children, vec![item(None, "loose")]);
}

#[test]
fn empty_list_gets_one_empty_item() {
    let editor = list_editor(ListType::Check, Vec::new());

    let Node::Element(list) = &editor.doc().children[0] else {
        panic!("expected list");
    };
    assert_eq!(
        list.children,
        vec![Node::element(
            ElementKind::ListItem {
                checked: Some(false),
                value: 1
            },
            vec![Node::text("", TextFormat::empty())],
        )]
    );
}

#[test]
fn toggle_checked_by_path_flips_and_undoes() {
    let mut editor = list_editor(ListType::Check, vec![item(None, "milk")]);

    editor
        .run_command("list.toggle_checked", Some(json!({ "path": [0, 0] })))
        .unwrap();
    assert_eq!(
        item_kinds(&editor)[0],
        ElementKind::ListItem {
            checked: Some(true),
            value: 1
        }
    );

    editor
        .run_command("list.toggle_checked", Some(json!({ "path": [0, 0] })))
        .unwrap();
    assert_eq!(
        item_kinds(&editor)[0],
        ElementKind::ListItem {
            checked: Some(false),
            value: 1
        }
    );

    assert!(editor.undo());
    assert_eq!(
        item_kinds(&editor)[0],
        ElementKind::ListItem {
            checked: Some(true),
            value: 1
        }
    );
}

#[test]
fn toggle_checked_uses_the_caret_item_and_reports_list_type() {
    let mut editor = list_editor(ListType::Check, vec![item(None, "a"), item(None, "b")]);
    editor.set_selection(Some(Selection::collapsed(Point::new(vec![0, 1, 0], 1))));

    assert_eq!(
        editor
            .run_query::<Option<String>>("list.active_type", None)
            .unwrap(),
        Some("check".to_string())
    );

    editor.run_command("list.toggle_checked", None).unwrap();
    assert_eq!(
        item_kinds(&editor),
        vec![
            ElementKind::ListItem {
                checked: Some(false),
                value: 1
            },
            ElementKind::ListItem {
                checked: Some(true),
                value: 2
            },
        ]
    );
}

#[test]
fn toggle_checked_rejects_bullet_items() {
    let mut editor = list_editor(ListType::Bullet, vec![item(None, "a")]);

    let err = editor
        .run_command("list.toggle_checked", Some(json!({ "path": [0, 0] })))
        .unwrap_err();
    assert!(err.message().contains("checklist"));
}

#[test]
fn active_list_type_is_null_outside_lists() {
    let doc = Document {
        children: vec![Node::paragraph("plain")],
    };
    let editor = Editor::new(
        doc,
        Some(Selection::collapsed(Point::new(vec![0, 0], 0))),
        PluginRegistry::planner(),
    );

    assert_eq!(
        editor
            .run_query::<Option<String>>("list.active_type", None)
            .unwrap(),
        None
    );
}
