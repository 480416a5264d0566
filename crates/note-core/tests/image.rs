use planner_note_core::{
    DEFAULT_IMAGE_WIDTH, Document, EditKey, Editor, ImageNode, ImageTarget, ImageView,
    ImageViewState, MIN_IMAGE_WIDTH, Node, PluginRegistry, Point, Selection, SerializedState,
    VoidNode, import_width,
};
use serde_json::json;

fn image_at<'a>(editor: &'a Editor, ix: usize) -> &'a ImageNode {
    let Some(Node::Void(VoidNode::Image(image))) = editor.doc().children.get(ix) else {
        panic!("expected image at {ix}");
    };
    image
}

fn editor_with_image(width: u32) -> Editor {
    let doc = Document {
        children: vec![
            Node::image(ImageNode::new("https://cdn.example.com/a.png").width(width)),
            Node::paragraph("after"),
        ],
    };
    Editor::new(doc, None, PluginRegistry::planner())
}

fn selected_view() -> ImageView {
    let mut view = ImageView::new(ImageTarget::new(vec![0], "https://cdn.example.com/a.png"));
    view.click(true);
    view
}

#[test]
fn insert_image_adds_block_and_trailing_paragraph() {
    let doc = Document {
        children: vec![Node::paragraph("hello")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 2));
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::planner());

    editor
        .run_command(
            "image.insert",
            Some(json!({
                "src": "https://example.com/a.png",
                "altText": "A"
            })),
        )
        .unwrap();

    assert_eq!(editor.doc().children.len(), 3);
    let image = image_at(&editor, 1);
    assert_eq!(image.src, "https://example.com/a.png");
    assert_eq!(image.alt_text, "A");
    assert_eq!(image.width, DEFAULT_IMAGE_WIDTH);

    assert_eq!(
        editor.selection(),
        Some(&Selection::collapsed(Point::new(vec![2, 0], 0)))
    );
}

#[test]
fn insert_image_before_existing_block_reuses_it_for_the_caret() {
    let doc = Document {
        children: vec![Node::paragraph("a"), Node::paragraph("b")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 1));
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::planner());

    editor
        .run_command("image.insert", Some(json!({ "src": "x.png" })))
        .unwrap();

    assert_eq!(editor.doc().children.len(), 3);
    assert_eq!(image_at(&editor, 1).src, "x.png");
    assert_eq!(editor.doc().children[2], Node::paragraph("b"));
    assert_eq!(
        editor.selection(),
        Some(&Selection::collapsed(Point::new(vec![2, 0], 0)))
    );
}

#[test]
fn insert_image_requires_src() {
    let mut editor = Editor::with_planner_plugins();
    let err = editor
        .run_command("image.insert", Some(json!({})))
        .unwrap_err();
    assert!(err.message().contains("src"));
}

#[test]
fn resize_moves_only_touch_the_draft() {
    let mut editor = editor_with_image(480);
    let mut view = selected_view();
    let revision = editor.revision();

    assert!(view.pointer_down_on_handle(500.0, &editor));
    assert_eq!(view.pointer_move(520.0, Some(900.0)), Some(500.0));
    assert_eq!(view.pointer_move(560.0, Some(900.0)), Some(540.0));
    assert_eq!(view.display_width(image_at(&editor, 0).width), 540.0);

    assert_eq!(image_at(&editor, 0).width, 480);
    assert_eq!(editor.revision(), revision);
    assert!(!editor.can_undo());
}

#[test]
fn resize_commit_clamps_large_negative_delta() {
    let mut editor = editor_with_image(480);
    let mut view = selected_view();

    assert!(view.pointer_down_on_handle(500.0, &editor));
    assert_eq!(view.pointer_move(-10_000.0, None), Some(120.0));
    assert_eq!(view.pointer_up(&mut editor).unwrap(), Some(MIN_IMAGE_WIDTH));

    assert_eq!(image_at(&editor, 0).width, MIN_IMAGE_WIDTH);
    assert_eq!(view.state(), &ImageViewState::Selected);

    assert!(editor.undo());
    assert_eq!(image_at(&editor, 0).width, 480);
    assert!(!editor.can_undo());
}

#[test]
fn resize_is_bounded_by_container_and_floored() {
    let mut editor = editor_with_image(480);
    let mut view = selected_view();

    assert!(view.pointer_down_on_handle(0.0, &editor));
    assert_eq!(view.pointer_move(1000.0, Some(640.0)), Some(640.0));
    assert_eq!(view.pointer_move(33.5, Some(640.0)), Some(513.5));
    assert_eq!(view.pointer_up(&mut editor).unwrap(), Some(513));
    assert_eq!(image_at(&editor, 0).width, 513);
}

#[test]
fn cancelled_resize_commits_nothing() {
    let mut editor = editor_with_image(480);
    let mut view = selected_view();

    assert!(view.pointer_down_on_handle(0.0, &editor));
    view.pointer_move(-200.0, None);
    view.cancel();

    assert!(!view.is_resizing());
    assert_eq!(view.pointer_up(&mut editor).unwrap(), None);
    assert_eq!(image_at(&editor, 0).width, 480);
    assert!(!editor.can_undo());
}

#[test]
fn resize_handle_needs_a_selected_image() {
    let editor = editor_with_image(480);
    let mut view = ImageView::new(ImageTarget::new(vec![0], "https://cdn.example.com/a.png"));

    assert!(!view.pointer_down_on_handle(10.0, &editor));
    view.click(true);
    view.click(false);
    assert!(!view.is_selected());
    assert!(!view.pointer_down_on_handle(10.0, &editor));
}

#[test]
fn deleting_a_lone_image_leaves_one_empty_paragraph() {
    let doc = Document {
        children: vec![Node::image(ImageNode::new("solo.png"))],
    };
    let mut editor = Editor::new(doc, None, PluginRegistry::planner());
    let mut view = ImageView::new(ImageTarget::new(vec![0], "solo.png"));
    view.click(true);

    assert!(view.key_down(EditKey::Backspace, &mut editor).unwrap());

    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(
        editor.selection(),
        Some(&Selection::collapsed(Point::new(vec![0, 0], 0)))
    );
    assert!(!view.is_selected());
}

#[test]
fn delete_key_is_ignored_while_unselected() {
    let mut editor = editor_with_image(480);
    let mut view = ImageView::new(ImageTarget::new(vec![0], "https://cdn.example.com/a.png"));

    assert!(!view.key_down(EditKey::Delete, &mut editor).unwrap());
    assert_eq!(editor.doc().children.len(), 2);
}

#[test]
fn stale_target_path_is_resolved_by_src() {
    let mut editor = editor_with_image(480);
    editor
        .apply(planner_note_core::Transaction::new(vec![
            planner_note_core::Op::InsertNode {
                path: vec![0],
                node: Node::paragraph("inserted above"),
            },
        ]))
        .unwrap();

    let mut view = selected_view();
    assert!(view.pointer_down_on_handle(0.0, &editor));
    view.pointer_move(-100.0, None);
    assert_eq!(view.pointer_up(&mut editor).unwrap(), Some(380));

    assert_eq!(image_at(&editor, 1).width, 380);
    assert_eq!(view.target().path, vec![1]);
}

#[test]
fn width_import_falls_back_and_floors() {
    assert_eq!(import_width(None), DEFAULT_IMAGE_WIDTH);
    assert_eq!(import_width(Some(&json!(null))), DEFAULT_IMAGE_WIDTH);
    assert_eq!(import_width(Some(&json!("wide"))), DEFAULT_IMAGE_WIDTH);
    assert_eq!(import_width(Some(&json!(300.7))), 300);
    assert_eq!(import_width(Some(&json!(99.9))), MIN_IMAGE_WIDTH);
    assert_eq!(import_width(Some(&json!(-40))), MIN_IMAGE_WIDTH);
}

#[test]
fn image_import_defaults_alt_text() {
    let state = SerializedState::from_value(json!({
        "root": {
            "type": "root",
            "children": [
                { "type": "image", "version": 1, "src": "a.png", "width": "auto" }
            ]
        }
    }))
    .unwrap();

    let doc = state.to_document(&PluginRegistry::planner());
    assert_eq!(
        doc.children,
        vec![Node::image(ImageNode::new("a.png"))]
    );
}

#[test]
fn image_export_uses_wire_field_names() {
    let doc = Document {
        children: vec![Node::image(
            ImageNode::new("a.png").alt_text("Board").width(300),
        )],
    };
    let state = SerializedState::from_document(&doc, &PluginRegistry::planner());
    assert_eq!(
        state.as_value()["root"]["children"][0],
        json!({ "altText": "Board", "src": "a.png", "type": "image", "version": 1, "width": 300 })
    );
}

#[test]
fn export_never_writes_a_width_below_the_minimum() {
    let mut narrow = ImageNode::new("a.png");
    narrow.width = 50;
    let doc = Document {
        children: vec![Node::image(narrow)],
    };

    let state = SerializedState::from_document(&doc, &PluginRegistry::planner());
    assert_eq!(
        state.as_value()["root"]["children"][0]["width"],
        json!(MIN_IMAGE_WIDTH)
    );
}
