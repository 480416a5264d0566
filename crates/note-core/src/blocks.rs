//! Node specs for the block and inline vocabulary, and the list plugin.

use serde_json::{Map, Value};

use crate::core::{Document, Editor, ElementKind, ElementNode, ListType, Node, TextNode, node_ref};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{
    ChildConstraint, CommandError, CommandSpec, NodeRole, NodeSpec, NormalizePass, NotePlugin,
    PluginRegistry, QuerySpec,
};
use crate::state::{
    NODE_VERSION, element_value, import_block_style, import_children, import_text_format,
};

fn element_spec(
    type_name: &'static str,
    role: NodeRole,
    children: ChildConstraint,
    import: crate::plugin::ImportFn,
    export: crate::plugin::ExportFn,
) -> NodeSpec {
    NodeSpec {
        type_name,
        version: NODE_VERSION,
        role,
        is_void: false,
        children,
        import,
        export,
    }
}

fn void_spec(
    type_name: &'static str,
    role: NodeRole,
    import: crate::plugin::ImportFn,
    export: crate::plugin::ExportFn,
) -> NodeSpec {
    NodeSpec {
        type_name,
        version: NODE_VERSION,
        role,
        is_void: true,
        children: ChildConstraint::None,
        import,
        export,
    }
}

fn import_element(
    kind: ElementKind,
    map: &Map<String, Value>,
    registry: &PluginRegistry,
) -> Option<Node> {
    Some(Node::Element(ElementNode {
        kind,
        style: import_block_style(map),
        children: import_children(map, registry),
    }))
}

fn bare_void(type_name: &str) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), Value::String(type_name.to_string()));
    map.insert("version".to_string(), Value::from(NODE_VERSION));
    Value::Object(map)
}

pub struct ParagraphPlugin;

impl NotePlugin for ParagraphPlugin {
    fn id(&self) -> &'static str {
        "core.paragraph"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![
            element_spec(
                "paragraph",
                NodeRole::Block,
                ChildConstraint::InlineOnly,
                import_paragraph,
                export_paragraph,
            ),
            NodeSpec {
                type_name: "text",
                version: NODE_VERSION,
                role: NodeRole::Inline,
                is_void: false,
                children: ChildConstraint::None,
                import: import_text,
                export: export_text,
            },
            void_spec(
                "linebreak",
                NodeRole::Inline,
                |_, _| Some(Node::line_break()),
                export_line_break,
            ),
        ]
    }
}

fn import_paragraph(map: &Map<String, Value>, registry: &PluginRegistry) -> Option<Node> {
    import_element(ElementKind::Paragraph, map, registry)
}

fn export_paragraph(node: &Node, registry: &PluginRegistry) -> Option<Value> {
    match node {
        Node::Element(el) if el.kind == ElementKind::Paragraph => Some(element_value(
            "paragraph",
            &el.style,
            &el.children,
            registry,
            [],
        )),
        _ => None,
    }
}

fn import_text(map: &Map<String, Value>, _registry: &PluginRegistry) -> Option<Node> {
    Some(Node::Text(TextNode {
        text: map
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        format: import_text_format(map),
        style: map
            .get("style")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    }))
}

fn export_text(node: &Node, _registry: &PluginRegistry) -> Option<Value> {
    let Node::Text(text) = node else {
        return None;
    };
    Some(serde_json::json!({
        "detail": 0,
        "format": text.format.bits(),
        "mode": "normal",
        "style": text.style,
        "text": text.text,
        "type": "text",
        "version": NODE_VERSION,
    }))
}

fn export_line_break(node: &Node, _registry: &PluginRegistry) -> Option<Value> {
    matches!(node, Node::Void(crate::core::VoidNode::LineBreak)).then(|| bare_void("linebreak"))
}

pub struct HorizontalRulePlugin;

impl NotePlugin for HorizontalRulePlugin {
    fn id(&self) -> &'static str {
        "core.horizontal_rule"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![void_spec(
            "horizontalrule",
            NodeRole::Block,
            |_, _| Some(Node::horizontal_rule()),
            |node, _| {
                matches!(node, Node::Void(crate::core::VoidNode::HorizontalRule))
                    .then(|| bare_void("horizontalrule"))
            },
        )]
    }
}

pub struct HeadingPlugin;

impl NotePlugin for HeadingPlugin {
    fn id(&self) -> &'static str {
        "heading"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![element_spec(
            "heading",
            NodeRole::Block,
            ChildConstraint::InlineOnly,
            import_heading,
            export_heading,
        )]
    }
}

/// `tag` is `"h1"`..`"h6"`; levels past the planner's deepest heading collapse onto it.
fn import_heading(map: &Map<String, Value>, registry: &PluginRegistry) -> Option<Node> {
    let level = map
        .get("tag")
        .and_then(Value::as_str)
        .and_then(|tag| tag.strip_prefix('h'))
        .and_then(|digits| digits.parse::<u8>().ok())
        .unwrap_or(1);
    import_element(ElementKind::heading(level), map, registry)
}

fn export_heading(node: &Node, registry: &PluginRegistry) -> Option<Value> {
    let Node::Element(el) = node else {
        return None;
    };
    let ElementKind::Heading { level } = el.kind else {
        return None;
    };
    Some(element_value(
        "heading",
        &el.style,
        &el.children,
        registry,
        [("tag", Value::String(format!("h{level}")))],
    ))
}

pub struct QuotePlugin;

impl NotePlugin for QuotePlugin {
    fn id(&self) -> &'static str {
        "quote"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![element_spec(
            "quote",
            NodeRole::Block,
            ChildConstraint::InlineOnly,
            |map, registry| import_element(ElementKind::Quote, map, registry),
            |node, registry| match node {
                Node::Element(el) if el.kind == ElementKind::Quote => Some(element_value(
                    "quote",
                    &el.style,
                    &el.children,
                    registry,
                    [],
                )),
                _ => None,
            },
        )]
    }
}

pub struct CodePlugin;

impl NotePlugin for CodePlugin {
    fn id(&self) -> &'static str {
        "code"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![element_spec(
            "code",
            NodeRole::Block,
            ChildConstraint::InlineOnly,
            import_code,
            export_code,
        )]
    }
}

fn import_code(map: &Map<String, Value>, registry: &PluginRegistry) -> Option<Node> {
    let language = map
        .get("language")
        .and_then(Value::as_str)
        .map(str::to_string);
    import_element(ElementKind::Code { language }, map, registry)
}

fn export_code(node: &Node, registry: &PluginRegistry) -> Option<Value> {
    let Node::Element(el) = node else {
        return None;
    };
    let ElementKind::Code { language } = &el.kind else {
        return None;
    };
    let language = language.clone().map(Value::String).unwrap_or(Value::Null);
    Some(element_value(
        "code",
        &el.style,
        &el.children,
        registry,
        [("language", language)],
    ))
}

pub struct ListPlugin;

impl NotePlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![
            element_spec(
                "list",
                NodeRole::Block,
                ChildConstraint::BlockOnly,
                import_list,
                export_list,
            ),
            element_spec(
                "listitem",
                NodeRole::Block,
                ChildConstraint::Any,
                import_list_item,
                export_list_item,
            ),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeListStructure)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("list.toggle_checked", "Toggle checked", |editor, args| {
                let path = parse_path_arg(args.as_ref())
                    .or_else(|| caret_list_item_path(editor))
                    .ok_or_else(|| CommandError::new("No checklist item at the caret"))?;
                let tx = toggle_checked(editor.doc(), path).map_err(CommandError::new)?;
                editor
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to toggle item: {e}")))
            })
            .description("Flip the checked state of a checklist item.")
            .keywords(["todo", "check", "done", "checklist"])
            .args_example(serde_json::json!({ "path": [0, 1] })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec {
            id: "list.active_type".to_string(),
            handler: std::sync::Arc::new(|editor, _args| {
                Ok(active_list_type(editor)
                    .map(|list_type| Value::String(list_type.as_str().to_string()))
                    .unwrap_or(Value::Null))
            }),
        }]
    }
}

fn import_list(map: &Map<String, Value>, registry: &PluginRegistry) -> Option<Node> {
    let list_type = map
        .get("listType")
        .and_then(Value::as_str)
        .and_then(ListType::parse)
        .unwrap_or_else(|| match map.get("tag").and_then(Value::as_str) {
            Some("ol") => ListType::Number,
            _ => ListType::Bullet,
        });
    let start = map.get("start").and_then(Value::as_u64).unwrap_or(1);
    import_element(ElementKind::List { list_type, start }, map, registry)
}

fn export_list(node: &Node, registry: &PluginRegistry) -> Option<Value> {
    let Node::Element(el) = node else {
        return None;
    };
    let ElementKind::List { list_type, start } = el.kind else {
        return None;
    };
    Some(element_value(
        "list",
        &el.style,
        &el.children,
        registry,
        [
            ("listType", Value::String(list_type.as_str().to_string())),
            ("start", Value::from(start)),
            ("tag", Value::String(list_type.tag().to_string())),
        ],
    ))
}

fn import_list_item(map: &Map<String, Value>, registry: &PluginRegistry) -> Option<Node> {
    let checked = map.get("checked").and_then(Value::as_bool);
    let value = map.get("value").and_then(Value::as_u64).unwrap_or(1);
    import_element(ElementKind::ListItem { checked, value }, map, registry)
}

fn export_list_item(node: &Node, registry: &PluginRegistry) -> Option<Value> {
    let Node::Element(el) = node else {
        return None;
    };
    let ElementKind::ListItem { checked, value } = el.kind else {
        return None;
    };
    let checked = checked.map(|checked| ("checked", Value::Bool(checked)));
    Some(element_value(
        "listitem",
        &el.style,
        &el.children,
        registry,
        checked
            .into_iter()
            .chain([("value", Value::from(value))]),
    ))
}

/// Keeps lists well formed:
/// - a list only holds list items (stray children get wrapped),
/// - an empty list holds one empty item,
/// - items of check lists carry `checked`, other items do not,
/// - item `value`s count up from the list's `start`,
/// - a list item outside a list becomes a paragraph.
struct NormalizeListStructure;

impl NormalizePass for NormalizeListStructure {
    fn id(&self) -> &'static str {
        "list.normalize_structure"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(
            children: &[Node],
            parent: Option<&ElementKind>,
            path: &mut Vec<usize>,
            ops: &mut Vec<Op>,
        ) {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);

                if let Some(ElementKind::List { list_type, start }) = parent {
                    let Node::Element(el) = node else {
                        wrap_in_list_item(node, path, ops);
                        path.pop();
                        continue;
                    };
                    let ElementKind::ListItem { checked, .. } = &el.kind else {
                        // The wrapped node's own children are handled on the next run.
                        wrap_in_list_item(node, path, ops);
                        path.pop();
                        continue;
                    };
                    let checked = match (list_type, checked) {
                        (ListType::Check, Some(c)) => Some(*c),
                        (ListType::Check, None) => Some(false),
                        _ => None,
                    };
                    let kind = ElementKind::ListItem {
                        checked,
                        value: start.saturating_add(ix as u64),
                    };
                    if kind != el.kind {
                        ops.push(Op::SetElementKind {
                            path: path.clone(),
                            kind,
                        });
                    }
                } else if let Node::Element(el) = node {
                    if matches!(el.kind, ElementKind::ListItem { .. }) && el.is_text_block() {
                        ops.push(Op::SetElementKind {
                            path: path.clone(),
                            kind: ElementKind::Paragraph,
                        });
                    }
                }

                if let Node::Element(el) = node {
                    if matches!(el.kind, ElementKind::List { .. }) && el.children.is_empty() {
                        let mut item_path = path.clone();
                        item_path.push(0);
                        ops.push(Op::InsertNode {
                            path: item_path,
                            node: Node::element(
                                ElementKind::ListItem {
                                    checked: None,
                                    value: 1,
                                },
                                Vec::new(),
                            ),
                        });
                    } else {
                        walk(&el.children, Some(&el.kind), path, ops);
                    }
                }
                path.pop();
            }
        }

        walk(&doc.children, None, &mut Vec::new(), &mut ops);
        ops
    }
}

fn wrap_in_list_item(node: &Node, path: &[usize], ops: &mut Vec<Op>) {
    let children = match node {
        Node::Element(el) if el.is_text_block() => el.children.clone(),
        other => vec![other.clone()],
    };
    ops.push(Op::RemoveNode {
        path: path.to_vec(),
    });
    ops.push(Op::InsertNode {
        path: path.to_vec(),
        node: Node::element(
            ElementKind::ListItem {
                checked: None,
                value: 1,
            },
            children,
        ),
    });
}

fn parse_path_arg(args: Option<&Value>) -> Option<Path> {
    let path = args?.get("path")?.as_array()?;
    path.iter()
        .map(|v| v.as_u64().and_then(|ix| usize::try_from(ix).ok()))
        .collect()
}

fn nearest_ancestor(doc: &Document, path: &[usize], matches: impl Fn(&ElementKind) -> bool) -> Option<Path> {
    (1..=path.len()).rev().find_map(|len| {
        let prefix = &path[..len];
        match node_ref(doc, prefix) {
            Some(Node::Element(el)) if matches(&el.kind) => Some(prefix.to_vec()),
            _ => None,
        }
    })
}

fn caret_list_item_path(editor: &Editor) -> Option<Path> {
    let focus = &editor.selection()?.focus;
    nearest_ancestor(editor.doc(), &focus.path, |kind| {
        matches!(kind, ElementKind::ListItem { .. })
    })
}

fn active_list_type(editor: &Editor) -> Option<ListType> {
    let focus = &editor.selection()?.focus;
    let list_path = nearest_ancestor(editor.doc(), &focus.path, |kind| {
        matches!(kind, ElementKind::List { .. })
    })?;
    match node_ref(editor.doc(), &list_path)? {
        Node::Element(ElementNode {
            kind: ElementKind::List { list_type, .. },
            ..
        }) => Some(*list_type),
        _ => None,
    }
}

fn toggle_checked(doc: &Document, path: Path) -> Result<Transaction, String> {
    let Some(Node::Element(el)) = node_ref(doc, &path) else {
        return Err("Path does not point at a list item".into());
    };
    let ElementKind::ListItem {
        checked: Some(checked),
        value,
    } = el.kind
    else {
        return Err("List item is not a checklist item".into());
    };
    Ok(Transaction::new(vec![Op::SetElementKind {
        path,
        kind: ElementKind::ListItem {
            checked: Some(!checked),
            value,
        },
    }])
    .source("command:list.toggle_checked"))
}
