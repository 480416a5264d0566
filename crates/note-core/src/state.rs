use serde_json::{Map, Value, json};

use crate::core::{BlockStyle, Document, ElementKind, Node, TextFormat};
use crate::plugin::PluginRegistry;

/// Version stamped on the root and on every built-in node type.
pub const NODE_VERSION: u32 = 1;

/// A canonical serialized editor state: `{"root": {"type": "root", "children": [...]}}`.
///
/// The wrapped JSON is what gets persisted. Converting from a [`Document`] is
/// deterministic, so serializing the same document twice yields the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedState {
    value: Value,
}

impl SerializedState {
    /// The canonical empty state: a root with one empty paragraph.
    pub fn empty() -> Self {
        let paragraph = json!({
            "children": [],
            "direction": null,
            "format": "",
            "indent": 0,
            "type": "paragraph",
            "version": NODE_VERSION,
        });
        Self {
            value: root_value(vec![paragraph]),
        }
    }

    /// Accepts any JSON object whose `root.type` is `"root"`.
    pub fn from_value(value: Value) -> Option<Self> {
        if is_canonical_shape(&value) {
            Some(Self { value })
        } else {
            None
        }
    }

    pub fn from_json_str(s: &str) -> Option<Self> {
        serde_json::from_str::<Value>(s).ok().and_then(Self::from_value)
    }

    pub fn from_document(document: &Document, registry: &PluginRegistry) -> Self {
        Self {
            value: root_value(export_children(&document.children, registry)),
        }
    }

    pub fn to_document(&self, registry: &PluginRegistry) -> Document {
        let Some(root) = self.root() else {
            return Document::empty();
        };
        Document {
            children: wrap_stray_inlines(import_children(root, registry)),
        }
    }

    pub fn root_child_count(&self) -> usize {
        self.root()
            .and_then(|root| root.get("children"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn to_json_string(&self) -> String {
        self.value.to_string()
    }

    fn root(&self) -> Option<&Map<String, Value>> {
        self.value.get("root").and_then(Value::as_object)
    }
}

pub(crate) fn is_canonical_shape(value: &Value) -> bool {
    value
        .get("root")
        .and_then(|root| root.get("type"))
        .and_then(Value::as_str)
        == Some("root")
}

fn root_value(children: Vec<Value>) -> Value {
    json!({
        "root": {
            "children": children,
            "direction": null,
            "format": "",
            "indent": 0,
            "type": "root",
            "version": NODE_VERSION,
        }
    })
}

/// Reads one serialized node through the registry's dispatch table.
///
/// Unknown containers are unwrapped into their imported children and unknown
/// leaves carrying `text` become plain runs, so no typed text is lost.
pub fn import_node(value: &Value, registry: &PluginRegistry) -> Vec<Node> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    let type_name = map.get("type").and_then(Value::as_str).unwrap_or("");

    if let Some(spec) = registry.spec(type_name) {
        return (spec.import)(map, registry).into_iter().collect();
    }

    if map.get("children").is_some_and(Value::is_array) {
        tracing::debug!(type_name, "unwrapping unknown serialized container");
        return import_children(map, registry);
    }
    if let Some(text) = map.get("text").and_then(Value::as_str) {
        tracing::debug!(type_name, "importing unknown serialized leaf as text");
        return vec![Node::text(text, import_text_format(map))];
    }

    tracing::debug!(type_name, "dropping unknown serialized node");
    Vec::new()
}

pub fn import_children(map: &Map<String, Value>, registry: &PluginRegistry) -> Vec<Node> {
    map.get("children")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .flat_map(|child| import_node(child, registry))
                .collect()
        })
        .unwrap_or_default()
}

pub fn export_node(node: &Node, registry: &PluginRegistry) -> Option<Value> {
    let Some(spec) = registry.spec_for(node) else {
        tracing::warn!(type_name = node.type_name(), "no node spec registered for export");
        return None;
    };
    (spec.export)(node, registry)
}

/// Exports `children` in order. Empty text runs are placeholders the editor
/// re-creates on load, so they are not written.
pub fn export_children(children: &[Node], registry: &PluginRegistry) -> Vec<Value> {
    children
        .iter()
        .filter(|node| !matches!(node, Node::Text(t) if t.text.is_empty()))
        .filter_map(|node| export_node(node, registry))
        .collect()
}

pub(crate) fn import_block_style(map: &Map<String, Value>) -> BlockStyle {
    BlockStyle {
        direction: map
            .get("direction")
            .and_then(Value::as_str)
            .map(str::to_string),
        format: map
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        indent: map.get("indent").and_then(Value::as_u64).unwrap_or(0),
    }
}

pub(crate) fn import_text_format(map: &Map<String, Value>) -> TextFormat {
    let bits = map
        .get("format")
        .and_then(Value::as_u64)
        .and_then(|bits| u32::try_from(bits).ok())
        .unwrap_or(0);
    TextFormat::from_bits(bits)
}

/// Shared writer for element nodes: the common fields plus any type-specific extras.
pub(crate) fn element_value(
    type_name: &str,
    style: &BlockStyle,
    children: &[Node],
    registry: &PluginRegistry,
    extra: impl IntoIterator<Item = (&'static str, Value)>,
) -> Value {
    let mut map = Map::new();
    map.insert(
        "children".to_string(),
        Value::Array(export_children(children, registry)),
    );
    map.insert(
        "direction".to_string(),
        style
            .direction
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    map.insert("format".to_string(), Value::String(style.format.clone()));
    map.insert("indent".to_string(), Value::from(style.indent));
    map.insert("type".to_string(), Value::String(type_name.to_string()));
    map.insert("version".to_string(), Value::from(NODE_VERSION));
    for (key, value) in extra {
        map.insert(key.to_string(), value);
    }
    Value::Object(map)
}

/// Inline nodes are not valid root children; group consecutive ones into paragraphs.
fn wrap_stray_inlines(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    let mut pending: Vec<Node> = Vec::new();

    for node in nodes {
        let inline = match &node {
            Node::Text(_) => true,
            Node::Void(v) => v.inline_text_len() > 0,
            Node::Element(el) => matches!(el.kind, ElementKind::ListItem { .. }),
        };
        if inline {
            match node {
                Node::Element(el) => pending.extend(el.children),
                other => pending.push(other),
            }
            continue;
        }
        if !pending.is_empty() {
            out.push(Node::element(
                ElementKind::Paragraph,
                std::mem::take(&mut pending),
            ));
        }
        out.push(node);
    }
    if !pending.is_empty() {
        out.push(Node::element(ElementKind::Paragraph, pending));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_matches_exported_empty_document() {
        let registry = PluginRegistry::planner();
        let exported = SerializedState::from_document(&Document::empty(), &registry);
        assert_eq!(exported, SerializedState::empty());
    }

    #[test]
    fn shape_check_requires_root_type() {
        assert!(SerializedState::from_json_str(r#"{"root":{"type":"root"}}"#).is_some());
        assert!(SerializedState::from_json_str(r#"{"root":{"type":"paragraph"}}"#).is_none());
        assert!(SerializedState::from_json_str(r#"[{"root":1}]"#).is_none());
        assert!(SerializedState::from_json_str("not json").is_none());
    }

    #[test]
    fn unknown_container_is_unwrapped_into_its_text() {
        let registry = PluginRegistry::planner();
        let state = SerializedState::from_value(json!({
            "root": {
                "type": "root",
                "children": [{
                    "type": "paragraph",
                    "children": [{
                        "type": "link",
                        "url": "https://example.com",
                        "children": [{ "type": "text", "text": "docs", "format": 1 }]
                    }]
                }]
            }
        }))
        .unwrap();

        let doc = state.to_document(&registry);
        assert_eq!(doc.plain_text(), "docs");
    }

    #[test]
    fn stray_root_text_is_wrapped_in_a_paragraph() {
        let registry = PluginRegistry::planner();
        let state = SerializedState::from_value(json!({
            "root": {
                "type": "root",
                "children": [{ "type": "text", "text": "loose" }]
            }
        }))
        .unwrap();

        let doc = state.to_document(&registry);
        assert_eq!(doc.children, vec![Node::paragraph("loose")]);
    }
}
