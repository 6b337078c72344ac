//! Plain-text rendering of a snapshot.

use std::sync::Arc;

use formbridge::EventHandler;
use formbridge_api::{RenderNode, Snapshot, Value};
use formbridge_core::ComponentRegistry;

/// One line per visible node, indented by depth.
///
/// Field lines show the component-facing value (what the widget would
/// display), list rows are numbered, and required fields carry a `*`.
pub fn render_snapshot(
    snapshot: &Snapshot,
    registry: &ComponentRegistry,
    handler: &EventHandler,
) -> Vec<String> {
    let mut lines = Vec::new();
    for child in &snapshot.render_tree.children {
        render_node(child, 0, registry, handler, &mut lines);
    }
    lines
}

fn render_node(
    node: &Arc<RenderNode>,
    depth: usize,
    registry: &ComponentRegistry,
    handler: &EventHandler,
    out: &mut Vec<String>,
) {
    if !node.computed.is_visible() {
        return;
    }
    let indent = "  ".repeat(depth);
    let target = registry
        .get(&node.component)
        .and_then(|d| d.render_target.as_ref())
        .map(|t| t.label().to_string())
        .unwrap_or_else(|| format!("?{}", node.component));
    let label = node
        .props
        .get("label")
        .and_then(Value::as_string)
        .map(str::to_string)
        .unwrap_or_else(|| node.path.rsplit('.').next().unwrap_or_default().to_string());
    let marker = if node.computed.required { "*" } else { "" };

    if node.children.is_empty() {
        let shown = handler
            .component_value(&node.path, &node.component)
            .map(|v| display_value(&v))
            .unwrap_or_default();
        out.push(format!("{indent}{label}{marker} [{target}] {}: {shown}", node.path));
        return;
    }

    out.push(format!("{indent}{label}{marker} [{target}]"));
    for child in &node.children {
        render_node(child, depth + 1, registry, handler, out);
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_json_string(),
    }
}
