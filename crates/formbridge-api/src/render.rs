//! Render tree and snapshot types shared by the engine and every frontend.
//!
//! Both halves of a [`Snapshot`] are reference counted. The engine keeps the
//! `Arc` of every subtree whose content did not change, so frontends can diff
//! with [`Arc::ptr_eq`] instead of walking values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::Value;

/// Component props, keyed by prop name.
pub type Props = BTreeMap<String, Value>;

/// Derived per-node state computed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedState {
    /// Rendered but possibly hidden (CSS-style visibility)
    pub show: bool,
    /// Rendered at all
    pub if_show: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub required: bool,
}

impl Default for ComputedState {
    fn default() -> Self {
        Self {
            show: true,
            if_show: true,
            disabled: false,
            readonly: false,
            required: false,
        }
    }
}

impl ComputedState {
    pub fn is_visible(&self) -> bool {
        self.show && self.if_show
    }
}

/// One node of the render tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderNode {
    /// Full dot path of the value this node renders (empty for the root)
    pub path: String,
    /// Registry name of the component that renders this node
    pub component: String,
    #[serde(default)]
    pub props: Props,
    #[serde(default)]
    pub computed: ComputedState,
    #[serde(default)]
    pub children: Vec<Arc<RenderNode>>,
}

impl RenderNode {
    pub fn new(path: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            component: component.into(),
            props: Props::new(),
            computed: ComputedState::default(),
            children: Vec::new(),
        }
    }

    /// Depth-first search for the node rendering `path`.
    pub fn find(self: &Arc<Self>, path: &str) -> Option<Arc<RenderNode>> {
        if self.path == path {
            return Some(Arc::clone(self));
        }
        self.children.iter().find_map(|child| child.find(path))
    }

    /// Number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

/// The pair a frontend renders from.
///
/// Both fields are the literal references handed out by the engine; cloning a
/// snapshot only bumps reference counts.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub render_tree: Arc<RenderNode>,
    pub value_model: Arc<Value>,
}

impl Snapshot {
    pub fn new(render_tree: Arc<RenderNode>, value_model: Arc<Value>) -> Self {
        Self {
            render_tree,
            value_model,
        }
    }

    /// Reference equality of both halves.
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.render_tree, &other.render_tree)
            && Arc::ptr_eq(&self.value_model, &other.value_model)
    }

    pub fn value(&self, path: &str) -> Option<&Value> {
        self.value_model.get_path(path)
    }
}
