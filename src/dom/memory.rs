use std::collections::{BTreeMap, HashMap};

use super::selector::{ElementView, Selector};
use super::{ElementSpec, HostDocument, ListenKind, NodeId, SyntheticEvent};
use crate::logging::{obj, v_str, warn, Domain};

/// Callback run when a synthetic event reaches a node, standing in for the
/// host's own event handlers (e.g. rendering a popup on menu click).
pub type Reaction = Box<dyn FnMut(&mut MemoryDocument, &SyntheticEvent)>;

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    classes: Vec<String>,
    attrs: BTreeMap<String, String>,
    text: String,
    markup: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
}

impl ElementView for Node {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        if name == "class" {
            return None;
        }
        self.attrs.get(name).map(String::as_str)
    }
}

/// Arena-backed document used by tests and the demo binary.
pub struct MemoryDocument {
    nodes: Vec<Node>,
    dispatched: Vec<(NodeId, SyntheticEvent)>,
    listeners: Vec<(NodeId, ListenKind)>,
    reactions: HashMap<NodeId, Vec<Reaction>>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let body = Node {
            tag: "body".to_string(),
            classes: Vec::new(),
            attrs: BTreeMap::new(),
            text: String::new(),
            markup: String::new(),
            parent: None,
            children: Vec::new(),
            attached: true,
        };
        Self {
            nodes: vec![body],
            dispatched: Vec::new(),
            listeners: Vec::new(),
            reactions: HashMap::new(),
        }
    }

    /// Detach a subtree, as the host does when it re-renders a table.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes.get(node.0).and_then(|n| n.parent) {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.get_mut(id.0) {
                n.attached = false;
                stack.extend(n.children.iter().copied());
            }
        }
    }

    /// Register a host-side handler for events dispatched on `node`.
    pub fn on_event(&mut self, node: NodeId, reaction: Reaction) {
        self.reactions.entry(node).or_default().push(reaction);
    }

    pub fn dispatched(&self) -> &[(NodeId, SyntheticEvent)] {
        &self.dispatched
    }

    pub fn listeners(&self) -> &[(NodeId, ListenKind)] {
        &self.listeners
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).filter(|n| n.attached)
    }

    fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(root) = self.node(scope) else {
            return out;
        };
        let mut stack: Vec<NodeId> = root.children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(n) = self.node(id) {
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        selector.alternatives().iter().any(|chain| {
            let Some((last, ancestors)) = chain.split_last() else {
                return false;
            };
            if !last.matches(node) {
                return false;
            }
            // Right-to-left: each remaining compound must match some ancestor.
            let mut cursor = node.parent;
            for compound in ancestors.iter().rev() {
                loop {
                    match cursor.and_then(|p| self.node(p).map(|n| (p, n))) {
                        Some((_, n)) if compound.matches(n) => {
                            cursor = n.parent;
                            break;
                        }
                        Some((_, n)) => cursor = n.parent,
                        None => return false,
                    }
                }
            }
            true
        })
    }

    fn parse(selector: &str) -> Option<Selector> {
        match Selector::parse(selector) {
            Ok(sel) => Some(sel),
            Err(err) => {
                warn(
                    Domain::Dom,
                    "bad_selector",
                    obj(&[("selector", v_str(selector)), ("msg", v_str(&err.to_string()))]),
                );
                None
            }
        }
    }
}

impl HostDocument for MemoryDocument {
    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn query_all(&self, scope: NodeId, selector: &str) -> Vec<NodeId> {
        let Some(sel) = Self::parse(selector) else {
            return Vec::new();
        };
        self.descendants(scope)
            .into_iter()
            .filter(|id| self.matches(*id, &sel))
            .collect()
    }

    fn closest(&self, node: NodeId, selector: &str) -> Option<NodeId> {
        let sel = Self::parse(selector)?;
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if self.matches(id, &sel) {
                return Some(id);
            }
            cursor = self.node(id).and_then(|n| n.parent);
        }
        None
    }

    fn contains(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    fn text(&self, node: NodeId) -> String {
        let Some(n) = self.node(node) else {
            return String::new();
        };
        let mut parts = Vec::new();
        if !n.text.trim().is_empty() {
            parts.push(n.text.trim().to_string());
        }
        for id in self.descendants(node) {
            if let Some(child) = self.node(id) {
                if !child.text.trim().is_empty() {
                    parts.push(child.text.trim().to_string());
                }
            }
        }
        parts.join(" ")
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        let n = self.node(node)?;
        if name == "class" {
            return Some(n.classes.join(" "));
        }
        n.attrs.get(name).cloned()
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.node(node).map(|n| n.has_class(class)).unwrap_or(false)
    }

    fn markup(&self, node: NodeId) -> String {
        self.node(node).map(|n| n.markup.clone()).unwrap_or_default()
    }

    fn append(&mut self, parent: NodeId, spec: ElementSpec) -> NodeId {
        let id = NodeId(self.nodes.len());
        let attached = self.node(parent).is_some();
        self.nodes.push(Node {
            tag: spec.tag.to_ascii_lowercase(),
            classes: spec.classes,
            attrs: spec.attrs.into_iter().collect(),
            text: spec.text,
            markup: String::new(),
            parent: Some(parent),
            children: Vec::new(),
            attached,
        });
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.text = text.to_string();
        }
    }

    fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.attrs.insert(name.to_string(), value.to_string());
        }
    }

    fn toggle_class(&mut self, node: NodeId, class: &str, on: bool) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            let present = n.classes.iter().any(|c| c == class);
            if on && !present {
                n.classes.push(class.to_string());
            } else if !on && present {
                n.classes.retain(|c| c != class);
            }
        }
    }

    fn set_markup(&mut self, node: NodeId, markup: &str) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.markup = markup.to_string();
        }
    }

    fn dispatch(&mut self, node: NodeId, event: SyntheticEvent) {
        self.dispatched.push((node, event.clone()));
        if let Some(mut handlers) = self.reactions.remove(&node) {
            for handler in handlers.iter_mut() {
                handler(self, &event);
            }
            // Handlers registered while running are kept after the old ones.
            let added = self.reactions.remove(&node).unwrap_or_default();
            handlers.extend(added);
            self.reactions.insert(node, handlers);
        }
    }

    fn listen(&mut self, node: NodeId, kind: ListenKind) {
        self.listeners.push((node, kind));
    }
}
