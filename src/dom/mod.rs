//! Port to the host document.
//!
//! The host application owns and re-renders its document at will; the engine
//! only reads it, appends marker-classed elements, updates those elements, and
//! dispatches synthetic input events. `HostDocument` is that surface.
//! Selectors are CSS strings, as with `querySelectorAll`.

pub mod fixture;
pub mod memory;
pub mod selector;

pub use memory::MemoryDocument;
pub use selector::Selector;

/// Opaque handle to a node in the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Input events the engine can synthesise against host elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticEvent {
    MouseOver,
    MouseLeave,
    Click,
    KeyDown { key: char, key_code: u32 },
}

impl SyntheticEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyntheticEvent::MouseOver => "mouseover",
            SyntheticEvent::MouseLeave => "mouseleave",
            SyntheticEvent::Click => "click",
            SyntheticEvent::KeyDown { .. } => "keydown",
        }
    }
}

/// Listener kinds the engine attaches to rows and injected controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenKind {
    /// mouseenter / focusin on a row
    Hover,
    Click,
    Change,
}

/// Description of an element to create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSpec {
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: Vec<(String, String)>,
    pub text: String,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string(), ..Self::default() }
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.extend(class.split_whitespace().map(str::to_string));
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }
}

pub trait HostDocument {
    fn root(&self) -> NodeId;

    /// All descendants of `scope` matching `selector`, in document order.
    fn query_all(&self, scope: NodeId, selector: &str) -> Vec<NodeId>;

    fn query(&self, scope: NodeId, selector: &str) -> Option<NodeId> {
        self.query_all(scope, selector).into_iter().next()
    }

    /// `node` itself or its nearest ancestor matching `selector`.
    fn closest(&self, node: NodeId, selector: &str) -> Option<NodeId>;

    /// False once the host has removed the node.
    fn contains(&self, node: NodeId) -> bool;

    /// Rendered text of the node and its descendants.
    fn text(&self, node: NodeId) -> String;

    fn attr(&self, node: NodeId, name: &str) -> Option<String>;

    fn has_class(&self, node: NodeId, class: &str) -> bool;

    /// Markup last written with `set_markup`.
    fn markup(&self, node: NodeId) -> String;

    /// Create an element and append it as the last child of `parent`.
    fn append(&mut self, parent: NodeId, spec: ElementSpec) -> NodeId;

    fn set_text(&mut self, node: NodeId, text: &str);

    fn set_attr(&mut self, node: NodeId, name: &str, value: &str);

    fn toggle_class(&mut self, node: NodeId, class: &str, on: bool);

    fn set_markup(&mut self, node: NodeId, markup: &str);

    fn dispatch(&mut self, node: NodeId, event: SyntheticEvent);

    fn listen(&mut self, node: NodeId, kind: ListenKind);
}
