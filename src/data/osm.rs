use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    /// Maps a top-level XML tag name to its element kind.
    pub fn from_name(name: &[u8]) -> Option<ElementKind> {
        match name {
            b"node" => Some(ElementKind::Node),
            b"way" => Some(ElementKind::Way),
            b"relation" => Some(ElementKind::Relation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }
}

/// A free-form key/value metadata pair from a nested `<tag>` child.
#[derive(Debug, Clone)]
pub struct RawTag {
    pub key: String,
    pub value: String,
}

/// One top-level element together with its nested children, fully owned.
/// The reader hands these out one at a time and keeps nothing back, so
/// dropping an element releases its whole subtree.
#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub attributes: HashMap<String, String>,
    pub tags: Vec<RawTag>,
    /// `ref` attributes of nested `<nd>` children, in document order.
    pub node_refs: Vec<String>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Element {
        Element {
            kind,
            attributes: HashMap::new(),
            tags: Vec::new(),
            node_refs: Vec::new(),
        }
    }
}
