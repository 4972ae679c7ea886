/*!
 * Host document model.
 *
 * The pipeline watches and writes into a mutable element tree. This module
 * provides that tree as a thread-safe arena of element nodes addressed by
 * opaque `NodeId` handles, plus a mutation feed that plays the role of a
 * structural observer:
 *
 * - `Document`: the tree itself, with structural and query operations
 * - `MutationRecord`: one structural change, published to every observer
 * - `NodeSpec`: a serializable description used to build subtrees
 * - `selector`: the selector subset used to query the tree
 */

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use log::trace;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::DocumentError;

pub mod selector;

pub use self::selector::Selector;
use self::selector::SelectorTarget;

/// Capacity of the mutation feed before slow observers start lagging
const MUTATION_FEED_CAPACITY: usize = 1024;

/// Opaque handle to a node of a `Document`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single structural change under `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// The parent whose child list changed
    pub target: NodeId,
    /// Nodes inserted under `target` (each possibly carrying a subtree)
    pub added: Vec<NodeId>,
    /// Nodes removed from `target`
    pub removed: Vec<NodeId>,
}

/// Serializable description of an element subtree
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Element tag name
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Element attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Text owned directly by the element
    #[serde(default)]
    pub text: Option<String>,

    /// Child elements
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

fn default_tag() -> String {
    "div".to_string()
}

impl NodeSpec {
    /// Create a spec for an element with the given tag
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Set an attribute
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the element's own text
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child element
    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
            text: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Tree {
    // A removed node keeps its slot until it is discarded, so it can be re-inserted.
    nodes: HashMap<usize, NodeData>,
    next_id: usize,
    root: NodeId,
}

impl Tree {
    fn get(&self, id: NodeId) -> Result<&NodeData, DocumentError> {
        self.nodes.get(&id.0).ok_or(DocumentError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DocumentError> {
        self.nodes.get_mut(&id.0).ok_or(DocumentError::UnknownNode(id))
    }

    fn alloc(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id.0, NodeData::new(tag));
        id
    }

    /// Hang `child` under `parent` at `index` (or last); both must exist
    fn attach(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        if let Some(parent_node) = self.nodes.get_mut(&parent.0) {
            let at = index.unwrap_or(parent_node.children.len()).min(parent_node.children.len());
            parent_node.children.insert(at, child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child.0) {
            child_node.parent = Some(parent);
        }
    }

    fn build(&mut self, spec: &NodeSpec) -> NodeId {
        let id = self.alloc(&spec.tag);
        if let Some(node) = self.nodes.get_mut(&id.0) {
            node.attributes = spec.attributes.clone();
            node.text = spec.text.clone();
        }
        for child_spec in &spec.children {
            let child = self.build(child_spec);
            self.attach(id, child, None);
        }
        id
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id.0).and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&id.0)?.parent.take()?;
        if let Some(parent_node) = self.nodes.get_mut(&parent.0) {
            parent_node.children.retain(|c| *c != id);
        }
        Some(parent)
    }

    /// Drop `id` and its descendants from the arena, returning how many nodes were freed
    fn free_subtree(&mut self, id: NodeId) -> usize {
        let mut stack = vec![id];
        let mut freed = 0;
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current.0) {
                stack.extend(node.children);
                freed += 1;
            }
        }
        freed
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), DocumentError> {
        self.get(parent)?;
        self.get(child)?;
        if child == self.root || self.is_ancestor_or_self(child, parent) {
            return Err(DocumentError::Hierarchy(child));
        }
        Ok(())
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id.0) else {
            return;
        };
        if let Some(text) = &node.text {
            out.push_str(text);
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(&scope.0)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id.0) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }
}

impl SelectorTarget for Tree {
    fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id.0).map(|n| n.tag.as_str())
    }

    fn attribute_value(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(&id.0)?.attributes.get(name).map(String::as_str)
    }

    fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id.0)?.parent
    }
}

/// A shared handle to a document
pub type SharedDocument = Arc<Document>;

/// Thread-safe mutable element tree with a structural mutation feed
pub struct Document {
    tree: RwLock<Tree>,
    mutations: broadcast::Sender<MutationRecord>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.tree.read().nodes.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a `body` root
    pub fn new() -> Self {
        let mut tree = Tree {
            nodes: HashMap::new(),
            next_id: 0,
            root: NodeId(0),
        };
        tree.root = tree.alloc("body");
        let (mutations, _) = broadcast::channel(MUTATION_FEED_CAPACITY);
        Self {
            tree: RwLock::new(tree),
            mutations,
        }
    }

    /// Create a shared empty document
    pub fn shared() -> SharedDocument {
        Arc::new(Self::new())
    }

    /// The root element
    pub fn body(&self) -> NodeId {
        self.tree.read().root
    }

    /// Subscribe to structural changes anywhere in the document
    pub fn observe(&self) -> broadcast::Receiver<MutationRecord> {
        self.mutations.subscribe()
    }

    fn publish(&self, record: MutationRecord) {
        trace!("Mutation under {}: +{} -{}", record.target, record.added.len(), record.removed.len());
        // No observers is fine; the record is simply dropped.
        let _ = self.mutations.send(record);
    }

    /// Create a detached element
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.write().alloc(tag)
    }

    /// Build a detached subtree from a spec
    pub fn build(&self, spec: &NodeSpec) -> NodeId {
        self.tree.write().build(spec)
    }

    /// Append `child` as the last child of `parent`, moving it if it is attached elsewhere
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DocumentError> {
        let previous = {
            let mut tree = self.tree.write();
            tree.check_insertable(parent, child)?;
            let previous = tree.detach(child);
            tree.attach(parent, child, None);
            previous
        };

        if let Some(previous) = previous {
            self.publish(MutationRecord { target: previous, added: Vec::new(), removed: vec![child] });
        }
        self.publish(MutationRecord { target: parent, added: vec![child], removed: Vec::new() });
        Ok(())
    }

    /// Build `spec` and append it under `parent`
    pub fn append_spec(&self, parent: NodeId, spec: &NodeSpec) -> Result<NodeId, DocumentError> {
        let id = self.build(spec);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Insert `node` directly after `reference` under the same parent
    pub fn insert_after(&self, reference: NodeId, node: NodeId) -> Result<(), DocumentError> {
        let (parent, previous) = {
            let mut tree = self.tree.write();
            let parent = tree.get(reference)?.parent.ok_or(DocumentError::Hierarchy(reference))?;
            tree.check_insertable(parent, node)?;
            let previous = tree.detach(node);
            let index = tree.get(parent)?.children.iter().position(|c| *c == reference).map(|i| i + 1);
            tree.attach(parent, node, index);
            (parent, previous)
        };

        if let Some(previous) = previous {
            self.publish(MutationRecord { target: previous, added: Vec::new(), removed: vec![node] });
        }
        self.publish(MutationRecord { target: parent, added: vec![node], removed: Vec::new() });
        Ok(())
    }

    /// Detach `node` (and its subtree) from its parent
    pub fn remove(&self, node: NodeId) -> Result<(), DocumentError> {
        let parent = {
            let mut tree = self.tree.write();
            tree.get(node)?;
            if node == tree.root {
                return Err(DocumentError::Hierarchy(node));
            }
            tree.detach(node)
        };

        if let Some(parent) = parent {
            self.publish(MutationRecord { target: parent, added: Vec::new(), removed: vec![node] });
        }
        Ok(())
    }

    /// Detach `node` and free its subtree for good.
    ///
    /// Handles into the discarded subtree become unknown; nothing can re-insert them.
    pub fn discard(&self, node: NodeId) -> Result<usize, DocumentError> {
        self.remove(node)?;
        let freed = self.tree.write().free_subtree(node);
        trace!("Discarded {} ({} nodes)", node, freed);
        Ok(freed)
    }

    /// Number of nodes held by the document, attached or not
    pub fn node_count(&self) -> usize {
        self.tree.read().nodes.len()
    }

    /// Set an attribute; attribute changes are not structural and publish nothing
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DocumentError> {
        self.tree.write().get_mut(node)?.attributes.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Read an attribute
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.tree.read().attribute_value(node, name).map(str::to_string)
    }

    /// Replace the element's own text
    pub fn set_text(&self, node: NodeId, text: &str) -> Result<(), DocumentError> {
        self.tree.write().get_mut(node)?.text = Some(text.to_string());
        Ok(())
    }

    /// Concatenated text of the node and all its descendants
    pub fn text_content(&self, node: NodeId) -> String {
        let tree = self.tree.read();
        let mut out = String::new();
        if tree.get(node).is_ok() {
            tree.collect_text(node, &mut out);
        }
        out
    }

    /// Tag name of the node
    pub fn tag(&self, node: NodeId) -> Option<String> {
        self.tree.read().tag_name(node).map(str::to_string)
    }

    /// Parent of the node, if attached to one
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.read().parent_of(node)
    }

    /// Children of the node in document order
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.read().get(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    /// Whether the node is currently part of the live document
    pub fn is_attached(&self, node: NodeId) -> bool {
        let tree = self.tree.read();
        let root = tree.root;
        tree.get(node).is_ok() && tree.is_ancestor_or_self(root, node)
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree.read().is_ancestor_or_self(ancestor, node)
    }

    /// Whether the node matches the selector
    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        selector.matches(&*self.tree.read(), node)
    }

    /// First descendant of `scope` (in document order) matching the selector
    pub fn query_selector(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        let tree = self.tree.read();
        if tree.get(scope).is_err() {
            return None;
        }
        tree.descendants(scope).into_iter().find(|id| selector.matches(&*tree, *id))
    }

    /// All descendants of `scope` (in document order) matching the selector
    pub fn query_selector_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let tree = self.tree.read();
        if tree.get(scope).is_err() {
            return Vec::new();
        }
        tree.descendants(scope)
            .into_iter()
            .filter(|id| selector.matches(&*tree, *id))
            .collect()
    }

    /// Nearest node from `node` upwards (inclusive) matching the selector
    pub fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let tree = self.tree.read();
        let mut current = tree.get(node).ok().map(|_| node);
        while let Some(id) = current {
            if selector.matches(&*tree, id) {
                return Some(id);
            }
            current = tree.parent_of(id);
        }
        None
    }
}
