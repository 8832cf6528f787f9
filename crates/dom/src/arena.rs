//! Arena-based DOM tree storage
//!
//! ## Linus Philosophy Applied
//!
//! "Bad programmers worry about the code. Good programmers worry about
//! data structures and their relationships."
//!
//! This arena eliminates:
//! - Rc/RefCell overhead and borrow juggling during rewrites
//! - Cache misses (nodes stored sequentially)
//! - Dangling handles: a removed node stays addressable, it is only unlinked
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<DomNode>
//!        [Node0][Node1][Node2]...
//!         ↑ 4-byte index, not 8-byte pointer
//! ```

use crate::error::{DomError, Result};
use crate::types::{Attribute, DomNode, NodeId, NodeType};

/// Arena allocator for DOM nodes
///
/// Design:
/// - Single Vec<DomNode> for sequential allocation
/// - Nodes are never freed; detaching only unlinks them from the tree
/// - No Rc/Arc: use indices everywhere
#[derive(Debug, Clone)]
pub struct DomArena {
    /// All nodes stored sequentially (cache-friendly)
    nodes: Vec<DomNode>,

    /// Root node ID (if set)
    root_id: Option<NodeId>,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(1024), // Pre-allocate for typical page
            root_id: None,
        }
    }

    /// Create arena with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            root_id: None,
        }
    }

    /// Add a node to the arena, returns its ID
    pub fn add_node(&mut self, mut node: DomNode) -> NodeId {
        let node_id = self.nodes.len() as NodeId;
        node.node_id = node_id;
        self.nodes.push(node);
        node_id
    }

    /// Create a detached element node
    pub fn create_element(&mut self, tag: &str, attributes: Vec<Attribute>) -> NodeId {
        let mut node = DomNode::new(0, NodeType::Element, tag.to_ascii_lowercase());
        node.attributes = attributes;
        self.add_node(node)
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        let mut node = DomNode::new(0, NodeType::Text, "#text".to_string());
        node.node_value = text.into();
        self.add_node(node)
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable)
    pub fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Set root node
    pub fn set_root(&mut self, node_id: NodeId) -> Result<()> {
        // Verify node exists
        self.get(node_id)?;
        self.root_id = Some(node_id);
        Ok(())
    }

    /// Get root node ID
    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    /// Get root node
    pub fn root(&self) -> Result<&DomNode> {
        let root_id = self.root_id.ok_or(DomError::MissingRoot)?;
        self.get(root_id)
    }

    /// Total number of nodes, detached ones included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get children of a node
    pub fn children(&self, node_id: NodeId) -> Result<Vec<&DomNode>> {
        let node = self.get(node_id)?;
        node.children_ids
            .iter()
            .map(|&child_id| self.get(child_id))
            .collect()
    }

    /// Get parent of a node
    pub fn parent(&self, node_id: NodeId) -> Result<Option<&DomNode>> {
        let node = self.get(node_id)?;
        match node.parent_id {
            Some(parent_id) => Ok(Some(self.get(parent_id)?)),
            None => Ok(None),
        }
    }

    /// Append `child` as the last child of `parent`, unlinking it from any previous parent
    pub fn append_child(&mut self, parent_id: NodeId, child_id: NodeId) -> Result<()> {
        let parent = self.get(parent_id)?;
        if !parent.is_element() {
            return Err(DomError::InvalidNodeType {
                expected: "element".to_string(),
                actual: format!("{:?}", parent.node_type),
            });
        }
        self.get(child_id)?;

        self.detach(child_id)?;
        self.get_mut(parent_id)?.children_ids.push(child_id);
        self.get_mut(child_id)?.parent_id = Some(parent_id);
        Ok(())
    }

    /// Unlink a node from its parent. The node and its subtree stay in the arena.
    pub fn detach(&mut self, node_id: NodeId) -> Result<()> {
        let parent_id = match self.get_mut(node_id)?.parent_id.take() {
            Some(parent_id) => parent_id,
            None => return Ok(()),
        };
        self.get_mut(parent_id)?
            .children_ids
            .retain(|child| *child != node_id);
        Ok(())
    }

    /// Whether the node is still reachable from the root
    pub fn is_attached(&self, node_id: NodeId) -> bool {
        let mut current = Some(node_id);
        while let Some(id) = current {
            if Some(id) == self.root_id {
                return true;
            }
            current = self.nodes.get(id as usize).and_then(|node| node.parent_id);
        }
        false
    }

    /// Replace all children of `node_id` with a single text node
    pub fn replace_children_with_text(&mut self, node_id: NodeId, text: impl Into<String>) -> Result<NodeId> {
        let old_children = std::mem::take(&mut self.get_mut(node_id)?.children_ids);
        for child_id in old_children {
            self.get_mut(child_id)?.parent_id = None;
        }

        let text_id = self.create_text(text);
        self.append_child(node_id, text_id)?;
        Ok(text_id)
    }

    /// Concatenated character data of all text descendants
    pub fn text_content(&self, node_id: NodeId) -> Result<String> {
        let mut text = String::new();
        self.traverse_df(node_id, |node| {
            if node.is_text() {
                text.push_str(&node.node_value);
            }
            Ok(())
        })?;
        Ok(text)
    }

    /// Traverse tree depth-first (iterative, no recursion)
    ///
    /// This is the "good taste" version - no special cases for leaf nodes
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// Find all elements with the given tag below `start_id`, in document order
    pub fn find_by_tag(&self, start_id: NodeId, tag: &str) -> Result<Vec<NodeId>> {
        let mut found = Vec::new();
        self.traverse_df(start_id, |node| {
            if node.is_element() && node.node_name.eq_ignore_ascii_case(tag) {
                found.push(node.node_id);
            }
            Ok(())
        })?;
        Ok(found)
    }

    /// First element with the given tag in the attached tree
    pub fn first_by_tag(&self, tag: &str) -> Option<NodeId> {
        let root_id = self.root_id?;
        self.find_by_tag(root_id, tag).ok()?.into_iter().next()
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (DomArena, NodeId, NodeId, NodeId) {
        let mut arena = DomArena::new();
        let root = arena.create_element("div", Vec::new());
        let child1 = arena.create_element("span", Vec::new());
        let child2 = arena.create_element("SPAN", Vec::new());
        arena.append_child(root, child1).unwrap();
        arena.append_child(root, child2).unwrap();
        arena.set_root(root).unwrap();
        (arena, root, child1, child2)
    }

    #[test]
    fn test_arena_basic() {
        let mut arena = DomArena::new();

        let id = arena.create_element("div", vec![Attribute::new("id", "main")]);
        assert_eq!(id, 0);

        let retrieved = arena.get(id).unwrap();
        assert_eq!(retrieved.node_name, "div");
        assert_eq!(retrieved.node_id, 0);
        assert_eq!(retrieved.attr("id"), Some("main"));
        assert!(arena.get(42).is_err());
    }

    #[test]
    fn test_traverse_df() {
        let (mut arena, root, child1, _) = sample_tree();
        let text = arena.create_text("hi");
        arena.append_child(child1, text).unwrap();

        let mut visited = Vec::new();
        arena
            .traverse_df(root, |node| {
                visited.push(node.node_name.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(visited, vec!["div", "span", "#text", "span"]);
    }

    #[test]
    fn test_detach_keeps_node_addressable() {
        let (mut arena, root, child1, child2) = sample_tree();

        arena.detach(child1).unwrap();

        assert_eq!(arena.get(root).unwrap().children_ids.as_slice(), &[child2]);
        assert!(arena.get(child1).is_ok());
        assert!(!arena.is_attached(child1));
        assert!(arena.is_attached(child2));
        assert_eq!(arena.find_by_tag(root, "span").unwrap(), vec![child2]);
    }

    #[test]
    fn test_append_child_moves_node() {
        let (mut arena, root, child1, child2) = sample_tree();

        arena.append_child(child2, child1).unwrap();

        assert_eq!(arena.get(root).unwrap().children_ids.as_slice(), &[child2]);
        assert_eq!(arena.parent(child1).unwrap().unwrap().node_id, child2);
    }

    #[test]
    fn test_append_to_text_is_rejected() {
        let (mut arena, root, _, _) = sample_tree();
        let text = arena.create_text("x");
        arena.append_child(root, text).unwrap();
        let other = arena.create_text("y");

        assert!(matches!(
            arena.append_child(text, other),
            Err(DomError::InvalidNodeType { .. })
        ));
    }

    #[test]
    fn test_replace_children_with_text() {
        let (mut arena, root, _, _) = sample_tree();

        arena.replace_children_with_text(root, "plain").unwrap();

        assert_eq!(arena.children(root).unwrap().len(), 1);
        assert_eq!(arena.text_content(root).unwrap(), "plain");
    }
}
