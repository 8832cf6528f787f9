//! HTML Parser - markup string to arena
//!
//! html5ever does the tokenizing and tree building (including all the
//! error recovery browsers do), then the reference-counted tree is copied
//! into a [`DomArena`] once. After that nothing touches Rc/RefCell again.
//!
//! Design notes:
//! - The arena root is the `html` element, not the document node
//! - `template` contents become ordinary children of the template element
//! - Doctype and document-level comments are dropped (callers keep the doctype)

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::*;
use html5ever::tendril::TendrilSink as _;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Parse a full HTML document into an arena rooted at its `html` element
pub fn parse_html(markup: &str) -> Result<DomArena> {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            exact_errors: false,
            scripting_enabled: false,
            ..TreeBuilderOpts::default()
        },
        ..ParseOpts::default()
    };

    let dom = parse_document(RcDom::default(), opts)
        .from_utf8()
        .read_from(&mut markup.as_bytes())?;

    let html = dom
        .document
        .children
        .borrow()
        .iter()
        .find(|child| matches!(child.data, NodeData::Element { .. }))
        .cloned()
        .ok_or(DomError::MissingRoot)?;

    let mut arena = DomArena::with_capacity(markup.len() / 16 + 16);
    let root_id = convert_node(&mut arena, &html, None).ok_or(DomError::MissingRoot)?;
    arena.set_root(root_id)?;

    tracing::debug!("[DomParser] Parsed {} nodes", arena.len());
    Ok(arena)
}

/// Recursively copy an rcdom node (and its subtree) into the arena
fn convert_node(arena: &mut DomArena, handle: &Handle, parent_id: Option<NodeId>) -> Option<NodeId> {
    let mut node = match &handle.data {
        NodeData::Element { name, attrs, .. } => {
            let mut node = DomNode::new(0, NodeType::Element, name.local.to_string());
            node.attributes = attrs
                .borrow()
                .iter()
                .map(|attr| {
                    let name = match &attr.name.prefix {
                        Some(prefix) => format!("{}:{}", prefix, attr.name.local),
                        None => attr.name.local.to_string(),
                    };
                    Attribute::new(name, attr.value.to_string())
                })
                .collect();
            node
        }
        NodeData::Text { contents } => {
            let mut node = DomNode::new(0, NodeType::Text, "#text".to_string());
            node.node_value = contents.borrow().to_string();
            node
        }
        NodeData::Comment { contents } => {
            let mut node = DomNode::new(0, NodeType::Comment, "#comment".to_string());
            node.node_value = contents.to_string();
            node
        }
        NodeData::Document | NodeData::Doctype { .. } | NodeData::ProcessingInstruction { .. } => {
            return None
        }
    };
    node.parent_id = parent_id;
    let current_id = arena.add_node(node);

    // Template contents live in a separate fragment in rcdom
    let template_contents = match &handle.data {
        NodeData::Element {
            template_contents, ..
        } => template_contents.borrow().clone(),
        _ => None,
    };
    let children: Vec<Handle> = match template_contents {
        Some(fragment) => fragment.children.borrow().iter().cloned().collect(),
        None => handle.children.borrow().iter().cloned().collect(),
    };

    let mut child_ids = smallvec::SmallVec::new();
    for child in &children {
        if let Some(child_id) = convert_node(arena, child, Some(current_id)) {
            child_ids.push(child_id);
        }
    }

    if let Ok(node) = arena.get_mut(current_id) {
        node.children_ids = child_ids;
    }

    Some(current_id)
}
