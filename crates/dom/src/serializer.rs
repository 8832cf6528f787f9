//! DOM Serializer - Convert arena tree back to HTML markup
//!
//! Follows the HTML fragment serialization rules browsers use for
//! `outerHTML`:
//! - Void elements get no end tag and no children
//! - Text inside raw text elements (`style`, `script`, ...) is written verbatim
//! - Everything else is escaped (`&`, `<`, `>`, NBSP; `"` inside attributes)

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::*;

/// Serialize the whole tree (root element included)
pub fn serialize(arena: &DomArena) -> Result<String> {
    let root = arena.root()?;
    outer_html(arena, root.node_id)
}

/// Serialize a node together with its subtree
pub fn outer_html(arena: &DomArena, node_id: NodeId) -> Result<String> {
    let mut output = String::with_capacity(4096);
    serialize_node(arena, node_id, &mut output)?;
    Ok(output)
}

/// Serialize only the children of a node
pub fn inner_html(arena: &DomArena, node_id: NodeId) -> Result<String> {
    let mut output = String::with_capacity(1024);
    for &child_id in &arena.get(node_id)?.children_ids {
        serialize_node(arena, child_id, &mut output)?;
    }
    Ok(output)
}

/// Serialize a single node recursively
fn serialize_node(arena: &DomArena, node_id: NodeId, output: &mut String) -> Result<()> {
    let node = arena.get(node_id)?;

    match node.node_type {
        NodeType::Element => {
            output.push('<');
            output.push_str(&node.node_name);

            for attr in &node.attributes {
                output.push(' ');
                output.push_str(&attr.name);
                output.push_str("=\"");
                escape_into(&attr.value, true, output);
                output.push('"');
            }

            output.push('>');

            if VOID_ELEMENTS.contains(&node.node_name.as_str()) {
                return Ok(());
            }

            for &child_id in &node.children_ids {
                serialize_node(arena, child_id, output)?;
            }

            output.push_str("</");
            output.push_str(&node.node_name);
            output.push('>');
        }
        NodeType::Text => {
            let raw = match node.parent_id {
                Some(parent_id) => {
                    let parent = arena.get(parent_id)?;
                    parent.is_element() && RAW_TEXT_ELEMENTS.contains(&parent.node_name.as_str())
                }
                None => false,
            };

            if raw {
                output.push_str(&node.node_value);
            } else {
                escape_into(&node.node_value, false, output);
            }
        }
        NodeType::Comment => {
            output.push_str("<!--");
            output.push_str(&node.node_value);
            output.push_str("-->");
        }
    }

    Ok(())
}

fn escape_into(text: &str, attribute_mode: bool, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '\u{00A0}' => output.push_str("&nbsp;"),
            '"' if attribute_mode => output.push_str("&quot;"),
            '<' if !attribute_mode => output.push_str("&lt;"),
            '>' if !attribute_mode => output.push_str("&gt;"),
            c => output.push(c),
        }
    }
}
