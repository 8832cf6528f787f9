//! Text Extractor - visible page text split into semantic blocks
//!
//! Walks a subtree once, in document order, accumulating the character data
//! of visible text nodes. Every section element (paragraph, heading, list
//! item, table cell, ...) closes the block collected so far. Invisible
//! elements are pruned together with everything below them.
//!
//! ```text
//! <body><h1>Title</h1><p>Hello <b>you</b></p></body>
//!   → ["Title", "Hello you"]
//! ```

use crate::arena::DomArena;
use crate::types::{NodeId, NodeType, SECTION_ELEMENTS};
use crate::utils::{is_element_visible, normalize_whitespace};

/// Delimiter callers put between blocks when flattening to one string
pub const TEXT_BLOCK_DELIMITER: &str = "|||";

/// Single-pass iterator over the visible text blocks below a root node
///
/// The root itself is neither a boundary nor subject to the visibility
/// test; only its descendants are.
pub struct VisibleTextBlocks<'a> {
    arena: &'a DomArena,
    stack: Vec<NodeId>,
    buffer: String,
    finished: bool,
}

impl<'a> VisibleTextBlocks<'a> {
    pub fn new(arena: &'a DomArena, root_id: NodeId) -> Self {
        let stack = arena
            .get(root_id)
            .map(|root| root.children_ids.iter().rev().copied().collect())
            .unwrap_or_default();

        Self {
            arena,
            stack,
            buffer: String::new(),
            finished: false,
        }
    }

    /// Take the buffer, returning it only if it holds something besides whitespace
    fn flush(&mut self) -> Option<String> {
        let block = normalize_whitespace(&self.buffer);
        self.buffer.clear();
        if block.is_empty() {
            None
        } else {
            Some(block)
        }
    }
}

impl Iterator for VisibleTextBlocks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }

        while let Some(node_id) = self.stack.pop() {
            let node = match self.arena.get(node_id) {
                Ok(node) => node,
                Err(_) => continue,
            };

            match node.node_type {
                NodeType::Text => self.buffer.push_str(&node.node_value),
                NodeType::Comment => {}
                NodeType::Element => {
                    if !is_element_visible(node) {
                        continue;
                    }

                    self.stack.extend(node.children_ids.iter().rev().copied());

                    if SECTION_ELEMENTS.contains(&node.node_name.as_str()) {
                        if let Some(block) = self.flush() {
                            return Some(block);
                        }
                    }
                }
            }
        }

        self.finished = true;
        self.flush()
    }
}

/// Collect every visible text block below `root_id`
pub fn extract_visible_text(arena: &DomArena, root_id: NodeId) -> Vec<String> {
    VisibleTextBlocks::new(arena, root_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_html;

    fn blocks(markup: &str) -> Vec<String> {
        let arena = parse_html(markup).unwrap();
        let body = arena.first_by_tag("body").unwrap();
        extract_visible_text(&arena, body)
    }

    #[test]
    fn test_sections_split_blocks() {
        assert_eq!(
            blocks("<body><h1>Title</h1><p>Hello   <b>you</b>\n</p><p>next</p></body>"),
            vec!["Title", "Hello you", "next"]
        );
    }

    #[test]
    fn test_trailing_text_joins_previous_block() {
        // Only entering a section closes a block, leaving one does not
        assert_eq!(
            blocks("<body><p>para</p> tail</body>"),
            vec!["para tail"]
        );
    }

    #[test]
    fn test_text_before_a_section_is_its_own_block() {
        assert_eq!(
            blocks("<body>intro <span>inline</span><div>inside</div></body>"),
            vec!["intro inline", "inside"]
        );
    }

    #[test]
    fn test_invisible_subtrees_are_skipped() {
        assert_eq!(
            blocks(
                "<body><p>shown</p><div style=\"display:none\"><p>gone</p></div>\
                 <p hidden>also gone</p><script>var x = 1;</script><p>end</p></body>"
            ),
            vec!["shown", "end"]
        );
    }

    #[test]
    fn test_empty_blocks_are_dropped() {
        assert!(blocks("<body><div>  </div><p>\n</p></body>").is_empty());
    }

    #[test]
    fn test_iterator_is_fused_after_end() {
        let arena = parse_html("<body><p>a</p></body>").unwrap();
        let body = arena.first_by_tag("body").unwrap();
        let mut iter = VisibleTextBlocks::new(&arena, body);

        assert_eq!(iter.next().as_deref(), Some("a"));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_joined_with_delimiter() {
        let joined = blocks("<body><li>one</li><li>two</li></body>").join(TEXT_BLOCK_DELIMITER);
        assert_eq!(joined, "one|||two");
    }
}
