//! Snapshot DOM Processing Library
//!
//! Arena-backed HTML tree used by the snapshot pipeline: parse once,
//! rewrite in place, serialize back out.
//!
//! ## Philosophy (Linus Torvalds Style)
//!
//! - **Good taste**: Data structures first, algorithms follow naturally
//! - **No special cases**: template contents are plain children, removal is unlinking
//! - **Cache friendly**: Arena allocation, sequential access patterns
//!
//! ## Core Design
//!
//! ```text
//! markup → html5ever (RcDom) → DomArena (owned) → rewrite → serialize
//!                                   ↓
//!                             NodeId (u32)
//! ```

pub mod arena;
pub mod error;
pub mod parser;
pub mod serializer;
pub mod text;
pub mod types;
pub mod utils;

pub use arena::DomArena;
pub use error::{DomError, Result};
pub use parser::parse_html;
pub use text::{extract_visible_text, VisibleTextBlocks, TEXT_BLOCK_DELIMITER};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rewrite_serialize() {
        let mut arena = parse_html("<p>old</p>").unwrap();
        let p = arena.first_by_tag("p").unwrap();
        arena.replace_children_with_text(p, "new").unwrap();
        arena.get_mut(p).unwrap().set_attr("class", "x");

        assert_eq!(
            serializer::serialize(&arena).unwrap(),
            "<html><head></head><body><p class=\"x\">new</p></body></html>"
        );
    }
}
